// src/config/loader.rs

use crate::config::{AppConfig, ConfigValidator, EnvironmentConfig};
use crate::error::{AppError, Result};
use std::path::Path;
use tracing::{debug, info};

/// Load configuration from file, apply environment overrides, validate.
pub fn load_config(config_path: &Path) -> Result<AppConfig> {
    let mut config = if config_path.exists() {
        info!("Loading configuration from file: {}", config_path.display());
        load_from_file(config_path)?
    } else {
        info!("Configuration file not found, using defaults");
        AppConfig::default()
    };

    override_with_env(&mut config, &EnvironmentConfig::from_env());

    ConfigValidator::validate(&config)?;

    debug!("Configuration loaded and validated successfully");
    Ok(config)
}

fn load_from_file(config_path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(config_path).map_err(|_| AppError::ConfigNotFound {
        path: config_path.display().to_string(),
    })?;

    serde_yaml::from_str(&content).map_err(|e| AppError::ConfigParse {
        message: format!("Failed to parse config file: {e}"),
        line: e.location().map(|loc| loc.line()),
    })
}

/// Applies the environment overrides that are present.
pub fn override_with_env(config: &mut AppConfig, env: &EnvironmentConfig) {
    if let Some(path) = &env.store_path {
        info!("Overriding store path from environment variable");
        config.storage.path = path.clone();
    }

    if let Some(redis_url) = &env.redis_url {
        info!("Overriding Redis URL from environment variable");
        config.storage.redis_url = Some(redis_url.clone());
    }

    if let Some(delay) = env.rotation_delay_ms {
        info!("Overriding rotation delay from environment: {}ms", delay);
        config.pool.rotation_delay_ms = delay;
    }

    if let Some(model) = &env.model {
        info!("Overriding Gemini model from environment: {}", model);
        config.gemini.model = model.clone();
    }
}
