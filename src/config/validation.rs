// src/config/validation.rs

use crate::config::{AppConfig, StorageBackend};
use crate::error::{AppError, Result};
use tracing::{debug, warn};
use url::Url;

/// Upper bound for the pause between rotated attempts.
const MAX_ROTATION_DELAY_MS: u64 = 10_000;

pub struct ConfigValidator;

impl ConfigValidator {
    pub fn validate(config: &AppConfig) -> Result<()> {
        debug!("Starting configuration validation");

        if let Err(e) = Self::validate_pool(config) {
            warn!("Pool validation failed: {}", e);
            return Err(e);
        }
        debug!("Pool validation passed");

        if let Err(e) = Self::validate_storage(config) {
            warn!("Storage validation failed: {}", e);
            return Err(e);
        }
        debug!("Storage validation passed");

        if let Err(e) = Self::validate_gemini(config) {
            warn!("Gemini config validation failed: {}", e);
            return Err(e);
        }

        debug!("Configuration validation completed successfully");
        Ok(())
    }

    fn validate_pool(config: &AppConfig) -> Result<()> {
        let pool = &config.pool;

        if pool.max_keys == 0 {
            return Err(AppError::config_validation(
                "Pool must accept at least one key",
                Some("pool.max_keys"),
            ));
        }

        if pool.key_prefix.is_empty() {
            return Err(AppError::config_validation(
                "Key prefix cannot be empty",
                Some("pool.key_prefix"),
            ));
        }

        if pool.key_length <= pool.key_prefix.chars().count() {
            return Err(AppError::config_validation(
                format!(
                    "Key length {} must be longer than the prefix '{}'",
                    pool.key_length, pool.key_prefix
                ),
                Some("pool.key_length"),
            ));
        }

        if pool.unhealthy_threshold == 0 {
            return Err(AppError::config_validation(
                "Unhealthy threshold cannot be 0",
                Some("pool.unhealthy_threshold"),
            ));
        }

        if pool.rotation_delay_ms == 0 || pool.rotation_delay_ms > MAX_ROTATION_DELAY_MS {
            return Err(AppError::config_validation(
                format!(
                    "Rotation delay must be between 1 and {MAX_ROTATION_DELAY_MS} ms (got {})",
                    pool.rotation_delay_ms
                ),
                Some("pool.rotation_delay_ms"),
            ));
        }

        Ok(())
    }

    fn validate_storage(config: &AppConfig) -> Result<()> {
        let storage = &config.storage;
        match storage.backend {
            StorageBackend::Memory => {
                warn!("Memory storage selected: the pool will not survive a restart");
            }
            StorageBackend::File => {
                if storage.path.as_os_str().is_empty() {
                    return Err(AppError::config_validation(
                        "File storage requires a path",
                        Some("storage.path"),
                    ));
                }
            }
            StorageBackend::Redis => {
                let redis_url = storage.redis_url.as_deref().ok_or_else(|| {
                    AppError::config_validation(
                        "Redis storage requires redis_url",
                        Some("storage.redis_url"),
                    )
                })?;
                Self::validate_url(redis_url, "storage.redis_url")?;
            }
        }
        Ok(())
    }

    fn validate_gemini(config: &AppConfig) -> Result<()> {
        Self::validate_url(&config.gemini.base_url, "gemini.base_url")?;

        if config.gemini.model.trim().is_empty() {
            return Err(AppError::config_validation(
                "Model name cannot be empty",
                Some("gemini.model"),
            ));
        }

        if config.gemini.connect_timeout_secs == 0 {
            return Err(AppError::config_validation(
                "Connect timeout cannot be 0",
                Some("gemini.connect_timeout_secs"),
            ));
        }

        if config.gemini.request_timeout_secs == 0 {
            return Err(AppError::config_validation(
                "Request timeout cannot be 0",
                Some("gemini.request_timeout_secs"),
            ));
        }

        Ok(())
    }

    fn validate_url(url_str: &str, field_name: &str) -> Result<()> {
        Url::parse(url_str).map_err(|e| {
            AppError::config_validation(
                format!("Invalid URL in {field_name}: {url_str} - {e}"),
                Some(field_name),
            )
        })?;
        Ok(())
    }
}
