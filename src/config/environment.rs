//! Environment-based configuration management

use std::env;
use std::path::PathBuf;
use tracing::warn;

/// Environment values that override file-based config
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EnvironmentConfig {
    pub store_path: Option<PathBuf>,
    pub redis_url: Option<String>,
    pub rotation_delay_ms: Option<u64>,
    pub model: Option<String>,
}

impl EnvironmentConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        Self {
            store_path: env::var("KEY_POOL_STORE_PATH").ok().map(PathBuf::from),
            redis_url: env::var("REDIS_URL").ok(),
            rotation_delay_ms: env::var("KEY_POOL_ROTATION_DELAY_MS").ok().and_then(|s| {
                s.parse()
                    .map_err(|_| warn!("Invalid KEY_POOL_ROTATION_DELAY_MS environment variable: {}", s))
                    .ok()
            }),
            model: env::var("GEMINI_MODEL").ok(),
        }
    }

    /// Check if any environment overrides are present
    pub fn has_overrides(&self) -> bool {
        self.store_path.is_some()
            || self.redis_url.is_some()
            || self.rotation_delay_ms.is_some()
            || self.model.is_some()
    }
}

/// Load API keys from environment variables
/// Supports GEMINI_API_KEY_1, GEMINI_API_KEY_2, ..., then GEMINI_API_KEY, then
/// a comma-separated GEMINI_API_KEYS.
pub fn load_api_keys_from_env() -> Vec<String> {
    let mut keys = Vec::new();
    let mut index = 1;

    while let Ok(key) = env::var(format!("GEMINI_API_KEY_{index}")) {
        if !key.trim().is_empty() {
            keys.push(key.trim().to_string());
        }
        index += 1;
    }

    if keys.is_empty() {
        if let Ok(key) = env::var("GEMINI_API_KEY") {
            if !key.trim().is_empty() {
                keys.push(key.trim().to_string());
            }
        }
    }

    if keys.is_empty() {
        if let Ok(keys_str) = env::var("GEMINI_API_KEYS") {
            keys.extend(
                keys_str
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty()),
            );
        }
    }

    keys
}
