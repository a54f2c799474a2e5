// src/config/mod.rs

pub mod app;
pub mod environment;
pub mod loader;
pub mod validation;

pub use app::{AppConfig, GeminiConfig, PoolSettings, StorageBackend, StorageConfig};
pub use environment::{load_api_keys_from_env, EnvironmentConfig};
pub use loader::{load_config, override_with_env};
pub use validation::ConfigValidator;
