// src/lib.rs

pub mod config;
pub mod core;
pub mod credential;
pub mod error;
pub mod gemini;
pub mod key_manager;
pub mod metrics;
pub mod storage;

use crate::config::{StorageBackend, StorageConfig};
use crate::storage::{FileStore, InMemoryStore, KeyValueStore};
use std::sync::Arc;
use tracing::info;

// Re-export key types for convenience
pub use config::AppConfig;
pub use credential::Credential;
pub use error::{AppError, InvokeError, Result, ValidationError};
pub use gemini::{GeminiClient, GenerateRequest, GenerateResponse, RemoteCall};
pub use key_manager::{CredentialStatus, KeyPool};

/// Builds the durable store selected in the configuration.
pub async fn open_store(storage: &StorageConfig) -> Result<Arc<dyn KeyValueStore>> {
    match storage.backend {
        StorageBackend::Memory => {
            info!("Using in-memory store.");
            Ok(Arc::new(InMemoryStore::new()))
        }
        StorageBackend::File => {
            info!(store.path = %storage.path.display(), "Using file store.");
            Ok(Arc::new(FileStore::new(storage.path.clone())))
        }
        StorageBackend::Redis => open_redis_store(storage).await,
    }
}

#[cfg(feature = "redis")]
async fn open_redis_store(storage: &StorageConfig) -> Result<Arc<dyn KeyValueStore>> {
    let redis_url = storage.redis_url.as_deref().ok_or_else(|| {
        AppError::config_validation("Redis storage requires redis_url", Some("storage.redis_url"))
    })?;
    let store = crate::storage::RedisStore::connect(redis_url).await?;
    Ok(Arc::new(store))
}

#[cfg(not(feature = "redis"))]
async fn open_redis_store(_storage: &StorageConfig) -> Result<Arc<dyn KeyValueStore>> {
    Err(AppError::config_validation(
        "Redis storage requires the `redis` feature",
        Some("storage.backend"),
    ))
}

/// Opens the configured store and loads the pool from it.
pub async fn build_pool(config: &AppConfig) -> Result<KeyPool> {
    let store = open_store(&config.storage).await?;
    KeyPool::load(store, config.pool.clone(), &config.storage.namespace).await
}
