// src/storage/traits.rs

use crate::error::Result;
use async_trait::async_trait;

/// Durable string key-value store used to persist the pool.
///
/// The pool serializes its own data; a store only moves strings around.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Get the value stored under `key`, if any
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Store `value` under `key`, replacing any previous value
    async fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Short backend name for logs
    fn backend_name(&self) -> &'static str;
}
