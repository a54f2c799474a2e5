// src/storage/redis.rs

use crate::error::Result;
use crate::storage::KeyValueStore;
use async_trait::async_trait;
use deadpool_redis::{Config as RedisPoolConfig, Connection as RedisConnection, Pool, Runtime};
use redis::AsyncCommands;
use tracing::{info, trace};

/// Redis implementation of the durable store. Values are plain string keys.
pub struct RedisStore {
    pool: Pool,
}

impl RedisStore {
    /// Builds a connection pool for `redis_url` and checks that the server answers.
    pub async fn connect(redis_url: &str) -> Result<Self> {
        let pool = RedisPoolConfig::from_url(redis_url).create_pool(Some(Runtime::Tokio1))?;
        let store = Self::from_pool(pool);
        let mut conn = store.get_connection().await?;
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        info!("Connected to Redis store.");
        Ok(store)
    }

    pub fn from_pool(pool: Pool) -> Self {
        Self { pool }
    }

    async fn get_connection(&self) -> Result<RedisConnection> {
        self.pool.get().await.map_err(Into::into)
    }
}

#[async_trait]
impl KeyValueStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        trace!("RedisStore::get: start for key '{}'", key);
        let mut conn = self.get_connection().await?;
        let value: Option<String> = conn.get(key).await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        trace!("RedisStore::set: start for key '{}'", key);
        let mut conn = self.get_connection().await?;
        let _: () = conn.set(key, value).await?;
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "redis"
    }
}
