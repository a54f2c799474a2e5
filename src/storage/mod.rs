// src/storage/mod.rs

pub mod file;
pub mod key_state;
pub mod memory;
#[cfg(feature = "redis")]
pub mod redis;
pub mod traits;

pub use file::FileStore;
pub use key_state::{HealthMap, HealthRecord, KeyStatus};
pub use memory::InMemoryStore;
#[cfg(feature = "redis")]
pub use redis::RedisStore;
pub use traits::KeyValueStore;
