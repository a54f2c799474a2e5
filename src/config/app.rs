// src/config/app.rs

use crate::credential::CredentialShape;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Rotation and admission rules of the pool.
#[derive(Debug, Deserialize, Clone, PartialEq, Serialize)]
pub struct PoolSettings {
    #[serde(default = "default_max_keys")]
    pub max_keys: usize,
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
    #[serde(default = "default_key_length")]
    pub key_length: usize,
    /// Keys with this many consecutive failures are skipped while a healthier one exists.
    #[serde(default = "default_unhealthy_threshold")]
    pub unhealthy_threshold: u32,
    #[serde(default = "default_rotation_delay_ms")]
    pub rotation_delay_ms: u64,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            max_keys: default_max_keys(),
            key_prefix: default_key_prefix(),
            key_length: default_key_length(),
            unhealthy_threshold: default_unhealthy_threshold(),
            rotation_delay_ms: default_rotation_delay_ms(),
        }
    }
}

impl PoolSettings {
    pub fn shape(&self) -> CredentialShape {
        CredentialShape {
            prefix: self.key_prefix.clone(),
            length: self.key_length,
        }
    }

    pub fn rotation_delay(&self) -> Duration {
        Duration::from_millis(self.rotation_delay_ms)
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Memory,
    #[default]
    File,
    Redis,
}

#[derive(Debug, Deserialize, Clone, PartialEq, Serialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,
    #[serde(default = "default_store_path")]
    pub path: PathBuf,
    #[serde(default)]
    pub redis_url: Option<String>,
    /// Namespace prepended to the two persisted entry names.
    #[serde(default = "default_namespace")]
    pub namespace: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::default(),
            path: default_store_path(),
            redis_url: None,
            namespace: default_namespace(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq, Serialize)]
pub struct GeminiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            model: default_model(),
            connect_timeout_secs: default_connect_timeout(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq, Default, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub pool: PoolSettings,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub gemini: GeminiConfig,
}

// Default value functions
fn default_max_keys() -> usize {
    10
}

fn default_key_prefix() -> String {
    "AIza".to_string()
}

fn default_key_length() -> usize {
    39
}

fn default_unhealthy_threshold() -> u32 {
    3
}

fn default_rotation_delay_ms() -> u64 {
    500
}

fn default_store_path() -> PathBuf {
    PathBuf::from("key-pool.json")
}

fn default_namespace() -> String {
    "animato_".to_string()
}

fn default_base_url() -> String {
    "https://generativelanguage.googleapis.com".to_string()
}

fn default_model() -> String {
    "gemini-3-flash-preview".to_string()
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_request_timeout() -> u64 {
    60
}
