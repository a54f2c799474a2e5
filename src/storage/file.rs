// src/storage/file.rs

use crate::error::{AppError, Result};
use crate::storage::KeyValueStore;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, info, trace};

/// Stores every entry in one JSON object on disk.
///
/// The file is read once, on first access, and rewritten in full on every
/// `set` through a sibling temp file and a rename.
pub struct FileStore {
    path: PathBuf,
    entries: Mutex<Option<BTreeMap<String, String>>>,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            entries: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_from_disk(&self) -> Result<BTreeMap<String, String>> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(content) if content.trim().is_empty() => Ok(BTreeMap::new()),
            Ok(content) => {
                let entries: BTreeMap<String, String> = serde_json::from_str(&content)
                    .map_err(|e| AppError::StorageBackend {
                        message: format!("Corrupt store file {}: {e}", self.path.display()),
                    })?;
                debug!(path = %self.path.display(), entries = entries.len(), "Loaded store file");
                Ok(entries)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %self.path.display(), "Store file not found, starting empty");
                Ok(BTreeMap::new())
            }
            Err(e) => Err(AppError::io("read_store", &e)),
        }
    }

    async fn write_to_disk(&self, entries: &BTreeMap<String, String>) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| AppError::io("create_store_dir", &e))?;
        }
        let content = serde_json::to_string_pretty(entries)?;
        let tmp_path = self.path.with_extension("tmp");
        tokio::fs::write(&tmp_path, content)
            .await
            .map_err(|e| AppError::io("write_store", &e))?;
        tokio::fs::rename(&tmp_path, &self.path)
            .await
            .map_err(|e| AppError::io("rename_store", &e))?;
        trace!(path = %self.path.display(), "Store file written");
        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for FileStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut guard = self.entries.lock().await;
        if guard.is_none() {
            *guard = Some(self.read_from_disk().await?);
        }
        Ok(guard.as_ref().and_then(|entries| entries.get(key).cloned()))
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut guard = self.entries.lock().await;
        let mut entries = match guard.as_ref() {
            Some(entries) => entries.clone(),
            None => self.read_from_disk().await?,
        };
        entries.insert(key.to_string(), value.to_string());
        // The cache only moves forward once the file is on disk.
        self.write_to_disk(&entries).await?;
        *guard = Some(entries);
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "file"
    }
}
