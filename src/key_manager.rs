// src/key_manager.rs

use crate::config::PoolSettings;
use crate::core::{classify, next_healthy, next_step, Clock, FailureKind, RetryStep, SystemClock};
use crate::credential::{preview_key, Credential};
use crate::error::{AppError, InvokeError, Result, ValidationError};
use crate::gemini::RemoteCall;
use crate::storage::{HealthMap, HealthRecord, KeyStatus, KeyValueStore};
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

const KEYS_ENTRY: &str = "keys";
const HEALTH_ENTRY: &str = "key_health";

/// Display view of one pool position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CredentialStatus {
    pub index: usize,
    pub preview: String,
    pub health: HealthRecord,
    pub is_preferred: bool,
    pub is_healthy: bool,
    pub status: KeyStatus,
}

struct PoolState {
    credentials: Vec<Credential>,
    health: HealthMap,
    preferred_index: usize,
}

impl PoolState {
    fn position(&self, raw: &str) -> Option<usize> {
        self.credentials.iter().position(|c| c.expose_secret() == raw)
    }

    fn wrapped_preferred(&self) -> Option<usize> {
        match self.credentials.len() {
            0 => None,
            len => Some(self.preferred_index % len),
        }
    }

    /// Applies `update` to the key's record unless the key has left the pool.
    fn record(&mut self, credential: &Credential, update: impl FnOnce(&mut HealthRecord)) -> bool {
        let key = credential.expose_secret();
        if self.position(key).is_none() {
            return false;
        }
        update(self.health.entry_or_default(key));
        true
    }
}

/// Holds the user's API keys, tracks their health and rotates between them.
///
/// One instance owns the pool for the whole process. All state changes go
/// through a single mutex and are written back to the store right away.
pub struct KeyPool {
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    settings: PoolSettings,
    keys_entry: String,
    health_entry: String,
    state: Mutex<PoolState>,
}

impl KeyPool {
    /// Loads the key list and health map from `store`.
    ///
    /// `namespace` is prepended to the two entry names (`keys`, `key_health`).
    #[instrument(skip(store, settings), name = "key_pool_load")]
    pub async fn load(
        store: Arc<dyn KeyValueStore>,
        settings: PoolSettings,
        namespace: &str,
    ) -> Result<Self> {
        let keys_entry = format!("{namespace}{KEYS_ENTRY}");
        let health_entry = format!("{namespace}{HEALTH_ENTRY}");

        let stored_keys: Vec<String> = match store.get(&keys_entry).await? {
            Some(blob) => serde_json::from_str(&blob)?,
            None => Vec::new(),
        };
        let mut health: HealthMap = match store.get(&health_entry).await? {
            Some(blob) => serde_json::from_str(&blob)?,
            None => HealthMap::new(),
        };

        let mut credentials: Vec<Credential> = Vec::with_capacity(stored_keys.len());
        for key in stored_keys {
            if credentials.iter().any(|c| c.expose_secret() == key) {
                warn!(api_key.preview = %preview_key(&key), "Dropping duplicate key from store");
                continue;
            }
            credentials.push(Credential::new(key));
        }

        let orphans =
            health.retain_keys(|key| credentials.iter().any(|c| c.expose_secret() == key));
        if orphans > 0 {
            debug!(orphans, "Dropped health records of keys no longer in the pool");
        }

        info!(
            backend = store.backend_name(),
            keys = credentials.len(),
            "Key pool loaded"
        );
        crate::metrics::set_pool_size(credentials.len());

        Ok(Self {
            store,
            clock: Arc::new(SystemClock),
            settings,
            keys_entry,
            health_entry,
            state: Mutex::new(PoolState {
                credentials,
                health,
                preferred_index: 0,
            }),
        })
    }

    /// Replaces the clock used to stamp `last_used_at`.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn settings(&self) -> &PoolSettings {
        &self.settings
    }

    /// Validates `raw` and appends it to the pool.
    ///
    /// Checks, first failure wins: non-empty, prefix, length, not a duplicate,
    /// pool below its maximum size.
    #[instrument(skip(self, raw), fields(api_key.preview = %preview_key(raw)))]
    pub async fn add_credential(&self, raw: &str) -> Result<()> {
        let mut state = self.state.lock().await;

        self.settings.shape().check(raw)?;
        if state.position(raw).is_some() {
            return Err(ValidationError::Duplicate.into());
        }
        if state.credentials.len() >= self.settings.max_keys {
            return Err(ValidationError::PoolFull {
                max: self.settings.max_keys,
            }
            .into());
        }

        state.credentials.push(Credential::new(raw));
        self.persist_keys(&state).await?;

        info!(pool_size = state.credentials.len(), "API key added");
        crate::metrics::set_pool_size(state.credentials.len());
        Ok(())
    }

    /// Removes the key at `index` together with its health record.
    ///
    /// The preferred index is left alone and wrapped on the next call.
    #[instrument(skip(self))]
    pub async fn remove_credential(&self, index: usize) -> Result<Credential> {
        let mut state = self.state.lock().await;
        let len = state.credentials.len();
        if index >= len {
            return Err(AppError::CredentialIndexOutOfRange { index, len });
        }

        let removed = state.credentials.remove(index);
        state.health.remove(removed.expose_secret());
        self.persist_keys(&state).await?;
        self.persist_health(&state).await?;

        info!(
            api_key.preview = %removed.preview(),
            pool_size = state.credentials.len(),
            "API key removed"
        );
        crate::metrics::set_pool_size(state.credentials.len());
        Ok(removed)
    }

    /// Zeroes the health record of `raw`, usage counter included. Idempotent.
    #[instrument(skip(self, raw), fields(api_key.preview = %preview_key(raw)))]
    pub async fn reset_health(&self, raw: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        if state.position(raw).is_none() {
            return Err(AppError::UnknownCredential {
                preview: preview_key(raw),
            });
        }

        state.health.entry_or_default(raw).reset();
        self.persist_health(&state).await?;

        info!("API key health reset");
        Ok(())
    }

    /// Same as [`reset_health`](Self::reset_health), addressing the key by position.
    pub async fn reset_health_at(&self, index: usize) -> Result<()> {
        let raw = {
            let state = self.state.lock().await;
            let len = state.credentials.len();
            state
                .credentials
                .get(index)
                .map(|c| c.expose_secret().to_string())
                .ok_or(AppError::CredentialIndexOutOfRange { index, len })?
        };
        self.reset_health(&raw).await
    }

    pub async fn len(&self) -> usize {
        self.state.lock().await.credentials.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.state.lock().await.credentials.is_empty()
    }

    /// Position tried first by the next call, or `None` for an empty pool.
    pub async fn preferred_index(&self) -> Option<usize> {
        self.state.lock().await.wrapped_preferred()
    }

    /// Masked previews of the keys, in pool order.
    pub async fn credentials(&self) -> Vec<String> {
        let state = self.state.lock().await;
        state.credentials.iter().map(Credential::preview).collect()
    }

    /// Health of `raw`; keys that were never used report the zero record.
    pub async fn health(&self, raw: &str) -> HealthRecord {
        self.state.lock().await.health.get_or_default(raw)
    }

    /// Per-position view of the pool for display.
    pub async fn snapshot(&self) -> Vec<CredentialStatus> {
        let state = self.state.lock().await;
        let preferred = state.wrapped_preferred();
        state
            .credentials
            .iter()
            .enumerate()
            .map(|(index, credential)| {
                let health = state.health.get_or_default(credential.expose_secret());
                let threshold = self.settings.unhealthy_threshold;
                CredentialStatus {
                    index,
                    preview: credential.preview(),
                    is_healthy: health.is_healthy(threshold),
                    status: health.status(threshold),
                    is_preferred: preferred == Some(index),
                    health,
                }
            })
            .collect()
    }

    /// Runs `operation` with the preferred key, rotating on quota and auth failures.
    ///
    /// `operation` receives the key to use and returns either a value or the
    /// remote failure message. A call makes at most as many attempts as there
    /// are keys in the pool; a degraded pool may retry the same key.
    pub async fn invoke<T, F, Fut>(&self, operation: F) -> std::result::Result<T, InvokeError>
    where
        F: FnMut(Credential) -> Fut,
        Fut: Future<Output = std::result::Result<T, String>>,
    {
        self.invoke_with_cancel(&CancellationToken::new(), operation)
            .await
    }

    /// [`invoke`](Self::invoke) that gives up when `cancel` fires during the pause
    /// between a failed attempt and the rotated retry.
    pub async fn invoke_with_cancel<T, F, Fut>(
        &self,
        cancel: &CancellationToken,
        mut operation: F,
    ) -> std::result::Result<T, InvokeError>
    where
        F: FnMut(Credential) -> Fut,
        Fut: Future<Output = std::result::Result<T, String>>,
    {
        let (keys, mut index) = {
            let state = self.state.lock().await;
            match state.wrapped_preferred() {
                Some(index) => (state.credentials.clone(), index),
                None => {
                    warn!("Call attempted with an empty key pool");
                    return Err(InvokeError::NoCredentials);
                }
            }
        };
        if cancel.is_cancelled() {
            return Err(InvokeError::Cancelled {
                attempts: 0,
                last_message: None,
            });
        }

        let pool_size = keys.len();
        let mut rotations = 0usize;
        let mut attempts = 0usize;

        loop {
            let credential = keys[index].clone();
            attempts += 1;
            debug!(
                api_key.preview = %credential.preview(),
                index,
                attempt = attempts,
                "Attempting call with key"
            );

            let outcome = operation(credential.clone()).await;
            let now = self.clock.now();

            let message = match outcome {
                Ok(value) => {
                    let mut state = self.state.lock().await;
                    state.record(&credential, |h| h.record_success(now));
                    self.persist_health_logged(&state).await;
                    drop(state);

                    crate::metrics::record_attempt(None);
                    info!(
                        api_key.preview = %credential.preview(),
                        attempts,
                        "Call succeeded"
                    );
                    return Ok(value);
                }
                Err(message) => message,
            };

            let class = classify(&message);
            crate::metrics::record_attempt(Some(class));

            let mut state = self.state.lock().await;
            state.record(&credential, |h| h.record_failure(message.as_str(), now));

            match next_step(class, rotations, pool_size) {
                RetryStep::Stop(kind) => {
                    self.persist_health_logged(&state).await;
                    drop(state);

                    warn!(
                        api_key.preview = %credential.preview(),
                        error_class = %class,
                        attempts,
                        error = %message,
                        "Call failed, giving up"
                    );
                    return Err(match kind {
                        FailureKind::Exhausted => InvokeError::Exhausted {
                            class,
                            message,
                            attempts,
                        },
                        FailureKind::NonRecoverable => InvokeError::NonRecoverable {
                            class,
                            message,
                            attempts,
                        },
                    });
                }
                RetryStep::Rotate => {
                    let failures: Vec<u32> = keys
                        .iter()
                        .map(|k| state.health.get_or_default(k.expose_secret()).consecutive_failures)
                        .collect();
                    let next = next_healthy(index, &failures, self.settings.unhealthy_threshold)
                        .unwrap_or((index + 1) % pool_size);
                    state.preferred_index = next;
                    self.persist_health_logged(&state).await;
                    drop(state);

                    warn!(
                        from = index,
                        to = next,
                        error_class = %class,
                        attempt = attempts,
                        "Key rotation: key #{} failed, rotating to key #{}",
                        index + 1,
                        next + 1
                    );
                    crate::metrics::record_rotation(class);
                    rotations += 1;
                    index = next;

                    tokio::select! {
                        () = cancel.cancelled() => {
                            info!(attempts, "Call cancelled before rotated retry");
                            return Err(InvokeError::Cancelled {
                                attempts,
                                last_message: Some(message),
                            });
                        }
                        () = tokio::time::sleep(self.settings.rotation_delay()) => {}
                    }
                }
            }
        }
    }

    /// Sends `request` through `remote` using the pool.
    pub async fn invoke_remote<R>(
        &self,
        remote: &R,
        request: &R::Request,
    ) -> std::result::Result<R::Response, InvokeError>
    where
        R: RemoteCall + ?Sized,
    {
        self.invoke(move |credential| async move { remote.call(&credential, request).await })
            .await
    }

    async fn persist_keys(&self, state: &PoolState) -> Result<()> {
        let keys: Vec<&str> = state.credentials.iter().map(Credential::expose_secret).collect();
        let blob = serde_json::to_string(&keys)?;
        self.store.set(&self.keys_entry, &blob).await
    }

    async fn persist_health(&self, state: &PoolState) -> Result<()> {
        let blob = serde_json::to_string(&state.health)?;
        self.store.set(&self.health_entry, &blob).await
    }

    /// Health writes during a call must not change the call's outcome.
    async fn persist_health_logged(&self, state: &PoolState) {
        if let Err(e) = self.persist_health(state).await {
            warn!(error = %e, "Failed to persist key health");
        }
    }
}
