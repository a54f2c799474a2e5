// src/storage/key_state.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Rolling health statistics for a single API key.
///
/// Field names on the wire match the blobs written by the browser client,
/// so a persisted `key_health` map can be loaded unchanged.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Eq, Default)]
pub struct HealthRecord {
    #[serde(rename = "failures", default)]
    pub consecutive_failures: u32,
    #[serde(rename = "totalCalls", default)]
    pub total_calls: u64,
    #[serde(rename = "lastUsed", default)]
    pub last_used_at: Option<DateTime<Utc>>,
    #[serde(rename = "lastError", default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl HealthRecord {
    /// Record a successful call
    pub fn record_success(&mut self, at: DateTime<Utc>) {
        self.consecutive_failures = 0;
        self.total_calls += 1;
        self.last_used_at = Some(at);
        self.last_error = None;
    }

    /// Record a failed call
    pub fn record_failure(&mut self, message: impl Into<String>, at: DateTime<Utc>) {
        self.consecutive_failures += 1;
        self.total_calls += 1;
        self.last_used_at = Some(at);
        self.last_error = Some(message.into());
    }

    /// Reset the record to its zero value, usage counter included
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Check whether the key is below the given failure threshold
    pub fn is_healthy(&self, threshold: u32) -> bool {
        self.consecutive_failures < threshold
    }

    /// Badge for display; an unused key is reported as such before anything else
    pub fn status(&self, threshold: u32) -> KeyStatus {
        match self.consecutive_failures {
            _ if self.total_calls == 0 => KeyStatus::Unused,
            0 => KeyStatus::Healthy,
            failures if failures >= threshold => KeyStatus::Unhealthy { failures },
            failures => KeyStatus::Degraded { failures },
        }
    }
}

/// Display state of a key, derived from its record.
#[derive(Clone, Copy, Serialize, Debug, PartialEq, Eq)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum KeyStatus {
    /// Never called.
    Unused,
    Healthy,
    /// Failing, but still below the unhealthy threshold.
    Degraded { failures: u32 },
    Unhealthy { failures: u32 },
}

impl KeyStatus {
    pub fn label(&self) -> String {
        match self {
            Self::Unused => "unused".to_string(),
            Self::Healthy => "healthy".to_string(),
            Self::Degraded { failures: 1 } => "1 failure".to_string(),
            Self::Degraded { failures } => format!("{failures} failures"),
            Self::Unhealthy { .. } => "unhealthy".to_string(),
        }
    }
}

impl std::fmt::Display for KeyStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.label())
    }
}

/// Health records keyed by the raw key value.
#[derive(Clone, Serialize, Deserialize, Debug, Default, PartialEq, Eq)]
#[serde(transparent)]
pub struct HealthMap(HashMap<String, HealthRecord>);

impl HealthMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the record for `key`, or the zero record if it was never used.
    pub fn get_or_default(&self, key: &str) -> HealthRecord {
        self.0.get(key).cloned().unwrap_or_default()
    }

    /// Returns the record for `key`, materializing a zero record first.
    pub fn entry_or_default(&mut self, key: &str) -> &mut HealthRecord {
        self.0.entry(key.to_string()).or_default()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<HealthRecord> {
        self.0.remove(key)
    }

    /// Drops records whose key is not accepted by `keep`; returns how many were dropped.
    pub fn retain_keys(&mut self, mut keep: impl FnMut(&str) -> bool) -> usize {
        let before = self.0.len();
        self.0.retain(|key, _| keep(key));
        before - self.0.len()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
