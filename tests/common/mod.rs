//! Common test utilities and fixtures

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use gemini_key_pool::config::PoolSettings;
use gemini_key_pool::core::Clock;
use gemini_key_pool::storage::{InMemoryStore, KeyValueStore};
use gemini_key_pool::{Credential, KeyPool, RemoteCall};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

pub const NAMESPACE: &str = "animato_";

/// A well-formed 39-character key, distinct for each `n`.
pub fn key(n: usize) -> String {
    format!("AIzaSyTestKey{n:0>26}")
}

pub fn fixed_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
}

/// Clock frozen at [`fixed_time`].
pub struct FixedClock(pub DateTime<Utc>);

impl Default for FixedClock {
    fn default() -> Self {
        Self(fixed_time())
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// Pool over a fresh in-memory store, seeded with `keys(0..count)`.
pub async fn pool_with_keys(count: usize) -> (KeyPool, InMemoryStore) {
    pool_with_settings(count, PoolSettings::default()).await
}

pub async fn pool_with_settings(count: usize, settings: PoolSettings) -> (KeyPool, InMemoryStore) {
    let store = InMemoryStore::new();
    let pool = KeyPool::load(Arc::new(store.clone()), settings, NAMESPACE)
        .await
        .unwrap()
        .with_clock(Arc::new(FixedClock::default()));
    for n in 0..count {
        pool.add_credential(&key(n)).await.unwrap();
    }
    (pool, store)
}

/// Reads and parses a JSON entry from `store`.
pub async fn stored_json(store: &InMemoryStore, entry: &str) -> Option<serde_json::Value> {
    store
        .get(&format!("{NAMESPACE}{entry}"))
        .await
        .unwrap()
        .map(|blob| serde_json::from_str(&blob).unwrap())
}

/// Remote call whose answers are scripted per key.
///
/// Each key answers from its own queue; once the queue is empty it keeps
/// answering with the fallback (success unless set otherwise).
#[derive(Default)]
pub struct ScriptedRemote {
    script: Mutex<HashMap<String, VecDeque<Result<String, String>>>>,
    fallback: Mutex<HashMap<String, Result<String, String>>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedRemote {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues one answer for `key`.
    pub fn then(self, key: &str, answer: Result<&str, &str>) -> Self {
        self.script
            .lock()
            .unwrap()
            .entry(key.to_string())
            .or_default()
            .push_back(answer.map(str::to_string).map_err(str::to_string));
        self
    }

    /// Makes `key` fail with `message` on every call.
    pub fn always_fail(self, key: &str, message: &str) -> Self {
        self.fallback
            .lock()
            .unwrap()
            .insert(key.to_string(), Err(message.to_string()));
        self
    }

    /// Keys used so far, in call order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn answer(&self, key: &str) -> Result<String, String> {
        self.calls.lock().unwrap().push(key.to_string());
        if let Some(answer) = self
            .script
            .lock()
            .unwrap()
            .get_mut(key)
            .and_then(VecDeque::pop_front)
        {
            return answer;
        }
        self.fallback
            .lock()
            .unwrap()
            .get(key)
            .cloned()
            .unwrap_or_else(|| Ok(format!("ok from {key}")))
    }
}

#[async_trait]
impl RemoteCall for ScriptedRemote {
    type Request = ();
    type Response = String;

    async fn call(&self, credential: &Credential, _request: &()) -> Result<String, String> {
        self.answer(credential.expose_secret())
    }
}
