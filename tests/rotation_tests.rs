// tests/rotation_tests.rs

mod common;

use common::{fixed_time, key, pool_with_keys, FixedClock, ScriptedRemote, NAMESPACE};
use gemini_key_pool::config::PoolSettings;
use gemini_key_pool::core::ErrorClass;
use gemini_key_pool::storage::InMemoryStore;
use gemini_key_pool::{InvokeError, KeyPool};
use proptest::prelude::*;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

const QUOTA: &str = "429 Too Many Requests: Resource has been exhausted";
const AUTH: &str = "403 Forbidden: API key not valid";
const OTHER: &str = "500 Internal Server Error";

/// Pool whose stored health starts with the given consecutive failure counts.
async fn pool_with_failures(failures: &[u32]) -> KeyPool {
    let keys: Vec<String> = (0..failures.len()).map(key).collect();
    let health: serde_json::Map<String, serde_json::Value> = keys
        .iter()
        .zip(failures)
        .map(|(k, f)| (k.clone(), serde_json::json!({ "failures": f, "totalCalls": f })))
        .collect();
    let store = InMemoryStore::with_entries([
        (format!("{NAMESPACE}keys"), serde_json::to_string(&keys).unwrap()),
        (
            format!("{NAMESPACE}key_health"),
            serde_json::Value::Object(health).to_string(),
        ),
    ]);
    KeyPool::load(Arc::new(store), PoolSettings::default(), NAMESPACE)
        .await
        .unwrap()
        .with_clock(Arc::new(FixedClock::default()))
}

#[tokio::test]
async fn test_success_on_preferred_key() {
    let (pool, _store) = pool_with_keys(3).await;
    let remote = ScriptedRemote::new();

    let answer = pool.invoke_remote(&remote, &()).await.unwrap();

    assert_eq!(answer, format!("ok from {}", key(0)));
    assert_eq!(remote.calls(), vec![key(0)]);
    let health = pool.health(&key(0)).await;
    assert_eq!(health.consecutive_failures, 0);
    assert_eq!(health.total_calls, 1);
    assert_eq!(health.last_used_at, Some(fixed_time()));
    assert_eq!(pool.preferred_index().await, Some(0));
}

#[tokio::test]
async fn test_success_clears_last_error() {
    let (pool, _store) = pool_with_keys(1).await;
    let remote = ScriptedRemote::new().then(&key(0), Err(OTHER));

    let _ = pool.invoke_remote(&remote, &()).await;
    assert_eq!(pool.health(&key(0)).await.last_error.as_deref(), Some(OTHER));
    pool.invoke_remote(&remote, &()).await.unwrap();

    let health = pool.health(&key(0)).await;
    assert_eq!(health.last_error, None);
    assert_eq!(health.consecutive_failures, 0);
    assert_eq!(health.total_calls, 2);
}

#[tokio::test(start_paused = true)]
async fn test_quota_failure_rotates_and_sticks() {
    let (pool, _store) = pool_with_keys(3).await;
    let remote = ScriptedRemote::new().then(&key(0), Err(QUOTA));

    let answer = pool.invoke_remote(&remote, &()).await.unwrap();

    assert_eq!(answer, format!("ok from {}", key(1)));
    assert_eq!(remote.calls(), vec![key(0), key(1)]);
    assert_eq!(pool.preferred_index().await, Some(1));
    let failed = pool.health(&key(0)).await;
    assert_eq!(failed.consecutive_failures, 1);
    assert_eq!(failed.last_error.as_deref(), Some(QUOTA));

    // The next call starts on the key that worked.
    pool.invoke_remote(&remote, &()).await.unwrap();
    assert_eq!(remote.calls(), vec![key(0), key(1), key(1)]);
}

#[tokio::test(start_paused = true)]
async fn test_quota_then_auth_then_success() {
    let (pool, _store) = pool_with_keys(3).await;
    let remote = ScriptedRemote::new()
        .then(&key(0), Err(QUOTA))
        .then(&key(1), Err(AUTH));

    let answer = pool.invoke_remote(&remote, &()).await.unwrap();

    assert_eq!(answer, format!("ok from {}", key(2)));
    assert_eq!(remote.calls(), vec![key(0), key(1), key(2)]);
    assert_eq!(pool.preferred_index().await, Some(2));
    assert_eq!(pool.health(&key(0)).await.consecutive_failures, 1);
    assert_eq!(pool.health(&key(1)).await.consecutive_failures, 1);
    assert_eq!(pool.health(&key(2)).await.total_calls, 1);
}

#[tokio::test(start_paused = true)]
async fn test_every_key_tried_once_when_all_exhausted() {
    let (pool, _store) = pool_with_keys(3).await;
    let remote = ScriptedRemote::new()
        .always_fail(&key(0), QUOTA)
        .always_fail(&key(1), QUOTA)
        .always_fail(&key(2), QUOTA);

    let err = pool.invoke_remote(&remote, &()).await.unwrap_err();

    assert_eq!(remote.calls(), vec![key(0), key(1), key(2)]);
    assert!(err.is_exhausted());
    assert_eq!(err.attempts(), 3);
    assert_eq!(err.class(), Some(ErrorClass::Quota));
    assert_eq!(err.last_message(), Some(QUOTA));
    assert_eq!(
        err.user_message(3),
        "Quota exhausted on all keys. Add a new API key or try again later."
    );
    for n in 0..3 {
        assert_eq!(pool.health(&key(n)).await.consecutive_failures, 1);
    }
}

#[tokio::test(start_paused = true)]
async fn test_auth_failures_exhaust_with_auth_class() {
    let (pool, _store) = pool_with_keys(2).await;
    let remote = ScriptedRemote::new()
        .always_fail(&key(0), AUTH)
        .always_fail(&key(1), AUTH);

    let err = pool.invoke_remote(&remote, &()).await.unwrap_err();

    assert_eq!(err.attempts(), 2);
    assert_eq!(err.class(), Some(ErrorClass::Auth));
    assert_eq!(
        err.user_message(2),
        "API key rejected on all keys. Check your keys in the settings."
    );
}

#[tokio::test]
async fn test_single_key_quota_failure() {
    let (pool, _store) = pool_with_keys(1).await;
    let remote = ScriptedRemote::new().always_fail(&key(0), QUOTA);
    let started = Instant::now();

    let err = pool.invoke_remote(&remote, &()).await.unwrap_err();

    assert!(err.is_exhausted());
    assert_eq!(err.attempts(), 1);
    assert!(started.elapsed() < Duration::from_millis(500));
    assert_eq!(
        err.user_message(1),
        "Quota exhausted on the key. Add a new API key or try again later."
    );
}

#[tokio::test]
async fn test_other_failure_stops_without_rotation() {
    let (pool, _store) = pool_with_keys(3).await;
    let remote = ScriptedRemote::new().then(&key(0), Err(OTHER));

    let err = pool.invoke_remote(&remote, &()).await.unwrap_err();

    assert!(matches!(
        err,
        InvokeError::NonRecoverable {
            class: ErrorClass::Other,
            attempts: 1,
            ..
        }
    ));
    assert_eq!(remote.calls(), vec![key(0)]);
    assert_eq!(pool.preferred_index().await, Some(0));
    assert_eq!(pool.health(&key(0)).await.consecutive_failures, 1);
    assert_eq!(err.user_message(3), format!("Error: {OTHER}"));
}

#[tokio::test(start_paused = true)]
async fn test_other_failure_after_rotation_stops() {
    let (pool, _store) = pool_with_keys(3).await;
    let remote = ScriptedRemote::new()
        .then(&key(0), Err(QUOTA))
        .then(&key(1), Err(OTHER));

    let err = pool.invoke_remote(&remote, &()).await.unwrap_err();

    assert_eq!(err.attempts(), 2);
    assert_eq!(err.class(), Some(ErrorClass::Other));
    assert_eq!(remote.calls(), vec![key(0), key(1)]);
    assert_eq!(pool.preferred_index().await, Some(1));
}

#[tokio::test]
async fn test_empty_pool_makes_no_attempt() {
    let (pool, _store) = pool_with_keys(0).await;
    let remote = ScriptedRemote::new();

    let err = pool.invoke_remote(&remote, &()).await.unwrap_err();

    assert_eq!(err, InvokeError::NoCredentials);
    assert!(remote.calls().is_empty());
    assert_eq!(
        err.user_message(0),
        "No API key configured. Add at least one API key before generating."
    );
}

#[tokio::test(start_paused = true)]
async fn test_rotation_skips_unhealthy_keys() {
    let pool = pool_with_failures(&[0, 3, 0]).await;
    let remote = ScriptedRemote::new().then(&key(0), Err(QUOTA));

    pool.invoke_remote(&remote, &()).await.unwrap();

    assert_eq!(remote.calls(), vec![key(0), key(2)]);
    assert_eq!(pool.preferred_index().await, Some(2));
}

/// Fresh pool over `store`, preferring key 0 again.
async fn reload(store: &InMemoryStore) -> KeyPool {
    KeyPool::load(Arc::new(store.clone()), PoolSettings::default(), NAMESPACE)
        .await
        .unwrap()
}

#[tokio::test(start_paused = true)]
async fn test_reset_key_is_a_rotation_target_again() {
    let (_pool, store) = pool_with_keys(3).await;
    // Key 1 keeps rejecting; every reloaded pool starts again at key 0.
    let rejecting = ScriptedRemote::new()
        .always_fail(&key(0), QUOTA)
        .always_fail(&key(1), AUTH);
    for _ in 0..3 {
        reload(&store).await.invoke_remote(&rejecting, &()).await.unwrap();
    }

    let pool = reload(&store).await;
    assert_eq!(pool.health(&key(1)).await.consecutive_failures, 3);
    pool.reset_health(&key(1)).await.unwrap();
    let remote = ScriptedRemote::new().then(&key(0), Err(QUOTA));

    pool.invoke_remote(&remote, &()).await.unwrap();

    assert_eq!(remote.calls(), vec![key(0), key(1)]);
    assert_eq!(pool.preferred_index().await, Some(1));
}

#[tokio::test(start_paused = true)]
async fn test_rotation_moves_forward_when_all_unhealthy() {
    let pool = pool_with_failures(&[3, 3, 3]).await;
    let remote = ScriptedRemote::new().then(&key(0), Err(QUOTA));

    pool.invoke_remote(&remote, &()).await.unwrap();

    assert_eq!(remote.calls(), vec![key(0), key(1)]);
    assert_eq!(pool.health(&key(1)).await.consecutive_failures, 0);
}

#[tokio::test(start_paused = true)]
async fn test_degraded_pool_can_retry_the_same_key() {
    // Key 0 stays the only key below the threshold, so each rotation lands on it again.
    let pool = pool_with_failures(&[0, 5, 5]).await;
    let remote = ScriptedRemote::new().always_fail(&key(0), QUOTA);

    let err = pool.invoke_remote(&remote, &()).await.unwrap_err();

    assert_eq!(remote.calls(), vec![key(0), key(0), key(0)]);
    assert_eq!(err.attempts(), 3);
    assert_eq!(pool.health(&key(0)).await.consecutive_failures, 3);
}

#[tokio::test(start_paused = true)]
async fn test_rotation_waits_between_attempts() {
    let (pool, _store) = pool_with_keys(3).await;
    let remote = ScriptedRemote::new()
        .then(&key(0), Err(QUOTA))
        .then(&key(1), Err(QUOTA));
    let started = Instant::now();

    pool.invoke_remote(&remote, &()).await.unwrap();

    assert!(started.elapsed() >= Duration::from_millis(1000));
}

#[tokio::test(start_paused = true)]
async fn test_cancel_during_rotation_delay() {
    let (pool, _store) = pool_with_keys(3).await;
    let cancel = CancellationToken::new();
    let remote = ScriptedRemote::new().always_fail(&key(0), QUOTA);

    let err = pool
        .invoke_with_cancel(&cancel, |credential| {
            let answer = remote.answer(credential.expose_secret());
            cancel.cancel();
            async move { answer }
        })
        .await
        .unwrap_err();

    assert_eq!(
        err,
        InvokeError::Cancelled {
            attempts: 1,
            last_message: Some(QUOTA.to_string()),
        }
    );
    assert_eq!(remote.calls(), vec![key(0)]);
    assert_eq!(err.user_message(3), "Generation cancelled.");
    // The failure is still on record and the pool already moved on.
    assert_eq!(pool.health(&key(0)).await.consecutive_failures, 1);
    assert_eq!(pool.preferred_index().await, Some(1));
}

#[tokio::test]
async fn test_cancelled_before_start() {
    let (pool, _store) = pool_with_keys(2).await;
    let cancel = CancellationToken::new();
    cancel.cancel();
    let remote = ScriptedRemote::new();

    let err = pool
        .invoke_with_cancel(&cancel, |credential| {
            let answer = remote.answer(credential.expose_secret());
            async move { answer }
        })
        .await
        .unwrap_err();

    assert_eq!(err.attempts(), 0);
    assert!(remote.calls().is_empty());
}

#[tokio::test]
async fn test_concurrent_calls_record_every_outcome() {
    let (pool, _store) = pool_with_keys(2).await;
    let remote = ScriptedRemote::new();

    let (a, b, c) = tokio::join!(
        pool.invoke_remote(&remote, &()),
        pool.invoke_remote(&remote, &()),
        pool.invoke_remote(&remote, &()),
    );

    assert!(a.is_ok() && b.is_ok() && c.is_ok());
    assert_eq!(pool.health(&key(0)).await.total_calls, 3);
}

proptest! {
    #[test]
    fn prop_never_more_attempts_than_keys(
        answers in prop::collection::vec(0u8..4, 1..6),
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .start_paused(true)
            .build()
            .unwrap();
        runtime.block_on(async {
            let (pool, _store) = pool_with_keys(answers.len()).await;
            let mut remote = ScriptedRemote::new();
            for (n, answer) in answers.iter().enumerate() {
                remote = match answer {
                    0 => remote,
                    1 => remote.always_fail(&key(n), QUOTA),
                    2 => remote.always_fail(&key(n), AUTH),
                    _ => remote.always_fail(&key(n), OTHER),
                };
            }

            let outcome = pool.invoke_remote(&remote, &()).await;

            let calls = remote.calls();
            prop_assert!(!calls.is_empty());
            prop_assert!(calls.len() <= answers.len());
            if let Err(err) = outcome {
                prop_assert_eq!(err.attempts(), calls.len());
            }
            Ok(())
        })?;
    }
}
