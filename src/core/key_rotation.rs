// src/core/key_rotation.rs

//! Pure rotation decisions. Nothing in here touches storage or the network, so
//! the pool can hold its lock while asking these functions what to do next.

use crate::core::ErrorClass;

/// Why a logical call stopped retrying.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Recoverable failure, but every rotation allowed for this call was used.
    Exhausted,
    /// Failure that another key would not fix.
    NonRecoverable,
}

/// Next step of the retry loop after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryStep {
    Rotate,
    Stop(FailureKind),
}

/// Decides whether to rotate after a failure of `class`.
///
/// `rotations` is the number of rotations already made during this call. A
/// pool of `pool_size` keys allows `pool_size - 1` rotations, so a call makes
/// at most `pool_size` attempts.
pub fn next_step(class: ErrorClass, rotations: usize, pool_size: usize) -> RetryStep {
    if !class.is_recoverable() {
        return RetryStep::Stop(FailureKind::NonRecoverable);
    }
    if rotations + 1 < pool_size {
        RetryStep::Rotate
    } else {
        RetryStep::Stop(FailureKind::Exhausted)
    }
}

/// Picks the position to try after `from`.
///
/// `failures[i]` is the consecutive failure count of the key at position `i`.
/// Scans forward cyclically starting at `from + 1` (wrapping back to `from`
/// last) and returns the first position below `threshold`. When every key is
/// at or above the threshold, falls back to `(from + 1) % len` so rotation
/// always moves forward. Returns `None` only for an empty pool.
pub fn next_healthy(from: usize, failures: &[u32], threshold: u32) -> Option<usize> {
    let len = failures.len();
    if len == 0 {
        return None;
    }
    let from = from % len;
    (1..=len)
        .map(|offset| (from + offset) % len)
        .find(|&idx| failures[idx] < threshold)
        .or(Some((from + 1) % len))
}
