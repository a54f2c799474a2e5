//! Pool counters exported through the `metrics` facade.
//!
//! Without the `metrics` feature these functions compile to nothing. Installing
//! a recorder (Prometheus or otherwise) is left to the embedding application.

use crate::core::ErrorClass;

#[cfg(feature = "metrics")]
pub fn record_attempt(failure: Option<ErrorClass>) {
    let outcome = failure.map_or("success", ErrorClass::as_str);
    ::metrics::counter!("gemini_key_pool_attempts_total", "outcome" => outcome).increment(1);
}

#[cfg(feature = "metrics")]
pub fn record_rotation(class: ErrorClass) {
    ::metrics::counter!("gemini_key_pool_rotations_total", "class" => class.as_str()).increment(1);
}

#[cfg(feature = "metrics")]
pub fn set_pool_size(size: usize) {
    ::metrics::gauge!("gemini_key_pool_keys").set(size as f64);
}

#[cfg(not(feature = "metrics"))]
pub fn record_attempt(_failure: Option<ErrorClass>) {}

#[cfg(not(feature = "metrics"))]
pub fn record_rotation(_class: ErrorClass) {}

#[cfg(not(feature = "metrics"))]
pub fn set_pool_size(_size: usize) {}
