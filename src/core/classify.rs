// src/core/classify.rs

use serde::{Deserialize, Serialize};
use std::fmt;

const QUOTA_MARKERS: &[&str] = &["429", "quota", "resource has been exhausted"];
const AUTH_MARKERS: &[&str] = &["401", "403", "api key", "invalid"];

/// Failure classes driving the retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorClass {
    /// The key is fine but out of quota.
    Quota,
    /// The key was rejected.
    Auth,
    /// Anything unrelated to the key (network, malformed response, ...).
    Other,
}

impl ErrorClass {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Quota => "quota",
            Self::Auth => "auth",
            Self::Other => "other",
        }
    }

    /// Whether switching to another key can fix this failure.
    pub fn is_recoverable(self) -> bool {
        matches!(self, Self::Quota | Self::Auth)
    }
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classifies a remote failure message by case-insensitive substring match.
///
/// Quota markers are checked before auth markers, so `"429 invalid request"` is
/// a quota failure. Unrecognised messages are [`ErrorClass::Other`].
pub fn classify(message: &str) -> ErrorClass {
    let lowered = message.to_lowercase();
    if QUOTA_MARKERS.iter().any(|m| lowered.contains(m)) {
        ErrorClass::Quota
    } else if AUTH_MARKERS.iter().any(|m| lowered.contains(m)) {
        ErrorClass::Auth
    } else {
        ErrorClass::Other
    }
}
