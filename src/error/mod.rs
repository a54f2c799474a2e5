//! Error handling for the credential pool
//!
//! Three layers of errors live here:
//! - [`ValidationError`]: a credential was rejected at admission time
//! - [`InvokeError`]: a logical call through the pool ended in failure
//! - [`AppError`]: everything else (configuration, storage, HTTP, caller mistakes)

pub mod types;

use crate::core::ErrorClass;
use thiserror::Error;
use tracing::{error, warn};

/// Reason a credential was refused by `KeyPool::add_credential`.
///
/// Checks run in a fixed order and the first failing one is reported.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("API key must not be empty")]
    Empty,

    #[error("API key format is invalid (must start with '{prefix}')")]
    MissingPrefix { prefix: String },

    #[error("API key must be exactly {expected} characters long (got {actual})")]
    WrongLength { expected: usize, actual: usize },

    #[error("API key has already been added")]
    Duplicate,

    #[error("key pool is full (maximum {max} keys)")]
    PoolFull { max: usize },
}

/// Terminal outcome of a failed `KeyPool::invoke` call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InvokeError {
    /// The pool is empty; no attempt was made.
    #[error("no API keys configured")]
    NoCredentials,

    /// Every attempt failed with a quota or auth error and the rotation budget ran out.
    #[error("{class} failure after trying {attempts} key(s): {message}")]
    Exhausted {
        class: ErrorClass,
        message: String,
        attempts: usize,
    },

    /// The last attempt failed with an error that rotating keys cannot fix.
    #[error("non-recoverable {class} failure on attempt {attempts}: {message}")]
    NonRecoverable {
        class: ErrorClass,
        message: String,
        attempts: usize,
    },

    /// The caller cancelled the call while it was waiting to rotate.
    #[error("call cancelled after {attempts} attempt(s)")]
    Cancelled {
        attempts: usize,
        last_message: Option<String>,
    },
}

impl InvokeError {
    /// Class of the last underlying failure, if an attempt was made.
    pub fn class(&self) -> Option<ErrorClass> {
        match self {
            Self::Exhausted { class, .. } | Self::NonRecoverable { class, .. } => Some(*class),
            Self::NoCredentials | Self::Cancelled { .. } => None,
        }
    }

    /// Last failure message returned by the remote call.
    pub fn last_message(&self) -> Option<&str> {
        match self {
            Self::Exhausted { message, .. } | Self::NonRecoverable { message, .. } => {
                Some(message)
            }
            Self::Cancelled { last_message, .. } => last_message.as_deref(),
            Self::NoCredentials => None,
        }
    }

    /// Number of remote attempts made before giving up.
    pub fn attempts(&self) -> usize {
        match self {
            Self::NoCredentials => 0,
            Self::Exhausted { attempts, .. }
            | Self::NonRecoverable { attempts, .. }
            | Self::Cancelled { attempts, .. } => *attempts,
        }
    }

    /// True when every key in the pool was tried before giving up.
    pub fn is_exhausted(&self) -> bool {
        matches!(self, Self::Exhausted { .. })
    }

    /// Message suitable for showing to the person who configured the pool.
    pub fn user_message(&self, pool_size: usize) -> String {
        let scope = if pool_size > 1 { "all keys" } else { "the key" };
        match self {
            Self::NoCredentials => {
                "No API key configured. Add at least one API key before generating.".to_string()
            }
            Self::Exhausted {
                class: ErrorClass::Quota,
                ..
            } => format!("Quota exhausted on {scope}. Add a new API key or try again later."),
            Self::Exhausted {
                class: ErrorClass::Auth,
                ..
            } => format!("API key rejected on {scope}. Check your keys in the settings."),
            Self::Cancelled { .. } => "Generation cancelled.".to_string(),
            Self::Exhausted { message, .. } | Self::NonRecoverable { message, .. } => {
                format!("Error: {message}")
            }
        }
    }
}

/// Main application error type
#[derive(Error, Debug)]
pub enum AppError {
    // Caller mistakes
    #[error("Invalid API key: {0}")]
    InvalidCredential(#[from] ValidationError),

    #[error("Key index {index} out of range (pool has {len} keys)")]
    CredentialIndexOutOfRange { index: usize, len: usize },

    #[error("API key {preview} is not in the pool")]
    UnknownCredential { preview: String },

    // Configuration errors
    #[error("Configuration validation failed: {message}")]
    ConfigValidation {
        message: String,
        field: Option<String>,
    },

    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: String },

    #[error("Configuration parse error: {message}")]
    ConfigParse {
        message: String,
        line: Option<usize>,
    },

    // Storage errors
    #[error("Storage backend error: {message}")]
    StorageBackend { message: String },

    #[error("Redis connection failed: {message}")]
    RedisConnection { message: String },

    #[error("Redis operation failed: {operation} - {message}")]
    RedisOperation { operation: String, message: String },

    // HTTP errors
    #[error("HTTP client error: {message}")]
    HttpClient {
        message: String,
        status_code: Option<u16>,
    },

    // System errors
    #[error("Serialization error: {message}")]
    Serialization { message: String },

    #[error("IO operation failed: {operation} - {message}")]
    Io { operation: String, message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl AppError {
    /// Create a new configuration validation error
    pub fn config_validation(message: impl Into<String>, field: Option<impl Into<String>>) -> Self {
        Self::ConfigValidation {
            message: message.into(),
            field: field.map(Into::into),
        }
    }

    /// Create a new internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Create a new IO error tagged with the operation that failed
    pub fn io(operation: impl Into<String>, err: &std::io::Error) -> Self {
        Self::Io {
            operation: operation.into(),
            message: err.to_string(),
        }
    }

    /// Short machine-readable category, used as a log field
    pub fn category(&self) -> &'static str {
        match self {
            Self::InvalidCredential(_)
            | Self::CredentialIndexOutOfRange { .. }
            | Self::UnknownCredential { .. } => "key-management",
            Self::ConfigValidation { .. } | Self::ConfigNotFound { .. } | Self::ConfigParse { .. } => {
                "configuration"
            }
            Self::StorageBackend { .. }
            | Self::RedisConnection { .. }
            | Self::RedisOperation { .. } => "storage",
            Self::HttpClient { .. } => "network",
            Self::Serialization { .. } | Self::Io { .. } | Self::Internal { .. } => "internal",
        }
    }

    /// True for errors caused by the caller's input rather than the environment
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidCredential(_)
                | Self::CredentialIndexOutOfRange { .. }
                | Self::UnknownCredential { .. }
                | Self::ConfigValidation { .. }
                | Self::ConfigParse { .. }
        )
    }

    /// Log the error with appropriate level
    pub fn log(&self) {
        if self.is_client_error() {
            warn!(
                error = %self,
                error_type = self.category(),
                "Rejected operation"
            );
        } else {
            error!(
                error = %self,
                error_type = self.category(),
                "Application error occurred"
            );
        }
    }
}

/// Result type alias for the application
pub type Result<T, E = AppError> = std::result::Result<T, E>;
