//! Conversions from library errors into [`AppError`]

use super::AppError;

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::io("io_operation", &err)
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization {
            message: err.to_string(),
        }
    }
}

impl From<serde_yaml::Error> for AppError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::ConfigParse {
            message: err.to_string(),
            line: err.location().map(|loc| loc.line()),
        }
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        let status_code = err.status().map(|s| s.as_u16());
        Self::HttpClient {
            message: err.to_string(),
            status_code,
        }
    }
}

impl From<url::ParseError> for AppError {
    fn from(err: url::ParseError) -> Self {
        Self::config_validation(format!("Invalid URL: {err}"), None::<String>)
    }
}

#[cfg(feature = "redis")]
impl From<redis::RedisError> for AppError {
    fn from(err: redis::RedisError) -> Self {
        if err.is_connection_dropped() || err.is_connection_refusal() {
            Self::RedisConnection {
                message: err.to_string(),
            }
        } else {
            Self::RedisOperation {
                operation: "redis_operation".to_string(),
                message: err.to_string(),
            }
        }
    }
}

#[cfg(feature = "redis")]
impl From<deadpool_redis::PoolError> for AppError {
    fn from(err: deadpool_redis::PoolError) -> Self {
        Self::RedisConnection {
            message: err.to_string(),
        }
    }
}

#[cfg(feature = "redis")]
impl From<deadpool_redis::CreatePoolError> for AppError {
    fn from(err: deadpool_redis::CreatePoolError) -> Self {
        Self::RedisConnection {
            message: format!("Failed to create Redis pool: {err}"),
        }
    }
}
