// src/credential.rs

use crate::error::ValidationError;
use secrecy::{ExposeSecret, Secret};
use std::fmt;

/// Shape every admitted key must have.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialShape {
    pub prefix: String,
    pub length: usize,
}

impl Default for CredentialShape {
    fn default() -> Self {
        Self {
            prefix: "AIza".to_string(),
            length: 39,
        }
    }
}

impl CredentialShape {
    /// Checks emptiness, prefix and length, in that order.
    ///
    /// Emptiness is judged on the trimmed value; prefix and length on the raw one.
    pub fn check(&self, raw: &str) -> Result<(), ValidationError> {
        if raw.trim().is_empty() {
            return Err(ValidationError::Empty);
        }
        if !raw.starts_with(&self.prefix) {
            return Err(ValidationError::MissingPrefix {
                prefix: self.prefix.clone(),
            });
        }
        let actual = raw.chars().count();
        if actual != self.length {
            return Err(ValidationError::WrongLength {
                expected: self.length,
                actual,
            });
        }
        Ok(())
    }
}

/// An API key. The value is never printed; `Debug` and `Display` show a masked preview.
#[derive(Clone)]
pub struct Credential(Secret<String>);

impl Credential {
    pub fn new(value: impl Into<String>) -> Self {
        Self(Secret::new(value.into()))
    }

    pub fn expose_secret(&self) -> &str {
        self.0.expose_secret()
    }

    /// First and last four characters, e.g. `AIza...wxyz`.
    pub fn preview(&self) -> String {
        preview_key(self.expose_secret())
    }
}

impl PartialEq for Credential {
    fn eq(&self, other: &Self) -> bool {
        self.expose_secret() == other.expose_secret()
    }
}

impl Eq for Credential {}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Credential").field(&self.preview()).finish()
    }
}

impl fmt::Display for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.preview())
    }
}

impl From<String> for Credential {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl From<&str> for Credential {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Masks a raw key for logs.
pub fn preview_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() > 8 {
        let head: String = chars[..4].iter().collect();
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("{head}...{tail}")
    } else {
        "****".to_string()
    }
}
