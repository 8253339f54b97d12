//! Unified error handling for NetSentry
//!
//! Every controller converts these into non-fatal notifications; nothing in
//! this crate treats a backend failure as fatal to the session.

use thiserror::Error;

/// Main error type for NetSentry operations
#[derive(Debug, Error)]
pub enum SentryError {
    /// I/O related errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration parsing or validation errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// The bridge call itself failed (rejected promise, HTTP failure, dropped channel)
    #[error("Transport error calling '{method}': {message}")]
    Transport { method: String, message: String },

    /// A payload came back but could not be decoded
    #[error("Error parsing {context}: {message}")]
    Parse { context: String, message: String },

    /// The backend answered with `success: false`
    #[error("{method} failed: {message}")]
    Backend { method: String, message: String },

    /// Serialization/Deserialization errors outside of bridge payloads
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// User-input validation errors, shown to the user as-is
    #[error("{0}")]
    InvalidInput(String),

    /// Resource not found errors
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// A background job stopped reporting progress
    #[error("Timed out: {0}")]
    Timeout(String),

    /// No backend is attached yet
    #[error("Backend not connected yet. Please try again.")]
    NotConnected,
}

/// Convenience type alias for Results using SentryError
pub type SentryResult<T> = Result<T, SentryError>;

impl SentryError {
    /// Build a transport error for a bridge method
    pub fn transport(method: &str, message: impl std::fmt::Display) -> Self {
        SentryError::Transport {
            method: method.to_string(),
            message: message.to_string(),
        }
    }

    /// Build a parse error for a named payload
    pub fn parse(context: &str, message: impl std::fmt::Display) -> Self {
        SentryError::Parse {
            context: context.to_string(),
            message: message.to_string(),
        }
    }

    /// True when the failure happened on the wire rather than in our decoding
    pub fn is_transport(&self) -> bool {
        matches!(self, SentryError::Transport { .. })
    }

    /// True when a payload arrived but was malformed
    pub fn is_parse(&self) -> bool {
        matches!(self, SentryError::Parse { .. })
    }
}

impl From<serde_json::Error> for SentryError {
    fn from(err: serde_json::Error) -> Self {
        SentryError::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for SentryError {
    fn from(err: toml::de::Error) -> Self {
        SentryError::Config(format!("TOML parse error: {}", err))
    }
}

impl From<toml::ser::Error> for SentryError {
    fn from(err: toml::ser::Error) -> Self {
        SentryError::Serialization(format!("TOML serialization error: {}", err))
    }
}

impl From<base64::DecodeError> for SentryError {
    fn from(err: base64::DecodeError) -> Self {
        SentryError::parse("base64 payload", err)
    }
}
