//! Error types for the DNS janitor
//!
//! This module defines all error types used throughout the workspace.
//! The taxonomy drives acknowledgment: see [`Error::is_retryable`].

use thiserror::Error;

/// Result type alias for janitor operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for the DNS janitor
#[derive(Error, Debug)]
pub enum Error {
    /// Credential acquisition or refresh failed
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Retry budget exhausted on 429/5xx/connection failures
    #[error("Transient failure after {attempts} attempt(s): {message}")]
    Transient {
        /// Number of requests issued before giving up
        attempts: u32,
        /// Description of the last failure
        message: String,
    },

    /// Non-retryable HTTP status from a provider API
    #[error("API error (HTTP {status}): {body}")]
    Api {
        /// HTTP status code
        status: u16,
        /// Response body as returned by the provider
        body: String,
    },

    /// A desired or actual state entry could not be parsed into a record set
    #[error("Malformed state: {0}")]
    MalformedState(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Inbound transport errors (acknowledgment, subscription)
    #[error("Transport error: {0}")]
    Transport(String),

    /// Outbound publisher errors
    #[error("Publish failed: {0}")]
    Publish(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create an authentication error
    pub fn auth(msg: impl Into<String>) -> Self {
        Self::Auth(msg.into())
    }

    /// Create a transient (retry budget exhausted) error
    pub fn transient(attempts: u32, msg: impl Into<String>) -> Self {
        Self::Transient {
            attempts,
            message: msg.into(),
        }
    }

    /// Create a non-retryable API error
    pub fn api(status: u16, body: impl Into<String>) -> Self {
        Self::Api {
            status,
            body: body.into(),
        }
    }

    /// Create a malformed state error
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedState(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a transport error
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    /// Create a publish error
    pub fn publish(msg: impl Into<String>) -> Self {
        Self::Publish(msg.into())
    }

    /// Whether a message that failed with this error should be left
    /// unacknowledged for the transport to redeliver.
    ///
    /// Auth, transient, transport, publish and I/O failures may succeed on a
    /// later delivery. API rejections, malformed state, configuration and
    /// decoding errors will not, so the message is acknowledged instead.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Auth(_) | Self::Transient { .. } | Self::Transport(_) | Self::Publish(_) | Self::Io(_)
        )
    }
}
