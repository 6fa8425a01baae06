//! Error types for cardhub
//!
//! One error enum covers every failure a sync flow can hit: remote calls,
//! decoding, the mapping store, and the hand-off between them.
//! Uses thiserror for ergonomic error handling.

use std::time::Duration;
use thiserror::Error;

/// Result type alias for cardhub operations
pub type Result<T> = std::result::Result<T, HubError>;

/// Error type for cardhub operations
#[derive(Error, Debug)]
pub enum HubError {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Mapping store errors that are not raw SQLite failures
    #[error("Storage error: {0}")]
    Storage(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Authentication rejected by a remote service
    #[error("Authentication error: {0}")]
    Auth(String),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// SQLite database errors
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// HTTP request errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-success or malformed responses from Trello or GitLab
    #[error("Integration error: {0}")]
    Integration(String),

    /// Rate limited (retry-after duration in seconds)
    #[error("Rate limited, retry after {0} seconds")]
    RateLimited(u64),

    /// The producer side of a hand-off did not deliver in time
    #[error("{operation} timed out after {after:?}")]
    Timeout {
        operation: String,
        after: Duration,
    },

    /// The producer side of a hand-off went away without sending
    #[error("Hand-off failed: {0}")]
    HandOff(String),

    /// Other errors
    #[error("{0}")]
    Other(String),
}

impl HubError {
    /// Short label used for metrics and structured logs
    pub fn kind(&self) -> &'static str {
        match self {
            HubError::Config(_) => "config",
            HubError::Storage(_) | HubError::Database(_) => "storage",
            HubError::Io(_) => "io",
            HubError::Auth(_) => "auth",
            HubError::Json(_) | HubError::Yaml(_) => "decode",
            HubError::Http(_) => "transport",
            HubError::Integration(_) => "remote",
            HubError::RateLimited(_) => "rate_limited",
            HubError::Timeout { .. } => "timeout",
            HubError::HandOff(_) => "handoff",
            HubError::Other(_) => "other",
        }
    }
}

impl crate::integrations::retry::RetryableError for HubError {
    fn retry_decision(&self) -> crate::integrations::retry::RetryDecision {
        use crate::integrations::retry::RetryDecision;

        match self {
            HubError::Http(e) => {
                if e.is_connect() || e.is_timeout() {
                    RetryDecision::Retry
                } else if let Some(status) = e.status() {
                    match status.as_u16() {
                        429 => RetryDecision::RetryAfter(Duration::from_secs(60)),
                        500..=599 => RetryDecision::Retry,
                        _ => RetryDecision::NoRetry,
                    }
                } else {
                    // Body decode failures land here; the remote call already happened
                    RetryDecision::NoRetry
                }
            }
            HubError::RateLimited(secs) => RetryDecision::RetryAfter(Duration::from_secs(*secs)),
            HubError::Integration(msg) => {
                if msg.contains("HTTP 5") {
                    RetryDecision::Retry
                } else {
                    RetryDecision::NoRetry
                }
            }
            HubError::Config(_)
            | HubError::Storage(_)
            | HubError::Io(_)
            | HubError::Auth(_)
            | HubError::Json(_)
            | HubError::Yaml(_)
            | HubError::Database(_)
            | HubError::Timeout { .. }
            | HubError::HandOff(_)
            | HubError::Other(_) => RetryDecision::NoRetry,
        }
    }
}
