//! Error types for Overlap
//!
//! This module defines all error types used throughout the application,
//! using `thiserror` for ergonomic error handling.

use thiserror::Error;

/// Main error type for Overlap operations
///
/// The streaming client reports `HttpStatus`, `EmptyBody`, `Cancelled` and
/// `Transport`; the conversation store reports `Storage` for write failures
/// and uses `CorruptState` internally when the persisted document cannot be
/// decoded (that case is always recovered as an empty store).
#[derive(Error, Debug)]
pub enum OverlapError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// No user identity is available to attach to a request
    #[error("No user identity configured: {0}")]
    MissingIdentity(String),

    /// The backend answered with a non-success status
    #[error("Request failed: HTTP {status}{}", format_body_suffix(.body))]
    HttpStatus {
        /// HTTP status code returned by the backend
        status: u16,
        /// Best-effort, bounded read of the response body
        body: String,
    },

    /// The backend declared success but sent no body stream
    #[error("Response has no body stream")]
    EmptyBody,

    /// The caller cancelled the stream before it finished
    #[error("Stream cancelled by caller")]
    Cancelled,

    /// Network-level failure while dispatching or reading
    #[error("Transport error: {0}")]
    Transport(String),

    /// Persisted conversation state could not be decoded
    #[error("Corrupt conversation state: {0}")]
    CorruptState(String),

    /// Conversation storage errors (backing file operations)
    #[error("Storage error: {0}")]
    Storage(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// HTTP request errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

fn format_body_suffix(body: &str) -> String {
    if body.is_empty() {
        String::new()
    } else {
        format!(" - {}", body)
    }
}

impl OverlapError {
    /// Returns true when `err` wraps [`OverlapError::Cancelled`]
    ///
    /// Lets callers render "stopped by user" differently from a failure
    /// after the error has travelled through `anyhow`.
    pub fn is_cancellation(err: &anyhow::Error) -> bool {
        matches!(
            err.downcast_ref::<OverlapError>(),
            Some(OverlapError::Cancelled)
        )
    }
}

/// Result type alias for Overlap operations
///
/// This is a convenience alias that uses `anyhow::Error` as the error type,
/// allowing for rich error context and easy error propagation.
pub type Result<T> = anyhow::Result<T>;
