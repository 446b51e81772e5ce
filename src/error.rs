//! Error types for bulk-assign

use thiserror::Error;

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the engine, the Graph transport and the CLI plumbing
///
/// Per-item failures never appear here: they are recorded on the
/// [`WorkItem`](crate::types::WorkItem) itself. Only aggregate and hard
/// failures propagate to the caller.
#[derive(Debug, Error)]
pub enum Error {
    /// No usable token, or the token was rejected
    #[error("authentication error: {0}")]
    Auth(String),

    /// Graph API returned an unexpected response
    #[error("Graph API error: {0}")]
    GraphApi(String),

    /// HTTP client error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Malformed URL
    #[error("invalid URL: {0}")]
    Url(#[from] url::ParseError),

    /// File system error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid configuration value
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Invalid user input (ids, targets, intents)
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The transport could not deliver a batch at all
    #[error("transport failure: {0}")]
    Transport(String),

    /// The run was cancelled by the caller
    #[error("operation cancelled")]
    Cancelled,

    /// The run finished but not every item succeeded
    #[error("{fail_count} of {} assignments failed", success_count + fail_count)]
    PartialFailure {
        /// Items that reached `completed`
        success_count: usize,
        /// Items that reached `failed`
        fail_count: usize,
    },

    /// Internal invariant violation
    #[error("internal error: {0}")]
    Internal(String),
}
