//! Error types for delve-core

use thiserror::Error;

/// Main error type for the delve-core library
#[derive(Error, Debug)]
pub enum Error {
    /// Transport failure talking to the backend (connect, timeout, body read)
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Backend answered with a non-2xx status
    #[error("API error ({status}): {body}")]
    Api { status: u16, body: String },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Backend response lacked a field the client depends on
    #[error("missing field in backend response: {0}")]
    MissingField(&'static str),

    /// A reply is still pending for this session
    #[error("a reply is still pending; wait for it before sending another message")]
    Busy,

    /// Submitted text was empty after trimming
    #[error("message is empty")]
    EmptyMessage,
}

impl Error {
    /// True when the failure is worth retrying inside a resolution loop
    /// (network trouble or a 5xx from the backend).
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Http(_) => true,
            Error::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

/// Result type alias for delve-core
pub type Result<T> = std::result::Result<T, Error>;
