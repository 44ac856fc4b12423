//! Error types for auditlens-core

use thiserror::Error;

/// Main error type for the auditlens-core library
///
/// Variants carry rendered strings rather than source errors so the enum is
/// `Clone`: a single refresh outcome is broadcast to every caller waiting on
/// the same cache key.
#[derive(Error, Debug, Clone)]
pub enum Error {
    /// Network/connectivity failure reaching the log source
    #[error("log source unavailable: {0}")]
    SourceUnavailable(String),

    /// The log source rejected the request (expired or missing credentials)
    #[error("log source rejected the request: {0}")]
    Unauthorized(String),

    /// The log source responded with a server-side failure
    #[error("log source error (status {status}): {message}")]
    SourceError { status: u16, message: String },

    /// The log source returned something other than the expected entry list
    #[error("malformed response from log source: {0}")]
    MalformedResponse(String),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(String),
}

impl Error {
    /// Whether a retry can reasonably succeed.
    ///
    /// Connectivity failures and server-side (5xx) errors are transient;
    /// rejected credentials, client-side rejections, and malformed payloads
    /// are not.
    pub fn can_retry(&self) -> bool {
        match self {
            Error::SourceUnavailable(_) => true,
            Error::SourceError { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e.to_string())
    }
}

/// Result type alias for auditlens-core
pub type Result<T> = std::result::Result<T, Error>;
