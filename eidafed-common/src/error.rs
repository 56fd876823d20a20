//! Common error types for eidafed

use thiserror::Error;

/// Common result type for eidafed operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across the federator crates
#[derive(Error, Debug)]
pub enum Error {
    /// Client parameter rejected before any backend call.
    ///
    /// The message is shown to the client verbatim, so it carries no prefix.
    #[error("{0}")]
    Validation(String),

    /// Unparseable time string
    #[error("Invalid time: {0}")]
    InvalidTime(String),

    /// Backend URL could not be built
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Shorthand for a client-facing validation failure
    pub fn validation(message: impl Into<String>) -> Self {
        Error::Validation(message.into())
    }
}
