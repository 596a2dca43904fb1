//! Error types for the relais-smtp server.

use std::io;

use thiserror::Error;

/// Errors that can occur during connection operations.
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// I/O error during connection operations.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Formatting error while preparing response.
    #[error("Response formatting error: {0}")]
    Format(#[from] std::fmt::Error),

    /// A response didn't fit in the send buffer.
    #[error("Response too long: {0} bytes")]
    ResponseTooLong(usize),
}

/// Specialized `Result` type for connection operations.
pub type ConnectionResult<T> = std::result::Result<T, ConnectionError>;

/// Why an `AUTH PLAIN` exchange was refused.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("Authentication cancelled")]
    Cancelled,

    #[error("Invalid base64 in authentication response")]
    Encoding,

    #[error("Malformed PLAIN credentials")]
    Malformed,
}
