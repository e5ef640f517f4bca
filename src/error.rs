//! Error types for the broker
//!
//! Per-connection failures are never fatal to the broker process. Transport
//! errors fail the specific operation (`send_and_await_ack` reports `false`,
//! `receive_frame` reports a closed connection); only misuse of an already
//! torn-down connection surfaces as a distinct error.

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type
#[derive(Debug)]
pub enum Error {
    /// I/O error (bind, accept, connect)
    Io(std::io::Error),
    /// Message body could not be serialized
    Json(serde_json::Error),
    /// Contract violation on a framed connection
    Connection(ConnectionError),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Io(e) => write!(f, "I/O error: {}", e),
            Error::Json(e) => write!(f, "JSON error: {}", e),
            Error::Connection(e) => write!(f, "Connection error: {}", e),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            Error::Json(e) => Some(e),
            Error::Connection(e) => Some(e),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e)
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Json(e)
    }
}

impl From<ConnectionError> for Error {
    fn from(e: ConnectionError) -> Self {
        Error::Connection(e)
    }
}

/// Error type for framed-connection operations
///
/// Distinct from a transport failure: a transport failure is a network
/// event and is reported in-band (`false` / closed), while these are
/// programming-contract violations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionError {
    /// Operation attempted on a connection that was already torn down
    Disposed,
}

impl std::fmt::Display for ConnectionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionError::Disposed => write!(f, "connection already disposed"),
        }
    }
}

impl std::error::Error for ConnectionError {}
