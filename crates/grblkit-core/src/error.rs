//! Error handling for GrblKit
//!
//! Provides error types for the layers of the client:
//! - Client errors (command, reset, and connection failures)
//! - Status report parse errors
//! - Settings line parse errors
//!
//! All error types use `thiserror` for ergonomic error handling.

use std::sync::Arc;
use thiserror::Error;

/// Client error type
///
/// Represents the outcome a command waiter or connection consumer can
/// observe. The variants are deliberately distinguishable so callers can
/// decide whether to retry (`Command`), resynchronize (`SoftReset`), or
/// reconnect (`Io`).
#[derive(Error, Debug, Clone)]
pub enum ClientError {
    /// The controller rejected this command. The raw response line is
    /// preserved verbatim.
    #[error("command rejected: {response}")]
    Command {
        /// The controller's raw error line.
        response: String,
    },

    /// The controller rebooted while the command was in flight.
    #[error("soft reset")]
    SoftReset,

    /// The command was discarded before it was ever transmitted.
    #[error("command discarded before transmission")]
    Discarded,

    /// The connection was closed.
    #[error("connection closed")]
    Closed,

    /// The transport failed. Terminal for the connection.
    #[error("i/o error: {0}")]
    Io(Arc<std::io::Error>),
}

impl ClientError {
    /// Wrap a transport error.
    pub fn from_io(err: std::io::Error) -> Self {
        ClientError::Io(Arc::new(err))
    }

    /// Whether the connection itself is unusable after this error.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ClientError::Io(_) | ClientError::Closed)
    }

    /// Whether the error invalidated in-flight state without killing the
    /// connection.
    pub fn is_reset(&self) -> bool {
        matches!(self, ClientError::SoftReset)
    }
}

/// Status report parse error
///
/// Recoverable and local to a single report frame; the connection keeps
/// running after one of these.
#[derive(Error, Debug, Clone)]
pub enum StatusError {
    /// The report carried no content between its delimiters.
    #[error("empty status report")]
    Empty,

    /// A field value failed numeric decoding.
    #[error("invalid {field} value {value:?}: {reason}")]
    InvalidField {
        /// The report key whose value failed to decode.
        field: &'static str,
        /// The offending value text.
        value: String,
        /// Why decoding failed.
        reason: String,
    },

    /// A coordinate field did not carry exactly three components.
    #[error("{field} expects 3 coordinates, got {count}")]
    CoordinateCount {
        /// The report key with the wrong arity.
        field: &'static str,
        /// The number of components present.
        count: usize,
    },
}

/// Settings line parse error
///
/// Recoverable; a malformed line never poisons later settings lines.
#[derive(Error, Debug, Clone)]
pub enum SettingsError {
    /// The line is not of the `$n=value` shape.
    #[error("malformed setting line {line:?}")]
    Malformed {
        /// The offending line.
        line: String,
    },

    /// A recognized setting carried an undecodable value.
    #[error("invalid value for {key}: {reason}")]
    InvalidValue {
        /// The setting key, e.g. `$110`.
        key: String,
        /// Why the value failed to decode.
        reason: String,
    },
}

/// Main error type for GrblKit
///
/// A unified error type that can represent any error from all layers.
#[derive(Error, Debug)]
pub enum Error {
    /// Client error
    #[error(transparent)]
    Client(#[from] ClientError),

    /// Status report parse error
    #[error(transparent)]
    Status(#[from] StatusError),

    /// Settings parse error
    #[error(transparent)]
    Settings(#[from] SettingsError),

    /// Standard I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create an error from a string message
    pub fn other(msg: impl Into<String>) -> Self {
        Error::Other(msg.into())
    }

    /// Check if this error ends the connection.
    pub fn is_fatal(&self) -> bool {
        match self {
            Error::Client(err) => err.is_fatal(),
            Error::Io(_) => true,
            _ => false,
        }
    }

    /// Check if this is a parse error local to one frame or line.
    pub fn is_parse_error(&self) -> bool {
        matches!(self, Error::Status(_) | Error::Settings(_))
    }
}

/// Result type using Error
pub type Result<T> = std::result::Result<T, Error>;
