//! Error types for arenalink
//!
//! One error enum covers the whole protocol stack:
//!
//! - **Decode errors**: `InvalidJson`, `NotAnObject`, `MissingCmd`. Inbound
//!   frames that fail decoding are dropped by the session, never surfaced to
//!   subscribers.
//! - **Transport errors**: `WebSocket`, `ConnectionClosed`. These end the
//!   current socket and trigger reconnection.
//! - **Processing errors**: `Serialization`, `Internal`.
//!
//! # Examples
//!
//! ```rust
//! use arenalink_core::Error;
//!
//! let error = Error::MissingCmd;
//! assert_eq!(error.kind(), "missing_cmd");
//! assert!(error.is_decode());
//! ```

use thiserror::Error;

/// Result type for arenalink operations
pub type Result<T> = std::result::Result<T, Error>;

/// Application-level error type for arenalink operations
///
/// Errors are `Clone` so the session task can report the same failure on the
/// lifecycle event stream and in its logs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// An outbound message could not be turned into JSON
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// An inbound frame is not valid JSON
    #[error("Invalid JSON: {0}")]
    InvalidJson(String),

    /// An inbound frame is valid JSON but not an object
    #[error("Frame is not a JSON object")]
    NotAnObject,

    /// An inbound object has no string `cmd` field
    #[error("Frame has no cmd field")]
    MissingCmd,

    /// WebSocket transport layer error
    ///
    /// Covers failed opens, failed writes and read errors reported by the
    /// socket library.
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    /// The socket ended without a close handshake, or the session task has
    /// stopped
    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Stable label for logs and metric attributes
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Serialization(_) => "serialization",
            Error::InvalidJson(_) => "invalid_json",
            Error::NotAnObject => "not_an_object",
            Error::MissingCmd => "missing_cmd",
            Error::WebSocket(_) => "websocket",
            Error::ConnectionClosed => "connection_closed",
            Error::Internal(_) => "internal",
        }
    }

    /// Whether this error came from decoding an inbound frame
    pub fn is_decode(&self) -> bool {
        matches!(
            self,
            Error::InvalidJson(_) | Error::NotAnObject | Error::MissingCmd
        )
    }
}
