//! Domain-specific error types for the RCON client.
//!
//! All fallible operations return `Result<T, RconError>`.
//! Malformed input from the wire never panics; it surfaces as
//! [`RconError::MalformedFrame`] and tears the connection down.

use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;

use crate::state::ConnectionState;

/// Convenience alias used across the crate.
pub type Result<T> = std::result::Result<T, RconError>;

/// The canonical error type for the RCON client.
#[derive(Debug, Error)]
pub enum RconError {
    // ── Connection Errors ────────────────────────────────────────
    /// Connect (TCP + authentication) did not finish in time.
    #[error("connect timed out after {0:?}")]
    Timeout(Duration),

    /// The TCP connection could not be established.
    #[error("connect failed: {0}")]
    Connect(#[source] std::io::Error),

    /// The server rejected the password (auth response id `-1`).
    #[error("authentication failed for {endpoint}")]
    AuthenticationFailed { endpoint: SocketAddr },

    /// An operation was attempted while the client is not ready.
    #[error("not connected")]
    NotConnected,

    /// The connection was torn down while the operation was in flight.
    #[error("connection closed")]
    ConnectionClosed,

    /// The TCP/IO layer reported an error on an open connection.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    // ── Protocol Errors ──────────────────────────────────────────
    /// Inbound bytes do not form a valid frame.
    #[error("malformed frame: {0}")]
    MalformedFrame(String),

    /// An outbound body exceeds the protocol maximum.
    #[error("payload too large: {size} bytes (max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// An outbound body contains a NUL byte, which would end it early.
    #[error("body contains a NUL byte at offset {0}")]
    InvalidBody(usize),

    /// A state transition was requested from a state that forbids it.
    #[error("invalid state transition: {from} -> {to}")]
    InvalidTransition {
        from: ConnectionState,
        to: ConnectionState,
    },

    // ── Response Parsing Errors ──────────────────────────────────
    /// The response body does not have the shape the parser expects.
    #[error("unexpected response for {parser}: {body:?}")]
    UnexpectedResponse { parser: &'static str, body: String },

    /// The parser recognized the body but failed to convert it.
    #[error("failed to parse response: {0}")]
    Parse(String),
}

impl RconError {
    /// Returns `true` for errors that mean the connection is gone.
    pub fn is_connection_loss(&self) -> bool {
        matches!(
            self,
            RconError::NotConnected
                | RconError::ConnectionClosed
                | RconError::Io(_)
                | RconError::MalformedFrame(_)
        )
    }
}
