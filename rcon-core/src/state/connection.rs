//! Client connection state machine.
//!
//! Transitions are validated and return `Result` instead of panicking.

use std::fmt;

use crate::error::RconError;

// ── ConnectionState ──────────────────────────────────────────────

/// The lifecycle phase of one RCON client.
///
/// ```text
///  Disconnected ──► Connecting ──► Authenticating ──► Ready
///        │               │                │             │
///        ▼               ▼                ▼             ▼
///        └───────────────┴──────► Closed ◄┴─────────────┘
/// ```
///
/// `Closed` is terminal: reconnecting means building a new client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionState {
    /// Nothing attempted yet.
    #[default]
    Disconnected,

    /// TCP connect in progress.
    Connecting,

    /// TCP established; waiting for the auth response.
    Authenticating,

    /// Authenticated; commands may be issued.
    Ready,

    /// Torn down for any reason.
    Closed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "Disconnected"),
            Self::Connecting => write!(f, "Connecting"),
            Self::Authenticating => write!(f, "Authenticating"),
            Self::Ready => write!(f, "Ready"),
            Self::Closed => write!(f, "Closed"),
        }
    }
}

impl ConnectionState {
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready)
    }

    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Closed)
    }

    // ── Transitions ──────────────────────────────────────────────

    /// Valid from: `Disconnected`.
    pub fn begin_connect(&mut self) -> Result<(), RconError> {
        self.advance(Self::Disconnected, Self::Connecting)
    }

    /// Valid from: `Connecting`.
    pub fn begin_auth(&mut self) -> Result<(), RconError> {
        self.advance(Self::Connecting, Self::Authenticating)
    }

    /// Valid from: `Authenticating`.
    pub fn complete_auth(&mut self) -> Result<(), RconError> {
        self.advance(Self::Authenticating, Self::Ready)
    }

    /// Move to `Closed` from any state.
    ///
    /// Returns `true` if this call performed the transition, `false` if
    /// the state was already `Closed`. Callers use this to run teardown
    /// side effects exactly once.
    pub fn close(&mut self) -> bool {
        if self.is_closed() {
            return false;
        }
        *self = Self::Closed;
        true
    }

    fn advance(&mut self, from: Self, to: Self) -> Result<(), RconError> {
        if *self != from {
            return Err(RconError::InvalidTransition { from: *self, to });
        }
        *self = to;
        Ok(())
    }
}

// ── Tests ────────────────────────────────────────────────────────
