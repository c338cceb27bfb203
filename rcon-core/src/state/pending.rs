//! Outstanding command tracking.
//!
//! Holds the correlation counter and the map from id to the waiter of
//! that command. The table itself is not synchronized; the dispatcher
//! keeps it behind one mutex so that "allocate id + insert" is a single
//! critical section.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tokio::sync::oneshot;

use crate::error::{RconError, Result};

/// Id used by the authentication exchange.
pub const AUTH_ID: i32 = 0;

/// Id the server puts in an auth response to signal a bad password.
pub const AUTH_FAILED_ID: i32 = -1;

/// First id handed to a command; everything below is reserved for the
/// handshake.
pub const FIRST_COMMAND_ID: i32 = AUTH_ID + 1;

/// Receiving half handed to whoever issued the command.
pub type ResponseReceiver = oneshot::Receiver<Result<String>>;

// ── PendingRequest ───────────────────────────────────────────────

/// A command waiting for its response.
#[derive(Debug)]
pub struct PendingRequest {
    completion: oneshot::Sender<Result<String>>,
    issued_at: Instant,
}

impl PendingRequest {
    /// Resolve the waiter. Consumes the entry, so it can only happen once.
    ///
    /// Returns `false` if the waiter already went away.
    pub fn complete(self, result: Result<String>) -> bool {
        self.completion.send(result).is_ok()
    }

    /// How long this request has been in flight.
    pub fn elapsed(&self) -> Duration {
        self.issued_at.elapsed()
    }
}

// ── PendingTable ─────────────────────────────────────────────────

#[derive(Debug)]
pub struct PendingTable {
    next_id: i32,
    requests: HashMap<i32, PendingRequest>,
    closed: bool,
}

impl PendingTable {
    pub fn new() -> Self {
        Self {
            next_id: FIRST_COMMAND_ID,
            requests: HashMap::new(),
            closed: false,
        }
    }

    /// Allocate the next id and register a waiter for it.
    ///
    /// The counter wraps at `i32::MAX`; a wrapped id is used as-is.
    pub fn register(&mut self) -> Result<(i32, ResponseReceiver)> {
        if self.closed {
            return Err(RconError::NotConnected);
        }

        let id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1);

        let (tx, rx) = oneshot::channel();
        self.requests.insert(
            id,
            PendingRequest {
                completion: tx,
                issued_at: Instant::now(),
            },
        );
        Ok((id, rx))
    }

    /// Remove and return the request for `id`, if any.
    pub fn take(&mut self, id: i32) -> Option<PendingRequest> {
        self.requests.remove(&id)
    }

    /// Refuse further registrations and hand back everything in flight.
    pub fn close(&mut self) -> Vec<PendingRequest> {
        self.closed = true;
        self.requests.drain().map(|(_, req)| req).collect()
    }

    pub fn pending_count(&self) -> usize {
        self.requests.len()
    }
}

impl Default for PendingTable {
    fn default() -> Self {
        Self::new()
    }
}

// ── Tests ────────────────────────────────────────────────────────
