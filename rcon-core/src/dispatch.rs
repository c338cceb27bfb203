//! Command dispatch: id allocation, sending, and response correlation.

use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::{debug, trace};

use crate::error::{RconError, Result};
use crate::frame::Frame;
use crate::network::Connection;
use crate::state::{PendingTable, ResponseReceiver};

/// Routes responses back to the command that asked for them.
///
/// The pending table sits behind a plain mutex. The lock is only held
/// to allocate/insert or to remove an entry, never while a waiter is
/// being completed or a frame is being written.
#[derive(Debug, Default)]
pub struct Dispatcher {
    table: Mutex<PendingTable>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Send `command` and return a handle for its response.
    ///
    /// If the frame cannot be written the entry is dropped again and the
    /// caller gets `NotConnected` instead of a handle that never resolves.
    /// The same happens if this future is dropped before the write is
    /// acknowledged.
    pub async fn issue(&self, connection: &Connection, command: &str) -> Result<PendingCommand> {
        let (id, rx) = self.lock().register()?;
        let unsent = Unsent {
            dispatcher: self,
            id,
        };

        let frame = Frame::exec_command(id, command)?;

        trace!(id, command, "issuing command");
        if let Err(e) = connection.send(frame).await {
            debug!(id, error = %e, "command not sent");
            return Err(RconError::NotConnected);
        }
        unsent.disarm();
        Ok(PendingCommand { id, rx })
    }

    /// Hand a `ResponseValue` frame to its waiter.
    ///
    /// Returns `false` when no command is waiting on that id; such frames
    /// (late, duplicate, or the empty reply to the auth request) are
    /// dropped.
    pub fn dispatch(&self, frame: Frame) -> bool {
        let id = frame.id();
        let Some(request) = self.lock().take(id) else {
            debug!(id, "dropping response with no pending command");
            return false;
        };
        trace!(id, elapsed = ?request.elapsed(), "resolving command");
        request.complete(Ok(frame.into_body()))
    }

    /// Fail every outstanding command with `ConnectionClosed` and refuse
    /// new ones. Returns how many were failed.
    pub fn fail_all(&self) -> usize {
        let drained = self.lock().close();
        let count = drained.len();
        for request in drained {
            request.complete(Err(RconError::ConnectionClosed));
        }
        if count > 0 {
            debug!(count, "failed outstanding commands");
        }
        count
    }

    pub fn pending_count(&self) -> usize {
        self.lock().pending_count()
    }

    fn forget(&self, id: i32) {
        self.lock().take(id);
    }

    fn lock(&self) -> MutexGuard<'_, PendingTable> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Removes a registered entry unless the frame made it onto the wire.
struct Unsent<'a> {
    dispatcher: &'a Dispatcher,
    id: i32,
}

impl Unsent<'_> {
    fn disarm(self) {
        std::mem::forget(self);
    }
}

impl Drop for Unsent<'_> {
    fn drop(&mut self) {
        self.dispatcher.forget(self.id);
    }
}

/// A command that has been written and is waiting for its response.
#[derive(Debug)]
pub struct PendingCommand {
    id: i32,
    rx: ResponseReceiver,
}

impl PendingCommand {
    /// Correlation id assigned to this command.
    pub fn id(&self) -> i32 {
        self.id
    }

    /// Wait for the response body.
    ///
    /// Resolves with `ConnectionClosed` if the connection is torn down
    /// first.
    pub async fn response(self) -> Result<String> {
        self.rx.await.unwrap_or(Err(RconError::ConnectionClosed))
    }
}

// ── Tests ────────────────────────────────────────────────────────
