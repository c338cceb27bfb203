//! Authentication handshake.
//!
//! ```text
//! client                         server
//!   │ ── Auth(id=0, password) ──►  │
//!   │ ◄── ResponseValue(id=0, "") ─│   (Source servers send this first)
//!   │ ◄── AuthResponse(id) ────────│   id == -1 → rejected
//! ```
//!
//! The empty `ResponseValue` reaches the dispatcher like any other
//! response and is dropped there, since no command owns id 0.

use std::net::SocketAddr;
use std::sync::{Mutex, PoisonError};

use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::error::{RconError, Result};
use crate::frame::Frame;
use crate::network::Connection;
use crate::state::{AUTH_FAILED_ID, AUTH_ID};

/// Where the receive loop delivers the id of an `AuthResponse`.
#[derive(Debug, Default)]
pub struct AuthSlot {
    waiter: Mutex<Option<oneshot::Sender<i32>>>,
}

impl AuthSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Prepare to receive one auth response.
    fn arm(&self) -> oneshot::Receiver<i32> {
        let (tx, rx) = oneshot::channel();
        *self.lock() = Some(tx);
        rx
    }

    /// Deliver an auth response id. Returns `false` if nobody asked.
    pub fn resolve(&self, id: i32) -> bool {
        match self.lock().take() {
            Some(waiter) => waiter.send(id).is_ok(),
            None => false,
        }
    }

    /// Abandon a handshake in progress; its waiter sees the connection
    /// as closed.
    pub fn clear(&self) {
        self.lock().take();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<oneshot::Sender<i32>>> {
        self.waiter.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Send the password and wait for the server's verdict.
///
/// The receive loop must already be running and routing `AuthResponse`
/// frames into `slot`. There is no timeout here; callers bound the whole
/// connect.
pub async fn authenticate(connection: &Connection, slot: &AuthSlot, password: &str) -> Result<()> {
    let endpoint: SocketAddr = connection.peer_addr();
    let frame = Frame::auth(AUTH_ID, password)?;

    let verdict = slot.arm();
    debug!(%endpoint, "sending auth request");
    if let Err(e) = connection.send(frame).await {
        slot.clear();
        return Err(e);
    }

    let id = verdict.await.map_err(|_| RconError::ConnectionClosed)?;
    if id == AUTH_FAILED_ID {
        warn!(%endpoint, "server rejected rcon password");
        return Err(RconError::AuthenticationFailed { endpoint });
    }
    debug!(%endpoint, id, "authenticated");
    Ok(())
}
