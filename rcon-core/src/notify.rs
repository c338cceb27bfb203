//! One-shot disconnect notification.

use std::fmt;
use std::sync::{Mutex, OnceLock, PoisonError};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

type DisconnectCallback = Box<dyn FnOnce(DisconnectReason) + Send + 'static>;

/// Why a ready client lost its connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectReason {
    /// The server closed the stream.
    RemoteClosed,
    /// Reading, writing or decoding failed.
    Transport(String),
    /// A watchdog probe could not be issued or was answered with an error.
    ProbeFailed(String),
    /// A watchdog probe got no answer within the probe timeout.
    ProbeTimedOut(Duration),
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RemoteClosed => write!(f, "remote closed the connection"),
            Self::Transport(e) => write!(f, "transport error: {e}"),
            Self::ProbeFailed(e) => write!(f, "watchdog probe failed: {e}"),
            Self::ProbeTimedOut(d) => write!(f, "watchdog probe unanswered after {d:?}"),
        }
    }
}

/// Fires at most once; every registered callback runs exactly once.
///
/// A callback registered after the notification fired runs immediately
/// on the registering thread.
#[derive(Default)]
pub struct DisconnectNotifier {
    reason: OnceLock<DisconnectReason>,
    callbacks: Mutex<Vec<DisconnectCallback>>,
    fired: CancellationToken,
}

impl DisconnectNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&self, callback: F)
    where
        F: FnOnce(DisconnectReason) + Send + 'static,
    {
        let mut callbacks = self.lock();
        match self.reason.get() {
            Some(reason) => {
                let reason = reason.clone();
                drop(callbacks);
                callback(reason);
            }
            None => callbacks.push(Box::new(callback)),
        }
    }

    /// Returns `false` if the notification had already fired.
    pub fn fire(&self, reason: DisconnectReason) -> bool {
        if self.reason.set(reason.clone()).is_err() {
            return false;
        }
        self.fired.cancel();

        let callbacks = std::mem::take(&mut *self.lock());
        for callback in callbacks {
            callback(reason.clone());
        }
        true
    }

    pub fn has_fired(&self) -> bool {
        self.reason.get().is_some()
    }

    pub fn reason(&self) -> Option<DisconnectReason> {
        self.reason.get().cloned()
    }

    /// Resolves with the reason once the notification fires.
    pub async fn wait(&self) -> DisconnectReason {
        loop {
            // `reason` is set before `fired` is cancelled.
            if let Some(reason) = self.reason.get() {
                return reason.clone();
            }
            self.fired.cancelled().await;
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<DisconnectCallback>> {
        self.callbacks.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for DisconnectNotifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DisconnectNotifier")
            .field("reason", &self.reason.get())
            .field("callbacks", &self.lock().len())
            .finish()
    }
}
