//! Disconnection watchdog.
//!
//! RCON has no keep-alive, and a TCP connection can die without either
//! side noticing. The watchdog periodically runs a harmless command
//! tagged with a fresh marker through the normal dispatch path; if that
//! fails or goes unanswered for the probe timeout (one interval unless
//! configured otherwise), the session is torn down and the disconnect
//! notification fires.

use std::sync::Weak;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, trace};
use uuid::Uuid;

use crate::client::Session;
use crate::config::RconConfig;
use crate::notify::DisconnectReason;

/// Length of the random tag appended to each probe.
pub(crate) const MARKER_LEN: usize = 5;

#[derive(Debug, Clone)]
pub(crate) struct Watchdog {
    interval: Duration,
    timeout: Duration,
    probe_command: String,
    /// Marker of the most recent probe. Owned by this instance only.
    marker: String,
}

impl Watchdog {
    pub(crate) fn new(config: &RconConfig) -> Self {
        Self {
            interval: config.probe_interval(),
            timeout: config.probe_timeout(),
            probe_command: config.probe_command.trim().to_owned(),
            marker: String::new(),
        }
    }

    pub(crate) fn spawn(self, session: Weak<Session>) -> JoinHandle<()> {
        tokio::spawn(self.run(session))
    }

    /// Pick a new marker and build the probe command around it.
    fn next_probe(&mut self) -> String {
        self.marker = new_marker();
        if self.probe_command.is_empty() {
            self.marker.clone()
        } else {
            format!("{} {}", self.probe_command, self.marker)
        }
    }

    async fn run(mut self, session: Weak<Session>) {
        let Some(shutdown) = session.upgrade().map(|s| s.shutdown_token().clone()) else {
            return;
        };

        // First probe one interval after connect; the handshake just
        // proved the link.
        let Some(first) = Instant::now().checked_add(self.interval) else {
            debug!(interval = ?self.interval, "probe interval out of range, watchdog idle");
            shutdown.cancelled().await;
            return;
        };
        let mut ticker = tokio::time::interval_at(first, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        debug!(interval = ?self.interval, timeout = ?self.timeout, "watchdog started");

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }
            let Some(session) = session.upgrade() else {
                break;
            };

            let command = self.next_probe();
            match self.probe(&session, &command).await {
                Ok(body) => {
                    trace!(marker = %self.marker, echoed = body.contains(&self.marker), "probe answered");
                }
                Err(_) if shutdown.is_cancelled() => break,
                Err(reason) => {
                    session.teardown(Some(reason));
                    break;
                }
            }
        }
        debug!("watchdog stopped");
    }

    async fn probe(&self, session: &Session, command: &str) -> Result<String, DisconnectReason> {
        let pending = session
            .issue(command)
            .await
            .map_err(|e| DisconnectReason::ProbeFailed(e.to_string()))?;

        match tokio::time::timeout(self.timeout, pending.response()).await {
            Ok(Ok(body)) => Ok(body),
            Ok(Err(e)) => Err(DisconnectReason::ProbeFailed(e.to_string())),
            Err(_) => Err(DisconnectReason::ProbeTimedOut(self.timeout)),
        }
    }
}

fn new_marker() -> String {
    let mut marker = Uuid::new_v4().simple().to_string();
    marker.truncate(MARKER_LEN);
    marker
}
