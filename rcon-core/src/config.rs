//! Client connection settings.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Everything needed to open one RCON session.
///
/// Deserializes from a TOML table; missing fields take their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RconConfig {
    /// `host:port` of the game server's RCON listener.
    pub address: String,
    /// The server's `rcon_password`.
    pub password: String,
    /// Upper bound for TCP connect plus authentication, in milliseconds.
    pub connect_timeout_ms: u64,
    /// Delay between watchdog probes, in milliseconds.
    pub probe_interval_ms: u64,
    /// How long a probe may go unanswered before the connection counts
    /// as lost, in milliseconds. Defaults to one probe interval.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub probe_timeout_ms: Option<u64>,
    /// Console command the watchdog sends, followed by a random marker.
    pub probe_command: String,
}

impl Default for RconConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1:27015".into(),
            password: String::new(),
            connect_timeout_ms: 10_000,
            probe_interval_ms: 30_000,
            probe_timeout_ms: None,
            probe_command: "echo".into(),
        }
    }
}

impl RconConfig {
    pub fn new(address: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            password: password.into(),
            ..Self::default()
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout_ms = millis(timeout);
        self
    }

    pub fn with_probe_interval(mut self, interval: Duration) -> Self {
        self.probe_interval_ms = millis(interval);
        self
    }

    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout_ms = Some(millis(timeout));
        self
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Never zero; a zero interval would spin the watchdog.
    pub fn probe_interval(&self) -> Duration {
        Duration::from_millis(self.probe_interval_ms.max(1))
    }

    /// Never zero, like [`RconConfig::probe_interval`].
    pub fn probe_timeout(&self) -> Duration {
        match self.probe_timeout_ms {
            Some(ms) => Duration::from_millis(ms.max(1)),
            None => self.probe_interval(),
        }
    }
}

/// Whole milliseconds, saturating at `u64::MAX`.
fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
