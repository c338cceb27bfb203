//! Configuration for the command-line client.

use std::path::Path;
use std::time::Duration;

use rcon_core::RconConfig;
use serde::{Deserialize, Serialize};

/// Top-level configuration loaded from a TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    /// RCON endpoint, password and timing.
    pub server: RconConfig,
    /// Logging settings.
    pub logging: LoggingConfig,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    pub level: String,
    /// Optional log file path. If empty, logs to stderr.
    pub file: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "warn".into(),
            file: String::new(),
        }
    }
}

/// Command-line values that take precedence over the file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub address: Option<String>,
    pub password: Option<String>,
    pub timeout_ms: Option<u64>,
}

// ── Loading ──────────────────────────────────────────────────────

/// Where the loaded configuration came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    /// Parsed from the file.
    File,
    /// No readable file; defaults used.
    Missing,
    /// The file did not parse; defaults used.
    Invalid(String),
}

impl ConfigSource {
    /// Log how `path` was handled. Call once a subscriber is installed.
    pub fn report(&self, path: &Path) {
        match self {
            ConfigSource::File => tracing::info!("loaded config from {}", path.display()),
            ConfigSource::Missing => {
                tracing::info!("no config at {}; using defaults", path.display())
            }
            ConfigSource::Invalid(e) => {
                tracing::warn!("invalid config {}: {e}; using defaults", path.display())
            }
        }
    }
}

impl CliConfig {
    /// Load configuration from a TOML file, falling back to defaults.
    pub fn load(path: &Path) -> (Self, ConfigSource) {
        match std::fs::read_to_string(path) {
            Ok(contents) => match toml::from_str(&contents) {
                Ok(config) => (config, ConfigSource::File),
                Err(e) => (Self::default(), ConfigSource::Invalid(e.to_string())),
            },
            Err(_) => (Self::default(), ConfigSource::Missing),
        }
    }

    /// Write the default configuration to a file (for bootstrapping).
    pub fn write_default(path: &Path) -> std::io::Result<()> {
        let text = toml::to_string_pretty(&Self::default()).map_err(std::io::Error::other)?;
        std::fs::write(path, text)
    }

    /// Apply command-line overrides on top of the file values.
    pub fn apply(&mut self, overrides: Overrides) {
        if let Some(address) = overrides.address {
            self.server.address = address;
        }
        if let Some(password) = overrides.password {
            self.server.password = password;
        }
        if let Some(ms) = overrides.timeout_ms {
            self.server = self.server.clone().with_connect_timeout(Duration::from_millis(ms));
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────
