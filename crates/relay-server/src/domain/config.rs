//! Relay configuration types.
//!
//! [`RelayConfig`] is the single source of truth for runtime settings. It is
//! built from defaults, optionally overlaid with a TOML file (see
//! [`crate::infrastructure::config_file`]), and finally with CLI arguments and
//! environment variables in `main.rs`.
//!
//! ```toml
//! bind_addr = "0.0.0.0:8080"
//! log_dir = "/var/log/relay"
//! web_root = "/srv/relay"
//! write_timeout_secs = 5
//! echo_log = false
//! ```
//!
//! Every field is optional in the file; missing fields keep their defaults.

use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use relay_core::RelaySettings;
use serde::Deserialize;
use thiserror::Error;

/// Error type for configuration loading and validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value parsed but makes no sense.
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// All runtime configuration for the relay.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Address the HTTP/WebSocket listener binds to.
    pub bind_addr: SocketAddr,

    /// Directory holding one event log file per run.
    pub log_dir: PathBuf,

    /// Directory with `index.html` and a `static/` subdirectory.
    pub web_root: PathBuf,

    /// Upper bound in seconds for a single frame write to one client.
    pub write_timeout_secs: u64,

    /// Whether event log lines are echoed to the console at startup.
    pub echo_log: bool,
}

impl Default for RelayConfig {
    /// | Field              | Default      |
    /// |--------------------|--------------|
    /// | bind_addr          | `0.0.0.0:80` |
    /// | log_dir            | `logs`       |
    /// | web_root           | `.`          |
    /// | write_timeout_secs | 5            |
    /// | echo_log           | true         |
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from((Ipv4Addr::UNSPECIFIED, 80)),
            log_dir: PathBuf::from("logs"),
            web_root: PathBuf::from("."),
            write_timeout_secs: 5,
            echo_log: true,
        }
    }
}

impl RelayConfig {
    /// Parses a TOML document and validates the result.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Parse`] for malformed TOML or wrongly typed values,
    /// [`ConfigError::Invalid`] for values that fail [`RelayConfig::validate`].
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects settings the relay cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.write_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "write_timeout_secs must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_secs(self.write_timeout_secs)
    }

    /// Timeouts handed to the relay core.
    pub fn relay_settings(&self) -> RelaySettings {
        RelaySettings {
            write_timeout: self.write_timeout(),
            ..RelaySettings::default()
        }
    }
}
