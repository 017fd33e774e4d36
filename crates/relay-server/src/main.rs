//! Broadcast relay server: entry point.
//!
//! Serves the chat page and a WebSocket endpoint; every line a client sends
//! is relayed to every connected client. An operator drives the relay from
//! the console (`help` lists the commands).
//!
//! # Usage
//!
//! ```text
//! relay-server [OPTIONS]
//!
//! Options:
//!   --config <PATH>        TOML config file
//!   --bind <IP>            Listener address [default: 0.0.0.0]
//!   --port <PORT>          Listener port [default: 80]
//!   --log-dir <DIR>        Event log directory [default: logs]
//!   --web-root <DIR>       Directory with index.html and static/ [default: .]
//!   --write-timeout <SECS> Per-client write timeout [default: 5]
//!   --quiet                Do not echo event log lines to the console
//! ```
//!
//! # Environment variable overrides
//!
//! | Variable              | Option            |
//! |-----------------------|-------------------|
//! | `RELAY_CONFIG`        | `--config`        |
//! | `RELAY_BIND`          | `--bind`          |
//! | `RELAY_PORT`          | `--port`          |
//! | `RELAY_LOG_DIR`       | `--log-dir`       |
//! | `RELAY_WEB_ROOT`      | `--web-root`      |
//! | `RELAY_WRITE_TIMEOUT` | `--write-timeout` |
//!
//! Options and environment variables override the config file, which
//! overrides the built-in defaults.

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chrono::Local;
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use relay_core::{LogSink, Relay};
use relay_server::domain::RelayConfig;
use relay_server::infrastructure::config_file::load_config;
use relay_server::infrastructure::console::{spawn_stdin_reader, Console};
use relay_server::infrastructure::file_log::FileLogSink;
use relay_server::infrastructure::run_server;

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Real-time text broadcast relay.
#[derive(Debug, Parser)]
#[command(
    name = "relay-server",
    about = "Relays chat lines between WebSocket clients",
    version
)]
struct Cli {
    /// TOML config file. Values given below take precedence over it.
    #[arg(long, env = "RELAY_CONFIG")]
    config: Option<PathBuf>,

    /// IP address to bind the HTTP listener to.
    #[arg(long, env = "RELAY_BIND")]
    bind: Option<IpAddr>,

    /// TCP port for the HTTP listener.
    #[arg(long, env = "RELAY_PORT")]
    port: Option<u16>,

    /// Directory for event log files. Created if missing.
    #[arg(long, env = "RELAY_LOG_DIR")]
    log_dir: Option<PathBuf>,

    /// Directory holding `index.html` and `static/`.
    #[arg(long, env = "RELAY_WEB_ROOT")]
    web_root: Option<PathBuf>,

    /// Seconds a single write to one client may take before it is dropped.
    #[arg(long, env = "RELAY_WRITE_TIMEOUT")]
    write_timeout: Option<u64>,

    /// Start with console echo of event log lines switched off.
    #[arg(long)]
    quiet: bool,
}

impl Cli {
    /// Loads the config file, if any, and applies the CLI overrides.
    fn into_relay_config(self) -> anyhow::Result<RelayConfig> {
        let base = match &self.config {
            Some(path) => load_config(path)
                .with_context(|| format!("failed to load config from {}", path.display()))?,
            None => RelayConfig::default(),
        };
        self.overlay(base)
    }

    /// Applies every option that was given on top of `base`.
    fn overlay(self, base: RelayConfig) -> anyhow::Result<RelayConfig> {
        let mut config = base;
        let ip = self.bind.unwrap_or_else(|| config.bind_addr.ip());
        let port = self.port.unwrap_or_else(|| config.bind_addr.port());
        config.bind_addr = SocketAddr::new(ip, port);
        if let Some(dir) = self.log_dir {
            config.log_dir = dir;
        }
        if let Some(root) = self.web_root {
            config.web_root = root;
        }
        if let Some(secs) = self.write_timeout {
            config.write_timeout_secs = secs;
        }
        if self.quiet {
            config.echo_log = false;
        }
        config.validate().context("invalid relay settings")?;
        Ok(config)
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Cli::parse().into_relay_config()?;

    println!("Server startup process initiated. Type `help` for help.");
    info!(
        "relay starting: bind={}, log_dir={}, web_root={}",
        config.bind_addr,
        config.log_dir.display(),
        config.web_root.display()
    );

    let log = Arc::new(
        FileLogSink::create(&config.log_dir, Local::now(), config.echo_log)
            .with_context(|| format!("failed to create event log in {}", config.log_dir.display()))?,
    );
    let log_sink: Arc<dyn LogSink> = log.clone();
    let relay = Arc::new(Relay::new(log_sink, config.relay_settings()));

    let signal_relay = Arc::clone(&relay);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("received Ctrl+C, shutting down");
                signal_relay.initiate_shutdown("interrupt").await;
            }
            Err(e) => error!("failed to listen for Ctrl+C signal: {e}"),
        }
    });

    let mut console = Console::new(
        Arc::clone(&relay),
        log,
        spawn_stdin_reader(),
        std::io::stdout(),
    );
    tokio::spawn(async move {
        if let Err(e) = console.run().await {
            warn!("console output failed: {e}");
        }
    });

    run_server(&config, Arc::clone(&relay)).await?;

    wait_for_sessions_to_drain(&relay, relay.settings().close_timeout).await;
    info!("relay stopped");
    Ok(())
}

/// Gives session tasks a bounded moment to unregister after shutdown.
async fn wait_for_sessions_to_drain(relay: &Relay, limit: Duration) {
    let deadline = tokio::time::Instant::now() + limit;
    loop {
        let remaining = relay.registry().count().await;
        if remaining == 0 {
            return;
        }
        if tokio::time::Instant::now() >= deadline {
            warn!("{remaining} session(s) still registered at exit");
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn bare_cli() -> Cli {
        Cli {
            config: None,
            bind: None,
            port: None,
            log_dir: None,
            web_root: None,
            write_timeout: None,
            quiet: false,
        }
    }

    #[test]
    fn test_cli_parses_all_options() {
        let cli = Cli::parse_from([
            "relay-server",
            "--bind",
            "127.0.0.1",
            "--port",
            "8080",
            "--log-dir",
            "/tmp/relay",
            "--web-root",
            "/srv/www",
            "--write-timeout",
            "3",
            "--quiet",
        ]);

        assert_eq!(cli.bind, Some("127.0.0.1".parse().unwrap()));
        assert_eq!(cli.port, Some(8080));
        assert_eq!(cli.log_dir, Some(PathBuf::from("/tmp/relay")));
        assert_eq!(cli.web_root, Some(PathBuf::from("/srv/www")));
        assert_eq!(cli.write_timeout, Some(3));
        assert!(cli.quiet);
    }

    #[test]
    fn test_cli_rejects_non_ip_bind() {
        let result = Cli::try_parse_from(["relay-server", "--bind", "not.an.ip"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_overlay_without_options_keeps_base() {
        // Arrange
        let base = RelayConfig::default();

        // Act
        let config = bare_cli().overlay(base.clone()).unwrap();

        // Assert
        assert_eq!(config, base);
    }

    #[test]
    fn test_overlay_port_keeps_file_bind_ip() {
        // Arrange: the file chose the address, the CLI only the port
        let base = RelayConfig {
            bind_addr: "127.0.0.1:9000".parse().unwrap(),
            ..RelayConfig::default()
        };
        let cli = Cli {
            port: Some(8081),
            ..bare_cli()
        };

        // Act
        let config = cli.overlay(base).unwrap();

        // Assert
        assert_eq!(config.bind_addr, "127.0.0.1:8081".parse().unwrap());
    }

    #[test]
    fn test_overlay_options_win_over_file_values() {
        let base = RelayConfig {
            log_dir: PathBuf::from("/var/log/relay"),
            write_timeout_secs: 10,
            ..RelayConfig::default()
        };
        let cli = Cli {
            log_dir: Some(PathBuf::from("/tmp/logs")),
            write_timeout: Some(2),
            quiet: true,
            ..bare_cli()
        };

        let config = cli.overlay(base).unwrap();

        assert_eq!(config.log_dir, PathBuf::from("/tmp/logs"));
        assert_eq!(config.write_timeout(), Duration::from_secs(2));
        assert!(!config.echo_log);
    }

    #[test]
    fn test_overlay_zero_write_timeout_returns_error() {
        let cli = Cli {
            write_timeout: Some(0),
            ..bare_cli()
        };
        assert!(cli.overlay(RelayConfig::default()).is_err());
    }

    #[test]
    fn test_overlay_rejects_invalid_file_value_with_neutral_message() {
        // Arrange: the bad value comes from the file, not from an option
        let base = RelayConfig {
            write_timeout_secs: 0,
            ..RelayConfig::default()
        };

        // Act
        let err = bare_cli().overlay(base).unwrap_err();

        // Assert
        let message = err.to_string();
        assert_eq!(message, "invalid relay settings");
        assert!(!message.contains("command-line"));
    }

    #[test]
    fn test_into_relay_config_missing_file_returns_error() {
        let cli = Cli {
            config: Some(PathBuf::from("/definitely/not/here/relay.toml")),
            ..bare_cli()
        };
        assert!(cli.into_relay_config().is_err());
    }
}
