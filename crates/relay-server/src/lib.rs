//! relay-server library crate.
//!
//! Puts the `relay-core` broadcast relay on the network: an axum HTTP server
//! with a WebSocket chat endpoint, a file-backed event log and an operator
//! console on stdin.
//!
//! ```text
//! Browser (text frames over WebSocket)
//!         ↕
//! [relay-server]
//!   ├── domain/            RelayConfig, ConfigError
//!   └── infrastructure/
//!         ├── http         axum router, graceful shutdown
//!         ├── ws_connection  WebSocket ↔ FrameSink/FrameSource
//!         ├── file_log     timestamped log file
//!         ├── console      operator commands
//!         └── config_file  TOML loader
//!         ↕
//! [relay-core]  registry, mute table, broadcaster, shutdown
//! ```
//!
//! `domain` does no I/O; `infrastructure` depends on `domain` and
//! `relay-core`.

/// Domain layer: configuration types (no I/O).
pub mod domain;

/// Infrastructure layer: HTTP/WebSocket transport, log file, console.
pub mod infrastructure;
