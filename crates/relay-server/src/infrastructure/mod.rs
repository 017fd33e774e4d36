//! Infrastructure layer for relay-server.
//!
//! Everything that touches the outside world lives here:
//!
//! - the HTTP router and WebSocket upgrade ([`http`])
//! - adapting a WebSocket to the core's frame traits ([`ws_connection`])
//! - the timestamped event log file ([`file_log`])
//! - the operator console on stdin ([`console`])
//! - reading the optional TOML config file ([`config_file`])
//!
//! Relay semantics (registry, mute table, broadcast, shutdown) stay in
//! `relay-core`; nothing in this layer decides who receives what.

pub mod config_file;
pub mod console;
pub mod file_log;
pub mod http;
pub mod ws_connection;

pub use http::run_server;
