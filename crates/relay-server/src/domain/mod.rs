//! Domain layer for relay-server.
//!
//! Plain types with no I/O: the runtime configuration and its validation.
//! Session, registry and broadcast types live in `relay-core`.

pub mod config;

pub use config::{ConfigError, RelayConfig};
