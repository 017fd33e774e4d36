//! # relay-core
//!
//! The concurrent heart of the text broadcast relay: which sessions are live,
//! how a line from one client reaches everyone else, and how the relay shuts
//! down without racing its own disconnect notices.
//!
//! ```text
//! transport (relay-server)          operator console (relay-server)
//!        │ FrameSource / FrameSink          │ AdminCommand
//!        ▼                                  ▼
//!   SessionDriver ──────────────►  Relay  ◄─┘
//!                                   ├── Registry      live sessions, by id
//!                                   ├── MuteTable     address → muted
//!                                   ├── Broadcaster   snapshot + fan-out
//!                                   ├── ShutdownCoordinator
//!                                   └── LogSink       operator event log
//! ```
//!
//! This crate does no network or file I/O of its own; it only talks to the
//! traits in [`connection`] and [`event_log`].

pub mod broadcast;
pub mod command;
pub mod connection;
pub mod error;
pub mod event_log;
pub mod lifecycle;
pub mod mute;
pub mod registry;
pub mod relay;
pub mod session;
pub mod shutdown;
pub mod timestamp;

pub use broadcast::{Broadcaster, DeliveryReport};
pub use command::{AdminCommand, HELP_TEXT};
pub use connection::{FrameSink, FrameSource, TransportError};
pub use error::RelayError;
pub use event_log::{LogSink, MemoryLogSink};
pub use lifecycle::{CloseCause, SessionDriver, SessionSummary};
pub use mute::MuteTable;
pub use registry::Registry;
pub use relay::{Relay, RelaySettings};
pub use session::{Identity, Session, SessionId, SessionState};
pub use shutdown::ShutdownCoordinator;
