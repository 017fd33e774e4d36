//! Operator event log seam.
//!
//! Every state transition and admin action is appended to a [`LogSink`]. The
//! file-backed implementation lives in `relay-server`; [`MemoryLogSink`] keeps
//! lines in memory for tests and embedded use.
//!
//! Log failures never stop the relay: [`record`] downgrades them to a warning.

use std::sync::{Mutex, PoisonError};

use tracing::{debug, warn};

use crate::error::RelayError;

#[cfg_attr(test, mockall::automock)]
pub trait LogSink: Send + Sync {
    /// Appends one line. The sink adds its own timestamp.
    fn append(&self, line: &str) -> Result<(), RelayError>;
}

/// Appends `line` to `sink`, reporting but otherwise ignoring failures.
pub fn record(sink: &dyn LogSink, line: &str) {
    debug!(target: "relay::events", "{line}");
    if let Err(e) = sink.append(line) {
        warn!("event log write failed: {e}");
    }
}

/// Keeps appended lines in memory, without timestamps.
#[derive(Debug, Default)]
pub struct MemoryLogSink {
    lines: Mutex<Vec<String>>,
}

impl MemoryLogSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl LogSink for MemoryLogSink {
    fn append(&self, line: &str) -> Result<(), RelayError> {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(line.to_owned());
        Ok(())
    }
}
