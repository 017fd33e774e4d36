//! Connection seams between the relay core and the transport.
//!
//! A client connection is split in two halves:
//!
//! - a [`FrameSource`], owned exclusively by the session task that reads it;
//! - a [`FrameSink`], shared behind an `Arc` so the broadcaster can write to
//!   it from any task.
//!
//! The WebSocket transport in `relay-server` implements both traits; the
//! [`mock`] module provides an in-memory pair for tests and benchmarks.

use async_trait::async_trait;
use thiserror::Error;

pub mod mock;

/// A transport-level failure, carried as text so the core stays independent
/// of any particular transport's error type.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{0}")]
pub struct TransportError(pub String);

impl TransportError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self(reason.into())
    }
}

/// Write half of a client connection.
#[async_trait]
pub trait FrameSink: Send + Sync {
    /// Sends one UTF-8 text frame.
    async fn write_frame(&self, frame: &str) -> Result<(), TransportError>;

    /// Closes the connection. Closing an already closed sink is not an error.
    async fn close(&self) -> Result<(), TransportError>;
}

/// Read half of a client connection.
#[async_trait]
pub trait FrameSource: Send {
    /// Waits for the next inbound text frame.
    ///
    /// Returns `Ok(None)` when the peer closed the connection cleanly.
    async fn read_frame(&mut self) -> Result<Option<String>, TransportError>;
}
