//! In-memory connection for unit tests, integration tests and benchmarks.
//!
//! [`mock_connection`] returns the three pieces a real transport would hand to
//! the relay: a shared [`MockSink`], an exclusively owned [`MockSource`], and a
//! [`MockClient`] that plays the remote peer (injects inbound frames, inspects
//! outbound ones).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::{FrameSink, FrameSource, TransportError};
use crate::timestamp::strip_stamp;

type Inbound = Result<String, TransportError>;

/// Records every frame written to it.
///
/// Writes can be switched to fail or to stall forever, to exercise the
/// broadcaster's failure isolation and write timeout. Closing can be made to
/// fail or to hang the same way.
#[derive(Debug, Default)]
pub struct MockSink {
    frames: Mutex<Vec<String>>,
    closed: AtomicBool,
    fail_writes: AtomicBool,
    stall_writes: AtomicBool,
    fail_close: AtomicBool,
    stall_close: AtomicBool,
}

impl MockSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every frame written so far, timestamp prefix included.
    pub fn frames(&self) -> Vec<String> {
        self.frames
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn set_stall_writes(&self, stall: bool) {
        self.stall_writes.store(stall, Ordering::SeqCst);
    }

    pub fn set_fail_close(&self, fail: bool) {
        self.fail_close.store(fail, Ordering::SeqCst);
    }

    /// Makes `close()` never resolve. The sink is not marked closed.
    pub fn set_stall_close(&self, stall: bool) {
        self.stall_close.store(stall, Ordering::SeqCst);
    }
}

#[async_trait]
impl FrameSink for MockSink {
    async fn write_frame(&self, frame: &str) -> Result<(), TransportError> {
        if self.stall_writes.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(TransportError::new("injected write failure"));
        }
        if self.is_closed() {
            return Err(TransportError::new("connection closed"));
        }
        self.frames
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(frame.to_owned());
        Ok(())
    }

    async fn close(&self) -> Result<(), TransportError> {
        if self.stall_close.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        self.closed.store(true, Ordering::SeqCst);
        if self.fail_close.load(Ordering::SeqCst) {
            return Err(TransportError::new("injected close failure"));
        }
        Ok(())
    }
}

/// Yields whatever the paired [`MockClient`] injects.
#[derive(Debug)]
pub struct MockSource {
    inbound: mpsc::UnboundedReceiver<Inbound>,
}

#[async_trait]
impl FrameSource for MockSource {
    async fn read_frame(&mut self) -> Result<Option<String>, TransportError> {
        match self.inbound.recv().await {
            Some(Ok(frame)) => Ok(Some(frame)),
            Some(Err(e)) => Err(e),
            None => Ok(None),
        }
    }
}

/// The remote end of a mock connection.
#[derive(Debug, Clone)]
pub struct MockClient {
    inbound: mpsc::UnboundedSender<Inbound>,
    sink: Arc<MockSink>,
}

impl MockClient {
    /// Sends a text frame to the relay.
    pub fn send(&self, text: &str) {
        // The source is gone once the session closed; dropping the frame
        // mirrors a write to a closed socket.
        let _ = self.inbound.send(Ok(text.to_owned()));
    }

    /// Makes the relay's next read fail.
    pub fn break_connection(&self, reason: &str) {
        let _ = self.inbound.send(Err(TransportError::new(reason)));
    }

    /// Frames received from the relay, timestamp prefixes removed.
    pub fn messages(&self) -> Vec<String> {
        self.sink
            .frames()
            .iter()
            .map(|f| strip_stamp(f).to_owned())
            .collect()
    }

    pub fn sink(&self) -> &Arc<MockSink> {
        &self.sink
    }

    /// Polls until a received message equals `expected`, or `within` elapses.
    pub async fn wait_for_message(&self, expected: &str, within: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + within;
        loop {
            if self.messages().iter().any(|m| m == expected) {
                return true;
            }
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    /// Polls until the relay closed this connection, or `within` elapses.
    pub async fn wait_for_close(&self, within: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + within;
        while !self.sink.is_closed() {
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        true
    }
}

/// Creates a connected in-memory triple: the peer handle, the write half and
/// the read half.
///
/// Dropping every clone of the [`MockClient`] ends the source cleanly.
pub fn mock_connection() -> (MockClient, Arc<MockSink>, MockSource) {
    let (tx, rx) = mpsc::unbounded_channel();
    let sink = Arc::new(MockSink::new());
    let client = MockClient {
        inbound: tx,
        sink: Arc::clone(&sink),
    };
    (client, sink, MockSource { inbound: rx })
}
