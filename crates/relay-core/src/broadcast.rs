//! Broadcaster: timestamped sends to one, several, or all sessions.
//!
//! Fan-out works on a registry snapshot and writes to every recipient
//! concurrently, each write bounded by `write_timeout`. A failing recipient
//! only affects itself: the failure is recorded in the [`DeliveryReport`], the
//! session is asked to close (its own task then unregisters it), and every
//! other recipient still gets the frame.

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use tokio::time::timeout;
use tracing::warn;

use crate::error::RelayError;
use crate::registry::Registry;
use crate::session::Session;
use crate::timestamp::stamp;

/// Outcome of a multi-recipient send.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DeliveryReport {
    /// Number of recipients that accepted the frame.
    pub delivered: usize,
    /// One [`RelayError::WriteFailed`] per recipient that did not.
    pub failures: Vec<RelayError>,
}

impl DeliveryReport {
    pub fn attempted(&self) -> usize {
        self.delivered + self.failures.len()
    }

    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Timestamped fan-out to one session, one address, or everyone.
///
/// Recipients are taken from a registry snapshot and written concurrently,
/// each write bounded by `write_timeout`. A recipient that fails or stalls is
/// recorded in the [`DeliveryReport`] and asked to close; it never delays or
/// prevents delivery to the others.
pub struct Broadcaster {
    registry: Arc<Registry>,
    write_timeout: Duration,
}

impl Broadcaster {
    /// Creates a broadcaster over `registry`.
    pub fn new(registry: Arc<Registry>, write_timeout: Duration) -> Self {
        Self {
            registry,
            write_timeout,
        }
    }

    pub fn write_timeout(&self) -> Duration {
        self.write_timeout
    }

    /// Sends `message` to exactly one session.
    ///
    /// # Errors
    ///
    /// [`RelayError::WriteFailed`] if the write fails or times out. The
    /// session is then asked to close.
    pub async fn send_to_session(&self, session: &Session, message: &str) -> Result<(), RelayError> {
        self.deliver(session, &stamp(message)).await
    }

    /// Sends `message` to every live session that claimed `address`.
    pub async fn send_to_address(&self, address: IpAddr, message: &str) -> DeliveryReport {
        let recipients: Vec<Session> = self
            .registry
            .snapshot()
            .await
            .into_iter()
            .filter(|s| s.address() == Some(address))
            .collect();
        self.fan_out(&recipients, message).await
    }

    /// Sends `message` to every session in the registry at call time.
    pub async fn broadcast_all(&self, message: &str) -> DeliveryReport {
        let recipients = self.registry.snapshot().await;
        self.fan_out(&recipients, message).await
    }

    async fn fan_out(&self, recipients: &[Session], message: &str) -> DeliveryReport {
        let frame = stamp(message);
        let outcomes = join_all(recipients.iter().map(|s| self.deliver(s, &frame))).await;

        let mut report = DeliveryReport::default();
        for outcome in outcomes {
            match outcome {
                Ok(()) => report.delivered += 1,
                Err(e) => report.failures.push(e),
            }
        }
        report
    }

    async fn deliver(&self, session: &Session, frame: &str) -> Result<(), RelayError> {
        let reason = match timeout(self.write_timeout, session.sink().write_frame(frame)).await {
            Ok(Ok(())) => return Ok(()),
            Ok(Err(e)) => e.to_string(),
            Err(_) => format!("write timed out after {:?}", self.write_timeout),
        };

        warn!("session {}: {reason}; scheduling removal", session.id());
        session.request_close();
        Err(RelayError::WriteFailed {
            session: session.id(),
            reason,
        })
    }
}
