//! Once-only collective shutdown.
//!
//! The sequence is:
//!
//! 1. flip `in_shutdown` (first caller only);
//! 2. log and broadcast `(SERVER) Shutdown by <reason>.` to every session;
//! 3. close every session's connection from a fresh snapshot, all at once
//!    and each bounded by the close timeout;
//! 4. signal the transport to stop accepting and end its serving loop.
//!
//! Because the flag flips before any connection is closed, every disconnect
//! path triggered by step 3 sees `in_shutdown == true` and stays silent, so
//! the shutdown notice is the only message participants receive.
//!
//! Leave announcements racing a shutdown go through
//! [`ShutdownCoordinator::admit_announcement`]: an announcement admitted
//! before the flag flipped is fully delivered before the notice goes out,
//! and none is admitted afterwards.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use tokio::sync::{watch, RwLock, RwLockReadGuard};
use tokio::time::timeout;
use tracing::{info, warn};

use crate::broadcast::Broadcaster;
use crate::event_log::{record, LogSink};
use crate::registry::Registry;
use crate::session::Session;

pub struct ShutdownCoordinator {
    in_shutdown: AtomicBool,
    announce_gate: RwLock<()>,
    stop_tx: watch::Sender<bool>,
    registry: Arc<Registry>,
    broadcaster: Arc<Broadcaster>,
    log: Arc<dyn LogSink>,
    close_timeout: Duration,
}

impl ShutdownCoordinator {
    pub fn new(
        registry: Arc<Registry>,
        broadcaster: Arc<Broadcaster>,
        log: Arc<dyn LogSink>,
        close_timeout: Duration,
    ) -> Self {
        let (stop_tx, _) = watch::channel(false);
        Self {
            in_shutdown: AtomicBool::new(false),
            announce_gate: RwLock::new(()),
            stop_tx,
            registry,
            broadcaster,
            log,
            close_timeout,
        }
    }

    /// Whether a shutdown has been initiated. Never resets.
    pub fn in_shutdown(&self) -> bool {
        self.in_shutdown.load(Ordering::SeqCst)
    }

    /// Admits one participant-visible announcement (a leave notice) if no
    /// shutdown has begun.
    ///
    /// Hold the returned guard while logging and broadcasting; the shutdown
    /// notice is not sent until every outstanding guard is dropped. `None`
    /// means a shutdown is under way and the announcement must be skipped.
    pub async fn admit_announcement(&self) -> Option<RwLockReadGuard<'_, ()>> {
        let guard = self.announce_gate.read().await;
        if self.in_shutdown() {
            return None;
        }
        Some(guard)
    }

    /// Runs the shutdown sequence. Returns `false` if a shutdown was already
    /// initiated, in which case nothing but a log line happens.
    pub async fn initiate(&self, reason: &str) -> bool {
        if self.in_shutdown.swap(true, Ordering::SeqCst) {
            info!("shutdown by {reason} ignored: already shutting down");
            return false;
        }

        let notice = format!("(SERVER) Shutdown by {reason}.");
        let report = {
            // Waits for admitted announcements to finish broadcasting.
            let _gate = self.announce_gate.write().await;
            record(&*self.log, &notice);
            self.broadcaster.broadcast_all(&notice).await
        };
        if !report.is_complete() {
            warn!(
                "shutdown notice reached {} of {} sessions",
                report.delivered,
                report.attempted()
            );
        }

        let sessions = self.registry.snapshot().await;
        join_all(sessions.iter().map(|session| self.close_session(session))).await;

        self.stop_tx.send_replace(true);
        info!("shutdown sequence complete");
        true
    }

    /// Closes one connection and wakes its session task. A stalled close is
    /// abandoned after `close_timeout`.
    async fn close_session(&self, session: &Session) {
        match timeout(self.close_timeout, session.sink().close()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("session {}: close failed: {e}", session.id()),
            Err(_) => warn!("session {}: close timed out", session.id()),
        }
        session.request_close();
    }

    /// Resolves once [`ShutdownCoordinator::initiate`] has finished closing
    /// sessions. Resolves immediately if that already happened.
    pub async fn stopped(&self) {
        let mut rx = self.stop_tx.subscribe();
        // The sender lives as long as `self`, so this only fails if the
        // coordinator is dropped mid-wait.
        let _ = rx.wait_for(|stopped| *stopped).await;
    }

    /// A receiver for transports that need to own their stop signal.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.stop_tx.subscribe()
    }
}
