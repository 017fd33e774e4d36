//! The top-level relay object.
//!
//! [`Relay`] owns the registry, the mute table, the broadcaster, the shutdown
//! coordinator and the event log. Transports and the operator console get an
//! `Arc<Relay>` and go through it; there is no global state.

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use crate::broadcast::Broadcaster;
use crate::connection::{FrameSink, FrameSource};
use crate::error::RelayError;
use crate::event_log::{record, LogSink};
use crate::lifecycle::{SessionDriver, SessionSummary};
use crate::mute::MuteTable;
use crate::registry::Registry;
use crate::shutdown::ShutdownCoordinator;

pub const NO_USERS: &str = "No connected users.";
pub const MUTED_NOTICE: &str = "(SERVER) Muted.";
pub const UNMUTED_NOTICE: &str = "(SERVER) Unmuted.";

/// Timeouts applied to connection I/O.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelaySettings {
    /// Upper bound for a single frame write.
    pub write_timeout: Duration,
    /// Upper bound for closing one connection.
    pub close_timeout: Duration,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            write_timeout: Duration::from_secs(5),
            close_timeout: Duration::from_secs(2),
        }
    }
}

/// Owns every piece of relay state and exposes the operations the transport
/// and the operator console need.
///
/// One `Relay` is created at startup and shared as `Arc<Relay>`. Each
/// accepted connection calls [`Relay::serve_session`] from its own task; the
/// console calls the operator methods (`say`, `mute_address`, `list_users`,
/// `initiate_shutdown`).
pub struct Relay {
    registry: Arc<Registry>,
    mutes: MuteTable,
    broadcaster: Arc<Broadcaster>,
    shutdown: ShutdownCoordinator,
    log: Arc<dyn LogSink>,
    settings: RelaySettings,
}

impl Relay {
    /// Builds an empty relay that records events to `log`.
    pub fn new(log: Arc<dyn LogSink>, settings: RelaySettings) -> Self {
        let registry = Arc::new(Registry::new());
        let broadcaster = Arc::new(Broadcaster::new(
            Arc::clone(&registry),
            settings.write_timeout,
        ));
        let shutdown = ShutdownCoordinator::new(
            Arc::clone(&registry),
            Arc::clone(&broadcaster),
            Arc::clone(&log),
            settings.close_timeout,
        );
        Self {
            registry,
            mutes: MuteTable::new(),
            broadcaster,
            shutdown,
            log,
            settings,
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn broadcaster(&self) -> &Broadcaster {
        &self.broadcaster
    }

    pub fn shutdown(&self) -> &ShutdownCoordinator {
        &self.shutdown
    }

    pub fn settings(&self) -> RelaySettings {
        self.settings
    }

    /// Appends a line to the event log; failures become warnings.
    pub fn log(&self, line: &str) {
        record(&*self.log, line);
    }

    /// Registers a new connection and drives it until it closes.
    ///
    /// # Errors
    ///
    /// Only [`RelayError::DuplicateSession`], which cannot happen with freshly
    /// generated ids.
    pub async fn serve_session<S: FrameSource>(
        self: &Arc<Self>,
        peer: IpAddr,
        sink: Arc<dyn FrameSink>,
        source: S,
    ) -> Result<SessionSummary, RelayError> {
        let driver = SessionDriver::open(Arc::clone(self), peer, sink, source).await?;
        Ok(driver.run().await)
    }

    pub async fn set_muted(&self, address: IpAddr, muted: bool) {
        self.mutes.set_muted(address, muted).await;
    }

    pub async fn is_muted(&self, address: IpAddr) -> bool {
        self.mutes.is_muted(address).await
    }

    /// Whether at least one connected session has claimed a name.
    pub async fn has_claimed_sessions(&self) -> bool {
        self.registry
            .snapshot()
            .await
            .iter()
            .any(|s| s.identity().is_some())
    }

    /// Whether some connected session has claimed `address`.
    pub async fn is_known_address(&self, address: IpAddr) -> bool {
        self.registry.contains(address).await
    }

    /// Operator mute/unmute: validates the target, flips the flag, tells the
    /// affected sessions and logs the action.
    ///
    /// # Errors
    ///
    /// [`RelayError::UnknownAddress`] if no connected session has `address`;
    /// the flag is left untouched.
    pub async fn mute_address(&self, address: IpAddr, muted: bool) -> Result<(), RelayError> {
        if !self.is_known_address(address).await {
            return Err(RelayError::unknown_address(address));
        }
        self.set_muted(address, muted).await;
        let (notice, verb) = if muted {
            (MUTED_NOTICE, "muted")
        } else {
            (UNMUTED_NOTICE, "unmuted")
        };
        self.broadcaster.send_to_address(address, notice).await;
        self.log(&format!("{address} {verb}."));
        Ok(())
    }

    /// Operator announcement to everyone.
    pub async fn say(&self, text: &str) {
        let line = format!("SERVER: {text}");
        self.log(&line);
        self.broadcaster.broadcast_all(&line).await;
    }

    pub async fn initiate_shutdown(&self, reason: &str) -> bool {
        self.shutdown.initiate(reason).await
    }

    /// Human-readable listing of connected users.
    ///
    /// Only sessions that have claimed a name are listed. With `admin_view`
    /// each name carries its address and, if muted, a `MUTED` marker.
    pub async fn list_users(&self, admin_view: bool) -> String {
        let mut entries = Vec::new();
        for session in self.registry.snapshot().await {
            let Some(identity) = session.identity() else {
                continue;
            };
            if !admin_view {
                entries.push(identity.name.clone());
            } else if self.is_muted(identity.address).await {
                entries.push(format!("{} ({}, MUTED)", identity.name, identity.address));
            } else {
                entries.push(format!("{} ({})", identity.name, identity.address));
            }
        }

        if entries.is_empty() {
            return NO_USERS.to_string();
        }
        format!("Connected users ({}): {}", entries.len(), entries.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::mock::{mock_connection, MockClient};
    use crate::event_log::MemoryLogSink;
    use crate::session::Session;
    use tokio_test::assert_ok;

    fn make_relay() -> (Arc<Relay>, Arc<MemoryLogSink>) {
        let log = Arc::new(MemoryLogSink::new());
        let relay = Arc::new(Relay::new(log.clone(), RelaySettings::default()));
        (relay, log)
    }

    async fn join(relay: &Relay, peer: &str, name: &str) -> MockClient {
        let (client, sink, _source) = mock_connection();
        let session = Session::new(peer.parse().unwrap(), sink);
        session.claim_identity(name).unwrap();
        relay.registry().register(session).await.unwrap();
        client
    }

    fn addr(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    #[tokio::test]
    async fn test_list_users_empty() {
        let (relay, _) = make_relay();
        assert_eq!(relay.list_users(true).await, "No connected users.");
        assert_eq!(relay.list_users(false).await, "No connected users.");
    }

    #[tokio::test]
    async fn test_list_users_admin_view_marks_muted_address() {
        // Arrange
        let (relay, _) = make_relay();
        join(&relay, "10.0.0.1", "Alice").await;
        join(&relay, "10.0.0.2", "Bob").await;
        relay.set_muted(addr("10.0.0.2"), true).await;

        // Act
        let admin = relay.list_users(true).await;
        let public = relay.list_users(false).await;

        // Assert
        assert_eq!(
            admin,
            "Connected users (2): Alice (10.0.0.1), Bob (10.0.0.2, MUTED)"
        );
        assert_eq!(public, "Connected users (2): Alice, Bob");
        assert!(!public.contains("10.0.0."));
    }

    #[tokio::test]
    async fn test_list_users_skips_unclaimed_sessions() {
        let (relay, _) = make_relay();
        let (_client, sink, _source) = mock_connection();
        relay
            .registry()
            .register(Session::new(addr("10.0.0.9"), sink))
            .await
            .unwrap();

        assert_eq!(relay.list_users(true).await, "No connected users.");
    }

    #[tokio::test]
    async fn test_has_claimed_sessions_ignores_unnamed_connections() {
        // Arrange: one connection that has not sent its name yet
        let (relay, _) = make_relay();
        let (_client, sink, _source) = mock_connection();
        relay
            .registry()
            .register(Session::new(addr("10.0.0.9"), sink))
            .await
            .unwrap();
        assert!(!relay.has_claimed_sessions().await);

        // Act
        let _alice = join(&relay, "10.0.0.1", "Alice").await;

        // Assert
        assert!(relay.has_claimed_sessions().await);
    }

    #[tokio::test]
    async fn test_mute_address_rejects_unknown_address() {
        let (relay, log) = make_relay();

        let result = relay.mute_address(addr("10.9.9.9"), true).await;

        assert_eq!(result, Err(RelayError::UnknownAddress("10.9.9.9".to_string())));
        assert!(!relay.is_muted(addr("10.9.9.9")).await);
        assert!(log.lines().is_empty());
    }

    #[tokio::test]
    async fn test_mute_and_unmute_notify_target_and_log() {
        let (relay, log) = make_relay();
        let bob = join(&relay, "10.0.0.2", "Bob").await;
        let alice = join(&relay, "10.0.0.1", "Alice").await;

        assert_ok!(relay.mute_address(addr("10.0.0.2"), true).await);
        assert!(relay.is_muted(addr("10.0.0.2")).await);
        assert_ok!(relay.mute_address(addr("10.0.0.2"), false).await);
        assert!(!relay.is_muted(addr("10.0.0.2")).await);

        assert_eq!(bob.messages(), vec!["(SERVER) Muted.", "(SERVER) Unmuted."]);
        assert!(alice.messages().is_empty());
        assert_eq!(log.lines(), vec!["10.0.0.2 muted.", "10.0.0.2 unmuted."]);
    }

    #[tokio::test]
    async fn test_set_muted_does_not_require_live_session() {
        let (relay, _) = make_relay();
        relay.set_muted(addr("10.0.0.3"), true).await;
        assert!(relay.is_muted(addr("10.0.0.3")).await);
        assert!(!relay.is_known_address(addr("10.0.0.3")).await);
    }

    #[tokio::test]
    async fn test_say_logs_and_broadcasts() {
        let (relay, log) = make_relay();
        let alice = join(&relay, "10.0.0.1", "Alice").await;

        relay.say("maintenance at noon").await;

        assert_eq!(alice.messages(), vec!["SERVER: maintenance at noon"]);
        assert_eq!(log.lines(), vec!["SERVER: maintenance at noon"]);
    }
}
