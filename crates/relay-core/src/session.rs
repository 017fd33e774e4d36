//! One connected client: identity token, write-once identity, connection.
//!
//! A [`Session`] is a cheap handle (`Clone` copies a few `Arc`s). The registry
//! stores one clone, each registry snapshot hands out more, and the session's
//! own task keeps the original. All clones observe the same identity and the
//! same close signal.

use std::fmt;
use std::net::IpAddr;
use std::sync::{Arc, OnceLock};

use tokio::sync::Notify;
use uuid::Uuid;

use crate::connection::FrameSink;
use crate::error::RelayError;

/// Opaque identity token assigned when a session is created.
pub type SessionId = Uuid;

/// The name and address a session claims with its first frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub name: String,
    pub address: IpAddr,
}

/// Lifecycle states of a session.
///
/// ```text
/// Connecting ──first frame──► Active ──read failure / close──► Closed
///      └──────────────read failure / close───────────────────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Registered, no frame received yet.
    Connecting,
    /// Identity claimed; frames are relayed.
    Active,
    /// Unregistered. Terminal.
    Closed,
}

/// One connected client.
///
/// `Session` is a cheap handle: clones share the identity, the write half of
/// the connection and the close signal. The registry, the broadcaster and
/// the session's own task each hold a clone, so a failed write observed by
/// the broadcaster can wake the owning task through
/// [`Session::request_close`].
#[derive(Clone)]
pub struct Session {
    id: SessionId,
    peer: IpAddr,
    identity: Arc<OnceLock<Identity>>,
    sink: Arc<dyn FrameSink>,
    close_signal: Arc<Notify>,
}

impl Session {
    /// Creates a session for a connection from `peer` with a fresh id.
    pub fn new(peer: IpAddr, sink: Arc<dyn FrameSink>) -> Self {
        Self {
            id: Uuid::new_v4(),
            peer,
            identity: Arc::new(OnceLock::new()),
            sink,
            close_signal: Arc::new(Notify::new()),
        }
    }

    /// Unique for the lifetime of the process; removal from the registry is
    /// by this id only.
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Remote address reported by the transport at connect time.
    pub fn peer(&self) -> IpAddr {
        self.peer
    }

    pub fn identity(&self) -> Option<&Identity> {
        self.identity.get()
    }

    /// Display name, once claimed.
    pub fn display_name(&self) -> Option<&str> {
        self.identity().map(|i| i.name.as_str())
    }

    /// Address, once the identity has been claimed.
    pub fn address(&self) -> Option<IpAddr> {
        self.identity().map(|i| i.address)
    }

    /// Sets the display name (and with it the address). Succeeds once.
    ///
    /// # Errors
    ///
    /// [`RelayError::IdentityAlreadyClaimed`] on every call after the first.
    pub fn claim_identity(&self, name: impl Into<String>) -> Result<&Identity, RelayError> {
        let candidate = Identity {
            name: name.into(),
            address: self.peer,
        };
        self.identity
            .set(candidate)
            .map_err(|_| RelayError::IdentityAlreadyClaimed(self.id))?;
        self.identity
            .get()
            .ok_or(RelayError::IdentityAlreadyClaimed(self.id))
    }

    pub fn sink(&self) -> &Arc<dyn FrameSink> {
        &self.sink
    }

    /// Asks the task that owns this session to close it.
    ///
    /// The request is remembered if the task is not currently waiting, so it
    /// can never be lost.
    pub fn request_close(&self) {
        self.close_signal.notify_one();
    }

    /// Resolves once [`Session::request_close`] has been called.
    pub async fn close_requested(&self) {
        self.close_signal.notified().await;
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("peer", &self.peer)
            .field("identity", &self.identity.get())
            .finish_non_exhaustive()
    }
}
