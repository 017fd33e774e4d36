//! Registry: the thread-safe list of live sessions.
//!
//! Sessions are kept in insertion order so listings are stable, and are
//! matched by their [`SessionId`] only. Two sessions may share a name and an
//! address; they never share an id.
//!
//! # Locking
//!
//! A single `tokio::sync::RwLock` guards the list. Nothing awaits while the
//! lock is held: callers that need to do I/O per session take a
//! [`Registry::snapshot`] and iterate it after the lock is released, so one
//! slow recipient cannot stall connects and disconnects.
//!
//! A linear scan is fine at the expected scale (tens to low hundreds of
//! sessions).

use std::net::IpAddr;

use tokio::sync::RwLock;
use tracing::debug;

use crate::error::RelayError;
use crate::session::{Session, SessionId};

/// The set of live sessions, in connection order.
///
/// A plain `Vec` behind an async `RwLock`: membership changes take the write
/// lock briefly, and readers copy the list out with [`Registry::snapshot`]
/// so that no network write ever happens while the lock is held. A linear
/// scan is fast enough for the few hundred clients a relay serves.
#[derive(Debug, Default)]
pub struct Registry {
    sessions: RwLock<Vec<Session>>,
}

impl Registry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a session.
    ///
    /// # Errors
    ///
    /// [`RelayError::DuplicateSession`] if a session with the same id is
    /// already registered.
    pub async fn register(&self, session: Session) -> Result<(), RelayError> {
        let mut sessions = self.sessions.write().await;
        if sessions.iter().any(|s| s.id() == session.id()) {
            return Err(RelayError::DuplicateSession(session.id()));
        }
        debug!("registered session {}", session.id());
        sessions.push(session);
        Ok(())
    }

    /// Removes the session with `id`. Returns whether anything was removed;
    /// removing an absent id is a no-op.
    pub async fn unregister(&self, id: SessionId) -> bool {
        let mut sessions = self.sessions.write().await;
        match sessions.iter().position(|s| s.id() == id) {
            Some(index) => {
                sessions.remove(index);
                debug!("unregistered session {id}");
                true
            }
            None => false,
        }
    }

    /// Copies the current list for lock-free iteration.
    pub async fn snapshot(&self) -> Vec<Session> {
        self.sessions.read().await.clone()
    }

    /// Number of registered sessions, named or not.
    pub async fn count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Whether any registered session has claimed `address`.
    pub async fn contains(&self, address: IpAddr) -> bool {
        self.sessions
            .read()
            .await
            .iter()
            .any(|s| s.address() == Some(address))
    }

    /// A handle to the session with `id`, if it is still registered.
    pub async fn get(&self, id: SessionId) -> Option<Session> {
        self.sessions
            .read()
            .await
            .iter()
            .find(|s| s.id() == id)
            .cloned()
    }
}
