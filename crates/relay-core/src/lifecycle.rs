//! Per-connection state machine.
//!
//! A [`SessionDriver`] is created for every accepted connection and driven by
//! that connection's own task, so frames from one client are handled strictly
//! in the order they were read.
//!
//! ```text
//! open() ─► Connecting ──first frame (name)──► Active ──frames──► Active
//!               │                                 │
//!               └──── end of stream / read error / close request ──► Closed
//! ```

use std::net::IpAddr;
use std::sync::Arc;

use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::connection::{FrameSink, FrameSource};
use crate::error::RelayError;
use crate::relay::{Relay, MUTED_NOTICE};
use crate::session::{Identity, Session, SessionId, SessionState};

pub const WELCOME_NOTICE: &str = "(SERVER) Welcome! Type `/help` for a list of commands.";

/// Why a session reached [`SessionState::Closed`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseCause {
    /// The peer closed the connection.
    EndOfStream,
    /// Reading failed; carries a [`RelayError::ReadFailed`].
    ReadFailed(RelayError),
    /// Someone else asked for the close: a failed write, or shutdown.
    CloseRequested,
}

/// What is left of a session after it closed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSummary {
    pub id: SessionId,
    pub name: Option<String>,
    pub message_count: u64,
    pub cause: CloseCause,
}

pub struct SessionDriver<S> {
    relay: Arc<Relay>,
    session: Session,
    source: S,
    state: SessionState,
    message_count: u64,
}

impl<S: FrameSource> SessionDriver<S> {
    /// Creates the session and registers it.
    pub async fn open(
        relay: Arc<Relay>,
        peer: IpAddr,
        sink: Arc<dyn FrameSink>,
        source: S,
    ) -> Result<Self, RelayError> {
        let session = Session::new(peer, sink);
        relay.registry().register(session.clone()).await?;
        debug!("session {} connecting from {peer}", session.id());
        Ok(Self {
            relay,
            session,
            source,
            state: SessionState::Connecting,
            message_count: 0,
        })
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn message_count(&self) -> u64 {
        self.message_count
    }

    /// Processes frames until the session closes, then tears it down.
    pub async fn run(mut self) -> SessionSummary {
        // A connection that registered after the shutdown snapshot was taken
        // must not outlive the shutdown.
        let cause = if self.relay.shutdown().in_shutdown() {
            CloseCause::CloseRequested
        } else {
            self.read_loop().await
        };
        self.close(cause).await
    }

    async fn read_loop(&mut self) -> CloseCause {
        loop {
            let frame = tokio::select! {
                frame = self.source.read_frame() => frame,
                () = self.session.close_requested() => return CloseCause::CloseRequested,
            };
            match frame {
                Ok(Some(payload)) => self.handle_frame(payload).await,
                Ok(None) => return CloseCause::EndOfStream,
                Err(e) => {
                    return CloseCause::ReadFailed(RelayError::ReadFailed {
                        session: self.session.id(),
                        reason: e.to_string(),
                    })
                }
            }
        }
    }

    /// Classifies one inbound frame according to the current state.
    pub async fn handle_frame(&mut self, payload: String) {
        match self.state {
            SessionState::Connecting => {
                self.message_count += 1;
                self.claim(payload).await;
            }
            SessionState::Active => {
                self.message_count += 1;
                self.relay_message(&payload).await;
            }
            SessionState::Closed => {}
        }
    }

    async fn claim(&mut self, name: String) {
        let identity = match self.session.claim_identity(name) {
            Ok(identity) => identity.clone(),
            Err(e) => {
                warn!("{e}");
                return;
            }
        };
        self.state = SessionState::Active;

        // A failed welcome already scheduled this session for removal.
        let _ = self
            .relay
            .broadcaster()
            .send_to_session(&self.session, WELCOME_NOTICE)
            .await;

        let suffix = if self.relay.is_muted(identity.address).await {
            " (MUTED)"
        } else {
            ""
        };
        self.relay.log(&format!(
            "{} ({}) connected.{suffix}",
            identity.name, identity.address
        ));
        self.relay
            .broadcaster()
            .broadcast_all(&format!("{} connected.{suffix}", identity.name))
            .await;
    }

    async fn relay_message(&self, payload: &str) {
        let Some(Identity { name, address }) = self.session.identity() else {
            return;
        };
        if self.relay.is_muted(*address).await {
            let _ = self
                .relay
                .broadcaster()
                .send_to_session(&self.session, MUTED_NOTICE)
                .await;
            return;
        }
        self.relay.log(&format!("{name} ({address}) says: {payload}"));
        self.relay
            .broadcaster()
            .broadcast_all(&format!("{name} says: {payload}"))
            .await;
    }

    async fn close(mut self, cause: CloseCause) -> SessionSummary {
        self.state = SessionState::Closed;
        let id = self.session.id();
        let removed = self.relay.registry().unregister(id).await;

        match &cause {
            CloseCause::ReadFailed(e) => debug!("{e}"),
            other => debug!("session {id} closing: {other:?}"),
        }

        // Sessions that never claimed a name leave silently, and so does
        // everyone during a shutdown: the shutdown notice covers them.
        if let Some(identity) = self.session.identity().filter(|_| removed) {
            if let Some(_gate) = self.relay.shutdown().admit_announcement().await {
                let notice = format!("{} left.", identity.name);
                self.relay.log(&notice);
                self.relay.broadcaster().broadcast_all(&notice).await;
            }
        }

        let close_timeout = self.relay.settings().close_timeout;
        match timeout(close_timeout, self.session.sink().close()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => debug!("session {id}: close after disconnect failed: {e}"),
            Err(_) => debug!("session {id}: close after disconnect timed out"),
        }

        info!(
            "session {id} closed after {} frame(s)",
            self.message_count
        );
        SessionSummary {
            id,
            name: self.session.display_name().map(str::to_owned),
            message_count: self.message_count,
            cause,
        }
    }
}
