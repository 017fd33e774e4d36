//! Error type shared by every relay component.

use std::net::IpAddr;

use thiserror::Error;

use crate::session::SessionId;

/// Failures surfaced by the registry, the broadcaster, the session state
/// machine and the operator-facing operations.
///
/// None of these variants is allowed to abort a fan-out: a broadcast collects
/// them per recipient and keeps going.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RelayError {
    /// Sending a frame to one recipient failed or timed out.
    #[error("write to session {session} failed: {reason}")]
    WriteFailed { session: SessionId, reason: String },

    /// The session's connection can no longer be read from.
    #[error("read from session {session} failed: {reason}")]
    ReadFailed { session: SessionId, reason: String },

    /// The operator typed something that is not a known command.
    #[error("invalid command {0}")]
    InvalidCommand(String),

    /// A mute/unmute target does not belong to any connected session.
    #[error("no connected user has address {0}")]
    UnknownAddress(String),

    /// The event log could not be created or written.
    #[error("log storage unavailable: {0}")]
    StorageFailure(String),

    /// A session id was registered twice. This is a programming error.
    #[error("session {0} is already registered")]
    DuplicateSession(SessionId),

    /// The display name of a session was claimed a second time.
    #[error("session {0} already has a display name")]
    IdentityAlreadyClaimed(SessionId),
}

impl RelayError {
    /// Builds an [`RelayError::UnknownAddress`] from a parsed address.
    pub fn unknown_address(address: IpAddr) -> Self {
        Self::UnknownAddress(address.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_write_failed_message_names_session_and_reason() {
        let id = Uuid::new_v4();
        let err = RelayError::WriteFailed {
            session: id,
            reason: "broken pipe".to_string(),
        };
        let text = err.to_string();
        assert!(text.contains(&id.to_string()));
        assert!(text.ends_with("broken pipe"));
    }

    #[test]
    fn test_invalid_command_message_echoes_input() {
        let err = RelayError::InvalidCommand("frobnicate".to_string());
        assert_eq!(err.to_string(), "invalid command frobnicate");
    }

    #[test]
    fn test_unknown_address_from_ip() {
        let err = RelayError::unknown_address("10.1.2.3".parse().unwrap());
        assert_eq!(err, RelayError::UnknownAddress("10.1.2.3".to_string()));
    }
}
