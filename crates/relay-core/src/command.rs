//! Operator console commands.
//!
//! The console itself (reading lines, prompting) lives in `relay-server`; this
//! module only defines what the operator can type.

use std::fmt;
use std::str::FromStr;

use crate::error::RelayError;

pub const HELP_TEXT: &str = "Commands: say, users, mute, unmute, tmp, delprevlogs, shutdown";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdminCommand {
    Help,
    /// Broadcast an operator message.
    Say,
    /// Print the admin user listing.
    Users,
    Mute,
    Unmute,
    /// Toggle console echo of event log lines.
    ToggleEcho,
    /// Delete every log file except the active one.
    DeletePreviousLogs,
    /// Shut the relay down (after confirmation).
    Shutdown,
}

impl AdminCommand {
    pub fn keyword(self) -> &'static str {
        match self {
            Self::Help => "help",
            Self::Say => "say",
            Self::Users => "users",
            Self::Mute => "mute",
            Self::Unmute => "unmute",
            Self::ToggleEcho => "tmp",
            Self::DeletePreviousLogs => "delprevlogs",
            Self::Shutdown => "shutdown",
        }
    }
}

impl FromStr for AdminCommand {
    type Err = RelayError;

    /// Commands are matched exactly, like the operator typed them.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "help" => Ok(Self::Help),
            "say" => Ok(Self::Say),
            "users" => Ok(Self::Users),
            "mute" => Ok(Self::Mute),
            "unmute" => Ok(Self::Unmute),
            "tmp" => Ok(Self::ToggleEcho),
            "delprevlogs" => Ok(Self::DeletePreviousLogs),
            "shutdown" => Ok(Self::Shutdown),
            other => Err(RelayError::InvalidCommand(other.to_string())),
        }
    }
}

impl fmt::Display for AdminCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword())
    }
}

/// Answer to a y/n prompt. Anything other than `y` or `n` is `None`.
pub fn parse_confirmation(line: &str) -> Option<bool> {
    match line {
        "y" => Some(true),
        "n" => Some(false),
        _ => None,
    }
}
