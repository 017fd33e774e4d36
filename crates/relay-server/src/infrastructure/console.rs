//! Operator console.
//!
//! Reads command lines from a channel (fed by [`spawn_stdin_reader`] in
//! production, by the test directly otherwise) and writes prompts and
//! replies to any [`Write`]. The console stops when its input ends, after a
//! confirmed `shutdown`, or when the relay shuts down for another reason.

use std::io::{self, BufRead, Write};
use std::net::IpAddr;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, warn};

use relay_core::command::parse_confirmation;
use relay_core::{AdminCommand, Relay, RelayError, HELP_TEXT};

use crate::infrastructure::file_log::FileLogSink;

const SAY_PROMPT: &str = "Enter message: ";
const CONFIRM_PROMPT: &str = "Are you sure? (y/n) ";

/// Whether the console keeps reading after a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Stop,
}

pub struct Console<W: Write> {
    relay: Arc<Relay>,
    log: Arc<FileLogSink>,
    lines: mpsc::Receiver<String>,
    out: W,
}

impl<W: Write> Console<W> {
    pub fn new(
        relay: Arc<Relay>,
        log: Arc<FileLogSink>,
        lines: mpsc::Receiver<String>,
        out: W,
    ) -> Self {
        Self {
            relay,
            log,
            lines,
            out,
        }
    }

    pub fn output(&self) -> &W {
        &self.out
    }

    /// Processes commands until the console stops.
    ///
    /// # Errors
    ///
    /// Only failures writing to the output.
    pub async fn run(&mut self) -> io::Result<()> {
        while let Some(line) = self.next_line().await {
            if line.is_empty() {
                continue;
            }
            let flow = match line.parse::<AdminCommand>() {
                Ok(command) => {
                    debug!("console command: {command}");
                    self.execute(command).await?
                }
                Err(e) => {
                    writeln!(self.out, "{e}")?;
                    Flow::Continue
                }
            };
            if flow == Flow::Stop {
                break;
            }
        }
        debug!("console stopped");
        Ok(())
    }

    async fn execute(&mut self, command: AdminCommand) -> io::Result<Flow> {
        match command {
            AdminCommand::Help => {
                writeln!(self.out, "{HELP_TEXT}")?;
            }
            AdminCommand::Say => {
                self.prompt(SAY_PROMPT)?;
                let Some(text) = self.next_line().await else {
                    return Ok(Flow::Stop);
                };
                self.relay.say(&text).await;
            }
            AdminCommand::Users => {
                let listing = self.relay.list_users(true).await;
                writeln!(self.out, "{listing}")?;
            }
            AdminCommand::Mute => return self.mute_prompt(true).await,
            AdminCommand::Unmute => return self.mute_prompt(false).await,
            AdminCommand::ToggleEcho => {
                let state = if self.log.toggle_echo() { "on" } else { "off" };
                writeln!(self.out, "Log echo is now {state}.")?;
            }
            AdminCommand::DeletePreviousLogs => match self.log.delete_previous_logs() {
                Ok(count) => {
                    self.relay.log("Deleted previous logs.");
                    writeln!(self.out, "Deleted {count} previous log file(s).")?;
                }
                Err(e) => writeln!(self.out, "{e}")?,
            },
            AdminCommand::Shutdown => return self.confirm_shutdown().await,
        }
        Ok(Flow::Continue)
    }

    async fn mute_prompt(&mut self, muted: bool) -> io::Result<Flow> {
        let verb = if muted { "mute" } else { "unmute" };
        if !self.relay.has_claimed_sessions().await {
            writeln!(self.out, "No users available to {verb}.")?;
            return Ok(Flow::Continue);
        }

        loop {
            self.prompt(&format!(
                "Enter IP to {verb} (`users` for list, `cancel` to cancel): "
            ))?;
            let Some(answer) = self.next_line().await else {
                return Ok(Flow::Stop);
            };
            match answer.as_str() {
                "cancel" => return Ok(Flow::Continue),
                "users" => {
                    let listing = self.relay.list_users(true).await;
                    writeln!(self.out, "{listing}")?;
                    continue;
                }
                _ => {}
            }

            let result = match answer.parse::<IpAddr>() {
                Ok(address) => self.relay.mute_address(address, muted).await,
                Err(_) => Err(RelayError::UnknownAddress(answer)),
            };
            match result {
                Ok(()) => return Ok(Flow::Continue),
                Err(e) => writeln!(self.out, "{e}")?,
            }
        }
    }

    async fn confirm_shutdown(&mut self) -> io::Result<Flow> {
        loop {
            self.prompt(CONFIRM_PROMPT)?;
            let Some(answer) = self.next_line().await else {
                return Ok(Flow::Stop);
            };
            match parse_confirmation(&answer) {
                Some(true) => {
                    self.relay.initiate_shutdown("admin command").await;
                    return Ok(Flow::Stop);
                }
                Some(false) => return Ok(Flow::Continue),
                None => continue,
            }
        }
    }

    fn prompt(&mut self, text: &str) -> io::Result<()> {
        write!(self.out, "{text}")?;
        self.out.flush()
    }

    /// Next input line without its line terminator, or `None` once input
    /// ends or the relay has shut down.
    async fn next_line(&mut self) -> Option<String> {
        tokio::select! {
            line = self.lines.recv() => {
                line.map(|l| l.trim_end_matches(['\r', '\n']).to_owned())
            }
            () = self.relay.shutdown().stopped() => None,
        }
    }
}

/// Forwards stdin lines into a channel from a dedicated OS thread.
///
/// A blocking stdin read inside the runtime would keep it from shutting
/// down, so the read happens off-runtime and the thread exits when the
/// receiver is dropped or stdin closes.
pub fn spawn_stdin_reader() -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel(16);
    let spawned = std::thread::Builder::new()
        .name("console-stdin".to_string())
        .spawn(move || {
            for line in io::stdin().lock().lines() {
                let Ok(line) = line else { break };
                if tx.blocking_send(line).is_err() {
                    break;
                }
            }
        });
    if let Err(e) = spawned {
        warn!("console disabled, cannot start stdin reader: {e}");
    }
    rx
}
