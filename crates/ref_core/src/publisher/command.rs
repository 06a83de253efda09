//! External command channel: widget and intent handlers write a request,
//! the running session drains it at most once.

use std::fs::{read, remove_file, rename, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Result;

pub const COMMAND_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LiveActivityCommand {
    Pause,
    Resume,
    StartHalfTime,
    StartSecondHalf,
}

impl LiveActivityCommand {
    pub fn as_str(self) -> &'static str {
        match self {
            LiveActivityCommand::Pause => "pause",
            LiveActivityCommand::Resume => "resume",
            LiveActivityCommand::StartHalfTime => "start-half-time",
            LiveActivityCommand::StartSecondHalf => "start-second-half",
        }
    }
}

impl FromStr for LiveActivityCommand {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace(['-', '_'], "").as_str() {
            "pause" => Ok(LiveActivityCommand::Pause),
            "resume" => Ok(LiveActivityCommand::Resume),
            "starthalftime" => Ok(LiveActivityCommand::StartHalfTime),
            "startsecondhalf" => Ok(LiveActivityCommand::StartSecondHalf),
            other => Err(format!("unknown command '{}'", other)),
        }
    }
}

impl std::fmt::Display for LiveActivityCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandEnvelope {
    pub version: u32,
    pub id: Uuid,
    pub command: LiveActivityCommand,
    pub issued_at: DateTime<Utc>,
}

impl CommandEnvelope {
    pub fn new(command: LiveActivityCommand) -> Self {
        Self { version: COMMAND_VERSION, id: Uuid::new_v4(), command, issued_at: Utc::now() }
    }

    /// Undecodable or future-version payloads read as "no command".
    pub fn decode(bytes: &[u8]) -> Option<CommandEnvelope> {
        match serde_json::from_slice::<CommandEnvelope>(bytes) {
            Ok(envelope) if envelope.version <= COMMAND_VERSION => Some(envelope),
            Ok(envelope) => {
                log::warn!("Discarding command with unsupported version {}", envelope.version);
                None
            }
            Err(e) => {
                log::warn!("Discarding undecodable command: {}", e);
                None
            }
        }
    }
}

/// Durable single-slot store shared between the writer (intent handler)
/// and the reader (session). Last write wins.
pub trait CommandStore: Send + Sync {
    fn write(&self, command: LiveActivityCommand) -> Result<CommandEnvelope>;

    /// Removes and returns the pending envelope. A second call without a new
    /// write returns `None`.
    fn consume(&self) -> Option<CommandEnvelope>;

    fn clear(&self) -> Result<()>;
}

/// One JSON file in the shared directory.
#[derive(Debug, Clone)]
pub struct FileCommandStore {
    path: PathBuf,
}

impl FileCommandStore {
    pub const FILE_NAME: &'static str = "live_activity_command.v1.json";

    pub fn new(shared_dir: impl AsRef<Path>) -> Self {
        Self { path: shared_dir.as_ref().join(Self::FILE_NAME) }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the pending envelope without consuming it.
    pub fn peek(&self) -> Option<CommandEnvelope> {
        let bytes = read(&self.path).ok()?;
        CommandEnvelope::decode(&bytes)
    }
}

impl CommandStore for FileCommandStore {
    fn write(&self, command: LiveActivityCommand) -> Result<CommandEnvelope> {
        let envelope = CommandEnvelope::new(command);
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_vec(&envelope)?;

        let temp_path = self.path.with_extension(format!("{}.tmp", envelope.id));
        {
            let mut file = File::create(&temp_path)?;
            file.write_all(&data)?;
            file.sync_all()?;
        }
        rename(&temp_path, &self.path)?;

        log::info!("Wrote command {} ({})", envelope.command, envelope.id);
        Ok(envelope)
    }

    fn consume(&self) -> Option<CommandEnvelope> {
        // Claim the file first; only one consumer can win the rename.
        let claimed = self.path.with_extension(format!("{}.claimed", Uuid::new_v4()));
        match rename(&self.path, &claimed) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => return None,
            Err(e) => {
                log::warn!("Failed to claim pending command: {}", e);
                return None;
            }
        }

        let bytes = read(&claimed);
        if let Err(e) = remove_file(&claimed) {
            log::warn!("Failed to remove claimed command {:?}: {}", claimed, e);
        }
        match bytes {
            Ok(bytes) => CommandEnvelope::decode(&bytes),
            Err(e) => {
                log::warn!("Failed to read claimed command: {}", e);
                None
            }
        }
    }

    fn clear(&self) -> Result<()> {
        match remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[derive(Debug, Default)]
pub struct InMemoryCommandStore {
    slot: Mutex<Option<Vec<u8>>>,
}

impl InMemoryCommandStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Places raw bytes in the slot, as a foreign writer might.
    pub fn write_raw(&self, bytes: Vec<u8>) {
        *self.slot.lock().unwrap_or_else(|e| e.into_inner()) = Some(bytes);
    }
}

impl CommandStore for InMemoryCommandStore {
    fn write(&self, command: LiveActivityCommand) -> Result<CommandEnvelope> {
        let envelope = CommandEnvelope::new(command);
        self.write_raw(serde_json::to_vec(&envelope)?);
        Ok(envelope)
    }

    fn consume(&self) -> Option<CommandEnvelope> {
        let bytes = self.slot.lock().unwrap_or_else(|e| e.into_inner()).take()?;
        CommandEnvelope::decode(&bytes)
    }

    fn clear(&self) -> Result<()> {
        self.slot.lock().unwrap_or_else(|e| e.into_inner()).take();
        Ok(())
    }
}

/// What the command handler needs from the match.
pub trait MatchCommandTarget {
    fn is_match_in_progress(&self) -> bool;
    fn is_paused(&self) -> bool;
    fn is_waiting_for_half_time(&self) -> bool;
    fn is_waiting_for_second_half(&self) -> bool;

    fn pause_match(&mut self);
    fn resume_match(&mut self);
    fn start_half_time_manually(&mut self);
    fn start_second_half_manually(&mut self);
}

#[derive(Debug)]
pub struct CommandHandler<S> {
    store: S,
}

impl<S: CommandStore> CommandHandler<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Consumes the pending command and applies it when the match is in a
    /// state that accepts it. Returns the applied command.
    pub fn process_pending<T: MatchCommandTarget + ?Sized>(
        &self,
        target: &mut T,
    ) -> Option<LiveActivityCommand> {
        let envelope = self.store.consume()?;
        let applied = match envelope.command {
            LiveActivityCommand::Pause if target.is_match_in_progress() && !target.is_paused() => {
                target.pause_match();
                true
            }
            LiveActivityCommand::Resume if target.is_match_in_progress() && target.is_paused() => {
                target.resume_match();
                true
            }
            LiveActivityCommand::StartHalfTime if target.is_waiting_for_half_time() => {
                target.start_half_time_manually();
                true
            }
            LiveActivityCommand::StartSecondHalf if target.is_waiting_for_second_half() => {
                target.start_second_half_manually();
                true
            }
            _ => false,
        };

        if applied {
            tracing::info!(command = %envelope.command, id = %envelope.id, "external command applied");
            Some(envelope.command)
        } else {
            tracing::debug!(command = %envelope.command, "external command not valid now, dropped");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[derive(Default)]
    struct FakeMatch {
        in_progress: bool,
        paused: bool,
        waiting_half_time: bool,
        waiting_second_half: bool,
        calls: Vec<&'static str>,
    }

    impl MatchCommandTarget for FakeMatch {
        fn is_match_in_progress(&self) -> bool {
            self.in_progress
        }
        fn is_paused(&self) -> bool {
            self.paused
        }
        fn is_waiting_for_half_time(&self) -> bool {
            self.waiting_half_time
        }
        fn is_waiting_for_second_half(&self) -> bool {
            self.waiting_second_half
        }
        fn pause_match(&mut self) {
            self.paused = true;
            self.calls.push("pause");
        }
        fn resume_match(&mut self) {
            self.paused = false;
            self.calls.push("resume");
        }
        fn start_half_time_manually(&mut self) {
            self.calls.push("half_time");
        }
        fn start_second_half_manually(&mut self) {
            self.calls.push("second_half");
        }
    }

    #[test]
    fn test_file_store_consumes_once() {
        let dir = TempDir::new().unwrap();
        let store = FileCommandStore::new(dir.path());
        let written = store.write(LiveActivityCommand::Pause).unwrap();

        assert_eq!(store.peek().map(|e| e.id), Some(written.id));
        assert_eq!(store.consume().map(|e| e.id), Some(written.id));
        assert!(store.consume().is_none());
        assert!(!store.path().exists());
    }

    #[test]
    fn test_last_write_wins() {
        let dir = TempDir::new().unwrap();
        let store = FileCommandStore::new(dir.path());
        store.write(LiveActivityCommand::Pause).unwrap();
        store.write(LiveActivityCommand::Resume).unwrap();
        assert_eq!(store.consume().map(|e| e.command), Some(LiveActivityCommand::Resume));
    }

    #[test]
    fn test_corrupt_payload_reads_as_no_command_and_is_removed() {
        let dir = TempDir::new().unwrap();
        let store = FileCommandStore::new(dir.path());
        std::fs::write(store.path(), b"{not json").unwrap();
        assert!(store.consume().is_none());
        assert!(!store.path().exists());
    }

    #[test]
    fn test_future_version_is_ignored() {
        let store = InMemoryCommandStore::new();
        let mut envelope = CommandEnvelope::new(LiveActivityCommand::Pause);
        envelope.version = COMMAND_VERSION + 1;
        store.write_raw(serde_json::to_vec(&envelope).unwrap());
        assert!(store.consume().is_none());
    }

    #[test]
    fn test_clear_is_quiet_when_empty() {
        let dir = TempDir::new().unwrap();
        let store = FileCommandStore::new(dir.path());
        store.clear().unwrap();
        store.write(LiveActivityCommand::StartHalfTime).unwrap();
        store.clear().unwrap();
        assert!(store.consume().is_none());
    }

    #[test]
    fn test_handler_applies_only_valid_commands() {
        let handler = CommandHandler::new(InMemoryCommandStore::new());
        let mut target = FakeMatch { in_progress: true, ..Default::default() };

        handler.store().write(LiveActivityCommand::Resume).unwrap();
        assert_eq!(handler.process_pending(&mut target), None);

        handler.store().write(LiveActivityCommand::Pause).unwrap();
        assert_eq!(handler.process_pending(&mut target), Some(LiveActivityCommand::Pause));
        assert_eq!(handler.process_pending(&mut target), None, "consumed already");

        handler.store().write(LiveActivityCommand::StartSecondHalf).unwrap();
        assert_eq!(handler.process_pending(&mut target), None);

        target.waiting_second_half = true;
        handler.store().write(LiveActivityCommand::StartSecondHalf).unwrap();
        assert_eq!(handler.process_pending(&mut target), Some(LiveActivityCommand::StartSecondHalf));
        assert_eq!(target.calls, vec!["pause", "second_half"]);
    }

    #[test]
    fn test_command_parsing() {
        assert_eq!("start-half-time".parse::<LiveActivityCommand>().unwrap(), LiveActivityCommand::StartHalfTime);
        assert_eq!("startSecondHalf".parse::<LiveActivityCommand>().unwrap(), LiveActivityCommand::StartSecondHalf);
        assert!("kickoff".parse::<LiveActivityCommand>().is_err());
    }
}
