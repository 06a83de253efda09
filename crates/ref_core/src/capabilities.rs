//! Injected platform capabilities: haptics, connectivity and sync notices.
//!
//! Every implementation is chosen once at startup by [`Capabilities::for_platform`]
//! and handed to the session; nothing here is looked up globally.

use std::fmt;
use std::fs::{rename, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::completed::CompletedMatch;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    #[default]
    Auto,
    Watch,
    Phone,
    Headless,
}

impl Platform {
    pub const ENV: &'static str = "REFWATCH_PLATFORM";

    /// Resolves the running platform from `REFWATCH_PLATFORM`, defaulting to
    /// headless.
    pub fn detect() -> Platform {
        std::env::var(Self::ENV)
            .ok()
            .and_then(|raw| raw.parse::<Platform>().ok())
            .filter(|p| *p != Platform::Auto)
            .unwrap_or(Platform::Headless)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Platform::Auto => "auto",
            Platform::Watch => "watch",
            Platform::Phone => "phone",
            Platform::Headless => "headless",
        }
    }
}

impl FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(Platform::Auto),
            "watch" | "watchos" => Ok(Platform::Watch),
            "phone" | "ios" => Ok(Platform::Phone),
            "headless" | "cli" => Ok(Platform::Headless),
            other => Err(format!("unknown platform '{}'", other)),
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Haptics
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HapticEvent {
    Success,
    Failure,
    Warning,
    Notification,
    Click,
    Start,
}

/// Fire-and-forget feedback. Implementations must not block.
pub trait Haptics: Send + Sync {
    fn play(&self, event: HapticEvent);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopHaptics;

impl Haptics for NoopHaptics {
    fn play(&self, _event: HapticEvent) {}
}

/// Traces each event; stands in for the wrist engine.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogHaptics;

impl Haptics for LogHaptics {
    fn play(&self, event: HapticEvent) {
        tracing::debug!(?event, "haptic");
    }
}

/// Captures events for assertions. Clones share the same buffer.
#[derive(Debug, Clone, Default)]
pub struct RecordingHaptics {
    played: Arc<Mutex<Vec<HapticEvent>>>,
}

impl RecordingHaptics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<HapticEvent> {
        self.played.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn count(&self, event: HapticEvent) -> usize {
        self.events().iter().filter(|e| **e == event).count()
    }

    pub fn clear(&self) {
        self.played.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }
}

impl Haptics for RecordingHaptics {
    fn play(&self, event: HapticEvent) {
        self.played.lock().unwrap_or_else(|e| e.into_inner()).push(event);
    }
}

// ---------------------------------------------------------------------------
// Sync notices
// ---------------------------------------------------------------------------

/// Out-of-band outcome reports. Nothing in the match flow waits on these.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncNotice {
    PersistenceFailed { match_id: Uuid, message: String },
    SyncFallback { match_id: Uuid, transport: String },
    SyncFailed { match_id: Uuid, message: String },
}

#[derive(Debug, Clone)]
pub struct NoticeCenter {
    sender: broadcast::Sender<SyncNotice>,
}

impl Default for NoticeCenter {
    fn default() -> Self {
        Self::new()
    }
}

impl NoticeCenter {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(64);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncNotice> {
        self.sender.subscribe()
    }

    pub fn publish(&self, notice: SyncNotice) {
        tracing::warn!(?notice, "sync notice");
        // No subscribers is fine.
        let _ = self.sender.send(notice);
    }
}

// ---------------------------------------------------------------------------
// Connectivity
// ---------------------------------------------------------------------------

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Transport '{0}' is not reachable")]
    Unavailable(String),

    #[error("Transport IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Encoding error: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Rejected by peer: {0}")]
    Rejected(String),
}

impl SyncError {
    /// Recoverable failures are retried on the fallback transport.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, SyncError::Unavailable(_) | SyncError::Io(_))
    }
}

/// One way of getting a completed match to the paired device.
pub trait SyncTransport: Send + Sync {
    fn name(&self) -> &str;
    fn is_available(&self) -> bool;
    fn send(&self, record: &CompletedMatch) -> Result<(), SyncError>;
}

/// Always unreachable. Used as the live channel on headless runs.
#[derive(Debug, Clone)]
pub struct UnavailableTransport {
    name: String,
}

impl UnavailableTransport {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl SyncTransport for UnavailableTransport {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_available(&self) -> bool {
        false
    }

    fn send(&self, _record: &CompletedMatch) -> Result<(), SyncError> {
        Err(SyncError::Unavailable(self.name.clone()))
    }
}

/// Durable queue: one JSON file per completed match, picked up by whichever
/// bridge runs next.
#[derive(Debug, Clone)]
pub struct OutboxTransport {
    name: String,
    dir: PathBuf,
}

impl OutboxTransport {
    pub fn new(name: impl Into<String>, dir: impl AsRef<Path>) -> Self {
        Self { name: name.into(), dir: dir.as_ref().to_path_buf() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Match ids waiting in the outbox.
    pub fn pending(&self) -> Result<Vec<Uuid>, SyncError> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }
        let mut ids = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if let Some(id) = path.file_stem().and_then(|s| s.to_str()).and_then(|s| Uuid::parse_str(s).ok()) {
                ids.push(id);
            }
        }
        ids.sort();
        Ok(ids)
    }
}

impl SyncTransport for OutboxTransport {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_available(&self) -> bool {
        true
    }

    fn send(&self, record: &CompletedMatch) -> Result<(), SyncError> {
        std::fs::create_dir_all(&self.dir)?;
        let payload = serde_json::to_vec_pretty(record)?;

        let path = self.dir.join(format!("{}.json", record.id));
        let temp_path = path.with_extension("tmp");
        {
            let mut file = File::create(&temp_path)?;
            file.write_all(&payload)?;
            file.sync_all()?;
        }
        rename(&temp_path, &path)?;

        log::debug!("Queued completed match {} in {:?}", record.id, self.dir);
        Ok(())
    }
}

/// Capability used by the session to hand off a finalized match.
pub trait Connectivity: Send + Sync {
    fn is_available(&self) -> bool;

    /// Best effort. Outcomes are reported through [`SyncNotice`]s only.
    fn send_completed_match(&self, record: &CompletedMatch);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopConnectivity;

impl Connectivity for NoopConnectivity {
    fn is_available(&self) -> bool {
        false
    }

    fn send_completed_match(&self, _record: &CompletedMatch) {}
}

/// Primary transport with a durable fallback.
pub struct ConnectivityClient {
    primary: Box<dyn SyncTransport>,
    fallback: Option<Box<dyn SyncTransport>>,
    notices: NoticeCenter,
}

impl fmt::Debug for ConnectivityClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectivityClient")
            .field("primary", &self.primary.name())
            .field("fallback", &self.fallback.as_ref().map(|t| t.name().to_string()))
            .finish()
    }
}

impl ConnectivityClient {
    pub fn new(primary: Box<dyn SyncTransport>, notices: NoticeCenter) -> Self {
        Self { primary, fallback: None, notices }
    }

    pub fn with_fallback(mut self, fallback: Box<dyn SyncTransport>) -> Self {
        self.fallback = Some(fallback);
        self
    }

    fn send_via_fallback(&self, record: &CompletedMatch, cause: &SyncError) {
        let Some(fallback) = &self.fallback else {
            self.notices.publish(SyncNotice::SyncFailed { match_id: record.id, message: cause.to_string() });
            return;
        };
        match fallback.send(record) {
            Ok(()) => self.notices.publish(SyncNotice::SyncFallback {
                match_id: record.id,
                transport: fallback.name().to_string(),
            }),
            Err(e) => {
                tracing::error!(match_id = %record.id, error = %e, "fallback transport failed");
                self.notices.publish(SyncNotice::SyncFailed { match_id: record.id, message: e.to_string() });
            }
        }
    }
}

impl Connectivity for ConnectivityClient {
    fn is_available(&self) -> bool {
        self.primary.is_available() || self.fallback.as_ref().is_some_and(|t| t.is_available())
    }

    fn send_completed_match(&self, record: &CompletedMatch) {
        if !self.primary.is_available() {
            let cause = SyncError::Unavailable(self.primary.name().to_string());
            self.send_via_fallback(record, &cause);
            return;
        }
        match self.primary.send(record) {
            Ok(()) => tracing::info!(match_id = %record.id, transport = self.primary.name(), "completed match sent"),
            Err(e) if e.is_recoverable() => {
                tracing::warn!(match_id = %record.id, error = %e, "primary transport failed, falling back");
                self.send_via_fallback(record, &e);
            }
            Err(e) => {
                tracing::error!(match_id = %record.id, error = %e, "completed match sync failed");
                self.notices.publish(SyncNotice::SyncFailed { match_id: record.id, message: e.to_string() });
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Selection
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct Capabilities {
    pub platform: Platform,
    pub haptics: Arc<dyn Haptics>,
    pub connectivity: Arc<dyn Connectivity>,
    pub notices: NoticeCenter,
}

impl fmt::Debug for Capabilities {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Capabilities").field("platform", &self.platform).finish()
    }
}

impl Capabilities {
    /// Wires the implementations for `platform`. Exchange files live under
    /// `shared_dir`.
    pub fn for_platform(platform: Platform, shared_dir: &Path) -> Capabilities {
        let platform = if platform == Platform::Auto { Platform::detect() } else { platform };
        let notices = NoticeCenter::new();
        let outbox = Box::new(OutboxTransport::new("outbox", shared_dir.join("outbox")));

        let haptics: Arc<dyn Haptics> = match platform {
            Platform::Watch => Arc::new(LogHaptics),
            _ => Arc::new(NoopHaptics),
        };
        let primary: Box<dyn SyncTransport> = match platform {
            Platform::Watch | Platform::Phone => {
                Box::new(OutboxTransport::new("companion", shared_dir.join("companion")))
            }
            Platform::Headless | Platform::Auto => Box::new(UnavailableTransport::new("companion")),
        };

        let connectivity = ConnectivityClient::new(primary, notices.clone()).with_fallback(outbox);
        tracing::debug!(%platform, ?connectivity, "capabilities selected");

        Capabilities { platform, haptics, connectivity: Arc::new(connectivity), notices }
    }

    /// Silent capabilities for tests and replays.
    pub fn headless() -> Capabilities {
        Capabilities {
            platform: Platform::Headless,
            haptics: Arc::new(NoopHaptics),
            connectivity: Arc::new(NoopConnectivity),
            notices: NoticeCenter::new(),
        }
    }

    pub fn with_haptics(mut self, haptics: Arc<dyn Haptics>) -> Self {
        self.haptics = haptics;
        self
    }

    pub fn with_connectivity(mut self, connectivity: Arc<dyn Connectivity>) -> Self {
        self.connectivity = connectivity;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::completed::SCHEMA_VERSION;
    use crate::config::MatchConfiguration;
    use crate::events::Score;
    use chrono::Utc;
    use tempfile::TempDir;

    fn record() -> CompletedMatch {
        CompletedMatch {
            id: Uuid::new_v4(),
            schema_version: SCHEMA_VERSION,
            completed_at: Utc::now(),
            started_at: None,
            configuration: MatchConfiguration::default(),
            score: Score::default(),
            penalties: None,
            events: Vec::new(),
            owner_id: None,
            abandoned: false,
        }
    }

    struct FailingTransport(fn() -> SyncError);

    impl SyncTransport for FailingTransport {
        fn name(&self) -> &str {
            "failing"
        }
        fn is_available(&self) -> bool {
            true
        }
        fn send(&self, _record: &CompletedMatch) -> Result<(), SyncError> {
            Err((self.0)())
        }
    }

    #[test]
    fn test_platform_parse() {
        assert_eq!("Watch".parse::<Platform>().unwrap(), Platform::Watch);
        assert_eq!("ios".parse::<Platform>().unwrap(), Platform::Phone);
        assert!("toaster".parse::<Platform>().is_err());
    }

    #[test]
    fn test_recording_haptics_shares_buffer() {
        let haptics = RecordingHaptics::new();
        let handle = haptics.clone();
        haptics.play(HapticEvent::Start);
        haptics.play(HapticEvent::Notification);
        assert_eq!(handle.events(), vec![HapticEvent::Start, HapticEvent::Notification]);
        assert_eq!(handle.count(HapticEvent::Start), 1);
    }

    #[test]
    fn test_outbox_writes_one_file_per_match() {
        let temp_dir = TempDir::new().unwrap();
        let outbox = OutboxTransport::new("outbox", temp_dir.path().join("outbox"));
        let m = record();
        outbox.send(&m).unwrap();
        outbox.send(&m).unwrap();
        assert_eq!(outbox.pending().unwrap(), vec![m.id]);
    }

    #[test]
    fn test_recoverable_failure_uses_fallback() {
        let temp_dir = TempDir::new().unwrap();
        let notices = NoticeCenter::new();
        let mut rx = notices.subscribe();
        let outbox = OutboxTransport::new("outbox", temp_dir.path());
        let client = ConnectivityClient::new(
            Box::new(FailingTransport(|| SyncError::Unavailable("peer".into()))),
            notices,
        )
        .with_fallback(Box::new(outbox.clone()));

        let m = record();
        client.send_completed_match(&m);

        assert_eq!(outbox.pending().unwrap(), vec![m.id]);
        assert_eq!(
            rx.try_recv().unwrap(),
            SyncNotice::SyncFallback { match_id: m.id, transport: "outbox".into() }
        );
    }

    #[test]
    fn test_non_recoverable_failure_is_reported() {
        let temp_dir = TempDir::new().unwrap();
        let notices = NoticeCenter::new();
        let mut rx = notices.subscribe();
        let outbox = OutboxTransport::new("outbox", temp_dir.path());
        let client = ConnectivityClient::new(
            Box::new(FailingTransport(|| SyncError::Rejected("schema".into()))),
            notices,
        )
        .with_fallback(Box::new(outbox.clone()));

        let m = record();
        client.send_completed_match(&m);

        assert!(outbox.pending().unwrap().is_empty());
        assert!(matches!(rx.try_recv().unwrap(), SyncNotice::SyncFailed { .. }));
    }

    #[test]
    fn test_headless_selection_falls_back_to_outbox() {
        let temp_dir = TempDir::new().unwrap();
        let caps = Capabilities::for_platform(Platform::Headless, temp_dir.path());
        let mut rx = caps.notices.subscribe();
        assert!(caps.connectivity.is_available());

        let m = record();
        caps.connectivity.send_completed_match(&m);
        assert!(temp_dir.path().join("outbox").join(format!("{}.json", m.id)).exists());
        assert!(matches!(rx.try_recv().unwrap(), SyncNotice::SyncFallback { .. }));
    }
}
