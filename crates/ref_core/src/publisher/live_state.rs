//! Reduced live projection shared with the widget, plus its timeline policy.

use std::fs::{read, remove_file, rename, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Result;

pub const LIVE_STATE_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiveActivityState {
    pub version: u32,
    pub match_id: Uuid,
    pub home_abbr: String,
    pub away_abbr: String,
    pub home_score: u16,
    pub away_score: u16,
    pub period_label: String,
    pub is_paused: bool,
    pub is_in_stoppage: bool,
    pub period_start: DateTime<Utc>,
    /// Only set while the period clock runs with time left and no stoppage.
    pub expected_period_end: Option<DateTime<Utc>>,
    /// Period-elapsed seconds frozen at the pause.
    pub elapsed_at_pause: Option<u64>,
    pub stoppage_accumulated: u64,
    pub can_pause: bool,
    pub can_resume: bool,
    pub can_start_half_time: bool,
    pub can_start_second_half: bool,
    pub last_updated: DateTime<Utc>,
}

/// Short code for a team name: kept as-is up to four characters, otherwise
/// the first three letters.
pub fn team_abbreviation(name: &str) -> String {
    let trimmed = name.trim();
    if trimmed.chars().count() <= 4 {
        return trimmed.to_uppercase();
    }
    trimmed.chars().filter(|c| c.is_alphanumeric()).take(3).collect::<String>().to_uppercase()
}

pub trait LiveStateStore: Send + Sync {
    fn write(&self, state: &LiveActivityState) -> Result<()>;
    /// Undecodable data reads as `None`.
    fn read(&self) -> Option<LiveActivityState>;
    fn clear(&self) -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct FileLiveStateStore {
    path: PathBuf,
}

impl FileLiveStateStore {
    pub const FILE_NAME: &'static str = "live_activity_state.v1.json";

    pub fn new(shared_dir: impl AsRef<Path>) -> Self {
        Self { path: shared_dir.as_ref().join(Self::FILE_NAME) }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl LiveStateStore for FileLiveStateStore {
    fn write(&self, state: &LiveActivityState) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_vec_pretty(state)?;
        let temp_path = self.path.with_extension("tmp");
        {
            let mut file = File::create(&temp_path)?;
            file.write_all(&data)?;
            file.flush()?;
        }
        rename(&temp_path, &self.path)?;
        log::debug!("Published live state ({} bytes) to {:?}", data.len(), self.path);
        Ok(())
    }

    fn read(&self) -> Option<LiveActivityState> {
        let bytes = read(&self.path).ok()?;
        match serde_json::from_slice(&bytes) {
            Ok(state) => Some(state),
            Err(e) => {
                log::warn!("Ignoring undecodable live state at {:?}: {}", self.path, e);
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
pub struct InMemoryLiveStateStore {
    state: Mutex<Option<LiveActivityState>>,
}

impl InMemoryLiveStateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LiveStateStore for InMemoryLiveStateStore {
    fn write(&self, state: &LiveActivityState) -> Result<()> {
        *self.state.lock().unwrap_or_else(|e| e.into_inner()) = Some(state.clone());
        Ok(())
    }

    fn read(&self) -> Option<LiveActivityState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn clear(&self) -> Result<()> {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).take();
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Widget timeline
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WidgetEntry {
    pub date: DateTime<Utc>,
    pub period_label: String,
    pub is_paused: bool,
    pub expected_period_end: Option<DateTime<Utc>>,
    pub home_abbr: String,
    pub away_abbr: String,
    pub home_score: u16,
    pub away_score: u16,
}

impl WidgetEntry {
    pub fn placeholder(now: DateTime<Utc>) -> Self {
        Self {
            date: now,
            period_label: "No Match".to_string(),
            is_paused: false,
            expected_period_end: None,
            home_abbr: "HOM".to_string(),
            away_abbr: "AWA".to_string(),
            home_score: 0,
            away_score: 0,
        }
    }

    pub fn from_state(state: &LiveActivityState, now: DateTime<Utc>) -> Self {
        Self {
            date: now,
            period_label: state.period_label.clone(),
            is_paused: state.is_paused,
            expected_period_end: state.expected_period_end,
            home_abbr: state.home_abbr.clone(),
            away_abbr: state.away_abbr.clone(),
            home_score: state.home_score,
            away_score: state.away_score,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "at", rename_all = "snake_case")]
pub enum ReloadPolicy {
    After(DateTime<Utc>),
    Never,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WidgetTimeline {
    pub entries: Vec<WidgetEntry>,
    pub policy: ReloadPolicy,
}

impl WidgetTimeline {
    /// Single-entry timeline. A running period asks to be rebuilt when it is
    /// expected to end; anything else waits for the next explicit publish.
    pub fn for_state(state: Option<&LiveActivityState>, now: DateTime<Utc>) -> Self {
        match state {
            Some(state) => {
                let policy = match state.expected_period_end {
                    Some(end) if !state.is_paused && end > now => ReloadPolicy::After(end),
                    _ => ReloadPolicy::Never,
                };
                Self { entries: vec![WidgetEntry::from_state(state, now)], policy }
            }
            None => Self { entries: vec![WidgetEntry::placeholder(now)], policy: ReloadPolicy::Never },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample_state(now: DateTime<Utc>) -> LiveActivityState {
        LiveActivityState {
            version: LIVE_STATE_VERSION,
            match_id: Uuid::new_v4(),
            home_abbr: "CIT".into(),
            away_abbr: "UNI".into(),
            home_score: 1,
            away_score: 0,
            period_label: "First Half".into(),
            is_paused: false,
            is_in_stoppage: false,
            period_start: now,
            expected_period_end: Some(now + chrono::Duration::minutes(45)),
            elapsed_at_pause: None,
            stoppage_accumulated: 0,
            can_pause: true,
            can_resume: false,
            can_start_half_time: false,
            can_start_second_half: false,
            last_updated: now,
        }
    }

    #[test]
    fn test_abbreviation() {
        assert_eq!(team_abbreviation("Manchester City"), "MAN");
        assert_eq!(team_abbreviation("psg"), "PSG");
        assert_eq!(team_abbreviation("St. Mirren"), "STM");
    }

    #[test]
    fn test_file_store_write_read_clear() {
        let dir = TempDir::new().unwrap();
        let store = FileLiveStateStore::new(dir.path());
        assert!(store.read().is_none());

        let state = sample_state(Utc::now());
        store.write(&state).unwrap();
        assert_eq!(store.read(), Some(state));

        store.clear().unwrap();
        assert!(store.read().is_none());
        store.clear().unwrap();
    }

    #[test]
    fn test_corrupt_state_reads_as_none() {
        let dir = TempDir::new().unwrap();
        let store = FileLiveStateStore::new(dir.path());
        std::fs::write(store.path(), b"[]").unwrap();
        assert!(store.read().is_none());
    }

    #[test]
    fn test_timeline_policy() {
        let now = Utc::now();
        let mut state = sample_state(now);
        let timeline = WidgetTimeline::for_state(Some(&state), now);
        assert_eq!(timeline.policy, ReloadPolicy::After(now + chrono::Duration::minutes(45)));

        state.is_paused = true;
        state.expected_period_end = None;
        assert_eq!(WidgetTimeline::for_state(Some(&state), now).policy, ReloadPolicy::Never);

        let empty = WidgetTimeline::for_state(None, now);
        assert_eq!(empty.policy, ReloadPolicy::Never);
        assert_eq!(empty.entries[0].period_label, "No Match");
    }
}
