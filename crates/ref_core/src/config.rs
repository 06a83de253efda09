//! Match configuration and runtime settings.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::capabilities::Platform;
use crate::error::Result;

/// Immutable-at-start description of a match.
///
/// Created during setup and frozen once the match kicks off; the session only
/// ever hands out shared references after that point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct MatchConfiguration {
    #[validate(length(min = 1, max = 40))]
    pub home_team: String,
    #[validate(length(min = 1, max = 40))]
    pub away_team: String,
    /// Total regulation duration, split evenly across `number_of_periods`.
    #[validate(range(min = 60, max = 14400))]
    pub duration_secs: u32,
    #[validate(range(min = 1, max = 4))]
    pub number_of_periods: u8,
    #[validate(range(max = 3600))]
    pub half_time_secs: u32,
    /// Length of each extra-time half.
    #[validate(range(max = 1800))]
    pub extra_time_half_secs: u32,
    pub has_extra_time: bool,
    pub has_penalties: bool,
    #[validate(range(min = 1, max = 10))]
    pub penalty_initial_rounds: u8,
    /// Go straight to penalties after a level regulation when extra time is
    /// disabled. Off by default.
    pub penalties_without_extra_time: bool,
    #[validate(length(max = 80))]
    pub competition_name: Option<String>,
    #[validate(length(max = 80))]
    pub venue_name: Option<String>,
}

impl Default for MatchConfiguration {
    fn default() -> Self {
        Self {
            home_team: "HOM".to_string(),
            away_team: "AWA".to_string(),
            duration_secs: 90 * 60,
            number_of_periods: 2,
            half_time_secs: 15 * 60,
            extra_time_half_secs: 15 * 60,
            has_extra_time: false,
            has_penalties: false,
            penalty_initial_rounds: 5,
            penalties_without_extra_time: false,
            competition_name: None,
            venue_name: None,
        }
    }
}

impl MatchConfiguration {
    pub fn new(home_team: impl Into<String>, away_team: impl Into<String>) -> Self {
        Self { home_team: home_team.into(), away_team: away_team.into(), ..Default::default() }
    }

    pub fn with_duration_minutes(mut self, minutes: u32, periods: u8) -> Self {
        self.duration_secs = minutes * 60;
        self.number_of_periods = periods;
        self
    }

    pub fn with_half_time_minutes(mut self, minutes: u32) -> Self {
        self.half_time_secs = minutes * 60;
        self
    }

    pub fn with_extra_time(mut self, half_minutes: u32) -> Self {
        self.has_extra_time = true;
        self.extra_time_half_secs = half_minutes * 60;
        self
    }

    pub fn with_penalties(mut self, initial_rounds: u8) -> Self {
        self.has_penalties = true;
        self.penalty_initial_rounds = initial_rounds;
        self
    }

    pub fn regulation_periods(&self) -> u8 {
        self.number_of_periods.max(1)
    }

    /// Index of the last extra-time half, or of the last regulation period
    /// when extra time is disabled.
    pub fn last_timed_period(&self) -> u8 {
        self.regulation_periods() + if self.has_extra_time { 2 } else { 0 }
    }

    /// Period index used for the shootout.
    pub fn penalties_period(&self) -> u8 {
        self.last_timed_period() + 1
    }

    pub fn is_extra_time_period(&self, period: u8) -> bool {
        let regular = self.regulation_periods();
        period > regular && period <= regular + 2
    }

    /// Configured length of `period` (1-based). Penalties and out-of-range
    /// indices have no running clock and report zero.
    pub fn period_length(&self, period: u8) -> Duration {
        let regular = self.regulation_periods();
        if period == 0 {
            Duration::ZERO
        } else if period <= regular {
            Duration::from_secs(self.duration_secs as u64) / regular as u32
        } else if self.is_extra_time_period(period) {
            Duration::from_secs(self.extra_time_half_secs as u64)
        } else {
            Duration::ZERO
        }
    }

    /// Sum of the configured lengths of every period before `period`.
    pub fn nominal_elapsed_before(&self, period: u8) -> Duration {
        (1..period).map(|p| self.period_length(p)).sum()
    }

    pub fn half_time_length(&self) -> Duration {
        Duration::from_secs(self.half_time_secs as u64)
    }

    /// Period after which the half-time interval is played.
    pub fn half_time_after_period(&self) -> Option<u8> {
        let regular = self.regulation_periods();
        (regular >= 2).then_some(regular / 2)
    }
}

/// Runtime settings loaded from YAML.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreSettings {
    /// Directory holding the completed-match history.
    pub data_dir: PathBuf,
    /// Directory shared with the widget and intent handlers.
    pub shared_dir: PathBuf,
    pub platform: Platform,
    pub recent_limit: usize,
    pub default_match: MatchConfiguration,
}

impl Default for CoreSettings {
    fn default() -> Self {
        let base = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        Self {
            data_dir: base.join("data"),
            shared_dir: base.join("shared"),
            platform: Platform::Auto,
            recent_limit: 50,
            default_match: MatchConfiguration::default(),
        }
    }
}

impl CoreSettings {
    pub const DATA_DIR_ENV: &'static str = "REFWATCH_DATA_DIR";
    pub const SHARED_DIR_ENV: &'static str = "REFWATCH_SHARED_DIR";

    /// Loads settings from `path`, falling back to defaults when the file does
    /// not exist. Environment overrides are applied last.
    pub fn load(path: &Path) -> Result<Self> {
        let settings = if path.exists() {
            let raw = std::fs::read_to_string(path)?;
            Self::from_yaml(&raw)?
        } else {
            log::debug!("Settings file {:?} not found, using defaults", path);
            Self::default()
        };
        Ok(settings.with_env_overrides())
    }

    pub fn from_yaml(raw: &str) -> Result<Self> {
        let settings: CoreSettings = serde_yaml::from_str(raw)?;
        settings.default_match.validate()?;
        Ok(settings)
    }

    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(dir) = std::env::var(Self::DATA_DIR_ENV) {
            self.data_dir = PathBuf::from(dir);
        }
        if let Ok(dir) = std::env::var(Self::SHARED_DIR_ENV) {
            self.shared_dir = PathBuf::from(dir);
        }
        if self.platform == Platform::Auto {
            self.platform = Platform::detect();
        }
        self
    }
}
