//! Frozen record of a finished match and the builder that emits it.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::MatchConfiguration;
use crate::events::{MatchEventRecord, Score};
use crate::penalties::PenaltyTally;

/// Current `CompletedMatch` schema.
pub const SCHEMA_VERSION: u32 = 1;

fn default_schema_version() -> u32 {
    SCHEMA_VERSION
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletedMatch {
    /// Identity of the match this snapshot was frozen from.
    pub id: Uuid,
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    pub completed_at: DateTime<Utc>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    pub configuration: MatchConfiguration,
    pub score: Score,
    #[serde(default)]
    pub penalties: Option<PenaltyTally>,
    pub events: Vec<MatchEventRecord>,
    #[serde(default)]
    pub owner_id: Option<String>,
    /// Forced to full time before the regulation flow completed.
    #[serde(default)]
    pub abandoned: bool,
}

impl CompletedMatch {
    /// Returns a copy carrying `owner_id` unless one is already attached or
    /// no identity is known.
    pub fn attaching_owner_if_missing(&self, owner_id: Option<&str>) -> CompletedMatch {
        let mut copy = self.clone();
        if copy.owner_id.is_none() {
            if let Some(owner) = owner_id.filter(|o| !o.is_empty()) {
                copy.owner_id = Some(owner.to_string());
            }
        }
        copy
    }

    pub fn summary(&self) -> CompletedMatchSummary {
        CompletedMatchSummary::from(self)
    }
}

/// One-line view used by history listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletedMatchSummary {
    pub id: Uuid,
    pub completed_at: DateTime<Utc>,
    pub home_team: String,
    pub away_team: String,
    pub score: Score,
    pub penalties: Option<PenaltyTally>,
    pub event_count: usize,
}

impl From<&CompletedMatch> for CompletedMatchSummary {
    fn from(m: &CompletedMatch) -> Self {
        Self {
            id: m.id,
            completed_at: m.completed_at,
            home_team: m.configuration.home_team.clone(),
            away_team: m.configuration.away_team.clone(),
            score: m.score,
            penalties: m.penalties,
            event_count: m.events.len(),
        }
    }
}

impl std::fmt::Display for CompletedMatchSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {} - {} {}",
            self.home_team, self.score.home, self.score.away, self.away_team
        )?;
        if let Some(p) = self.penalties {
            write!(f, " ({}-{} pens)", p.home_scored, p.away_scored)?;
        }
        Ok(())
    }
}

/// Everything the builder needs from the live match.
#[derive(Debug, Clone)]
pub struct SnapshotInput<'a> {
    pub match_id: Uuid,
    pub configuration: &'a MatchConfiguration,
    pub score: Score,
    pub penalties: Option<PenaltyTally>,
    pub events: &'a [MatchEventRecord],
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: DateTime<Utc>,
    pub abandoned: bool,
}

/// Emits at most one snapshot per match id.
#[derive(Debug, Default)]
pub struct SnapshotBuilder {
    emitted: HashSet<Uuid>,
}

impl SnapshotBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_emitted(&self, match_id: Uuid) -> bool {
        self.emitted.contains(&match_id)
    }

    pub fn build(&mut self, input: SnapshotInput<'_>) -> Option<CompletedMatch> {
        if !self.emitted.insert(input.match_id) {
            log::debug!("Snapshot for match {} already emitted", input.match_id);
            return None;
        }
        Some(CompletedMatch {
            id: input.match_id,
            schema_version: SCHEMA_VERSION,
            completed_at: input.completed_at,
            started_at: input.started_at,
            configuration: input.configuration.clone(),
            score: input.score,
            penalties: input.penalties,
            events: input.events.to_vec(),
            owner_id: None,
            abandoned: input.abandoned,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(config: &MatchConfiguration, id: Uuid) -> SnapshotInput<'_> {
        SnapshotInput {
            match_id: id,
            configuration: config,
            score: Score { home: 2, away: 1 },
            penalties: None,
            events: &[],
            started_at: None,
            completed_at: Utc::now(),
            abandoned: false,
        }
    }

    #[test]
    fn test_builder_emits_once_per_match() {
        let config = MatchConfiguration::new("City", "United");
        let mut builder = SnapshotBuilder::new();
        let id = Uuid::new_v4();

        let first = builder.build(input(&config, id)).unwrap();
        assert_eq!(first.schema_version, SCHEMA_VERSION);
        assert!(builder.build(input(&config, id)).is_none());
        assert!(builder.build(input(&config, Uuid::new_v4())).is_some());
    }

    #[test]
    fn test_attaching_owner_is_idempotent() {
        let config = MatchConfiguration::new("City", "United");
        let snapshot = SnapshotBuilder::new().build(input(&config, Uuid::new_v4())).unwrap();

        assert!(snapshot.attaching_owner_if_missing(None).owner_id.is_none());
        let owned = snapshot.attaching_owner_if_missing(Some("ref-42"));
        assert_eq!(owned.owner_id.as_deref(), Some("ref-42"));
        let again = owned.attaching_owner_if_missing(Some("someone-else"));
        assert_eq!(again, owned);
    }

    #[test]
    fn test_summary_display() {
        let config = MatchConfiguration::new("City", "United");
        let mut snapshot = SnapshotBuilder::new().build(input(&config, Uuid::new_v4())).unwrap();
        assert_eq!(snapshot.summary().to_string(), "City 2 - 1 United");

        snapshot.penalties = Some(PenaltyTally { home_scored: 4, home_taken: 5, away_scored: 3, away_taken: 5 });
        assert_eq!(snapshot.summary().to_string(), "City 2 - 1 United (4-3 pens)");
    }
}
