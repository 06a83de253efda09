//! Match event records and the append-only ledger.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{MatchError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TeamSide {
    Home,
    Away,
}

impl TeamSide {
    pub fn opponent(self) -> TeamSide {
        match self {
            TeamSide::Home => TeamSide::Away,
            TeamSide::Away => TeamSide::Home,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TeamSide::Home => "Home",
            TeamSide::Away => "Away",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GoalType {
    Regular,
    OwnGoal,
    Penalty,
    FreeKick,
}

impl GoalType {
    pub fn label(self) -> &'static str {
        match self {
            GoalType::Regular => "Goal",
            GoalType::OwnGoal => "Own Goal",
            GoalType::Penalty => "Penalty",
            GoalType::FreeKick => "Free Kick",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GoalDetails {
    pub goal_type: GoalType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub player_number: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub player_name: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CardType {
    Yellow,
    Red,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CardRecipient {
    Player,
    TeamOfficial,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OfficialRole {
    Manager,
    AssistantManager,
    Coach,
    Physio,
    Doctor,
    Other,
}

impl OfficialRole {
    pub fn label(self) -> &'static str {
        match self {
            OfficialRole::Manager => "Manager",
            OfficialRole::AssistantManager => "Assistant Manager",
            OfficialRole::Coach => "Coach",
            OfficialRole::Physio => "Physio",
            OfficialRole::Doctor => "Doctor",
            OfficialRole::Other => "Official",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardDetails {
    pub card_type: CardType,
    pub recipient: CardRecipient,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub player_number: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub player_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub official_role: Option<OfficialRole>,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SubstitutionDetails {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub player_out: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub player_in: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub player_out_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub player_in_name: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PenaltyResult {
    Scored,
    Missed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PenaltyAttemptDetails {
    pub result: PenaltyResult,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub player_number: Option<u16>,
    pub round: u16,
}

/// What happened. User events carry their structured metadata inline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MatchEventKind {
    Goal(GoalDetails),
    Card(CardDetails),
    Substitution(SubstitutionDetails),
    KickOff,
    PeriodStart { period: u8 },
    HalfTime,
    PeriodEnd { period: u8 },
    MatchEnd,
    PenaltiesStart,
    PenaltyAttempt(PenaltyAttemptDetails),
    PenaltiesEnd,
}

impl MatchEventKind {
    pub fn name(&self) -> &'static str {
        match self {
            MatchEventKind::Goal(_) => "goal",
            MatchEventKind::Card(d) if d.card_type == CardType::Yellow => "yellow_card",
            MatchEventKind::Card(_) => "red_card",
            MatchEventKind::Substitution(_) => "substitution",
            MatchEventKind::KickOff => "kick_off",
            MatchEventKind::PeriodStart { .. } => "period_start",
            MatchEventKind::HalfTime => "half_time",
            MatchEventKind::PeriodEnd { .. } => "period_end",
            MatchEventKind::MatchEnd => "match_end",
            MatchEventKind::PenaltiesStart => "penalties_start",
            MatchEventKind::PenaltyAttempt(_) => "penalty_attempt",
            MatchEventKind::PenaltiesEnd => "penalties_end",
        }
    }

    /// Team-attributed events; recording one without a side is rejected.
    pub fn requires_team(&self) -> bool {
        matches!(
            self,
            MatchEventKind::Goal(_)
                | MatchEventKind::Card(_)
                | MatchEventKind::Substitution(_)
                | MatchEventKind::PenaltyAttempt(_)
        )
    }

    /// Events the referee entered and may take back.
    pub fn is_undoable(&self) -> bool {
        self.requires_team()
    }

    pub fn display_name(&self) -> String {
        match self {
            MatchEventKind::Goal(_) => "Goal".to_string(),
            MatchEventKind::Card(d) => match d.card_type {
                CardType::Yellow => "Yellow Card".to_string(),
                CardType::Red => "Red Card".to_string(),
            },
            MatchEventKind::Substitution(_) => "Substitution".to_string(),
            MatchEventKind::KickOff => "Kick Off".to_string(),
            MatchEventKind::PeriodStart { period } => format!("Period {} Start", period),
            MatchEventKind::HalfTime => "Half Time".to_string(),
            MatchEventKind::PeriodEnd { period } => format!("Period {} End", period),
            MatchEventKind::MatchEnd => "Match End".to_string(),
            MatchEventKind::PenaltiesStart => "Penalties Start".to_string(),
            MatchEventKind::PenaltyAttempt(d) => match d.result {
                PenaltyResult::Scored => "Penalty Scored".to_string(),
                PenaltyResult::Missed => "Penalty Missed".to_string(),
            },
            MatchEventKind::PenaltiesEnd => "Penalties End".to_string(),
        }
    }
}

/// Where in the match an event happened, captured from the timer at the
/// moment of recording.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventStamp {
    pub period: u8,
    /// Seconds since kickoff of `period`.
    pub period_elapsed_secs: u64,
    /// Formatted cumulative match clock, e.g. `"23:45"`.
    pub match_time: String,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchEventRecord {
    pub id: Uuid,
    pub kind: MatchEventKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub team: Option<TeamSide>,
    pub period: u8,
    pub period_elapsed_secs: u64,
    pub match_time: String,
    pub recorded_at: DateTime<Utc>,
}

impl MatchEventRecord {
    /// One-line description for match logs.
    pub fn display_description(&self) -> String {
        match &self.kind {
            MatchEventKind::Goal(goal) => match goal.player_number {
                Some(num) => format!("{} - #{}", goal.goal_type.label(), num),
                None => goal.goal_type.label().to_string(),
            },
            MatchEventKind::Card(card) => {
                let base = self.kind.display_name();
                match (card.recipient, card.player_number, card.official_role) {
                    (CardRecipient::Player, Some(num), _) => {
                        format!("{} - #{} ({})", base, num, card.reason)
                    }
                    (CardRecipient::TeamOfficial, _, Some(role)) => {
                        format!("{} - {} ({})", base, role.label(), card.reason)
                    }
                    _ => format!("{} - {}", base, card.reason),
                }
            }
            MatchEventKind::Substitution(sub) => match (sub.player_out, sub.player_in) {
                (Some(out), Some(inn)) => format!("Substitution - #{} → #{}", out, inn),
                _ => "Substitution".to_string(),
            },
            MatchEventKind::PenaltyAttempt(attempt) => {
                let base = self.kind.display_name();
                match attempt.player_number {
                    Some(num) => format!("{} - R{} #{}", base, attempt.round, num),
                    None => format!("{} - R{}", base, attempt.round),
                }
            }
            other => other.display_name(),
        }
    }

    pub fn is_goal_for(&self, side: TeamSide) -> bool {
        matches!(self.kind, MatchEventKind::Goal(_)) && self.team == Some(side)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Score {
    pub home: u16,
    pub away: u16,
}

impl Score {
    pub fn is_level(&self) -> bool {
        self.home == self.away
    }

    pub fn for_side(&self, side: TeamSide) -> u16 {
        match side {
            TeamSide::Home => self.home,
            TeamSide::Away => self.away,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TeamTally {
    pub goals: u16,
    pub yellow_cards: u16,
    pub red_cards: u16,
    pub substitutions: u16,
}

/// Append-only sequence of events for the match in progress.
#[derive(Debug, Clone, Default)]
pub struct EventLedger {
    events: Vec<MatchEventRecord>,
}

impl EventLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a record. Within a period timestamps never go backwards; an
    /// earlier stamp is raised to the latest one (ties are allowed).
    pub fn record(
        &mut self,
        kind: MatchEventKind,
        team: Option<TeamSide>,
        stamp: EventStamp,
    ) -> Result<MatchEventRecord> {
        if kind.requires_team() && team.is_none() {
            return Err(MatchError::MissingTeam { kind: kind.name() });
        }

        let floor = self
            .events
            .iter()
            .rev()
            .find(|e| e.period == stamp.period)
            .map(|e| e.period_elapsed_secs)
            .unwrap_or(0);

        let record = MatchEventRecord {
            id: Uuid::new_v4(),
            kind,
            team,
            period: stamp.period,
            period_elapsed_secs: stamp.period_elapsed_secs.max(floor),
            match_time: stamp.match_time,
            recorded_at: stamp.recorded_at,
        };
        self.events.push(record.clone());
        Ok(record)
    }

    pub fn remove(&mut self, id: Uuid) -> Result<MatchEventRecord> {
        let index = self
            .events
            .iter()
            .position(|e| e.id == id)
            .ok_or(MatchError::EventNotFound(id))?;
        Ok(self.events.remove(index))
    }

    /// Removes the most recent goal, card or substitution.
    pub fn pop_last_undoable(&mut self) -> Option<MatchEventRecord> {
        let index = self
            .events
            .iter()
            .rposition(|e| e.kind.is_undoable() && !matches!(e.kind, MatchEventKind::PenaltyAttempt(_)))?;
        Some(self.events.remove(index))
    }

    pub fn pop_last_penalty_attempt(&mut self) -> Option<MatchEventRecord> {
        let index =
            self.events.iter().rposition(|e| matches!(e.kind, MatchEventKind::PenaltyAttempt(_)))?;
        Some(self.events.remove(index))
    }

    pub fn last(&self) -> Option<&MatchEventRecord> {
        self.events.last()
    }

    pub fn last_undoable(&self) -> Option<&MatchEventRecord> {
        self.events.iter().rev().find(|e| e.kind.is_undoable())
    }

    pub fn events(&self) -> &[MatchEventRecord] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }

    /// Goals credited per side. Penalty-shootout attempts are not goals.
    pub fn score(&self) -> Score {
        Score {
            home: self.events.iter().filter(|e| e.is_goal_for(TeamSide::Home)).count() as u16,
            away: self.events.iter().filter(|e| e.is_goal_for(TeamSide::Away)).count() as u16,
        }
    }

    pub fn tally(&self, side: TeamSide) -> TeamTally {
        let mut tally = TeamTally::default();
        for event in self.events.iter().filter(|e| e.team == Some(side)) {
            match &event.kind {
                MatchEventKind::Goal(_) => tally.goals += 1,
                MatchEventKind::Card(card) => match card.card_type {
                    CardType::Yellow => tally.yellow_cards += 1,
                    CardType::Red => tally.red_cards += 1,
                },
                MatchEventKind::Substitution(_) => tally.substitutions += 1,
                _ => {}
            }
        }
        tally
    }

    pub fn into_events(self) -> Vec<MatchEventRecord> {
        self.events
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stamp(period: u8, secs: u64) -> EventStamp {
        EventStamp {
            period,
            period_elapsed_secs: secs,
            match_time: crate::clock::format_secs(secs),
            recorded_at: Utc::now(),
        }
    }

    fn goal() -> MatchEventKind {
        MatchEventKind::Goal(GoalDetails {
            goal_type: GoalType::Regular,
            player_number: Some(9),
            player_name: None,
        })
    }

    fn yellow(reason: &str) -> MatchEventKind {
        MatchEventKind::Card(CardDetails {
            card_type: CardType::Yellow,
            recipient: CardRecipient::Player,
            player_number: Some(4),
            player_name: None,
            official_role: None,
            reason: reason.to_string(),
        })
    }

    #[test]
    fn test_record_requires_team_for_user_events() {
        let mut ledger = EventLedger::new();
        let err = ledger.record(goal(), None, stamp(1, 10)).unwrap_err();
        assert!(matches!(err, MatchError::MissingTeam { kind: "goal" }));
        assert!(ledger.is_empty());

        assert!(ledger.record(MatchEventKind::KickOff, None, stamp(1, 0)).is_ok());
    }

    #[test]
    fn test_timestamps_never_go_backwards_within_period() {
        let mut ledger = EventLedger::new();
        ledger.record(goal(), Some(TeamSide::Home), stamp(1, 600)).unwrap();
        let late = ledger.record(yellow("Dissent"), Some(TeamSide::Away), stamp(1, 590)).unwrap();
        assert_eq!(late.period_elapsed_secs, 600);

        let next_period = ledger.record(goal(), Some(TeamSide::Away), stamp(2, 30)).unwrap();
        assert_eq!(next_period.period_elapsed_secs, 30);
    }

    #[test]
    fn test_score_and_tallies_are_derived() {
        let mut ledger = EventLedger::new();
        ledger.record(goal(), Some(TeamSide::Home), stamp(1, 100)).unwrap();
        ledger.record(goal(), Some(TeamSide::Home), stamp(1, 200)).unwrap();
        ledger.record(yellow("Unsporting behaviour"), Some(TeamSide::Away), stamp(1, 300)).unwrap();
        ledger
            .record(
                MatchEventKind::Substitution(SubstitutionDetails::default()),
                Some(TeamSide::Away),
                stamp(2, 10),
            )
            .unwrap();

        assert_eq!(ledger.score(), Score { home: 2, away: 0 });
        let away = ledger.tally(TeamSide::Away);
        assert_eq!(away.yellow_cards, 1);
        assert_eq!(away.substitutions, 1);
        assert_eq!(away.goals, 0);
    }

    #[test]
    fn test_remove_by_id_and_unknown_id() {
        let mut ledger = EventLedger::new();
        let rec = ledger.record(goal(), Some(TeamSide::Home), stamp(1, 100)).unwrap();
        assert_eq!(ledger.remove(rec.id).unwrap().id, rec.id);
        assert!(matches!(ledger.remove(rec.id), Err(MatchError::EventNotFound(_))));
    }

    #[test]
    fn test_pop_last_undoable_skips_general_events() {
        let mut ledger = EventLedger::new();
        ledger.record(goal(), Some(TeamSide::Home), stamp(1, 100)).unwrap();
        ledger.record(MatchEventKind::PeriodEnd { period: 1 }, None, stamp(1, 2700)).unwrap();
        let undone = ledger.pop_last_undoable().unwrap();
        assert!(matches!(undone.kind, MatchEventKind::Goal(_)));
        assert_eq!(ledger.len(), 1);
        assert!(ledger.pop_last_undoable().is_none());
    }

    #[test]
    fn test_display_descriptions() {
        let mut ledger = EventLedger::new();
        let g = ledger.record(goal(), Some(TeamSide::Home), stamp(1, 100)).unwrap();
        assert_eq!(g.display_description(), "Goal - #9");
        let c = ledger.record(yellow("Dissent"), Some(TeamSide::Away), stamp(1, 120)).unwrap();
        assert_eq!(c.display_description(), "Yellow Card - #4 (Dissent)");
    }
}
