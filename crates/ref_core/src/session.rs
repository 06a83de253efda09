//! The match session: the single owner of a match in progress.
//!
//! Every action mutates the timer, ledger or shootout atomically and then
//! notifies each [`MatchObserver`] with the resulting [`MatchStatus`].
//! Observers never see a half-applied change.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use uuid::Uuid;
use validator::Validate;

use crate::capabilities::{Capabilities, HapticEvent, SyncNotice};
use crate::clock::{format_clock, TimeSource};
use crate::completed::{CompletedMatch, CompletedMatchSummary, SnapshotBuilder, SnapshotInput};
use crate::config::MatchConfiguration;
use crate::error::{MatchError, Result};
use crate::events::{
    CardDetails, EventLedger, EventStamp, GoalDetails, MatchEventKind, MatchEventRecord,
    PenaltyResult, Score, SubstitutionDetails, TeamSide,
};
use crate::lifecycle::LifecyclePhase;
use crate::penalties::{PenaltyShootout, PenaltyTally, UndoneAttempt};
use crate::publisher::{CommandHandler, CommandStore, LiveActivityCommand, MatchCommandTarget};
use crate::save::MatchHistoryStore;
use crate::timer::{Boundary, MatchTimer, PeriodOutcome, TimerSnapshot};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchChange {
    Configured,
    Started,
    Paused,
    Resumed,
    StoppageStarted,
    StoppageEnded,
    PeriodEnded(PeriodOutcome),
    PeriodExpired,
    HalfTimeStarted,
    HalfTimeReached,
    HalfTimeEnded,
    PeriodStarted(u8),
    PenaltiesBegan,
    ShootoutStarted(TeamSide),
    PenaltyRecorded(Uuid),
    PenaltyUndone,
    PenaltyOrderSwapped,
    EventRecorded(Uuid),
    EventRemoved(Uuid),
    Finished,
    Finalized(Uuid),
    CommandApplied(LiveActivityCommand),
    Reset,
}

/// Read-only view handed to observers and presentation code.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchStatus {
    pub match_id: Uuid,
    pub home_team: String,
    pub away_team: String,
    pub score: Score,
    pub penalties: Option<PenaltyTally>,
    pub phase: LifecyclePhase,
    pub period: u8,
    pub waiting: Option<Boundary>,
    pub is_in_progress: bool,
    pub is_paused: bool,
    pub is_in_stoppage: bool,
    pub is_half_time: bool,
    pub is_penalties_active: bool,
    pub is_waiting_for_half_time: bool,
    pub is_waiting_for_second_half: bool,
    pub period_elapsed: Duration,
    pub period_remaining: Duration,
    pub stoppage_elapsed: Duration,
    pub period_started_at: Option<DateTime<Utc>>,
    pub expected_period_end: Option<DateTime<Utc>>,
    pub timer: TimerSnapshot,
    pub now: DateTime<Utc>,
}

pub trait MatchObserver {
    fn on_change(&mut self, change: &MatchChange, status: &MatchStatus);
}

pub struct MatchSession {
    match_id: Uuid,
    timer: MatchTimer,
    ledger: EventLedger,
    shootout: PenaltyShootout,
    snapshots: SnapshotBuilder,
    history: Arc<dyn MatchHistoryStore>,
    caps: Capabilities,
    observers: Vec<Box<dyn MatchObserver>>,
    started_at: Option<DateTime<Utc>>,
    abandoned: bool,
    owner_id: Option<String>,
    last_completed: Option<CompletedMatch>,
    last_persistence_error: Option<String>,
}

impl std::fmt::Debug for MatchSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MatchSession")
            .field("match_id", &self.match_id)
            .field("timer", &self.timer)
            .field("events", &self.ledger.len())
            .field("observers", &self.observers.len())
            .finish()
    }
}

impl MatchSession {
    pub fn new(
        time: Arc<dyn TimeSource>,
        history: Arc<dyn MatchHistoryStore>,
        caps: Capabilities,
    ) -> Self {
        Self {
            match_id: Uuid::new_v4(),
            timer: MatchTimer::new(time),
            ledger: EventLedger::new(),
            shootout: PenaltyShootout::new(MatchConfiguration::default().penalty_initial_rounds),
            snapshots: SnapshotBuilder::new(),
            history,
            caps,
            observers: Vec::new(),
            started_at: None,
            abandoned: false,
            owner_id: None,
            last_completed: None,
            last_persistence_error: None,
        }
    }

    pub fn add_observer(&mut self, observer: Box<dyn MatchObserver>) {
        self.observers.push(observer);
    }

    pub fn set_owner_id(&mut self, owner_id: Option<String>) {
        self.owner_id = owner_id;
    }

    // -- read side --------------------------------------------------------

    pub fn match_id(&self) -> Uuid {
        self.match_id
    }

    pub fn timer(&self) -> &MatchTimer {
        &self.timer
    }

    pub fn ledger(&self) -> &EventLedger {
        &self.ledger
    }

    pub fn shootout(&self) -> &PenaltyShootout {
        &self.shootout
    }

    pub fn config(&self) -> &MatchConfiguration {
        self.timer.config()
    }

    pub fn phase(&self) -> LifecyclePhase {
        self.timer.phase()
    }

    pub fn score(&self) -> Score {
        self.ledger.score()
    }

    pub fn capabilities(&self) -> &Capabilities {
        &self.caps
    }

    pub fn last_completed(&self) -> Option<&CompletedMatch> {
        self.last_completed.as_ref()
    }

    pub fn last_persistence_error(&self) -> Option<&str> {
        self.last_persistence_error.as_deref()
    }

    fn penalties_tally(&self) -> Option<PenaltyTally> {
        let tally = self.shootout.tally();
        (self.shootout.is_active() || tally.home_taken + tally.away_taken > 0).then_some(tally)
    }

    pub fn status(&self) -> MatchStatus {
        let config = self.timer.config();
        MatchStatus {
            match_id: self.match_id,
            home_team: config.home_team.clone(),
            away_team: config.away_team.clone(),
            score: self.ledger.score(),
            penalties: self.penalties_tally(),
            phase: self.timer.phase(),
            period: self.timer.period(),
            waiting: self.timer.waiting(),
            is_in_progress: self.timer.is_period_active(),
            is_paused: self.timer.is_paused(),
            is_in_stoppage: self.timer.is_in_stoppage(),
            is_half_time: self.timer.is_half_time(),
            is_penalties_active: self.timer.phase().is_penalty_phase(),
            is_waiting_for_half_time: self.timer.is_waiting_for_half_time(),
            is_waiting_for_second_half: self.timer.is_waiting_for_second_half(),
            period_elapsed: self.timer.period_elapsed(),
            period_remaining: self.timer.period_remaining(),
            stoppage_elapsed: self.timer.stoppage_elapsed(),
            period_started_at: self.timer.period_started_at(),
            expected_period_end: self.timer.expected_period_end(),
            timer: self.timer.snapshot(),
            now: self.timer.now(),
        }
    }

    fn emit(&mut self, change: MatchChange) {
        let status = self.status();
        tracing::debug!(?change, phase = %status.phase, period = status.period, "match changed");
        for observer in self.observers.iter_mut() {
            observer.on_change(&change, &status);
        }
    }

    fn haptic(&self, event: HapticEvent) {
        self.caps.haptics.play(event);
    }

    fn stamp(&self) -> EventStamp {
        EventStamp {
            period: self.timer.period(),
            period_elapsed_secs: self.timer.period_elapsed().as_secs(),
            match_time: format_clock(self.timer.match_elapsed()),
            recorded_at: self.timer.now(),
        }
    }

    /// Timeline markers never carry a team and cannot fail.
    fn mark(&mut self, kind: MatchEventKind) {
        let stamp = self.stamp();
        if let Err(e) = self.ledger.record(kind, None, stamp) {
            tracing::warn!(error = %e, "timeline marker rejected");
        }
    }

    // -- lifecycle --------------------------------------------------------

    /// Validates and freezes the configuration for the next match.
    pub fn configure(&mut self, config: MatchConfiguration) -> Result<bool> {
        config.validate()?;
        let rounds = config.penalty_initial_rounds;
        if !self.timer.configure(config) {
            tracing::debug!(phase = %self.phase(), "configure ignored");
            return Ok(false);
        }
        self.match_id = Uuid::new_v4();
        self.ledger.clear();
        self.shootout = PenaltyShootout::new(rounds);
        self.abandoned = false;
        self.last_persistence_error = None;
        self.emit(MatchChange::Configured);
        Ok(true)
    }

    pub fn start_match(&mut self) -> bool {
        if self.timer.start_match().is_none() {
            return false;
        }
        self.started_at = Some(self.timer.now());
        self.mark(MatchEventKind::KickOff);
        self.mark(MatchEventKind::PeriodStart { period: 1 });
        self.haptic(HapticEvent::Start);
        self.emit(MatchChange::Started);
        true
    }

    pub fn pause(&mut self) -> bool {
        if !self.timer.pause() {
            return false;
        }
        self.emit(MatchChange::Paused);
        true
    }

    pub fn resume(&mut self) -> bool {
        if !self.timer.resume() {
            return false;
        }
        self.emit(MatchChange::Resumed);
        true
    }

    pub fn begin_stoppage(&mut self) -> bool {
        if !self.timer.begin_stoppage() {
            return false;
        }
        self.emit(MatchChange::StoppageStarted);
        true
    }

    pub fn end_stoppage(&mut self) -> bool {
        if !self.timer.end_stoppage() {
            return false;
        }
        self.emit(MatchChange::StoppageEnded);
        true
    }

    pub fn end_current_period(&mut self) -> Option<PeriodOutcome> {
        let period = self.timer.period();
        let outcome = self.timer.end_current_period(self.ledger.score().is_level())?;
        self.mark(MatchEventKind::PeriodEnd { period });
        if outcome == PeriodOutcome::FullTime {
            self.mark(MatchEventKind::MatchEnd);
        }
        self.haptic(HapticEvent::Notification);
        self.emit(MatchChange::PeriodEnded(outcome));
        if outcome == PeriodOutcome::FullTime {
            self.emit(MatchChange::Finished);
        }
        Some(outcome)
    }

    pub fn start_half_time(&mut self) -> bool {
        if !self.timer.start_half_time() {
            return false;
        }
        self.mark(MatchEventKind::HalfTime);
        self.emit(MatchChange::HalfTimeStarted);
        true
    }

    pub fn end_half_time(&mut self) -> bool {
        if !self.timer.end_half_time() {
            return false;
        }
        self.emit(MatchChange::HalfTimeEnded);
        true
    }

    /// No-op unless half-time is running or a period boundary is waiting.
    pub fn start_next_period(&mut self) -> bool {
        if self.timer.start_next_period().is_none() {
            return false;
        }
        let period = self.timer.period();
        self.mark(MatchEventKind::PeriodStart { period });
        self.haptic(HapticEvent::Start);
        self.emit(MatchChange::PeriodStarted(period));
        true
    }

    // -- penalties --------------------------------------------------------

    pub fn begin_penalties(&mut self) -> bool {
        if self.timer.begin_penalties().is_none() {
            return false;
        }
        self.shootout.set_initial_rounds(self.timer.config().penalty_initial_rounds);
        self.shootout.begin();
        self.mark(MatchEventKind::PenaltiesStart);
        self.emit(MatchChange::PenaltiesBegan);
        true
    }

    pub fn start_penalties(&mut self, first_kicker: TeamSide) -> bool {
        if self.phase() != LifecyclePhase::ChoosePenaltyFirstKicker {
            return false;
        }
        self.shootout.set_first_kicker(first_kicker);
        if self.timer.enter_shootout().is_none() {
            return false;
        }
        self.emit(MatchChange::ShootoutStarted(first_kicker));
        true
    }

    /// Records the next kick for whichever side is due.
    pub fn record_penalty_attempt(
        &mut self,
        result: PenaltyResult,
        player_number: Option<u16>,
    ) -> Option<MatchEventRecord> {
        if self.phase() != LifecyclePhase::Penalties {
            return None;
        }
        let team = self.shootout.next_team();
        let outcome = self.shootout.record_attempt(team, result, player_number)?;
        let stamp = self.stamp();
        let record = self
            .ledger
            .record(MatchEventKind::PenaltyAttempt(outcome.details), Some(team), stamp)
            .ok()?;
        if outcome.newly_decided {
            self.haptic(HapticEvent::Success);
        }
        self.emit(MatchChange::PenaltyRecorded(record.id));
        Some(record)
    }

    pub fn undo_last_penalty_attempt(&mut self) -> Option<UndoneAttempt> {
        let undone = self.shootout.undo_last_attempt()?;
        self.ledger.pop_last_penalty_attempt();
        self.emit(MatchChange::PenaltyUndone);
        Some(undone)
    }

    pub fn swap_penalty_order(&mut self) -> bool {
        if !self.shootout.is_active() {
            return false;
        }
        self.shootout.swap_kicking_order();
        self.emit(MatchChange::PenaltyOrderSwapped);
        true
    }

    pub fn end_penalties(&mut self) -> bool {
        if !self.phase().is_penalty_phase() {
            return false;
        }
        self.shootout.end();
        self.mark(MatchEventKind::PenaltiesEnd);
        self.timer.finish();
        self.mark(MatchEventKind::MatchEnd);
        self.emit(MatchChange::Finished);
        true
    }

    // -- events -----------------------------------------------------------

    /// Records a goal, card or substitution. Shootout kicks go through
    /// [`record_penalty_attempt`](Self::record_penalty_attempt); timeline
    /// markers are written by the match flow itself.
    pub fn record_event(&mut self, kind: MatchEventKind, team: Option<TeamSide>) -> Result<MatchEventRecord> {
        if !matches!(
            kind,
            MatchEventKind::Goal(_) | MatchEventKind::Card(_) | MatchEventKind::Substitution(_)
        ) {
            return Err(MatchError::ReservedEvent { kind: kind.name() });
        }
        let phase = self.phase();
        if !phase.is_active() {
            return Err(MatchError::MatchNotActive { phase });
        }
        let stamp = self.stamp();
        let record = self.ledger.record(kind, team, stamp)?;
        tracing::info!(
            kind = record.kind.name(),
            team = ?record.team,
            period = record.period,
            at = record.period_elapsed_secs,
            "event recorded"
        );
        self.emit(MatchChange::EventRecorded(record.id));
        Ok(record)
    }

    pub fn record_goal(&mut self, team: TeamSide, details: GoalDetails) -> Result<MatchEventRecord> {
        self.record_event(MatchEventKind::Goal(details), Some(team))
    }

    pub fn record_card(&mut self, team: TeamSide, details: CardDetails) -> Result<MatchEventRecord> {
        self.record_event(MatchEventKind::Card(details), Some(team))
    }

    pub fn record_substitution(
        &mut self,
        team: TeamSide,
        details: SubstitutionDetails,
    ) -> Result<MatchEventRecord> {
        self.record_event(MatchEventKind::Substitution(details), Some(team))
    }

    /// Takes back the most recent goal, card, substitution or penalty kick.
    pub fn undo_last_user_event(&mut self) -> Option<MatchEventRecord> {
        let last = self.ledger.last_undoable()?.clone();
        let removed = if matches!(last.kind, MatchEventKind::PenaltyAttempt(_)) {
            self.shootout.undo_last_attempt()?;
            self.ledger.pop_last_penalty_attempt()?
        } else {
            self.ledger.pop_last_undoable()?
        };
        self.haptic(HapticEvent::Success);
        self.emit(MatchChange::EventRemoved(removed.id));
        Some(removed)
    }

    pub fn remove_event(&mut self, id: Uuid) -> Result<MatchEventRecord> {
        let removed = self.ledger.remove(id)?;
        self.emit(MatchChange::EventRemoved(id));
        Ok(removed)
    }

    // -- ending -----------------------------------------------------------

    /// Forces full time from any active phase.
    pub fn abandon(&mut self) -> bool {
        if self.timer.finish().is_none() {
            return false;
        }
        self.abandoned = true;
        self.shootout.end();
        self.mark(MatchEventKind::MatchEnd);
        tracing::warn!(match_id = %self.match_id, "match abandoned");
        self.emit(MatchChange::Finished);
        true
    }

    /// Freezes the finished match, persists it and hands it to connectivity.
    ///
    /// Returns `None` before full time and on every call after the first for
    /// the same match. A failed save is recorded in
    /// [`last_persistence_error`](Self::last_persistence_error) and announced
    /// as a [`SyncNotice::PersistenceFailed`]; it is never retried.
    pub fn finalize(&mut self) -> Option<CompletedMatch> {
        if self.phase() != LifecyclePhase::Finished {
            tracing::debug!(phase = %self.phase(), "finalize ignored before full time");
            return None;
        }
        let input = SnapshotInput {
            match_id: self.match_id,
            configuration: self.timer.config(),
            score: self.ledger.score(),
            penalties: self.penalties_tally(),
            events: self.ledger.events(),
            started_at: self.started_at,
            completed_at: self.timer.now(),
            abandoned: self.abandoned,
        };
        let snapshot = self
            .snapshots
            .build(input)?
            .attaching_owner_if_missing(self.owner_id.as_deref());

        match self.history.save(&snapshot) {
            Ok(()) => {
                self.last_persistence_error = None;
                tracing::info!(match_id = %snapshot.id, events = snapshot.events.len(), "match finalized");
            }
            Err(e) => {
                tracing::error!(match_id = %snapshot.id, error = %e, "failed to save completed match");
                self.last_persistence_error = Some(e.to_string());
                self.haptic(HapticEvent::Failure);
                self.caps
                    .notices
                    .publish(SyncNotice::PersistenceFailed { match_id: snapshot.id, message: e.to_string() });
            }
        }
        self.caps.connectivity.send_completed_match(&snapshot);

        self.last_completed = Some(snapshot.clone());
        self.emit(MatchChange::Finalized(snapshot.id));
        Some(snapshot)
    }

    /// Full teardown back to idle: clocks, ledger and shootout are cleared.
    pub fn reset(&mut self) {
        self.timer.reset();
        self.ledger.clear();
        self.shootout = PenaltyShootout::new(self.timer.config().penalty_initial_rounds);
        self.match_id = Uuid::new_v4();
        self.started_at = None;
        self.abandoned = false;
        self.last_completed = None;
        self.last_persistence_error = None;
        self.emit(MatchChange::Reset);
    }

    /// Samples the clocks. Fires the one-shot expiry and half-time alerts;
    /// never changes phase.
    pub fn tick(&mut self) -> bool {
        let mut changed = false;
        if self.timer.take_expiry() {
            self.haptic(HapticEvent::Notification);
            self.emit(MatchChange::PeriodExpired);
            changed = true;
        }
        if self.timer.take_half_time_reached() {
            self.haptic(HapticEvent::Notification);
            self.emit(MatchChange::HalfTimeReached);
            changed = true;
        }
        changed
    }

    /// Drains the external command channel once.
    pub fn process_command<S: CommandStore>(&mut self, handler: &CommandHandler<S>) -> Option<LiveActivityCommand> {
        let applied = handler.process_pending(self)?;
        self.emit(MatchChange::CommandApplied(applied));
        Some(applied)
    }

    // -- history ----------------------------------------------------------

    pub fn load_completed(&self) -> Result<Vec<CompletedMatch>> {
        Ok(self.history.load_all()?)
    }

    pub fn load_recent_completed(&self, limit: usize) -> Result<Vec<CompletedMatch>> {
        Ok(self.history.load_recent(limit)?)
    }

    pub fn delete_completed(&self, id: Uuid) -> Result<()> {
        Ok(self.history.delete(id)?)
    }

    pub fn latest_summary(&self) -> Result<Option<CompletedMatchSummary>> {
        Ok(self.history.load_recent(1)?.first().map(CompletedMatchSummary::from))
    }
}

impl MatchCommandTarget for MatchSession {
    fn is_match_in_progress(&self) -> bool {
        self.timer.is_period_active()
    }

    fn is_paused(&self) -> bool {
        self.timer.is_paused()
    }

    fn is_waiting_for_half_time(&self) -> bool {
        self.timer.is_waiting_for_half_time()
    }

    fn is_waiting_for_second_half(&self) -> bool {
        self.timer.is_waiting_for_second_half()
    }

    fn pause_match(&mut self) {
        self.pause();
    }

    fn resume_match(&mut self) {
        self.resume();
    }

    fn start_half_time_manually(&mut self) {
        self.start_half_time();
    }

    fn start_second_half_manually(&mut self) {
        self.start_next_period();
    }
}
