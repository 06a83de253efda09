//! External state publisher and command channel.
//!
//! The publisher observes the session and rewrites the live projection after
//! every change (last write wins). Commands travel the other way through a
//! durable single-slot store.

pub mod command;
pub mod live_state;

use std::sync::Arc;

use chrono::Duration as ChronoDuration;

use crate::session::{MatchChange, MatchObserver, MatchStatus};

pub use command::{
    CommandEnvelope, CommandHandler, CommandStore, FileCommandStore, InMemoryCommandStore,
    LiveActivityCommand, MatchCommandTarget, COMMAND_VERSION,
};
pub use live_state::{
    team_abbreviation, FileLiveStateStore, InMemoryLiveStateStore, LiveActivityState,
    LiveStateStore, ReloadPolicy, WidgetEntry, WidgetTimeline, LIVE_STATE_VERSION,
};

/// Derives the live projection from a session status. `None` when no match
/// is under way.
pub fn derive_live_state(status: &MatchStatus) -> Option<LiveActivityState> {
    if !status.phase.is_active() {
        return None;
    }
    let elapsed = ChronoDuration::from_std(status.period_elapsed).unwrap_or_else(|_| ChronoDuration::zero());

    Some(LiveActivityState {
        version: LIVE_STATE_VERSION,
        match_id: status.match_id,
        home_abbr: team_abbreviation(&status.home_team),
        away_abbr: team_abbreviation(&status.away_team),
        home_score: status.score.home,
        away_score: status.score.away,
        period_label: status.timer.period_label.clone(),
        is_paused: status.is_paused,
        is_in_stoppage: status.is_in_stoppage,
        period_start: status.now - elapsed,
        expected_period_end: status.expected_period_end,
        elapsed_at_pause: status.is_paused.then(|| status.period_elapsed.as_secs()),
        stoppage_accumulated: status.stoppage_elapsed.as_secs(),
        can_pause: status.is_in_progress && !status.is_paused,
        can_resume: status.is_in_progress && status.is_paused,
        can_start_half_time: status.is_waiting_for_half_time,
        can_start_second_half: status.is_waiting_for_second_half,
        last_updated: status.now,
    })
}

/// Keeps the shared live state in step with the session.
pub struct LiveStatePublisher {
    store: Arc<dyn LiveStateStore>,
    last: Option<LiveActivityState>,
}

impl std::fmt::Debug for LiveStatePublisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveStatePublisher").field("last", &self.last).finish()
    }
}

impl LiveStatePublisher {
    pub fn new(store: Arc<dyn LiveStateStore>) -> Self {
        Self { store, last: None }
    }

    pub fn last_published(&self) -> Option<&LiveActivityState> {
        self.last.as_ref()
    }

    pub fn publish(&mut self, status: &MatchStatus) {
        match derive_live_state(status) {
            Some(state) => {
                if let Err(e) = self.store.write(&state) {
                    tracing::warn!(error = %e, "live state write failed");
                }
                self.last = Some(state);
            }
            None => {
                if let Err(e) = self.store.clear() {
                    tracing::warn!(error = %e, "live state clear failed");
                }
                self.last = None;
            }
        }
    }
}

impl MatchObserver for LiveStatePublisher {
    fn on_change(&mut self, change: &MatchChange, status: &MatchStatus) {
        tracing::trace!(?change, "publishing live state");
        self.publish(status);
    }
}
