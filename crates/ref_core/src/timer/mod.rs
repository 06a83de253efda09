//! Match timer and period orchestrator.
//!
//! Drives three [`ClockEngine`]s (period, stoppage, half-time) in lockstep
//! with the [`LifecycleMachine`]. Nothing here advances on its own: expiry is
//! only reported, every phase change is an explicit call. Guarded calls made
//! in the wrong state return `false`/`None` and leave the timer untouched.

pub mod label;
pub mod period;

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::clock::{format_clock, ClockEngine, TimeSource};
use crate::config::MatchConfiguration;
use crate::lifecycle::{LifecycleMachine, LifecyclePhase, PhaseTransition};

pub use label::{period_label, played_period_name, LabelInput};
pub use period::{next_boundary, phase_for_period, Boundary, PeriodOutcome};

/// Display strings for one instant of the match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimerSnapshot {
    pub match_time: String,
    pub period_time: String,
    pub period_time_remaining: String,
    pub stoppage_time: String,
    pub half_time_elapsed: String,
    pub half_time_remaining: String,
    pub is_in_stoppage: bool,
    pub is_paused: bool,
    pub is_half_time: bool,
    pub period_label: String,
}

pub struct MatchTimer {
    config: MatchConfiguration,
    lifecycle: LifecycleMachine,
    source: Arc<dyn TimeSource>,
    period: u8,
    period_clock: ClockEngine,
    stoppage_clock: ClockEngine,
    half_time_clock: ClockEngine,
    waiting: Option<Boundary>,
    paused: bool,
    in_stoppage: bool,
    is_half_time: bool,
    period_started_at: Option<DateTime<Utc>>,
    expiry_reported: bool,
    half_time_reported: bool,
}

impl std::fmt::Debug for MatchTimer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MatchTimer")
            .field("phase", &self.phase())
            .field("period", &self.period)
            .field("waiting", &self.waiting)
            .field("paused", &self.paused)
            .field("in_stoppage", &self.in_stoppage)
            .field("is_half_time", &self.is_half_time)
            .field("period_clock", &self.period_clock)
            .finish()
    }
}

impl MatchTimer {
    pub fn new(source: Arc<dyn TimeSource>) -> Self {
        Self {
            config: MatchConfiguration::default(),
            lifecycle: LifecycleMachine::new(),
            period_clock: ClockEngine::new(source.clone()),
            stoppage_clock: ClockEngine::new(source.clone()),
            half_time_clock: ClockEngine::new(source.clone()),
            source,
            period: 0,
            waiting: None,
            paused: false,
            in_stoppage: false,
            is_half_time: false,
            period_started_at: None,
            expiry_reported: false,
            half_time_reported: false,
        }
    }

    // -- state ------------------------------------------------------------

    pub fn config(&self) -> &MatchConfiguration {
        &self.config
    }

    pub fn phase(&self) -> LifecyclePhase {
        self.lifecycle.phase()
    }

    pub fn period(&self) -> u8 {
        self.period
    }

    pub fn waiting(&self) -> Option<Boundary> {
        self.waiting
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn is_in_stoppage(&self) -> bool {
        self.in_stoppage
    }

    pub fn is_half_time(&self) -> bool {
        self.is_half_time
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.source.now()
    }

    pub fn period_started_at(&self) -> Option<DateTime<Utc>> {
        self.period_started_at
    }

    /// A timed period is in play: kicked off, not at a boundary, not at
    /// half-time. Paused periods still count as in play.
    pub fn is_period_active(&self) -> bool {
        self.phase().is_kickoff() && self.waiting.is_none() && !self.is_half_time
    }

    /// Period clock is ticking.
    pub fn is_running(&self) -> bool {
        self.is_period_active() && !self.paused
    }

    pub fn is_waiting_for_half_time(&self) -> bool {
        self.waiting == Some(Boundary::HalfTimeStart)
    }

    /// Half-time in progress, or a regulation period waiting to kick off.
    pub fn is_waiting_for_second_half(&self) -> bool {
        if self.is_half_time {
            return true;
        }
        self.waiting == Some(Boundary::NextPeriod) && self.period < self.config.regulation_periods()
    }

    // -- transitions ------------------------------------------------------

    /// Idle → setup with a frozen configuration. Returns `false` outside idle
    /// or setup.
    pub fn configure(&mut self, config: MatchConfiguration) -> bool {
        match self.phase() {
            LifecyclePhase::Idle => {
                self.lifecycle.transition(LifecyclePhase::Setup);
            }
            LifecyclePhase::Setup => {}
            _ => return false,
        }
        self.config = config;
        self.waiting = Some(Boundary::MatchStart);
        true
    }

    pub fn start_match(&mut self) -> Option<PhaseTransition> {
        if self.waiting != Some(Boundary::MatchStart) {
            return None;
        }
        let transition = self.lifecycle.transition(LifecyclePhase::KickoffFirstHalf)?;
        self.begin_period(1);
        tracing::info!(period = self.period, "match started");
        Some(transition)
    }

    /// Idempotent: pausing a paused or stopped period does nothing.
    pub fn pause(&mut self) -> bool {
        if !self.is_running() {
            return false;
        }
        self.period_clock.pause();
        self.stoppage_clock.pause();
        self.paused = true;
        tracing::debug!(elapsed = self.period_clock.elapsed_secs(), "period paused");
        true
    }

    pub fn resume(&mut self) -> bool {
        if !self.paused || !self.is_period_active() {
            return false;
        }
        self.period_clock.start();
        if self.in_stoppage {
            self.stoppage_clock.start();
        }
        self.paused = false;
        tracing::debug!(elapsed = self.period_clock.elapsed_secs(), "period resumed");
        true
    }

    pub fn begin_stoppage(&mut self) -> bool {
        if !self.is_period_active() || self.in_stoppage {
            return false;
        }
        self.in_stoppage = true;
        if !self.paused {
            self.stoppage_clock.start();
        }
        true
    }

    pub fn end_stoppage(&mut self) -> bool {
        if !self.in_stoppage {
            return false;
        }
        self.stoppage_clock.pause();
        self.in_stoppage = false;
        true
    }

    /// Stops the period clock and parks at the next boundary, or finishes
    /// the match. `is_level` is the current score state.
    pub fn end_current_period(&mut self, is_level: bool) -> Option<PeriodOutcome> {
        if !self.is_period_active() {
            return None;
        }
        self.period_clock.pause();
        self.stoppage_clock.pause();
        self.in_stoppage = false;
        self.paused = false;

        let outcome = next_boundary(self.period, &self.config, is_level);
        match outcome {
            PeriodOutcome::Waiting(boundary) => self.waiting = Some(boundary),
            PeriodOutcome::FullTime => {
                self.lifecycle.transition(LifecyclePhase::Finished);
            }
        }
        tracing::info!(period = self.period, ?outcome, "period ended");
        Some(outcome)
    }

    pub fn start_half_time(&mut self) -> bool {
        if self.waiting != Some(Boundary::HalfTimeStart) {
            return false;
        }
        self.waiting = None;
        self.is_half_time = true;
        self.half_time_reported = false;
        self.half_time_clock.reset();
        self.half_time_clock.start();
        tracing::info!("half-time started");
        true
    }

    pub fn end_half_time(&mut self) -> bool {
        if !self.is_half_time {
            return false;
        }
        self.half_time_clock.pause();
        self.is_half_time = false;
        self.waiting = Some(Boundary::NextPeriod);
        tracing::info!(elapsed = self.half_time_clock.elapsed_secs(), "half-time ended");
        true
    }

    /// Kicks off the following period. Only valid while half-time is running
    /// or the timer is parked at a period boundary; a no-op otherwise.
    pub fn start_next_period(&mut self) -> Option<PhaseTransition> {
        let released = self.is_half_time || self.waiting.is_some_and(Boundary::starts_period);
        if !released || !self.phase().is_kickoff() {
            tracing::trace!(phase = %self.phase(), waiting = ?self.waiting, "start_next_period ignored");
            return None;
        }
        if self.is_half_time {
            self.half_time_clock.pause();
            self.is_half_time = false;
        }

        let next = self.period + 1;
        let from = self.phase();
        let to = phase_for_period(next, &self.config);
        let transition = self.lifecycle.transition(to).unwrap_or(PhaseTransition { from, to: from });
        self.begin_period(next);
        tracing::info!(period = next, "period started");
        Some(transition)
    }

    /// Leaves the penalties boundary for first-kicker selection.
    pub fn begin_penalties(&mut self) -> Option<PhaseTransition> {
        if self.waiting != Some(Boundary::Penalties) {
            return None;
        }
        let transition = self.lifecycle.transition(LifecyclePhase::ChoosePenaltyFirstKicker)?;
        self.waiting = None;
        self.period = self.config.penalties_period();
        self.period_started_at = Some(self.source.now());
        self.period_clock.reset();
        self.reset_stoppage();
        Some(transition)
    }

    /// First kicker chosen: the shootout is under way.
    pub fn enter_shootout(&mut self) -> Option<PhaseTransition> {
        self.lifecycle.transition(LifecyclePhase::Penalties)
    }

    /// Ends the match from any active phase. Clocks freeze where they are.
    pub fn finish(&mut self) -> Option<PhaseTransition> {
        let transition = self.lifecycle.transition(LifecyclePhase::Finished)?;
        self.period_clock.pause();
        self.stoppage_clock.pause();
        self.half_time_clock.pause();
        self.in_stoppage = false;
        self.paused = false;
        self.is_half_time = false;
        self.waiting = None;
        Some(transition)
    }

    /// Full teardown back to idle.
    pub fn reset(&mut self) -> Option<PhaseTransition> {
        let transition = self.lifecycle.reset();
        self.period = 0;
        self.period_clock.reset();
        self.half_time_clock.reset();
        self.reset_stoppage();
        self.waiting = None;
        self.paused = false;
        self.is_half_time = false;
        self.period_started_at = None;
        self.expiry_reported = false;
        self.half_time_reported = false;
        transition
    }

    fn begin_period(&mut self, period: u8) {
        self.period = period;
        self.waiting = None;
        self.paused = false;
        self.expiry_reported = false;
        self.reset_stoppage();
        self.period_clock.reset();
        self.period_clock.start();
        self.period_started_at = Some(self.source.now());
    }

    fn reset_stoppage(&mut self) {
        self.stoppage_clock.reset();
        self.in_stoppage = false;
    }

    // -- projections ------------------------------------------------------

    pub fn period_length(&self) -> Duration {
        self.config.period_length(self.period)
    }

    pub fn period_elapsed(&self) -> Duration {
        self.period_clock.elapsed()
    }

    /// Cumulative match time: nominal lengths of earlier periods plus the
    /// current period's elapsed time.
    pub fn match_elapsed(&self) -> Duration {
        if self.period == 0 {
            return Duration::ZERO;
        }
        let period = self.period.min(self.config.penalties_period());
        self.config.nominal_elapsed_before(period) + self.period_elapsed()
    }

    pub fn period_remaining(&self) -> Duration {
        self.period_length().saturating_sub(self.period_elapsed())
    }

    pub fn stoppage_elapsed(&self) -> Duration {
        self.stoppage_clock.elapsed()
    }

    pub fn half_time_elapsed(&self) -> Duration {
        self.half_time_clock.elapsed()
    }

    /// Half-time countdown, floored at zero.
    pub fn half_time_remaining(&self) -> Duration {
        self.config.half_time_length().saturating_sub(self.half_time_elapsed())
    }

    /// The period in play has used up its configured length.
    pub fn is_period_expired(&self) -> bool {
        self.is_period_active() && !self.period_length().is_zero() && self.period_remaining().is_zero()
    }

    /// Instant the period clock reaches its configured length, when that is
    /// predictable: running, not in stoppage, time left.
    pub fn expected_period_end(&self) -> Option<DateTime<Utc>> {
        if !self.is_running() || self.in_stoppage {
            return None;
        }
        let remaining = self.period_remaining();
        if remaining.is_zero() {
            return None;
        }
        chrono::Duration::from_std(remaining).ok().map(|r| self.source.now() + r)
    }

    /// True exactly once per period, on the first poll after expiry.
    pub fn take_expiry(&mut self) -> bool {
        if self.expiry_reported || !self.is_period_expired() {
            return false;
        }
        self.expiry_reported = true;
        true
    }

    /// True exactly once per half-time, when its configured length is reached.
    pub fn take_half_time_reached(&mut self) -> bool {
        if self.half_time_reported || !self.is_half_time {
            return false;
        }
        if self.half_time_elapsed() < self.config.half_time_length() {
            return false;
        }
        self.half_time_reported = true;
        true
    }

    pub fn label_input(&self) -> LabelInput {
        LabelInput {
            phase: self.phase(),
            period: self.period,
            regulation_periods: self.config.regulation_periods(),
            is_half_time: self.is_half_time,
            waiting: self.waiting,
        }
    }

    pub fn period_label(&self) -> String {
        period_label(self.label_input())
    }

    pub fn snapshot(&self) -> TimerSnapshot {
        TimerSnapshot {
            match_time: format_clock(self.match_elapsed()),
            period_time: format_clock(self.period_elapsed()),
            period_time_remaining: format_clock(self.period_remaining()),
            stoppage_time: format_clock(self.stoppage_elapsed()),
            half_time_elapsed: format_clock(self.half_time_elapsed()),
            half_time_remaining: format_clock(self.half_time_remaining()),
            is_in_stoppage: self.in_stoppage,
            is_paused: self.paused,
            is_half_time: self.is_half_time,
            period_label: self.period_label(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualTimeSource;
    use chrono::TimeZone;
    use proptest::prelude::*;

    fn timer_with(config: MatchConfiguration) -> (ManualTimeSource, MatchTimer) {
        let source = ManualTimeSource::new(Utc.with_ymd_and_hms(2025, 9, 15, 14, 0, 0).unwrap());
        let mut timer = MatchTimer::new(Arc::new(source.clone()));
        assert!(timer.configure(config));
        (source, timer)
    }

    fn started(config: MatchConfiguration) -> (ManualTimeSource, MatchTimer) {
        let (source, mut timer) = timer_with(config);
        timer.start_match().unwrap();
        (source, timer)
    }

    #[test]
    fn test_start_match_requires_setup() {
        let source = ManualTimeSource::starting_now();
        let mut timer = MatchTimer::new(Arc::new(source));
        assert!(timer.start_match().is_none());
        assert_eq!(timer.phase(), LifecyclePhase::Idle);
    }

    #[test]
    fn test_pause_resume_does_not_apply_paused_interval() {
        let (source, mut timer) = started(MatchConfiguration::default());
        source.advance_secs(300);
        assert!(timer.pause());
        assert!(!timer.pause(), "second pause is a no-op");
        source.advance_secs(10);
        assert!(timer.resume());
        assert_eq!(timer.period_elapsed().as_secs(), 300);
    }

    #[test]
    fn test_match_time_accumulates_nominal_periods() {
        let (source, mut timer) = started(MatchConfiguration::default());
        source.advance_secs(47 * 60);
        timer.end_current_period(true);
        timer.start_half_time();
        source.advance_secs(15 * 60);
        timer.end_half_time();
        timer.start_next_period().unwrap();
        source.advance_secs(60);

        assert_eq!(timer.period(), 2);
        assert_eq!(timer.period_elapsed().as_secs(), 60);
        assert_eq!(timer.match_elapsed().as_secs(), 46 * 60);
        assert_eq!(timer.snapshot().match_time, "46:00");
    }

    #[test]
    fn test_remaining_never_negative_and_no_auto_advance() {
        let (source, mut timer) = started(MatchConfiguration::default());
        source.advance_secs(50 * 60);
        assert_eq!(timer.period_remaining(), Duration::ZERO);
        assert!(timer.is_period_expired());
        assert!(timer.take_expiry());
        assert!(!timer.take_expiry());
        assert_eq!(timer.phase(), LifecyclePhase::KickoffFirstHalf);
        assert_eq!(timer.period(), 1);
        assert!(timer.is_running());
    }

    #[test]
    fn test_start_next_period_ignored_mid_period() {
        let (source, mut timer) = started(MatchConfiguration::default());
        source.advance_secs(120);
        assert!(timer.start_next_period().is_none());
        assert!(timer.start_next_period().is_none());
        assert_eq!(timer.period(), 1);
        assert_eq!(timer.period_elapsed().as_secs(), 120);
    }

    #[test]
    fn test_half_time_countdown_and_notification() {
        let (source, mut timer) = started(MatchConfiguration::default());
        timer.end_current_period(true);
        assert!(timer.is_waiting_for_half_time());
        assert_eq!(timer.period_label(), "Half Time");
        assert!(timer.start_half_time());
        assert!(timer.is_waiting_for_second_half());

        source.advance_secs(10 * 60);
        assert_eq!(timer.half_time_remaining().as_secs(), 5 * 60);
        assert!(!timer.take_half_time_reached());
        source.advance_secs(6 * 60);
        assert_eq!(timer.half_time_remaining(), Duration::ZERO);
        assert!(timer.take_half_time_reached());
        assert!(!timer.take_half_time_reached());
        assert!(timer.is_half_time(), "half-time never ends on its own");
    }

    #[test]
    fn test_start_next_period_straight_from_half_time() {
        let (_source, mut timer) = started(MatchConfiguration::default());
        timer.end_current_period(true);
        timer.start_half_time();
        let t = timer.start_next_period().unwrap();
        assert_eq!(t.to, LifecyclePhase::KickoffSecondHalf);
        assert!(!timer.is_half_time());
        assert!(timer.is_running());
    }

    #[test]
    fn test_stoppage_runs_only_while_flagged_and_unpaused() {
        let (source, mut timer) = started(MatchConfiguration::default());
        source.advance_secs(100);
        assert!(timer.begin_stoppage());
        source.advance_secs(30);
        timer.pause();
        source.advance_secs(60);
        assert_eq!(timer.stoppage_elapsed().as_secs(), 30);
        timer.resume();
        source.advance_secs(15);
        assert!(timer.end_stoppage());
        source.advance_secs(100);
        assert_eq!(timer.stoppage_elapsed().as_secs(), 45);
        assert_eq!(timer.period_elapsed().as_secs(), 245);
    }

    #[test]
    fn test_stoppage_gated_outside_active_period() {
        let (_source, mut timer) = started(MatchConfiguration::default());
        timer.end_current_period(true);
        timer.start_half_time();
        assert!(!timer.begin_stoppage());
    }

    #[test]
    fn test_stoppage_resets_each_period() {
        let (source, mut timer) = started(MatchConfiguration::default());
        timer.begin_stoppage();
        source.advance_secs(90);
        timer.end_current_period(true);
        timer.start_next_period();
        assert_eq!(timer.stoppage_elapsed(), Duration::ZERO);
        assert!(!timer.is_in_stoppage());
    }

    #[test]
    fn test_expected_end_only_when_predictable() {
        let (source, mut timer) = started(MatchConfiguration::default());
        let kickoff = timer.now();
        assert_eq!(timer.expected_period_end(), Some(kickoff + chrono::Duration::minutes(45)));
        source.advance_secs(60);
        timer.begin_stoppage();
        assert!(timer.expected_period_end().is_none());
        timer.end_stoppage();
        timer.pause();
        assert!(timer.expected_period_end().is_none());
    }

    #[test]
    fn test_full_cup_flow_to_penalties() {
        let config = MatchConfiguration::default().with_extra_time(15).with_penalties(5);
        let (_source, mut timer) = started(config);
        timer.end_current_period(true);
        timer.start_half_time();
        timer.end_half_time();
        timer.start_next_period();
        assert_eq!(
            timer.end_current_period(true),
            Some(PeriodOutcome::Waiting(Boundary::ExtraTimeFirstHalf))
        );
        assert!(!timer.start_half_time());
        assert_eq!(timer.start_next_period().unwrap().to, LifecyclePhase::KickoffExtraTimeFirstHalf);
        timer.end_current_period(true);
        assert_eq!(timer.start_next_period().unwrap().to, LifecyclePhase::KickoffExtraTimeSecondHalf);
        assert_eq!(timer.end_current_period(true), Some(PeriodOutcome::Waiting(Boundary::Penalties)));
        assert!(timer.start_next_period().is_none());
        assert_eq!(timer.period_label(), "Penalties");

        assert_eq!(timer.begin_penalties().unwrap().to, LifecyclePhase::ChoosePenaltyFirstKicker);
        assert_eq!(timer.enter_shootout().unwrap().to, LifecyclePhase::Penalties);
        assert_eq!(timer.finish().unwrap().to, LifecyclePhase::Finished);
        assert!(timer.start_next_period().is_none());
    }

    #[test]
    fn test_decided_regulation_is_full_time() {
        let (_source, mut timer) = started(MatchConfiguration::default().with_extra_time(15));
        timer.end_current_period(false);
        timer.start_next_period();
        assert_eq!(timer.end_current_period(false), Some(PeriodOutcome::FullTime));
        assert_eq!(timer.phase(), LifecyclePhase::Finished);
        assert_eq!(timer.period_label(), "Full Time");
    }

    #[test]
    fn test_reset_is_full_teardown() {
        let (source, mut timer) = started(MatchConfiguration::default());
        source.advance_secs(600);
        timer.begin_stoppage();
        timer.reset();
        assert_eq!(timer.phase(), LifecyclePhase::Idle);
        assert_eq!(timer.period(), 0);
        assert_eq!(timer.period_elapsed(), Duration::ZERO);
        assert_eq!(timer.match_elapsed(), Duration::ZERO);
        assert!(!timer.is_in_stoppage());
        assert!(timer.waiting().is_none());
    }

    proptest! {
        /// Property: remaining time is always max(0, length - elapsed).
        #[test]
        fn prop_remaining_is_floored(waits in prop::collection::vec(0u64..1200, 1..12), pause_at in 0usize..12) {
            let (source, mut timer) = started(MatchConfiguration::default());
            for (i, secs) in waits.iter().enumerate() {
                if i == pause_at {
                    timer.pause();
                }
                source.advance_secs(*secs);
                let length = timer.period_length();
                let elapsed = timer.period_elapsed();
                let expected = if elapsed >= length { Duration::ZERO } else { length - elapsed };
                prop_assert_eq!(timer.period_remaining(), expected);
            }
        }
    }
}
