//! Wall-clock driven elapsed-time accumulator.
//!
//! The engine never counts ticks. Every read of [`ClockEngine::elapsed`]
//! recomputes the running segment from the injected [`TimeSource`], so the
//! caller may poll at any cadence (or not at all while suspended) without
//! drift.

use std::cell::Cell;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};

/// Source of wall-clock time for every timer in the crate.
pub trait TimeSource: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Reads the operating system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemTimeSource;

impl TimeSource for SystemTimeSource {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Controllable clock for tests, demos and replays.
///
/// Clones share the same underlying instant, so a test can keep one handle
/// while the session owns another.
#[derive(Debug, Clone)]
pub struct ManualTimeSource {
    current: Arc<Mutex<DateTime<Utc>>>,
}

impl ManualTimeSource {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self { current: Arc::new(Mutex::new(start)) }
    }

    /// Frozen at the current system time.
    pub fn starting_now() -> Self {
        Self::new(Utc::now())
    }

    pub fn advance(&self, by: Duration) {
        let delta = chrono::Duration::from_std(by).unwrap_or_else(|_| chrono::Duration::zero());
        let mut guard = self.current.lock().unwrap_or_else(|e| e.into_inner());
        *guard += delta;
    }

    pub fn advance_secs(&self, secs: u64) {
        self.advance(Duration::from_secs(secs));
    }

    pub fn set(&self, to: DateTime<Utc>) {
        let mut guard = self.current.lock().unwrap_or_else(|e| e.into_inner());
        *guard = to;
    }
}

impl TimeSource for ManualTimeSource {
    fn now(&self) -> DateTime<Utc> {
        *self.current.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Start/pause/reset accumulator.
///
/// Invariant: `elapsed()` never decreases while running and is frozen while
/// paused. A wall clock stepping backwards is absorbed by the high-water mark.
pub struct ClockEngine {
    source: Arc<dyn TimeSource>,
    accumulated: Duration,
    started_at: Option<DateTime<Utc>>,
    high_water: Cell<Duration>,
}

impl fmt::Debug for ClockEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClockEngine")
            .field("accumulated", &self.accumulated)
            .field("started_at", &self.started_at)
            .field("running", &self.is_running())
            .finish()
    }
}

impl ClockEngine {
    pub fn new(source: Arc<dyn TimeSource>) -> Self {
        Self { source, accumulated: Duration::ZERO, started_at: None, high_water: Cell::new(Duration::ZERO) }
    }

    /// No-op when already running.
    pub fn start(&mut self) {
        if self.started_at.is_none() {
            self.started_at = Some(self.source.now());
        }
    }

    /// Folds the running segment into the accumulator and stops ticking.
    pub fn pause(&mut self) {
        if self.started_at.is_some() {
            self.accumulated = self.elapsed();
            self.started_at = None;
        }
    }

    pub fn reset(&mut self) {
        self.started_at = None;
        self.accumulated = Duration::ZERO;
        self.high_water.set(Duration::ZERO);
    }

    pub fn is_running(&self) -> bool {
        self.started_at.is_some()
    }

    pub fn elapsed(&self) -> Duration {
        let running = match self.started_at {
            Some(start) => (self.source.now() - start).to_std().unwrap_or(Duration::ZERO),
            None => Duration::ZERO,
        };
        let computed = self.accumulated + running;
        let observed = computed.max(self.high_water.get());
        self.high_water.set(observed);
        observed
    }

    pub fn elapsed_secs(&self) -> u64 {
        self.elapsed().as_secs()
    }

    pub fn formatted(&self) -> String {
        format_clock(self.elapsed())
    }

    pub fn time_source(&self) -> &Arc<dyn TimeSource> {
        &self.source
    }
}

/// `MM:SS`, or `HH:MM:SS` from one hour on. Sub-second remainders are
/// truncated.
pub fn format_clock(elapsed: Duration) -> String {
    format_secs(elapsed.as_secs())
}

pub fn format_secs(total: u64) -> String {
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let seconds = total % 60;
    if hours > 0 {
        format!("{:02}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{:02}:{:02}", minutes, seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;

    fn manual() -> (ManualTimeSource, ClockEngine) {
        let source = ManualTimeSource::new(Utc.with_ymd_and_hms(2025, 9, 15, 14, 0, 0).unwrap());
        let engine = ClockEngine::new(Arc::new(source.clone()));
        (source, engine)
    }

    #[test]
    fn test_start_is_idempotent() {
        let (source, mut clock) = manual();
        clock.start();
        source.advance_secs(30);
        clock.start();
        source.advance_secs(30);
        assert_eq!(clock.elapsed_secs(), 60);
    }

    #[test]
    fn test_pause_freezes_elapsed() {
        let (source, mut clock) = manual();
        clock.start();
        source.advance_secs(300);
        clock.pause();
        source.advance_secs(10);
        assert_eq!(clock.elapsed_secs(), 300);
        assert!(!clock.is_running());

        clock.start();
        assert_eq!(clock.elapsed_secs(), 300, "resume must not apply the paused interval");
        source.advance_secs(5);
        assert_eq!(clock.elapsed_secs(), 305);
    }

    #[test]
    fn test_reset_zeroes_and_stops() {
        let (source, mut clock) = manual();
        clock.start();
        source.advance_secs(42);
        clock.reset();
        assert_eq!(clock.elapsed(), Duration::ZERO);
        assert!(!clock.is_running());
    }

    #[test]
    fn test_missed_ticks_do_not_drift() {
        let (source, mut clock) = manual();
        clock.start();
        // Simulated suspension: nobody polls for ten minutes.
        source.advance_secs(600);
        assert_eq!(clock.elapsed_secs(), 600);
    }

    #[test]
    fn test_backwards_wall_clock_never_decreases_elapsed() {
        let (source, mut clock) = manual();
        clock.start();
        source.advance_secs(120);
        assert_eq!(clock.elapsed_secs(), 120);
        source.set(source.now() - chrono::Duration::seconds(60));
        assert_eq!(clock.elapsed_secs(), 120);
    }

    #[test]
    fn test_format_truncates_and_switches_to_hours() {
        assert_eq!(format_clock(Duration::from_millis(59_999)), "00:59");
        assert_eq!(format_clock(Duration::from_secs(45 * 60)), "45:00");
        assert_eq!(format_clock(Duration::from_secs(3599)), "59:59");
        assert_eq!(format_clock(Duration::from_secs(3600)), "01:00:00");
        assert_eq!(format_clock(Duration::from_secs(2 * 3600 + 5 * 60 + 7)), "02:05:07");
    }

    #[derive(Debug, Clone)]
    enum Op {
        Start,
        Pause,
        Reset,
        Wait(u16),
    }

    fn op_strategy() -> impl Strategy<Value = Op> {
        prop_oneof![
            Just(Op::Start),
            Just(Op::Pause),
            Just(Op::Reset),
            (1u16..600).prop_map(Op::Wait),
        ]
    }

    proptest! {
        /// Property: elapsed grows only while running and reset always zeroes.
        #[test]
        fn prop_elapsed_tracks_running_segments(ops in prop::collection::vec(op_strategy(), 1..40)) {
            let (source, mut clock) = manual();
            for op in ops {
                let before = clock.elapsed();
                match op {
                    Op::Start => clock.start(),
                    Op::Pause => clock.pause(),
                    Op::Reset => {
                        clock.reset();
                        prop_assert_eq!(clock.elapsed(), Duration::ZERO);
                        prop_assert!(!clock.is_running());
                        continue;
                    }
                    Op::Wait(secs) => {
                        let running = clock.is_running();
                        source.advance_secs(secs as u64);
                        let after = clock.elapsed();
                        if running {
                            prop_assert_eq!(after, before + Duration::from_secs(secs as u64));
                        } else {
                            prop_assert_eq!(after, before);
                        }
                        continue;
                    }
                }
                prop_assert_eq!(clock.elapsed(), before);
            }
        }
    }
}
