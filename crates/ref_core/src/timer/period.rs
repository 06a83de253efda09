//! Period boundaries: where the match goes after a timed period ends.

use serde::{Deserialize, Serialize};

use crate::config::MatchConfiguration;
use crate::lifecycle::LifecyclePhase;

/// A "waiting for next phase" condition. The orchestrator parks here until
/// the referee explicitly moves on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Boundary {
    MatchStart,
    HalfTimeStart,
    NextPeriod,
    ExtraTimeFirstHalf,
    ExtraTimeSecondHalf,
    Penalties,
}

impl Boundary {
    /// Boundaries released by `start_next_period`.
    pub fn starts_period(self) -> bool {
        matches!(
            self,
            Boundary::HalfTimeStart
                | Boundary::NextPeriod
                | Boundary::ExtraTimeFirstHalf
                | Boundary::ExtraTimeSecondHalf
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PeriodOutcome {
    Waiting(Boundary),
    FullTime,
}

/// Where the match goes once `period` has been ended.
///
/// `is_level` is the score at the end of the period; it only matters after
/// the last regulation period and after the second extra-time half.
pub fn next_boundary(period: u8, config: &MatchConfiguration, is_level: bool) -> PeriodOutcome {
    let regular = config.regulation_periods();

    if period < regular {
        return match config.half_time_after_period() {
            Some(ht) if ht == period => PeriodOutcome::Waiting(Boundary::HalfTimeStart),
            _ => PeriodOutcome::Waiting(Boundary::NextPeriod),
        };
    }

    if period == regular {
        return if is_level && config.has_extra_time {
            PeriodOutcome::Waiting(Boundary::ExtraTimeFirstHalf)
        } else if is_level && config.has_penalties && config.penalties_without_extra_time {
            PeriodOutcome::Waiting(Boundary::Penalties)
        } else {
            PeriodOutcome::FullTime
        };
    }

    if period == regular + 1 && config.has_extra_time {
        return PeriodOutcome::Waiting(Boundary::ExtraTimeSecondHalf);
    }

    if is_level && config.has_penalties {
        PeriodOutcome::Waiting(Boundary::Penalties)
    } else {
        PeriodOutcome::FullTime
    }
}

/// Lifecycle phase that owns `period` while it is being played.
pub fn phase_for_period(period: u8, config: &MatchConfiguration) -> LifecyclePhase {
    let regular = config.regulation_periods();
    if period <= regular {
        match config.half_time_after_period() {
            Some(ht) if period > ht => LifecyclePhase::KickoffSecondHalf,
            _ => LifecyclePhase::KickoffFirstHalf,
        }
    } else if period == regular + 1 {
        LifecyclePhase::KickoffExtraTimeFirstHalf
    } else if period == regular + 2 {
        LifecyclePhase::KickoffExtraTimeSecondHalf
    } else {
        LifecyclePhase::ChoosePenaltyFirstKicker
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cup() -> MatchConfiguration {
        MatchConfiguration::default().with_extra_time(15).with_penalties(5)
    }

    #[test]
    fn test_regulation_halves() {
        let config = MatchConfiguration::default();
        assert_eq!(next_boundary(1, &config, true), PeriodOutcome::Waiting(Boundary::HalfTimeStart));
        assert_eq!(next_boundary(2, &config, true), PeriodOutcome::FullTime);
        assert_eq!(next_boundary(2, &config, false), PeriodOutcome::FullTime);
    }

    #[test]
    fn test_quarters_only_break_for_half_time_in_the_middle() {
        let config = MatchConfiguration::default().with_duration_minutes(60, 4);
        assert_eq!(next_boundary(1, &config, false), PeriodOutcome::Waiting(Boundary::NextPeriod));
        assert_eq!(next_boundary(2, &config, false), PeriodOutcome::Waiting(Boundary::HalfTimeStart));
        assert_eq!(next_boundary(3, &config, false), PeriodOutcome::Waiting(Boundary::NextPeriod));
        assert_eq!(next_boundary(4, &config, false), PeriodOutcome::FullTime);
        assert_eq!(phase_for_period(2, &config), LifecyclePhase::KickoffFirstHalf);
        assert_eq!(phase_for_period(3, &config), LifecyclePhase::KickoffSecondHalf);
    }

    #[test]
    fn test_level_after_regulation_goes_to_extra_time() {
        let config = cup();
        assert_eq!(next_boundary(2, &config, true), PeriodOutcome::Waiting(Boundary::ExtraTimeFirstHalf));
        assert_eq!(next_boundary(2, &config, false), PeriodOutcome::FullTime);
        assert_eq!(next_boundary(3, &config, false), PeriodOutcome::Waiting(Boundary::ExtraTimeSecondHalf));
        assert_eq!(next_boundary(4, &config, true), PeriodOutcome::Waiting(Boundary::Penalties));
        assert_eq!(next_boundary(4, &config, false), PeriodOutcome::FullTime);
    }

    #[test]
    fn test_penalties_without_extra_time_needs_policy_flag() {
        let mut config = MatchConfiguration::default().with_penalties(5);
        assert_eq!(next_boundary(2, &config, true), PeriodOutcome::FullTime);

        config.penalties_without_extra_time = true;
        assert_eq!(next_boundary(2, &config, true), PeriodOutcome::Waiting(Boundary::Penalties));
    }

    #[test]
    fn test_extra_time_without_penalties_ends_level() {
        let config = MatchConfiguration::default().with_extra_time(15);
        assert_eq!(next_boundary(4, &config, true), PeriodOutcome::FullTime);
    }

    #[test]
    fn test_phase_for_period() {
        let config = cup();
        assert_eq!(phase_for_period(1, &config), LifecyclePhase::KickoffFirstHalf);
        assert_eq!(phase_for_period(2, &config), LifecyclePhase::KickoffSecondHalf);
        assert_eq!(phase_for_period(3, &config), LifecyclePhase::KickoffExtraTimeFirstHalf);
        assert_eq!(phase_for_period(4, &config), LifecyclePhase::KickoffExtraTimeSecondHalf);
        assert_eq!(phase_for_period(5, &config), LifecyclePhase::ChoosePenaltyFirstKicker);
    }
}
