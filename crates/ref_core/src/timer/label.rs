//! Human-readable period labels.
//!
//! The derivation is a pure function of its input so the session, the live
//! publisher and any UI produce identical strings.

use crate::lifecycle::LifecyclePhase;
use crate::timer::period::Boundary;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LabelInput {
    pub phase: LifecyclePhase,
    pub period: u8,
    pub regulation_periods: u8,
    pub is_half_time: bool,
    pub waiting: Option<Boundary>,
}

pub fn period_label(input: LabelInput) -> String {
    use LifecyclePhase::*;

    match input.phase {
        Idle | Setup => return "Kick Off".to_string(),
        Finished => return "Full Time".to_string(),
        ChoosePenaltyFirstKicker | Penalties => return "Penalties".to_string(),
        _ => {}
    }

    if input.is_half_time {
        return "Half Time".to_string();
    }

    match input.waiting {
        Some(Boundary::HalfTimeStart) => "Half Time".to_string(),
        Some(Boundary::Penalties) => "Penalties".to_string(),
        Some(Boundary::MatchStart) => "Kick Off".to_string(),
        Some(_) => format!("End of {}", played_period_name(input.period, input.regulation_periods)),
        None => played_period_name(input.period, input.regulation_periods),
    }
}

/// Name of a period while it is being played.
pub fn played_period_name(period: u8, regulation_periods: u8) -> String {
    let regular = regulation_periods.max(1);
    if period > regular {
        return match period - regular {
            1 => "Extra Time 1".to_string(),
            2 => "Extra Time 2".to_string(),
            _ => "Penalties".to_string(),
        };
    }
    match (regular, period) {
        (1, _) => "Match".to_string(),
        (2, 1) => "First Half".to_string(),
        (2, _) => "Second Half".to_string(),
        (4, q) => format!("Quarter {}", q),
        (_, p) => format!("Period {}", p),
    }
}
