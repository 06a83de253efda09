//! Coarse match lifecycle: idle → setup → kickoffs → penalties → finished.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecyclePhase {
    Idle,
    Setup,
    KickoffFirstHalf,
    KickoffSecondHalf,
    KickoffExtraTimeFirstHalf,
    KickoffExtraTimeSecondHalf,
    ChoosePenaltyFirstKicker,
    Penalties,
    Finished,
}

impl LifecyclePhase {
    pub const ALL: [LifecyclePhase; 9] = [
        LifecyclePhase::Idle,
        LifecyclePhase::Setup,
        LifecyclePhase::KickoffFirstHalf,
        LifecyclePhase::KickoffSecondHalf,
        LifecyclePhase::KickoffExtraTimeFirstHalf,
        LifecyclePhase::KickoffExtraTimeSecondHalf,
        LifecyclePhase::ChoosePenaltyFirstKicker,
        LifecyclePhase::Penalties,
        LifecyclePhase::Finished,
    ];

    pub fn is_kickoff(self) -> bool {
        matches!(
            self,
            LifecyclePhase::KickoffFirstHalf
                | LifecyclePhase::KickoffSecondHalf
                | LifecyclePhase::KickoffExtraTimeFirstHalf
                | LifecyclePhase::KickoffExtraTimeSecondHalf
        )
    }

    pub fn is_penalty_phase(self) -> bool {
        matches!(self, LifecyclePhase::ChoosePenaltyFirstKicker | LifecyclePhase::Penalties)
    }

    /// A match has been started and not yet finished or torn down.
    pub fn is_active(self) -> bool {
        self.is_kickoff() || self.is_penalty_phase()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LifecyclePhase::Idle => "idle",
            LifecyclePhase::Setup => "setup",
            LifecyclePhase::KickoffFirstHalf => "kickoff_first_half",
            LifecyclePhase::KickoffSecondHalf => "kickoff_second_half",
            LifecyclePhase::KickoffExtraTimeFirstHalf => "kickoff_extra_time_first_half",
            LifecyclePhase::KickoffExtraTimeSecondHalf => "kickoff_extra_time_second_half",
            LifecyclePhase::ChoosePenaltyFirstKicker => "choose_penalty_first_kicker",
            LifecyclePhase::Penalties => "penalties",
            LifecyclePhase::Finished => "finished",
        }
    }
}

impl std::fmt::Display for LifecyclePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether `from → to` is a legal edge.
///
/// Reset to `Idle` is legal from everywhere. `Finished` is terminal: the only
/// way out is that reset. Every active phase may be forced to `Finished`
/// (abandoned match); the remaining edges follow the period order, with
/// regulation able to skip straight to penalties or full time.
pub fn is_legal_transition(from: LifecyclePhase, to: LifecyclePhase) -> bool {
    use LifecyclePhase::*;

    if to == Idle {
        return from != Idle;
    }
    if from == Finished {
        return false;
    }
    if to == Finished {
        return from.is_active();
    }
    matches!(
        (from, to),
        (Idle, Setup)
            | (Setup, KickoffFirstHalf)
            | (KickoffFirstHalf, KickoffSecondHalf)
            | (KickoffFirstHalf, KickoffExtraTimeFirstHalf)
            | (KickoffFirstHalf, ChoosePenaltyFirstKicker)
            | (KickoffSecondHalf, KickoffExtraTimeFirstHalf)
            | (KickoffSecondHalf, ChoosePenaltyFirstKicker)
            | (KickoffExtraTimeFirstHalf, KickoffExtraTimeSecondHalf)
            | (KickoffExtraTimeSecondHalf, ChoosePenaltyFirstKicker)
            | (ChoosePenaltyFirstKicker, Penalties)
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseTransition {
    pub from: LifecyclePhase,
    pub to: LifecyclePhase,
}

/// Holds exactly one active phase and applies legal transitions.
///
/// Illegal or self transitions are ignored and reported as `None`; callers
/// never see an error for them.
#[derive(Debug, Clone)]
pub struct LifecycleMachine {
    phase: LifecyclePhase,
}

impl Default for LifecycleMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl LifecycleMachine {
    pub fn new() -> Self {
        Self { phase: LifecyclePhase::Idle }
    }

    pub fn phase(&self) -> LifecyclePhase {
        self.phase
    }

    pub fn transition(&mut self, to: LifecyclePhase) -> Option<PhaseTransition> {
        let from = self.phase;
        if from == to || !is_legal_transition(from, to) {
            tracing::trace!(%from, %to, "lifecycle transition ignored");
            return None;
        }
        self.phase = to;
        tracing::debug!(%from, %to, "lifecycle transition");
        Some(PhaseTransition { from, to })
    }

    pub fn reset(&mut self) -> Option<PhaseTransition> {
        self.transition(LifecyclePhase::Idle)
    }
}
