//! Penalty shootout sequencing and decision.

use serde::{Deserialize, Serialize};

use crate::events::{PenaltyAttemptDetails, PenaltyResult, TeamSide};

/// Final or running shootout count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PenaltyTally {
    pub home_scored: u16,
    pub home_taken: u16,
    pub away_scored: u16,
    pub away_taken: u16,
}

#[derive(Debug, Clone, Default)]
struct SideRecord {
    attempts: Vec<PenaltyAttemptDetails>,
}

impl SideRecord {
    fn taken(&self) -> u16 {
        self.attempts.len() as u16
    }

    fn scored(&self) -> u16 {
        self.attempts.iter().filter(|a| a.result == PenaltyResult::Scored).count() as u16
    }
}

/// Result of recording one attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttemptOutcome {
    pub team: TeamSide,
    pub details: PenaltyAttemptDetails,
    /// True only on the attempt that first decided the shootout.
    pub newly_decided: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UndoneAttempt {
    pub team: TeamSide,
    pub details: PenaltyAttemptDetails,
}

#[derive(Debug, Clone)]
pub struct PenaltyShootout {
    initial_rounds: u16,
    active: bool,
    first_kicker: TeamSide,
    has_chosen_first_kicker: bool,
    home: SideRecord,
    away: SideRecord,
    winner: Option<TeamSide>,
    decision_announced: bool,
}

impl PenaltyShootout {
    pub fn new(initial_rounds: u8) -> Self {
        Self {
            initial_rounds: initial_rounds.max(1) as u16,
            active: false,
            first_kicker: TeamSide::Home,
            has_chosen_first_kicker: false,
            home: SideRecord::default(),
            away: SideRecord::default(),
            winner: None,
            decision_announced: false,
        }
    }

    pub fn set_initial_rounds(&mut self, rounds: u8) {
        self.initial_rounds = rounds.max(1) as u16;
    }

    pub fn initial_rounds(&self) -> u16 {
        self.initial_rounds
    }

    /// Starts a fresh shootout. No-op while one is already running.
    pub fn begin(&mut self) -> bool {
        if self.active {
            return false;
        }
        *self = Self::new(self.initial_rounds as u8);
        self.active = true;
        true
    }

    pub fn set_first_kicker(&mut self, team: TeamSide) {
        self.first_kicker = team;
        self.has_chosen_first_kicker = true;
    }

    pub fn first_kicker(&self) -> TeamSide {
        self.first_kicker
    }

    pub fn has_chosen_first_kicker(&self) -> bool {
        self.has_chosen_first_kicker
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn is_decided(&self) -> bool {
        self.winner.is_some()
    }

    pub fn winner(&self) -> Option<TeamSide> {
        self.winner
    }

    pub fn tally(&self) -> PenaltyTally {
        PenaltyTally {
            home_scored: self.home.scored(),
            home_taken: self.home.taken(),
            away_scored: self.away.scored(),
            away_taken: self.away.taken(),
        }
    }

    pub fn results(&self, side: TeamSide) -> Vec<PenaltyResult> {
        self.side(side).attempts.iter().map(|a| a.result).collect()
    }

    /// Rounds to display: the initial rounds, extended by sudden death.
    pub fn rounds_visible(&self) -> u16 {
        self.initial_rounds.max(self.home.taken()).max(self.away.taken())
    }

    pub fn next_team(&self) -> TeamSide {
        let (home, away) = (self.home.taken(), self.away.taken());
        if home == away {
            self.first_kicker
        } else if home < away {
            TeamSide::Home
        } else {
            TeamSide::Away
        }
    }

    pub fn is_sudden_death(&self) -> bool {
        self.home.taken() >= self.initial_rounds && self.away.taken() >= self.initial_rounds
    }

    pub fn record_attempt(
        &mut self,
        team: TeamSide,
        result: PenaltyResult,
        player_number: Option<u16>,
    ) -> Option<AttemptOutcome> {
        if !self.active {
            return None;
        }
        let round = self.side(team).taken() + 1;
        let details = PenaltyAttemptDetails { result, player_number, round };
        self.side_mut(team).attempts.push(details);

        let was_announced = self.decision_announced;
        self.recompute_decision();
        let newly_decided = self.winner.is_some() && !was_announced;
        if newly_decided {
            self.decision_announced = true;
        }
        Some(AttemptOutcome { team, details, newly_decided })
    }

    pub fn undo_last_attempt(&mut self) -> Option<UndoneAttempt> {
        if !self.active {
            return None;
        }
        let (home, away) = (self.home.taken(), self.away.taken());
        let team = if home > away {
            TeamSide::Home
        } else if away > home {
            TeamSide::Away
        } else if home > 0 {
            self.first_kicker.opponent()
        } else {
            return None;
        };

        let details = self.side_mut(team).attempts.pop()?;
        self.recompute_decision();
        if self.winner.is_none() {
            self.decision_announced = false;
        }
        Some(UndoneAttempt { team, details })
    }

    pub fn swap_kicking_order(&mut self) {
        if !self.active {
            return;
        }
        self.first_kicker = self.first_kicker.opponent();
        self.has_chosen_first_kicker = true;
    }

    /// Closes the shootout; the tally stays readable.
    pub fn end(&mut self) -> bool {
        let was_active = self.active;
        self.active = false;
        was_active
    }

    fn recompute_decision(&mut self) {
        let rounds = self.initial_rounds;
        let (home_taken, away_taken) = (self.home.taken(), self.away.taken());
        let (home_scored, away_scored) = (self.home.scored(), self.away.scored());
        let home_remaining = rounds.saturating_sub(home_taken);
        let away_remaining = rounds.saturating_sub(away_taken);

        self.winner = if (home_taken <= rounds || away_taken <= rounds)
            && home_scored > away_scored + away_remaining
        {
            Some(TeamSide::Home)
        } else if (home_taken <= rounds || away_taken <= rounds)
            && away_scored > home_scored + home_remaining
        {
            Some(TeamSide::Away)
        } else if home_taken >= rounds
            && away_taken >= rounds
            && home_taken == away_taken
            && home_scored != away_scored
        {
            Some(if home_scored > away_scored { TeamSide::Home } else { TeamSide::Away })
        } else {
            None
        };
    }

    fn side(&self, team: TeamSide) -> &SideRecord {
        match team {
            TeamSide::Home => &self.home,
            TeamSide::Away => &self.away,
        }
    }

    fn side_mut(&mut self, team: TeamSide) -> &mut SideRecord {
        match team {
            TeamSide::Home => &mut self.home,
            TeamSide::Away => &mut self.away,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use PenaltyResult::{Missed, Scored};
    use TeamSide::{Away, Home};

    fn started(rounds: u8, first: TeamSide) -> PenaltyShootout {
        let mut shootout = PenaltyShootout::new(rounds);
        assert!(shootout.begin());
        shootout.set_first_kicker(first);
        shootout
    }

    fn kick(shootout: &mut PenaltyShootout, result: PenaltyResult) -> AttemptOutcome {
        let team = shootout.next_team();
        shootout.record_attempt(team, result, None).unwrap()
    }

    #[test]
    fn test_next_team_alternates_from_first_kicker() {
        let mut shootout = started(5, Away);
        assert_eq!(shootout.next_team(), Away);
        kick(&mut shootout, Scored);
        assert_eq!(shootout.next_team(), Home);
        kick(&mut shootout, Scored);
        assert_eq!(shootout.next_team(), Away);
    }

    #[test]
    fn test_attempts_ignored_when_inactive() {
        let mut shootout = PenaltyShootout::new(5);
        assert!(shootout.record_attempt(Home, Scored, None).is_none());
    }

    #[test]
    fn test_early_decision_fires_once() {
        let mut shootout = started(3, Home);
        // Home 1/2, Away 0/2, then home scores a third: away can reach 1 at most.
        for result in [Scored, Missed, Missed, Missed] {
            let outcome = kick(&mut shootout, result);
            assert!(!outcome.newly_decided);
        }
        let outcome = kick(&mut shootout, Scored);
        assert!(outcome.newly_decided);
        assert_eq!(shootout.winner(), Some(Home));

        let again = kick(&mut shootout, Missed);
        assert!(!again.newly_decided, "decision haptic is one-shot");
    }

    #[test]
    fn test_sudden_death_after_level_initial_rounds() {
        let mut shootout = started(1, Home);
        kick(&mut shootout, Scored);
        kick(&mut shootout, Scored);
        assert!(shootout.is_sudden_death());
        assert!(!shootout.is_decided());

        kick(&mut shootout, Missed);
        assert!(!shootout.is_decided(), "away still to kick in round 2");
        let outcome = kick(&mut shootout, Scored);
        assert!(outcome.newly_decided);
        assert_eq!(shootout.winner(), Some(Away));
        assert_eq!(shootout.rounds_visible(), 2);
    }

    #[test]
    fn test_undo_reopens_decision() {
        let mut shootout = started(1, Home);
        kick(&mut shootout, Scored);
        kick(&mut shootout, Missed);
        assert_eq!(shootout.winner(), Some(Home));

        let undone = shootout.undo_last_attempt().unwrap();
        assert_eq!(undone.team, Away);
        assert!(!shootout.is_decided());

        let outcome = kick(&mut shootout, Missed);
        assert!(outcome.newly_decided, "haptic re-arms after undo");
    }

    #[test]
    fn test_undo_with_equal_counts_uses_second_kicker() {
        let mut shootout = started(5, Away);
        kick(&mut shootout, Scored);
        kick(&mut shootout, Scored);
        assert_eq!(shootout.undo_last_attempt().unwrap().team, Home);
        assert_eq!(shootout.undo_last_attempt().unwrap().team, Away);
        assert!(shootout.undo_last_attempt().is_none());
    }

    #[test]
    fn test_swap_kicking_order() {
        let mut shootout = started(5, Home);
        shootout.swap_kicking_order();
        assert_eq!(shootout.next_team(), Away);
    }

    #[test]
    fn test_tally_survives_end() {
        let mut shootout = started(5, Home);
        kick(&mut shootout, Scored);
        assert!(shootout.end());
        assert!(!shootout.end());
        assert_eq!(shootout.tally().home_scored, 1);
    }
}
