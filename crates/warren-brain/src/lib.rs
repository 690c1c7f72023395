//! The rabbit decision state machine.
//!
//! One module per behaviour; [`StateBrain`] dispatches to the module for
//! its current [`Action`] and runs explicit enter effects whenever the
//! action changes. Brains never touch the world directly: they read a
//! [`Percepts`] snapshot and answer with a [`Decision`] whose commands the
//! world validates and applies.

use rand::RngCore;

use warren_core::{Action, BrainCommand, Decision, Percepts, RabbitBrain, WorldState};

mod idle;
mod join_mate;
mod search_food;
mod search_mate;
mod wait_mate;

/// Utility-style rabbit brain: hunger first, then mating, then idling.
#[derive(Debug, Clone)]
pub struct StateBrain {
    action: Action,
    /// Area-scan latch: set after one scan, re-armed by a new movement
    /// target or a state change.
    has_checked_area: bool,
    /// Ticks of standing around left before the next idle hop.
    rest_in: u32,
}

impl StateBrain {
    /// Registry identifier for this brain family.
    pub const KIND: &'static str = "warren.state";

    /// A fresh brain holding [`Action::Idle`].
    #[must_use]
    pub fn new() -> Self {
        Self {
            action: Action::Idle,
            has_checked_area: false,
            rest_in: 0,
        }
    }

    /// Register the state brain factory on a world, returning its key.
    pub fn install(world: &mut WorldState) -> u64 {
        world
            .brain_registry_mut()
            .register(Self::KIND, |_rng| Box::new(Self::new()))
    }

    /// Enter effects, run once per action change.
    fn enter(&mut self, next: Action, decision: &mut Decision) {
        self.has_checked_area = false;
        match next {
            Action::Idle => self.rest_in = 0,
            // A fresh search drops any stale pairing.
            Action::SearchMate => decision.commands.push(BrainCommand::ReleaseMate),
            Action::WaitMate => decision.commands.push(BrainCommand::Halt),
            Action::SearchFood | Action::JoinMate => {}
        }
    }
}

impl Default for StateBrain {
    fn default() -> Self {
        Self::new()
    }
}

impl RabbitBrain for StateBrain {
    fn kind(&self) -> &'static str {
        Self::KIND
    }

    fn action(&self) -> Action {
        self.action
    }

    fn decide(&mut self, percepts: &Percepts, rng: &mut dyn RngCore) -> Decision {
        if percepts.movement_target_changed {
            self.has_checked_area = false;
        }
        let mut decision = match self.action {
            Action::Idle => idle::decide(self, percepts, rng),
            Action::SearchFood => search_food::decide(self, percepts, rng),
            Action::SearchMate => search_mate::decide(self, percepts, rng),
            Action::WaitMate => wait_mate::decide(self, percepts, rng),
            Action::JoinMate => join_mate::decide(self, percepts, rng),
        };
        if decision.action != self.action {
            self.enter(decision.action, &mut decision);
        }
        self.action = decision.action;
        decision
    }
}

#[cfg(test)]
pub(crate) mod testkit {
    use warren_core::{Cell, MateCandidate, MateStatus, Percepts, Position, RabbitId};

    /// A quiet, well-fed rabbit standing at the origin with nothing in
    /// sight.
    pub fn baseline() -> Percepts {
        Percepts {
            position: Position::new(0.0, 0.0),
            cell: Cell::new(0, 0),
            hungry: false,
            ready_to_mate: false,
            position_reached: true,
            movement_target_changed: false,
            target_mate: None,
            visible_rabbits: Vec::new(),
            visible_carrots: Vec::new(),
        }
    }

    pub fn candidate(id: RabbitId, x: f32, y: f32) -> MateCandidate {
        let position = Position::new(x, y);
        MateCandidate {
            id,
            position,
            distance_sq: Position::new(0.0, 0.0).distance_sq(position),
            grabbed: false,
            ready_to_mate: true,
            free_to_mate: true,
            reachable: true,
        }
    }

    pub fn mate_status(id: RabbitId, x: f32, y: f32) -> MateStatus {
        let position = Position::new(x, y);
        MateStatus {
            id,
            position,
            distance_sq: Position::new(0.0, 0.0).distance_sq(position),
        }
    }

    /// Distinct rabbit ids for synthetic percepts.
    pub fn rabbit_ids(count: usize) -> Vec<RabbitId> {
        let mut arena = slotmap::SlotMap::<RabbitId, ()>::with_key();
        (0..count).map(|_| arena.insert(())).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::{baseline, candidate, mate_status, rabbit_ids};
    use rand::{SeedableRng, rngs::SmallRng};

    fn rng() -> SmallRng {
        SmallRng::seed_from_u64(99)
    }

    #[test]
    fn dispatch_runs_enter_effects_on_transition() {
        let mut brain = StateBrain::new();
        let mut percepts = baseline();
        percepts.ready_to_mate = true;
        let decision = brain.decide(&percepts, &mut rng());
        assert_eq!(decision.action, Action::SearchMate);
        assert_eq!(brain.action(), Action::SearchMate);
        assert!(
            decision.commands.contains(&BrainCommand::ReleaseMate),
            "entering a mate search drops stale pairings"
        );
    }

    #[test]
    fn new_movement_target_rearms_the_scan_latch() {
        let mut brain = StateBrain::new();
        brain.action = Action::SearchMate;
        brain.has_checked_area = true;
        let mut percepts = baseline();
        percepts.ready_to_mate = true;
        percepts.movement_target_changed = true;
        let ids = rabbit_ids(1);
        percepts.visible_rabbits = vec![candidate(ids[0], 2.0, 0.0)];

        let decision = brain.decide(&percepts, &mut rng());
        assert_eq!(decision.action, Action::JoinMate);
        assert!(decision.commands.contains(&BrainCommand::ClaimMate(ids[0])));
    }

    #[test]
    fn an_assigned_partner_moves_any_searcher_to_waiting() {
        let mut brain = StateBrain::new();
        brain.action = Action::SearchMate;
        let mut percepts = baseline();
        percepts.ready_to_mate = true;
        let ids = rabbit_ids(1);
        percepts.target_mate = Some(mate_status(ids[0], 3.0, 3.0));

        let decision = brain.decide(&percepts, &mut rng());
        assert_eq!(decision.action, Action::WaitMate);
        assert!(decision.commands.contains(&BrainCommand::Halt));
    }
}
