//! Standing around between needs, with the occasional hop elsewhere.

use rand::{Rng, RngCore};
use warren_core::{Action, BrainCommand, Decision, Percepts};

use crate::StateBrain;

const REST_MIN: u32 = 20;
const REST_MAX: u32 = 90;

pub(crate) fn decide(
    brain: &mut StateBrain,
    percepts: &Percepts,
    rng: &mut dyn RngCore,
) -> Decision {
    if percepts.hungry {
        return Decision::hold(Action::SearchFood);
    }
    if percepts.target_mate.is_some() {
        return Decision::hold(Action::WaitMate);
    }
    if percepts.ready_to_mate {
        return Decision::hold(Action::SearchMate);
    }

    if percepts.position_reached {
        if brain.rest_in == 0 {
            brain.rest_in = rng.random_range(REST_MIN..=REST_MAX);
            return Decision::hold(Action::Idle).with(BrainCommand::Wander);
        }
        brain.rest_in -= 1;
    }
    Decision::hold(Action::Idle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::{baseline, mate_status, rabbit_ids};
    use rand::{SeedableRng, rngs::SmallRng};

    fn rng() -> SmallRng {
        SmallRng::seed_from_u64(5)
    }

    #[test]
    fn hunger_outranks_everything() {
        let mut brain = StateBrain::new();
        let mut percepts = baseline();
        percepts.hungry = true;
        percepts.ready_to_mate = true;
        let ids = rabbit_ids(1);
        percepts.target_mate = Some(mate_status(ids[0], 1.0, 0.0));
        assert_eq!(
            decide(&mut brain, &percepts, &mut rng()).action,
            Action::SearchFood
        );
    }

    #[test]
    fn readiness_starts_a_mate_search() {
        let mut brain = StateBrain::new();
        let mut percepts = baseline();
        percepts.ready_to_mate = true;
        assert_eq!(
            decide(&mut brain, &percepts, &mut rng()).action,
            Action::SearchMate
        );
    }

    #[test]
    fn wanders_then_rests_between_hops() {
        let mut brain = StateBrain::new();
        let percepts = baseline();
        let mut rng = rng();

        let first = decide(&mut brain, &percepts, &mut rng);
        assert!(first.commands.contains(&BrainCommand::Wander));
        assert!(brain.rest_in >= REST_MIN);

        // While resting, no further hop is requested.
        let second = decide(&mut brain, &percepts, &mut rng);
        assert!(second.commands.is_empty());
    }
}
