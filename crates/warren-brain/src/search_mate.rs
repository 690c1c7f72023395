//! Looking for a partner: wander, scan each spot once, claim the closest
//! suitable rabbit.

use ordered_float::OrderedFloat;
use rand::RngCore;
use warren_core::{Action, BrainCommand, Decision, Percepts};

use crate::StateBrain;

pub(crate) fn decide(
    brain: &mut StateBrain,
    percepts: &Percepts,
    _rng: &mut dyn RngCore,
) -> Decision {
    // Finding food is the priority.
    if percepts.hungry {
        return Decision::hold(Action::SearchFood);
    }
    // Another rabbit claimed us while we were searching.
    if percepts.target_mate.is_some() {
        return Decision::hold(Action::WaitMate);
    }

    if percepts.position_reached && !brain.has_checked_area {
        brain.has_checked_area = true;

        let closest = percepts
            .visible_rabbits
            .iter()
            .filter(|other| !other.grabbed)
            .filter(|other| other.ready_to_mate && other.free_to_mate)
            .filter(|other| other.reachable)
            .min_by_key(|other| OrderedFloat(other.distance_sq));

        if let Some(partner) = closest {
            return Decision::hold(Action::JoinMate).with(BrainCommand::ClaimMate(partner.id));
        }
        // Nobody suitable here; hop somewhere else. Arriving there
        // re-arms the scan.
        return Decision::hold(Action::SearchMate).with(BrainCommand::Wander);
    }
    Decision::hold(Action::SearchMate)
}
