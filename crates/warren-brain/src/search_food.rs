//! Foraging: walk to the closest reachable carrot and nibble it.

use ordered_float::OrderedFloat;
use rand::RngCore;
use warren_core::{Action, BrainCommand, Decision, Percepts};

use crate::StateBrain;

pub(crate) fn decide(
    _brain: &mut StateBrain,
    percepts: &Percepts,
    _rng: &mut dyn RngCore,
) -> Decision {
    if !percepts.hungry {
        return Decision::hold(Action::Idle).with(BrainCommand::Halt);
    }

    let closest = percepts
        .visible_carrots
        .iter()
        .filter(|carrot| carrot.reachable)
        .min_by_key(|carrot| OrderedFloat(carrot.distance_sq));

    if let Some(carrot) = closest {
        // Retargeting an unchanged destination is free, and the bite is a
        // silent no-op until the carrot is within reach.
        return Decision::hold(Action::SearchFood)
            .with(BrainCommand::MoveTo(carrot.position))
            .with(BrainCommand::Eat(carrot.id));
    }

    if percepts.position_reached {
        return Decision::hold(Action::SearchFood).with(BrainCommand::Wander);
    }
    Decision::hold(Action::SearchFood)
}
