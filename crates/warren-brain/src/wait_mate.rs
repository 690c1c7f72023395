//! Holding still while a claimed partner walks over.

use rand::RngCore;
use warren_core::{Action, BrainCommand, Decision, Percepts};

use crate::StateBrain;

pub(crate) fn decide(
    _brain: &mut StateBrain,
    percepts: &Percepts,
    _rng: &mut dyn RngCore,
) -> Decision {
    if percepts.hungry {
        // Abandon the pairing on both sides before leaving.
        return Decision::hold(Action::SearchFood).with(BrainCommand::ReleaseMate);
    }
    match percepts.target_mate {
        Some(_) => Decision::hold(Action::WaitMate),
        None => Decision::hold(Action::Idle),
    }
}
