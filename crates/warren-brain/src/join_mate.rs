//! Walking over to a claimed partner.

use rand::RngCore;
use warren_core::{Action, BrainCommand, Decision, Percepts};

use crate::StateBrain;

pub(crate) fn decide(
    _brain: &mut StateBrain,
    percepts: &Percepts,
    _rng: &mut dyn RngCore,
) -> Decision {
    if percepts.hungry {
        return Decision::hold(Action::SearchFood).with(BrainCommand::ReleaseMate);
    }
    match percepts.target_mate {
        // Track the partner's live position; unchanged targets are free.
        Some(mate) => Decision::hold(Action::JoinMate).with(BrainCommand::MoveTo(mate.position)),
        // Claim fell through (partner died, was grabbed, or was claimed
        // first): resume searching.
        None => Decision::hold(Action::SearchMate),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::{baseline, mate_status, rabbit_ids};
    use rand::{SeedableRng, rngs::SmallRng};
    use warren_core::Position;

    fn rng() -> SmallRng {
        SmallRng::seed_from_u64(37)
    }

    #[test]
    fn follows_the_partner_as_it_moves() {
        let mut brain = StateBrain::new();
        let mut percepts = baseline();
        let ids = rabbit_ids(1);
        percepts.target_mate = Some(mate_status(ids[0], 6.0, -2.0));
        let decision = decide(&mut brain, &percepts, &mut rng());
        assert_eq!(decision.action, Action::JoinMate);
        assert!(
            decision
                .commands
                .contains(&BrainCommand::MoveTo(Position::new(6.0, -2.0)))
        );
    }

    #[test]
    fn a_lost_claim_falls_back_to_searching() {
        let mut brain = StateBrain::new();
        let percepts = baseline();
        assert_eq!(
            decide(&mut brain, &percepts, &mut rng()).action,
            Action::SearchMate
        );
    }

    #[test]
    fn hunger_abandons_the_approach() {
        let mut brain = StateBrain::new();
        let mut percepts = baseline();
        percepts.hungry = true;
        let ids = rabbit_ids(1);
        percepts.target_mate = Some(mate_status(ids[0], 6.0, -2.0));
        let decision = decide(&mut brain, &percepts, &mut rng());
        assert_eq!(decision.action, Action::SearchFood);
        assert!(decision.commands.contains(&BrainCommand::ReleaseMate));
    }
}
