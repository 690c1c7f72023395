//! Rabbit entities and their movement service.

use serde::{Deserialize, Serialize};
use slotmap::{SecondaryMap, new_key_type};

use crate::{Position, WarrenConfig};

new_key_type! {
    /// Stable handle for rabbits backed by a generational slot map.
    pub struct RabbitId;
}

/// Convenience alias for associating side data with rabbits.
pub type RabbitMap<T> = SecondaryMap<RabbitId, T>;

/// Scalar state for a single rabbit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Rabbit {
    pub position: Position,
    /// Ticks lived so far.
    pub age: u32,
    /// Grows every tick; feeding lowers it. See the hunger thresholds in
    /// the configuration.
    pub hunger: f32,
    /// Ticks remaining until the rabbit can mate again.
    pub mate_cooldown: u32,
    /// Picked up by an outside hand; grabbed rabbits freeze in place.
    pub grabbed: bool,
    /// Partner claimed for mating, mirrored on both sides of the pair.
    pub target_mate: Option<RabbitId>,
    pub mobility: Mobility,
}

impl Rabbit {
    /// A rabbit standing at `position` with everything else at rest.
    #[must_use]
    pub fn at(position: Position) -> Self {
        Self {
            position,
            age: 0,
            hunger: 0.0,
            mate_cooldown: 0,
            grabbed: false,
            target_mate: None,
            mobility: Mobility::default(),
        }
    }

    /// Whether hunger has crossed the forage threshold.
    #[must_use]
    pub fn hungry(&self, config: &WarrenConfig) -> bool {
        self.hunger >= config.hungry_threshold
    }

    /// Mature and off cooldown.
    #[must_use]
    pub fn ready_to_mate(&self, config: &WarrenConfig) -> bool {
        self.age >= config.maturity_age && self.mate_cooldown == 0
    }

    /// Not currently claimed by (or claiming) a partner.
    #[must_use]
    pub const fn free_to_mate(&self) -> bool {
        self.target_mate.is_none()
    }
}

/// Per-rabbit movement record: the pathfinding service boiled down to a
/// straight-line walk with an arrive radius.
///
/// `set_destination` raises an edge flag consumed once per tick by the
/// percept stage, so brains can reset their area-scan latch exactly when a
/// new target is assigned.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Mobility {
    target: Option<Position>,
    target_changed: bool,
    reached_reported: bool,
}

impl Mobility {
    /// Begin moving toward `target`. Re-issuing the current target is a
    /// no-op so followers can restate their destination every tick without
    /// spamming new-target events.
    pub fn set_destination(&mut self, target: Position, arrive_radius: f32) {
        if let Some(current) = self.target
            && current.distance_sq(target) <= arrive_radius * arrive_radius
        {
            return;
        }
        self.target = Some(target);
        self.target_changed = true;
        self.reached_reported = false;
    }

    /// Drop the current target, stopping in place.
    pub fn halt(&mut self) {
        self.target = None;
        self.reached_reported = false;
    }

    /// Current movement target, if any.
    #[must_use]
    pub const fn target(&self) -> Option<Position> {
        self.target
    }

    /// Whether `position` is within the arrive radius of the target. With
    /// no target set, the rabbit counts as arrived.
    #[must_use]
    pub fn position_reached(&self, position: Position, arrive_radius: f32) -> bool {
        match self.target {
            Some(target) => position.distance_sq(target) <= arrive_radius * arrive_radius,
            None => true,
        }
    }

    /// Consume the new-target edge flag.
    pub fn take_target_changed(&mut self) -> bool {
        std::mem::take(&mut self.target_changed)
    }

    /// Advance `position` one tick toward the target. Returns true exactly
    /// once per target, on the tick the target is reached.
    pub fn advance(&mut self, position: &mut Position, speed: f32, arrive_radius: f32) -> bool {
        let Some(target) = self.target else {
            return false;
        };
        let dx = target.x - position.x;
        let dy = target.y - position.y;
        let distance = (dx * dx + dy * dy).sqrt();
        if distance > speed {
            let scale = speed / distance;
            position.x += dx * scale;
            position.y += dy * scale;
        } else {
            *position = target;
        }
        if self.position_reached(*position, arrive_radius) && !self.reached_reported {
            self.reached_reported = true;
            return true;
        }
        false
    }
}
