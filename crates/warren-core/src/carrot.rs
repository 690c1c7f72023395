//! Carrot population manager: one carrot per cell, bounded by the rabbit
//! population, spreading to neighbouring cells and rotting away over time.

use std::collections::HashMap;

use rand::{Rng, RngCore};
use serde::{Deserialize, Serialize};
use slotmap::{SlotMap, new_key_type};

use crate::grid::{Cell, TerrainGrid, free_neighbors};
use crate::{Position, WarrenConfig};

new_key_type! {
    /// Stable handle for carrots backed by a generational slot map.
    pub struct CarrotId;
}

/// A single carrot, planted on a cell or carried after being uprooted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Carrot {
    /// Cell the carrot occupies (last occupied cell while carried).
    pub cell: Cell,
    /// World position inside the cell.
    pub position: Position,
    /// Edible food stored in the carrot.
    pub food: f32,
    /// Ticks since the carrot sprouted or was last planted.
    pub age: u32,
    /// Ticks remaining before the carrot rots away.
    pub rot_in: u32,
    /// Ticks remaining before the next spread attempt.
    pub spread_in: u32,
    /// Uprooted and held; carried carrots neither rot nor spread.
    pub carried: bool,
}

/// Why a carrot left the world. The removal itself is identical for every
/// cause; the cause only feeds the destroy-effect hook.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum RemovalCause {
    Rotted,
    Eaten,
    Discarded,
    Cleared,
}

/// Observable carrot lifecycle notifications, drained once per tick.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum CarrotEvent {
    Sprouted {
        id: CarrotId,
        cell: Cell,
    },
    Removed {
        id: CarrotId,
        cell: Cell,
        food: f32,
        cause: RemovalCause,
    },
    Uprooted {
        id: CarrotId,
        cell: Cell,
    },
    Planted {
        id: CarrotId,
        cell: Cell,
    },
    Merged {
        into: CarrotId,
        from: CarrotId,
        cell: Cell,
        food: f32,
    },
}

/// Carrot population manager.
///
/// Owns every carrot and the cell-indexed mapping of planted ones. All
/// mutating operations fail silently (returning `None` or doing nothing)
/// when their preconditions do not hold; a tick-driven caller simply tries
/// again on a later tick.
#[derive(Debug, Default)]
pub struct CarrotPatch {
    carrots: SlotMap<CarrotId, Carrot>,
    by_cell: HashMap<Cell, CarrotId>,
    events: Vec<CarrotEvent>,
}

impl CarrotPatch {
    /// Create an empty patch.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of planted carrots (carried carrots are not counted).
    #[must_use]
    pub fn planted_count(&self) -> usize {
        self.by_cell.len()
    }

    /// Number of carrots in existence, carried ones included.
    #[must_use]
    pub fn carrot_count(&self) -> usize {
        self.carrots.len()
    }

    /// Returns true when no carrots exist at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.carrots.is_empty()
    }

    /// The carrot planted at `cell`, if any.
    #[must_use]
    pub fn carrot_at(&self, cell: Cell) -> Option<CarrotId> {
        self.by_cell.get(&cell).copied()
    }

    /// Borrow a carrot by handle.
    #[must_use]
    pub fn get(&self, id: CarrotId) -> Option<&Carrot> {
        self.carrots.get(id)
    }

    /// Mutably borrow a carrot by handle.
    #[must_use]
    pub fn get_mut(&mut self, id: CarrotId) -> Option<&mut Carrot> {
        self.carrots.get_mut(id)
    }

    /// Iterate over all carrots in slot order.
    pub fn iter(&self) -> impl Iterator<Item = (CarrotId, &Carrot)> {
        self.carrots.iter()
    }

    /// Sum of food across every carrot.
    #[must_use]
    pub fn total_food(&self) -> f32 {
        self.carrots.values().map(|carrot| carrot.food).sum()
    }

    /// Drain the event log accumulated since the last call.
    pub fn take_events(&mut self) -> Vec<CarrotEvent> {
        std::mem::take(&mut self.events)
    }

    /// Spawn a fresh carrot on `cell`.
    ///
    /// Returns `None` without side effects when the cell is off the island,
    /// already holds a carrot, or the planted population has reached
    /// `capacity`.
    pub fn spawn(
        &mut self,
        cell: Cell,
        grid: &dyn TerrainGrid,
        config: &WarrenConfig,
        capacity: usize,
        rng: &mut dyn RngCore,
    ) -> Option<CarrotId> {
        if !grid.is_valid(cell) {
            return None;
        }
        if self.by_cell.contains_key(&cell) {
            return None;
        }
        if self.by_cell.len() >= capacity {
            return None;
        }

        let position = grid.random_position_in(cell, rng);
        let carrot = Carrot {
            cell,
            position,
            food: config.carrot_initial_food,
            age: 0,
            rot_in: jittered(config.carrot_rot_ticks, config.carrot_rot_jitter, rng),
            spread_in: jittered(config.carrot_spread_interval, config.carrot_spread_jitter, rng),
            carried: false,
        };
        let id = self.carrots.insert(carrot);
        self.by_cell.insert(cell, id);
        self.events.push(CarrotEvent::Sprouted { id, cell });
        Some(id)
    }

    /// Spread from the carrot planted on `source`: pick one unoccupied
    /// valid neighbour uniformly at random and spawn there.
    pub fn spread_from(
        &mut self,
        source: Cell,
        grid: &dyn TerrainGrid,
        config: &WarrenConfig,
        capacity: usize,
        rng: &mut dyn RngCore,
    ) -> Option<CarrotId> {
        let open = free_neighbors(grid, source, |cell| !self.by_cell.contains_key(&cell));
        if open.is_empty() {
            return None;
        }
        let choice = open[rng.random_range(0..open.len())];
        self.spawn(choice, grid, config, capacity, rng)
    }

    /// Remove a carrot outright (rot, eaten empty, discarded off-island).
    ///
    /// The removal is identical regardless of `cause`; the planted mapping
    /// entry is dropped when present.
    pub fn remove(&mut self, id: CarrotId, cause: RemovalCause) -> Option<Carrot> {
        let carrot = self.carrots.remove(id)?;
        if self.by_cell.get(&carrot.cell) == Some(&id) {
            self.by_cell.remove(&carrot.cell);
        }
        self.events.push(CarrotEvent::Removed {
            id,
            cell: carrot.cell,
            food: carrot.food,
            cause,
        });
        Some(carrot)
    }

    /// Uproot the carrot planted at `cell`, detaching it from the grid
    /// without destroying it. Returns the now-carried handle.
    pub fn uproot(&mut self, cell: Cell) -> Option<CarrotId> {
        let id = self.by_cell.remove(&cell)?;
        let carrot = self
            .carrots
            .get_mut(id)
            .expect("planted mapping referenced a live carrot");
        carrot.carried = true;
        self.events.push(CarrotEvent::Uprooted { id, cell });
        Some(id)
    }

    /// Plant a carried carrot onto `cell`.
    ///
    /// Three-way policy: an invalid cell destroys the carrot; an occupied
    /// cell merges the food into the resident carrot and destroys the
    /// incoming one (returning the resident's handle); an empty cell
    /// re-inserts the mapping entry. Planting is exempt from the capacity
    /// bound: the carrot already exists.
    pub fn plant(
        &mut self,
        id: CarrotId,
        cell: Cell,
        grid: &dyn TerrainGrid,
        rng: &mut dyn RngCore,
    ) -> Option<CarrotId> {
        if !self.carrots.get(id).is_some_and(|carrot| carrot.carried) {
            return None;
        }

        if !grid.is_valid(cell) {
            self.remove(id, RemovalCause::Discarded);
            return None;
        }

        if let Some(&resident) = self.by_cell.get(&cell) {
            let incoming = self
                .carrots
                .remove(id)
                .expect("carried carrot checked above");
            let into = self
                .carrots
                .get_mut(resident)
                .expect("planted mapping referenced a live carrot");
            into.food += incoming.food;
            self.events.push(CarrotEvent::Merged {
                into: resident,
                from: id,
                cell,
                food: incoming.food,
            });
            return Some(resident);
        }

        let position = grid.random_position_in(cell, rng);
        let carrot = self
            .carrots
            .get_mut(id)
            .expect("carried carrot checked above");
        carrot.cell = cell;
        carrot.position = position;
        carrot.carried = false;
        self.by_cell.insert(cell, id);
        self.events.push(CarrotEvent::Planted { id, cell });
        Some(id)
    }

    /// Destroy and unregister every carrot, carried ones included.
    pub fn clear(&mut self) {
        let all: Vec<CarrotId> = self.carrots.keys().collect();
        for id in all {
            self.remove(id, RemovalCause::Cleared);
        }
        debug_assert!(self.by_cell.is_empty());
    }

    /// Seed the island centre: up to `count` spawn attempts on distinct
    /// cells drawn without replacement from within `radius`.
    pub fn seed(
        &mut self,
        count: u32,
        radius: i32,
        grid: &dyn TerrainGrid,
        config: &WarrenConfig,
        capacity: usize,
        rng: &mut dyn RngCore,
    ) {
        let mut cells = grid.cells_within_radius(radius);
        for _ in 0..count {
            if cells.is_empty() {
                break;
            }
            let cell = cells.swap_remove(rng.random_range(0..cells.len()));
            self.spawn(cell, grid, config, capacity, rng);
        }
    }

    /// Advance planted carrots by one tick: food regrowth toward the cap,
    /// spread attempts, then rot removal.
    pub fn step(
        &mut self,
        grid: &dyn TerrainGrid,
        config: &WarrenConfig,
        capacity: usize,
        rng: &mut dyn RngCore,
    ) {
        let mut spreads: Vec<Cell> = Vec::new();
        let mut rotted: Vec<CarrotId> = Vec::new();

        for (id, carrot) in &mut self.carrots {
            if carrot.carried {
                continue;
            }
            carrot.age = carrot.age.saturating_add(1);
            if config.carrot_growth_rate > 0.0 {
                carrot.food += config.carrot_growth_rate * (config.carrot_food_max - carrot.food);
            }

            if carrot.spread_in == 0 {
                spreads.push(carrot.cell);
                carrot.spread_in =
                    jittered(config.carrot_spread_interval, config.carrot_spread_jitter, rng);
            } else {
                carrot.spread_in -= 1;
            }

            if carrot.rot_in == 0 {
                rotted.push(id);
            } else {
                carrot.rot_in -= 1;
            }
        }

        for source in spreads {
            self.spread_from(source, grid, config, capacity, rng);
        }
        // Rotten carrots leave the grid immediately: their cells are free
        // for new carrots within the same tick.
        for id in rotted {
            self.remove(id, RemovalCause::Rotted);
        }
    }
}

fn jittered(base: u32, jitter: u32, rng: &mut dyn RngCore) -> u32 {
    if jitter == 0 {
        return base;
    }
    let low = base.saturating_sub(jitter);
    let high = base.saturating_add(jitter);
    rng.random_range(low..=high)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::IslandGrid;
    use rand::{SeedableRng, rngs::SmallRng};

    fn fixture() -> (CarrotPatch, IslandGrid, WarrenConfig, SmallRng) {
        let config = WarrenConfig {
            carrot_rot_jitter: 0,
            carrot_spread_jitter: 0,
            ..WarrenConfig::default()
        };
        (
            CarrotPatch::new(),
            IslandGrid::new(6, 2.0).expect("grid"),
            config,
            SmallRng::seed_from_u64(0xCA_0C),
        )
    }

    #[test]
    fn spawn_rejects_invalid_occupied_and_full() {
        let (mut patch, grid, config, mut rng) = fixture();

        assert!(patch.spawn(Cell::new(50, 0), &grid, &config, 8, &mut rng).is_none());

        let cell = Cell::new(1, 1);
        let id = patch.spawn(cell, &grid, &config, 8, &mut rng).expect("spawn");
        assert_eq!(patch.carrot_at(cell), Some(id));
        assert!(patch.spawn(cell, &grid, &config, 8, &mut rng).is_none());

        // Capacity of one: a second cell is rejected.
        assert!(patch.spawn(Cell::new(2, 2), &grid, &config, 1, &mut rng).is_none());
        assert_eq!(patch.planted_count(), 1);
    }

    #[test]
    fn capacity_bound_holds_under_many_attempts() {
        let (mut patch, grid, config, mut rng) = fixture();
        let capacity = 5;
        for cell in grid.cells_within_radius(6) {
            patch.spawn(cell, &grid, &config, capacity, &mut rng);
        }
        assert_eq!(patch.planted_count(), capacity);
    }

    #[test]
    fn no_two_carrots_share_a_cell() {
        let (mut patch, grid, config, mut rng) = fixture();
        for cell in grid.cells_within_radius(3) {
            patch.spawn(cell, &grid, &config, 64, &mut rng);
        }
        for _ in 0..32 {
            let planted: Vec<Cell> = patch.iter().map(|(_, c)| c.cell).collect();
            for cell in planted {
                patch.spread_from(cell, &grid, &config, 64, &mut rng);
            }
        }
        let mut seen = std::collections::HashSet::new();
        for (_, carrot) in patch.iter() {
            assert!(seen.insert(carrot.cell), "duplicate cell {:?}", carrot.cell);
        }
    }

    #[test]
    fn spread_lands_on_an_adjacent_free_cell() {
        let (mut patch, grid, config, mut rng) = fixture();
        let source = Cell::new(0, 0);
        patch.spawn(source, &grid, &config, 16, &mut rng).expect("source");
        let sprouted = patch
            .spread_from(source, &grid, &config, 16, &mut rng)
            .expect("spread");
        let cell = patch.get(sprouted).expect("carrot").cell;
        assert!(source.neighbors4().contains(&cell));
    }

    #[test]
    fn spread_from_a_surrounded_cell_is_a_no_op() {
        let (mut patch, grid, config, mut rng) = fixture();
        let source = Cell::new(0, 0);
        patch.spawn(source, &grid, &config, 16, &mut rng).expect("source");
        for neighbor in source.neighbors4() {
            patch.spawn(neighbor, &grid, &config, 16, &mut rng).expect("ring");
        }
        assert!(patch.spread_from(source, &grid, &config, 16, &mut rng).is_none());
        assert_eq!(patch.planted_count(), 5);
    }

    #[test]
    fn merge_on_plant_conserves_food_and_destroys_one() {
        let (mut patch, grid, config, mut rng) = fixture();
        let resident_cell = Cell::new(0, 1);
        let resident = patch
            .spawn(resident_cell, &grid, &config, 8, &mut rng)
            .expect("resident");
        let carried_cell = Cell::new(2, 0);
        let carried = patch
            .spawn(carried_cell, &grid, &config, 8, &mut rng)
            .expect("carried");
        patch.get_mut(resident).unwrap().food = 0.75;
        patch.get_mut(carried).unwrap().food = 0.5;
        let before = patch.total_food();

        assert_eq!(patch.uproot(carried_cell), Some(carried));
        let target = patch.plant(carried, resident_cell, &grid, &mut rng);

        assert_eq!(target, Some(resident));
        assert!(patch.get(carried).is_none(), "incoming carrot destroyed");
        assert_eq!(patch.carrot_count(), 1);
        let merged = patch.get(resident).expect("resident survives");
        assert!((merged.food - 1.25).abs() < f32::EPSILON);
        assert!((patch.total_food() - before).abs() < f32::EPSILON);
    }

    #[test]
    fn plant_on_invalid_cell_destroys_the_carrot() {
        let (mut patch, grid, config, mut rng) = fixture();
        let cell = Cell::new(1, 0);
        let id = patch.spawn(cell, &grid, &config, 8, &mut rng).expect("spawn");
        patch.uproot(cell);

        assert!(patch.plant(id, Cell::new(40, 40), &grid, &mut rng).is_none());
        assert!(patch.get(id).is_none());
        assert!(patch.is_empty());
        assert!(matches!(
            patch.take_events().last(),
            Some(CarrotEvent::Removed {
                cause: RemovalCause::Discarded,
                ..
            })
        ));
    }

    #[test]
    fn uproot_then_replant_restores_the_mapping() {
        let (mut patch, grid, config, mut rng) = fixture();
        let cell = Cell::new(-2, 3);
        let id = patch.spawn(cell, &grid, &config, 8, &mut rng).expect("spawn");

        assert_eq!(patch.uproot(cell), Some(id));
        assert_eq!(patch.carrot_at(cell), None);
        assert!(patch.get(id).expect("still alive").carried);

        assert_eq!(patch.plant(id, cell, &grid, &mut rng), Some(id));
        assert_eq!(patch.carrot_at(cell), Some(id));
        assert!(!patch.get(id).expect("planted").carried);
    }

    #[test]
    fn planting_a_still_planted_carrot_is_rejected() {
        let (mut patch, grid, config, mut rng) = fixture();
        let cell = Cell::new(0, 0);
        let id = patch.spawn(cell, &grid, &config, 8, &mut rng).expect("spawn");
        assert!(patch.plant(id, Cell::new(1, 0), &grid, &mut rng).is_none());
        assert_eq!(patch.carrot_at(cell), Some(id));
    }

    #[test]
    fn clear_empties_the_patch() {
        let (mut patch, grid, config, mut rng) = fixture();
        patch.seed(6, 3, &grid, &config, 16, &mut rng);
        let held_cell = patch.iter().next().map(|(_, c)| c.cell).expect("seeded");
        patch.uproot(held_cell);

        patch.clear();
        assert!(patch.is_empty());
        assert_eq!(patch.planted_count(), 0);
        assert_eq!(patch.carrot_at(held_cell), None);
    }

    #[test]
    fn seed_places_attempts_without_replacement() {
        let (mut patch, grid, config, mut rng) = fixture();
        patch.seed(5, 1, &grid, &config, 64, &mut rng);
        // Radius one holds exactly five cells, so all five fill up.
        assert_eq!(patch.planted_count(), 5);
        for (_, carrot) in patch.iter() {
            assert!(carrot.cell.distance_sq(Cell::default()) <= 1);
        }

        // Zero capacity: attempts happen, nothing lands.
        let mut empty = CarrotPatch::new();
        empty.seed(5, 1, &grid, &config, 0, &mut rng);
        assert_eq!(empty.planted_count(), 0);
    }

    #[test]
    fn rot_removes_on_expiry_and_frees_the_cell() {
        let (mut patch, grid, mut config, mut rng) = fixture();
        config.carrot_rot_ticks = 2;
        config.carrot_spread_interval = 1_000;
        let cell = Cell::new(0, 0);
        let id = patch.spawn(cell, &grid, &config, 8, &mut rng).expect("spawn");

        patch.step(&grid, &config, 8, &mut rng);
        patch.step(&grid, &config, 8, &mut rng);
        assert!(patch.get(id).is_some());
        patch.step(&grid, &config, 8, &mut rng);
        assert!(patch.get(id).is_none());
        assert_eq!(patch.carrot_at(cell), None);

        // The freed cell accepts a new carrot immediately.
        assert!(patch.spawn(cell, &grid, &config, 8, &mut rng).is_some());
    }

    #[test]
    fn carried_carrots_neither_rot_nor_spread() {
        let (mut patch, grid, mut config, mut rng) = fixture();
        config.carrot_rot_ticks = 1;
        config.carrot_spread_interval = 1;
        let cell = Cell::new(0, 0);
        let id = patch.spawn(cell, &grid, &config, 8, &mut rng).expect("spawn");
        patch.uproot(cell);

        for _ in 0..8 {
            patch.step(&grid, &config, 8, &mut rng);
        }
        assert!(patch.get(id).is_some());
        assert_eq!(patch.carrot_count(), 1);
    }

    #[test]
    fn growth_approaches_the_food_cap() {
        let (mut patch, grid, mut config, mut rng) = fixture();
        config.carrot_initial_food = 0.1;
        config.carrot_food_max = 1.0;
        config.carrot_growth_rate = 0.5;
        config.carrot_rot_ticks = 1_000;
        config.carrot_spread_interval = 1_000;
        let id = patch
            .spawn(Cell::new(0, 0), &grid, &config, 8, &mut rng)
            .expect("spawn");

        let mut previous = patch.get(id).unwrap().food;
        for _ in 0..16 {
            patch.step(&grid, &config, 8, &mut rng);
            let food = patch.get(id).unwrap().food;
            assert!(food > previous);
            assert!(food <= config.carrot_food_max + f32::EPSILON);
            previous = food;
        }
    }
}
