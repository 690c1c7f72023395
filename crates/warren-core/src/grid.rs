//! Terrain grid service: discrete island cells and world-space conversions.

use rand::{Rng, RngCore};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::{Position, WorldStateError};

/// Discrete grid coordinate on the island.
#[derive(
    Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord,
)]
pub struct Cell {
    pub x: i32,
    pub y: i32,
}

impl Cell {
    /// Construct a new cell coordinate.
    #[must_use]
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Returns the cell displaced by `(dx, dy)`.
    #[must_use]
    pub const fn offset(self, dx: i32, dy: i32) -> Self {
        Self {
            x: self.x + dx,
            y: self.y + dy,
        }
    }

    /// The four edge-adjacent cells, in up/down/left/right order.
    #[must_use]
    pub const fn neighbors4(self) -> [Self; 4] {
        [
            self.offset(0, 1),
            self.offset(0, -1),
            self.offset(-1, 0),
            self.offset(1, 0),
        ]
    }

    /// Squared Euclidean distance to another cell, in cell units.
    #[must_use]
    pub const fn distance_sq(self, other: Self) -> i64 {
        let dx = (self.x - other.x) as i64;
        let dy = (self.y - other.y) as i64;
        dx * dx + dy * dy
    }
}

/// Terrain queries consumed by the carrot manager and the world.
///
/// Implementations decide which cells exist and how cells map to world
/// space; everything else treats the terrain as an injected service.
pub trait TerrainGrid: Send + Sync {
    /// Whether `cell` lies on walkable terrain.
    fn is_valid(&self, cell: Cell) -> bool;

    /// The cell containing a world position.
    fn cell_of(&self, position: Position) -> Cell;

    /// World-space centre of a cell.
    fn center_of(&self, cell: Cell) -> Position;

    /// A uniformly random world position inside `cell`.
    fn random_position_in(&self, cell: Cell, rng: &mut dyn RngCore) -> Position;

    /// All valid cells within `radius` cells of the island centre.
    fn cells_within_radius(&self, radius: i32) -> Vec<Cell>;
}

/// Disk-shaped island centred on the origin.
///
/// A cell is valid when its centre lies within `radius` cells of the
/// origin; cell `(0, 0)` sits exactly on the world origin.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IslandGrid {
    radius: i32,
    cell_size: f32,
}

impl IslandGrid {
    /// Build an island grid, validating its dimensions.
    pub fn new(radius: i32, cell_size: f32) -> Result<Self, WorldStateError> {
        if radius <= 0 {
            return Err(WorldStateError::InvalidConfig(
                "island radius must be positive",
            ));
        }
        if cell_size <= 0.0 || !cell_size.is_finite() {
            return Err(WorldStateError::InvalidConfig(
                "cell size must be positive and finite",
            ));
        }
        Ok(Self { radius, cell_size })
    }

    /// Island radius in cells.
    #[must_use]
    pub const fn radius(&self) -> i32 {
        self.radius
    }

    /// Edge length of one cell in world units.
    #[must_use]
    pub const fn cell_size(&self) -> f32 {
        self.cell_size
    }

    fn within(&self, cell: Cell, radius: i32) -> bool {
        cell.distance_sq(Cell::default()) <= (radius as i64) * (radius as i64)
    }
}

impl TerrainGrid for IslandGrid {
    fn is_valid(&self, cell: Cell) -> bool {
        self.within(cell, self.radius)
    }

    fn cell_of(&self, position: Position) -> Cell {
        Cell::new(
            (position.x / self.cell_size).round() as i32,
            (position.y / self.cell_size).round() as i32,
        )
    }

    fn center_of(&self, cell: Cell) -> Position {
        Position::new(cell.x as f32 * self.cell_size, cell.y as f32 * self.cell_size)
    }

    fn random_position_in(&self, cell: Cell, rng: &mut dyn RngCore) -> Position {
        let half = self.cell_size * 0.5;
        let center = self.center_of(cell);
        Position::new(
            center.x + rng.random_range(-half..half),
            center.y + rng.random_range(-half..half),
        )
    }

    fn cells_within_radius(&self, radius: i32) -> Vec<Cell> {
        let clamped = radius.clamp(0, self.radius);
        let mut cells = Vec::new();
        for y in -clamped..=clamped {
            for x in -clamped..=clamped {
                let cell = Cell::new(x, y);
                if self.within(cell, clamped) {
                    cells.push(cell);
                }
            }
        }
        cells
    }
}

/// The edge-adjacent cells of `cell` that are valid and pass `is_free`.
pub fn free_neighbors(
    grid: &dyn TerrainGrid,
    cell: Cell,
    mut is_free: impl FnMut(Cell) -> bool,
) -> SmallVec<[Cell; 4]> {
    let mut out = SmallVec::new();
    for neighbor in cell.neighbors4() {
        if grid.is_valid(neighbor) && is_free(neighbor) {
            out.push(neighbor);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{SeedableRng, rngs::SmallRng};

    #[test]
    fn rejects_degenerate_dimensions() {
        assert!(IslandGrid::new(0, 4.0).is_err());
        assert!(IslandGrid::new(-2, 4.0).is_err());
        assert!(IslandGrid::new(5, 0.0).is_err());
        assert!(IslandGrid::new(5, f32::NAN).is_err());
    }

    #[test]
    fn validity_is_a_disk() {
        let grid = IslandGrid::new(3, 2.0).expect("grid");
        assert!(grid.is_valid(Cell::new(0, 0)));
        assert!(grid.is_valid(Cell::new(3, 0)));
        assert!(grid.is_valid(Cell::new(2, 2)));
        assert!(!grid.is_valid(Cell::new(3, 1)));
        assert!(!grid.is_valid(Cell::new(4, 0)));
    }

    #[test]
    fn conversions_round_trip_cell_centers() {
        let grid = IslandGrid::new(8, 3.0).expect("grid");
        for cell in [Cell::new(0, 0), Cell::new(-4, 2), Cell::new(7, -1)] {
            assert_eq!(grid.cell_of(grid.center_of(cell)), cell);
        }
    }

    #[test]
    fn random_positions_stay_inside_their_cell() {
        let grid = IslandGrid::new(8, 5.0).expect("grid");
        let mut rng = SmallRng::seed_from_u64(7);
        let cell = Cell::new(-3, 6);
        for _ in 0..64 {
            let position = grid.random_position_in(cell, &mut rng);
            assert_eq!(grid.cell_of(position), cell);
        }
    }

    #[test]
    fn radius_query_is_clamped_and_symmetric() {
        let grid = IslandGrid::new(2, 1.0).expect("grid");
        let all = grid.cells_within_radius(10);
        assert_eq!(all.len(), 13);
        assert!(all.iter().all(|&c| grid.is_valid(c)));
        assert!(all.contains(&Cell::new(0, -2)));

        let inner = grid.cells_within_radius(1);
        assert_eq!(inner.len(), 5);
    }

    #[test]
    fn free_neighbors_filters_validity_and_occupancy() {
        let grid = IslandGrid::new(2, 1.0).expect("grid");
        // (2, 0) sits on the rim: only (1, 0) stays on the island.
        let open = free_neighbors(&grid, Cell::new(2, 0), |_| true);
        assert_eq!(open.as_slice(), &[Cell::new(1, 0)]);

        let blocked = free_neighbors(&grid, Cell::new(0, 0), |c| c != Cell::new(0, 1));
        assert_eq!(blocked.len(), 3);
        assert!(!blocked.contains(&Cell::new(0, 1)));
    }
}
