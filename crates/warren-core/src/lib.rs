//! Core types for the warren workspace: the island terrain, the carrot
//! population grid, the rabbit arena, and the tick pipeline tying them
//! together.
//!
//! The world is frame-stepped: one [`WorldState::step`] per tick, every
//! mutation synchronous inside it. Runtime failures (occupied cell, dead
//! target, unreachable spot) are silent no-ops; the next tick retries.

use std::borrow::Cow;
use std::collections::{HashSet, VecDeque};
use std::fmt;

use rand::{Rng, RngCore, SeedableRng, rngs::SmallRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use slotmap::SlotMap;
use smallvec::SmallVec;
use thiserror::Error;

pub mod carrot;
pub mod grid;
pub mod rabbit;

pub use carrot::{Carrot, CarrotEvent, CarrotId, CarrotPatch, RemovalCause};
pub use grid::{Cell, IslandGrid, TerrainGrid};
pub use rabbit::{Mobility, Rabbit, RabbitId, RabbitMap};

/// High level simulation clock (ticks processed since boot).
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Tick(pub u64);

impl Tick {
    /// Returns the next sequential tick.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }

    /// Resets the tick counter back to zero.
    #[must_use]
    pub const fn zero() -> Self {
        Self(0)
    }
}

/// Continuous 2D world coordinate.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct Position {
    pub x: f32,
    pub y: f32,
}

impl Position {
    /// Construct a new position.
    #[must_use]
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Squared Euclidean distance to `other`.
    #[must_use]
    pub fn distance_sq(self, other: Self) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        dx * dx + dy * dy
    }

    /// Point halfway between `self` and `other`.
    #[must_use]
    pub fn midpoint(self, other: Self) -> Self {
        Self::new((self.x + other.x) * 0.5, (self.y + other.y) * 0.5)
    }
}

/// Errors that can occur when constructing world state.
#[derive(Debug, Error)]
pub enum WorldStateError {
    /// Indicates an invalid configuration value.
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),
}

/// Static configuration for a warren world. Every field has a default, so
/// partial configuration files deserialize cleanly.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WarrenConfig {
    /// Island radius in cells.
    pub island_radius: i32,
    /// Edge length of one grid cell in world units.
    pub cell_size: f32,
    /// Optional RNG seed for reproducible worlds.
    pub rng_seed: Option<u64>,
    /// Planted carrots allowed per living rabbit.
    pub max_carrots_per_rabbit: u32,
    /// Carrots seeded at startup.
    pub initial_carrot_count: u32,
    /// Radius (cells) of the startup seeding area around the centre.
    pub initial_carrot_radius: i32,
    /// Food stored in a freshly sprouted carrot.
    pub carrot_initial_food: f32,
    /// Food a planted carrot grows toward.
    pub carrot_food_max: f32,
    /// Logistic regrowth rate applied to planted carrots every tick.
    pub carrot_growth_rate: f32,
    /// Mean ticks before a planted carrot rots away.
    pub carrot_rot_ticks: u32,
    /// Uniform jitter applied to the rot countdown.
    pub carrot_rot_jitter: u32,
    /// Mean ticks between spread attempts of a planted carrot.
    pub carrot_spread_interval: u32,
    /// Uniform jitter applied to the spread countdown.
    pub carrot_spread_jitter: u32,
    /// Food removed from a carrot by one bite.
    pub bite_size: f32,
    /// Reach within which a rabbit can nibble a carrot.
    pub eat_radius: f32,
    /// Hunger relieved per unit of food eaten.
    pub satiety_per_food: f32,
    /// Hunger gained by every rabbit each tick.
    pub hunger_rate: f32,
    /// Hunger level at which foraging preempts everything else.
    pub hungry_threshold: f32,
    /// Hunger level at which a rabbit starves.
    pub starve_threshold: f32,
    /// Rabbit walking speed in world units per tick.
    pub rabbit_speed: f32,
    /// Distance at which a movement target counts as reached.
    pub arrive_radius: f32,
    /// Wander hop range in cells.
    pub wander_radius: i32,
    /// Sight radius for spotting rabbits and carrots, in world units.
    pub sight_radius: f32,
    /// Distance at which a claimed pair actually mates.
    pub mating_radius: f32,
    /// Ticks between matings for one rabbit.
    pub mate_cooldown: u32,
    /// Age at which a rabbit becomes ready to mate.
    pub maturity_age: u32,
    /// Age at which a rabbit dies of old age.
    pub lifespan: u32,
    /// Hunger a newborn kit starts with.
    pub kit_hunger: f32,
    /// Maximum number of recent tick summaries retained in-memory.
    pub history_capacity: usize,
    /// Interval (ticks) between persistence flushes. 0 disables persistence.
    pub persistence_interval: u32,
}

impl Default for WarrenConfig {
    fn default() -> Self {
        Self {
            island_radius: 12,
            cell_size: 2.0,
            rng_seed: None,
            max_carrots_per_rabbit: 4,
            initial_carrot_count: 3,
            initial_carrot_radius: 3,
            carrot_initial_food: 0.25,
            carrot_food_max: 1.0,
            carrot_growth_rate: 0.02,
            carrot_rot_ticks: 600,
            carrot_rot_jitter: 120,
            carrot_spread_interval: 180,
            carrot_spread_jitter: 45,
            bite_size: 0.25,
            eat_radius: 1.5,
            satiety_per_food: 1.0,
            hunger_rate: 0.002,
            hungry_threshold: 0.5,
            starve_threshold: 1.0,
            rabbit_speed: 0.8,
            arrive_radius: 0.5,
            wander_radius: 5,
            sight_radius: 8.0,
            mating_radius: 1.0,
            mate_cooldown: 400,
            maturity_age: 300,
            lifespan: 6_000,
            kit_hunger: 0.3,
            history_capacity: 256,
            persistence_interval: 0,
        }
    }
}

impl WarrenConfig {
    /// Validates the configuration, returning the island terrain.
    fn build_grid(&self) -> Result<IslandGrid, WorldStateError> {
        let grid = IslandGrid::new(self.island_radius, self.cell_size)?;
        if self.carrot_initial_food < 0.0 {
            return Err(WorldStateError::InvalidConfig(
                "carrot_initial_food must be non-negative",
            ));
        }
        if self.carrot_food_max <= 0.0 {
            return Err(WorldStateError::InvalidConfig(
                "carrot_food_max must be positive",
            ));
        }
        if self.carrot_initial_food > self.carrot_food_max {
            return Err(WorldStateError::InvalidConfig(
                "carrot_initial_food cannot exceed carrot_food_max",
            ));
        }
        if !(0.0..=1.0).contains(&self.carrot_growth_rate) {
            return Err(WorldStateError::InvalidConfig(
                "carrot_growth_rate must be within [0, 1]",
            ));
        }
        if self.bite_size <= 0.0 || self.eat_radius <= 0.0 || self.satiety_per_food <= 0.0 {
            return Err(WorldStateError::InvalidConfig(
                "bite_size, eat_radius, and satiety_per_food must be positive",
            ));
        }
        if self.hunger_rate < 0.0 {
            return Err(WorldStateError::InvalidConfig(
                "hunger_rate must be non-negative",
            ));
        }
        if self.hungry_threshold <= 0.0 || self.starve_threshold <= self.hungry_threshold {
            return Err(WorldStateError::InvalidConfig(
                "hunger thresholds must be positive with starve above hungry",
            ));
        }
        if self.rabbit_speed <= 0.0 || self.arrive_radius <= 0.0 {
            return Err(WorldStateError::InvalidConfig(
                "rabbit_speed and arrive_radius must be positive",
            ));
        }
        if self.wander_radius < 1 {
            return Err(WorldStateError::InvalidConfig(
                "wander_radius must be at least one cell",
            ));
        }
        if self.sight_radius <= 0.0 || self.mating_radius <= 0.0 {
            return Err(WorldStateError::InvalidConfig(
                "sight_radius and mating_radius must be positive",
            ));
        }
        if self.lifespan <= self.maturity_age {
            return Err(WorldStateError::InvalidConfig(
                "lifespan must exceed maturity_age",
            ));
        }
        if self.history_capacity == 0 {
            return Err(WorldStateError::InvalidConfig(
                "history_capacity must be non-zero",
            ));
        }
        Ok(grid)
    }

    /// Returns the configured RNG seed, generating one from entropy if absent.
    fn seeded_rng(&self) -> SmallRng {
        match self.rng_seed {
            Some(seed) => SmallRng::seed_from_u64(seed),
            None => {
                let seed: u64 = rand::random();
                SmallRng::seed_from_u64(seed)
            }
        }
    }

    /// Planted carrots allowed for a given rabbit population.
    #[must_use]
    pub fn carrot_capacity(&self, rabbit_count: usize) -> usize {
        rabbit_count * self.max_carrots_per_rabbit as usize
    }
}

/// High-level behaviours a rabbit can pursue.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Action {
    #[default]
    Idle,
    SearchFood,
    SearchMate,
    WaitMate,
    JoinMate,
}

/// A rabbit seen inside the sight radius, with the candidate checks a
/// brain needs already evaluated.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MateCandidate {
    pub id: RabbitId,
    pub position: Position,
    pub distance_sq: f32,
    pub grabbed: bool,
    pub ready_to_mate: bool,
    pub free_to_mate: bool,
    pub reachable: bool,
}

/// A planted carrot seen inside the sight radius.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CarrotSighting {
    pub id: CarrotId,
    pub position: Position,
    pub distance_sq: f32,
    pub food: f32,
    pub reachable: bool,
}

/// Live whereabouts of an assigned partner.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MateStatus {
    pub id: RabbitId,
    pub position: Position,
    pub distance_sq: f32,
}

/// Per-tick sensory snapshot handed to a rabbit brain.
#[derive(Debug, Clone, PartialEq)]
pub struct Percepts {
    pub position: Position,
    pub cell: Cell,
    pub hungry: bool,
    pub ready_to_mate: bool,
    /// The current movement target has been reached (or none is set).
    pub position_reached: bool,
    /// A new movement target was assigned since the last decision.
    pub movement_target_changed: bool,
    /// Partner assigned to this rabbit, by itself or by another rabbit.
    pub target_mate: Option<MateStatus>,
    pub visible_rabbits: Vec<MateCandidate>,
    pub visible_carrots: Vec<CarrotSighting>,
}

/// Requests a brain can issue back to the world. Invalid requests are
/// skipped silently when applied.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BrainCommand {
    /// Walk toward a world position.
    MoveTo(Position),
    /// Walk toward a random valid cell within the wander radius.
    Wander,
    /// Drop the current movement target.
    Halt,
    /// Claim a partner bidirectionally.
    ClaimMate(RabbitId),
    /// Release the current pairing on both sides.
    ReleaseMate,
    /// Take a bite from a planted carrot within reach.
    Eat(CarrotId),
}

/// One decision step: the action to hold next tick plus side requests.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Decision {
    pub action: Action,
    pub commands: SmallVec<[BrainCommand; 4]>,
}

impl Decision {
    /// Keep doing `action` with no side requests.
    #[must_use]
    pub fn hold(action: Action) -> Self {
        Self {
            action,
            commands: SmallVec::new(),
        }
    }

    /// Builder-style helper appending a command.
    #[must_use]
    pub fn with(mut self, command: BrainCommand) -> Self {
        self.commands.push(command);
        self
    }
}

/// Thin trait object used to drive rabbit decisions without coupling to
/// concrete brain crates.
pub trait RabbitBrain: Send {
    /// Static identifier of the brain implementation.
    fn kind(&self) -> &'static str;

    /// The action the brain is currently holding.
    fn action(&self) -> Action;

    /// Evaluate one decision for the provided percepts.
    fn decide(&mut self, percepts: &Percepts, rng: &mut dyn RngCore) -> Decision;
}

type BrainSpawner = Box<dyn Fn(&mut dyn RngCore) -> Box<dyn RabbitBrain> + Send + Sync + 'static>;

struct BrainEntry {
    kind: Cow<'static, str>,
    spawner: BrainSpawner,
}

/// Registry owning brain factories keyed by opaque handles.
#[derive(Default)]
pub struct BrainRegistry {
    next_key: u64,
    entries: std::collections::HashMap<u64, BrainEntry>,
}

impl fmt::Debug for BrainRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BrainRegistry")
            .field("next_key", &self.next_key)
            .field("entry_count", &self.entries.len())
            .finish()
    }
}

impl BrainRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new brain factory, returning its registry key.
    pub fn register<F>(&mut self, kind: impl Into<Cow<'static, str>>, factory: F) -> u64
    where
        F: Fn(&mut dyn RngCore) -> Box<dyn RabbitBrain> + Send + Sync + 'static,
    {
        let key = self.next_key;
        self.next_key += 1;
        self.entries.insert(
            key,
            BrainEntry {
                kind: kind.into(),
                spawner: Box::new(factory),
            },
        );
        key
    }

    /// Removes a brain factory from the registry.
    pub fn unregister(&mut self, key: u64) -> bool {
        self.entries.remove(&key).is_some()
    }

    /// Instantiate a new brain using the factory referenced by `key`.
    pub fn spawn(&self, rng: &mut dyn RngCore, key: u64) -> Option<Box<dyn RabbitBrain>> {
        self.entries.get(&key).map(|entry| (entry.spawner)(rng))
    }

    /// Retrieve the descriptive identifier associated with a registry entry.
    #[must_use]
    pub fn kind(&self, key: u64) -> Option<&str> {
        self.entries.get(&key).map(|entry| entry.kind.as_ref())
    }

    /// Returns whether a key is registered.
    #[must_use]
    pub fn contains(&self, key: u64) -> bool {
        self.entries.contains_key(&key)
    }
}

/// Runtime brain attachment tracking.
#[derive(Default)]
pub struct BrainBinding {
    runner: Option<Box<dyn RabbitBrain>>,
    registry_key: Option<u64>,
    kind: Option<String>,
}

impl fmt::Debug for BrainBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BrainBinding")
            .field("registry_key", &self.registry_key)
            .field("kind", &self.kind)
            .finish()
    }
}

impl BrainBinding {
    /// Construct an unbound brain attachment.
    #[must_use]
    pub fn unbound() -> Self {
        Self::default()
    }

    /// Attach a brain produced outside the registry.
    #[must_use]
    pub fn with_runner(runner: Box<dyn RabbitBrain>) -> Self {
        let kind = Some(runner.kind().to_string());
        Self {
            runner: Some(runner),
            registry_key: None,
            kind,
        }
    }

    /// Instantiate a brain from the registry and bind it.
    #[must_use]
    pub fn from_registry(
        registry: &BrainRegistry,
        rng: &mut dyn RngCore,
        key: u64,
    ) -> Option<Self> {
        let runner = registry.spawn(rng, key)?;
        let kind = registry.kind(key).map(str::to_string);
        Some(Self {
            runner: Some(runner),
            registry_key: Some(key),
            kind,
        })
    }

    /// Return the registry key, if any, associated with this binding.
    #[must_use]
    pub const fn registry_key(&self) -> Option<u64> {
        self.registry_key
    }

    /// Return the brain identifier when available.
    #[must_use]
    pub fn kind(&self) -> Option<&str> {
        self.kind.as_deref()
    }

    /// Whether a brain is currently attached.
    #[must_use]
    pub const fn is_bound(&self) -> bool {
        self.runner.is_some()
    }

    /// The action the bound brain currently holds, if any.
    #[must_use]
    pub fn action(&self) -> Option<Action> {
        self.runner.as_ref().map(|brain| brain.action())
    }

    /// Evaluate the brain if one is bound.
    #[must_use]
    pub fn decide(&mut self, percepts: &Percepts, rng: &mut dyn RngCore) -> Option<Decision> {
        self.runner.as_mut().map(|brain| brain.decide(percepts, rng))
    }
}

/// Events emitted after processing a world tick.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickEvents {
    pub tick: Tick,
    pub epoch_rolled: bool,
    pub births: usize,
    pub deaths: usize,
    /// Carrot lifecycle notifications drained this tick; the destroy
    /// effect hook for any front-end.
    pub carrot_events: Vec<CarrotEvent>,
}

impl TickEvents {
    /// Carrots that sprouted this tick.
    #[must_use]
    pub fn sprouted(&self) -> usize {
        self.carrot_events
            .iter()
            .filter(|event| matches!(event, CarrotEvent::Sprouted { .. }))
            .count()
    }

    /// Carrots that rotted away this tick.
    #[must_use]
    pub fn rotted(&self) -> usize {
        self.carrot_events
            .iter()
            .filter(|event| {
                matches!(
                    event,
                    CarrotEvent::Removed {
                        cause: RemovalCause::Rotted,
                        ..
                    }
                )
            })
            .count()
    }
}

/// Summary emitted to persistence hooks each flush.
#[derive(Debug, Clone, PartialEq)]
pub struct TickSummary {
    pub tick: Tick,
    pub rabbit_count: usize,
    pub carrot_count: usize,
    pub births: usize,
    pub deaths: usize,
    pub total_carrot_food: f32,
    pub average_hunger: f32,
}

/// Scalar metric sampled during persistence.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricSample {
    pub name: Cow<'static, str>,
    pub value: f64,
}

impl MetricSample {
    /// Creates a new metric sample.
    #[must_use]
    pub fn new(name: impl Into<Cow<'static, str>>, value: f64) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }

    /// Helper for `f32` values.
    #[must_use]
    pub fn from_f32(name: &'static str, value: f32) -> Self {
        Self::new(name, f64::from(value))
    }
}

/// Event type recorded for persistence.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PersistenceEventKind {
    Births,
    Deaths,
    Custom(Cow<'static, str>),
}

/// Structured persistence event entry.
#[derive(Debug, Clone, PartialEq)]
pub struct PersistenceEvent {
    pub kind: PersistenceEventKind,
    pub count: usize,
}

impl PersistenceEvent {
    /// Construct a new event entry.
    #[must_use]
    pub fn new(kind: PersistenceEventKind, count: usize) -> Self {
        Self { kind, count }
    }
}

/// Aggregate payload forwarded to persistence sinks.
#[derive(Debug, Clone)]
pub struct PersistenceBatch {
    pub summary: TickSummary,
    pub epoch: u64,
    pub metrics: Vec<MetricSample>,
    pub events: Vec<PersistenceEvent>,
}

/// Persistence sink invoked at each flush interval.
pub trait WorldPersistence: Send {
    fn on_tick(&mut self, payload: &PersistenceBatch);
}

/// No-op persistence sink.
#[derive(Debug, Default)]
pub struct NullPersistence;

impl WorldPersistence for NullPersistence {
    fn on_tick(&mut self, _payload: &PersistenceBatch) {}
}

/// Aggregate world state shared by the simulation and any front-end.
pub struct WorldState {
    config: WarrenConfig,
    tick: Tick,
    epoch: u64,
    rng: SmallRng,
    grid: IslandGrid,
    carrots: CarrotPatch,
    rabbits: SlotMap<RabbitId, Rabbit>,
    brains: RabbitMap<BrainBinding>,
    brain_registry: BrainRegistry,
    kit_brain: Option<u64>,
    pending_deaths: Vec<RabbitId>,
    persistence: Box<dyn WorldPersistence>,
    births_this_tick: usize,
    deaths_this_tick: usize,
    history: VecDeque<TickSummary>,
}

impl fmt::Debug for WorldState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorldState")
            .field("config", &self.config)
            .field("tick", &self.tick)
            .field("epoch", &self.epoch)
            .field("rabbit_count", &self.rabbits.len())
            .field("carrot_count", &self.carrots.carrot_count())
            .finish()
    }
}

impl WorldState {
    /// Instantiate a new world using the supplied configuration.
    pub fn new(config: WarrenConfig) -> Result<Self, WorldStateError> {
        Self::with_persistence(config, Box::new(NullPersistence))
    }

    /// Instantiate a new world using the supplied configuration and
    /// persistence sink.
    pub fn with_persistence(
        config: WarrenConfig,
        persistence: Box<dyn WorldPersistence>,
    ) -> Result<Self, WorldStateError> {
        let grid = config.build_grid()?;
        let rng = config.seeded_rng();
        let history_capacity = config.history_capacity;
        Ok(Self {
            config,
            tick: Tick::zero(),
            epoch: 0,
            rng,
            grid,
            carrots: CarrotPatch::new(),
            rabbits: SlotMap::with_key(),
            brains: RabbitMap::new(),
            brain_registry: BrainRegistry::new(),
            kit_brain: None,
            pending_deaths: Vec::new(),
            persistence,
            births_this_tick: 0,
            deaths_this_tick: 0,
            history: VecDeque::with_capacity(history_capacity),
        })
    }

    /// Returns an immutable reference to configuration.
    #[must_use]
    pub fn config(&self) -> &WarrenConfig {
        &self.config
    }

    /// Current simulation tick.
    #[must_use]
    pub const fn tick(&self) -> Tick {
        self.tick
    }

    /// Current epoch counter.
    #[must_use]
    pub const fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Borrow the island terrain.
    #[must_use]
    pub fn grid(&self) -> &IslandGrid {
        &self.grid
    }

    /// Borrow the world RNG mutably for deterministic sampling.
    #[must_use]
    pub fn rng(&mut self) -> &mut SmallRng {
        &mut self.rng
    }

    /// Read-only access to the carrot patch.
    #[must_use]
    pub fn carrots(&self) -> &CarrotPatch {
        &self.carrots
    }

    /// Mutable access to the carrot patch.
    #[must_use]
    pub fn carrots_mut(&mut self) -> &mut CarrotPatch {
        &mut self.carrots
    }

    /// Number of living rabbits.
    #[must_use]
    pub fn rabbit_count(&self) -> usize {
        self.rabbits.len()
    }

    /// Borrow a rabbit by handle.
    #[must_use]
    pub fn rabbit(&self, id: RabbitId) -> Option<&Rabbit> {
        self.rabbits.get(id)
    }

    /// Mutably borrow a rabbit by handle.
    #[must_use]
    pub fn rabbit_mut(&mut self, id: RabbitId) -> Option<&mut Rabbit> {
        self.rabbits.get_mut(id)
    }

    /// Iterate over living rabbits in slot order.
    pub fn rabbits(&self) -> impl Iterator<Item = (RabbitId, &Rabbit)> {
        self.rabbits.iter()
    }

    /// Immutable access to the brain registry.
    #[must_use]
    pub fn brain_registry(&self) -> &BrainRegistry {
        &self.brain_registry
    }

    /// Mutable access to the brain registry.
    #[must_use]
    pub fn brain_registry_mut(&mut self) -> &mut BrainRegistry {
        &mut self.brain_registry
    }

    /// Registry key used to equip newborn kits with a brain.
    pub fn set_kit_brain(&mut self, key: Option<u64>) {
        self.kit_brain = key;
    }

    /// Borrow the brain binding of a rabbit.
    #[must_use]
    pub fn rabbit_brain(&self, id: RabbitId) -> Option<&BrainBinding> {
        self.brains.get(id)
    }

    /// Iterate over retained tick summaries.
    pub fn history(&self) -> impl Iterator<Item = &TickSummary> {
        self.history.iter()
    }

    /// Spawn a new rabbit, returning its handle. The rabbit starts with
    /// an unbound brain and stands still until one is attached.
    pub fn spawn_rabbit(&mut self, rabbit: Rabbit) -> RabbitId {
        let id = self.rabbits.insert(rabbit);
        self.brains.insert(id, BrainBinding::unbound());
        id
    }

    /// Remove a rabbit by handle, returning its last known state.
    pub fn remove_rabbit(&mut self, id: RabbitId) -> Option<Rabbit> {
        self.release_pair(id);
        self.brains.remove(id);
        self.rabbits.remove(id)
    }

    /// Bind a brain from the registry to the specified rabbit. Returns
    /// `true` on success.
    pub fn bind_rabbit_brain(&mut self, id: RabbitId, key: u64) -> bool {
        if !self.rabbits.contains_key(id) {
            return false;
        }
        if let Some(binding) = BrainBinding::from_registry(&self.brain_registry, &mut self.rng, key)
        {
            self.brains.insert(id, binding);
            return true;
        }
        false
    }

    /// Spawn a carrot on `cell`, honouring the population-scaled capacity.
    pub fn spawn_carrot(&mut self, cell: Cell) -> Option<CarrotId> {
        let capacity = self.config.carrot_capacity(self.rabbits.len());
        self.carrots
            .spawn(cell, &self.grid, &self.config, capacity, &mut self.rng)
    }

    /// Seed the island centre with the configured number of carrots.
    pub fn seed_carrots(&mut self) {
        let capacity = self.config.carrot_capacity(self.rabbits.len());
        self.carrots.seed(
            self.config.initial_carrot_count,
            self.config.initial_carrot_radius,
            &self.grid,
            &self.config,
            capacity,
            &mut self.rng,
        );
    }

    /// Destroy every carrot.
    pub fn clear_carrots(&mut self) {
        self.carrots.clear();
    }

    /// Pick up a rabbit. Grabbed rabbits freeze, take no decisions, and
    /// lose any mate pairing.
    pub fn grab_rabbit(&mut self, id: RabbitId) -> bool {
        if !self.rabbits.contains_key(id) || self.rabbits[id].grabbed {
            return false;
        }
        self.release_pair(id);
        let rabbit = &mut self.rabbits[id];
        rabbit.grabbed = true;
        rabbit.mobility.halt();
        true
    }

    /// Put a grabbed rabbit back down at `position`.
    pub fn drop_rabbit(&mut self, id: RabbitId, position: Position) -> bool {
        match self.rabbits.get_mut(id) {
            Some(rabbit) if rabbit.grabbed => {
                rabbit.grabbed = false;
                rabbit.position = position;
                rabbit.mobility.halt();
                true
            }
            _ => false,
        }
    }

    /// Uproot the carrot planted at `cell`, handing back its handle.
    pub fn grab_carrot(&mut self, cell: Cell) -> Option<CarrotId> {
        self.carrots.uproot(cell)
    }

    /// Plant a carried carrot onto `cell` (three-way plant policy).
    pub fn drop_carrot(&mut self, id: CarrotId, cell: Cell) -> Option<CarrotId> {
        self.carrots.plant(id, cell, &self.grid, &mut self.rng)
    }

    /// Whether a world position can be walked to.
    #[must_use]
    pub fn is_reachable(&self, position: Position) -> bool {
        self.grid.is_valid(self.grid.cell_of(position))
    }

    fn release_pair(&mut self, id: RabbitId) {
        let Some(partner) = self.rabbits.get_mut(id).and_then(|r| r.target_mate.take()) else {
            return;
        };
        if let Some(other) = self.rabbits.get_mut(partner)
            && other.target_mate == Some(id)
        {
            other.target_mate = None;
        }
    }

    fn stage_aging(&mut self) {
        let rate = self.config.hunger_rate;
        for rabbit in self.rabbits.values_mut() {
            rabbit.age = rabbit.age.saturating_add(1);
            rabbit.hunger = (rabbit.hunger + rate).min(self.config.starve_threshold);
            rabbit.mate_cooldown = rabbit.mate_cooldown.saturating_sub(1);
        }
    }

    fn stage_carrots(&mut self) {
        let capacity = self.config.carrot_capacity(self.rabbits.len());
        self.carrots
            .step(&self.grid, &self.config, capacity, &mut self.rng);
    }

    fn stage_movement(&mut self) {
        let speed = self.config.rabbit_speed;
        let arrive = self.config.arrive_radius;
        for rabbit in self.rabbits.values_mut() {
            if rabbit.grabbed {
                continue;
            }
            let Rabbit {
                position, mobility, ..
            } = rabbit;
            mobility.advance(position, speed, arrive);
        }
    }

    fn stage_percepts(&mut self) -> Vec<(RabbitId, Percepts)> {
        #[derive(Clone, Copy)]
        struct Seed {
            id: RabbitId,
            position: Position,
            grabbed: bool,
            ready: bool,
            free: bool,
            target_mate: Option<RabbitId>,
            hungry: bool,
            reached: bool,
            target_changed: bool,
        }

        let arrive = self.config.arrive_radius;
        let config = &self.config;
        let mut seeds: Vec<Seed> = Vec::with_capacity(self.rabbits.len());
        for (id, rabbit) in &mut self.rabbits {
            let target_changed = rabbit.mobility.take_target_changed();
            seeds.push(Seed {
                id,
                position: rabbit.position,
                grabbed: rabbit.grabbed,
                ready: rabbit.ready_to_mate(config),
                free: rabbit.free_to_mate(),
                target_mate: rabbit.target_mate,
                hungry: rabbit.hungry(config),
                reached: rabbit.mobility.position_reached(rabbit.position, arrive),
                target_changed,
            });
        }

        let carrot_seeds: Vec<(CarrotId, Position, f32)> = self
            .carrots
            .iter()
            .filter(|(_, carrot)| !carrot.carried)
            .map(|(id, carrot)| (id, carrot.position, carrot.food))
            .collect();

        let sight_sq = self.config.sight_radius * self.config.sight_radius;
        let grid = &self.grid;

        seeds
            .par_iter()
            .filter(|seed| !seed.grabbed)
            .map(|seed| {
                let visible_rabbits: Vec<MateCandidate> = seeds
                    .iter()
                    .filter(|other| other.id != seed.id)
                    .filter_map(|other| {
                        let distance_sq = seed.position.distance_sq(other.position);
                        if distance_sq > sight_sq {
                            return None;
                        }
                        Some(MateCandidate {
                            id: other.id,
                            position: other.position,
                            distance_sq,
                            grabbed: other.grabbed,
                            ready_to_mate: other.ready,
                            free_to_mate: other.free,
                            reachable: grid.is_valid(grid.cell_of(other.position)),
                        })
                    })
                    .collect();

                let visible_carrots: Vec<CarrotSighting> = carrot_seeds
                    .iter()
                    .filter_map(|&(id, position, food)| {
                        let distance_sq = seed.position.distance_sq(position);
                        if distance_sq > sight_sq {
                            return None;
                        }
                        Some(CarrotSighting {
                            id,
                            position,
                            distance_sq,
                            food,
                            reachable: grid.is_valid(grid.cell_of(position)),
                        })
                    })
                    .collect();

                let target_mate = seed.target_mate.and_then(|partner| {
                    seeds
                        .iter()
                        .find(|other| other.id == partner)
                        .map(|other| MateStatus {
                            id: partner,
                            position: other.position,
                            distance_sq: seed.position.distance_sq(other.position),
                        })
                });

                let percepts = Percepts {
                    position: seed.position,
                    cell: grid.cell_of(seed.position),
                    hungry: seed.hungry,
                    ready_to_mate: seed.ready,
                    position_reached: seed.reached,
                    movement_target_changed: seed.target_changed,
                    target_mate,
                    visible_rabbits,
                    visible_carrots,
                };
                (seed.id, percepts)
            })
            .collect()
    }

    fn stage_decisions(&mut self, percepts: Vec<(RabbitId, Percepts)>) {
        for (id, percepts) in percepts {
            if !self.rabbits.contains_key(id) {
                continue;
            }
            let decision = match self.brains.get_mut(id) {
                Some(binding) => binding.decide(&percepts, &mut self.rng),
                None => None,
            };
            if let Some(decision) = decision {
                self.apply_decision(id, &decision);
            }
        }
    }

    fn apply_decision(&mut self, id: RabbitId, decision: &Decision) {
        for &command in &decision.commands {
            match command {
                BrainCommand::MoveTo(target) => {
                    if !self.is_reachable(target) {
                        continue;
                    }
                    if let Some(rabbit) = self.rabbits.get_mut(id) {
                        rabbit
                            .mobility
                            .set_destination(target, self.config.arrive_radius);
                    }
                }
                BrainCommand::Wander => self.apply_wander(id),
                BrainCommand::Halt => {
                    if let Some(rabbit) = self.rabbits.get_mut(id) {
                        rabbit.mobility.halt();
                    }
                }
                BrainCommand::ClaimMate(partner) => self.apply_claim(id, partner),
                BrainCommand::ReleaseMate => self.release_pair(id),
                BrainCommand::Eat(carrot) => self.apply_bite(id, carrot),
            }
        }
    }

    /// Hop target selection: a random valid cell within the wander radius
    /// of the rabbit's current cell.
    fn apply_wander(&mut self, id: RabbitId) {
        let Some(rabbit) = self.rabbits.get(id) else {
            return;
        };
        let origin = self.grid.cell_of(rabbit.position);
        let radius = self.config.wander_radius;
        let mut options: SmallVec<[Cell; 16]> = SmallVec::new();
        for dy in -radius..=radius {
            for dx in -radius..=radius {
                let cell = origin.offset(dx, dy);
                if (dx != 0 || dy != 0) && self.grid.is_valid(cell) {
                    options.push(cell);
                }
            }
        }
        if options.is_empty() {
            return;
        }
        let cell = options[self.rng.random_range(0..options.len())];
        let target = self.grid.random_position_in(cell, &mut self.rng);
        if let Some(rabbit) = self.rabbits.get_mut(id) {
            rabbit
                .mobility
                .set_destination(target, self.config.arrive_radius);
        }
    }

    /// Bidirectional claim. Rejected silently when either side is no
    /// longer claimable; a brain left pointing at nothing self-heals on
    /// its next decision.
    fn apply_claim(&mut self, id: RabbitId, partner: RabbitId) {
        if id == partner {
            return;
        }
        let claimable = |rabbit: &Rabbit| {
            !rabbit.grabbed && rabbit.free_to_mate() && rabbit.ready_to_mate(&self.config)
        };
        match (self.rabbits.get(id), self.rabbits.get(partner)) {
            (Some(a), Some(b)) if claimable(a) && claimable(b) => {}
            _ => return,
        }
        self.rabbits[id].target_mate = Some(partner);
        self.rabbits[partner].target_mate = Some(id);
    }

    fn apply_bite(&mut self, id: RabbitId, carrot_id: CarrotId) {
        let Some(rabbit) = self.rabbits.get(id) else {
            return;
        };
        let Some(carrot) = self.carrots.get(carrot_id) else {
            return;
        };
        if carrot.carried {
            return;
        }
        let reach_sq = self.config.eat_radius * self.config.eat_radius;
        if rabbit.position.distance_sq(carrot.position) > reach_sq {
            return;
        }

        let bite = self.config.bite_size.min(carrot.food);
        let satiety = bite * self.config.satiety_per_food;
        if let Some(carrot) = self.carrots.get_mut(carrot_id) {
            carrot.food -= bite;
        }
        if let Some(rabbit) = self.rabbits.get_mut(id) {
            rabbit.hunger = (rabbit.hunger - satiety).max(0.0);
        }
        let exhausted = self
            .carrots
            .get(carrot_id)
            .is_some_and(|carrot| carrot.food <= f32::EPSILON);
        if exhausted {
            self.carrots.remove(carrot_id, RemovalCause::Eaten);
        }
    }

    fn stage_mating(&mut self) {
        let radius_sq = self.config.mating_radius * self.config.mating_radius;
        let mut litters: Vec<(RabbitId, RabbitId, Position)> = Vec::new();

        for (id, rabbit) in &self.rabbits {
            let Some(partner) = rabbit.target_mate else {
                continue;
            };
            if partner < id {
                continue;
            }
            let Some(other) = self.rabbits.get(partner) else {
                continue;
            };
            if other.target_mate != Some(id) || rabbit.grabbed || other.grabbed {
                continue;
            }
            if rabbit.position.distance_sq(other.position) > radius_sq {
                continue;
            }
            litters.push((id, partner, rabbit.position.midpoint(other.position)));
        }

        for (a, b, birthplace) in litters {
            for parent in [a, b] {
                if let Some(rabbit) = self.rabbits.get_mut(parent) {
                    rabbit.target_mate = None;
                    rabbit.mate_cooldown = self.config.mate_cooldown;
                    rabbit.mobility.halt();
                }
            }
            let mut kit = Rabbit::at(birthplace);
            kit.hunger = self.config.kit_hunger;
            let kit_id = self.spawn_rabbit(kit);
            if let Some(key) = self.kit_brain {
                self.bind_rabbit_brain(kit_id, key);
            }
            self.births_this_tick += 1;
        }
    }

    fn stage_hazards(&mut self) {
        let starve = self.config.starve_threshold;
        let lifespan = self.config.lifespan;
        for (id, rabbit) in &self.rabbits {
            if rabbit.hunger >= starve || rabbit.age >= lifespan {
                self.pending_deaths.push(id);
            }
        }
    }

    fn stage_death_cleanup(&mut self) {
        if self.pending_deaths.is_empty() {
            self.deaths_this_tick = 0;
            return;
        }
        let mut seen = HashSet::new();
        let dead: Vec<RabbitId> = self
            .pending_deaths
            .drain(..)
            .filter(|id| self.rabbits.contains_key(*id))
            .filter(|id| seen.insert(*id))
            .collect();
        let mut removed = 0usize;
        for id in dead {
            self.release_pair(id);
            self.brains.remove(id);
            if self.rabbits.remove(id).is_some() {
                removed += 1;
            }
        }
        self.deaths_this_tick = removed;
    }

    fn summarize(&self, next_tick: Tick) -> TickSummary {
        let rabbit_count = self.rabbits.len();
        let total_hunger: f32 = self.rabbits.values().map(|rabbit| rabbit.hunger).sum();
        let average_hunger = if rabbit_count > 0 {
            total_hunger / rabbit_count as f32
        } else {
            0.0
        };
        TickSummary {
            tick: next_tick,
            rabbit_count,
            carrot_count: self.carrots.planted_count(),
            births: self.births_this_tick,
            deaths: self.deaths_this_tick,
            total_carrot_food: self.carrots.total_food(),
            average_hunger,
        }
    }

    fn stage_persistence(&mut self, next_tick: Tick) {
        if self.config.persistence_interval == 0
            || !next_tick
                .0
                .is_multiple_of(self.config.persistence_interval as u64)
        {
            return;
        }

        let summary = self.summarize(next_tick);
        let metrics = vec![
            MetricSample::from_f32("total_carrot_food", summary.total_carrot_food),
            MetricSample::from_f32("average_hunger", summary.average_hunger),
            MetricSample::new("carrot_count", summary.carrot_count as f64),
        ];
        let mut events = Vec::with_capacity(2);
        if summary.births > 0 {
            events.push(PersistenceEvent::new(
                PersistenceEventKind::Births,
                summary.births,
            ));
        }
        if summary.deaths > 0 {
            events.push(PersistenceEvent::new(
                PersistenceEventKind::Deaths,
                summary.deaths,
            ));
        }

        let batch = PersistenceBatch {
            summary: summary.clone(),
            epoch: self.epoch,
            metrics,
            events,
        };
        self.persistence.on_tick(&batch);
        if self.history.len() >= self.config.history_capacity {
            self.history.pop_front();
        }
        self.history.push_back(summary);
    }

    /// Advances the world tick counter, rolling epochs when needed.
    pub fn advance_tick(&mut self) {
        self.tick = self.tick.next();
        if self.tick.0.is_multiple_of(10_000) {
            self.epoch += 1;
        }
    }

    /// Resets ticks and epochs (useful for restarts).
    pub fn reset_time(&mut self) {
        self.tick = Tick::zero();
        self.epoch = 0;
    }

    /// Execute one simulation tick pipeline returning emitted events.
    pub fn step(&mut self) -> TickEvents {
        let next_tick = self.tick.next();
        let previous_epoch = self.epoch;
        self.births_this_tick = 0;

        self.stage_aging();
        self.stage_carrots();
        self.stage_movement();
        let percepts = self.stage_percepts();
        self.stage_decisions(percepts);
        self.stage_mating();
        self.stage_hazards();
        self.stage_death_cleanup();
        self.stage_persistence(next_tick);

        let carrot_events = self.carrots.take_events();
        self.advance_tick();

        TickEvents {
            tick: self.tick,
            epoch_rolled: self.epoch != previous_epoch,
            births: self.births_this_tick,
            deaths: self.deaths_this_tick,
            carrot_events,
        }
    }
}
