use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};
use warren_brain::StateBrain;
use warren_core::{Rabbit, TerrainGrid, WarrenConfig, WorldState};

#[derive(Debug, Parser)]
#[command(name = "warren", about = "Headless island ecosystem simulation")]
struct Args {
    /// Ticks to simulate.
    #[arg(long, default_value_t = 2_000)]
    ticks: u64,

    /// Rabbits placed at startup.
    #[arg(long, default_value_t = 8)]
    rabbits: u32,

    /// RNG seed override for reproducible runs.
    #[arg(long)]
    seed: Option<u64>,

    /// JSON configuration file; missing fields keep their defaults.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Ticks between logged population summaries.
    #[arg(long, default_value_t = 200)]
    report_interval: u32,
}

fn main() -> Result<()> {
    init_tracing();
    let args = Args::parse();
    let config = load_config(&args)?;
    let mut world = bootstrap_world(&args, config)?;

    let stop = Arc::new(AtomicBool::new(false));
    {
        let stop = Arc::clone(&stop);
        ctrlc::set_handler(move || stop.store(true, Ordering::SeqCst))
            .context("failed to install the interrupt handler")?;
    }

    info!(
        rabbits = world.rabbit_count(),
        carrots = world.carrots().planted_count(),
        ticks = args.ticks,
        "Starting warren simulation"
    );

    for _ in 0..args.ticks {
        if stop.load(Ordering::SeqCst) {
            warn!(tick = world.tick().0, "Interrupted, stopping early");
            break;
        }
        let events = world.step();
        if events.epoch_rolled {
            info!(epoch = world.epoch(), tick = events.tick.0, "Epoch rolled");
        }
        if let Some(summary) = world.history().last()
            && summary.tick == events.tick
        {
            info!(
                tick = summary.tick.0,
                rabbits = summary.rabbit_count,
                carrots = summary.carrot_count,
                births = summary.births,
                deaths = summary.deaths,
                avg_hunger = summary.average_hunger,
                "Population summary"
            );
        }
    }

    match world.history().last() {
        Some(summary) => info!(
            tick = summary.tick.0,
            rabbits = summary.rabbit_count,
            carrots = summary.carrot_count,
            total_food = summary.total_carrot_food,
            "Simulation finished"
        ),
        None => warn!("Simulation finished without any recorded summaries"),
    }
    Ok(())
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

fn load_config(args: &Args) -> Result<WarrenConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            serde_json::from_str(&text)
                .with_context(|| format!("failed to parse {}", path.display()))?
        }
        None => WarrenConfig::default(),
    };
    if args.seed.is_some() {
        config.rng_seed = args.seed;
    }
    if args.report_interval > 0 {
        config.persistence_interval = args.report_interval;
    }
    Ok(config)
}

fn bootstrap_world(args: &Args, config: WarrenConfig) -> Result<WorldState> {
    let mut world = WorldState::new(config).context("invalid configuration")?;
    let brain_key = StateBrain::install(&mut world);
    world.set_kit_brain(Some(brain_key));

    // Scatter the starting rabbits over the inner half of the island.
    let grid = world.grid().clone();
    let spawn_cells = grid.cells_within_radius(grid.radius() / 2);
    for _ in 0..args.rabbits {
        let index = {
            use rand::Rng;
            world.rng().random_range(0..spawn_cells.len())
        };
        let position = grid.random_position_in(spawn_cells[index], world.rng());
        let id = world.spawn_rabbit(Rabbit::at(position));
        world.bind_rabbit_brain(id, brain_key);
    }

    world.seed_carrots();
    Ok(world)
}
