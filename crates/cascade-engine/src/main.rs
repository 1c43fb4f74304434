//! Run Engine binary for the Cascade simulation.
//!
//! This is the main entry point that wires together configuration,
//! world generation, the step loop, and report emission. It loads or
//! generates a supply chain, runs it to completion, and writes the
//! full run report next to the working directory.
//!
//! # Startup Sequence
//!
//! 1. Initialize structured logging (tracing)
//! 2. Load configuration from `cascade-config.yaml`
//! 3. Generate a chain when the config carries none
//! 4. Build the world
//! 5. Run the step loop to completion
//! 6. Log the result and write the run report

mod error;

use std::path::Path;

use rand::SeedableRng;
use rand::rngs::SmallRng;
use tracing::info;
use tracing_subscriber::EnvFilter;

use cascade_core::config::WorldConfig;
use cascade_core::negotiation::QuoteMatcher;
use cascade_core::report::RunReport;
use cascade_core::world::{self, NoOpCallback, World};
use cascade_core::worldgen::{self, GenParams};

use crate::error::EngineError;

/// Application entry point for the Run Engine.
///
/// Initializes all subsystems, runs the world to completion, and
/// writes the run report.
///
/// # Errors
///
/// Returns an error if any startup step, the run itself, or report
/// emission fails.
fn main() -> Result<(), EngineError> {
    // 1. Initialize structured logging.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    info!("cascade-engine starting");

    // 2. Load configuration.
    let mut config = load_config()?;
    info!(
        n_steps = config.n_steps,
        seed = config.seed,
        configured_agents = config.n_agents(),
        buy_missing_products = config.buy_missing_products,
        "Configuration loaded"
    );

    // 3. Generate a chain when the config carries none.
    if config.profiles.is_empty() {
        let params = GenParams {
            n_steps: config.n_steps,
            ..GenParams::default()
        };
        let mut rng = SmallRng::seed_from_u64(config.seed);
        config.adopt_chain(worldgen::generate(&params, &mut rng));
        info!(
            agents = config.n_agents(),
            processes = config.n_processes(),
            "Generated default chain"
        );
    }

    // 4. Build the world.
    let mut world = World::build(config)?;
    info!(
        levels = world.topology().n_levels(),
        agents = world.ledgers().len(),
        "World built"
    );

    // 5. Run the step loop to completion.
    let mut provider = QuoteMatcher::new();
    let mut callback = NoOpCallback;
    let outcome = world.run(&mut provider, &mut callback)?;

    // 6. Log the result and write the run report.
    world::log_run_end(&outcome);

    let report = RunReport::from_world(&world, &outcome);
    let path = format!("cascade-report-{}.json", report.run_id);
    let json = serde_json::to_string_pretty(&report)?;
    std::fs::write(&path, json).map_err(|e| EngineError::Io {
        message: format!("{e}"),
    })?;
    info!(
        path = %path,
        contracts = report.contracts.len(),
        events = report.events.len(),
        "Run report written"
    );

    info!(
        end_reason = ?outcome.end_reason,
        total_steps = outcome.total_steps,
        "cascade-engine shutdown complete"
    );

    Ok(())
}

/// Load the run configuration from `cascade-config.yaml`.
///
/// Looks for the config file relative to the current working directory.
fn load_config() -> Result<WorldConfig, EngineError> {
    let config_path = Path::new("cascade-config.yaml");
    if config_path.exists() {
        let config = WorldConfig::from_file(config_path)?;
        Ok(config)
    } else {
        info!("Config file not found, using defaults");
        Ok(WorldConfig::default())
    }
}
