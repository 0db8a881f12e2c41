//! Command-line driver for the measles ABM.
//!
//! Loads a scenario, builds the model with the standard components, runs
//! every tick and logs the end-of-run report as JSON.
//!
//! # Startup Sequence
//!
//! 1. Load the scenario from `$MEASLES_CONFIG` (default
//!    `measles-config.yaml`), or fall back to defaults
//! 2. Initialize structured logging (tracing) from `RUST_LOG` or the
//!    scenario's `logging` section
//! 3. Build the model and its components
//! 4. Run the simulation
//! 5. Log the result

mod error;

use std::path::PathBuf;

use measles_core::{LoggingConfig, Model, ScenarioConfig};
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::error::EngineError;

/// Environment variable naming the scenario file.
const CONFIG_ENV: &str = "MEASLES_CONFIG";

/// Scenario file used when `MEASLES_CONFIG` is unset.
const DEFAULT_CONFIG_PATH: &str = "measles-config.yaml";

/// Application entry point.
///
/// # Errors
///
/// Returns an error if the scenario is invalid or the run fails.
fn main() -> Result<(), EngineError> {
    let path = std::env::var_os(CONFIG_ENV)
        .map_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH), PathBuf::from);
    let loaded = path.exists();
    let config = if loaded {
        ScenarioConfig::from_file(&path)?
    } else {
        ScenarioConfig::default()
    };

    init_logging(&config.logging);
    if loaded {
        info!(path = %path.display(), "Configuration loaded");
    } else {
        info!(path = %path.display(), "Config file not found, using defaults");
    }
    info!(
        scenario = %config.model.name,
        seed = config.model.seed,
        num_ticks = config.model.num_ticks,
        time_step_days = config.model.time_step_days,
        patches = config.model.patch_populations.len(),
        "Scenario ready"
    );

    let mut model = Model::from_config(config)?;
    info!(components = ?model.component_names(), "Model assembled");

    let summary = model.run()?;
    info!(report = %serde_json::to_string(&summary)?, "Run report");
    info!(
        run_id = %summary.run_id,
        ticks_run = summary.ticks_run,
        end_date = %summary.end_date,
        "measles-engine shutdown complete"
    );
    Ok(())
}

/// Install the global subscriber. `RUST_LOG` wins over the scenario level.
fn init_logging(logging: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_unset| EnvFilter::new(&logging.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);
    if logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}
