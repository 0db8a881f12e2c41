//! Scenario configuration, model clock and tick driver for the measles ABM.
//!
//! This crate owns the run loop: it builds the event bus and the seeded
//! population from a scenario, registers the components in a fixed order,
//! hands them the bus, and steps them once per tick.
//!
//! # Modules
//!
//! - [`clock`] -- Model clock with tick counter and calendar date
//!   derivation ([`ModelClock`]).
//! - [`config`] -- Configuration loading from `measles-config.yaml` into
//!   strongly-typed structs ([`ScenarioConfig`]).
//! - [`model`] -- The model driver ([`Model`]) and its run report
//!   ([`RunSummary`]).

pub mod clock;
pub mod config;
pub mod model;

pub use clock::{ClockError, ModelClock};
pub use config::{ComponentsConfig, ConfigError, LoggingConfig, ModelConfig, ScenarioConfig};
pub use model::{Model, ModelError, RunSummary, TickSummary};
