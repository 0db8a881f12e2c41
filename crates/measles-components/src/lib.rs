//! Population store and per-tick components for the measles ABM.
//!
//! This crate contains the simulation logic layer: the columnar agent
//! store, the delay machinery shared by the schedulers, and every
//! component the model runs each tick. Components talk to each other only
//! through the event bus from `measles-events`.
//!
//! # Modules
//!
//! - [`birth_monitor`] -- Passive tracker of births ([`BirthMonitor`])
//! - [`component`] -- The per-tick interface ([`Component`])
//! - [`config`] -- Validated component parameters
//! - [`death_monitor`] -- Passive tracker of deaths ([`DeathMonitor`])
//! - [`delay`] -- Delay sampling, coverage selection, tick-bucketed schedules
//! - [`error`] -- Error types for all component operations ([`ComponentError`])
//! - [`maternal_immunity`] -- Maternal antibody protection ([`MaternalImmunityProcess`])
//! - [`mcv1`] -- Delayed MCV1 vaccination ([`Mcv1Process`])
//! - [`population`] -- Agent columns and patch counts ([`Population`])
//! - [`vital_dynamics`] -- Constant-rate births and deaths ([`VitalDynamicsProcess`])
//! - [`vital_reactor`] -- Minimal births/deaths reactor ([`VitalEventReactor`])

pub mod birth_monitor;
pub mod component;
pub mod config;
pub mod death_monitor;
pub mod delay;
pub mod error;
pub mod maternal_immunity;
pub mod mcv1;
pub mod population;
pub mod vital_dynamics;
pub mod vital_reactor;

// Re-export primary types at crate root for convenience.
pub use birth_monitor::{BirthMonitor, BirthSummary};
pub use component::Component;
pub use config::{
    BirthMonitorParams, DeathMonitorParams, DelayDistribution, MaternalImmunityParams, Mcv1Params,
    VitalDynamicsParams,
};
pub use death_monitor::{DeathMonitor, DeathSummary};
pub use delay::{DelaySampler, DelaySchedule, GAMMA_SHAPE, select_by_coverage};
pub use error::ComponentError;
pub use maternal_immunity::{MaternalImmunityProcess, MaternalImmunityStats};
pub use mcv1::{Mcv1Process, Mcv1Stats};
pub use population::{NewAgent, Patches, People, Population, StateCounts};
pub use vital_dynamics::{VitalDynamicsProcess, VitalDynamicsStats};
pub use vital_reactor::{ReactionSummary, VitalEventReactor};
