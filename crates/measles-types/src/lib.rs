//! Shared type definitions for the measles ABM extensions.
//!
//! This crate is the single source of truth for identifiers, enumerations,
//! and event payload shapes used across the workspace.
//!
//! # Modules
//!
//! - [`ids`] -- Index newtypes for agents and patches, plus [`RunId`]
//! - [`enums`] -- Disease states, event kinds, vaccine kinds
//! - [`structs`] -- Per-kind event payloads and their consistency checks

pub mod enums;
pub mod ids;
pub mod structs;

// Re-export all public types at crate root for convenience.
pub use enums::{DiseaseState, EventKind, UnknownEventKind, VaccineKind};
pub use ids::{AgentId, PatchId, RunId};
pub use structs::{
    BirthsDetails, DeathsDetails, EventPayload, MaternalImmunityEndDetails,
    MaternalImmunityStartDetails, VaccinationDetails,
};
