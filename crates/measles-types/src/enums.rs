//! Enumeration types for the measles ABM extensions.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Disease states
// ---------------------------------------------------------------------------

/// Compartment an agent occupies in the SEIR model.
///
/// The discriminant order matches the column order of the per-patch state
/// counts (`S`, `E`, `I`, `R`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum DiseaseState {
    /// Susceptible to infection.
    #[serde(rename = "S")]
    Susceptible,
    /// Infected but not yet infectious.
    #[serde(rename = "E")]
    Exposed,
    /// Infectious.
    #[serde(rename = "I")]
    Infectious,
    /// Recovered (or otherwise immune).
    #[serde(rename = "R")]
    Recovered,
}

impl DiseaseState {
    /// All states in column order.
    pub const ALL: [Self; 4] = [
        Self::Susceptible,
        Self::Exposed,
        Self::Infectious,
        Self::Recovered,
    ];

    /// Column index of this state in per-patch count tables.
    pub const fn column(self) -> usize {
        match self {
            Self::Susceptible => 0,
            Self::Exposed => 1,
            Self::Infectious => 2,
            Self::Recovered => 3,
        }
    }

    /// Single-letter compartment label.
    pub const fn label(self) -> &'static str {
        match self {
            Self::Susceptible => "S",
            Self::Exposed => "E",
            Self::Infectious => "I",
            Self::Recovered => "R",
        }
    }
}

impl core::fmt::Display for DiseaseState {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.label())
    }
}

// ---------------------------------------------------------------------------
// Event kinds
// ---------------------------------------------------------------------------

/// The closed set of event kinds carried by the event bus.
///
/// Each kind has exactly one payload shape (see [`crate::EventPayload`]).
/// The serialized form is the `snake_case` wire name (`"births"`,
/// `"maternal_immunity_start"`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// New agents were added to the population.
    Births,
    /// Agents were removed from the population.
    Deaths,
    /// Scheduled vaccinations were administered.
    Vaccination,
    /// Maternal antibodies started protecting newborns.
    MaternalImmunityStart,
    /// Maternal antibodies waned.
    MaternalImmunityEnd,
}

impl EventKind {
    /// Every event kind, in declaration order.
    pub const ALL: [Self; 5] = [
        Self::Births,
        Self::Deaths,
        Self::Vaccination,
        Self::MaternalImmunityStart,
        Self::MaternalImmunityEnd,
    ];

    /// The `snake_case` wire name of this kind.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Births => "births",
            Self::Deaths => "deaths",
            Self::Vaccination => "vaccination",
            Self::MaternalImmunityStart => "maternal_immunity_start",
            Self::MaternalImmunityEnd => "maternal_immunity_end",
        }
    }
}

impl core::fmt::Display for EventKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown event kind name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownEventKind(pub String);

impl core::fmt::Display for UnknownEventKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "unknown event kind: {}", self.0)
    }
}

impl std::error::Error for UnknownEventKind {}

impl core::str::FromStr for EventKind {
    type Err = UnknownEventKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| UnknownEventKind(s.to_owned()))
    }
}

// ---------------------------------------------------------------------------
// Vaccines
// ---------------------------------------------------------------------------

/// Which routine dose a vaccination event reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VaccineKind {
    /// First dose of measles-containing vaccine.
    Mcv1,
}
