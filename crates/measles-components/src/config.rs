//! Parameters for the per-tick components.
//!
//! Every struct deserializes from the matching section of the scenario
//! YAML with per-field defaults, and exposes a `validate` method that the
//! component constructor calls. Invalid values are rejected before the run
//! starts.

use serde::{Deserialize, Serialize};

use crate::error::ComponentError;

/// Statistical distribution for per-agent delays.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DelayDistribution {
    /// Gamma with shape 4 and the configured mean.
    #[default]
    Gamma,
    /// Exponential with the configured mean.
    Exponential,
    /// Always exactly the configured mean.
    Fixed,
}

impl core::str::FromStr for DelayDistribution {
    type Err = ComponentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "gamma" => Ok(Self::Gamma),
            "exponential" => Ok(Self::Exponential),
            "fixed" => Ok(Self::Fixed),
            other => Err(ComponentError::InvalidParams {
                component: "delay",
                field: "distribution",
                reason: format!("expected 'gamma', 'exponential' or 'fixed', got '{other}'"),
            }),
        }
    }
}

/// Parameters for MCV1 vaccination.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mcv1Params {
    /// Mean delay between birth and vaccination, in ticks, at least 1
    /// (default: 270).
    #[serde(default = "default_vaccination_delay_mean")]
    pub vaccination_delay_mean: f64,

    /// Probability that a dose confers protection (default: 0.9).
    #[serde(default = "default_vaccination_efficacy")]
    pub vaccination_efficacy: f64,

    /// Fraction of newborns scheduled for a dose (default: 1.0).
    #[serde(default = "default_coverage")]
    pub coverage: f64,

    /// Distribution of the vaccination delay (default: gamma).
    #[serde(default)]
    pub delay_distribution: DelayDistribution,
}

impl Default for Mcv1Params {
    fn default() -> Self {
        Self {
            vaccination_delay_mean: default_vaccination_delay_mean(),
            vaccination_efficacy: default_vaccination_efficacy(),
            coverage: default_coverage(),
            delay_distribution: DelayDistribution::default(),
        }
    }
}

impl Mcv1Params {
    /// Reject out-of-range values.
    pub fn validate(&self) -> Result<(), ComponentError> {
        const COMPONENT: &str = "mcv1";
        check_delay_mean(COMPONENT, "vaccination_delay_mean", self.vaccination_delay_mean)?;
        check_fraction(COMPONENT, "vaccination_efficacy", self.vaccination_efficacy)?;
        check_fraction(COMPONENT, "coverage", self.coverage)
    }
}

/// Parameters for maternal immunity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaternalImmunityParams {
    /// Mean protection duration, in ticks (default: 180).
    #[serde(default = "default_protection_duration_mean")]
    pub protection_duration_mean: f64,

    /// Fraction of newborns receiving maternal antibodies (default: 1.0).
    #[serde(default = "default_coverage")]
    pub coverage: f64,

    /// Distribution of the protection duration (default: gamma).
    #[serde(default)]
    pub distribution: DelayDistribution,
}

impl Default for MaternalImmunityParams {
    fn default() -> Self {
        Self {
            protection_duration_mean: default_protection_duration_mean(),
            coverage: default_coverage(),
            distribution: DelayDistribution::default(),
        }
    }
}

impl MaternalImmunityParams {
    /// Reject out-of-range values.
    pub fn validate(&self) -> Result<(), ComponentError> {
        const COMPONENT: &str = "maternal_immunity";
        check_mean(COMPONENT, "protection_duration_mean", self.protection_duration_mean)?;
        check_fraction(COMPONENT, "coverage", self.coverage)
    }
}

/// Parameters for constant-rate vital dynamics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VitalDynamicsParams {
    /// Births per 1000 people per year (default: 20).
    #[serde(default = "default_crude_birth_rate")]
    pub crude_birth_rate: f64,

    /// Deaths per 1000 people per year (default: 8).
    #[serde(default = "default_crude_death_rate")]
    pub crude_death_rate: f64,
}

impl Default for VitalDynamicsParams {
    fn default() -> Self {
        Self {
            crude_birth_rate: default_crude_birth_rate(),
            crude_death_rate: default_crude_death_rate(),
        }
    }
}

impl VitalDynamicsParams {
    /// Reject out-of-range values.
    pub fn validate(&self) -> Result<(), ComponentError> {
        const COMPONENT: &str = "vital_dynamics";
        check_rate(COMPONENT, "crude_birth_rate", self.crude_birth_rate)?;
        check_rate(COMPONENT, "crude_death_rate", self.crude_death_rate)?;
        if self.crude_death_rate >= 1000.0 {
            return Err(ComponentError::InvalidParams {
                component: COMPONENT,
                field: "crude_death_rate",
                reason: format!("must be below 1000 per 1000, got {}", self.crude_death_rate),
            });
        }
        Ok(())
    }
}

/// Parameters for the birth monitor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BirthMonitorParams {
    /// Whether to count births per patch (default: true).
    #[serde(default = "default_true")]
    pub track_birth_locations: bool,
}

impl Default for BirthMonitorParams {
    fn default() -> Self {
        Self {
            track_birth_locations: true,
        }
    }
}

/// Parameters for the death monitor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeathMonitorParams {
    /// Whether to count deaths per patch (default: true).
    #[serde(default = "default_true")]
    pub track_death_locations: bool,

    /// Whether to count deaths per disease state (default: true).
    #[serde(default = "default_true")]
    pub track_death_states: bool,
}

impl Default for DeathMonitorParams {
    fn default() -> Self {
        Self {
            track_death_locations: true,
            track_death_states: true,
        }
    }
}

fn check_mean(component: &'static str, field: &'static str, mean: f64) -> Result<(), ComponentError> {
    if mean.is_finite() && mean > 0.0 {
        Ok(())
    } else {
        Err(ComponentError::InvalidParams {
            component,
            field,
            reason: format!("must be a positive number of ticks, got {mean}"),
        })
    }
}

fn check_delay_mean(component: &'static str, field: &'static str, mean: f64) -> Result<(), ComponentError> {
    if mean.is_finite() && mean >= 1.0 {
        Ok(())
    } else {
        Err(ComponentError::InvalidParams {
            component,
            field,
            reason: format!("must be at least one tick, got {mean}"),
        })
    }
}

fn check_fraction(
    component: &'static str,
    field: &'static str,
    value: f64,
) -> Result<(), ComponentError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ComponentError::InvalidParams {
            component,
            field,
            reason: format!("must be within [0, 1], got {value}"),
        })
    }
}

fn check_rate(component: &'static str, field: &'static str, rate: f64) -> Result<(), ComponentError> {
    if rate.is_finite() && rate >= 0.0 {
        Ok(())
    } else {
        Err(ComponentError::InvalidParams {
            component,
            field,
            reason: format!("must be finite and non-negative, got {rate}"),
        })
    }
}

// ---------------------------------------------------------------------------
// Default value functions (serde default requires named functions)
// ---------------------------------------------------------------------------

const fn default_vaccination_delay_mean() -> f64 {
    270.0
}

const fn default_vaccination_efficacy() -> f64 {
    0.9
}

const fn default_coverage() -> f64 {
    1.0
}

const fn default_protection_duration_mean() -> f64 {
    180.0
}

const fn default_crude_birth_rate() -> f64 {
    20.0
}

const fn default_crude_death_rate() -> f64 {
    8.0
}

const fn default_true() -> bool {
    true
}
