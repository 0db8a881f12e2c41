//! Scenario configuration loading and typed config structures.
//!
//! A scenario lives in a YAML file (by default `measles-config.yaml`). This
//! module defines strongly-typed structs that mirror the YAML structure,
//! and provides a loader that reads, overrides and validates the file.
//! Every field has a default, so an empty document is a valid scenario.
//!
//! ```yaml
//! model:
//!   name: baseline
//!   seed: 42
//!   num_ticks: 730
//!   time_step_days: 1
//!   start_date: 2000-01-01
//!   patch_populations: [50000, 20000, 5000]
//! vital_dynamics:
//!   crude_birth_rate: 35
//!   crude_death_rate: 10
//! mcv1:
//!   coverage: 0.85
//! components:
//!   maternal_immunity: false
//! ```

use std::path::Path;

use chrono::NaiveDate;
use measles_components::{
    BirthMonitorParams, ComponentError, DeathMonitorParams, MaternalImmunityParams, Mcv1Params,
    VitalDynamicsParams,
};
use serde::Deserialize;
use tracing::debug;

/// Environment variable overriding `model.seed`.
pub const SEED_ENV: &str = "MEASLES_SEED";

/// Environment variable overriding `model.num_ticks`.
pub const NUM_TICKS_ENV: &str = "MEASLES_NUM_TICKS";

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },

    /// A model-level value is out of range.
    #[error("invalid config value `{field}`: {reason}")]
    Invalid {
        /// Dotted path of the offending field.
        field: &'static str,
        /// Why the value was rejected.
        reason: String,
    },

    /// A component section failed validation.
    #[error("invalid component config: {source}")]
    Component {
        /// The component's validation error.
        #[from]
        source: ComponentError,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Top-level scenario configuration.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ScenarioConfig {
    /// Run length, timing, seed and initial population.
    #[serde(default)]
    pub model: ModelConfig,

    /// Which standard components to run.
    #[serde(default)]
    pub components: ComponentsConfig,

    /// Birth and death rates.
    #[serde(default)]
    pub vital_dynamics: VitalDynamicsParams,

    /// Maternal immunity parameters.
    #[serde(default)]
    pub maternal_immunity: MaternalImmunityParams,

    /// MCV1 vaccination parameters.
    #[serde(default)]
    pub mcv1: Mcv1Params,

    /// Birth tracker switches.
    #[serde(default)]
    pub birth_monitor: BirthMonitorParams,

    /// Death tracker switches.
    #[serde(default)]
    pub death_monitor: DeathMonitorParams,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl ScenarioConfig {
    /// Load configuration from a YAML file at the given path.
    ///
    /// Environment variables override YAML values:
    /// - `MEASLES_SEED` overrides `model.seed`
    /// - `MEASLES_NUM_TICKS` overrides `model.num_ticks`
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read,
    /// [`ConfigError::Yaml`] if the content is not valid YAML,
    /// [`ConfigError::Invalid`] if an override does not parse, or a
    /// validation error if a value is out of range.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Self = serde_yml::from_str(&contents)?;
        config.model.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse and validate configuration from a YAML string.
    ///
    /// No environment overrides are applied.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] if the string is not valid YAML, or a
    /// validation error if a value is out of range.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Check every section.
    ///
    /// # Errors
    ///
    /// Returns the first violated rule.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.model.validate()?;
        self.vital_dynamics.validate()?;
        self.maternal_immunity.validate()?;
        self.mcv1.validate()?;
        Ok(())
    }
}

/// Model-level settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ModelConfig {
    /// Human-readable scenario name.
    #[serde(default = "default_scenario_name")]
    pub name: String,

    /// Master random seed; every component derives its own seed from it.
    #[serde(default = "default_seed")]
    pub seed: u64,

    /// Number of ticks to run.
    #[serde(default = "default_num_ticks")]
    pub num_ticks: u64,

    /// Simulated days per tick.
    #[serde(default = "default_time_step_days")]
    pub time_step_days: u32,

    /// Calendar date of tick 0.
    #[serde(default = "default_start_date")]
    pub start_date: NaiveDate,

    /// Initial number of agents in each patch.
    #[serde(default = "default_patch_populations")]
    pub patch_populations: Vec<u32>,
}

impl ModelConfig {
    /// Apply environment variable overrides for the seed and run length.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if a variable is set but is not an
    /// unsigned integer.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|name| std::env::var(name).ok())
    }

    /// Apply overrides read through `lookup`, keyed by variable name.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for a value that does not parse.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&'static str) -> Option<String>,
    {
        if let Some(seed) = override_number(SEED_ENV, lookup(SEED_ENV))? {
            self.seed = seed;
        }
        if let Some(ticks) = override_number(NUM_TICKS_ENV, lookup(NUM_TICKS_ENV))? {
            self.num_ticks = ticks;
        }
        Ok(())
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.time_step_days == 0 {
            return Err(ConfigError::Invalid {
                field: "model.time_step_days",
                reason: "must be at least one day".to_owned(),
            });
        }
        if self.patch_populations.is_empty() {
            return Err(ConfigError::Invalid {
                field: "model.patch_populations",
                reason: "at least one patch is required".to_owned(),
            });
        }
        let total = self
            .patch_populations
            .iter()
            .try_fold(0_u32, |acc, n| acc.checked_add(*n));
        if total.is_none() {
            return Err(ConfigError::Invalid {
                field: "model.patch_populations",
                reason: "total population exceeds the u32 agent id space".to_owned(),
            });
        }
        Ok(())
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            name: default_scenario_name(),
            seed: default_seed(),
            num_ticks: default_num_ticks(),
            time_step_days: default_time_step_days(),
            start_date: default_start_date(),
            patch_populations: default_patch_populations(),
        }
    }
}

/// Switches for the standard components.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[allow(clippy::struct_excessive_bools)]
pub struct ComponentsConfig {
    /// Run births and deaths.
    #[serde(default = "default_true")]
    pub vital_dynamics: bool,

    /// Run maternal immunity.
    #[serde(default = "default_true")]
    pub maternal_immunity: bool,

    /// Run MCV1 vaccination.
    #[serde(default = "default_true")]
    pub mcv1: bool,

    /// Run the birth tracker.
    #[serde(default = "default_true")]
    pub birth_monitor: bool,

    /// Run the death tracker.
    #[serde(default = "default_true")]
    pub death_monitor: bool,
}

impl Default for ComponentsConfig {
    fn default() -> Self {
        Self {
            vital_dynamics: true,
            maternal_immunity: true,
            mcv1: true,
            birth_monitor: true,
            death_monitor: true,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoggingConfig {
    /// Default log level when `RUST_LOG` is unset (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output.
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn override_number(name: &'static str, raw: Option<String>) -> Result<Option<u64>, ConfigError> {
    let Some(raw) = raw else {
        return Ok(None);
    };
    let value = raw.trim().parse().map_err(|e| ConfigError::Invalid {
        field: name,
        reason: format!("`{raw}` is not an unsigned integer: {e}"),
    })?;
    debug!(variable = name, value, "config override applied");
    Ok(Some(value))
}

// ---------------------------------------------------------------------------
// Default value functions (serde default requires named functions)
// ---------------------------------------------------------------------------

fn default_scenario_name() -> String {
    "baseline".to_owned()
}

const fn default_seed() -> u64 {
    42
}

const fn default_num_ticks() -> u64 {
    365
}

const fn default_time_step_days() -> u32 {
    1
}

fn default_start_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2000, 1, 1).unwrap_or_default()
}

fn default_patch_populations() -> Vec<u32> {
    vec![10_000]
}

const fn default_true() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_owned()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use measles_components::DelayDistribution;

    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = ScenarioConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.model.seed, 42);
        assert_eq!(config.model.num_ticks, 365);
        assert_eq!(config.model.patch_populations, vec![10_000]);
        assert!(config.components.mcv1);
    }

    #[test]
    fn parse_full_yaml() {
        let yaml = r#"
model:
  name: "two-patch"
  seed: 123
  num_ticks: 100
  time_step_days: 7
  start_date: "2010-06-01"
  patch_populations: [500, 250]

components:
  birth_monitor: false

vital_dynamics:
  crude_birth_rate: 35.0
  crude_death_rate: 12.5

maternal_immunity:
  protection_duration_mean: 120
  coverage: 0.9
  distribution: exponential

mcv1:
  vaccination_delay_mean: 300
  vaccination_efficacy: 0.95
  coverage: 0.8
  delay_distribution: fixed

death_monitor:
  track_death_states: false

logging:
  level: debug
  json: true
"#;
        let config = ScenarioConfig::parse(yaml).unwrap();
        assert_eq!(config.model.name, "two-patch");
        assert_eq!(config.model.time_step_days, 7);
        assert_eq!(config.model.start_date, NaiveDate::from_ymd_opt(2010, 6, 1).unwrap());
        assert_eq!(config.model.patch_populations, vec![500, 250]);
        assert!(!config.components.birth_monitor);
        assert!(config.components.death_monitor);
        assert_eq!(config.maternal_immunity.distribution, DelayDistribution::Exponential);
        assert_eq!(config.mcv1.delay_distribution, DelayDistribution::Fixed);
        assert!((config.vital_dynamics.crude_death_rate - 12.5).abs() < f64::EPSILON);
        assert!(config.death_monitor.track_death_locations);
        assert!(!config.death_monitor.track_death_states);
        assert_eq!(config.logging.level, "debug");
        assert!(config.logging.json);
    }

    #[test]
    fn parse_empty_yaml() {
        let config = ScenarioConfig::parse("").unwrap();
        assert_eq!(config, ScenarioConfig::default());
    }

    #[test]
    fn out_of_range_coverage_is_rejected() {
        let result = ScenarioConfig::parse("mcv1:\n  coverage: 1.2\n");
        assert!(matches!(result, Err(ConfigError::Component { .. })));
    }

    #[test]
    fn unknown_distribution_is_a_yaml_error() {
        let result = ScenarioConfig::parse("maternal_immunity:\n  distribution: lognormal\n");
        assert!(matches!(result, Err(ConfigError::Yaml { .. })));
    }

    #[test]
    fn zero_time_step_is_rejected() {
        let result = ScenarioConfig::parse("model:\n  time_step_days: 0\n");
        assert!(matches!(
            result,
            Err(ConfigError::Invalid {
                field: "model.time_step_days",
                ..
            })
        ));
    }

    #[test]
    fn empty_patch_list_is_rejected() {
        let result = ScenarioConfig::parse("model:\n  patch_populations: []\n");
        assert!(matches!(result, Err(ConfigError::Invalid { .. })));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let result = ScenarioConfig::from_file(Path::new("/nonexistent/measles-config.yaml"));
        assert!(matches!(result, Err(ConfigError::Io { .. })));
    }

    #[test]
    fn overrides_replace_seed_and_run_length() {
        let mut model = ModelConfig::default();
        model
            .apply_overrides(|name| match name {
                SEED_ENV => Some(" 7 ".to_owned()),
                NUM_TICKS_ENV => Some("30".to_owned()),
                _ => None,
            })
            .unwrap();
        assert_eq!(model.seed, 7);
        assert_eq!(model.num_ticks, 30);
    }

    #[test]
    fn unset_overrides_keep_file_values() {
        let mut model = ModelConfig::default();
        model.apply_overrides(|_| None).unwrap();
        assert_eq!(model, ModelConfig::default());
    }

    #[test]
    fn unparsable_override_is_rejected() {
        let mut model = ModelConfig::default();
        let result = model.apply_overrides(|name| (name == SEED_ENV).then(|| "abc".to_owned()));
        assert!(matches!(
            result,
            Err(ConfigError::Invalid { field: SEED_ENV, .. })
        ));
        assert_eq!(model.seed, 42);
    }
}
