//! The model driver: one bus, one population, components run in order.
//!
//! A [`Model`] owns everything a run needs. Components are registered in
//! the order they must run each tick. On the first [`Model::step`] (or
//! [`Model::run`]) every component receives the bus through its setup hook
//! and is initialised against the seeded population; after that each tick
//! calls every component once, in registration order, then advances the
//! clock.
//!
//! [`Model::from_config`] wires the standard components in the order
//! vital dynamics, maternal immunity, MCV1, birth monitor, death monitor.
//! Maternal immunity runs before MCV1 so that newborns are protected on
//! their birth tick before any dose can be given.

use std::collections::BTreeMap;
use std::rc::Rc;

use chrono::NaiveDate;
use measles_components::{
    BirthMonitor, Component, ComponentError, DeathMonitor, MaternalImmunityProcess, Mcv1Process,
    Population, VitalDynamicsProcess,
};
use measles_events::{BusStats, EventBus};
use measles_types::{DiseaseState, RunId};
use serde::Serialize;
use tracing::{debug, info};

use crate::clock::{ClockError, ModelClock};
use crate::config::{ConfigError, ScenarioConfig};

/// Seed offset of the vital dynamics process.
pub const VITAL_DYNAMICS_SEED_OFFSET: u64 = 1;
/// Seed offset of the maternal immunity process.
pub const MATERNAL_IMMUNITY_SEED_OFFSET: u64 = 2;
/// Seed offset of the MCV1 process.
pub const MCV1_SEED_OFFSET: u64 = 3;

/// Errors that can occur while building or running a model.
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    /// The scenario configuration is invalid.
    #[error("config error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: ConfigError,
    },

    /// A clock operation failed.
    #[error("clock error: {source}")]
    Clock {
        /// The underlying clock error.
        #[from]
        source: ClockError,
    },

    /// A component failed to build or to step.
    #[error("component {component} failed: {source}")]
    Component {
        /// Name of the failing component.
        component: &'static str,
        /// The underlying component error.
        source: ComponentError,
    },

    /// Every configured tick has already run.
    #[error("run complete: all {num_ticks} ticks have been executed")]
    RunComplete {
        /// The configured run length.
        num_ticks: u64,
    },
}

fn component_error(component: &'static str) -> impl FnOnce(ComponentError) -> ModelError {
    move |source| ModelError::Component { component, source }
}

/// Outcome of a single tick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TickSummary {
    /// The tick that ran.
    pub tick: u64,
    /// Calendar date of the tick.
    pub date: NaiveDate,
    /// Living agents after the tick.
    pub agents_alive: u64,
}

/// End-of-run report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    /// Identifier of this run.
    pub run_id: RunId,
    /// Scenario name.
    pub scenario: String,
    /// Ticks executed.
    pub ticks_run: u64,
    /// Calendar date of tick 0.
    pub start_date: NaiveDate,
    /// Calendar date after the last tick.
    pub end_date: NaiveDate,
    /// Living agents at the end.
    pub agents_alive: u64,
    /// Living agents per disease state.
    pub state_totals: BTreeMap<DiseaseState, u64>,
    /// Living agents per patch.
    pub patch_populations: Vec<u64>,
    /// Event bus counters.
    pub bus: BusStats,
    /// Per-component statistics, keyed by component name.
    pub components: BTreeMap<&'static str, serde_json::Value>,
}

/// One simulation run.
pub struct Model {
    run_id: RunId,
    config: ScenarioConfig,
    bus: Rc<EventBus>,
    population: Population,
    clock: ModelClock,
    components: Vec<Box<dyn Component>>,
    prepared: bool,
}

impl core::fmt::Debug for Model {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Model")
            .field("run_id", &self.run_id)
            .field("scenario", &self.config.model.name)
            .field("tick", &self.clock.tick())
            .field("components", &self.component_names())
            .finish_non_exhaustive()
    }
}

impl Model {
    /// Build a model with no components.
    ///
    /// Validates the configuration, seeds the population from the patch
    /// sizes and creates the bus and the clock.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError`] if the configuration is invalid.
    pub fn new(config: ScenarioConfig) -> Result<Self, ModelError> {
        config.validate()?;
        let population = Population::from_patch_sizes(&config.model.patch_populations)
            .map_err(component_error("population"))?;
        let clock = ModelClock::new(
            config.model.start_date,
            config.model.time_step_days,
            config.model.num_ticks,
        )?;
        Ok(Self {
            run_id: RunId::new(),
            config,
            bus: EventBus::shared(),
            population,
            clock,
            components: Vec::new(),
            prepared: false,
        })
    }

    /// Build a model with the standard components enabled in `config`.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError`] if the configuration or a component's
    /// parameters are invalid.
    pub fn from_config(config: ScenarioConfig) -> Result<Self, ModelError> {
        let mut model = Self::new(config)?;
        let seed = model.config.model.seed;
        let enabled = model.config.components.clone();

        if enabled.vital_dynamics {
            let process = VitalDynamicsProcess::new(
                model.config.vital_dynamics.clone(),
                model.config.model.time_step_days,
                seed.wrapping_add(VITAL_DYNAMICS_SEED_OFFSET),
            )
            .map_err(component_error(measles_components::vital_dynamics::NAME))?;
            model.add_component(Box::new(process))?;
        }
        if enabled.maternal_immunity {
            let process = MaternalImmunityProcess::new(
                model.config.maternal_immunity.clone(),
                seed.wrapping_add(MATERNAL_IMMUNITY_SEED_OFFSET),
            )
            .map_err(component_error(measles_components::maternal_immunity::NAME))?;
            model.add_component(Box::new(process))?;
        }
        if enabled.mcv1 {
            let process = Mcv1Process::new(
                model.config.mcv1.clone(),
                seed.wrapping_add(MCV1_SEED_OFFSET),
            )
            .map_err(component_error(measles_components::mcv1::NAME))?;
            model.add_component(Box::new(process))?;
        }
        if enabled.birth_monitor {
            let monitor = BirthMonitor::new(model.config.birth_monitor.clone());
            model.add_component(Box::new(monitor))?;
        }
        if enabled.death_monitor {
            let monitor = DeathMonitor::new(model.config.death_monitor.clone());
            model.add_component(Box::new(monitor))?;
        }
        Ok(model)
    }

    /// Append a component to the run order.
    ///
    /// A component added after the run has started is set up and
    /// initialised immediately and runs from the next tick.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::Component`] if late initialisation fails.
    pub fn add_component(&mut self, mut component: Box<dyn Component>) -> Result<(), ModelError> {
        if self.prepared {
            let name = component.name();
            component.setup(&self.bus);
            component
                .initialize(&mut self.population)
                .map_err(component_error(name))?;
        }
        debug!(component = component.name(), "component registered");
        self.components.push(component);
        Ok(())
    }

    /// Take the component named `name` out of the run order.
    ///
    /// Its bus subscriptions are dropped so it receives no further events.
    /// Returns `None` if no component has that name.
    pub fn remove_component(&mut self, name: &str) -> Option<Box<dyn Component>> {
        let index = self.components.iter().position(|c| c.name() == name)?;
        let mut component = self.components.remove(index);
        component.teardown();
        debug!(component = component.name(), "component removed");
        Some(component)
    }

    /// The shared event bus, for subscribers outside the component list.
    pub const fn bus(&self) -> &Rc<EventBus> {
        &self.bus
    }

    /// The population.
    pub const fn population(&self) -> &Population {
        &self.population
    }

    /// Mutable access to the population, e.g. to seed infections.
    pub const fn population_mut(&mut self) -> &mut Population {
        &mut self.population
    }

    /// The model clock.
    pub const fn clock(&self) -> &ModelClock {
        &self.clock
    }

    /// The scenario this model was built from.
    pub const fn config(&self) -> &ScenarioConfig {
        &self.config
    }

    /// Identifier of this run.
    pub const fn run_id(&self) -> RunId {
        self.run_id
    }

    /// Component names in run order.
    pub fn component_names(&self) -> Vec<&'static str> {
        self.components.iter().map(|c| c.name()).collect()
    }

    /// Hand out the bus and initialise every component. Runs once.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::Component`] if an initialiser fails.
    pub fn prepare(&mut self) -> Result<(), ModelError> {
        if self.prepared {
            return Ok(());
        }
        for component in &mut self.components {
            component.setup(&self.bus);
        }
        for component in &mut self.components {
            let name = component.name();
            component
                .initialize(&mut self.population)
                .map_err(component_error(name))?;
        }
        self.prepared = true;
        info!(
            run_id = %self.run_id,
            scenario = %self.config.model.name,
            agents = self.population.people.count_active(),
            patches = self.population.patches.len(),
            components = self.components.len(),
            "Model prepared"
        );
        Ok(())
    }

    /// Run one tick: every component in order, then advance the clock.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::RunComplete`] once every configured tick has
    /// run, or the first component failure.
    pub fn step(&mut self) -> Result<TickSummary, ModelError> {
        if self.clock.is_finished() {
            return Err(ModelError::RunComplete {
                num_ticks: self.clock.num_ticks(),
            });
        }
        self.prepare()?;

        let tick = self.clock.tick();
        let date = self.clock.current_date()?;
        for component in &mut self.components {
            let name = component.name();
            component
                .step(&mut self.population, tick)
                .map_err(component_error(name))?;
        }
        self.clock.advance()?;

        let agents_alive = living(&self.population);
        debug!(tick, %date, agents_alive, "Tick complete");
        Ok(TickSummary {
            tick,
            date,
            agents_alive,
        })
    }

    /// Run every remaining tick and return the end-of-run report.
    ///
    /// # Errors
    ///
    /// Returns the first [`ModelError`] raised by a tick.
    pub fn run(&mut self) -> Result<RunSummary, ModelError> {
        self.prepare()?;
        info!(
            run_id = %self.run_id,
            num_ticks = self.clock.num_ticks(),
            time_step_days = self.clock.time_step_days(),
            "Simulation started"
        );
        while !self.clock.is_finished() {
            self.step()?;
        }
        let summary = self.summary()?;
        info!(
            run_id = %summary.run_id,
            ticks_run = summary.ticks_run,
            agents_alive = summary.agents_alive,
            events = summary.bus.total_events,
            dispatch_errors = summary.bus.dispatch_errors,
            "Simulation ended"
        );
        Ok(summary)
    }

    /// Statistics of every component, keyed by name.
    pub fn reports(&self) -> BTreeMap<&'static str, serde_json::Value> {
        self.components
            .iter()
            .map(|c| (c.name(), c.report()))
            .collect()
    }

    /// Snapshot of the run so far.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::Clock`] if the current date is out of range.
    pub fn summary(&self) -> Result<RunSummary, ModelError> {
        let totals = self.population.patches.totals();
        let state_totals = DiseaseState::ALL
            .into_iter()
            .zip(totals)
            .collect::<BTreeMap<_, _>>();
        Ok(RunSummary {
            run_id: self.run_id,
            scenario: self.config.model.name.clone(),
            ticks_run: self.clock.tick(),
            start_date: self.config.model.start_date,
            end_date: self.clock.current_date()?,
            agents_alive: living(&self.population),
            state_totals,
            patch_populations: self.population.patches.populations(),
            bus: self.bus.stats(),
            components: self.reports(),
        })
    }
}

fn living(population: &Population) -> u64 {
    u64::try_from(population.people.count_active()).unwrap_or(u64::MAX)
}
