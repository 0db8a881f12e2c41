//! Constant-rate births and deaths.
//!
//! Each tick, deaths are drawn first over the whole living population,
//! then births per patch. Both draws are Poisson with per-tick rates
//! derived from crude annual rates:
//!
//! - `mu = 1 - (1 - cdr/1000)^(dt/365)`
//! - `lambda = (1 + cbr/1000)^(dt/365) - 1`
//!
//! The process emits one `deaths` event and one `births` event per tick
//! when the respective count is positive. Every other component learns
//! about newborns and removals through those events.

use std::rc::Rc;

use measles_events::{EventBus, EventEmitter};
use measles_types::{AgentId, BirthsDetails, DeathsDetails, EventPayload, PatchId};
use rand::SeedableRng;
use rand::rngs::SmallRng;
use rand_distr::{Distribution, Exp, Poisson};
use serde::Serialize;
use tracing::debug;

use crate::component::Component;
use crate::config::VitalDynamicsParams;
use crate::error::ComponentError;
use crate::population::{NewAgent, Population, count_to_f64};

/// Component name, used as the event origin.
pub const NAME: &str = "vital_dynamics";

const DAYS_PER_YEAR: f64 = 365.0;

/// Running totals kept by [`VitalDynamicsProcess`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct VitalDynamicsStats {
    /// Agents added over the run.
    pub total_births: u64,
    /// Agents removed over the run.
    pub total_deaths: u64,
    /// Per-tick mortality probability.
    pub death_rate: f64,
    /// Per-tick birth rate.
    pub birth_rate: f64,
}

/// Births and deaths at constant crude rates.
#[derive(Debug)]
pub struct VitalDynamicsProcess {
    params: VitalDynamicsParams,
    mu_death: f64,
    lambda_birth: f64,
    rng: SmallRng,
    emitter: EventEmitter,
    stats: VitalDynamicsStats,
}

impl VitalDynamicsProcess {
    /// Build the process for a model stepping `time_step_days` per tick.
    ///
    /// # Errors
    ///
    /// Returns [`ComponentError::InvalidParams`] if a rate is out of range
    /// or `time_step_days` is zero.
    pub fn new(
        params: VitalDynamicsParams,
        time_step_days: u32,
        seed: u64,
    ) -> Result<Self, ComponentError> {
        params.validate()?;
        if time_step_days == 0 {
            return Err(ComponentError::InvalidParams {
                component: NAME,
                field: "time_step_days",
                reason: "must be at least one day".to_owned(),
            });
        }
        let years_per_tick = f64::from(time_step_days) / DAYS_PER_YEAR;
        let mu_death = 1.0 - (1.0 - params.crude_death_rate / 1000.0).powf(years_per_tick);
        let lambda_birth = (1.0 + params.crude_birth_rate / 1000.0).powf(years_per_tick) - 1.0;
        Ok(Self {
            params,
            mu_death,
            lambda_birth,
            rng: SmallRng::seed_from_u64(seed),
            emitter: EventEmitter::new(NAME),
            stats: VitalDynamicsStats {
                death_rate: mu_death,
                birth_rate: lambda_birth,
                ..VitalDynamicsStats::default()
            },
        })
    }

    /// The configured parameters.
    pub const fn params(&self) -> &VitalDynamicsParams {
        &self.params
    }

    /// Per-tick mortality probability.
    pub const fn mu_death(&self) -> f64 {
        self.mu_death
    }

    /// Per-tick birth rate.
    pub const fn lambda_birth(&self) -> f64 {
        self.lambda_birth
    }

    /// Running totals.
    pub const fn stats(&self) -> VitalDynamicsStats {
        self.stats
    }

    fn draw_poisson(&mut self, mean: f64) -> u64 {
        if mean.is_nan() || mean <= 0.0 {
            return 0;
        }
        Poisson::new(mean).map_or(0, |poisson| whole_count(poisson.sample(&mut self.rng)))
    }

    fn apply_deaths(&mut self, population: &mut Population, tick: u64) -> Result<(), ComponentError> {
        let alive = population.people.active_ids();
        let expected = count_to_f64(alive.len()) * self.mu_death;
        let drawn = usize::try_from(self.draw_poisson(expected)).unwrap_or(usize::MAX);
        let count = drawn.min(alive.len());
        if count == 0 {
            return Ok(());
        }

        let mut picked = rand::seq::index::sample(&mut self.rng, alive.len(), count).into_vec();
        picked.sort_unstable();

        let mut details = DeathsDetails {
            agent_ids: Vec::with_capacity(count),
            patch_ids: Vec::with_capacity(count),
            states: Vec::with_capacity(count),
            num_deaths: 0,
            death_rate: self.mu_death,
        };
        for id in picked.into_iter().filter_map(|i| alive.get(i).copied()) {
            if let Some((patch, state)) = population.remove_agent(id) {
                details.agent_ids.push(id);
                details.patch_ids.push(patch);
                details.states.push(state);
            }
        }
        details.num_deaths = checked_count(details.agent_ids.len(), "deaths")?;
        self.stats.total_deaths = self
            .stats
            .total_deaths
            .saturating_add(u64::from(details.num_deaths));

        debug!(tick, deaths = details.num_deaths, "applied deaths");
        self.emitter.emit_event(EventPayload::Deaths(details), tick)?;
        Ok(())
    }

    fn apply_births(&mut self, population: &mut Population, tick: u64) -> Result<(), ComponentError> {
        if self.lambda_birth <= 0.0 {
            return Ok(());
        }
        let populations = population.patches.populations();
        let mut agent_ids: Vec<AgentId> = Vec::new();
        let mut patch_births: Vec<u32> = Vec::with_capacity(populations.len());

        for (index, living) in populations.into_iter().enumerate() {
            let births = self.draw_poisson(count_to_f64(living) * self.lambda_birth);
            let births = u32::try_from(births).map_err(|_overflow| ComponentError::CapacityExhausted {
                context: format!("{births} births in patch {index}"),
            })?;
            patch_births.push(births);
            if births == 0 {
                continue;
            }
            let patch = PatchId::from_index(index).ok_or_else(|| ComponentError::CapacityExhausted {
                context: format!("patch {index}"),
            })?;
            for _ in 0..births {
                agent_ids.push(population.add_agent(NewAgent::newborn(patch, tick))?);
            }
        }

        if agent_ids.is_empty() {
            return Ok(());
        }
        let total_births = checked_count(agent_ids.len(), "births")?;
        self.stats.total_births = self.stats.total_births.saturating_add(u64::from(total_births));

        debug!(tick, births = total_births, "applied births");
        self.emitter.emit_event(
            EventPayload::Births(BirthsDetails {
                agent_ids,
                patch_births,
                total_births,
                birth_rate: self.lambda_birth,
            }),
            tick,
        )?;
        Ok(())
    }
}

impl Component for VitalDynamicsProcess {
    fn name(&self) -> &'static str {
        NAME
    }

    fn setup(&mut self, bus: &Rc<EventBus>) {
        self.emitter.attach(bus);
    }

    /// Assign pre-run ages to the seeded population.
    ///
    /// With births balancing deaths, ages are exponential with mean
    /// `1 / mu`, so each agent's birth tick is minus one such draw.
    fn initialize(&mut self, population: &mut Population) -> Result<(), ComponentError> {
        if self.mu_death <= 0.0 {
            return Ok(());
        }
        let ages = Exp::new(self.mu_death).map_err(|e| ComponentError::InvalidParams {
            component: NAME,
            field: "crude_death_rate",
            reason: e.to_string(),
        })?;
        for id in population.people.active_ids() {
            let age = whole_count(ages.sample(&mut self.rng));
            let born = i64::try_from(age)
                .ok()
                .and_then(i64::checked_neg)
                .unwrap_or(i64::MIN);
            population.people.set_date_of_birth(id, born);
        }
        Ok(())
    }

    fn step(&mut self, population: &mut Population, tick: u64) -> Result<(), ComponentError> {
        self.apply_deaths(population, tick)?;
        self.apply_births(population, tick)
    }

    fn report(&self) -> serde_json::Value {
        serde_json::to_value(self.stats).unwrap_or_default()
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn whole_count(draw: f64) -> u64 {
    if draw.is_finite() && draw > 0.0 {
        draw as u64
    } else {
        0
    }
}

fn checked_count(len: usize, what: &str) -> Result<u32, ComponentError> {
    u32::try_from(len).map_err(|_overflow| ComponentError::CapacityExhausted {
        context: format!("{len} {what} in one tick"),
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::cell::RefCell;

    use measles_events::Event;
    use measles_types::{DiseaseState, EventKind};

    use super::*;

    fn process(cbr: f64, cdr: f64, seed: u64) -> VitalDynamicsProcess {
        let params = VitalDynamicsParams {
            crude_birth_rate: cbr,
            crude_death_rate: cdr,
        };
        VitalDynamicsProcess::new(params, 1, seed).unwrap()
    }

    fn record(bus: &Rc<EventBus>, kind: EventKind) -> Rc<RefCell<Vec<Event>>> {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        bus.subscribe(kind, move |event| {
            sink.borrow_mut().push(event.clone());
            Ok(())
        });
        seen
    }

    #[test]
    fn per_tick_rates_follow_crude_rates() {
        let vd = process(20.0, 8.0, 1);
        let mu = 1.0 - 0.992_f64.powf(1.0 / 365.0);
        let lambda = 1.02_f64.powf(1.0 / 365.0) - 1.0;
        assert!((vd.mu_death() - mu).abs() < 1e-15);
        assert!((vd.lambda_birth() - lambda).abs() < 1e-15);

        let weekly = VitalDynamicsProcess::new(VitalDynamicsParams::default(), 7, 1).unwrap();
        assert!(weekly.mu_death() > vd.mu_death());
    }

    #[test]
    fn zero_time_step_is_rejected() {
        assert!(VitalDynamicsProcess::new(VitalDynamicsParams::default(), 0, 1).is_err());
    }

    #[test]
    fn zero_rates_change_nothing_and_emit_nothing() {
        let bus = EventBus::shared();
        let mut vd = process(0.0, 0.0, 3);
        vd.setup(&bus);
        let mut population = Population::from_patch_sizes(&[100, 100]).unwrap();
        for tick in 0..30 {
            vd.step(&mut population, tick).unwrap();
        }
        assert_eq!(population.people.count_active(), 200);
        assert_eq!(bus.stats().total_events, 0);
    }

    #[test]
    fn births_are_reported_per_patch() {
        let bus = EventBus::shared();
        let births = record(&bus, EventKind::Births);
        let mut vd = process(500.0, 0.0, 11);
        vd.setup(&bus);
        let mut population = Population::from_patch_sizes(&[2000, 1000]).unwrap();

        for tick in 0..10 {
            vd.step(&mut population, tick).unwrap();
        }

        let events = births.borrow();
        assert!(!events.is_empty());
        let mut added = 0_usize;
        for event in events.iter() {
            let d = event.births().unwrap();
            assert_eq!(d.patch_births.len(), 2);
            for (offset, id) in d.agent_ids.iter().enumerate() {
                let first_patch = usize::try_from(d.patch_births[0]).unwrap();
                let expected = if offset < first_patch { PatchId(0) } else { PatchId(1) };
                assert_eq!(population.people.patch(*id), Some(expected));
                assert_eq!(population.people.date_of_birth(*id), Some(i64::try_from(event.tick()).unwrap()));
                assert_eq!(population.people.susceptibility(*id), Some(1.0));
            }
            added += d.agent_ids.len();
        }
        assert_eq!(population.people.count_active(), 3000 + added);
        assert_eq!(vd.stats().total_births, u64::try_from(added).unwrap());
    }

    #[test]
    fn deaths_report_patch_and_state_of_each_agent() {
        let bus = EventBus::shared();
        let deaths = record(&bus, EventKind::Deaths);
        let mut vd = process(0.0, 400.0, 5);
        vd.setup(&bus);
        let mut population = Population::from_patch_sizes(&[500, 500]).unwrap();
        population.transition(AgentId(0), DiseaseState::Recovered);

        for tick in 0..20 {
            vd.step(&mut population, tick).unwrap();
        }

        let events = deaths.borrow();
        assert!(!events.is_empty());
        let mut removed = 0_usize;
        for event in events.iter() {
            let d = event.deaths().unwrap();
            for ((id, patch), state) in d.agent_ids.iter().zip(&d.patch_ids).zip(&d.states) {
                assert!(!population.people.is_alive(*id));
                assert_eq!(population.people.patch(*id), Some(*patch));
                assert_eq!(population.people.state(*id), Some(*state));
            }
            removed += d.agent_ids.len();
        }
        let living: u64 = population.patches.populations().iter().sum();
        assert_eq!(population.people.count_active(), 1000 - removed);
        assert_eq!(living, u64::try_from(1000 - removed).unwrap());
    }

    #[test]
    fn initialization_assigns_pre_run_ages() {
        let mut vd = process(20.0, 8.0, 9);
        let mut population = Population::from_patch_sizes(&[50]).unwrap();
        vd.initialize(&mut population).unwrap();
        let ids = population.people.active_ids();
        assert!(ids.iter().all(|id| population.people.date_of_birth(*id).unwrap() <= 0));
        assert!(ids.iter().any(|id| population.people.date_of_birth(*id).unwrap() < 0));
    }

    #[test]
    fn same_seed_same_trajectory() {
        let run = |seed| {
            let mut vd = process(30.0, 10.0, seed);
            let mut population = Population::from_patch_sizes(&[1000]).unwrap();
            for tick in 0..50 {
                vd.step(&mut population, tick).unwrap();
            }
            (vd.stats().total_births, vd.stats().total_deaths)
        };
        assert_eq!(run(17), run(17));
    }
}
