//! MCV1 vaccination with per-agent delays.
//!
//! On every `births` event the process selects newborns by coverage, draws
//! a delay for each, and files them under `birth tick + delay`. When the
//! simulation reaches that tick the dose is given:
//!
//! 1. Entries whose agent is absent, dead, or no longer `Susceptible` are
//!    dropped and counted as stale.
//! 2. Each remaining agent passes the efficacy draw with probability
//!    `vaccination_efficacy`; those who pass get susceptibility 0.
//! 3. A `vaccination` event reports the protected and unprotected subsets.
//!
//! Disease state is never changed. Susceptibility is not checked either,
//! so a newborn still carrying maternal antibodies is vaccinated on
//! schedule.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use measles_events::{Event, EventBus, EventEmitter, SubscriberError};
use measles_types::{AgentId, DiseaseState, EventKind, EventPayload, VaccinationDetails, VaccineKind};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use tracing::debug;

use crate::component::Component;
use crate::config::Mcv1Params;
use crate::delay::{DelaySampler, DelaySchedule, select_by_coverage};
use crate::error::ComponentError;
use crate::population::{People, Population, add_count, count_to_f64};

/// Component name, used as the event origin.
pub const NAME: &str = "mcv1";

/// Running counters kept by [`Mcv1Process`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Mcv1Counters {
    /// Newborns filed for a dose.
    pub births_scheduled: u64,
    /// Doses given.
    pub vaccinations_completed: u64,
    /// Doses that conferred protection.
    pub agents_protected: u64,
    /// Doses that did not.
    pub agents_not_protected: u64,
    /// Scheduled entries dropped because the agent was gone or not susceptible.
    pub skipped_stale: u64,
}

/// Statistics snapshot returned by [`Mcv1Process::stats`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Mcv1Stats {
    /// Running counters.
    #[serde(flatten)]
    pub counters: Mcv1Counters,
    /// `agents_protected / vaccinations_completed`, 0 before the first dose.
    pub overall_protection_rate: f64,
    /// Newborns still waiting for their dose.
    pub pending_vaccinations: usize,
}

#[derive(Debug)]
struct Scheduler {
    schedule: DelaySchedule,
    sampler: DelaySampler,
    coverage: f64,
    rng: SmallRng,
    counters: Mcv1Counters,
}

impl Scheduler {
    fn schedule_newborns(&mut self, newborns: &[AgentId], tick: u64) {
        let selected = select_by_coverage(newborns, self.coverage, &mut self.rng);
        for agent in &selected {
            let delay = self.sampler.sample(&mut self.rng);
            self.schedule.insert(tick.saturating_add(delay), *agent);
        }
        add_count(&mut self.counters.births_scheduled, selected.len());
        debug!(tick, scheduled = selected.len(), newborns = newborns.len(), "scheduled MCV1 doses");
    }
}

fn eligible(people: &People, agent: AgentId) -> bool {
    people.is_alive(agent) && people.state(agent) == Some(DiseaseState::Susceptible)
}

/// Delayed MCV1 vaccination of newborns.
#[derive(Debug)]
pub struct Mcv1Process {
    params: Mcv1Params,
    state: Rc<RefCell<Scheduler>>,
    emitter: EventEmitter,
}

impl Mcv1Process {
    /// Build the process.
    ///
    /// # Errors
    ///
    /// Returns [`ComponentError::InvalidParams`] if the parameters are out
    /// of range.
    pub fn new(params: Mcv1Params, seed: u64) -> Result<Self, ComponentError> {
        params.validate()?;
        let sampler = DelaySampler::new(params.delay_distribution, params.vaccination_delay_mean)?;
        let state = Scheduler {
            schedule: DelaySchedule::new(),
            sampler,
            coverage: params.coverage,
            rng: SmallRng::seed_from_u64(seed),
            counters: Mcv1Counters::default(),
        };
        Ok(Self {
            params,
            state: Rc::new(RefCell::new(state)),
            emitter: EventEmitter::new(NAME),
        })
    }

    /// The configured parameters.
    pub const fn params(&self) -> &Mcv1Params {
        &self.params
    }

    /// Newborns still waiting for their dose.
    pub fn pending_vaccinations(&self) -> usize {
        self.state.borrow().schedule.pending()
    }

    /// Tick at which `agent` is due for its dose, if scheduled.
    pub fn scheduled_tick(&self, agent: AgentId) -> Option<u64> {
        self.state.borrow().schedule.due_tick(agent)
    }

    /// Statistics snapshot.
    pub fn stats(&self) -> Mcv1Stats {
        let state = self.state.borrow();
        let counters = state.counters;
        let overall_protection_rate = if counters.vaccinations_completed == 0 {
            0.0
        } else {
            count_to_f64(counters.agents_protected) / count_to_f64(counters.vaccinations_completed)
        };
        Mcv1Stats {
            counters,
            overall_protection_rate,
            pending_vaccinations: state.schedule.pending(),
        }
    }

    fn on_births(state: &Weak<RefCell<Scheduler>>, event: &Event) -> Result<(), SubscriberError> {
        let details = event.births().ok_or(SubscriberError::UnexpectedKind {
            subscriber: NAME,
            got: event.kind(),
        })?;
        let Some(state) = state.upgrade() else {
            return Ok(());
        };
        let mut state = state
            .try_borrow_mut()
            .map_err(|_borrowed| SubscriberError::Reentrant { subscriber: NAME })?;
        state.schedule_newborns(&details.agent_ids, event.tick());
        Ok(())
    }

    fn vaccinate_due(&self, people: &mut People, tick: u64) -> Result<Option<VaccinationDetails>, ComponentError> {
        let mut state = self
            .state
            .try_borrow_mut()
            .map_err(|_borrowed| ComponentError::Reentrant { component: NAME })?;
        let due = state.schedule.take_due(tick);
        if due.is_empty() {
            return Ok(None);
        }

        let (valid, stale): (Vec<AgentId>, Vec<AgentId>) =
            due.into_iter().partition(|agent| eligible(people, *agent));
        if !stale.is_empty() {
            debug!(tick, skipped = stale.len(), "dropped stale MCV1 entries");
            add_count(&mut state.counters.skipped_stale, stale.len());
        }
        if valid.is_empty() {
            return Ok(None);
        }

        let efficacy = self.params.vaccination_efficacy;
        let mut protected = Vec::new();
        let mut unprotected = Vec::new();
        for agent in &valid {
            if state.rng.random::<f64>() < efficacy {
                people.set_susceptibility(*agent, 0.0);
                protected.push(*agent);
            } else {
                unprotected.push(*agent);
            }
        }

        add_count(&mut state.counters.vaccinations_completed, valid.len());
        add_count(&mut state.counters.agents_protected, protected.len());
        add_count(&mut state.counters.agents_not_protected, unprotected.len());
        debug!(
            tick,
            vaccinated = valid.len(),
            protected = protected.len(),
            "administered MCV1"
        );

        let efficacy_achieved = count_to_f64(protected.len()) / count_to_f64(valid.len());
        Ok(Some(VaccinationDetails {
            vaccine: VaccineKind::Mcv1,
            agent_ids: valid,
            protected,
            unprotected,
            efficacy_achieved,
        }))
    }
}

impl Component for Mcv1Process {
    fn name(&self) -> &'static str {
        NAME
    }

    fn setup(&mut self, bus: &Rc<EventBus>) {
        self.emitter.attach(bus);
        let state = Rc::downgrade(&self.state);
        self.emitter
            .subscribe_to_events(&[EventKind::Births], move |event| Self::on_births(&state, event));
    }

    fn teardown(&mut self) {
        self.emitter.unsubscribe_from_events();
    }

    fn step(&mut self, population: &mut Population, tick: u64) -> Result<(), ComponentError> {
        let Some(details) = self.vaccinate_due(&mut population.people, tick)? else {
            return Ok(());
        };
        if self.emitter.has_subscribers(EventKind::Vaccination) {
            self.emitter
                .emit_event(EventPayload::Vaccination(details), tick)?;
        }
        Ok(())
    }

    fn report(&self) -> serde_json::Value {
        serde_json::to_value(self.stats()).unwrap_or_default()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use measles_types::BirthsDetails;

    use super::*;
    use crate::config::DelayDistribution;

    fn params(delay: f64, efficacy: f64, coverage: f64) -> Mcv1Params {
        Mcv1Params {
            vaccination_delay_mean: delay,
            vaccination_efficacy: efficacy,
            coverage,
            delay_distribution: DelayDistribution::Fixed,
        }
    }

    fn births(ids: &[u32]) -> EventPayload {
        let n = u32::try_from(ids.len()).unwrap();
        EventPayload::Births(BirthsDetails {
            agent_ids: ids.iter().copied().map(AgentId).collect(),
            patch_births: vec![n],
            total_births: n,
            birth_rate: 0.0,
        })
    }

    fn attached(params: Mcv1Params) -> (Rc<EventBus>, Mcv1Process) {
        let bus = EventBus::shared();
        let mut mcv1 = Mcv1Process::new(params, 42).unwrap();
        mcv1.setup(&bus);
        (bus, mcv1)
    }

    fn record_vaccinations(bus: &EventBus) -> Rc<RefCell<Vec<Event>>> {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        bus.subscribe(EventKind::Vaccination, move |event| {
            sink.borrow_mut().push(event.clone());
            Ok(())
        });
        seen
    }

    #[test]
    fn newborns_are_vaccinated_exactly_at_their_tick() {
        let (bus, mut mcv1) = attached(params(10.0, 1.0, 1.0));
        let seen = record_vaccinations(&bus);
        let mut population = Population::from_patch_sizes(&[13]).unwrap();

        bus.emit(births(&[10, 11, 12]), 5, "test").unwrap();
        for tick in 5..15 {
            mcv1.step(&mut population, tick).unwrap();
        }
        assert!(seen.borrow().is_empty());
        assert_eq!(population.people.susceptibility(AgentId(10)), Some(1.0));

        mcv1.step(&mut population, 15).unwrap();
        for id in [10, 11, 12] {
            assert_eq!(population.people.susceptibility(AgentId(id)), Some(0.0));
            assert_eq!(population.people.state(AgentId(id)), Some(DiseaseState::Susceptible));
        }
        let events = seen.borrow();
        assert_eq!(events.len(), 1);
        let details = events[0].vaccination().unwrap();
        assert_eq!(events[0].tick(), 15);
        assert_eq!(details.protected, vec![AgentId(10), AgentId(11), AgentId(12)]);
        assert!(details.unprotected.is_empty());
        assert!((details.efficacy_achieved - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn full_coverage_files_every_newborn_after_its_birth() {
        let (bus, mcv1) = attached(Mcv1Params {
            delay_distribution: DelayDistribution::Gamma,
            ..Mcv1Params::default()
        });

        let ids: Vec<u32> = (0..200).collect();
        bus.emit(births(&ids), 30, "test").unwrap();

        assert_eq!(mcv1.pending_vaccinations(), 200);
        assert_eq!(mcv1.stats().counters.births_scheduled, 200);
        for id in ids {
            assert!(mcv1.scheduled_tick(AgentId(id)).unwrap() > 30);
        }
    }

    #[test]
    fn zero_coverage_schedules_nothing_and_emits_nothing() {
        let (bus, mut mcv1) = attached(params(1.0, 1.0, 0.0));
        let seen = record_vaccinations(&bus);
        let mut population = Population::from_patch_sizes(&[10]).unwrap();

        bus.emit(births(&[0, 1, 2, 3]), 0, "test").unwrap();
        for tick in 0..5 {
            mcv1.step(&mut population, tick).unwrap();
        }
        assert_eq!(mcv1.pending_vaccinations(), 0);
        assert!(seen.borrow().is_empty());
        assert_eq!(mcv1.stats().counters.vaccinations_completed, 0);
    }

    #[test]
    fn half_coverage_schedules_half_and_leaves_the_rest_alone() {
        let (bus, mut mcv1) = attached(params(3.0, 1.0, 0.5));
        let seen = record_vaccinations(&bus);
        let mut population = Population::from_patch_sizes(&[10]).unwrap();
        let ids: Vec<u32> = (0..10).collect();

        bus.emit(births(&ids), 0, "test").unwrap();
        assert_eq!(mcv1.stats().counters.births_scheduled, 5);
        assert_eq!(mcv1.pending_vaccinations(), 5);
        let (chosen, skipped): (Vec<AgentId>, Vec<AgentId>) = ids
            .iter()
            .map(|id| AgentId(*id))
            .partition(|agent| mcv1.scheduled_tick(*agent).is_some());
        assert_eq!(chosen.len(), 5);
        assert!(chosen.iter().all(|agent| mcv1.scheduled_tick(*agent) == Some(3)));

        for tick in 0..=3 {
            mcv1.step(&mut population, tick).unwrap();
        }
        for agent in &chosen {
            assert_eq!(population.people.susceptibility(*agent), Some(0.0));
        }
        for agent in &skipped {
            assert_eq!(population.people.susceptibility(*agent), Some(1.0));
        }
        let events = seen.borrow();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].vaccination().unwrap().agent_ids, chosen);
    }

    #[test]
    fn dead_agents_are_dropped_as_stale() {
        let (bus, mut mcv1) = attached(params(3.0, 1.0, 1.0));
        let seen = record_vaccinations(&bus);
        let mut population = Population::from_patch_sizes(&[3]).unwrap();

        bus.emit(births(&[0, 1, 2]), 0, "test").unwrap();
        population.remove_agent(AgentId(1));
        mcv1.step(&mut population, 3).unwrap();

        let stats = mcv1.stats();
        assert_eq!(stats.counters.skipped_stale, 1);
        assert_eq!(stats.counters.vaccinations_completed, 2);
        assert_eq!(population.people.susceptibility(AgentId(1)), Some(1.0));
        let events = seen.borrow();
        assert_eq!(events[0].vaccination().unwrap().agent_ids, vec![AgentId(0), AgentId(2)]);
    }

    #[test]
    fn agents_no_longer_susceptible_are_skipped() {
        let (bus, mut mcv1) = attached(params(2.0, 1.0, 1.0));
        let mut population = Population::from_patch_sizes(&[2]).unwrap();

        bus.emit(births(&[0, 1]), 0, "test").unwrap();
        population.transition(AgentId(0), DiseaseState::Infectious);
        mcv1.step(&mut population, 2).unwrap();

        assert_eq!(mcv1.stats().counters.skipped_stale, 1);
        assert_eq!(population.people.susceptibility(AgentId(0)), Some(1.0));
        assert_eq!(population.people.susceptibility(AgentId(1)), Some(0.0));
    }

    #[test]
    fn maternally_protected_newborns_are_still_vaccinated() {
        let (bus, mut mcv1) = attached(params(1.0, 1.0, 1.0));
        let mut population = Population::from_patch_sizes(&[1]).unwrap();
        population.people.set_susceptibility(AgentId(0), 0.0);

        bus.emit(births(&[0]), 0, "test").unwrap();
        mcv1.step(&mut population, 1).unwrap();
        assert_eq!(mcv1.stats().counters.vaccinations_completed, 1);
    }

    #[test]
    fn failed_doses_leave_susceptibility_untouched() {
        let (bus, mut mcv1) = attached(params(1.0, 0.0, 1.0));
        let seen = record_vaccinations(&bus);
        let mut population = Population::from_patch_sizes(&[4]).unwrap();

        bus.emit(births(&[0, 1, 2, 3]), 0, "test").unwrap();
        mcv1.step(&mut population, 1).unwrap();

        assert!(population.people.active_ids().iter().all(|id| {
            population.people.susceptibility(*id) == Some(1.0)
        }));
        let stats = mcv1.stats();
        assert_eq!(stats.counters.agents_not_protected, 4);
        assert!(stats.overall_protection_rate.abs() < f64::EPSILON);
        let events = seen.borrow();
        let details = events[0].vaccination().unwrap();
        assert!(details.protected.is_empty());
        assert_eq!(details.unprotected.len(), 4);
    }

    #[test]
    fn missed_ticks_are_caught_up() {
        let (bus, mut mcv1) = attached(params(2.0, 1.0, 1.0));
        let mut population = Population::from_patch_sizes(&[2]).unwrap();
        bus.emit(births(&[0]), 0, "test").unwrap();
        bus.emit(births(&[1]), 1, "test").unwrap();

        mcv1.step(&mut population, 10).unwrap();
        assert_eq!(mcv1.pending_vaccinations(), 0);
        assert_eq!(mcv1.stats().counters.vaccinations_completed, 2);
    }

    #[test]
    fn no_event_without_subscribers() {
        let (bus, mut mcv1) = attached(params(1.0, 1.0, 1.0));
        let mut population = Population::from_patch_sizes(&[1]).unwrap();
        bus.emit(births(&[0]), 0, "test").unwrap();
        mcv1.step(&mut population, 1).unwrap();
        assert_eq!(bus.stats().emitted(EventKind::Vaccination), 0);
        assert_eq!(population.people.susceptibility(AgentId(0)), Some(0.0));
    }
}
