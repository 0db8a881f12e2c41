//! Passive tracker of `deaths` events.

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::rc::{Rc, Weak};

use measles_events::{Event, EventBus, EventEmitter, SubscriberError};
use measles_types::{AgentId, DiseaseState, EventKind, PatchId};
use serde::Serialize;
use tracing::debug;

use crate::component::Component;
use crate::config::DeathMonitorParams;
use crate::error::ComponentError;
use crate::population::Population;

/// Component name.
pub const NAME: &str = "death_monitor";

/// Serializable death statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeathSummary {
    /// Deaths over the run.
    pub total_deaths: u64,
    /// Deaths per tick, for ticks with at least one deaths event.
    pub deaths_by_tick: BTreeMap<u64, u64>,
    /// Deaths per patch; empty when location tracking is off.
    pub deaths_by_patch: BTreeMap<PatchId, u64>,
    /// Deaths per disease state; empty when state tracking is off.
    pub deaths_by_state: BTreeMap<DiseaseState, u64>,
    /// Number of ticks with a deaths event.
    pub num_death_events: usize,
    /// Deaths reported on the latest tick.
    pub recent_death_count: usize,
}

#[derive(Debug, Clone, Copy)]
struct Tracking {
    locations: bool,
    states: bool,
}

#[derive(Debug, Default)]
struct Tally {
    summary: DeathSummary,
    recent: Vec<AgentId>,
    recent_tick: u64,
    all: BTreeSet<AgentId>,
}

fn bump<K: Ord>(map: &mut BTreeMap<K, u64>, key: K) {
    let slot = map.entry(key).or_insert(0);
    *slot = slot.saturating_add(1);
}

impl Tally {
    fn record(&mut self, event: &Event, tracking: Tracking) -> Result<(), SubscriberError> {
        let details = event.deaths().ok_or(SubscriberError::UnexpectedKind {
            subscriber: NAME,
            got: event.kind(),
        })?;
        let tick = event.tick();
        let total = u64::from(details.num_deaths);

        let by_tick = self.summary.deaths_by_tick.entry(tick).or_insert(0);
        *by_tick = by_tick.saturating_add(total);
        self.summary.num_death_events = self.summary.deaths_by_tick.len();
        self.summary.total_deaths = self.summary.total_deaths.saturating_add(total);

        if tracking.locations {
            for patch in &details.patch_ids {
                bump(&mut self.summary.deaths_by_patch, *patch);
            }
        }
        if tracking.states {
            for state in &details.states {
                bump(&mut self.summary.deaths_by_state, *state);
            }
        }

        if self.recent_tick != tick {
            self.recent.clear();
            self.recent_tick = tick;
        }
        self.recent.extend_from_slice(&details.agent_ids);
        self.all.extend(details.agent_ids.iter().copied());
        debug!(tick, deaths = total, "deaths recorded");
        Ok(())
    }
}

/// Counts deaths by tick, patch and disease state, and remembers who died.
#[derive(Debug)]
pub struct DeathMonitor {
    params: DeathMonitorParams,
    tally: Rc<RefCell<Tally>>,
    emitter: EventEmitter,
}

impl DeathMonitor {
    /// Build the tracker.
    pub fn new(params: DeathMonitorParams) -> Self {
        Self {
            params,
            tally: Rc::new(RefCell::new(Tally::default())),
            emitter: EventEmitter::new(NAME),
        }
    }

    /// Agents reported dead on the latest tick with deaths.
    pub fn recent_deaths(&self) -> Vec<AgentId> {
        self.tally.borrow().recent.clone()
    }

    /// Every agent reported dead during the run.
    pub fn all_deaths(&self) -> BTreeSet<AgentId> {
        self.tally.borrow().all.clone()
    }

    /// Statistics snapshot.
    pub fn summary(&self) -> DeathSummary {
        let tally = self.tally.borrow();
        DeathSummary {
            recent_death_count: tally.recent.len(),
            ..tally.summary.clone()
        }
    }

    fn on_deaths(
        tally: &Weak<RefCell<Tally>>,
        tracking: Tracking,
        event: &Event,
    ) -> Result<(), SubscriberError> {
        let Some(tally) = tally.upgrade() else {
            return Ok(());
        };
        let mut tally = tally
            .try_borrow_mut()
            .map_err(|_borrowed| SubscriberError::Reentrant { subscriber: NAME })?;
        tally.record(event, tracking)
    }

    fn tally_mut(&self) -> Result<std::cell::RefMut<'_, Tally>, ComponentError> {
        self.tally
            .try_borrow_mut()
            .map_err(|_borrowed| ComponentError::Reentrant { component: NAME })
    }
}

impl Component for DeathMonitor {
    fn name(&self) -> &'static str {
        NAME
    }

    fn setup(&mut self, bus: &Rc<EventBus>) {
        self.emitter.attach(bus);
        let tally = Rc::downgrade(&self.tally);
        let tracking = Tracking {
            locations: self.params.track_death_locations,
            states: self.params.track_death_states,
        };
        self.emitter.subscribe_to_events(&[EventKind::Deaths], move |event| {
            Self::on_deaths(&tally, tracking, event)
        });
    }

    fn initialize(&mut self, _population: &mut Population) -> Result<(), ComponentError> {
        *self.tally_mut()? = Tally::default();
        Ok(())
    }

    fn teardown(&mut self) {
        self.emitter.unsubscribe_from_events();
    }

    fn step(&mut self, _population: &mut Population, tick: u64) -> Result<(), ComponentError> {
        let mut tally = self.tally_mut()?;
        if tally.recent_tick < tick {
            tally.recent.clear();
        }
        Ok(())
    }

    fn report(&self) -> serde_json::Value {
        serde_json::to_value(self.summary()).unwrap_or_default()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use measles_types::{DeathsDetails, EventPayload};

    use super::*;

    fn deaths(entries: &[(u32, u32, DiseaseState)]) -> EventPayload {
        EventPayload::Deaths(DeathsDetails {
            agent_ids: entries.iter().map(|(id, _, _)| AgentId(*id)).collect(),
            patch_ids: entries.iter().map(|(_, patch, _)| PatchId(*patch)).collect(),
            states: entries.iter().map(|(_, _, state)| *state).collect(),
            num_deaths: u32::try_from(entries.len()).unwrap(),
            death_rate: 0.0001,
        })
    }

    fn attached(params: DeathMonitorParams) -> (Rc<EventBus>, DeathMonitor) {
        let bus = EventBus::shared();
        let mut monitor = DeathMonitor::new(params);
        monitor.setup(&bus);
        (bus, monitor)
    }

    #[test]
    fn deaths_are_tallied_by_patch_and_state() {
        let (bus, monitor) = attached(DeathMonitorParams::default());
        bus.emit(
            deaths(&[
                (1, 0, DiseaseState::Susceptible),
                (2, 1, DiseaseState::Recovered),
                (3, 1, DiseaseState::Susceptible),
            ]),
            8,
            "test",
        )
        .unwrap();

        let summary = monitor.summary();
        assert_eq!(summary.total_deaths, 3);
        assert_eq!(summary.deaths_by_tick.get(&8), Some(&3));
        assert_eq!(summary.deaths_by_patch.get(&PatchId(1)), Some(&2));
        assert_eq!(summary.deaths_by_state.get(&DiseaseState::Susceptible), Some(&2));
        assert_eq!(summary.deaths_by_state.get(&DiseaseState::Recovered), Some(&1));
        assert_eq!(summary.recent_death_count, 3);
    }

    #[test]
    fn tracking_switches_are_honoured() {
        let (bus, monitor) = attached(DeathMonitorParams {
            track_death_locations: false,
            track_death_states: false,
        });
        bus.emit(deaths(&[(4, 0, DiseaseState::Exposed)]), 1, "test").unwrap();
        let summary = monitor.summary();
        assert_eq!(summary.total_deaths, 1);
        assert!(summary.deaths_by_patch.is_empty());
        assert!(summary.deaths_by_state.is_empty());
    }

    #[test]
    fn all_deaths_accumulates_across_ticks() {
        let (bus, mut monitor) = attached(DeathMonitorParams::default());
        let mut population = Population::with_patches(1);
        bus.emit(deaths(&[(1, 0, DiseaseState::Susceptible)]), 1, "test").unwrap();
        monitor.step(&mut population, 1).unwrap();
        bus.emit(deaths(&[(2, 0, DiseaseState::Susceptible)]), 2, "test").unwrap();
        monitor.step(&mut population, 2).unwrap();

        assert_eq!(monitor.recent_deaths(), vec![AgentId(2)]);
        assert_eq!(
            monitor.all_deaths().into_iter().collect::<Vec<_>>(),
            vec![AgentId(1), AgentId(2)]
        );
        assert_eq!(monitor.summary().num_death_events, 2);

        monitor.step(&mut population, 3).unwrap();
        assert!(monitor.recent_deaths().is_empty());
    }

    #[test]
    fn initialize_resets_metrics() {
        let (bus, mut monitor) = attached(DeathMonitorParams::default());
        bus.emit(deaths(&[(1, 0, DiseaseState::Infectious)]), 0, "test").unwrap();
        monitor.initialize(&mut Population::with_patches(1)).unwrap();
        assert_eq!(monitor.summary(), DeathSummary::default());
    }

    #[test]
    fn summary_serializes_state_labels() {
        let (bus, monitor) = attached(DeathMonitorParams::default());
        bus.emit(deaths(&[(1, 0, DiseaseState::Infectious)]), 0, "test").unwrap();
        let json = monitor.report();
        assert_eq!(json["deaths_by_state"]["I"], 1);
    }
}
