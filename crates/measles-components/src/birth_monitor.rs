//! Passive tracker of `births` events.

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::rc::{Rc, Weak};

use measles_events::{Event, EventBus, EventEmitter, SubscriberError};
use measles_types::{AgentId, EventKind, PatchId};
use serde::Serialize;
use tracing::debug;

use crate::component::Component;
use crate::config::BirthMonitorParams;
use crate::error::ComponentError;
use crate::population::Population;

/// Component name.
pub const NAME: &str = "birth_monitor";

/// Serializable birth statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BirthSummary {
    /// Births over the run.
    pub total_births: u64,
    /// Births per tick, for ticks with at least one birth event.
    pub births_by_tick: BTreeMap<u64, u64>,
    /// Births per patch; empty when location tracking is off.
    pub births_by_patch: BTreeMap<PatchId, u64>,
    /// Number of ticks with a births event.
    pub num_birth_events: usize,
    /// Newborns reported on the latest tick.
    pub recent_birth_count: usize,
}

#[derive(Debug, Default)]
struct Tally {
    summary: BirthSummary,
    recent: Vec<AgentId>,
    recent_tick: u64,
    all: BTreeSet<AgentId>,
}

impl Tally {
    fn record(&mut self, event: &Event, track_locations: bool) -> Result<(), SubscriberError> {
        let details = event.births().ok_or(SubscriberError::UnexpectedKind {
            subscriber: NAME,
            got: event.kind(),
        })?;
        let tick = event.tick();
        let total = u64::from(details.total_births);

        let by_tick = self.summary.births_by_tick.entry(tick).or_insert(0);
        *by_tick = by_tick.saturating_add(total);
        self.summary.num_birth_events = self.summary.births_by_tick.len();
        self.summary.total_births = self.summary.total_births.saturating_add(total);

        if track_locations {
            for (index, births) in details.patch_births.iter().enumerate() {
                let Some(patch) = PatchId::from_index(index) else {
                    continue;
                };
                if *births > 0 {
                    let slot = self.summary.births_by_patch.entry(patch).or_insert(0);
                    *slot = slot.saturating_add(u64::from(*births));
                }
            }
        }

        if self.recent_tick != tick {
            self.recent.clear();
            self.recent_tick = tick;
        }
        self.recent.extend_from_slice(&details.agent_ids);
        self.all.extend(details.agent_ids.iter().copied());
        debug!(tick, births = total, "births recorded");
        Ok(())
    }
}

/// Counts births by tick and patch, and remembers who was born.
#[derive(Debug)]
pub struct BirthMonitor {
    params: BirthMonitorParams,
    tally: Rc<RefCell<Tally>>,
    emitter: EventEmitter,
}

impl BirthMonitor {
    /// Build the tracker.
    pub fn new(params: BirthMonitorParams) -> Self {
        Self {
            params,
            tally: Rc::new(RefCell::new(Tally::default())),
            emitter: EventEmitter::new(NAME),
        }
    }

    /// Newborns reported on the latest tick with births.
    pub fn recent_births(&self) -> Vec<AgentId> {
        self.tally.borrow().recent.clone()
    }

    /// Every newborn seen during the run.
    pub fn all_births(&self) -> BTreeSet<AgentId> {
        self.tally.borrow().all.clone()
    }

    /// Statistics snapshot.
    pub fn summary(&self) -> BirthSummary {
        let tally = self.tally.borrow();
        BirthSummary {
            recent_birth_count: tally.recent.len(),
            ..tally.summary.clone()
        }
    }

    fn on_births(
        tally: &Weak<RefCell<Tally>>,
        track_locations: bool,
        event: &Event,
    ) -> Result<(), SubscriberError> {
        let Some(tally) = tally.upgrade() else {
            return Ok(());
        };
        let mut tally = tally
            .try_borrow_mut()
            .map_err(|_borrowed| SubscriberError::Reentrant { subscriber: NAME })?;
        tally.record(event, track_locations)
    }
}

impl Component for BirthMonitor {
    fn name(&self) -> &'static str {
        NAME
    }

    fn setup(&mut self, bus: &Rc<EventBus>) {
        self.emitter.attach(bus);
        let tally = Rc::downgrade(&self.tally);
        let track_locations = self.params.track_birth_locations;
        self.emitter.subscribe_to_events(&[EventKind::Births], move |event| {
            Self::on_births(&tally, track_locations, event)
        });
    }

    fn initialize(&mut self, _population: &mut Population) -> Result<(), ComponentError> {
        let mut tally = self
            .tally
            .try_borrow_mut()
            .map_err(|_borrowed| ComponentError::Reentrant { component: NAME })?;
        *tally = Tally::default();
        Ok(())
    }

    fn teardown(&mut self) {
        self.emitter.unsubscribe_from_events();
    }

    /// Forget the newborns of earlier ticks.
    fn step(&mut self, _population: &mut Population, tick: u64) -> Result<(), ComponentError> {
        let mut tally = self
            .tally
            .try_borrow_mut()
            .map_err(|_borrowed| ComponentError::Reentrant { component: NAME })?;
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
    use measles_types::{BirthsDetails, EventPayload};

    use super::*;

    fn births(ids: &[u32], patch_births: Vec<u32>) -> EventPayload {
        EventPayload::Births(BirthsDetails {
            agent_ids: ids.iter().copied().map(AgentId).collect(),
            total_births: patch_births.iter().sum(),
            patch_births,
            birth_rate: 0.001,
        })
    }

    fn attached(params: BirthMonitorParams) -> (Rc<EventBus>, BirthMonitor) {
        let bus = EventBus::shared();
        let mut monitor = BirthMonitor::new(params);
        monitor.setup(&bus);
        (bus, monitor)
    }

    #[test]
    fn births_are_tallied_by_tick_and_patch() {
        let (bus, monitor) = attached(BirthMonitorParams::default());
        bus.emit(births(&[5, 6, 7], vec![2, 0, 1]), 3, "test").unwrap();
        bus.emit(births(&[8], vec![0, 1, 0]), 4, "test").unwrap();

        let summary = monitor.summary();
        assert_eq!(summary.total_births, 4);
        assert_eq!(summary.num_birth_events, 2);
        assert_eq!(summary.births_by_tick.get(&3), Some(&3));
        assert_eq!(summary.births_by_patch.get(&PatchId(0)), Some(&2));
        assert_eq!(summary.births_by_patch.get(&PatchId(1)), Some(&1));
        assert_eq!(summary.births_by_patch.get(&PatchId(2)), Some(&1));
        assert_eq!(monitor.recent_births(), vec![AgentId(8)]);
        assert_eq!(monitor.all_births().len(), 4);
    }

    #[test]
    fn location_tracking_can_be_disabled() {
        let (bus, monitor) = attached(BirthMonitorParams {
            track_birth_locations: false,
        });
        bus.emit(births(&[0], vec![1]), 0, "test").unwrap();
        assert!(monitor.summary().births_by_patch.is_empty());
        assert_eq!(monitor.summary().total_births, 1);
    }

    #[test]
    fn teardown_stops_tallying_without_touching_other_listeners() {
        let (bus, mut monitor) = attached(BirthMonitorParams::default());
        let mut other = BirthMonitor::new(BirthMonitorParams::default());
        other.setup(&bus);
        bus.emit(births(&[1], vec![1]), 0, "test").unwrap();

        monitor.teardown();
        assert_eq!(bus.subscriber_count(EventKind::Births), 1);
        bus.emit(births(&[2], vec![1]), 1, "test").unwrap();
        assert_eq!(monitor.summary().total_births, 1);
        assert_eq!(other.summary().total_births, 2);
    }

    #[test]
    fn recent_births_survive_their_own_tick_only() {
        let (bus, mut monitor) = attached(BirthMonitorParams::default());
        let mut population = Population::with_patches(1);
        bus.emit(births(&[1, 2], vec![2]), 6, "test").unwrap();

        monitor.step(&mut population, 6).unwrap();
        assert_eq!(monitor.summary().recent_birth_count, 2);

        monitor.step(&mut population, 7).unwrap();
        assert!(monitor.recent_births().is_empty());
        assert_eq!(monitor.all_births().len(), 2);
    }

    #[test]
    fn unattached_monitor_sees_nothing() {
        let bus = EventBus::shared();
        let monitor = BirthMonitor::new(BirthMonitorParams::default());
        bus.emit(births(&[1], vec![1]), 0, "test").unwrap();
        assert_eq!(monitor.summary(), BirthSummary::default());
    }

    #[test]
    fn summary_serializes_patch_keys() {
        let (bus, monitor) = attached(BirthMonitorParams::default());
        bus.emit(births(&[1], vec![0, 1]), 2, "test").unwrap();
        let json = monitor.report();
        assert_eq!(json["births_by_patch"]["1"], 1);
        assert_eq!(json["births_by_tick"]["2"], 1);
    }
}
