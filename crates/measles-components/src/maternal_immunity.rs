//! Maternal antibody protection for newborns.
//!
//! Newborns selected by coverage are protected on the tick they are born
//! (susceptibility forced to 0) and become fully susceptible again after a
//! drawn protection duration. Protection is applied in [`step`], not in
//! the births handler, so it always lands after the birth process has
//! finished initialising the newborns.
//!
//! The component tracks which agents it currently protects:
//!
//! - a `deaths` event removes the dead from the protected set, and their
//!   pending expiry is later dropped as stale;
//! - a `vaccination` event removes every agent the dose protected, so the
//!   waning of maternal antibodies never undoes a successful vaccination.
//!
//! [`step`]: Component::step

use std::cell::RefCell;
use std::collections::BTreeSet;
use std::rc::{Rc, Weak};

use measles_events::{Event, EventBus, EventEmitter, SubscriberError};
use measles_types::{
    AgentId, EventKind, EventPayload, MaternalImmunityEndDetails, MaternalImmunityStartDetails,
};
use rand::SeedableRng;
use rand::rngs::SmallRng;
use serde::Serialize;
use tracing::debug;

use crate::component::Component;
use crate::config::MaternalImmunityParams;
use crate::delay::{DelaySampler, DelaySchedule, select_by_coverage};
use crate::error::ComponentError;
use crate::population::{People, Population, add_count};

/// Component name, used as the event origin.
pub const NAME: &str = "maternal_immunity";

/// Running counters kept by [`MaternalImmunityProcess`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MaternalImmunityCounters {
    /// Newborns selected for protection.
    pub births_scheduled: u64,
    /// Newborns whose protection was applied.
    pub births_protected: u64,
    /// Protections that waned.
    pub immunity_expired: u64,
    /// Protected agents who died before waning.
    pub died_while_protected: u64,
    /// Protected agents whose antibodies were superseded by a vaccine dose.
    pub superseded_by_vaccination: u64,
    /// Scheduled entries dropped because the agent no longer qualified.
    pub skipped_stale: u64,
}

/// Statistics snapshot returned by [`MaternalImmunityProcess::stats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MaternalImmunityStats {
    /// Running counters.
    #[serde(flatten)]
    pub counters: MaternalImmunityCounters,
    /// Agents protected right now.
    pub agents_currently_protected: usize,
    /// Newborns waiting for protection to be applied.
    pub pending_protections: usize,
    /// Protections waiting to wane.
    pub pending_expirations: usize,
}

#[derive(Debug)]
struct Tracker {
    pending: DelaySchedule,
    expiry: DelaySchedule,
    protected: BTreeSet<AgentId>,
    sampler: DelaySampler,
    coverage: f64,
    rng: SmallRng,
    counters: MaternalImmunityCounters,
}

impl Tracker {
    fn schedule_newborns(&mut self, newborns: &[AgentId], tick: u64) {
        let selected = select_by_coverage(newborns, self.coverage, &mut self.rng);
        for agent in &selected {
            let duration = self.sampler.sample(&mut self.rng);
            self.expiry.insert(tick.saturating_add(duration), *agent);
        }
        add_count(&mut self.counters.births_scheduled, selected.len());
        debug!(tick, scheduled = selected.len(), "scheduled maternal immunity");
        self.pending.extend(tick, selected);
    }

    fn forget_dead(&mut self, dead: &[AgentId]) {
        let before = self.protected.len();
        for agent in dead {
            self.protected.remove(agent);
        }
        add_count(
            &mut self.counters.died_while_protected,
            before.saturating_sub(self.protected.len()),
        );
    }

    fn forget_vaccinated(&mut self, vaccinated: &[AgentId]) {
        let before = self.protected.len();
        for agent in vaccinated {
            self.protected.remove(agent);
        }
        add_count(
            &mut self.counters.superseded_by_vaccination,
            before.saturating_sub(self.protected.len()),
        );
    }

    fn apply_protection(
        &mut self,
        people: &mut People,
        tick: u64,
    ) -> Option<MaternalImmunityStartDetails> {
        let due = self.pending.take_due(tick);
        if due.is_empty() {
            return None;
        }
        let (valid, stale): (Vec<AgentId>, Vec<AgentId>) = due.into_iter().partition(|agent| {
            people.is_alive(*agent) && people.susceptibility(*agent).is_some_and(|s| s > 0.0)
        });
        add_count(&mut self.counters.skipped_stale, stale.len());
        if valid.is_empty() {
            return None;
        }
        for agent in &valid {
            people.set_susceptibility(*agent, 0.0);
            self.protected.insert(*agent);
        }
        add_count(&mut self.counters.births_protected, valid.len());
        debug!(tick, protected = valid.len(), "applied maternal immunity");
        Some(MaternalImmunityStartDetails {
            num_protected: u32::try_from(valid.len()).unwrap_or(u32::MAX),
            agent_ids: valid,
        })
    }

    fn expire_protection(
        &mut self,
        people: &mut People,
        tick: u64,
    ) -> Option<MaternalImmunityEndDetails> {
        let due = self.expiry.take_due(tick);
        if due.is_empty() {
            return None;
        }
        let (valid, stale): (Vec<AgentId>, Vec<AgentId>) = due.into_iter().partition(|agent| {
            self.protected.contains(agent)
                && people.is_alive(*agent)
                && people.susceptibility(*agent).is_some_and(|s| s <= 0.0)
        });
        add_count(&mut self.counters.skipped_stale, stale.len());
        if valid.is_empty() {
            return None;
        }
        for agent in &valid {
            people.set_susceptibility(*agent, 1.0);
            self.protected.remove(agent);
        }
        add_count(&mut self.counters.immunity_expired, valid.len());
        debug!(
            tick,
            expired = valid.len(),
            still_protected = self.protected.len(),
            "maternal immunity waned"
        );
        Some(MaternalImmunityEndDetails {
            num_expired: u32::try_from(valid.len()).unwrap_or(u32::MAX),
            agent_ids: valid,
            agents_still_protected: u64::try_from(self.protected.len()).unwrap_or(u64::MAX),
        })
    }
}

/// Maternal antibody protection with drawn durations.
#[derive(Debug)]
pub struct MaternalImmunityProcess {
    params: MaternalImmunityParams,
    state: Rc<RefCell<Tracker>>,
    emitter: EventEmitter,
}

impl MaternalImmunityProcess {
    /// Build the process.
    ///
    /// # Errors
    ///
    /// Returns [`ComponentError::InvalidParams`] if the parameters are out
    /// of range.
    pub fn new(params: MaternalImmunityParams, seed: u64) -> Result<Self, ComponentError> {
        params.validate()?;
        let sampler = DelaySampler::new(params.distribution, params.protection_duration_mean)?;
        let state = Tracker {
            pending: DelaySchedule::new(),
            expiry: DelaySchedule::new(),
            protected: BTreeSet::new(),
            sampler,
            coverage: params.coverage,
            rng: SmallRng::seed_from_u64(seed),
            counters: MaternalImmunityCounters::default(),
        };
        Ok(Self {
            params,
            state: Rc::new(RefCell::new(state)),
            emitter: EventEmitter::new(NAME),
        })
    }

    /// The configured parameters.
    pub const fn params(&self) -> &MaternalImmunityParams {
        &self.params
    }

    /// Whether `agent` is currently under maternal protection.
    pub fn is_protected(&self, agent: AgentId) -> bool {
        self.state.borrow().protected.contains(&agent)
    }

    /// Tick at which `agent`'s protection wanes, if scheduled.
    pub fn expiry_tick(&self, agent: AgentId) -> Option<u64> {
        self.state.borrow().expiry.due_tick(agent)
    }

    /// Statistics snapshot.
    pub fn stats(&self) -> MaternalImmunityStats {
        let state = self.state.borrow();
        MaternalImmunityStats {
            counters: state.counters,
            agents_currently_protected: state.protected.len(),
            pending_protections: state.pending.pending(),
            pending_expirations: state.expiry.pending(),
        }
    }

    fn on_event(state: &Weak<RefCell<Tracker>>, event: &Event) -> Result<(), SubscriberError> {
        let Some(state) = state.upgrade() else {
            return Ok(());
        };
        let mut state = state
            .try_borrow_mut()
            .map_err(|_borrowed| SubscriberError::Reentrant { subscriber: NAME })?;
        match event.payload() {
            EventPayload::Births(d) => state.schedule_newborns(&d.agent_ids, event.tick()),
            EventPayload::Deaths(d) => state.forget_dead(&d.agent_ids),
            EventPayload::Vaccination(d) => state.forget_vaccinated(&d.protected),
            EventPayload::MaternalImmunityStart(_) | EventPayload::MaternalImmunityEnd(_) => {
                return Err(SubscriberError::UnexpectedKind {
                    subscriber: NAME,
                    got: event.kind(),
                });
            }
        }
        Ok(())
    }

    fn borrow_state(&self) -> Result<std::cell::RefMut<'_, Tracker>, ComponentError> {
        self.state
            .try_borrow_mut()
            .map_err(|_borrowed| ComponentError::Reentrant { component: NAME })
    }
}

impl Component for MaternalImmunityProcess {
    fn name(&self) -> &'static str {
        NAME
    }

    fn setup(&mut self, bus: &Rc<EventBus>) {
        self.emitter.attach(bus);
        let state = Rc::downgrade(&self.state);
        self.emitter.subscribe_to_events(
            &[EventKind::Births, EventKind::Deaths, EventKind::Vaccination],
            move |event| Self::on_event(&state, event),
        );
    }

    fn teardown(&mut self) {
        self.emitter.unsubscribe_from_events();
    }

    fn step(&mut self, population: &mut Population, tick: u64) -> Result<(), ComponentError> {
        let started = self.borrow_state()?.apply_protection(&mut population.people, tick);
        if let Some(details) = started
            && self.emitter.has_subscribers(EventKind::MaternalImmunityStart)
        {
            self.emitter
                .emit_event(EventPayload::MaternalImmunityStart(details), tick)?;
        }

        let ended = self.borrow_state()?.expire_protection(&mut population.people, tick);
        if let Some(details) = ended
            && self.emitter.has_subscribers(EventKind::MaternalImmunityEnd)
        {
            self.emitter
                .emit_event(EventPayload::MaternalImmunityEnd(details), tick)?;
        }
        Ok(())
    }

    fn report(&self) -> serde_json::Value {
        serde_json::to_value(self.stats()).unwrap_or_default()
    }
}
