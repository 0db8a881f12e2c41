//! Minimal reactor to `births` and `deaths` events.
//!
//! Shows the emitter path end to end: one `subscribe_to_events` call over
//! both kinds, a single handler that dispatches on the payload, and a
//! teardown that detaches only this component's handlers. The reactor
//! keeps the set of patches that saw a birth or a death, which is what a
//! component staging supplies or surveillance per patch would start from.

use std::cell::RefCell;
use std::collections::BTreeSet;
use std::rc::{Rc, Weak};

use measles_events::{Event, EventBus, EventEmitter, SubscriberError};
use measles_types::{EventKind, EventPayload, PatchId};
use serde::Serialize;
use tracing::debug;

use crate::component::Component;
use crate::error::ComponentError;
use crate::population::Population;

/// Component name.
pub const NAME: &str = "vital_reactor";

/// Serializable reaction counts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReactionSummary {
    /// Births events handled.
    pub birth_reactions: u64,
    /// Deaths events handled.
    pub death_reactions: u64,
    /// Patches with at least one birth.
    pub patches_with_births: BTreeSet<PatchId>,
    /// Patches with at least one death.
    pub patches_with_deaths: BTreeSet<PatchId>,
}

impl ReactionSummary {
    fn react(&mut self, event: &Event) -> Result<(), SubscriberError> {
        match event.payload() {
            EventPayload::Births(details) => {
                self.birth_reactions = self.birth_reactions.saturating_add(1);
                let patches = details
                    .patch_births
                    .iter()
                    .enumerate()
                    .filter(|(_, births)| **births > 0)
                    .filter_map(|(index, _)| PatchId::from_index(index));
                self.patches_with_births.extend(patches);
                debug!(
                    tick = event.tick(),
                    births = details.total_births,
                    reaction = self.birth_reactions,
                    "reacting to births"
                );
            }
            EventPayload::Deaths(details) => {
                self.death_reactions = self.death_reactions.saturating_add(1);
                self.patches_with_deaths.extend(details.patch_ids.iter().copied());
                debug!(
                    tick = event.tick(),
                    deaths = details.num_deaths,
                    reaction = self.death_reactions,
                    "reacting to deaths"
                );
            }
            _ => {
                return Err(SubscriberError::UnexpectedKind {
                    subscriber: NAME,
                    got: event.kind(),
                });
            }
        }
        Ok(())
    }
}

/// Reacts to births and deaths through a single subscription call.
#[derive(Debug)]
pub struct VitalEventReactor {
    summary: Rc<RefCell<ReactionSummary>>,
    emitter: EventEmitter,
}

impl Default for VitalEventReactor {
    fn default() -> Self {
        Self::new()
    }
}

impl VitalEventReactor {
    /// Build an unattached reactor.
    pub fn new() -> Self {
        Self {
            summary: Rc::new(RefCell::new(ReactionSummary::default())),
            emitter: EventEmitter::new(NAME),
        }
    }

    /// Reaction counts so far.
    pub fn summary(&self) -> ReactionSummary {
        self.summary.borrow().clone()
    }

    fn on_event(summary: &Weak<RefCell<ReactionSummary>>, event: &Event) -> Result<(), SubscriberError> {
        let Some(summary) = summary.upgrade() else {
            return Ok(());
        };
        let mut summary = summary
            .try_borrow_mut()
            .map_err(|_borrowed| SubscriberError::Reentrant { subscriber: NAME })?;
        summary.react(event)
    }
}

impl Component for VitalEventReactor {
    fn name(&self) -> &'static str {
        NAME
    }

    fn setup(&mut self, bus: &Rc<EventBus>) {
        self.emitter.attach(bus);
        let summary = Rc::downgrade(&self.summary);
        self.emitter
            .subscribe_to_events(&[EventKind::Births, EventKind::Deaths], move |event| {
                Self::on_event(&summary, event)
            });
    }

    fn teardown(&mut self) {
        let removed = self.emitter.unsubscribe_from_events();
        debug!(removed, "vital reactor detached");
    }

    fn step(&mut self, _population: &mut Population, _tick: u64) -> Result<(), ComponentError> {
        Ok(())
    }

    fn report(&self) -> serde_json::Value {
        serde_json::to_value(self.summary()).unwrap_or_default()
    }
}
