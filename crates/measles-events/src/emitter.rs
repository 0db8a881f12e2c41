//! Event capability embedded in components.
//!
//! An [`EventEmitter`] carries the component's name (used as the event
//! origin) and a non-owning handle to the model's bus. Until
//! [`attach`](EventEmitter::attach) is called, emission is a silent no-op,
//! so components work standalone in unit tests or in models that do not
//! run a bus at all.

use std::rc::{Rc, Weak};

use measles_types::{EventKind, EventPayload};
use tracing::warn;

use crate::bus::{EventBus, Handler, SubscriptionId};
use crate::error::{EmitError, SubscriberError};
use crate::event::Event;

/// A component's connection to the event bus.
#[derive(Debug, Clone)]
pub struct EventEmitter {
    origin: &'static str,
    bus: Option<Weak<EventBus>>,
    subscriptions: Vec<(EventKind, SubscriptionId)>,
}

impl EventEmitter {
    /// Create an unattached emitter for the component named `origin`.
    pub const fn new(origin: &'static str) -> Self {
        Self {
            origin,
            bus: None,
            subscriptions: Vec::new(),
        }
    }

    /// The component name stamped on emitted events.
    pub const fn origin(&self) -> &'static str {
        self.origin
    }

    /// Remember the bus. Called once from the component's setup hook.
    pub fn attach(&mut self, bus: &Rc<EventBus>) {
        self.bus = Some(Rc::downgrade(bus));
    }

    /// Forget the bus; later emissions become no-ops.
    pub fn detach(&mut self) {
        self.bus = None;
    }

    /// Whether a live bus is attached.
    pub fn is_attached(&self) -> bool {
        self.bus().is_some()
    }

    fn bus(&self) -> Option<Rc<EventBus>> {
        self.bus.as_ref().and_then(Weak::upgrade)
    }

    /// Emit `payload` at `tick` with this component as origin.
    ///
    /// Does nothing when no bus is attached (or the bus has been dropped).
    ///
    /// # Errors
    ///
    /// Propagates [`EmitError::MalformedPayload`] from the bus.
    pub fn emit_event(&self, payload: EventPayload, tick: u64) -> Result<(), EmitError> {
        match self.bus() {
            Some(bus) => bus.emit(payload, tick, self.origin),
            None => Ok(()),
        }
    }

    /// Subscribe one handler to each of `kinds`.
    ///
    /// The registrations are remembered so that
    /// [`unsubscribe_from_events`](Self::unsubscribe_from_events) can
    /// remove them later. Logs a warning and does nothing when no bus is
    /// attached.
    pub fn subscribe_to_events<F>(&mut self, kinds: &[EventKind], handler: F)
    where
        F: Fn(&Event) -> Result<(), SubscriberError> + 'static,
    {
        let Some(bus) = self.bus() else {
            warn!(component = self.origin, "no event bus attached, subscription skipped");
            return;
        };
        let handler: Handler = Rc::new(handler);
        for kind in kinds {
            let id = bus.subscribe_shared(*kind, Rc::clone(&handler));
            self.subscriptions.push((*kind, id));
        }
    }

    /// Registrations made through this emitter that are still live.
    pub fn subscriptions(&self) -> &[(EventKind, SubscriptionId)] {
        &self.subscriptions
    }

    /// Remove every registration made through this emitter.
    ///
    /// Other components' handlers are untouched. Returns how many
    /// registrations were removed from the bus.
    pub fn unsubscribe_from_events(&mut self) -> usize {
        let subscriptions = std::mem::take(&mut self.subscriptions);
        let Some(bus) = self.bus() else {
            return 0;
        };
        subscriptions
            .into_iter()
            .filter(|(kind, id)| bus.unsubscribe(*kind, *id))
            .count()
    }

    /// Whether anyone listens for `kind`. `false` when unattached.
    ///
    /// Lets a component skip building a payload nobody will read.
    pub fn has_subscribers(&self, kind: EventKind) -> bool {
        self.bus().is_some_and(|bus| bus.has_subscribers(kind))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::cell::{Cell, RefCell};

    use measles_types::{AgentId, MaternalImmunityStartDetails};

    use super::*;

    fn payload() -> EventPayload {
        EventPayload::MaternalImmunityStart(MaternalImmunityStartDetails {
            agent_ids: vec![AgentId(5)],
            num_protected: 1,
        })
    }

    #[test]
    fn unattached_emitter_is_a_no_op() {
        let mut emitter = EventEmitter::new("standalone");
        assert!(!emitter.is_attached());
        assert!(emitter.emit_event(payload(), 0).is_ok());
        assert!(!emitter.has_subscribers(EventKind::MaternalImmunityStart));
        emitter.subscribe_to_events(&[EventKind::Births], |_| Ok(()));
        assert!(emitter.subscriptions().is_empty());
        assert_eq!(emitter.unsubscribe_from_events(), 0);
    }

    #[test]
    fn attached_emitter_stamps_origin() {
        let bus = EventBus::shared();
        let mut emitter = EventEmitter::new("maternal_immunity");
        emitter.attach(&bus);

        let seen = Rc::new(Cell::new(None));
        let slot = Rc::clone(&seen);
        bus.subscribe(EventKind::MaternalImmunityStart, move |event| {
            slot.set(Some((event.origin(), event.tick())));
            Ok(())
        });

        assert!(emitter.has_subscribers(EventKind::MaternalImmunityStart));
        emitter.emit_event(payload(), 12).unwrap();
        assert_eq!(seen.get(), Some(("maternal_immunity", 12)));
    }

    #[test]
    fn one_handler_for_several_kinds() {
        let bus = EventBus::shared();
        let mut emitter = EventEmitter::new("tracker");
        emitter.attach(&bus);
        emitter.subscribe_to_events(&[EventKind::Births, EventKind::Deaths], |_| Ok(()));
        assert_eq!(bus.subscriber_count(EventKind::Births), 1);
        assert_eq!(bus.subscriber_count(EventKind::Deaths), 1);
        assert_eq!(bus.stats().total_subscribers, 2);
    }

    #[test]
    fn unsubscribing_one_emitter_leaves_others_in_order() {
        let bus = EventBus::shared();
        let order = Rc::new(RefCell::new(Vec::new()));
        let emitters: Vec<EventEmitter> = ["first", "leaving", "last"]
            .into_iter()
            .map(|name| {
                let mut emitter = EventEmitter::new(name);
                emitter.attach(&bus);
                let order = Rc::clone(&order);
                emitter.subscribe_to_events(&[EventKind::MaternalImmunityStart], move |_| {
                    order.borrow_mut().push(name);
                    Ok(())
                });
                emitter
            })
            .collect();

        let [first, mut leaving, _last]: [EventEmitter; 3] = emitters.try_into().unwrap();

        assert_eq!(leaving.subscriptions().len(), 1);
        assert_eq!(leaving.unsubscribe_from_events(), 1);
        assert!(leaving.subscriptions().is_empty());
        first.emit_event(payload(), 0).unwrap();
        assert_eq!(*order.borrow(), vec!["first", "last"]);
        assert_eq!(bus.subscriber_count(EventKind::MaternalImmunityStart), 2);
    }

    #[test]
    fn dropped_bus_degrades_to_no_op() {
        let bus = EventBus::shared();
        let mut emitter = EventEmitter::new("orphan");
        emitter.attach(&bus);
        drop(bus);
        assert!(!emitter.is_attached());
        assert!(emitter.emit_event(payload(), 1).is_ok());
    }
}
