//! The synchronous event bus.
//!
//! One [`EventBus`] is created per simulation run and owned by the model.
//! Components receive a reference to it at setup time, subscribe handlers
//! for the kinds they care about, and emit events while they run.
//!
//! # Dispatch rules
//!
//! - Delivery is inline: [`EventBus::emit`] returns only after every
//!   subscriber for the event's kind has been invoked.
//! - Subscribers run in registration order. Registering the same handler
//!   twice delivers the event twice.
//! - A handler may emit further events; those are delivered depth-first
//!   before control returns to the original emitter.
//! - The subscriber list is snapshotted when dispatch starts, so a handler
//!   subscribed during dispatch first sees the *next* event of that kind.
//! - A handler returning `Err` is counted and logged; the remaining
//!   subscribers still receive the event and `emit` still succeeds. A
//!   handler that panics is treated the same way, as long as the build
//!   unwinds on panic.
//! - Every subscription gets a [`SubscriptionId`]. Removing one with
//!   [`EventBus::unsubscribe`] leaves the order of the others unchanged.
//!
//! The bus is `!Send`: it uses `RefCell` for its registry and
//! counters and is meant for a single simulation thread.

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, VecDeque};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::rc::Rc;

use measles_types::{EventKind, EventPayload};
use tracing::{debug, warn};

use crate::error::{EmitError, SubscriberError};
use crate::event::Event;
use crate::stats::{BusStats, DispatchFault};

/// Number of dispatch faults retained for diagnostics.
pub const MAX_RECENT_FAULTS: usize = 32;

/// A subscriber callback.
///
/// Handlers receive the event by reference and report failure through
/// [`SubscriberError`]. Handlers that need mutable state keep it behind
/// `Rc<RefCell<_>>`.
pub type Handler = Rc<dyn Fn(&Event) -> Result<(), SubscriberError>>;

/// Handle of one registration, returned by [`EventBus::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    /// The raw registration number, unique per bus.
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl core::fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

#[derive(Debug, Default)]
struct Counters {
    events_emitted: BTreeMap<EventKind, u64>,
    subscriber_invocations: u64,
    dispatch_errors: u64,
    recent_faults: VecDeque<DispatchFault>,
}

/// Registry of subscribers keyed by event kind.
#[derive(Default)]
pub struct EventBus {
    subscribers: RefCell<BTreeMap<EventKind, Vec<(SubscriptionId, Handler)>>>,
    next_id: Cell<u64>,
    counters: RefCell<Counters>,
}

impl core::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers_by_kind", &self.subscriber_counts())
            .field("counters", &self.counters)
            .finish()
    }
}

impl EventBus {
    /// Create an empty bus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty bus behind an `Rc`, ready to hand out to components.
    pub fn shared() -> Rc<Self> {
        Rc::new(Self::new())
    }

    /// Register `handler` for every future event of `kind`.
    pub fn subscribe<F>(&self, kind: EventKind, handler: F) -> SubscriptionId
    where
        F: Fn(&Event) -> Result<(), SubscriberError> + 'static,
    {
        self.subscribe_shared(kind, Rc::new(handler))
    }

    /// Register an already shared handler, e.g. one used for several kinds.
    pub fn subscribe_shared(&self, kind: EventKind, handler: Handler) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.get());
        self.next_id.set(id.0.saturating_add(1));
        self.subscribers
            .borrow_mut()
            .entry(kind)
            .or_default()
            .push((id, handler));
        debug!(kind = %kind, subscription = %id, "subscriber registered");
        id
    }

    /// Remove the registration `id` from `kind`.
    ///
    /// Returns `false` if no such registration exists. An event already
    /// being dispatched still reaches the removed handler.
    pub fn unsubscribe(&self, kind: EventKind, id: SubscriptionId) -> bool {
        let mut subscribers = self.subscribers.borrow_mut();
        let Some(handlers) = subscribers.get_mut(&kind) else {
            return false;
        };
        let before = handlers.len();
        handlers.retain(|(registered, _)| *registered != id);
        let removed = handlers.len() < before;
        if handlers.is_empty() {
            subscribers.remove(&kind);
        }
        if removed {
            debug!(kind = %kind, subscription = %id, "subscriber removed");
        }
        removed
    }

    /// Drop every subscription. Counters are kept.
    pub fn clear_subscriptions(&self) {
        self.subscribers.borrow_mut().clear();
    }

    /// Whether at least one handler is registered for `kind`.
    pub fn has_subscribers(&self, kind: EventKind) -> bool {
        self.subscriber_count(kind) > 0
    }

    /// Number of handlers registered for `kind`.
    pub fn subscriber_count(&self, kind: EventKind) -> usize {
        self.subscribers.borrow().get(&kind).map_or(0, Vec::len)
    }

    /// Build an event from `payload` and deliver it to every subscriber.
    ///
    /// # Errors
    ///
    /// Returns [`EmitError::MalformedPayload`] if the payload is
    /// inconsistent. Nothing is counted or delivered in that case.
    /// Subscriber faults are never returned.
    pub fn emit(
        &self,
        payload: EventPayload,
        tick: u64,
        origin: &'static str,
    ) -> Result<(), EmitError> {
        let event = Event::new(payload, tick, origin)?;
        self.publish(&event);
        Ok(())
    }

    /// Deliver an already constructed event to every subscriber.
    pub fn publish(&self, event: &Event) {
        let kind = event.kind();
        {
            let mut counters = self.counters.borrow_mut();
            let emitted = counters.events_emitted.entry(kind).or_insert(0);
            *emitted = emitted.saturating_add(1);
        }

        // Snapshot so that handlers may subscribe or emit without holding
        // a borrow of the registry.
        let handlers: Vec<Handler> = self
            .subscribers
            .borrow()
            .get(&kind)
            .map(|registered| registered.iter().map(|(_, h)| Rc::clone(h)).collect())
            .unwrap_or_default();

        debug!(
            kind = %kind,
            tick = event.tick(),
            origin = event.origin(),
            subscribers = handlers.len(),
            "dispatching event"
        );

        for (index, handler) in handlers.iter().enumerate() {
            {
                let mut counters = self.counters.borrow_mut();
                counters.subscriber_invocations = counters.subscriber_invocations.saturating_add(1);
            }
            let outcome = catch_unwind(AssertUnwindSafe(|| handler(event)))
                .unwrap_or_else(|payload| {
                    Err(SubscriberError::Panicked {
                        message: panic_message(payload.as_ref()),
                    })
                });
            if let Err(err) = outcome {
                self.record_fault(event, index, &err);
            }
        }
    }

    fn record_fault(&self, event: &Event, subscriber_index: usize, err: &SubscriberError) {
        warn!(
            kind = %event.kind(),
            tick = event.tick(),
            origin = event.origin(),
            subscriber_index,
            error = %err,
            "event subscriber failed"
        );
        let mut counters = self.counters.borrow_mut();
        counters.dispatch_errors = counters.dispatch_errors.saturating_add(1);
        if counters.recent_faults.len() >= MAX_RECENT_FAULTS {
            counters.recent_faults.pop_front();
        }
        counters.recent_faults.push_back(DispatchFault {
            kind: event.kind(),
            tick: event.tick(),
            origin: event.origin(),
            subscriber_index,
            message: err.to_string(),
        });
    }

    fn subscriber_counts(&self) -> BTreeMap<EventKind, usize> {
        self.subscribers
            .borrow()
            .iter()
            .map(|(kind, handlers)| (*kind, handlers.len()))
            .collect()
    }

    /// Read-only snapshot of the bus counters.
    pub fn stats(&self) -> BusStats {
        let subscribers_by_kind = self.subscriber_counts();
        let total_subscribers = subscribers_by_kind.values().sum();
        let counters = self.counters.borrow();
        BusStats {
            total_events: counters
                .events_emitted
                .values()
                .fold(0_u64, |acc, n| acc.saturating_add(*n)),
            events_emitted: counters.events_emitted.clone(),
            subscriber_invocations: counters.subscriber_invocations,
            dispatch_errors: counters.dispatch_errors,
            subscribers_by_kind,
            total_subscribers,
            recent_faults: counters.recent_faults.iter().cloned().collect(),
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_owned())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_owned())
}
