//! Read-only snapshots of bus activity.

use std::collections::BTreeMap;

use measles_types::EventKind;
use serde::Serialize;

/// Diagnostic record of one failed subscriber invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DispatchFault {
    /// Kind of the event being delivered.
    pub kind: EventKind,
    /// Tick of the event.
    pub tick: u64,
    /// Component that emitted the event.
    pub origin: &'static str,
    /// Position of the failing handler in the kind's subscriber list.
    pub subscriber_index: usize,
    /// Rendered error message.
    pub message: String,
}

/// Snapshot of the bus counters, as returned by
/// [`EventBus::stats`](crate::EventBus::stats).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BusStats {
    /// Events emitted, per kind.
    pub events_emitted: BTreeMap<EventKind, u64>,
    /// Sum of `events_emitted`.
    pub total_events: u64,
    /// Handler invocations across all events.
    pub subscriber_invocations: u64,
    /// Handler invocations that returned an error.
    pub dispatch_errors: u64,
    /// Current number of handlers, per kind.
    pub subscribers_by_kind: BTreeMap<EventKind, usize>,
    /// Sum of `subscribers_by_kind`.
    pub total_subscribers: usize,
    /// The most recent dispatch faults, oldest first.
    pub recent_faults: Vec<DispatchFault>,
}

impl BusStats {
    /// Number of events of `kind` emitted so far.
    pub fn emitted(&self, kind: EventKind) -> u64 {
        self.events_emitted.get(&kind).copied().unwrap_or(0)
    }
}
