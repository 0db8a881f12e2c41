//! Error types for the event bus.
//!
//! Two very different failures live here. A [`SubscriberError`] is a local,
//! recoverable fault raised by one handler: the bus counts it and keeps
//! dispatching. An [`EmitError`] is a defect in the emitting code and is
//! returned to the caller so it fails loudly.

use measles_types::EventKind;

/// A fault raised by a subscriber while handling an event.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SubscriberError {
    /// The subscriber's state was already borrowed further up the call stack
    /// (an event it emitted came back to it).
    #[error("{subscriber} is already handling an event")]
    Reentrant {
        /// Name of the re-entered subscriber.
        subscriber: &'static str,
    },

    /// The handler was delivered an event kind it does not handle.
    #[error("{subscriber} cannot handle {got} events")]
    UnexpectedKind {
        /// Name of the subscriber.
        subscriber: &'static str,
        /// The kind that was delivered.
        got: EventKind,
    },

    /// Any other handler failure.
    #[error("{subscriber} failed: {reason}")]
    Failed {
        /// Name of the subscriber.
        subscriber: &'static str,
        /// Description of the failure.
        reason: String,
    },

    /// The handler panicked. The bus caught the unwind.
    #[error("subscriber panicked: {message}")]
    Panicked {
        /// The panic message, when it was a string.
        message: String,
    },
}

/// Errors returned to the emitting component.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EmitError {
    /// The payload is internally inconsistent.
    #[error("malformed {kind} payload from {origin}: {reason}")]
    MalformedPayload {
        /// Kind of the rejected event.
        kind: EventKind,
        /// Component that tried to emit it.
        origin: &'static str,
        /// The violated consistency rule.
        reason: String,
    },
}
