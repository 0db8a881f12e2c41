//! Synchronous publish/subscribe for the measles ABM extensions.
//!
//! Components notify each other through a single in-process [`EventBus`]
//! owned by the model. Events are immutable records with a closed set of
//! kinds and typed payloads; delivery is synchronous, in registration
//! order, and isolated per subscriber.
//!
//! # Modules
//!
//! - [`bus`] -- The registry and dispatcher ([`EventBus`])
//! - [`emitter`] -- Per-component bus handle ([`EventEmitter`])
//! - [`error`] -- Subscriber faults and emission errors
//! - [`event`] -- The event record ([`Event`])
//! - [`stats`] -- Counter snapshots ([`BusStats`])

pub mod bus;
pub mod emitter;
pub mod error;
pub mod event;
pub mod stats;

pub use bus::{EventBus, Handler, MAX_RECENT_FAULTS, SubscriptionId};
pub use emitter::EventEmitter;
pub use error::{EmitError, SubscriberError};
pub use event::Event;
pub use stats::{BusStats, DispatchFault};
