//! Error types for the measles-components crate.
//!
//! Parameter problems are caught when a component is constructed, before
//! the run starts. A running component fails only on a defect in itself:
//! a malformed emission, or its state being re-entered mid-update.

use measles_events::EmitError;

/// Errors that can occur while building or running a component.
#[derive(Debug, thiserror::Error)]
pub enum ComponentError {
    /// A parameter is outside its valid range.
    #[error("invalid {component} parameter `{field}`: {reason}")]
    InvalidParams {
        /// The component being configured.
        component: &'static str,
        /// The offending field.
        field: &'static str,
        /// Why the value was rejected.
        reason: String,
    },

    /// An event could not be emitted.
    #[error("emit error: {source}")]
    Emit {
        /// The underlying emission error.
        #[from]
        source: EmitError,
    },

    /// The component's state was already borrowed by one of its own
    /// event handlers.
    #[error("{component} re-entered while handling an event")]
    Reentrant {
        /// The re-entered component.
        component: &'static str,
    },

    /// The population store cannot grow any further.
    #[error("population capacity exhausted: {context}")]
    CapacityExhausted {
        /// What was being added.
        context: String,
    },
}
