//! The per-tick component interface.
//!
//! The model owns a list of components and drives them in registration
//! order: [`setup`](Component::setup) once with the shared bus,
//! [`initialize`](Component::initialize) once before the first tick, then
//! [`step`](Component::step) once per tick. A component removed from the
//! model gets [`teardown`](Component::teardown) so that its handlers stop
//! receiving events.

use std::rc::Rc;

use measles_events::EventBus;

use crate::error::ComponentError;
use crate::population::Population;

/// A process or tracker run by the model every tick.
pub trait Component {
    /// Short name, used as the event origin and in logs.
    fn name(&self) -> &'static str;

    /// Receive the bus and register subscriptions.
    fn setup(&mut self, bus: &Rc<EventBus>);

    /// One-time preparation before the first tick.
    ///
    /// # Errors
    ///
    /// Component-specific; the default does nothing.
    fn initialize(&mut self, _population: &mut Population) -> Result<(), ComponentError> {
        Ok(())
    }

    /// Advance the component by one tick.
    ///
    /// # Errors
    ///
    /// Returns [`ComponentError`] if the component emits a malformed event
    /// or the population cannot grow.
    fn step(&mut self, population: &mut Population, tick: u64) -> Result<(), ComponentError>;

    /// Drop the subscriptions made in setup. The default does nothing.
    fn teardown(&mut self) {}

    /// Statistics snapshot for the end-of-run report.
    fn report(&self) -> serde_json::Value;
}
