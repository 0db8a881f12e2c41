//! The immutable event record delivered to subscribers.

use measles_types::{
    BirthsDetails, DeathsDetails, EventKind, EventPayload, MaternalImmunityEndDetails,
    MaternalImmunityStartDetails, VaccinationDetails,
};
use serde::Serialize;

use crate::error::EmitError;

/// One occurrence in the simulation.
///
/// Fields are private: once built, an event is never mutated. Subscribers
/// receive it by shared reference.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Event {
    kind: EventKind,
    origin: &'static str,
    tick: u64,
    payload: EventPayload,
}

impl Event {
    /// Build an event, checking the payload's consistency first.
    ///
    /// # Errors
    ///
    /// Returns [`EmitError::MalformedPayload`] if [`EventPayload::validate`]
    /// rejects the payload.
    pub fn new(payload: EventPayload, tick: u64, origin: &'static str) -> Result<Self, EmitError> {
        let kind = payload.kind();
        payload
            .validate()
            .map_err(|reason| EmitError::MalformedPayload {
                kind,
                origin,
                reason,
            })?;
        Ok(Self {
            kind,
            origin,
            tick,
            payload,
        })
    }

    /// The event kind.
    pub const fn kind(&self) -> EventKind {
        self.kind
    }

    /// Name of the component that emitted the event. Diagnostics only.
    pub const fn origin(&self) -> &'static str {
        self.origin
    }

    /// The tick at which the event occurred.
    pub const fn tick(&self) -> u64 {
        self.tick
    }

    /// The kind-specific payload.
    pub const fn payload(&self) -> &EventPayload {
        &self.payload
    }

    /// The payload if this is a births event.
    pub const fn births(&self) -> Option<&BirthsDetails> {
        match &self.payload {
            EventPayload::Births(d) => Some(d),
            _ => None,
        }
    }

    /// The payload if this is a deaths event.
    pub const fn deaths(&self) -> Option<&DeathsDetails> {
        match &self.payload {
            EventPayload::Deaths(d) => Some(d),
            _ => None,
        }
    }

    /// The payload if this is a vaccination event.
    pub const fn vaccination(&self) -> Option<&VaccinationDetails> {
        match &self.payload {
            EventPayload::Vaccination(d) => Some(d),
            _ => None,
        }
    }

    /// The payload if this is a maternal-immunity start event.
    pub const fn maternal_immunity_start(&self) -> Option<&MaternalImmunityStartDetails> {
        match &self.payload {
            EventPayload::MaternalImmunityStart(d) => Some(d),
            _ => None,
        }
    }

    /// The payload if this is a maternal-immunity end event.
    pub const fn maternal_immunity_end(&self) -> Option<&MaternalImmunityEndDetails> {
        match &self.payload {
            EventPayload::MaternalImmunityEnd(d) => Some(d),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use measles_types::AgentId;

    use super::*;

    #[test]
    fn kind_follows_payload() {
        let event = Event::new(
            EventPayload::MaternalImmunityStart(MaternalImmunityStartDetails {
                agent_ids: vec![AgentId(1), AgentId(2)],
                num_protected: 2,
            }),
            7,
            "test",
        );
        let event = event.ok();
        assert_eq!(event.as_ref().map(Event::kind), Some(EventKind::MaternalImmunityStart));
        assert_eq!(event.as_ref().map(Event::tick), Some(7));
        assert!(event.as_ref().and_then(Event::births).is_none());
        assert!(event.as_ref().and_then(Event::maternal_immunity_start).is_some());
    }

    #[test]
    fn malformed_payload_is_rejected_with_origin() {
        let result = Event::new(
            EventPayload::MaternalImmunityEnd(MaternalImmunityEndDetails {
                agent_ids: vec![AgentId(1)],
                num_expired: 3,
                agents_still_protected: 0,
            }),
            0,
            "maternal_immunity",
        );
        assert!(matches!(
            result,
            Err(EmitError::MalformedPayload {
                kind: EventKind::MaternalImmunityEnd,
                origin: "maternal_immunity",
                ..
            })
        ));
    }
}
