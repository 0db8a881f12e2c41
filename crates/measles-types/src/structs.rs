//! Per-kind event payloads.
//!
//! Every [`EventKind`] carries exactly one of the detail structs below,
//! wrapped in [`EventPayload`]. The payload decides the kind, so an event
//! whose kind and payload disagree cannot be constructed.
//!
//! Payloads also know how to check their own internal consistency
//! ([`EventPayload::validate`]); the event bus runs that check before
//! dispatching anything.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::enums::{DiseaseState, EventKind, VaccineKind};
use crate::ids::{AgentId, PatchId};

/// Agents added to the population during one tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BirthsDetails {
    /// The newborn agents, in the order they were added.
    pub agent_ids: Vec<AgentId>,
    /// Number of births per patch, indexed by patch row.
    pub patch_births: Vec<u32>,
    /// Total births (sum of `patch_births`).
    pub total_births: u32,
    /// Per-tick birth rate used for the draw.
    pub birth_rate: f64,
}

/// Agents removed from the population during one tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeathsDetails {
    /// The agents who died.
    pub agent_ids: Vec<AgentId>,
    /// Patch of each agent, parallel to `agent_ids`.
    pub patch_ids: Vec<PatchId>,
    /// Disease state of each agent at death, parallel to `agent_ids`.
    pub states: Vec<DiseaseState>,
    /// Number of deaths (length of `agent_ids`).
    pub num_deaths: u32,
    /// Per-tick mortality rate used for the draw.
    pub death_rate: f64,
}

/// Outcome of the vaccinations administered at one tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VaccinationDetails {
    /// Which dose was given.
    pub vaccine: VaccineKind,
    /// Every agent who received a dose.
    pub agent_ids: Vec<AgentId>,
    /// Recipients for whom the dose conferred protection.
    pub protected: Vec<AgentId>,
    /// Recipients for whom it did not.
    pub unprotected: Vec<AgentId>,
    /// `protected / agent_ids` (0.0 when nobody was vaccinated).
    pub efficacy_achieved: f64,
}

/// Newborns whose maternal antibodies took effect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaternalImmunityStartDetails {
    /// The protected newborns.
    pub agent_ids: Vec<AgentId>,
    /// Number of protected newborns (length of `agent_ids`).
    pub num_protected: u32,
}

/// Agents whose maternal antibodies waned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaternalImmunityEndDetails {
    /// Agents that became susceptible again.
    pub agent_ids: Vec<AgentId>,
    /// Number of expirations (length of `agent_ids`).
    pub num_expired: u32,
    /// Agents still under maternal protection after this expiry.
    pub agents_still_protected: u64,
}

/// Kind-specific payload of an event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum EventPayload {
    /// See [`BirthsDetails`].
    Births(BirthsDetails),
    /// See [`DeathsDetails`].
    Deaths(DeathsDetails),
    /// See [`VaccinationDetails`].
    Vaccination(VaccinationDetails),
    /// See [`MaternalImmunityStartDetails`].
    MaternalImmunityStart(MaternalImmunityStartDetails),
    /// See [`MaternalImmunityEndDetails`].
    MaternalImmunityEnd(MaternalImmunityEndDetails),
}

impl EventPayload {
    /// The event kind this payload belongs to.
    pub const fn kind(&self) -> EventKind {
        match self {
            Self::Births(_) => EventKind::Births,
            Self::Deaths(_) => EventKind::Deaths,
            Self::Vaccination(_) => EventKind::Vaccination,
            Self::MaternalImmunityStart(_) => EventKind::MaternalImmunityStart,
            Self::MaternalImmunityEnd(_) => EventKind::MaternalImmunityEnd,
        }
    }

    /// The agents this payload refers to.
    pub fn agent_ids(&self) -> &[AgentId] {
        match self {
            Self::Births(d) => &d.agent_ids,
            Self::Deaths(d) => &d.agent_ids,
            Self::Vaccination(d) => &d.agent_ids,
            Self::MaternalImmunityStart(d) => &d.agent_ids,
            Self::MaternalImmunityEnd(d) => &d.agent_ids,
        }
    }

    /// Check the payload's internal consistency.
    ///
    /// Returns a description of the first violated rule, or `Ok(())`.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            Self::Births(d) => {
                let summed = d
                    .patch_births
                    .iter()
                    .try_fold(0_u32, |acc, n| acc.checked_add(*n))
                    .ok_or_else(|| "patch_births overflows u32".to_owned())?;
                expect_count("total_births", d.total_births, d.agent_ids.len())?;
                if summed != d.total_births {
                    return Err(format!(
                        "patch_births sums to {summed} but total_births is {}",
                        d.total_births
                    ));
                }
                expect_rate("birth_rate", d.birth_rate)
            }
            Self::Deaths(d) => {
                expect_count("num_deaths", d.num_deaths, d.agent_ids.len())?;
                expect_parallel("patch_ids", d.patch_ids.len(), d.agent_ids.len())?;
                expect_parallel("states", d.states.len(), d.agent_ids.len())?;
                expect_rate("death_rate", d.death_rate)
            }
            Self::Vaccination(d) => {
                let recipients = unique_ids("agent_ids", &d.agent_ids)?;
                let protected = unique_ids("protected", &d.protected)?;
                let unprotected = unique_ids("unprotected", &d.unprotected)?;
                if let Some(both) = protected.intersection(&unprotected).next() {
                    return Err(format!("agent {both} is both protected and unprotected"));
                }
                if let Some(stray) = protected
                    .union(&unprotected)
                    .find(|id| !recipients.contains(id))
                {
                    return Err(format!("agent {stray} is not among the vaccinated agents"));
                }
                if let Some(missing) = recipients
                    .iter()
                    .find(|id| !protected.contains(id) && !unprotected.contains(id))
                {
                    return Err(format!("agent {missing} is neither protected nor unprotected"));
                }
                if !(0.0..=1.0).contains(&d.efficacy_achieved) {
                    return Err(format!(
                        "efficacy_achieved must be within [0, 1], got {}",
                        d.efficacy_achieved
                    ));
                }
                Ok(())
            }
            Self::MaternalImmunityStart(d) => {
                expect_count("num_protected", d.num_protected, d.agent_ids.len())
            }
            Self::MaternalImmunityEnd(d) => {
                expect_count("num_expired", d.num_expired, d.agent_ids.len())
            }
        }
    }
}

fn unique_ids(field: &str, ids: &[AgentId]) -> Result<BTreeSet<AgentId>, String> {
    let mut set = BTreeSet::new();
    for id in ids {
        if !set.insert(*id) {
            return Err(format!("agent {id} appears more than once in {field}"));
        }
    }
    Ok(set)
}

fn expect_count(field: &str, count: u32, len: usize) -> Result<(), String> {
    if usize::try_from(count).ok() == Some(len) {
        Ok(())
    } else {
        Err(format!("{field} is {count} but {len} agent ids were supplied"))
    }
}

fn expect_parallel(field: &str, len: usize, expected: usize) -> Result<(), String> {
    if len == expected {
        Ok(())
    } else {
        Err(format!("{field} has {len} entries, expected {expected}"))
    }
}

fn expect_rate(field: &str, rate: f64) -> Result<(), String> {
    if rate.is_finite() && rate >= 0.0 {
        Ok(())
    } else {
        Err(format!("{field} must be finite and non-negative, got {rate}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn deaths(n: usize) -> DeathsDetails {
        let agent_ids: Vec<AgentId> = (0..3).map(AgentId).collect();
        DeathsDetails {
            patch_ids: vec![PatchId(0); n],
            states: vec![DiseaseState::Susceptible; 3],
            num_deaths: 3,
            death_rate: 0.001,
            agent_ids,
        }
    }

    #[test]
    fn payload_reports_its_kind() {
        let payload = EventPayload::Deaths(deaths(3));
        assert_eq!(payload.kind(), EventKind::Deaths);
        assert_eq!(payload.agent_ids().len(), 3);
    }

    #[test]
    fn consistent_deaths_validate() {
        assert!(EventPayload::Deaths(deaths(3)).validate().is_ok());
    }

    #[test]
    fn mismatched_parallel_lists_are_rejected() {
        let err = EventPayload::Deaths(deaths(2)).validate();
        assert!(err.is_err_and(|e| e.contains("patch_ids")));
    }

    #[test]
    fn births_total_must_match_patch_sum() {
        let payload = EventPayload::Births(BirthsDetails {
            agent_ids: vec![AgentId(10), AgentId(11)],
            patch_births: vec![1, 0],
            total_births: 2,
            birth_rate: 0.0,
        });
        assert!(payload.validate().is_err());
    }

    #[test]
    fn vaccination_split_must_cover_recipients() {
        let payload = EventPayload::Vaccination(VaccinationDetails {
            vaccine: VaccineKind::Mcv1,
            agent_ids: vec![AgentId(1), AgentId(2)],
            protected: vec![AgentId(1)],
            unprotected: vec![AgentId(3)],
            efficacy_achieved: 0.5,
        });
        assert!(payload.validate().is_err_and(|e| e.contains("agent 3")));
    }

    fn vaccination(agents: &[u32], protected: &[u32], unprotected: &[u32]) -> EventPayload {
        EventPayload::Vaccination(VaccinationDetails {
            vaccine: VaccineKind::Mcv1,
            agent_ids: agents.iter().copied().map(AgentId).collect(),
            protected: protected.iter().copied().map(AgentId).collect(),
            unprotected: unprotected.iter().copied().map(AgentId).collect(),
            efficacy_achieved: 0.5,
        })
    }

    #[test]
    fn vaccination_split_must_be_disjoint() {
        let err = vaccination(&[1, 2], &[1], &[1]).validate();
        assert!(err.is_err_and(|e| e.contains("agent 1 is both")));
    }

    #[test]
    fn vaccination_recipient_missing_from_split_is_rejected() {
        let err = vaccination(&[1, 2, 3], &[1], &[3, 3]).validate();
        assert!(err.is_err_and(|e| e.contains("more than once in unprotected")));
        let err = vaccination(&[1, 2], &[1], &[]).validate();
        assert!(err.is_err_and(|e| e.contains("agent 2 is neither")));
    }

    #[test]
    fn repeated_recipient_is_rejected() {
        let err = vaccination(&[1, 1], &[1], &[1]).validate();
        assert!(err.is_err_and(|e| e.contains("more than once in agent_ids")));
    }

    #[test]
    fn exact_vaccination_split_validates() {
        assert!(vaccination(&[4, 5, 6], &[6, 4], &[5]).validate().is_ok());
    }

    #[test]
    fn payload_serializes_with_kind_tag() {
        let payload = EventPayload::MaternalImmunityStart(MaternalImmunityStartDetails {
            agent_ids: vec![AgentId(4)],
            num_protected: 1,
        });
        let json = serde_json::to_value(&payload).unwrap_or_default();
        assert_eq!(json["kind"], "maternal_immunity_start");
        assert_eq!(json["data"]["num_protected"], 1);
    }
}
