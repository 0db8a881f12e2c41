//! Columnar agent store and per-patch state counts.
//!
//! [`People`] keeps one column per agent attribute, indexed by [`AgentId`].
//! [`Patches`] keeps S/E/I/R counts for every patch. [`Population`] bundles
//! the two and keeps them consistent when agents are added or removed; it
//! is the context handed to every component on every tick.
//!
//! Lookups with an out-of-range id return `None` (or `false` for setters)
//! rather than panicking, so a stale id in a schedule is simply "not
//! present".

use measles_types::{AgentId, DiseaseState, PatchId};
use serde::Serialize;

use crate::error::ComponentError;

/// Attributes of an agent being added to the store.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NewAgent {
    /// Home patch.
    pub patch: PatchId,
    /// Initial disease state.
    pub state: DiseaseState,
    /// Initial susceptibility (0 = protected, 1 = fully susceptible).
    pub susceptibility: f32,
    /// Tick of birth; negative for agents born before the run.
    pub date_of_birth: i64,
}

impl NewAgent {
    /// A fully susceptible newborn in `patch`, born at `tick`.
    pub fn newborn(patch: PatchId, tick: u64) -> Self {
        Self {
            patch,
            state: DiseaseState::Susceptible,
            susceptibility: 1.0,
            date_of_birth: i64::try_from(tick).unwrap_or(i64::MAX),
        }
    }
}

/// Per-agent columns.
#[derive(Debug, Clone, Default)]
pub struct People {
    active: Vec<bool>,
    state: Vec<DiseaseState>,
    susceptibility: Vec<f32>,
    patch_id: Vec<PatchId>,
    date_of_birth: Vec<i64>,
}

impl People {
    /// Number of rows ever allocated (living and dead).
    pub fn len(&self) -> usize {
        self.active.len()
    }

    /// Whether no agent was ever added.
    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }

    /// Number of living agents.
    pub fn count_active(&self) -> usize {
        self.active.iter().filter(|alive| **alive).count()
    }

    /// Ids of every living agent, ascending.
    pub fn active_ids(&self) -> Vec<AgentId> {
        self.active
            .iter()
            .enumerate()
            .filter(|(_, alive)| **alive)
            .filter_map(|(i, _)| AgentId::from_index(i))
            .collect()
    }

    fn push(&mut self, agent: NewAgent) -> Option<AgentId> {
        let id = AgentId::from_index(self.active.len())?;
        self.active.push(true);
        self.state.push(agent.state);
        self.susceptibility.push(agent.susceptibility);
        self.patch_id.push(agent.patch);
        self.date_of_birth.push(agent.date_of_birth);
        Some(id)
    }

    /// Whether `id` exists and is alive.
    pub fn is_alive(&self, id: AgentId) -> bool {
        self.active.get(id.index()).copied().unwrap_or(false)
    }

    /// Disease state of `id`.
    pub fn state(&self, id: AgentId) -> Option<DiseaseState> {
        self.state.get(id.index()).copied()
    }

    /// Susceptibility of `id`.
    pub fn susceptibility(&self, id: AgentId) -> Option<f32> {
        self.susceptibility.get(id.index()).copied()
    }

    /// Home patch of `id`.
    pub fn patch(&self, id: AgentId) -> Option<PatchId> {
        self.patch_id.get(id.index()).copied()
    }

    /// Birth tick of `id`.
    pub fn date_of_birth(&self, id: AgentId) -> Option<i64> {
        self.date_of_birth.get(id.index()).copied()
    }

    /// Overwrite the susceptibility of `id`. Returns `false` if absent.
    pub fn set_susceptibility(&mut self, id: AgentId, value: f32) -> bool {
        self.susceptibility
            .get_mut(id.index())
            .map(|slot| *slot = value)
            .is_some()
    }

    /// Overwrite the birth tick of `id`. Returns `false` if absent.
    pub fn set_date_of_birth(&mut self, id: AgentId, tick: i64) -> bool {
        self.date_of_birth
            .get_mut(id.index())
            .map(|slot| *slot = tick)
            .is_some()
    }

    fn set_state(&mut self, id: AgentId, state: DiseaseState) -> bool {
        self.state
            .get_mut(id.index())
            .map(|slot| *slot = state)
            .is_some()
    }

    fn deactivate(&mut self, id: AgentId) -> bool {
        match self.active.get_mut(id.index()) {
            Some(alive) if *alive => {
                *alive = false;
                true
            }
            _ => false,
        }
    }
}

/// Convert a count to `f64` for rate arithmetic.
///
/// Counts beyond `u32::MAX` saturate; the id space is `u32` anyway.
pub(crate) fn count_to_f64(n: impl TryInto<u32>) -> f64 {
    n.try_into().map_or(f64::from(u32::MAX), f64::from)
}

/// Add a count to a running total, saturating.
pub(crate) fn add_count(total: &mut u64, n: usize) {
    *total = total.saturating_add(u64::try_from(n).unwrap_or(u64::MAX));
}

/// S/E/I/R counts for one patch.
pub type StateCounts = [u64; 4];

/// Per-patch state counts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Patches {
    counts: Vec<StateCounts>,
}

impl Patches {
    /// `n` empty patches.
    pub fn new(n: usize) -> Self {
        Self {
            counts: vec![[0; 4]; n],
        }
    }

    /// Number of patches.
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    /// Whether there are no patches.
    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Agents in `patch` that are in `state`.
    pub fn count(&self, patch: PatchId, state: DiseaseState) -> u64 {
        self.counts
            .get(patch.index())
            .and_then(|row| row.get(state.column()))
            .copied()
            .unwrap_or(0)
    }

    /// Living agents in `patch`.
    pub fn population(&self, patch: PatchId) -> u64 {
        self.counts
            .get(patch.index())
            .map_or(0, |row| row.iter().fold(0_u64, |acc, n| acc.saturating_add(*n)))
    }

    /// Living agents per patch.
    pub fn populations(&self) -> Vec<u64> {
        self.counts
            .iter()
            .map(|row| row.iter().fold(0_u64, |acc, n| acc.saturating_add(*n)))
            .collect()
    }

    /// S/E/I/R totals over all patches.
    pub fn totals(&self) -> StateCounts {
        let mut totals = [0_u64; 4];
        for row in &self.counts {
            for (total, n) in totals.iter_mut().zip(row) {
                *total = total.saturating_add(*n);
            }
        }
        totals
    }

    fn adjust(&mut self, patch: PatchId, state: DiseaseState, add: bool) {
        if let Some(slot) = self
            .counts
            .get_mut(patch.index())
            .and_then(|row| row.get_mut(state.column()))
        {
            *slot = if add {
                slot.saturating_add(1)
            } else {
                slot.saturating_sub(1)
            };
        }
    }
}

/// Agents plus patch counts, kept in step with each other.
#[derive(Debug, Clone, Default)]
pub struct Population {
    /// Per-agent columns.
    pub people: People,
    /// Per-patch counts.
    pub patches: Patches,
}

impl Population {
    /// An empty population over `patches` patches.
    pub fn with_patches(patches: usize) -> Self {
        Self {
            people: People::default(),
            patches: Patches::new(patches),
        }
    }

    /// Seed a population: `sizes[p]` susceptible agents in patch `p`, all
    /// born at tick 0.
    ///
    /// # Errors
    ///
    /// Returns [`ComponentError::CapacityExhausted`] if the total does not
    /// fit the `u32` id space.
    pub fn from_patch_sizes(sizes: &[u32]) -> Result<Self, ComponentError> {
        let mut population = Self::with_patches(sizes.len());
        for (index, size) in sizes.iter().enumerate() {
            let patch = PatchId::from_index(index).ok_or_else(|| ComponentError::CapacityExhausted {
                context: format!("patch {index}"),
            })?;
            for _ in 0..*size {
                population.add_agent(NewAgent::newborn(patch, 0))?;
            }
        }
        Ok(population)
    }

    /// Append an agent and count it in its patch.
    ///
    /// # Errors
    ///
    /// Returns [`ComponentError::CapacityExhausted`] if the id space is full.
    pub fn add_agent(&mut self, agent: NewAgent) -> Result<AgentId, ComponentError> {
        let id = self
            .people
            .push(agent)
            .ok_or_else(|| ComponentError::CapacityExhausted {
                context: format!("agent in patch {}", agent.patch),
            })?;
        self.patches.adjust(agent.patch, agent.state, true);
        Ok(id)
    }

    /// Mark `id` dead and remove it from its patch count.
    ///
    /// Returns the agent's patch and state, or `None` if it was absent or
    /// already dead.
    pub fn remove_agent(&mut self, id: AgentId) -> Option<(PatchId, DiseaseState)> {
        let patch = self.people.patch(id)?;
        let state = self.people.state(id)?;
        if !self.people.deactivate(id) {
            return None;
        }
        self.patches.adjust(patch, state, false);
        Some((patch, state))
    }

    /// Move a living agent to a new disease state, keeping counts in step.
    ///
    /// Returns `false` if the agent is absent or dead.
    pub fn transition(&mut self, id: AgentId, to: DiseaseState) -> bool {
        if !self.people.is_alive(id) {
            return false;
        }
        let (Some(patch), Some(from)) = (self.people.patch(id), self.people.state(id)) else {
            return false;
        };
        self.patches.adjust(patch, from, false);
        self.patches.adjust(patch, to, true);
        self.people.set_state(id, to)
    }
}
