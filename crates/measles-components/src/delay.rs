//! Delay sampling, coverage selection and tick-bucketed schedules.
//!
//! Shared by the vaccination and maternal-immunity components: both pick a
//! subset of newborns by coverage, draw a per-agent delay, and file the
//! agent under the tick at which the delayed action fires.

use std::collections::BTreeMap;

use measles_types::AgentId;
use rand::Rng;
use rand_distr::{Distribution, Exp, Gamma};

use crate::config::DelayDistribution;
use crate::error::ComponentError;
use crate::population::count_to_f64;

/// Shape parameter of the gamma delay distribution.
pub const GAMMA_SHAPE: f64 = 4.0;

#[derive(Debug, Clone, Copy)]
enum Sampler {
    Gamma(Gamma<f64>),
    Exponential(Exp<f64>),
    Fixed(u64),
}

/// Draws whole-tick delays from a configured distribution.
///
/// Every draw is truncated to whole ticks and floored at one tick, so a
/// delayed action never fires on the tick it was scheduled.
#[derive(Debug, Clone, Copy)]
pub struct DelaySampler {
    sampler: Sampler,
    mean: f64,
}

impl DelaySampler {
    /// Build a sampler with the given distribution and mean (in ticks).
    ///
    /// # Errors
    ///
    /// Returns [`ComponentError::InvalidParams`] if `mean` is not a positive
    /// finite number.
    pub fn new(distribution: DelayDistribution, mean: f64) -> Result<Self, ComponentError> {
        let invalid = |reason: String| ComponentError::InvalidParams {
            component: "delay",
            field: "mean",
            reason,
        };
        if !(mean.is_finite() && mean > 0.0) {
            return Err(invalid(format!("must be a positive number of ticks, got {mean}")));
        }
        let sampler = match distribution {
            DelayDistribution::Gamma => Sampler::Gamma(
                Gamma::new(GAMMA_SHAPE, mean / GAMMA_SHAPE).map_err(|e| invalid(e.to_string()))?,
            ),
            DelayDistribution::Exponential => Sampler::Exponential(
                Exp::new(mean.recip()).map_err(|e| invalid(e.to_string()))?,
            ),
            DelayDistribution::Fixed => Sampler::Fixed(whole_ticks(mean)),
        };
        Ok(Self { sampler, mean })
    }

    /// The configured mean, in ticks.
    pub const fn mean(&self) -> f64 {
        self.mean
    }

    /// Draw one delay.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> u64 {
        match &self.sampler {
            Sampler::Gamma(gamma) => whole_ticks(gamma.sample(rng)),
            Sampler::Exponential(exp) => whole_ticks(exp.sample(rng)),
            Sampler::Fixed(ticks) => *ticks,
        }
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn whole_ticks(draw: f64) -> u64 {
    if draw.is_finite() && draw >= 1.0 {
        draw as u64
    } else {
        1
    }
}

/// Pick the newborns that receive a delayed action.
///
/// With `coverage >= 1` every id is returned. Otherwise exactly
/// `floor(len * coverage)` ids are chosen uniformly without replacement and
/// returned in their original order.
pub fn select_by_coverage<R: Rng + ?Sized>(
    ids: &[AgentId],
    coverage: f64,
    rng: &mut R,
) -> Vec<AgentId> {
    if coverage >= 1.0 {
        return ids.to_vec();
    }
    let amount = covered_count(ids.len(), coverage);
    if amount == 0 {
        return Vec::new();
    }
    let mut picked = rand::seq::index::sample(rng, ids.len(), amount).into_vec();
    picked.sort_unstable();
    picked.into_iter().filter_map(|i| ids.get(i).copied()).collect()
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn covered_count(len: usize, coverage: f64) -> usize {
    if coverage.is_nan() || coverage <= 0.0 {
        return 0;
    }
    let amount = (count_to_f64(len) * coverage).floor() as usize;
    amount.min(len)
}

/// Agents filed under the tick at which their delayed action fires.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DelaySchedule {
    buckets: BTreeMap<u64, Vec<AgentId>>,
}

impl DelaySchedule {
    /// An empty schedule.
    pub fn new() -> Self {
        Self::default()
    }

    /// File `agent` under `tick`.
    pub fn insert(&mut self, tick: u64, agent: AgentId) {
        self.buckets.entry(tick).or_default().push(agent);
    }

    /// File every agent in `agents` under `tick`.
    pub fn extend(&mut self, tick: u64, agents: impl IntoIterator<Item = AgentId>) {
        let bucket = self.buckets.entry(tick).or_default();
        bucket.extend(agents);
        if bucket.is_empty() {
            self.buckets.remove(&tick);
        }
    }

    /// Remove and return every agent filed at or before `now`.
    ///
    /// Buckets are drained in tick order, so entries left behind by a
    /// skipped tick are still consumed.
    pub fn take_due(&mut self, now: u64) -> Vec<AgentId> {
        let later = match now.checked_add(1) {
            Some(next) => self.buckets.split_off(&next),
            None => BTreeMap::new(),
        };
        let due = std::mem::replace(&mut self.buckets, later);
        due.into_values().flatten().collect()
    }

    /// Number of agents still waiting.
    pub fn pending(&self) -> usize {
        self.buckets.values().map(Vec::len).sum()
    }

    /// Whether nothing is waiting.
    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// The earliest tick with a waiting agent.
    pub fn next_due(&self) -> Option<u64> {
        self.buckets.keys().next().copied()
    }

    /// Tick under which `agent` is filed, if any.
    pub fn due_tick(&self, agent: AgentId) -> Option<u64> {
        self.buckets
            .iter()
            .find(|(_, agents)| agents.contains(&agent))
            .map(|(tick, _)| *tick)
    }
}
