//! Multi-objective utility: `wq·quality − wc·norm(cost) − wt·norm(time)`.
//!
//! Normalization needs the min/max over every trial, so utilities only exist
//! once a run has all of its records.

use serde::{Deserialize, Serialize};

use super::{TrialRecord, UtilityWeights};

/// Observed range of one metric.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    /// Smallest observed value.
    pub min: f64,
    /// Largest observed value.
    pub max: f64,
}

impl Bounds {
    /// Range of the given values, `None` when empty.
    pub fn observe(values: impl IntoIterator<Item = f64>) -> Option<Self> {
        values.into_iter().fold(None, |acc, v| {
            Some(match acc {
                None => Self { min: v, max: v },
                Some(b) => Self {
                    min: b.min.min(v),
                    max: b.max.max(v),
                },
            })
        })
    }

    /// Min-max normalize `value`; a degenerate range maps everything to 0.
    #[must_use]
    #[allow(clippy::float_cmp)]
    pub fn normalize(&self, value: f64) -> f64 {
        if self.max == self.min {
            0.0
        } else {
            (value - self.min) / (self.max - self.min)
        }
    }
}

/// Cost and latency ranges across a run's trials.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Normalization {
    /// Cost range.
    pub cost: Bounds,
    /// Latency range in milliseconds.
    pub latency_ms: Bounds,
}

impl Normalization {
    /// Bounds over the given records, `None` when there are none.
    #[must_use]
    pub fn from_records(records: &[&TrialRecord]) -> Option<Self> {
        Some(Self {
            cost: Bounds::observe(records.iter().map(|r| r.cost()))?,
            latency_ms: Bounds::observe(records.iter().map(|r| r.latency_ms()))?,
        })
    }

    /// Utility of one trial under these bounds.
    #[must_use]
    pub fn utility(&self, weights: &UtilityWeights, quality: f64, cost: f64, latency_ms: f64) -> f64 {
        weights.quality * quality
            - weights.cost * self.cost.normalize(cost)
            - weights.time * self.latency_ms.normalize(latency_ms)
    }
}
