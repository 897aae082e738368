//! Pareto frontier over two objectives
//!
//! The x axis is minimized (cost or latency), the y axis maximized (quality
//! or utility). Point `p` dominates `q` when it is no worse on both axes and
//! strictly better on one.
//!
//! ## Algorithm
//!
//! Sort by x ascending (y descending, then trial index, to break ties) and
//! scan once, keeping the best y seen. A point is on the frontier iff its y
//! strictly exceeds that running best. O(n log n).
//!
//! A budget removes points whose x exceeds it before the scan; they stay in
//! the result, flagged as out of budget, so charts can still show them.

use serde::{Deserialize, Serialize};

use crate::experiment::{ExperimentRun, TrialRecord};
use crate::{Error, Result};

/// Comparison tolerance for axis values.
pub const EPSILON: f64 = 1e-9;

/// Objective plotted on a frontier axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Axis {
    /// Reported cost (minimized).
    Cost,
    /// Latency in milliseconds (minimized).
    Latency,
    /// Overall quality (maximized).
    Quality,
    /// Finalized utility (maximized).
    Utility,
}

impl Axis {
    /// Whether smaller values are better.
    #[must_use]
    pub const fn is_minimized(self) -> bool {
        matches!(self, Self::Cost | Self::Latency)
    }

    /// Read this metric from a record; utility is absent until finalized.
    #[must_use]
    pub fn value(self, record: &TrialRecord) -> Option<f64> {
        match self {
            Self::Cost => Some(record.cost()),
            Self::Latency => Some(record.latency_ms()),
            Self::Quality => Some(record.quality()),
            Self::Utility => record.utility(),
        }
    }
}

/// One trial placed on the frontier chart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParetoPoint {
    /// Trial index.
    pub trial_index: u8,
    /// Value on the minimized axis.
    pub x: f64,
    /// Value on the maximized axis.
    pub y: f64,
    /// On the frontier.
    pub optimal: bool,
    /// A trial strictly dominating this one, if any.
    pub dominated_by: Option<u8>,
    /// Inside the budget (always true without a budget).
    pub within_budget: bool,
}

/// All points of a run with their frontier tags.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParetoFrontier {
    /// Minimized axis.
    pub x_axis: Axis,
    /// Maximized axis.
    pub y_axis: Axis,
    /// Ceiling on x, if any.
    pub budget: Option<f64>,
    /// Every point, in trial order.
    pub points: Vec<ParetoPoint>,
}

impl ParetoFrontier {
    /// Frontier of a completed run.
    ///
    /// # Errors
    ///
    /// Returns [`Error::RunNotCompleted`] for an unfinished run, or
    /// [`Error::InvalidInput`] for axes in the wrong role.
    pub fn compute(run: &ExperimentRun, x_axis: Axis, y_axis: Axis) -> Result<Self> {
        Self::build(run, x_axis, y_axis, None)
    }

    /// Frontier of a completed run restricted to `x ≤ budget`.
    ///
    /// # Errors
    ///
    /// As [`compute`](Self::compute); also [`Error::InvalidInput`] for a
    /// negative or non-finite budget.
    pub fn with_budget(run: &ExperimentRun, x_axis: Axis, y_axis: Axis, budget: f64) -> Result<Self> {
        Self::build(run, x_axis, y_axis, Some(budget))
    }

    fn build(run: &ExperimentRun, x_axis: Axis, y_axis: Axis, budget: Option<f64>) -> Result<Self> {
        run.ensure_completed()?;
        let values = run
            .records()
            .map(|record| {
                let missing = |axis: Axis| {
                    Error::InvariantViolation(format!(
                        "trial {} has no {axis:?} value",
                        record.index()
                    ))
                };
                Ok((
                    record.index(),
                    x_axis.value(record).ok_or_else(|| missing(x_axis))?,
                    y_axis.value(record).ok_or_else(|| missing(y_axis))?,
                ))
            })
            .collect::<Result<Vec<_>>>()?;
        Self::from_values(x_axis, y_axis, values, budget)
    }

    /// Frontier over raw `(trial_index, x, y)` triples.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if `x_axis` is not a minimized axis,
    /// `y_axis` is not a maximized one, a value is not finite, or the budget
    /// is negative or not finite.
    pub fn from_values(
        x_axis: Axis,
        y_axis: Axis,
        values: impl IntoIterator<Item = (u8, f64, f64)>,
        budget: Option<f64>,
    ) -> Result<Self> {
        if !x_axis.is_minimized() || y_axis.is_minimized() {
            return Err(Error::InvalidInput(format!(
                "frontier needs a minimized x axis and a maximized y axis, got {x_axis:?} vs {y_axis:?}"
            )));
        }
        if let Some(b) = budget {
            if !b.is_finite() || b < 0.0 {
                return Err(Error::InvalidInput(format!(
                    "budget must be a finite non-negative number, got {b}"
                )));
            }
        }

        let mut points = values
            .into_iter()
            .map(|(trial_index, x, y)| {
                if !x.is_finite() || !y.is_finite() {
                    return Err(Error::InvalidInput(format!(
                        "trial {trial_index} has non-finite coordinates ({x}, {y})"
                    )));
                }
                Ok(ParetoPoint {
                    trial_index,
                    x,
                    y,
                    optimal: false,
                    dominated_by: None,
                    within_budget: budget.map_or(true, |b| x <= b + EPSILON),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let mut order: Vec<usize> = (0..points.len())
            .filter(|&i| points[i].within_budget)
            .collect();
        order.sort_by(|&a, &b| {
            let (pa, pb) = (&points[a], &points[b]);
            pa.x.total_cmp(&pb.x)
                .then(pb.y.total_cmp(&pa.y))
                .then(pa.trial_index.cmp(&pb.trial_index))
        });

        let mut best: Option<usize> = None;
        for i in order {
            match best {
                Some(b) if points[i].y <= points[b].y + EPSILON => {
                    let (champion, point) = (&points[b], &points[i]);
                    let strictly_better =
                        champion.x < point.x - EPSILON || champion.y > point.y + EPSILON;
                    let champion_index = champion.trial_index;
                    if strictly_better {
                        points[i].dominated_by = Some(champion_index);
                    }
                }
                _ => {
                    points[i].optimal = true;
                    best = Some(i);
                }
            }
        }

        Ok(Self {
            x_axis,
            y_axis,
            budget,
            points,
        })
    }

    /// Points on the frontier, ordered by x.
    #[must_use]
    pub fn optimal_points(&self) -> Vec<&ParetoPoint> {
        let mut optimal: Vec<&ParetoPoint> = self.points.iter().filter(|p| p.optimal).collect();
        optimal.sort_by(|a, b| a.x.total_cmp(&b.x));
        optimal
    }

    /// Points not on the frontier, including out-of-budget ones.
    #[must_use]
    pub fn dominated_points(&self) -> Vec<&ParetoPoint> {
        self.points.iter().filter(|p| !p.optimal).collect()
    }

    /// Points inside the budget.
    #[must_use]
    pub fn points_within_budget(&self) -> Vec<&ParetoPoint> {
        self.points.iter().filter(|p| p.within_budget).collect()
    }

    /// Highest-y point inside the budget; cheaper and then lower index win
    /// ties.
    #[must_use]
    pub fn best_within_budget(&self) -> Option<&ParetoPoint> {
        self.points
            .iter()
            .filter(|p| p.within_budget)
            .min_by(|a, b| {
                b.y.total_cmp(&a.y)
                    .then(a.x.total_cmp(&b.x))
                    .then(a.trial_index.cmp(&b.trial_index))
            })
    }

    /// Get the point for a trial.
    #[must_use]
    pub fn point(&self, trial_index: u8) -> Option<&ParetoPoint> {
        self.points.iter().find(|p| p.trial_index == trial_index)
    }
}
