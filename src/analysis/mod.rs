//! Analysis of completed runs
//!
//! - [`effects`]: per-variable main effects, contribution percentages and the
//!   single-pass optimal configuration
//! - [`pareto`]: non-dominated frontier with budget views
//!
//! [`RunSummary`] bundles both and is attached to a run when it completes.

pub mod effects;
pub mod pareto;

pub use effects::{
    analyze, compare_configurations, export_optimal_config, main_effects, optimal_config_yaml,
    ConfigurationChange, Effect, MainEffects,
};
pub use pareto::{Axis, ParetoFrontier, ParetoPoint};

use serde::{Deserialize, Serialize};

use crate::experiment::ExperimentRun;
use crate::topk::{top_k_positions, SortOrder};
use crate::Result;

/// How many trials each ranking keeps.
pub const RANKING_SIZE: usize = 3;

/// Analysis attached to a completed run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Main effects and optimal configuration.
    pub main_effects: MainEffects,
    /// Cost vs quality frontier.
    pub frontier: ParetoFrontier,
    /// Best trials by quality, best first.
    pub best_by_quality: Vec<u8>,
    /// Best trials by utility, best first.
    pub best_by_utility: Vec<u8>,
}

impl RunSummary {
    /// Summarize a completed run.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::RunNotCompleted`] for an unfinished run, or any
    /// analysis error.
    pub fn compute(run: &ExperimentRun) -> Result<Self> {
        let main_effects = analyze(run)?;
        let frontier = ParetoFrontier::compute(run, Axis::Cost, Axis::Quality)?;

        let records: Vec<_> = run.records().collect();
        let rank = |values: Vec<f64>| -> Result<Vec<u8>> {
            Ok(top_k_positions(values, RANKING_SIZE, SortOrder::Descending)?
                .into_iter()
                .map(|p| records[p].index())
                .collect())
        };
        let best_by_quality = rank(records.iter().map(|r| r.quality()).collect())?;
        let best_by_utility = rank(
            records
                .iter()
                .map(|r| r.utility().unwrap_or(f64::NAN))
                .collect(),
        )?;

        Ok(Self {
            main_effects,
            frontier,
            best_by_quality,
            best_by_utility,
        })
    }
}
