//! Main-effects analysis
//!
//! For each variable the 8 utilities split 4/4 by level (guaranteed by the
//! orthogonal design). Effect size is `mean_b − mean_a`, sum of squares is
//! `effect² × 4`, and contribution is each variable's share of the total.
//!
//! The optimal configuration picks each variable's better level
//! independently. Interactions are not modeled and no confirmation trial is
//! run for the combined configuration.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::design::{Level, TrialConfiguration, Variable};
use crate::experiment::ExperimentRun;
use crate::topk::{top_k_positions, SortOrder};
use crate::{Error, Result};

/// Allowed deviation of the contribution sum from 100%.
pub const CONTRIBUTION_TOLERANCE: f64 = 0.01;

/// Main effect of one variable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Effect {
    /// Variable name.
    pub variable: String,
    /// First level value.
    pub level_a: Value,
    /// Second level value.
    pub level_b: Value,
    /// Mean utility of trials at level A.
    pub mean_a: f64,
    /// Mean utility of trials at level B.
    pub mean_b: f64,
    /// `mean_b − mean_a`.
    pub effect_size: f64,
    /// `effect_size² × 4`.
    pub sum_of_squares: f64,
    /// Share of the total sum of squares, in percent.
    pub contribution_pct: f64,
}

impl Effect {
    /// Level with the higher mean utility; level A wins ties.
    #[must_use]
    pub fn preferred_level(&self) -> Level {
        if self.mean_a >= self.mean_b {
            Level::A
        } else {
            Level::B
        }
    }

    /// Value of the preferred level.
    #[must_use]
    pub fn preferred_value(&self) -> &Value {
        match self.preferred_level() {
            Level::A => &self.level_a,
            Level::B => &self.level_b,
        }
    }
}

/// Full main-effects result for a completed run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MainEffects {
    /// One entry per variable, in design column order.
    pub effects: Vec<Effect>,
    /// Sum of all variables' sums of squares.
    pub total_sum_of_squares: f64,
    /// Independently chosen best level per variable.
    pub optimal_configuration: BTreeMap<String, Value>,
    /// Quality of trial 1.
    pub baseline_quality: f64,
    /// Trial with the highest utility.
    pub best_trial: u8,
    /// Quality of that trial.
    pub optimal_quality: f64,
    /// `(optimal − baseline) / baseline × 100`; `None` when baseline ≤ 0.
    pub quality_improvement_pct: Option<f64>,
}

impl MainEffects {
    /// Look up one variable's effect.
    #[must_use]
    pub fn effect(&self, variable: &str) -> Option<&Effect> {
        self.effects.iter().find(|e| e.variable == variable)
    }

    /// Effects ordered by contribution, largest first.
    #[must_use]
    pub fn ranked(&self) -> Vec<&Effect> {
        let mut ranked: Vec<&Effect> = self.effects.iter().collect();
        ranked.sort_by(|a, b| b.contribution_pct.total_cmp(&a.contribution_pct));
        ranked
    }
}

/// Compute per-variable effects from utilities aligned with `configurations`.
///
/// # Errors
///
/// - [`Error::InvalidInput`] if the slices differ in length or a utility is
///   not finite
/// - [`Error::InvariantViolation`] if a level is not used by exactly half the
///   trials, or contributions do not sum to 100%
pub fn main_effects(
    variables: &[Variable],
    configurations: &[TrialConfiguration],
    utilities: &[f64],
) -> Result<Vec<Effect>> {
    if configurations.len() != utilities.len() || configurations.is_empty() {
        return Err(Error::InvalidInput(format!(
            "need one utility per configuration ({} configurations, {} utilities)",
            configurations.len(),
            utilities.len()
        )));
    }
    if let Some(bad) = utilities.iter().find(|u| !u.is_finite()) {
        return Err(Error::InvalidInput(format!("utility {bad} is not finite")));
    }

    let half = configurations.len() / 2;
    let mut effects = Vec::with_capacity(variables.len());
    for variable in variables {
        let mut at_a = Vec::with_capacity(half);
        let mut at_b = Vec::with_capacity(half);
        for (config, &utility) in configurations.iter().zip(utilities) {
            let level = config
                .value(variable.name())
                .and_then(|value| variable.level_of(value))
                .ok_or_else(|| {
                    Error::InvariantViolation(format!(
                        "trial {} has no valid level for '{}'",
                        config.index(),
                        variable.name()
                    ))
                })?;
            match level {
                Level::A => at_a.push(utility),
                Level::B => at_b.push(utility),
            }
        }
        if at_a.len() != half || at_b.len() != half {
            return Err(Error::InvariantViolation(format!(
                "variable '{}' is unbalanced: {} trials at level A, {} at level B",
                variable.name(),
                at_a.len(),
                at_b.len()
            )));
        }

        let mean_a = mean(&at_a);
        let mean_b = mean(&at_b);
        let effect_size = mean_b - mean_a;
        #[allow(clippy::cast_precision_loss)]
        let sum_of_squares = effect_size * effect_size * half as f64;
        effects.push(Effect {
            variable: variable.name().to_string(),
            level_a: variable.level_a().clone(),
            level_b: variable.level_b().clone(),
            mean_a,
            mean_b,
            effect_size,
            sum_of_squares,
            contribution_pct: 0.0,
        });
    }

    let total: f64 = effects.iter().map(|e| e.sum_of_squares).sum();
    if total > 0.0 {
        for effect in &mut effects {
            effect.contribution_pct = 100.0 * effect.sum_of_squares / total;
        }
        let sum: f64 = effects.iter().map(|e| e.contribution_pct).sum();
        if (sum - 100.0).abs() > CONTRIBUTION_TOLERANCE {
            return Err(Error::InvariantViolation(format!(
                "contributions sum to {sum:.6}%, expected 100%"
            )));
        }
    }
    Ok(effects)
}

#[allow(clippy::cast_precision_loss)]
fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

/// Analyze a completed run.
///
/// # Errors
///
/// Returns [`Error::RunNotCompleted`] for a run that has not completed, or
/// the errors of [`main_effects`].
pub fn analyze(run: &ExperimentRun) -> Result<MainEffects> {
    run.ensure_completed()?;

    let records: Vec<_> = run.records().collect();
    let utilities = records
        .iter()
        .map(|r| {
            r.utility().ok_or_else(|| {
                Error::InvariantViolation(format!("trial {} has no utility", r.index()))
            })
        })
        .collect::<Result<Vec<f64>>>()?;
    let configurations: Vec<TrialConfiguration> =
        records.iter().map(|r| r.configuration().clone()).collect();

    let effects = main_effects(run.spec().variables(), &configurations, &utilities)?;
    let total_sum_of_squares = effects.iter().map(|e| e.sum_of_squares).sum();
    let optimal_configuration = effects
        .iter()
        .map(|e| (e.variable.clone(), e.preferred_value().clone()))
        .collect();

    let best_position = top_k_positions(utilities.iter().copied(), 1, SortOrder::Descending)?
        .first()
        .copied()
        .ok_or_else(|| Error::InvariantViolation("no trial has a utility".into()))?;
    let best = records[best_position];
    let baseline_quality = run
        .baseline()
        .ok_or_else(|| Error::InvariantViolation("baseline trial has no record".into()))?
        .quality();
    let optimal_quality = best.quality();
    let quality_improvement_pct = (baseline_quality > 0.0)
        .then(|| (optimal_quality - baseline_quality) / baseline_quality * 100.0);

    Ok(MainEffects {
        effects,
        total_sum_of_squares,
        optimal_configuration,
        baseline_quality,
        best_trial: best.index(),
        optimal_quality,
        quality_improvement_pct,
    })
}

/// Difference of one variable between two configurations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigurationChange {
    /// Variable name.
    pub variable: String,
    /// Value in the baseline, if present.
    pub baseline: Option<Value>,
    /// Value in the candidate, if present.
    pub candidate: Option<Value>,
    /// Whether the values differ.
    pub changed: bool,
}

/// Compare two configurations variable by variable, in name order.
#[must_use]
pub fn compare_configurations(
    baseline: &BTreeMap<String, Value>,
    candidate: &BTreeMap<String, Value>,
) -> Vec<ConfigurationChange> {
    let mut names: Vec<&String> = baseline.keys().chain(candidate.keys()).collect();
    names.sort();
    names.dedup();
    names
        .into_iter()
        .map(|name| {
            let before = baseline.get(name).cloned();
            let after = candidate.get(name).cloned();
            ConfigurationChange {
                variable: name.clone(),
                changed: before != after,
                baseline: before,
                candidate: after,
            }
        })
        .collect()
}

#[derive(Serialize)]
struct OptimalConfigExport<'a> {
    experiment: &'a str,
    workflow: &'a str,
    configuration: &'a BTreeMap<String, Value>,
}

/// Render the optimal configuration as YAML.
///
/// # Errors
///
/// Returns [`Error::Yaml`] if serialization fails.
pub fn optimal_config_yaml(run: &ExperimentRun, effects: &MainEffects) -> Result<String> {
    let export = OptimalConfigExport {
        experiment: run.experiment_id(),
        workflow: run.spec().workflow(),
        configuration: &effects.optimal_configuration,
    };
    Ok(serde_yaml::to_string(&export)?)
}

/// Write the optimal configuration as YAML, creating parent directories.
///
/// # Errors
///
/// Returns [`Error::Io`] or [`Error::Yaml`] on failure.
pub fn export_optimal_config(run: &ExperimentRun, effects: &MainEffects, path: &Path) -> Result<()> {
    let yaml = optimal_config_yaml(run, effects)?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, yaml)?;
    Ok(())
}
