//! Experiment definition - the immutable input of a run

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::design::{self, Variable};
use crate::judge::Rubric;
use crate::{Error, Result};

/// Weights of the utility objectives.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UtilityWeights {
    /// Reward per unit of quality.
    pub quality: f64,
    /// Penalty per unit of normalized cost.
    pub cost: f64,
    /// Penalty per unit of normalized latency.
    pub time: f64,
}

impl Default for UtilityWeights {
    fn default() -> Self {
        Self {
            quality: 1.0,
            cost: 0.1,
            time: 0.05,
        }
    }
}

impl UtilityWeights {
    /// Check every weight is finite and non-negative and at least one is
    /// positive.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidDesign`] otherwise.
    pub fn validate(&self) -> Result<()> {
        for (name, weight) in [("quality", self.quality), ("cost", self.cost), ("time", self.time)] {
            if !weight.is_finite() || weight < 0.0 {
                return Err(Error::InvalidDesign(format!(
                    "utility weight '{name}' must be a finite non-negative number, got {weight}"
                )));
            }
        }
        if self.quality + self.cost + self.time <= 0.0 {
            return Err(Error::InvalidDesign(
                "at least one utility weight must be positive".into(),
            ));
        }
        Ok(())
    }
}

/// Fully validated experiment definition.
///
/// Immutable once a run starts; its [`config_hash`](Self::config_hash) is
/// recorded in the run and checked on resume.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentSpec {
    name: String,
    workflow: String,
    variables: Vec<Variable>,
    #[serde(default)]
    weights: UtilityWeights,
    #[serde(default)]
    workflow_config: Value,
    #[serde(default)]
    rubric: Rubric,
    #[serde(default)]
    seed: Option<u64>,
}

impl ExperimentSpec {
    /// Start building a definition for `workflow`.
    #[must_use]
    pub fn builder(name: impl Into<String>, workflow: impl Into<String>) -> ExperimentSpecBuilder {
        ExperimentSpecBuilder::new(name, workflow)
    }

    /// Get the experiment name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the workflow identifier.
    #[must_use]
    pub fn workflow(&self) -> &str {
        &self.workflow
    }

    /// Get the variables, in design column order.
    #[must_use]
    pub fn variables(&self) -> &[Variable] {
        &self.variables
    }

    /// Get the utility weights.
    #[must_use]
    pub const fn weights(&self) -> &UtilityWeights {
        &self.weights
    }

    /// Get the opaque workflow payload handed to generation strategies.
    #[must_use]
    pub const fn workflow_config(&self) -> &Value {
        &self.workflow_config
    }

    /// Get the judge rubric.
    #[must_use]
    pub const fn rubric(&self) -> &Rubric {
        &self.rubric
    }

    /// Get the seed, if any.
    #[must_use]
    pub const fn seed(&self) -> Option<u64> {
        self.seed
    }

    /// Re-check every invariant; needed after deserializing.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidDesign`] describing the first violation.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::InvalidDesign("experiment name must be non-empty".into()));
        }
        if self.workflow.trim().is_empty() {
            return Err(Error::InvalidDesign("workflow must be non-empty".into()));
        }
        design::validate_variables(&self.variables)?;
        self.weights.validate()?;
        self.rubric
            .validate()
            .map_err(|e| Error::InvalidDesign(format!("rubric: {e}")))
    }

    /// SHA-256 of the canonical JSON form, hex encoded.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] if serialization fails.
    pub fn config_hash(&self) -> Result<String> {
        let canonical = serde_json::to_vec(self)?;
        Ok(hex::encode(Sha256::digest(&canonical)))
    }

    /// Default run identifier: the name reduced to `[A-Za-z0-9_-]`, plus a
    /// UTC timestamp with microseconds.
    ///
    /// The result is always a valid [`crate::kv::FileKvStore`] key.
    #[must_use]
    pub fn default_experiment_id(&self, at: DateTime<Utc>) -> String {
        format!("{}-{}", id_slug(&self.name), at.format("%Y%m%dT%H%M%S%6f"))
    }
}

fn id_slug(name: &str) -> String {
    let slug: String = name
        .trim()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '-' { c } else { '_' })
        .collect();
    if slug.is_empty() {
        "experiment".to_string()
    } else {
        slug
    }
}

/// Builder for [`ExperimentSpec`].
#[derive(Debug)]
pub struct ExperimentSpecBuilder {
    spec: ExperimentSpec,
}

impl ExperimentSpecBuilder {
    /// Create a builder with required fields.
    #[must_use]
    pub fn new(name: impl Into<String>, workflow: impl Into<String>) -> Self {
        Self {
            spec: ExperimentSpec {
                name: name.into(),
                workflow: workflow.into(),
                variables: Vec::new(),
                weights: UtilityWeights::default(),
                workflow_config: Value::Null,
                rubric: Rubric::default(),
                seed: None,
            },
        }
    }

    /// Append a variable (column order follows call order).
    #[must_use]
    pub fn variable(mut self, variable: Variable) -> Self {
        self.spec.variables.push(variable);
        self
    }

    /// Append several variables.
    #[must_use]
    pub fn variables(mut self, variables: impl IntoIterator<Item = Variable>) -> Self {
        self.spec.variables.extend(variables);
        self
    }

    /// Set the utility weights.
    #[must_use]
    pub const fn weights(mut self, weights: UtilityWeights) -> Self {
        self.spec.weights = weights;
        self
    }

    /// Set the opaque workflow payload.
    #[must_use]
    pub fn workflow_config(mut self, config: Value) -> Self {
        self.spec.workflow_config = config;
        self
    }

    /// Replace the default rubric.
    #[must_use]
    pub fn rubric(mut self, rubric: Rubric) -> Self {
        self.spec.rubric = rubric;
        self
    }

    /// Set the seed passed to generation strategies.
    #[must_use]
    pub const fn seed(mut self, seed: u64) -> Self {
        self.spec.seed = Some(seed);
        self
    }

    /// Validate and build.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidDesign`] if any invariant is violated.
    pub fn build(self) -> Result<ExperimentSpec> {
        self.spec.validate()?;
        Ok(self.spec)
    }
}

/// Provenance stored alongside a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExperimentMetadata {
    /// Hash of the definition the run was created from.
    pub config_hash: String,
    /// When the run was created.
    pub created_at: DateTime<Utc>,
    /// Seed copied from the definition.
    pub seed: Option<u64>,
}

impl ExperimentMetadata {
    /// Metadata for a run of `spec` created at `created_at`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] if the definition cannot be hashed.
    pub fn for_spec(spec: &ExperimentSpec, created_at: DateTime<Utc>) -> Result<Self> {
        Ok(Self {
            config_hash: spec.config_hash()?,
            created_at,
            seed: spec.seed(),
        })
    }
}
