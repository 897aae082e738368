//! Rubric definitions and the structured quality score a judgment produces.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// One scored aspect of a rubric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RubricDimension {
    /// What the judge should assess.
    pub description: String,
    /// Human-readable scoring scale shown to the judge.
    pub scale: String,
    /// Relative weight in the overall score.
    #[serde(default = "RubricDimension::default_weight")]
    pub weight: f64,
}

impl RubricDimension {
    const fn default_weight() -> f64 {
        1.0
    }

    /// Create a dimension with unit weight.
    #[must_use]
    pub fn new(description: impl Into<String>, scale: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            scale: scale.into(),
            weight: Self::default_weight(),
        }
    }

    /// Set the weight.
    #[must_use]
    pub const fn weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }
}

/// Named set of dimensions the judge must score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Rubric {
    dimensions: BTreeMap<String, RubricDimension>,
}

impl Rubric {
    /// Build a validated rubric.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for an empty rubric, blank dimension
    /// names, or negative/non-finite weights summing to zero.
    pub fn new(dimensions: impl IntoIterator<Item = (String, RubricDimension)>) -> Result<Self> {
        let rubric = Self {
            dimensions: dimensions.into_iter().collect(),
        };
        rubric.validate()?;
        Ok(rubric)
    }

    /// Re-check invariants (used after deserialization).
    ///
    /// # Errors
    ///
    /// See [`Rubric::new`].
    pub fn validate(&self) -> Result<()> {
        if self.dimensions.is_empty() {
            return Err(Error::InvalidInput("rubric must define at least one dimension".into()));
        }
        for (name, dimension) in &self.dimensions {
            if name.trim().is_empty() || name.trim() != name {
                return Err(Error::InvalidInput(format!(
                    "rubric dimension name '{name}' must be non-empty without surrounding whitespace"
                )));
            }
            if !dimension.weight.is_finite() || dimension.weight < 0.0 {
                return Err(Error::InvalidInput(format!(
                    "rubric dimension '{name}' has invalid weight {}",
                    dimension.weight
                )));
            }
        }
        if self.dimensions.values().map(|d| d.weight).sum::<f64>() <= 0.0 {
            return Err(Error::InvalidInput("rubric weights must not all be zero".into()));
        }
        Ok(())
    }

    /// Iterate dimensions in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &RubricDimension)> {
        self.dimensions.iter().map(|(name, dim)| (name.as_str(), dim))
    }

    /// Get one dimension by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&RubricDimension> {
        self.dimensions.get(name)
    }

    /// Number of dimensions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.dimensions.len()
    }

    /// Always false for a validated rubric.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.dimensions.is_empty()
    }
}

impl Default for Rubric {
    fn default() -> Self {
        let dims = [
            (
                "clarity",
                "Is the output clear and understandable?",
                "1-10 where 1=incomprehensible, 10=crystal clear",
            ),
            (
                "accuracy",
                "Is the output factually accurate?",
                "1-10 where 1=many errors, 10=fully accurate",
            ),
            (
                "completeness",
                "Does the output address all requirements?",
                "1-10 where 1=missing major parts, 10=comprehensive",
            ),
            (
                "usefulness",
                "Is the output actionable and useful?",
                "1-10 where 1=not useful, 10=highly actionable",
            ),
        ];
        Self {
            dimensions: dims
                .into_iter()
                .map(|(name, description, scale)| {
                    (name.to_string(), RubricDimension::new(description, scale))
                })
                .collect(),
        }
    }
}

/// Score and rationale for a single rubric dimension.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DimensionScore {
    /// Normalized score in `[0, 1]`.
    pub score: f64,
    /// Judge rationale, if given.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rationale: Option<String>,
}

/// Where a judgment came from, relative to the cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheTrace {
    /// Content-addressed key of the request.
    pub key: String,
    /// Served from the cache.
    pub hit: bool,
    /// Live response written to the cache.
    pub recorded: bool,
}

/// Aggregated quality judgment across rubric dimensions.
///
/// Immutable once built: `overall` is derived from `dimensions` at
/// construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityScore {
    dimensions: BTreeMap<String, DimensionScore>,
    overall: f64,
    evaluator_model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    cache: Option<CacheTrace>,
}

impl QualityScore {
    /// Build a score whose overall value is the mean of the dimension scores,
    /// weighted by the rubric when one is given.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] when no dimensions are given or a score
    /// lies outside `[0, 1]`.
    pub fn new(
        dimensions: BTreeMap<String, DimensionScore>,
        rubric: Option<&Rubric>,
        evaluator_model: impl Into<String>,
    ) -> Result<Self> {
        if dimensions.is_empty() {
            return Err(Error::InvalidInput(
                "at least one dimension score must be provided".into(),
            ));
        }
        if let Some((name, bad)) = dimensions
            .iter()
            .find(|(_, d)| !(0.0..=1.0).contains(&d.score))
        {
            return Err(Error::InvalidInput(format!(
                "dimension '{name}' score {} outside [0, 1]",
                bad.score
            )));
        }

        let weight_of = |name: &str| {
            rubric
                .and_then(|r| r.get(name))
                .map_or(1.0, |dim| dim.weight)
        };
        let total_weight: f64 = dimensions.keys().map(|name| weight_of(name)).sum();
        let overall = if total_weight > 0.0 {
            dimensions
                .iter()
                .map(|(name, d)| d.score * weight_of(name))
                .sum::<f64>()
                / total_weight
        } else {
            #[allow(clippy::cast_precision_loss)]
            let n = dimensions.len() as f64;
            dimensions.values().map(|d| d.score).sum::<f64>() / n
        };

        Ok(Self {
            dimensions,
            overall,
            evaluator_model: evaluator_model.into(),
            cache: None,
        })
    }

    /// Attach cache provenance.
    #[must_use]
    pub fn with_cache_trace(mut self, trace: CacheTrace) -> Self {
        self.cache = Some(trace);
        self
    }

    /// Get the per-dimension scores.
    #[must_use]
    pub const fn dimensions(&self) -> &BTreeMap<String, DimensionScore> {
        &self.dimensions
    }

    /// Get the overall (weighted mean) score.
    #[must_use]
    pub const fn overall(&self) -> f64 {
        self.overall
    }

    /// Get the evaluator model identifier.
    #[must_use]
    pub fn evaluator_model(&self) -> &str {
        &self.evaluator_model
    }

    /// Get cache provenance, if caching was active.
    #[must_use]
    pub const fn cache_trace(&self) -> Option<&CacheTrace> {
        self.cache.as_ref()
    }
}
