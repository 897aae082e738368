//! Trial Record - outcome of executing one configuration

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::design::TrialConfiguration;
use crate::judge::QualityScore;
use crate::Error;

/// Successful execution of one trial.
///
/// `utility` stays `None` until the run finalizes, because it depends on the
/// cost and latency range across all trials.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialRecord {
    index: u8,
    configuration: TrialConfiguration,
    quality: QualityScore,
    cost: f64,
    latency_ms: f64,
    #[serde(default)]
    utility: Option<f64>,
    output: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    raw_judgment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    strategy: Option<String>,
    timestamp: DateTime<Utc>,
}

impl TrialRecord {
    /// Create a record; negative cost or latency is clamped to zero.
    #[must_use]
    pub fn new(
        configuration: TrialConfiguration,
        quality: QualityScore,
        cost: f64,
        latency_ms: f64,
    ) -> Self {
        Self {
            index: configuration.index(),
            configuration,
            quality,
            cost: cost.max(0.0),
            latency_ms: latency_ms.max(0.0),
            utility: None,
            output: String::new(),
            raw_judgment: None,
            strategy: None,
            timestamp: Utc::now(),
        }
    }

    /// Attach the generated output.
    #[must_use]
    pub fn with_output(mut self, output: impl Into<String>) -> Self {
        self.output = output.into();
        self
    }

    /// Attach the judge response text.
    #[must_use]
    pub fn with_raw_judgment(mut self, raw: impl Into<String>) -> Self {
        self.raw_judgment = Some(raw.into());
        self
    }

    /// Record the generation strategy used.
    #[must_use]
    pub fn with_strategy(mut self, strategy: impl Into<String>) -> Self {
        self.strategy = Some(strategy.into());
        self
    }

    /// Get the 1-based trial index.
    #[must_use]
    pub const fn index(&self) -> u8 {
        self.index
    }

    /// Get the configuration that was executed.
    #[must_use]
    pub const fn configuration(&self) -> &TrialConfiguration {
        &self.configuration
    }

    /// Get the full quality score.
    #[must_use]
    pub const fn score(&self) -> &QualityScore {
        &self.quality
    }

    /// Get the overall quality in `[0, 1]`.
    #[must_use]
    pub const fn quality(&self) -> f64 {
        self.quality.overall()
    }

    /// Get the reported cost.
    #[must_use]
    pub const fn cost(&self) -> f64 {
        self.cost
    }

    /// Get the latency in milliseconds.
    #[must_use]
    pub const fn latency_ms(&self) -> f64 {
        self.latency_ms
    }

    /// Get the utility, once the run has finalized.
    #[must_use]
    pub const fn utility(&self) -> Option<f64> {
        self.utility
    }

    /// Get the generated output.
    #[must_use]
    pub fn output(&self) -> &str {
        &self.output
    }

    /// Get the judge response text.
    #[must_use]
    pub fn raw_judgment(&self) -> Option<&str> {
        self.raw_judgment.as_deref()
    }

    /// Get the generation strategy name.
    #[must_use]
    pub fn strategy(&self) -> Option<&str> {
        self.strategy.as_deref()
    }

    /// Get the completion timestamp.
    #[must_use]
    pub const fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub(crate) fn set_utility(&mut self, utility: f64) {
        self.utility = Some(utility);
    }
}

/// Stage at which a trial failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrialFailureKind {
    /// Generation boundary failed or returned unusable output.
    Generation,
    /// Judge output broke the rubric contract.
    Judgment,
    /// Judge provider could not be reached.
    JudgeUnavailable,
    /// Replay cache had no entry.
    CacheMiss,
    /// Anything else (storage, configuration).
    Other,
}

impl fmt::Display for TrialFailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Generation => "generation",
            Self::Judgment => "judgment",
            Self::JudgeUnavailable => "judge unavailable",
            Self::CacheMiss => "cache miss",
            Self::Other => "other",
        };
        f.write_str(label)
    }
}

/// Terminal failure of one trial, with everything needed to diagnose it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialFailure {
    trial_index: u8,
    configuration: BTreeMap<String, Value>,
    kind: TrialFailureKind,
    message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    raw_output: Option<String>,
    occurred_at: DateTime<Utc>,
}

impl TrialFailure {
    /// Create a failure for `configuration`.
    #[must_use]
    pub fn new(configuration: &TrialConfiguration, kind: TrialFailureKind, message: impl Into<String>) -> Self {
        Self {
            trial_index: configuration.index(),
            configuration: configuration.values().clone(),
            kind,
            message: message.into(),
            raw_output: None,
            occurred_at: Utc::now(),
        }
    }

    /// Classify a crate error raised while running `configuration`.
    ///
    /// Judge contract violations keep the raw judge text.
    #[must_use]
    pub fn from_error(configuration: &TrialConfiguration, error: &Error) -> Self {
        let (kind, raw) = match error {
            Error::MalformedJudgment { raw } | Error::IncompleteJudgment { raw, .. } => {
                (TrialFailureKind::Judgment, Some(raw.clone()))
            }
            Error::JudgmentUnavailable { .. } => (TrialFailureKind::JudgeUnavailable, None),
            Error::CacheMiss { .. } => (TrialFailureKind::CacheMiss, None),
            Error::GenerationFailure(_) => (TrialFailureKind::Generation, None),
            _ => (TrialFailureKind::Other, None),
        };
        let failure = Self::new(configuration, kind, error.to_string());
        match raw {
            Some(raw) => failure.with_raw_output(raw),
            None => failure,
        }
    }

    /// Attach the raw output that triggered the failure.
    #[must_use]
    pub fn with_raw_output(mut self, raw: impl Into<String>) -> Self {
        self.raw_output = Some(raw.into());
        self
    }

    /// Get the 1-based trial index.
    #[must_use]
    pub const fn trial_index(&self) -> u8 {
        self.trial_index
    }

    /// Get the configuration values that were being executed.
    #[must_use]
    pub const fn configuration(&self) -> &BTreeMap<String, Value> {
        &self.configuration
    }

    /// Get the failure stage.
    #[must_use]
    pub const fn kind(&self) -> TrialFailureKind {
        self.kind
    }

    /// Get the upstream error message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Get the raw output, if captured.
    #[must_use]
    pub fn raw_output(&self) -> Option<&str> {
        self.raw_output.as_deref()
    }

    /// Get when the failure happened.
    #[must_use]
    pub const fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }
}

impl fmt::Display for TrialFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let values = self
            .configuration
            .iter()
            .map(|(name, value)| format!("{name}={value}"))
            .collect::<Vec<_>>()
            .join(", ");
        write!(
            f,
            "Trial {} failed ({}) with configuration {{{values}}}: {}",
            self.trial_index, self.kind, self.message
        )
    }
}
