//! Trial runner
//!
//! Executes one configuration end to end: pick the generation strategy,
//! call it, check the measurements, then judge the output. Utility is not
//! computed here; it needs the cost and latency range of the whole run.
//!
//! Every failure comes back as a [`TrialFailure`] value carrying the trial
//! index and exact configuration, so the coordinator can apply its failure
//! policy uniformly.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::design::TrialConfiguration;
use crate::experiment::{ExperimentSpec, TrialFailure, TrialFailureKind, TrialRecord};
use crate::judge::{JudgeContext, QualityJudge};
use crate::kv::KvStore;
use crate::{Error, Result};

/// Configuration variable that selects the generation strategy.
pub const STRATEGY_VARIABLE: &str = "strategy";

/// Strategy used when no `strategy` variable is present.
pub const DEFAULT_STRATEGY: &str = "standard";

/// What the generation boundary reports back.
#[derive(Debug, Clone, PartialEq)]
pub struct Generation {
    /// Generated text.
    pub text: String,
    /// Reported cost, in the caller's currency unit.
    pub cost: f64,
    /// Reported latency; wall-clock time is measured when absent.
    pub latency_ms: Option<f64>,
}

impl Generation {
    /// Output with a cost and no reported latency.
    #[must_use]
    pub fn new(text: impl Into<String>, cost: f64) -> Self {
        Self {
            text: text.into(),
            cost,
            latency_ms: None,
        }
    }

    /// Report the latency explicitly.
    #[must_use]
    pub const fn with_latency_ms(mut self, latency_ms: f64) -> Self {
        self.latency_ms = Some(latency_ms);
        self
    }
}

/// Inputs for one generation call.
#[derive(Debug, Clone, Copy)]
pub struct GenerationRequest<'a> {
    /// 1-based trial index.
    pub trial_index: u8,
    /// Variable name → level value for this trial.
    pub values: &'a BTreeMap<String, Value>,
    /// Workflow identifier.
    pub workflow: &'a str,
    /// Opaque workflow payload from the experiment definition.
    pub workflow_config: &'a Value,
    /// Seed from the experiment definition.
    pub seed: Option<u64>,
}

/// Generation boundary.
///
/// Implementations own prompt construction and the model call; failures use
/// `anyhow` so the full cause chain reaches the trial failure.
#[async_trait]
pub trait GenerationStrategy: Send + Sync {
    /// Produce output for one trial.
    async fn generate(&self, request: &GenerationRequest<'_>) -> anyhow::Result<Generation>;
}

/// Name → strategy mapping injected into the runner.
#[derive(Clone, Default)]
pub struct StrategyRegistry {
    strategies: BTreeMap<String, Arc<dyn GenerationStrategy>>,
}

impl std::fmt::Debug for StrategyRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StrategyRegistry")
            .field("strategies", &self.names())
            .finish()
    }
}

impl StrategyRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with a single `standard` strategy.
    #[must_use]
    pub fn with_standard(strategy: Arc<dyn GenerationStrategy>) -> Self {
        Self::new().register(DEFAULT_STRATEGY, strategy)
    }

    /// Add or replace a strategy.
    #[must_use]
    pub fn register(mut self, name: impl Into<String>, strategy: Arc<dyn GenerationStrategy>) -> Self {
        self.strategies.insert(name.into(), strategy);
        self
    }

    /// Registered names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.strategies.keys().map(String::as_str).collect()
    }

    /// Look up a strategy by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Arc<dyn GenerationStrategy>> {
        self.strategies.get(name)
    }

    /// Pick the strategy selected by a configuration's `strategy` value.
    ///
    /// # Errors
    ///
    /// Returns [`Error::GenerationFailure`] for a non-string selector or an
    /// unregistered name.
    pub fn resolve(&self, values: &BTreeMap<String, Value>) -> Result<(&str, &Arc<dyn GenerationStrategy>)> {
        let name = match values.get(STRATEGY_VARIABLE) {
            None => DEFAULT_STRATEGY,
            Some(Value::String(name)) => name.as_str(),
            Some(other) => {
                return Err(Error::GenerationFailure(format!(
                    "strategy selector must be a string, got {other}"
                )))
            }
        };
        self.strategies
            .get_key_value(name)
            .map(|(name, strategy)| (name.as_str(), strategy))
            .ok_or_else(|| {
                Error::GenerationFailure(format!(
                    "unknown generation strategy '{name}'; available strategies: {}",
                    self.names().join(", ")
                ))
            })
    }
}

/// Runs single trials.
#[derive(Debug)]
pub struct TrialRunner<S> {
    strategies: StrategyRegistry,
    judge: QualityJudge<S>,
}

impl<S: KvStore> TrialRunner<S> {
    /// Create a runner.
    #[must_use]
    pub const fn new(strategies: StrategyRegistry, judge: QualityJudge<S>) -> Self {
        Self { strategies, judge }
    }

    /// Get the judge.
    #[must_use]
    pub const fn judge(&self) -> &QualityJudge<S> {
        &self.judge
    }

    /// Get the strategy registry.
    #[must_use]
    pub const fn strategies(&self) -> &StrategyRegistry {
        &self.strategies
    }

    /// Execute one configuration.
    ///
    /// # Errors
    ///
    /// Returns a [`TrialFailure`] for any generation or judgment failure.
    pub async fn run(
        &self,
        configuration: &TrialConfiguration,
        spec: &ExperimentSpec,
    ) -> std::result::Result<TrialRecord, TrialFailure> {
        let index = configuration.index();
        let (strategy_name, strategy) = self
            .strategies
            .resolve(configuration.values())
            .map_err(|e| TrialFailure::from_error(configuration, &e))?;

        info!(trial = index, strategy = strategy_name, config = %configuration.describe(), "running trial");

        let request = GenerationRequest {
            trial_index: index,
            values: configuration.values(),
            workflow: spec.workflow(),
            workflow_config: spec.workflow_config(),
            seed: spec.seed(),
        };
        let started = Instant::now();
        let generation = strategy.generate(&request).await.map_err(|e| {
            TrialFailure::new(configuration, TrialFailureKind::Generation, format!("{e:#}"))
        })?;
        let measured_ms = started.elapsed().as_secs_f64() * 1000.0;

        let (cost, latency_ms) = check_generation(index, &generation, measured_ms)
            .map_err(|e| TrialFailure::from_error(configuration, &e))?;

        let judgment = self
            .judge
            .evaluate_raw(&generation.text, spec.rubric(), &JudgeContext::for_trial(index))
            .await
            .map_err(|e| TrialFailure::from_error(configuration, &e))?;

        info!(
            trial = index,
            quality = judgment.score.overall(),
            cost,
            latency_ms,
            "trial completed"
        );

        Ok(TrialRecord::new(configuration.clone(), judgment.score, cost, latency_ms)
            .with_output(generation.text)
            .with_raw_judgment(judgment.raw)
            .with_strategy(strategy_name))
    }
}

/// Validate the boundary's report and settle cost and latency.
fn check_generation(index: u8, generation: &Generation, measured_ms: f64) -> Result<(f64, f64)> {
    if generation.text.trim().is_empty() {
        return Err(Error::GenerationFailure("generation produced empty output".into()));
    }
    if !generation.cost.is_finite() {
        return Err(Error::GenerationFailure(format!(
            "generation reported non-finite cost {}",
            generation.cost
        )));
    }
    let latency_ms = match generation.latency_ms {
        Some(reported) if !reported.is_finite() => {
            return Err(Error::GenerationFailure(format!(
                "generation reported non-finite latency {reported}"
            )))
        }
        Some(reported) => reported,
        None => {
            debug!(trial = index, measured_ms, "no reported latency, using wall clock");
            measured_ms
        }
    };
    if generation.cost < 0.0 || latency_ms < 0.0 {
        warn!(trial = index, cost = generation.cost, latency_ms, "negative measurement clamped to zero");
    }
    Ok((generation.cost.max(0.0), latency_ms.max(0.0)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::design::Variable;
    use crate::judge::{JudgeClient, JudgeConfig, JudgeRequest, ProviderError, RetryPolicy};

    struct Echo;

    #[async_trait]
    impl GenerationStrategy for Echo {
        async fn generate(&self, request: &GenerationRequest<'_>) -> anyhow::Result<Generation> {
            Ok(Generation::new(format!("output for trial {}", request.trial_index), 0.01)
                .with_latency_ms(120.0))
        }
    }

    struct Failing;

    #[async_trait]
    impl GenerationStrategy for Failing {
        async fn generate(&self, _request: &GenerationRequest<'_>) -> anyhow::Result<Generation> {
            Err(anyhow::anyhow!("connection reset").context("model call failed"))
        }
    }

    struct FixedJudge(&'static str);

    #[async_trait]
    impl JudgeClient for FixedJudge {
        async fn complete(&self, _request: &JudgeRequest) -> std::result::Result<String, ProviderError> {
            Ok(self.0.to_string())
        }
    }

    fn spec() -> ExperimentSpec {
        ExperimentSpec::builder("runner", "demo")
            .variables([
                Variable::new("model", "A", "B").unwrap(),
                Variable::new("temperature", 0.3, 0.7).unwrap(),
                Variable::new("context", "small", "large").unwrap(),
                Variable::new("strategy", "standard", "cot").unwrap(),
            ])
            .build()
            .unwrap()
    }

    fn runner(registry: StrategyRegistry, judge_response: &'static str) -> TrialRunner<crate::kv::MemoryKvStore> {
        let config = JudgeConfig::default().retry(RetryPolicy::immediate(1));
        let judge = QualityJudge::uncached(Arc::new(FixedJudge(judge_response)), config).unwrap();
        TrialRunner::new(registry, judge)
    }

    const ALL_EIGHTS: &str =
        r#"{"clarity": 8, "accuracy": 8, "completeness": 8, "usefulness": 8}"#;

    #[tokio::test]
    async fn test_run_produces_record_with_selected_strategy() {
        let registry = StrategyRegistry::with_standard(Arc::new(Echo)).register("cot", Arc::new(Echo));
        let runner = runner(registry, ALL_EIGHTS);
        let spec = spec();
        let configs = crate::design::generate(spec.variables()).unwrap();

        let record = runner.run(&configs[1], &spec).await.unwrap();

        assert_eq!(record.index(), 2);
        assert_eq!(record.strategy(), Some("cot"));
        assert!((record.quality() - 0.8).abs() < 1e-12);
        assert!((record.latency_ms() - 120.0).abs() < f64::EPSILON);
        assert_eq!(record.output(), "output for trial 2");
        assert_eq!(record.raw_judgment(), Some(ALL_EIGHTS));
    }

    #[tokio::test]
    async fn test_unknown_strategy_lists_available() {
        let runner = runner(StrategyRegistry::with_standard(Arc::new(Echo)), ALL_EIGHTS);
        let spec = spec();
        let configs = crate::design::generate(spec.variables()).unwrap();

        let failure = runner.run(&configs[1], &spec).await.unwrap_err();

        assert_eq!(failure.kind(), TrialFailureKind::Generation);
        assert!(failure.message().contains("'cot'"));
        assert!(failure.message().contains("standard"));
    }

    #[tokio::test]
    async fn test_generation_error_keeps_cause_chain() {
        let runner = runner(StrategyRegistry::with_standard(Arc::new(Failing)), ALL_EIGHTS);
        let spec = spec();
        let configs = crate::design::generate(spec.variables()).unwrap();

        let failure = runner.run(&configs[0], &spec).await.unwrap_err();

        assert_eq!(failure.trial_index(), 1);
        assert_eq!(failure.message(), "model call failed: connection reset");
        assert_eq!(failure.configuration(), configs[0].values());
    }

    #[tokio::test]
    async fn test_incomplete_judgment_is_judgment_failure() {
        let runner = runner(
            StrategyRegistry::with_standard(Arc::new(Echo)),
            r#"{"clarity": 8}"#,
        );
        let spec = spec();
        let configs = crate::design::generate(spec.variables()).unwrap();

        let failure = runner.run(&configs[0], &spec).await.unwrap_err();

        assert_eq!(failure.kind(), TrialFailureKind::Judgment);
        assert_eq!(failure.raw_output(), Some(r#"{"clarity": 8}"#));
    }

    #[test]
    fn test_check_generation_rules() {
        assert!(check_generation(1, &Generation::new("  ", 0.1), 5.0).is_err());
        assert!(check_generation(1, &Generation::new("x", f64::NAN), 5.0).is_err());
        assert!(check_generation(1, &Generation::new("x", 0.1).with_latency_ms(f64::INFINITY), 5.0).is_err());

        let (cost, latency) = check_generation(1, &Generation::new("x", -0.5), 42.0).unwrap();
        assert_eq!(cost, 0.0);
        assert!((latency - 42.0).abs() < f64::EPSILON);

        let (_, reported) = check_generation(1, &Generation::new("x", 0.1).with_latency_ms(7.0), 42.0).unwrap();
        assert!((reported - 7.0).abs() < f64::EPSILON);
    }
}
