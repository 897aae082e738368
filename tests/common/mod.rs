//! Scripted generation and judge boundaries shared by the integration tests.
//!
//! The generator embeds a `[[quality=…]]` marker in its output; the judge
//! reads the marker back out of the prompt and scores every default rubric
//! dimension with it. Outputs differ per configuration, so cache keys do too.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use flowtune::design::Variable;
use flowtune::experiment::{ExperimentSpec, UtilityWeights};
use flowtune::judge::{JudgeClient, JudgeRequest, ProviderError};
use flowtune::trial::{Generation, GenerationRequest, GenerationStrategy, StrategyRegistry};
use serde_json::{json, Value};

type Metric = Box<dyn Fn(&BTreeMap<String, Value>) -> f64 + Send + Sync>;

/// Generator whose quality and cost are functions of the configuration.
pub struct ScriptedGenerator {
    quality: Metric,
    cost: Metric,
    latency_ms: f64,
    failures: Mutex<BTreeMap<u8, u32>>,
    calls: Mutex<Vec<u8>>,
}

impl ScriptedGenerator {
    pub fn new(
        quality: impl Fn(&BTreeMap<String, Value>) -> f64 + Send + Sync + 'static,
        cost: impl Fn(&BTreeMap<String, Value>) -> f64 + Send + Sync + 'static,
    ) -> Self {
        Self {
            quality: Box::new(quality),
            cost: Box::new(cost),
            latency_ms: 100.0,
            failures: Mutex::new(BTreeMap::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Make `trial` fail its next `times` calls.
    pub fn fail_trial(self, trial: u8, times: u32) -> Self {
        self.failures.lock().unwrap().insert(trial, times);
        self
    }

    pub fn calls(&self) -> Vec<u8> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl GenerationStrategy for ScriptedGenerator {
    async fn generate(&self, request: &GenerationRequest<'_>) -> anyhow::Result<Generation> {
        self.calls.lock().unwrap().push(request.trial_index);
        {
            let mut failures = self.failures.lock().unwrap();
            if let Some(remaining) = failures.get_mut(&request.trial_index) {
                if *remaining > 0 {
                    *remaining -= 1;
                    anyhow::bail!("provider timeout on trial {}", request.trial_index);
                }
            }
        }

        let quality = (self.quality)(request.values);
        let text = format!(
            "[[quality={quality:.6}]] draft for trial {} of {}",
            request.trial_index, request.workflow
        );
        Ok(Generation::new(text, (self.cost)(request.values)).with_latency_ms(self.latency_ms))
    }
}

/// Judge that echoes the quality marker as every default rubric dimension.
#[derive(Default)]
pub struct MarkerJudge {
    calls: Mutex<u32>,
}

impl MarkerJudge {
    pub fn calls(&self) -> u32 {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl JudgeClient for MarkerJudge {
    async fn complete(&self, request: &JudgeRequest) -> Result<String, ProviderError> {
        *self.calls.lock().unwrap() += 1;
        let start = request
            .prompt
            .find("[[quality=")
            .ok_or_else(|| ProviderError::Rejected("no quality marker".into()))?
            + "[[quality=".len();
        let end = request.prompt[start..]
            .find("]]")
            .ok_or_else(|| ProviderError::Rejected("unterminated marker".into()))?;
        let quality: f64 = request.prompt[start..start + end]
            .parse()
            .map_err(|_| ProviderError::Rejected("bad marker".into()))?;

        let dimension = json!({ "score": quality, "rationale": "scripted" });
        Ok(format!(
            "Here is my assessment:\n```json\n{}\n```",
            json!({
                "clarity": dimension,
                "accuracy": dimension,
                "completeness": dimension,
                "usefulness": dimension,
            })
        ))
    }
}

pub fn is(values: &BTreeMap<String, Value>, name: &str, expected: &str) -> bool {
    values.get(name).and_then(Value::as_str) == Some(expected)
}

/// Model dominates quality; chain-of-thought adds a little; large costs more.
pub fn scenario_generator() -> ScriptedGenerator {
    ScriptedGenerator::new(
        |v| {
            0.6 + if is(v, "model", "large") { 0.2 } else { 0.0 }
                + if is(v, "strategy", "cot") { 0.05 } else { 0.0 }
        },
        |v| if is(v, "model", "large") { 0.03 } else { 0.01 },
    )
}

pub fn scenario_spec(name: &str) -> ExperimentSpec {
    ExperimentSpec::builder(name, "code_review")
        .variables([
            Variable::new("model", "small", "large").unwrap(),
            Variable::new("temperature", 0.3, 0.7).unwrap(),
            Variable::new("context", "short", "full").unwrap(),
            Variable::new("strategy", "standard", "cot").unwrap(),
        ])
        .weights(UtilityWeights {
            quality: 1.0,
            cost: 0.1,
            time: 0.05,
        })
        .workflow_config(json!({ "language": "rust" }))
        .seed(42)
        .build()
        .unwrap()
}

pub fn registry(generator: Arc<ScriptedGenerator>) -> StrategyRegistry {
    StrategyRegistry::with_standard(generator.clone()).register("cot", generator)
}
