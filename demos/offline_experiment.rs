//! Offline Experiment Example
//!
//! Runs a full L8 experiment against scripted generation and judge
//! boundaries, persists every snapshot to disk, records judge responses in
//! the filesystem cache, then replays the run without touching the judge.
//!
//! Run with: cargo run --example offline_experiment
//! Verbose:  RUST_LOG=flowtune=debug cargo run --example offline_experiment

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use flowtune::analysis::{analyze, compare_configurations, export_optimal_config, Axis, ParetoFrontier};
use flowtune::cache::CacheMode;
use flowtune::design::Variable;
use flowtune::experiment::{
    CoordinatorConfig, ExperimentCoordinator, ExperimentSpec, JsonRunStore, UtilityWeights,
};
use flowtune::judge::{JudgeClient, JudgeConfig, JudgeRequest, ProviderError, QualityJudge};
use flowtune::kv::FileKvStore;
use flowtune::logging::init_tracing;
use flowtune::trial::{Generation, GenerationRequest, GenerationStrategy, StrategyRegistry, TrialRunner};
use serde_json::{json, Value};

/// Pretends to be a model call: bigger models and richer context cost more
/// and read better.
struct ScriptedReviewer {
    chain_of_thought: bool,
}

fn pick<'a>(values: &'a BTreeMap<String, Value>, name: &str) -> &'a str {
    values.get(name).and_then(Value::as_str).unwrap_or_default()
}

#[async_trait]
impl GenerationStrategy for ScriptedReviewer {
    async fn generate(&self, request: &GenerationRequest<'_>) -> anyhow::Result<Generation> {
        let large = pick(request.values, "model") == "large";
        let full_context = pick(request.values, "context") == "full";
        let with_examples = request.values.get("examples").and_then(Value::as_bool) == Some(true);

        let mut grade = 5.5;
        grade += if large { 2.0 } else { 0.0 };
        grade += if full_context { 0.6 } else { 0.0 };
        grade += if self.chain_of_thought { 0.8 } else { 0.0 };
        grade += if with_examples { 0.3 } else { 0.0 };

        let cost = 0.002 * if large { 10.0 } else { 1.0 } * if full_context { 1.5 } else { 1.0 };
        let latency = 400.0 + if large { 900.0 } else { 0.0 } + if self.chain_of_thought { 600.0 } else { 0.0 };

        Ok(Generation::new(
            format!("grade={grade:.1}\nReview of trial {}: looks reasonable.", request.trial_index),
            cost,
        )
        .with_latency_ms(latency))
    }
}

/// Reads the grade back out of the candidate and answers in a 1-10 scale,
/// wrapped in prose the way real judges often do.
#[derive(Default)]
struct ScriptedJudge;

#[async_trait]
impl JudgeClient for ScriptedJudge {
    async fn complete(&self, request: &JudgeRequest) -> Result<String, ProviderError> {
        let grade: f64 = request
            .prompt
            .split("grade=")
            .nth(1)
            .and_then(|rest| rest.split_whitespace().next())
            .and_then(|g| g.parse().ok())
            .ok_or_else(|| ProviderError::Rejected("candidate carries no grade".into()))?;
        let dim = |offset: f64| json!({ "score": (grade + offset).clamp(1.0, 10.0), "reasoning": "scripted" });
        Ok(format!(
            "Here is my evaluation:\n{}",
            json!({
                "clarity": dim(0.2),
                "accuracy": dim(0.0),
                "completeness": dim(-0.3),
                "usefulness": dim(0.1),
            })
        ))
    }
}

fn spec() -> flowtune::Result<ExperimentSpec> {
    ExperimentSpec::builder("code review tuning", "code_review")
        .variable(Variable::new("model", "small", "large")?)
        .variable(Variable::new("temperature", 0.3, 0.7)?)
        .variable(Variable::new("context", "diff", "full")?)
        .variable(Variable::new("strategy", "standard", "cot")?)
        .variable(Variable::new("examples", false, true)?)
        .weights(UtilityWeights {
            quality: 1.0,
            cost: 0.1,
            time: 0.05,
        })
        .workflow_config(json!({ "max_files": 5 }))
        .seed(42)
        .build()
}

fn coordinator(
    judge: Arc<dyn JudgeClient>,
    cache: FileKvStore,
    mode: CacheMode,
    runs: JsonRunStore<FileKvStore>,
    experiment_id: &str,
) -> flowtune::Result<ExperimentCoordinator<FileKvStore, JsonRunStore<FileKvStore>>> {
    let registry = StrategyRegistry::with_standard(Arc::new(ScriptedReviewer { chain_of_thought: false }))
        .register("cot", Arc::new(ScriptedReviewer { chain_of_thought: true }));
    let judge = QualityJudge::new(judge, cache, JudgeConfig::default().cache_mode(mode))?;
    Ok(ExperimentCoordinator::new(
        TrialRunner::new(registry, judge),
        runs,
        CoordinatorConfig::default().experiment_id(experiment_id),
    ))
}

#[tokio::main]
async fn main() -> flowtune::Result<()> {
    init_tracing("flowtune=info")?;
    println!("=== Flowtune Offline Experiment ===\n");

    let workspace = tempfile::tempdir()?;
    let cache = FileKvStore::open(workspace.path().join("judge_cache"))?;
    let runs = JsonRunStore::open(workspace.path().join("runs"))?;

    // -------------------------------------------------------------------------
    // 1. Record: run all 8 trials, caching every judge response
    // -------------------------------------------------------------------------
    println!("1. Running experiment (record mode)...");
    let recorder = coordinator(
        Arc::new(ScriptedJudge),
        cache.clone(),
        CacheMode::Record,
        runs,
        "code-review-demo",
    )?;
    let run = recorder.execute(spec()?).await?.into_result()?;

    println!("   Experiment: {}", run.experiment_id());
    println!("   Status:     {:?}", run.status());
    for record in run.records() {
        println!(
            "   Trial {}: quality={:.3} cost=${:.4} latency={:.0}ms utility={:.3}  [{}]",
            record.index(),
            record.quality(),
            record.cost(),
            record.latency_ms(),
            record.utility().unwrap_or_default(),
            record.configuration().describe()
        );
    }

    // -------------------------------------------------------------------------
    // 2. Main effects
    // -------------------------------------------------------------------------
    println!("\n2. Main effects (by contribution)...");
    let effects = analyze(&run)?;
    for effect in effects.ranked() {
        println!(
            "   {:<12} {:>6.2}%  effect={:+.4}  prefer {}",
            effect.variable,
            effect.contribution_pct,
            effect.effect_size,
            effect.preferred_value()
        );
    }
    println!("   Best trial: {}", effects.best_trial);
    if let Some(pct) = effects.quality_improvement_pct {
        println!("   Quality improvement vs baseline: {pct:+.1}%");
    }

    let baseline = run.configuration(run.baseline_index()).map(|c| c.values().clone()).unwrap_or_default();
    for change in compare_configurations(&baseline, &effects.optimal_configuration) {
        if change.changed {
            println!(
                "   change {}: {} -> {}",
                change.variable,
                change.baseline.unwrap_or(Value::Null),
                change.candidate.unwrap_or(Value::Null)
            );
        }
    }

    // -------------------------------------------------------------------------
    // 3. Pareto frontiers
    // -------------------------------------------------------------------------
    println!("\n3. Pareto frontier (cost vs quality)...");
    let frontier = ParetoFrontier::compute(&run, Axis::Cost, Axis::Quality)?;
    for point in frontier.optimal_points() {
        println!("   Trial {}: cost=${:.4} quality={:.3}", point.trial_index, point.x, point.y);
    }

    let budgeted = ParetoFrontier::with_budget(&run, Axis::Cost, Axis::Quality, 0.01)?;
    if let Some(best) = budgeted.best_within_budget() {
        println!("   Best under $0.01: trial {} (quality={:.3})", best.trial_index, best.y);
    }

    let latency = ParetoFrontier::compute(&run, Axis::Latency, Axis::Utility)?;
    println!(
        "   Latency/utility frontier: {:?}",
        latency.optimal_points().iter().map(|p| p.trial_index).collect::<Vec<_>>()
    );

    // -------------------------------------------------------------------------
    // 4. Export and replay
    // -------------------------------------------------------------------------
    let export = workspace.path().join("optimal.yaml");
    export_optimal_config(&run, &effects, &export)?;
    println!("\n4. Optimal configuration:\n{}", std::fs::read_to_string(&export)?);

    println!("5. Replaying offline (judge disabled)...");
    let replayer = coordinator(
        Arc::new(Offline),
        cache,
        CacheMode::Replay,
        JsonRunStore::open(workspace.path().join("replay_runs"))?,
        "code-review-replay",
    )?;
    let replay = replayer.execute(spec()?).await?.into_result()?;
    let identical = run
        .records()
        .zip(replay.records())
        .all(|(a, b)| a.quality() == b.quality());
    println!("   Replay matches recorded qualities: {identical}");

    Ok(())
}

struct Offline;

#[async_trait]
impl JudgeClient for Offline {
    async fn complete(&self, _request: &JudgeRequest) -> Result<String, ProviderError> {
        Err(ProviderError::Rejected("offline".into()))
    }
}
