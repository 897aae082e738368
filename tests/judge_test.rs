//! Judge cache tests against the filesystem backend: record once, replay
//! offline, read through.

mod common;

use std::sync::Arc;

use async_trait::async_trait;
use common::{registry, scenario_generator, scenario_spec, MarkerJudge};
use flowtune::cache::{cache_key, CacheMode};
use flowtune::experiment::{
    CoordinatorConfig, ExperimentCoordinator, MemoryRunStore, RunStatus, TrialFailureKind,
};
use flowtune::judge::{
    build_prompt, JudgeClient, JudgeConfig, JudgeContext, JudgeRequest, ProviderError,
    QualityJudge, RetryPolicy, Rubric,
};
use flowtune::kv::{FileKvStore, KvStore};
use flowtune::trial::TrialRunner;
use flowtune::Error;

/// Judge that must never be reached.
struct Offline;

#[async_trait]
impl JudgeClient for Offline {
    async fn complete(&self, _request: &JudgeRequest) -> Result<String, ProviderError> {
        Err(ProviderError::Rejected("network disabled".into()))
    }
}

fn config(mode: CacheMode) -> JudgeConfig {
    JudgeConfig::default()
        .cache_mode(mode)
        .retry(RetryPolicy::immediate(1))
}

fn coordinator(
    client: Arc<dyn JudgeClient>,
    cache_dir: &std::path::Path,
    mode: CacheMode,
    experiment_id: &str,
) -> ExperimentCoordinator<FileKvStore, MemoryRunStore> {
    let judge = QualityJudge::new(client, FileKvStore::open(cache_dir).unwrap(), config(mode)).unwrap();
    ExperimentCoordinator::new(
        TrialRunner::new(registry(Arc::new(scenario_generator())), judge),
        MemoryRunStore::new(),
        CoordinatorConfig::default().experiment_id(experiment_id),
    )
}

#[tokio::test]
async fn test_recorded_run_replays_offline() {
    let cache_dir = tempfile::tempdir().unwrap();
    let judge = Arc::new(MarkerJudge::default());

    let recorded = coordinator(judge.clone(), cache_dir.path(), CacheMode::Record, "record")
        .execute(scenario_spec("cached"))
        .await
        .unwrap();
    assert!(recorded.is_completed());
    assert_eq!(judge.calls(), 8);

    let replayed = coordinator(Arc::new(Offline), cache_dir.path(), CacheMode::Replay, "replay")
        .execute(scenario_spec("cached"))
        .await
        .unwrap();

    assert!(replayed.is_completed());
    for (a, b) in recorded.records().zip(replayed.records()) {
        assert_eq!(a.quality(), b.quality());
        assert_eq!(a.raw_judgment(), b.raw_judgment());
        let trace = b.score().cache_trace().unwrap();
        assert!(trace.hit);
        assert!(!trace.recorded);
        assert_eq!(Some(&trace.key), a.score().cache_trace().map(|t| &t.key));
    }
}

#[tokio::test]
async fn test_replay_miss_fails_trial_without_calling_judge() {
    let cache_dir = tempfile::tempdir().unwrap();

    let run = coordinator(Arc::new(Offline), cache_dir.path(), CacheMode::Replay, "miss")
        .execute(scenario_spec("miss"))
        .await
        .unwrap();

    assert_eq!(run.status(), RunStatus::Failed);
    let failure = run.error().unwrap();
    assert_eq!(failure.trial_index(), 1);
    assert_eq!(failure.kind(), TrialFailureKind::CacheMiss);
}

#[tokio::test]
async fn test_read_through_calls_judge_once_per_prompt() {
    let cache_dir = tempfile::tempdir().unwrap();
    let judge = Arc::new(MarkerJudge::default());

    for id in ["first", "second"] {
        let run = coordinator(judge.clone(), cache_dir.path(), CacheMode::ReadThrough, id)
            .execute(scenario_spec("read_through"))
            .await
            .unwrap();
        assert!(run.is_completed());
    }

    assert_eq!(judge.calls(), 8);
}

#[tokio::test]
async fn test_cache_entry_lands_under_request_key() {
    let cache_dir = tempfile::tempdir().unwrap();
    let store = FileKvStore::open(cache_dir.path()).unwrap();
    let judge = QualityJudge::new(
        Arc::new(MarkerJudge::default()),
        store.clone(),
        config(CacheMode::Record),
    )
    .unwrap();
    let rubric = Rubric::default();
    let candidate = "[[quality=0.700000]] standalone candidate";

    let score = judge
        .evaluate(candidate, &rubric, &JudgeContext::default())
        .await
        .unwrap();

    let expected = cache_key(
        &build_prompt(candidate, &rubric, None),
        "anthropic/claude-3.5-sonnet",
        0.3,
    );
    assert_eq!(score.cache_trace().unwrap().key, expected);
    assert!(store.exists(&expected).await.unwrap());
    assert!((score.overall() - 0.7).abs() < 1e-12);
}

#[tokio::test]
async fn test_provider_rejection_surfaces_as_unavailable() {
    let judge = QualityJudge::uncached(Arc::new(Offline), config(CacheMode::Disabled)).unwrap();

    let err = judge
        .evaluate("some output", &Rubric::default(), &JudgeContext::for_trial(2))
        .await
        .unwrap_err();

    match err {
        Error::JudgmentUnavailable { attempts, last_error } => {
            assert_eq!(attempts, 1);
            assert!(last_error.contains("network disabled"));
        }
        other => panic!("expected JudgmentUnavailable, got {other:?}"),
    }
}
