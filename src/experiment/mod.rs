//! Experiment execution and persisted run state
//!
//! ## Schema Overview
//!
//! ```text
//! ExperimentSpec ──generate──> TrialConfiguration (8)
//!        │
//!        └──> ExperimentRun
//!               ├── metadata (config hash, created_at, seed)
//!               ├── TrialSlot (8): Pending | Completed{TrialRecord} | Failed{TrialFailure}
//!               ├── normalization (once Completed)
//!               └── summary: main effects, frontier, rankings (once Completed)
//! ```
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use flowtune::design::Variable;
//! use flowtune::experiment::{
//!     CoordinatorConfig, ExperimentCoordinator, ExperimentSpec, MemoryRunStore,
//! };
//! use flowtune::judge::{JudgeClient, JudgeConfig, QualityJudge};
//! use flowtune::trial::{GenerationStrategy, StrategyRegistry, TrialRunner};
//!
//! # async fn example(
//! #     generator: Arc<dyn GenerationStrategy>,
//! #     judge_client: Arc<dyn JudgeClient>,
//! # ) -> flowtune::Result<()> {
//! let spec = ExperimentSpec::builder("tuning", "code_review")
//!     .variable(Variable::new("model", "small", "large")?)
//!     .variable(Variable::new("temperature", 0.3, 0.7)?)
//!     .variable(Variable::new("context", "short", "full")?)
//!     .variable(Variable::new("strategy", "standard", "cot")?)
//!     .build()?;
//!
//! let registry = StrategyRegistry::with_standard(generator.clone()).register("cot", generator);
//! let judge = QualityJudge::uncached(judge_client, JudgeConfig::default())?;
//! let coordinator = ExperimentCoordinator::new(
//!     TrialRunner::new(registry, judge),
//!     MemoryRunStore::new(),
//!     CoordinatorConfig::default(),
//! );
//!
//! let run = coordinator.execute(spec).await?.into_result()?;
//! println!("{:?}", run.summary().map(|s| &s.main_effects.optimal_configuration));
//! # Ok(())
//! # }
//! ```

mod coordinator;
mod experiment_record;
mod run_record;
mod store;
mod trial_record;
mod utility;

pub use coordinator::{CoordinatorConfig, ExperimentCoordinator, FailurePolicy, ProgressFn};
pub use experiment_record::{ExperimentMetadata, ExperimentSpec, ExperimentSpecBuilder, UtilityWeights};
pub use run_record::{ExperimentRun, RunEvent, RunStatus, TrialSlot};
pub use store::{JsonRunStore, MemoryRunStore, RunStore};
pub use trial_record::{TrialFailure, TrialFailureKind, TrialRecord};
pub use utility::{Bounds, Normalization};
