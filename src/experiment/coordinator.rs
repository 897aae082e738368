//! Experiment coordinator - sequences trials, persists, resumes
//!
//! Trials run strictly in index order, one at a time. After every state
//! transition the full snapshot is saved, so a crash loses at most the trial
//! in flight. Resume is keyed on trial index: slots holding a record are
//! skipped, everything else runs again.

use std::fmt;
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use super::{ExperimentRun, ExperimentSpec, RunEvent, RunStatus, RunStore};
use crate::kv::KvStore;
use crate::trial::TrialRunner;
use crate::{Error, Result};

/// What happens to the run when a trial fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Stop at the first failure; the run is Failed and resumable.
    #[default]
    Halt,
    /// Keep executing the remaining trials, then fail if any slot failed.
    RecordAndContinue,
}

/// Coordinator options.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    /// Failure handling.
    pub failure_policy: FailurePolicy,
    /// Fixed experiment ID; generated from the name and time when absent.
    pub experiment_id: Option<String>,
}

impl CoordinatorConfig {
    /// Set the failure policy.
    #[must_use]
    pub const fn failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    /// Use a fixed experiment ID.
    #[must_use]
    pub fn experiment_id(mut self, id: impl Into<String>) -> Self {
        self.experiment_id = Some(id.into());
        self
    }
}

/// Progress hook called with `(completed, total)` trial counts.
pub type ProgressFn = Arc<dyn Fn(usize, usize) + Send + Sync>;

/// Drives an [`ExperimentRun`] from Pending to Completed or Failed.
pub struct ExperimentCoordinator<S, R> {
    runner: TrialRunner<S>,
    store: R,
    config: CoordinatorConfig,
    progress: Option<ProgressFn>,
}

impl<S: fmt::Debug, R: fmt::Debug> fmt::Debug for ExperimentCoordinator<S, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExperimentCoordinator")
            .field("runner", &self.runner)
            .field("store", &self.store)
            .field("config", &self.config)
            .field("progress", &self.progress.is_some())
            .finish()
    }
}

impl<S: KvStore, R: RunStore> ExperimentCoordinator<S, R> {
    /// Create a coordinator.
    #[must_use]
    pub const fn new(runner: TrialRunner<S>, store: R, config: CoordinatorConfig) -> Self {
        Self {
            runner,
            store,
            config,
            progress: None,
        }
    }

    /// Report `(completed, total)` after every executed trial.
    ///
    /// `completed` counts slots holding a record, so a resumed run starts
    /// from what was already done.
    #[must_use]
    pub fn with_progress(mut self, progress: impl Fn(usize, usize) + Send + Sync + 'static) -> Self {
        self.progress = Some(Arc::new(progress));
        self
    }

    /// Get the snapshot store.
    #[must_use]
    pub const fn store(&self) -> &R {
        &self.store
    }

    /// Get the trial runner.
    #[must_use]
    pub const fn runner(&self) -> &TrialRunner<S> {
        &self.runner
    }

    /// Get the configuration.
    #[must_use]
    pub const fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    /// Start a fresh run of `spec`.
    ///
    /// Trial failures do not surface as `Err`: the returned run is Failed and
    /// carries the failure (see [`ExperimentRun::into_result`]).
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidDesign`] for a bad definition, or a storage
    /// error if a snapshot cannot be saved.
    pub async fn execute(&self, spec: ExperimentSpec) -> Result<ExperimentRun> {
        let now = Utc::now();
        let experiment_id = self
            .config
            .experiment_id
            .clone()
            .unwrap_or_else(|| spec.default_experiment_id(now));
        let run = ExperimentRun::new(experiment_id, spec, now)?;
        info!(experiment_id = run.experiment_id(), "starting experiment");
        self.drive(run).await
    }

    /// Continue a partial run.
    ///
    /// A Completed run is returned unchanged without touching the store.
    ///
    /// # Errors
    ///
    /// Returns [`Error::RunStateConflict`] if the snapshot is inconsistent,
    /// or a storage error if a snapshot cannot be saved.
    pub async fn resume(&self, run: ExperimentRun) -> Result<ExperimentRun> {
        if run.status() == RunStatus::Completed {
            info!(experiment_id = run.experiment_id(), "run already completed, nothing to resume");
            return Ok(run);
        }
        run.verify_integrity()?;
        info!(
            experiment_id = run.experiment_id(),
            pending = ?run.pending_indices(),
            "resuming experiment"
        );
        self.drive(run).await
    }

    /// Continue a partial run after checking it belongs to `spec`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::RunStateConflict`] if the run was created from a
    /// different definition; otherwise as [`resume`](Self::resume).
    pub async fn resume_with(&self, spec: &ExperimentSpec, run: ExperimentRun) -> Result<ExperimentRun> {
        if spec.config_hash()? != run.metadata().config_hash {
            return Err(Error::RunStateConflict(format!(
                "run '{}' was created from a different experiment definition",
                run.experiment_id()
            )));
        }
        self.resume(run).await
    }

    /// Load a run from the store and resume it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::RunStateConflict`] if nothing is stored under
    /// `experiment_id`; otherwise as [`resume`](Self::resume).
    pub async fn resume_from_store(&self, experiment_id: &str) -> Result<ExperimentRun> {
        let run = self.store.load(experiment_id).await?.ok_or_else(|| {
            Error::RunStateConflict(format!("no persisted run named '{experiment_id}'"))
        })?;
        self.resume(run).await
    }

    async fn drive(&self, run: ExperimentRun) -> Result<ExperimentRun> {
        let mut run = run.apply(RunEvent::Started { at: Utc::now() })?;
        self.store.save(&run).await?;

        for index in run.pending_indices() {
            let configuration = run
                .configuration(index)
                .cloned()
                .ok_or_else(|| Error::RunStateConflict(format!("trial {index} has no configuration")))?;

            match self.runner.run(&configuration, run.spec()).await {
                Ok(record) => {
                    run = run.apply(RunEvent::TrialSucceeded(record))?;
                    self.store.save(&run).await?;
                    self.report_progress(&run);
                }
                Err(failure) => {
                    warn!(experiment_id = run.experiment_id(), trial = index, error = %failure, "trial failed");
                    run = run.apply(RunEvent::TrialFailed(failure.clone()))?;
                    self.store.save(&run).await?;
                    self.report_progress(&run);
                    if self.config.failure_policy == FailurePolicy::Halt {
                        return self.halt(run, failure).await;
                    }
                }
            }
        }

        let first_failure = run.failures().next().cloned();
        if let Some(failure) = first_failure {
            return self.halt(run, failure).await;
        }

        let run = run.apply(RunEvent::Finalized { at: Utc::now() })?;
        self.store.save(&run).await?;
        info!(
            experiment_id = run.experiment_id(),
            best_trial = ?run.summary().map(|s| s.best_by_utility.first()),
            "experiment completed"
        );
        Ok(run)
    }

    fn report_progress(&self, run: &ExperimentRun) {
        if let Some(progress) = &self.progress {
            progress(run.records().count(), run.configurations().len());
        }
    }

    async fn halt(&self, run: ExperimentRun, failure: super::TrialFailure) -> Result<ExperimentRun> {
        error!(
            experiment_id = run.experiment_id(),
            trial = failure.trial_index(),
            error = %failure,
            "experiment halted; resume to retry failed trials"
        );
        let run = run.apply(RunEvent::Halted(failure))?;
        self.store.save(&run).await?;
        Ok(run)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults_to_halt() {
        let config = CoordinatorConfig::default();
        assert_eq!(config.failure_policy, FailurePolicy::Halt);
        assert!(config.experiment_id.is_none());
    }

    #[test]
    fn test_config_deserializes_policy() {
        let config: CoordinatorConfig =
            serde_json::from_str(r#"{"failure_policy": "record_and_continue"}"#).unwrap();
        assert_eq!(config.failure_policy, FailurePolicy::RecordAndContinue);
    }
}
