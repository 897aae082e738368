//! Experiment Run - persisted state of one execution of the design
//!
//! ## Lifecycle
//!
//! ```text
//! Pending ──Started──> Running ──Finalized──> Completed
//!                        │  ^
//!                  Halted│  │Started (resume)
//!                        v  │
//!                       Failed
//! ```
//!
//! Every change goes through [`ExperimentRun::apply`], a pure function of the
//! current state and a [`RunEvent`]. The coordinator persists the returned
//! snapshot after each transition.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::utility::Normalization;
use super::{ExperimentMetadata, ExperimentSpec, TrialFailure, TrialRecord};
use crate::analysis::RunSummary;
use crate::design::{self, TrialConfiguration, TRIAL_COUNT};
use crate::{Error, Result};

/// Status of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunStatus {
    /// Run is created but no trial has started.
    Pending,
    /// Trials are executing.
    Running,
    /// All trials recorded and utility finalized.
    Completed,
    /// A trial failed; the run can be resumed.
    Failed,
}

/// Outcome slot for one trial index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum TrialSlot {
    /// Not executed yet.
    Pending,
    /// Executed successfully.
    Completed {
        /// The trial outcome.
        record: TrialRecord,
    },
    /// Last attempt failed.
    Failed {
        /// Why it failed.
        failure: TrialFailure,
    },
}

impl TrialSlot {
    /// Get the record if the slot completed.
    #[must_use]
    pub const fn record(&self) -> Option<&TrialRecord> {
        match self {
            Self::Completed { record } => Some(record),
            _ => None,
        }
    }

    /// Get the failure if the slot failed.
    #[must_use]
    pub const fn failure(&self) -> Option<&TrialFailure> {
        match self {
            Self::Failed { failure } => Some(failure),
            _ => None,
        }
    }
}

/// State transition input.
#[derive(Debug, Clone, PartialEq)]
pub enum RunEvent {
    /// Execution (re)starts.
    Started {
        /// Wall-clock time of the start.
        at: DateTime<Utc>,
    },
    /// A trial produced a record.
    TrialSucceeded(TrialRecord),
    /// A trial failed; the slot keeps the failure.
    TrialFailed(TrialFailure),
    /// The run stops on the given failure.
    Halted(TrialFailure),
    /// All trials are recorded: compute utilities and the summary.
    Finalized {
        /// Wall-clock time of completion.
        at: DateTime<Utc>,
    },
}

/// Full, self-describing snapshot of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentRun {
    experiment_id: String,
    spec: ExperimentSpec,
    metadata: ExperimentMetadata,
    configurations: Vec<TrialConfiguration>,
    slots: Vec<TrialSlot>,
    status: RunStatus,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<TrialFailure>,
    baseline_index: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    normalization: Option<Normalization>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    summary: Option<RunSummary>,
}

impl ExperimentRun {
    /// Create a Pending run with its 8 configurations generated.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidDesign`] if the definition is invalid.
    pub fn new(
        experiment_id: impl Into<String>,
        spec: ExperimentSpec,
        created_at: DateTime<Utc>,
    ) -> Result<Self> {
        spec.validate()?;
        let configurations = design::generate(spec.variables())?;
        let metadata = ExperimentMetadata::for_spec(&spec, created_at)?;
        Ok(Self {
            experiment_id: experiment_id.into(),
            spec,
            metadata,
            slots: vec![TrialSlot::Pending; configurations.len()],
            configurations,
            status: RunStatus::Pending,
            started_at: None,
            completed_at: None,
            error: None,
            baseline_index: 1,
            normalization: None,
            summary: None,
        })
    }

    /// Get the experiment ID.
    #[must_use]
    pub fn experiment_id(&self) -> &str {
        &self.experiment_id
    }

    /// Get the experiment definition.
    #[must_use]
    pub const fn spec(&self) -> &ExperimentSpec {
        &self.spec
    }

    /// Get the provenance metadata.
    #[must_use]
    pub const fn metadata(&self) -> &ExperimentMetadata {
        &self.metadata
    }

    /// Get the 8 configurations in index order.
    #[must_use]
    pub fn configurations(&self) -> &[TrialConfiguration] {
        &self.configurations
    }

    /// Get one configuration by 1-based index.
    #[must_use]
    pub fn configuration(&self, index: u8) -> Option<&TrialConfiguration> {
        self.configurations.get(usize::from(index).checked_sub(1)?)
    }

    /// Get the trial slots in index order.
    #[must_use]
    pub fn slots(&self) -> &[TrialSlot] {
        &self.slots
    }

    /// Get the current status.
    #[must_use]
    pub const fn status(&self) -> RunStatus {
        self.status
    }

    /// Get when execution first started.
    #[must_use]
    pub const fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    /// Get when the run completed.
    #[must_use]
    pub const fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    /// Get the failure that halted the run, if Failed.
    #[must_use]
    pub const fn error(&self) -> Option<&TrialFailure> {
        self.error.as_ref()
    }

    /// Get the baseline trial index (always 1).
    #[must_use]
    pub const fn baseline_index(&self) -> u8 {
        self.baseline_index
    }

    /// Get the cost/latency bounds, once Completed.
    #[must_use]
    pub const fn normalization(&self) -> Option<&Normalization> {
        self.normalization.as_ref()
    }

    /// Get the attached analysis, once Completed.
    #[must_use]
    pub const fn summary(&self) -> Option<&RunSummary> {
        self.summary.as_ref()
    }

    /// Successful records in index order.
    pub fn records(&self) -> impl Iterator<Item = &TrialRecord> {
        self.slots.iter().filter_map(TrialSlot::record)
    }

    /// Get the record for a 1-based index.
    #[must_use]
    pub fn record(&self, index: u8) -> Option<&TrialRecord> {
        self.slots
            .get(usize::from(index).checked_sub(1)?)
            .and_then(TrialSlot::record)
    }

    /// Failures currently attached to slots.
    pub fn failures(&self) -> impl Iterator<Item = &TrialFailure> {
        self.slots.iter().filter_map(TrialSlot::failure)
    }

    /// Indices that still need a successful record, ascending.
    #[must_use]
    pub fn pending_indices(&self) -> Vec<u8> {
        self.configurations
            .iter()
            .zip(&self.slots)
            .filter(|(_, slot)| slot.record().is_none())
            .map(|(config, _)| config.index())
            .collect()
    }

    /// Get the baseline record.
    #[must_use]
    pub fn baseline(&self) -> Option<&TrialRecord> {
        self.record(self.baseline_index)
    }

    /// Whether the run is Completed.
    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.status == RunStatus::Completed
    }

    /// Fail unless the run is Completed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::RunNotCompleted`] otherwise.
    pub fn ensure_completed(&self) -> Result<()> {
        if self.is_completed() {
            Ok(())
        } else {
            Err(Error::RunNotCompleted {
                experiment_id: self.experiment_id.clone(),
                status: self.status,
            })
        }
    }

    /// Convert a Failed run into its error, for callers using `?`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Trial`] with the halting failure.
    pub fn into_result(self) -> Result<Self> {
        match (self.status, &self.error) {
            (RunStatus::Failed, Some(failure)) => Err(failure.clone().into()),
            (RunStatus::Failed, None) => Err(Error::RunStateConflict(format!(
                "run '{}' is Failed without a recorded failure",
                self.experiment_id
            ))),
            _ => Ok(self),
        }
    }

    /// Check a loaded snapshot is consistent with its own definition.
    ///
    /// Verifies the definition hash, that the configurations are exactly the
    /// generated design, and that each record sits in the slot of its index.
    ///
    /// # Errors
    ///
    /// Returns [`Error::RunStateConflict`] describing the first mismatch.
    pub fn verify_integrity(&self) -> Result<()> {
        let conflict = |msg: String| Error::RunStateConflict(format!("run '{}': {msg}", self.experiment_id));

        self.spec
            .validate()
            .map_err(|e| conflict(format!("stored definition is invalid: {e}")))?;
        if self.spec.config_hash()? != self.metadata.config_hash {
            return Err(conflict("definition does not match its recorded config hash".into()));
        }
        let expected = design::generate(self.spec.variables())?;
        if expected != self.configurations {
            return Err(conflict("configurations differ from the generated design".into()));
        }
        if self.slots.len() != TRIAL_COUNT {
            return Err(conflict(format!(
                "expected {TRIAL_COUNT} trial slots, found {}",
                self.slots.len()
            )));
        }
        for (config, slot) in self.configurations.iter().zip(&self.slots) {
            if let Some(record) = slot.record() {
                if record.configuration() != config {
                    return Err(conflict(format!(
                        "record in slot {} was produced by a different configuration",
                        config.index()
                    )));
                }
            }
        }
        Ok(())
    }

    /// Compute the next state. `self` is left untouched.
    ///
    /// # Errors
    ///
    /// Returns [`Error::RunStateConflict`] for an event that is not valid in
    /// the current state, or the analysis error raised while finalizing.
    pub fn apply(&self, event: RunEvent) -> Result<Self> {
        let mut next = self.clone();
        match event {
            RunEvent::Started { at } => {
                if self.status == RunStatus::Completed {
                    return Err(self.conflict("cannot restart a completed run"));
                }
                next.status = RunStatus::Running;
                next.started_at.get_or_insert(at);
                next.error = None;
            }
            RunEvent::TrialSucceeded(record) => {
                let slot = self.writable_slot(record.index())?;
                if self.configurations[slot] != *record.configuration() {
                    return Err(self.conflict(&format!(
                        "record for trial {} does not match its configuration",
                        record.index()
                    )));
                }
                next.slots[slot] = TrialSlot::Completed { record };
            }
            RunEvent::TrialFailed(failure) => {
                let slot = self.writable_slot(failure.trial_index())?;
                next.slots[slot] = TrialSlot::Failed { failure };
            }
            RunEvent::Halted(failure) => {
                self.require(RunStatus::Running, "halt")?;
                next.status = RunStatus::Failed;
                next.error = Some(failure);
            }
            RunEvent::Finalized { at } => {
                self.require(RunStatus::Running, "finalize")?;
                if let Some(missing) = self.pending_indices().first() {
                    return Err(self.conflict(&format!(
                        "cannot finalize with trial {missing} unrecorded"
                    )));
                }
                next.finalize_utilities()?;
                next.status = RunStatus::Completed;
                next.completed_at = Some(at);
                next.summary = Some(RunSummary::compute(&next)?);
            }
        }
        Ok(next)
    }

    fn finalize_utilities(&mut self) -> Result<()> {
        let normalization = {
            let records: Vec<&TrialRecord> = self.records().collect();
            Normalization::from_records(&records)
        }
        .ok_or_else(|| self.conflict("cannot normalize a run without records"))?;
        let weights = *self.spec.weights();
        for slot in &mut self.slots {
            if let TrialSlot::Completed { record } = slot {
                let utility = normalization.utility(
                    &weights,
                    record.quality(),
                    record.cost(),
                    record.latency_ms(),
                );
                record.set_utility(utility);
            }
        }
        self.normalization = Some(normalization);
        Ok(())
    }

    fn writable_slot(&self, index: u8) -> Result<usize> {
        self.require(RunStatus::Running, "record a trial")?;
        let slot = usize::from(index)
            .checked_sub(1)
            .filter(|&i| i < self.slots.len())
            .ok_or_else(|| self.conflict(&format!("trial index {index} is out of range")))?;
        if self.slots[slot].record().is_some() {
            return Err(self.conflict(&format!("trial {index} already has a record")));
        }
        Ok(slot)
    }

    fn require(&self, status: RunStatus, action: &str) -> Result<()> {
        if self.status == status {
            Ok(())
        } else {
            Err(self.conflict(&format!(
                "cannot {action} while {:?} (expected {status:?})",
                self.status
            )))
        }
    }

    fn conflict(&self, msg: &str) -> Error {
        Error::RunStateConflict(format!("run '{}': {msg}", self.experiment_id))
    }
}
