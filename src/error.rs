//! Error types for flowtune
//!
//! Toyota Way: Clear error messages with actionable guidance (Respect for People)

use thiserror::Error;

use crate::experiment::{RunStatus, TrialFailure};

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// flowtune error types
#[derive(Error, Debug)]
pub enum Error {
    /// Experiment definition rejected at construction time
    #[error("Invalid experiment design: {0}")]
    InvalidDesign(String),

    /// Judge output did not contain a parseable structured payload
    #[error("Malformed judgment: no JSON payload could be recovered from judge output\nRaw output: {raw}")]
    MalformedJudgment {
        /// Judge response exactly as received
        raw: String,
    },

    /// Judge output parsed, but a rubric dimension was missing or unusable
    #[error("Incomplete judgment: dimension '{dimension}' {reason}")]
    IncompleteJudgment {
        /// Rubric dimension that violated the contract
        dimension: String,
        /// What was wrong with it
        reason: String,
        /// Judge response exactly as received
        raw: String,
    },

    /// Judge provider kept failing until the retry budget ran out
    #[error("Judgment unavailable after {attempts} attempt(s): {last_error}")]
    JudgmentUnavailable {
        /// Number of requests sent
        attempts: u32,
        /// Error reported by the final attempt
        last_error: String,
    },

    /// External generation boundary failed or produced unusable output
    #[error("Generation failed: {0}")]
    GenerationFailure(String),

    /// Replay-only cache had no recorded response for the request
    #[error("Judgment cache miss for key {key}\nReplay mode only serves recorded responses; re-run in record mode first")]
    CacheMiss {
        /// Content-addressed cache key
        key: String,
    },

    /// Persisted run state is inconsistent with the requested operation
    #[error("Run state conflict: {0}")]
    RunStateConflict(String),

    /// Analysis requested on a run that has not completed
    #[error("Run '{experiment_id}' is {status:?}; analysis requires a completed run")]
    RunNotCompleted {
        /// Experiment identifier
        experiment_id: String,
        /// Current lifecycle status
        status: RunStatus,
    },

    /// A trial failed; carries index, configuration values and upstream error
    #[error("{0}")]
    Trial(Box<TrialFailure>),

    /// A mathematical invariant of the analysis did not hold (critical bug)
    #[error("Invariant violated: {0}\nPlease report this issue.")]
    InvariantViolation(String),

    /// Caller supplied an argument outside the accepted domain
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Cache or snapshot backend failure
    #[error("Storage error: {0}")]
    StorageError(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding/decoding error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML encoding error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl From<TrialFailure> for Error {
    fn from(failure: TrialFailure) -> Self {
        Self::Trial(Box::new(failure))
    }
}
