//! Run stores - persistence for run snapshots
//!
//! A snapshot is the whole [`ExperimentRun`] document. It is rewritten after
//! every transition, so the stored copy is always complete and parseable.

use std::future::Future;
use std::path::PathBuf;

use dashmap::DashMap;

use super::ExperimentRun;
use crate::kv::{FileKvStore, KvStore};
use crate::{Error, Result};

/// Snapshot persistence keyed by experiment ID.
pub trait RunStore: Send + Sync {
    /// Persist the latest snapshot, replacing any previous one.
    fn save(&self, run: &ExperimentRun) -> impl Future<Output = Result<()>> + Send;

    /// Load the latest snapshot, `None` if the run was never saved.
    fn load(&self, experiment_id: &str) -> impl Future<Output = Result<Option<ExperimentRun>>> + Send;
}

/// Pretty-printed JSON snapshots over any [`KvStore`].
///
/// With [`FileKvStore`] this yields one `<experiment_id>.json` per run,
/// replaced atomically on each save.
#[derive(Debug, Clone)]
pub struct JsonRunStore<S> {
    kv: S,
}

impl JsonRunStore<FileKvStore> {
    /// Store snapshots as files under `dir`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StorageError`] if the directory cannot be created.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        Ok(Self::new(FileKvStore::open(dir)?))
    }
}

impl<S: KvStore> JsonRunStore<S> {
    /// Wrap a key-value backend.
    #[must_use]
    pub const fn new(kv: S) -> Self {
        Self { kv }
    }

    /// Get the backend.
    #[must_use]
    pub const fn kv(&self) -> &S {
        &self.kv
    }
}

impl<S: KvStore> RunStore for JsonRunStore<S> {
    async fn save(&self, run: &ExperimentRun) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(run)?;
        self.kv.set(run.experiment_id(), bytes).await
    }

    async fn load(&self, experiment_id: &str) -> Result<Option<ExperimentRun>> {
        let Some(bytes) = self.kv.get(experiment_id).await? else {
            return Ok(None);
        };
        serde_json::from_slice(&bytes).map(Some).map_err(|e| {
            Error::StorageError(format!("snapshot for '{experiment_id}' is unreadable: {e}"))
        })
    }
}

/// In-memory store that keeps every saved snapshot.
///
/// Useful for tests and for inspecting how a run progressed.
#[derive(Debug, Default)]
pub struct MemoryRunStore {
    history: DashMap<String, Vec<ExperimentRun>>,
}

impl MemoryRunStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// All snapshots saved for a run, oldest first.
    #[must_use]
    pub fn snapshots(&self, experiment_id: &str) -> Vec<ExperimentRun> {
        self.history
            .get(experiment_id)
            .map(|h| h.value().clone())
            .unwrap_or_default()
    }

    /// Number of saves recorded for a run.
    #[must_use]
    pub fn save_count(&self, experiment_id: &str) -> usize {
        self.history.get(experiment_id).map_or(0, |h| h.len())
    }

    /// Number of distinct runs stored.
    #[must_use]
    pub fn run_count(&self) -> usize {
        self.history.len()
    }

    /// Check if nothing was ever saved.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }
}

impl RunStore for MemoryRunStore {
    async fn save(&self, run: &ExperimentRun) -> Result<()> {
        self.history
            .entry(run.experiment_id().to_string())
            .or_default()
            .push(run.clone());
        Ok(())
    }

    async fn load(&self, experiment_id: &str) -> Result<Option<ExperimentRun>> {
        Ok(self
            .history
            .get(experiment_id)
            .and_then(|h| h.value().last().cloned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::design::Variable;
    use crate::experiment::ExperimentSpec;
    use chrono::Utc;

    fn run(id: &str) -> ExperimentRun {
        let spec = ExperimentSpec::builder("store", "demo")
            .variables([
                Variable::new("model", "A", "B").unwrap(),
                Variable::new("temperature", 0.3, 0.7).unwrap(),
                Variable::new("context", "small", "large").unwrap(),
                Variable::new("strategy", "standard", "cot").unwrap(),
            ])
            .build()
            .unwrap();
        ExperimentRun::new(id, spec, Utc::now()).unwrap()
    }

    #[tokio::test]
    async fn test_memory_store_keeps_history() {
        let store = MemoryRunStore::new();
        assert!(store.is_empty());

        store.save(&run("exp-1")).await.unwrap();
        store.save(&run("exp-1")).await.unwrap();
        store.save(&run("exp-2")).await.unwrap();

        assert_eq!(store.run_count(), 2);
        assert_eq!(store.save_count("exp-1"), 2);
        assert_eq!(store.snapshots("exp-1").len(), 2);
        assert!(store.load("exp-2").await.unwrap().is_some());
        assert!(store.load("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_json_store_round_trip() {
        let tmp = tempfile::tempdir().unwrap();
        let store = JsonRunStore::open(tmp.path()).unwrap();
        let original = run("exp-json");

        store.save(&original).await.unwrap();
        let loaded = store.load("exp-json").await.unwrap().unwrap();

        assert_eq!(loaded, original);
        let text = std::fs::read_to_string(tmp.path().join("exp-json.json")).unwrap();
        assert!(text.contains("\n  \"experiment_id\": \"exp-json\""));
    }

    #[tokio::test]
    async fn test_json_store_reports_corrupt_snapshot() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("broken.json"), b"{ not json").unwrap();
        let store = JsonRunStore::open(tmp.path()).unwrap();

        let err = store.load("broken").await.unwrap_err();
        assert!(matches!(err, Error::StorageError(_)));
    }
}
