//! Process-local judgment entries held in a `DashMap`.
//!
//! Entries vanish with the process, so a replay against this backend only
//! sees judgments recorded earlier in the same run (or a resumed one sharing
//! the handle). Keep judgments across processes with [`super::FileKvStore`].

use super::KvStore;
use crate::Result;
use dashmap::DashMap;

/// In-memory backend for the judgment cache and for tests.
///
/// Keys are cache digests, values the raw judge response bytes.
///
/// # Example
///
/// ```rust
/// use flowtune::cache::{cache_key, CacheMode, JudgmentCache};
/// use flowtune::kv::MemoryKvStore;
///
/// # async fn example() -> flowtune::Result<()> {
/// let cache = JudgmentCache::new(MemoryKvStore::new(), CacheMode::ReadThrough);
/// let key = cache_key("Evaluate the following output...", "judge-model", 0.3);
///
/// assert_eq!(cache.lookup(&key).await?, None);
/// cache.put(&key, r#"{"clarity": {"score": 8}}"#).await?;
/// assert!(cache.lookup(&key).await?.is_some());
/// assert_eq!(cache.store().len(), 1);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Default)]
pub struct MemoryKvStore {
    entries: DashMap<String, Vec<u8>>,
}

impl MemoryKvStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of recorded entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing has been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Forget every recorded entry.
    pub fn clear(&self) {
        self.entries.clear();
    }
}

impl KvStore for MemoryKvStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.entries.get(key).map(|entry| entry.value().clone()))
    }

    async fn set(&self, key: &str, value: Vec<u8>) -> Result<()> {
        self.entries.insert(key.to_owned(), value);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.entries.remove(key);
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.entries.contains_key(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::cache_key;

    const JUDGMENT: &[u8] = br#"{"clarity": {"score": 7, "reasoning": "terse"}}"#;

    #[tokio::test]
    async fn test_recorded_judgment_is_returned_verbatim() {
        let store = MemoryKvStore::new();
        let key = cache_key("prompt for trial 1", "judge-model", 0.3);

        store.set(&key, JUDGMENT.to_vec()).await.unwrap();

        assert_eq!(store.get(&key).await.unwrap().as_deref(), Some(JUDGMENT));
        assert!(store.exists(&key).await.unwrap());
    }

    #[tokio::test]
    async fn test_rerecording_replaces_judgment() {
        let store = MemoryKvStore::new();
        let key = cache_key("prompt for trial 2", "judge-model", 0.3);

        store.set(&key, b"{\"clarity\": 3}".to_vec()).await.unwrap();
        store.set(&key, JUDGMENT.to_vec()).await.unwrap();

        assert_eq!(store.len(), 1);
        assert_eq!(store.get(&key).await.unwrap().as_deref(), Some(JUDGMENT));
    }

    #[tokio::test]
    async fn test_other_trials_do_not_share_entries() {
        let store = MemoryKvStore::new();
        store
            .set(&cache_key("prompt for trial 1", "judge-model", 0.3), JUDGMENT.to_vec())
            .await
            .unwrap();

        let other = cache_key("prompt for trial 2", "judge-model", 0.3);
        assert_eq!(store.get(&other).await.unwrap(), None);
        assert!(!store.exists(&other).await.unwrap());
    }

    #[tokio::test]
    async fn test_clear_forgets_all_judgments() {
        let store = MemoryKvStore::new();
        for trial in 1..=8 {
            let key = cache_key(&format!("prompt for trial {trial}"), "judge-model", 0.3);
            store.set(&key, JUDGMENT.to_vec()).await.unwrap();
        }
        assert_eq!(store.len(), 8);

        store.clear();

        assert!(store.is_empty());
    }
}
