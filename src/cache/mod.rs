//! Judgment cache - content-addressed store of prior judge responses
//!
//! Keys are SHA-256 digests of the canonical request fingerprint
//! `{model, prompt, temperature}`. Values are the raw judge response text, so
//! a replayed response goes through exactly the same parsing as a live one.
//!
//! ## Modes
//!
//! | Mode          | Lookup | Judge call        | Write |
//! |---------------|--------|-------------------|-------|
//! | `Disabled`    | no     | always            | no    |
//! | `Replay`      | yes    | never (miss = error) | no |
//! | `Record`      | no     | always            | yes   |
//! | `ReadThrough` | yes    | on miss           | on miss |
//!
//! Known limitation: the key covers only prompt, model and temperature. Two
//! rubrics that render to the same prompt text (e.g. differing only in
//! dimension weights) share an entry.

use serde::{Deserialize, Serialize};
use serde_json::json;
use sha2::{Digest, Sha256};

use crate::kv::KvStore;
use crate::{Error, Result};

/// How the judge adapter uses the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheMode {
    /// Never read or write.
    #[default]
    Disabled,
    /// Serve only recorded responses; a miss is an error.
    Replay,
    /// Always call the judge and persist the response.
    Record,
    /// Serve hits; on a miss call the judge and persist.
    ReadThrough,
}

impl CacheMode {
    /// Whether lookups are attempted before calling the judge.
    #[must_use]
    pub const fn reads(self) -> bool {
        matches!(self, Self::Replay | Self::ReadThrough)
    }

    /// Whether live responses are persisted.
    #[must_use]
    pub const fn writes(self) -> bool {
        matches!(self, Self::Record | Self::ReadThrough)
    }
}

/// Build the deterministic cache key for a judge request.
///
/// Temperature is rounded to 6 decimal places so float noise does not split
/// entries.
#[must_use]
pub fn cache_key(prompt_fingerprint: &str, model: &str, temperature: f64) -> String {
    let rounded = (temperature * 1e6).round() / 1e6;
    // serde_json maps are sorted, so the serialization is canonical
    let fingerprint = json!({
        "model": model,
        "prompt": prompt_fingerprint,
        "temperature": rounded,
    });
    let mut hasher = Sha256::new();
    hasher.update(fingerprint.to_string().as_bytes());
    hex::encode(hasher.finalize())
}

/// Judge response cache over any [`KvStore`] backend.
#[derive(Debug)]
pub struct JudgmentCache<S> {
    store: S,
    mode: CacheMode,
}

impl<S: KvStore> JudgmentCache<S> {
    /// Wrap a backend with the given mode.
    #[must_use]
    pub const fn new(store: S, mode: CacheMode) -> Self {
        Self { store, mode }
    }

    /// Get the cache mode.
    #[must_use]
    pub const fn mode(&self) -> CacheMode {
        self.mode
    }

    /// Get the underlying backend.
    #[must_use]
    pub const fn store(&self) -> &S {
        &self.store
    }

    /// Look up a recorded response.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StorageError`] if the backend fails or the entry is
    /// not valid UTF-8.
    pub async fn get(&self, key: &str) -> Result<Option<String>> {
        let Some(bytes) = self.store.get(key).await? else {
            return Ok(None);
        };
        String::from_utf8(bytes)
            .map(Some)
            .map_err(|e| Error::StorageError(format!("cache entry '{key}' is not UTF-8: {e}")))
    }

    /// Persist a response.
    ///
    /// # Errors
    ///
    /// Returns the backend error on write failure.
    pub async fn put(&self, key: &str, response: &str) -> Result<()> {
        self.store.set(key, response.as_bytes().to_vec()).await
    }

    /// Look up a response the way the configured mode requires.
    ///
    /// Returns `Ok(None)` when the caller should invoke the judge.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CacheMiss`] in replay mode when no entry exists.
    pub async fn lookup(&self, key: &str) -> Result<Option<String>> {
        if !self.mode.reads() {
            return Ok(None);
        }
        match self.get(key).await? {
            Some(hit) => Ok(Some(hit)),
            None if self.mode == CacheMode::Replay => Err(Error::CacheMiss {
                key: key.to_string(),
            }),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::MemoryKvStore;

    #[test]
    fn test_cache_key_is_deterministic() {
        let a = cache_key("prompt", "judge-model", 0.3);
        let b = cache_key("prompt", "judge-model", 0.3);
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn test_cache_key_changes_with_input() {
        let base = cache_key("prompt", "judge-model", 0.3);
        assert_ne!(base, cache_key("prompt2", "judge-model", 0.3));
        assert_ne!(base, cache_key("prompt", "other-model", 0.3));
        assert_ne!(base, cache_key("prompt", "judge-model", 0.4));
    }

    #[test]
    fn test_cache_key_ignores_float_noise() {
        assert_eq!(
            cache_key("p", "m", 0.3),
            cache_key("p", "m", 0.300_000_000_1)
        );
    }

    #[test]
    fn test_mode_flags() {
        assert!(!CacheMode::Disabled.reads() && !CacheMode::Disabled.writes());
        assert!(CacheMode::Replay.reads() && !CacheMode::Replay.writes());
        assert!(!CacheMode::Record.reads() && CacheMode::Record.writes());
        assert!(CacheMode::ReadThrough.reads() && CacheMode::ReadThrough.writes());
    }

    #[tokio::test]
    async fn test_replay_miss_is_error() {
        let cache = JudgmentCache::new(MemoryKvStore::new(), CacheMode::Replay);
        let err = cache.lookup("missing").await.unwrap_err();
        assert!(matches!(err, Error::CacheMiss { ref key } if key == "missing"));
    }

    #[tokio::test]
    async fn test_read_through_miss_defers_to_judge() {
        let cache = JudgmentCache::new(MemoryKvStore::new(), CacheMode::ReadThrough);
        assert_eq!(cache.lookup("missing").await.unwrap(), None);

        cache.put("missing", "{\"clarity\": 7}").await.unwrap();
        assert_eq!(
            cache.lookup("missing").await.unwrap().as_deref(),
            Some("{\"clarity\": 7}")
        );
    }

    #[tokio::test]
    async fn test_record_mode_never_reads() {
        let cache = JudgmentCache::new(MemoryKvStore::new(), CacheMode::Record);
        cache.put("k", "stale").await.unwrap();
        assert_eq!(cache.lookup("k").await.unwrap(), None);
        assert_eq!(cache.get("k").await.unwrap().as_deref(), Some("stale"));
    }
}
