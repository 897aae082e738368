//! Quality judge adapter
//!
//! Turns a candidate output and a rubric into a [`QualityScore`] by asking an
//! external judge model for a structured verdict.
//!
//! The request goes through three layers:
//! 1. **Cache**: content-addressed lookup keyed on the rendered prompt, model
//!    and temperature (see [`crate::cache`]).
//! 2. **Retry**: transient provider errors back off exponentially
//!    ([`RetryPolicy`]); exhaustion yields [`Error::JudgmentUnavailable`].
//! 3. **Parsing**: the payload is recovered from prose or fenced blocks
//!    ([`parse_payload`]) and every rubric dimension must be present and
//!    in range ([`extract_dimensions`]). Nothing is silently defaulted.
//!
//! The provider itself sits behind [`JudgeClient`], so tests and offline
//! runs inject scripted responses.

mod parse;
mod prompt;
mod retry;
mod score;

pub use parse::{extract_dimensions, parse_payload};
pub use prompt::{build_prompt, SYSTEM_PROMPT};
pub use retry::RetryPolicy;
pub use score::{CacheTrace, DimensionScore, QualityScore, Rubric, RubricDimension};

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use crate::cache::{cache_key, CacheMode, JudgmentCache};
use crate::kv::{KvStore, MemoryKvStore};
use crate::{Error, Result};

/// Failure reported by a judge provider.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProviderError {
    /// Worth retrying: timeouts, rate limits, 5xx responses.
    #[error("transient provider error: {0}")]
    Transient(String),
    /// Retrying cannot help: bad credentials, invalid request.
    #[error("provider rejected request: {0}")]
    Rejected(String),
}

/// One structured-output request to the judge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JudgeRequest {
    /// System prompt.
    pub system: String,
    /// User prompt (also the cache fingerprint).
    pub prompt: String,
    /// Judge model identifier.
    pub model: String,
    /// Sampling temperature.
    pub temperature: f64,
}

/// Judgment boundary: sends one request and returns the response text.
#[async_trait]
pub trait JudgeClient: Send + Sync {
    /// Complete a judge request.
    async fn complete(&self, request: &JudgeRequest) -> std::result::Result<String, ProviderError>;
}

/// Judge adapter configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JudgeConfig {
    /// Judge model identifier.
    pub model: String,
    /// Sampling temperature in `[0, 1]`; kept low for stable verdicts.
    pub temperature: f64,
    /// Backoff schedule for transient failures.
    pub retry: RetryPolicy,
    /// How the judgment cache is used.
    pub cache_mode: CacheMode,
    /// Appended to every prompt unless a context overrides it.
    pub extra_instructions: Option<String>,
}

impl Default for JudgeConfig {
    fn default() -> Self {
        Self {
            model: "anthropic/claude-3.5-sonnet".to_string(),
            temperature: 0.3,
            retry: RetryPolicy::default(),
            cache_mode: CacheMode::Disabled,
            extra_instructions: None,
        }
    }
}

impl JudgeConfig {
    /// Set the judge model.
    #[must_use]
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Set the sampling temperature.
    #[must_use]
    pub const fn temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }

    /// Set the retry policy.
    #[must_use]
    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Set the cache mode.
    #[must_use]
    pub const fn cache_mode(mut self, mode: CacheMode) -> Self {
        self.cache_mode = mode;
        self
    }

    /// Set default extra instructions.
    #[must_use]
    pub fn extra_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.extra_instructions = Some(instructions.into());
        self
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for a blank model, a temperature
    /// outside `[0, 1]`, or an invalid retry policy.
    pub fn validate(&self) -> Result<()> {
        if self.model.trim().is_empty() {
            return Err(Error::InvalidInput("judge model must be non-empty".into()));
        }
        if !(0.0..=1.0).contains(&self.temperature) {
            return Err(Error::InvalidInput(format!(
                "judge temperature {} must be within [0, 1]",
                self.temperature
            )));
        }
        self.retry.validate()
    }
}

/// Per-call context for an evaluation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JudgeContext {
    /// Overrides the configured extra instructions.
    pub extra_instructions: Option<String>,
    /// Trial being judged, for log correlation.
    pub trial_index: Option<u8>,
}

impl JudgeContext {
    /// Context for a given trial.
    #[must_use]
    pub fn for_trial(trial_index: u8) -> Self {
        Self {
            trial_index: Some(trial_index),
            ..Self::default()
        }
    }
}

/// A parsed score together with the judge text it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct Judgment {
    /// Parsed and normalized score.
    pub score: QualityScore,
    /// Judge response exactly as received (or replayed).
    pub raw: String,
}

/// Cache-aware, retrying judge adapter.
pub struct QualityJudge<S> {
    client: Arc<dyn JudgeClient>,
    cache: JudgmentCache<S>,
    config: JudgeConfig,
}

impl<S> std::fmt::Debug for QualityJudge<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QualityJudge")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl QualityJudge<MemoryKvStore> {
    /// Judge that never consults a cache, whatever the configured mode.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if the configuration is invalid.
    pub fn uncached(client: Arc<dyn JudgeClient>, config: JudgeConfig) -> Result<Self> {
        let config = config.cache_mode(CacheMode::Disabled);
        Self::new(client, MemoryKvStore::new(), config)
    }
}

impl<S: KvStore> QualityJudge<S> {
    /// Create a judge over a cache backend; the cache mode comes from `config`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if the configuration is invalid.
    pub fn new(client: Arc<dyn JudgeClient>, store: S, config: JudgeConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            client,
            cache: JudgmentCache::new(store, config.cache_mode),
            config,
        })
    }

    /// Get the configuration.
    #[must_use]
    pub const fn config(&self) -> &JudgeConfig {
        &self.config
    }

    /// Get the judgment cache.
    #[must_use]
    pub const fn cache(&self) -> &JudgmentCache<S> {
        &self.cache
    }

    /// Score a candidate output against a rubric.
    ///
    /// # Errors
    ///
    /// See [`QualityJudge::evaluate_raw`].
    pub async fn evaluate(
        &self,
        candidate: &str,
        rubric: &Rubric,
        context: &JudgeContext,
    ) -> Result<QualityScore> {
        Ok(self.evaluate_raw(candidate, rubric, context).await?.score)
    }

    /// Score a candidate output and keep the raw judge text.
    ///
    /// Live responses are written to the cache before parsing, so a malformed
    /// verdict is still available for inspection and replay.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidInput`] for an empty candidate or invalid rubric
    /// - [`Error::CacheMiss`] in replay mode without a recorded response
    /// - [`Error::JudgmentUnavailable`] when the provider keeps failing
    /// - [`Error::MalformedJudgment`] / [`Error::IncompleteJudgment`] when the
    ///   response violates the rubric contract
    pub async fn evaluate_raw(
        &self,
        candidate: &str,
        rubric: &Rubric,
        context: &JudgeContext,
    ) -> Result<Judgment> {
        if candidate.trim().is_empty() {
            return Err(Error::InvalidInput(
                "candidate output must be non-empty for evaluation".into(),
            ));
        }
        rubric.validate()?;

        let extra = context
            .extra_instructions
            .as_deref()
            .or(self.config.extra_instructions.as_deref());
        let prompt = build_prompt(candidate, rubric, extra);
        let key = cache_key(&prompt, &self.config.model, self.config.temperature);

        let (raw, hit, recorded) = if let Some(cached) = self.cache.lookup(&key).await? {
            debug!(trial = ?context.trial_index, cache_key = %key, "judgment cache hit");
            (cached, true, false)
        } else {
            let request = JudgeRequest {
                system: SYSTEM_PROMPT.to_string(),
                prompt,
                model: self.config.model.clone(),
                temperature: self.config.temperature,
            };
            let response = self.request_with_retry(&request, context).await?;
            let recorded = self.cache.mode().writes();
            if recorded {
                self.cache.put(&key, &response).await?;
                debug!(trial = ?context.trial_index, cache_key = %key, "judgment recorded");
            }
            (response, false, recorded)
        };

        let payload = parse_payload(&raw)?;
        let dimensions = extract_dimensions(&payload, rubric, &raw)?;
        let mut score = QualityScore::new(dimensions, Some(rubric), &self.config.model)?;
        if self.cache.mode() != CacheMode::Disabled {
            score = score.with_cache_trace(CacheTrace { key, hit, recorded });
        }
        Ok(Judgment { score, raw })
    }

    async fn request_with_retry(&self, request: &JudgeRequest, context: &JudgeContext) -> Result<String> {
        let policy = &self.config.retry;
        let mut attempt = 1;
        loop {
            debug!(
                trial = ?context.trial_index,
                attempt,
                max_attempts = policy.max_attempts,
                model = %request.model,
                "judge request"
            );
            match self.client.complete(request).await {
                Ok(text) => return Ok(text),
                Err(ProviderError::Transient(reason)) if attempt < policy.max_attempts => {
                    let delay = policy.delay(attempt);
                    warn!(
                        trial = ?context.trial_index,
                        attempt,
                        error = %reason,
                        backoff_ms = delay.as_millis(),
                        "judge request failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    error!(trial = ?context.trial_index, attempts = attempt, error = %e, "judge unavailable");
                    return Err(Error::JudgmentUnavailable {
                        attempts: attempt,
                        last_error: e.to_string(),
                    });
                }
            }
        }
    }
}
