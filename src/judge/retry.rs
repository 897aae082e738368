//! Bounded exponential backoff for judge requests.

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Retry schedule for transient judge failures.
///
/// Delay before retry `n` (1-based) is `base_delay * 2^(n-1)` capped at
/// `max_delay`, plus up to `jitter` of that value at random.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts including the first.
    pub max_attempts: u32,
    /// Delay before the first retry.
    #[serde(with = "millis")]
    pub base_delay: Duration,
    /// Upper bound for the un-jittered delay.
    #[serde(with = "millis")]
    pub max_delay: Duration,
    /// Fraction of the delay added as random jitter, in `[0, 1]`.
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            jitter: 0.25,
        }
    }
}

impl RetryPolicy {
    /// A policy that never sleeps; for tests and replay.
    #[must_use]
    pub const fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            jitter: 0.0,
        }
    }

    /// Check the policy is usable.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] for zero attempts, a jitter outside
    /// `[0, 1]`, or a cap below the base delay.
    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(Error::InvalidInput("max_attempts must be at least 1".into()));
        }
        if !(0.0..=1.0).contains(&self.jitter) {
            return Err(Error::InvalidInput(format!(
                "retry jitter {} must be within [0, 1]",
                self.jitter
            )));
        }
        if self.max_delay < self.base_delay {
            return Err(Error::InvalidInput(
                "retry max_delay must not be below base_delay".into(),
            ));
        }
        Ok(())
    }

    /// Un-jittered delay before retry number `retry` (1-based).
    #[must_use]
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry.saturating_sub(1));
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// Delay before retry number `retry`, with random jitter applied.
    #[must_use]
    pub fn delay(&self, retry: u32) -> Duration {
        let base = self.backoff(retry);
        if base.is_zero() || self.jitter <= 0.0 {
            return base;
        }
        let extra = rand::thread_rng().gen_range(0.0..=self.jitter);
        base + base.mul_f64(extra)
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    #[allow(clippy::cast_possible_truncation)]
    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_then_caps() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff(1), Duration::from_secs(1));
        assert_eq!(policy.backoff(2), Duration::from_secs(2));
        assert_eq!(policy.backoff(3), Duration::from_secs(4));
        assert_eq!(policy.backoff(10), Duration::from_secs(30));
        assert_eq!(policy.backoff(u32::MAX), Duration::from_secs(30));
    }

    #[test]
    fn test_jitter_stays_within_bound() {
        let policy = RetryPolicy::default();
        for _ in 0..100 {
            let delay = policy.delay(2);
            assert!(delay >= Duration::from_secs(2));
            assert!(delay <= Duration::from_millis(2500));
        }
    }

    #[test]
    fn test_immediate_policy_never_sleeps() {
        let policy = RetryPolicy::immediate(5);
        assert_eq!(policy.delay(4), Duration::ZERO);
        policy.validate().unwrap();
    }

    #[test]
    fn test_validate_rejects_bad_policies() {
        assert!(RetryPolicy::immediate(0).validate().is_err());
        let policy = RetryPolicy {
            jitter: 1.5,
            ..RetryPolicy::default()
        };
        assert!(policy.validate().is_err());
    }

    #[test]
    fn test_serde_uses_milliseconds() {
        let json = serde_json::to_value(RetryPolicy::default()).unwrap();
        assert_eq!(json["base_delay"], 1000);
        let parsed: RetryPolicy = serde_json::from_str(r#"{"max_attempts": 5}"#).unwrap();
        assert_eq!(parsed.max_attempts, 5);
        assert_eq!(parsed.max_delay, Duration::from_secs(30));
    }
}
