use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::item::SyncError;

/// When and whether failed items are attempted again.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Delay before the first retry; doubles on each subsequent failure.
    pub backoff_base: Duration,
    /// Ceiling for the backoff delay.
    pub backoff_max: Duration,
    /// Attempts beyond the first; once exhausted the item is rolled back.
    pub max_retries: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            backoff_base: Duration::from_secs(2),
            backoff_max: Duration::from_secs(300),
            max_retries: 10,
        }
    }
}

/// Outcome of a failed attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Stop trying; roll the item back with its error.
    Discard,
    /// Schedule another attempt after the given delay.
    RetryAfter(chrono::Duration),
}

impl RetryPolicy {
    /// Backoff before retry number `retries` (1-based): `base * 2^(n-1)`,
    /// capped at `backoff_max`.
    pub fn backoff_delay(&self, retries: u32) -> chrono::Duration {
        let base_ms = self.backoff_base.as_millis() as u64;
        let max_ms = self.backoff_max.as_millis() as u64;
        let exponent = retries.saturating_sub(1);
        let delay_ms = match 1u64.checked_shl(exponent) {
            Some(factor) => base_ms.saturating_mul(factor),
            None => u64::MAX,
        };
        let capped = delay_ms.min(max_ms);
        chrono::Duration::milliseconds(capped as i64)
    }

    /// 4xx responses are the server rejecting the request itself; replaying
    /// the same body cannot succeed.
    pub fn is_irrecoverable(error: &SyncError) -> bool {
        matches!(error.status, Some(status) if (400..500).contains(&status))
    }

    /// Decide what to do after a failed attempt. `retries` counts failures
    /// already recorded before this one.
    pub fn decide(&self, once: bool, retries: u32, error: &SyncError) -> RetryDecision {
        if Self::is_irrecoverable(error) {
            return RetryDecision::Discard;
        }
        if once {
            return RetryDecision::Discard;
        }
        if retries >= self.max_retries {
            return RetryDecision::Discard;
        }
        RetryDecision::RetryAfter(self.backoff_delay(retries + 1))
    }

    /// Whether an item with the given schedule may be attempted now.
    pub fn is_due(next_attempt_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
        match next_attempt_at {
            Some(at) => at <= now,
            None => true,
        }
    }
}
