//! Token-bucket rate limiting.
//!
//! One primitive serves two callers: credential verification (per account,
//! counting failures) and API-key verification (per key, counting requests).
//! Buckets refill continuously at `capacity / window` tokens per
//! millisecond, clamped to `capacity`.

use crate::store::records::RateLimitBucket;
use chrono::{DateTime, Duration, Utc};

/// Outcome of a bucket check.
#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    /// Whether the attempt may proceed.
    pub allowed: bool,

    /// Refilled bucket state as of `now`. Persist after adjusting for the
    /// attempt's outcome.
    pub new_state: RateLimitBucket,
}

/// Tokens available in a bucket after refill at `now`.
#[must_use]
pub fn refill(bucket: &RateLimitBucket, capacity: u32, window: Duration, now: DateTime<Utc>) -> f64 {
    let elapsed_ms = (now - bucket.last_attempt_time).num_milliseconds().max(0);
    #[allow(clippy::cast_precision_loss)]
    let rate = f64::from(capacity) / window.num_milliseconds() as f64;
    #[allow(clippy::cast_precision_loss)]
    let refilled = bucket.attempts_left + elapsed_ms as f64 * rate;
    refilled.min(f64::from(capacity))
}

/// Check the bucket for `identifier`, refilling from `existing` if present.
///
/// A missing bucket starts full. The attempt is allowed while at least one
/// whole token remains.
#[must_use]
pub fn check(
    identifier: &str,
    existing: Option<&RateLimitBucket>,
    capacity: u32,
    window: Duration,
    now: DateTime<Utc>,
) -> Decision {
    let attempts_left = existing.map_or(f64::from(capacity), |bucket| {
        refill(bucket, capacity, window, now)
    });
    Decision {
        allowed: attempts_left >= 1.0,
        new_state: RateLimitBucket {
            identifier: identifier.to_string(),
            attempts_left,
            last_attempt_time: now,
        },
    }
}

/// The state to persist after a consumed attempt (failure for credentials,
/// any request for API keys).
#[must_use]
pub fn consume(decision: &Decision) -> RateLimitBucket {
    RateLimitBucket {
        attempts_left: (decision.new_state.attempts_left - 1.0).max(0.0),
        ..decision.new_state.clone()
    }
}
