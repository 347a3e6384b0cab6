// src/core/http/retry.rs

//! Bounded retry with exponential back-off, the outermost pipeline layer.

use crate::core::errors::OtterError;
use rand::Rng;
use std::time::Duration;

/// Bounds and pacing for the retry layer.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Back-off before retry number `attempt` (1-based), doubled each time
    /// and jittered to avoid synchronized herds.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exp = self.base_delay.saturating_mul(1u32 << attempt.min(16));
        let capped = exp.min(self.max_delay);
        let jitter = rand::thread_rng().gen_range(0.0..=0.25);
        capped.mul_f64(1.0 + jitter)
    }
}

/// The default retryability predicate: transport failures, identity outages,
/// and rate limiting are worth another attempt; everything else surfaces.
pub fn default_can_retry(error: &OtterError) -> bool {
    match error {
        OtterError::Transport(_) => true,
        OtterError::AuthenticationUnavailable(_) => true,
        OtterError::Api { code, .. } => *code == 429,
        _ => false,
    }
}

/// A predicate that additionally refuses to retry the given API codes, for
/// callers that want e.g. a 404 surfaced immediately.
pub fn can_retry_except(no_retry_codes: Vec<u16>) -> impl Fn(&OtterError) -> bool + Send + Sync {
    move |error| {
        if let OtterError::Api { code, .. } = error {
            if no_retry_codes.contains(code) {
                return false;
            }
        }
        default_can_retry(error)
    }
}
