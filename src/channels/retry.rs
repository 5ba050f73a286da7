use std::time::Duration;
use crate::config::RetryConfig;

/// Per-channel retry and timeout policy.
#[derive(Clone, Debug, PartialEq)]
pub struct RetryPolicy {
    pub attempt_timeout: Duration,
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub backoff_multiplier: f64,
}

impl RetryPolicy {
    /// Pause after failed attempt number `attempt` (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16) as i32;
        self.initial_backoff.mul_f64(self.backoff_multiplier.powi(exponent))
    }

    /// Worst-case time for a full delivery: every attempt times out and every
    /// backoff is slept.
    pub fn delivery_budget(&self) -> Duration {
        let attempts = self.attempt_timeout * self.max_attempts;
        let backoffs: Duration = (1..self.max_attempts).map(|a| self.backoff(a)).sum();
        attempts + backoffs
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        RetryPolicy {
            attempt_timeout: Duration::from_millis(config.attempt_timeout_ms),
            max_attempts: config.max_attempts.max(1),
            initial_backoff: Duration::from_millis(config.initial_backoff_ms),
            backoff_multiplier: config.backoff_multiplier.max(1.0),
        }
    }
}
