//! Kind-aware retry with exponential backoff and jitter.
//!
//! Only transient errors (see [`Error::is_transient`]) are retried; validation
//! and parse failures surface immediately. Presets match the operational
//! policy for the two external dependencies: language-model completions back
//! off from 1 s up to 16 s, graph-store calls from 0.5 s up to 8 s.

use crate::error::Result;
use std::future::Future;
use std::time::Duration;

/// Retry policy for calls to external services
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total number of attempts (including the first)
    max_attempts: u32,
    /// Delay before the first retry
    base_delay: Duration,
    /// Upper bound on any single delay
    max_delay: Duration,
    /// Whether to randomize delays to avoid thundering herds
    jitter: bool,
}

impl RetryPolicy {
    /// Exponential backoff with `max_attempts` total attempts (1 s base, 16 s cap).
    #[must_use]
    pub fn exponential(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(16),
            jitter: true,
        }
    }

    /// Policy for language-model completions and embeddings.
    #[must_use]
    pub fn for_language_models() -> Self {
        Self::exponential(3)
    }

    /// Policy for graph-store calls (tighter bounds than LM calls).
    #[must_use]
    pub fn for_graph_store() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
            jitter: true,
        }
    }

    /// Single attempt, no retry.
    #[must_use]
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            jitter: false,
        }
    }

    /// Override the base delay.
    #[must_use]
    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    /// Override the delay cap.
    #[must_use]
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Disable jitter (deterministic delays, used in tests).
    #[must_use]
    pub fn without_jitter(mut self) -> Self {
        self.jitter = false;
        self
    }

    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay before retry number `attempt` (1-based).
    fn delay_for(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        let raw = self
            .base_delay
            .saturating_mul(2_u32.saturating_pow(exp))
            .min(self.max_delay);
        if !self.jitter || raw.is_zero() {
            return raw;
        }
        // Half fixed, half random: keeps ordering while decorrelating peers.
        let half = raw / 2;
        let spread = raw.as_millis() as u64 / 2;
        let extra = rand::random::<u64>() % spread.max(1);
        half + Duration::from_millis(extra)
    }
}

/// Run `op`, retrying transient failures per `policy`.
///
/// # Errors
///
/// Returns the last error once attempts are exhausted, or the first
/// non-transient error immediately.
pub async fn with_retry<T, F, Fut>(policy: &RetryPolicy, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() && attempt < policy.max_attempts => {
                let delay = policy.delay_for(attempt);
                tracing::warn!(
                    attempt,
                    max_attempts = policy.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "transient failure, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}
