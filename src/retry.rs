//! Bounded retry with exponential backoff for rate-limited calls
//!
//! Retry mechanics are decoupled from prompt content: any stage that needs
//! the discipline is simply handed a [`RetryingProvider`]-wrapped backend.
//! Only the transient rate-limit signal is retried; everything else
//! propagates on the first failure.

use crate::error::AdvisorError;
use crate::provider::{CompletionProvider, CompletionRequest};
use async_trait::async_trait;
use rand::Rng;
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    /// Upper bound of the uniform jitter added to each backoff, spreading
    /// out thundering-herd retries.
    pub max_jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_secs(2),
            max_jitter: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            ..Self::default()
        }
    }

    /// Delay before retry number `attempt` (zero-based): base × 2^attempt
    /// plus uniform jitter in [0, max_jitter).
    fn delay_for(&self, attempt: u32) -> Duration {
        let backoff = self.base_delay * 2u32.saturating_pow(attempt);
        let jitter = self
            .max_jitter
            .mul_f64(rand::rng().random_range(0.0..1.0));
        backoff + jitter
    }
}

/// Decorator adding the retry discipline to any completion backend.
pub struct RetryingProvider<P> {
    inner: P,
    policy: RetryPolicy,
}

impl<P: CompletionProvider> RetryingProvider<P> {
    pub fn new(inner: P, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn inner(&self) -> &P {
        &self.inner
    }
}

#[async_trait]
impl<P: CompletionProvider> CompletionProvider for RetryingProvider<P> {
    async fn complete(&self, request: &CompletionRequest) -> crate::Result<String> {
        let mut last_signal = String::new();

        for attempt in 0..self.policy.max_attempts {
            match self.inner.complete(request).await {
                Ok(text) => return Ok(text),
                Err(AdvisorError::TransientProvider(signal)) => {
                    last_signal = signal;
                    if attempt + 1 < self.policy.max_attempts {
                        let delay = self.policy.delay_for(attempt);
                        warn!(
                            attempt = attempt + 1,
                            delay_ms = delay.as_millis() as u64,
                            "Rate limit hit, backing off"
                        );
                        tokio::time::sleep(delay).await;
                    }
                }
                Err(other) => return Err(other),
            }
        }

        Err(AdvisorError::RetriesExhausted {
            attempts: self.policy.max_attempts,
            last: last_signal,
        })
    }
}
