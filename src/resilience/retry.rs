//! Retry policy with per-platform backoff
//!
//! Only transient kinds (network, timeout, upstream rate limit) are retried.
//! Everything else fails on the first attempt.

use crate::extractor::platform::SourcePlatform;
use crate::utils::config::RetrySettings;
use crate::utils::error::Result;
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Shape of the wait between attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    None,
    Linear,
    ExponentialJitter,
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub backoff: Backoff,
}

impl RetryPolicy {
    /// Exponential backoff with jitter for fragile platforms, linear otherwise
    pub fn for_platform(platform: SourcePlatform, settings: &RetrySettings) -> Self {
        if platform.is_fragile() {
            Self {
                max_attempts: settings.fragile_attempts.max(1),
                base_delay: settings.fragile_base_delay,
                max_delay: settings.max_delay,
                backoff: Backoff::ExponentialJitter,
            }
        } else {
            Self {
                max_attempts: settings.robust_attempts.max(1),
                base_delay: settings.robust_base_delay,
                max_delay: settings.max_delay,
                backoff: Backoff::Linear,
            }
        }
    }

    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            backoff: Backoff::None,
        }
    }

    /// Wait before the given 1-based attempt; attempt 1 never waits
    pub fn delay_for(&self, attempt: usize) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }

        let delay = match self.backoff {
            Backoff::None => Duration::ZERO,
            Backoff::Linear => self.base_delay.saturating_mul((attempt - 1) as u32),
            Backoff::ExponentialJitter => {
                let exp = (attempt - 2).min(16) as u32;
                let scaled = self.base_delay.saturating_mul(1u32 << exp);
                let jitter_ceiling = self.base_delay.as_millis() as u64 / 2;
                let jitter = if jitter_ceiling > 0 {
                    rand::thread_rng().gen_range(0..=jitter_ceiling)
                } else {
                    0
                };
                scaled.saturating_add(Duration::from_millis(jitter))
            }
        };

        delay.min(self.max_delay)
    }

    /// Run `operation` until it succeeds, fails permanently, or attempts run out
    pub async fn run<T, F, Fut>(&self, label: &str, mut operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            let delay = self.delay_for(attempt);
            if !delay.is_zero() {
                debug!("{}: waiting {:?} before attempt {}", label, delay, attempt);
                sleep(delay).await;
            }

            match operation().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt < max_attempts => {
                    warn!(
                        "{}: attempt {}/{} failed ({}): {}",
                        label,
                        attempt,
                        max_attempts,
                        e.kind(),
                        e
                    );
                    attempt += 1;
                }
                Err(e) => {
                    if e.is_transient() {
                        warn!("{}: giving up after {} attempt(s): {}", label, attempt, e);
                    }
                    return Err(e);
                }
            }
        }
    }
}
