//! Bounded exponential poll for file readiness
//!
//! yt-dlp and ffmpeg may report success slightly before the filesystem shows
//! the final file. Both the download and transcode paths wait through here.

use crate::utils::config::PollSettings;
use crate::utils::error::{MediagrabError, Result};
use std::path::Path;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Poll parameters; `max_attempts` is the retry ceiling
#[derive(Debug, Clone)]
pub struct PollPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub factor: f64,
    pub max_delay: Duration,
}

impl PollPolicy {
    /// Delay slept after the given (1-based) failed attempt
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1) as i32;
        let scaled = self.initial_delay.as_nanos() as f64 * self.factor.max(1.0).powi(exp);
        if scaled >= self.max_delay.as_nanos() as f64 {
            return self.max_delay;
        }
        Duration::from_nanos(scaled.round() as u64)
    }
}

impl Default for PollPolicy {
    fn default() -> Self {
        PollSettings::default().into()
    }
}

impl From<PollSettings> for PollPolicy {
    fn from(settings: PollSettings) -> Self {
        Self {
            max_attempts: settings.max_attempts.max(1),
            initial_delay: settings.initial_delay,
            factor: settings.factor,
            max_delay: settings.max_delay,
        }
    }
}

/// Wait until `path` exists with a non-zero size; returns that size
pub async fn wait_for_file(path: &Path, policy: &PollPolicy) -> Result<u64> {
    for attempt in 1..=policy.max_attempts {
        match tokio::fs::metadata(path).await {
            Ok(meta) if meta.is_file() && meta.len() > 0 => {
                debug!(
                    "File ready after {} attempt(s): {} ({} bytes)",
                    attempt,
                    path.display(),
                    meta.len()
                );
                return Ok(meta.len());
            }
            Ok(_) => debug!("File {} still empty (attempt {})", path.display(), attempt),
            Err(e) => debug!(
                "File {} not visible yet (attempt {}): {}",
                path.display(),
                attempt,
                e
            ),
        }

        if attempt < policy.max_attempts {
            sleep(policy.delay_after(attempt)).await;
        }
    }

    warn!(
        "File {} never became ready after {} attempts",
        path.display(),
        policy.max_attempts
    );
    Err(MediagrabError::FileNotFound(path.to_path_buf()))
}
