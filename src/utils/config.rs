//! Core configuration
//!
//! Every timing constant and quota lives here with a default. Durations are
//! stored as milliseconds so the JSON file stays readable.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level settings for the extraction core
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreSettings {
    /// Directory holding downloaded and transcoded files
    pub scratch_dir: PathBuf,

    /// Maximum external processes running at once
    pub max_concurrent_processes: usize,

    pub tools: ToolSettings,
    pub retry: RetrySettings,
    pub timeouts: TimeoutSettings,
    pub cache: CacheSettings,
    pub registry: RegistrySettings,
    pub rate_limit: RateLimitSettings,
    pub poll: PollSettings,
    pub audio: AudioSettings,
}

impl Default for CoreSettings {
    fn default() -> Self {
        Self {
            scratch_dir: crate::utils::platform::default_scratch_dir(),
            max_concurrent_processes: 4,
            tools: ToolSettings::default(),
            retry: RetrySettings::default(),
            timeouts: TimeoutSettings::default(),
            cache: CacheSettings::default(),
            registry: RegistrySettings::default(),
            rate_limit: RateLimitSettings::default(),
            poll: PollSettings::default(),
            audio: AudioSettings::default(),
        }
    }
}

impl CoreSettings {
    /// Load settings from a JSON file; missing fields take their defaults
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let settings: CoreSettings = serde_json::from_str(&raw)
            .with_context(|| format!("Invalid config file {}", path.display()))?;
        Ok(settings.validated())
    }

    /// Clamp zero values that would disable a safety limit
    pub fn validated(mut self) -> Self {
        if self.max_concurrent_processes == 0 {
            self.max_concurrent_processes = 1;
        }
        if self.retry.fragile_attempts == 0 {
            self.retry.fragile_attempts = 1;
        }
        if self.retry.robust_attempts == 0 {
            self.retry.robust_attempts = 1;
        }
        if self.cache.max_entries == 0 {
            self.cache.max_entries = 1;
        }
        if self.poll.max_attempts == 0 {
            self.poll.max_attempts = 1;
        }
        if self.rate_limit.limit == 0 {
            self.rate_limit.limit = 1;
        }
        self
    }
}

/// External tool invocation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolSettings {
    /// yt-dlp program name or path
    pub extractor_program: PathBuf,
    /// ffmpeg program name or path
    pub transcoder_program: PathBuf,
    /// `--socket-timeout` passed to yt-dlp (seconds)
    pub socket_timeout_secs: u64,
    /// `--retries` passed to yt-dlp
    pub tool_retries: u32,
    /// `--concurrent-fragments` passed to yt-dlp
    pub concurrent_fragments: u32,
    /// Resolution ceiling for the capped format selector
    pub max_height: u32,
}

impl Default for ToolSettings {
    fn default() -> Self {
        Self {
            extractor_program: crate::utils::platform::ytdlp_path()
                .unwrap_or_else(|| PathBuf::from("yt-dlp")),
            transcoder_program: crate::utils::platform::ffmpeg_path()
                .unwrap_or_else(|| PathBuf::from("ffmpeg")),
            socket_timeout_secs: 15,
            tool_retries: 3,
            concurrent_fragments: 4,
            max_height: 1080,
        }
    }
}

/// Retry/backoff constants for the two platform classes
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub fragile_attempts: usize,
    #[serde(with = "millis")]
    pub fragile_base_delay: Duration,
    pub robust_attempts: usize,
    #[serde(with = "millis")]
    pub robust_base_delay: Duration,
    #[serde(with = "millis")]
    pub max_delay: Duration,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            fragile_attempts: 3,
            fragile_base_delay: Duration::from_secs(2),
            robust_attempts: 2,
            robust_base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
        }
    }
}

/// Hard limits on external invocations
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutSettings {
    #[serde(with = "millis")]
    pub probe: Duration,
    /// Probe limit for platforms known to answer slowly
    #[serde(with = "millis")]
    pub slow_probe: Duration,
    #[serde(with = "millis")]
    pub materialize: Duration,
    #[serde(with = "millis")]
    pub transcode: Duration,
}

impl Default for TimeoutSettings {
    fn default() -> Self {
        Self {
            probe: Duration::from_secs(30),
            slow_probe: Duration::from_secs(60),
            materialize: Duration::from_secs(600),
            transcode: Duration::from_secs(300),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    #[serde(with = "millis")]
    pub ttl: Duration,
    pub max_entries: usize,
    #[serde(with = "millis")]
    pub sweep_interval: Duration,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(10 * 60),
            max_entries: 500,
            sweep_interval: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistrySettings {
    #[serde(with = "millis")]
    pub ttl: Duration,
    #[serde(with = "millis")]
    pub sweep_interval: Duration,
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(5 * 60),
            sweep_interval: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitSettings {
    /// Requests allowed per client per window
    pub limit: u32,
    #[serde(with = "millis")]
    pub window: Duration,
    #[serde(with = "millis")]
    pub sweep_interval: Duration,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            limit: 10,
            window: Duration::from_secs(60),
            sweep_interval: Duration::from_secs(60),
        }
    }
}

/// File readiness poll shared by download location and transcode checks
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PollSettings {
    pub max_attempts: u32,
    #[serde(with = "millis")]
    pub initial_delay: Duration,
    pub factor: f64,
    #[serde(with = "millis")]
    pub max_delay: Duration,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_millis(200),
            factor: 2.0,
            max_delay: Duration::from_secs(2),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioSettings {
    /// Container/extension of the produced audio file
    pub format: String,
    pub codec: String,
    pub bitrate: String,
    /// Loudness filter applied to every transcode
    pub filter: String,
}

impl Default for AudioSettings {
    fn default() -> Self {
        Self {
            format: "mp3".to_string(),
            codec: "libmp3lame".to_string(),
            bitrate: "192k".to_string(),
            filter: "volume=1.5".to_string(),
        }
    }
}

/// Serialize `Duration` as integer milliseconds
mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}
