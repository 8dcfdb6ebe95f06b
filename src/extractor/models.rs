//! Data structures for video information
//!
//! `RawVideoInfo` / `RawFormat` mirror the JSON yt-dlp prints. Everything else
//! is the normalized form handed to callers.

use crate::extractor::platform::SourcePlatform;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Video information as printed by `yt-dlp --dump-json`
#[derive(Debug, Clone, Deserialize)]
pub struct RawVideoInfo {
    #[serde(default)]
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub webpage_url: Option<String>,
    #[serde(default)]
    pub duration: Option<f64>,
    #[serde(default)]
    pub thumbnail: Option<String>,
    #[serde(default)]
    pub uploader: Option<String>,
    #[serde(default)]
    pub uploader_id: Option<String>,
    #[serde(default)]
    pub channel: Option<String>,
    #[serde(default)]
    pub upload_date: Option<String>,
    #[serde(default)]
    pub view_count: Option<u64>,
    #[serde(default)]
    pub like_count: Option<u64>,
    #[serde(default)]
    pub formats: Vec<RawFormat>,

    // Single-format extractors put the stream fields at the top level
    #[serde(default)]
    pub format_id: Option<String>,
    #[serde(default)]
    pub ext: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub height: Option<u32>,
    #[serde(default)]
    pub vcodec: Option<String>,
    #[serde(default)]
    pub acodec: Option<String>,
    #[serde(default)]
    pub filesize: Option<f64>,
    #[serde(default)]
    pub filesize_approx: Option<f64>,
    #[serde(default)]
    pub tbr: Option<f64>,
    #[serde(default)]
    pub protocol: Option<String>,
}

/// One stream entry from the `formats` array
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawFormat {
    #[serde(default)]
    pub format_id: String,
    #[serde(default)]
    pub ext: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub protocol: Option<String>,
    #[serde(default)]
    pub format_note: Option<String>,
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub height: Option<u32>,
    #[serde(default)]
    pub vcodec: Option<String>,
    #[serde(default)]
    pub acodec: Option<String>,
    #[serde(default)]
    pub filesize: Option<f64>,
    #[serde(default)]
    pub filesize_approx: Option<f64>,
    #[serde(default)]
    pub tbr: Option<f64>, // Total bitrate (kbit/s)
    #[serde(default)]
    pub abr: Option<f64>, // Audio bitrate (kbit/s)
}

impl RawFormat {
    pub fn has_video(&self) -> bool {
        codec_present(&self.vcodec) && self.height.is_some()
    }

    pub fn has_audio(&self) -> bool {
        codec_present(&self.acodec)
    }

    pub fn is_audio_only(&self) -> bool {
        self.has_audio() && !codec_present(&self.vcodec)
    }
}

/// yt-dlp writes `"none"` for a missing stream; absence means "unknown"
fn codec_present(codec: &Option<String>) -> bool {
    !matches!(codec.as_deref(), Some("none"))
}

/// Which artifact the caller wants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaFormat {
    Video,
    Audio,
}

impl MediaFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaFormat::Video => "video",
            MediaFormat::Audio => "audio",
        }
    }
}

/// Probe (metadata only) or materialize (produce a file)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Probe,
    Materialize,
}

/// One caller invocation; never persisted
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionRequest {
    pub url: String,
    pub operation: Operation,
    pub format: MediaFormat,
}

impl ExtractionRequest {
    pub fn probe(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            operation: Operation::Probe,
            format: MediaFormat::Video,
        }
    }

    pub fn materialize(url: impl Into<String>, format: MediaFormat) -> Self {
        Self {
            url: url.into(),
            operation: Operation::Materialize,
            format,
        }
    }
}

/// Normalized video metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoMetadata {
    pub id: String,
    pub title: String,
    pub platform: SourcePlatform,
    pub author: Option<String>,
    pub author_id: Option<String>,
    pub thumbnail: Option<String>,
    pub duration_secs: Option<f64>,
    pub view_count: Option<u64>,
    pub like_count: Option<u64>,
    pub upload_date: Option<NaiveDate>,
    pub webpage_url: Option<String>,
    pub watermarked: bool,
}

/// A byte size that is either reported by the source or estimated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SizeEstimate {
    pub bytes: u64,
    pub exact: bool,
}

/// How the stream is delivered by the source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Delivery {
    Direct,
    Hls,
    Dash,
    Other,
}

impl Delivery {
    pub fn from_protocol(protocol: Option<&str>) -> Self {
        match protocol {
            None => Delivery::Other,
            Some(p) if p.starts_with("m3u8") => Delivery::Hls,
            Some(p) if p.contains("dash") => Delivery::Dash,
            Some("https") | Some("http") => Delivery::Direct,
            Some(_) => Delivery::Other,
        }
    }
}

/// One selectable video quality
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityOption {
    /// Resolution class, e.g. "1080p"
    pub label: String,
    pub height: u32,
    pub container: String,
    pub size: Option<SizeEstimate>,
    pub format_id: String,
    pub url: Option<String>,
    pub delivery: Delivery,
}

/// Best audio-only rendition; size may be an advisory estimate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioOption {
    pub format_id: Option<String>,
    pub container: String,
    pub bitrate_kbps: Option<f64>,
    pub size: Option<SizeEstimate>,
}

/// Everything a probe returns
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeResult {
    pub metadata: VideoMetadata,
    pub qualities: Vec<QualityOption>,
    pub audio: Option<AudioOption>,
}
