//! yt-dlp output parsing
//!
//! stdout may carry log lines around the JSON document, so the parser looks
//! for the outermost balanced `{...}` block instead of trusting the stream.

use crate::extractor::models::{
    AudioOption, Delivery, ProbeResult, QualityOption, RawFormat, RawVideoInfo, SizeEstimate,
    VideoMetadata,
};
use crate::extractor::platform::SourcePlatform;
use crate::utils::error::{MediagrabError, Result};
use chrono::NaiveDate;
use std::collections::HashMap;

/// Audio size estimate when the source reports none, as a share of the largest video
pub const AUDIO_SIZE_FRACTION: f64 = 0.1;

/// Find the end (exclusive) of the balanced block opening at `start`
fn balanced_end(bytes: &[u8], start: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, &b) in bytes[start..].iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }

        match b {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(start + offset + 1);
                }
            }
            _ => {}
        }
    }

    None
}

/// Every top-level balanced JSON object embedded in `text`, left to right
///
/// A `{` inside a log line that does not open valid JSON is skipped. Objects
/// nested in an accepted block are not reported separately.
pub fn json_blocks(text: &str) -> Vec<&str> {
    let bytes = text.as_bytes();
    let mut blocks = Vec::new();
    let mut search_from = 0;

    while let Some(rel) = text[search_from..].find('{') {
        let start = search_from + rel;
        search_from = start + 1;

        let Some(end) = balanced_end(bytes, start) else {
            continue;
        };
        let candidate = &text[start..end];
        let is_object = serde_json::from_str::<serde_json::Value>(candidate)
            .map(|v| v.is_object())
            .unwrap_or(false);
        if is_object {
            blocks.push(candidate);
            search_from = end;
        }
    }

    blocks
}

/// Locate the outermost JSON document in `text`
///
/// Log lines can carry small objects of their own (`Proxy map: {}`), so the
/// largest top-level block wins; ties go to the earliest.
pub fn locate_json_block(text: &str) -> Option<&str> {
    json_blocks(text)
        .into_iter()
        .fold(None, |best: Option<&str>, block| match best {
            Some(b) if b.len() >= block.len() => Some(b),
            _ => Some(block),
        })
}

/// Parse probe stdout into a normalized result
pub fn parse_probe_output(stdout: &str, platform: SourcePlatform) -> Result<ProbeResult> {
    let mut blocks = json_blocks(stdout);
    if blocks.is_empty() {
        return Err(MediagrabError::Parse(
            "no JSON document found in extractor output".to_string(),
        ));
    }
    // Largest first; stable sort keeps earlier blocks ahead on ties
    blocks.sort_by(|a, b| b.len().cmp(&a.len()));

    let mut first_error = None;
    for block in blocks {
        match serde_json::from_str::<RawVideoInfo>(block) {
            Ok(raw) => {
                if raw.title.trim().is_empty() {
                    return Err(MediagrabError::Parse(
                        "extractor returned an empty title".to_string(),
                    ));
                }
                return Ok(normalize(raw, platform));
            }
            Err(e) => {
                first_error.get_or_insert_with(|| e.to_string());
            }
        }
    }

    Err(MediagrabError::Parse(first_error.unwrap_or_default()))
}

/// Resolution class for a pixel height
pub fn quality_label(height: u32) -> String {
    format!("{}p", height)
}

fn estimate_size(
    exact: Option<f64>,
    approx: Option<f64>,
    kbps: Option<f64>,
    duration: Option<f64>,
) -> Option<SizeEstimate> {
    if let Some(bytes) = exact.filter(|b| *b > 0.0) {
        return Some(SizeEstimate {
            bytes: bytes as u64,
            exact: true,
        });
    }
    if let Some(bytes) = approx.filter(|b| *b > 0.0) {
        return Some(SizeEstimate {
            bytes: bytes as u64,
            exact: false,
        });
    }
    match (kbps, duration) {
        (Some(kbps), Some(secs)) if kbps > 0.0 && secs > 0.0 => Some(SizeEstimate {
            bytes: (kbps * 1000.0 / 8.0 * secs) as u64,
            exact: false,
        }),
        _ => None,
    }
}

fn parse_upload_date(raw: Option<&str>) -> Option<NaiveDate> {
    raw.and_then(|d| NaiveDate::parse_from_str(d, "%Y%m%d").ok())
}

/// Formats to inspect; single-format results carry the stream at the top level
fn collect_formats(raw: &RawVideoInfo) -> Vec<RawFormat> {
    if !raw.formats.is_empty() {
        return raw.formats.clone();
    }
    if raw.url.is_none() && raw.height.is_none() {
        return Vec::new();
    }
    vec![RawFormat {
        format_id: raw.format_id.clone().unwrap_or_default(),
        ext: raw.ext.clone().unwrap_or_else(|| "mp4".to_string()),
        url: raw.url.clone(),
        protocol: raw.protocol.clone(),
        height: raw.height,
        vcodec: raw.vcodec.clone(),
        acodec: raw.acodec.clone(),
        filesize: raw.filesize,
        filesize_approx: raw.filesize_approx,
        tbr: raw.tbr,
        ..Default::default()
    }]
}

/// Video qualities: one per label (largest size wins), highest resolution first
fn build_qualities(formats: &[RawFormat], duration: Option<f64>) -> Vec<QualityOption> {
    let mut best: HashMap<String, (QualityOption, f64)> = HashMap::new();

    for format in formats.iter().filter(|f| f.has_video()) {
        let Some(height) = format.height else { continue };
        let size = estimate_size(format.filesize, format.filesize_approx, format.tbr, duration);
        let rank = size
            .map(|s| s.bytes as f64)
            .unwrap_or_else(|| format.tbr.unwrap_or(0.0));

        let option = QualityOption {
            label: quality_label(height),
            height,
            container: format.ext.clone(),
            size,
            format_id: format.format_id.clone(),
            url: format.url.clone(),
            delivery: Delivery::from_protocol(format.protocol.as_deref()),
        };

        match best.get(&option.label) {
            Some((_, existing_rank)) if *existing_rank >= rank => {}
            _ => {
                best.insert(option.label.clone(), (option, rank));
            }
        }
    }

    let mut qualities: Vec<QualityOption> = best.into_values().map(|(q, _)| q).collect();
    qualities.sort_by(|a, b| b.height.cmp(&a.height));
    qualities
}

fn build_audio(
    formats: &[RawFormat],
    duration: Option<f64>,
    qualities: &[QualityOption],
) -> Option<AudioOption> {
    let best_audio = formats
        .iter()
        .filter(|f| f.is_audio_only())
        .max_by(|a, b| {
            let ra = a.abr.or(a.tbr).unwrap_or(0.0);
            let rb = b.abr.or(b.tbr).unwrap_or(0.0);
            ra.partial_cmp(&rb).unwrap_or(std::cmp::Ordering::Equal)
        });

    let largest_video = qualities
        .iter()
        .filter_map(|q| q.size.map(|s| s.bytes))
        .max();
    let estimated = largest_video.map(|bytes| SizeEstimate {
        bytes: (bytes as f64 * AUDIO_SIZE_FRACTION) as u64,
        exact: false,
    });

    match best_audio {
        Some(format) => Some(AudioOption {
            format_id: Some(format.format_id.clone()),
            container: format.ext.clone(),
            bitrate_kbps: format.abr.or(format.tbr),
            size: estimate_size(format.filesize, format.filesize_approx, format.abr, duration)
                .or(estimated),
        }),
        // Audio can still be transcoded out of the video stream
        None if !qualities.is_empty() => Some(AudioOption {
            format_id: None,
            container: "mp3".to_string(),
            bitrate_kbps: None,
            size: estimated,
        }),
        None => None,
    }
}

/// Watermarked when every video rendition is flagged as such
fn is_watermarked(formats: &[RawFormat]) -> bool {
    let mut video = formats.iter().filter(|f| f.has_video()).peekable();
    video.peek().is_some()
        && video.all(|f| {
            f.format_note
                .as_deref()
                .map(|n| n.to_ascii_lowercase().contains("watermark"))
                .unwrap_or(false)
        })
}

/// Turn raw yt-dlp info into the caller-facing result
pub fn normalize(raw: RawVideoInfo, platform: SourcePlatform) -> ProbeResult {
    let formats = collect_formats(&raw);
    let qualities = build_qualities(&formats, raw.duration);
    let audio = build_audio(&formats, raw.duration, &qualities);

    let metadata = VideoMetadata {
        id: raw.id.clone(),
        title: raw.title.trim().to_string(),
        platform,
        author: raw.uploader.clone().or_else(|| raw.channel.clone()),
        author_id: raw.uploader_id.clone(),
        thumbnail: raw.thumbnail.clone(),
        duration_secs: raw.duration,
        view_count: raw.view_count,
        like_count: raw.like_count,
        upload_date: parse_upload_date(raw.upload_date.as_deref()),
        webpage_url: raw.webpage_url.clone(),
        watermarked: is_watermarked(&formats),
    };

    ProbeResult {
        metadata,
        qualities,
        audio,
    }
}
