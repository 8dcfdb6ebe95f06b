//! Finding the file yt-dlp produced
//!
//! yt-dlp picks the final extension itself (merges, remuxes, audio
//! extraction), so the path is resolved through an ordered chain of
//! strategies instead of being predicted.

use crate::utils::error::{MediagrabError, Result};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing::debug;

/// Containers yt-dlp commonly leaves behind, most likely first
pub const VIDEO_EXTENSIONS: &[&str] = &["mp4", "webm", "mkv", "mov", "flv", "m4v"];
pub const AUDIO_EXTENSIONS: &[&str] = &["m4a", "webm", "opus", "mp3", "ogg", "aac", "mp4"];

/// Suffixes of in-progress or auxiliary files
const TEMPORARY_SUFFIXES: &[&str] = &[".part", ".ytdl", ".temp", ".tmp", ".json"];

/// Files modified this long before the start still count as ours
const CLOCK_SLACK: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocateStrategy {
    /// Paths announced in yt-dlp's own output
    OutputMarkers,
    /// `<dir>/<id>.<ext>` for each plausible extension
    ExpectedExtensions,
    /// Newest matching file in the working directory
    DirectoryScan,
}

impl LocateStrategy {
    pub const DEFAULT_CHAIN: [LocateStrategy; 3] = [
        LocateStrategy::OutputMarkers,
        LocateStrategy::ExpectedExtensions,
        LocateStrategy::DirectoryScan,
    ];
}

/// Inputs shared by all strategies
#[derive(Debug, Clone)]
pub struct LocateContext<'a> {
    pub output: &'a str,
    pub dir: &'a Path,
    pub id: &'a str,
    pub started_at: SystemTime,
    pub extensions: &'a [&'a str],
}

/// Destination paths announced in tool output, most authoritative first
///
/// Merged output beats post-processed output, which beats an existing file,
/// which beats a plain download destination. Within each group the last
/// announcement wins.
pub fn destination_markers(output: &str) -> Vec<PathBuf> {
    let mut merged = Vec::new();
    let mut extracted = Vec::new();
    let mut existing = Vec::new();
    let mut downloaded = Vec::new();

    for line in output.lines().map(str::trim) {
        if let Some(rest) = line.strip_prefix("[Merger] Merging formats into ") {
            merged.push(rest.trim().trim_matches('"').to_string());
        } else if let Some(rest) = line.strip_prefix("[ExtractAudio] Destination:") {
            extracted.push(rest.trim().to_string());
        } else if let Some(rest) = line.strip_prefix("[download] ") {
            if let Some(path) = rest.strip_suffix(" has already been downloaded") {
                existing.push(path.trim().to_string());
            } else if let Some(path) = rest.strip_prefix("Destination:") {
                downloaded.push(path.trim().to_string());
            }
        }
    }

    [merged, extracted, existing, downloaded]
        .into_iter()
        .flat_map(|group| group.into_iter().rev())
        .filter(|p| !p.is_empty())
        .map(PathBuf::from)
        .collect()
}

fn is_temporary(name: &str) -> bool {
    TEMPORARY_SUFFIXES.iter().any(|s| name.ends_with(s))
}

async fn non_empty_file(path: &Path) -> bool {
    matches!(tokio::fs::metadata(path).await, Ok(m) if m.is_file() && m.len() > 0)
}

fn resolve_in(dir: &Path, candidate: &Path) -> PathBuf {
    if candidate.is_absolute() {
        candidate.to_path_buf()
    } else {
        dir.join(candidate)
    }
}

async fn from_markers(ctx: &LocateContext<'_>) -> Option<PathBuf> {
    for marker in destination_markers(ctx.output) {
        let path = resolve_in(ctx.dir, &marker);
        if non_empty_file(&path).await {
            return Some(path);
        }
    }
    None
}

async fn from_extensions(ctx: &LocateContext<'_>) -> Option<PathBuf> {
    for ext in ctx.extensions {
        let path = ctx.dir.join(format!("{}.{}", ctx.id, ext));
        if non_empty_file(&path).await {
            return Some(path);
        }
    }
    None
}

async fn from_directory_scan(ctx: &LocateContext<'_>) -> Option<PathBuf> {
    let threshold = ctx.started_at.checked_sub(CLOCK_SLACK).unwrap_or(ctx.started_at);
    let mut entries = tokio::fs::read_dir(ctx.dir).await.ok()?;

    let mut prefixed: Option<(SystemTime, PathBuf)> = None;
    let mut newest: Option<(SystemTime, PathBuf)> = None;

    while let Ok(Some(entry)) = entries.next_entry().await {
        let name = entry.file_name().to_string_lossy().into_owned();
        if is_temporary(&name) {
            continue;
        }
        let Ok(meta) = entry.metadata().await else { continue };
        if !meta.is_file() || meta.len() == 0 {
            continue;
        }
        let Ok(modified) = meta.modified() else { continue };
        if modified < threshold {
            continue;
        }

        let slot = if name.starts_with(ctx.id) {
            &mut prefixed
        } else {
            &mut newest
        };
        if slot.as_ref().map(|(t, _)| modified > *t).unwrap_or(true) {
            *slot = Some((modified, entry.path()));
        }
    }

    prefixed.or(newest).map(|(_, path)| path)
}

/// Run the chain; the first strategy that finds a non-empty file wins
///
/// If nothing is on disk yet but the tool announced a destination, that
/// path is returned so the readiness poll can wait for it.
pub async fn locate_file(chain: &[LocateStrategy], ctx: &LocateContext<'_>) -> Result<PathBuf> {
    for strategy in chain {
        let found = match strategy {
            LocateStrategy::OutputMarkers => from_markers(ctx).await,
            LocateStrategy::ExpectedExtensions => from_extensions(ctx).await,
            LocateStrategy::DirectoryScan => from_directory_scan(ctx).await,
        };
        if let Some(path) = found {
            debug!(id = %ctx.id, "Located output via {:?}: {}", strategy, path.display());
            return Ok(path);
        }
    }

    if chain.contains(&LocateStrategy::OutputMarkers) {
        if let Some(marker) = destination_markers(ctx.output).into_iter().next() {
            let path = resolve_in(ctx.dir, &marker);
            debug!(id = %ctx.id, "Output not visible yet, waiting on {}", path.display());
            return Ok(path);
        }
    }

    Err(MediagrabError::FilePath(format!(
        "no output file found for download {} in {}",
        ctx.id,
        ctx.dir.display()
    )))
}
