//! Download orchestration
//!
//! materialize = resolve platform, download under retry (with one relaxed
//! format attempt if the capped selector is rejected), locate the output,
//! wait for it to be readable, transcode when audio was requested, and
//! attach probe metadata.

use crate::downloader::locate::{
    locate_file, LocateContext, LocateStrategy, AUDIO_EXTENSIONS, VIDEO_EXTENSIONS,
};
use crate::downloader::transcode::TranscodingAdapter;
use crate::extractor::command::{CommandBuilder, FormatSelector};
use crate::extractor::models::{MediaFormat, VideoMetadata};
use crate::extractor::platform::{require_supported, SourcePlatform};
use crate::extractor::runner::{CommandOutput, CommandRunner};
use crate::extractor::service::{run_classified, ExtractionService};
use crate::registry::delete_quietly;
use crate::resilience::classifier::ErrorClassifier;
use crate::resilience::retry::RetryPolicy;
use crate::utils::config::RetrySettings;
use crate::utils::error::{ErrorKind, MediagrabError, Result};
use crate::utils::poll::{wait_for_file, PollPolicy};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Longest title kept in a display filename
const MAX_TITLE_CHARS: usize = 120;

/// A downloaded (and possibly transcoded) file in the scratch directory
#[derive(Debug, Clone, Serialize)]
pub struct MaterializedFile {
    /// Also the file stem on disk
    pub id: String,
    pub path: PathBuf,
    /// Name suggested to the caller
    pub filename: String,
    pub format: MediaFormat,
    pub size: u64,
    pub platform: SourcePlatform,
    pub metadata: Option<VideoMetadata>,
}

/// Title made safe for use as a filename, plus extension
pub fn display_filename(title: Option<&str>, fallback: &str, ext: &str) -> String {
    let cleaned: String = title
        .unwrap_or_default()
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => ' ',
            c => c,
        })
        .collect();
    let collapsed = cleaned.split_whitespace().collect::<Vec<_>>().join(" ");
    let trimmed: String = collapsed
        .trim_matches(|c: char| c == '.' || c.is_whitespace())
        .chars()
        .take(MAX_TITLE_CHARS)
        .collect();

    let stem = if trimmed.trim().is_empty() {
        fallback.to_string()
    } else {
        trimmed.trim_end().to_string()
    };
    format!("{}.{}", stem, ext)
}

fn extension_of(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default()
}

pub struct DownloadOrchestrator {
    runner: Arc<dyn CommandRunner>,
    builder: CommandBuilder,
    classifier: ErrorClassifier,
    retry: RetrySettings,
    limit: Duration,
    scratch_dir: PathBuf,
    poll: PollPolicy,
    transcoder: Arc<TranscodingAdapter>,
    extraction: Option<Arc<ExtractionService>>,
}

impl DownloadOrchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        builder: CommandBuilder,
        retry: RetrySettings,
        limit: Duration,
        scratch_dir: PathBuf,
        poll: PollPolicy,
        transcoder: Arc<TranscodingAdapter>,
    ) -> Self {
        Self {
            runner,
            builder,
            classifier: ErrorClassifier::extraction(),
            retry,
            limit,
            scratch_dir,
            poll,
            transcoder,
            extraction: None,
        }
    }

    /// Attach metadata to every materialized file, probing on a cache miss
    pub fn with_extraction(mut self, extraction: Arc<ExtractionService>) -> Self {
        self.extraction = Some(extraction);
        self
    }

    pub fn scratch_dir(&self) -> &Path {
        &self.scratch_dir
    }

    async fn download(
        &self,
        url: &str,
        platform: SourcePlatform,
        template: &str,
        selector: FormatSelector,
        format: MediaFormat,
        policy: &RetryPolicy,
    ) -> Result<CommandOutput> {
        let spec = self
            .builder
            .download(url, platform, template, selector, format);
        debug!(platform = %platform, "Download selector {:?}", selector);

        policy
            .run("download", || {
                run_classified(self.runner.as_ref(), &self.classifier, &spec, self.limit)
            })
            .await
    }

    /// Produce a local file for `url` in the requested format
    pub async fn materialize(&self, url: &str, format: MediaFormat) -> Result<MaterializedFile> {
        let platform = require_supported(url)?;

        tokio::fs::create_dir_all(&self.scratch_dir)
            .await
            .map_err(|e| {
                MediagrabError::FilePath(format!(
                    "cannot create scratch directory {}: {}",
                    self.scratch_dir.display(),
                    e
                ))
            })?;

        let id = Uuid::new_v4().simple().to_string();
        let template = self
            .scratch_dir
            .join(format!("{}.%(ext)s", id))
            .to_string_lossy()
            .into_owned();
        let started_at = SystemTime::now();
        let policy = RetryPolicy::for_platform(platform, &self.retry);

        info!(id = %id, platform = %platform, "Materializing {} as {}", url, format.as_str());

        let result = self
            .materialize_into(url, platform, format, &id, &template, started_at, &policy)
            .await;

        if let Err(e) = &result {
            warn!(id = %id, "Materialize failed ({}): {}", e.kind(), e);
            self.discard_artifacts(&id).await;
        }
        result
    }

    #[allow(clippy::too_many_arguments)]
    async fn materialize_into(
        &self,
        url: &str,
        platform: SourcePlatform,
        format: MediaFormat,
        id: &str,
        template: &str,
        started_at: SystemTime,
        policy: &RetryPolicy,
    ) -> Result<MaterializedFile> {
        let output = match self
            .download(url, platform, template, FormatSelector::Capped, format, policy)
            .await
        {
            Err(e) if e.kind() == ErrorKind::UnsupportedQuality => {
                warn!(id = %id, "Capped format rejected, retrying with relaxed selector");
                self.download(url, platform, template, FormatSelector::Relaxed, format, policy)
                    .await?
            }
            other => other?,
        };

        let combined = output.combined();
        let ctx = LocateContext {
            output: &combined,
            dir: &self.scratch_dir,
            id,
            started_at,
            extensions: match format {
                MediaFormat::Video => VIDEO_EXTENSIONS,
                MediaFormat::Audio => AUDIO_EXTENSIONS,
            },
        };
        let downloaded = locate_file(&LocateStrategy::DEFAULT_CHAIN, &ctx).await?;
        let mut size = wait_for_file(&downloaded, &self.poll).await?;
        let mut path = downloaded.clone();

        if format == MediaFormat::Audio {
            let settings = self.transcoder.settings();
            if extension_of(&downloaded) != settings.format.to_ascii_lowercase() {
                path = self
                    .transcoder
                    .to_audio(&downloaded, &settings.format, &settings.bitrate)
                    .await?;
                delete_quietly(&downloaded).await;
                size = tokio::fs::metadata(&path)
                    .await
                    .map(|m| m.len())
                    .map_err(|_| MediagrabError::FileNotFound(path.clone()))?;
            }
        }

        let metadata = self.metadata_for(id, url).await;
        let filename = display_filename(
            metadata.as_ref().map(|m| m.title.as_str()),
            id,
            &extension_of(&path),
        );

        info!(id = %id, "Materialized {} ({} bytes)", path.display(), size);
        Ok(MaterializedFile {
            id: id.to_string(),
            path,
            filename,
            format,
            size,
            platform,
            metadata,
        })
    }

    /// Probe metadata for a finished download
    ///
    /// The file already exists at this point, so a failed probe costs the
    /// display name and metadata, not the download.
    async fn metadata_for(&self, id: &str, url: &str) -> Option<VideoMetadata> {
        let extraction = self.extraction.as_ref()?;
        match extraction.probe(url).await {
            Ok(probe) => Some(probe.metadata),
            Err(e) => {
                warn!(id = %id, "No metadata for download ({}): {}", e.kind(), e);
                None
            }
        }
    }

    /// Remove every scratch file belonging to download `id`
    async fn discard_artifacts(&self, id: &str) {
        let Ok(mut entries) = tokio::fs::read_dir(&self.scratch_dir).await else {
            return;
        };
        while let Ok(Some(entry)) = entries.next_entry().await {
            if entry.file_name().to_string_lossy().starts_with(id) {
                delete_quietly(&entry.path()).await;
            }
        }
    }
}
