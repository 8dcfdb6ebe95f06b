//! Core facade
//!
//! `MediaCore` wires every component from `CoreSettings` and is the only
//! type a caller (CLI, HTTP layer) needs to hold.
//!
//! Registry state is in memory only. Scratch files that outlive their
//! process are reclaimed by `purge_scratch`, which `start_sweepers` also
//! runs on an interval.

use crate::cache::ProbeCache;
use crate::downloader::orchestrator::{DownloadOrchestrator, MaterializedFile};
use crate::downloader::transcode::{FfmpegEngine, TranscodeEngine, TranscodingAdapter};
use crate::extractor::command::CommandBuilder;
use crate::extractor::models::{ExtractionRequest, MediaFormat, Operation, ProbeResult};
use crate::extractor::runner::{CommandRunner, ProcessRunner};
use crate::extractor::service::ExtractionService;
use crate::limiter::{RateDecision, RateLimiter};
use crate::registry::{content_type_for, DownloadRegistry, PublishedFile, Retrieval};
use crate::sweeper::Sweepers;
use crate::utils::config::CoreSettings;
use crate::utils::error::Result;
use crate::utils::poll::PollPolicy;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

/// Result of `MediaCore::execute`
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "operation", rename_all = "lowercase")]
pub enum CoreOutcome {
    Probed(ProbeResult),
    Materialized(MaterializedFile),
}

/// What a caller gets back after publishing a file
#[derive(Debug, Clone, Serialize)]
pub struct Publication {
    pub id: String,
    pub filename: String,
    pub format: MediaFormat,
    pub size: u64,
    pub content_type: &'static str,
    pub expires_at: DateTime<Utc>,
}

pub struct MediaCore {
    settings: CoreSettings,
    extraction: Arc<ExtractionService>,
    orchestrator: DownloadOrchestrator,
    cache: Arc<ProbeCache>,
    registry: Arc<DownloadRegistry>,
    limiter: Arc<RateLimiter>,
    sweepers: Mutex<Option<Sweepers>>,
}

impl MediaCore {
    /// Core backed by real yt-dlp and ffmpeg processes
    pub fn new(settings: CoreSettings) -> Self {
        let runner = ProcessRunner::new(settings.max_concurrent_processes);
        let engine = FfmpegEngine::new(runner.permits());
        Self::with_components(settings, Arc::new(runner), Arc::new(engine))
    }

    /// Core with substitute process runner and transcode engine
    pub fn with_components(
        settings: CoreSettings,
        runner: Arc<dyn CommandRunner>,
        engine: Arc<dyn TranscodeEngine>,
    ) -> Self {
        let settings = settings.validated();
        let builder = CommandBuilder::new(&settings.tools);
        let cache = Arc::new(ProbeCache::new(&settings.cache));
        let registry = Arc::new(DownloadRegistry::new(settings.registry.ttl));
        let limiter = Arc::new(RateLimiter::new(&settings.rate_limit));
        let poll = PollPolicy::from(settings.poll.clone());

        let extraction = Arc::new(ExtractionService::new(
            runner.clone(),
            builder.clone(),
            settings.retry.clone(),
            settings.timeouts.clone(),
            cache.clone(),
        ));

        let transcoder = Arc::new(TranscodingAdapter::new(
            engine,
            settings.tools.transcoder_program.clone(),
            settings.audio.clone(),
            settings.timeouts.transcode,
            poll.clone(),
        ));

        let orchestrator = DownloadOrchestrator::new(
            runner,
            builder,
            settings.retry.clone(),
            settings.timeouts.materialize,
            settings.scratch_dir.clone(),
            poll,
            transcoder,
        )
        .with_extraction(extraction.clone());

        Self {
            settings,
            extraction,
            orchestrator,
            cache,
            registry,
            limiter,
            sweepers: Mutex::new(None),
        }
    }

    pub fn settings(&self) -> &CoreSettings {
        &self.settings
    }

    pub fn cache(&self) -> &Arc<ProbeCache> {
        &self.cache
    }

    pub fn registry(&self) -> &Arc<DownloadRegistry> {
        &self.registry
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    pub async fn probe(&self, url: &str) -> Result<ProbeResult> {
        self.extraction.probe(url).await
    }

    pub async fn materialize(&self, url: &str, format: MediaFormat) -> Result<MaterializedFile> {
        self.orchestrator.materialize(url, format).await
    }

    pub async fn execute(&self, request: &ExtractionRequest) -> Result<CoreOutcome> {
        match request.operation {
            Operation::Probe => self.probe(&request.url).await.map(CoreOutcome::Probed),
            Operation::Materialize => self
                .materialize(&request.url, request.format)
                .await
                .map(CoreOutcome::Materialized),
        }
    }

    /// Hand a materialized file to the registry under its own id
    pub async fn publish(&self, file: MaterializedFile) -> Publication {
        let metadata = file
            .metadata
            .as_ref()
            .and_then(|m| serde_json::to_value(m).ok())
            .unwrap_or(serde_json::Value::Null);
        let content_type = content_type_for(&file.path);

        let entry = self
            .registry
            .put_default(
                &file.id,
                PublishedFile {
                    path: file.path.clone(),
                    filename: file.filename.clone(),
                    metadata,
                    format: file.format,
                },
            )
            .await;

        Publication {
            id: file.id,
            filename: file.filename,
            format: file.format,
            size: file.size,
            content_type,
            expires_at: entry.expires_at,
        }
    }

    /// Materialize and publish in one step
    pub async fn fetch(&self, url: &str, format: MediaFormat) -> Result<Publication> {
        let file = self.materialize(url, format).await?;
        Ok(self.publish(file).await)
    }

    /// Hand out a published file; each id can be retrieved once
    ///
    /// The caller owns the returned file and removes it after serving.
    pub async fn retrieve(&self, id: &str) -> Option<Retrieval> {
        self.registry.take(id).await
    }

    pub async fn release(&self, id: &str) -> bool {
        self.registry.release(id).await
    }

    pub async fn check_rate(&self, client: &str) -> RateDecision {
        self.limiter.check_default(client).await
    }

    /// Delete scratch files older than the registry TTL that no live entry owns
    pub async fn purge_scratch(&self) -> usize {
        self.registry
            .purge_orphans(&self.settings.scratch_dir, self.settings.registry.ttl)
            .await
    }

    /// Start the cache, registry, scratch and limiter sweeps; a second call
    /// is a no-op
    ///
    /// The scratch directory is purged once up front, since leftovers from a
    /// previous process are already stale.
    pub async fn start_sweepers(&self) {
        let mut slot = self.sweepers.lock().await;
        if slot.is_some() {
            return;
        }

        self.purge_scratch().await;
        let mut sweepers = Sweepers::new();

        let cache = self.cache.clone();
        sweepers.spawn("cache", self.settings.cache.sweep_interval, move || {
            let cache = cache.clone();
            async move { cache.sweep().await }
        });

        let registry = self.registry.clone();
        sweepers.spawn("registry", self.settings.registry.sweep_interval, move || {
            let registry = registry.clone();
            async move { registry.sweep().await }
        });

        let registry = self.registry.clone();
        let scratch = self.settings.scratch_dir.clone();
        let max_age = self.settings.registry.ttl;
        sweepers.spawn("scratch", self.settings.registry.sweep_interval, move || {
            let registry = registry.clone();
            let scratch = scratch.clone();
            async move { registry.purge_orphans(&scratch, max_age).await }
        });

        let limiter = self.limiter.clone();
        sweepers.spawn("rate-limit", self.settings.rate_limit.sweep_interval, move || {
            let limiter = limiter.clone();
            async move { limiter.sweep().await }
        });

        info!("Started {} background sweepers", sweepers.len());
        *slot = Some(sweepers);
    }

    pub async fn shutdown(&self) {
        if let Some(sweepers) = self.sweepers.lock().await.take() {
            sweepers.shutdown().await;
            info!("Background sweepers stopped");
        }
    }
}
