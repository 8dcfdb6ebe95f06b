//! Metadata probing
//!
//! Resolve the platform, consult the cache, run yt-dlp under the retry
//! policy, parse, and cache the result.

use crate::cache::ProbeCache;
use crate::extractor::command::{CommandBuilder, CommandSpec};
use crate::extractor::models::ProbeResult;
use crate::extractor::parse::parse_probe_output;
use crate::extractor::platform::{require_supported, SourcePlatform};
use crate::extractor::runner::{CommandOutput, CommandRunner, RunError};
use crate::resilience::classifier::{ErrorClassifier, ToolFailure};
use crate::resilience::retry::RetryPolicy;
use crate::utils::config::{RetrySettings, TimeoutSettings};
use crate::utils::error::{MediagrabError, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Run `spec` and convert every failure into a classified error
pub(crate) async fn run_classified(
    runner: &dyn CommandRunner,
    classifier: &ErrorClassifier,
    spec: &CommandSpec,
    limit: Duration,
) -> Result<CommandOutput> {
    let program = spec.program.to_string_lossy().into_owned();

    let output = match runner.run(spec, limit).await {
        Ok(output) => output,
        Err(RunError::NotFound(_)) => {
            return Err(MediagrabError::CommandNotFound(program));
        }
        Err(RunError::TimedOut { secs, .. }) => {
            return Err(MediagrabError::Timeout(format!(
                "{} did not finish within {}s",
                program, secs
            )));
        }
        Err(e @ RunError::Io { .. }) => {
            return Err(MediagrabError::ExtractionFailed(e.to_string()));
        }
    };

    if output.success() {
        return Ok(output);
    }

    let combined = output.combined();
    let failure = ToolFailure::extractor(&program, output.exit_code, &combined);
    let err = classifier.classify(&failure);
    debug!(
        "{} exited with {:?}, classified as {}",
        program,
        output.exit_code,
        err.kind()
    );
    Err(err)
}

pub struct ExtractionService {
    runner: Arc<dyn CommandRunner>,
    builder: CommandBuilder,
    classifier: ErrorClassifier,
    retry: RetrySettings,
    timeouts: TimeoutSettings,
    cache: Arc<ProbeCache>,
}

impl ExtractionService {
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        builder: CommandBuilder,
        retry: RetrySettings,
        timeouts: TimeoutSettings,
        cache: Arc<ProbeCache>,
    ) -> Self {
        Self {
            runner,
            builder,
            classifier: ErrorClassifier::extraction(),
            retry,
            timeouts,
            cache,
        }
    }

    pub fn cache(&self) -> &Arc<ProbeCache> {
        &self.cache
    }

    fn probe_timeout(&self, platform: SourcePlatform) -> Duration {
        if platform.is_slow() {
            self.timeouts.slow_probe
        } else {
            self.timeouts.probe
        }
    }

    /// Metadata and available qualities for `url`
    pub async fn probe(&self, url: &str) -> Result<ProbeResult> {
        let platform = require_supported(url)?;

        if let Some(hit) = self.cache.get(url).await {
            debug!(platform = %platform, "Probe cache hit: {}", url);
            return Ok(hit);
        }

        let spec = self.builder.probe(url, platform);
        let limit = self.probe_timeout(platform);
        let policy = RetryPolicy::for_platform(platform, &self.retry);
        info!(platform = %platform, "Probing {}", url);

        let output = policy
            .run("probe", || {
                run_classified(self.runner.as_ref(), &self.classifier, &spec, limit)
            })
            .await?;

        let result = parse_probe_output(&output.stdout, platform)?;
        info!(
            platform = %platform,
            "Probed \"{}\": {} qualities",
            result.metadata.title,
            result.qualities.len()
        );

        self.cache.put(url, result.clone()).await;
        Ok(result)
    }
}
