//! Shared fakes for the integration tests: a scripted process runner that
//! records every invocation, and a transcode engine that writes its output.

#![allow(dead_code)]

use async_trait::async_trait;
use mediagrab::downloader::transcode::{TranscodeEngine, TranscodeEvent, TranscodeJob};
use mediagrab::extractor::command::CommandSpec;
use mediagrab::extractor::runner::{CommandOutput, CommandRunner, RunError};
use mediagrab::CoreSettings;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

pub type Script = Box<dyn Fn(&CommandSpec, usize) -> Result<CommandOutput, RunError> + Send + Sync>;

/// Runner that answers from a script and counts spawns
pub struct SpyRunner {
    script: Script,
    calls: AtomicUsize,
    seen: Mutex<Vec<CommandSpec>>,
}

impl SpyRunner {
    pub fn new<F>(script: F) -> Arc<Self>
    where
        F: Fn(&CommandSpec, usize) -> Result<CommandOutput, RunError> + Send + Sync + 'static,
    {
        Arc::new(Self {
            script: Box::new(script),
            calls: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
        })
    }

    /// Runner whose probes succeed with `title`; `script` answers downloads
    /// and sees the download count rather than the overall call count
    pub fn downloads<F>(title: &str, script: F) -> Arc<Self>
    where
        F: Fn(&CommandSpec, usize) -> Result<CommandOutput, RunError> + Send + Sync + 'static,
    {
        let json = probe_json(title);
        let downloads = AtomicUsize::new(0);
        Self::new(move |spec, _| {
            if is_probe(spec) {
                return ok(&json);
            }
            let call = downloads.fetch_add(1, Ordering::SeqCst) + 1;
            script(spec, call)
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn seen(&self) -> Vec<CommandSpec> {
        self.seen.lock().unwrap().clone()
    }

    pub fn download_specs(&self) -> Vec<CommandSpec> {
        self.seen().into_iter().filter(|s| !is_probe(s)).collect()
    }

    pub fn probe_calls(&self) -> usize {
        self.seen().iter().filter(|s| is_probe(s)).count()
    }
}

pub fn is_probe(spec: &CommandSpec) -> bool {
    spec.args.iter().any(|a| a == "--dump-json")
}

#[async_trait]
impl CommandRunner for SpyRunner {
    async fn run(&self, spec: &CommandSpec, _limit: Duration) -> Result<CommandOutput, RunError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.seen.lock().unwrap().push(spec.clone());
        (self.script)(spec, call)
    }
}

pub fn ok(stdout: &str) -> Result<CommandOutput, RunError> {
    Ok(CommandOutput {
        exit_code: Some(0),
        stdout: stdout.to_string(),
        stderr: String::new(),
    })
}

pub fn failed(stderr: &str) -> Result<CommandOutput, RunError> {
    Ok(CommandOutput {
        exit_code: Some(1),
        stdout: String::new(),
        stderr: stderr.to_string(),
    })
}

/// Write `bytes` where the `-o` template of `spec` points, using `ext`
pub fn write_download(spec: &CommandSpec, ext: &str, bytes: &[u8]) -> PathBuf {
    let template = spec.value_of("-o").expect("download has -o");
    let path = PathBuf::from(template.replace("%(ext)s", ext));
    std::fs::write(&path, bytes).expect("write fake download");
    path
}

pub fn probe_json(title: &str) -> String {
    format!(
        r#"{{
            "id": "abc123",
            "title": "{}",
            "uploader": "Someone",
            "duration": 42.0,
            "formats": [
                {{"format_id": "18", "ext": "mp4", "vcodec": "avc1", "acodec": "mp4a", "height": 360, "filesize": 1000000, "protocol": "https"}},
                {{"format_id": "22", "ext": "mp4", "vcodec": "avc1", "acodec": "mp4a", "height": 720, "filesize": 3000000, "protocol": "https"}},
                {{"format_id": "140", "ext": "m4a", "vcodec": "none", "acodec": "mp4a", "abr": 128.0, "protocol": "https"}}
            ]
        }}"#,
        title
    )
}

/// Engine that optionally writes its output, possibly after reporting completion
pub struct ScriptedEngine {
    pub write_output: bool,
    pub visible_after: Duration,
    pub jobs: AtomicUsize,
}

impl ScriptedEngine {
    pub fn writing() -> Arc<Self> {
        Arc::new(Self {
            write_output: true,
            visible_after: Duration::ZERO,
            jobs: AtomicUsize::new(0),
        })
    }

    pub fn late(visible_after: Duration) -> Arc<Self> {
        Arc::new(Self {
            write_output: true,
            visible_after,
            jobs: AtomicUsize::new(0),
        })
    }

    pub fn never_writes() -> Arc<Self> {
        Arc::new(Self {
            write_output: false,
            visible_after: Duration::ZERO,
            jobs: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl TranscodeEngine for ScriptedEngine {
    async fn run(&self, job: &TranscodeJob, events: mpsc::Sender<TranscodeEvent>) {
        self.jobs.fetch_add(1, Ordering::SeqCst);
        let _ = events.send(TranscodeEvent::Started).await;

        if self.write_output {
            let output = job.output.clone();
            let delay = self.visible_after;
            if delay.is_zero() {
                tokio::fs::write(&output, b"audio bytes").await.unwrap();
            } else {
                // Completion is reported before the file shows up
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    tokio::fs::write(&output, b"audio bytes").await.unwrap();
                });
            }
        }

        let _ = events.send(TranscodeEvent::Completed).await;
    }
}

/// Settings with short delays and a private scratch directory
pub fn fast_settings(scratch: &Path) -> CoreSettings {
    let mut settings = CoreSettings::default();
    settings.scratch_dir = scratch.to_path_buf();
    settings.tools.extractor_program = PathBuf::from("yt-dlp");
    settings.tools.transcoder_program = PathBuf::from("ffmpeg");
    settings.retry.fragile_base_delay = Duration::from_millis(5);
    settings.retry.robust_base_delay = Duration::from_millis(5);
    settings.retry.max_delay = Duration::from_millis(20);
    settings.poll.initial_delay = Duration::from_millis(20);
    settings.poll.max_delay = Duration::from_millis(100);
    settings.poll.max_attempts = 5;
    settings
}
