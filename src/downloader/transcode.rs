//! Audio transcoding through ffmpeg
//!
//! The engine reports through an event channel. The adapter treats
//! `Completed` as "probably done" and still polls the filesystem before it
//! returns, since ffmpeg can exit before the file is fully visible.

use crate::registry::delete_quietly;
use crate::resilience::classifier::{ErrorClassifier, ToolFailure};
use crate::utils::config::AudioSettings;
use crate::utils::error::{MediagrabError, Result};
use crate::utils::poll::{wait_for_file, PollPolicy};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::{mpsc, Semaphore};
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// stderr lines kept for classification
const STDERR_TAIL: usize = 40;

/// Builder for ffmpeg argument lists
#[derive(Debug, Clone)]
pub struct FfmpegCommand {
    input: PathBuf,
    output: PathBuf,
    output_args: Vec<String>,
    log_level: String,
}

impl FfmpegCommand {
    pub fn new(input: impl AsRef<Path>, output: impl AsRef<Path>) -> Self {
        Self {
            input: input.as_ref().to_path_buf(),
            output: output.as_ref().to_path_buf(),
            output_args: Vec::new(),
            log_level: "error".to_string(),
        }
    }

    pub fn output_arg(mut self, arg: impl Into<String>) -> Self {
        self.output_args.push(arg.into());
        self
    }

    /// Drop the video stream
    pub fn no_video(self) -> Self {
        self.output_arg("-vn")
    }

    pub fn audio_codec(self, codec: impl Into<String>) -> Self {
        self.output_arg("-c:a").output_arg(codec)
    }

    pub fn audio_bitrate(self, bitrate: impl Into<String>) -> Self {
        self.output_arg("-b:a").output_arg(bitrate)
    }

    pub fn audio_filter(self, filter: impl Into<String>) -> Self {
        self.output_arg("-af").output_arg(filter)
    }

    pub fn build_args(&self) -> Vec<String> {
        let mut args = vec![
            "-y".to_string(),
            "-nostdin".to_string(),
            "-v".to_string(),
            self.log_level.clone(),
            // Progress output to stderr
            "-progress".to_string(),
            "pipe:2".to_string(),
            "-i".to_string(),
            self.input.to_string_lossy().into_owned(),
        ];
        args.extend(self.output_args.iter().cloned());
        args.push(self.output.to_string_lossy().into_owned());
        args
    }
}

/// What the engine reports while a job runs
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TranscodeEvent {
    Started,
    Progress { out_time_ms: u64 },
    Completed,
    Failed { exit_code: Option<i32>, stderr: String },
}

#[derive(Debug, Clone)]
pub struct TranscodeJob {
    pub program: PathBuf,
    pub input: PathBuf,
    pub output: PathBuf,
    pub args: Vec<String>,
}

#[async_trait]
pub trait TranscodeEngine: Send + Sync {
    /// Run `job`, reporting through `events`; must end with `Completed` or `Failed`
    async fn run(&self, job: &TranscodeJob, events: mpsc::Sender<TranscodeEvent>);
}

/// Parse one `-progress` line; only `out_time_ms` is of interest
pub fn parse_progress_line(line: &str) -> Option<u64> {
    line.trim()
        .strip_prefix("out_time_ms=")
        .and_then(|v| v.parse::<u64>().ok())
}

/// Runs ffmpeg as a child process
///
/// Shares its permit pool with the yt-dlp runner so both kinds of process
/// count against one concurrency ceiling.
pub struct FfmpegEngine {
    permits: Arc<Semaphore>,
}

impl FfmpegEngine {
    pub fn new(permits: Arc<Semaphore>) -> Self {
        Self { permits }
    }
}

#[async_trait]
impl TranscodeEngine for FfmpegEngine {
    async fn run(&self, job: &TranscodeJob, events: mpsc::Sender<TranscodeEvent>) {
        let program = job.program.to_string_lossy().into_owned();
        let _permit = match self.permits.acquire().await {
            Ok(permit) => permit,
            Err(e) => {
                let _ = events
                    .send(TranscodeEvent::Failed {
                        exit_code: None,
                        stderr: format!("{}: {}", program, e),
                    })
                    .await;
                return;
            }
        };
        debug!("Running: {}", crate::utils::shell::join(&program, &job.args));

        let mut child = match Command::new(&job.program)
            .args(&job.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
        {
            Ok(child) => child,
            Err(e) => {
                let exit_code = if e.kind() == std::io::ErrorKind::NotFound {
                    Some(127)
                } else {
                    None
                };
                let _ = events
                    .send(TranscodeEvent::Failed {
                        exit_code,
                        stderr: format!("{}: {}", program, e),
                    })
                    .await;
                return;
            }
        };

        let _ = events.send(TranscodeEvent::Started).await;

        let mut tail: VecDeque<String> = VecDeque::with_capacity(STDERR_TAIL);
        if let Some(stderr) = child.stderr.take() {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if let Some(out_time_ms) = parse_progress_line(&line) {
                    let _ = events.try_send(TranscodeEvent::Progress { out_time_ms });
                    continue;
                }
                // Remaining key=value progress lines are not diagnostics
                if line.contains('=') && !line.contains(' ') {
                    continue;
                }
                if tail.len() == STDERR_TAIL {
                    tail.pop_front();
                }
                tail.push_back(line);
            }
        }

        let event = match child.wait().await {
            Ok(status) if status.success() => TranscodeEvent::Completed,
            Ok(status) => TranscodeEvent::Failed {
                exit_code: status.code(),
                stderr: Vec::from(tail).join("\n"),
            },
            Err(e) => TranscodeEvent::Failed {
                exit_code: None,
                stderr: e.to_string(),
            },
        };
        let _ = events.send(event).await;
    }
}

/// Output path for an audio transcode of `input`
///
/// Keeps the stem; when the extension would not change, `-audio` is appended
/// so the input is never overwritten.
pub fn audio_path_for(input: &Path, target_format: &str) -> PathBuf {
    let same_ext = input
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case(target_format))
        .unwrap_or(false);

    if same_ext {
        let stem = input
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "audio".to_string());
        input.with_file_name(format!("{}-audio.{}", stem, target_format))
    } else {
        input.with_extension(target_format)
    }
}

/// Encoder for an audio container
pub fn codec_for(target_format: &str) -> Option<&'static str> {
    match target_format.to_ascii_lowercase().as_str() {
        "mp3" => Some("libmp3lame"),
        "m4a" | "aac" => Some("aac"),
        "opus" => Some("libopus"),
        "ogg" => Some("libvorbis"),
        "flac" => Some("flac"),
        "wav" => Some("pcm_s16le"),
        _ => None,
    }
}

pub struct TranscodingAdapter {
    engine: Arc<dyn TranscodeEngine>,
    program: PathBuf,
    settings: AudioSettings,
    limit: Duration,
    poll: PollPolicy,
    classifier: ErrorClassifier,
}

impl TranscodingAdapter {
    pub fn new(
        engine: Arc<dyn TranscodeEngine>,
        program: PathBuf,
        settings: AudioSettings,
        limit: Duration,
        poll: PollPolicy,
    ) -> Self {
        Self {
            engine,
            program,
            settings,
            limit,
            poll,
            classifier: ErrorClassifier::transcoding(),
        }
    }

    pub fn settings(&self) -> &AudioSettings {
        &self.settings
    }

    pub fn job_for(&self, input: &Path, target_format: &str, bitrate: &str) -> TranscodeJob {
        let output = audio_path_for(input, target_format);
        let codec = codec_for(target_format).unwrap_or(self.settings.codec.as_str());

        let args = FfmpegCommand::new(input, &output)
            .no_video()
            .audio_codec(codec)
            .audio_bitrate(bitrate)
            .audio_filter(self.settings.filter.clone())
            .build_args();

        TranscodeJob {
            program: self.program.clone(),
            input: input.to_path_buf(),
            output,
            args,
        }
    }

    /// Transcode `video_path` to audio; returns the new file's path
    pub async fn to_audio(
        &self,
        video_path: &Path,
        target_format: &str,
        bitrate: &str,
    ) -> Result<PathBuf> {
        let job = self.job_for(video_path, target_format, bitrate);
        info!(
            "Transcoding {} -> {}",
            video_path.display(),
            job.output.display()
        );

        let (tx, mut rx) = mpsc::channel(64);
        let engine = self.engine.clone();
        let run = async {
            engine.run(&job, tx).await;
        };
        let completion = async {
            while let Some(event) = rx.recv().await {
                match event {
                    TranscodeEvent::Started => debug!("Transcoder started"),
                    TranscodeEvent::Progress { .. } => {}
                    TranscodeEvent::Completed => return Ok(()),
                    TranscodeEvent::Failed { exit_code, stderr } => {
                        let program = self.program.to_string_lossy();
                        let failure = ToolFailure::transcoder(&program, exit_code, &stderr)
                            .with_subject(video_path);
                        return Err(self.classifier.classify(&failure));
                    }
                }
            }
            Err(MediagrabError::AudioExtraction(
                "transcoder stopped without reporting completion".to_string(),
            ))
        };

        let outcome = match timeout(self.limit, async {
            let ((), outcome) = tokio::join!(run, completion);
            outcome
        })
        .await
        {
            Ok(outcome) => outcome,
            Err(_) => {
                warn!("Transcode exceeded {:?}, abandoning", self.limit);
                Err(MediagrabError::Timeout(format!(
                    "audio conversion did not finish within {}s",
                    self.limit.as_secs()
                )))
            }
        };

        if let Err(e) = outcome {
            delete_quietly(&job.output).await;
            return Err(e);
        }

        match wait_for_file(&job.output, &self.poll).await {
            Ok(size) => {
                debug!("Transcoded file ready ({} bytes)", size);
                Ok(job.output)
            }
            Err(e) => {
                delete_quietly(&job.output).await;
                Err(e)
            }
        }
    }
}
