//! External process execution
//!
//! The `CommandRunner` trait is the seam tests use to substitute yt-dlp.
//! `ProcessRunner` spawns real processes, bounded by a semaphore and killed
//! when their time limit elapses.

use crate::extractor::command::CommandSpec;
use async_trait::async_trait;
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::io::AsyncReadExt;
use tokio::process::Command as AsyncCommand;
use tokio::sync::Semaphore;
use tokio::time::timeout;
use tracing::{debug, warn};

/// Captured result of a finished process
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// `None` when the process was terminated by a signal
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// stderr followed by stdout; yt-dlp reports errors on either
    pub fn combined(&self) -> String {
        if self.stdout.is_empty() {
            return self.stderr.clone();
        }
        if self.stderr.is_empty() {
            return self.stdout.clone();
        }
        format!("{}\n{}", self.stderr, self.stdout)
    }
}

/// Failure to run a process at all
#[derive(Debug, Error)]
pub enum RunError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("{program} did not finish within {secs}s")]
    TimedOut { program: String, secs: u64 },

    #[error("failed to run {program}: {source}")]
    Io {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run to completion, or kill the process once `limit` elapses
    async fn run(&self, spec: &CommandSpec, limit: Duration) -> Result<CommandOutput, RunError>;
}

/// Runs commands as child processes
pub struct ProcessRunner {
    permits: Arc<Semaphore>,
}

impl ProcessRunner {
    pub fn new(max_concurrent: usize) -> Self {
        Self::with_permits(Arc::new(Semaphore::new(max_concurrent.max(1))))
    }

    /// Runner drawing from a permit pool shared with other process spawners
    pub fn with_permits(permits: Arc<Semaphore>) -> Self {
        Self { permits }
    }

    pub fn permits(&self) -> Arc<Semaphore> {
        self.permits.clone()
    }
}

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(&self, spec: &CommandSpec, limit: Duration) -> Result<CommandOutput, RunError> {
        let program = spec.program.to_string_lossy().into_owned();
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|e| RunError::Io {
                program: program.clone(),
                source: std::io::Error::new(std::io::ErrorKind::Other, e),
            })?;

        debug!("Running: {}", spec.display());
        let started = Instant::now();

        let mut child = AsyncCommand::new(&spec.program)
            .args(&spec.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    RunError::NotFound(program.clone())
                } else {
                    RunError::Io {
                        program: program.clone(),
                        source: e,
                    }
                }
            })?;

        // Drain both pipes concurrently so a full buffer never blocks the child
        let stdout_task = child.stdout.take().map(|mut pipe| {
            tokio::spawn(async move {
                let mut buf = Vec::new();
                let _ = pipe.read_to_end(&mut buf).await;
                buf
            })
        });
        let stderr_task = child.stderr.take().map(|mut pipe| {
            tokio::spawn(async move {
                let mut buf = Vec::new();
                let _ = pipe.read_to_end(&mut buf).await;
                buf
            })
        });

        let status = match timeout(limit, child.wait()).await {
            Ok(Ok(status)) => status,
            Ok(Err(e)) => {
                return Err(RunError::Io {
                    program,
                    source: e,
                })
            }
            Err(_) => {
                warn!("{} exceeded {:?}, killing process", program, limit);
                let _ = child.kill().await;
                return Err(RunError::TimedOut {
                    program,
                    secs: limit.as_secs(),
                });
            }
        };

        let stdout = match stdout_task {
            Some(handle) => handle.await.unwrap_or_default(),
            None => Vec::new(),
        };
        let stderr = match stderr_task {
            Some(handle) => handle.await.unwrap_or_default(),
            None => Vec::new(),
        };

        debug!(
            "{} exited with {:?} after {:?}",
            program,
            status.code(),
            started.elapsed()
        );

        Ok(CommandOutput {
            exit_code: status.code(),
            stdout: String::from_utf8_lossy(&stdout).into_owned(),
            stderr: String::from_utf8_lossy(&stderr).into_owned(),
        })
    }
}
