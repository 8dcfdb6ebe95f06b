//! yt-dlp invocation builder
//!
//! Produces argument vectors only. Arguments are never joined into a shell
//! string for execution, and the URL always follows `--` so it cannot be read
//! as an option.

use crate::extractor::models::MediaFormat;
use crate::extractor::platform::SourcePlatform;
use crate::utils::config::ToolSettings;
use crate::utils::shell;
use std::path::PathBuf;

const DESKTOP_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

/// A program plus its discrete arguments
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl CommandSpec {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Shell-quoted rendering for logs
    pub fn display(&self) -> String {
        shell::join(&self.program.to_string_lossy(), &self.args)
    }

    /// Value following `flag`, if present
    pub fn value_of(&self, flag: &str) -> Option<&str> {
        self.args
            .iter()
            .position(|a| a == flag)
            .and_then(|i| self.args.get(i + 1))
            .map(String::as_str)
    }
}

/// Which format expression to ask yt-dlp for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatSelector {
    /// Best streams at or below the configured height
    Capped,
    /// Whatever yt-dlp considers best, used after a capped attempt was rejected
    Relaxed,
}

impl FormatSelector {
    pub fn expression(&self, format: MediaFormat, max_height: u32) -> String {
        match (format, self) {
            (MediaFormat::Video, FormatSelector::Capped) => format!(
                "bestvideo[height<={h}]+bestaudio/best[height<={h}]/best",
                h = max_height
            ),
            (MediaFormat::Video, FormatSelector::Relaxed) => "bestvideo+bestaudio/best".to_string(),
            (MediaFormat::Audio, FormatSelector::Capped) => "bestaudio/best".to_string(),
            (MediaFormat::Audio, FormatSelector::Relaxed) => "best".to_string(),
        }
    }
}

/// Builds probe and download invocations from tool settings
#[derive(Debug, Clone)]
pub struct CommandBuilder {
    program: PathBuf,
    socket_timeout_secs: u64,
    retries: u32,
    concurrent_fragments: u32,
    max_height: u32,
}

impl CommandBuilder {
    pub fn new(tools: &ToolSettings) -> Self {
        Self {
            program: tools.extractor_program.clone(),
            socket_timeout_secs: tools.socket_timeout_secs,
            retries: tools.tool_retries,
            concurrent_fragments: tools.concurrent_fragments.max(1),
            max_height: tools.max_height,
        }
    }

    pub fn program(&self) -> &PathBuf {
        &self.program
    }

    pub fn max_height(&self) -> u32 {
        self.max_height
    }

    fn common_args(&self) -> Vec<String> {
        vec![
            "--no-warnings".to_string(),
            "--no-playlist".to_string(),
            "--no-color".to_string(),
            "--socket-timeout".to_string(),
            self.socket_timeout_secs.to_string(),
            "--retries".to_string(),
            self.retries.to_string(),
            "--extractor-retries".to_string(),
            self.retries.to_string(),
        ]
    }

    /// Metadata-only invocation
    pub fn probe(&self, url: &str, platform: SourcePlatform) -> CommandSpec {
        CommandSpec::new(&self.program)
            .args(["--dump-json", "--skip-download"])
            .args(self.common_args())
            .args(platform_args(platform, false))
            .arg("--")
            .arg(url)
    }

    /// Download invocation writing to `output_template`
    pub fn download(
        &self,
        url: &str,
        platform: SourcePlatform,
        output_template: &str,
        selector: FormatSelector,
        format: MediaFormat,
    ) -> CommandSpec {
        let mut spec = CommandSpec::new(&self.program)
            .arg("-f")
            .arg(selector.expression(format, self.max_height))
            .arg("-o")
            .arg(output_template)
            .args(["--newline", "--no-mtime", "--no-part"])
            .arg("--concurrent-fragments")
            .arg(self.concurrent_fragments.to_string())
            .args(self.common_args());

        if format == MediaFormat::Video {
            spec = spec.args(["--merge-output-format", "mp4"]);
        }

        spec.args(platform_args(platform, true)).arg("--").arg(url)
    }
}

/// Extra flags that keep anti-bot measures on fragile platforms quiet
fn platform_args(platform: SourcePlatform, downloading: bool) -> Vec<String> {
    let mut args: Vec<String> = Vec::new();

    if platform.is_fragile() {
        args.extend(
            [
                "--user-agent",
                DESKTOP_USER_AGENT,
                "--add-header",
                "Accept-Language:en-US,en;q=0.9",
                "--sleep-requests",
                "1",
            ]
            .map(String::from),
        );
        if downloading {
            args.extend(["--sleep-interval", "1", "--max-sleep-interval", "3"].map(String::from));
        }
    }

    match platform {
        SourcePlatform::YouTube => {
            args.extend(["--extractor-args", "youtube:player_client=web"].map(String::from));
        }
        SourcePlatform::TikTok => {
            args.extend(["--add-header", "Referer:https://www.tiktok.com/"].map(String::from));
        }
        SourcePlatform::Instagram => {
            args.extend(["--add-header", "Referer:https://www.instagram.com/"].map(String::from));
        }
        SourcePlatform::Facebook => {
            args.extend(["--add-header", "Referer:https://www.facebook.com/"].map(String::from));
        }
        _ => {}
    }

    args
}
