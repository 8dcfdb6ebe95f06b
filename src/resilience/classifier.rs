//! Failure classification for external tools
//!
//! Rules are checked in order and the first match wins. Missing-tool signals
//! always come first: on a broken host the rest of the output is noise.

use crate::utils::error::{ErrorKind, MediagrabError};
use std::path::Path;

/// Which external tool failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tool {
    Extractor,
    Transcoder,
}

/// Everything known about one failed invocation
#[derive(Debug, Clone)]
pub struct ToolFailure<'a> {
    pub tool: Tool,
    /// Program name used for `COMMAND_NOT_FOUND` messages
    pub program: &'a str,
    pub exit_code: Option<i32>,
    pub output: &'a str,
    /// File the tool was working on, when there is one
    pub subject: Option<&'a Path>,
}

impl<'a> ToolFailure<'a> {
    pub fn extractor(program: &'a str, exit_code: Option<i32>, output: &'a str) -> Self {
        Self {
            tool: Tool::Extractor,
            program,
            exit_code,
            output,
            subject: None,
        }
    }

    pub fn transcoder(program: &'a str, exit_code: Option<i32>, output: &'a str) -> Self {
        Self {
            tool: Tool::Transcoder,
            program,
            exit_code,
            output,
            subject: None,
        }
    }

    pub fn with_subject(mut self, subject: &'a Path) -> Self {
        self.subject = Some(subject);
        self
    }
}

/// One ordered classification rule
pub struct Rule {
    pub name: &'static str,
    pub kind: ErrorKind,
    matches: fn(&ToolFailure<'_>, &str) -> bool,
}

fn contains_any(text: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| text.contains(n))
}

fn missing_tool(failure: &ToolFailure<'_>, lower: &str) -> bool {
    // 127: POSIX shell "command not found", 9009: cmd.exe equivalent
    matches!(failure.exit_code, Some(127) | Some(9009))
        || contains_any(
            lower,
            &[
                "command not found",
                "is not recognized as an internal or external command",
                "no module named yt_dlp",
                "python: not found",
                "python3: not found",
                "python was not found",
            ],
        )
}

fn unsupported_url(_: &ToolFailure<'_>, lower: &str) -> bool {
    contains_any(lower, &["unsupported url", "is not a valid url", "no suitable extractor"])
}

fn format_unavailable(_: &ToolFailure<'_>, lower: &str) -> bool {
    contains_any(
        lower,
        &[
            "requested format is not available",
            "requested format not available",
            "no video formats found",
            "invalid format specification",
        ],
    )
}

fn age_restricted(_: &ToolFailure<'_>, lower: &str) -> bool {
    contains_any(
        lower,
        &[
            "sign in to confirm your age",
            "age-restricted",
            "age restricted",
            "inappropriate for some users",
        ],
    )
}

fn upstream_rate_limited(_: &ToolFailure<'_>, lower: &str) -> bool {
    contains_any(
        lower,
        &[
            "http error 429",
            "too many requests",
            "rate-limit",
            "rate limit",
            "not a bot",
        ],
    )
}

fn video_missing(_: &ToolFailure<'_>, lower: &str) -> bool {
    contains_any(
        lower,
        &[
            "video unavailable",
            "private video",
            "this video has been removed",
            "video has been removed",
            "http error 404",
            "does not exist",
            "content isn't available",
            "this post is no longer available",
        ],
    )
}

fn timed_out(_: &ToolFailure<'_>, lower: &str) -> bool {
    contains_any(lower, &["timed out", "timeout"])
}

fn network(_: &ToolFailure<'_>, lower: &str) -> bool {
    contains_any(
        lower,
        &[
            "unable to download webpage",
            "connection reset",
            "connection refused",
            "network is unreachable",
            "name or service not known",
            "temporary failure in name resolution",
            "getaddrinfo failed",
            "ssl:",
            "urlopen error",
        ],
    )
}

fn unparseable(_: &ToolFailure<'_>, lower: &str) -> bool {
    contains_any(lower, &["unable to extract", "failed to parse json", "jsondecodeerror"])
}

fn missing_input(failure: &ToolFailure<'_>, lower: &str) -> bool {
    failure.subject.is_some() && lower.contains("no such file or directory")
}

fn undecodable_input(_: &ToolFailure<'_>, lower: &str) -> bool {
    contains_any(
        lower,
        &[
            "does not contain any stream",
            "output file #0 does not contain any stream",
            "invalid data found when processing input",
            "stream map '0:a' matches no streams",
            "matches no streams",
        ],
    )
}

/// Rules applied to yt-dlp failures
const EXTRACTION_RULES: &[Rule] = &[
    Rule {
        name: "missing-tool",
        kind: ErrorKind::CommandNotFound,
        matches: missing_tool,
    },
    Rule {
        name: "unsupported-url",
        kind: ErrorKind::UnsupportedPlatform,
        matches: unsupported_url,
    },
    Rule {
        name: "format-unavailable",
        kind: ErrorKind::UnsupportedQuality,
        matches: format_unavailable,
    },
    Rule {
        name: "age-restricted",
        kind: ErrorKind::AgeRestricted,
        matches: age_restricted,
    },
    Rule {
        name: "rate-limited",
        kind: ErrorKind::RateLimited,
        matches: upstream_rate_limited,
    },
    Rule {
        name: "video-missing",
        kind: ErrorKind::VideoNotFound,
        matches: video_missing,
    },
    Rule {
        name: "timeout",
        kind: ErrorKind::Timeout,
        matches: timed_out,
    },
    Rule {
        name: "network",
        kind: ErrorKind::NetworkError,
        matches: network,
    },
    Rule {
        name: "parse",
        kind: ErrorKind::ParseError,
        matches: unparseable,
    },
];

/// Rules applied to ffmpeg failures
const TRANSCODING_RULES: &[Rule] = &[
    Rule {
        name: "missing-tool",
        kind: ErrorKind::CommandNotFound,
        matches: missing_tool,
    },
    Rule {
        name: "missing-input",
        kind: ErrorKind::FileNotFound,
        matches: missing_input,
    },
    Rule {
        name: "undecodable-input",
        kind: ErrorKind::AudioExtractionFailed,
        matches: undecodable_input,
    },
    Rule {
        name: "timeout",
        kind: ErrorKind::Timeout,
        matches: timed_out,
    },
];

/// Maps tool failures onto the closed error set
#[derive(Clone, Copy)]
pub struct ErrorClassifier {
    rules: &'static [Rule],
    fallback: ErrorKind,
}

impl ErrorClassifier {
    pub fn extraction() -> Self {
        Self {
            rules: EXTRACTION_RULES,
            fallback: ErrorKind::ExtractionFailed,
        }
    }

    pub fn transcoding() -> Self {
        Self {
            rules: TRANSCODING_RULES,
            fallback: ErrorKind::AudioExtractionFailed,
        }
    }

    pub fn for_tool(tool: Tool) -> Self {
        match tool {
            Tool::Extractor => Self::extraction(),
            Tool::Transcoder => Self::transcoding(),
        }
    }

    pub fn rules(&self) -> &'static [Rule] {
        self.rules
    }

    /// Name of the first matching rule, for diagnostics
    pub fn matching_rule(&self, failure: &ToolFailure<'_>) -> Option<&'static str> {
        let lower = failure.output.to_lowercase();
        self.rules
            .iter()
            .find(|rule| (rule.matches)(failure, &lower))
            .map(|rule| rule.name)
    }

    pub fn classify_kind(&self, failure: &ToolFailure<'_>) -> ErrorKind {
        let lower = failure.output.to_lowercase();
        self.rules
            .iter()
            .find(|rule| (rule.matches)(failure, &lower))
            .map(|rule| rule.kind)
            .unwrap_or(self.fallback)
    }

    pub fn classify(&self, failure: &ToolFailure<'_>) -> MediagrabError {
        match self.classify_kind(failure) {
            ErrorKind::CommandNotFound => {
                MediagrabError::CommandNotFound(failure.program.to_string())
            }
            ErrorKind::FileNotFound => match failure.subject {
                Some(path) => MediagrabError::FileNotFound(path.to_path_buf()),
                None => MediagrabError::FilePath(diagnostic_line(failure.output)),
            },
            kind => MediagrabError::from_kind(kind, diagnostic_line(failure.output)),
        }
    }
}

/// The most useful single line of tool output
///
/// Prefers yt-dlp's `ERROR:` line, then the last non-empty line.
pub fn diagnostic_line(output: &str) -> String {
    let lines = || output.lines().map(str::trim).filter(|l| !l.is_empty());

    if let Some(error_line) = lines().filter(|l| l.starts_with("ERROR:")).last() {
        return error_line.trim_start_matches("ERROR:").trim().to_string();
    }

    match lines().last() {
        Some(line) => line.to_string(),
        None => "no output from tool".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extraction(exit_code: i32, output: &str) -> ErrorKind {
        ErrorClassifier::extraction()
            .classify_kind(&ToolFailure::extractor("yt-dlp", Some(exit_code), output))
    }

    #[test]
    fn test_extraction_patterns() {
        let cases = [
            ("ERROR: [youtube] abc: Video unavailable", ErrorKind::VideoNotFound),
            (
                "ERROR: [youtube] abc: Private video. Sign in if you've been granted access",
                ErrorKind::VideoNotFound,
            ),
            (
                "ERROR: [youtube] abc: Sign in to confirm your age. This video may be inappropriate for some users.",
                ErrorKind::AgeRestricted,
            ),
            ("ERROR: [youtube] abc: Sign in to confirm you're not a bot", ErrorKind::RateLimited),
            (
                "ERROR: unable to download video data: HTTP Error 429: Too Many Requests",
                ErrorKind::RateLimited,
            ),
            (
                "ERROR: [generic] Unsupported URL: https://example.com",
                ErrorKind::UnsupportedPlatform,
            ),
            (
                "ERROR: [youtube] abc: Requested format is not available. Use --list-formats",
                ErrorKind::UnsupportedQuality,
            ),
            (
                "ERROR: [vimeo] 1: Unable to download webpage: <urlopen error [Errno -2] Name or service not known>",
                ErrorKind::NetworkError,
            ),
            ("ERROR: [tiktok] 1: Read timed out.", ErrorKind::Timeout),
            ("ERROR: [instagram] x: Unable to extract shared data", ErrorKind::ParseError),
            ("something odd happened", ErrorKind::ExtractionFailed),
        ];

        for (output, expected) in cases {
            assert_eq!(extraction(1, output), expected, "{}", output);
        }
    }

    #[test]
    fn test_missing_tool_wins_over_text_patterns() {
        // Shell noise mentioning a timeout must not hide a missing interpreter
        let output = "/usr/bin/env: 'python3': No such file or directory\nconnection timed out";
        assert_eq!(extraction(127, output), ErrorKind::CommandNotFound);

        let output = "ModuleNotFoundError: No module named yt_dlp\nHTTP Error 429";
        assert_eq!(extraction(1, output), ErrorKind::CommandNotFound);

        let output = "'yt-dlp' is not recognized as an internal or external command";
        assert_eq!(extraction(1, output), ErrorKind::CommandNotFound);
    }

    #[test]
    fn test_command_not_found_message_is_program_name() {
        let err = ErrorClassifier::extraction().classify(&ToolFailure::extractor(
            "yt-dlp",
            Some(127),
            "sh: yt-dlp: command not found",
        ));
        assert_eq!(err.kind(), ErrorKind::CommandNotFound);
        assert_eq!(err.to_string(), "yt-dlp not found. Please install yt-dlp");
    }

    #[test]
    fn test_fallback_keeps_raw_error_line() {
        let err = ErrorClassifier::extraction().classify(&ToolFailure::extractor(
            "yt-dlp",
            Some(1),
            "[youtube] abc: Downloading webpage\nERROR: something strange\n",
        ));
        assert_eq!(err.kind(), ErrorKind::ExtractionFailed);
        assert!(err.to_string().contains("something strange"));
    }

    #[test]
    fn test_transcoding_patterns() {
        let classifier = ErrorClassifier::transcoding();
        let input = Path::new("/tmp/scratch/abc.mp4");

        let missing = ToolFailure::transcoder(
            "ffmpeg",
            Some(1),
            "/tmp/scratch/abc.mp4: No such file or directory",
        )
        .with_subject(input);
        assert_eq!(classifier.classify_kind(&missing), ErrorKind::FileNotFound);
        assert!(matches!(
            classifier.classify(&missing),
            MediagrabError::FileNotFound(p) if p == input
        ));

        let no_audio = ToolFailure::transcoder(
            "ffmpeg",
            Some(1),
            "Output file #0 does not contain any stream",
        );
        assert_eq!(classifier.classify_kind(&no_audio), ErrorKind::AudioExtractionFailed);

        let not_installed = ToolFailure::transcoder("ffmpeg", Some(127), "");
        assert_eq!(
            classifier.classify(&not_installed).to_string(),
            "ffmpeg not found. Please install ffmpeg"
        );

        let odd = ToolFailure::transcoder("ffmpeg", Some(1), "Conversion failed!");
        assert_eq!(classifier.classify_kind(&odd), ErrorKind::AudioExtractionFailed);
    }

    #[test]
    fn test_matching_rule_names() {
        let classifier = ErrorClassifier::extraction();
        let failure = ToolFailure::extractor("yt-dlp", Some(1), "HTTP Error 404: Not Found");
        assert_eq!(classifier.matching_rule(&failure), Some("video-missing"));
        assert_eq!(classifier.rules()[0].name, "missing-tool");
    }

    #[test]
    fn test_diagnostic_line() {
        assert_eq!(diagnostic_line("a\nERROR: first\nb\nERROR: second\n"), "second");
        assert_eq!(diagnostic_line("one\ntwo\n\n"), "two");
        assert_eq!(diagnostic_line(""), "no output from tool");
    }
}
