//! Error handling for mediagrab
//!
//! Every failure coming out of yt-dlp, ffmpeg or the filesystem is converted
//! into one of the variants below before it leaves the core.

use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Closed set of failure kinds reported to callers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    UnsupportedPlatform,
    CommandNotFound,
    VideoNotFound,
    AgeRestricted,
    NetworkError,
    Timeout,
    UnsupportedQuality,
    RateLimited,
    ParseError,
    FileNotFound,
    FilePathError,
    AudioExtractionFailed,
    ExtractionFailed,
}

impl ErrorKind {
    /// Wire code, e.g. `"VIDEO_NOT_FOUND"`
    pub fn code(&self) -> &'static str {
        match self {
            ErrorKind::UnsupportedPlatform => "UNSUPPORTED_PLATFORM",
            ErrorKind::CommandNotFound => "COMMAND_NOT_FOUND",
            ErrorKind::VideoNotFound => "VIDEO_NOT_FOUND",
            ErrorKind::AgeRestricted => "AGE_RESTRICTED",
            ErrorKind::NetworkError => "NETWORK_ERROR",
            ErrorKind::Timeout => "TIMEOUT",
            ErrorKind::UnsupportedQuality => "UNSUPPORTED_QUALITY",
            ErrorKind::RateLimited => "RATE_LIMITED",
            ErrorKind::ParseError => "PARSE_ERROR",
            ErrorKind::FileNotFound => "FILE_NOT_FOUND",
            ErrorKind::FilePathError => "FILE_PATH_ERROR",
            ErrorKind::AudioExtractionFailed => "AUDIO_EXTRACTION_FAILED",
            ErrorKind::ExtractionFailed => "EXTRACTION_FAILED",
        }
    }

    /// Kinds worth another attempt under the retry policy
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ErrorKind::NetworkError | ErrorKind::Timeout | ErrorKind::RateLimited
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Main error type for mediagrab
#[derive(Debug, Clone, Error)]
pub enum MediagrabError {
    #[error("{0}")]
    UnsupportedPlatform(String),

    #[error("{0} not found. Please install {0}")]
    CommandNotFound(String),

    #[error("Video not found or unavailable: {0}")]
    VideoNotFound(String),

    #[error("Video is age restricted: {0}")]
    AgeRestricted(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Operation timed out: {0}")]
    Timeout(String),

    #[error("Requested quality is not available: {0}")]
    UnsupportedQuality(String),

    #[error("Source is rate limiting requests: {0}")]
    RateLimited(String),

    #[error("Failed to parse extractor output: {0}")]
    Parse(String),

    #[error("Downloaded file not found: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("Could not determine downloaded file path: {0}")]
    FilePath(String),

    #[error("Audio extraction failed: {0}")]
    AudioExtraction(String),

    #[error("Failed to extract video: {0}")]
    ExtractionFailed(String),
}

impl MediagrabError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            MediagrabError::UnsupportedPlatform(_) => ErrorKind::UnsupportedPlatform,
            MediagrabError::CommandNotFound(_) => ErrorKind::CommandNotFound,
            MediagrabError::VideoNotFound(_) => ErrorKind::VideoNotFound,
            MediagrabError::AgeRestricted(_) => ErrorKind::AgeRestricted,
            MediagrabError::Network(_) => ErrorKind::NetworkError,
            MediagrabError::Timeout(_) => ErrorKind::Timeout,
            MediagrabError::UnsupportedQuality(_) => ErrorKind::UnsupportedQuality,
            MediagrabError::RateLimited(_) => ErrorKind::RateLimited,
            MediagrabError::Parse(_) => ErrorKind::ParseError,
            MediagrabError::FileNotFound(_) => ErrorKind::FileNotFound,
            MediagrabError::FilePath(_) => ErrorKind::FilePathError,
            MediagrabError::AudioExtraction(_) => ErrorKind::AudioExtractionFailed,
            MediagrabError::ExtractionFailed(_) => ErrorKind::ExtractionFailed,
        }
    }

    pub fn is_transient(&self) -> bool {
        self.kind().is_transient()
    }

    /// Build an error of the given kind around a diagnostic message
    pub fn from_kind(kind: ErrorKind, message: impl Into<String>) -> Self {
        let message = message.into();
        match kind {
            ErrorKind::UnsupportedPlatform => MediagrabError::UnsupportedPlatform(message),
            ErrorKind::CommandNotFound => MediagrabError::CommandNotFound(message),
            ErrorKind::VideoNotFound => MediagrabError::VideoNotFound(message),
            ErrorKind::AgeRestricted => MediagrabError::AgeRestricted(message),
            ErrorKind::NetworkError => MediagrabError::Network(message),
            ErrorKind::Timeout => MediagrabError::Timeout(message),
            ErrorKind::UnsupportedQuality => MediagrabError::UnsupportedQuality(message),
            ErrorKind::RateLimited => MediagrabError::RateLimited(message),
            ErrorKind::ParseError => MediagrabError::Parse(message),
            ErrorKind::FileNotFound => MediagrabError::FileNotFound(PathBuf::from(message)),
            ErrorKind::FilePathError => MediagrabError::FilePath(message),
            ErrorKind::AudioExtractionFailed => MediagrabError::AudioExtraction(message),
            ErrorKind::ExtractionFailed => MediagrabError::ExtractionFailed(message),
        }
    }

    /// Structured form handed back across the core boundary
    pub fn to_response(&self) -> ErrorResponse {
        ErrorResponse {
            kind: self.kind(),
            message: self.to_string(),
        }
    }
}

/// Serializable failure returned to callers
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorResponse {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<MediagrabError> for ErrorResponse {
    fn from(err: MediagrabError) -> Self {
        err.to_response()
    }
}

pub type Result<T> = std::result::Result<T, MediagrabError>;
