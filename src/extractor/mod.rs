//! Platform detection, yt-dlp invocation and output parsing

pub mod command;
pub mod models;
pub mod parse;
pub mod platform;
pub mod runner;
pub mod service;

pub use command::{CommandBuilder, CommandSpec, FormatSelector};
pub use models::{ExtractionRequest, MediaFormat, Operation, ProbeResult, VideoMetadata};
pub use platform::{PlatformMatch, SourcePlatform};
pub use runner::{CommandOutput, CommandRunner, ProcessRunner, RunError};
pub use service::ExtractionService;
