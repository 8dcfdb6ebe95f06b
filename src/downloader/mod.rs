//! Producing files: download, locate, transcode

pub mod locate;
pub mod orchestrator;
pub mod transcode;

// Re-export for convenience
pub use orchestrator::{DownloadOrchestrator, MaterializedFile};
pub use transcode::{FfmpegEngine, TranscodeEngine, TranscodeEvent, TranscodingAdapter};
