//! mediagrab library
//!
//! Media extraction core: platform detection, yt-dlp probing and downloads,
//! ffmpeg audio transcoding, and short-lived publication of the results.

pub mod app;
pub mod cache;
pub mod downloader;
pub mod extractor;
pub mod limiter;
pub mod registry;
pub mod resilience;
pub mod store;
pub mod sweeper;
pub mod utils;

// Re-export main types for easier use
pub use app::{CoreOutcome, MediaCore, Publication};
pub use downloader::MaterializedFile;
pub use extractor::{ExtractionRequest, MediaFormat, ProbeResult, SourcePlatform};
pub use utils::{CoreSettings, ErrorKind, ErrorResponse, MediagrabError};
