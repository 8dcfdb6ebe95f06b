//! Utility modules for errors, configuration and host paths

pub mod config;
pub mod error;
pub mod platform;
pub mod poll;
pub mod shell;

// Re-export for convenience
pub use config::CoreSettings;
pub use error::{ErrorKind, ErrorResponse, MediagrabError};
pub use poll::{wait_for_file, PollPolicy};
