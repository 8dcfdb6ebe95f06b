//! Failure classification and retry

pub mod classifier;
pub mod retry;

pub use classifier::{ErrorClassifier, Tool, ToolFailure};
pub use retry::{Backoff, RetryPolicy};
