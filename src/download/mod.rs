//! Resumable download pipeline
//!
//! The manager drives source adapters through checkpointed batch loops and
//! owns every status transition a source goes through.

mod manager;
mod retry;

pub use manager::{DownloadManager, DownloadSummary};
pub use retry::{classify_failure, BackoffPolicy, FailureKind};
