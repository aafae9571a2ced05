//! Error types surfaced by the decoder pipeline
//!
//! Decode failures inside a buffer are reported as
//! [`DecodeOutcome`](crate::validate::DecodeOutcome) values and logged; only
//! resource failures at construction time reach the caller as an `Err`.

use thiserror::Error;

/// Unrecoverable pipeline errors
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Spawning a decode worker thread failed
    #[error("failed to spawn decode worker: {0}")]
    WorkerSpawn(#[from] std::io::Error),
}
