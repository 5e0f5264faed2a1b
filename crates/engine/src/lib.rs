//! Resumable chunked upload engine.
//!
//! Splits a local buffer into fixed-size chunks, stages each chunk on a
//! remote block store with bounded retries, persists resume state after
//! every confirmed chunk, and commits the ordered chunk list once the
//! whole buffer is staged.

mod chunk;
mod client;
mod engine;
mod retry;

pub use chunk::{Chunk, ChunkReader, fingerprint_bytes, fingerprint_file};
pub use client::{BlockStore, RemoteError};
pub use engine::{UploadEngine, UploadStats};
pub use retry::{Backoff, RetryPolicy};

/// Default chunk size: 4 MiB.
///
/// Larger chunks reduce per-chunk overhead (state writes, HTTP round
/// trips); smaller chunks lose less progress when a run is interrupted.
pub const DEFAULT_CHUNK_SIZE: usize = 4 * 1024 * 1024;

/// Errors produced by an engine run.
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("state store error: {0}")]
    Store(#[from] blockhaul_store::StoreError),

    #[error("resume state mismatch: {0}")]
    StateMismatch(#[from] blockhaul_protocol::StateMismatch),

    #[error("remote upload failed: {0}")]
    Remote(#[from] RemoteError),

    #[error("blocking task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("upload cancelled")]
    Cancelled,
}
