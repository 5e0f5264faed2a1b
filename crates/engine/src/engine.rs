//! The staged-upload flow: resume, stage, commit.

use std::path::Path;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;

use blockhaul_protocol::UploadState;
use blockhaul_store::StateStore;

use crate::UploadError;
use crate::chunk::{ChunkReader, fingerprint_file};
use crate::client::BlockStore;
use crate::retry::RetryPolicy;

/// Statistics for a finished upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadStats {
    pub total_bytes: u64,
    /// Chunks staged by this run; chunks confirmed by a prior run are not
    /// counted.
    pub chunks_staged: usize,
    /// Bytes skipped because a resume record already confirmed them.
    pub resumed_bytes: u64,
}

/// Uploads one local buffer to one remote target, resumably.
///
/// The engine is cheap to construct and holds no per-upload state; all
/// progress lives in the [`StateStore`] record so it survives the process.
pub struct UploadEngine {
    remote: Arc<dyn BlockStore>,
    store: Arc<StateStore>,
    chunk_size: usize,
    retry: RetryPolicy,
}

impl UploadEngine {
    /// Creates an engine. A `chunk_size` of 0 selects
    /// [`DEFAULT_CHUNK_SIZE`](crate::DEFAULT_CHUNK_SIZE).
    pub fn new(
        remote: Arc<dyn BlockStore>,
        store: Arc<StateStore>,
        chunk_size: usize,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            remote,
            store,
            chunk_size,
            retry,
        }
    }

    /// Runs the full upload of `buffer_path` to `target`.
    ///
    /// 1. Resume: load any persisted record, verify it matches this buffer,
    ///    seek past the confirmed bytes.
    /// 2. Stage: read chunks sequentially; each chunk is staged under a
    ///    fresh id with bounded retries, and the record is persisted before
    ///    the next chunk is read.
    /// 3. Commit: send the ordered id list, then drop the record.
    ///
    /// On any failure the record reflects every confirmed chunk, so a
    /// re-run continues where this one stopped. Cancellation is honored
    /// between chunks and leaves the record intact.
    pub async fn run(
        &self,
        buffer_path: &Path,
        target: &str,
        cancel: &CancellationToken,
    ) -> Result<UploadStats, UploadError> {
        if cancel.is_cancelled() {
            return Err(UploadError::Cancelled);
        }

        // -------------------------------------------------------------------
        // Resume
        // -------------------------------------------------------------------
        let digest = tokio::task::spawn_blocking({
            let path = buffer_path.to_path_buf();
            move || fingerprint_file(&path)
        })
        .await??;
        let file_size = tokio::fs::metadata(buffer_path).await?.len();

        let mut state = match self.store.load(target).await? {
            Some(prior) => {
                prior.check_resumable(target, file_size, &digest)?;
                if prior.confirmed_bytes > 0 {
                    info!(
                        target_name = target,
                        confirmed_bytes = prior.confirmed_bytes,
                        chunks = prior.chunk_ids.len(),
                        "resuming upload"
                    );
                }
                prior
            }
            None => UploadState::new(target, digest.clone()),
        };
        if state.content_digest.is_empty() {
            // Record predates digest tracking; adopt the current one.
            state.content_digest = digest;
        }
        let resumed_bytes = state.confirmed_bytes;

        // -------------------------------------------------------------------
        // Stage
        // -------------------------------------------------------------------
        let chunk_size = self.chunk_size;
        let mut reader = tokio::task::spawn_blocking({
            let path = buffer_path.to_path_buf();
            move || ChunkReader::new(&path, chunk_size)
        })
        .await??;
        if state.confirmed_bytes > 0 {
            reader.seek_to(state.confirmed_bytes)?;
        }

        let mut staged_this_run = 0usize;
        loop {
            if cancel.is_cancelled() {
                return Err(UploadError::Cancelled);
            }

            let step = tokio::task::spawn_blocking({
                let mut r = reader;
                move || {
                    let chunk = r.next_chunk();
                    (r, chunk)
                }
            })
            .await?;
            reader = step.0;
            let Some(chunk) = step.1? else {
                break;
            };

            let block_id = Uuid::new_v4().to_string();
            let data = chunk.data;
            self.retry
                .run("stage block", |_| {
                    self.remote.stage_block(target, &block_id, data.clone())
                })
                .await?;

            state.record_chunk(block_id, chunk.size as u64);
            self.store.save(target, &state).await?;

            staged_this_run += 1;
            debug!(
                target_name = target,
                confirmed_bytes = state.confirmed_bytes,
                total_bytes = file_size,
                "chunk staged"
            );
        }

        // -------------------------------------------------------------------
        // Commit
        // -------------------------------------------------------------------
        if cancel.is_cancelled() {
            return Err(UploadError::Cancelled);
        }
        self.remote.commit_block_list(target, &state.chunk_ids).await?;
        self.store.clear(target).await?;

        info!(
            target_name = target,
            total_bytes = file_size,
            chunks = state.chunk_ids.len(),
            staged_this_run,
            "upload committed"
        );

        Ok(UploadStats {
            total_bytes: file_size,
            chunks_staged: staged_this_run,
            resumed_bytes,
        })
    }
}
