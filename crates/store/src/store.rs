use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use sha2::{Digest, Sha256};
use tokio::sync::Mutex;
use tracing::debug;

use blockhaul_protocol::UploadState;

/// Errors produced by the state store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed state record at {path}: {source}")]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to encode state record: {0}")]
    Encode(serde_json::Error),
}

/// Directory-backed store of per-target resume records.
///
/// `load`, `save` and `clear` for the same target are mutually exclusive.
/// The lock map is keyed by target name, so uploads to different targets
/// proceed without touching each other; idle entries are pruned on access,
/// so the map only ever holds targets with work in flight. Single-process
/// ownership of a target name is the caller's responsibility.
pub struct StateStore {
    dir: PathBuf,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl StateStore {
    /// Opens a store rooted at `dir`, creating the directory if needed.
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self {
            dir,
            locks: Mutex::new(HashMap::new()),
        })
    }

    /// Loads the record for `target`. `None` means a fresh upload.
    pub async fn load(&self, target: &str) -> Result<Option<UploadState>, StoreError> {
        let lock = self.lock_for(target).await;
        let _guard = lock.lock().await;

        let path = self.record_path(target);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let state =
            serde_json::from_slice(&bytes).map_err(|source| StoreError::Malformed { path, source })?;
        Ok(Some(state))
    }

    /// Persists `state` as the record for `target`.
    ///
    /// The record is written to a sibling temp file and renamed into place,
    /// so a reader never observes a half-written record.
    pub async fn save(&self, target: &str, state: &UploadState) -> Result<(), StoreError> {
        let lock = self.lock_for(target).await;
        let _guard = lock.lock().await;

        let path = self.record_path(target);
        let tmp = path.with_extension("json.tmp");
        let bytes = serde_json::to_vec_pretty(state).map_err(StoreError::Encode)?;
        tokio::fs::write(&tmp, &bytes).await?;
        tokio::fs::rename(&tmp, &path).await?;

        debug!(
            target_name = target,
            confirmed_bytes = state.confirmed_bytes,
            chunks = state.chunk_ids.len(),
            "resume state saved"
        );
        Ok(())
    }

    /// Removes the record for `target`. Removing an absent record is fine.
    pub async fn clear(&self, target: &str) -> Result<(), StoreError> {
        let lock = self.lock_for(target).await;
        let _guard = lock.lock().await;

        match tokio::fs::remove_file(self.record_path(target)).await {
            Ok(()) => {
                debug!(target_name = target, "resume state cleared");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Record path for `target`: SHA-256 of the name keeps slashes and
    /// other unsafe characters out of the filename.
    fn record_path(&self, target: &str) -> PathBuf {
        let mut hasher = Sha256::new();
        hasher.update(target.as_bytes());
        self.dir.join(format!("{}.json", hex::encode(hasher.finalize())))
    }

    async fn lock_for(&self, target: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        // Clones are only handed out under the registry lock, so an entry
        // at strong count 1 has no outstanding holder.
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        locks.entry(target.to_string()).or_default().clone()
    }
}
