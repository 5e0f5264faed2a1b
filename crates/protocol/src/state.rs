use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Persisted resume record for one upload target.
///
/// Written after every staged chunk and deleted only once the remote commit
/// succeeds, so an interrupted upload continues from the last confirmed byte
/// instead of starting over. `chunk_ids` is kept in stage order; the commit
/// sends it verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadState {
    pub target_name: String,
    pub confirmed_bytes: u64,
    pub chunk_ids: Vec<String>,
    /// SHA-256 hex of the local buffer the chunks were read from. Empty in
    /// records written before digests were recorded.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub content_digest: String,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

impl UploadState {
    /// Fresh record with no confirmed chunks.
    pub fn new(target_name: impl Into<String>, content_digest: impl Into<String>) -> Self {
        Self {
            target_name: target_name.into(),
            confirmed_bytes: 0,
            chunk_ids: Vec::new(),
            content_digest: content_digest.into(),
            updated_at: Utc::now(),
        }
    }

    /// Appends a staged chunk and advances the confirmed byte count.
    pub fn record_chunk(&mut self, chunk_id: String, size: u64) {
        self.chunk_ids.push(chunk_id);
        self.confirmed_bytes += size;
        self.updated_at = Utc::now();
    }

    /// Verifies that this record can seed a resume of `target_name` over a
    /// local buffer of `buffer_len` bytes whose SHA-256 hex is `digest`.
    ///
    /// A record with an empty `content_digest` passes the digest check; the
    /// byte-count checks still apply.
    pub fn check_resumable(
        &self,
        target_name: &str,
        buffer_len: u64,
        digest: &str,
    ) -> Result<(), StateMismatch> {
        if self.target_name != target_name {
            return Err(StateMismatch::TargetName {
                recorded: self.target_name.clone(),
                requested: target_name.to_string(),
            });
        }
        if !self.content_digest.is_empty() && self.content_digest != digest {
            return Err(StateMismatch::ContentDigest {
                recorded: self.content_digest.clone(),
                actual: digest.to_string(),
            });
        }
        if self.confirmed_bytes > buffer_len {
            return Err(StateMismatch::ConfirmedBeyondEnd {
                confirmed: self.confirmed_bytes,
                buffer_len,
            });
        }
        if (self.confirmed_bytes == 0) != self.chunk_ids.is_empty() {
            return Err(StateMismatch::CountMismatch {
                confirmed: self.confirmed_bytes,
                chunks: self.chunk_ids.len(),
            });
        }
        Ok(())
    }
}

/// Reason a persisted record cannot seed a resume.
///
/// Resume fails closed on any mismatch: staging new chunks against a
/// baseline the recorded chunks were not read from would commit a corrupt
/// object.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StateMismatch {
    #[error("record belongs to target {recorded:?}, not {requested:?}")]
    TargetName { recorded: String, requested: String },

    #[error("buffer digest {actual} does not match recorded digest {recorded}")]
    ContentDigest { recorded: String, actual: String },

    #[error("record confirms {confirmed} bytes but the buffer holds only {buffer_len}")]
    ConfirmedBeyondEnd { confirmed: u64, buffer_len: u64 },

    #[error("record confirms {confirmed} bytes across {chunks} chunk ids")]
    CountMismatch { confirmed: u64, chunks: usize },
}
