//! Remote block store capability.
//!
//! Backends implement [`BlockStore`] on top of their transport. Using a
//! trait keeps engine logic decoupled from HTTP details and testable with
//! mocks.

use std::future::Future;
use std::pin::Pin;

/// Abstract remote block store.
///
/// Implementations must copy borrowed arguments before returning the
/// future; the future only borrows `self`.
pub trait BlockStore: Send + Sync {
    /// Stages one block of `target` under `block_id`.
    ///
    /// Staged blocks are invisible until [`commit_block_list`] assembles
    /// them; staging must not require earlier blocks to be held in memory.
    ///
    /// [`commit_block_list`]: BlockStore::commit_block_list
    fn stage_block(
        &self,
        target: &str,
        block_id: &str,
        data: Vec<u8>,
    ) -> Pin<Box<dyn Future<Output = Result<(), RemoteError>> + Send + '_>>;

    /// Assembles the remote object from staged blocks, in list order.
    ///
    /// Idempotent: committing the same list again yields the same object,
    /// so a failed run can safely be re-driven to a second commit.
    fn commit_block_list(
        &self,
        target: &str,
        block_ids: &[String],
    ) -> Pin<Box<dyn Future<Output = Result<(), RemoteError>> + Send + '_>>;
}

/// Error from a remote block store call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RemoteError {
    /// Worth retrying: timeouts, connection resets, server-side hiccups.
    #[error("transient remote failure: {0}")]
    Transient(String),

    /// Not worth retrying: the remote understood the request and said no.
    #[error("remote rejected request: {0}")]
    Rejected(String),
}

impl RemoteError {
    pub fn is_transient(&self) -> bool {
        matches!(self, RemoteError::Transient(_))
    }
}
