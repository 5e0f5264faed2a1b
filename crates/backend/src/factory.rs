//! Backend construction keyed by [`BackendKind`].

use std::sync::Arc;

use blockhaul_engine::BlockStore;
use blockhaul_protocol::BackendKind;

use crate::blob::BlobStore;
use crate::config::{BackendSettings, ConfigError};

/// Builds the selected backend from explicit settings.
///
/// The factory never reads the environment; callers load
/// [`BackendSettings`] first and pass them in.
pub fn connect(
    kind: BackendKind,
    settings: &BackendSettings,
) -> Result<Arc<dyn BlockStore>, ConfigError> {
    match kind {
        BackendKind::Blob => {
            let config = settings
                .blob
                .clone()
                .ok_or(ConfigError::BlobNotConfigured)?;
            Ok(Arc::new(BlobStore::new(config)))
        }
        // No S3 client is wired up. Refuse loudly instead of accepting
        // uploads that would go nowhere.
        BackendKind::S3 => Err(ConfigError::UnsupportedBackend(kind)),
    }
}
