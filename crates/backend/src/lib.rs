//! Remote storage backends for blockhaul.
//!
//! [`BlobStore`] speaks the block-blob REST dialect: chunks are staged as
//! independent blocks and a final block-list commit assembles the object.
//! Construction is keyed by [`BackendKind`](blockhaul_protocol::BackendKind)
//! through [`connect`]; selectors without a working client are rejected
//! with a configuration error rather than silently accepted.

mod blob;
mod config;
mod factory;

pub use blob::BlobStore;
pub use config::{BackendSettings, BlobConfig, ConfigError};
pub use factory::connect;
