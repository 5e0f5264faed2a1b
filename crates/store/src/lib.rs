//! Durable resume-state records for in-flight uploads.
//!
//! One JSON record per upload target, stored in a flat directory and keyed
//! by a hash of the target name so arbitrary names stay filesystem-safe.
//! Saves go through a temp file and rename, so a record on disk is never a
//! partial write. Operations on the same target are serialized by a
//! per-target lock; different targets never contend.

mod store;

pub use store::{StateStore, StoreError};
