//! Shared types for blockhaul: backend selection, per-file upload outcomes,
//! and the persisted resume-state record.

mod state;
mod types;

pub use state::{StateMismatch, UploadState};
pub use types::{BackendKind, UnknownBackend, UploadOutcome};
