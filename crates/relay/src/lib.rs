//! Multi-file upload orchestration.
//!
//! Incoming byte streams are spooled to disk-backed temp buffers with a
//! bounded memory window, then handed to one upload engine run per file.
//! The batch is all-settled: every input produces an outcome, and a
//! failing file never aborts its siblings.

mod orchestrator;
mod spool;

pub use orchestrator::{UploadOrchestrator, UploadRequest};
pub use spool::{spool_to_temp, SPOOL_WINDOW};
