//! Command line argument definitions.

use std::path::PathBuf;

use clap::Parser;

use blockhaul_protocol::BackendKind;

/// Uploads files to remote block storage in resumable chunks.
#[derive(Debug, Parser)]
#[command(name = "blockhaul", version, about)]
pub struct Cli {
    /// Files to upload. Each file's name becomes its remote target name.
    #[arg(required = true)]
    pub files: Vec<PathBuf>,

    /// Storage backend receiving the uploads.
    #[arg(long, default_value_t = BackendKind::Blob)]
    pub backend: BackendKind,

    /// Chunk size in bytes. 0 keeps the built-in 4 MiB default.
    #[arg(long, default_value_t = 0)]
    pub chunk_size: usize,

    /// Transient failures tolerated per chunk before an upload fails.
    #[arg(long, default_value_t = 3)]
    pub max_retries: u32,

    /// Directory holding resume state records.
    #[arg(long, default_value = ".blockhaul-state")]
    pub state_dir: PathBuf,

    /// Directory for temp spool buffers. Defaults to the system temp dir.
    #[arg(long)]
    pub spool_dir: Option<PathBuf>,
}
