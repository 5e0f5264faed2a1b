//! Wires configuration, backend, and orchestrator together.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use tracing::info;

use blockhaul_backend::BackendSettings;
use blockhaul_engine::RetryPolicy;
use blockhaul_relay::{UploadOrchestrator, UploadRequest};
use blockhaul_store::StateStore;

use crate::cli::Cli;

/// Runs the upload batch and returns the number of failed files.
///
/// The outcome report is printed to stdout as a JSON array, one entry per
/// input file in input order.
pub async fn run(args: Cli) -> anyhow::Result<usize> {
    let settings = BackendSettings::from_env()?;
    let remote = blockhaul_backend::connect(args.backend, &settings)?;
    let store = Arc::new(
        StateStore::open(&args.state_dir)
            .await
            .with_context(|| format!("failed to open state dir {}", args.state_dir.display()))?,
    );
    let spool_dir = args.spool_dir.clone().unwrap_or_else(std::env::temp_dir);

    let mut requests = Vec::with_capacity(args.files.len());
    let mut seen = HashSet::new();
    for path in &args.files {
        let name = target_name(path)?;
        if !seen.insert(name.clone()) {
            anyhow::bail!("duplicate target name {name:?}; each upload needs its own remote name");
        }
        let source = tokio::fs::File::open(path)
            .await
            .with_context(|| format!("failed to open {}", path.display()))?;
        requests.push(UploadRequest { name, source });
    }

    let retry = RetryPolicy {
        max_retries: args.max_retries,
        ..RetryPolicy::default()
    };
    let orchestrator =
        UploadOrchestrator::new(remote, store, spool_dir, args.chunk_size, retry);

    // Ctrl+C stops uploads at the next chunk boundary. Staged progress
    // stays on disk, so a re-run resumes where this one stopped.
    let cancel = orchestrator.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, stopping uploads");
            cancel.cancel();
        }
    });

    let outcomes = orchestrator.process_all(requests).await;
    println!("{}", serde_json::to_string_pretty(&outcomes)?);

    Ok(outcomes.iter().filter(|o| o.is_failed()).count())
}

fn target_name(path: &Path) -> anyhow::Result<String> {
    let name = path
        .file_name()
        .with_context(|| format!("{} has no file name", path.display()))?;
    let name = name
        .to_str()
        .with_context(|| format!("{} is not valid UTF-8", path.display()))?;
    Ok(name.to_string())
}
