//! Blockhaul command line entry point.

mod app;
mod cli;

use clap::Parser;
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Initialize structured logging. Logs go to stderr so the outcome
    // report on stdout stays machine-readable.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,blockhaul=debug")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = cli::Cli::parse();
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        files = args.files.len(),
        "starting blockhaul"
    );

    let rt = tokio::runtime::Runtime::new()?;
    let failed = rt.block_on(app::run(args))?;

    if failed > 0 {
        std::process::exit(1);
    }
    Ok(())
}
