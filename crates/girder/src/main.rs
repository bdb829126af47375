//! Girder CLI binary.

use anyhow::Result;
use girder::cli::Cli;
use tracing_subscriber::EnvFilter;

/// Main entry point for the girder CLI.
///
/// Uses tokio's current_thread runtime; CLI operations are sequential and
/// I/O-bound.
#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // Controlled via RUST_LOG, e.g. RUST_LOG=girder=debug,girder_jsonl=trace
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("girder=info,girder_jsonl=info")),
        )
        .with_target(false)
        .init();

    tracing::debug!("starting girder CLI");

    let cli = Cli::parse_args();
    cli.execute().await?;

    Ok(())
}
