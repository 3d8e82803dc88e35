use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use cnb_cache::{QueryService, RegionCache};
use cnb_sync::{RefreshScheduler, SyncConfig};
use cnb_web::AppState;
use tracing::error;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "cnb-cli")]
#[command(about = "Brazilian public job competition tracker")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run the refresh scheduler and serve the query API (default).
    Serve,
    /// Run a single refresh cycle and exit.
    Sync,
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let config = SyncConfig::from_env();
    let cache = Arc::new(RegionCache::new());
    let scheduler = RefreshScheduler::new(&config, cache.clone())?;

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => {
            // Startup pass plus interval passes run alongside the server;
            // readers are served from whatever the cache holds.
            let scheduler_task = tokio::spawn(async move { scheduler.run().await });
            let query = QueryService::new(cache, config.refresh_interval);
            let result = cnb_web::serve_from_env(AppState::new(query)).await;
            scheduler_task.abort();
            result
        }
        Commands::Sync => {
            let summary = scheduler.run_cycle().await;
            println!(
                "cycle complete: refreshed={} failed={} elapsed={:?}",
                summary.refreshed, summary.failed, summary.elapsed
            );
            if summary.refreshed == 0 {
                error!("no region could be refreshed");
            }
            Ok(())
        }
    }
}
