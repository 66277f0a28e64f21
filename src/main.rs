//! # wx_harvest
//!
//! Finds a publisher's homepage from a keyword search and harvests its
//! published articles, cover images, and avatar into a local directory tree.
//!
//! ## Usage
//!
//! ```sh
//! wx_harvest "Acme Daily" -r ./harvest
//! ```
//!
//! ## Architecture
//!
//! The application follows a pipeline architecture:
//! 1. **Resolving**: search for the keyword and find the matching homepage link
//! 2. **Mining**: extract account id, avatar, and article list from the homepage
//! 3. **Persisting**: fetch each article and its cover on a bounded worker pool
//!    and write them under `<root>/<keyword>/<title>/`
//!
//! Ctrl-C abandons the search and homepage fetches and stops new article
//! fetches; files already being written are either completed or never appear
//! under their final name.

use clap::Parser;
use std::error::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod cli;
mod config;
mod error;
mod fetch;
mod models;
mod outputs;
mod pipeline;
mod scrapers;
mod utils;

use cli::Cli;
use config::HarvestConfig;
use fetch::build_fetcher;
use pipeline::Pipeline;
use scrapers::homepage::PatternStrategy;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();
    let args = Cli::parse();
    debug!(?args, "Parsed CLI arguments");

    let config = match HarvestConfig::resolve(&args).await {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "Invalid configuration");
            return Err(e.into());
        }
    };
    let root_dir = match config.root_dir() {
        Ok(root) => root,
        Err(e) => {
            error!(error = %e, "Cannot resolve output root directory");
            return Err(e.into());
        }
    };
    info!(keyword = %args.keyword, root = %root_dir.display(), workers = config.workers, "wx_harvest starting up");

    let fetcher = build_fetcher(&config)?;
    let strategy = PatternStrategy::with_window(config.lookahead_window);
    let pipeline = Pipeline::new(fetcher, config, root_dir).with_strategy(strategy);

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received; stopping after in-flight articles");
            on_signal.cancel();
        }
    });

    let summary = match pipeline.run(&args.keyword, &cancel).await {
        Ok(summary) => summary,
        Err(e) => {
            error!(keyword = %args.keyword, error = %e, "Harvest aborted");
            return Err(e.into());
        }
    };

    let elapsed = start_time.elapsed();
    info!(
        ?elapsed,
        saved = summary.saved,
        skipped = summary.skipped,
        failed = summary.failed,
        "Execution complete"
    );
    Ok(())
}
