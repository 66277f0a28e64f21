//! Command-line interface definitions.
//!
//! One positional keyword plus optional flags. Every flag left unset falls
//! back to the config file (if given) and then to built-in defaults.

use clap::Parser;
use std::path::PathBuf;

/// Find a publisher by keyword and harvest its articles to disk.
///
/// # Examples
///
/// ```sh
/// # Harvest into the current directory
/// wx_harvest "Acme Daily"
///
/// # Harvest into /srv/harvest with a wider worker pool
/// wx_harvest "Acme Daily" -r /srv/harvest --workers 8
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Keyword to search for; also names the output subdirectory
    #[arg(value_parser = parse_keyword)]
    pub keyword: String,

    /// Output root directory (defaults to the current working directory)
    #[arg(short, long)]
    pub root_dir: Option<PathBuf>,

    /// Optional path to a YAML config file
    #[arg(short, long, env = "WX_HARVEST_CONFIG")]
    pub config: Option<PathBuf>,

    /// Scheme and host of the search service
    #[arg(long, env = "WX_HARVEST_SEARCH_BASE")]
    pub search_base: Option<String>,

    /// Number of articles processed concurrently
    #[arg(short, long)]
    pub workers: Option<usize>,

    /// Maximum concurrent requests per host
    #[arg(long)]
    pub per_host_limit: Option<usize>,

    /// Retries for failed network requests
    #[arg(long)]
    pub max_retries: Option<usize>,
}

fn parse_keyword(raw: &str) -> Result<String, String> {
    if raw.is_empty() {
        Err("keyword must not be empty".to_string())
    } else {
        Ok(raw.to_string())
    }
}
