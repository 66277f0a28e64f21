//! Runtime configuration for a harvest run.
//!
//! Values come from three layers, later ones winning: built-in defaults, an
//! optional YAML file (`--config`), and command-line flags. The resulting
//! [`HarvestConfig`] is passed explicitly down the pipeline.

use crate::cli::Cli;
use crate::error::{Error, Result};
use crate::scrapers::homepage::{LOOKAHEAD_WINDOW, MAX_LOOKAHEAD_WINDOW};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, instrument};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarvestConfig {
    /// Output root. `None` means the current working directory.
    #[serde(default)]
    pub root_dir: Option<PathBuf>,

    /// Scheme and host of the search service.
    #[serde(default = "default_search_base")]
    pub search_base: String,

    /// Size of the article worker pool.
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Maximum concurrent requests against a single host.
    #[serde(default = "default_per_host_limit")]
    pub per_host_limit: usize,

    /// Retries for network errors; 0 disables retrying.
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,

    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Bytes searched after each content-URL field for its cover field.
    #[serde(default = "default_lookahead_window")]
    pub lookahead_window: usize,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            root_dir: None,
            search_base: default_search_base(),
            workers: default_workers(),
            per_host_limit: default_per_host_limit(),
            max_retries: default_max_retries(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            request_timeout_secs: default_request_timeout_secs(),
            user_agent: default_user_agent(),
            lookahead_window: default_lookahead_window(),
        }
    }
}

fn default_search_base() -> String {
    String::from("http://weixin.sogou.com")
}

fn default_workers() -> usize {
    4
}

fn default_per_host_limit() -> usize {
    2
}

fn default_max_retries() -> usize {
    3
}

fn default_retry_base_delay_ms() -> u64 {
    500
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_user_agent() -> String {
    format!("wx_harvest/{}", env!("CARGO_PKG_VERSION"))
}

fn default_lookahead_window() -> usize {
    LOOKAHEAD_WINDOW
}

impl HarvestConfig {
    pub fn from_yaml(text: &str) -> Result<Self> {
        let config: HarvestConfig = serde_yaml::from_str(text)?;
        config.validate()
    }

    #[instrument(level = "info", skip_all, fields(path = %path.display()))]
    pub async fn load(path: &Path) -> Result<Self> {
        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| Error::fs(path, e))?;
        let config = Self::from_yaml(&text)?;
        debug!(?config, "Loaded configuration file");
        Ok(config)
    }

    /// Build the effective configuration: file (if any) overlaid by CLI flags.
    pub async fn resolve(cli: &Cli) -> Result<Self> {
        let base = match &cli.config {
            Some(path) => Self::load(path).await?,
            None => Self::default(),
        };
        base.with_cli(cli).validate()
    }

    fn with_cli(mut self, cli: &Cli) -> Self {
        if let Some(root) = &cli.root_dir {
            self.root_dir = Some(root.clone());
        }
        if let Some(base) = &cli.search_base {
            self.search_base = base.clone();
        }
        if let Some(workers) = cli.workers {
            self.workers = workers;
        }
        if let Some(limit) = cli.per_host_limit {
            self.per_host_limit = limit;
        }
        if let Some(retries) = cli.max_retries {
            self.max_retries = retries;
        }
        self
    }

    fn validate(self) -> Result<Self> {
        if self.workers == 0 {
            return Err(Error::Config("workers must be at least 1".into()));
        }
        if self.per_host_limit == 0 {
            return Err(Error::Config("per_host_limit must be at least 1".into()));
        }
        if self.lookahead_window == 0 || self.lookahead_window > MAX_LOOKAHEAD_WINDOW {
            return Err(Error::Config(format!(
                "lookahead_window must be between 1 and {MAX_LOOKAHEAD_WINDOW}"
            )));
        }
        url::Url::parse(&self.search_base)
            .map_err(|e| Error::Config(format!("search_base {:?}: {e}", self.search_base)))?;
        Ok(self)
    }

    /// Output root, falling back to the current working directory.
    pub fn root_dir(&self) -> Result<PathBuf> {
        match &self.root_dir {
            Some(root) => Ok(root.clone()),
            None => std::env::current_dir().map_err(|e| Error::fs(".", e)),
        }
    }

    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
