//! HTTP fetching with per-host concurrency caps and retry with backoff.
//!
//! # Architecture
//!
//! - [`Fetch`]: core trait, one GET returning the body and the final URL
//! - [`HttpFetcher`]: `reqwest`-backed implementation with a semaphore per host
//! - [`RetryFetch`]: decorator that retries network errors on any [`Fetch`]
//!
//! # Retry Strategy
//!
//! Only [`Error::Network`] is retried; parse and not-found errors are returned
//! immediately. The delay between attempts is
//! ```text
//! delay = min(base_delay * 2^(attempt-1), max_delay) + random_jitter(0..250ms)
//! ```

use crate::config::HarvestConfig;
use crate::error::{Error, Result};
use rand::{Rng, rng};
use reqwest::Client;
use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, instrument, warn};
use url::Url;

/// A successful GET.
#[derive(Debug, Clone)]
pub struct Fetched {
    pub body: Vec<u8>,
    /// URL after the client's own redirect handling.
    pub final_url: String,
}

impl Fetched {
    /// Body decoded as UTF-8, replacing invalid sequences.
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }
}

/// Trait for a single HTTP GET.
///
/// Implementors perform exactly one request; retrying is left to
/// [`RetryFetch`].
pub trait Fetch {
    async fn fetch(&self, url: &str) -> Result<Fetched>;
}

/// `reqwest`-backed fetcher.
///
/// Requests to the same host share a semaphore of `per_host_limit` permits so
/// the worker pool cannot flood a single search or article host.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
    per_host_limit: usize,
    hosts: Arc<Mutex<HashMap<String, Arc<Semaphore>>>>,
}

impl HttpFetcher {
    pub fn new(config: &HarvestConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .user_agent(config.user_agent.clone())
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .map_err(|e| Error::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            per_host_limit: config.per_host_limit.max(1),
            hosts: Arc::new(Mutex::new(HashMap::new())),
        })
    }

    fn host_slot(&self, host: &str) -> Arc<Semaphore> {
        let mut hosts = self.hosts.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        hosts
            .entry(host.to_string())
            .or_insert_with(|| Arc::new(Semaphore::new(self.per_host_limit)))
            .clone()
    }
}

impl Fetch for HttpFetcher {
    #[instrument(level = "debug", skip(self))]
    async fn fetch(&self, url: &str) -> Result<Fetched> {
        let parsed = Url::parse(url)?;
        let host = parsed.host_str().unwrap_or_default().to_string();
        let _permit = self
            .host_slot(&host)
            .acquire_owned()
            .await
            .map_err(|e| Error::network(url, None, e.to_string()))?;

        let t0 = Instant::now();
        let response = self
            .client
            .get(parsed)
            .send()
            .await
            .map_err(|e| Error::network(url, e.status().map(|s| s.as_u16()), e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::network(
                url,
                Some(status.as_u16()),
                status.canonical_reason().unwrap_or("unexpected status"),
            ));
        }

        let final_url = response.url().to_string();
        let body = response
            .bytes()
            .await
            .map_err(|e| Error::network(url, Some(status.as_u16()), format!("failed to read body: {e}")))?
            .to_vec();

        debug!(
            bytes = body.len(),
            %final_url,
            elapsed_ms = t0.elapsed().as_millis() as u64,
            "Fetched"
        );
        Ok(Fetched { body, final_url })
    }
}

/// Wrapper that adds exponential backoff retry logic to any [`Fetch`].
pub struct RetryFetch<T> {
    inner: T,
    max_retries: usize,
    base_delay: Duration,
    max_delay: Duration,
}

impl<T> RetryFetch<T>
where
    T: Fetch,
{
    pub fn new(inner: T, max_retries: usize, base_delay: Duration) -> Self {
        Self {
            inner,
            max_retries,
            base_delay,
            max_delay: Duration::from_secs(30),
        }
    }

    fn backoff(&self, attempt: usize) -> Duration {
        let shift = (attempt - 1).min(16) as u32;
        let delay = self.base_delay.saturating_mul(1 << shift).min(self.max_delay);
        let jitter_ms: u64 = rng().random_range(0..=250);
        delay + Duration::from_millis(jitter_ms)
    }
}

impl<T> fmt::Debug for RetryFetch<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryFetch")
            .field("max_retries", &self.max_retries)
            .field("base_delay", &self.base_delay)
            .field("max_delay", &self.max_delay)
            .finish()
    }
}

impl<T> Fetch for RetryFetch<T>
where
    T: Fetch,
{
    #[instrument(level = "debug", skip(self))]
    async fn fetch(&self, url: &str) -> Result<Fetched> {
        let total_t0 = Instant::now();
        let mut attempt = 0usize;

        loop {
            match self.inner.fetch(url).await {
                Ok(fetched) => return Ok(fetched),
                Err(e) if !e.is_retryable() => return Err(e),
                Err(e) => {
                    attempt += 1;
                    if attempt > self.max_retries {
                        error!(
                            attempt,
                            max = self.max_retries,
                            elapsed_ms_total = total_t0.elapsed().as_millis() as u64,
                            error = %e,
                            "fetch exhausted retries"
                        );
                        return Err(e);
                    }

                    let delay = self.backoff(attempt);
                    warn!(
                        attempt,
                        max = self.max_retries,
                        ?delay,
                        error = %e,
                        "fetch failed; backing off"
                    );
                    sleep(delay).await;
                }
            }
        }
    }
}

/// The fetcher the binary runs with: HTTP plus retries from `config`.
pub fn build_fetcher(config: &HarvestConfig) -> Result<RetryFetch<HttpFetcher>> {
    let http = HttpFetcher::new(config)?;
    Ok(RetryFetch::new(http, config.max_retries, config.retry_base_delay()))
}

/// Run `fetcher.fetch(url)` unless `cancel` fires first, in which case the
/// request (and any retry backoff) is dropped and `None` returned.
pub async fn fetch_unless_cancelled<F: Fetch>(
    fetcher: &F,
    url: &str,
    cancel: &CancellationToken,
) -> Result<Option<Fetched>> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Ok(None),
        res = fetcher.fetch(url) => res.map(Some),
    }
}
