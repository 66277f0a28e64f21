//! Orchestration of one keyword harvest.
//!
//! 1. **Resolve**: search for the keyword and pick the homepage link
//! 2. **Mine**: pull profile fields and article descriptors from the homepage
//! 3. **Persist**: fan the descriptors out over a bounded worker pool
//!
//! Stages 1 and 2 run once and any failure there aborts the run. Failures in
//! stage 3 are isolated per article: logged, counted, and skipped.
//!
//! A [`Pipeline`] holds no per-run mutable state, so several keywords can run
//! through the same instance concurrently.

use crate::config::HarvestConfig;
use crate::error::{Error, Result};
use crate::fetch::{Fetch, Fetched, fetch_unless_cancelled};
use crate::models::{ArticleDescriptor, HomepageRecord, RunSummary};
use crate::outputs::json;
use crate::outputs::store::{AVATAR_FILE, PathStore};
use crate::scrapers::article::{ArticleOutcome, ArticlePersister};
use crate::scrapers::homepage::{MiningStrategy, PatternStrategy, mine_homepage};
use crate::scrapers::search::{resolve_homepage, search_url};
use futures::stream::{self, StreamExt};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

pub struct Pipeline<F> {
    fetcher: F,
    config: HarvestConfig,
    store: PathStore,
    strategy: Box<dyn MiningStrategy>,
}

impl<F> Pipeline<F>
where
    F: Fetch,
{
    /// `root` is the already-resolved output root.
    pub fn new(fetcher: F, config: HarvestConfig, root: impl Into<PathBuf>) -> Self {
        Self {
            fetcher,
            config,
            store: PathStore::new(root),
            strategy: Box::new(PatternStrategy::default()),
        }
    }

    pub fn with_strategy(mut self, strategy: impl MiningStrategy + 'static) -> Self {
        self.strategy = Box::new(strategy);
        self
    }

    /// Run all three stages for `keyword`.
    ///
    /// Cancelling `cancel` abandons the search and homepage fetches and stops
    /// new article fetches; in-flight articles finish or abort without
    /// leaving partial files.
    ///
    /// # Errors
    ///
    /// Only errors that leave nothing to harvest: the search or homepage
    /// fetch failing, no matching anchor, the keyword directory not being
    /// creatable, or [`Error::Cancelled`] before the homepage was mined.
    #[instrument(level = "info", skip(self, cancel))]
    pub async fn run(&self, keyword: &str, cancel: &CancellationToken) -> Result<RunSummary> {
        let homepage_url = self.resolve(keyword, cancel).await?;

        let homepage = self.fetch_or_abort(&homepage_url, cancel).await?;
        let mined = mine_homepage(&homepage.text(), &homepage_url, self.strategy.as_ref())?;

        self.store
            .ensure_dir(&self.store.keyword_dir(keyword))
            .await?;
        self.save_avatar(keyword, &mined.record, cancel).await;
        if let Err(e) = json::write_profile(&self.store, keyword, &mined.record, &mined.articles).await {
            warn!(error = %e, "Failed to write profile manifest");
        }

        let mut summary = RunSummary {
            discovered: mined.articles.len(),
            malformed: mined.malformed,
            ..RunSummary::default()
        };
        self.harvest(keyword, &mined.articles, cancel, &mut summary)
            .await;

        info!(
            discovered = summary.discovered,
            saved = summary.saved,
            skipped = summary.skipped,
            failed = summary.failed,
            malformed = summary.malformed,
            cancelled = summary.cancelled,
            "Harvest finished"
        );
        Ok(summary)
    }

    /// Search for `keyword` and return the homepage URL.
    #[instrument(level = "info", skip(self, cancel))]
    pub async fn resolve(&self, keyword: &str, cancel: &CancellationToken) -> Result<String> {
        let url = search_url(&self.config.search_base, keyword);
        info!(%url, "Searching");
        let page = self.fetch_or_abort(&url, cancel).await?;
        resolve_homepage(&page.text(), keyword, &page.final_url)
    }

    async fn fetch_or_abort(&self, url: &str, cancel: &CancellationToken) -> Result<Fetched> {
        fetch_unless_cancelled(&self.fetcher, url, cancel)
            .await?
            .ok_or(Error::Cancelled)
    }

    async fn save_avatar(&self, keyword: &str, record: &HomepageRecord, cancel: &CancellationToken) {
        let Some(avatar_url) = &record.avatar_url else {
            return;
        };
        let path = self.store.keyword_dir(keyword).join(AVATAR_FILE);
        let saved = match fetch_unless_cancelled(&self.fetcher, avatar_url, cancel).await {
            Ok(Some(fetched)) => self.store.write_atomic(&path, fetched.body).await,
            Ok(None) => {
                debug!("Cancelled before avatar fetch finished");
                return;
            }
            Err(e) => Err(e),
        };
        match saved {
            Ok(()) => info!(path = %path.display(), "Saved avatar"),
            Err(e) => warn!(%avatar_url, error = %e, "Failed to save avatar"),
        }
    }

    /// Process every descriptor on a pool of `config.workers` concurrent
    /// tasks. Completion order is unspecified.
    #[instrument(level = "info", skip_all, fields(count = articles.len(), workers = self.config.workers))]
    async fn harvest(
        &self,
        keyword: &str,
        articles: &[ArticleDescriptor],
        cancel: &CancellationToken,
        summary: &mut RunSummary,
    ) {
        let persister = ArticlePersister::new(&self.fetcher, &self.store, keyword);

        let results: Vec<_> = stream::iter(articles.iter().enumerate())
            .take_until(cancel.cancelled())
            .map(|(index, descriptor)| {
                let persister = &persister;
                async move {
                    debug!(index, url = %descriptor.content_url, "Processing article");
                    (index, descriptor, persister.process(descriptor, cancel).await)
                }
            })
            .buffer_unordered(self.config.workers.max(1))
            .collect()
            .await;

        summary.cancelled += articles.len() - results.len();
        for (index, descriptor, result) in results {
            match result {
                Ok(ArticleOutcome::Saved {
                    title,
                    dir,
                    cover_saved,
                }) => {
                    debug!(index, %title, dir = %dir.display(), cover_saved, "Article saved");
                    summary.saved += 1;
                }
                Ok(ArticleOutcome::Skipped { content_url }) => {
                    debug!(index, %content_url, "Article skipped");
                    summary.skipped += 1;
                }
                Ok(ArticleOutcome::Cancelled) => summary.cancelled += 1,
                Err(e) => {
                    error!(index, url = %descriptor.content_url, error = %e, "Article failed; skipping");
                    summary.failed += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::HttpFetcher;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use crate::outputs::store::{ARTICLE_FILE, COVER_FILE, PROFILE_FILE};
    use tempfile::TempDir;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const AVATAR: &[u8] = b"\x89PNG avatar";
    const COVER_ONE: &[u8] = b"\xFF\xD8 cover one";
    const COVER_TWO: &[u8] = b"\xFF\xD8 cover two";

    fn config(server: &MockServer) -> HarvestConfig {
        HarvestConfig {
            search_base: server.uri(),
            workers: 3,
            max_retries: 0,
            request_timeout_secs: 5,
            ..HarvestConfig::default()
        }
    }

    fn pipeline(server: &MockServer, root: &std::path::Path) -> Pipeline<HttpFetcher> {
        let config = config(server);
        let fetcher = HttpFetcher::new(&config).unwrap();
        Pipeline::new(fetcher, config, root)
    }

    async fn serve(server: &MockServer, route: &str, response: ResponseTemplate) {
        Mock::given(method("GET"))
            .and(path(route))
            .respond_with(response)
            .mount(server)
            .await;
    }

    async fn mount_site(server: &MockServer) {
        let uri = server.uri();
        Mock::given(method("GET"))
            .and(path("/weixin"))
            .and(query_param("query", "Acme Daily"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"<html><body>
                    <div class="txt-box"><a href="/gz?id=41">Acme <em>Weekly</em></a></div>
                    <div class="txt-box"><a href="/gz?id=42"><em>Acme</em> Daily</a></div>
                </body></html>"#,
            ))
            .mount(server)
            .await;

        let homepage = format!(
            r#"<html><body>
              <span class="radius_avatar profile_avatar"><img src="{uri}/avatar.png"></span>
              <p class="profile_account">微信号: acme_daily</p>
              <script>var msgList = {{"list":[
                {{"content_url":"{uri}/s1","cover":"{uri}/c1.jpg"}},
                {{"content_url":"/s2?a=1&amp;b=2","cover":"{uri}/c2.jpg"}},
                {{"content_url":"/s3","cover":"{uri}/c1.jpg"}},
                {{"content_url":"/s4","cover":"{uri}/c1.jpg"}},
                {{"content_url":"/s5","digest":"cover went missing"}}
              ]}};</script>
            </body></html>"#
        );
        serve(server, "/gz", ResponseTemplate::new(200).set_body_string(homepage)).await;
        serve(server, "/avatar.png", ResponseTemplate::new(200).set_body_bytes(AVATAR)).await;

        serve(
            server,
            "/s1",
            ResponseTemplate::new(200).set_body_string("<html><title>First Post</title>one</html>"),
        )
        .await;
        serve(
            server,
            "/s2",
            ResponseTemplate::new(200).set_body_string("<html><title>Second Post</title>two</html>"),
        )
        .await;
        serve(
            server,
            "/s3",
            ResponseTemplate::new(200).set_body_string("<html><body>untitled</body></html>"),
        )
        .await;
        serve(server, "/s4", ResponseTemplate::new(502)).await;
        serve(server, "/c1.jpg", ResponseTemplate::new(200).set_body_bytes(COVER_ONE)).await;
        serve(server, "/c2.jpg", ResponseTemplate::new(200).set_body_bytes(COVER_TWO)).await;
    }

    #[tokio::test]
    async fn test_full_harvest() {
        let server = MockServer::start().await;
        mount_site(&server).await;
        let tmp = TempDir::new().unwrap();
        let pipeline = pipeline(&server, tmp.path());

        let summary = pipeline
            .run("Acme Daily", &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(
            summary,
            RunSummary {
                discovered: 4,
                saved: 2,
                skipped: 1,
                failed: 1,
                malformed: 1,
                cancelled: 0,
            }
        );

        let root = tmp.path().join("Acme Daily");
        assert_eq!(std::fs::read(root.join(AVATAR_FILE)).unwrap(), AVATAR);
        assert!(root.join(PROFILE_FILE).is_file());

        let first = root.join("First Post");
        assert_eq!(
            std::fs::read_to_string(first.join(ARTICLE_FILE)).unwrap(),
            "<html><title>First Post</title>one</html>"
        );
        assert_eq!(std::fs::read(first.join(COVER_FILE)).unwrap(), COVER_ONE);

        let second = root.join("Second Post");
        assert_eq!(std::fs::read(second.join(COVER_FILE)).unwrap(), COVER_TWO);

        // avatar, profile, and the two titled articles only
        assert_eq!(std::fs::read_dir(&root).unwrap().count(), 4);
    }

    #[tokio::test]
    async fn test_profile_lists_every_descriptor() {
        let server = MockServer::start().await;
        mount_site(&server).await;
        let tmp = TempDir::new().unwrap();

        pipeline(&server, tmp.path())
            .run("Acme Daily", &CancellationToken::new())
            .await
            .unwrap();

        let raw = std::fs::read(tmp.path().join("Acme Daily").join(PROFILE_FILE)).unwrap();
        let manifest: crate::models::ProfileManifest = serde_json::from_slice(&raw).unwrap();
        assert_eq!(manifest.homepage.url, format!("{}/gz?id=42", server.uri()));
        assert_eq!(manifest.homepage.account_id.as_deref(), Some("acme_daily"));
        assert_eq!(manifest.articles.len(), 4);
        assert_eq!(manifest.articles[1].content_url, format!("{}/s2?a=1&b=2", server.uri()));
    }

    #[tokio::test]
    async fn test_rerun_reuses_same_paths() {
        let server = MockServer::start().await;
        mount_site(&server).await;
        let tmp = TempDir::new().unwrap();
        let pipeline = pipeline(&server, tmp.path());

        let first = pipeline.run("Acme Daily", &CancellationToken::new()).await.unwrap();
        let second = pipeline.run("Acme Daily", &CancellationToken::new()).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(std::fs::read_dir(tmp.path().join("Acme Daily")).unwrap().count(), 4);
    }

    #[tokio::test]
    async fn test_unmatched_keyword_aborts_without_output() {
        let server = MockServer::start().await;
        serve(
            &server,
            "/weixin",
            ResponseTemplate::new(200).set_body_string("<a href=\"/gz?id=1\">Someone Else</a>"),
        )
        .await;
        let tmp = TempDir::new().unwrap();

        let err = pipeline(&server, tmp.path())
            .run("Acme Daily", &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, Error::NotFound(_)));
        assert_eq!(std::fs::read_dir(tmp.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_search_failure_is_reported() {
        let server = MockServer::start().await;
        serve(&server, "/weixin", ResponseTemplate::new(503)).await;
        let tmp = TempDir::new().unwrap();

        let err = pipeline(&server, tmp.path())
            .run("Acme Daily", &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Network { status: Some(503), .. }));
    }

    #[tokio::test]
    async fn test_cancelled_run_stops_before_search() {
        let server = MockServer::start().await;
        mount_site(&server).await;
        let tmp = TempDir::new().unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = pipeline(&server, tmp.path())
            .run("Acme Daily", &cancel)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Cancelled));
        assert_eq!(std::fs::read_dir(tmp.path()).unwrap().count(), 0);
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_cancel_interrupts_slow_search() {
        let server = MockServer::start().await;
        serve(
            &server,
            "/weixin",
            ResponseTemplate::new(200).set_delay(Duration::from_secs(10)),
        )
        .await;
        let tmp = TempDir::new().unwrap();
        let pipeline = pipeline(&server, tmp.path());
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let result = tokio::time::timeout(Duration::from_secs(2), pipeline.run("Acme Daily", &cancel))
            .await
            .expect("run ignored cancellation");
        assert!(matches!(result, Err(Error::Cancelled)));
    }

    #[tokio::test]
    async fn test_cancelled_harvest_issues_no_article_fetches() {
        let server = MockServer::start().await;
        let tmp = TempDir::new().unwrap();
        let pipeline = pipeline(&server, tmp.path());
        let articles: Vec<ArticleDescriptor> = (0..4)
            .map(|i| ArticleDescriptor {
                content_url: format!("{}/s{i}", server.uri()),
                cover_url: format!("{}/c{i}.jpg", server.uri()),
            })
            .collect();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let mut summary = RunSummary::default();
        pipeline.harvest("Acme Daily", &articles, &cancel, &mut summary).await;

        assert_eq!(summary.cancelled, 4);
        assert_eq!(summary.saved + summary.failed + summary.skipped, 0);
        assert!(server.received_requests().await.unwrap().is_empty());
        assert!(!tmp.path().join("Acme Daily").exists());
    }

    /// Serves a titled page for every URL and records how many calls overlap.
    #[derive(Default)]
    struct OverlapFetcher {
        in_flight: AtomicUsize,
        peak: AtomicUsize,
        calls: AtomicUsize,
    }

    impl Fetch for Arc<OverlapFetcher> {
        async fn fetch(&self, url: &str) -> Result<Fetched> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            let name = url.rsplit('/').next().unwrap_or_default();
            Ok(Fetched {
                body: format!("<html><title>{name}</title></html>").into_bytes(),
                final_url: url.to_string(),
            })
        }
    }

    #[tokio::test]
    async fn test_worker_pool_bounds_concurrency() {
        let tmp = TempDir::new().unwrap();
        let fetcher = Arc::new(OverlapFetcher::default());
        let config = HarvestConfig {
            workers: 3,
            ..HarvestConfig::default()
        };
        let pipeline = Pipeline::new(fetcher.clone(), config, tmp.path());
        let articles: Vec<ArticleDescriptor> = (0..12)
            .map(|i| ArticleDescriptor {
                content_url: format!("http://pub.example/s{i}"),
                cover_url: format!("http://img.example/c{i}.jpg"),
            })
            .collect();

        let mut summary = RunSummary::default();
        pipeline
            .harvest("Acme Daily", &articles, &CancellationToken::new(), &mut summary)
            .await;

        assert_eq!(summary.saved, 12);
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 24);
        let peak = fetcher.peak.load(Ordering::SeqCst);
        assert!(peak <= 3, "peak {peak} exceeds worker count");
        assert!(peak > 1, "articles ran one at a time");
    }
}
