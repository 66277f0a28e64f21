//! Article fetching and persistence.
//!
//! For each descriptor the article page is fetched, its `<title>` lifted with
//! a single bounded pattern, the cover image fetched, and both written under
//! `R/K/T/`. An article without a title is skipped; nothing is written for it.

use crate::error::Result;
use crate::fetch::{Fetch, fetch_unless_cancelled};
use crate::models::{ArticleDescriptor, ArticleRecord};
use crate::outputs::store::{ARTICLE_FILE, COVER_FILE, PathStore};
use crate::utils::truncate_for_log;
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

static TITLE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)<title[^>]*>([^<]{0,512})</title>").expect("title pattern"));

/// Page title, trimmed. `None` when the tag is missing or blank.
pub fn extract_title(body: &str) -> Option<String> {
    TITLE_RE
        .captures(body)
        .map(|c| c[1].trim().to_string())
        .filter(|title| !title.is_empty())
}

/// What happened to one descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArticleOutcome {
    Saved {
        title: String,
        dir: PathBuf,
        cover_saved: bool,
    },
    /// The page had no usable title.
    Skipped { content_url: String },
    /// The run was cancelled before anything was written.
    Cancelled,
}

/// Fetches and writes single articles for one keyword.
///
/// Holds only shared references, so one persister serves every worker.
#[derive(Debug)]
pub struct ArticlePersister<'a, F> {
    fetcher: &'a F,
    store: &'a PathStore,
    keyword: &'a str,
}

impl<'a, F> ArticlePersister<'a, F>
where
    F: Fetch,
{
    pub fn new(fetcher: &'a F, store: &'a PathStore, keyword: &'a str) -> Self {
        Self {
            fetcher,
            store,
            keyword,
        }
    }

    /// Fetch, extract, and persist one article.
    ///
    /// # Errors
    ///
    /// A network error on the article page itself, or a filesystem error
    /// while writing it. A failing cover fetch is logged and the article is
    /// still saved without it.
    #[instrument(level = "info", skip_all, fields(content_url = %descriptor.content_url))]
    pub async fn process(
        &self,
        descriptor: &ArticleDescriptor,
        cancel: &CancellationToken,
    ) -> Result<ArticleOutcome> {
        let Some(page) = fetch_unless_cancelled(self.fetcher, &descriptor.content_url, cancel).await? else {
            return Ok(ArticleOutcome::Cancelled);
        };

        let Some(title) = extract_title(&page.text()) else {
            warn!(
                preview = %truncate_for_log(&page.text(), 200),
                "No title in article page; skipping"
            );
            return Ok(ArticleOutcome::Skipped {
                content_url: descriptor.content_url.clone(),
            });
        };
        info!(%title, "Found article");

        let cover = self.fetch_cover(&descriptor.cover_url, cancel).await;
        if cancel.is_cancelled() {
            debug!("Cancelled before writing");
            return Ok(ArticleOutcome::Cancelled);
        }

        let record = ArticleRecord {
            title: title.clone(),
            body: page.body,
            cover,
        };
        let (dir, cover_saved) = self.persist(record).await?;
        Ok(ArticleOutcome::Saved {
            title,
            dir,
            cover_saved,
        })
    }

    /// Write a fetched article under `R/K/T/`. Returns the directory and
    /// whether a cover was written.
    pub async fn persist(&self, record: ArticleRecord) -> Result<(PathBuf, bool)> {
        let dir = self.store.article_dir(self.keyword, &record.title);
        self.store.ensure_dir(&dir).await?;

        let mut cover_saved = false;
        if let Some(cover) = record.cover {
            match self.store.write_atomic(&dir.join(COVER_FILE), cover).await {
                Ok(()) => cover_saved = true,
                Err(e) => warn!(error = %e, "Failed to write cover"),
            }
        }

        self.store
            .write_atomic(&dir.join(ARTICLE_FILE), record.body)
            .await?;
        info!(dir = %dir.display(), cover_saved, "Saved article");
        Ok((dir, cover_saved))
    }

    async fn fetch_cover(&self, url: &str, cancel: &CancellationToken) -> Option<Vec<u8>> {
        if url.is_empty() {
            warn!("Article has no cover URL");
            return None;
        }
        match fetch_unless_cancelled(self.fetcher, url, cancel).await {
            Ok(fetched) => fetched.map(|f| f.body),
            Err(e) => {
                warn!(cover_url = %url, error = %e, "Cover fetch failed; saving article without it");
                None
            }
        }
    }
}
