//! Publisher homepage mining.
//!
//! The homepage is a regular HTML page with a profile header and an article
//! list embedded as JSON-looking key/value pairs inside a script block. The
//! list is not guaranteed to be well-formed JSON, so it is scanned with text
//! patterns rather than parsed.
//!
//! Extraction is split in two:
//! - a [`MiningStrategy`] lifts raw strings out of the markup
//! - [`mine_homepage`] cleans and absolutises them against the homepage URL
//!
//! Swapping the pattern set only means providing another strategy.

use crate::error::Result;
use crate::models::{ArticleDescriptor, HomepageRecord};
use crate::utils::{absolutize, truncate_for_log, unescape_amp};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, info, instrument, warn};
use url::Url;

/// Bytes after a content-URL field searched for its cover field.
pub const LOOKAHEAD_WINDOW: usize = 2048;

/// Largest window a configuration may ask for.
pub const MAX_LOOKAHEAD_WINDOW: usize = 1 << 20;

const CONTENT_URL_MARKER: &str = r#""content_url":""#;

static ACCOUNT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"<p\s*?class="profile_account">微信号[:：]\s*(.*?)</p>"#).expect("account pattern")
});

static AVATAR_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#""radius_avatar profile_avatar">\s*?<img.*?src="(.*?)""#).expect("avatar pattern")
});

static CONTENT_URL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#""content_url":"(.*?)""#).expect("content_url pattern"));

static COVER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#""cover":"(.*?)""#).expect("cover pattern"));

/// A content/cover pair exactly as it appears in the markup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawArticle {
    pub content_url: String,
    pub cover_url: String,
}

/// Output of one article scan.
#[derive(Debug, Default)]
pub struct ArticleScan {
    /// Pairs in document order.
    pub articles: Vec<RawArticle>,
    /// Content-URL fields with no cover field inside their window.
    pub malformed: usize,
}

/// Pulls profile fields and article pairs out of raw homepage text.
///
/// Each method is an independent pass over the whole body; none of them
/// fails, absence is reported as `None` or an empty scan.
pub trait MiningStrategy: Send + Sync {
    fn account_id(&self, body: &str) -> Option<String>;
    fn avatar_url(&self, body: &str) -> Option<String>;
    fn articles(&self, body: &str) -> ArticleScan;
}

/// The pattern set for the profile pages served today.
///
/// An article is a `"content_url":"…"` field followed by a `"cover":"…"`
/// field within [`LOOKAHEAD_WINDOW`] bytes. The window also ends at the next
/// content-URL field, so a group missing its cover never borrows the cover of
/// the following group; it is counted as malformed instead.
#[derive(Debug, Clone)]
pub struct PatternStrategy {
    window: usize,
}

impl Default for PatternStrategy {
    fn default() -> Self {
        Self {
            window: LOOKAHEAD_WINDOW,
        }
    }
}

impl PatternStrategy {
    pub fn with_window(window: usize) -> Self {
        Self { window }
    }
}

impl MiningStrategy for PatternStrategy {
    fn account_id(&self, body: &str) -> Option<String> {
        ACCOUNT_RE
            .captures(body)
            .map(|c| c[1].trim().to_string())
            .filter(|id| !id.is_empty())
    }

    fn avatar_url(&self, body: &str) -> Option<String> {
        AVATAR_RE
            .captures(body)
            .map(|c| c[1].to_string())
            .filter(|url| !url.is_empty())
    }

    fn articles(&self, body: &str) -> ArticleScan {
        let mut scan = ArticleScan::default();
        let mut pos = 0;

        while let Some(caps) = CONTENT_URL_RE.captures_at(body, pos) {
            let field_end = caps.get(0).map_or(pos, |m| m.end());
            let content_url = caps[1].to_string();

            let mut window_end = field_end.saturating_add(self.window).min(body.len());
            while !body.is_char_boundary(window_end) {
                window_end -= 1;
            }
            let mut window = &body[field_end..window_end];
            if let Some(next) = window.find(CONTENT_URL_MARKER) {
                window = &window[..next];
            }

            match COVER_RE.captures(window) {
                Some(cover) => {
                    let cover_end = cover.get(0).map_or(0, |m| m.end());
                    scan.articles.push(RawArticle {
                        content_url,
                        cover_url: cover[1].to_string(),
                    });
                    pos = field_end + cover_end;
                }
                None => {
                    debug!(
                        content_url = %truncate_for_log(&content_url, 120),
                        "content_url without cover in window"
                    );
                    scan.malformed += 1;
                    pos = field_end;
                }
            }
        }

        scan
    }
}

/// A mined homepage.
#[derive(Debug)]
pub struct MinedHomepage {
    pub record: HomepageRecord,
    /// Descriptors in document order; may be empty.
    pub articles: Vec<ArticleDescriptor>,
    pub malformed: usize,
}

/// Mine a homepage body for profile fields and article descriptors.
///
/// Content and cover URLs lose their `amp;` escaping and JSON `\/` escaping,
/// then anything not starting with `http` is made absolute on the homepage's
/// scheme and host. Missing profile fields are logged and left as `None`.
///
/// # Errors
///
/// [`Error::Parse`](crate::error::Error::Parse) if `homepage_url` is not a URL.
#[instrument(level = "info", skip(body, strategy), fields(body_bytes = body.len()))]
pub fn mine_homepage(
    body: &str,
    homepage_url: &str,
    strategy: &dyn MiningStrategy,
) -> Result<MinedHomepage> {
    let page = Url::parse(homepage_url)?;
    let mut record = HomepageRecord::new(homepage_url);

    record.account_id = strategy.account_id(body);
    match &record.account_id {
        Some(account) => info!(%account, "Found account"),
        None => warn!("No account id on homepage"),
    }

    record.avatar_url = strategy.avatar_url(body).map(|raw| clean_url(&raw, &page));
    if record.avatar_url.is_none() {
        warn!("No avatar on homepage");
    }

    let scan = strategy.articles(body);
    let articles: Vec<ArticleDescriptor> = scan
        .articles
        .into_iter()
        .map(|raw| ArticleDescriptor {
            content_url: clean_url(&raw.content_url, &page),
            cover_url: clean_url(&raw.cover_url, &page),
        })
        .collect();

    if scan.malformed > 0 {
        warn!(malformed = scan.malformed, "Dropped article fragments without a cover field");
    }
    info!(count = articles.len(), "Mined article descriptors");

    Ok(MinedHomepage {
        record,
        articles,
        malformed: scan.malformed,
    })
}

fn clean_url(raw: &str, page: &Url) -> String {
    let unescaped = unescape_amp(raw).replace("\\/", "/");
    if unescaped.is_empty() {
        return unescaped;
    }
    absolutize(&unescaped, page)
}
