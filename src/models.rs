//! Data models passed between the pipeline stages.
//!
//! Every record lives for a single pipeline pass; the filesystem is the only
//! durable state:
//! - [`HomepageRecord`]: the publisher homepage plus optional profile fields
//! - [`ArticleDescriptor`]: one article as listed on the homepage
//! - [`ArticleRecord`]: a fetched article ready to be written out
//! - [`ProfileManifest`]: what gets serialized to `profile.json`
//! - [`RunSummary`]: per-run counters reported at the end

use serde::{Deserialize, Serialize};

/// The publisher homepage found through the keyword search.
///
/// `account_id` and `avatar_url` stay `None` when the homepage does not carry
/// the expected fragments; that is not an error.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct HomepageRecord {
    /// Absolute homepage URL.
    pub url: String,
    /// Free-text account identifier shown on the profile.
    pub account_id: Option<String>,
    /// Absolute URL of the publisher avatar.
    pub avatar_url: Option<String>,
}

impl HomepageRecord {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            account_id: None,
            avatar_url: None,
        }
    }
}

/// One article listed on a homepage, in order of appearance.
///
/// Duplicates are possible and are processed independently.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ArticleDescriptor {
    /// Absolute, unescaped address of the article body.
    pub content_url: String,
    /// Address of the cover image.
    pub cover_url: String,
}

/// A fetched article. `title` is never empty.
#[derive(Debug)]
pub struct ArticleRecord {
    pub title: String,
    pub body: Vec<u8>,
    /// `None` when the cover could not be fetched.
    pub cover: Option<Vec<u8>>,
}

/// Contents of `R/K/profile.json`.
#[derive(Debug, Deserialize, Serialize)]
pub struct ProfileManifest {
    pub keyword: String,
    pub homepage: HomepageRecord,
    pub articles: Vec<ArticleDescriptor>,
    /// RFC 3339 timestamp of the harvest.
    pub harvested_at: String,
}

/// Counters for one keyword run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    /// Descriptors mined from the homepage.
    pub discovered: usize,
    pub saved: usize,
    /// Articles without a usable title.
    pub skipped: usize,
    pub failed: usize,
    /// Content-URL fields with no cover field in their lookahead window.
    pub malformed: usize,
    /// Descriptors never started because the run was cancelled.
    pub cancelled: usize,
}
