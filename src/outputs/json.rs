//! `profile.json` output.
//!
//! One manifest per keyword recording what the homepage looked like at
//! harvest time: the resolved URL, profile fields, and every descriptor mined
//! from it (including ones later skipped).

use crate::error::Result;
use crate::models::{ArticleDescriptor, HomepageRecord, ProfileManifest};
use crate::outputs::store::{PROFILE_FILE, PathStore};
use chrono::Utc;
use std::path::PathBuf;
use tracing::{info, instrument};

/// Write `R/K/profile.json`, replacing any previous manifest atomically.
///
/// The keyword directory must already exist.
#[instrument(level = "info", skip_all, fields(%keyword))]
pub async fn write_profile(
    store: &PathStore,
    keyword: &str,
    homepage: &HomepageRecord,
    articles: &[ArticleDescriptor],
) -> Result<PathBuf> {
    let manifest = ProfileManifest {
        keyword: keyword.to_string(),
        homepage: homepage.clone(),
        articles: articles.to_vec(),
        harvested_at: Utc::now().to_rfc3339(),
    };
    let json = serde_json::to_vec_pretty(&manifest)?;

    let path = store.keyword_dir(keyword).join(PROFILE_FILE);
    store.write_atomic(&path, json).await?;
    info!(path = %path.display(), articles = articles.len(), "Wrote profile manifest");
    Ok(path)
}
