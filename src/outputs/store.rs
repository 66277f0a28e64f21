//! Output directory layout and crash-safe file writes.
//!
//! # Layout
//!
//! ```text
//! R/K/header.jpeg        publisher avatar
//! R/K/profile.json       homepage manifest
//! R/K/T/header.jpeg      article cover
//! R/K/T/article.html     raw article markup
//! ```
//!
//! `K` and `T` are passed through [`sanitize_component`] so every path is a
//! pure function of `(root, keyword, title)`.

use crate::error::{Error, Result};
use crate::utils::sanitize_component;
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, instrument};

pub const AVATAR_FILE: &str = "header.jpeg";
pub const COVER_FILE: &str = "header.jpeg";
pub const ARTICLE_FILE: &str = "article.html";
pub const PROFILE_FILE: &str = "profile.json";

/// Filesystem sink rooted at the configured output directory.
#[derive(Debug, Clone)]
pub struct PathStore {
    root: PathBuf,
}

impl PathStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// `R/K`
    pub fn keyword_dir(&self, keyword: &str) -> PathBuf {
        self.root.join(sanitize_component(keyword))
    }

    /// `R/K/T`
    ///
    /// A title naming one of the keyword-level files gets a trailing `_`.
    pub fn article_dir(&self, keyword: &str, title: &str) -> PathBuf {
        let mut name = sanitize_component(title);
        if name == AVATAR_FILE || name == PROFILE_FILE {
            name.push('_');
        }
        self.keyword_dir(keyword).join(name)
    }

    /// Create `path` and its parents. An existing directory is success, also
    /// when another task creates it concurrently.
    #[instrument(level = "debug", skip_all, fields(path = %path.display()))]
    pub async fn ensure_dir(&self, path: &Path) -> Result<()> {
        fs::create_dir_all(path)
            .await
            .map_err(|e| Error::fs(path, e))?;
        debug!("Directory ready");
        Ok(())
    }

    /// Write `bytes` to `path` through a temp file in the same directory.
    ///
    /// The temp file is renamed over `path` only once fully written, so a
    /// crash or cancellation never leaves a half-written file under the final
    /// name. An interrupted write leaves nothing behind: the temp file is
    /// removed on drop.
    #[instrument(level = "debug", skip_all, fields(path = %path.display(), bytes = bytes.len()))]
    pub async fn write_atomic(&self, path: &Path, bytes: Vec<u8>) -> Result<()> {
        let target = path.to_path_buf();
        let dir = target
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.root.clone());

        tokio::task::spawn_blocking(move || -> Result<()> {
            let mut tmp = tempfile::Builder::new()
                .prefix(".partial-")
                .tempfile_in(&dir)
                .map_err(|e| Error::fs(&dir, e))?;
            tmp.write_all(&bytes).map_err(|e| Error::fs(tmp.path(), e))?;
            tmp.as_file().sync_all().map_err(|e| Error::fs(tmp.path(), e))?;
            tmp.persist(&target).map_err(|e| Error::fs(&target, e.error))?;
            Ok(())
        })
        .await
        .map_err(|e| Error::fs(path, std::io::Error::other(e)))??;

        debug!("Wrote file");
        Ok(())
    }
}
