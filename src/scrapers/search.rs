//! Keyword search and homepage resolution.
//!
//! The search service answers with an HTML page listing matching publishers.
//! The publisher we want is the first anchor whose rendered text equals the
//! keyword byte for byte; its `href` is resolved against the page's final URL.
//!
//! # URL Pattern
//!
//! ```text
//! <search-base>/weixin?type=1&s_from=input&query=<keyword>&ie=utf8&_sug_=n&_sug_type_=
//! ```

use crate::error::{Error, Result};
use ego_tree::NodeId;
use scraper::{Html, Node};
use tracing::{debug, info, instrument, warn};
use url::Url;

/// Build the search URL for `keyword` on the given search host.
pub fn search_url(search_base: &str, keyword: &str) -> String {
    format!(
        "{}/weixin?type=1&s_from=input&query={}&ie=utf8&_sug_=n&_sug_type_=",
        search_base.trim_end_matches('/'),
        urlencoding::encode(keyword)
    )
}

/// Find the homepage URL for `keyword` in a search-results page.
///
/// The document is walked in pre-order with an explicit stack over node ids,
/// so deeply nested input cannot blow the call stack. The first anchor whose
/// descendant text equals `keyword` exactly (no trimming, no case folding)
/// and whose `href` resolves against `base_url` wins; the walk stops there.
///
/// # Errors
///
/// - [`Error::Parse`] if `base_url` is not a valid URL
/// - [`Error::NotFound`] if no anchor matches
#[instrument(level = "info", skip(body), fields(body_bytes = body.len()))]
pub fn resolve_homepage(body: &str, keyword: &str, base_url: &str) -> Result<String> {
    let base = Url::parse(base_url)?;
    let document = Html::parse_document(body);
    let tree = &document.tree;

    let mut stack = vec![tree.root().id()];
    while let Some(id) = stack.pop() {
        let Some(node) = tree.get(id) else {
            continue;
        };

        if let Node::Element(element) = node.value() {
            if element.name() == "a" && anchor_text(&document, id) == keyword {
                match element.attr("href").map(|href| base.join(href)) {
                    Some(Ok(link)) => {
                        info!(homepage = %link, "Resolved homepage");
                        return Ok(link.to_string());
                    }
                    Some(Err(e)) => warn!(error = %e, "Matching anchor has an unusable href; continuing"),
                    None => debug!("Matching anchor has no href; continuing"),
                }
            }
        }

        // Push children last-to-first so the first child is visited next.
        let mut child = node.last_child();
        while let Some(c) = child {
            stack.push(c.id());
            child = c.prev_sibling();
        }
    }

    Err(Error::NotFound(format!("no anchor with text {keyword:?}")))
}

/// Concatenated text of every descendant text node, in document order.
fn anchor_text(document: &Html, id: NodeId) -> String {
    let tree = &document.tree;
    let mut text = String::new();
    let mut stack = vec![id];
    while let Some(id) = stack.pop() {
        let Some(node) = tree.get(id) else {
            continue;
        };
        if let Node::Text(t) = node.value() {
            text.push_str(t);
        }
        let mut child = node.last_child();
        while let Some(c) = child {
            stack.push(c.id());
            child = c.prev_sibling();
        }
    }
    text
}
