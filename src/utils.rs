//! Helpers shared across the pipeline stages.
//!
//! - String truncation for log previews
//! - Turning keywords and titles into single safe path components
//! - Unescaping and absolutising URLs lifted out of raw markup

/// Truncate a string for logging purposes.
///
/// Long strings are cut to at most `max` bytes (on a char boundary) with an
/// ellipsis and byte count indicator appended.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(truncate_for_log("short", 100), "short");
/// assert_eq!(truncate_for_log("a".repeat(500), 10), "aaaaaaaaaa…(+490 bytes)");
/// ```
pub fn truncate_for_log(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut cut = max;
    while !s.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}…(+{} bytes)", &s[..cut], s.len() - cut)
}

/// Longest file name most filesystems accept, in bytes.
pub const MAX_COMPONENT_BYTES: usize = 255;

/// Map a keyword or article title onto one path component.
///
/// Separators and NUL become `_`, and `.`/`..` become `_`, so the result can
/// never escape its parent directory. Long names are cut to
/// [`MAX_COMPONENT_BYTES`] on a char boundary. The mapping is deterministic:
/// the same input always lands on the same directory.
pub fn sanitize_component(raw: &str) -> String {
    let mut cleaned: String = raw
        .chars()
        .map(|c| match c {
            '/' | '\\' | '\0' => '_',
            c => c,
        })
        .collect();
    if cleaned.len() > MAX_COMPONENT_BYTES {
        let mut cut = MAX_COMPONENT_BYTES;
        while !cleaned.is_char_boundary(cut) {
            cut -= 1;
        }
        cleaned.truncate(cut);
    }
    match cleaned.as_str() {
        "" | "." | ".." => "_".to_string(),
        _ => cleaned,
    }
}

/// Strip every `amp;` left behind by HTML-escaped ampersands.
///
/// Pages sometimes escape twice (`&amp;amp;`), so all occurrences go.
pub fn unescape_amp(raw: &str) -> String {
    raw.replace("amp;", "")
}

/// Make a URL lifted from a page absolute.
///
/// Anything starting with `http` is returned verbatim. Protocol-relative
/// URLs (`//host/x`) borrow the page scheme; everything else is treated as a
/// path on the page's scheme and host.
pub fn absolutize(raw: &str, page: &url::Url) -> String {
    if raw.starts_with("http") {
        return raw.to_string();
    }
    if let Some(rest) = raw.strip_prefix("//") {
        return format!("{}://{}", page.scheme(), rest);
    }
    let origin = &page[..url::Position::BeforePath];
    if raw.starts_with('/') {
        format!("{origin}{raw}")
    } else {
        format!("{origin}/{raw}")
    }
}
