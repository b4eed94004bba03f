use std::sync::LazyLock;

use regex::Regex;

static HREF_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"href\s*=\s*["'](https?://[^"']+)["']"#).expect("href pattern is valid")
});

/// Canonical dedup key: surrounding whitespace and the query string removed.
pub fn normalize_link(link: &str) -> String {
    let trimmed = link.trim();
    let without_query = match trimmed.find('?') {
        Some(idx) => &trimmed[..idx],
        None => trimmed,
    };
    without_query.trim().to_string()
}

/// Every http(s) hyperlink target in `html`, in document order.
pub fn extract_links(html: &str) -> Vec<String> {
    HREF_RE
        .captures_iter(html)
        .filter_map(|cap| cap.get(1))
        .map(|m| m.as_str().to_string())
        .collect()
}
