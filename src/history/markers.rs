//! Recovering the source URL embedded in a rendered article.

use std::sync::LazyLock;

use html_escape::decode_html_entities;
use regex::Regex;

/// Link text used by the renderers for "view original".
const LINK_TEXT: &str = r"查看原文|阅读原文|原文链接|view original|read original";

static MARKERS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        // <!-- 原文链接: URL -->
        r"(?i)<!--\s*(?:原文链接|原文地址|source(?:\s*url)?)\s*[:：]\s*(\S+?)\s*-->".to_string(),
        // <a href="URL">查看原文</a>
        format!(
            r#"(?is)<a\s[^>]*?href\s*=\s*["']([^"']+)["'][^>]*>\s*(?:{})\s*</a>"#,
            LINK_TEXT
        ),
        // [查看原文](URL)
        format!(r"(?i)\[\s*(?:{})\s*\]\(\s*<?([^)\s>]+)>?\s*\)", LINK_TEXT),
        // 原文链接: URL
        r#"(?im)(?:原文链接|原文地址|source url|original url)\s*[:：]\s*(https?://[^\s<>"')\]]+)"#.to_string(),
    ]
    .iter()
    .map(|re| Regex::new(re).expect("invalid marker pattern"))
    .collect()
});

/// Embedded source URL, trying the marker forms in order. Renderers put
/// the marker after the body, so the last match of a form wins.
pub fn extract_source_url(content: &str) -> Option<String> {
    MARKERS.iter().find_map(|re| {
        re.captures_iter(content)
            .filter_map(|c| c.get(1))
            .map(|m| decode_html_entities(m.as_str().trim()).to_string())
            .filter(|url| !url.is_empty())
            .last()
    })
}

/// The comment marker renderers should write into every artifact.
pub fn source_marker(url: &str) -> String {
    format!("<!-- 原文链接: {} -->", url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_comment_marker() {
        let html = "<html>\n<!-- 原文链接: https://golf.com/news/a -->\n<body>x</body>";
        assert_eq!(extract_source_url(html).as_deref(), Some("https://golf.com/news/a"));
        assert_eq!(
            extract_source_url(&source_marker("https://golf.com/x?page=2")).as_deref(),
            Some("https://golf.com/x?page=2")
        );
    }

    #[test]
    fn test_anchor_marker() {
        let html = r#"<p><a class="src" href="https://golf.com/a?x=1&amp;page=2" target="_blank">查看原文</a></p>"#;
        assert_eq!(
            extract_source_url(html).as_deref(),
            Some("https://golf.com/a?x=1&page=2")
        );
    }

    #[test]
    fn test_markdown_marker() {
        let md = "# Title\n\nBody text.\n\n[查看原文](https://www.golfmonthly.com/news/b)\n";
        assert_eq!(
            extract_source_url(md).as_deref(),
            Some("https://www.golfmonthly.com/news/b")
        );
    }

    #[test]
    fn test_labeled_text_marker() {
        let md = "**原文链接**\n原文链接：https://golfwrx.com/123/c/\n";
        assert_eq!(extract_source_url(md).as_deref(), Some("https://golfwrx.com/123/c/"));
    }

    #[test]
    fn test_comment_marker_takes_priority() {
        let html = "<!-- 原文链接: https://golf.com/first -->\n[查看原文](https://golf.com/second)";
        assert_eq!(extract_source_url(html).as_deref(), Some("https://golf.com/first"));
    }

    #[test]
    fn test_credit_link_before_marker_is_ignored() {
        let md = "# Rory wins\n\nPhoto: [Source](https://www.instagram.com/p/abc)\n\nBody.\n\n\
                  [查看原文](https://golf.com/news/rory-wins)\n";
        assert_eq!(
            extract_source_url(md).as_deref(),
            Some("https://golf.com/news/rory-wins")
        );
    }

    #[test]
    fn test_last_link_marker_wins() {
        let html = r#"<a href="https://golf.com/related">阅读原文</a><p>body</p><a href="https://golf.com/story">查看原文</a>"#;
        assert_eq!(extract_source_url(html).as_deref(), Some("https://golf.com/story"));
    }

    #[test]
    fn test_no_marker() {
        assert_eq!(extract_source_url("<p>just an article</p>"), None);
    }
}
