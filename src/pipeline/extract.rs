//! Minimal article extraction: a title and the main body fragment.

use std::sync::LazyLock;

use html_escape::{decode_html_entities, encode_double_quoted_attribute, encode_text};
use regex::Regex;

use crate::history::source_marker;

static OG_TITLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)<meta\s[^>]*property\s*=\s*["']og:title["'][^>]*content\s*=\s*["']([^"']*)["']"#)
        .expect("invalid og:title pattern")
});
static TITLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<title[^>]*>(.*?)</title>").expect("invalid title pattern"));
static H1: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<h1[^>]*>(.*?)</h1>").expect("invalid h1 pattern"));
static ARTICLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<article[^>]*>(.*)</article>").expect("invalid article pattern")
});
static BODY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<body[^>]*>(.*)</body>").expect("invalid body pattern"));
static NOISE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<(script|style|noscript|nav|header|footer|aside)\b[^>]*>.*?</(script|style|noscript|nav|header|footer|aside)>")
        .expect("invalid noise pattern")
});
static TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)<[^>]*>").expect("invalid tag pattern"));
static SPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("invalid space pattern"));

#[derive(Debug, Clone, PartialEq)]
pub struct Article {
    pub title: Option<String>,
    pub body_html: String,
    pub text: String,
}

impl Article {
    /// Length of the visible text, in characters.
    pub fn text_len(&self) -> usize {
        self.text.chars().count()
    }
}

pub fn extract(html: &str) -> Article {
    let title = [&*OG_TITLE, &*TITLE, &*H1]
        .iter()
        .find_map(|re| re.captures(html).map(|c| plain_text(&c[1])))
        .filter(|t| !t.is_empty());

    let fragment = ARTICLE
        .captures(html)
        .or_else(|| BODY.captures(html))
        .and_then(|c| c.get(1))
        .map_or(html, |m| m.as_str());
    let body_html = NOISE.replace_all(fragment, "").trim().to_string();
    let text = plain_text(&body_html);

    Article {
        title,
        body_html,
        text,
    }
}

fn plain_text(html: &str) -> String {
    let stripped = TAG.replace_all(html, " ");
    let decoded = decode_html_entities(&stripped);
    SPACE.replace_all(&decoded, " ").trim().to_string()
}

/// The HTML artifact written for an article. Embeds the source URL both as
/// a comment marker and as a "view original" link.
pub fn render_article(title: &str, body_html: &str, source_url: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html lang=\"zh-CN\">\n<head>\n<meta charset=\"utf-8\">\n<title>{title}</title>\n</head>\n<body>\n{marker}\n<h1>{title}</h1>\n{body}\n<p><a href=\"{href}\">查看原文</a></p>\n</body>\n</html>\n",
        title = encode_text(title),
        marker = source_marker(source_url),
        body = body_html,
        href = encode_double_quoted_attribute(source_url),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::extract_source_url;

    const PAGE: &str = r#"<html><head>
        <meta property="og:title" content="Scheffler wins &amp; celebrates">
        <title>Ignored | Golf.com</title>
        <script>var x = "<p>not text</p>";</script>
        </head><body>
        <nav>Menu Home News</nav>
        <article><h1>Scheffler wins</h1><p>Scottie Scheffler won the Open by four shots.</p></article>
        <footer>Copyright</footer>
        </body></html>"#;

    #[test]
    fn test_extracts_title_and_article_body() {
        let article = extract(PAGE);
        assert_eq!(article.title.as_deref(), Some("Scheffler wins & celebrates"));
        assert!(article.text.contains("won the Open by four shots"));
        assert!(!article.text.contains("Menu"));
        assert!(!article.text.contains("Copyright"));
    }

    #[test]
    fn test_falls_back_to_title_tag_and_body() {
        let article = extract("<html><head><title> A  Title </title></head><body><p>Hello <b>world</b></p></body></html>");
        assert_eq!(article.title.as_deref(), Some("A Title"));
        assert_eq!(article.text, "Hello world");
    }

    #[test]
    fn test_missing_title() {
        let article = extract("<p>no heading here</p>");
        assert_eq!(article.title, None);
        assert_eq!(article.text_len(), "no heading here".len());
    }

    #[test]
    fn test_rendered_artifact_embeds_source() {
        let url = "https://golf.com/news/a?id=1&page=2";
        let html = render_article("A <b> title", "<p>body</p>", url);
        assert!(html.contains("A &lt;b&gt; title"));
        assert_eq!(extract_source_url(&html).as_deref(), Some(url));
    }
}
