//! URL canonicalization.
//!
//! Two URLs that point at the same article must produce the same
//! [`NormalizedUrl`], whatever tracking parameters, `www.` prefixes or
//! trailing slashes they carry. Normalization never fails: input the `url`
//! crate cannot parse goes through a plain string transform instead.

mod similarity;

use url::form_urlencoded;
use url::Url;

use crate::domain::NormalizedUrl;

pub use similarity::{segment_similarity, DEFAULT_DUPLICATE_THRESHOLD};

/// Mobile/AMP hosts that serve the same articles as their main site.
const HOST_ALIASES: &[(&str, &str)] = &[
    ("m.golf.com", "golf.com"),
    ("amp.golf.com", "golf.com"),
    ("m.golfdigest.com", "golfdigest.com"),
    ("mobile.golfdigest.com", "golfdigest.com"),
    ("amp.golfmonthly.com", "golfmonthly.com"),
    ("m.golfmonthly.com", "golfmonthly.com"),
    ("amp.golfwrx.com", "golfwrx.com"),
    ("m.golfwrx.com", "golfwrx.com"),
    ("m.golfweek.usatoday.com", "golfweek.usatoday.com"),
    ("m.todays-golfer.com", "todays-golfer.com"),
    ("m.nationalclubgolfer.com", "nationalclubgolfer.com"),
    ("m.pgatour.com", "pgatour.com"),
    ("m.skysports.com", "skysports.com"),
    ("m.bbc.co.uk", "bbc.co.uk"),
    ("m.espn.com", "espn.com"),
];

const TRACKING_PARAMS: &[&str] = &[
    "gclid",
    "fbclid",
    "msclkid",
    "dclid",
    "ref",
    "ref_src",
    "src",
    "source",
    "_",
    "t",
    "ts",
    "timestamp",
    "cache",
    "cb",
    "sessionid",
    "session_id",
    "sid",
    "phpsessid",
    "jsessionid",
    "share",
    "mc_cid",
    "mc_eid",
    "_ga",
    "_gl",
    "igshid",
    "cmpid",
    "ito",
];

const TRACKING_PREFIXES: &[&str] = &["utm_", "pk_", "hsa_"];

/// Parameters that select content and are kept even if a tracking rule
/// would match them.
const CONTENT_PARAMS: &[&str] = &[
    "page", "p", "sort", "id", "slug", "category", "cat", "tag", "article", "post",
];

const INDEX_FILES: &[&str] = &[
    "index.html",
    "index.htm",
    "index.php",
    "index.asp",
    "index.aspx",
    "default.aspx",
    "default.asp",
];

#[derive(Debug, Clone, Default)]
pub struct UrlNormalizer;

impl UrlNormalizer {
    pub fn new() -> Self {
        Self
    }

    /// Canonical key for `raw`. Pure and idempotent.
    pub fn normalize(&self, raw: &str) -> NormalizedUrl {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return NormalizedUrl::from_normalized(String::new());
        }

        match Self::normalize_parsed(trimmed) {
            Ok(normalized) => NormalizedUrl::from_normalized(normalized),
            Err(e) => {
                tracing::warn!(url = %trimmed, error = %e, "URL normalization fell back to string transform");
                NormalizedUrl::from_normalized(Self::fallback(trimmed))
            }
        }
    }

    /// Weighted similarity in `[0, 1]`: host 0.4, path 0.4, query 0.2.
    ///
    /// Only meant for fuzzy duplicate reporting. Equality of
    /// [`normalize`](Self::normalize) output is the authoritative check.
    pub fn similarity(&self, a: &str, b: &str) -> f64 {
        let a = self.normalize(a);
        let b = self.normalize(b);
        if a == b {
            return 1.0;
        }
        similarity::weighted(&UrlParts::split(a.as_str()), &UrlParts::split(b.as_str()))
    }

    pub fn is_probable_duplicate(&self, a: &str, b: &str, threshold: f64) -> bool {
        self.similarity(a, b) >= threshold
    }

    /// Host of the normalized URL, used as the source website label.
    pub fn website(&self, raw: &str) -> String {
        let normalized = self.normalize(raw);
        match normalized.host() {
            "" => "unknown".to_string(),
            host => host.to_string(),
        }
    }

    fn normalize_parsed(input: &str) -> Result<String, url::ParseError> {
        let with_scheme = if input.contains("://") {
            input.to_string()
        } else if let Some(rest) = input.strip_prefix("//") {
            format!("https://{}", rest)
        } else {
            format!("https://{}", input)
        };

        let url = Url::parse(&with_scheme)?;
        let host = url
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or(url::ParseError::EmptyHost)?;

        let host = Self::canonical_host(host);
        let port = url
            .port()
            .filter(|p| *p != 80 && *p != 443)
            .map(|p| format!(":{}", p))
            .unwrap_or_default();
        let path = Self::canonical_path(url.path());
        let query = Self::canonical_query(&url);

        let mut out = format!("https://{}{}{}", host, port, path);
        if !query.is_empty() {
            out.push('?');
            out.push_str(&query);
        }
        Ok(out)
    }

    fn canonical_host(host: &str) -> String {
        let mut host = host.trim_end_matches('.').to_lowercase();
        while let Some(stripped) = host.strip_prefix("www.") {
            host = stripped.to_string();
        }
        HOST_ALIASES
            .iter()
            .find(|(alias, _)| *alias == host)
            .map(|(_, canonical)| canonical.to_string())
            .unwrap_or(host)
    }

    fn canonical_path(path: &str) -> String {
        let lowered = path.to_lowercase();
        let mut segments: Vec<&str> = lowered.split('/').filter(|s| !s.is_empty()).collect();
        if segments
            .last()
            .is_some_and(|last| INDEX_FILES.contains(last))
        {
            segments.pop();
        }
        format!("/{}", segments.join("/"))
    }

    fn canonical_query(url: &Url) -> String {
        let mut pairs: Vec<(String, String)> = url
            .query_pairs()
            .filter(|(k, _)| !k.is_empty())
            .map(|(k, v)| (k.to_lowercase(), v.into_owned()))
            .filter(|(k, _)| !is_tracking_param(k))
            .collect();
        if pairs.is_empty() {
            return String::new();
        }
        pairs.sort();
        pairs.dedup();

        form_urlencoded::Serializer::new(String::new())
            .extend_pairs(pairs.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .finish()
    }

    fn fallback(input: &str) -> String {
        let lowered = input.to_lowercase();
        let mut rest = lowered.as_str();
        for scheme in ["https://", "http://", "//"] {
            if let Some(stripped) = rest.strip_prefix(scheme) {
                rest = stripped;
                break;
            }
        }
        while let Some(stripped) = rest.strip_prefix("www.") {
            rest = stripped;
        }
        if let Some(idx) = rest.find('#') {
            rest = &rest[..idx];
        }
        let rest = rest.trim_end_matches('/');
        format!("https://{}", rest)
    }
}

fn is_tracking_param(key: &str) -> bool {
    if CONTENT_PARAMS.contains(&key) {
        return false;
    }
    TRACKING_PARAMS.contains(&key) || TRACKING_PREFIXES.iter().any(|p| key.starts_with(p))
}

/// Host, path segments and query pairs of an already-normalized URL.
pub(crate) struct UrlParts {
    pub host: String,
    pub segments: Vec<String>,
    pub query: Vec<String>,
}

impl UrlParts {
    pub fn split(normalized: &str) -> Self {
        let rest = normalized.strip_prefix("https://").unwrap_or(normalized);
        let (before_query, query) = match rest.split_once('?') {
            Some((b, q)) => (b, q),
            None => (rest, ""),
        };
        let (host, path) = match before_query.find('/') {
            Some(idx) => (&before_query[..idx], &before_query[idx..]),
            None => (before_query, ""),
        };
        Self {
            host: host.to_string(),
            segments: path
                .split('/')
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect(),
            query: query
                .split('&')
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn n(url: &str) -> String {
        UrlNormalizer::new().normalize(url).to_string()
    }

    #[test]
    fn test_equivalent_urls() {
        assert_eq!(
            n("https://WWW.Golf.com/News/Foo/?utm_source=x"),
            n("https://golf.com/news/foo")
        );
        assert_eq!(n("https://golf.com/news/foo"), "https://golf.com/news/foo");
    }

    #[test]
    fn test_content_params_preserved() {
        assert_eq!(n("https://site.com/list?page=2"), "https://site.com/list?page=2");
        assert_eq!(n("https://site.com/a?utm_campaign=y"), "https://site.com/a");
    }

    #[test]
    fn test_unknown_params_kept_and_sorted() {
        assert_eq!(
            n("https://site.com/a?zeta=1&fbclid=abc&alpha=2"),
            "https://site.com/a?alpha=2&zeta=1"
        );
    }

    #[test]
    fn test_idempotent() {
        let inputs = [
            "https://WWW.Golf.com/News/Foo/?utm_source=x",
            "http://www.www.golfdigest.com//story//tiger-woods/index.html#comments",
            "golfmonthly.com/news?page=3&ref=home",
            "https://m.golf.com/news/a%20b?q=hello world",
            "https://site.com:8443/A/?id=7",
            "not a url at all",
            "https://exa mple.com/x/",
        ];
        let normalizer = UrlNormalizer::new();
        for input in inputs {
            let once = normalizer.normalize(input);
            let twice = normalizer.normalize(once.as_str());
            assert_eq!(once, twice, "not idempotent for {input}");
        }
    }

    #[test]
    fn test_scheme_defaulted() {
        assert_eq!(n("golf.com/news/foo"), "https://golf.com/news/foo");
        assert_eq!(n("//golf.com/news/foo"), "https://golf.com/news/foo");
        assert_eq!(n("http://golf.com/news/foo"), "https://golf.com/news/foo");
    }

    #[test]
    fn test_host_aliases() {
        assert_eq!(n("https://m.golf.com/news/foo"), "https://golf.com/news/foo");
        assert_eq!(
            n("https://amp.golfmonthly.com/tips/putting"),
            "https://golfmonthly.com/tips/putting"
        );
    }

    #[test]
    fn test_path_cleanup() {
        assert_eq!(n("https://golf.com//news///foo/"), "https://golf.com/news/foo");
        assert_eq!(n("https://golf.com/news/index.html"), "https://golf.com/news");
        assert_eq!(n("https://golf.com/"), "https://golf.com/");
        assert_eq!(n("https://golf.com"), "https://golf.com/");
    }

    #[test]
    fn test_fragment_dropped() {
        assert_eq!(n("https://golf.com/a#section-2"), "https://golf.com/a");
    }

    #[test]
    fn test_port_kept() {
        assert_eq!(n("https://site.com:8443/a"), "https://site.com:8443/a");
        assert_eq!(n("https://site.com:443/a"), "https://site.com/a");
    }

    #[test]
    fn test_malformed_input_falls_back() {
        assert_eq!(n("HTTPS://Exa Mple.com/x/#frag"), "https://exa mple.com/x");
        assert_eq!(n("   "), "");
    }

    #[test]
    fn test_website() {
        let normalizer = UrlNormalizer::new();
        assert_eq!(
            normalizer.website("https://www.golfwrx.com/123/story/"),
            "golfwrx.com"
        );
    }

    #[test]
    fn test_similarity_bounds() {
        let normalizer = UrlNormalizer::new();
        assert_eq!(
            normalizer.similarity("https://golf.com/a?utm_source=x", "https://www.golf.com/a/"),
            1.0
        );
        let s = normalizer.similarity("https://golf.com/news/a", "https://other.org/x/y/z?k=v");
        assert!((0.0..=1.0).contains(&s));
        assert!(s < 0.5);
    }

    #[test]
    fn test_similar_slugs_are_probable_duplicates() {
        let normalizer = UrlNormalizer::new();
        assert!(normalizer.is_probable_duplicate(
            "https://golf.com/news/rory-mcilroy-wins-open",
            "https://golf.com/news/rory-mcilroy-wins-opens",
            DEFAULT_DUPLICATE_THRESHOLD,
        ));
        assert!(!normalizer.is_probable_duplicate(
            "https://golf.com/news/rory-mcilroy-wins-open",
            "https://golf.com/gear/best-drivers-2025",
            DEFAULT_DUPLICATE_THRESHOLD,
        ));
    }
}
