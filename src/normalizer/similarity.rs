use std::collections::HashSet;

use strsim::normalized_levenshtein;

use super::UrlParts;

const HOST_WEIGHT: f64 = 0.4;
const PATH_WEIGHT: f64 = 0.4;
const QUERY_WEIGHT: f64 = 0.2;

/// Segments below this similarity earn no credit.
const SEGMENT_MATCH_THRESHOLD: f64 = 0.7;

pub const DEFAULT_DUPLICATE_THRESHOLD: f64 = 0.9;

pub(crate) fn weighted(a: &UrlParts, b: &UrlParts) -> f64 {
    let host = if a.host == b.host { 1.0 } else { 0.0 };
    let path = path_similarity(&a.segments, &b.segments);
    let query = query_overlap(&a.query, &b.query);
    (HOST_WEIGHT * host + PATH_WEIGHT * path + QUERY_WEIGHT * query).clamp(0.0, 1.0)
}

fn path_similarity(a: &[String], b: &[String]) -> f64 {
    let longest = a.len().max(b.len());
    if longest == 0 {
        return 1.0;
    }
    let credit: f64 = a
        .iter()
        .zip(b)
        .map(|(x, y)| segment_similarity(x, y))
        .filter(|s| *s >= SEGMENT_MATCH_THRESHOLD)
        .sum();
    credit / longest as f64
}

fn query_overlap(a: &[String], b: &[String]) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    let a: HashSet<&String> = a.iter().collect();
    let b: HashSet<&String> = b.iter().collect();
    let union = a.union(&b).count();
    let shared = a.intersection(&b).count();
    shared as f64 / union as f64
}

/// Normalized Levenshtein similarity over chars, 1.0 for two empty segments.
pub fn segment_similarity(a: &str, b: &str) -> f64 {
    normalized_levenshtein(a, b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_segment_similarity() {
        assert_eq!(segment_similarity("", ""), 1.0);
        assert_eq!(segment_similarity("abcd", "abcd"), 1.0);
        assert_eq!(segment_similarity("abcd", "wxyz"), 0.0);
        assert!((segment_similarity("高尔夫", "高尔") - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_partial_path_credit() {
        let a = UrlParts::split("https://golf.com/news/tiger-returns");
        let b = UrlParts::split("https://golf.com/news/tiger-return");
        let c = UrlParts::split("https://golf.com/news/zzz");
        let close = weighted(&a, &b);
        let far = weighted(&a, &c);
        assert!(close > far);
        // host + query agree, "news" matches, the slug differs by one char
        assert!(close > 0.95);
        assert!((far - 0.8).abs() < 1e-9);
    }

    #[test]
    fn test_query_overlap() {
        let a = UrlParts::split("https://site.com/a?page=1&sort=new");
        let b = UrlParts::split("https://site.com/a?page=1");
        let s = weighted(&a, &b);
        assert!((s - (0.4 + 0.4 + 0.2 * 0.5)).abs() < 1e-9);
    }
}
