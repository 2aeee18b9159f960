//! Failure taxonomy.
//!
//! Errors raised inside this crate carry a structured
//! [`FailureCategory`]. Free-text reasons from older ledgers or other tools
//! go through an ordered regex table instead: permanent patterns first,
//! then retryable ones, then the staleness rule, and finally a retryable
//! `unknown` default.

pub mod filter;

use std::sync::LazyLock;

use chrono::{DateTime, Duration, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::domain::{FailureCategory, FailureKind};

pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_STALE_AFTER_DAYS: i64 = 7;

/// Retry policy shared by the classifier, collector and pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Attempts after which a retryable failure becomes permanent (default: 3)
    pub max_retries: u32,
    /// Days without a successful attempt before a failure is stale (default: 7)
    pub stale_after_days: i64,
    /// Seconds before a `processing` entry is treated as abandoned (default: 3600)
    pub processing_lease_secs: i64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            stale_after_days: DEFAULT_STALE_AFTER_DAYS,
            processing_lease_secs: crate::collector::DEFAULT_PROCESSING_LEASE_SECS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    pub kind: FailureKind,
    pub category: FailureCategory,
    pub description: String,
}

impl Classification {
    fn of(category: FailureCategory) -> Self {
        Self {
            kind: if category.is_permanent() {
                FailureKind::Permanent
            } else {
                FailureKind::Retryable
            },
            category,
            description: category.description().to_string(),
        }
    }

    pub fn is_permanent(&self) -> bool {
        self.kind == FailureKind::Permanent
    }
}

struct Pattern {
    regex: Regex,
    category: FailureCategory,
}

fn patterns(table: &[(&str, FailureCategory)]) -> Vec<Pattern> {
    table
        .iter()
        .map(|(re, category)| Pattern {
            regex: Regex::new(re).expect("invalid failure pattern"),
            category: *category,
        })
        .collect()
}

static PERMANENT_PATTERNS: LazyLock<Vec<Pattern>> = LazyLock::new(|| {
    patterns(&[
        (r"(?i)\b404\b|page not found|http not found", FailureCategory::NotFound),
        (r"(?i)\b403\b|forbidden|access denied", FailureCategory::Forbidden),
        (r"(?i)\b410\b|\bgone\b", FailureCategory::Gone),
        (
            r"(?i)\blive\b|live[- ]?blog|直播|\bvideo\b|视频|\bgallery\b|图集|\bpodcast\b",
            FailureCategory::NonArticleContent,
        ),
        (
            r"(?i)is not a function|is not defined|cannot read propert|undefined method|typeerror|referenceerror|syntaxerror",
            FailureCategory::CodeDefect,
        ),
        (
            r"(?i)content too short|内容过短|内容太短|empty content",
            FailureCategory::InvalidContent,
        ),
        (
            r"(?i)missing title|no title|title missing|标题缺失|无标题",
            FailureCategory::MissingTitle,
        ),
    ])
});

static RETRYABLE_PATTERNS: LazyLock<Vec<Pattern>> = LazyLock::new(|| {
    patterns(&[
        (r"(?i)timeout|timed out|etimedout|超时", FailureCategory::Timeout),
        (
            r"(?i)econnrefused|econnreset|enotfound|socket hang up|connection (refused|reset)|network",
            FailureCategory::Network,
        ),
        (r"(?i)rewrite|改写失败|改写", FailureCategory::RewriteFailed),
    ])
});

#[derive(Debug, Clone)]
pub struct FailureClassifier {
    stale_after: Duration,
}

impl Default for FailureClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl FailureClassifier {
    pub fn new() -> Self {
        Self::with_stale_after(Duration::days(DEFAULT_STALE_AFTER_DAYS))
    }

    pub fn with_stale_after(stale_after: Duration) -> Self {
        Self { stale_after }
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        Self::with_stale_after(Duration::days(config.stale_after_days))
    }

    /// Classify a free-text failure reason as of now.
    pub fn classify(
        &self,
        reason: &str,
        attempt_count: u32,
        last_attempt: Option<DateTime<Utc>>,
    ) -> Classification {
        self.classify_at(reason, attempt_count, last_attempt, Utc::now())
    }

    /// Classify as of `now`. Same inputs, same answer.
    ///
    /// `attempt_count` does not affect the result; escalation after too
    /// many attempts is the caller's job (see [`needs_escalation`]).
    pub fn classify_at(
        &self,
        reason: &str,
        _attempt_count: u32,
        last_attempt: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Classification {
        if let Some(category) = first_match(&PERMANENT_PATTERNS, reason) {
            return Classification::of(category);
        }
        if let Some(category) = first_match(&RETRYABLE_PATTERNS, reason) {
            return Classification::of(category);
        }
        if let Some(last) = last_attempt {
            if now.signed_duration_since(last) > self.stale_after {
                return Classification::of(FailureCategory::Stale);
            }
        }
        Classification::of(FailureCategory::Unknown)
    }

    /// Classify a structured failure kind.
    pub fn classify_category(&self, category: FailureCategory) -> Classification {
        Classification::of(category)
    }
}

fn first_match(table: &[Pattern], reason: &str) -> Option<FailureCategory> {
    table
        .iter()
        .find(|p| p.regex.is_match(reason))
        .map(|p| p.category)
}

/// True once `attempt_count` has reached `max_retries`; the record should
/// then be upgraded to permanently failed with category `max_retries`.
pub fn needs_escalation(attempt_count: u32, max_retries: u32) -> bool {
    attempt_count >= max_retries
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classify(reason: &str) -> Classification {
        FailureClassifier::new().classify_at(reason, 1, None, Utc::now())
    }

    #[test]
    fn test_http_status_patterns() {
        assert_eq!(classify("HTTP 404 Not Found").category, FailureCategory::NotFound);
        assert_eq!(classify("Request failed with status 403").category, FailureCategory::Forbidden);
        assert_eq!(classify("HTTP 410").category, FailureCategory::Gone);
        assert!(classify("HTTP 404").is_permanent());
    }

    #[test]
    fn test_content_patterns() {
        assert_eq!(
            classify("Skipped: LIVE coverage page").category,
            FailureCategory::NonArticleContent
        );
        assert_eq!(classify("文章内容过短").category, FailureCategory::InvalidContent);
        assert_eq!(classify("Content too short (120 chars)").category, FailureCategory::InvalidContent);
        assert_eq!(classify("missing title").category, FailureCategory::MissingTitle);
    }

    #[test]
    fn test_code_defect_signatures() {
        let c = classify("TypeError: page.$eval is not a function");
        assert_eq!(c.category, FailureCategory::CodeDefect);
        assert_eq!(c.kind, FailureKind::Permanent);
        assert_eq!(
            classify("Cannot read properties of undefined (reading 'src')").category,
            FailureCategory::CodeDefect
        );
    }

    #[test]
    fn test_permanent_wins_over_retryable() {
        // both "404" and "timeout" appear; permanent patterns are checked first
        assert_eq!(classify("404 after timeout").category, FailureCategory::NotFound);
    }

    #[test]
    fn test_retryable_patterns() {
        let c = classify("Navigation timeout of 30000 ms exceeded");
        assert_eq!(c.category, FailureCategory::Timeout);
        assert_eq!(c.kind, FailureKind::Retryable);
        assert_eq!(classify("connect ECONNREFUSED 1.2.3.4:443").category, FailureCategory::Network);
        assert_eq!(classify("socket hang up").category, FailureCategory::Network);
        assert_eq!(classify("Claude 改写失败").category, FailureCategory::RewriteFailed);
    }

    #[test]
    fn test_stale_unknown_failure_is_permanent() {
        let classifier = FailureClassifier::new();
        let now = Utc::now();
        let old = now - Duration::days(8);
        let c = classifier.classify_at("something odd", 1, Some(old), now);
        assert_eq!(c.category, FailureCategory::Stale);
        assert!(c.is_permanent());

        let recent = now - Duration::days(2);
        let c = classifier.classify_at("something odd", 1, Some(recent), now);
        assert_eq!(c.category, FailureCategory::Unknown);
        assert_eq!(c.kind, FailureKind::Retryable);
    }

    #[test]
    fn test_pattern_match_beats_staleness() {
        let now = Utc::now();
        let c = FailureClassifier::new().classify_at("timeout", 1, Some(now - Duration::days(30)), now);
        assert_eq!(c.category, FailureCategory::Timeout);
    }

    #[test]
    fn test_deterministic() {
        let classifier = FailureClassifier::new();
        let now = Utc::now();
        let last = Some(now - Duration::days(1));
        let a = classifier.classify_at("weird failure", 2, last, now);
        let b = classifier.classify_at("weird failure", 2, last, now);
        assert_eq!(a, b);
    }

    #[test]
    fn test_attempt_count_does_not_escalate() {
        let c = FailureClassifier::new().classify_at("timeout", 99, None, Utc::now());
        assert_eq!(c.kind, FailureKind::Retryable);
    }

    #[test]
    fn test_escalation_threshold() {
        assert!(!needs_escalation(2, DEFAULT_MAX_RETRIES));
        assert!(needs_escalation(3, DEFAULT_MAX_RETRIES));
        assert!(needs_escalation(4, DEFAULT_MAX_RETRIES));
    }

    #[test]
    fn test_structured_category() {
        let classifier = FailureClassifier::new();
        assert!(classifier.classify_category(FailureCategory::Gone).is_permanent());
        assert!(!classifier.classify_category(FailureCategory::Network).is_permanent());
    }
}
