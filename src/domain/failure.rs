use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Why an attempt failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureCategory {
    NotFound,
    Forbidden,
    Gone,
    NonArticleContent,
    CodeDefect,
    InvalidContent,
    MissingTitle,
    Timeout,
    Network,
    RewriteFailed,
    Stale,
    MaxRetries,
    #[serde(other)]
    Unknown,
}

impl FailureCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::Forbidden => "forbidden",
            Self::Gone => "gone",
            Self::NonArticleContent => "non_article_content",
            Self::CodeDefect => "code_defect",
            Self::InvalidContent => "invalid_content",
            Self::MissingTitle => "missing_title",
            Self::Timeout => "timeout",
            Self::Network => "network",
            Self::RewriteFailed => "rewrite_failed",
            Self::Stale => "stale",
            Self::MaxRetries => "max_retries",
            Self::Unknown => "unknown",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::NotFound => "Page no longer exists (404)",
            Self::Forbidden => "Access denied by the site (403)",
            Self::Gone => "Page permanently removed (410)",
            Self::NonArticleContent => "Live, video or gallery page without article text",
            Self::CodeDefect => "Bug in the scraping code",
            Self::InvalidContent => "Article content too short",
            Self::MissingTitle => "Article has no title",
            Self::Timeout => "Request timed out",
            Self::Network => "Network connection failed",
            Self::RewriteFailed => "Content rewrite failed",
            Self::Stale => "No successful attempt for over 7 days",
            Self::MaxRetries => "Retry limit reached",
            Self::Unknown => "Unrecognized failure",
        }
    }

    /// Whether failures of this kind can never succeed on retry.
    pub fn is_permanent(&self) -> bool {
        !matches!(
            self,
            Self::Timeout | Self::Network | Self::RewriteFailed | Self::Unknown
        )
    }
}

impl fmt::Display for FailureCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Permanent,
    Retryable,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureStatus {
    #[default]
    #[serde(alias = "pending", alias = "failed", alias = "retry")]
    PendingRetry,
    #[serde(alias = "permanent_failed", alias = "permanent")]
    PermanentlyFailed,
    #[serde(other)]
    Unknown,
}

/// One entry of `failed_articles.json`.
///
/// Fields this crate does not know about are kept in `extra` so rewriting
/// the ledger never drops data written by other tools.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureRecord {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub url: String,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub status: FailureStatus,
    #[serde(default)]
    pub attempt_count: u32,
    #[serde(
        default,
        deserialize_with = "super::timestamp::deserialize",
        skip_serializing_if = "Option::is_none"
    )]
    pub last_attempt: Option<DateTime<Utc>>,
    #[serde(
        default,
        deserialize_with = "super::timestamp::deserialize",
        skip_serializing_if = "Option::is_none"
    )]
    pub filtered_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_category: Option<FailureCategory>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_description: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl FailureRecord {
    pub fn new(url: impl Into<String>, reason: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            url: url.into(),
            reason: reason.into(),
            status: FailureStatus::PendingRetry,
            attempt_count: 1,
            last_attempt: Some(now),
            filtered_at: None,
            failure_category: None,
            failure_description: None,
            extra: BTreeMap::new(),
        }
    }

    /// Permanent entries are frozen: later failures do not touch them.
    pub fn is_frozen(&self) -> bool {
        self.status == FailureStatus::PermanentlyFailed
    }

    pub fn mark_permanent(
        &mut self,
        category: FailureCategory,
        description: impl Into<String>,
        now: DateTime<Utc>,
    ) {
        self.status = FailureStatus::PermanentlyFailed;
        self.failure_category = Some(category);
        self.failure_description = Some(description.into());
        self.filtered_at = Some(now);
    }
}
