use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::NormalizedUrl;

/// Why a URL is in the worklist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkCategory {
    RetryFailed,
    NeverProcessed,
    Incomplete,
    Timeout,
    Forbidden,
    OtherError,
}

impl WorkCategory {
    pub const ALL: [WorkCategory; 6] = [
        Self::NeverProcessed,
        Self::RetryFailed,
        Self::Incomplete,
        Self::Timeout,
        Self::Forbidden,
        Self::OtherError,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RetryFailed => "retry_failed",
            Self::NeverProcessed => "never_processed",
            Self::Incomplete => "incomplete",
            Self::Timeout => "timeout",
            Self::Forbidden => "forbidden",
            Self::OtherError => "other_error",
        }
    }

    /// Categories that come from an earlier failed attempt.
    pub fn is_retry(&self) -> bool {
        !matches!(self, Self::NeverProcessed)
    }
}

impl fmt::Display for WorkCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingWorkItem {
    pub url: String,
    pub normalized: NormalizedUrl,
    pub category: WorkCategory,
    pub source_website: String,
}

/// Cached high-water mark for article numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NumberLedger {
    pub max_number: u64,
    pub timestamp: DateTime<Utc>,
}

impl NumberLedger {
    pub fn new(max_number: u64) -> Self {
        Self {
            max_number,
            timestamp: Utc::now(),
        }
    }

    /// Fresh when written less than `ttl` ago. A timestamp in the future is
    /// treated as stale.
    pub fn is_fresh(&self, ttl: chrono::Duration, now: DateTime<Utc>) -> bool {
        let age = now.signed_duration_since(self.timestamp);
        age >= chrono::Duration::zero() && age < ttl
    }
}
