use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::domain::FailureCategory;

#[derive(Error, Debug)]
pub enum FairwayError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// A ledger file exists but is not valid JSON. The source of truth is
    /// compromised, so this is fatal to the run.
    #[error("Ledger {path} is corrupt: {source}")]
    LedgerCorrupt {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Lock {path} still held after waiting {waited:?}")]
    LockContention { path: PathBuf, waited: Duration },

    #[error("{message}")]
    Fetch {
        category: FailureCategory,
        message: String,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

impl FairwayError {
    pub fn fetch(category: FailureCategory, message: impl Into<String>) -> Self {
        Self::Fetch {
            category,
            message: message.into(),
        }
    }

    /// Structured failure kind, when the error carries one.
    pub fn category(&self) -> Option<FailureCategory> {
        match self {
            Self::Fetch { category, .. } => Some(*category),
            Self::Http(e) if e.is_timeout() => Some(FailureCategory::Timeout),
            Self::Http(e) if e.is_connect() => Some(FailureCategory::Network),
            _ => None,
        }
    }

    /// Whether another attempt may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::LedgerCorrupt { .. } | Self::Config(_) | Self::InvalidUrl(_) => false,
            Self::LockContention { .. } | Self::Io(_) | Self::Http(_) => true,
            Self::Fetch { category, .. } => !category.is_permanent(),
            _ => true,
        }
    }
}

pub type Result<T> = std::result::Result<T, FairwayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_error_carries_category() {
        let err = FairwayError::fetch(FailureCategory::NotFound, "HTTP 404 Not Found");
        assert_eq!(err.category(), Some(FailureCategory::NotFound));
        assert_eq!(err.to_string(), "HTTP 404 Not Found");
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_lock_contention_is_retryable() {
        let err = FairwayError::LockContention {
            path: PathBuf::from("/tmp/x.lock"),
            waited: Duration::from_secs(30),
        };
        assert!(err.is_retryable());
        // contention says nothing about the article being fetched
        assert_eq!(err.category(), None);
    }

    #[test]
    fn test_corrupt_ledger_is_fatal() {
        let source = serde_json::from_str::<serde_json::Value>("{oops").unwrap_err();
        let err = FairwayError::LedgerCorrupt {
            path: PathBuf::from("failed_articles.json"),
            source,
        };
        assert!(!err.is_retryable());
        assert!(err.category().is_none());
    }
}
