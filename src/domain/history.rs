use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{FailureCategory, NormalizedUrl};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordStatus {
    #[default]
    Pending,
    Processing,
    Success,
    Failed,
    PermanentlyFailed,
}

impl RecordStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::PermanentlyFailed)
    }
}

/// Where a record's information came from, least authoritative first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordSource {
    Discovery,
    HistoryDatabase,
    FailureLedger,
    Artifact,
}

/// Everything known about one URL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub normalized_url: NormalizedUrl,
    pub original_url: String,
    pub status: RecordStatus,
    pub file_path: Option<PathBuf>,
    pub date_bucket: Option<String>,
    pub last_modified: Option<DateTime<Utc>>,
    pub failure_category: Option<FailureCategory>,
    pub failure_description: Option<String>,
    pub attempt_count: u32,
    pub source: RecordSource,
}

impl HistoryRecord {
    pub fn new(
        normalized_url: NormalizedUrl,
        original_url: impl Into<String>,
        status: RecordStatus,
        source: RecordSource,
    ) -> Self {
        Self {
            normalized_url,
            original_url: original_url.into(),
            status,
            file_path: None,
            date_bucket: None,
            last_modified: None,
            failure_category: None,
            failure_description: None,
            attempt_count: 0,
            source,
        }
    }

    /// Fold another view of the same URL into this one.
    ///
    /// The more authoritative source decides status and location; optional
    /// fields are filled from whichever side has them, and the attempt
    /// count never goes down.
    pub fn merge(&mut self, other: HistoryRecord) {
        debug_assert_eq!(self.normalized_url, other.normalized_url);
        let attempts = self.attempt_count.max(other.attempt_count);

        if other.source > self.source {
            let mut other = other;
            other.file_path = other.file_path.or(self.file_path.take());
            other.date_bucket = other.date_bucket.or(self.date_bucket.take());
            other.last_modified = other.last_modified.or(self.last_modified);
            other.failure_category = other.failure_category.or(self.failure_category);
            other.failure_description = other
                .failure_description
                .or(self.failure_description.take());
            *self = other;
        } else {
            self.file_path = self.file_path.take().or(other.file_path);
            self.date_bucket = self.date_bucket.take().or(other.date_bucket);
            self.last_modified = self.last_modified.or(other.last_modified);
            self.failure_category = self.failure_category.or(other.failure_category);
            self.failure_description = self
                .failure_description
                .take()
                .or(other.failure_description);
        }

        self.attempt_count = attempts;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> NormalizedUrl {
        NormalizedUrl::from_normalized("https://golf.com/news/a")
    }

    #[test]
    fn test_artifact_supersedes_failure() {
        let mut failed = HistoryRecord::new(
            key(),
            "https://golf.com/news/a?utm_source=x",
            RecordStatus::Failed,
            RecordSource::FailureLedger,
        );
        failed.attempt_count = 2;
        failed.failure_category = Some(FailureCategory::Timeout);

        let mut artifact = HistoryRecord::new(
            key(),
            "https://golf.com/news/a",
            RecordStatus::Success,
            RecordSource::Artifact,
        );
        artifact.file_path = Some(PathBuf::from("golf_content/2025-07-24/wechat_ready/a.md"));

        failed.merge(artifact);
        assert_eq!(failed.status, RecordStatus::Success);
        assert_eq!(failed.source, RecordSource::Artifact);
        assert_eq!(failed.attempt_count, 2);
        assert!(failed.file_path.is_some());
        assert_eq!(failed.failure_category, Some(FailureCategory::Timeout));
    }

    #[test]
    fn test_weaker_source_only_fills_gaps() {
        let mut record = HistoryRecord::new(
            key(),
            "https://golf.com/news/a",
            RecordStatus::Failed,
            RecordSource::FailureLedger,
        );
        let mut db = HistoryRecord::new(
            key(),
            "https://golf.com/news/a",
            RecordStatus::Pending,
            RecordSource::HistoryDatabase,
        );
        db.date_bucket = Some("2025-07-24".into());
        db.attempt_count = 5;

        record.merge(db);
        assert_eq!(record.status, RecordStatus::Failed);
        assert_eq!(record.date_bucket.as_deref(), Some("2025-07-24"));
        assert_eq!(record.attempt_count, 5);
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(RecordStatus::Success.is_terminal());
        assert!(RecordStatus::PermanentlyFailed.is_terminal());
        assert!(!RecordStatus::Failed.is_terminal());
        assert!(!RecordStatus::Processing.is_terminal());
    }
}
