use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{HistoryRecord, NormalizedUrl, RecordSource, RecordStatus};
use crate::normalizer::UrlNormalizer;

/// Status strings found in `master_history_database.json`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DbStatus {
    #[default]
    Pending,
    Processing,
    #[serde(alias = "incomplete")]
    IncompleteProcessing,
    PendingRetry,
    Failed,
    #[serde(alias = "completed", alias = "processed", alias = "done")]
    Success,
    #[serde(alias = "permanent_failed")]
    PermanentlyFailed,
    Duplicate,
    #[serde(other)]
    Unknown,
}

impl DbStatus {
    /// Statuses that put a URL back on the worklist.
    pub fn needs_retry(&self) -> bool {
        matches!(
            self,
            Self::Failed | Self::PendingRetry | Self::IncompleteProcessing
        )
    }
}

impl From<DbStatus> for RecordStatus {
    fn from(status: DbStatus) -> Self {
        match status {
            DbStatus::Pending | DbStatus::Unknown => RecordStatus::Pending,
            DbStatus::Processing | DbStatus::IncompleteProcessing => RecordStatus::Processing,
            DbStatus::PendingRetry | DbStatus::Failed => RecordStatus::Failed,
            DbStatus::Success | DbStatus::Duplicate => RecordStatus::Success,
            DbStatus::PermanentlyFailed => RecordStatus::PermanentlyFailed,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryDbEntry {
    #[serde(default)]
    pub original_url: String,
    #[serde(default)]
    pub status: DbStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub normalized_url: Option<String>,
    #[serde(default)]
    pub attempt_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub article_number: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_bucket: Option<String>,
    #[serde(
        default,
        deserialize_with = "crate::domain::timestamp::deserialize",
        skip_serializing_if = "Option::is_none"
    )]
    pub last_updated: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// `master_history_database.json`: `{ "urls": { "<hash>": entry } }`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HistoryDatabase {
    #[serde(default)]
    pub urls: BTreeMap<String, HistoryDbEntry>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl HistoryDatabase {
    /// Look up by normalized URL. Entries written by other tools may be
    /// keyed by a different hash, so fall back to comparing their URLs.
    pub fn find(&self, normalizer: &UrlNormalizer, key: &NormalizedUrl) -> Option<&HistoryDbEntry> {
        self.urls.get(&key.history_key()).or_else(|| {
            self.urls
                .values()
                .find(|e| Self::entry_key(normalizer, e) == *key)
        })
    }

    pub fn entry_key(normalizer: &UrlNormalizer, entry: &HistoryDbEntry) -> NormalizedUrl {
        match &entry.normalized_url {
            Some(n) => NormalizedUrl::from_normalized(n.clone()),
            None => normalizer.normalize(&entry.original_url),
        }
    }

    /// Insert or update the entry for `key`, returning it.
    pub fn upsert(
        &mut self,
        key: &NormalizedUrl,
        original_url: &str,
        status: DbStatus,
        now: DateTime<Utc>,
    ) -> &mut HistoryDbEntry {
        let entry = self.urls.entry(key.history_key()).or_default();
        if entry.original_url.is_empty() {
            entry.original_url = original_url.to_string();
        }
        entry.normalized_url = Some(key.to_string());
        entry.status = status;
        entry.last_updated = Some(now);
        entry
    }

    /// Import adapter into the canonical history model.
    pub fn to_history_records(&self, normalizer: &UrlNormalizer) -> Vec<HistoryRecord> {
        self.urls
            .values()
            .filter(|e| !e.original_url.is_empty() || e.normalized_url.is_some())
            .map(|entry| {
                let mut record = HistoryRecord::new(
                    Self::entry_key(normalizer, entry),
                    entry.original_url.clone(),
                    entry.status.into(),
                    RecordSource::HistoryDatabase,
                );
                record.attempt_count = entry.attempt_count;
                record.file_path = entry.file_path.as_ref().map(Into::into);
                record.date_bucket = entry.date_bucket.clone();
                record.last_modified = entry.last_updated;
                record
            })
            .collect()
    }
}
