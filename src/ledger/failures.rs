use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::classifier::{needs_escalation, Classification};
use crate::domain::{
    FailureCategory, FailureKind, FailureRecord, FailureStatus, HistoryRecord, NormalizedUrl,
    RecordSource, RecordStatus,
};
use crate::normalizer::UrlNormalizer;

/// `failed_articles.json`: failure records keyed by raw URL.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FailureLedger {
    entries: BTreeMap<String, FailureRecord>,
}

impl FailureLedger {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, url: &str) -> Option<&FailureRecord> {
        self.entries.get(url)
    }

    pub fn insert(&mut self, record: FailureRecord) {
        self.entries.insert(record.url.clone(), record);
    }

    /// Entries with their URL filled in from the key.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &FailureRecord)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&str, &mut FailureRecord)> {
        self.entries.iter_mut().map(|(k, v)| (k.as_str(), v))
    }

    pub fn pending_retry(&self) -> impl Iterator<Item = (&str, &FailureRecord)> {
        self.iter()
            .filter(|(_, r)| r.status == FailureStatus::PendingRetry)
    }

    /// Record one more failed attempt for `url`.
    ///
    /// Permanent entries are frozen and returned unchanged. A permanent
    /// classification, or reaching `max_retries` attempts, moves the entry
    /// to `PermanentlyFailed`.
    pub fn record_failure(
        &mut self,
        url: &str,
        reason: &str,
        classification: &Classification,
        now: DateTime<Utc>,
        max_retries: u32,
    ) -> FailureRecord {
        let record = self
            .entries
            .entry(url.to_string())
            .or_insert_with(|| {
                let mut fresh = FailureRecord::new(url, reason, now);
                fresh.attempt_count = 0;
                fresh
            });

        if record.is_frozen() {
            return record.clone();
        }

        if record.url.is_empty() {
            record.url = url.to_string();
        }
        record.attempt_count += 1;
        record.reason = reason.to_string();
        record.last_attempt = Some(now);
        record.failure_category = Some(classification.category);
        record.failure_description = Some(classification.description.clone());

        if classification.kind == FailureKind::Permanent {
            record.mark_permanent(classification.category, classification.description.clone(), now);
        } else if needs_escalation(record.attempt_count, max_retries) {
            record.mark_permanent(
                FailureCategory::MaxRetries,
                format!("Failed {} times", record.attempt_count),
                now,
            );
        } else {
            record.status = FailureStatus::PendingRetry;
        }
        record.clone()
    }

    /// Drop every entry whose URL normalizes to `key`. Returns how many.
    pub fn remove_normalized(&mut self, normalizer: &UrlNormalizer, key: &NormalizedUrl) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|url, _| normalizer.normalize(url) != *key);
        before - self.entries.len()
    }

    /// Import adapter into the canonical history model.
    pub fn to_history_records(&self, normalizer: &UrlNormalizer) -> Vec<HistoryRecord> {
        self.iter()
            .map(|(url, entry)| {
                let status = match entry.status {
                    FailureStatus::PermanentlyFailed => RecordStatus::PermanentlyFailed,
                    _ => RecordStatus::Failed,
                };
                let mut record = HistoryRecord::new(
                    normalizer.normalize(url),
                    url,
                    status,
                    RecordSource::FailureLedger,
                );
                record.attempt_count = entry.attempt_count;
                record.last_modified = entry.last_attempt;
                record.failure_category = entry.failure_category;
                record.failure_description = entry
                    .failure_description
                    .clone()
                    .or_else(|| Some(entry.reason.clone()).filter(|r| !r.is_empty()));
                record
            })
            .collect()
    }
}
