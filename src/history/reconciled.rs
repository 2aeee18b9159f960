//! One record per URL, folded from every store that knows about it.

use std::collections::{BTreeMap, HashMap};

use crate::domain::{HistoryRecord, NormalizedUrl, RecordSource, RecordStatus};
use crate::ledger::{FailureLedger, HistoryDatabase};
use crate::normalizer::UrlNormalizer;

use super::HistoryStore;

#[derive(Debug, Default)]
pub struct ReconciledHistory {
    records: HashMap<NormalizedUrl, HistoryRecord>,
}

impl ReconciledHistory {
    /// Import the history database, the failure ledger and the artifact
    /// index, in that order of increasing authority.
    pub fn build(
        store: &HistoryStore,
        failures: &FailureLedger,
        database: &HistoryDatabase,
        normalizer: &UrlNormalizer,
    ) -> Self {
        let mut history = Self::from_ledgers(failures, database, normalizer);
        history.import(store.records());
        history
    }

    /// Only the two JSON ledgers, without scanning artifacts.
    pub fn from_ledgers(
        failures: &FailureLedger,
        database: &HistoryDatabase,
        normalizer: &UrlNormalizer,
    ) -> Self {
        let mut history = Self::default();
        history.import(database.to_history_records(normalizer));
        history.import(failures.to_history_records(normalizer));
        history
    }

    pub fn import(&mut self, records: impl IntoIterator<Item = HistoryRecord>) {
        for record in records {
            if record.normalized_url.is_empty() {
                continue;
            }
            match self.records.get_mut(&record.normalized_url) {
                Some(existing) => existing.merge(record),
                None => {
                    self.records.insert(record.normalized_url.clone(), record);
                }
            }
        }
    }

    /// Add URLs seen in discovery lists that no store knows yet.
    pub fn add_discovered(&mut self, normalizer: &UrlNormalizer, urls: &[String]) {
        let records = urls.iter().map(|url| {
            HistoryRecord::new(
                normalizer.normalize(url),
                url.clone(),
                RecordStatus::Pending,
                RecordSource::Discovery,
            )
        });
        self.import(records.collect::<Vec<_>>());
    }

    pub fn get(&self, key: &NormalizedUrl) -> Option<&HistoryRecord> {
        self.records.get(key)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &HistoryRecord> {
        self.records.values()
    }

    pub fn count_by_status(&self) -> BTreeMap<&'static str, usize> {
        let mut counts = BTreeMap::new();
        for record in self.records.values() {
            let label = match record.status {
                RecordStatus::Pending => "pending",
                RecordStatus::Processing => "processing",
                RecordStatus::Success => "success",
                RecordStatus::Failed => "failed",
                RecordStatus::PermanentlyFailed => "permanently_failed",
            };
            *counts.entry(label).or_default() += 1;
        }
        counts
    }
}
