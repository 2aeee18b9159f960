//! Builds the worklist for a processing run.
//!
//! Three stores are unioned, each skipping keys an earlier one captured:
//! retryable entries of the failure ledger, unfinished entries of the
//! history database, and the raw `deep_urls_*.txt` discovery lists. Anything
//! the [`HistoryStore`] already counts as processed is dropped. Discovered
//! URLs are checked against the [`ReconciledHistory`] of both ledgers.
//! Collection only reads; entries that ran out of retries are reported as
//! escalations for the caller to apply.
//!
//! A `processing` entry belongs to a worker that may still be running, so it
//! is only collected once it is older than the processing lease.

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::app::Result;
use crate::classifier::{needs_escalation, FailureClassifier};
use crate::domain::{FailureCategory, NormalizedUrl, PendingWorkItem, RecordStatus, WorkCategory};
use crate::history::reconciled::ReconciledHistory;
use crate::history::HistoryStore;
use crate::ledger::{DbStatus, FailureLedger, HistoryDatabase};
use crate::normalizer::{UrlNormalizer, DEFAULT_DUPLICATE_THRESHOLD};
use crate::store::read_json;

pub const DISCOVERY_PREFIX: &str = "deep_urls_";
pub const DISCOVERY_SUFFIX: &str = ".txt";

/// Default age after which a `processing` entry counts as abandoned.
pub const DEFAULT_PROCESSING_LEASE_SECS: i64 = 3600;

/// Sites with more pending URLs than this skip the near-duplicate report.
const NEAR_DUPLICATE_GROUP_LIMIT: usize = 200;

/// A failure that should be moved to permanently failed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Escalation {
    pub url: String,
    pub attempt_count: u32,
    pub category: FailureCategory,
    pub description: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CollectedUrls {
    pub categorized: BTreeMap<WorkCategory, Vec<PendingWorkItem>>,
    pub items: Vec<PendingWorkItem>,
    pub total_count: usize,
    pub by_website: BTreeMap<String, usize>,
    pub escalations: Vec<Escalation>,
    pub already_processed: usize,
    pub duplicates: usize,
    pub skipped_known: usize,
    pub near_duplicates: Vec<(String, String)>,
}

impl CollectedUrls {
    fn push(&mut self, item: PendingWorkItem) {
        *self.by_website.entry(item.source_website.clone()).or_default() += 1;
        self.categorized
            .entry(item.category)
            .or_default()
            .push(item.clone());
        self.items.push(item);
        self.total_count = self.items.len();
    }

    /// Keep only items from earlier attempts.
    pub fn retries_only(mut self) -> Self {
        let items = std::mem::take(&mut self.items);
        self.categorized.clear();
        self.by_website.clear();
        self.total_count = 0;
        for item in items.into_iter().filter(|i| i.category.is_retry()) {
            self.push(item);
        }
        self
    }

    pub fn count(&self, category: WorkCategory) -> usize {
        self.categorized.get(&category).map_or(0, Vec::len)
    }
}

pub struct PendingUrlCollector {
    failures_path: PathBuf,
    database_path: PathBuf,
    url_list_dir: PathBuf,
    classifier: FailureClassifier,
    max_retries: u32,
    processing_lease: Duration,
    normalizer: UrlNormalizer,
}

impl PendingUrlCollector {
    pub fn new(
        failures_path: impl Into<PathBuf>,
        database_path: impl Into<PathBuf>,
        url_list_dir: impl Into<PathBuf>,
        classifier: FailureClassifier,
        max_retries: u32,
    ) -> Self {
        Self {
            failures_path: failures_path.into(),
            database_path: database_path.into(),
            url_list_dir: url_list_dir.into(),
            classifier,
            max_retries,
            processing_lease: Duration::seconds(DEFAULT_PROCESSING_LEASE_SECS),
            normalizer: UrlNormalizer::new(),
        }
    }

    pub fn with_processing_lease(mut self, lease: Duration) -> Self {
        self.processing_lease = lease;
        self
    }

    /// A corrupt ledger is fatal; a missing one is empty.
    pub fn collect(&self, history: &HistoryStore) -> Result<CollectedUrls> {
        self.collect_at(history, Utc::now())
    }

    /// [`collect`](Self::collect) with an explicit clock for lease checks.
    pub fn collect_at(&self, history: &HistoryStore, now: DateTime<Utc>) -> Result<CollectedUrls> {
        let failures: FailureLedger = read_json(&self.failures_path)?.unwrap_or_default();
        let database: HistoryDatabase = read_json(&self.database_path)?.unwrap_or_default();

        let mut out = CollectedUrls::default();
        let mut seen: HashSet<NormalizedUrl> = HashSet::new();

        let permanent_keys: HashSet<NormalizedUrl> = failures
            .iter()
            .filter(|(_, r)| r.is_frozen())
            .map(|(url, _)| self.normalizer.normalize(url))
            .collect();

        self.collect_failures(&failures, history, &mut seen, &mut out);
        self.collect_database(&database, &permanent_keys, history, now, &mut seen, &mut out);

        let ledgers = ReconciledHistory::from_ledgers(&failures, &database, &self.normalizer);
        for list in discovery_lists(&self.url_list_dir) {
            let urls = match read_url_list(&list) {
                Ok(urls) => urls,
                Err(e) => {
                    warn!(path = %list.display(), error = %e, "Skipping unreadable URL list");
                    continue;
                }
            };
            for url in urls {
                let key = self.normalizer.normalize(&url);
                if key.is_empty() {
                    continue;
                }
                if seen.contains(&key) {
                    out.duplicates += 1;
                    continue;
                }
                if history.is_processed(key.as_str()) {
                    out.already_processed += 1;
                    continue;
                }
                let known = ledgers
                    .get(&key)
                    .is_some_and(|record| record.status != RecordStatus::Pending);
                if known {
                    out.skipped_known += 1;
                    continue;
                }
                seen.insert(key.clone());
                out.push(PendingWorkItem {
                    source_website: self.normalizer.website(&url),
                    url,
                    normalized: key,
                    category: WorkCategory::NeverProcessed,
                });
            }
        }

        out.near_duplicates = self.near_duplicates(&out.items);
        info!(
            total = out.total_count,
            escalations = out.escalations.len(),
            already_processed = out.already_processed,
            duplicates = out.duplicates,
            "Collected pending URLs"
        );
        Ok(out)
    }

    fn collect_failures(
        &self,
        failures: &FailureLedger,
        history: &HistoryStore,
        seen: &mut HashSet<NormalizedUrl>,
        out: &mut CollectedUrls,
    ) {
        for (url, record) in failures.pending_retry() {
            let key = self.normalizer.normalize(url);
            if key.is_empty() {
                continue;
            }
            if !seen.insert(key.clone()) {
                out.duplicates += 1;
                continue;
            }
            if history.is_processed(url) {
                out.already_processed += 1;
                continue;
            }

            // Pattern verdicts only pick the bucket here; marking entries
            // permanent is the failure filter's job.
            let classification = match record.failure_category {
                Some(category) => self.classifier.classify_category(category),
                None => self
                    .classifier
                    .classify(&record.reason, record.attempt_count, record.last_attempt),
            };
            if needs_escalation(record.attempt_count, self.max_retries) {
                out.escalations.push(Escalation {
                    url: url.to_string(),
                    attempt_count: record.attempt_count,
                    category: FailureCategory::MaxRetries,
                    description: format!("Failed {} times", record.attempt_count),
                });
                continue;
            }

            let category = match classification.category {
                FailureCategory::Forbidden => WorkCategory::Forbidden,
                FailureCategory::Timeout => WorkCategory::Timeout,
                FailureCategory::Network | FailureCategory::RewriteFailed => WorkCategory::RetryFailed,
                _ => WorkCategory::OtherError,
            };
            out.push(PendingWorkItem {
                url: url.to_string(),
                source_website: self.normalizer.website(url),
                normalized: key,
                category,
            });
        }
    }

    fn collect_database(
        &self,
        database: &HistoryDatabase,
        permanent_keys: &HashSet<NormalizedUrl>,
        history: &HistoryStore,
        now: DateTime<Utc>,
        seen: &mut HashSet<NormalizedUrl>,
        out: &mut CollectedUrls,
    ) {
        for entry in database.urls.values() {
            // Without a timestamp the lease cannot be judged; leave it alone.
            let abandoned = entry.status == DbStatus::Processing
                && entry
                    .last_updated
                    .is_some_and(|at| now - at > self.processing_lease);
            if !(entry.status.needs_retry() || abandoned) {
                continue;
            }
            let key = HistoryDatabase::entry_key(&self.normalizer, entry);
            if key.is_empty() {
                continue;
            }
            if permanent_keys.contains(&key) {
                out.skipped_known += 1;
                continue;
            }
            if !seen.insert(key.clone()) {
                out.duplicates += 1;
                continue;
            }
            if history.is_processed(key.as_str()) {
                out.already_processed += 1;
                continue;
            }
            let url = if entry.original_url.is_empty() {
                key.to_string()
            } else {
                entry.original_url.clone()
            };
            out.push(PendingWorkItem {
                source_website: self.normalizer.website(&url),
                url,
                normalized: key,
                category: WorkCategory::Incomplete,
            });
        }
    }

    /// Pairs of pending URLs on the same site that look alike without
    /// normalizing to the same key.
    fn near_duplicates(&self, items: &[PendingWorkItem]) -> Vec<(String, String)> {
        let mut by_site: BTreeMap<&str, Vec<&PendingWorkItem>> = BTreeMap::new();
        for item in items {
            by_site.entry(&item.source_website).or_default().push(item);
        }

        let mut pairs = Vec::new();
        for (site, group) in by_site {
            if group.len() > NEAR_DUPLICATE_GROUP_LIMIT {
                debug!(site, count = group.len(), "Skipping near-duplicate check");
                continue;
            }
            for (i, a) in group.iter().enumerate() {
                for b in &group[i + 1..] {
                    if self.normalizer.is_probable_duplicate(
                        a.normalized.as_str(),
                        b.normalized.as_str(),
                        DEFAULT_DUPLICATE_THRESHOLD,
                    ) {
                        pairs.push((a.url.clone(), b.url.clone()));
                    }
                }
            }
        }
        pairs
    }
}

/// `deep_urls_*.txt` files in `dir`, sorted by name.
pub fn discovery_lists(dir: &Path) -> Vec<PathBuf> {
    let Ok(read) = fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut lists: Vec<PathBuf> = read
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| {
            p.is_file()
                && p.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.starts_with(DISCOVERY_PREFIX) && n.ends_with(DISCOVERY_SUFFIX))
        })
        .collect();
    lists.sort();
    lists
}

/// One URL per line; blank lines and `#` comments are skipped.
pub fn read_url_list(path: &Path) -> Result<Vec<String>> {
    let content = fs::read_to_string(path)?;
    Ok(parse_url_list(&content))
}

pub fn parse_url_list(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| {
            if line.starts_with("http://") || line.starts_with("https://") {
                Some(line.to_string())
            } else if !line.contains(char::is_whitespace) && line.contains('.') {
                Some(format!("https://{}", line))
            } else {
                debug!(line, "Ignoring non-URL line");
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::FairwayError;
    use crate::domain::FailureRecord;
    use crate::history::tests::write_artifact;
    use crate::history::HistoryConfig;
    use crate::ledger::{FAILED_ARTICLES_FILE, HISTORY_DATABASE_FILE};
    use chrono::Utc;
    use tempfile::TempDir;

    struct Fixture {
        dir: TempDir,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                dir: TempDir::new().unwrap(),
            }
        }

        fn root(&self) -> &Path {
            self.dir.path()
        }

        fn write(&self, name: &str, content: &str) {
            fs::write(self.root().join(name), content).unwrap();
        }

        fn failures(&self, records: Vec<FailureRecord>) {
            let mut ledger = FailureLedger::default();
            for record in records {
                ledger.insert(record);
            }
            self.write(FAILED_ARTICLES_FILE, &serde_json::to_string(&ledger).unwrap());
        }

        fn collector(&self) -> PendingUrlCollector {
            PendingUrlCollector::new(
                self.root().join(FAILED_ARTICLES_FILE),
                self.root().join(HISTORY_DATABASE_FILE),
                self.root(),
                FailureClassifier::new(),
                3,
            )
        }

        fn history(&self) -> HistoryStore {
            HistoryStore::new(self.root().join("golf_content"), HistoryConfig::default())
        }

        fn collect(&self) -> CollectedUrls {
            self.collector().collect(&self.history()).unwrap()
        }
    }

    fn failure(url: &str, reason: &str, attempts: u32) -> FailureRecord {
        let mut record = FailureRecord::new(url, reason, Utc::now());
        record.attempt_count = attempts;
        record
    }

    #[test]
    fn test_empty_when_nothing_on_disk() {
        let fx = Fixture::new();
        let out = fx.collect();
        assert_eq!(out.total_count, 0);
        assert!(out.items.is_empty());
    }

    #[test]
    fn test_failures_bucketed_by_category() {
        let fx = Fixture::new();
        fx.failures(vec![
            failure("https://golf.com/a", "HTTP 403 Forbidden", 1),
            failure("https://golf.com/b", "Navigation timeout", 1),
            failure("https://golf.com/c", "ECONNRESET", 2),
            failure("https://golf.com/d", "something odd", 1),
        ]);
        let out = fx.collect();

        assert!(out.escalations.is_empty());
        assert_eq!(out.count(WorkCategory::Forbidden), 1);
        assert_eq!(out.count(WorkCategory::Timeout), 1);
        assert_eq!(out.count(WorkCategory::RetryFailed), 1);
        assert_eq!(out.count(WorkCategory::OtherError), 1);
        assert_eq!(out.total_count, 4);
        assert_eq!(out.by_website["golf.com"], 4);
    }

    #[test]
    fn test_exhausted_retries_reported_for_escalation() {
        let fx = Fixture::new();
        fx.failures(vec![failure("https://golf.com/a", "timeout", 3)]);
        let out = fx.collect();
        assert_eq!(out.total_count, 0);
        assert_eq!(out.escalations.len(), 1);
        assert_eq!(out.escalations[0].category, FailureCategory::MaxRetries);
    }

    #[test]
    fn test_same_url_in_failures_and_database_returned_once() {
        let fx = Fixture::new();
        fx.failures(vec![failure("https://www.golf.com/news/a?utm_source=x", "timeout", 1)]);
        fx.write(
            HISTORY_DATABASE_FILE,
            r#"{"urls": {
                "k1": {"originalUrl": "https://golf.com/news/a/", "status": "failed"},
                "k2": {"originalUrl": "https://golf.com/news/b", "status": "incomplete_processing"},
                "k3": {"originalUrl": "https://golf.com/news/c", "status": "completed"}
            }}"#,
        );
        let out = fx.collect();

        assert_eq!(out.total_count, 2);
        assert_eq!(out.duplicates, 1);
        assert_eq!(out.count(WorkCategory::Timeout), 1);
        assert_eq!(out.count(WorkCategory::Incomplete), 1);
        let keys: HashSet<_> = out.items.iter().map(|i| i.normalized.clone()).collect();
        assert_eq!(keys.len(), out.items.len());
    }

    #[test]
    fn test_in_flight_urls_left_to_their_worker() {
        let fx = Fixture::new();
        fx.write(
            HISTORY_DATABASE_FILE,
            r#"{"urls": {
                "k1": {"originalUrl": "https://golf.com/in-flight", "status": "processing", "articleNumber": 7},
                "k2": {"originalUrl": "https://golf.com/recent", "status": "processing", "lastUpdated": "2025-07-24T09:30:00Z"},
                "k3": {"originalUrl": "https://golf.com/crashed", "status": "processing", "lastUpdated": "2025-07-24T07:00:00Z"}
            }}"#,
        );
        fx.write("deep_urls_golf.txt", "https://golf.com/in-flight\n");
        let now = "2025-07-24T10:00:00Z".parse::<DateTime<Utc>>().unwrap();

        let out = fx.collector().collect_at(&fx.history(), now).unwrap();
        let urls: Vec<_> = out.items.iter().map(|i| (i.url.as_str(), i.category)).collect();
        assert_eq!(urls, vec![("https://golf.com/crashed", WorkCategory::Incomplete)]);
        assert_eq!(out.skipped_known, 1);

        let out = fx
            .collector()
            .with_processing_lease(Duration::minutes(15))
            .collect_at(&fx.history(), now)
            .unwrap();
        assert_eq!(out.total_count, 2);
    }

    #[test]
    fn test_database_skips_permanently_failed_urls() {
        let fx = Fixture::new();
        let mut gone = failure("https://golf.com/gone", "HTTP 404", 1);
        gone.mark_permanent(FailureCategory::NotFound, "gone", Utc::now());
        fx.failures(vec![gone]);
        fx.write(
            HISTORY_DATABASE_FILE,
            r#"{"urls": {"k": {"originalUrl": "https://golf.com/gone", "status": "failed"}}}"#,
        );
        let out = fx.collect();
        assert_eq!(out.total_count, 0);
        assert_eq!(out.skipped_known, 1);
    }

    #[test]
    fn test_discovery_lists_filtered_against_history() {
        let fx = Fixture::new();
        write_artifact(
            &fx.root().join("golf_content"),
            "2025-07-24",
            "wechat_article_01.md",
            "https://golf.com/done",
            4096,
        );
        fx.write(
            HISTORY_DATABASE_FILE,
            r#"{"urls": {
                "k1": {"originalUrl": "https://golf.com/known", "status": "completed"},
                "k2": {"originalUrl": "https://golf.com/queued", "status": "pending"}
            }}"#,
        );
        fx.write(
            "deep_urls_golf_com.txt",
            "# golf.com\nhttps://golf.com/new\nhttps://www.golf.com/done/\nhttps://golf.com/known\n\ngolf.com/queued\nnot a url\n",
        );
        fx.write("deep_urls_other.txt", "https://golf.com/new?utm_medium=rss\n");
        fx.write("notes.txt", "https://golf.com/ignored\n");

        let out = fx.collect();
        let urls: Vec<_> = out.items.iter().map(|i| i.url.as_str()).collect();
        assert_eq!(urls, vec!["https://golf.com/new", "https://golf.com/queued"]);
        assert_eq!(out.count(WorkCategory::NeverProcessed), 2);
        assert_eq!(out.already_processed, 1);
        assert_eq!(out.skipped_known, 1);
        assert_eq!(out.duplicates, 1);
    }

    #[test]
    fn test_processed_failures_are_dropped() {
        let fx = Fixture::new();
        write_artifact(
            &fx.root().join("golf_content"),
            "2025-07-24",
            "wechat_article_01.md",
            "https://golf.com/a",
            4096,
        );
        fx.failures(vec![failure("https://golf.com/a", "timeout", 1)]);
        let out = fx.collect();
        assert_eq!(out.total_count, 0);
        assert_eq!(out.already_processed, 1);
    }

    #[test]
    fn test_corrupt_ledger_is_fatal() {
        let fx = Fixture::new();
        fx.write(FAILED_ARTICLES_FILE, "{\"https://golf.com/a\": ");
        let err = fx.collector().collect(&fx.history()).unwrap_err();
        assert!(matches!(err, FairwayError::LedgerCorrupt { .. }));
    }

    #[test]
    fn test_retries_only() {
        let fx = Fixture::new();
        fx.failures(vec![failure("https://golf.com/a", "timeout", 1)]);
        fx.write("deep_urls_x.txt", "https://golf.com/b\n");
        let out = fx.collect();
        assert_eq!(out.total_count, 2);

        let retries = out.retries_only();
        assert_eq!(retries.total_count, 1);
        assert_eq!(retries.items[0].category, WorkCategory::Timeout);
        assert_eq!(retries.by_website["golf.com"], 1);
    }

    #[test]
    fn test_near_duplicates_reported() {
        let fx = Fixture::new();
        fx.write(
            "deep_urls_x.txt",
            "https://golf.com/news/tiger-woods-wins\nhttps://golf.com/news/tiger-woods-win\n",
        );
        let out = fx.collect();
        assert_eq!(out.total_count, 2);
        assert_eq!(out.near_duplicates.len(), 1);
    }

    #[test]
    fn test_parse_url_list() {
        let urls = parse_url_list("# comment\n\n  https://a.com/x  \nb.com/y\nhello world\nhttp://c.com\n");
        assert_eq!(urls, vec!["https://a.com/x", "https://b.com/y", "http://c.com"]);
    }
}
