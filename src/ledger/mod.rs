//! Serde models for the on-disk ledgers, plus import adapters that turn
//! each legacy shape into [`HistoryRecord`](crate::domain::HistoryRecord)s.

pub mod article_urls;
pub mod failures;
pub mod history_db;

use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::info;

pub use article_urls::{ArticleUrlEntry, ArticleUrls, ARTICLE_URLS_FILE};
pub use failures::FailureLedger;
pub use history_db::{DbStatus, HistoryDatabase, HistoryDbEntry};

use crate::app::Result;
use crate::collector::Escalation;
use crate::normalizer::UrlNormalizer;
use crate::store::{JsonLedger, LedgerStore};

pub const FAILED_ARTICLES_FILE: &str = "failed_articles.json";
pub const HISTORY_DATABASE_FILE: &str = "master_history_database.json";

/// The two root ledgers kept in the state directory.
pub struct Ledgers {
    pub failures: JsonLedger<FailureLedger>,
    pub database: JsonLedger<HistoryDatabase>,
}

impl Ledgers {
    pub fn open(state_dir: &Path) -> Self {
        Self {
            failures: JsonLedger::new(state_dir.join(FAILED_ARTICLES_FILE)),
            database: JsonLedger::new(state_dir.join(HISTORY_DATABASE_FILE)),
        }
    }

    /// Ledger of article numbers for one date bucket.
    pub fn article_urls(bucket_dir: &Path) -> JsonLedger<ArticleUrls> {
        JsonLedger::new(bucket_dir.join(ARTICLE_URLS_FILE))
    }

    pub fn failures_path(&self) -> PathBuf {
        self.failures.path().to_path_buf()
    }

    pub fn database_path(&self) -> PathBuf {
        self.database.path().to_path_buf()
    }

    /// Mark escalated failures permanently failed in both root ledgers.
    /// Returns how many failure entries changed.
    pub async fn apply_escalations(
        &self,
        normalizer: &UrlNormalizer,
        escalations: &[Escalation],
    ) -> Result<usize> {
        if escalations.is_empty() {
            return Ok(0);
        }
        let now = Utc::now();
        let changed = self
            .failures
            .update(|ledger| {
                let mut changed = 0;
                for (url, record) in ledger.iter_mut() {
                    if record.is_frozen() {
                        continue;
                    }
                    if let Some(esc) = escalations.iter().find(|e| e.url == url) {
                        record.mark_permanent(esc.category, esc.description.clone(), now);
                        changed += 1;
                    }
                }
                changed
            })
            .await?;

        let keys: Vec<_> = escalations
            .iter()
            .map(|e| (normalizer.normalize(&e.url), e.url.clone()))
            .collect();
        self.database
            .update(move |db| {
                for (key, url) in &keys {
                    db.upsert(key, url, DbStatus::PermanentlyFailed, now);
                }
            })
            .await?;

        info!(changed, "Applied escalations");
        Ok(changed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{FailureCategory, FailureRecord};
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_apply_escalations() {
        let dir = TempDir::new().unwrap();
        let ledgers = Ledgers::open(dir.path());
        ledgers
            .failures
            .update(|l| {
                let mut r = FailureRecord::new("https://golf.com/x", "timeout", Utc::now());
                r.attempt_count = 3;
                l.insert(r);
                l.insert(FailureRecord::new("https://golf.com/y", "timeout", Utc::now()));
            })
            .await
            .unwrap();

        let escalations = vec![Escalation {
            url: "https://golf.com/x".into(),
            attempt_count: 3,
            category: FailureCategory::MaxRetries,
            description: "Failed 3 times".into(),
        }];
        let normalizer = UrlNormalizer::new();
        assert_eq!(ledgers.apply_escalations(&normalizer, &escalations).await.unwrap(), 1);

        let failures = ledgers.failures.load().unwrap();
        let x = failures.get("https://golf.com/x").unwrap();
        assert!(x.is_frozen());
        assert_eq!(x.failure_category, Some(FailureCategory::MaxRetries));
        assert!(!failures.get("https://golf.com/y").unwrap().is_frozen());

        let db = ledgers.database.load().unwrap();
        let entry = db.find(&normalizer, &normalizer.normalize("https://golf.com/x")).unwrap();
        assert_eq!(entry.status, DbStatus::PermanentlyFailed);

        // already frozen: nothing changes
        assert_eq!(ledgers.apply_escalations(&normalizer, &escalations).await.unwrap(), 0);
    }
}
