//! Processing run: allocate a number, fetch, validate, write the artifact,
//! then record the outcome in every ledger.
//!
//! ```text
//! PendingWorkItem → NumberAllocator → Fetcher → extract/validate
//!     → golf_content/<date>/wechat_html/wechat_article_<NN>.html
//!     → article_urls.json / master_history_database.json / failed_articles.json
//! ```

pub mod extract;
pub mod fetcher;

pub use extract::{extract, render_article, Article};
pub use fetcher::{Fetcher, HttpFetcher, Page};

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{Local, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tracing::{error, info, warn};

use crate::allocator::{artifact_stem, NumberAllocator};
use crate::app::{FairwayError, Result};
use crate::classifier::{Classification, FailureClassifier};
use crate::domain::{FailureCategory, FailureRecord, PendingWorkItem};
use crate::history::HistoryStore;
use crate::ledger::{DbStatus, Ledgers};
use crate::normalizer::UrlNormalizer;
use crate::store::{write_atomic, LedgerStore};

pub const DEFAULT_WORKERS: usize = 5;
pub const HTML_DIR: &str = "wechat_html";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Concurrent fetch/write workers (default: 5)
    pub workers: usize,
    /// Articles with less visible text than this are rejected (default: 200)
    pub min_content_length: usize,
    /// Per-request timeout in seconds (default: 30)
    pub request_timeout_secs: u64,
    pub user_agent: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            min_content_length: 200,
            request_timeout_secs: 30,
            user_agent: format!("fairway/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Success { number: u64, path: PathBuf },
    Failed {
        number: Option<u64>,
        category: FailureCategory,
        permanent: bool,
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ItemOutcome {
    pub url: String,
    pub outcome: Outcome,
}

#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub succeeded: usize,
    pub failed: usize,
    pub permanent: usize,
    pub numbers: Vec<u64>,
    pub outcomes: Vec<ItemOutcome>,
}

impl RunSummary {
    fn add(&mut self, item: ItemOutcome) {
        match &item.outcome {
            Outcome::Success { number, .. } => {
                self.succeeded += 1;
                self.numbers.push(*number);
            }
            Outcome::Failed {
                number, permanent, ..
            } => {
                self.failed += 1;
                if *permanent {
                    self.permanent += 1;
                }
                if let Some(n) = number {
                    self.numbers.push(*n);
                }
            }
        }
        self.outcomes.push(item);
    }
}

pub struct Pipeline {
    fetcher: Arc<dyn Fetcher + Send + Sync>,
    allocator: NumberAllocator,
    ledgers: Ledgers,
    history: Arc<HistoryStore>,
    classifier: FailureClassifier,
    normalizer: UrlNormalizer,
    content_dir: PathBuf,
    max_retries: u32,
    min_content_length: usize,
    semaphore: Arc<Semaphore>,
}

impl Pipeline {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        fetcher: Arc<dyn Fetcher + Send + Sync>,
        allocator: NumberAllocator,
        ledgers: Ledgers,
        history: Arc<HistoryStore>,
        classifier: FailureClassifier,
        content_dir: impl Into<PathBuf>,
        max_retries: u32,
        config: &PipelineConfig,
    ) -> Self {
        Self {
            fetcher,
            allocator,
            ledgers,
            history,
            classifier,
            normalizer: UrlNormalizer::new(),
            content_dir: content_dir.into(),
            max_retries,
            min_content_length: config.min_content_length,
            semaphore: Arc::new(Semaphore::new(config.workers.max(1))),
        }
    }

    /// Process every item with at most `workers` in flight.
    pub async fn run(self: &Arc<Self>, items: Vec<PendingWorkItem>) -> RunSummary {
        let mut handles = Vec::with_capacity(items.len());
        for item in items {
            let pipeline = Arc::clone(self);
            handles.push(tokio::spawn(async move {
                let _permit = match pipeline.semaphore.clone().acquire_owned().await {
                    Ok(permit) => permit,
                    Err(e) => {
                        return ItemOutcome {
                            outcome: Outcome::Failed {
                                number: None,
                                category: FailureCategory::Unknown,
                                permanent: false,
                                reason: e.to_string(),
                            },
                            url: item.url,
                        }
                    }
                };
                pipeline.process(&item).await
            }));
        }

        let mut summary = RunSummary::default();
        for result in futures::future::join_all(handles).await {
            match result {
                Ok(outcome) => summary.add(outcome),
                Err(e) => error!("Worker task failed: {}", e),
            }
        }
        self.history.invalidate();

        info!(
            succeeded = summary.succeeded,
            failed = summary.failed,
            permanent = summary.permanent,
            "Processing run complete"
        );
        summary
    }

    /// One item, start to finish. Ledger errors are logged, never raised.
    ///
    /// An allocator failure is not the article's fault: the item is
    /// reported as failed but no ledger records an attempt.
    pub async fn process(&self, item: &PendingWorkItem) -> ItemOutcome {
        let number = match self.allocator.next_number().await {
            Ok(n) => n,
            Err(e) => {
                warn!(url = %item.url, error = %e, "No article number, leaving URL for the next run");
                return ItemOutcome {
                    url: item.url.clone(),
                    outcome: Outcome::Failed {
                        number: None,
                        category: e.category().unwrap_or(FailureCategory::Unknown),
                        permanent: false,
                        reason: e.to_string(),
                    },
                };
            }
        };
        let bucket = today();
        self.mark_processing(item, number).await;

        match self.fetch_and_write(item, number, &bucket).await {
            Ok(path) => self.record_success(item, number, &bucket, path).await,
            Err(e) => self.record_failure(item, number, &bucket, e).await,
        }
    }

    async fn fetch_and_write(&self, item: &PendingWorkItem, number: u64, bucket: &str) -> Result<PathBuf> {
        let page = self.fetcher.fetch(&item.url).await?;
        let article = extract(&page.body);

        let Some(title) = article.title.as_deref() else {
            return Err(FairwayError::fetch(FailureCategory::MissingTitle, "missing title"));
        };
        let length = article.text_len();
        if length < self.min_content_length {
            return Err(FairwayError::fetch(
                FailureCategory::InvalidContent,
                format!("content too short ({} chars)", length),
            ));
        }

        let path = self
            .content_dir
            .join(bucket)
            .join(HTML_DIR)
            .join(format!("{}.html", artifact_stem(number)));
        let html = render_article(title, &article.body_html, &item.url);
        write_atomic(&path, html.as_bytes())?;
        Ok(path)
    }

    async fn mark_processing(&self, item: &PendingWorkItem, number: u64) {
        let key = item.normalized.clone();
        let url = item.url.clone();
        let result = self
            .ledgers
            .database
            .update(move |db| {
                db.upsert(&key, &url, DbStatus::Processing, Utc::now()).article_number = Some(number);
            })
            .await;
        if let Err(e) = result {
            warn!(url = %item.url, error = %e, "Failed to mark URL as processing");
        }
    }

    async fn record_success(
        &self,
        item: &PendingWorkItem,
        number: u64,
        bucket: &str,
        path: PathBuf,
    ) -> ItemOutcome {
        let now = Utc::now();

        let bucket_ledger = Ledgers::article_urls(&self.content_dir.join(bucket));
        if let Err(e) = bucket_ledger
            .update(|urls| urls.record(number, &item.url, "completed", None))
            .await
        {
            error!(url = %item.url, number, error = %e, "Failed to record article number");
        }

        let key = item.normalized.clone();
        let url = item.url.clone();
        let file_path = path.to_string_lossy().into_owned();
        let bucket_name = bucket.to_string();
        if let Err(e) = self
            .ledgers
            .database
            .update(move |db| {
                let entry = db.upsert(&key, &url, DbStatus::Success, now);
                entry.article_number = Some(number);
                entry.file_path = Some(file_path);
                entry.date_bucket = Some(bucket_name);
            })
            .await
        {
            error!(url = %item.url, error = %e, "Failed to record success in history database");
        }

        let key = item.normalized.clone();
        let normalizer = self.normalizer.clone();
        match self
            .ledgers
            .failures
            .update(move |ledger| ledger.remove_normalized(&normalizer, &key))
            .await
        {
            Ok(0) => {}
            Ok(removed) => info!(url = %item.url, removed, "Cleared failure entries after success"),
            Err(e) => error!(url = %item.url, error = %e, "Failed to clear failure entries"),
        }

        self.history.invalidate();
        info!(url = %item.url, number, path = %path.display(), "Article written");
        ItemOutcome {
            url: item.url.clone(),
            outcome: Outcome::Success { number, path },
        }
    }

    async fn record_failure(
        &self,
        item: &PendingWorkItem,
        number: u64,
        bucket: &str,
        err: FairwayError,
    ) -> ItemOutcome {
        let reason = err.to_string();
        let classification: Classification = match err.category() {
            Some(category) => self.classifier.classify_category(category),
            None => self.classifier.classify(&reason, 0, None),
        };
        let now = Utc::now();

        let url = item.url.clone();
        let why = reason.clone();
        let verdict = classification.clone();
        let max_retries = self.max_retries;
        let record = match self
            .ledgers
            .failures
            .update(move |ledger| ledger.record_failure(&url, &why, &verdict, now, max_retries))
            .await
        {
            Ok(record) => record,
            Err(e) => {
                error!(url = %item.url, error = %e, "Failed to update failure ledger");
                let mut record = FailureRecord::new(item.url.clone(), reason.clone(), now);
                if classification.is_permanent() {
                    record.mark_permanent(classification.category, classification.description.clone(), now);
                }
                record
            }
        };
        let permanent = record.is_frozen();
        let category = record.failure_category.unwrap_or(classification.category);

        let bucket_ledger = Ledgers::article_urls(&self.content_dir.join(bucket));
        if let Err(e) = bucket_ledger
            .update(|urls| urls.record(number, &item.url, "failed", Some(reason.clone())))
            .await
        {
            error!(url = %item.url, number, error = %e, "Failed to record article number");
        }

        let key = item.normalized.clone();
        let url = item.url.clone();
        let status = if permanent {
            DbStatus::PermanentlyFailed
        } else {
            DbStatus::Failed
        };
        let attempts = record.attempt_count;
        if let Err(e) = self
            .ledgers
            .database
            .update(move |db| {
                db.upsert(&key, &url, status, now).attempt_count = attempts;
            })
            .await
        {
            error!(url = %item.url, error = %e, "Failed to record failure in history database");
        }

        warn!(
            url = %item.url,
            category = %category,
            permanent,
            attempts,
            reason = %reason,
            "Article failed"
        );
        ItemOutcome {
            url: item.url.clone(),
            outcome: Outcome::Failed {
                number: Some(number),
                category,
                permanent,
                reason,
            },
        }
    }
}

fn today() -> String {
    Local::now().format("%Y-%m-%d").to_string()
}
