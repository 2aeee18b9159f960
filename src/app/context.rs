use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::allocator::NumberAllocator;
use crate::app::error::Result;
use crate::classifier::filter::{FailureFilter, FilterReport};
use crate::classifier::FailureClassifier;
use crate::collector::{CollectedUrls, PendingUrlCollector};
use crate::config::Config;
use crate::history::HistoryStore;
use crate::ledger::Ledgers;
use crate::normalizer::UrlNormalizer;
use crate::pipeline::{Fetcher, HttpFetcher, Pipeline};

/// Everything a command needs, built once from the configuration.
pub struct AppContext {
    pub config: Config,
    pub history: Arc<HistoryStore>,
    pub classifier: FailureClassifier,
    pub normalizer: UrlNormalizer,
}

impl AppContext {
    pub fn new(config: Config) -> Self {
        let history = Arc::new(HistoryStore::new(
            config.paths.content_dir.clone(),
            config.history.clone(),
        ));
        let classifier = FailureClassifier::from_config(&config.retry);

        Self {
            config,
            history,
            classifier,
            normalizer: UrlNormalizer::new(),
        }
    }

    /// Override the worker count from the command line.
    pub fn with_workers(mut self, workers: Option<usize>) -> Self {
        if let Some(workers) = workers {
            self.config.pipeline.workers = workers.max(1);
        }
        self
    }

    pub fn content_dir(&self) -> &PathBuf {
        &self.config.paths.content_dir
    }

    pub fn state_dir(&self) -> PathBuf {
        self.config.paths.state_dir()
    }

    pub fn ledgers(&self) -> Ledgers {
        Ledgers::open(&self.state_dir())
    }

    pub fn allocator(&self) -> NumberAllocator {
        NumberAllocator::new(
            self.content_dir().clone(),
            &self.state_dir(),
            &self.config.allocator,
        )
    }

    pub fn collector(&self) -> PendingUrlCollector {
        let ledgers = self.ledgers();
        PendingUrlCollector::new(
            ledgers.failures_path(),
            ledgers.database_path(),
            self.config.paths.url_list_dir.clone(),
            self.classifier.clone(),
            self.config.retry.max_retries,
        )
        .with_processing_lease(chrono::Duration::seconds(
            self.config.retry.processing_lease_secs,
        ))
    }

    pub fn collect(&self) -> Result<CollectedUrls> {
        self.collector().collect(&self.history)
    }

    pub fn failure_filter(&self) -> FailureFilter {
        FailureFilter::new(self.classifier.clone(), self.config.retry.max_retries)
    }

    /// Mark hopeless failures permanent, including escalations the
    /// collector reported.
    pub async fn clean(&self, collected: &CollectedUrls) -> Result<FilterReport> {
        let report = self
            .failure_filter()
            .apply(&self.ledgers().failures, false)
            .await?;
        self.ledgers()
            .apply_escalations(&self.normalizer, &collected.escalations)
            .await?;
        Ok(report)
    }

    pub fn http_fetcher(&self) -> Result<HttpFetcher> {
        HttpFetcher::new(
            Duration::from_secs(self.config.pipeline.request_timeout_secs),
            &self.config.pipeline.user_agent,
        )
    }

    pub fn pipeline(&self, fetcher: Arc<dyn Fetcher + Send + Sync>) -> Arc<Pipeline> {
        Arc::new(Pipeline::new(
            fetcher,
            self.allocator(),
            self.ledgers(),
            self.history.clone(),
            self.classifier.clone(),
            self.content_dir().clone(),
            self.config.retry.max_retries,
            &self.config.pipeline,
        ))
    }
}
