//! Full cycle over a temporary workspace: discovery list and failure ledger
//! in, rendered articles and updated ledgers out.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tempfile::TempDir;

use fairway::app::{AppContext, FairwayError, Result};
use fairway::config::Config;
use fairway::domain::{FailureCategory, WorkCategory};
use fairway::ledger::FAILED_ARTICLES_FILE;
use fairway::pipeline::{Fetcher, Page};

const NEW_URL: &str = "https://www.golfmonthly.com/news/open-preview";
const DONE_URL: &str = "https://www.golf.com/news/rory-wins/";
const RETRY_URL: &str = "https://www.golfdigest.com/story/ryder-cup-picks";

struct StaticFetcher;

#[async_trait]
impl Fetcher for StaticFetcher {
    async fn fetch(&self, url: &str) -> Result<Page> {
        if url == DONE_URL {
            return Err(FairwayError::fetch(
                FailureCategory::Unknown,
                "already processed URL fetched again",
            ));
        }
        Ok(Page {
            url: url.to_string(),
            body: format!(
                "<html><head><title>Story at {}</title></head><body><article><p>{}</p></article></body></html>",
                url,
                "Tournament report paragraph. ".repeat(60)
            ),
        })
    }
}

fn workspace(root: &Path) -> Config {
    let content_dir = root.join("golf_content");

    let ready = content_dir.join("2025-07-24").join("wechat_ready");
    fs::create_dir_all(&ready).unwrap();
    let header = format!("# Rory wins\n\n[查看原文]({})\n\n", DONE_URL);
    fs::write(
        ready.join("wechat_article_03.md"),
        format!("{}{}", header, "x".repeat(2048)),
    )
    .unwrap();

    fs::write(
        root.join("deep_urls_golf.txt"),
        format!("# discovered today\n{}\n\n{}\n", NEW_URL, DONE_URL),
    )
    .unwrap();

    fs::write(
        content_dir.join(FAILED_ARTICLES_FILE),
        format!(
            r#"{{"{}": {{"reason": "Request timed out", "status": "pending_retry", "attemptCount": 1, "lastAttempt": "2025-07-24T08:00:00"}}}}"#,
            RETRY_URL
        ),
    )
    .unwrap();

    let mut config = Config::default();
    config.paths.content_dir = content_dir;
    config.paths.url_list_dir = root.to_path_buf();
    config.pipeline.workers = 2;
    config
}

#[tokio::test]
async fn test_collect_run_and_recollect() {
    let dir = TempDir::new().unwrap();
    let ctx = AppContext::new(workspace(dir.path()));

    let collected = ctx.collect().unwrap();
    assert_eq!(collected.total_count, 2);
    assert_eq!(collected.already_processed, 1);
    assert_eq!(collected.count(WorkCategory::NeverProcessed), 1);
    assert!(collected.items.iter().all(|item| item.url != DONE_URL));
    assert!(collected
        .items
        .iter()
        .any(|item| item.url == RETRY_URL && item.category.is_retry()));

    let summary = ctx
        .pipeline(Arc::new(StaticFetcher))
        .run(collected.items)
        .await;
    assert_eq!(summary.succeeded, 2);
    assert_eq!(summary.failed, 0);

    // Numbering continues above the existing wechat_article_03.
    let mut numbers = summary.numbers.clone();
    numbers.sort_unstable();
    assert_eq!(numbers, vec![4, 5]);

    let failures = fs::read_to_string(ctx.state_dir().join(FAILED_ARTICLES_FILE)).unwrap();
    assert!(!failures.contains(RETRY_URL));

    assert!(ctx.history.is_processed(NEW_URL));
    assert!(ctx.history.is_processed(RETRY_URL));

    let again = ctx.collect().unwrap();
    assert_eq!(again.total_count, 0);
}

#[tokio::test]
async fn test_next_number_after_run_is_above_artifacts() {
    let dir = TempDir::new().unwrap();
    let ctx = AppContext::new(workspace(dir.path()));

    let first = ctx.allocator().next_number().await.unwrap();
    let second = ctx.allocator().next_number().await.unwrap();
    assert_eq!(first, 4);
    assert_eq!(second, 5);
}
