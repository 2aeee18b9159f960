//! Article numbering shared by every worker process.
//!
//! The read-increment-persist sequence runs entirely under
//! `.article_number.lock`, so two callers never see the same number. The
//! high-water mark is cached in `.max_article_number.json`; when the cache
//! is older than `cache_ttl` the true maximum is recomputed from every date
//! bucket.

use std::fs;
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;

use chrono::Utc;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::app::{FairwayError, Result};
use crate::domain::NumberLedger;
use crate::history::date_buckets;
use crate::ledger::{ArticleUrls, ARTICLE_URLS_FILE};
use crate::store::{read_json, write_json_atomic, FileLock};

pub const LOCK_FILE: &str = ".article_number.lock";
pub const CACHE_FILE: &str = ".max_article_number.json";

static ARTIFACT_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"wechat_article_(\d+)").expect("invalid artifact pattern"));

/// Lock and cache timing for [`NumberAllocator`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AllocatorConfig {
    /// Delay between attempts to take the lock, in milliseconds (default: 50)
    pub poll_interval_ms: u64,
    /// Age after which a lock file is presumed abandoned, in seconds (default: 5)
    pub stale_lock_secs: u64,
    /// Give up waiting for the lock after this many seconds (default: 30)
    pub lock_wait_timeout_secs: u64,
    /// Trust the cached high-water mark for this many seconds (default: 300)
    pub cache_ttl_secs: u64,
}

impl Default for AllocatorConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 50,
            stale_lock_secs: 5,
            lock_wait_timeout_secs: 30,
            cache_ttl_secs: 300,
        }
    }
}

impl AllocatorConfig {
    fn lock(&self, path: PathBuf) -> FileLock {
        FileLock::new(path).with_timing(
            Duration::from_millis(self.poll_interval_ms),
            Duration::from_secs(self.stale_lock_secs),
            Duration::from_secs(self.lock_wait_timeout_secs),
        )
    }
}

pub struct NumberAllocator {
    content_dir: PathBuf,
    cache_path: PathBuf,
    lock: FileLock,
    cache_ttl: chrono::Duration,
}

impl NumberAllocator {
    /// `content_dir` holds the date buckets; lock and cache live in `state_dir`.
    pub fn new(content_dir: impl Into<PathBuf>, state_dir: &Path, config: &AllocatorConfig) -> Self {
        Self {
            content_dir: content_dir.into(),
            cache_path: state_dir.join(CACHE_FILE),
            lock: config.lock(state_dir.join(LOCK_FILE)),
            cache_ttl: chrono::Duration::seconds(config.cache_ttl_secs as i64),
        }
    }

    pub async fn next_number(&self) -> Result<u64> {
        let range = self.reserve(1).await?;
        Ok(*range.start())
    }

    /// Allocate `count` consecutive numbers in one critical section.
    pub async fn reserve(&self, count: u64) -> Result<RangeInclusive<u64>> {
        if count == 0 {
            return Err(FairwayError::Other("cannot reserve zero article numbers".into()));
        }

        let _guard = self.lock.acquire().await?;
        let current = self.current_max();
        let first = current + 1;
        let last = current + count;
        write_json_atomic(&self.cache_path, &NumberLedger::new(last))?;

        debug!(first, last, "Allocated article numbers");
        Ok(first..=last)
    }

    /// Highest number assigned so far. Caller holds the lock.
    fn current_max(&self) -> u64 {
        let now = Utc::now();
        let cached = match read_json::<NumberLedger>(&self.cache_path) {
            Ok(cached) => cached,
            Err(e) => {
                warn!(path = %self.cache_path.display(), error = %e, "Ignoring unreadable number cache");
                None
            }
        };

        if let Some(ledger) = cached {
            if ledger.is_fresh(self.cache_ttl, now) {
                return ledger.max_number;
            }
        }

        let scanned = scan_max_number(&self.content_dir);
        let max = scanned.max(cached.map_or(0, |c| c.max_number));
        info!(scanned, max, "Recomputed article number high-water mark");
        max
    }
}

/// Largest article number recorded in any bucket, from `article_urls.json`
/// keys and `wechat_article_<NN>` file names.
pub fn scan_max_number(content_dir: &Path) -> u64 {
    let mut max = 0;
    for (name, bucket) in date_buckets(content_dir) {
        match read_json::<ArticleUrls>(&bucket.join(ARTICLE_URLS_FILE)) {
            Ok(Some(urls)) => max = max.max(urls.max_number().unwrap_or(0)),
            Ok(None) => {}
            Err(e) => warn!(bucket = %name, error = %e, "Skipping unreadable article_urls.json"),
        }
        max = max.max(max_artifact_number(&bucket));
    }
    max
}

fn max_artifact_number(bucket: &Path) -> u64 {
    let mut max = 0;
    let Ok(read) = fs::read_dir(bucket) else {
        return 0;
    };
    for entry in read.filter_map(|e| e.ok()) {
        let path = entry.path();
        if path.is_dir() {
            if let Ok(inner) = fs::read_dir(&path) {
                for file in inner.filter_map(|e| e.ok()) {
                    max = max.max(number_in_name(&file.file_name().to_string_lossy()));
                }
            }
        } else {
            max = max.max(number_in_name(&entry.file_name().to_string_lossy()));
        }
    }
    max
}

fn number_in_name(name: &str) -> u64 {
    ARTIFACT_NUMBER
        .captures(name)
        .and_then(|c| c[1].parse().ok())
        .unwrap_or(0)
}

/// File stem used for article `number`, e.g. `wechat_article_07`.
pub fn artifact_stem(number: u64) -> String {
    format!("wechat_article_{:02}", number)
}
