//! Index of processed URLs, rebuilt from the rendered artifacts on disk.
//!
//! An artifact counts as proof of processing only while the file exists and
//! is larger than `min_artifact_size`; the size check keeps zero-byte and
//! truncated outputs from marking a URL done. The index is cached for
//! `cache_ttl` and rebuilt transparently when stale.

pub mod markers;
pub mod reconciled;

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::domain::{HistoryRecord, NormalizedUrl, RecordSource, RecordStatus};
use crate::normalizer::UrlNormalizer;

pub use markers::{extract_source_url, source_marker};
pub use reconciled::ReconciledHistory;

pub const ARTIFACT_EXTENSIONS: &[&str] = &["md", "html", "htm", "txt"];

/// Settings for [`HistoryStore`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// Artifacts at or below this many bytes do not count as processed (default: 1024)
    pub min_artifact_size: u64,
    /// Seconds before the index is rebuilt on the next lookup (default: 300)
    pub cache_ttl_secs: u64,
    /// Soft cap on indexed URLs; the oldest 10% are evicted above it (default: 10000)
    pub max_entries: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            min_artifact_size: 1024,
            cache_ttl_secs: 300,
            max_entries: 10_000,
        }
    }
}

impl HistoryConfig {
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}

/// One rendered article found on disk.
#[derive(Debug, Clone, PartialEq)]
pub struct ArtifactEntry {
    pub file_path: PathBuf,
    pub date_bucket: String,
    pub original_url: String,
    pub size: u64,
    pub modified: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RebuildStats {
    pub buckets: usize,
    pub files_scanned: usize,
    pub indexed: usize,
    pub too_small: usize,
    pub without_marker: usize,
    pub errors: usize,
    pub evicted: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchCheck {
    pub processed: Vec<String>,
    pub unprocessed: Vec<String>,
    pub errors: Vec<(String, String)>,
}

struct Snapshot {
    built_at: Instant,
    entries: HashMap<NormalizedUrl, ArtifactEntry>,
}

pub struct HistoryStore {
    content_dir: PathBuf,
    config: HistoryConfig,
    normalizer: UrlNormalizer,
    snapshot: Mutex<Option<Snapshot>>,
}

impl HistoryStore {
    pub fn new(content_dir: impl Into<PathBuf>, config: HistoryConfig) -> Self {
        Self {
            content_dir: content_dir.into(),
            config,
            normalizer: UrlNormalizer::new(),
            snapshot: Mutex::new(None),
        }
    }

    pub fn content_dir(&self) -> &Path {
        &self.content_dir
    }

    pub fn is_processed(&self, url: &str) -> bool {
        let key = self.normalizer.normalize(url);
        self.with_entries(|entries| {
            entries
                .get(&key)
                .is_some_and(|entry| self.still_valid(&entry.file_path))
        })
    }

    pub fn get_record(&self, url: &str) -> Option<HistoryRecord> {
        let key = self.normalizer.normalize(url);
        self.with_entries(|entries| {
            entries
                .get(&key)
                .filter(|entry| self.still_valid(&entry.file_path))
                .map(|entry| {
                    let mut record = HistoryRecord::new(
                        key.clone(),
                        entry.original_url.clone(),
                        RecordStatus::Success,
                        RecordSource::Artifact,
                    );
                    record.file_path = Some(entry.file_path.clone());
                    record.date_bucket = Some(entry.date_bucket.clone());
                    record.last_modified = Some(entry.modified);
                    record
                })
        })
    }

    pub fn batch_check<S: AsRef<str>>(&self, urls: &[S]) -> BatchCheck {
        let mut result = BatchCheck::default();
        self.with_entries(|entries| {
            for url in urls {
                let url = url.as_ref();
                if url.trim().is_empty() {
                    result.errors.push((url.to_string(), "empty URL".to_string()));
                    continue;
                }
                let key = self.normalizer.normalize(url);
                let processed = entries
                    .get(&key)
                    .is_some_and(|entry| self.still_valid(&entry.file_path));
                if processed {
                    result.processed.push(url.to_string());
                } else {
                    result.unprocessed.push(url.to_string());
                }
            }
        });
        result
    }

    /// Every indexed artifact as a history record.
    pub fn records(&self) -> Vec<HistoryRecord> {
        self.with_entries(|entries| {
            entries
                .iter()
                .map(|(key, entry)| {
                    let mut record = HistoryRecord::new(
                        key.clone(),
                        entry.original_url.clone(),
                        RecordStatus::Success,
                        RecordSource::Artifact,
                    );
                    record.file_path = Some(entry.file_path.clone());
                    record.date_bucket = Some(entry.date_bucket.clone());
                    record.last_modified = Some(entry.modified);
                    record
                })
                .collect()
        })
    }

    pub fn len(&self) -> usize {
        self.with_entries(|entries| entries.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Force the next lookup to rebuild.
    pub fn invalidate(&self) {
        if let Ok(mut guard) = self.snapshot.lock() {
            *guard = None;
        }
    }

    /// Rescan every date bucket and replace the index.
    pub fn rebuild(&self) -> RebuildStats {
        let (entries, stats) = self.scan();
        match self.snapshot.lock() {
            Ok(mut guard) => {
                *guard = Some(Snapshot {
                    built_at: Instant::now(),
                    entries,
                })
            }
            Err(poisoned) => {
                *poisoned.into_inner() = Some(Snapshot {
                    built_at: Instant::now(),
                    entries,
                })
            }
        }
        stats
    }

    fn with_entries<R>(&self, f: impl FnOnce(&HashMap<NormalizedUrl, ArtifactEntry>) -> R) -> R {
        let mut guard = self
            .snapshot
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let stale = guard
            .as_ref()
            .is_none_or(|s| s.built_at.elapsed() >= self.config.cache_ttl());
        if stale {
            let (entries, _) = self.scan();
            *guard = Some(Snapshot {
                built_at: Instant::now(),
                entries,
            });
        }
        match guard.as_ref() {
            Some(snapshot) => f(&snapshot.entries),
            None => f(&HashMap::new()),
        }
    }

    fn still_valid(&self, path: &Path) -> bool {
        fs::metadata(path).is_ok_and(|m| m.len() > self.config.min_artifact_size)
    }

    fn scan(&self) -> (HashMap<NormalizedUrl, ArtifactEntry>, RebuildStats) {
        let started = Instant::now();
        let mut stats = RebuildStats::default();
        let mut entries: HashMap<NormalizedUrl, ArtifactEntry> = HashMap::new();

        for (bucket_name, bucket_dir) in date_buckets(&self.content_dir) {
            stats.buckets += 1;
            for path in artifact_files(&bucket_dir, &mut stats) {
                stats.files_scanned += 1;
                match self.index_artifact(&path, &bucket_name, &mut stats) {
                    Some((key, entry)) => {
                        let newer = entries
                            .get(&key)
                            .is_none_or(|existing| entry.modified > existing.modified);
                        if newer {
                            entries.insert(key, entry);
                        }
                    }
                    None => continue,
                }
            }
        }

        stats.evicted = self.evict_oldest(&mut entries);
        stats.indexed = entries.len();
        info!(
            buckets = stats.buckets,
            files = stats.files_scanned,
            indexed = stats.indexed,
            too_small = stats.too_small,
            errors = stats.errors,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "History index rebuilt"
        );
        (entries, stats)
    }

    fn index_artifact(
        &self,
        path: &Path,
        bucket: &str,
        stats: &mut RebuildStats,
    ) -> Option<(NormalizedUrl, ArtifactEntry)> {
        let metadata = match fs::metadata(path) {
            Ok(m) => m,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Skipping unreadable artifact");
                stats.errors += 1;
                return None;
            }
        };
        if metadata.len() <= self.config.min_artifact_size {
            stats.too_small += 1;
            return None;
        }

        let bytes = match fs::read(path) {
            Ok(b) => b,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Skipping unreadable artifact");
                stats.errors += 1;
                return None;
            }
        };
        let content = String::from_utf8_lossy(&bytes);
        let Some(original_url) = extract_source_url(&content) else {
            debug!(path = %path.display(), "Artifact has no source URL marker");
            stats.without_marker += 1;
            return None;
        };

        let key = self.normalizer.normalize(&original_url);
        if key.is_empty() {
            stats.without_marker += 1;
            return None;
        }
        let modified = metadata
            .modified()
            .map(DateTime::<Utc>::from)
            .unwrap_or_else(|_| Utc::now());

        Some((
            key,
            ArtifactEntry {
                file_path: path.to_path_buf(),
                date_bucket: bucket.to_string(),
                original_url,
                size: metadata.len(),
                modified,
            },
        ))
    }

    /// Soft memory cap: above `max_entries`, drop the oldest tenth.
    fn evict_oldest(&self, entries: &mut HashMap<NormalizedUrl, ArtifactEntry>) -> usize {
        if entries.len() <= self.config.max_entries {
            return 0;
        }
        let count = (entries.len() / 10).max(1);
        let mut by_age: Vec<(DateTime<Utc>, NormalizedUrl)> = entries
            .iter()
            .map(|(k, e)| (e.modified, k.clone()))
            .collect();
        by_age.sort();
        for (_, key) in by_age.into_iter().take(count) {
            entries.remove(&key);
        }
        warn!(
            evicted = count,
            max_entries = self.config.max_entries,
            "History index over capacity, evicted oldest entries"
        );
        count
    }
}

/// Subdirectories of `content_dir` named like `2025-07-24`, oldest first.
pub fn date_buckets(content_dir: &Path) -> Vec<(String, PathBuf)> {
    let read = match fs::read_dir(content_dir) {
        Ok(read) => read,
        Err(e) => {
            debug!(path = %content_dir.display(), error = %e, "Content directory not readable");
            return Vec::new();
        }
    };

    let mut buckets: Vec<(String, PathBuf)> = read
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_ok_and(|t| t.is_dir()))
        .filter_map(|entry| {
            let name = entry.file_name().to_string_lossy().into_owned();
            NaiveDate::parse_from_str(&name, "%Y-%m-%d")
                .ok()
                .map(|_| (name, entry.path()))
        })
        .collect();
    buckets.sort();
    buckets
}

/// Artifact files in a bucket and its immediate subdirectories.
fn artifact_files(bucket_dir: &Path, stats: &mut RebuildStats) -> Vec<PathBuf> {
    let mut files = Vec::new();
    let mut dirs = vec![(bucket_dir.to_path_buf(), 0)];

    while let Some((dir, depth)) = dirs.pop() {
        let read = match fs::read_dir(&dir) {
            Ok(read) => read,
            Err(e) => {
                warn!(path = %dir.display(), error = %e, "Skipping unreadable directory");
                stats.errors += 1;
                continue;
            }
        };
        for entry in read.filter_map(|e| e.ok()) {
            let path = entry.path();
            let Ok(file_type) = entry.file_type() else {
                continue;
            };
            if file_type.is_dir() {
                if depth == 0 {
                    dirs.push((path, depth + 1));
                }
            } else if is_artifact(&path) {
                files.push(path);
            }
        }
    }
    files.sort();
    files
}

fn is_artifact(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| ARTIFACT_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
}
