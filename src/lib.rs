//! # Fairway
//!
//! URL deduplication, history tracking and article-number allocation for a
//! golf-news scraping and republishing pipeline.
//!
//! ## Architecture
//!
//! Fairway sits between discovery producers and scrape workers:
//!
//! ```text
//! URL lists → Collector (+ HistoryStore) → NumberAllocator → Fetch/Write → Ledgers
//! ```
//!
//! Several worker processes may run at once. They share state only through
//! the filesystem: JSON ledgers written atomically under a lock file, and a
//! lock-guarded high-water mark for article numbers.
//!
//! ## Quick Start
//!
//! ```bash
//! # Show what is waiting to be processed
//! fairway status
//!
//! # Process everything pending
//! fairway run
//!
//! # Retry failed/incomplete URLs only
//! fairway continue
//!
//! # Mark failures that will never succeed as permanent
//! fairway filter
//! ```

/// Application context and error handling.
///
/// The [`AppContext`](app::AppContext) struct wires together the ledgers,
/// history store, allocator and fetcher from a loaded [`Config`](config::Config).
pub mod app;

/// Number allocation under a cross-process file lock.
pub mod allocator;

/// Failure taxonomy and the failure-ledger filter.
///
/// - [`FailureClassifier`](classifier::FailureClassifier): permanent vs retryable
/// - [`FailureFilter`](classifier::filter::FailureFilter): marks permanent failures in the ledger
pub mod classifier;

/// Command-line interface using clap.
pub mod cli;

/// Aggregation of pending URLs from every store into one worklist.
pub mod collector;

/// Configuration loaded from `~/.config/fairway/config.toml`.
pub mod config;

/// Core domain models.
///
/// - [`NormalizedUrl`](domain::NormalizedUrl): canonical URL key
/// - [`HistoryRecord`](domain::HistoryRecord): per-URL processing record
/// - [`FailureRecord`](domain::FailureRecord): failure ledger entry
/// - [`PendingWorkItem`](domain::PendingWorkItem): one unit of work
pub mod domain;

/// Processed-URL index built from rendered artifacts.
pub mod history;

/// Serde models for the legacy JSON ledgers.
pub mod ledger;

/// Background queue monitor with warning/critical thresholds.
///
/// - `fairway monitor` - start watching the queue
/// - `fairway monitor stop` - stop the monitor
/// - `fairway monitor status` - check if the monitor is running
pub mod monitor;

/// URL canonicalization and fuzzy similarity.
pub mod normalizer;

/// Processing pipeline: allocate, fetch, write, record.
///
/// - [`Fetcher`](pipeline::Fetcher): async trait for page fetching
/// - [`HttpFetcher`](pipeline::HttpFetcher): reqwest-based implementation
/// - [`Pipeline`](pipeline::Pipeline): semaphore-bounded worker pool
pub mod pipeline;

/// File-backed ledger persistence.
///
/// - [`LedgerStore`](store::LedgerStore): lock-guarded read-modify-write
/// - [`JsonLedger`](store::JsonLedger): JSON file implementation
/// - [`FileLock`](store::FileLock): lock file with stale-lock recovery
pub mod store;
