pub mod json;
pub mod lock;

use std::path::Path;

use async_trait::async_trait;

use crate::app::Result;

pub use json::{read_json, write_atomic, write_json_atomic, JsonLedger};
pub use lock::{FileLock, LockGuard};

/// Shared, file-backed document that several processes read and modify.
///
/// `update` is the only way to write: the read-modify-write runs with the
/// document's lock held and the result replaces the file atomically, so a
/// concurrent writer either sees all of a change or none of it.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    type Document: Default + Send;

    fn path(&self) -> &Path;

    /// Snapshot of the current document. Does not take the lock.
    fn load(&self) -> Result<Self::Document>;

    async fn update<F, R>(&self, mutate: F) -> Result<R>
    where
        F: FnOnce(&mut Self::Document) -> R + Send,
        R: Send;
}
