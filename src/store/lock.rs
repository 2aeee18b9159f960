//! Cross-process lock built on exclusive file creation.
//!
//! Whoever creates the lock file owns the lock. Waiters poll, and a lock
//! file older than the stale window is assumed to belong to a crashed
//! holder and is removed. A holder that is merely slow can therefore be
//! preempted after the stale window; callers keep critical sections short.

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant, SystemTime};

use tracing::{debug, warn};

use crate::app::{FairwayError, Result};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(50);
pub const DEFAULT_STALE_AFTER: Duration = Duration::from_secs(5);
pub const DEFAULT_MAX_WAIT: Duration = Duration::from_secs(30);

static NEXT_TOKEN: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone)]
pub struct FileLock {
    path: PathBuf,
    poll_interval: Duration,
    stale_after: Duration,
    max_wait: Duration,
}

impl FileLock {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            stale_after: DEFAULT_STALE_AFTER,
            max_wait: DEFAULT_MAX_WAIT,
        }
    }

    /// Lock file guarding `target`: `<target>.lock` next to it.
    pub fn for_file(target: &Path) -> Self {
        let mut name = target.as_os_str().to_os_string();
        name.push(".lock");
        Self::new(PathBuf::from(name))
    }

    pub fn with_timing(mut self, poll_interval: Duration, stale_after: Duration, max_wait: Duration) -> Self {
        self.poll_interval = poll_interval;
        self.stale_after = stale_after;
        self.max_wait = max_wait;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Wait for the lock. The returned guard releases it when dropped.
    pub async fn acquire(&self) -> Result<LockGuard> {
        let token = format!(
            "{} {}",
            std::process::id(),
            NEXT_TOKEN.fetch_add(1, Ordering::Relaxed)
        );
        let started = Instant::now();

        loop {
            match OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&self.path)
            {
                Ok(mut file) => {
                    if let Err(e) = writeln!(file, "{}", token) {
                        let _ = fs::remove_file(&self.path);
                        return Err(e.into());
                    }
                    debug!(path = %self.path.display(), waited = ?started.elapsed(), "Lock acquired");
                    return Ok(LockGuard {
                        path: self.path.clone(),
                        token,
                    });
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    if self.clear_if_stale() {
                        continue;
                    }
                    let waited = started.elapsed();
                    if waited >= self.max_wait {
                        return Err(FairwayError::LockContention {
                            path: self.path.clone(),
                            waited,
                        });
                    }
                    tokio::time::sleep(self.poll_interval).await;
                }
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    // Parent directory missing on first use.
                    match self.path.parent() {
                        Some(parent) if !parent.as_os_str().is_empty() && !parent.exists() => {
                            fs::create_dir_all(parent)?;
                        }
                        _ => return Err(e.into()),
                    }
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn age(&self) -> Option<Duration> {
        let modified = fs::metadata(&self.path).ok()?.modified().ok()?;
        Some(
            SystemTime::now()
                .duration_since(modified)
                .unwrap_or(Duration::ZERO),
        )
    }

    /// Remove the lock file if it is older than the stale window. Returns
    /// true when the caller should retry immediately.
    fn clear_if_stale(&self) -> bool {
        let Some(age) = self.age() else {
            // Vanished between our create attempt and the metadata call.
            return true;
        };
        if age < self.stale_after {
            return false;
        }

        let holder = fs::read_to_string(&self.path).unwrap_or_default();
        // Re-check right before removing to narrow the window in which a
        // fresh lock taken by another waiter could be deleted.
        if self.age().is_some_and(|a| a < self.stale_after) {
            return false;
        }
        match fs::remove_file(&self.path) {
            Ok(()) => {
                warn!(
                    path = %self.path.display(),
                    holder = %holder.trim(),
                    age = ?age,
                    "Removed stale lock"
                );
                true
            }
            Err(e) if e.kind() == ErrorKind::NotFound => true,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Failed to remove stale lock");
                false
            }
        }
    }
}

/// Held lock. Dropping it deletes the lock file, on every exit path.
#[derive(Debug)]
pub struct LockGuard {
    path: PathBuf,
    token: String,
}

impl LockGuard {
    pub fn token(&self) -> &str {
        &self.token
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        match fs::read_to_string(&self.path) {
            Ok(content) if content.trim() == self.token => {
                if let Err(e) = fs::remove_file(&self.path) {
                    warn!(path = %self.path.display(), error = %e, "Failed to release lock");
                }
            }
            Ok(content) => {
                warn!(
                    path = %self.path.display(),
                    holder = %content.trim(),
                    "Lock was taken over by another process before release"
                );
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                warn!(path = %self.path.display(), "Lock file disappeared before release");
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Failed to read lock on release");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn backdate(path: &Path, by: Duration) {
        let file = OpenOptions::new().write(true).open(path).unwrap();
        file.set_modified(SystemTime::now() - by).unwrap();
    }

    #[tokio::test]
    async fn test_acquire_writes_pid_and_releases() {
        let dir = TempDir::new().unwrap();
        let lock = FileLock::new(dir.path().join("test.lock"));

        let guard = lock.acquire().await.unwrap();
        let content = fs::read_to_string(lock.path()).unwrap();
        assert!(content.starts_with(&std::process::id().to_string()));
        assert_eq!(content.trim(), guard.token());

        drop(guard);
        assert!(!lock.path().exists());
    }

    #[tokio::test]
    async fn test_creates_missing_parent() {
        let dir = TempDir::new().unwrap();
        let lock = FileLock::new(dir.path().join("nested/deeper/test.lock"));
        let guard = lock.acquire().await.unwrap();
        assert!(lock.path().exists());
        drop(guard);
    }

    #[tokio::test]
    async fn test_stale_lock_is_cleared() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("test.lock");
        fs::write(&path, "99999 1\n").unwrap();
        backdate(&path, Duration::from_secs(10));

        let lock = FileLock::new(&path);
        let started = Instant::now();
        let guard = lock.acquire().await.unwrap();
        assert!(started.elapsed() < Duration::from_secs(2));
        assert_ne!(fs::read_to_string(&path).unwrap().trim(), "99999 1");
        drop(guard);
    }

    #[tokio::test]
    async fn test_fresh_lock_times_out() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("test.lock");
        fs::write(&path, "99999 1\n").unwrap();

        let lock = FileLock::new(&path).with_timing(
            Duration::from_millis(10),
            Duration::from_secs(60),
            Duration::from_millis(100),
        );
        let err = lock.acquire().await.unwrap_err();
        assert!(matches!(err, FairwayError::LockContention { .. }));
        assert!(err.is_retryable());
        // someone else's lock is left alone
        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_waiter_proceeds_after_release() {
        let dir = TempDir::new().unwrap();
        let lock = Arc::new(FileLock::new(dir.path().join("test.lock")));

        let guard = lock.acquire().await.unwrap();
        let waiter = {
            let lock = lock.clone();
            tokio::spawn(async move { lock.acquire().await.map(|_| ()) })
        };
        tokio::time::sleep(Duration::from_millis(120)).await;
        assert!(!waiter.is_finished());
        drop(guard);

        waiter.await.unwrap().unwrap();
        assert!(!lock.path().exists());
    }

    #[tokio::test]
    async fn test_taken_over_lock_not_removed_by_old_holder() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("test.lock");
        let lock = FileLock::new(&path);

        let guard = lock.acquire().await.unwrap();
        fs::write(&path, "12345 7\n").unwrap();
        drop(guard);
        assert_eq!(fs::read_to_string(&path).unwrap(), "12345 7\n");
    }

    #[test]
    fn test_for_file_appends_suffix() {
        let lock = FileLock::for_file(Path::new("/data/failed_articles.json"));
        assert_eq!(lock.path(), Path::new("/data/failed_articles.json.lock"));
    }
}
