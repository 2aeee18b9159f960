use std::fs;
use std::io::{ErrorKind, Write};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tempfile::NamedTempFile;

use crate::app::{FairwayError, Result};
use crate::store::{FileLock, LedgerStore};

/// A JSON document on disk, updated under its own lock file.
pub struct JsonLedger<T> {
    path: PathBuf,
    lock: FileLock,
    _doc: PhantomData<fn() -> T>,
}

impl<T> JsonLedger<T> {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let lock = FileLock::for_file(&path);
        Self {
            path,
            lock,
            _doc: PhantomData,
        }
    }

    pub fn with_lock(mut self, lock: FileLock) -> Self {
        self.lock = lock;
        self
    }
}

impl<T: DeserializeOwned + Default> JsonLedger<T> {
    fn read(&self) -> Result<T> {
        read_json(&self.path).map(Option::unwrap_or_default)
    }
}

#[async_trait]
impl<T> LedgerStore for JsonLedger<T>
where
    T: Serialize + DeserializeOwned + Default + Send,
{
    type Document = T;

    fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<T> {
        self.read()
    }

    async fn update<F, R>(&self, mutate: F) -> Result<R>
    where
        F: FnOnce(&mut T) -> R + Send,
        R: Send,
    {
        let _guard = self.lock.acquire().await?;
        let mut doc = self.read()?;
        let out = mutate(&mut doc);
        write_json_atomic(&self.path, &doc)?;
        Ok(out)
    }
}

/// Read a JSON file. A missing or blank file is `None`; unparseable
/// content is [`FairwayError::LedgerCorrupt`].
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    if content.trim().is_empty() {
        return Ok(None);
    }
    serde_json::from_str(&content)
        .map(Some)
        .map_err(|source| FairwayError::LedgerCorrupt {
            path: path.to_path_buf(),
            source,
        })
}

/// Write `value` to a temp file in the same directory, then rename it over
/// `path`. Readers never observe a partially written file.
pub fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&parent)?;

    let mut tmp = NamedTempFile::new_in(&parent)?;
    serde_json::to_writer_pretty(&mut tmp, value)?;
    tmp.write_all(b"\n")?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| FairwayError::Io(e.error))?;
    Ok(())
}

/// Same as [`write_json_atomic`] for arbitrary bytes.
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&parent)?;

    let mut tmp = NamedTempFile::new_in(&parent)?;
    tmp.write_all(contents)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| FairwayError::Io(e.error))?;
    Ok(())
}
