//! Keyed JSON record files shared by independent store instances.
//!
//! A file holds `{ "version": N, "records": { key: record } }`. Every mutation is a
//! locked read-merge-write: the lock is process-wide and keyed by the canonical file
//! path, so two stores opened separately on one path still serialize. Each write goes
//! to its own temp file in the target directory and replaces the file by rename, so
//! readers never see a partial document.

use std::collections::BTreeMap;
use std::fs;
use std::io::{ErrorKind, Write};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::debug;

pub const FORMAT_VERSION: u32 = 1;

static PATH_LOCKS: Lazy<DashMap<PathBuf, Arc<Mutex<()>>>> = Lazy::new(DashMap::new);

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("store document invalid: {0}")]
    Encoding(#[from] serde_json::Error),
    #[error("store path has no file name: {0}")]
    InvalidPath(String),
}

impl StoreError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Io(_))
    }
}

#[derive(Deserialize)]
struct Document<V> {
    #[serde(default = "no_records")]
    records: BTreeMap<String, V>,
}

fn no_records<V>() -> BTreeMap<String, V> {
    BTreeMap::new()
}

#[derive(Serialize)]
struct DocumentRef<'a, V> {
    version: u32,
    records: &'a BTreeMap<String, V>,
}

pub struct JsonRecordFile<V> {
    path: PathBuf,
    _records: PhantomData<fn() -> V>,
}

impl<V> JsonRecordFile<V>
where
    V: Serialize + DeserializeOwned,
{
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            _records: PhantomData,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current records; a missing or empty file reads as no records.
    pub fn load(&self) -> Result<BTreeMap<String, V>, StoreError> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(err) => return Err(err.into()),
        };
        if bytes.is_empty() {
            return Ok(BTreeMap::new());
        }
        let document: Document<V> = serde_json::from_slice(&bytes)?;
        Ok(document.records)
    }

    /// Locked read-merge-write. `mutate` returns its result and whether the records
    /// changed; unchanged records are not written back.
    pub fn update<T, F>(&self, mutate: F) -> Result<T, StoreError>
    where
        F: FnOnce(&mut BTreeMap<String, V>) -> (T, bool),
    {
        let dir = self.dir();
        fs::create_dir_all(&dir)?;
        let lock = self.path_lock(&dir)?;
        let _guard = lock.lock();

        let mut records = self.load()?;
        let (result, dirty) = mutate(&mut records);
        if dirty {
            self.replace(&dir, &records)?;
        }
        Ok(result)
    }

    fn dir(&self) -> PathBuf {
        match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }

    fn path_lock(&self, dir: &Path) -> Result<Arc<Mutex<()>>, StoreError> {
        let name = self
            .path
            .file_name()
            .ok_or_else(|| StoreError::InvalidPath(self.path.display().to_string()))?;
        let key = fs::canonicalize(dir)?.join(name);
        Ok(PATH_LOCKS.entry(key).or_default().clone())
    }

    fn replace(&self, dir: &Path, records: &BTreeMap<String, V>) -> Result<(), StoreError> {
        let mut tmp = NamedTempFile::new_in(dir)?;
        serde_json::to_writer_pretty(
            &mut tmp,
            &DocumentRef {
                version: FORMAT_VERSION,
                records,
            },
        )?;
        tmp.flush()?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|err| StoreError::Io(err.error))?;
        debug!(path = %self.path.display(), records = records.len(), "record file replaced");
        Ok(())
    }
}
