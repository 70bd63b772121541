//! Synchronous local cache.
//!
//! Each key is one JSON file in the cache directory. Writes go through a
//! temp file and a rename, so a crash never leaves a half-written value.

use crate::error::{HistoryError, Result};
use crate::types::CacheRecord;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Key under which the editor's [`CacheRecord`] is kept.
pub const MAIN_KEY: &str = "ingrid-main";

/// Key/value store backed by one directory.
#[derive(Debug, Clone)]
pub struct LocalCache {
    dir: PathBuf,
}

impl LocalCache {
    /// Opens (and creates if needed) a cache rooted at `dir`.
    pub fn open<P: Into<PathBuf>>(dir: P) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    /// Directory holding the cached values.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Reads `key`. An absent key is `Ok(None)`.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let path = self.key_path(key);
        let data = match std::fs::read_to_string(&path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(serde_json::from_str(&data)?))
    }

    /// Replaces the value under `key`.
    pub fn set<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        let tmp = tempfile::NamedTempFile::new_in(&self.dir)?;
        serde_json::to_writer(&tmp, value)?;
        tmp.persist(self.key_path(key)).map_err(|e| e.error)?;
        Ok(())
    }

    /// Deletes `key`. Returns whether a value was there.
    pub fn remove(&self, key: &str) -> Result<bool> {
        match std::fs::remove_file(self.key_path(key)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// The editor record, with defaults for anything missing.
    ///
    /// A record that no longer parses is treated as absent, so the next
    /// write replaces it.
    pub fn record(&self) -> Result<CacheRecord> {
        match self.get(MAIN_KEY) {
            Ok(record) => Ok(record.unwrap_or_default()),
            Err(HistoryError::Json(e)) => {
                warn!(dir = %self.dir.display(), error = %e, "unreadable cache record, starting fresh");
                Ok(CacheRecord::default())
            }
            Err(e) => Err(e),
        }
    }

    /// Replaces the editor record.
    pub fn set_record(&self, record: &CacheRecord) -> Result<()> {
        self.set(MAIN_KEY, record)
    }

    /// Drops the walked path, keeping the cached snapshot.
    ///
    /// Used when the history store starts out empty, since any cached ids
    /// would point at entries that no longer exist. Returns whether a path
    /// was dropped.
    pub fn forget_history(&self) -> Result<bool> {
        let mut record = self.record()?;
        if record.redo_pointers.is_empty() {
            return Ok(false);
        }
        let dropped = record.redo_pointers.len();
        record.redo_pointers.clear();
        self.set_record(&record)?;
        info!(dropped, "cleared cached history path");
        Ok(true)
    }

    fn key_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", sanitize_key(key)))
    }
}

fn sanitize_key(key: &str) -> String {
    key.chars()
        .map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '-' | '_' | '.' => c,
            _ => '_',
        })
        .collect()
}
