use crate::error::{HistoryError, Result};
use std::path::PathBuf;
use std::time::Duration;

/// CouchDB default listen address.
pub const DEFAULT_STORE_URL: &str = "http://127.0.0.1:5984";
pub const DEFAULT_BACKUP_DB: &str = "ingrid-backup";
pub const DEFAULT_HISTORY_DB: &str = "ingrid-history";
pub const DEFAULT_BACKUP_DEBOUNCE: Duration = Duration::from_secs(5);

/// Startup settings, fixed for the life of the process.
#[derive(Debug, Clone)]
pub struct Config {
    store_url: String,
    backup_db: String,
    history_db: String,
    /// `None` resolves to the platform cache directory.
    cache_dir: Option<PathBuf>,
    backup_debounce: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    /// Settings pointing at a local store with default database names.
    pub fn new() -> Self {
        Self {
            store_url: DEFAULT_STORE_URL.to_string(),
            backup_db: DEFAULT_BACKUP_DB.to_string(),
            history_db: DEFAULT_HISTORY_DB.to_string(),
            cache_dir: None,
            backup_debounce: DEFAULT_BACKUP_DEBOUNCE,
        }
    }

    /// Server address of the document store.
    pub fn with_store_url<S: Into<String>>(mut self, url: S) -> Self {
        self.store_url = url.into();
        self
    }

    /// Database receiving full-state backups.
    pub fn with_backup_db<S: Into<String>>(mut self, name: S) -> Self {
        self.backup_db = name.into();
        self
    }

    /// Database receiving history entries.
    pub fn with_history_db<S: Into<String>>(mut self, name: S) -> Self {
        self.history_db = name.into();
        self
    }

    /// Override the local cache directory.
    pub fn with_cache_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.cache_dir = Some(dir.into());
        self
    }

    /// Quiet period a snapshot must survive before it is backed up.
    pub fn with_backup_debounce(mut self, debounce: Duration) -> Self {
        self.backup_debounce = debounce;
        self
    }

    /// Server address of the document store.
    pub fn store_url(&self) -> &str {
        &self.store_url
    }

    /// Name of the backup database.
    pub fn backup_db(&self) -> &str {
        &self.backup_db
    }

    /// Name of the history database.
    pub fn history_db(&self) -> &str {
        &self.history_db
    }

    /// Trailing debounce applied to backups.
    pub fn backup_debounce(&self) -> Duration {
        self.backup_debounce
    }

    /// Explicit cache directory, or `<platform cache dir>/ingrid`.
    pub fn cache_dir(&self) -> Result<PathBuf> {
        if let Some(ref dir) = self.cache_dir {
            return Ok(dir.clone());
        }
        dirs::cache_dir()
            .map(|d| d.join("ingrid"))
            .ok_or(HistoryError::NoCacheDirectory)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.store_url(), "http://127.0.0.1:5984");
        assert_eq!(config.backup_db(), "ingrid-backup");
        assert_eq!(config.history_db(), "ingrid-history");
        assert_eq!(config.backup_debounce(), Duration::from_secs(5));
    }

    #[test]
    fn test_builder_overrides() {
        let config = Config::new()
            .with_store_url("http://couch:5984")
            .with_backup_db("b")
            .with_history_db("h")
            .with_cache_dir("/custom/cache")
            .with_backup_debounce(Duration::from_millis(10));
        assert_eq!(config.store_url(), "http://couch:5984");
        assert_eq!(config.backup_db(), "b");
        assert_eq!(config.history_db(), "h");
        assert_eq!(config.cache_dir().unwrap(), PathBuf::from("/custom/cache"));
        assert_eq!(config.backup_debounce(), Duration::from_millis(10));
    }

    #[test]
    fn test_default_cache_dir_ends_with_crate_name() {
        if let Ok(dir) = Config::new().cache_dir() {
            assert!(dir.ends_with("ingrid"));
        }
    }
}
