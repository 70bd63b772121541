//! Undo/redo history chain.
//!
//! Entries form an append-only linked list in the history store, each one
//! pointing at the entry it superseded. The local cache holds the walked path
//! (the redo pointers): the last id is the current position, and every id is
//! the parent of the one before it. Undo pushes the parent, redo pops back
//! towards the newest entry, and a new edit collapses the path to one id.
//!
//! Every operation reads the path from the cache first and writes it back
//! only after all store calls succeeded, so a failed operation leaves the
//! path untouched.

use crate::cache::LocalCache;
use crate::error::Result;
use crate::store::DocumentStore;
use crate::types::{CacheRecord, Cursor, EntryId, HistoryEntry};
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info};

/// Result of recording a cursor.
#[derive(Debug, Clone, PartialEq)]
pub enum PersistOutcome {
    /// A new entry was written and is now the current position.
    Created(HistoryEntry),
    /// The cursor equals the current entry's cursor; nothing was written.
    DuplicateIgnored(EntryId),
}

/// Result of an undo or redo step.
#[derive(Debug, Clone, PartialEq)]
pub enum Navigation {
    /// The editor should restore this cursor.
    Restored(Cursor),
    /// Undo at the first entry of the chain.
    AtRoot,
    /// Redo with no entry ahead of the current position.
    NothingToRedo,
    /// No history has been recorded yet.
    Empty,
}

/// Undo/redo over a parent-linked chain of entries in a document store.
///
/// The walked path lives in the local cache; the entries themselves are
/// only ever added to the store.
pub struct HistoryChain {
    store: Arc<dyn DocumentStore>,
    cache: LocalCache,
}

impl HistoryChain {
    /// Chain over `store`, with its position kept in `cache`.
    pub fn new(store: Arc<dyn DocumentStore>, cache: LocalCache) -> Self {
        Self { store, cache }
    }

    /// The walked path as currently cached, most recent last.
    pub fn pointers(&self) -> Result<Vec<EntryId>> {
        Ok(self.cache.record()?.redo_pointers)
    }

    /// Reads one entry from the history store.
    pub async fn fetch(&self, id: &EntryId) -> Result<HistoryEntry> {
        let doc = self.store.get(id.as_str()).await?;
        HistoryEntry::from_document(doc)
    }

    /// Records `cursor` as a new history entry after the current position.
    ///
    /// Any entries reachable by redo are dropped from the path.
    pub async fn persist(&mut self, cursor: Cursor) -> Result<PersistOutcome> {
        let mut record = self.cache.record()?;
        let parent_id = record.current().cloned();

        if let Some(pid) = &parent_id {
            let parent = self.fetch(pid).await?;
            if parent.cursor == cursor {
                debug!(id = %pid, "cursor unchanged, history entry not written");
                return Ok(PersistOutcome::DuplicateIgnored(pid.clone()));
            }
        }

        let entry = HistoryEntry::new(cursor, parent_id, Utc::now());
        let rev = self.store.put(entry.to_document()?).await?;

        let dropped = record.redo_pointers.len().saturating_sub(1);
        record.redo_pointers = vec![entry.id.clone()];
        self.save(&record)?;

        debug!(
            id = %entry.id,
            parent = ?entry.parent_id,
            %rev,
            dropped,
            "history entry created"
        );
        Ok(PersistOutcome::Created(entry))
    }

    /// Steps one entry back towards the root.
    pub async fn undo(&mut self) -> Result<Navigation> {
        let mut record = self.cache.record()?;
        let Some(current_id) = record.current().cloned() else {
            debug!("undo with empty history");
            return Ok(Navigation::Empty);
        };

        let current = self.fetch(&current_id).await?;
        let Some(parent_id) = current.parent_id else {
            info!(id = %current_id, "undo reached the root of the history chain");
            return Ok(Navigation::AtRoot);
        };

        let parent = self.fetch(&parent_id).await?;
        record.redo_pointers.push(parent.id);
        self.save(&record)?;

        debug!(from = %current_id, to = %parent_id, depth = record.redo_pointers.len(), "undo");
        Ok(Navigation::Restored(parent.cursor))
    }

    /// Steps one entry forward along the walked path.
    pub async fn redo(&mut self) -> Result<Navigation> {
        let mut record = self.cache.record()?;
        let len = record.redo_pointers.len();
        if len < 2 {
            debug!(len, "nothing to redo");
            return Ok(Navigation::NothingToRedo);
        }

        let target_id = record.redo_pointers[len - 2].clone();
        let target = self.fetch(&target_id).await?;
        record.redo_pointers.pop();
        self.save(&record)?;

        debug!(to = %target_id, depth = record.redo_pointers.len(), "redo");
        Ok(Navigation::Restored(target.cursor))
    }

    /// Cursor of the cached current position, for resuming after a restart.
    pub async fn resume(&self) -> Result<Option<Cursor>> {
        let record = self.cache.record()?;
        let Some(current_id) = record.current() else {
            return Ok(None);
        };
        let entry = self.fetch(current_id).await?;
        info!(id = %current_id, "resuming history");
        Ok(Some(entry.cursor))
    }

    /// Entries from the current position back towards the root, newest first.
    ///
    /// Stops after `limit` entries when one is given.
    pub async fn lineage(&self, limit: Option<usize>) -> Result<Vec<HistoryEntry>> {
        let record = self.cache.record()?;
        let mut next = record.current().cloned();
        let mut entries = Vec::new();

        while let Some(id) = next {
            if limit.is_some_and(|max| entries.len() >= max) {
                break;
            }
            let entry = self.fetch(&id).await?;
            next = entry.parent_id.clone();
            entries.push(entry);
        }
        Ok(entries)
    }

    fn save(&self, record: &CacheRecord) -> Result<()> {
        // Re-read so a snapshot cached since the operation began is kept.
        let mut latest = self.cache.record()?;
        latest.redo_pointers = record.redo_pointers.clone();
        self.cache.set_record(&latest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HistoryError;
    use crate::store::MemoryStore;
    use serde_json::json;
    use tempfile::TempDir;

    fn setup_chain() -> (TempDir, Arc<MemoryStore>, HistoryChain) {
        let temp = TempDir::new().unwrap();
        let cache = LocalCache::open(temp.path()).unwrap();
        let store = Arc::new(MemoryStore::new("history"));
        let chain = HistoryChain::new(store.clone(), cache);
        (temp, store, chain)
    }

    fn restored(nav: Navigation) -> Cursor {
        match nav {
            Navigation::Restored(cursor) => cursor,
            other => panic!("expected a restored cursor, got {other:?}"),
        }
    }

    fn created(outcome: PersistOutcome) -> HistoryEntry {
        match outcome {
            PersistOutcome::Created(entry) => entry,
            other => panic!("expected a new entry, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_first_entry_is_root() {
        let (_temp, store, mut chain) = setup_chain();
        let entry = created(chain.persist(Cursor::from("A")).await.unwrap());
        assert!(entry.is_root());
        assert_eq!(chain.pointers().unwrap(), vec![entry.id.clone()]);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_entries_link_to_parent() {
        let (_temp, _store, mut chain) = setup_chain();
        let a = created(chain.persist(Cursor::from("A")).await.unwrap());
        let b = created(chain.persist(Cursor::from("B")).await.unwrap());
        assert_eq!(b.parent_id, Some(a.id.clone()));
        assert!(a.id < b.id);
        assert_eq!(chain.pointers().unwrap(), vec![b.id]);
    }

    #[tokio::test]
    async fn test_duplicate_cursor_is_ignored() {
        let (_temp, store, mut chain) = setup_chain();
        let a = created(chain.persist(Cursor(json!({"x": [1, 2]}))).await.unwrap());
        let outcome = chain.persist(Cursor(json!({"x": [1, 2]}))).await.unwrap();
        assert_eq!(outcome, PersistOutcome::DuplicateIgnored(a.id.clone()));
        assert_eq!(store.len(), 1);
        assert_eq!(chain.pointers().unwrap(), vec![a.id]);
    }

    #[tokio::test]
    async fn test_undo_walks_back_to_root() {
        let (_temp, _store, mut chain) = setup_chain();
        for c in ["c1", "c2", "c3", "c4"] {
            chain.persist(Cursor::from(c)).await.unwrap();
        }
        for expected in ["c3", "c2", "c1"] {
            assert_eq!(restored(chain.undo().await.unwrap()), Cursor::from(expected));
        }
        assert_eq!(chain.undo().await.unwrap(), Navigation::AtRoot);
        assert_eq!(chain.pointers().unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_undo_on_empty_history() {
        let (_temp, _store, mut chain) = setup_chain();
        assert_eq!(chain.undo().await.unwrap(), Navigation::Empty);
        assert!(chain.pointers().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_redo_after_undo_restores_previous() {
        let (_temp, _store, mut chain) = setup_chain();
        chain.persist(Cursor::from("A")).await.unwrap();
        chain.persist(Cursor::from("B")).await.unwrap();

        assert_eq!(restored(chain.undo().await.unwrap()), Cursor::from("A"));
        assert_eq!(restored(chain.redo().await.unwrap()), Cursor::from("B"));
        assert_eq!(chain.redo().await.unwrap(), Navigation::NothingToRedo);
    }

    #[tokio::test]
    async fn test_redo_retraces_multiple_undos() {
        let (_temp, _store, mut chain) = setup_chain();
        for c in ["A", "B", "C"] {
            chain.persist(Cursor::from(c)).await.unwrap();
        }
        chain.undo().await.unwrap();
        chain.undo().await.unwrap();
        assert_eq!(restored(chain.redo().await.unwrap()), Cursor::from("B"));
        assert_eq!(restored(chain.redo().await.unwrap()), Cursor::from("C"));
        assert_eq!(chain.redo().await.unwrap(), Navigation::NothingToRedo);
    }

    #[tokio::test]
    async fn test_new_edit_prunes_redo_branch() {
        let (_temp, _store, mut chain) = setup_chain();
        chain.persist(Cursor::from("A")).await.unwrap();
        chain.persist(Cursor::from("B")).await.unwrap();
        chain.undo().await.unwrap();

        let c = created(chain.persist(Cursor::from("C")).await.unwrap());
        assert_eq!(chain.pointers().unwrap(), vec![c.id]);
        assert_eq!(chain.redo().await.unwrap(), Navigation::NothingToRedo);

        // C branches from A, so undo goes straight back to A.
        assert_eq!(restored(chain.undo().await.unwrap()), Cursor::from("A"));
    }

    #[tokio::test]
    async fn test_persist_after_undo_compares_against_position() {
        let (_temp, store, mut chain) = setup_chain();
        chain.persist(Cursor::from("A")).await.unwrap();
        chain.persist(Cursor::from("B")).await.unwrap();
        chain.undo().await.unwrap();

        let outcome = chain.persist(Cursor::from("A")).await.unwrap();
        assert!(matches!(outcome, PersistOutcome::DuplicateIgnored(_)));
        assert_eq!(store.len(), 2);
        // Duplicate leaves redo available.
        assert_eq!(restored(chain.redo().await.unwrap()), Cursor::from("B"));
    }

    #[tokio::test]
    async fn test_missing_entry_leaves_pointers_unchanged() {
        let (temp, _store, mut chain) = setup_chain();
        let cache = LocalCache::open(temp.path()).unwrap();
        cache
            .set_record(&CacheRecord {
                snapshot: json!(null),
                redo_pointers: vec![EntryId::from("gone")],
            })
            .unwrap();

        let err = chain.undo().await.unwrap_err();
        assert!(matches!(err, HistoryError::NotFound(ref id) if id == "gone"));
        assert_eq!(chain.pointers().unwrap(), vec![EntryId::from("gone")]);

        let err = chain.persist(Cursor::from("A")).await.unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(chain.pointers().unwrap(), vec![EntryId::from("gone")]);
    }

    #[tokio::test]
    async fn test_resume_returns_current_cursor() {
        let (temp, store, mut chain) = setup_chain();
        chain.persist(Cursor::from("A")).await.unwrap();
        chain.persist(Cursor::from("B")).await.unwrap();
        chain.undo().await.unwrap();
        drop(chain);

        let reopened = HistoryChain::new(store, LocalCache::open(temp.path()).unwrap());
        assert_eq!(reopened.resume().await.unwrap(), Some(Cursor::from("A")));
    }

    #[tokio::test]
    async fn test_resume_without_history() {
        let (_temp, _store, chain) = setup_chain();
        assert_eq!(chain.resume().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_lineage_newest_first() {
        let (_temp, _store, mut chain) = setup_chain();
        for c in ["A", "B", "C"] {
            chain.persist(Cursor::from(c)).await.unwrap();
        }
        let cursors: Vec<Cursor> = chain
            .lineage(None)
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.cursor)
            .collect();
        assert_eq!(cursors, vec![Cursor::from("C"), Cursor::from("B"), Cursor::from("A")]);

        assert_eq!(chain.lineage(Some(2)).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_save_keeps_cached_snapshot() {
        let (temp, _store, mut chain) = setup_chain();
        let cache = LocalCache::open(temp.path()).unwrap();
        cache
            .set_record(&CacheRecord {
                snapshot: json!({"doc": 1}),
                redo_pointers: Vec::new(),
            })
            .unwrap();

        chain.persist(Cursor::from("A")).await.unwrap();
        assert_eq!(cache.record().unwrap().snapshot, json!({"doc": 1}));
    }
}
