use crate::error::{HistoryError, Result};
use crate::store::Document;
use chrono::{DateTime, Utc};
use rand::distr::{Alphanumeric, SampleString};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

// ── Identifiers ──────────────────────────────────────────────────────

const STAMP_WIDTH: usize = 15;
const SUFFIX_LEN: usize = 12;

/// Identifier of a history entry.
///
/// The form is `<epoch millis, zero padded>_<random suffix>`, so identifiers
/// sort lexicographically in creation order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntryId(String);

impl EntryId {
    /// Generates a fresh id stamped with `now`.
    ///
    /// When `after` is given the stamp is bumped past it, which keeps ids
    /// strictly increasing even when the clock stalls or steps backwards.
    pub fn generate(now: DateTime<Utc>, after: Option<&EntryId>) -> Self {
        let mut stamp = now.timestamp_millis().max(0);
        if let Some(prev) = after.and_then(EntryId::timestamp_millis)
            && stamp <= prev
        {
            stamp = prev + 1;
        }
        let suffix = Alphanumeric.sample_string(&mut rand::rng(), SUFFIX_LEN);
        EntryId(format!("{stamp:0width$}_{suffix}", width = STAMP_WIDTH))
    }

    /// The millisecond stamp encoded in the id, if it has one.
    pub fn timestamp_millis(&self) -> Option<i64> {
        let (stamp, _) = self.0.split_once('_')?;
        stamp.parse().ok()
    }

    /// The id as written to the store.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntryId {
    fn from(s: &str) -> Self {
        EntryId(s.to_string())
    }
}

impl From<String> for EntryId {
    fn from(s: String) -> Self {
        EntryId(s)
    }
}

// ── Cursor ───────────────────────────────────────────────────────────

/// Opaque editor position. Equality is deep JSON equality.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Cursor(pub serde_json::Value);

impl From<serde_json::Value> for Cursor {
    fn from(v: serde_json::Value) -> Self {
        Cursor(v)
    }
}

impl From<&str> for Cursor {
    fn from(s: &str) -> Self {
        Cursor(serde_json::Value::String(s.to_string()))
    }
}

// ── History entry ────────────────────────────────────────────────────

/// One node of the history chain. Written once, never updated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    #[serde(rename = "_id")]
    pub id: EntryId,

    pub cursor: Cursor,

    /// Entry this one superseded; `None` marks the chain root.
    #[serde(
        rename = "pid",
        default,
        deserialize_with = "empty_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub parent_id: Option<EntryId>,

    #[serde(rename = "cAt", with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
}

impl HistoryEntry {
    /// New entry with a fresh id, stamped `now`.
    pub fn new(cursor: Cursor, parent_id: Option<EntryId>, now: DateTime<Utc>) -> Self {
        Self {
            id: EntryId::generate(now, parent_id.as_ref()),
            cursor,
            parent_id,
            created_at: now,
        }
    }

    /// Whether this is the first entry of the chain.
    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }

    /// Wire form, `{"_id", "cursor", "pid", "cAt"}`.
    pub fn to_document(&self) -> Result<Document> {
        Ok(serde_json::from_value(serde_json::to_value(self)?)?)
    }

    /// Parses a stored entry. Malformed documents are
    /// [`HistoryError::InvalidDocument`].
    pub fn from_document(doc: Document) -> Result<Self> {
        let id = doc.id.clone();
        serde_json::to_value(doc)
            .and_then(serde_json::from_value)
            .map_err(|e| HistoryError::InvalidDocument {
                id,
                reason: e.to_string(),
            })
    }
}

// Older hosts wrote `""` for the root's parent.
fn empty_as_none<'de, D>(deserializer: D) -> std::result::Result<Option<EntryId>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw.filter(|s| !s.is_empty()).map(EntryId))
}

// ── Cache record ─────────────────────────────────────────────────────

/// What the local cache keeps between runs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CacheRecord {
    /// Last application snapshot seen from the editor.
    pub snapshot: serde_json::Value,

    /// Walked path through the chain, most recent last.
    pub redo_pointers: Vec<EntryId>,
}

impl CacheRecord {
    /// Id of the entry the editor is currently positioned at.
    pub fn current(&self) -> Option<&EntryId> {
        self.redo_pointers.last()
    }
}

// ── Backups ──────────────────────────────────────────────────────────

/// Full-state backup written by the scheduler, keyed by its write time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupRecord {
    #[serde(rename = "_id")]
    pub id: String,

    pub model: serde_json::Value,

    #[serde(rename = "cAt", with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
}

impl BackupRecord {
    /// Backup of `model`, keyed by `now` in epoch milliseconds.
    pub fn new(model: serde_json::Value, now: DateTime<Utc>) -> Self {
        Self {
            id: now.timestamp_millis().to_string(),
            model,
            created_at: now,
        }
    }

    pub fn to_document(&self) -> Result<Document> {
        Ok(serde_json::from_value(serde_json::to_value(self)?)?)
    }
}
