//! Document store seam.
//!
//! History entries and backups live in a remote key/value document database
//! with CouchDB revision semantics. [`DocumentStore`] is the narrow contract
//! the rest of the crate relies on; [`MemoryStore`] implements it in process.

use crate::error::{HistoryError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Mutex;

/// A stored document in `{"_id", "_rev", ...body}` form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    #[serde(rename = "_id")]
    pub id: String,

    #[serde(rename = "_rev", default, skip_serializing_if = "Option::is_none")]
    pub rev: Option<String>,

    #[serde(flatten)]
    pub body: serde_json::Map<String, serde_json::Value>,
}

/// Revision token returned by a successful write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Revision(pub String);

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Database status as reported by `info()`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreInfo {
    pub db_name: String,
    pub doc_count: u64,
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Fetch a document by id. A missing id is [`HistoryError::NotFound`].
    async fn get(&self, id: &str) -> Result<Document>;

    /// Write a document. Writing an existing id without its current `_rev`
    /// is [`HistoryError::Conflict`].
    async fn put(&self, doc: Document) -> Result<Revision>;

    async fn info(&self) -> Result<StoreInfo>;
}

// ── In-memory store ──────────────────────────────────────────────────

/// Process-local [`DocumentStore`] with the same revision rules as the
/// remote database. Contents are lost when the process exits.
#[derive(Debug)]
pub struct MemoryStore {
    name: String,
    docs: Mutex<HashMap<String, Document>>,
}

impl MemoryStore {
    /// Empty store reporting `name` as its database name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            docs: Mutex::new(HashMap::new()),
        }
    }

    /// Number of stored documents.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Ids of all stored documents, sorted.
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.lock().keys().cloned().collect();
        ids.sort();
        ids
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Document>> {
        // A poisoned map is still structurally sound; every write is a single insert.
        self.docs.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn next_revision(previous: Option<&str>, body: &serde_json::Map<String, serde_json::Value>) -> String {
    let generation = previous
        .and_then(|rev| rev.split_once('-'))
        .and_then(|(n, _)| n.parse::<u64>().ok())
        .unwrap_or(0)
        + 1;
    let digest = fnv1a(serde_json::Value::Object(body.clone()).to_string().as_bytes());
    format!("{generation}-{digest:016x}")
}

fn fnv1a(bytes: &[u8]) -> u64 {
    bytes.iter().fold(0xcbf2_9ce4_8422_2325, |hash, b| {
        (hash ^ u64::from(*b)).wrapping_mul(0x0100_0000_01b3)
    })
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get(&self, id: &str) -> Result<Document> {
        self.lock()
            .get(id)
            .cloned()
            .ok_or_else(|| HistoryError::NotFound(id.to_string()))
    }

    async fn put(&self, mut doc: Document) -> Result<Revision> {
        let mut docs = self.lock();
        let current = docs.get(&doc.id).and_then(|d| d.rev.clone());
        if current != doc.rev {
            return Err(HistoryError::Conflict(doc.id));
        }
        let rev = next_revision(current.as_deref(), &doc.body);
        doc.rev = Some(rev.clone());
        docs.insert(doc.id.clone(), doc);
        Ok(Revision(rev))
    }

    async fn info(&self) -> Result<StoreInfo> {
        Ok(StoreInfo {
            db_name: self.name.clone(),
            doc_count: self.len() as u64,
        })
    }
}
