//! CouchDB-compatible [`DocumentStore`] over HTTP.
//!
//! One [`CouchStore`] addresses one database. Documents are read and written
//! at `<server>/<db>/<id>`; database status comes from `<server>/<db>`.

use async_trait::async_trait;
use ingrid::{Document, DocumentStore, HistoryError, Result, Revision, StoreInfo};
use reqwest::{Client, StatusCode, Url};
use serde::Deserialize;
use tracing::{debug, info};

/// One database on a CouchDB-compatible server.
#[derive(Debug, Clone)]
pub struct CouchStore {
    client: Client,
    db_url: Url,
    db_name: String,
}

/// Body of a successful document write.
#[derive(Debug, Deserialize)]
struct PutResponse {
    rev: String,
}

/// Error body CouchDB sends with non-2xx responses.
#[derive(Debug, Default, Deserialize)]
struct CouchError {
    #[serde(default)]
    error: String,
    #[serde(default)]
    reason: String,
}

#[derive(Debug, Deserialize)]
struct DbInfo {
    db_name: String,
    #[serde(default)]
    doc_count: u64,
}

impl CouchStore {
    /// Store for database `db` on the server at `server`.
    pub fn new(server: &str, db: &str) -> Result<Self> {
        Self::with_client(Client::new(), server, db)
    }

    /// Like [`CouchStore::new`], sharing an existing HTTP client.
    pub fn with_client(client: Client, server: &str, db: &str) -> Result<Self> {
        let db_url = database_url(server, db)?;
        Ok(Self {
            client,
            db_url,
            db_name: db.to_string(),
        })
    }

    /// Database this store addresses.
    pub fn db_name(&self) -> &str {
        &self.db_name
    }

    /// Full URL of the database, `<server>/<db>`.
    pub fn db_url(&self) -> &Url {
        &self.db_url
    }

    /// Creates the database if it does not exist yet. Returns whether it was created.
    pub async fn ensure_database(&self) -> Result<bool> {
        let resp = self
            .client
            .put(self.db_url.clone())
            .send()
            .await
            .map_err(|e| transport_error(&self.db_url, e))?;

        match resp.status() {
            StatusCode::CREATED | StatusCode::ACCEPTED => {
                info!(db = %self.db_name, "created database");
                Ok(true)
            }
            StatusCode::PRECONDITION_FAILED => Ok(false),
            status => Err(status_error(status, &self.db_name, read_error(resp).await)),
        }
    }

    fn doc_url(&self, id: &str) -> Url {
        let mut url = self.db_url.clone();
        // db_url is always a base URL, checked in `database_url`.
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.push(id);
        }
        url
    }
}

#[async_trait]
impl DocumentStore for CouchStore {
    async fn get(&self, id: &str) -> Result<Document> {
        let url = self.doc_url(id);
        let resp = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| transport_error(&url, e))?;

        if !resp.status().is_success() {
            let status = resp.status();
            return Err(status_error(status, id, read_error(resp).await));
        }
        resp.json::<Document>()
            .await
            .map_err(|e| HistoryError::InvalidDocument {
                id: id.to_string(),
                reason: e.to_string(),
            })
    }

    async fn put(&self, doc: Document) -> Result<Revision> {
        let url = self.doc_url(&doc.id);
        let resp = self
            .client
            .put(url.clone())
            .json(&doc)
            .send()
            .await
            .map_err(|e| transport_error(&url, e))?;

        if !resp.status().is_success() {
            let status = resp.status();
            return Err(status_error(status, &doc.id, read_error(resp).await));
        }
        let body: PutResponse = resp
            .json()
            .await
            .map_err(|e| HistoryError::Other(anyhow::anyhow!("bad write response: {e}")))?;
        debug!(db = %self.db_name, id = %doc.id, rev = %body.rev, "document written");
        Ok(Revision(body.rev))
    }

    async fn info(&self) -> Result<StoreInfo> {
        let resp = self
            .client
            .get(self.db_url.clone())
            .send()
            .await
            .map_err(|e| transport_error(&self.db_url, e))?;

        if !resp.status().is_success() {
            let status = resp.status();
            return Err(status_error(status, &self.db_name, read_error(resp).await));
        }
        let body: DbInfo = resp
            .json()
            .await
            .map_err(|e| HistoryError::Other(anyhow::anyhow!("bad info response: {e}")))?;
        Ok(StoreInfo {
            db_name: body.db_name,
            doc_count: body.doc_count,
        })
    }
}

fn database_url(server: &str, db: &str) -> Result<Url> {
    let mut url = Url::parse(server)
        .map_err(|e| HistoryError::Other(anyhow::anyhow!("invalid store URL {server}: {e}")))?;
    url.path_segments_mut()
        .map_err(|_| HistoryError::Other(anyhow::anyhow!("store URL cannot be a base: {server}")))?
        .pop_if_empty()
        .push(db);
    Ok(url)
}

async fn read_error(resp: reqwest::Response) -> CouchError {
    resp.json().await.unwrap_or_default()
}

fn transport_error(url: &Url, err: reqwest::Error) -> HistoryError {
    HistoryError::Unreachable(format!("{url}: {err}"))
}

fn status_error(status: StatusCode, id: &str, body: CouchError) -> HistoryError {
    match status {
        StatusCode::NOT_FOUND => HistoryError::NotFound(id.to_string()),
        StatusCode::CONFLICT => HistoryError::Conflict(id.to_string()),
        s if s.is_server_error() => {
            HistoryError::Unreachable(format!("{id}: {s} {} {}", body.error, body.reason))
        }
        s => HistoryError::Other(anyhow::anyhow!(
            "{id}: {s} {} {}",
            body.error,
            body.reason
        )),
    }
}
