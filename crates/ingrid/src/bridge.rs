//! Routes editor messages to the history chain and the backup scheduler.
//!
//! A [`Context`] owns everything one editor session needs. Messages are
//! handled strictly one at a time; [`Context::spawn`] runs a single worker
//! that drains a queue, so an operation's store writes and cache update are
//! complete before the next message is looked at.

use crate::backup::{BackupHandle, BackupScheduler};
use crate::cache::LocalCache;
use crate::chain::{HistoryChain, Navigation, PersistOutcome};
use crate::config::Config;
use crate::error::{HistoryError, Result};
use crate::message::{Inbound, Outbound};
use crate::store::DocumentStore;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

// Titles of the `[title, description]` pairs sent to the editor.
pub const PERSIST_FAILED: &str = "History write failed";
pub const UNDO_FAILED: &str = "Undo failed";
pub const REDO_FAILED: &str = "Redo failed";
pub const RESTORE_FAILED: &str = "History restore failed";
pub const CACHE_FAILED: &str = "Cache write failed";
pub const INFO_FAILED: &str = "Store info failed";
pub const INVALID_MESSAGE: &str = "Invalid message";
pub const DUPLICATE_CURSOR: &str = "Duplicate cursor ignored";

/// The two document stores a session writes to.
#[derive(Clone)]
pub struct Stores {
    pub history: Arc<dyn DocumentStore>,
    pub backup: Arc<dyn DocumentStore>,
}

/// One editor session: history chain, cache, backups and the outbound channel.
pub struct Context {
    chain: HistoryChain,
    cache: LocalCache,
    backup: BackupHandle,
    outbound: mpsc::UnboundedSender<Outbound>,
}

impl Context {
    /// Opens the cache, checks both stores, starts the backup scheduler and
    /// sends the resumed cursor (if any) to the editor.
    ///
    /// Only a cache that cannot be opened is fatal; store problems are
    /// reported on `outbound` and the session continues.
    pub async fn init(
        config: &Config,
        stores: Stores,
        outbound: mpsc::UnboundedSender<Outbound>,
    ) -> Result<Self> {
        let cache = LocalCache::open(config.cache_dir()?)?;
        info!(cache = %cache.dir().display(), "opened local cache");

        for (role, store) in [("history", &stores.history), ("backup", &stores.backup)] {
            match store.info().await {
                Ok(status) => {
                    info!(role, db = %status.db_name, docs = status.doc_count, "document store ready")
                }
                Err(e) => report(&outbound, INFO_FAILED, &e),
            }
        }

        let backup = BackupScheduler::new(stores.backup, config.backup_debounce())
            .start(outbound.clone());
        let ctx = Self {
            chain: HistoryChain::new(stores.history, cache.clone()),
            cache,
            backup,
            outbound,
        };

        match ctx.chain.resume().await {
            Ok(Some(cursor)) => ctx.send(Outbound::History(cursor)),
            Ok(None) => debug!("no history to resume"),
            Err(e) => ctx.report(RESTORE_FAILED, &e),
        }
        Ok(ctx)
    }

    /// Handles one editor message. Failures are reported, never returned.
    pub async fn handle(&mut self, msg: Inbound) {
        debug!(msg = msg.name(), "handling editor message");
        match msg {
            Inbound::Cache(snapshot) => self.cache_snapshot(snapshot),
            Inbound::Undo => {
                let result = self.chain.undo().await;
                self.navigated(result, UNDO_FAILED);
            }
            Inbound::Redo => {
                let result = self.chain.redo().await;
                self.navigated(result, REDO_FAILED);
            }
            Inbound::PersistHistory(cursor) => match self.chain.persist(cursor).await {
                Ok(PersistOutcome::Created(_)) => {}
                Ok(PersistOutcome::DuplicateIgnored(id)) => self.send(Outbound::warning(
                    DUPLICATE_CURSOR,
                    format!("cursor is already recorded as {id}"),
                )),
                Err(e) => self.report(PERSIST_FAILED, &e),
            },
        }
    }

    /// Handles a message that may have failed to parse.
    pub async fn handle_parsed(&mut self, msg: Result<Inbound>) {
        match msg {
            Ok(msg) => self.handle(msg).await,
            Err(e) => self.report(INVALID_MESSAGE, &e),
        }
    }

    /// Runs the context on its own task, fed by the returned queue.
    pub fn spawn(self) -> BridgeHandle {
        let (tx, mut rx) = mpsc::unbounded_channel::<Result<Inbound>>();
        let task = tokio::spawn(async move {
            let mut ctx = self;
            while let Some(msg) = rx.recv().await {
                ctx.handle_parsed(msg).await;
            }
            ctx.shutdown().await;
        });
        BridgeHandle { tx, task }
    }

    /// Flushes a pending backup and stops the scheduler.
    pub async fn shutdown(self) {
        self.backup.shutdown().await;
        info!("history bridge stopped");
    }

    fn cache_snapshot(&mut self, snapshot: serde_json::Value) {
        let written = self.cache.record().and_then(|mut record| {
            record.snapshot = snapshot.clone();
            self.cache.set_record(&record)
        });
        if let Err(e) = written {
            self.report(CACHE_FAILED, &e);
        }
        self.backup.schedule(snapshot);
    }

    fn navigated(&self, result: Result<Navigation>, title: &str) {
        match result {
            Ok(Navigation::Restored(cursor)) => self.send(Outbound::History(cursor)),
            Ok(other) => debug!(outcome = ?other, "history unchanged"),
            Err(e) => self.report(title, &e),
        }
    }

    fn send(&self, msg: Outbound) {
        send(&self.outbound, msg);
    }

    fn report(&self, title: &str, err: &HistoryError) {
        report(&self.outbound, title, err);
    }
}

fn send(outbound: &mpsc::UnboundedSender<Outbound>, msg: Outbound) {
    if outbound.send(msg).is_err() {
        warn!("editor channel closed, message dropped");
    }
}

fn report(outbound: &mpsc::UnboundedSender<Outbound>, title: &str, err: &HistoryError) {
    error!(title, error = %err, "operation failed");
    send(outbound, Outbound::error(title, err.to_string()));
}

/// Queue into a spawned [`Context`].
pub struct BridgeHandle {
    tx: mpsc::UnboundedSender<Result<Inbound>>,
    task: tokio::task::JoinHandle<()>,
}

impl BridgeHandle {
    /// Queues an already parsed message.
    pub fn dispatch(&self, msg: Inbound) {
        self.enqueue(Ok(msg));
    }

    /// Parses a JSON envelope and queues it; parse errors are reported in order.
    pub fn dispatch_raw(&self, raw: &str) {
        self.enqueue(Inbound::parse(raw));
    }

    /// Waits for queued messages to drain, then shuts the context down.
    pub async fn close(self) {
        drop(self.tx);
        if let Err(e) = self.task.await {
            warn!(error = %e, "history bridge task ended abnormally");
        }
    }

    fn enqueue(&self, msg: Result<Inbound>) {
        if self.tx.send(msg).is_err() {
            warn!("history bridge stopped, message dropped");
        }
    }
}
