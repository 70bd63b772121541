//! Debounced full-state backups.
//!
//! Snapshots handed to a running scheduler are held until no new snapshot
//! has arrived for the debounce interval; only the latest one is written.
//! Backups run on their own task and never wait on the history chain.

use crate::error::Result;
use crate::message::Outbound;
use crate::store::{DocumentStore, Revision};
use crate::types::BackupRecord;
use chrono::{DateTime, TimeDelta, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, error, warn};

pub const BACKUP_FAILED: &str = "Backup failed";

/// Writes application snapshots to the backup store.
pub struct BackupScheduler {
    store: Arc<dyn DocumentStore>,
    debounce: Duration,
    last_written: Option<DateTime<Utc>>,
}

impl BackupScheduler {
    /// Scheduler writing to `store` once `debounce` has passed without a new snapshot.
    pub fn new(store: Arc<dyn DocumentStore>, debounce: Duration) -> Self {
        Self {
            store,
            debounce,
            last_written: None,
        }
    }

    /// Writes `snapshot` right away, keyed by the current time.
    pub async fn backup(&mut self, snapshot: serde_json::Value) -> Result<Revision> {
        let mut now = Utc::now();
        // Keys are millisecond stamps; two writes must not share one.
        if let Some(last) = self.last_written
            && now <= last
        {
            now = last + TimeDelta::milliseconds(1);
        }
        let record = BackupRecord::new(snapshot, now);
        let rev = self.store.put(record.to_document()?).await?;
        self.last_written = Some(now);
        debug!(id = %record.id, %rev, "backup written");
        Ok(rev)
    }

    /// Spawns the debounce loop. Write failures are sent to `outbound`.
    pub fn start(self, outbound: mpsc::UnboundedSender<Outbound>) -> BackupHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(self.run(rx, outbound));
        BackupHandle { tx, task }
    }

    async fn run(
        mut self,
        mut rx: mpsc::UnboundedReceiver<serde_json::Value>,
        outbound: mpsc::UnboundedSender<Outbound>,
    ) {
        while let Some(first) = rx.recv().await {
            let mut pending = first;
            let mut deadline = Instant::now() + self.debounce;
            let mut closed = false;

            loop {
                tokio::select! {
                    next = rx.recv() => match next {
                        Some(snapshot) => {
                            pending = snapshot;
                            deadline = Instant::now() + self.debounce;
                        }
                        None => {
                            closed = true;
                            break;
                        }
                    },
                    _ = tokio::time::sleep_until(deadline) => break,
                }
            }

            if let Err(e) = self.backup(pending).await {
                error!(error = %e, "backup write failed");
                if outbound.send(Outbound::error(BACKUP_FAILED, e.to_string())).is_err() {
                    debug!("editor channel closed, backup failure not delivered");
                }
            }

            if closed {
                break;
            }
        }
    }
}

/// Handle to a running [`BackupScheduler`].
pub struct BackupHandle {
    tx: mpsc::UnboundedSender<serde_json::Value>,
    task: tokio::task::JoinHandle<()>,
}

impl BackupHandle {
    /// Queues `snapshot`, replacing any snapshot still waiting out the debounce.
    pub fn schedule(&self, snapshot: serde_json::Value) {
        if self.tx.send(snapshot).is_err() {
            warn!("backup scheduler stopped, snapshot dropped");
        }
    }

    /// Stops the scheduler, writing a pending snapshot without waiting.
    pub async fn shutdown(self) {
        drop(self.tx);
        if let Err(e) = self.task.await {
            warn!(error = %e, "backup scheduler task ended abnormally");
        }
    }
}
