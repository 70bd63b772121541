#![doc = include_str!("../README.md")]

pub mod backup;
pub mod bridge;
pub mod cache;
pub mod chain;
pub mod config;
pub mod error;
pub mod message;
pub mod store;
pub mod types;

pub use backup::{BackupHandle, BackupScheduler};
pub use bridge::{BridgeHandle, Context, Stores};
pub use cache::LocalCache;
pub use chain::{HistoryChain, Navigation, PersistOutcome};
pub use config::Config;
pub use error::{HistoryError, Result};
pub use message::{Envelope, Inbound, Outbound};
pub use store::{Document, DocumentStore, MemoryStore, Revision, StoreInfo};
pub use types::{BackupRecord, CacheRecord, Cursor, EntryId, HistoryEntry};
