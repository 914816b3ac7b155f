//! Durable consumer progress.
//!
//! A store remembers the last cursor a consumer has processed and keeps an
//! append-only log of what it received. Both are updated together, so after a
//! crash the stored cursor never points past the last logged entry.

use async_trait::async_trait;
use chain_cursor_connector::Cursor;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sled::{
    transaction::{ConflictableTransactionError, TransactionError, TransactionalTree},
    Db,
};
use std::collections::VecDeque;
use thiserror::Error;
use tokio::sync::Mutex;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Db(#[from] sled::Error),

    #[error("Serialization failed: {0}")]
    Serialization(#[from] bincode::error::EncodeError),

    #[error("Deserialization failed: {0}")]
    Deserialization(#[from] bincode::error::DecodeError),

    #[error("Stored cursor is corrupt: {0}")]
    Corrupt(String),
}

/// One received cursor, as recorded in the log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub cursor: Cursor,
    pub received_at: DateTime<Utc>,
}

impl LogEntry {
    pub fn now(cursor: Cursor) -> Self {
        Self {
            cursor,
            received_at: Utc::now(),
        }
    }
}

/// Where a consumer keeps its position.
#[async_trait]
pub trait CursorStore: Send + Sync {
    /// The last committed cursor, or `None` if nothing was committed yet.
    async fn last_cursor(&self) -> Result<Option<Cursor>, StoreError>;

    /// Records `cursor` as processed and appends it to the log, atomically.
    ///
    /// Cursors at or behind the stored one are skipped, which makes redelivery
    /// after a reconnect harmless. Returns whether anything was written.
    async fn commit(&self, cursor: &Cursor) -> Result<bool, StoreError>;

    /// Every retained log entry, oldest first.
    async fn log(&self) -> Result<Vec<LogEntry>, StoreError>;
}

/// A `sled`-backed implementation of the `CursorStore` trait.
///
/// Keys are namespaced by consumer name, so several consumers can share one
/// database: `<name>::cursor` holds the decimal cursor and `<name>::log::<id>`
/// holds bincode-encoded [`LogEntry`] values.
#[derive(Clone)]
pub struct SledStore {
    db: Db,
    cursor_key: String,
    log_prefix: String,
}

impl SledStore {
    /// Creates a new instance of `SledStore`.
    ///
    /// # Arguments
    ///
    /// * `db` - A `sled::Db` instance.
    /// * `name` - The consumer name used to namespace keys.
    pub fn new(db: Db, name: &str) -> Self {
        Self {
            db,
            cursor_key: format!("{name}::cursor"),
            log_prefix: format!("{name}::log::"),
        }
    }

    /// Opens (or creates) the database at `path`.
    pub fn open(path: &str, name: &str) -> Result<Self, StoreError> {
        Ok(Self::new(sled::open(path)?, name))
    }
}

#[async_trait]
impl CursorStore for SledStore {
    async fn last_cursor(&self) -> Result<Option<Cursor>, StoreError> {
        self.db
            .get(&self.cursor_key)?
            .map(|v| decode_cursor(&v))
            .transpose()
    }

    async fn commit(&self, cursor: &Cursor) -> Result<bool, StoreError> {
        let entry = bincode::serde::encode_to_vec(
            LogEntry::now(cursor.clone()),
            bincode::config::standard(),
        )?;
        // Zero-padded so the log iterates in insertion order.
        let log_key = format!("{}{:020}", self.log_prefix, self.db.generate_id()?);
        let value = cursor.to_string();

        let written = self
            .db
            .transaction(
                |tx: &TransactionalTree| -> Result<bool, ConflictableTransactionError<StoreError>> {
                    if let Some(stored) = tx.get(&self.cursor_key)? {
                        let stored =
                            decode_cursor(&stored).map_err(ConflictableTransactionError::Abort)?;
                        if *cursor <= stored {
                            return Ok(false);
                        }
                    }
                    tx.insert(self.cursor_key.as_bytes(), value.as_bytes())?;
                    tx.insert(log_key.as_bytes(), entry.as_slice())?;
                    Ok(true)
                },
            )
            .map_err(|e| match e {
                TransactionError::Abort(e) => e,
                TransactionError::Storage(e) => StoreError::Db(e),
            })?;

        if written {
            self.db.flush_async().await?;
        } else {
            tracing::debug!(cursor = %cursor, "Cursor already committed, skipping.");
        }
        Ok(written)
    }

    async fn log(&self) -> Result<Vec<LogEntry>, StoreError> {
        self.db
            .scan_prefix(&self.log_prefix)
            .values()
            .map(|v| -> Result<LogEntry, StoreError> {
                let (entry, _) =
                    bincode::serde::decode_from_slice(&v?, bincode::config::standard())?;
                Ok(entry)
            })
            .collect()
    }
}

fn decode_cursor(bytes: &[u8]) -> Result<Cursor, StoreError> {
    let s = std::str::from_utf8(bytes).map_err(|e| StoreError::Corrupt(e.to_string()))?;
    s.parse()
        .map_err(|e| StoreError::Corrupt(format!("'{s}': {e}")))
}

/// An in-process `CursorStore`. Progress is lost when the process exits.
///
/// The log keeps only the most recent entries, so a long-running consumer
/// holds a bounded amount of memory. A capacity of zero keeps no log at all,
/// only the last cursor.
pub struct MemoryStore {
    capacity: usize,
    inner: Mutex<MemoryInner>,
}

#[derive(Default)]
struct MemoryInner {
    last: Option<Cursor>,
    log: VecDeque<LogEntry>,
}

impl MemoryStore {
    /// Entries kept by [`MemoryStore::new`].
    pub const DEFAULT_LOG_CAPACITY: usize = 1024;

    pub fn new() -> Self {
        Self::with_log_capacity(Self::DEFAULT_LOG_CAPACITY)
    }

    pub fn with_log_capacity(capacity: usize) -> Self {
        Self {
            capacity,
            inner: Mutex::default(),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CursorStore for MemoryStore {
    async fn last_cursor(&self) -> Result<Option<Cursor>, StoreError> {
        Ok(self.inner.lock().await.last.clone())
    }

    async fn commit(&self, cursor: &Cursor) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().await;
        if inner.last.as_ref().is_some_and(|last| cursor <= last) {
            return Ok(false);
        }
        inner.last = Some(cursor.clone());
        if self.capacity > 0 {
            if inner.log.len() == self.capacity {
                inner.log.pop_front();
            }
            inner.log.push_back(LogEntry::now(cursor.clone()));
        }
        Ok(true)
    }

    async fn log(&self) -> Result<Vec<LogEntry>, StoreError> {
        Ok(self.inner.lock().await.log.iter().cloned().collect())
    }
}
