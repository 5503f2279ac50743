#![forbid(unsafe_code)]

use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use rusqlite::{params, Connection};
use sentiment_contracts::feedback_queue::{EntryId, FeedbackEntry, FeedbackRecordInput, StoreName};
use sentiment_contracts::sentiment::SentimentLabel;
use sentiment_contracts::{ContractViolation, UnixTimeMs, Validate};
use tracing::{debug, warn};

pub const FEEDBACK_STORE_SCHEMA_VERSION: i64 = 1;
const STORE_BUSY_TIMEOUT_MS: u64 = 5_000;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StorageError {
    #[error("feedback store unavailable: {reason}")]
    Unavailable { reason: String },
    #[error("write to {table} failed: {reason}")]
    Write { table: String, reason: String },
    #[error("read from {table} failed: {reason}")]
    Read { table: String, reason: String },
    #[error(transparent)]
    ContractViolation(#[from] ContractViolation),
}

impl StorageError {
    pub fn unavailable(reason: impl std::fmt::Display) -> Self {
        StorageError::Unavailable {
            reason: reason.to_string(),
        }
    }

    pub fn is_unavailable(&self) -> bool {
        matches!(self, StorageError::Unavailable { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreLocation {
    File(PathBuf),
    InMemory,
}

/// SQLite-backed queue of unsent feedback records.
///
/// Cloning is cheap and every clone shares one connection. Each mutation runs in
/// its own transaction, which rolls back if it is dropped before `commit`, so an
/// error on any path leaves the table as it was.
#[derive(Debug, Clone)]
pub struct FeedbackQueueStore {
    conn: Arc<Mutex<Connection>>,
    store_name: StoreName,
}

impl FeedbackQueueStore {
    /// Opens the store, creating the file and table if absent. Opening the same
    /// file again yields access to the same rows.
    pub fn open(location: &StoreLocation, store_name: StoreName) -> Result<Self, StorageError> {
        store_name.validate()?;
        let conn = match location {
            StoreLocation::File(path) => {
                if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                    std::fs::create_dir_all(parent).map_err(StorageError::unavailable)?;
                }
                Connection::open(path)
            }
            StoreLocation::InMemory => Connection::open_in_memory(),
        }
        .map_err(StorageError::unavailable)?;
        initialize_schema(&conn, &store_name)?;
        debug!(store = store_name.as_str(), location = ?location, "feedback store opened");
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            store_name,
        })
    }

    pub fn open_in_memory() -> Result<Self, StorageError> {
        Self::open(&StoreLocation::InMemory, StoreName::mvp_v1())
    }

    /// Persists one record and returns its generated id. Either the row is
    /// committed or nothing changes.
    pub fn enqueue(&self, input: &FeedbackRecordInput) -> Result<EntryId, StorageError> {
        input.validate()?;
        let timestamp = i64::try_from(input.timestamp.0).map_err(|_| {
            StorageError::ContractViolation(ContractViolation::InvalidValue {
                field: "feedback_record_input.timestamp",
                reason: "must fit a signed 64-bit integer",
            })
        })?;
        let mut conn = self.lock()?;
        let tx = conn.transaction().map_err(|e| self.write_error(e))?;
        tx.execute(
            &format!(
                "INSERT INTO {} (timestamp, sentiment) VALUES (?1, ?2)",
                self.store_name.as_str()
            ),
            params![timestamp, input.sentiment.as_str()],
        )
        .map_err(|e| self.write_error(e))?;
        let rowid = tx.last_insert_rowid();
        tx.commit().map_err(|e| self.write_error(e))?;
        let id = EntryId(rowid as u64);
        debug!(store = self.store_name.as_str(), id = id.0, "feedback entry enqueued");
        Ok(id)
    }

    /// Every committed entry, oldest first.
    pub fn drain(&self) -> Result<Vec<FeedbackEntry>, StorageError> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT id, timestamp, sentiment FROM {} ORDER BY id ASC",
                self.store_name.as_str()
            ))
            .map_err(|e| self.read_error(e))?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })
            .map_err(|e| self.read_error(e))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| self.read_error(e))?;

        let mut out = Vec::with_capacity(rows.len());
        for (id, timestamp, sentiment) in rows {
            let entry = SentimentLabel::new(sentiment).and_then(|label| {
                FeedbackEntry::v1(EntryId(id as u64), UnixTimeMs(timestamp.max(0) as u64), label)
            });
            match entry {
                Ok(entry) => out.push(entry),
                // A malformed row must not block delivery of the others.
                Err(err) => warn!(
                    store = self.store_name.as_str(),
                    id,
                    error = %err,
                    "skipping unreadable feedback row"
                ),
            }
        }
        Ok(out)
    }

    /// Deletes one entry. Returns whether a row was removed; an unknown id is
    /// not an error.
    pub fn remove(&self, id: EntryId) -> Result<bool, StorageError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction().map_err(|e| self.write_error(e))?;
        let removed = tx
            .execute(
                &format!("DELETE FROM {} WHERE id = ?1", self.store_name.as_str()),
                params![id.0 as i64],
            )
            .map_err(|e| self.write_error(e))?;
        tx.commit().map_err(|e| self.write_error(e))?;
        Ok(removed > 0)
    }

    pub fn pending_count(&self) -> Result<u64, StorageError> {
        let conn = self.lock()?;
        let count: i64 = conn
            .query_row(
                &format!("SELECT COUNT(*) FROM {}", self.store_name.as_str()),
                [],
                |row| row.get(0),
            )
            .map_err(|e| self.read_error(e))?;
        Ok(count.max(0) as u64)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StorageError> {
        self.conn
            .lock()
            .map_err(|_| StorageError::unavailable("feedback store connection mutex poisoned"))
    }

    fn write_error(&self, err: rusqlite::Error) -> StorageError {
        StorageError::Write {
            table: self.store_name.as_str().to_string(),
            reason: err.to_string(),
        }
    }

    fn read_error(&self, err: rusqlite::Error) -> StorageError {
        StorageError::Read {
            table: self.store_name.as_str().to_string(),
            reason: err.to_string(),
        }
    }
}

fn initialize_schema(conn: &Connection, store_name: &StoreName) -> Result<(), StorageError> {
    conn.busy_timeout(Duration::from_millis(STORE_BUSY_TIMEOUT_MS))
        .map_err(StorageError::unavailable)?;
    // First real read of the file; a corrupt or foreign file fails here.
    let user_version: i64 = conn
        .query_row("PRAGMA user_version", [], |row| row.get(0))
        .map_err(StorageError::unavailable)?;
    if user_version > FEEDBACK_STORE_SCHEMA_VERSION {
        return Err(StorageError::unavailable(format!(
            "schema version {user_version} is newer than supported {FEEDBACK_STORE_SCHEMA_VERSION}"
        )));
    }
    let _journal_mode: String = conn
        .query_row("PRAGMA journal_mode=WAL", [], |row| row.get(0))
        .map_err(StorageError::unavailable)?;
    conn.execute_batch(&format!(
        "
        PRAGMA synchronous=FULL;
        CREATE TABLE IF NOT EXISTS {} (
          id INTEGER PRIMARY KEY AUTOINCREMENT,
          timestamp INTEGER NOT NULL,
          sentiment TEXT NOT NULL
        );
        PRAGMA user_version={};
        ",
        store_name.as_str(),
        FEEDBACK_STORE_SCHEMA_VERSION
    ))
    .map_err(StorageError::unavailable)?;
    Ok(())
}
