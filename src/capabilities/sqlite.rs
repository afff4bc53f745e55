use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, error};

use super::kv::{validate_key, validate_value, KvBackend, KvError, StorageErrorCode};

/// SQLite-backed store for Rust-hosted shells: one `kv` table, every
/// statement touches one row.
pub struct SqliteKvStore {
    conn: Mutex<Connection>,
}

impl SqliteKvStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, KvError> {
        let conn = Connection::open(path.as_ref()).map_err(|e| map_sqlite_error(&e))?;
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self, KvError> {
        let conn = Connection::open_in_memory().map_err(|e| map_sqlite_error(&e))?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self, KvError> {
        conn.execute_batch(
            r"
            PRAGMA journal_mode = WAL;
            CREATE TABLE IF NOT EXISTS kv (
                key TEXT PRIMARY KEY NOT NULL,
                value BLOB NOT NULL,
                updated_at INTEGER NOT NULL
            );
            ",
        )
        .map_err(|e| {
            error!(error = %e, "failed to initialise kv schema");
            map_sqlite_error(&e)
        })?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, KvError> {
        self.conn
            .lock()
            .map_err(|_| {
                KvError::storage(StorageErrorCode::Locked, "sqlite connection lock poisoned")
            })
    }

    fn read(conn: &Connection, key: &str) -> Result<Option<Vec<u8>>, KvError> {
        conn.query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| {
            row.get::<_, Vec<u8>>(0)
        })
        .optional()
        .map_err(|e| map_sqlite_error(&e))
    }
}

impl KvBackend for SqliteKvStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, KvError> {
        validate_key(key)?;
        let conn = self.conn()?;
        Self::read(&conn, key)
    }

    fn set(&self, key: &str, value: Vec<u8>) -> Result<Option<Vec<u8>>, KvError> {
        validate_key(key)?;
        validate_value(&value)?;
        let now_ms = chrono::Utc::now().timestamp_millis();

        let conn = self.conn()?;
        let previous = Self::read(&conn, key)?;
        conn.execute(
            r"
            INSERT INTO kv (key, value, updated_at) VALUES (?1, ?2, ?3)
            ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at
            ",
            params![key, value, now_ms],
        )
        .map_err(|e| map_sqlite_error(&e))?;
        debug!(key, "kv write");
        Ok(previous)
    }

    fn delete(&self, key: &str) -> Result<Option<Vec<u8>>, KvError> {
        validate_key(key)?;
        let conn = self.conn()?;
        let previous = Self::read(&conn, key)?;
        conn.execute("DELETE FROM kv WHERE key = ?1", params![key])
            .map_err(|e| map_sqlite_error(&e))?;
        Ok(previous)
    }
}

fn map_sqlite_error(e: &rusqlite::Error) -> KvError {
    use rusqlite::ErrorCode;

    let code = match e.sqlite_error_code() {
        Some(ErrorCode::DatabaseBusy) => StorageErrorCode::Busy,
        Some(ErrorCode::DatabaseLocked) => StorageErrorCode::Locked,
        Some(ErrorCode::DiskFull) => StorageErrorCode::DiskFull,
        Some(ErrorCode::DatabaseCorrupt | ErrorCode::NotADatabase) => StorageErrorCode::Corrupted,
        Some(ErrorCode::PermissionDenied | ErrorCode::ReadOnly) => {
            StorageErrorCode::PermissionDenied
        }
        Some(ErrorCode::SystemIoFailure | ErrorCode::CannotOpen) => StorageErrorCode::IoError,
        _ => StorageErrorCode::Unknown,
    };
    KvError::storage(code, e.to_string())
}
