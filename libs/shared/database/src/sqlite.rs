use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use rusqlite::{Connection, OptionalExtension, Transaction, TransactionBehavior};
use thiserror::Error;
use tracing::{debug, info};

pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Database connection lock poisoned: {0}")]
    LockPoisoned(String),
}

/// Process-wide SQLite handle.
///
/// Writes go through a single connection inside IMMEDIATE transactions. Reads use
/// a second connection; with WAL enabled they see the last committed state and
/// never wait for an in-flight write transaction.
pub struct Database {
    writer: Mutex<Connection>,
    reader: Mutex<Connection>,
}

impl Database {
    pub fn open(path: &str) -> Result<Self, DatabaseError> {
        let writer = open_sqlite_connection(path)?;
        let journal_mode: String =
            writer.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
        debug!("SQLite journal mode for {}: {}", path, journal_mode);

        let reader = open_sqlite_connection(path)?;

        info!("Opened database at {}", path);
        Ok(Self {
            writer: Mutex::new(writer),
            reader: Mutex::new(reader),
        })
    }

    /// Applies `ddl` once per `version`, recording it in `schema_version`.
    pub fn apply_schema(&self, version: i64, ddl: &str) -> Result<(), DatabaseError> {
        let conn = self.lock_writer()?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS schema_version (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
            );",
        )?;

        let current = read_schema_version(&conn)?;
        if current.is_some_and(|v| v >= version) {
            debug!("Schema version {} already applied", version);
            return Ok(());
        }

        conn.execute_batch(ddl)?;
        conn.execute("INSERT INTO schema_version (version) VALUES (?1)", [version])?;
        info!("Applied schema version {}", version);
        Ok(())
    }

    /// Runs `f` inside an IMMEDIATE transaction. The transaction commits only when
    /// `f` returns `Ok`; an error rolls every statement back.
    pub fn write<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&Transaction<'_>) -> Result<T, E>,
        E: From<DatabaseError>,
    {
        let mut conn = self.lock_writer()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(DatabaseError::from)?;
        let value = f(&tx)?;
        tx.commit().map_err(DatabaseError::from)?;
        Ok(value)
    }

    pub fn read<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&Connection) -> Result<T, E>,
        E: From<DatabaseError>,
    {
        let conn = self
            .reader
            .lock()
            .map_err(|e| DatabaseError::LockPoisoned(e.to_string()))?;
        f(&conn)
    }

    fn lock_writer(&self) -> Result<MutexGuard<'_, Connection>, DatabaseError> {
        self.writer
            .lock()
            .map_err(|e| DatabaseError::LockPoisoned(e.to_string()))
    }
}

pub fn configure_sqlite_connection(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.busy_timeout(Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS))?;
    Ok(())
}

pub fn open_sqlite_connection(path: &str) -> rusqlite::Result<Connection> {
    let conn = Connection::open(path)?;
    configure_sqlite_connection(&conn)?;
    Ok(conn)
}

fn read_schema_version(conn: &Connection) -> rusqlite::Result<Option<i64>> {
    conn.query_row("SELECT MAX(version) FROM schema_version", [], |row| row.get(0))
        .optional()
        .map(Option::flatten)
}
