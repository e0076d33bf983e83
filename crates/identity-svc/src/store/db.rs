//! SQLite database handle and schema migrations.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::Connection;
use tracing::debug;

use super::StoreError;

/// Wrapper around a single SQLite connection shared by all request tasks.
///
/// SQLite serialises writers itself; the mutex only hands the connection to one
/// blocking task at a time.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open (or create) the database file at `path` and run migrations.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        let _mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        Self::init(conn)
    }

    /// Open a private in-memory database (for testing only).
    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        let db = Self {
            conn: Mutex::new(conn),
        };
        db.run_migrations()?;
        Ok(db)
    }

    /// Lock the underlying connection.
    pub fn conn(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }

    fn run_migrations(&self) -> Result<(), StoreError> {
        self.conn()?.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS identities (
                subject_id  TEXT PRIMARY KEY NOT NULL,
                name        TEXT NOT NULL,
                email       TEXT NOT NULL,
                avatar      TEXT,
                provider    TEXT NOT NULL
            );
            ",
        )?;

        debug!("identity schema migrations completed");
        Ok(())
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database").finish_non_exhaustive()
    }
}
