//! Identity row storage: the atomic upsert primitive and the bulk read.

use std::sync::Arc;

use rusqlite::{named_params, Row, TransactionBehavior};

use super::db::Database;
use super::StoreError;

/// One row of the `identities` table exactly as persisted.
///
/// `name` and `email` hold encrypted field strings, never plaintext.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredIdentity {
    pub subject_id: String,
    pub name: String,
    pub email: String,
    pub avatar: Option<String>,
    pub provider: String,
}

impl StoredIdentity {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            subject_id: row.get("subject_id")?,
            name: row.get("name")?,
            email: row.get("email")?,
            avatar: row.get("avatar")?,
            provider: row.get("provider")?,
        })
    }
}

/// Storage operations the identity layer relies on.
///
/// Implementations are blocking; callers move them onto the blocking pool.
#[cfg_attr(test, mockall::automock)]
pub trait IdentityStore: Send + Sync {
    /// Insert `row`, or on a `subject_id` conflict replace every other column,
    /// and return the resulting row. All-or-nothing.
    fn upsert_returning(&self, row: &StoredIdentity) -> Result<StoredIdentity, StoreError>;

    /// Return every stored row in subject id order.
    fn select_all(&self) -> Result<Vec<StoredIdentity>, StoreError>;

    /// Cheap liveness probe.
    fn ping(&self) -> Result<(), StoreError>;
}

const UPSERT_RETURNING: &str = "
    INSERT INTO identities (subject_id, name, email, avatar, provider)
    VALUES (:subject_id, :name, :email, :avatar, :provider)
    ON CONFLICT (subject_id) DO UPDATE
    SET name = excluded.name,
        email = excluded.email,
        avatar = excluded.avatar,
        provider = excluded.provider
    RETURNING subject_id, name, email, avatar, provider
";

const SELECT_ALL: &str = "
    SELECT subject_id, name, email, avatar, provider
    FROM identities
    ORDER BY subject_id
";

/// SQLite-backed [`IdentityStore`].
#[derive(Debug, Clone)]
pub struct SqliteIdentityStore {
    db: Arc<Database>,
}

impl SqliteIdentityStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }
}

impl IdentityStore for SqliteIdentityStore {
    fn upsert_returning(&self, row: &StoredIdentity) -> Result<StoredIdentity, StoreError> {
        let mut conn = self.db.conn()?;
        // IMMEDIATE takes the write lock up front so the conflict check and the
        // write happen under one lock.
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let stored = tx.query_row(
            UPSERT_RETURNING,
            named_params! {
                ":subject_id": row.subject_id,
                ":name": row.name,
                ":email": row.email,
                ":avatar": row.avatar,
                ":provider": row.provider,
            },
            StoredIdentity::from_row,
        )?;
        tx.commit()?;
        Ok(stored)
    }

    fn select_all(&self) -> Result<Vec<StoredIdentity>, StoreError> {
        let conn = self.db.conn()?;
        let mut stmt = conn.prepare(SELECT_ALL)?;
        let rows = stmt
            .query_map([], StoredIdentity::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn ping(&self) -> Result<(), StoreError> {
        self.db
            .conn()?
            .query_row("SELECT 1", [], |row| row.get::<_, i64>(0))?;
        Ok(())
    }
}
