//! Relational storage for identity rows.
//!
//! The store only ever sees ciphertext for `name` and `email`. It exposes one
//! atomic insert-or-replace-returning write and one select-all read; the
//! identity layer builds everything else on top of these.

mod db;
mod error;
mod repository;

pub use db::Database;
pub use error::StoreError;
pub use repository::{IdentityStore, SqliteIdentityStore, StoredIdentity};

#[cfg(test)]
pub use repository::MockIdentityStore;
