//! [`IdentityReconciler`]: claim → encrypt → atomic upsert → decrypt.

use std::sync::Arc;

use common::protocol::{IdentityRecord, ListedIdentity, PiiField};
use tracing::{debug, instrument, warn};

use super::claim::IdentityClaim;
use super::error::{PersistenceError, ReconcileError};
use crate::crypto::{DecodeError, FieldCipher};
use crate::store::{IdentityStore, StoreError, StoredIdentity};

/// Turns verified claims into stored identities and reads them back.
///
/// Holds no locks of its own. Concurrent logins for one subject are resolved
/// by the store's atomic upsert; storage calls run on the blocking pool, so a
/// caller dropping the future never leaves a half-applied write.
#[derive(Clone)]
pub struct IdentityReconciler {
    cipher: FieldCipher,
    store: Arc<dyn IdentityStore>,
}

impl IdentityReconciler {
    pub fn new(cipher: FieldCipher, store: Arc<dyn IdentityStore>) -> Self {
        Self { cipher, store }
    }

    /// Store the latest claim for its subject and return the stored record,
    /// decrypted.
    ///
    /// # Errors
    ///
    /// - [`ReconcileError::InvalidClaim`] before any work if the subject id is blank.
    /// - [`PersistenceError::Storage`] if the upsert failed (nothing applied).
    /// - [`PersistenceError::CorruptedRecord`] if the returned row does not decrypt.
    #[instrument(skip_all, fields(subject_id = %claim.subject_id, provider = %claim.provider))]
    pub async fn reconcile(&self, claim: IdentityClaim) -> Result<IdentityRecord, ReconcileError> {
        let claim = claim.normalize()?;

        let row = StoredIdentity {
            name: self.cipher.encode(&claim.name)?,
            email: self.cipher.encode(&claim.email)?,
            subject_id: claim.subject_id,
            avatar: claim.avatar,
            provider: claim.provider,
        };

        let stored = self
            .blocking(move |store| store.upsert_returning(&row))
            .await?;

        let record = self.open(stored)?;
        debug!("identity reconciled");
        Ok(record)
    }

    /// Read every stored identity.
    ///
    /// Rows are fetched in one storage call and decrypted lazily as the
    /// returned listing is iterated. A field that fails to decrypt is rendered
    /// as `None` for that row only.
    ///
    /// # Errors
    ///
    /// Returns [`PersistenceError::Storage`] only if the select itself fails.
    pub async fn list_all(&self) -> Result<IdentityListing, ReconcileError> {
        let rows = self.blocking(|store| store.select_all()).await?;
        debug!(rows = rows.len(), "identities selected");
        Ok(IdentityListing {
            rows: rows.into_iter(),
            cipher: self.cipher.clone(),
        })
    }

    /// Whether the store answers a ping.
    pub async fn store_ready(&self) -> bool {
        match self.blocking(|store| store.ping()).await {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "identity store ping failed");
                false
            }
        }
    }

    async fn blocking<T, F>(&self, op: F) -> Result<T, PersistenceError>
    where
        T: Send + 'static,
        F: FnOnce(&dyn IdentityStore) -> Result<T, StoreError> + Send + 'static,
    {
        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || op(&*store))
            .await
            .map_err(|_| PersistenceError::Interrupted)?
            .map_err(PersistenceError::from)
    }

    fn open(&self, row: StoredIdentity) -> Result<IdentityRecord, PersistenceError> {
        let corrupted = |field, source| PersistenceError::CorruptedRecord {
            subject_id: row.subject_id.clone(),
            field,
            source,
        };
        let name = self
            .cipher
            .decode(&row.name)
            .map_err(|e| corrupted(PiiField::Name, e))?;
        let email = self
            .cipher
            .decode(&row.email)
            .map_err(|e| corrupted(PiiField::Email, e))?;

        Ok(IdentityRecord {
            subject_id: row.subject_id,
            name,
            email,
            avatar: row.avatar,
            provider: row.provider,
        })
    }
}

impl std::fmt::Debug for IdentityReconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityReconciler").finish_non_exhaustive()
    }
}

/// Single-pass iterator over stored identities, decrypting each row on demand.
#[derive(Debug)]
pub struct IdentityListing {
    rows: std::vec::IntoIter<StoredIdentity>,
    cipher: FieldCipher,
}

impl IdentityListing {
    fn open_field(
        &self,
        subject_id: &str,
        field: PiiField,
        value: &str,
        corrupted: &mut Vec<PiiField>,
    ) -> Option<String> {
        if value.is_empty() {
            return None;
        }
        match self.cipher.decode(value) {
            Ok(plaintext) => Some(plaintext),
            Err(e) => {
                report_corruption(subject_id, field, e);
                corrupted.push(field);
                None
            }
        }
    }
}

impl Iterator for IdentityListing {
    type Item = ListedIdentity;

    fn next(&mut self) -> Option<Self::Item> {
        let row = self.rows.next()?;
        let mut corrupted_fields = Vec::new();
        let name = self.open_field(&row.subject_id, PiiField::Name, &row.name, &mut corrupted_fields);
        let email =
            self.open_field(&row.subject_id, PiiField::Email, &row.email, &mut corrupted_fields);

        Some(ListedIdentity {
            subject_id: row.subject_id,
            name,
            email,
            avatar: row.avatar,
            provider: row.provider,
            corrupted_fields,
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.rows.size_hint()
    }
}

impl ExactSizeIterator for IdentityListing {}

fn report_corruption(subject_id: &str, field: PiiField, error: DecodeError) {
    warn!(subject_id, field = %field, error = %error, "stored identity field could not be decrypted");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{cipher::KEY_LEN, FieldKey};
    use crate::store::{Database, MockIdentityStore, SqliteIdentityStore};

    fn cipher(seed: u8) -> FieldCipher {
        FieldCipher::new(&FieldKey::from_bytes(&[seed; KEY_LEN]).unwrap()).unwrap()
    }

    fn sqlite() -> (Arc<Database>, Arc<SqliteIdentityStore>) {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let store = Arc::new(SqliteIdentityStore::new(Arc::clone(&db)));
        (db, store)
    }

    fn reconciler() -> (Arc<Database>, IdentityReconciler) {
        let (db, store) = sqlite();
        (db, IdentityReconciler::new(cipher(1), store))
    }

    fn claim(subject_id: &str, tag: &str) -> IdentityClaim {
        IdentityClaim {
            subject_id: subject_id.into(),
            name: Some(format!("Name {tag}")),
            email: Some(format!("{tag}@example.com")),
            avatar: Some(format!("https://img.example/{tag}.png")),
            provider: format!("provider-{tag}"),
        }
    }

    async fn listing(r: &IdentityReconciler) -> Vec<ListedIdentity> {
        r.list_all().await.unwrap().collect()
    }

    #[tokio::test]
    async fn reconcile_returns_plaintext_and_stores_ciphertext() {
        let (db, r) = reconciler();
        let record = r.reconcile(claim("uid-1", "a")).await.unwrap();
        assert_eq!(record.name, "Name a");
        assert_eq!(record.email, "a@example.com");
        assert_eq!(record.avatar.as_deref(), Some("https://img.example/a.png"));
        assert_eq!(record.provider, "provider-a");

        let (name, email): (String, String) = db
            .conn()
            .unwrap()
            .query_row(
                "SELECT name, email FROM identities WHERE subject_id = 'uid-1'",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .unwrap();
        assert!(name.starts_with("v1."));
        assert!(!name.contains("Name a"));
        assert!(!email.contains("example.com"));
    }

    #[tokio::test]
    async fn repeated_reconcile_converges() {
        let (_db, r) = reconciler();
        let first = r.reconcile(claim("uid-1", "a")).await.unwrap();
        let second = r.reconcile(claim("uid-1", "a")).await.unwrap();
        assert_eq!(first, second);

        let all = listing(&r).await;
        assert_eq!(all.len(), 1);
        assert_eq!(all[0], ListedIdentity::from(second));
    }

    #[tokio::test]
    async fn last_write_wins_without_merge() {
        let (_db, r) = reconciler();
        r.reconcile(claim("uid-1", "a")).await.unwrap();

        let b = IdentityClaim {
            subject_id: "uid-1".into(),
            name: Some("Name b".into()),
            email: None,
            avatar: None,
            provider: "password".into(),
        };
        let record = r.reconcile(b).await.unwrap();
        let expected = IdentityRecord {
            subject_id: "uid-1".into(),
            name: "Name b".into(),
            email: "uid-1@firebaseuser.local".into(),
            avatar: None,
            provider: "password".into(),
        };
        assert_eq!(record, expected);
        assert_eq!(listing(&r).await, vec![ListedIdentity::from(expected)]);
    }

    #[tokio::test]
    async fn default_claim_reconciles_with_placeholders() {
        let (_db, r) = reconciler();
        let bare = IdentityClaim {
            subject_id: "uid-anon".into(),
            name: None,
            email: None,
            avatar: None,
            provider: "anonymous".into(),
        };
        let record = r.reconcile(bare.clone()).await.unwrap();
        assert_eq!(record.name, "Anonymous");
        assert_eq!(record.email, "uid-anon@firebaseuser.local");

        let again = r.reconcile(bare).await.unwrap();
        assert_eq!(again.email, record.email);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_reconciles_leave_one_whole_claim() {
        let (_db, r) = reconciler();
        let claims: Vec<_> = (0..16).map(|i| claim("uid-race", &i.to_string())).collect();

        let handles: Vec<_> = claims
            .iter()
            .cloned()
            .map(|c| {
                let r = r.clone();
                tokio::spawn(async move { r.reconcile(c).await })
            })
            .collect();
        for h in handles {
            h.await.unwrap().unwrap();
        }

        let all = listing(&r).await;
        assert_eq!(all.len(), 1);
        let row = &all[0];
        let matched = claims.into_iter().any(|c| {
            row.name == c.name && row.email == c.email && row.avatar == c.avatar && row.provider == c.provider
        });
        assert!(matched, "stored row is a hybrid of several claims: {row:?}");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn racing_connections_on_one_file_leave_one_whole_claim() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("identities.db");
        let reconcilers: Vec<_> = (0..4)
            .map(|_| {
                let db = Arc::new(Database::open(&path).unwrap());
                IdentityReconciler::new(cipher(1), Arc::new(SqliteIdentityStore::new(db)))
            })
            .collect();
        let claims: Vec<_> = (0..32).map(|i| claim("uid-race", &i.to_string())).collect();

        let handles: Vec<_> = claims
            .iter()
            .cloned()
            .enumerate()
            .map(|(i, c)| {
                let r = reconcilers[i % reconcilers.len()].clone();
                tokio::spawn(async move { r.reconcile(c).await })
            })
            .collect();
        for h in handles {
            h.await.unwrap().unwrap();
        }

        let all = listing(&reconcilers[0]).await;
        assert_eq!(all.len(), 1);
        let row = &all[0];
        assert!(row.corrupted_fields.is_empty());
        let matched = claims.into_iter().any(|c| {
            row.name == c.name && row.email == c.email && row.avatar == c.avatar && row.provider == c.provider
        });
        assert!(matched, "stored row is a hybrid of several claims: {row:?}");
    }

    #[tokio::test]
    async fn listing_tolerates_a_corrupted_row() {
        let (db, r) = reconciler();
        r.reconcile(claim("uid-1", "a")).await.unwrap();
        r.reconcile(claim("uid-2", "b")).await.unwrap();
        r.reconcile(claim("uid-3", "c")).await.unwrap();

        db.conn()
            .unwrap()
            .execute(
                "UPDATE identities SET name = 'v1.garbage.garbage' WHERE subject_id = 'uid-2'",
                [],
            )
            .unwrap();

        let all = listing(&r).await;
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].name.as_deref(), Some("Name a"));
        assert_eq!(all[2].name.as_deref(), Some("Name c"));

        let broken = &all[1];
        assert_eq!(broken.subject_id, "uid-2");
        assert_eq!(broken.name, None);
        assert_eq!(broken.email.as_deref(), Some("b@example.com"));
        assert_eq!(broken.corrupted_fields, vec![PiiField::Name]);
    }

    #[tokio::test]
    async fn rotated_key_shows_up_as_corruption() {
        let (_db, store) = sqlite();
        let old = IdentityReconciler::new(cipher(1), store.clone());
        old.reconcile(claim("uid-1", "a")).await.unwrap();

        let rotated = IdentityReconciler::new(cipher(2), store);
        let all = listing(&rotated).await;
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].corrupted_fields, vec![PiiField::Name, PiiField::Email]);
        assert_eq!(all[0].provider, "provider-a");
    }

    #[tokio::test]
    async fn listing_is_lazy_and_single_pass() {
        let (_db, r) = reconciler();
        r.reconcile(claim("uid-1", "a")).await.unwrap();
        r.reconcile(claim("uid-2", "b")).await.unwrap();

        let mut listing = r.list_all().await.unwrap();
        assert_eq!(listing.len(), 2);
        assert_eq!(listing.next().unwrap().subject_id, "uid-1");
        assert_eq!(listing.len(), 1);
        assert_eq!(listing.next().unwrap().subject_id, "uid-2");
        assert!(listing.next().is_none());
    }

    #[tokio::test]
    async fn invalid_claim_never_touches_storage() {
        let mut store = MockIdentityStore::new();
        store.expect_upsert_returning().never();
        let r = IdentityReconciler::new(cipher(1), Arc::new(store));

        let err = r.reconcile(claim("  ", "a")).await.unwrap_err();
        assert!(matches!(err, ReconcileError::InvalidClaim(_)));
    }

    #[tokio::test]
    async fn storage_failure_is_persistence_error() {
        let mut store = MockIdentityStore::new();
        store
            .expect_upsert_returning()
            .times(1)
            .returning(|_| Err(StoreError::Poisoned));
        let r = IdentityReconciler::new(cipher(1), Arc::new(store));

        let err = r.reconcile(claim("uid-1", "a")).await.unwrap_err();
        assert!(matches!(
            err,
            ReconcileError::Persistence(PersistenceError::Storage(StoreError::Poisoned))
        ));
    }

    #[tokio::test]
    async fn undecryptable_returned_row_is_corrupted_record() {
        let mut store = MockIdentityStore::new();
        store.expect_upsert_returning().times(1).returning(|row| {
            let mut stored = row.clone();
            stored.name = "not-a-ciphertext".into();
            Ok(stored)
        });
        let r = IdentityReconciler::new(cipher(1), Arc::new(store));

        let err = r.reconcile(claim("uid-1", "a")).await.unwrap_err();
        match err {
            ReconcileError::Persistence(p) => {
                assert_eq!(p.corruption(), Some((PiiField::Name, DecodeError::Malformed)));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn select_failure_fails_listing() {
        let mut store = MockIdentityStore::new();
        store
            .expect_select_all()
            .times(1)
            .returning(|| Err(StoreError::Poisoned));
        let r = IdentityReconciler::new(cipher(1), Arc::new(store));
        assert!(matches!(
            r.list_all().await,
            Err(ReconcileError::Persistence(PersistenceError::Storage(_)))
        ));
    }

    #[tokio::test]
    async fn store_ready_reflects_ping() {
        let mut store = MockIdentityStore::new();
        store.expect_ping().times(1).returning(|| Err(StoreError::Poisoned));
        let r = IdentityReconciler::new(cipher(1), Arc::new(store));
        assert!(!r.store_ready().await);

        let (_db, healthy) = reconciler();
        assert!(healthy.store_ready().await);
    }
}
