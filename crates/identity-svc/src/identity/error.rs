//! Error types for identity reconciliation.

use common::protocol::PiiField;
use common::ServiceError;
use thiserror::Error;

use crate::crypto::{CipherError, DecodeError};
use crate::store::StoreError;

/// Errors surfaced by [`super::IdentityReconciler`].
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// The claim is unusable; rejected before any cipher or storage work.
    #[error("invalid claim: {0}")]
    InvalidClaim(&'static str),

    /// A field could not be encrypted.
    #[error("field encryption failed: {0}")]
    Cipher(#[from] CipherError),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}

/// Storage-side failures.
#[derive(Debug, Error)]
pub enum PersistenceError {
    /// The storage call failed; nothing was applied.
    #[error("storage operation failed: {0}")]
    Storage(#[from] StoreError),

    /// The row was stored but one of its fields does not decrypt under the
    /// current key.
    #[error("stored {field} for subject {subject_id} could not be decrypted: {source}")]
    CorruptedRecord {
        subject_id: String,
        field: PiiField,
        #[source]
        source: DecodeError,
    },

    /// The blocking storage task panicked or was shut down.
    #[error("storage task did not complete")]
    Interrupted,
}

impl PersistenceError {
    /// Field and decode failure kind, when this is a corrupted record.
    pub fn corruption(&self) -> Option<(PiiField, DecodeError)> {
        match self {
            PersistenceError::CorruptedRecord { field, source, .. } => Some((*field, *source)),
            _ => None,
        }
    }
}

impl From<ReconcileError> for ServiceError {
    fn from(err: ReconcileError) -> Self {
        match err {
            ReconcileError::InvalidClaim(msg) => ServiceError::BadRequest(msg.into()),
            ReconcileError::Cipher(_) => ServiceError::Internal("field encryption failed".into()),
            ReconcileError::Persistence(PersistenceError::CorruptedRecord { .. }) => {
                ServiceError::Internal("stored identity could not be decrypted".into())
            }
            ReconcileError::Persistence(_) => {
                ServiceError::Internal("identity storage failed".into())
            }
        }
    }
}
