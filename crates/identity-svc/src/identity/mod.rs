//! Identity reconciliation: verified claims in, one canonical decrypted record out.
//!
//! # Invariants
//!
//! - Exactly one stored row per subject id, however many logins race.
//! - A stored row always reflects one whole claim (last write wins, no merge).
//! - `name` and `email` are encrypted before they reach storage and decrypted
//!   on the way back; neither is ever logged.

pub mod claim;
pub mod error;
pub mod reconciler;

pub use claim::IdentityClaim;
pub use error::{PersistenceError, ReconcileError};
pub use reconciler::IdentityReconciler;
