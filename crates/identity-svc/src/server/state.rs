//! Shared application state injected into every Axum handler.

use std::sync::Arc;

use crate::auth::TokenVerifier;
use crate::identity::IdentityReconciler;

/// Application state shared across all request handlers.
///
/// All fields are cheaply cloneable so that Axum can clone the state for each
/// request without copying expensive data.
#[derive(Clone)]
pub struct AppState {
    /// Verifies identity provider tokens.
    pub verifier: Arc<dyn TokenVerifier>,
    /// Encrypts, stores, and decrypts identities.
    pub reconciler: IdentityReconciler,
}

impl AppState {
    /// Create a new [`AppState`] from its collaborators.
    pub fn new(verifier: Arc<dyn TokenVerifier>, reconciler: IdentityReconciler) -> Self {
        Self {
            verifier,
            reconciler,
        }
    }
}
