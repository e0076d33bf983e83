//! Request and response types exchanged with HTTP callers.
//!
//! All types are serialised as JSON. Identity fields in these types are always
//! plaintext; ciphertext never leaves the service.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Login endpoint
// ---------------------------------------------------------------------------

/// Request body for `POST /api/auth/login`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    /// Opaque identity provider token.
    pub token: String,
}

/// Successful response body for `POST /api/auth/login`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginResponse {
    pub message: String,
    /// The stored identity after reconciliation, decrypted.
    pub user: IdentityRecord,
}

/// A stored identity with its PII fields decrypted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityRecord {
    pub subject_id: String,
    pub name: String,
    pub email: String,
    pub avatar: Option<String>,
    pub provider: String,
}

// ---------------------------------------------------------------------------
// Listing endpoint
// ---------------------------------------------------------------------------

/// Encrypted identity field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PiiField {
    Name,
    Email,
}

impl PiiField {
    /// Column / JSON name of the field.
    pub fn as_str(self) -> &'static str {
        match self {
            PiiField::Name => "name",
            PiiField::Email => "email",
        }
    }
}

impl std::fmt::Display for PiiField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One row of `GET /api/users`.
///
/// A field that could not be decrypted is rendered as `null` and named in
/// `corrupted_fields`; the rest of the listing is unaffected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListedIdentity {
    pub subject_id: String,
    pub name: Option<String>,
    pub email: Option<String>,
    pub avatar: Option<String>,
    pub provider: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub corrupted_fields: Vec<PiiField>,
}

impl From<IdentityRecord> for ListedIdentity {
    fn from(r: IdentityRecord) -> Self {
        Self {
            subject_id: r.subject_id,
            name: Some(r.name),
            email: Some(r.email),
            avatar: r.avatar,
            provider: r.provider,
            corrupted_fields: Vec::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Error response
// ---------------------------------------------------------------------------

/// Standard error response body returned on any non-2xx status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Short machine-readable error code (e.g. `"invalid_token"`).
    pub code: String,
    /// Human-readable description safe to expose to callers.
    pub message: String,
}

impl ErrorResponse {
    /// Construct an [`ErrorResponse`] from a code and message.
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Health check
// ---------------------------------------------------------------------------

/// Response body for `GET /health`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Overall service status: `"ok"` or `"degraded"`.
    pub status: String,
    /// Whether the identity database answered a ping.
    pub database_ready: bool,
}
