//! HMAC-SHA256 signed identity tokens.
//!
//! Token layout:
//!
//! ```text
//! <base64url-no-pad(json claims)>.<base64url-no-pad(HMAC-SHA256(first segment))>
//! ```
//!
//! The JSON claims use Firebase ID-token field names (`user_id`, `name`,
//! `email`, `picture`, `firebase.sign_in_provider`, `exp`).

use std::time::{SystemTime, UNIX_EPOCH};

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use hmac::{digest::InvalidLength, Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use thiserror::Error;

use crate::identity::IdentityClaim;

type HmacSha256 = Hmac<Sha256>;

/// Reasons a token is rejected. All of them mean "invalid token" to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum VerifyError {
    #[error("token is malformed")]
    Malformed,

    #[error("token signature does not verify")]
    BadSignature,

    #[error("token has expired")]
    Expired,
}

/// Turns an opaque token into a verified claim.
#[cfg_attr(test, mockall::automock)]
pub trait TokenVerifier: Send + Sync {
    fn verify(&self, token: &str) -> Result<IdentityClaim, VerifyError>;
}

#[derive(Debug, Deserialize)]
struct TokenClaims {
    #[serde(default)]
    user_id: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    picture: Option<String>,
    #[serde(default)]
    firebase: ProviderInfo,
    #[serde(default)]
    exp: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ProviderInfo {
    #[serde(default)]
    sign_in_provider: String,
}

impl From<TokenClaims> for IdentityClaim {
    fn from(c: TokenClaims) -> Self {
        IdentityClaim {
            subject_id: c.user_id,
            name: c.name,
            email: c.email,
            avatar: c.picture,
            provider: c.firebase.sign_in_provider,
        }
    }
}

/// Verifies tokens signed with a shared HMAC secret.
pub struct HmacTokenVerifier {
    mac: HmacSha256,
}

impl HmacTokenVerifier {
    /// Build a verifier for `secret`.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidLength`] if the MAC rejects the key.
    pub fn new(secret: &[u8]) -> Result<Self, InvalidLength> {
        Ok(Self {
            mac: HmacSha256::new_from_slice(secret)?,
        })
    }

    fn mac(&self) -> HmacSha256 {
        self.mac.clone()
    }

    /// Sign `claims` the way the identity provider would.
    #[cfg(test)]
    pub(crate) fn sign(&self, claims: &serde_json::Value) -> String {
        let payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(claims).unwrap());
        let mut mac = self.mac();
        mac.update(payload.as_bytes());
        let sig = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());
        format!("{payload}.{sig}")
    }
}

impl TokenVerifier for HmacTokenVerifier {
    fn verify(&self, token: &str) -> Result<IdentityClaim, VerifyError> {
        let (payload, signature) = token.split_once('.').ok_or(VerifyError::Malformed)?;
        let signature = URL_SAFE_NO_PAD
            .decode(signature)
            .map_err(|_| VerifyError::Malformed)?;

        let mut mac = self.mac();
        mac.update(payload.as_bytes());
        mac.verify_slice(&signature)
            .map_err(|_| VerifyError::BadSignature)?;

        let json = URL_SAFE_NO_PAD
            .decode(payload)
            .map_err(|_| VerifyError::Malformed)?;
        let claims: TokenClaims =
            serde_json::from_slice(&json).map_err(|_| VerifyError::Malformed)?;

        if let Some(exp) = claims.exp {
            let now = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or(u64::MAX);
            if exp <= now {
                return Err(VerifyError::Expired);
            }
        }

        Ok(claims.into())
    }
}

impl std::fmt::Debug for HmacTokenVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("HmacTokenVerifier([REDACTED])")
    }
}
