//! Identity provider token verification.
//!
//! Verification is a collaborator of the identity layer: once a token passes
//! here, the resulting [`IdentityClaim`](crate::identity::IdentityClaim) is
//! trusted without further checks.

pub mod verifier;

pub use verifier::{HmacTokenVerifier, TokenVerifier};

#[cfg(test)]
pub use verifier::MockTokenVerifier;
