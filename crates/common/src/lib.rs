//! Wire types and errors shared across `identity-svc` crates.

pub mod error;
pub mod protocol;

pub use error::ServiceError;
