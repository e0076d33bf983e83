//! AES-256-GCM-SIV field encryption for identity PII.
//!
//! This module is free of storage and HTTP dependencies. It turns one
//! plaintext string into one storable ciphertext string and back.
//!
//! # Ciphertext format
//!
//! ```text
//! v1.<base64url-no-pad(nonce)>.<base64url-no-pad(ciphertext+tag)>
//! ```
//!
//! A fresh random nonce is drawn for every field, so equal plaintexts never
//! produce equal ciphertexts. Compare identities on decrypted values only.

pub mod cipher;
pub mod key;

pub use cipher::{CipherError, DecodeError, FieldCipher};
pub use key::FieldKey;
