//! AES-256-GCM-SIV encryption and decryption of individual string fields.
//!
//! **Algorithm choice:** AES-256-GCM-SIV (RFC 8452) is nonce-misuse-resistant.
//! Every call to [`FieldCipher::encode`] draws a fresh 96-bit nonce, so two
//! encodings of the same plaintext differ. Stored ciphertext must never be
//! compared for equality.

use std::{fmt, str::FromStr, sync::Arc};

use aes_gcm_siv::{
    aead::{rand_core::RngCore, Aead, KeyInit, OsRng},
    Aes256GcmSiv, Nonce,
};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use thiserror::Error;

use super::key::FieldKey;

/// Byte length of an AES-256 key (32 bytes = 256 bits).
pub const KEY_LEN: usize = 32;

/// Byte length of an AES-GCM-SIV nonce (12 bytes = 96 bits).
pub const NONCE_LEN: usize = 12;

/// Byte length of the AES-GCM-SIV authentication tag.
pub const TAG_LEN: usize = 16;

/// Prefix that appears at the start of every encrypted field value.
pub const VERSION_PREFIX: &str = "v1";

/// Errors produced while building the cipher or encrypting a field.
#[derive(Debug, Error)]
pub enum CipherError {
    /// The key is the wrong length (must be [`KEY_LEN`] bytes).
    #[error("invalid field key length: expected {KEY_LEN} bytes")]
    InvalidKeyLength,

    /// The configured key text is not valid base64.
    #[error("field key is not valid base64")]
    InvalidKeyEncoding,

    /// AES-GCM-SIV encryption failed.
    #[error("aead operation failed")]
    AeadFailure,
}

/// Errors produced while decoding a stored ciphertext string.
///
/// Tampered data and data written under a different key both surface as
/// [`DecodeError::Integrity`] with the same message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// The string does not match `v1.<nonce>.<ciphertext>`.
    #[error("malformed encrypted field")]
    Malformed,

    /// The authentication tag did not verify.
    #[error("encrypted field failed integrity check")]
    Integrity,
}

/// A parsed, encrypted field value.
///
/// The string representation is `v1.<base64url(nonce)>.<base64url(ciphertext+tag)>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedField {
    /// Raw nonce bytes.
    pub nonce: [u8; NONCE_LEN],
    /// Raw ciphertext + authentication tag bytes.
    pub ciphertext: Vec<u8>,
}

impl fmt::Display for EncryptedField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}.{}",
            VERSION_PREFIX,
            URL_SAFE_NO_PAD.encode(self.nonce),
            URL_SAFE_NO_PAD.encode(&self.ciphertext),
        )
    }
}

impl FromStr for EncryptedField {
    type Err = DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.splitn(3, '.').collect();
        if parts.len() != 3 || parts[0] != VERSION_PREFIX {
            return Err(DecodeError::Malformed);
        }
        let nonce_bytes = URL_SAFE_NO_PAD
            .decode(parts[1])
            .map_err(|_| DecodeError::Malformed)?;
        let nonce: [u8; NONCE_LEN] = nonce_bytes
            .try_into()
            .map_err(|_| DecodeError::Malformed)?;

        let ciphertext = URL_SAFE_NO_PAD
            .decode(parts[2])
            .map_err(|_| DecodeError::Malformed)?;
        if ciphertext.len() < TAG_LEN {
            return Err(DecodeError::Malformed);
        }

        Ok(Self { nonce, ciphertext })
    }
}

/// Stateless field codec bound to one key for the life of the process.
///
/// Cheap to clone and safe to share across tasks; it holds no mutable state.
#[derive(Clone)]
pub struct FieldCipher {
    aead: Arc<Aes256GcmSiv>,
}

impl FieldCipher {
    /// Build the codec from the process-wide key.
    ///
    /// # Errors
    ///
    /// Returns [`CipherError::InvalidKeyLength`] if the AEAD rejects the key.
    pub fn new(key: &FieldKey) -> Result<Self, CipherError> {
        let aead = Aes256GcmSiv::new_from_slice(key.as_bytes())
            .map_err(|_| CipherError::InvalidKeyLength)?;
        Ok(Self {
            aead: Arc::new(aead),
        })
    }

    /// Encrypt one plaintext field into its storable string form.
    ///
    /// # Errors
    ///
    /// Returns [`CipherError::AeadFailure`] on an internal AEAD error (should be
    /// unreachable with a valid key and nonce).
    pub fn encode(&self, plaintext: &str) -> Result<String, CipherError> {
        self.encrypt_field(plaintext.as_bytes())
            .map(|field| field.to_string())
    }

    /// Decrypt a stored field back to the exact original plaintext.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::Malformed`] if the string is not a well-formed
    /// encrypted field, and [`DecodeError::Integrity`] if it was tampered with or
    /// encrypted under a different key.
    pub fn decode(&self, encoded: &str) -> Result<String, DecodeError> {
        let field: EncryptedField = encoded.parse()?;
        let plaintext = self.decrypt_field(&field)?;
        String::from_utf8(plaintext).map_err(|_| DecodeError::Malformed)
    }

    fn encrypt_field(&self, plaintext: &[u8]) -> Result<EncryptedField, CipherError> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .aead
            .encrypt(nonce, plaintext)
            .map_err(|_| CipherError::AeadFailure)?;

        Ok(EncryptedField {
            nonce: nonce_bytes,
            ciphertext,
        })
    }

    fn decrypt_field(&self, field: &EncryptedField) -> Result<Vec<u8>, DecodeError> {
        let nonce = Nonce::from_slice(&field.nonce);
        self.aead
            .decrypt(nonce, field.ciphertext.as_ref())
            .map_err(|_| DecodeError::Integrity)
    }
}

impl fmt::Debug for FieldCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FieldCipher([REDACTED])")
    }
}
