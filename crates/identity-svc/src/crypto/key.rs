//! [`FieldKey`]: the process-wide field encryption key.

use base64::{engine::general_purpose::STANDARD, Engine as _};

use super::cipher::{CipherError, KEY_LEN};

/// Fixed-size key buffer that holds exactly [`KEY_LEN`] bytes.
///
/// The key is loaded once at startup and handed to [`super::FieldCipher::new`].
/// When this type is dropped, the memory is overwritten with zeroes.
pub struct FieldKey(Box<[u8; KEY_LEN]>);

impl FieldKey {
    /// Build a key from raw bytes.
    ///
    /// # Errors
    ///
    /// Returns [`CipherError::InvalidKeyLength`] unless `bytes` is exactly
    /// [`KEY_LEN`] bytes long.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CipherError> {
        if bytes.len() != KEY_LEN {
            return Err(CipherError::InvalidKeyLength);
        }
        let mut buf = Box::new([0u8; KEY_LEN]);
        buf.copy_from_slice(bytes);
        Ok(Self(buf))
    }

    /// Parse a standard-alphabet base64 key as found in configuration.
    ///
    /// # Errors
    ///
    /// Returns [`CipherError::InvalidKeyEncoding`] if the text is not base64 and
    /// [`CipherError::InvalidKeyLength`] if it does not decode to [`KEY_LEN`] bytes.
    pub fn from_base64(encoded: &str) -> Result<Self, CipherError> {
        let mut raw = STANDARD
            .decode(encoded.trim())
            .map_err(|_| CipherError::InvalidKeyEncoding)?;
        let key = Self::from_bytes(&raw);
        raw.iter_mut().for_each(|b| *b = 0);
        key
    }

    pub(crate) fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }
}

impl Drop for FieldKey {
    fn drop(&mut self) {
        self.0.iter_mut().for_each(|b| *b = 0);
    }
}

impl std::fmt::Debug for FieldKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never print key material — not even in debug builds.
        f.write_str("FieldKey([REDACTED])")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_base64_key() {
        let encoded = STANDARD.encode([0x42u8; KEY_LEN]);
        let key = FieldKey::from_base64(&encoded).unwrap();
        assert_eq!(key.as_bytes(), &[0x42u8; KEY_LEN]);
    }

    #[test]
    fn tolerates_surrounding_whitespace() {
        let encoded = format!("  {}\n", STANDARD.encode([7u8; KEY_LEN]));
        assert!(FieldKey::from_base64(&encoded).is_ok());
    }

    #[test]
    fn rejects_short_key() {
        let encoded = STANDARD.encode([1u8; 16]);
        assert!(matches!(
            FieldKey::from_base64(&encoded),
            Err(CipherError::InvalidKeyLength)
        ));
    }

    #[test]
    fn rejects_non_base64() {
        assert!(matches!(
            FieldKey::from_base64("not base64 at all!"),
            Err(CipherError::InvalidKeyEncoding)
        ));
    }

    #[test]
    fn key_redacted_in_debug() {
        let key = FieldKey::from_bytes(&[0xFFu8; KEY_LEN]).unwrap();
        let dbg = format!("{key:?}");
        assert!(dbg.contains("REDACTED"));
        assert!(!dbg.contains("255"));
    }
}
