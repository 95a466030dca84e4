use aes_gcm::aead::Aead;
use aes_gcm::{Aes256Gcm, KeyInit, Nonce};
use rand::RngCore;

use crate::error::{CryptoError, CryptoResult};

/// Length of the random nonce prefixed to every ciphertext.
pub const NONCE_LEN: usize = 12;

/// A 256-bit shared secret.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret([u8; 32]);

impl Secret {
    /// Generate a new random secret.
    pub fn generate() -> Self {
        let mut bytes = [0u8; 32];
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Parse a secret from 64 hex characters.
    pub fn from_hex(s: &str) -> CryptoResult<Self> {
        let bytes = hex::decode(s).map_err(|_| CryptoError::InvalidKey)?;
        let arr: [u8; 32] = bytes.try_into().map_err(|_| CryptoError::InvalidKey)?;
        Ok(Self(arr))
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl std::fmt::Debug for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Secret(<redacted>)")
    }
}

/// Symmetric encryption of value payloads.
pub trait Cipher: Send + Sync {
    fn encrypt(&self, plaintext: &[u8]) -> CryptoResult<Vec<u8>>;
    fn decrypt(&self, ciphertext: &[u8]) -> CryptoResult<Vec<u8>>;
}

/// AES-256-GCM with a random nonce per message.
///
/// Output layout: `nonce (12 bytes) || ciphertext+tag`.
pub struct AesGcmCipher {
    secret: Secret,
}

impl AesGcmCipher {
    pub fn new(secret: Secret) -> Self {
        Self { secret }
    }

    fn aead(&self) -> CryptoResult<Aes256Gcm> {
        Aes256Gcm::new_from_slice(self.secret.as_bytes()).map_err(|_| CryptoError::InvalidKey)
    }
}

impl Cipher for AesGcmCipher {
    fn encrypt(&self, plaintext: &[u8]) -> CryptoResult<Vec<u8>> {
        let mut nonce = [0u8; NONCE_LEN];
        rand::rngs::OsRng.fill_bytes(&mut nonce);
        let ciphertext = self
            .aead()?
            .encrypt(Nonce::from_slice(&nonce), plaintext)
            .map_err(|e| CryptoError::Encryption(format!("AES-GCM encrypt failed: {e}")))?;

        let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&ciphertext);
        Ok(out)
    }

    fn decrypt(&self, ciphertext: &[u8]) -> CryptoResult<Vec<u8>> {
        if ciphertext.len() < NONCE_LEN {
            return Err(CryptoError::Decryption("payload too short".into()));
        }
        let (nonce, body) = ciphertext.split_at(NONCE_LEN);
        self.aead()?
            .decrypt(Nonce::from_slice(nonce), body)
            .map_err(|e| CryptoError::Decryption(format!("AES-GCM decrypt failed: {e}")))
    }
}

impl std::fmt::Debug for AesGcmCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AesGcmCipher").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encrypt_decrypt_roundtrip() {
        let cipher = AesGcmCipher::new(Secret::generate());
        let encrypted = cipher.encrypt(b"hello strata").unwrap();
        assert_ne!(&encrypted[NONCE_LEN..], b"hello strata");
        assert_eq!(cipher.decrypt(&encrypted).unwrap(), b"hello strata");
    }

    #[test]
    fn shared_secret_decrypts() {
        let secret = Secret::generate();
        let encrypted = AesGcmCipher::new(secret.clone()).encrypt(b"shared").unwrap();
        let other = AesGcmCipher::new(Secret::from_bytes(*secret.as_bytes()));
        assert_eq!(other.decrypt(&encrypted).unwrap(), b"shared");
    }

    #[test]
    fn wrong_secret_fails() {
        let encrypted = AesGcmCipher::new(Secret::generate()).encrypt(b"x").unwrap();
        let err = AesGcmCipher::new(Secret::generate())
            .decrypt(&encrypted)
            .unwrap_err();
        assert!(matches!(err, CryptoError::Decryption(_)));
    }

    #[test]
    fn nonces_are_fresh() {
        let cipher = AesGcmCipher::new(Secret::generate());
        assert_ne!(cipher.encrypt(b"same").unwrap(), cipher.encrypt(b"same").unwrap());
    }

    #[test]
    fn short_payload_is_rejected() {
        let cipher = AesGcmCipher::new(Secret::generate());
        assert!(cipher.decrypt(&[1, 2, 3]).is_err());
    }

    #[test]
    fn secret_hex_parsing() {
        let secret = Secret::from_hex(&"ab".repeat(32)).unwrap();
        assert_eq!(secret.as_bytes(), &[0xab; 32]);
        assert_eq!(Secret::from_hex("abcd"), Err(CryptoError::InvalidKey));
        assert_eq!(format!("{secret:?}"), "Secret(<redacted>)");
    }
}
