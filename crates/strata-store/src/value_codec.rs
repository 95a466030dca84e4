use std::sync::Arc;

use strata_crypto::Cipher;

use crate::error::{StoreError, StoreResult};

const TAG_PLAIN: u8 = 0x00;
const TAG_ENCRYPTED: u8 = 0x01;

/// Encodes property payloads for the value partition.
///
/// Plain frames are `0x00 || crc32 (LE) || payload`. With a cipher, frames
/// are `0x01 || cipher output`. A codec only decodes frames of its own kind;
/// anything else, including a failed checksum or authentication, is
/// [`StoreError::Decoding`].
#[derive(Clone, Default)]
pub struct ValueCodec {
    cipher: Option<Arc<dyn Cipher>>,
}

impl ValueCodec {
    pub fn plain() -> Self {
        Self { cipher: None }
    }

    pub fn encrypted(cipher: Arc<dyn Cipher>) -> Self {
        Self {
            cipher: Some(cipher),
        }
    }

    pub fn is_encrypted(&self) -> bool {
        self.cipher.is_some()
    }

    pub fn encode(&self, value: &[u8]) -> StoreResult<Vec<u8>> {
        match &self.cipher {
            Some(cipher) => {
                let sealed = cipher.encrypt(value)?;
                let mut out = Vec::with_capacity(1 + sealed.len());
                out.push(TAG_ENCRYPTED);
                out.extend_from_slice(&sealed);
                Ok(out)
            }
            None => {
                let mut out = Vec::with_capacity(5 + value.len());
                out.push(TAG_PLAIN);
                out.extend_from_slice(&crc32fast::hash(value).to_le_bytes());
                out.extend_from_slice(value);
                Ok(out)
            }
        }
    }

    pub fn decode(&self, bytes: &[u8]) -> StoreResult<Vec<u8>> {
        let (&tag, body) = bytes.split_first().ok_or(StoreError::Decoding)?;
        match (tag, &self.cipher) {
            (TAG_ENCRYPTED, Some(cipher)) => {
                cipher.decrypt(body).map_err(|_| StoreError::Decoding)
            }
            (TAG_PLAIN, None) => {
                if body.len() < 4 {
                    return Err(StoreError::Decoding);
                }
                let (crc, payload) = body.split_at(4);
                let expected = u32::from_le_bytes([crc[0], crc[1], crc[2], crc[3]]);
                if crc32fast::hash(payload) != expected {
                    return Err(StoreError::Decoding);
                }
                Ok(payload.to_vec())
            }
            _ => Err(StoreError::Decoding),
        }
    }
}

impl std::fmt::Debug for ValueCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ValueCodec")
            .field("encrypted", &self.is_encrypted())
            .finish()
    }
}
