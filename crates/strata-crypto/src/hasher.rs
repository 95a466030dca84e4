use strata_types::{Block, Link};

use crate::error::CryptoResult;

/// Domain-separated BLAKE3 content hasher.
///
/// Each hasher carries a domain tag that is prepended to every hash
/// computation, so a data block and an identity seed with identical bytes
/// never produce the same link.
pub struct ContentHasher {
    domain: &'static str,
}

impl ContentHasher {
    /// Hasher for stored blocks.
    pub const BLOCK: Self = Self {
        domain: "strata-block-v1",
    };
    /// Hasher for store identity seeds.
    pub const IDENTITY: Self = Self {
        domain: "strata-identity-v1",
    };

    /// Create a hasher with a custom domain tag.
    pub const fn new(domain: &'static str) -> Self {
        Self { domain }
    }

    /// Hash raw bytes with domain separation.
    pub fn hash(&self, data: &[u8]) -> Link {
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.domain.as_bytes());
        hasher.update(b":");
        hasher.update(data);
        Link::from_hash(*hasher.finalize().as_bytes())
    }

    /// Verify that data produces the expected link.
    pub fn verify(&self, data: &[u8], expected: &Link) -> bool {
        self.hash(data) == *expected
    }

    /// The domain tag used by this hasher.
    pub fn domain(&self) -> &str {
        self.domain
    }
}

/// Maps block bytes to links and links to and from their external forms.
pub trait LinkCodec: Send + Sync {
    /// Content hash of a block's bytes. Same bytes, same link.
    fn encode(&self, bytes: &[u8]) -> Link;

    /// Decode a link from its binary form.
    fn decode(&self, bytes: &[u8]) -> CryptoResult<Link>;

    /// Parse a link from its string form.
    fn parse(&self, encoded: &str) -> CryptoResult<Link>;

    /// Render a link in its string form.
    fn format(&self, link: &Link) -> String;

    /// Build a block from raw bytes.
    fn block(&self, bytes: Vec<u8>) -> Block {
        Block::new(self.encode(&bytes), bytes)
    }

    /// Returns `true` if the block's link matches its bytes.
    fn verify(&self, block: &Block) -> bool {
        self.encode(&block.bytes) == block.link
    }
}

/// The default link codec: domain-separated BLAKE3, hex string form.
#[derive(Clone, Copy, Debug, Default)]
pub struct Blake3LinkCodec;

impl LinkCodec for Blake3LinkCodec {
    fn encode(&self, bytes: &[u8]) -> Link {
        ContentHasher::BLOCK.hash(bytes)
    }

    fn decode(&self, bytes: &[u8]) -> CryptoResult<Link> {
        Ok(Link::from_slice(bytes)?)
    }

    fn parse(&self, encoded: &str) -> CryptoResult<Link> {
        Ok(Link::from_hex(encoded)?)
    }

    fn format(&self, link: &Link) -> String {
        link.to_hex()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CryptoError;

    #[test]
    fn hash_is_deterministic() {
        let data = b"hello world";
        assert_eq!(ContentHasher::BLOCK.hash(data), ContentHasher::BLOCK.hash(data));
    }

    #[test]
    fn different_domains_produce_different_hashes() {
        let data = b"same content";
        assert_ne!(
            ContentHasher::BLOCK.hash(data),
            ContentHasher::IDENTITY.hash(data)
        );
    }

    #[test]
    fn verify_detects_tampering() {
        let id = ContentHasher::BLOCK.hash(b"original");
        assert!(ContentHasher::BLOCK.verify(b"original", &id));
        assert!(!ContentHasher::BLOCK.verify(b"tampered", &id));
    }

    #[test]
    fn codec_string_roundtrip() {
        let codec = Blake3LinkCodec;
        let link = codec.encode(b"block bytes");
        let text = codec.format(&link);
        assert_eq!(codec.parse(&text).unwrap(), link);
    }

    #[test]
    fn codec_binary_roundtrip() {
        let codec = Blake3LinkCodec;
        let link = codec.encode(b"block bytes");
        assert_eq!(codec.decode(link.as_bytes()).unwrap(), link);
    }

    #[test]
    fn codec_decode_rejects_short_input() {
        let err = Blake3LinkCodec.decode(&[0u8; 5]).unwrap_err();
        assert!(matches!(err, CryptoError::InvalidLink(_)));
    }

    #[test]
    fn block_helper_verifies() {
        let codec = Blake3LinkCodec;
        let mut block = codec.block(b"payload".to_vec());
        assert!(codec.verify(&block));
        block.bytes.push(0);
        assert!(!codec.verify(&block));
    }
}
