use strata_crypto::CryptoError;
use strata_types::Link;

/// Errors from block storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The requested block was not found.
    #[error("block not found: {0}")]
    NotFound(Link),

    /// A value payload could not be decoded (corrupt, or wrong or missing key).
    #[error("Decoding error")]
    Decoding,

    /// Serialization or deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Structural data is malformed.
    #[error("corrupt data: {0}")]
    Corrupt(String),

    /// A read fell outside a chunked byte array.
    #[error("range {offset}+{length} outside byte array of size {size}")]
    OutOfRange { offset: u64, length: u64, size: u64 },

    #[error("invalid chunker configuration: {0}")]
    InvalidChunker(String),

    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
