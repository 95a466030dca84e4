use strata_types::TypeError;

/// Errors from cryptographic operations.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CryptoError {
    #[error("invalid signature")]
    InvalidSignature,

    #[error("version is not signed")]
    Unsigned,

    #[error("invalid key")]
    InvalidKey,

    #[error("encryption failed: {0}")]
    Encryption(String),

    #[error("decryption failed: {0}")]
    Decryption(String),

    #[error("invalid link: {0}")]
    InvalidLink(#[from] TypeError),
}

pub type CryptoResult<T> = Result<T, CryptoError>;
