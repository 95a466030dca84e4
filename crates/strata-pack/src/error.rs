use strata_graph::GraphError;
use strata_store::StoreError;
use strata_types::Link;
use thiserror::Error;

use crate::bundle::BundleMode;

#[derive(Debug, Error)]
pub enum PackError {
    #[error("invalid bundle magic: expected {expected}, got {actual}")]
    InvalidMagic { expected: String, actual: String },

    #[error("unsupported bundle format version: {0}")]
    UnsupportedVersion(u32),

    #[error("bundle checksum mismatch")]
    ChecksumMismatch,

    #[error("bundle block does not match its link {0}")]
    BundleLinkMismatch(Link),

    #[error("corrupt bundle entry at offset {offset}: {reason}")]
    CorruptEntry { offset: u64, reason: String },

    #[error("CRC32 mismatch for block {link}")]
    CrcMismatch { link: Link },

    #[error("expected a {expected} bundle, got {actual}")]
    UnexpectedMode {
        expected: BundleMode,
        actual: BundleMode,
    },

    #[error("compression failed: {0}")]
    Compression(String),

    #[error("decompression failed: {0}")]
    Decompression(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("graph error: {0}")]
    Graph(#[from] GraphError),
}

pub type PackResult<T> = Result<T, PackError>;
