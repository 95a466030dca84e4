use strata_store::{Partition, StoreError};
use strata_types::TypeError;

/// Errors from graph reads, transactions and commits.
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    /// No record at this offset, in the cache or the backing store.
    #[error("{partition} record not found at offset {offset}")]
    NotFound { partition: Partition, offset: u64 },

    /// A transaction dereferenced an offset that is neither pre-existing
    /// nor allocated by the transaction itself.
    #[error("invalid {partition} reference {offset}")]
    InvalidReference { partition: Partition, offset: u64 },

    /// A record was appended to a chain it is already part of.
    #[error("cannot append {partition} record {offset} to itself")]
    SelfAppend { partition: Partition, offset: u64 },

    /// An index operation was invoked without an index store.
    #[error("no index store configured")]
    MissingIndexCapability,

    /// A chain revisits a record.
    #[error("{partition} chain loops back to offset {offset}")]
    ChainCycle { partition: Partition, offset: u64 },

    /// A record could not be decoded.
    #[error("corrupt {partition} record at offset {offset}: {reason}")]
    Corrupt {
        partition: Partition,
        offset: u64,
        reason: String,
    },

    /// A new record does not sit at the end of its partition.
    #[error("{partition} offset mismatch: expected {expected}, got {actual}")]
    OffsetMismatch {
        partition: Partition,
        expected: u64,
        actual: u64,
    },

    /// The version tracker rejected a version.
    #[error("version tracking failed: {0}")]
    Version(String),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("type error: {0}")]
    Type(#[from] TypeError),
}

impl GraphError {
    /// Returns `true` if a property value could not be decoded.
    pub fn is_decoding(&self) -> bool {
        matches!(self, GraphError::Store(StoreError::Decoding))
    }
}

/// Result alias for graph operations.
pub type GraphResult<T> = Result<T, GraphError>;
