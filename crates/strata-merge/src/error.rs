use strata_graph::GraphError;
use strata_store::{Partition, StoreError};

/// Errors from merging graph roots.
#[derive(Debug, thiserror::Error)]
pub enum MergeError {
    /// A side is shorter than the base in some partition, so it cannot
    /// descend from it.
    #[error("{partition} partition of length {side} does not extend base of length {base}")]
    NotDescendant {
        partition: Partition,
        base: u64,
        side: u64,
    },

    /// Splicing met a chain that loops.
    #[error("{partition} chain loops back to offset {offset} during merge")]
    ChainCycle { partition: Partition, offset: u64 },

    #[error("graph error: {0}")]
    Graph(#[from] GraphError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

pub type MergeResult<T> = Result<T, MergeError>;
