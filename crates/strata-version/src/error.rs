use strata_crypto::CryptoError;
use strata_graph::GraphError;
use strata_merge::MergeError;
use strata_pack::PackError;
use strata_store::StoreError;
use strata_types::{Link, StoreId};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum VersionError {
    #[error("unknown version {0}")]
    UnknownVersion(Link),

    #[error("cannot compare version stores with different identities {ours} and {theirs}")]
    IdentityMismatch { ours: StoreId, theirs: StoreId },

    #[error("version stores share no version")]
    NoCommonAncestor,

    #[error("version store has no current version")]
    Empty,

    #[error("configuration error: {0}")]
    Config(String),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("graph error: {0}")]
    Graph(#[from] GraphError),

    #[error("merge error: {0}")]
    Merge(#[from] MergeError),

    #[error("pack error: {0}")]
    Pack(#[from] PackError),

    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),
}

impl VersionError {
    /// Convert for callers that speak [`GraphError`], keeping lower-layer
    /// variants intact.
    pub fn into_graph_error(self) -> GraphError {
        match self {
            VersionError::Graph(e) => e,
            VersionError::Store(e) => GraphError::Store(e),
            other => GraphError::Version(other.to_string()),
        }
    }
}

pub type VersionResult<T> = Result<T, VersionError>;
