use serde::{Deserialize, Serialize};
use strata_crypto::LinkCodec;
use strata_types::{Link, StoreId, Version};

use crate::block_store::BlockStore;
use crate::chunked::{create, read_all, read_index, ChunkedArray};
use crate::chunker::Chunker;
use crate::error::{StoreError, StoreResult};

const LOG_FORMAT: u32 = 1;

/// Persisted form of a version store: its identity and every version, in
/// insertion order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionLog {
    pub identity: StoreId,
    pub versions: Vec<Version>,
}

#[derive(Serialize, Deserialize)]
struct Envelope {
    format: u32,
    log: VersionLog,
}

impl VersionLog {
    pub fn to_bytes(&self) -> StoreResult<Vec<u8>> {
        let envelope = Envelope {
            format: LOG_FORMAT,
            log: self.clone(),
        };
        bincode::serialize(&envelope).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    pub fn from_bytes(bytes: &[u8]) -> StoreResult<Self> {
        let envelope: Envelope =
            bincode::deserialize(bytes).map_err(|e| StoreError::Serialization(e.to_string()))?;
        if envelope.format != LOG_FORMAT {
            return Err(StoreError::Corrupt(format!(
                "unsupported version log format {}",
                envelope.format
            )));
        }
        Ok(envelope.log)
    }

    /// Encode as a chunked byte array. The array root is the store root.
    pub fn encode(&self, chunker: &dyn Chunker, codec: &dyn LinkCodec) -> StoreResult<ChunkedArray> {
        create(&self.to_bytes()?, chunker, codec)
    }

    /// Read a log back from its store root.
    pub fn read(store: &dyn BlockStore, root: &Link) -> StoreResult<Self> {
        let index = read_index(store, root)?;
        Self::from_bytes(&read_all(store, &index)?)
    }

    /// Store root plus every chunk link of the encoded log.
    pub fn links(store: &dyn BlockStore, root: &Link) -> StoreResult<Vec<Link>> {
        let mut links = vec![*root];
        links.extend(read_index(store, root)?.chunk_links());
        Ok(links)
    }
}
