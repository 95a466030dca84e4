//! Chunked, content-addressed byte arrays.
//!
//! A byte array is split by a [`Chunker`] into content-defined chunks, each
//! stored as its own block. A single index block maps the start offset of
//! every chunk to its link; the link of that index block is the root of the
//! array. Unchanged regions of two related arrays therefore share blocks.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};
use strata_crypto::LinkCodec;
use strata_types::{Block, Link};

use crate::block_store::BlockStore;
use crate::chunker::Chunker;
use crate::error::{StoreError, StoreResult};

/// Offset-to-block map of one chunked byte array.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockIndex {
    /// Start offset of each chunk and the link of its block.
    pub start_offsets: BTreeMap<u64, Link>,
    /// Number of chunks.
    pub index_size: u64,
    /// Total length of the array in bytes.
    pub byte_array_size: u64,
}

impl BlockIndex {
    pub fn to_bytes(&self) -> StoreResult<Vec<u8>> {
        bincode::serialize(self).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    pub fn from_bytes(bytes: &[u8]) -> StoreResult<Self> {
        let index: Self =
            bincode::deserialize(bytes).map_err(|e| StoreError::Serialization(e.to_string()))?;
        if index.index_size != index.start_offsets.len() as u64 {
            return Err(StoreError::Corrupt(format!(
                "block index declares {} chunks, holds {}",
                index.index_size,
                index.start_offsets.len()
            )));
        }
        Ok(index)
    }

    /// Byte range `[start, end)` covered by the chunk starting at `start`.
    pub fn chunk_range(&self, start: u64) -> Option<(u64, u64)> {
        self.start_offsets.get(&start)?;
        let end = self
            .start_offsets
            .range(start + 1..)
            .next()
            .map(|(next, _)| *next)
            .unwrap_or(self.byte_array_size);
        Some((start, end))
    }

    /// Distinct chunk links, in offset order.
    pub fn chunk_links(&self) -> Vec<Link> {
        let mut seen = HashSet::new();
        self.start_offsets
            .values()
            .filter(|link| seen.insert(**link))
            .copied()
            .collect()
    }
}

/// Output of [`create`]: the root link, the decoded index, and every block
/// needed to store the array (chunks first, index block last).
#[derive(Clone, Debug)]
pub struct ChunkedArray {
    pub root: Link,
    pub index: BlockIndex,
    pub blocks: Vec<Block>,
}

/// Split `buf` into content-addressed blocks.
pub fn create(buf: &[u8], chunker: &dyn Chunker, codec: &dyn LinkCodec) -> StoreResult<ChunkedArray> {
    let mut start_offsets = BTreeMap::new();
    let mut blocks = Vec::new();
    let mut seen = HashSet::new();
    let mut start = 0usize;
    for end in chunker.chunk(buf) {
        if end <= start || end > buf.len() {
            return Err(StoreError::InvalidChunker(format!(
                "split point {end} out of order after {start}"
            )));
        }
        let block = codec.block(buf[start..end].to_vec());
        start_offsets.insert(start as u64, block.link);
        if seen.insert(block.link) {
            blocks.push(block);
        }
        start = end;
    }
    if start != buf.len() {
        return Err(StoreError::InvalidChunker(format!(
            "split points cover {start} of {} bytes",
            buf.len()
        )));
    }

    let index = BlockIndex {
        index_size: start_offsets.len() as u64,
        start_offsets,
        byte_array_size: buf.len() as u64,
    };
    let index_block = codec.block(index.to_bytes()?);
    let root = index_block.link;
    blocks.push(index_block);
    Ok(ChunkedArray {
        root,
        index,
        blocks,
    })
}

/// Load and decode the index block of an array.
pub fn read_index(store: &dyn BlockStore, root: &Link) -> StoreResult<BlockIndex> {
    BlockIndex::from_bytes(&store.get(root)?)
}

/// Read the whole array.
pub fn read_all(store: &dyn BlockStore, index: &BlockIndex) -> StoreResult<Vec<u8>> {
    read_range(store, index, 0, index.byte_array_size)
}

/// Read `length` bytes starting at `offset`.
pub fn read_range(
    store: &dyn BlockStore,
    index: &BlockIndex,
    offset: u64,
    length: u64,
) -> StoreResult<Vec<u8>> {
    let end = offset
        .checked_add(length)
        .filter(|end| *end <= index.byte_array_size)
        .ok_or(StoreError::OutOfRange {
            offset,
            length,
            size: index.byte_array_size,
        })?;
    let mut out = Vec::with_capacity(length as usize);
    if length == 0 {
        return Ok(out);
    }

    let first = index
        .start_offsets
        .range(..=offset)
        .next_back()
        .map(|(start, _)| *start)
        .ok_or_else(|| StoreError::Corrupt(format!("no chunk covers offset {offset}")))?;

    for (&chunk_start, link) in index.start_offsets.range(first..end) {
        let bytes = store.get(link)?;
        let chunk_end = chunk_start + bytes.len() as u64;
        let from = offset.max(chunk_start) - chunk_start;
        let to = end.min(chunk_end) - chunk_start;
        if to > bytes.len() as u64 || from > to {
            return Err(StoreError::Corrupt(format!(
                "chunk at {chunk_start} shorter than its index entry"
            )));
        }
        out.extend_from_slice(&bytes[from as usize..to as usize]);
    }
    if out.len() as u64 != length {
        return Err(StoreError::Corrupt(format!(
            "read {} of {length} bytes at {offset}",
            out.len()
        )));
    }
    Ok(out)
}
