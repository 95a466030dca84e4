//! Per-root block index.
//!
//! A graph root block lists the index-block link of each of the five
//! partitions. Decoding it, plus the five index blocks, yields a
//! [`RootIndex`]: everything needed to resolve any offset of any partition
//! to the block holding it.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use strata_crypto::LinkCodec;
use strata_types::{Block, Link};
use tracing::debug;

use crate::block_store::BlockStore;
use crate::chunked::{read_index, BlockIndex};
use crate::error::{StoreError, StoreResult};

/// The five record partitions of a graph.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Partition {
    Vertex,
    Edge,
    Prop,
    Value,
    Index,
}

impl Partition {
    pub const ALL: [Partition; 5] = [
        Partition::Vertex,
        Partition::Edge,
        Partition::Prop,
        Partition::Value,
        Partition::Index,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Partition::Vertex => "vertex",
            Partition::Edge => "edge",
            Partition::Prop => "prop",
            Partition::Value => "value",
            Partition::Index => "index",
        }
    }
}

impl fmt::Display for Partition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Payload of a graph root block.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RootStruct {
    pub vertex: Link,
    pub edge: Link,
    pub prop: Link,
    pub value: Link,
    pub index: Link,
}

impl RootStruct {
    pub fn to_bytes(&self) -> StoreResult<Vec<u8>> {
        bincode::serialize(self).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    pub fn from_bytes(bytes: &[u8]) -> StoreResult<Self> {
        bincode::deserialize(bytes).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    pub fn partition_root(&self, partition: Partition) -> Link {
        match partition {
            Partition::Vertex => self.vertex,
            Partition::Edge => self.edge,
            Partition::Prop => self.prop,
            Partition::Value => self.value,
            Partition::Index => self.index,
        }
    }
}

/// One partition's index block link and its decoded contents.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionIndex {
    pub root: Link,
    pub index: BlockIndex,
}

/// Decoded block index of a graph root.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RootIndex {
    pub vertex: PartitionIndex,
    pub edge: PartitionIndex,
    pub prop: PartitionIndex,
    pub value: PartitionIndex,
    pub index: PartitionIndex,
}

impl RootIndex {
    pub fn partition(&self, partition: Partition) -> &PartitionIndex {
        match partition {
            Partition::Vertex => &self.vertex,
            Partition::Edge => &self.edge,
            Partition::Prop => &self.prop,
            Partition::Value => &self.value,
            Partition::Index => &self.index,
        }
    }

    /// Length of a partition, which is also the next offset it will allocate.
    pub fn next_offset(&self, partition: Partition) -> u64 {
        self.partition(partition).index.byte_array_size
    }

    pub fn root_struct(&self) -> RootStruct {
        RootStruct {
            vertex: self.vertex.root,
            edge: self.edge.root,
            prop: self.prop.root,
            value: self.value.root,
            index: self.index.root,
        }
    }

    /// Encode the root block for this index.
    pub fn root_block(&self, codec: &dyn LinkCodec) -> StoreResult<Block> {
        Ok(codec.block(self.root_struct().to_bytes()?))
    }

    /// Every block this root references besides the root block itself: the
    /// five partition index blocks, then each partition's chunks.
    pub fn referenced_links(&self) -> Vec<Link> {
        let mut links: Vec<Link> = Partition::ALL
            .iter()
            .map(|p| self.partition(*p).root)
            .collect();
        for partition in Partition::ALL {
            links.extend(self.partition(partition).index.chunk_links());
        }
        links
    }
}

/// Builds [`RootIndex`] values by reading root and index blocks.
#[derive(Clone)]
pub struct RootIndexBuilder {
    store: Arc<dyn BlockStore>,
}

impl RootIndexBuilder {
    pub fn new(store: Arc<dyn BlockStore>) -> Self {
        Self { store }
    }

    pub fn build(&self, root: &Link) -> StoreResult<RootIndex> {
        build_root_index(self.store.as_ref(), root)
    }
}

/// Read the root block at `root` and the five partition index blocks it names.
pub fn build_root_index(store: &dyn BlockStore, root: &Link) -> StoreResult<RootIndex> {
    let root_struct = RootStruct::from_bytes(&store.get(root)?)?;
    let load = |partition: Partition| -> StoreResult<PartitionIndex> {
        let link = root_struct.partition_root(partition);
        Ok(PartitionIndex {
            root: link,
            index: read_index(store, &link)?,
        })
    };
    let index = RootIndex {
        vertex: load(Partition::Vertex)?,
        edge: load(Partition::Edge)?,
        prop: load(Partition::Prop)?,
        value: load(Partition::Value)?,
        index: load(Partition::Index)?,
    };
    debug!(
        root = %root.short_hex(),
        vertices = index.next_offset(Partition::Vertex),
        edges = index.next_offset(Partition::Edge),
        "built root index"
    );
    Ok(index)
}
