use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use strata_crypto::LinkCodec;
use strata_store::chunked::{create, read_all, read_range};
use strata_store::{
    BlockStore, Chunker, Partition, PartitionIndex, RootIndex, StoreError, ValueCodec,
};
use strata_types::{
    Block, Edge, EdgeRef, Index, IndexRef, Link, Prop, PropRef, PropValue, ValueRef, Vertex,
    VertexRef,
};
use tracing::debug;

use crate::error::{GraphError, GraphResult};
use crate::layout::{
    decode_edge, decode_index, decode_prop, decode_vertex, encode_edge, encode_index, encode_prop,
    encode_vertex, record_size, PropRecord,
};

/// Records a transaction created or changed in one partition, keyed by offset.
#[derive(Clone, Debug)]
pub struct PartitionDelta<T> {
    pub added: BTreeMap<u64, T>,
    pub updated: BTreeMap<u64, T>,
}

impl<T> Default for PartitionDelta<T> {
    fn default() -> Self {
        Self {
            added: BTreeMap::new(),
            updated: BTreeMap::new(),
        }
    }
}

impl<T> PartitionDelta<T> {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.updated.is_empty()
    }

    /// Updated records first, then added ones, each in offset order.
    pub fn records(&self) -> impl Iterator<Item = &T> {
        self.updated.values().chain(self.added.values())
    }
}

/// Everything a transaction changed.
#[derive(Clone, Debug, Default)]
pub struct Delta {
    pub vertices: PartitionDelta<Vertex>,
    pub edges: PartitionDelta<Edge>,
    pub props: PartitionDelta<Prop>,
    pub indices: PartitionDelta<Index>,
}

impl Delta {
    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
            && self.edges.is_empty()
            && self.props.is_empty()
            && self.indices.is_empty()
    }
}

/// Result of persisting a delta.
#[derive(Clone, Debug)]
pub struct CommitOutput {
    pub root: Link,
    pub index: RootIndex,
    /// Every block the new root references, root block last.
    pub blocks: Vec<Block>,
}

/// Reads records of a graph root and persists deltas into new roots.
pub trait GraphStore: Send + Sync {
    fn vertex_get(&self, index: &RootIndex, vertex: VertexRef) -> GraphResult<Vertex>;

    /// Up to `count` consecutive vertices starting at `start`.
    fn vertex_range(&self, index: &RootIndex, start: VertexRef, count: usize) -> GraphResult<Vec<Vertex>>;

    fn edge_get(&self, index: &RootIndex, edge: EdgeRef) -> GraphResult<Edge>;

    fn edge_range(&self, index: &RootIndex, start: EdgeRef, count: usize) -> GraphResult<Vec<Edge>>;

    fn prop_get(&self, index: &RootIndex, prop: PropRef) -> GraphResult<Prop>;

    fn prop_range(&self, index: &RootIndex, start: PropRef, count: usize) -> GraphResult<Vec<Prop>>;

    fn index_get(&self, index: &RootIndex, record: IndexRef) -> GraphResult<Index>;

    fn index_range(&self, index: &RootIndex, start: IndexRef, count: usize) -> GraphResult<Vec<Index>>;

    /// Apply `delta` on top of `prev` (or an empty graph) and persist the
    /// result. Props whose value has no location yet get one.
    fn commit(&self, prev: Option<&RootIndex>, delta: &mut Delta) -> GraphResult<CommitOutput>;

    fn block_store(&self) -> &Arc<dyn BlockStore>;
}

/// [`GraphStore`] over chunked partitions in a [`BlockStore`].
#[derive(Clone)]
pub struct BlockGraphStore {
    blocks: Arc<dyn BlockStore>,
    chunker: Arc<dyn Chunker>,
    codec: Arc<dyn LinkCodec>,
    values: ValueCodec,
}

impl BlockGraphStore {
    pub fn new(
        blocks: Arc<dyn BlockStore>,
        chunker: Arc<dyn Chunker>,
        codec: Arc<dyn LinkCodec>,
        values: ValueCodec,
    ) -> Self {
        Self {
            blocks,
            chunker,
            codec,
            values,
        }
    }

    pub fn value_codec(&self) -> &ValueCodec {
        &self.values
    }

    fn records(
        &self,
        index: &RootIndex,
        partition: Partition,
        start: u64,
        count: usize,
    ) -> GraphResult<(u64, Vec<u8>)> {
        let size = record_size(partition).unwrap_or(1);
        let len = index.next_offset(partition);
        if start % size != 0 || start >= len {
            return Err(GraphError::NotFound {
                partition,
                offset: start,
            });
        }
        let available = (len - start) / size;
        let count = available.min(count as u64);
        let bytes = read_range(
            self.blocks.as_ref(),
            &index.partition(partition).index,
            start,
            count * size,
        )?;
        Ok((size, bytes))
    }

    fn decode_many<T>(
        &self,
        index: &RootIndex,
        partition: Partition,
        start: u64,
        count: usize,
        decode: impl Fn(u64, &[u8]) -> GraphResult<T>,
    ) -> GraphResult<Vec<T>> {
        let (size, bytes) = self.records(index, partition, start, count)?;
        bytes
            .chunks(size as usize)
            .enumerate()
            .map(|(i, raw)| decode(start + i as u64 * size, raw))
            .collect()
    }

    fn value_get(&self, index: &RootIndex, value_ref: ValueRef) -> GraphResult<PropValue> {
        let bytes = read_range(
            self.blocks.as_ref(),
            &index.value.index,
            value_ref.offset,
            value_ref.length as u64,
        )?;
        Ok(PropValue::new(self.values.decode(&bytes)?))
    }

    fn attach_value(&self, index: &RootIndex, record: PropRecord) -> GraphResult<Prop> {
        let value = self.value_get(index, record.value_ref)?;
        Ok(record.with_value(value))
    }

    fn load(&self, prev: Option<&RootIndex>, partition: Partition) -> GraphResult<Vec<u8>> {
        match prev {
            Some(index) => Ok(read_all(self.blocks.as_ref(), &index.partition(partition).index)?),
            None => Ok(Vec::new()),
        }
    }

    fn write_values(&self, values: &mut Vec<u8>, delta: &mut Delta) -> GraphResult<()> {
        let pending = delta
            .props
            .updated
            .values_mut()
            .chain(delta.props.added.values_mut())
            .filter(|prop| prop.value_ref.is_none());
        for prop in pending {
            let encoded = self.values.encode(prop.value.as_bytes())?;
            let length = u32::try_from(encoded.len()).map_err(|_| GraphError::Corrupt {
                partition: Partition::Value,
                offset: values.len() as u64,
                reason: "value larger than 4 GiB".into(),
            })?;
            prop.value_ref = Some(ValueRef {
                offset: values.len() as u64,
                length,
            });
            values.extend_from_slice(&encoded);
        }
        Ok(())
    }
}

/// Write updated records in place and append added ones.
fn apply<T>(
    partition: Partition,
    bytes: &mut Vec<u8>,
    delta: &PartitionDelta<T>,
    encode: impl Fn(&T) -> GraphResult<Vec<u8>>,
) -> GraphResult<()> {
    let size = record_size(partition).unwrap_or(1) as usize;
    for (&offset, record) in &delta.updated {
        let start = offset as usize;
        if offset % size as u64 != 0 || start + size > bytes.len() {
            return Err(GraphError::InvalidReference { partition, offset });
        }
        bytes[start..start + size].copy_from_slice(&encode(record)?);
    }
    for (&offset, record) in &delta.added {
        if offset != bytes.len() as u64 {
            return Err(GraphError::OffsetMismatch {
                partition,
                expected: bytes.len() as u64,
                actual: offset,
            });
        }
        bytes.extend_from_slice(&encode(record)?);
    }
    Ok(())
}

impl GraphStore for BlockGraphStore {
    fn vertex_get(&self, index: &RootIndex, vertex: VertexRef) -> GraphResult<Vertex> {
        let mut found = self.vertex_range(index, vertex, 1)?;
        found.pop().ok_or(GraphError::NotFound {
            partition: Partition::Vertex,
            offset: vertex.0,
        })
    }

    fn vertex_range(&self, index: &RootIndex, start: VertexRef, count: usize) -> GraphResult<Vec<Vertex>> {
        self.decode_many(index, Partition::Vertex, start.0, count, decode_vertex)
    }

    fn edge_get(&self, index: &RootIndex, edge: EdgeRef) -> GraphResult<Edge> {
        let mut found = self.edge_range(index, edge, 1)?;
        found.pop().ok_or(GraphError::NotFound {
            partition: Partition::Edge,
            offset: edge.0,
        })
    }

    fn edge_range(&self, index: &RootIndex, start: EdgeRef, count: usize) -> GraphResult<Vec<Edge>> {
        self.decode_many(index, Partition::Edge, start.0, count, decode_edge)
    }

    fn prop_get(&self, index: &RootIndex, prop: PropRef) -> GraphResult<Prop> {
        let mut found = self.prop_range(index, prop, 1)?;
        found.pop().ok_or(GraphError::NotFound {
            partition: Partition::Prop,
            offset: prop.0,
        })
    }

    fn prop_range(&self, index: &RootIndex, start: PropRef, count: usize) -> GraphResult<Vec<Prop>> {
        self.decode_many(index, Partition::Prop, start.0, count, decode_prop)?
            .into_iter()
            .map(|record| self.attach_value(index, record))
            .collect()
    }

    fn index_get(&self, index: &RootIndex, record: IndexRef) -> GraphResult<Index> {
        let mut found = self.index_range(index, record, 1)?;
        found.pop().ok_or(GraphError::NotFound {
            partition: Partition::Index,
            offset: record.0,
        })
    }

    fn index_range(&self, index: &RootIndex, start: IndexRef, count: usize) -> GraphResult<Vec<Index>> {
        self.decode_many(index, Partition::Index, start.0, count, decode_index)
    }

    fn commit(&self, prev: Option<&RootIndex>, delta: &mut Delta) -> GraphResult<CommitOutput> {
        let mut values = self.load(prev, Partition::Value)?;
        self.write_values(&mut values, delta)?;

        let mut vertices = self.load(prev, Partition::Vertex)?;
        apply(Partition::Vertex, &mut vertices, &delta.vertices, |v| Ok(encode_vertex(v)))?;
        let mut edges = self.load(prev, Partition::Edge)?;
        apply(Partition::Edge, &mut edges, &delta.edges, |e| Ok(encode_edge(e)))?;
        let mut props = self.load(prev, Partition::Prop)?;
        apply(Partition::Prop, &mut props, &delta.props, |p| {
            Ok(encode_prop(&PropRecord::from_prop(p)?))
        })?;
        let mut indices = self.load(prev, Partition::Index)?;
        apply(Partition::Index, &mut indices, &delta.indices, |i| Ok(encode_index(i)))?;

        let output = persist_partitions(
            self.blocks.as_ref(),
            self.chunker.as_ref(),
            self.codec.as_ref(),
            [vertices, edges, props, values, indices],
        )?;
        debug!(
            root = %output.root.short_hex(),
            vertices = delta.vertices.added.len(),
            edges = delta.edges.added.len(),
            props = delta.props.added.len(),
            updated = delta.vertices.updated.len() + delta.edges.updated.len() + delta.props.updated.len(),
            "committed graph delta"
        );
        Ok(output)
    }

    fn block_store(&self) -> &Arc<dyn BlockStore> {
        &self.blocks
    }
}

/// Chunk five partition byte arrays (in [`Partition::ALL`] order), build the
/// root block and store every block. Nothing is written until all blocks are
/// computed.
pub fn persist_partitions(
    store: &dyn BlockStore,
    chunker: &dyn Chunker,
    codec: &dyn LinkCodec,
    partitions: [Vec<u8>; 5],
) -> GraphResult<CommitOutput> {
    let mut blocks = Vec::new();
    let mut seen = HashSet::new();
    let mut indices = Vec::with_capacity(5);
    for bytes in &partitions {
        let array = create(bytes, chunker, codec)?;
        for block in array.blocks {
            if seen.insert(block.link) {
                blocks.push(block);
            }
        }
        indices.push(PartitionIndex {
            root: array.root,
            index: array.index,
        });
    }
    let mut it = indices.into_iter();
    let mut next = || {
        it.next()
            .ok_or_else(|| StoreError::Corrupt("missing partition".into()))
    };
    let index = RootIndex {
        vertex: next()?,
        edge: next()?,
        prop: next()?,
        value: next()?,
        index: next()?,
    };
    let root_block = index.root_block(codec)?;
    let root = root_block.link;
    if seen.insert(root) {
        blocks.push(root_block);
    }
    store.put_all(&blocks)?;
    Ok(CommitOutput {
        root,
        index,
        blocks,
    })
}
