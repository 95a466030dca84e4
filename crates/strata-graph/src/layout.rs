//! Fixed-size binary layout of graph records.
//!
//! Every record partition is a flat byte array of equally sized records, so
//! a record's offset is its position in bytes and the next free offset is the
//! partition length. Integers are little-endian. Byte 0 is the status, byte 1
//! a presence bitmap for the optional fields; absent fields are zero-filled.
//!
//! | record | size | fields after status/flags |
//! |--------|------|---------------------------|
//! | vertex | 30 | type u32, next_edge, next_prop, next_index |
//! | edge   | 62 | type u32, source, target, source_prev, source_next, target_prev, target_next, next_prop |
//! | prop   | 30 | type u32, key u32, value offset u64, value length u32, next_prop |
//! | index  | 50 | type u32, key u32, link [u8; 32], next_index |

use strata_store::Partition;
use strata_types::{
    Edge, EdgeRef, Index, IndexRef, KeyTag, Link, Prop, PropRef, PropValue, Status, TypeTag,
    ValueRef, Vertex, VertexRef,
};

use crate::error::{GraphError, GraphResult};

pub const VERTEX_SIZE: u64 = 30;
pub const EDGE_SIZE: u64 = 62;
pub const PROP_SIZE: u64 = 30;
pub const INDEX_SIZE: u64 = 50;

const HAS_KIND: u8 = 0x01;

/// Record size of a partition. The value partition holds variable-length
/// payloads and has none.
pub fn record_size(partition: Partition) -> Option<u64> {
    match partition {
        Partition::Vertex => Some(VERTEX_SIZE),
        Partition::Edge => Some(EDGE_SIZE),
        Partition::Prop => Some(PROP_SIZE),
        Partition::Index => Some(INDEX_SIZE),
        Partition::Value => None,
    }
}

/// Number of whole records in a partition of `len` bytes.
pub fn record_count(partition: Partition, len: u64) -> u64 {
    record_size(partition).map_or(0, |size| len / size)
}

/// A property record as stored: the value lives in the value partition and
/// is referenced, not inlined.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PropRecord {
    pub status: Status,
    pub offset: PropRef,
    pub kind: Option<TypeTag>,
    pub key: KeyTag,
    pub value_ref: ValueRef,
    pub next_prop: Option<PropRef>,
}

impl PropRecord {
    /// Strip the value from a property whose value has been written.
    pub fn from_prop(prop: &Prop) -> GraphResult<Self> {
        let value_ref = prop.value_ref.ok_or_else(|| GraphError::Corrupt {
            partition: Partition::Prop,
            offset: prop.offset.0,
            reason: "value has not been written".into(),
        })?;
        Ok(Self {
            status: prop.status,
            offset: prop.offset,
            kind: prop.kind,
            key: prop.key,
            value_ref,
            next_prop: prop.next_prop,
        })
    }

    pub fn with_value(self, value: PropValue) -> Prop {
        Prop {
            status: self.status,
            offset: self.offset,
            kind: self.kind,
            key: self.key,
            value,
            value_ref: Some(self.value_ref),
            next_prop: self.next_prop,
        }
    }
}

struct RecordWriter {
    buf: Vec<u8>,
    flags: u8,
}

impl RecordWriter {
    fn new(size: u64, status: Status, kind: Option<TypeTag>) -> Self {
        let mut writer = Self {
            buf: Vec::with_capacity(size as usize),
            flags: 0,
        };
        writer.buf.push(status.to_byte());
        writer.buf.push(0);
        writer.opt_u32(kind, HAS_KIND);
        writer
    }

    fn u32(&mut self, value: u32) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    fn u64(&mut self, value: u64) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    fn opt_u32(&mut self, value: Option<u32>, bit: u8) {
        if value.is_some() {
            self.flags |= bit;
        }
        self.u32(value.unwrap_or(0));
    }

    fn opt_u64(&mut self, value: Option<u64>, bit: u8) {
        if value.is_some() {
            self.flags |= bit;
        }
        self.u64(value.unwrap_or(0));
    }

    fn finish(mut self) -> Vec<u8> {
        self.buf[1] = self.flags;
        self.buf
    }
}

struct RecordReader<'a> {
    bytes: &'a [u8],
    pos: usize,
    flags: u8,
}

impl<'a> RecordReader<'a> {
    fn new(partition: Partition, offset: u64, bytes: &'a [u8]) -> GraphResult<(Self, Status)> {
        let expected = record_size(partition).unwrap_or(0) as usize;
        if bytes.len() != expected {
            return Err(GraphError::Corrupt {
                partition,
                offset,
                reason: format!("expected {expected} bytes, got {}", bytes.len()),
            });
        }
        let status = Status::from_byte(bytes[0]).map_err(|e| GraphError::Corrupt {
            partition,
            offset,
            reason: e.to_string(),
        })?;
        Ok((
            Self {
                bytes,
                pos: 2,
                flags: bytes[1],
            },
            status,
        ))
    }

    fn u32(&mut self) -> u32 {
        let mut raw = [0u8; 4];
        raw.copy_from_slice(&self.bytes[self.pos..self.pos + 4]);
        self.pos += 4;
        u32::from_le_bytes(raw)
    }

    fn u64(&mut self) -> u64 {
        let mut raw = [0u8; 8];
        raw.copy_from_slice(&self.bytes[self.pos..self.pos + 8]);
        self.pos += 8;
        u64::from_le_bytes(raw)
    }

    fn link(&mut self) -> Link {
        let mut raw = [0u8; 32];
        raw.copy_from_slice(&self.bytes[self.pos..self.pos + 32]);
        self.pos += 32;
        Link::from_hash(raw)
    }

    fn opt_u32(&mut self, bit: u8) -> Option<u32> {
        let value = self.u32();
        (self.flags & bit != 0).then_some(value)
    }

    fn opt_u64(&mut self, bit: u8) -> Option<u64> {
        let value = self.u64();
        (self.flags & bit != 0).then_some(value)
    }
}

// ---- vertex ----

const V_NEXT_EDGE: u8 = 0x02;
const V_NEXT_PROP: u8 = 0x04;
const V_NEXT_INDEX: u8 = 0x08;

pub fn encode_vertex(vertex: &Vertex) -> Vec<u8> {
    let mut w = RecordWriter::new(VERTEX_SIZE, vertex.status, vertex.kind);
    w.opt_u64(vertex.next_edge.map(|r| r.0), V_NEXT_EDGE);
    w.opt_u64(vertex.next_prop.map(|r| r.0), V_NEXT_PROP);
    w.opt_u64(vertex.next_index.map(|r| r.0), V_NEXT_INDEX);
    w.finish()
}

pub fn decode_vertex(offset: u64, bytes: &[u8]) -> GraphResult<Vertex> {
    let (mut r, status) = RecordReader::new(Partition::Vertex, offset, bytes)?;
    Ok(Vertex {
        status,
        offset: VertexRef(offset),
        kind: r.opt_u32(HAS_KIND),
        next_edge: r.opt_u64(V_NEXT_EDGE).map(EdgeRef),
        next_prop: r.opt_u64(V_NEXT_PROP).map(PropRef),
        next_index: r.opt_u64(V_NEXT_INDEX).map(IndexRef),
    })
}

// ---- edge ----

const E_SOURCE_PREV: u8 = 0x02;
const E_SOURCE_NEXT: u8 = 0x04;
const E_TARGET_PREV: u8 = 0x08;
const E_TARGET_NEXT: u8 = 0x10;
const E_NEXT_PROP: u8 = 0x20;

pub fn encode_edge(edge: &Edge) -> Vec<u8> {
    let mut w = RecordWriter::new(EDGE_SIZE, edge.status, edge.kind);
    w.u64(edge.source.0);
    w.u64(edge.target.0);
    w.opt_u64(edge.source_prev.map(|r| r.0), E_SOURCE_PREV);
    w.opt_u64(edge.source_next.map(|r| r.0), E_SOURCE_NEXT);
    w.opt_u64(edge.target_prev.map(|r| r.0), E_TARGET_PREV);
    w.opt_u64(edge.target_next.map(|r| r.0), E_TARGET_NEXT);
    w.opt_u64(edge.next_prop.map(|r| r.0), E_NEXT_PROP);
    w.finish()
}

pub fn decode_edge(offset: u64, bytes: &[u8]) -> GraphResult<Edge> {
    let (mut r, status) = RecordReader::new(Partition::Edge, offset, bytes)?;
    Ok(Edge {
        status,
        offset: EdgeRef(offset),
        kind: r.opt_u32(HAS_KIND),
        source: VertexRef(r.u64()),
        target: VertexRef(r.u64()),
        source_prev: r.opt_u64(E_SOURCE_PREV).map(EdgeRef),
        source_next: r.opt_u64(E_SOURCE_NEXT).map(EdgeRef),
        target_prev: r.opt_u64(E_TARGET_PREV).map(EdgeRef),
        target_next: r.opt_u64(E_TARGET_NEXT).map(EdgeRef),
        next_prop: r.opt_u64(E_NEXT_PROP).map(PropRef),
    })
}

// ---- prop ----

const P_NEXT_PROP: u8 = 0x02;

pub fn encode_prop(prop: &PropRecord) -> Vec<u8> {
    let mut w = RecordWriter::new(PROP_SIZE, prop.status, prop.kind);
    w.u32(prop.key);
    w.u64(prop.value_ref.offset);
    w.u32(prop.value_ref.length);
    w.opt_u64(prop.next_prop.map(|r| r.0), P_NEXT_PROP);
    w.finish()
}

pub fn decode_prop(offset: u64, bytes: &[u8]) -> GraphResult<PropRecord> {
    let (mut r, status) = RecordReader::new(Partition::Prop, offset, bytes)?;
    Ok(PropRecord {
        status,
        offset: PropRef(offset),
        kind: r.opt_u32(HAS_KIND),
        key: r.u32(),
        value_ref: ValueRef {
            offset: r.u64(),
            length: r.u32(),
        },
        next_prop: r.opt_u64(P_NEXT_PROP).map(PropRef),
    })
}

// ---- index ----

const I_NEXT_INDEX: u8 = 0x02;

pub fn encode_index(index: &Index) -> Vec<u8> {
    let mut w = RecordWriter::new(INDEX_SIZE, index.status, index.kind);
    w.u32(index.key);
    w.buf.extend_from_slice(index.value.as_bytes());
    w.opt_u64(index.next_index.map(|r| r.0), I_NEXT_INDEX);
    w.finish()
}

pub fn decode_index(offset: u64, bytes: &[u8]) -> GraphResult<Index> {
    let (mut r, status) = RecordReader::new(Partition::Index, offset, bytes)?;
    Ok(Index {
        status,
        offset: IndexRef(offset),
        kind: r.opt_u32(HAS_KIND),
        key: r.u32(),
        value: r.link(),
        next_index: r.opt_u64(I_NEXT_INDEX).map(IndexRef),
    })
}
