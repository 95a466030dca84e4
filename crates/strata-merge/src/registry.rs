//! The multi-value registry merge.
//!
//! Partitions are append-only, so two descendants of a base share the
//! base's offset range `[0, Lb)` and each appended its own records after it.
//! The merged graph keeps the other side's records at their offsets and
//! moves the current side's additions past them, rewriting every reference
//! the current side holds into its own additions. Records both sides touched
//! inside the shared range are merged field by field:
//!
//! - a field only one side changed takes that side's value
//! - chain pointers both sides changed keep the other side's value and the
//!   current side's continuation is appended to the end of that chain
//! - target links both sides changed keep the other side's value
//! - any other field both sides changed keeps the current side's value

use std::collections::{BTreeMap, HashSet};
use std::fmt::Debug;

use strata_graph::layout::{self, record_size, PropRecord};
use strata_graph::GraphError;
use strata_store::Partition;
use strata_types::{Edge, EdgeRef, Index, IndexRef, PropRef, ValueRef, Vertex, VertexRef};
use tracing::{debug, warn};

use crate::error::{MergeError, MergeResult};
use crate::policy::{MergePolicy, MergePolicyKind};
use crate::snapshot::{slot, Snapshot, Unchanged};

/// See the [module docs](self).
#[derive(Clone, Copy, Debug, Default)]
pub struct MultiValueRegistry;

impl MergePolicy for MultiValueRegistry {
    fn kind(&self) -> MergePolicyKind {
        MergePolicyKind::MultiValueRegistry
    }

    fn merge(&self, base: &Snapshot, current: &Snapshot, other: &Snapshot) -> MergeResult<[Vec<u8>; 5]> {
        for partition in Partition::ALL {
            let lb = base.len(partition);
            for side in [current, other] {
                if side.len(partition) < lb {
                    return Err(MergeError::NotDescendant {
                        partition,
                        base: lb,
                        side: side.len(partition),
                    });
                }
            }
            if let Some(size) = record_size(partition) {
                for snapshot in [base, current, other] {
                    if snapshot.len(partition) % size != 0 {
                        return Err(GraphError::Corrupt {
                            partition,
                            offset: snapshot.len(partition),
                            reason: "partition length is not a whole number of records".into(),
                        }
                        .into());
                    }
                }
            }
        }

        let reloc = Relocation::new(base, other);
        let mut resolver = Resolver::default();
        let mut merged = Merged {
            vertices: merge_records(base, current, other, &reloc, &mut resolver)?,
            edges: merge_records(base, current, other, &reloc, &mut resolver)?,
            props: merge_records(base, current, other, &reloc, &mut resolver)?,
            indices: merge_records(base, current, other, &reloc, &mut resolver)?,
        };
        let splices = std::mem::take(&mut resolver.splices);
        let spliced = splices.len();
        for splice in splices {
            merged.splice(splice)?;
        }

        let lb_values = base.len(Partition::Value) as usize;
        let mut values = other.bytes(Partition::Value).to_vec();
        values.extend_from_slice(&current.bytes(Partition::Value)[lb_values..]);

        debug!(
            base = %base.root.short_hex(),
            current = %current.root.short_hex(),
            other = %other.root.short_hex(),
            spliced,
            conflicts = resolver.conflicts,
            "merged graph partitions"
        );
        Ok([
            encode_all(&merged.vertices, |v| layout::encode_vertex(v)),
            encode_all(&merged.edges, |e| layout::encode_edge(e)),
            encode_all(&merged.props, |p| layout::encode_prop(p)),
            values,
            encode_all(&merged.indices, |i| layout::encode_index(i)),
        ])
    }
}

fn encode_all<T>(records: &BTreeMap<u64, T>, encode: impl Fn(&T) -> Vec<u8>) -> Vec<u8> {
    records.values().flat_map(encode).collect()
}

/// Maps offsets the current side allocated past the base to their merged
/// position.
struct Relocation {
    base: [u64; 5],
    shift: [u64; 5],
}

impl Relocation {
    fn new(base: &Snapshot, other: &Snapshot) -> Self {
        let mut reloc = Self {
            base: [0; 5],
            shift: [0; 5],
        };
        for partition in Partition::ALL {
            let s = slot(partition);
            reloc.base[s] = base.len(partition);
            reloc.shift[s] = other.len(partition).saturating_sub(base.len(partition));
        }
        reloc
    }

    fn at(&self, partition: Partition, offset: u64) -> u64 {
        let s = slot(partition);
        if offset >= self.base[s] {
            offset + self.shift[s]
        } else {
            offset
        }
    }

    fn vertex(&self, r: VertexRef) -> VertexRef {
        VertexRef(self.at(Partition::Vertex, r.0))
    }

    fn edge(&self, r: EdgeRef) -> EdgeRef {
        EdgeRef(self.at(Partition::Edge, r.0))
    }

    fn prop(&self, r: PropRef) -> PropRef {
        PropRef(self.at(Partition::Prop, r.0))
    }

    fn index(&self, r: IndexRef) -> IndexRef {
        IndexRef(self.at(Partition::Index, r.0))
    }

    fn value(&self, r: ValueRef) -> ValueRef {
        ValueRef {
            offset: self.at(Partition::Value, r.offset),
            length: r.length,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Chain {
    EdgeSource,
    Prop,
    Index,
}

impl Chain {
    fn partition(self) -> Partition {
        match self {
            Chain::EdgeSource => Partition::Edge,
            Chain::Prop => Partition::Prop,
            Chain::Index => Partition::Index,
        }
    }
}

/// Append the chain starting at `append` to the end of the chain starting
/// at `from`.
#[derive(Clone, Copy, Debug)]
struct Splice {
    chain: Chain,
    from: u64,
    append: u64,
}

#[derive(Default)]
struct Resolver {
    splices: Vec<Splice>,
    conflicts: usize,
}

impl Resolver {
    fn scalar<T: PartialEq + Copy + Debug>(
        &mut self,
        at: (Partition, u64),
        field: &'static str,
        base: T,
        current: T,
        other: T,
    ) -> T {
        if current == other || other == base {
            current
        } else if current == base {
            other
        } else {
            self.conflicts += 1;
            warn!(
                partition = %at.0,
                offset = at.1,
                field,
                current = ?current,
                other = ?other,
                "concurrent edit, keeping current"
            );
            current
        }
    }

    fn prefer_other<T: PartialEq + Copy>(&mut self, base: T, current: T, other: T) -> T {
        if current != base && other == base {
            current
        } else {
            other
        }
    }

    fn chain(&mut self, chain: Chain, base: Option<u64>, current: Option<u64>, other: Option<u64>) -> Option<u64> {
        if current == other || other == base {
            return current;
        }
        if current == base {
            return other;
        }
        match (current, other) {
            (Some(append), Some(from)) => {
                self.splices.push(Splice {
                    chain,
                    from,
                    append,
                });
                Some(from)
            }
            (current, None) => current,
            (None, other) => other,
        }
    }
}

trait MergeRecord: Clone + Sized {
    const PARTITION: Partition;

    fn decode(offset: u64, bytes: &[u8]) -> MergeResult<Self>;

    fn relocate(self, reloc: &Relocation) -> Self;

    fn merge3(base: &Self, current: &Self, other: &Self, resolver: &mut Resolver) -> Self;
}

impl MergeRecord for Vertex {
    const PARTITION: Partition = Partition::Vertex;

    fn decode(offset: u64, bytes: &[u8]) -> MergeResult<Self> {
        Ok(layout::decode_vertex(offset, bytes)?)
    }

    fn relocate(self, reloc: &Relocation) -> Self {
        Vertex {
            offset: reloc.vertex(self.offset),
            next_edge: self.next_edge.map(|r| reloc.edge(r)),
            next_prop: self.next_prop.map(|r| reloc.prop(r)),
            next_index: self.next_index.map(|r| reloc.index(r)),
            ..self
        }
    }

    fn merge3(b: &Self, c: &Self, o: &Self, r: &mut Resolver) -> Self {
        let at = (Partition::Vertex, b.offset.0);
        Vertex {
            status: r.scalar(at, "status", b.status, c.status, o.status),
            offset: b.offset,
            kind: r.scalar(at, "kind", b.kind, c.kind, o.kind),
            next_edge: r
                .chain(Chain::EdgeSource, b.next_edge.map(|r| r.0), c.next_edge.map(|r| r.0), o.next_edge.map(|r| r.0))
                .map(EdgeRef),
            next_prop: r
                .chain(Chain::Prop, b.next_prop.map(|r| r.0), c.next_prop.map(|r| r.0), o.next_prop.map(|r| r.0))
                .map(PropRef),
            next_index: r
                .chain(Chain::Index, b.next_index.map(|r| r.0), c.next_index.map(|r| r.0), o.next_index.map(|r| r.0))
                .map(IndexRef),
        }
    }
}

impl MergeRecord for Edge {
    const PARTITION: Partition = Partition::Edge;

    fn decode(offset: u64, bytes: &[u8]) -> MergeResult<Self> {
        Ok(layout::decode_edge(offset, bytes)?)
    }

    fn relocate(self, reloc: &Relocation) -> Self {
        Edge {
            offset: reloc.edge(self.offset),
            source: reloc.vertex(self.source),
            target: reloc.vertex(self.target),
            source_prev: self.source_prev.map(|r| reloc.edge(r)),
            source_next: self.source_next.map(|r| reloc.edge(r)),
            target_prev: self.target_prev.map(|r| reloc.edge(r)),
            target_next: self.target_next.map(|r| reloc.edge(r)),
            next_prop: self.next_prop.map(|r| reloc.prop(r)),
            ..self
        }
    }

    fn merge3(b: &Self, c: &Self, o: &Self, r: &mut Resolver) -> Self {
        let at = (Partition::Edge, b.offset.0);
        Edge {
            status: r.scalar(at, "status", b.status, c.status, o.status),
            offset: b.offset,
            kind: r.scalar(at, "kind", b.kind, c.kind, o.kind),
            source: r.scalar(at, "source", b.source, c.source, o.source),
            target: r.scalar(at, "target", b.target, c.target, o.target),
            source_prev: r.prefer_other(b.source_prev, c.source_prev, o.source_prev),
            source_next: r
                .chain(Chain::EdgeSource, b.source_next.map(|r| r.0), c.source_next.map(|r| r.0), o.source_next.map(|r| r.0))
                .map(EdgeRef),
            target_prev: r.prefer_other(b.target_prev, c.target_prev, o.target_prev),
            target_next: r.prefer_other(b.target_next, c.target_next, o.target_next),
            next_prop: r
                .chain(Chain::Prop, b.next_prop.map(|r| r.0), c.next_prop.map(|r| r.0), o.next_prop.map(|r| r.0))
                .map(PropRef),
        }
    }
}

impl MergeRecord for PropRecord {
    const PARTITION: Partition = Partition::Prop;

    fn decode(offset: u64, bytes: &[u8]) -> MergeResult<Self> {
        Ok(layout::decode_prop(offset, bytes)?)
    }

    fn relocate(self, reloc: &Relocation) -> Self {
        PropRecord {
            offset: reloc.prop(self.offset),
            value_ref: reloc.value(self.value_ref),
            next_prop: self.next_prop.map(|r| reloc.prop(r)),
            ..self
        }
    }

    fn merge3(b: &Self, c: &Self, o: &Self, r: &mut Resolver) -> Self {
        let at = (Partition::Prop, b.offset.0);
        PropRecord {
            status: r.scalar(at, "status", b.status, c.status, o.status),
            offset: b.offset,
            kind: r.scalar(at, "kind", b.kind, c.kind, o.kind),
            key: r.scalar(at, "key", b.key, c.key, o.key),
            value_ref: r.scalar(at, "value", b.value_ref, c.value_ref, o.value_ref),
            next_prop: r
                .chain(Chain::Prop, b.next_prop.map(|r| r.0), c.next_prop.map(|r| r.0), o.next_prop.map(|r| r.0))
                .map(PropRef),
        }
    }
}

impl MergeRecord for Index {
    const PARTITION: Partition = Partition::Index;

    fn decode(offset: u64, bytes: &[u8]) -> MergeResult<Self> {
        Ok(layout::decode_index(offset, bytes)?)
    }

    fn relocate(self, reloc: &Relocation) -> Self {
        Index {
            offset: reloc.index(self.offset),
            next_index: self.next_index.map(|r| reloc.index(r)),
            ..self
        }
    }

    fn merge3(b: &Self, c: &Self, o: &Self, r: &mut Resolver) -> Self {
        let at = (Partition::Index, b.offset.0);
        Index {
            status: r.scalar(at, "status", b.status, c.status, o.status),
            offset: b.offset,
            kind: r.scalar(at, "kind", b.kind, c.kind, o.kind),
            key: r.scalar(at, "key", b.key, c.key, o.key),
            value: r.scalar(at, "value", b.value, c.value, o.value),
            next_index: r
                .chain(Chain::Index, b.next_index.map(|r| r.0), c.next_index.map(|r| r.0), o.next_index.map(|r| r.0))
                .map(IndexRef),
        }
    }
}

fn merge_records<R: MergeRecord>(
    base: &Snapshot,
    current: &Snapshot,
    other: &Snapshot,
    reloc: &Relocation,
    resolver: &mut Resolver,
) -> MergeResult<BTreeMap<u64, R>> {
    let partition = R::PARTITION;
    let size = record_size(partition).unwrap_or(1);
    let (b, c, o) = (
        base.bytes(partition),
        current.bytes(partition),
        other.bytes(partition),
    );
    let base_index = &base.index.partition(partition).index;
    let current_same = Unchanged::between(base_index, &current.index.partition(partition).index);
    let other_same = Unchanged::between(base_index, &other.index.partition(partition).index);
    let record = |bytes: &[u8], offset: u64| {
        let start = offset as usize;
        R::decode(offset, &bytes[start..start + size as usize])
    };

    let mut out = BTreeMap::new();
    let lb = b.len() as u64;
    let mut offset = 0;
    while offset < lb {
        let span = offset as usize..(offset + size) as usize;
        let merged = if current_same.covers(offset, size) || c[span.clone()] == b[span.clone()] {
            record(o, offset)?
        } else if other_same.covers(offset, size) || o[span.clone()] == b[span] {
            record(c, offset)?.relocate(reloc)
        } else {
            R::merge3(
                &record(b, offset)?,
                &record(c, offset)?.relocate(reloc),
                &record(o, offset)?,
                resolver,
            )
        };
        out.insert(offset, merged);
        offset += size;
    }

    let mut offset = lb;
    while offset < o.len() as u64 {
        out.insert(offset, record(o, offset)?);
        offset += size;
    }

    let mut offset = lb;
    while offset < c.len() as u64 {
        out.insert(reloc.at(partition, offset), record(c, offset)?.relocate(reloc));
        offset += size;
    }
    Ok(out)
}

struct Merged {
    vertices: BTreeMap<u64, Vertex>,
    edges: BTreeMap<u64, Edge>,
    props: BTreeMap<u64, PropRecord>,
    indices: BTreeMap<u64, Index>,
}

impl Merged {
    fn next_of(&self, chain: Chain, offset: u64) -> Option<u64> {
        match chain {
            Chain::EdgeSource => self.edges.get(&offset).and_then(|e| e.source_next.map(|r| r.0)),
            Chain::Prop => self.props.get(&offset).and_then(|p| p.next_prop.map(|r| r.0)),
            Chain::Index => self.indices.get(&offset).and_then(|i| i.next_index.map(|r| r.0)),
        }
    }

    /// Last record of the chain from `from`, or `None` if `append` is already
    /// reachable from it or leads back into it.
    fn splice_point(&self, splice: Splice) -> MergeResult<Option<u64>> {
        let partition = splice.chain.partition();
        let mut seen = HashSet::new();
        let mut tail = splice.from;
        loop {
            if tail == splice.append {
                return Ok(None);
            }
            if !seen.insert(tail) {
                return Err(MergeError::ChainCycle {
                    partition,
                    offset: tail,
                });
            }
            match self.next_of(splice.chain, tail) {
                Some(next) => tail = next,
                None => break,
            }
        }

        let mut walked = HashSet::new();
        let mut cursor = Some(splice.append);
        while let Some(offset) = cursor {
            if seen.contains(&offset) || !walked.insert(offset) {
                return Ok(None);
            }
            cursor = self.next_of(splice.chain, offset);
        }
        Ok(Some(tail))
    }

    fn splice(&mut self, splice: Splice) -> MergeResult<()> {
        let Some(tail) = self.splice_point(splice)? else {
            debug!(chain = ?splice.chain, from = splice.from, append = splice.append, "chains already joined");
            return Ok(());
        };
        match splice.chain {
            Chain::EdgeSource => {
                if let Some(edge) = self.edges.get_mut(&tail) {
                    edge.source_next = Some(EdgeRef(splice.append));
                }
                if let Some(edge) = self.edges.get_mut(&splice.append) {
                    edge.source_prev = Some(EdgeRef(tail));
                }
            }
            Chain::Prop => {
                if let Some(prop) = self.props.get_mut(&tail) {
                    prop.next_prop = Some(PropRef(splice.append));
                }
            }
            Chain::Index => {
                if let Some(index) = self.indices.get_mut(&tail) {
                    index.next_index = Some(IndexRef(splice.append));
                }
            }
        }
        Ok(())
    }
}
