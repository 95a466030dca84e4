//! Graph transactions.
//!
//! A [`Tx`] stages new and modified records against the root that was
//! current when it started. New records get offsets past the end of each
//! partition; pre-existing records are copied into the transaction's update
//! set on first modification. Nothing touches storage until
//! [`Tx::commit`].

use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;

use strata_crypto::Signer;
use strata_store::{Partition, RootIndex};
use strata_types::{
    Block, Edge, EdgeRef, Index, IndexRef, IndexedValue, KeyTag, Link, Prop, PropRef, PropValue,
    Status, TypeTag, Version, VersionDetails, Vertex, VertexRef,
};
use tracing::debug;

use crate::cursor::{edges_outgoing, props, ElementAccess};
use crate::error::{GraphError, GraphResult};
use crate::graph::{Graph, Offsets};
use crate::graph_store::{Delta, PartitionDelta};
use crate::layout::{EDGE_SIZE, INDEX_SIZE, PROP_SIZE, VERTEX_SIZE};
use crate::traversal::{traverse, TraversalVisitor};
use crate::versioning::RootRef;

/// Version metadata supplied at commit.
#[derive(Default)]
pub struct CommitOptions<'a> {
    pub comment: Option<String>,
    pub tags: Vec<String>,
    pub signer: Option<&'a dyn Signer>,
}

impl<'a> CommitOptions<'a> {
    pub fn comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn signer(mut self, signer: &'a dyn Signer) -> Self {
        self.signer = Some(signer);
        self
    }
}

/// What a commit produced.
#[derive(Clone, Debug)]
pub struct CommitResult {
    pub root: Link,
    pub index: Arc<RootIndex>,
    pub blocks: Vec<Block>,
}

trait Staged: Clone {
    fn mark_updated(&mut self);
}

macro_rules! staged {
    ($($ty:ty),*) => {
        $(impl Staged for $ty {
            fn mark_updated(&mut self) {
                if self.status != Status::Deleted {
                    self.status = Status::Updated;
                }
            }
        })*
    };
}

staged!(Vertex, Edge, Prop, Index);

fn staged_get<T: Clone>(
    delta: &PartitionDelta<T>,
    init: u64,
    partition: Partition,
    offset: u64,
    fetch: impl FnOnce() -> GraphResult<T>,
) -> GraphResult<T> {
    if offset >= init {
        return delta
            .added
            .get(&offset)
            .cloned()
            .ok_or(GraphError::InvalidReference { partition, offset });
    }
    match delta.updated.get(&offset) {
        Some(record) => Ok(record.clone()),
        None => fetch(),
    }
}

fn staged_mut<T: Staged>(
    delta: &mut PartitionDelta<T>,
    init: u64,
    partition: Partition,
    offset: u64,
    fetch: impl FnOnce() -> GraphResult<T>,
) -> GraphResult<&mut T> {
    if offset >= init {
        return delta
            .added
            .get_mut(&offset)
            .ok_or(GraphError::InvalidReference { partition, offset });
    }
    match delta.updated.entry(offset) {
        Entry::Occupied(entry) => Ok(entry.into_mut()),
        Entry::Vacant(entry) => {
            let mut record = fetch()?;
            record.mark_updated();
            Ok(entry.insert(record))
        }
    }
}

/// A unit of graph mutation.
pub struct Tx<'g> {
    graph: &'g Graph,
    root_before: Option<RootRef>,
    init: Offsets,
    next: Offsets,
    delta: Delta,
}

impl<'g> Tx<'g> {
    pub(crate) fn start(graph: &'g Graph) -> GraphResult<Self> {
        let root_before = graph.root()?;
        let init = Offsets::of(root_before.as_ref());
        Ok(Self {
            graph,
            root_before,
            init,
            next: init,
            delta: Delta::default(),
        })
    }

    /// Root the transaction started from.
    pub fn root_before(&self) -> Option<&Link> {
        self.root_before.as_ref().map(|r| &r.root)
    }

    pub fn delta(&self) -> &Delta {
        &self.delta
    }

    // ---- staged lookups ----

    fn vertex_mut(&mut self, vertex: VertexRef) -> GraphResult<&mut Vertex> {
        let graph = self.graph;
        staged_mut(
            &mut self.delta.vertices,
            self.init.vertex,
            Partition::Vertex,
            vertex.0,
            || graph.get_vertex(vertex),
        )
    }

    fn edge_mut(&mut self, edge: EdgeRef) -> GraphResult<&mut Edge> {
        let graph = self.graph;
        staged_mut(&mut self.delta.edges, self.init.edge, Partition::Edge, edge.0, || {
            graph.get_edge(edge)
        })
    }

    fn prop_mut(&mut self, prop: PropRef) -> GraphResult<&mut Prop> {
        let graph = self.graph;
        staged_mut(&mut self.delta.props, self.init.prop, Partition::Prop, prop.0, || {
            graph.get_prop(prop)
        })
    }

    fn index_mut(&mut self, index: IndexRef) -> GraphResult<&mut Index> {
        let graph = self.graph;
        staged_mut(
            &mut self.delta.indices,
            self.init.index,
            Partition::Index,
            index.0,
            || graph.get_index(index),
        )
    }

    // ---- record creation ----

    pub fn add_vertex(&mut self, kind: Option<TypeTag>) -> VertexRef {
        let vertex = VertexRef(self.next.vertex);
        self.next.vertex += VERTEX_SIZE;
        self.delta
            .vertices
            .added
            .insert(vertex.0, Vertex::new(vertex, kind));
        vertex
    }

    /// Add an edge and append it to the source vertex's outgoing chain.
    pub fn add_edge(
        &mut self,
        source: VertexRef,
        target: VertexRef,
        kind: Option<TypeTag>,
    ) -> GraphResult<EdgeRef> {
        self.vertex(source)?;
        self.vertex(target)?;
        let edge = EdgeRef(self.next.edge);
        self.next.edge += EDGE_SIZE;
        self.delta
            .edges
            .added
            .insert(edge.0, Edge::new(edge, source, target, kind));
        self.link_vertex_edge(source, edge)?;
        Ok(edge)
    }

    pub fn add_vertex_prop(
        &mut self,
        vertex: VertexRef,
        key: KeyTag,
        value: impl Into<PropValue>,
        kind: Option<TypeTag>,
    ) -> GraphResult<PropRef> {
        self.vertex(vertex)?;
        let prop = self.new_prop(key, value.into(), kind);
        self.link_vertex_prop(vertex, prop)?;
        Ok(prop)
    }

    pub fn add_edge_prop(
        &mut self,
        edge: EdgeRef,
        key: KeyTag,
        value: impl Into<PropValue>,
        kind: Option<TypeTag>,
    ) -> GraphResult<PropRef> {
        self.edge(edge)?;
        let prop = self.new_prop(key, value.into(), kind);
        self.link_edge_prop(edge, prop)?;
        Ok(prop)
    }

    fn new_prop(&mut self, key: KeyTag, value: PropValue, kind: Option<TypeTag>) -> PropRef {
        let prop = PropRef(self.next.prop);
        self.next.prop += PROP_SIZE;
        self.delta
            .props
            .added
            .insert(prop.0, Prop::new(prop, key, value, kind));
        prop
    }

    pub fn add_vertex_index(
        &mut self,
        vertex: VertexRef,
        key: KeyTag,
        value: Link,
        kind: Option<TypeTag>,
    ) -> GraphResult<IndexRef> {
        self.vertex(vertex)?;
        let index = IndexRef(self.next.index);
        self.next.index += INDEX_SIZE;
        self.delta
            .indices
            .added
            .insert(index.0, Index::new(index, key, value, kind));
        match self.vertex(vertex)?.next_index {
            Some(head) => self.append_vertex_index(head, index)?,
            None => self.vertex_mut(vertex)?.next_index = Some(index),
        }
        Ok(index)
    }

    // ---- chain linking ----

    /// Make `edge` the vertex's first outgoing edge, or append it to the
    /// end of the existing chain.
    pub fn link_vertex_edge(&mut self, vertex: VertexRef, edge: EdgeRef) -> GraphResult<()> {
        self.edge(edge)?;
        match self.vertex(vertex)?.next_edge {
            Some(head) => self.append_edge(head, edge),
            None => {
                self.vertex_mut(vertex)?.next_edge = Some(edge);
                Ok(())
            }
        }
    }

    pub fn link_vertex_prop(&mut self, vertex: VertexRef, prop: PropRef) -> GraphResult<()> {
        self.prop(prop)?;
        match self.vertex(vertex)?.next_prop {
            Some(head) => self.append_prop(head, prop),
            None => {
                self.vertex_mut(vertex)?.next_prop = Some(prop);
                Ok(())
            }
        }
    }

    pub fn link_edge_prop(&mut self, edge: EdgeRef, prop: PropRef) -> GraphResult<()> {
        self.prop(prop)?;
        match self.edge(edge)?.next_prop {
            Some(head) => self.append_prop(head, prop),
            None => {
                self.edge_mut(edge)?.next_prop = Some(prop);
                Ok(())
            }
        }
    }

    /// Append `next` to the source chain `current` belongs to.
    pub fn link_edge(&mut self, current: EdgeRef, next: EdgeRef) -> GraphResult<()> {
        self.edge(next)?;
        self.append_edge(current, next)
    }

    /// Append `next` to the property chain `current` belongs to.
    pub fn link_prop(&mut self, current: PropRef, next: PropRef) -> GraphResult<()> {
        self.prop(next)?;
        self.append_prop(current, next)
    }

    /// Append `index` to the index chain starting at `head`.
    pub fn append_vertex_index(&mut self, head: IndexRef, index: IndexRef) -> GraphResult<()> {
        let tail = self.chain_tail(Partition::Index, head.0, index.0, |tx, offset| {
            Ok(tx.index(IndexRef(offset))?.next_index.map(|r| r.0))
        })?;
        self.index_mut(IndexRef(tail))?.next_index = Some(index);
        Ok(())
    }

    fn append_edge(&mut self, head: EdgeRef, edge: EdgeRef) -> GraphResult<()> {
        let tail = self.chain_tail(Partition::Edge, head.0, edge.0, |tx, offset| {
            Ok(tx.edge(EdgeRef(offset))?.source_next.map(|r| r.0))
        })?;
        self.edge_mut(EdgeRef(tail))?.source_next = Some(edge);
        self.edge_mut(edge)?.source_prev = Some(EdgeRef(tail));
        Ok(())
    }

    fn append_prop(&mut self, head: PropRef, prop: PropRef) -> GraphResult<()> {
        let tail = self.chain_tail(Partition::Prop, head.0, prop.0, |tx, offset| {
            Ok(tx.prop(PropRef(offset))?.next_prop.map(|r| r.0))
        })?;
        self.prop_mut(PropRef(tail))?.next_prop = Some(prop);
        Ok(())
    }

    /// Walk a chain from `head` to its last record. Fails if `appended` is
    /// already in the chain.
    fn chain_tail(
        &self,
        partition: Partition,
        head: u64,
        appended: u64,
        next_of: impl Fn(&Self, u64) -> GraphResult<Option<u64>>,
    ) -> GraphResult<u64> {
        let mut seen = HashSet::new();
        let mut current = head;
        loop {
            if current == appended {
                return Err(GraphError::SelfAppend {
                    partition,
                    offset: appended,
                });
            }
            if !seen.insert(current) {
                return Err(GraphError::ChainCycle {
                    partition,
                    offset: current,
                });
            }
            match next_of(self, current)? {
                Some(next) => current = next,
                None => return Ok(current),
            }
        }
    }

    // ---- updates ----

    pub fn set_prop_value(&mut self, prop: PropRef, value: impl Into<PropValue>) -> GraphResult<()> {
        self.prop_mut(prop)?.set_value(value.into());
        Ok(())
    }

    pub fn set_vertex_type(&mut self, vertex: VertexRef, kind: Option<TypeTag>) -> GraphResult<()> {
        self.vertex_mut(vertex)?.kind = kind;
        Ok(())
    }

    /// Mark a vertex deleted. Its chains are left in place.
    pub fn delete_vertex(&mut self, vertex: VertexRef) -> GraphResult<()> {
        self.vertex_mut(vertex)?.status = Status::Deleted;
        Ok(())
    }

    pub fn delete_edge(&mut self, edge: EdgeRef) -> GraphResult<()> {
        self.edge_mut(edge)?.status = Status::Deleted;
        Ok(())
    }

    pub fn delete_prop(&mut self, prop: PropRef) -> GraphResult<()> {
        self.prop_mut(prop)?.status = Status::Deleted;
        Ok(())
    }

    // ---- indexing ----

    /// Index the targets of `vertex`'s outgoing edges by their first prop
    /// with `key`, and attach the index to `vertex`.
    ///
    /// Returns `None` when no target carries the key.
    pub fn unique_index(
        &mut self,
        vertex: VertexRef,
        key: KeyTag,
        kind: Option<TypeTag>,
    ) -> GraphResult<Option<IndexRef>> {
        let index_store = self
            .graph
            .index_store()
            .cloned()
            .ok_or(GraphError::MissingIndexCapability)?;
        let source = self.vertex(vertex)?;
        let mut values = Vec::new();
        for edge in edges_outgoing(&*self, &source) {
            let edge = edge?;
            let target = self.vertex(edge.target)?;
            for prop in props(&*self, target.next_prop) {
                let prop = prop?;
                if prop.key == key {
                    values.push(IndexedValue {
                        value: prop.value,
                        reference: edge.offset.0,
                    });
                    break;
                }
            }
        }
        if values.is_empty() {
            return Ok(None);
        }
        let link = index_store.index_create(&values)?;
        self.add_vertex_index(vertex, key, link, kind).map(Some)
    }

    // ---- commit ----

    /// Derive target links, persist the delta, and record a version whose
    /// parent is the root this transaction started from.
    pub fn commit(mut self, options: CommitOptions<'_>) -> GraphResult<CommitResult> {
        self.fill_target_links()?;

        let graph = self.graph;
        let before = self.root_before.as_ref().map(|r| r.root);
        let output = graph
            .store()
            .commit(self.root_before.as_ref().map(|r| r.index.as_ref()), &mut self.delta)?;

        let mut details = VersionDetails::at(graph.clock().now_millis());
        details.comment = options.comment;
        details.tags = options.tags;
        if let Some(signer) = options.signer {
            details.signature = Some(signer.sign(&output.root));
            details.public_key = Some(signer.public_key());
            details.author = signer.name().map(str::to_string);
            details.email = signer.email().map(str::to_string);
        }

        let index = Arc::new(output.index);
        let version = Version::new(output.root, before, details);
        graph.versions().version_set(version, Some(index.clone()))?;
        debug!(
            root = %output.root.short_hex(),
            parent = ?before.map(|p| p.short_hex()),
            blocks = output.blocks.len(),
            "transaction committed"
        );

        graph.absorb(before, output.root, self.delta);
        Ok(CommitResult {
            root: output.root,
            index,
            blocks: output.blocks,
        })
    }

    /// Sources and targets of touched edges, plus touched vertices.
    fn impacted_vertices(&self) -> BTreeSet<VertexRef> {
        let mut impacted: BTreeSet<VertexRef> = self
            .delta
            .vertices
            .records()
            .map(|v| v.offset)
            .collect();
        for edge in self.delta.edges.records() {
            impacted.insert(edge.source);
            impacted.insert(edge.target);
        }
        impacted
    }

    /// Set target links from the incoming edges of every vertex reachable
    /// from the impacted set.
    ///
    /// Each outgoing edge of a vertex gets an incoming edge as its
    /// `target_prev`, and the incoming edge points at the vertex's first
    /// outgoing edge via `target_next`. With several incoming edges the last
    /// one visited wins, so the links are only exact for tree-shaped graphs.
    fn fill_target_links(&mut self) -> GraphResult<()> {
        let impacted = self.impacted_vertices();
        let mut collector = IncomingEdges::default();
        traverse(&*self, impacted, None, &mut collector)?;

        for (vertex_ref, incoming) in collector.by_target {
            let vertex = self.vertex(vertex_ref)?;
            let outgoing = edges_outgoing(&*self, &vertex)
                .map(|edge| edge.map(|e| e.offset))
                .collect::<GraphResult<Vec<_>>>()?;
            for out in outgoing {
                for &inc in &incoming {
                    if self.edge(out)?.target_prev != Some(inc) {
                        self.edge_mut(out)?.target_prev = Some(inc);
                    }
                    if vertex.next_edge == Some(out) && self.edge(inc)?.target_next != Some(out) {
                        self.edge_mut(inc)?.target_next = Some(out);
                    }
                }
            }
        }
        Ok(())
    }
}

impl ElementAccess for Tx<'_> {
    fn vertex(&self, vertex: VertexRef) -> GraphResult<Vertex> {
        staged_get(&self.delta.vertices, self.init.vertex, Partition::Vertex, vertex.0, || {
            self.graph.get_vertex(vertex)
        })
    }

    fn edge(&self, edge: EdgeRef) -> GraphResult<Edge> {
        staged_get(&self.delta.edges, self.init.edge, Partition::Edge, edge.0, || {
            self.graph.get_edge(edge)
        })
    }

    fn prop(&self, prop: PropRef) -> GraphResult<Prop> {
        staged_get(&self.delta.props, self.init.prop, Partition::Prop, prop.0, || {
            self.graph.get_prop(prop)
        })
    }

    fn index(&self, index: IndexRef) -> GraphResult<Index> {
        staged_get(&self.delta.indices, self.init.index, Partition::Index, index.0, || {
            self.graph.get_index(index)
        })
    }
}

#[derive(Default)]
struct IncomingEdges {
    by_target: BTreeMap<VertexRef, BTreeSet<EdgeRef>>,
}

impl TraversalVisitor for IncomingEdges {
    fn visit_edge(&mut self, edge: &Edge, _depth: usize) -> GraphResult<()> {
        self.by_target.entry(edge.target).or_default().insert(edge.offset);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph_store::BlockGraphStore;
    use crate::versioning::MemoryVersionTracker;
    use strata_crypto::{Blake3LinkCodec, Ed25519Signer, SigningKey};
    use strata_store::{
        BlockStore, ChunkerConfig, GearChunker, MemoryBlockStore, SortedIndexStore, ValueCodec,
    };
    use strata_types::FixedClock;

    const FOLDER: TypeTag = 1;
    const FILE: TypeTag = 2;
    const NAME: KeyTag = 1;

    fn graph() -> Graph {
        let blocks: Arc<dyn BlockStore> = Arc::new(MemoryBlockStore::new());
        let chunker = Arc::new(GearChunker::new(ChunkerConfig::small()).unwrap());
        let store = Arc::new(BlockGraphStore::new(
            blocks.clone(),
            chunker.clone(),
            Arc::new(Blake3LinkCodec),
            ValueCodec::plain(),
        ));
        let index_store = Arc::new(SortedIndexStore::new(
            blocks.clone(),
            chunker,
            Arc::new(Blake3LinkCodec),
        ));
        Graph::new(Arc::new(MemoryVersionTracker::new(blocks)), store)
            .with_index_store(index_store)
            .with_clock(Arc::new(FixedClock::new(1_000)))
    }

    /// root folder with `n` named files under it
    fn folder_with_files(graph: &Graph, n: usize) -> (VertexRef, Vec<EdgeRef>) {
        let mut tx = graph.tx().unwrap();
        let root = tx.add_vertex(Some(FOLDER));
        tx.add_vertex_prop(root, NAME, "root", None).unwrap();
        let mut edges = Vec::new();
        for i in 0..n {
            let file = tx.add_vertex(Some(FILE));
            tx.add_vertex_prop(file, NAME, format!("file-{i}"), None).unwrap();
            edges.push(tx.add_edge(root, file, None).unwrap());
        }
        tx.commit(CommitOptions::default().comment("files")).unwrap();
        (root, edges)
    }

    // ---- creation & chains ----

    #[test]
    fn offsets_advance_by_record_size() {
        let graph = graph();
        let mut tx = graph.tx().unwrap();
        assert_eq!(tx.add_vertex(None), VertexRef(0));
        assert_eq!(tx.add_vertex(None), VertexRef(VERTEX_SIZE));
        let e = tx.add_edge(VertexRef(0), VertexRef(VERTEX_SIZE), None).unwrap();
        assert_eq!(e, EdgeRef(0));
        let p = tx.add_vertex_prop(VertexRef(0), NAME, "a", None).unwrap();
        assert_eq!(p, PropRef(0));
        let p2 = tx.add_edge_prop(e, NAME, "b", None).unwrap();
        assert_eq!(p2, PropRef(PROP_SIZE));
    }

    #[test]
    fn edges_chain_in_insertion_order() {
        let graph = graph();
        let (root, edges) = folder_with_files(&graph, 3);
        let vertex = graph.get_vertex(root).unwrap();
        let chain: Vec<EdgeRef> = graph
            .edges_outgoing(&vertex)
            .map(|e| e.unwrap().offset)
            .collect();
        assert_eq!(chain, edges);

        let middle = graph.get_edge(edges[1]).unwrap();
        assert_eq!(middle.source_prev, Some(edges[0]));
        assert_eq!(middle.source_next, Some(edges[2]));
    }

    #[test]
    fn second_transaction_appends_to_committed_chain() {
        let graph = graph();
        let (root, edges) = folder_with_files(&graph, 2);

        let mut tx = graph.tx().unwrap();
        let file = tx.add_vertex(Some(FILE));
        let edge = tx.add_edge(root, file, None).unwrap();
        assert_eq!(edge, EdgeRef(2 * EDGE_SIZE));
        // the previous tail was copied into the update set
        assert!(tx.delta().edges.updated.contains_key(&edges[1].0));
        assert_eq!(tx.delta().edges.updated[&edges[1].0].status, Status::Updated);
        tx.commit(CommitOptions::default()).unwrap();

        let tail = graph.get_edge(edges[1]).unwrap();
        assert_eq!(tail.source_next, Some(edge));
        assert_eq!(graph.offsets().unwrap().edge_count(), 3);
    }

    #[test]
    fn props_chain_on_vertices_and_edges() {
        let graph = graph();
        let mut tx = graph.tx().unwrap();
        let v = tx.add_vertex(None);
        let w = tx.add_vertex(None);
        let e = tx.add_edge(v, w, None).unwrap();
        tx.add_vertex_prop(v, 1, "one", None).unwrap();
        tx.add_vertex_prop(v, 2, "two", None).unwrap();
        tx.add_edge_prop(e, 3, "weight", None).unwrap();
        tx.commit(CommitOptions::default()).unwrap();

        let vertex = graph.get_vertex(v).unwrap();
        let values: Vec<String> = graph
            .props(vertex.next_prop)
            .map(|p| p.unwrap().value.as_str().unwrap().to_string())
            .collect();
        assert_eq!(values, ["one", "two"]);
        let edge = graph.get_edge(e).unwrap();
        let edge_props: Vec<KeyTag> = graph.props(edge.next_prop).map(|p| p.unwrap().key).collect();
        assert_eq!(edge_props, [3]);
    }

    #[test]
    fn appending_to_itself_is_rejected() {
        let graph = graph();
        let mut tx = graph.tx().unwrap();
        let v = tx.add_vertex(None);
        let w = tx.add_vertex(None);
        let e = tx.add_edge(v, w, None).unwrap();
        let err = tx.link_edge(e, e).unwrap_err();
        assert!(matches!(err, GraphError::SelfAppend { partition: Partition::Edge, .. }));

        let p = tx.add_vertex_prop(v, 1, "x", None).unwrap();
        let err = tx.link_prop(p, p).unwrap_err();
        assert!(matches!(err, GraphError::SelfAppend { partition: Partition::Prop, .. }));
        // already further down the chain
        let q = tx.add_vertex_prop(v, 2, "y", None).unwrap();
        assert!(matches!(tx.link_prop(p, q), Err(GraphError::SelfAppend { .. })));
    }

    #[test]
    fn unallocated_offsets_are_invalid_references() {
        let graph = graph();
        let mut tx = graph.tx().unwrap();
        let v = tx.add_vertex(None);
        let err = tx.add_edge(v, VertexRef(10 * VERTEX_SIZE), None).unwrap_err();
        assert!(matches!(
            err,
            GraphError::InvalidReference {
                partition: Partition::Vertex,
                ..
            }
        ));
        assert!(matches!(
            tx.edge(EdgeRef(0)),
            Err(GraphError::InvalidReference { .. })
        ));
    }

    #[test]
    fn link_calls_reuse_existing_records() {
        let graph = graph();
        let mut tx = graph.tx().unwrap();
        let a = tx.add_vertex(None);
        let b = tx.add_vertex(None);
        let c = tx.add_vertex(None);
        let e1 = tx.add_edge(a, b, None).unwrap();
        let e2 = tx.add_edge(b, c, None).unwrap();
        // move e2 onto a's chain as well
        tx.link_vertex_edge(a, e2).unwrap();
        assert_eq!(tx.edge(e1).unwrap().source_next, Some(e2));

        let p = tx.add_vertex_prop(c, 1, "shared", None).unwrap();
        tx.link_edge_prop(e1, p).unwrap();
        assert_eq!(tx.edge(e1).unwrap().next_prop, Some(p));
        tx.link_vertex_prop(a, p).unwrap();
        assert_eq!(tx.vertex(a).unwrap().next_prop, Some(p));
    }

    // ---- updates ----

    #[test]
    fn updates_and_deletes_are_committed() {
        let graph = graph();
        let (root, edges) = folder_with_files(&graph, 2);
        let first_file = graph.get_edge(edges[0]).unwrap().target;
        let name = graph.get_vertex(first_file).unwrap().next_prop.unwrap();

        let mut tx = graph.tx().unwrap();
        tx.set_prop_value(name, "renamed").unwrap();
        tx.set_vertex_type(root, Some(99)).unwrap();
        tx.delete_edge(edges[1]).unwrap();
        tx.commit(CommitOptions::default()).unwrap();

        assert_eq!(graph.get_prop(name).unwrap().value.as_str(), Some("renamed"));
        assert_eq!(graph.get_vertex(root).unwrap().kind, Some(99));
        assert_eq!(graph.get_edge(edges[1]).unwrap().status, Status::Deleted);
        assert_eq!(graph.get_vertex(root).unwrap().status, Status::Updated);
    }

    #[test]
    fn delete_then_update_keeps_deleted_status() {
        let graph = graph();
        let (root, _) = folder_with_files(&graph, 1);
        let mut tx = graph.tx().unwrap();
        tx.delete_vertex(root).unwrap();
        tx.set_vertex_type(root, None).unwrap();
        assert_eq!(tx.vertex(root).unwrap().status, Status::Deleted);
        let p = tx.vertex(root).unwrap().next_prop.unwrap();
        tx.delete_prop(p).unwrap();
        assert_eq!(tx.prop(p).unwrap().status, Status::Deleted);
    }

    // ---- commit ----

    #[test]
    fn commit_records_version_with_parent() {
        let graph = graph();
        let mut tx = graph.tx().unwrap();
        tx.add_vertex(None);
        let first = tx
            .commit(CommitOptions::default().comment("first").tag("v1"))
            .unwrap();

        let mut tx = graph.tx().unwrap();
        assert_eq!(tx.root_before(), Some(&first.root));
        tx.add_vertex(None);
        let second = tx.commit(CommitOptions::default()).unwrap();

        let tracker = graph.versions().root_get().unwrap().unwrap();
        assert_eq!(tracker.root, second.root);
        assert_eq!(tracker.index.as_ref(), second.index.as_ref());
        assert_eq!(second.blocks.last().unwrap().link, second.root);
    }

    #[test]
    fn version_details_carry_metadata_and_signature() {
        let blocks: Arc<dyn BlockStore> = Arc::new(MemoryBlockStore::new());
        let tracker = Arc::new(MemoryVersionTracker::new(blocks.clone()));
        let store = Arc::new(BlockGraphStore::new(
            blocks,
            Arc::new(GearChunker::default()),
            Arc::new(Blake3LinkCodec),
            ValueCodec::plain(),
        ));
        let graph = Graph::new(tracker.clone(), store).with_clock(Arc::new(FixedClock::new(42)));
        let signer = Ed25519Signer::new(SigningKey::generate()).with_author("ada", "ada@example.com");

        let mut tx = graph.tx().unwrap();
        tx.add_vertex(None);
        let result = tx
            .commit(CommitOptions::default().comment("signed").tag("release").signer(&signer))
            .unwrap();

        let version = tracker.versions().pop().unwrap();
        assert_eq!(version.root, result.root);
        assert_eq!(version.parent, None);
        assert_eq!(version.details.timestamp, 42);
        assert_eq!(version.details.comment.as_deref(), Some("signed"));
        assert_eq!(version.details.tags, ["release"]);
        assert_eq!(version.details.author.as_deref(), Some("ada"));
        let (key, sig) = (
            version.details.public_key.unwrap(),
            version.details.signature.unwrap(),
        );
        assert!(strata_crypto::verify_root(&result.root, &key, &sig).is_ok());
    }

    #[test]
    fn target_links_follow_single_incoming_edge() {
        let graph = graph();
        let mut tx = graph.tx().unwrap();
        let a = tx.add_vertex(None);
        let b = tx.add_vertex(None);
        let c = tx.add_vertex(None);
        let d = tx.add_vertex(None);
        let ab = tx.add_edge(a, b, None).unwrap();
        let bc = tx.add_edge(b, c, None).unwrap();
        let bd = tx.add_edge(b, d, None).unwrap();
        tx.commit(CommitOptions::default()).unwrap();

        let ab = graph.get_edge(ab).unwrap();
        assert_eq!(ab.target_next, Some(bc));
        for out in [bc, bd] {
            assert_eq!(graph.get_edge(out).unwrap().target_prev, Some(ab.offset));
        }
    }

    // ---- indexing ----

    #[test]
    fn unique_index_over_target_props() {
        let graph = graph();
        let (root, edges) = folder_with_files(&graph, 20);

        let mut tx = graph.tx().unwrap();
        let index = tx.unique_index(root, NAME, None).unwrap().unwrap();
        tx.commit(CommitOptions::default()).unwrap();

        let vertex = graph.get_vertex(root).unwrap();
        assert_eq!(vertex.next_index, Some(index));
        let record = graph.indices(&vertex).next().unwrap().unwrap();
        let hit = graph.index_search(&record, &"file-7".into()).unwrap().unwrap();
        assert_eq!(hit.reference, edges[7].0);
        assert!(graph.index_search(&record, &"missing".into()).unwrap().is_none());
    }

    #[test]
    fn unique_index_without_matches_is_none() {
        let graph = graph();
        let (root, _) = folder_with_files(&graph, 3);
        let mut tx = graph.tx().unwrap();
        assert!(tx.unique_index(root, 77, None).unwrap().is_none());
        assert!(tx.delta().indices.added.is_empty());
    }

    #[test]
    fn unique_index_needs_an_index_store() {
        let blocks: Arc<dyn BlockStore> = Arc::new(MemoryBlockStore::new());
        let store = Arc::new(BlockGraphStore::new(
            blocks.clone(),
            Arc::new(GearChunker::default()),
            Arc::new(Blake3LinkCodec),
            ValueCodec::plain(),
        ));
        let graph = Graph::new(Arc::new(MemoryVersionTracker::new(blocks)), store);
        let mut tx = graph.tx().unwrap();
        let v = tx.add_vertex(None);
        assert!(matches!(
            tx.unique_index(v, NAME, None),
            Err(GraphError::MissingIndexCapability)
        ));
    }

    #[test]
    fn second_index_appends_to_chain() {
        let graph = graph();
        let mut tx = graph.tx().unwrap();
        let v = tx.add_vertex(None);
        let first = tx.add_vertex_index(v, 1, Link::from_hash([1; 32]), None).unwrap();
        let second = tx.add_vertex_index(v, 2, Link::from_hash([2; 32]), None).unwrap();
        assert_eq!(tx.index(first).unwrap().next_index, Some(second));
        assert!(matches!(
            tx.append_vertex_index(first, second),
            Err(GraphError::SelfAppend { .. })
        ));
    }
}
