use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use strata_store::{IndexStore, Partition};
use strata_types::{
    Clock, Edge, EdgeRef, Index, IndexRef, IndexedValue, Link, Prop, PropRef, PropValue,
    SystemClock, Vertex, VertexRef,
};
use tracing::debug;

use crate::cursor::{self, EdgeCursor, ElementAccess, IndexCursor, PropCursor};
use crate::error::{GraphError, GraphResult};
use crate::graph_store::{Delta, GraphStore};
use crate::layout::{EDGE_SIZE, INDEX_SIZE, PROP_SIZE, VERTEX_SIZE};
use crate::tx::Tx;
use crate::versioning::{RootRef, VersionTracker};

/// Next free offset of each record partition.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Offsets {
    pub vertex: u64,
    pub edge: u64,
    pub prop: u64,
    pub index: u64,
}

impl Offsets {
    pub fn of(root: Option<&RootRef>) -> Self {
        match root {
            Some(root) => Self {
                vertex: root.index.next_offset(Partition::Vertex),
                edge: root.index.next_offset(Partition::Edge),
                prop: root.index.next_offset(Partition::Prop),
                index: root.index.next_offset(Partition::Index),
            },
            None => Self::default(),
        }
    }

    pub fn vertex_count(&self) -> u64 {
        self.vertex / VERTEX_SIZE
    }

    pub fn edge_count(&self) -> u64 {
        self.edge / EDGE_SIZE
    }

    pub fn prop_count(&self) -> u64 {
        self.prop / PROP_SIZE
    }

    pub fn index_count(&self) -> u64 {
        self.index / INDEX_SIZE
    }
}

#[derive(Default)]
struct RecordCache {
    root: Option<Link>,
    vertices: HashMap<u64, Vertex>,
    edges: HashMap<u64, Edge>,
    props: HashMap<u64, Prop>,
    indices: HashMap<u64, Index>,
}

impl RecordCache {
    fn reset(&mut self, root: Option<Link>) {
        *self = Self {
            root,
            ..Self::default()
        };
    }
}

/// Read access to the current version of a graph, and the factory for
/// transactions against it.
///
/// The current root is whatever the [`VersionTracker`] reports; decoded
/// records are cached per root and the cache is dropped when the root moves.
pub struct Graph {
    versions: Arc<dyn VersionTracker>,
    store: Arc<dyn GraphStore>,
    index_store: Option<Arc<dyn IndexStore>>,
    clock: Arc<dyn Clock>,
    cache: RwLock<RecordCache>,
}

impl Graph {
    pub fn new(versions: Arc<dyn VersionTracker>, store: Arc<dyn GraphStore>) -> Self {
        Self {
            versions,
            store,
            index_store: None,
            clock: Arc::new(SystemClock),
            cache: RwLock::new(RecordCache::default()),
        }
    }

    pub fn with_index_store(mut self, index_store: Arc<dyn IndexStore>) -> Self {
        self.index_store = Some(index_store);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn store(&self) -> &Arc<dyn GraphStore> {
        &self.store
    }

    pub fn versions(&self) -> &Arc<dyn VersionTracker> {
        &self.versions
    }

    pub fn index_store(&self) -> Option<&Arc<dyn IndexStore>> {
        self.index_store.as_ref()
    }

    pub(crate) fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    /// Start a transaction against the current root.
    pub fn tx(&self) -> GraphResult<Tx<'_>> {
        Tx::start(self)
    }

    /// The current root, syncing the record cache to it.
    pub fn root(&self) -> GraphResult<Option<RootRef>> {
        let root = self.versions.root_get()?;
        let current = root.as_ref().map(|r| r.root);
        let stale = self.cache.read().expect("lock poisoned").root != current;
        if stale {
            let mut cache = self.cache.write().expect("lock poisoned");
            if cache.root != current {
                cache.reset(current);
            }
        }
        Ok(root)
    }

    pub fn offsets(&self) -> GraphResult<Offsets> {
        Ok(Offsets::of(self.root()?.as_ref()))
    }

    fn current(&self, partition: Partition, offset: u64) -> GraphResult<RootRef> {
        self.root()?
            .ok_or(GraphError::NotFound { partition, offset })
    }

    fn cached<T: Clone>(
        &self,
        partition: Partition,
        offset: u64,
        lookup: impl Fn(&RecordCache) -> Option<&T>,
        load: impl FnOnce(&RootRef) -> GraphResult<T>,
        insert: impl FnOnce(&mut RecordCache, T),
    ) -> GraphResult<T> {
        let root = self.current(partition, offset)?;
        {
            let cache = self.cache.read().expect("lock poisoned");
            if cache.root == Some(root.root) {
                if let Some(hit) = lookup(&cache) {
                    return Ok(hit.clone());
                }
            }
        }
        let found = load(&root)?;
        let mut cache = self.cache.write().expect("lock poisoned");
        if cache.root == Some(root.root) {
            insert(&mut cache, found.clone());
        }
        Ok(found)
    }

    pub fn get_vertex(&self, vertex: VertexRef) -> GraphResult<Vertex> {
        self.cached(
            Partition::Vertex,
            vertex.0,
            |cache| cache.vertices.get(&vertex.0),
            |root| self.store.vertex_get(&root.index, vertex),
            |cache, found| {
                cache.vertices.insert(vertex.0, found);
            },
        )
    }

    pub fn get_edge(&self, edge: EdgeRef) -> GraphResult<Edge> {
        self.cached(
            Partition::Edge,
            edge.0,
            |cache| cache.edges.get(&edge.0),
            |root| self.store.edge_get(&root.index, edge),
            |cache, found| {
                cache.edges.insert(edge.0, found);
            },
        )
    }

    pub fn get_prop(&self, prop: PropRef) -> GraphResult<Prop> {
        self.cached(
            Partition::Prop,
            prop.0,
            |cache| cache.props.get(&prop.0),
            |root| self.store.prop_get(&root.index, prop),
            |cache, found| {
                cache.props.insert(prop.0, found);
            },
        )
    }

    pub fn get_index(&self, index: IndexRef) -> GraphResult<Index> {
        self.cached(
            Partition::Index,
            index.0,
            |cache| cache.indices.get(&index.0),
            |root| self.store.index_get(&root.index, index),
            |cache, found| {
                cache.indices.insert(index.0, found);
            },
        )
    }

    /// Store decoded records under `root`, unless the cache has since
    /// moved to another root.
    fn fill(&self, root: &RootRef, insert: impl FnOnce(&mut RecordCache)) {
        let mut cache = self.cache.write().expect("lock poisoned");
        if cache.root == Some(root.root) {
            insert(&mut cache);
        }
    }

    /// Up to `count` consecutive vertices from `start`. Every record read
    /// lands in the cache.
    pub fn vertex_range(&self, start: VertexRef, count: usize) -> GraphResult<Vec<Vertex>> {
        let root = self.current(Partition::Vertex, start.0)?;
        self.vertices_of(&root, start, count)
    }

    pub fn edge_range(&self, start: EdgeRef, count: usize) -> GraphResult<Vec<Edge>> {
        let root = self.current(Partition::Edge, start.0)?;
        let edges = self.store.edge_range(&root.index, start, count)?;
        self.fill(&root, |cache| {
            cache.edges.extend(edges.iter().map(|e| (e.offset.0, e.clone())));
        });
        Ok(edges)
    }

    pub fn prop_range(&self, start: PropRef, count: usize) -> GraphResult<Vec<Prop>> {
        let root = self.current(Partition::Prop, start.0)?;
        let props = self.store.prop_range(&root.index, start, count)?;
        self.fill(&root, |cache| {
            cache.props.extend(props.iter().map(|p| (p.offset.0, p.clone())));
        });
        Ok(props)
    }

    /// Every vertex of the current root, in offset order.
    pub fn vertices_all(&self) -> GraphResult<Vec<Vertex>> {
        match self.root()? {
            Some(root) => {
                let count = Offsets::of(Some(&root)).vertex_count() as usize;
                if count == 0 {
                    return Ok(Vec::new());
                }
                self.vertices_of(&root, VertexRef(0), count)
            }
            None => Ok(Vec::new()),
        }
    }

    fn vertices_of(&self, root: &RootRef, start: VertexRef, count: usize) -> GraphResult<Vec<Vertex>> {
        let vertices = self.store.vertex_range(&root.index, start, count)?;
        self.fill(root, |cache| {
            cache.vertices.extend(vertices.iter().map(|v| (v.offset.0, v.clone())));
        });
        Ok(vertices)
    }

    pub fn edges_outgoing(&self, vertex: &Vertex) -> EdgeCursor<'_, Self> {
        cursor::edges_outgoing(self, vertex)
    }

    pub fn props(&self, head: Option<PropRef>) -> PropCursor<'_, Self> {
        cursor::props(self, head)
    }

    pub fn indices(&self, vertex: &Vertex) -> IndexCursor<'_, Self> {
        cursor::indices(self, vertex)
    }

    /// Look `value` up in the structure an index record points at.
    pub fn index_search(&self, index: &Index, value: &PropValue) -> GraphResult<Option<IndexedValue>> {
        let store = self
            .index_store
            .as_ref()
            .ok_or(GraphError::MissingIndexCapability)?;
        Ok(store.index_search(&index.value, value)?)
    }

    /// Carry a committed delta into the cache under the new root.
    pub(crate) fn absorb(&self, before: Option<Link>, after: Link, delta: Delta) {
        let mut cache = self.cache.write().expect("lock poisoned");
        if cache.root != before {
            cache.reset(Some(after));
            return;
        }
        cache.root = Some(after);
        let Delta {
            vertices,
            edges,
            props,
            indices,
        } = delta;
        cache.vertices.extend(vertices.updated.into_iter().chain(vertices.added));
        cache.edges.extend(edges.updated.into_iter().chain(edges.added));
        cache.props.extend(props.updated.into_iter().chain(props.added));
        cache.indices.extend(indices.updated.into_iter().chain(indices.added));
        debug!(root = %after.short_hex(), "graph cache advanced");
    }
}

impl ElementAccess for Graph {
    fn vertex(&self, vertex: VertexRef) -> GraphResult<Vertex> {
        self.get_vertex(vertex)
    }

    fn edge(&self, edge: EdgeRef) -> GraphResult<Edge> {
        self.get_edge(edge)
    }

    fn prop(&self, prop: PropRef) -> GraphResult<Prop> {
        self.get_prop(prop)
    }

    fn index(&self, index: IndexRef) -> GraphResult<Index> {
        self.get_index(index)
    }
}
