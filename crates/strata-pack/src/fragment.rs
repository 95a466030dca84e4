use std::sync::{Arc, RwLock};

use strata_graph::{traverse, BlockGraphStore, ElementAccess, GraphResult, GraphStore, TraversalVisitor};
use strata_store::{BlockStore, RootIndex, StoreResult};
use strata_types::{Block, Edge, EdgeRef, Index, IndexRef, Link, Prop, PropRef, Vertex, VertexRef};

use crate::bundle::FragmentDescriptor;
use crate::error::PackResult;

/// Records reached while computing a fragment, in visit order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Fragment {
    pub vertices: Vec<Vertex>,
    pub edges: Vec<Edge>,
    /// Vertex properties of the visited vertices.
    pub props: Vec<Prop>,
}

struct Collector<'a> {
    fragment: &'a mut Fragment,
}

impl TraversalVisitor for Collector<'_> {
    fn visit_vertex(&mut self, vertex: &Vertex, _depth: usize) -> GraphResult<()> {
        self.fragment.vertices.push(vertex.clone());
        Ok(())
    }

    fn visit_edge(&mut self, edge: &Edge, _depth: usize) -> GraphResult<()> {
        self.fragment.edges.push(edge.clone());
        Ok(())
    }

    fn wants_props(&self) -> bool {
        true
    }

    fn visit_prop(&mut self, _vertex: &Vertex, prop: &Prop) -> GraphResult<()> {
        self.fragment.props.push(prop.clone());
        Ok(())
    }
}

/// Reads records of one root straight from a graph store.
struct RootAccess<'a> {
    store: &'a BlockGraphStore,
    index: &'a RootIndex,
}

impl ElementAccess for RootAccess<'_> {
    fn vertex(&self, vertex: VertexRef) -> GraphResult<Vertex> {
        self.store.vertex_get(self.index, vertex)
    }

    fn edge(&self, edge: EdgeRef) -> GraphResult<Edge> {
        self.store.edge_get(self.index, edge)
    }

    fn prop(&self, prop: PropRef) -> GraphResult<Prop> {
        self.store.prop_get(self.index, prop)
    }

    fn index(&self, index: IndexRef) -> GraphResult<Index> {
        self.store.index_get(self.index, index)
    }
}

/// Walk the fragment described by `descriptor`.
pub(crate) fn compute(
    store: &BlockGraphStore,
    index: &RootIndex,
    descriptor: &FragmentDescriptor,
) -> PackResult<Fragment> {
    let starts: Vec<VertexRef> = store
        .vertex_range(index, descriptor.start, descriptor.count as usize)?
        .into_iter()
        .map(|v| v.offset)
        .collect();
    let mut fragment = Fragment::default();
    let access = RootAccess { store, index };
    traverse(
        &access,
        starts,
        Some(descriptor.depth as usize),
        &mut Collector {
            fragment: &mut fragment,
        },
    )?;
    Ok(fragment)
}

/// Passes everything through to `inner` and remembers which links were read.
pub(crate) struct RecordingBlockStore {
    inner: Arc<dyn BlockStore>,
    read: RwLock<Vec<Link>>,
}

impl RecordingBlockStore {
    pub(crate) fn new(inner: Arc<dyn BlockStore>) -> Self {
        Self {
            inner,
            read: RwLock::new(Vec::new()),
        }
    }

    /// Links read so far, in first-read order, possibly repeated.
    pub(crate) fn read_links(&self) -> Vec<Link> {
        self.read.read().expect("lock poisoned").clone()
    }
}

impl BlockStore for RecordingBlockStore {
    fn get(&self, link: &Link) -> StoreResult<Vec<u8>> {
        let bytes = self.inner.get(link)?;
        self.read.write().expect("lock poisoned").push(*link);
        Ok(bytes)
    }

    fn put(&self, block: &Block) -> StoreResult<()> {
        self.inner.put(block)
    }

    fn has(&self, link: &Link) -> StoreResult<bool> {
        self.inner.has(link)
    }

    fn links(&self) -> StoreResult<Vec<Link>> {
        self.inner.links()
    }
}
