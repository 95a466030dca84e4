//! Lazy iteration over record chains.
//!
//! Chains are singly linked through offsets: a vertex's outgoing edges via
//! `source_next`, properties via `next_prop`, index records via
//! `next_index`. The cursors below work against anything that can resolve a
//! record by offset, so they read a committed [`Graph`](crate::Graph) and an
//! open [`Tx`](crate::Tx) alike.

use std::collections::HashSet;

use strata_store::Partition;
use strata_types::{Edge, EdgeRef, Index, IndexRef, Prop, PropRef, Vertex, VertexRef};

use crate::error::{GraphError, GraphResult};

/// Resolves records by offset.
pub trait ElementAccess {
    fn vertex(&self, vertex: VertexRef) -> GraphResult<Vertex>;
    fn edge(&self, edge: EdgeRef) -> GraphResult<Edge>;
    fn prop(&self, prop: PropRef) -> GraphResult<Prop>;
    fn index(&self, index: IndexRef) -> GraphResult<Index>;
}

struct ChainState {
    partition: Partition,
    next: Option<u64>,
    seen: HashSet<u64>,
    done: bool,
}

impl ChainState {
    fn new(partition: Partition, head: Option<u64>) -> Self {
        Self {
            partition,
            next: head,
            seen: HashSet::new(),
            done: false,
        }
    }

    fn advance<T>(
        &mut self,
        fetch: impl FnOnce(u64) -> GraphResult<T>,
        next_of: impl FnOnce(&T) -> Option<u64>,
    ) -> Option<GraphResult<T>> {
        if self.done {
            return None;
        }
        let offset = self.next?;
        if !self.seen.insert(offset) {
            self.done = true;
            return Some(Err(GraphError::ChainCycle {
                partition: self.partition,
                offset,
            }));
        }
        match fetch(offset) {
            Ok(record) => {
                self.next = next_of(&record);
                Some(Ok(record))
            }
            Err(err) => {
                self.done = true;
                Some(Err(err))
            }
        }
    }
}

/// Outgoing edges of a vertex, in chain order.
pub struct EdgeCursor<'a, A: ElementAccess + ?Sized> {
    access: &'a A,
    state: ChainState,
}

impl<'a, A: ElementAccess + ?Sized> Iterator for EdgeCursor<'a, A> {
    type Item = GraphResult<Edge>;

    fn next(&mut self) -> Option<Self::Item> {
        let access = self.access;
        self.state.advance(
            |offset| access.edge(EdgeRef(offset)),
            |edge| edge.source_next.map(|r| r.0),
        )
    }
}

/// Properties of a chain, in chain order.
pub struct PropCursor<'a, A: ElementAccess + ?Sized> {
    access: &'a A,
    state: ChainState,
}

impl<'a, A: ElementAccess + ?Sized> Iterator for PropCursor<'a, A> {
    type Item = GraphResult<Prop>;

    fn next(&mut self) -> Option<Self::Item> {
        let access = self.access;
        self.state.advance(
            |offset| access.prop(PropRef(offset)),
            |prop| prop.next_prop.map(|r| r.0),
        )
    }
}

/// Index records of a vertex, in chain order.
pub struct IndexCursor<'a, A: ElementAccess + ?Sized> {
    access: &'a A,
    state: ChainState,
}

impl<'a, A: ElementAccess + ?Sized> Iterator for IndexCursor<'a, A> {
    type Item = GraphResult<Index>;

    fn next(&mut self) -> Option<Self::Item> {
        let access = self.access;
        self.state.advance(
            |offset| access.index(IndexRef(offset)),
            |index| index.next_index.map(|r| r.0),
        )
    }
}

pub fn edges_outgoing<'a, A: ElementAccess + ?Sized>(access: &'a A, vertex: &Vertex) -> EdgeCursor<'a, A> {
    edges_from(access, vertex.next_edge)
}

/// Edges from `head` onwards along the source chain.
pub fn edges_from<A: ElementAccess + ?Sized>(access: &A, head: Option<EdgeRef>) -> EdgeCursor<'_, A> {
    EdgeCursor {
        access,
        state: ChainState::new(Partition::Edge, head.map(|r| r.0)),
    }
}

/// Properties from `head` onwards; pass a vertex's or an edge's `next_prop`.
pub fn props<A: ElementAccess + ?Sized>(access: &A, head: Option<PropRef>) -> PropCursor<'_, A> {
    PropCursor {
        access,
        state: ChainState::new(Partition::Prop, head.map(|r| r.0)),
    }
}

pub fn indices<'a, A: ElementAccess + ?Sized>(access: &'a A, vertex: &Vertex) -> IndexCursor<'a, A> {
    IndexCursor {
        access,
        state: ChainState::new(Partition::Index, vertex.next_index.map(|r| r.0)),
    }
}
