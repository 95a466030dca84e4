use std::collections::HashSet;

use strata_types::{Edge, Prop, Vertex, VertexRef};

use crate::cursor::{edges_outgoing, props, ElementAccess};
use crate::error::GraphResult;

/// Callbacks for [`traverse`]. All methods default to doing nothing.
pub trait TraversalVisitor {
    /// Called once per reachable vertex, before its edges.
    fn visit_vertex(&mut self, _vertex: &Vertex, _depth: usize) -> GraphResult<()> {
        Ok(())
    }

    /// Called for each outgoing edge of a visited vertex, whether or not its
    /// target is visited afterwards.
    fn visit_edge(&mut self, _edge: &Edge, _depth: usize) -> GraphResult<()> {
        Ok(())
    }

    /// Vertex properties are only read when this returns `true`.
    fn wants_props(&self) -> bool {
        false
    }

    fn visit_prop(&mut self, _vertex: &Vertex, _prop: &Prop) -> GraphResult<()> {
        Ok(())
    }
}

/// Depth-first, pre-order walk along outgoing edges from `starts`.
///
/// Each vertex is visited at most once. Targets deeper than `max_depth` are
/// not entered. Uses an explicit stack, so deep graphs do not recurse.
pub fn traverse<A, I>(
    access: &A,
    starts: I,
    max_depth: Option<usize>,
    visitor: &mut dyn TraversalVisitor,
) -> GraphResult<()>
where
    A: ElementAccess + ?Sized,
    I: IntoIterator<Item = VertexRef>,
{
    let mut stack: Vec<(VertexRef, usize)> = starts.into_iter().map(|v| (v, 0)).collect();
    stack.reverse();
    let mut visited = HashSet::new();

    while let Some((vertex_ref, depth)) = stack.pop() {
        if !visited.insert(vertex_ref) {
            continue;
        }
        let vertex = access.vertex(vertex_ref)?;
        visitor.visit_vertex(&vertex, depth)?;
        if visitor.wants_props() {
            for prop in props(access, vertex.next_prop) {
                visitor.visit_prop(&vertex, &prop?)?;
            }
        }

        let mut targets = Vec::new();
        for edge in edges_outgoing(access, &vertex) {
            let edge = edge?;
            visitor.visit_edge(&edge, depth)?;
            if max_depth.map_or(true, |max| depth < max) && !visited.contains(&edge.target) {
                targets.push((edge.target, depth + 1));
            }
        }
        stack.extend(targets.into_iter().rev());
    }
    Ok(())
}
