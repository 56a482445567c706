//! Cycle detection.
//!
//! Scenes may legitimately contain dependency cycles (two objects driving
//! each other, a constraint loop). They are not errors: the relation that
//! closes each cycle is flagged [`RelationFlags::CYCLIC`] and from then on
//! ignored by in-degree arithmetic, which turns the operation graph into a
//! DAG for scheduling purposes.

use crate::graph::{Depsgraph, DepsNode, OperationId, RelationFlags, RelationId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Color {
    White,
    Gray,
    Black,
}

/// Flag every back edge of the operation graph as cyclic.
///
/// Depth-first search with an explicit stack of `(operation, next outlink)`
/// frames. Sources (operations without inbound relations) are visited
/// first so the edge chosen to break a cycle is the one closing it in
/// evaluation order. Returns the number of relations flagged.
#[tracing::instrument(skip_all)]
pub fn detect_cycles(graph: &mut Depsgraph) -> usize {
    let count = graph.operation_count();
    let mut color = vec![Color::White; count];
    let mut back_edges: Vec<RelationId> = Vec::new();

    let (sources, rest): (Vec<_>, Vec<_>) = (0..count)
        .map(OperationId::new)
        .partition(|op| graph.operation(*op).inlinks().is_empty());

    for root in sources.into_iter().chain(rest) {
        if color[root.index()] != Color::White {
            continue;
        }
        color[root.index()] = Color::Gray;
        let mut stack: Vec<(OperationId, usize)> = vec![(root, 0)];

        while let Some(frame) = stack.last_mut() {
            let (op, next) = *frame;
            let outlinks = graph.operation(op).outlinks();
            if next >= outlinks.len() {
                color[op.index()] = Color::Black;
                stack.pop();
                continue;
            }
            frame.1 += 1;

            let rel_id = outlinks[next];
            let Some(rel) = graph.relation(rel_id) else {
                continue;
            };
            if rel.is_cyclic() {
                continue;
            }
            let Some(to) = rel.to.as_operation() else {
                continue;
            };
            match color[to.index()] {
                Color::White => {
                    color[to.index()] = Color::Gray;
                    stack.push((to, 0));
                }
                Color::Gray => {
                    let start = stack.iter().position(|(op, _)| *op == to).unwrap_or(0);
                    let path: Vec<String> = stack[start..]
                        .iter()
                        .map(|(op, _)| graph.node_identifier((*op).into()))
                        .chain(std::iter::once(graph.node_identifier(to.into())))
                        .collect();
                    tracing::warn!(
                        relation = %rel.name,
                        path = %path.join(" → "),
                        "dependency cycle detected"
                    );
                    back_edges.push(rel_id);
                }
                Color::Black => {}
            }
        }
    }

    for rel in &back_edges {
        if let Some(rel) = graph.relation_mut(*rel) {
            rel.flags |= RelationFlags::CYCLIC;
        }
    }
    back_edges.len()
}
