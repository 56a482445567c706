//! Removal of unused no-op operations.
//!
//! Entry and exit operations carry no callback; they only exist to join
//! relations. One that nothing depends on is dead weight for the flush and
//! the scheduler.

use std::collections::VecDeque;

use crate::graph::{Depsgraph, DepsNode, OperationId, RelationId};

fn is_unused_noop(graph: &Depsgraph, op: OperationId) -> bool {
    let node = graph.operation(op);
    node.is_noop() && node.outlinks().is_empty()
}

/// Unlink every no-op operation without outbound relations.
///
/// Removing the inbound relations of such an operation may leave its
/// inputs unused as well; those are queued in turn. The operations stay
/// in the arena, disconnected. Returns the number of relations removed.
#[tracing::instrument(skip_all)]
pub fn remove_unused_noops(graph: &mut Depsgraph) -> usize {
    let mut queue: VecDeque<OperationId> = graph
        .operations()
        .map(|(id, _)| id)
        .filter(|op| is_unused_noop(graph, *op))
        .collect();
    let mut removed = 0;

    while let Some(op) = queue.pop_front() {
        let inlinks: Vec<RelationId> = graph.operation(op).inlinks().to_vec();
        for rel in inlinks {
            let Some(relation) = graph.remove_relation(rel) else {
                continue;
            };
            removed += 1;
            if let Some(from) = relation.from.as_operation() {
                if is_unused_noop(graph, from) {
                    queue.push_back(from);
                }
            }
        }
    }

    tracing::debug!(removed, "pruned no-op relations");
    removed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{IdRef, IdType};
    use crate::graph::{
        ComponentKey, EvalCallback, NodeType, OperationCode, OperationKey, RelationFlags,
    };

    fn op(graph: &mut Depsgraph, name: &str, noop: bool) -> OperationId {
        let node = graph.add_id_node(IdRef::from(0), IdType::Object, "Cube");
        let comp = graph.add_component_node(node, ComponentKey::new(NodeType::Parameters));
        let evaluate = (!noop).then(|| EvalCallback::new(|_| {}));
        graph.add_operation_node(comp, OperationKey::named(OperationCode::Operation, name), evaluate)
    }

    fn link(graph: &mut Depsgraph, from: OperationId, to: OperationId) {
        graph.add_new_relation(from.into(), to.into(), "link", RelationFlags::empty());
    }

    #[test]
    fn dangling_noop_chain_is_cut() {
        let mut graph = Depsgraph::default();
        let work = op(&mut graph, "work", false);
        let exit = op(&mut graph, "exit", true);
        let tail = op(&mut graph, "tail", true);
        link(&mut graph, work, exit);
        link(&mut graph, exit, tail);

        assert_eq!(remove_unused_noops(&mut graph), 2);
        assert_eq!(graph.relation_count(), 0);
        assert!(graph.operation(work).outlinks().is_empty());
    }

    #[test]
    fn used_noops_survive() {
        let mut graph = Depsgraph::default();
        let entry = op(&mut graph, "entry", true);
        let work = op(&mut graph, "work", false);
        link(&mut graph, entry, work);

        assert_eq!(remove_unused_noops(&mut graph), 0);
        assert_eq!(graph.relation_count(), 1);
    }

    #[test]
    fn noop_with_other_consumers_is_kept() {
        let mut graph = Depsgraph::default();
        let shared = op(&mut graph, "shared", true);
        let dead = op(&mut graph, "dead", true);
        let work = op(&mut graph, "work", false);
        link(&mut graph, shared, dead);
        link(&mut graph, shared, work);

        assert_eq!(remove_unused_noops(&mut graph), 1);
        assert_eq!(graph.operation(shared).outlinks().len(), 1);
    }
}
