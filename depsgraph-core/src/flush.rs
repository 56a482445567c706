//! Update Flush
//!
//! Spreads `NEEDS_UPDATE` from the entry tags to everything that depends on
//! them. This is the "push" half of an update; the scheduler then runs what
//! was marked.
//!
//! # Algorithm
//!
//! Breadth-first over operation relations, starting from the entry tags:
//!
//! 1. Every reached operation gets `NEEDS_UPDATE` and its ID is recorded
//!    as modified.
//! 2. The first time a component is reached, all of its operations are
//!    tagged and scheduled: components are evaluated as a whole.
//! 3. Children are scheduled over relations that carry dirty marks:
//!    `NO_FLUSH` never does, `FLUSH_USER_EDIT_ONLY` only when the parent
//!    was modified by a user edit.
//!
//! Each operation is scheduled at most once, so the flush terminates on
//! cyclic graphs.

use std::collections::VecDeque;

use indexmap::IndexSet;

use crate::data::IdRef;
use crate::graph::{Depsgraph, DepsNode, OperationFlags, OperationId, RelationFlags};

/// Flush entry tags through the graph. Returns the modified IDs in the
/// order they were first reached.
///
/// Entry tags are kept; they are cleared together with the operation
/// flags once the graph has been evaluated.
#[tracing::instrument(skip_all, fields(entry_tags = graph.entry_tags.len()))]
pub fn flush_updates(graph: &mut Depsgraph) -> Vec<IdRef> {
    let mut queue: VecDeque<OperationId> = VecDeque::new();
    let mut components_done = vec![false; graph.components.len()];
    let mut modified: IndexSet<IdRef> = IndexSet::new();

    let entries: Vec<OperationId> = graph.entry_tags().collect();
    for op in entries {
        schedule(graph, &mut queue, op);
    }

    while let Some(op) = queue.pop_front() {
        graph.operation_mut(op).flags |= OperationFlags::NEEDS_UPDATE;
        let id_node = graph.operation_id_node(op);
        modified.insert(graph.id_node(id_node).id_orig());

        let comp = graph.operation(op).owner();
        if !std::mem::replace(&mut components_done[comp.index()], true) {
            let siblings = graph.component(comp).operations().to_vec();
            for sibling in siblings {
                graph.operation_mut(sibling).flags |= OperationFlags::NEEDS_UPDATE;
                schedule(graph, &mut queue, sibling);
            }
        }

        let user_modified = graph
            .operation(op)
            .flags()
            .contains(OperationFlags::USER_MODIFIED);
        let children: Vec<OperationId> = graph
            .operation(op)
            .outlinks()
            .iter()
            .filter_map(|rel| graph.relation(*rel))
            .filter(|rel| !rel.flags.contains(RelationFlags::NO_FLUSH))
            .filter(|rel| {
                user_modified || !rel.flags.contains(RelationFlags::FLUSH_USER_EDIT_ONLY)
            })
            .filter_map(|rel| rel.to.as_operation())
            .collect();
        for child in children {
            schedule(graph, &mut queue, child);
        }
    }

    tracing::debug!(modified = modified.len(), "flush finished");
    modified.into_iter().collect()
}

fn schedule(graph: &mut Depsgraph, queue: &mut VecDeque<OperationId>, op: OperationId) {
    let node = graph.operation_mut(op);
    if !node.scheduled {
        node.scheduled = true;
        queue.push_back(op);
    }
}
