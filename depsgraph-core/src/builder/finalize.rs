//! Last step of a build.

use crate::config::DepsgraphConfig;
use crate::data::{IdRef, IdType, Main, RecalcFlags};
use crate::graph::{Depsgraph, DepsNode, UpdateSource};
use crate::tag::graph_id_tag_update;

use super::{pruning, visibility};

/// Prepare a freshly built graph for tagging and evaluation.
///
/// 1. Flush visibility.
/// 2. Prune unused no-ops (when enabled in `config`).
/// 3. Count pending links of every operation.
/// 4. Re-tag IDs whose state the previous graph did not cover: changed
///    evaluation requests, snapshots that were never expanded (copy,
///    animation, and transform and data for objects) and legacy `recalc`
///    bits still set on the original.
#[tracing::instrument(skip_all)]
pub fn finalize(graph: &mut Depsgraph, main: &Main, config: &DepsgraphConfig) {
    visibility::flush_visibility(graph);
    if config.prune_noops {
        pruning::remove_unused_noops(graph);
    }

    let pending: Vec<u32> = graph
        .operations()
        .map(|(_, op)| {
            op.inlinks()
                .iter()
                .filter_map(|rel| graph.relation(*rel))
                .filter(|rel| rel.is_pending_link())
                .count() as u32
        })
        .collect();
    for (op, count) in graph.operations.iter_mut().zip(pending) {
        op.num_links_pending = count;
    }

    let retags: Vec<(IdRef, RecalcFlags)> = graph
        .id_nodes()
        .map(|node| {
            let mut flags = RecalcFlags::empty();
            let object_flags = RecalcFlags::OB_RECALC_OB | RecalcFlags::OB_RECALC_DATA;
            if node.requests_changed() {
                flags |= object_flags;
            }
            if !node.cow().is_expanded() {
                // A fresh copy has no animation applied yet.
                flags |= RecalcFlags::DEG_TAG_COPY_ON_WRITE | RecalcFlags::OB_RECALC_TIME;
                if node.id_type() == IdType::Object {
                    flags |= object_flags;
                }
            }
            if let Some(block) = main.get(node.id_orig()) {
                flags |= block.recalc;
            }
            (node.id_orig(), flags)
        })
        .filter(|(_, flags)| !flags.is_empty())
        .collect();

    tracing::debug!(retagged = retags.len(), "finalize re-tag");
    for (id, flags) in retags {
        graph_id_tag_update(graph, main, id, flags, UpdateSource::Relations);
    }
    graph.finalized = true;
}
