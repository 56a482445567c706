//! Visibility flush.
//!
//! Decides which components affect something the user can see. Every
//! component starts from its ID's `is_directly_visible`; visibility then
//! travels upstream: whatever a visible operation depends on is visible
//! as well.

use crate::graph::{ComponentId, Depsgraph, DepsNode, NodeType, OperationId};

/// Compute `affects_directly_visible` for every component.
///
/// Reverse topological sweep: operations without outbound operation
/// relations are processed first, and an operation is pushed once all of
/// its non-cyclic outbound relations have been processed. Visibility
/// crosses every inbound operation relation, cyclic ones included; only
/// the counters ignore cyclic relations, so the sweep terminates on cyclic
/// graphs.
///
/// Synchronization components are seeded visible.
#[tracing::instrument(skip_all)]
pub fn flush_visibility(graph: &mut Depsgraph) {
    let seeds: Vec<bool> = graph
        .components()
        .map(|(_, comp)| {
            comp.node_type() == NodeType::Synchronization
                || graph.id_node(comp.owner()).is_directly_visible()
        })
        .collect();
    for (comp, visible) in graph.components.iter_mut().zip(seeds) {
        comp.affects_directly_visible = visible;
    }

    let mut remaining: Vec<u32> = graph
        .operations()
        .map(|(_, op)| {
            op.outlinks()
                .iter()
                .filter_map(|rel| graph.relation(*rel))
                .filter(|rel| rel.is_pending_link())
                .count() as u32
        })
        .collect();

    let mut stack: Vec<OperationId> = remaining
        .iter()
        .enumerate()
        .filter(|(_, count)| **count == 0)
        .map(|(index, _)| OperationId::new(index))
        .collect();

    while let Some(op) = stack.pop() {
        let to_comp = graph.operation(op).owner();
        let propagate = graph.component(to_comp).affects_directly_visible();

        let upstream: Vec<(OperationId, bool)> = graph
            .operation(op)
            .inlinks()
            .iter()
            .filter_map(|rel| graph.relation(*rel))
            .filter_map(|rel| Some((rel.from.as_operation()?, rel.is_cyclic())))
            .collect();

        for (from, cyclic) in upstream {
            let from_comp = graph.operation(from).owner();
            if propagate && !graph.component(from_comp).affects_directly_visible() {
                mark_visible(graph, from_comp);
            }
            if cyclic {
                continue;
            }
            let count = &mut remaining[from.index()];
            *count = count.saturating_sub(1);
            if *count == 0 {
                stack.push(from);
            }
        }
    }
}

/// A visible VISIBILITY component makes its whole ID visible.
fn mark_visible(graph: &mut Depsgraph, comp: ComponentId) {
    graph.component_mut(comp).affects_directly_visible = true;
    if graph.component(comp).node_type() != NodeType::Visibility {
        return;
    }
    let owner = graph.component(comp).owner();
    let siblings: Vec<ComponentId> = graph.id_node(owner).components().collect();
    for sibling in siblings {
        graph.component_mut(sibling).affects_directly_visible = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{IdRef, IdType};
    use crate::graph::{ComponentKey, OperationCode, OperationKey, RelationFlags};

    struct Scene {
        graph: Depsgraph,
    }

    impl Scene {
        fn new() -> Self {
            Self {
                graph: Depsgraph::default(),
            }
        }

        fn op(&mut self, id: u32, visible: bool, node_type: NodeType) -> OperationId {
            let node = self
                .graph
                .add_id_node(IdRef::from(id), IdType::Object, &format!("OB{id}"));
            self.graph.id_node_mut(node).is_directly_visible = visible;
            let comp = self.graph.add_component_node(node, ComponentKey::new(node_type));
            let key = OperationKey::named(OperationCode::Operation, format!("{id}"));
            self.graph.add_operation_node(comp, key, None)
        }

        fn link(&mut self, from: OperationId, to: OperationId, flags: RelationFlags) {
            self.graph.add_new_relation(from.into(), to.into(), "link", flags);
        }

        fn visible(&self, op: OperationId) -> bool {
            self.graph
                .component(self.graph.operation(op).owner())
                .affects_directly_visible()
        }
    }

    #[test]
    fn visibility_travels_upstream_only() {
        let mut scene = Scene::new();
        let hidden_input = scene.op(0, false, NodeType::Transform);
        let visible = scene.op(1, true, NodeType::Transform);
        let hidden_output = scene.op(2, false, NodeType::Transform);
        scene.link(hidden_input, visible, RelationFlags::empty());
        scene.link(visible, hidden_output, RelationFlags::empty());

        flush_visibility(&mut scene.graph);
        assert!(scene.visible(hidden_input));
        assert!(scene.visible(visible));
        assert!(!scene.visible(hidden_output));
    }

    #[test]
    fn synchronization_is_visible_and_propagates() {
        let mut scene = Scene::new();
        let transform = scene.op(0, false, NodeType::Transform);
        let sync = scene.op(0, false, NodeType::Synchronization);
        scene.link(transform, sync, RelationFlags::empty());

        flush_visibility(&mut scene.graph);
        assert!(scene.visible(sync));
        assert!(scene.visible(transform));
    }

    #[test]
    fn visibility_crosses_cyclic_relations() {
        let mut scene = Scene::new();
        let a = scene.op(0, true, NodeType::Transform);
        let b = scene.op(1, false, NodeType::Transform);
        scene.link(a, b, RelationFlags::empty());
        scene.link(b, a, RelationFlags::CYCLIC);

        flush_visibility(&mut scene.graph);
        assert!(scene.visible(a));
        assert!(scene.visible(b));
    }

    #[test]
    fn visibility_component_spreads_to_siblings() {
        let mut scene = Scene::new();
        let geometry = scene.op(0, false, NodeType::Geometry);
        let vis = scene.op(0, false, NodeType::Visibility);
        let consumer = scene.op(1, true, NodeType::Transform);
        scene.link(vis, consumer, RelationFlags::empty());

        flush_visibility(&mut scene.graph);
        assert!(scene.visible(vis));
        assert!(scene.visible(geometry));
    }

    #[test]
    fn cycles_terminate_and_result_is_stable() {
        let mut scene = Scene::new();
        let a = scene.op(0, false, NodeType::Transform);
        let b = scene.op(1, false, NodeType::Transform);
        let c = scene.op(2, true, NodeType::Transform);
        scene.link(a, b, RelationFlags::empty());
        scene.link(b, a, RelationFlags::CYCLIC);
        scene.link(b, c, RelationFlags::empty());

        flush_visibility(&mut scene.graph);
        let first: Vec<bool> = [a, b, c].iter().map(|op| scene.visible(*op)).collect();
        assert_eq!(first, vec![true, true, true]);

        flush_visibility(&mut scene.graph);
        let second: Vec<bool> = [a, b, c].iter().map(|op| scene.visible(*op)).collect();
        assert_eq!(first, second);
    }
}
