//! The graph container.
//!
//! `Depsgraph` owns every node and relation of one evaluation context (one
//! scene in one view layer). Nodes live in flat arenas addressed by the
//! typed indices from [`node`](super::node); containment is expressed by
//! index lists, so an operation belongs to exactly one component and a
//! component to exactly one ID node.
//!
//! # Lookup
//!
//! ID nodes are keyed by the original data-block's [`IdRef`] and kept in
//! insertion order, so the node's position in the map doubles as its
//! [`IdNodeId`]. Adding a node for an already known data-block returns the
//! existing node; the container never holds two nodes for one data-block.

use indexmap::{IndexMap, IndexSet};

use super::callable::EvalCallback;
use super::component::{ComponentKey, ComponentNode};
use super::id_node::IdNode;
use super::node::{ComponentId, DepsNode, IdNodeId, NodeBase, NodeRef, OperationId, RelationId};
use super::operation::{OperationFlags, OperationKey, OperationNode};
use super::relation::{Relation, RelationFlags};
use super::time_source::TimeSourceNode;
use crate::config::{DepsgraphConfig, EvaluationMode};
use crate::data::{DataBlock, IdRef, IdType};

#[derive(Debug, Default)]
pub struct Depsgraph {
    pub(crate) id_nodes: IndexMap<IdRef, IdNode>,
    pub(crate) components: Vec<ComponentNode>,
    pub(crate) operations: Vec<OperationNode>,
    /// Relations by id. Removed relations leave a `None` behind so ids
    /// stored in link lists stay valid.
    pub(crate) relations: Vec<Option<Relation>>,
    pub(crate) time_source: Option<TimeSourceNode>,

    /// Operations tagged since the last flush.
    pub(crate) entry_tags: IndexSet<OperationId>,

    pub(crate) mode: EvaluationMode,
    pub(crate) scene: Option<IdRef>,
    pub(crate) view_layer: String,
    pub(crate) ctime: f32,

    /// Evaluated results are written back to the originals.
    pub(crate) is_active: bool,
    pub(crate) finalized: bool,
}

impl Depsgraph {
    pub fn new(mode: EvaluationMode) -> Self {
        Self {
            mode,
            ..Default::default()
        }
    }

    pub fn with_config(config: &DepsgraphConfig) -> Self {
        Self {
            mode: config.mode,
            is_active: config.is_active,
            ..Default::default()
        }
    }

    // ------------------------------------------------------------------
    // ID nodes
    // ------------------------------------------------------------------

    pub fn find_id_node(&self, id: IdRef) -> Option<&IdNode> {
        self.id_nodes.get(&id)
    }

    pub(crate) fn find_id_node_mut(&mut self, id: IdRef) -> Option<&mut IdNode> {
        self.id_nodes.get_mut(&id)
    }

    pub fn id_node_index(&self, id: IdRef) -> Option<IdNodeId> {
        self.id_nodes.get_index_of(&id).map(IdNodeId::new)
    }

    /// Return the node for `id`, creating it when absent.
    pub fn add_id_node(&mut self, id: IdRef, id_type: IdType, name: &str) -> IdNodeId {
        let entry = self.id_nodes.entry(id);
        let index = entry.index();
        entry.or_insert_with(|| IdNode::new(id, id_type, name));
        IdNodeId::new(index)
    }

    pub fn id_node(&self, id: IdNodeId) -> &IdNode {
        &self.id_nodes[id.index()]
    }

    pub(crate) fn id_node_mut(&mut self, id: IdNodeId) -> &mut IdNode {
        &mut self.id_nodes[id.index()]
    }

    pub fn id_nodes(&self) -> impl Iterator<Item = &IdNode> {
        self.id_nodes.values()
    }

    // ------------------------------------------------------------------
    // Time source
    // ------------------------------------------------------------------

    pub fn find_time_source(&self) -> Option<&TimeSourceNode> {
        self.time_source.as_ref()
    }

    /// The graph's time source, created on first use.
    pub fn add_time_source(&mut self) -> &mut TimeSourceNode {
        self.time_source.get_or_insert_with(TimeSourceNode::new)
    }

    // ------------------------------------------------------------------
    // Components and operations
    // ------------------------------------------------------------------

    /// Return the component of `owner` with `key`, creating it when absent.
    pub fn add_component_node(&mut self, owner: IdNodeId, key: ComponentKey) -> ComponentId {
        if let Some(existing) = self.id_node(owner).find_component(&key) {
            return existing;
        }
        let id = ComponentId::new(self.components.len());
        self.components.push(ComponentNode::new(owner, &key));
        self.id_node_mut(owner).components.insert(key, id);
        id
    }

    pub fn find_component_node(&self, id: IdRef, key: &ComponentKey) -> Option<ComponentId> {
        self.find_id_node(id)?.find_component(key)
    }

    pub fn component(&self, id: ComponentId) -> &ComponentNode {
        &self.components[id.index()]
    }

    pub(crate) fn component_mut(&mut self, id: ComponentId) -> &mut ComponentNode {
        &mut self.components[id.index()]
    }

    pub fn components(&self) -> impl Iterator<Item = (ComponentId, &ComponentNode)> {
        self.components
            .iter()
            .enumerate()
            .map(|(index, comp)| (ComponentId::new(index), comp))
    }

    /// Add a new operation to a component.
    ///
    /// The key must be unused within the component; builders that may
    /// revisit a data-block go through `NodeBuilder::ensure_operation_node`.
    pub fn add_operation_node(
        &mut self,
        component: ComponentId,
        key: OperationKey,
        evaluate: Option<EvalCallback>,
    ) -> OperationId {
        debug_assert!(
            !self.component(component).has_operation(&key),
            "duplicate operation {} in {}",
            key.display_name(),
            self.component(component).identifier()
        );
        let id = OperationId::new(self.operations.len());
        self.operations
            .push(OperationNode::new(component, key.clone(), evaluate));
        self.component_mut(component).insert_operation(key, id);
        id
    }

    pub fn find_operation_node(
        &self,
        id: IdRef,
        component: &ComponentKey,
        key: &OperationKey,
    ) -> Option<OperationId> {
        let comp = self.find_component_node(id, component)?;
        self.component(comp).find_operation(key)
    }

    pub fn operation(&self, id: OperationId) -> &OperationNode {
        &self.operations[id.index()]
    }

    pub(crate) fn operation_mut(&mut self, id: OperationId) -> &mut OperationNode {
        &mut self.operations[id.index()]
    }

    pub fn operations(&self) -> impl Iterator<Item = (OperationId, &OperationNode)> {
        self.operations
            .iter()
            .enumerate()
            .map(|(index, op)| (OperationId::new(index), op))
    }

    pub fn operation_count(&self) -> usize {
        self.operations.len()
    }

    /// ID node owning an operation.
    pub fn operation_id_node(&self, op: OperationId) -> IdNodeId {
        self.component(self.operation(op).owner).owner
    }

    // ------------------------------------------------------------------
    // Relations
    // ------------------------------------------------------------------

    pub fn relation(&self, id: RelationId) -> Option<&Relation> {
        self.relations.get(id.index()).and_then(Option::as_ref)
    }

    pub(crate) fn relation_mut(&mut self, id: RelationId) -> Option<&mut Relation> {
        self.relations.get_mut(id.index()).and_then(Option::as_mut)
    }

    pub fn relations(&self) -> impl Iterator<Item = (RelationId, &Relation)> {
        self.relations
            .iter()
            .enumerate()
            .filter_map(|(index, rel)| rel.as_ref().map(|rel| (RelationId::new(index), rel)))
    }

    pub fn relation_count(&self) -> usize {
        self.relations.iter().flatten().count()
    }

    pub fn node_base(&self, node: NodeRef) -> Option<&NodeBase> {
        match node {
            NodeRef::TimeSource => self.time_source.as_ref().map(DepsNode::base),
            NodeRef::Id(id) => self.id_nodes.get_index(id.index()).map(|(_, n)| n.base()),
            NodeRef::Component(id) => self.components.get(id.index()).map(DepsNode::base),
            NodeRef::Operation(id) => self.operations.get(id.index()).map(DepsNode::base),
        }
    }

    pub(crate) fn node_base_mut(&mut self, node: NodeRef) -> Option<&mut NodeBase> {
        match node {
            NodeRef::TimeSource => self.time_source.as_mut().map(DepsNode::base_mut),
            NodeRef::Id(id) => self
                .id_nodes
                .get_index_mut(id.index())
                .map(|(_, n)| n.base_mut()),
            NodeRef::Component(id) => self.components.get_mut(id.index()).map(DepsNode::base_mut),
            NodeRef::Operation(id) => self.operations.get_mut(id.index()).map(DepsNode::base_mut),
        }
    }

    pub fn inlinks(&self, node: NodeRef) -> &[RelationId] {
        self.node_base(node).map_or(&[], |base| &base.inlinks)
    }

    pub fn outlinks(&self, node: NodeRef) -> &[RelationId] {
        self.node_base(node).map_or(&[], |base| &base.outlinks)
    }

    /// Identifier of any node, for logs.
    pub fn node_identifier(&self, node: NodeRef) -> String {
        match node {
            NodeRef::Operation(id) => {
                let op = self.operation(id);
                let comp = self.component(op.owner);
                format!(
                    "{} / {} / {}",
                    self.id_node(comp.owner).name(),
                    comp.name(),
                    op.name()
                )
            }
            NodeRef::Component(id) => {
                let comp = self.component(id);
                format!("{} / {}", self.id_node(comp.owner).name(), comp.name())
            }
            NodeRef::Id(id) => self.id_node(id).identifier(),
            NodeRef::TimeSource => "TIME_SOURCE".to_string(),
        }
    }

    /// Add `from → to`, or merge `flags` into the relation that already
    /// connects the two nodes. Returns `None` if either end does not exist.
    pub fn add_new_relation(
        &mut self,
        from: NodeRef,
        to: NodeRef,
        name: &str,
        flags: RelationFlags,
    ) -> Option<RelationId> {
        if from == NodeRef::TimeSource {
            self.add_time_source();
        }
        self.node_base(to)?;
        let existing = self
            .node_base(from)?
            .outlinks
            .iter()
            .copied()
            .find(|rel| self.relation(*rel).is_some_and(|rel| rel.to == to));
        if let Some(existing) = existing {
            if let Some(rel) = self.relation_mut(existing) {
                rel.flags |= flags;
            }
            return Some(existing);
        }

        let id = RelationId::new(self.relations.len());
        let mut relation = Relation::new(from, to, name);
        relation.flags = flags;
        self.relations.push(Some(relation));
        if let Some(base) = self.node_base_mut(from) {
            base.outlinks.push(id);
        }
        if let Some(base) = self.node_base_mut(to) {
            base.inlinks.push(id);
        }
        Some(id)
    }

    /// Unlink a relation from both of its ends.
    pub(crate) fn remove_relation(&mut self, id: RelationId) -> Option<Relation> {
        let relation = self.relations.get_mut(id.index())?.take()?;
        if let Some(base) = self.node_base_mut(relation.from) {
            base.outlinks.retain(|rel| *rel != id);
        }
        if let Some(base) = self.node_base_mut(relation.to) {
            base.inlinks.retain(|rel| *rel != id);
        }
        Some(relation)
    }

    // ------------------------------------------------------------------
    // Tags
    // ------------------------------------------------------------------

    pub(crate) fn add_entry_tag(&mut self, op: OperationId) {
        self.entry_tags.insert(op);
    }

    pub fn entry_tags(&self) -> impl Iterator<Item = OperationId> + '_ {
        self.entry_tags.iter().copied()
    }

    /// True when there are tags waiting for a flush.
    pub fn needs_eval(&self) -> bool {
        !self.entry_tags.is_empty()
    }

    /// Reset update flags of every operation and forget entry tags.
    pub fn clear_all_tags(&mut self) {
        for op in &mut self.operations {
            op.flags
                .remove(OperationFlags::NEEDS_UPDATE | OperationFlags::USER_MODIFIED);
            op.scheduled = false;
        }
        self.entry_tags.clear();
    }

    // ------------------------------------------------------------------
    // Context
    // ------------------------------------------------------------------

    pub fn mode(&self) -> EvaluationMode {
        self.mode
    }

    pub fn get_scene(&self) -> Option<IdRef> {
        self.scene
    }

    pub fn view_layer(&self) -> &str {
        &self.view_layer
    }

    pub fn ctime(&self) -> f32 {
        self.ctime
    }

    pub fn is_active(&self) -> bool {
        self.is_active
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    /// Clone of the evaluated copy of `id`, if the graph has one.
    pub fn get_evaluated_id(&self, id: IdRef) -> Option<DataBlock> {
        self.find_id_node(id)?.cow.snapshot()
    }
}

/// Evaluation flags requested of `id`, or 0 when there is no graph or the
/// graph does not know the data-block.
pub fn get_eval_flags_for_id(graph: Option<&Depsgraph>, id: IdRef) -> u32 {
    graph
        .and_then(|graph| graph.find_id_node(id))
        .map_or(0, IdNode::eval_flags)
}
