//! Component nodes.
//!
//! A component groups the operations that compute one aspect of a
//! data-block. Relations between components are expressed between their
//! entry and exit operations, so most components either declare those
//! explicitly or consist of a single operation.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use super::node::{DepsNode, IdNodeId, NodeBase, NodeType, OperationId};
use super::operation::OperationKey;

/// Identity of a component inside its ID node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ComponentKey {
    pub node_type: NodeType,
    /// Distinguishes several components of one type (bones, particle systems).
    pub name: String,
}

impl ComponentKey {
    pub fn new(node_type: NodeType) -> Self {
        Self {
            node_type,
            name: String::new(),
        }
    }

    pub fn named(node_type: NodeType, name: impl Into<String>) -> Self {
        Self {
            node_type,
            name: name.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ComponentNode {
    pub(crate) base: NodeBase,
    pub(crate) node_type: NodeType,

    /// ID node that owns this component.
    pub(crate) owner: IdNodeId,

    /// Operations in creation order.
    pub(crate) operations: Vec<OperationId>,
    pub(crate) operations_map: IndexMap<OperationKey, OperationId>,

    pub(crate) entry_operation: Option<OperationId>,
    pub(crate) exit_operation: Option<OperationId>,

    /// Whether anything visible depends on this component. Decided by the
    /// visibility flush during finalize.
    pub(crate) affects_directly_visible: bool,
}

impl ComponentNode {
    pub(crate) fn new(owner: IdNodeId, key: &ComponentKey) -> Self {
        let name = if key.name.is_empty() {
            key.node_type.name().to_string()
        } else {
            format!("{}({})", key.node_type.name(), key.name)
        };
        Self {
            base: NodeBase::new(name),
            node_type: key.node_type,
            owner,
            operations: Vec::new(),
            operations_map: IndexMap::new(),
            entry_operation: None,
            exit_operation: None,
            affects_directly_visible: false,
        }
    }

    pub fn owner(&self) -> IdNodeId {
        self.owner
    }

    pub fn operations(&self) -> &[OperationId] {
        &self.operations
    }

    pub fn find_operation(&self, key: &OperationKey) -> Option<OperationId> {
        self.operations_map.get(key).copied()
    }

    pub fn has_operation(&self, key: &OperationKey) -> bool {
        self.operations_map.contains_key(key)
    }

    /// Operation that relations into this component attach to.
    pub fn entry(&self) -> Option<OperationId> {
        self.entry_operation.or_else(|| self.single_operation())
    }

    /// Operation that relations out of this component start from.
    pub fn exit(&self) -> Option<OperationId> {
        self.exit_operation.or_else(|| self.single_operation())
    }

    pub fn affects_directly_visible(&self) -> bool {
        self.affects_directly_visible
    }

    fn single_operation(&self) -> Option<OperationId> {
        match self.operations.as_slice() {
            [only] => Some(*only),
            _ => None,
        }
    }

    pub(crate) fn insert_operation(&mut self, key: OperationKey, id: OperationId) {
        self.operations.push(id);
        self.operations_map.insert(key, id);
    }
}

impl DepsNode for ComponentNode {
    fn base(&self) -> &NodeBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut NodeBase {
        &mut self.base
    }

    fn node_type(&self) -> NodeType {
        self.node_type
    }
}
