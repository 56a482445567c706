//! ID nodes and their copy-on-write slots.

use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::component::ComponentKey;
use super::node::{ComponentId, DepsNode, NodeBase, NodeType};
use crate::data::{DataBlock, IdRef, IdType, RecalcFlags};

/// The evaluated curve must provide a path for objects following it.
pub const EVAL_NEED_CURVE_PATH: u32 = 1 << 0;

/// Evaluated copy of one data-block.
///
/// A slot starts out as an unexpanded shell (`None`) and receives a full
/// copy of the original the first time the copy-on-write operation runs.
/// Slots are shared through `Arc` so a rebuilt graph can adopt the
/// snapshots of the graph it replaces.
#[derive(Debug, Default)]
pub struct CowSlot {
    data: RwLock<Option<DataBlock>>,
}

impl CowSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_expanded(&self) -> bool {
        self.data.read().is_some()
    }

    pub fn read(&self) -> RwLockReadGuard<'_, Option<DataBlock>> {
        self.data.read()
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, Option<DataBlock>> {
        self.data.write()
    }

    /// Clone of the evaluated data, if expanded.
    pub fn snapshot(&self) -> Option<DataBlock> {
        self.data.read().clone()
    }

    /// Replace the authored part of the copy with `original`.
    ///
    /// Evaluated runtime state survives so results of components that are
    /// not re-evaluated this run stay valid.
    pub fn update_from_original(&self, original: &DataBlock) {
        let mut guard = self.data.write();
        let runtime = guard.take().map(|block| block.runtime).unwrap_or_default();
        let mut copy = original.clone();
        copy.recalc = RecalcFlags::empty();
        copy.runtime = runtime;
        *guard = Some(copy);
    }

    /// Expand the shell unless it already holds data. Returns true when a
    /// copy was made.
    pub fn expand(&self, original: &DataBlock) -> bool {
        if self.is_expanded() {
            return false;
        }
        self.update_from_original(original);
        true
    }

    /// Drop the evaluated data, turning the slot back into a shell.
    pub fn invalidate(&self) {
        *self.data.write() = None;
    }
}

/// One evaluated data-block.
#[derive(Debug)]
pub struct IdNode {
    pub(crate) base: NodeBase,

    /// The authored data-block. Weak: the block may be gone from `Main`.
    pub(crate) id_orig: IdRef,
    pub(crate) id_type: IdType,

    pub(crate) cow: Arc<CowSlot>,

    pub(crate) components: IndexMap<ComponentKey, ComponentId>,

    /// `EVAL_*` requests other IDs make of this one.
    pub(crate) eval_flags: u32,
    pub(crate) previous_eval_flags: u32,

    /// Custom-data layers requested by users of this ID.
    pub(crate) customdata_masks: u64,
    pub(crate) previous_customdata_masks: u64,

    pub(crate) is_directly_visible: bool,

    /// Instanced by a base of the view layer.
    pub(crate) has_base: bool,
}

impl IdNode {
    pub(crate) fn new(id_orig: IdRef, id_type: IdType, name: impl Into<String>) -> Self {
        Self {
            base: NodeBase::new(name),
            id_orig,
            id_type,
            cow: Arc::new(CowSlot::new()),
            components: IndexMap::new(),
            eval_flags: 0,
            previous_eval_flags: 0,
            customdata_masks: 0,
            previous_customdata_masks: 0,
            is_directly_visible: true,
            has_base: false,
        }
    }

    pub fn id_orig(&self) -> IdRef {
        self.id_orig
    }

    pub fn id_type(&self) -> IdType {
        self.id_type
    }

    pub fn cow(&self) -> &Arc<CowSlot> {
        &self.cow
    }

    pub fn find_component(&self, key: &ComponentKey) -> Option<ComponentId> {
        self.components.get(key).copied()
    }

    /// First component of the given type, whatever its name.
    pub fn find_component_by_type(&self, node_type: NodeType) -> Option<ComponentId> {
        self.components
            .iter()
            .find(|(key, _)| key.node_type == node_type)
            .map(|(_, id)| *id)
    }

    pub fn components(&self) -> impl Iterator<Item = ComponentId> + '_ {
        self.components.values().copied()
    }

    pub fn eval_flags(&self) -> u32 {
        self.eval_flags
    }

    pub fn customdata_masks(&self) -> u64 {
        self.customdata_masks
    }

    pub fn is_directly_visible(&self) -> bool {
        self.is_directly_visible
    }

    pub fn has_base(&self) -> bool {
        self.has_base
    }

    /// Eval flags or custom-data requests differ from the previous build.
    pub fn requests_changed(&self) -> bool {
        self.eval_flags != self.previous_eval_flags
            || self.customdata_masks != self.previous_customdata_masks
    }
}

impl DepsNode for IdNode {
    fn base(&self) -> &NodeBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut NodeBase {
        &mut self.base
    }

    fn node_type(&self) -> NodeType {
        NodeType::IdRef
    }
}
