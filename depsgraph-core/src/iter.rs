//! Object iteration.
//!
//! [`Depsgraph::objects`] walks the bases of the graph's view layer and
//! yields the evaluated copy of each object, optionally followed by the
//! instances ("duplis") a [`DupliProvider`] generates for it. Base flags are
//! written onto the evaluated copy right before it is yielded, so consumers
//! see the flags of the base they reached the object through.

use std::collections::VecDeque;

use crate::data::{Base, BaseFlags, DataBlock, IdRef, Main};
use crate::graph::Depsgraph;

bit_flags! {
    /// What [`Depsgraph::objects`] yields.
    pub struct IterFlags: u32 {
        /// Skip bases not visible in the graph's evaluation mode.
        const VISIBLE = 1 << 0;
        /// Follow each object with its dupli instances.
        const DUPLI = 1 << 1;
    }
}

/// One instance generated for an object.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DupliInstance {
    /// Object being instanced.
    pub object: IdRef,
    /// Added to the instanced object's evaluated world location.
    pub offset: [f64; 3],
}

/// Source of dupli instances (particle instancing, collection instances, ...).
pub trait DupliProvider {
    /// Instances generated by the evaluated object `parent`.
    fn duplis(&self, parent: IdRef, evaluated: &DataBlock) -> Vec<DupliInstance>;
}

impl<F> DupliProvider for F
where
    F: Fn(IdRef, &DataBlock) -> Vec<DupliInstance>,
{
    fn duplis(&self, parent: IdRef, evaluated: &DataBlock) -> Vec<DupliInstance> {
        self(parent, evaluated)
    }
}

/// An object as seen through the graph.
#[derive(Debug, Clone, PartialEq)]
pub struct EvaluatedObject {
    pub id: IdRef,
    /// Owned copy of the evaluated data-block.
    pub object: DataBlock,
    /// Object that generated this instance.
    pub dupli_parent: Option<IdRef>,
}

impl EvaluatedObject {
    pub fn is_dupli(&self) -> bool {
        self.dupli_parent.is_some()
    }
}

/// Lazy iterator returned by [`Depsgraph::objects`].
pub struct ObjectIter<'a> {
    graph: &'a Depsgraph,
    main: &'a Main,
    flags: IterFlags,
    provider: Option<&'a dyn DupliProvider>,
    bases: std::vec::IntoIter<Base>,
    pending: VecDeque<EvaluatedObject>,
}

impl Depsgraph {
    /// Iterate objects of the graph's view layer.
    ///
    /// Each call starts a fresh walk. A scene or view layer missing from
    /// `main` yields nothing.
    pub fn objects<'a>(
        &'a self,
        main: &'a Main,
        flags: IterFlags,
        provider: Option<&'a dyn DupliProvider>,
    ) -> ObjectIter<'a> {
        let bases = self
            .get_scene()
            .and_then(|scene| main.get(scene))
            .and_then(|block| block.as_scene())
            .and_then(|scene| scene.view_layer(self.view_layer()))
            .map(|layer| layer.bases.clone())
            .unwrap_or_default();
        ObjectIter {
            graph: self,
            main,
            flags,
            provider,
            bases: bases.into_iter(),
            pending: VecDeque::new(),
        }
    }
}

impl<'a> ObjectIter<'a> {
    /// Evaluated copy of `id` with `flags` applied, expanding the snapshot
    /// from the original on first use.
    fn evaluated(&self, id: IdRef, flags: BaseFlags) -> Option<DataBlock> {
        let node = self.graph.find_id_node(id)?;
        let slot = node.cow();
        if let Some(original) = self.main.get(id) {
            slot.expand(original);
        }
        let mut guard = slot.write();
        let block = guard.as_mut()?;
        block.runtime.base_flags = flags;
        Some(block.clone())
    }

    fn queue_duplis(&mut self, parent: IdRef, evaluated: &DataBlock) {
        let Some(provider) = self.provider else {
            return;
        };
        for (index, dupli) in provider.duplis(parent, evaluated).into_iter().enumerate() {
            let flags = evaluated.runtime.base_flags | BaseFlags::FROM_DUPLI;
            let source = self
                .graph
                .get_evaluated_id(dupli.object)
                .or_else(|| self.main.get(dupli.object).cloned());
            let Some(mut object) = source else {
                tracing::debug!(object = ?dupli.object, "dupli of unknown object skipped");
                continue;
            };
            object.runtime.base_flags = flags;
            object.runtime.dupli_index = Some(index);
            for (axis, offset) in object.runtime.world_location.iter_mut().zip(dupli.offset) {
                *axis += offset;
            }
            self.pending.push_back(EvaluatedObject {
                id: dupli.object,
                object,
                dupli_parent: Some(parent),
            });
        }
    }
}

impl Iterator for ObjectIter<'_> {
    type Item = EvaluatedObject;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(dupli) = self.pending.pop_front() {
            return Some(dupli);
        }
        let visible_flag = self.graph.mode().base_visibility_flag();
        loop {
            let base = self.bases.next()?;
            if self.flags.contains(IterFlags::VISIBLE) && !base.flags.contains(visible_flag) {
                continue;
            }
            let Some(object) = self.evaluated(base.object, base.flags) else {
                continue;
            };
            if self.flags.contains(IterFlags::DUPLI) {
                self.queue_duplis(base.object, &object);
            }
            return Some(EvaluatedObject {
                id: base.object,
                object,
                dupli_parent: None,
            });
        }
    }
}
