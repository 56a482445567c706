//! The data-block arena.
//!
//! `Main` owns every original data-block. Graphs only ever hold `IdRef`s
//! into it, so the lifetime of scene data is decided here and never by the
//! graph: blocks are removed explicitly or by [`Main::collect_garbage`].

use serde::{Deserialize, Serialize};

use super::block::DataBlock;
use super::id::{IdRef, IdType};
use super::recalc::RecalcFlags;

/// Arena of original data-blocks addressed by stable index.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Main {
    blocks: Vec<Option<DataBlock>>,

    /// One bit per `IdType`: "some block of this category was tagged".
    #[serde(skip)]
    type_tags: u32,
}

impl Main {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a block and return its permanent reference.
    pub fn add(&mut self, block: DataBlock) -> IdRef {
        let id = IdRef::new(self.blocks.len());
        self.blocks.push(Some(block));
        id
    }

    pub fn get(&self, id: IdRef) -> Option<&DataBlock> {
        self.blocks.get(id.index()).and_then(Option::as_ref)
    }

    pub fn get_mut(&mut self, id: IdRef) -> Option<&mut DataBlock> {
        self.blocks.get_mut(id.index()).and_then(Option::as_mut)
    }

    /// Remove a block. The slot is never reused.
    pub fn remove(&mut self, id: IdRef) -> Option<DataBlock> {
        self.blocks.get_mut(id.index()).and_then(Option::take)
    }

    pub fn contains(&self, id: IdRef) -> bool {
        self.get(id).is_some()
    }

    /// Number of live blocks.
    pub fn len(&self) -> usize {
        self.blocks.iter().filter(|slot| slot.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = (IdRef, &DataBlock)> {
        self.blocks
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| slot.as_ref().map(|block| (IdRef::new(index), block)))
    }

    pub fn iter_type(&self, id_type: IdType) -> impl Iterator<Item = (IdRef, &DataBlock)> {
        self.iter().filter(move |(_, block)| block.id_type == id_type)
    }

    pub fn find_by_name(&self, id_type: IdType, name: &str) -> Option<IdRef> {
        self.iter_type(id_type)
            .find(|(_, block)| block.name == name)
            .map(|(id, _)| id)
    }

    // ------------------------------------------------------------------
    // Tag bookkeeping
    // ------------------------------------------------------------------

    /// Mark a whole category as having tagged members.
    pub fn tag_id_type(&mut self, id_type: IdType) {
        self.type_tags |= 1 << id_type.index();
    }

    pub fn is_id_type_tagged(&self, id_type: IdType) -> bool {
        self.type_tags & (1 << id_type.index()) != 0
    }

    pub fn any_id_type_tagged(&self) -> bool {
        self.type_tags != 0
    }

    pub fn clear_id_type_tags(&mut self) {
        self.type_tags = 0;
    }

    /// OR flags into the legacy `recalc` field of an original.
    /// Returns false when the block no longer exists.
    pub fn tag_recalc(&mut self, id: IdRef, flags: RecalcFlags) -> bool {
        match self.get_mut(id) {
            Some(block) => {
                block.recalc |= flags;
                true
            }
            None => false,
        }
    }

    /// Reset the legacy `recalc` field of every block.
    pub fn clear_recalc(&mut self) {
        for block in self.blocks.iter_mut().flatten() {
            block.recalc = RecalcFlags::empty();
        }
    }

    // ------------------------------------------------------------------
    // Lifetime
    // ------------------------------------------------------------------

    /// Remove every block not reachable from `roots`.
    ///
    /// Reachability follows [`DataBlock::referenced_ids`] with an explicit
    /// worklist, so arbitrarily deep parent chains cannot overflow the stack.
    /// Returns the removed references in index order.
    pub fn collect_garbage(&mut self, roots: &[IdRef]) -> Vec<IdRef> {
        let mut reachable = vec![false; self.blocks.len()];
        let mut stack: Vec<IdRef> = roots.to_vec();

        while let Some(id) = stack.pop() {
            let Some(block) = self.get(id) else {
                continue;
            };
            if std::mem::replace(&mut reachable[id.index()], true) {
                continue;
            }
            stack.extend(block.referenced_ids());
        }

        let mut removed = Vec::new();
        for (index, slot) in self.blocks.iter_mut().enumerate() {
            if slot.is_some() && !reachable[index] {
                *slot = None;
                removed.push(IdRef::new(index));
            }
        }
        if !removed.is_empty() {
            tracing::debug!(count = removed.len(), "collected unreachable data-blocks");
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{ObjectData, ObjectType, Payload};

    #[test]
    fn removed_slots_stay_empty() {
        let mut main = Main::new();
        let a = main.add(DataBlock::new("A", IdType::Mesh));
        let b = main.add(DataBlock::new("B", IdType::Mesh));

        assert!(main.remove(a).is_some());
        assert!(main.get(a).is_none());
        assert_eq!(main.len(), 1);

        // A new block never takes the old slot.
        let c = main.add(DataBlock::new("C", IdType::Mesh));
        assert_ne!(a, c);
        assert_eq!(main.get(b).map(|block| block.name.as_str()), Some("B"));
    }

    #[test]
    fn find_by_name_respects_type() {
        let mut main = Main::new();
        let mesh = main.add(DataBlock::new("Cube", IdType::Mesh));
        let object = main.add(DataBlock::new("Cube", IdType::Object));
        assert_eq!(main.find_by_name(IdType::Mesh, "Cube"), Some(mesh));
        assert_eq!(main.find_by_name(IdType::Object, "Cube"), Some(object));

        main.remove(mesh);
        assert_eq!(main.find_by_name(IdType::Mesh, "Cube"), None);
    }

    #[test]
    fn type_tags() {
        let mut main = Main::new();
        assert!(!main.any_id_type_tagged());
        main.tag_id_type(IdType::Material);
        assert!(main.is_id_type_tagged(IdType::Material));
        assert!(!main.is_id_type_tagged(IdType::Mesh));
        main.clear_id_type_tags();
        assert!(!main.any_id_type_tagged());
    }

    #[test]
    fn tag_recalc_on_missing_block() {
        let mut main = Main::new();
        let id = main.add(DataBlock::new("A", IdType::Mesh));
        assert!(main.tag_recalc(id, RecalcFlags::OB_RECALC_DATA));
        assert_eq!(main.get(id).unwrap().recalc, RecalcFlags::OB_RECALC_DATA);
        main.remove(id);
        assert!(!main.tag_recalc(id, RecalcFlags::OB_RECALC_DATA));
    }

    #[test]
    fn garbage_collection_keeps_reachable_chain() {
        let mut main = Main::new();
        let mesh = main.add(DataBlock::new("Mesh", IdType::Mesh));
        let orphan = main.add(DataBlock::new("Orphan", IdType::Mesh));
        let parent = main.add(DataBlock::object("Parent", ObjectData::default()));
        let child = main.add(DataBlock::object(
            "Child",
            ObjectData {
                object_type: ObjectType::Mesh,
                data: Some(mesh),
                parent: Some(parent),
                ..Default::default()
            },
        ));

        let removed = main.collect_garbage(&[child]);
        assert_eq!(removed, vec![orphan]);
        assert!(main.contains(mesh));
        assert!(main.contains(parent));
    }

    #[test]
    fn garbage_collection_survives_reference_cycles() {
        let mut main = Main::new();
        let a = main.add(DataBlock::object("A", ObjectData::default()));
        let b = main.add(DataBlock::object(
            "B",
            ObjectData {
                parent: Some(a),
                ..Default::default()
            },
        ));
        if let Some(Payload::Object(data)) = main.get_mut(a).map(|block| &mut block.payload) {
            data.parent = Some(b);
        }

        assert!(main.collect_garbage(&[a]).is_empty());
        assert_eq!(main.collect_garbage(&[]), vec![a, b]);
    }
}
