//! Evaluation context handed to every operation callback.

use indexmap::IndexMap;
use parking_lot::Mutex;

use crate::data::{DataBlock, IdRef, Main};
use crate::graph::Depsgraph;

/// Evaluated results to copy back onto an original data-block.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncRecord {
    pub id: IdRef,
    pub world_location: [f64; 3],
    pub geometry: IndexMap<String, f64>,
}

/// Read access to the graph and the originals, plus locked access to
/// evaluated copies.
///
/// The helpers take one snapshot lock at a time and release it before
/// returning, so callbacks that read one data-block and write another never
/// hold two locks at once.
pub struct EvalContext<'a> {
    graph: &'a Depsgraph,
    main: &'a Main,
    ctime: f32,
    sync_queue: Mutex<Vec<SyncRecord>>,
}

impl<'a> EvalContext<'a> {
    pub fn new(graph: &'a Depsgraph, main: &'a Main, ctime: f32) -> Self {
        Self {
            graph,
            main,
            ctime,
            sync_queue: Mutex::new(Vec::new()),
        }
    }

    pub fn graph(&self) -> &'a Depsgraph {
        self.graph
    }

    /// Current frame.
    pub fn ctime(&self) -> f32 {
        self.ctime
    }

    /// Authored data-block. Must not be used to derive evaluated results
    /// of other data-blocks; read their snapshots instead.
    pub fn original(&self, id: IdRef) -> Option<&'a DataBlock> {
        self.main.get(id)
    }

    /// Run `f` on the evaluated copy of `id`. `None` when the graph does not
    /// know `id` or its snapshot has not been expanded yet.
    pub fn read_evaluated<R>(&self, id: IdRef, f: impl FnOnce(&DataBlock) -> R) -> Option<R> {
        let node = self.graph.find_id_node(id)?;
        let guard = node.cow().read();
        guard.as_ref().map(f)
    }

    /// Run `f` on the evaluated copy of `id` with write access.
    pub fn write_evaluated<R>(
        &self,
        id: IdRef,
        f: impl FnOnce(&mut DataBlock) -> R,
    ) -> Option<R> {
        let node = self.graph.find_id_node(id)?;
        let mut guard = node.cow().write();
        guard.as_mut().map(f)
    }

    /// Refresh the evaluated copy of `id` from its original.
    pub fn copy_from_original(&self, id: IdRef) -> bool {
        let (Some(node), Some(original)) = (self.graph.find_id_node(id), self.main.get(id)) else {
            return false;
        };
        node.cow().update_from_original(original);
        true
    }

    pub fn queue_sync(&self, record: SyncRecord) {
        self.sync_queue.lock().push(record);
    }

    pub(crate) fn into_sync_queue(self) -> Vec<SyncRecord> {
        self.sync_queue.into_inner()
    }
}
