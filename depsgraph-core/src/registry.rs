//! Graph registry.
//!
//! One graph exists per (scene, view layer) pair. The registry owns them
//! and fans tags out to all of them, so an edit made through one view is
//! seen by every graph that contains the edited data-block.

use std::sync::Arc;

use indexmap::IndexMap;

use crate::config::DepsgraphConfig;
use crate::data::{IdRef, IdType, Main, RecalcFlags};
use crate::error::Result;
use crate::eval::{evaluate_on_refresh, EvalReport, Scheduler};
use crate::flush::flush_updates;
use crate::graph::{DepsgraphHandle, UpdateSource};
use crate::tag::{self, graph_id_tag_update, tag_original};

/// Notified about data-blocks an update reached.
pub trait UpdateListener: Send + Sync {
    fn id_updated(&self, graph: &DepsgraphHandle, id: IdRef);
}

impl<F> UpdateListener for F
where
    F: Fn(&DepsgraphHandle, IdRef) + Send + Sync,
{
    fn id_updated(&self, graph: &DepsgraphHandle, id: IdRef) {
        self(graph, id)
    }
}

type GraphKey = (IdRef, String);

#[derive(Default)]
pub struct DepsgraphRegistry {
    graphs: IndexMap<GraphKey, DepsgraphHandle>,
    listener: Option<Arc<dyn UpdateListener>>,
    config: DepsgraphConfig,
}

impl std::fmt::Debug for DepsgraphRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DepsgraphRegistry")
            .field("graphs", &self.graphs.keys().collect::<Vec<_>>())
            .field("listener", &self.listener.is_some())
            .field("config", &self.config)
            .finish()
    }
}

impl DepsgraphRegistry {
    pub fn new(config: DepsgraphConfig) -> Self {
        Self {
            config,
            ..Default::default()
        }
    }

    pub fn config(&self) -> &DepsgraphConfig {
        &self.config
    }

    /// Graph of `scene`/`view_layer`, built on first request.
    pub fn ensure(&mut self, main: &Main, scene: IdRef, view_layer: &str) -> Result<DepsgraphHandle> {
        let key = (scene, view_layer.to_string());
        if let Some(handle) = self.graphs.get(&key) {
            return Ok(handle.clone());
        }
        let handle = DepsgraphHandle::default();
        handle.rebuild(main, scene, view_layer, &self.config)?;
        self.graphs.insert(key, handle.clone());
        Ok(handle)
    }

    pub fn get(&self, scene: IdRef, view_layer: &str) -> Option<DepsgraphHandle> {
        self.graphs.get(&(scene, view_layer.to_string())).cloned()
    }

    pub fn remove(&mut self, scene: IdRef, view_layer: &str) -> Option<DepsgraphHandle> {
        self.graphs.shift_remove(&(scene, view_layer.to_string()))
    }

    pub fn len(&self) -> usize {
        self.graphs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.graphs.is_empty()
    }

    pub fn handles(&self) -> impl Iterator<Item = &DepsgraphHandle> {
        self.graphs.values()
    }

    pub fn set_update_listener(&mut self, listener: Option<Arc<dyn UpdateListener>>) {
        self.listener = listener;
    }

    /// Tag `id` in every graph. The original-side bookkeeping (category
    /// tag, particle recalc mirror) happens once.
    pub fn tag_update(&self, main: &mut Main, id: IdRef, flags: RecalcFlags) {
        if !tag_original(main, id, flags) {
            return;
        }
        for handle in self.graphs.values() {
            graph_id_tag_update(&mut handle.write(), main, id, flags, UpdateSource::UserEdit);
        }
    }

    pub fn id_type_tag(&self, main: &mut Main, id_type: IdType) {
        tag::id_type_tag(main, id_type);
    }

    /// Rebuild every graph, keeping their evaluated copies.
    pub fn rebuild_all(&self, main: &Main) -> Result<()> {
        for ((scene, view_layer), handle) in &self.graphs {
            handle.rebuild(main, *scene, view_layer, &self.config)?;
        }
        Ok(())
    }

    /// Flush pending tags of every graph and report the reached IDs.
    pub fn flush_all(&self) -> Vec<IdRef> {
        let mut all = Vec::new();
        for handle in self.graphs.values() {
            let updated = flush_updates(&mut handle.write());
            self.notify(handle, &updated);
            all.extend(updated);
        }
        all
    }

    /// Evaluate every graph at its scene's frame, then reset legacy tags.
    pub fn evaluate_all(&self, main: &mut Main, scheduler: &Scheduler) -> Vec<EvalReport> {
        let reports = self
            .graphs
            .values()
            .map(|handle| {
                let report = evaluate_on_refresh(main, &mut handle.write(), scheduler);
                self.notify(handle, &report.updated_ids);
                report
            })
            .collect();
        tag::ids_clear_recalc(main);
        reports
    }

    fn notify(&self, handle: &DepsgraphHandle, ids: &[IdRef]) {
        let Some(listener) = &self.listener else {
            return;
        };
        for id in ids {
            listener.id_updated(handle, *id);
        }
    }
}

/// Tag `id` in every graph of `registry`.
pub fn tag_update(registry: &DepsgraphRegistry, main: &mut Main, id: IdRef, flags: RecalcFlags) {
    registry.tag_update(main, id, flags);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{Base, DataBlock, ObjectData, SceneData, ViewLayer};
    use crate::error::DepsgraphError;
    use parking_lot::Mutex;

    fn main_with_two_layers() -> (Main, IdRef, IdRef, IdRef) {
        let mut main = Main::new();
        let cube = main.add(DataBlock::object("Cube", ObjectData::default()));
        let lamp = main.add(DataBlock::object("Lamp", ObjectData::default()));
        let scene = main.add(DataBlock::scene(
            "Scene",
            SceneData {
                view_layers: vec![
                    ViewLayer::new("Layer A", vec![Base::visible(cube)]),
                    ViewLayer::new("Layer B", vec![Base::visible(cube), Base::visible(lamp)]),
                ],
                ..Default::default()
            },
        ));
        (main, scene, cube, lamp)
    }

    #[test]
    fn ensure_builds_once() {
        let (main, scene, _, _) = main_with_two_layers();
        let mut registry = DepsgraphRegistry::default();
        let first = registry.ensure(&main, scene, "Layer A").unwrap();
        let again = registry.ensure(&main, scene, "Layer A").unwrap();
        assert!(first.ptr_eq(&again));
        registry.ensure(&main, scene, "Layer B").unwrap();
        assert_eq!(registry.len(), 2);

        assert!(matches!(
            registry.ensure(&main, scene, "Layer C"),
            Err(DepsgraphError::UnknownViewLayer { .. })
        ));
        assert_eq!(registry.len(), 2);
        assert!(registry.remove(scene, "Layer A").is_some());
        assert!(registry.get(scene, "Layer A").is_none());
    }

    #[test]
    fn tags_reach_every_graph_containing_the_id() {
        let (mut main, scene, cube, lamp) = main_with_two_layers();
        let mut registry = DepsgraphRegistry::default();
        let a = registry.ensure(&main, scene, "Layer A").unwrap();
        let b = registry.ensure(&main, scene, "Layer B").unwrap();
        a.write().clear_all_tags();
        b.write().clear_all_tags();

        tag_update(&registry, &mut main, cube, RecalcFlags::OB_RECALC_OB);
        assert!(a.read().needs_eval());
        assert!(b.read().needs_eval());
        assert!(main.is_id_type_tagged(IdType::Object));

        a.write().clear_all_tags();
        b.write().clear_all_tags();
        registry.tag_update(&mut main, lamp, RecalcFlags::OB_RECALC_OB);
        assert!(!a.read().needs_eval());
        assert!(b.read().needs_eval());
    }

    #[test]
    fn listener_hears_about_updated_ids() {
        let (mut main, scene, cube, _) = main_with_two_layers();
        let mut registry = DepsgraphRegistry::default();
        let handle = registry.ensure(&main, scene, "Layer A").unwrap();
        handle.write().clear_all_tags();

        let heard = Arc::new(Mutex::new(Vec::new()));
        let sink = heard.clone();
        registry.set_update_listener(Some(Arc::new(move |_: &DepsgraphHandle, id: IdRef| {
            sink.lock().push(id);
        })));

        registry.tag_update(&mut main, cube, RecalcFlags::OB_RECALC_OB);
        let flushed = registry.flush_all();
        assert_eq!(flushed, vec![cube]);
        assert_eq!(*heard.lock(), vec![cube]);
    }

    #[test]
    fn evaluate_all_clears_legacy_tags() {
        let (mut main, scene, cube, _) = main_with_two_layers();
        let mut registry = DepsgraphRegistry::default();
        registry.ensure(&main, scene, "Layer A").unwrap();
        registry.ensure(&main, scene, "Layer B").unwrap();
        let scheduler = Scheduler::new(&DepsgraphConfig::default().with_threads(2)).unwrap();

        registry.tag_update(&mut main, cube, RecalcFlags::OB_RECALC_OB);
        assert!(tag::ids_check_recalc(&main));
        let reports = registry.evaluate_all(&mut main, &scheduler);
        assert_eq!(reports.len(), 2);
        assert!(reports.iter().all(|report| !report.evaluated.is_empty()));
        assert!(!tag::ids_check_recalc(&main));
        assert!(registry.handles().all(|handle| !handle.read().needs_eval()));
    }

    #[test]
    fn rebuild_all_keeps_handles() {
        let (main, scene, _, _) = main_with_two_layers();
        let mut registry = DepsgraphRegistry::default();
        let handle = registry.ensure(&main, scene, "Layer B").unwrap();
        registry.rebuild_all(&main).unwrap();
        assert!(registry.get(scene, "Layer B").unwrap().ptr_eq(&handle));
        assert!(handle.read().is_finalized());
    }
}
