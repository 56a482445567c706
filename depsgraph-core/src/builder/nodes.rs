//! Node builder.
//!
//! Walks the data-blocks reachable from a view layer and creates their
//! nodes. Every creation goes through an idempotent `ensure_*` call, so a
//! data-block reached along several paths (a mesh shared by two objects, a
//! parent that is also in the view layer) is built exactly once.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use super::PreviousBuild;
use crate::data::{Base, DataBlock, IdRef, IdType, Main, ObjectData, ObjectType, ViewLayer};
use crate::eval::ops;
use crate::graph::{
    ComponentId, ComponentKey, CowSlot, Depsgraph, EvalCallback, IdNodeId, NodeType,
    OperationCode, OperationId, OperationKey, EVAL_NEED_CURVE_PATH,
};

pub struct NodeBuilder<'a> {
    main: &'a Main,
    graph: &'a mut Depsgraph,
    previous: PreviousBuild,
    built: HashSet<IdRef>,
    queue: VecDeque<IdRef>,
}

impl<'a> NodeBuilder<'a> {
    pub fn new(main: &'a Main, graph: &'a mut Depsgraph) -> Self {
        Self {
            main,
            graph,
            previous: PreviousBuild::empty(),
            built: HashSet::new(),
            queue: VecDeque::new(),
        }
    }

    /// Adopt copy-on-write slots and request flags of the graph being
    /// replaced. Must be called before any node is created.
    pub fn begin_build(&mut self, previous: PreviousBuild) {
        self.previous = previous;
    }

    /// Build the scene, every base of `layer` and everything they reference.
    pub fn build_view_layer(&mut self, scene: IdRef, layer: &ViewLayer) {
        self.queue.push_back(scene);
        for base in &layer.bases {
            self.build_base(base);
            self.queue.push_back(base.object);
        }
        self.drain();
        // The scene snapshot is needed before anything runs.
        self.expand_cow_id(scene);
    }

    fn build_base(&mut self, base: &Base) {
        let Some(node) = self.add_id_node(base.object) else {
            tracing::debug!(object = ?base.object, "base points to a missing object");
            return;
        };
        let visible_flag = self.graph.mode.base_visibility_flag();
        let id_node = self.graph.id_node_mut(node);
        id_node.has_base = true;
        id_node.is_directly_visible |= base.flags.contains(visible_flag);
    }

    /// Queue a data-block for building.
    fn request(&mut self, id: IdRef) {
        if !self.built.contains(&id) {
            self.queue.push_back(id);
        }
    }

    fn drain(&mut self) {
        while let Some(id) = self.queue.pop_front() {
            if !self.built.insert(id) {
                continue;
            }
            let Some(block) = self.main.get(id) else {
                tracing::debug!(?id, "referenced data-block is missing");
                continue;
            };
            self.build_id(id, block);
        }
    }

    fn build_id(&mut self, id: IdRef, block: &'a DataBlock) {
        let Some(node) = self.add_id_node(id) else {
            return;
        };
        self.build_copy_on_write(node, id);
        self.build_parameters(node, id, block);
        if block.is_animated() {
            self.build_animation(node, id);
        }

        match block.id_type {
            IdType::Scene => self.build_scene(block),
            IdType::Object => {
                if let Some(object) = block.as_object() {
                    self.build_object(node, id, object);
                }
            }
            IdType::Mesh
            | IdType::Curve
            | IdType::Surface
            | IdType::Font
            | IdType::MetaBall
            | IdType::Lattice => {
                self.add_single_operation(
                    node,
                    NodeType::Geometry,
                    OperationCode::GeometryEval,
                    Some(ops::data_geometry(id)),
                );
            }
            IdType::Material => self.build_shading(node, id, block, OperationCode::MaterialUpdate),
            IdType::Texture => self.build_shading(node, id, block, OperationCode::TextureUpdate),
            IdType::Light => self.build_shading(node, id, block, OperationCode::LightUpdate),
            IdType::World => self.build_shading(node, id, block, OperationCode::WorldUpdate),
            IdType::NodeTree => {
                self.add_single_operation(
                    node,
                    NodeType::Shading,
                    OperationCode::NodeTreeOutput,
                    Some(ops::trace(id, "node-tree output")),
                );
            }
            IdType::ParticleSettings => {
                let params = self.add_component(node, ComponentKey::new(NodeType::Parameters));
                self.ensure_operation_node(
                    params,
                    OperationKey::new(OperationCode::ParticleSettingsEval),
                    Some(ops::trace(id, "particle settings")),
                );
            }
            IdType::Armature | IdType::Camera => {}
        }

        for driver in &block.drivers {
            self.request(driver.target);
        }
    }

    fn build_scene(&mut self, block: &DataBlock) {
        let Some(scene) = block.as_scene() else {
            return;
        };
        let referenced = [scene.world, scene.camera, scene.node_tree];
        for id in referenced.into_iter().flatten() {
            self.request(id);
        }
    }

    fn build_object(&mut self, node: IdNodeId, id: IdRef, object: &ObjectData) {
        // Transform: local -> (parent) -> final.
        let transform = self.add_component(node, ComponentKey::new(NodeType::Transform));
        let local = self.ensure_operation_node(
            transform,
            OperationKey::new(OperationCode::TransformLocal),
            Some(ops::transform_local(id)),
        );
        if let Some(parent) = object.parent {
            self.ensure_operation_node(
                transform,
                OperationKey::new(OperationCode::TransformParent),
                Some(ops::transform_parent(id, parent)),
            );
            self.request(parent);
        }
        let last = self.ensure_operation_node(
            transform,
            OperationKey::new(OperationCode::TransformFinal),
            None,
        );
        self.set_entry_exit(transform, local, last);

        self.add_single_operation(
            node,
            NodeType::Visibility,
            OperationCode::Visibility,
            Some(ops::visibility(id)),
        );

        if object.object_type.has_geometry() {
            self.add_single_operation(
                node,
                NodeType::Geometry,
                OperationCode::GeometryEval,
                Some(ops::object_geometry(id, object.data)),
            );
        }

        if object.object_type == ObjectType::Armature {
            let pose = self.add_component(node, ComponentKey::new(NodeType::EvalPose));
            let init = self.ensure_operation_node(
                pose,
                OperationKey::new(OperationCode::PoseInit),
                Some(ops::trace(id, "pose init")),
            );
            let done = self.ensure_operation_node(
                pose,
                OperationKey::new(OperationCode::PoseDone),
                Some(ops::trace(id, "pose done")),
            );
            self.set_entry_exit(pose, init, done);
        }

        if !object.particle_systems.is_empty() {
            let psys = self.add_component(node, ComponentKey::new(NodeType::ParticleSystem));
            for (index, settings) in object.particle_systems.iter().enumerate() {
                let name = self
                    .main
                    .get(*settings)
                    .map_or_else(String::new, |block| block.name.clone());
                self.ensure_operation_node(
                    psys,
                    OperationKey::named(OperationCode::ParticleSystemEval, name.clone())
                        .with_tag(index as i32),
                    Some(ops::particle_system(id, *settings, name)),
                );
                self.request(*settings);
            }
        }

        if !object.materials.is_empty() {
            self.add_single_operation(
                node,
                NodeType::Shading,
                OperationCode::Shading,
                Some(ops::trace(id, "object shading")),
            );
            for material in &object.materials {
                self.request(*material);
            }
        }

        self.add_single_operation(
            node,
            NodeType::Synchronization,
            OperationCode::SynchronizeToOriginal,
            Some(ops::synchronize_to_original(id)),
        );

        if let Some(data) = object.data {
            if object.customdata_mask != 0 {
                if let Some(data_node) = self.add_id_node(data) {
                    self.graph.id_node_mut(data_node).customdata_masks |= object.customdata_mask;
                }
            }
            self.request(data);
        }

        if let Some(target) = object.follow_path {
            self.request_curve_path(target);
        }
    }

    /// The follow-path target may be a curve object or the curve itself;
    /// either way the curve data has to provide its path.
    fn request_curve_path(&mut self, target: IdRef) {
        let curve = match self.main.get(target) {
            Some(block) if block.id_type == IdType::Object => {
                block.as_object().and_then(|object| object.data)
            }
            Some(_) => Some(target),
            None => None,
        };
        if let Some(node) = curve.and_then(|curve| self.add_id_node(curve)) {
            self.graph.id_node_mut(node).eval_flags |= EVAL_NEED_CURVE_PATH;
        }
        self.request(target);
        if let Some(curve) = curve {
            self.request(curve);
        }
    }

    fn build_shading(&mut self, node: IdNodeId, id: IdRef, block: &DataBlock, opcode: OperationCode) {
        self.add_single_operation(
            node,
            NodeType::Shading,
            opcode,
            Some(ops::trace(id, opcode.name())),
        );
        if let Some(tree) = block.node_tree() {
            self.request(tree);
        }
    }

    /// PARAMETERS: entry -> drivers -> eval -> exit.
    fn build_parameters(&mut self, node: IdNodeId, id: IdRef, block: &DataBlock) {
        let params = self.add_component(node, ComponentKey::new(NodeType::Parameters));
        let entry = self.ensure_operation_node(
            params,
            OperationKey::new(OperationCode::ParametersEntry),
            None,
        );
        self.ensure_operation_node(
            params,
            OperationKey::new(OperationCode::ParametersEval),
            Some(ops::parameters_eval(id)),
        );
        for (index, driver) in block.drivers.iter().enumerate() {
            self.ensure_operation_node(
                params,
                OperationKey::named(OperationCode::Driver, driver.property.clone())
                    .with_tag(index as i32),
                Some(ops::driver(id, driver.clone())),
            );
        }
        let exit = self.ensure_operation_node(
            params,
            OperationKey::new(OperationCode::ParametersExit),
            None,
        );
        self.set_entry_exit(params, entry, exit);
    }

    fn build_animation(&mut self, node: IdNodeId, id: IdRef) {
        self.add_single_operation(
            node,
            NodeType::Animation,
            OperationCode::Animation,
            Some(ops::animation(id)),
        );
    }

    fn build_copy_on_write(&mut self, node: IdNodeId, id: IdRef) {
        self.add_single_operation(
            node,
            NodeType::CopyOnWrite,
            OperationCode::CopyOnWrite,
            Some(ops::copy_on_write(id)),
        );
    }

    // ------------------------------------------------------------------
    // Node creation
    // ------------------------------------------------------------------

    /// Node for `id`, created on first request. Objects start out invisible;
    /// bases make them visible.
    pub fn add_id_node(&mut self, id: IdRef) -> Option<IdNodeId> {
        if let Some(existing) = self.graph.id_node_index(id) {
            return Some(existing);
        }
        let block = self.main.get(id)?;
        let node = self.graph.add_id_node(id, block.id_type, &block.name);
        let is_object = block.id_type == IdType::Object;

        let carried = self.previous.get(id).cloned();
        let id_node = self.graph.id_node_mut(node);
        if is_object {
            id_node.is_directly_visible = false;
        }
        if let Some(carried) = carried {
            id_node.previous_eval_flags = carried.eval_flags;
            id_node.previous_customdata_masks = carried.customdata_masks;
        }
        self.ensure_cow_id(id);
        Some(node)
    }

    fn add_component(&mut self, node: IdNodeId, key: ComponentKey) -> ComponentId {
        self.graph.add_component_node(node, key)
    }

    /// Return the operation with `key` in `component`, or create it.
    pub fn ensure_operation_node(
        &mut self,
        component: ComponentId,
        key: OperationKey,
        evaluate: Option<EvalCallback>,
    ) -> OperationId {
        if let Some(existing) = self.graph.component(component).find_operation(&key) {
            return existing;
        }
        self.add_operation_node(component, key, evaluate)
    }

    /// Create an operation. The key must be new within the component.
    pub fn add_operation_node(
        &mut self,
        component: ComponentId,
        key: OperationKey,
        evaluate: Option<EvalCallback>,
    ) -> OperationId {
        self.graph.add_operation_node(component, key, evaluate)
    }

    fn add_single_operation(
        &mut self,
        node: IdNodeId,
        node_type: NodeType,
        opcode: OperationCode,
        evaluate: Option<EvalCallback>,
    ) -> OperationId {
        let comp = self.add_component(node, ComponentKey::new(node_type));
        self.ensure_operation_node(comp, OperationKey::new(opcode), evaluate)
    }

    fn set_entry_exit(&mut self, component: ComponentId, entry: OperationId, exit: OperationId) {
        let comp = self.graph.component_mut(component);
        comp.entry_operation = Some(entry);
        comp.exit_operation = Some(exit);
    }

    // ------------------------------------------------------------------
    // Copy-on-write
    // ------------------------------------------------------------------

    /// Snapshot slot of `id`, if the graph has a node for it.
    pub fn get_cow_id(&self, id: IdRef) -> Option<Arc<CowSlot>> {
        self.graph.find_id_node(id).map(|node| node.cow().clone())
    }

    /// Slot of `id`, adopting the previous graph's slot when there is one.
    /// A slot that was never shared is left as a fresh, unexpanded shell.
    pub fn ensure_cow_id(&mut self, id: IdRef) -> Option<Arc<CowSlot>> {
        let carried = self.previous.get(id).map(|carried| carried.cow.clone());
        let node = self.graph.find_id_node_mut(id)?;
        if let Some(slot) = carried {
            if !Arc::ptr_eq(&node.cow, &slot) {
                node.cow = slot;
            }
        }
        Some(node.cow.clone())
    }

    /// Slot of `id`, filled with a copy of the original if still a shell.
    pub fn expand_cow_id(&mut self, id: IdRef) -> Option<Arc<CowSlot>> {
        let slot = self.ensure_cow_id(id)?;
        if let Some(original) = self.main.get(id) {
            slot.expand(original);
        }
        Some(slot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{Driver, DriverSource, SceneData};
    use crate::graph::DepsNode;

    fn scene(main: &mut Main, bases: Vec<Base>) -> (IdRef, ViewLayer) {
        let layer = ViewLayer::new("View Layer", bases);
        let scene = main.add(DataBlock::scene(
            "Scene",
            SceneData {
                view_layers: vec![layer.clone()],
                ..Default::default()
            },
        ));
        (scene, layer)
    }

    fn component_types(graph: &Depsgraph, id: IdRef) -> Vec<NodeType> {
        graph
            .find_id_node(id)
            .unwrap()
            .components()
            .map(|comp| graph.component(comp).node_type())
            .collect()
    }

    #[test]
    fn shared_data_is_built_once() {
        let mut main = Main::new();
        let mesh = main.add(DataBlock::new("Mesh", IdType::Mesh));
        let object = |name: &str| {
            DataBlock::object(
                name,
                ObjectData {
                    object_type: ObjectType::Mesh,
                    data: Some(mesh),
                    ..Default::default()
                },
            )
        };
        let a = main.add(object("A"));
        let b = main.add(object("B"));
        let (scene, layer) = scene(&mut main, vec![Base::visible(a), Base::visible(b)]);

        let mut graph = Depsgraph::default();
        NodeBuilder::new(&main, &mut graph).build_view_layer(scene, &layer);

        assert_eq!(graph.id_nodes().count(), 4);
        let geometry = ComponentKey::new(NodeType::Geometry);
        let comp = graph.find_component_node(mesh, &geometry).unwrap();
        assert_eq!(graph.component(comp).operations().len(), 1);
    }

    #[test]
    fn object_components_follow_object_type() {
        let mut main = Main::new();
        let armature = main.add(DataBlock::new("Armature", IdType::Armature));
        let rig = main.add(DataBlock::object(
            "Rig",
            ObjectData {
                object_type: ObjectType::Armature,
                data: Some(armature),
                ..Default::default()
            },
        ));
        let empty = main.add(DataBlock::object("Empty", ObjectData::default()));
        let (scene, layer) = scene(&mut main, vec![Base::visible(rig), Base::visible(empty)]);

        let mut graph = Depsgraph::default();
        NodeBuilder::new(&main, &mut graph).build_view_layer(scene, &layer);

        let rig_types = component_types(&graph, rig);
        assert!(rig_types.contains(&NodeType::EvalPose));
        assert!(!rig_types.contains(&NodeType::Geometry));
        assert!(rig_types.contains(&NodeType::Synchronization));

        let empty_types = component_types(&graph, empty);
        assert!(!empty_types.contains(&NodeType::Geometry));
        assert!(empty_types.contains(&NodeType::Transform));
        assert!(empty_types.contains(&NodeType::CopyOnWrite));

        assert_eq!(
            component_types(&graph, armature),
            vec![NodeType::CopyOnWrite, NodeType::Parameters]
        );
    }

    #[test]
    fn visibility_and_base_come_from_view_layer() {
        let mut main = Main::new();
        let parent = main.add(DataBlock::object("Parent", ObjectData::default()));
        let shown = main.add(DataBlock::object(
            "Shown",
            ObjectData {
                parent: Some(parent),
                ..Default::default()
            },
        ));
        let hidden = main.add(DataBlock::object("Hidden", ObjectData::default()));
        let (scene, layer) = scene(&mut main, vec![Base::visible(shown), Base::hidden(hidden)]);

        let mut graph = Depsgraph::default();
        NodeBuilder::new(&main, &mut graph).build_view_layer(scene, &layer);

        let node = |id| graph.find_id_node(id).unwrap();
        assert!(node(shown).is_directly_visible() && node(shown).has_base());
        assert!(!node(hidden).is_directly_visible() && node(hidden).has_base());
        // Pulled in only as a parent.
        assert!(!node(parent).is_directly_visible() && !node(parent).has_base());
        assert!(node(scene).is_directly_visible());
    }

    #[test]
    fn drivers_become_parameter_operations() {
        let mut main = Main::new();
        let target = main.add(DataBlock::object("Target", ObjectData::default()));
        let driven = main.add(
            DataBlock::object("Driven", ObjectData::default()).with_driver(Driver::new(
                "location_z",
                target,
                DriverSource::WorldLocation { axis: 0 },
            )),
        );
        let (scene, layer) = scene(&mut main, vec![Base::visible(driven)]);

        let mut graph = Depsgraph::default();
        NodeBuilder::new(&main, &mut graph).build_view_layer(scene, &layer);

        let key = OperationKey::named(OperationCode::Driver, "location_z").with_tag(0);
        let params = ComponentKey::new(NodeType::Parameters);
        assert!(graph.find_operation_node(driven, &params, &key).is_some());
        // Driver targets are built too.
        assert!(graph.find_id_node(target).is_some());
    }

    #[test]
    fn follow_path_requests_curve_path() {
        let mut main = Main::new();
        let curve = main.add(DataBlock::new("Curve", IdType::Curve));
        let path = main.add(DataBlock::object(
            "Path",
            ObjectData {
                object_type: ObjectType::Curve,
                data: Some(curve),
                ..Default::default()
            },
        ));
        let follower = main.add(DataBlock::object(
            "Follower",
            ObjectData {
                follow_path: Some(path),
                ..Default::default()
            },
        ));
        let (scene, layer) = scene(&mut main, vec![Base::visible(follower)]);

        let mut graph = Depsgraph::default();
        NodeBuilder::new(&main, &mut graph).build_view_layer(scene, &layer);

        assert_eq!(
            graph.find_id_node(curve).unwrap().eval_flags(),
            EVAL_NEED_CURVE_PATH
        );
        assert!(graph.find_id_node(path).is_some());
    }

    #[test]
    fn customdata_requests_reach_object_data() {
        let mut main = Main::new();
        let mesh = main.add(DataBlock::new("Mesh", IdType::Mesh));
        let object = |name: &str, mask| {
            DataBlock::object(
                name,
                ObjectData {
                    object_type: ObjectType::Mesh,
                    data: Some(mesh),
                    customdata_mask: mask,
                    ..Default::default()
                },
            )
        };
        let a = main.add(object("A", 0b01));
        let b = main.add(object("B", 0b10));
        let (scene, layer) = scene(&mut main, vec![Base::visible(a), Base::visible(b)]);

        let mut graph = Depsgraph::default();
        NodeBuilder::new(&main, &mut graph).build_view_layer(scene, &layer);
        assert_eq!(graph.find_id_node(mesh).unwrap().customdata_masks(), 0b11);
    }

    #[test]
    fn cow_slots_are_adopted_from_previous_graph() {
        let mut main = Main::new();
        let cube = main.add(DataBlock::object("Cube", ObjectData::default()));
        let (scene, layer) = scene(&mut main, vec![Base::visible(cube)]);

        let mut first = Depsgraph::default();
        let mut builder = NodeBuilder::new(&main, &mut first);
        builder.build_view_layer(scene, &layer);
        let slot = builder.expand_cow_id(cube).unwrap();
        assert!(slot.is_expanded());
        assert!(builder.get_cow_id(IdRef::from(77)).is_none());

        let previous = PreviousBuild::harvest(&first);
        let mut second = Depsgraph::default();
        let mut builder = NodeBuilder::new(&main, &mut second);
        builder.begin_build(previous);
        builder.build_view_layer(scene, &layer);
        let adopted = builder.get_cow_id(cube).unwrap();
        assert!(Arc::ptr_eq(&slot, &adopted));

        // The scene snapshot is expanded during the build.
        assert!(builder.get_cow_id(scene).unwrap().is_expanded());
    }

    #[test]
    fn ensure_operation_node_is_idempotent() {
        let mut main = Main::new();
        let cube = main.add(DataBlock::object("Cube", ObjectData::default()));
        let mut graph = Depsgraph::default();
        let mut builder = NodeBuilder::new(&main, &mut graph);
        let node = builder.add_id_node(cube).unwrap();
        let comp = builder.add_component(node, ComponentKey::new(NodeType::Shading));

        let key = OperationKey::new(OperationCode::Shading);
        let first = builder.ensure_operation_node(comp, key.clone(), None);
        let second = builder.ensure_operation_node(comp, key, None);
        assert_eq!(first, second);
        assert_eq!(graph.operation_count(), 1);
        assert_eq!(graph.operation(first).name(), "SHADING");
    }
}
