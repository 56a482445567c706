//! Relation builder.
//!
//! Second walk over the same data-blocks as the node builder. Relations are
//! described with [`NodeKey`]s and resolved against the finished node set:
//! a component key stands for the component's exit operation on the `from`
//! side and its entry operation on the `to` side. Keys that do not resolve
//! (the data-block has no such component) are logged and skipped.

use std::collections::{HashSet, VecDeque};

use crate::data::{DataBlock, DriverSource, IdRef, IdType, Main, ObjectData, ObjectType, ViewLayer};
use crate::graph::{
    ComponentKey, Depsgraph, DepsNode, IdNodeId, NodeRef, NodeType, OperationCode, OperationId,
    OperationKey, RelationFlags, RelationId,
};

/// Description of a relation end, resolved once all nodes exist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKey {
    TimeSource,
    Component {
        id: IdRef,
        component: ComponentKey,
    },
    Operation {
        id: IdRef,
        component: ComponentKey,
        operation: OperationKey,
    },
}

impl NodeKey {
    pub fn component(id: IdRef, node_type: NodeType) -> Self {
        NodeKey::Component {
            id,
            component: ComponentKey::new(node_type),
        }
    }

    pub fn operation(id: IdRef, node_type: NodeType, opcode: OperationCode) -> Self {
        NodeKey::Operation {
            id,
            component: ComponentKey::new(node_type),
            operation: OperationKey::new(opcode),
        }
    }
}

enum Side {
    From,
    To,
}

pub struct RelationBuilder<'a> {
    main: &'a Main,
    graph: &'a mut Depsgraph,
    built: HashSet<IdRef>,
    queue: VecDeque<IdRef>,
}

impl<'a> RelationBuilder<'a> {
    pub fn new(main: &'a Main, graph: &'a mut Depsgraph) -> Self {
        Self {
            main,
            graph,
            built: HashSet::new(),
            queue: VecDeque::new(),
        }
    }

    pub fn build_view_layer(&mut self, scene: IdRef, layer: &ViewLayer) {
        self.queue.push_back(scene);
        self.queue.extend(layer.bases.iter().map(|base| base.object));
        while let Some(id) = self.queue.pop_front() {
            if !self.built.insert(id) {
                continue;
            }
            if let Some(block) = self.main.get(id) {
                self.build_id(id, block);
            }
        }

        // Copy-on-write relations need every intra-component relation.
        let nodes: Vec<IdNodeId> = (0..self.graph.id_nodes.len()).map(IdNodeId::new).collect();
        for node in nodes {
            self.build_copy_on_write_relations(node, scene);
        }
    }

    fn request(&mut self, id: IdRef) {
        if !self.built.contains(&id) {
            self.queue.push_back(id);
        }
    }

    fn build_id(&mut self, id: IdRef, block: &'a DataBlock) {
        self.build_parameters(id, block);
        if block.is_animated() {
            self.build_animation(id, block);
        }

        match block.id_type {
            IdType::Scene => {
                if let Some(scene) = block.as_scene() {
                    if let Some(tree) = scene.node_tree {
                        self.add_relation(
                            NodeKey::component(tree, NodeType::Shading),
                            NodeKey::component(id, NodeType::Parameters),
                            "Compositor → Scene",
                            RelationFlags::empty(),
                        );
                    }
                    for other in [scene.world, scene.camera, scene.node_tree].into_iter().flatten() {
                        self.request(other);
                    }
                }
            }
            IdType::Object => {
                if let Some(object) = block.as_object() {
                    self.build_object(id, object);
                }
            }
            IdType::Mesh
            | IdType::Curve
            | IdType::Surface
            | IdType::Font
            | IdType::MetaBall
            | IdType::Lattice => {
                self.add_relation(
                    NodeKey::component(id, NodeType::Parameters),
                    NodeKey::component(id, NodeType::Geometry),
                    "Parameters → Geometry",
                    RelationFlags::empty(),
                );
            }
            IdType::Material | IdType::Texture | IdType::Light | IdType::World => {
                self.add_relation(
                    NodeKey::component(id, NodeType::Parameters),
                    NodeKey::component(id, NodeType::Shading),
                    "Parameters → Shading",
                    RelationFlags::empty(),
                );
                if let Some(tree) = block.node_tree() {
                    self.add_relation(
                        NodeKey::component(tree, NodeType::Shading),
                        NodeKey::component(id, NodeType::Shading),
                        "Node-tree → Shading",
                        RelationFlags::empty(),
                    );
                    self.request(tree);
                }
            }
            IdType::NodeTree => {
                self.add_relation(
                    NodeKey::component(id, NodeType::Parameters),
                    NodeKey::component(id, NodeType::Shading),
                    "Parameters → Node-tree Output",
                    RelationFlags::empty(),
                );
            }
            IdType::ParticleSettings => {
                let settings = NodeKey::operation(
                    id,
                    NodeType::Parameters,
                    OperationCode::ParticleSettingsEval,
                );
                self.add_relation(
                    NodeKey::operation(id, NodeType::Parameters, OperationCode::ParametersEval),
                    settings.clone(),
                    "Parameters → Particle Settings",
                    RelationFlags::empty(),
                );
                self.add_relation(
                    settings,
                    NodeKey::operation(id, NodeType::Parameters, OperationCode::ParametersExit),
                    "Particle Settings → Parameters Exit",
                    RelationFlags::empty(),
                );
            }
            IdType::Armature | IdType::Camera => {}
        }
    }

    /// entry → drivers → eval → exit, plus driver inputs.
    fn build_parameters(&mut self, id: IdRef, block: &DataBlock) {
        let entry = NodeKey::operation(id, NodeType::Parameters, OperationCode::ParametersEntry);
        let eval = NodeKey::operation(id, NodeType::Parameters, OperationCode::ParametersEval);
        let exit = NodeKey::operation(id, NodeType::Parameters, OperationCode::ParametersExit);
        self.add_relation(entry.clone(), eval.clone(), "Entry → Eval", RelationFlags::empty());
        self.add_relation(eval.clone(), exit, "Eval → Exit", RelationFlags::empty());

        for (index, driver) in block.drivers.iter().enumerate() {
            let driver_key = NodeKey::Operation {
                id,
                component: ComponentKey::new(NodeType::Parameters),
                operation: OperationKey::named(OperationCode::Driver, driver.property.clone())
                    .with_tag(index as i32),
            };
            let source = match driver.source {
                DriverSource::Property(_) => NodeKey::component(driver.target, NodeType::Parameters),
                DriverSource::WorldLocation { .. } => {
                    NodeKey::component(driver.target, NodeType::Transform)
                }
            };
            self.add_relation(source, driver_key.clone(), "Driver Target → Driver", RelationFlags::empty());
            self.add_relation(entry.clone(), driver_key.clone(), "Entry → Driver", RelationFlags::empty());
            self.add_relation(driver_key, eval.clone(), "Driver → Eval", RelationFlags::empty());
            self.request(driver.target);
        }
    }

    fn build_animation(&mut self, id: IdRef, block: &DataBlock) {
        let animation = NodeKey::component(id, NodeType::Animation);
        self.add_relation(
            NodeKey::TimeSource,
            animation.clone(),
            "Time Source → Animation",
            RelationFlags::empty(),
        );
        self.add_relation(
            animation.clone(),
            NodeKey::component(id, NodeType::Parameters),
            "Animation → Parameters",
            RelationFlags::empty(),
        );
        if block.id_type == IdType::Object {
            self.add_relation(
                animation,
                NodeKey::component(id, NodeType::Visibility),
                "Animation → Visibility",
                RelationFlags::empty(),
            );
        }
    }

    fn build_object(&mut self, id: IdRef, object: &ObjectData) {
        let transform = NodeKey::component(id, NodeType::Transform);
        let local = NodeKey::operation(id, NodeType::Transform, OperationCode::TransformLocal);
        let last = NodeKey::operation(id, NodeType::Transform, OperationCode::TransformFinal);
        let geometry = NodeKey::component(id, NodeType::Geometry);
        let sync = NodeKey::component(id, NodeType::Synchronization);
        let has_geometry = object.object_type.has_geometry();

        self.add_relation(
            NodeKey::component(id, NodeType::Parameters),
            transform.clone(),
            "Parameters → Transform",
            RelationFlags::empty(),
        );
        self.add_relation(
            NodeKey::component(id, NodeType::Parameters),
            NodeKey::component(id, NodeType::Visibility),
            "Parameters → Visibility",
            RelationFlags::empty(),
        );

        match object.parent {
            Some(parent) => {
                let parent_op =
                    NodeKey::operation(id, NodeType::Transform, OperationCode::TransformParent);
                self.add_relation(local.clone(), parent_op.clone(), "Local → Parent", RelationFlags::empty());
                self.add_relation(parent_op.clone(), last.clone(), "Parent → Final", RelationFlags::empty());
                self.add_relation(
                    NodeKey::component(parent, NodeType::Transform),
                    parent_op,
                    "Parent Transform → Child Transform",
                    RelationFlags::empty(),
                );
                self.request(parent);
            }
            None => {
                self.add_relation(local.clone(), last, "Local → Final", RelationFlags::empty());
            }
        }
        self.add_relation(transform.clone(), sync.clone(), "Transform → Sync", RelationFlags::empty());

        if has_geometry {
            self.add_relation(transform.clone(), geometry.clone(), "Transform → Geometry", RelationFlags::empty());
            self.add_relation(
                NodeKey::component(id, NodeType::Visibility),
                geometry.clone(),
                "Visibility → Geometry",
                RelationFlags::empty(),
            );
            if let Some(data) = object.data {
                self.add_relation(
                    NodeKey::component(data, NodeType::Geometry),
                    geometry.clone(),
                    "Object Data → Geometry",
                    RelationFlags::empty(),
                );
            }
            self.add_relation(geometry.clone(), sync.clone(), "Geometry → Sync", RelationFlags::empty());
        }

        if object.object_type == ObjectType::Armature {
            let pose = NodeKey::component(id, NodeType::EvalPose);
            self.add_relation(
                NodeKey::operation(id, NodeType::EvalPose, OperationCode::PoseInit),
                NodeKey::operation(id, NodeType::EvalPose, OperationCode::PoseDone),
                "Pose Init → Pose Done",
                RelationFlags::empty(),
            );
            if let Some(data) = object.data {
                self.add_relation(
                    NodeKey::component(data, NodeType::Parameters),
                    pose.clone(),
                    "Armature → Pose",
                    RelationFlags::empty(),
                );
            }
            self.add_relation(transform.clone(), pose.clone(), "Transform → Pose", RelationFlags::empty());
            self.add_relation(pose, sync.clone(), "Pose → Sync", RelationFlags::empty());
        }

        if !object.particle_systems.is_empty() {
            self.add_relation(
                NodeKey::TimeSource,
                NodeKey::component(id, NodeType::ParticleSystem),
                "Time Source → Particles",
                RelationFlags::empty(),
            );
        }
        for (index, settings) in object.particle_systems.iter().enumerate() {
            let name = self
                .main
                .get(*settings)
                .map_or_else(String::new, |block| block.name.clone());
            let psys = NodeKey::Operation {
                id,
                component: ComponentKey::new(NodeType::ParticleSystem),
                operation: OperationKey::named(OperationCode::ParticleSystemEval, name)
                    .with_tag(index as i32),
            };
            let input = if has_geometry { geometry.clone() } else { transform.clone() };
            self.add_relation(input, psys.clone(), "Geometry → Particle System", RelationFlags::empty());
            self.add_relation(
                NodeKey::component(*settings, NodeType::Parameters),
                psys,
                "Particle Settings → Particle System",
                RelationFlags::FLUSH_USER_EDIT_ONLY,
            );
            self.request(*settings);
        }

        for material in &object.materials {
            self.add_relation(
                NodeKey::component(*material, NodeType::Shading),
                NodeKey::component(id, NodeType::Shading),
                "Material → Object Shading",
                RelationFlags::empty(),
            );
            self.request(*material);
        }

        if let Some(target) = object.follow_path {
            self.add_relation(
                NodeKey::component(target, NodeType::Geometry),
                transform,
                "Follow Path",
                RelationFlags::empty(),
            );
            self.request(target);
        }

        if let Some(data) = object.data {
            self.request(data);
        }
    }

    /// Copy-on-write runs before everything else of its ID, and the scene's
    /// copy before every other copy.
    fn build_copy_on_write_relations(&mut self, node: IdNodeId, scene: IdRef) {
        let id_node = self.graph.id_node(node);
        let id = id_node.id_orig();
        let id_type = id_node.id_type();
        let Some(cow_comp) = id_node.find_component(&ComponentKey::new(NodeType::CopyOnWrite))
        else {
            return;
        };
        let Some(cow_op) = self.graph.component(cow_comp).entry() else {
            return;
        };
        let components: Vec<_> = id_node.components().filter(|comp| *comp != cow_comp).collect();

        for comp in components {
            let component = self.graph.component(comp);
            let flushes = component.node_type() == NodeType::Parameters
                || (component.node_type() == NodeType::Geometry && id_type == IdType::Mesh);
            let flags = if flushes {
                RelationFlags::empty()
            } else {
                RelationFlags::NO_FLUSH
            };

            let entry = component.entry();
            let mut targets: Vec<OperationId> = entry.into_iter().collect();
            for op in component.operations() {
                if Some(*op) != entry && !self.has_inlink_from_component(*op, comp) {
                    targets.push(*op);
                }
            }
            for target in targets {
                self.graph
                    .add_new_relation(cow_op.into(), target.into(), "CoW Dependency", flags);
            }
        }

        if id != scene {
            self.add_relation(
                NodeKey::component(scene, NodeType::CopyOnWrite),
                NodeKey::component(id, NodeType::CopyOnWrite),
                "Scene CoW → ID CoW",
                RelationFlags::NO_FLUSH,
            );
        }
    }

    fn has_inlink_from_component(&self, op: OperationId, comp: crate::graph::ComponentId) -> bool {
        self.graph
            .operation(op)
            .inlinks()
            .iter()
            .filter_map(|rel| self.graph.relation(*rel))
            .filter_map(|rel| rel.from.as_operation())
            .any(|from| self.graph.operation(from).owner() == comp)
    }

    // ------------------------------------------------------------------
    // Key resolution
    // ------------------------------------------------------------------

    fn find_node(&self, key: &NodeKey, side: Side) -> Option<NodeRef> {
        match key {
            NodeKey::TimeSource => Some(NodeRef::TimeSource),
            NodeKey::Component { id, component } => {
                let comp = self.graph.find_component_node(*id, component)?;
                let node = self.graph.component(comp);
                let op = match side {
                    Side::From => node.exit(),
                    Side::To => node.entry(),
                };
                op.map(NodeRef::Operation)
            }
            NodeKey::Operation {
                id,
                component,
                operation,
            } => self
                .graph
                .find_operation_node(*id, component, operation)
                .map(NodeRef::Operation),
        }
    }

    /// Time-source relations end at whole components; everything else is
    /// resolved to operations.
    fn find_target(&self, from: &NodeKey, to: &NodeKey) -> Option<NodeRef> {
        match (from, to) {
            (NodeKey::TimeSource, NodeKey::Component { id, component }) => self
                .graph
                .find_component_node(*id, component)
                .map(NodeRef::Component),
            _ => self.find_node(to, Side::To),
        }
    }

    pub fn add_relation(
        &mut self,
        from: NodeKey,
        to: NodeKey,
        name: &str,
        flags: RelationFlags,
    ) -> Option<RelationId> {
        let resolved = self
            .find_node(&from, Side::From)
            .zip(self.find_target(&from, &to));
        let Some((from_node, to_node)) = resolved else {
            tracing::debug!(?from, ?to, name, "skipping relation with unresolved end");
            return None;
        };
        self.graph.add_new_relation(from_node, to_node, name, flags)
    }
}
