//! Tagging
//!
//! Translates "this data-block changed in these ways" into `NEEDS_UPDATE`
//! marks on operations. Tags only mark the operations directly affected
//! and record them as entry tags; [`flush`](crate::flush) later spreads
//! the marks along relations.
//!
//! # Flag routing
//!
//! | flag                     | target                                         |
//! |--------------------------|------------------------------------------------|
//! | none                     | every component of the ID                      |
//! | `OB_RECALC_OB`           | TRANSFORM                                      |
//! | `OB_RECALC_DATA`         | GEOMETRY, EVAL_POSE (armature objects) or PARAMETERS (armature data) |
//! | `OB_RECALC_TIME`         | ANIMATION, when there is one                   |
//! | `PSYS_RECALC_*`          | PARAMETERS                                     |
//! | `DEG_TAG_COPY_ON_WRITE`  | the copy-on-write operation                    |
//! | `DEG_TAG_SHADING_UPDATE` | SHADING                                        |
//!
//! Any flag other than `OB_RECALC_TIME` also tags the copy-on-write
//! operation (and the animation on top of it), so the evaluated copy picks
//! up the edited original before the tagged components run again.

use crate::data::{IdRef, IdType, Main, ObjectType, RecalcFlags};
use crate::graph::{
    ComponentId, Depsgraph, DepsNode, IdNodeId, NodeRef, NodeType, OperationFlags, OperationId,
    UpdateSource,
};

/// Tag `id` in `graph` as changed by a user edit.
///
/// Also marks the ID's category in `main` and records `flags` in the
/// original's legacy `recalc`, where a rebuild picks them up again until
/// [`ids_clear_recalc`] runs. Unknown data-blocks are ignored.
pub fn tag_update_ex(main: &mut Main, graph: &mut Depsgraph, id: IdRef, flags: RecalcFlags) {
    if !tag_original(main, id, flags) {
        return;
    }
    graph_id_tag_update(graph, main, id, flags, UpdateSource::UserEdit);
}

/// Bookkeeping on the original side of a tag. Returns false when `id` no
/// longer exists.
pub(crate) fn tag_original(main: &mut Main, id: IdRef, flags: RecalcFlags) -> bool {
    let Some(id_type) = main.get(id).map(|block| block.id_type) else {
        tracing::debug!(?id, "tag of unknown data-block ignored");
        return false;
    };
    id_type_tag(main, id_type);
    // An empty mask has no legacy representation; it only tags the graph.
    if !flags.is_empty() {
        main.tag_recalc(id, flags);
    }
    true
}

/// Graph side of a tag.
pub(crate) fn graph_id_tag_update(
    graph: &mut Depsgraph,
    main: &Main,
    id: IdRef,
    flags: RecalcFlags,
    source: UpdateSource,
) {
    let Some(node) = graph.id_node_index(id) else {
        return;
    };
    if flags.is_empty() {
        tag_id_node(graph, node, source);
        return;
    }
    let id_type = graph.id_node(node).id_type();

    if flags.contains(RecalcFlags::OB_RECALC_OB) {
        tag_component_type(graph, node, NodeType::Transform, source, false);
    }
    if flags.contains(RecalcFlags::OB_RECALC_DATA) {
        let object = main.get(id).and_then(|block| block.as_object());
        let target = match id_type {
            IdType::Object => match object.map(|object| object.object_type) {
                Some(ObjectType::Armature) => NodeType::EvalPose,
                _ => NodeType::Geometry,
            },
            IdType::Armature => NodeType::Parameters,
            _ => NodeType::Geometry,
        };
        tag_component_type(graph, node, target, source, false);

        if flags.contains(RecalcFlags::DEG_TAG_COPY_ON_WRITE) {
            if let Some(data) = object.and_then(|object| object.data) {
                graph_id_tag_update(graph, main, data, flags, source);
            }
        }
    }
    if flags.contains(RecalcFlags::OB_RECALC_TIME) {
        tag_component_type(graph, node, NodeType::Animation, source, true);
    }
    if flags.intersects(RecalcFlags::PSYS_RECALC) {
        tag_component_type(graph, node, NodeType::Parameters, source, false);
    }
    if flags.contains(RecalcFlags::DEG_TAG_SHADING_UPDATE) {
        tag_component_type(graph, node, NodeType::Shading, source, false);
    }
    if flags.contains(RecalcFlags::DEG_TAG_COPY_ON_WRITE) {
        tag_copy_on_write(graph, node, source);
    } else if !flags.difference(RecalcFlags::OB_RECALC_TIME).is_empty() {
        tag_copy_on_write(graph, node, source);
        tag_component_type(graph, node, NodeType::Animation, source, true);
    }
}

fn tag_copy_on_write(graph: &mut Depsgraph, node: IdNodeId, source: UpdateSource) {
    let cow = graph
        .id_node(node)
        .find_component_by_type(NodeType::CopyOnWrite)
        .and_then(|comp| graph.component(comp).entry());
    match cow {
        Some(op) => tag_operation(graph, op, source),
        None => missing_component(graph, node, NodeType::CopyOnWrite),
    }
}

fn missing_component(graph: &Depsgraph, node: IdNodeId, node_type: NodeType) {
    let name = graph.id_node(node).name();
    debug_assert!(
        !cfg!(feature = "strict-tagging"),
        "{name} has no {} component",
        node_type.name()
    );
    tracing::debug!(id = name, component = node_type.name(), "tagged component missing");
}

fn tag_component_type(
    graph: &mut Depsgraph,
    node: IdNodeId,
    node_type: NodeType,
    source: UpdateSource,
    optional: bool,
) {
    match graph.id_node(node).find_component_by_type(node_type) {
        Some(comp) => tag_component(graph, comp, source),
        None if optional => {}
        None => missing_component(graph, node, node_type),
    }
}

/// Mark one operation and remember it as a flush entry point.
pub fn tag_operation(graph: &mut Depsgraph, op: OperationId, source: UpdateSource) {
    let node = graph.operation_mut(op);
    node.flags |= OperationFlags::NEEDS_UPDATE;
    if source == UpdateSource::UserEdit {
        node.flags |= OperationFlags::USER_MODIFIED;
    }
    graph.add_entry_tag(op);
}

/// Mark every operation of a component.
pub fn tag_component(graph: &mut Depsgraph, comp: ComponentId, source: UpdateSource) {
    let component = graph.component(comp);
    if let Some(entry) = component.entry() {
        if graph.operation(entry).needs_update() {
            return;
        }
    }
    let ops = component.operations().to_vec();
    for op in ops {
        tag_operation(graph, op, source);
    }
}

pub fn tag_id_node(graph: &mut Depsgraph, node: IdNodeId, source: UpdateSource) {
    let components: Vec<ComponentId> = graph.id_node(node).components().collect();
    for comp in components {
        tag_component(graph, comp, source);
    }
}

/// Tag everything the time source feeds.
pub fn tag_time_source(graph: &mut Depsgraph) {
    let targets: Vec<NodeRef> = graph
        .outlinks(NodeRef::TimeSource)
        .iter()
        .filter_map(|rel| graph.relation(*rel))
        .map(|rel| rel.to)
        .collect();
    for target in targets {
        tag_node(graph, target, UpdateSource::Time);
    }
}

pub fn tag_node(graph: &mut Depsgraph, node: NodeRef, source: UpdateSource) {
    match node {
        NodeRef::TimeSource => tag_time_source(graph),
        NodeRef::Id(id) => tag_id_node(graph, id, source),
        NodeRef::Component(comp) => tag_component(graph, comp, source),
        NodeRef::Operation(op) => tag_operation(graph, op, source),
    }
}

/// Mark a whole category of data-blocks as changed.
///
/// Node-trees feed every shading category and the compositor, so tagging
/// them marks those categories too.
pub fn id_type_tag(main: &mut Main, id_type: IdType) {
    main.tag_id_type(id_type);
    if id_type == IdType::NodeTree {
        for shading in [
            IdType::Material,
            IdType::Texture,
            IdType::Light,
            IdType::World,
            IdType::Scene,
        ] {
            main.tag_id_type(shading);
        }
    }
}

/// True when any category or any original carries a pending tag.
pub fn ids_check_recalc(main: &Main) -> bool {
    main.any_id_type_tagged() || main.iter().any(|(_, block)| !block.recalc.is_empty())
}

pub fn ids_clear_recalc(main: &mut Main) {
    main.clear_id_type_tags();
    main.clear_recalc();
}
