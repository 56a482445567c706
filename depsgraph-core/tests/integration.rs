//! Integration Tests
//!
//! End-to-end scenarios: build a graph from scene data, tag it, flush it and
//! evaluate it through the public API only.

use depsgraph_core::graph::{
    ComponentKey, DepsNode, NodeType, OperationCode, OperationId, OperationKey, RelationFlags,
};
use depsgraph_core::{
    build_from_view_layer, evaluate_on_refresh, flush_updates, tag_update_ex, Base, DataBlock,
    Depsgraph, DepsgraphConfig, DepsgraphRegistry, Driver, DriverSource, IdRef, IdType, Main,
    ObjectData, ObjectType, PreviousBuild, RecalcFlags, SceneData, Scheduler, ViewLayer,
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

fn scene_with(main: &mut Main, bases: Vec<Base>) -> IdRef {
    main.add(DataBlock::scene(
        "Scene",
        SceneData {
            view_layers: vec![ViewLayer::new("View Layer", bases)],
            ..Default::default()
        },
    ))
}

fn build(main: &Main, scene: IdRef) -> Depsgraph {
    build_from_view_layer(
        main,
        scene,
        "View Layer",
        &DepsgraphConfig::default().active(true),
        &PreviousBuild::empty(),
    )
    .unwrap()
}

fn op(graph: &Depsgraph, id: IdRef, node_type: NodeType, opcode: OperationCode) -> OperationId {
    graph
        .find_operation_node(id, &ComponentKey::new(node_type), &OperationKey::new(opcode))
        .unwrap()
}

fn component_visible(graph: &Depsgraph, id: IdRef, node_type: NodeType) -> bool {
    let comp = graph
        .find_component_node(id, &ComponentKey::new(node_type))
        .unwrap();
    graph.component(comp).affects_directly_visible()
}

/// Three objects driving each other in a loop.
fn driver_loop(main: &mut Main) -> (IdRef, [IdRef; 3]) {
    let a = main.add(DataBlock::object("A", ObjectData::default()));
    let b = main.add(DataBlock::object("B", ObjectData::default()));
    let c = main.add(DataBlock::object("C", ObjectData::default()));
    let drive = |target: IdRef| {
        Driver::new("location_x", target, DriverSource::WorldLocation { axis: 0 })
    };
    for (driven, target) in [(a, c), (b, a), (c, b)] {
        let block = main.get_mut(driven).unwrap();
        *block = block.clone().with_driver(drive(target));
    }
    let scene = scene_with(main, vec![Base::visible(a), Base::visible(b), Base::visible(c)]);
    (scene, [a, b, c])
}

#[test]
fn pending_counts_ignore_cyclic_relations() {
    init_tracing();
    let mut main = Main::new();
    let (scene, _) = driver_loop(&mut main);
    let graph = build(&main, scene);

    assert!(graph.stats().cyclic_relations >= 1);
    for (_, node) in graph.operations() {
        let counted = node
            .inlinks()
            .iter()
            .filter_map(|rel| graph.relation(*rel))
            .filter(|rel| !rel.flags.contains(RelationFlags::CYCLIC))
            .filter(|rel| rel.from.as_operation().is_some())
            .count() as u32;
        assert_eq!(node.num_links_pending(), counted);
    }
}

#[test]
fn three_object_cycle_builds_and_evaluates() {
    init_tracing();
    let mut main = Main::new();
    let (scene, objects) = driver_loop(&mut main);
    let mut graph = build(&main, scene);
    assert!(graph.is_finalized());

    let scheduler = Scheduler::new(&DepsgraphConfig::default().with_threads(3)).unwrap();
    let report = evaluate_on_refresh(&mut main, &mut graph, &scheduler);
    for object in objects {
        let local = op(&graph, object, NodeType::Transform, OperationCode::TransformLocal);
        assert!(report.position(local).is_some());
    }
    assert!(!graph.needs_eval());
}

#[test]
fn visibility_flush_is_stable_on_rebuild() {
    let mut main = Main::new();
    let (scene, objects) = driver_loop(&mut main);
    let first = build(&main, scene);
    let second = build(&main, scene);
    for object in objects {
        for node_type in [NodeType::Transform, NodeType::Parameters, NodeType::Visibility] {
            assert_eq!(
                component_visible(&first, object, node_type),
                component_visible(&second, object, node_type)
            );
        }
    }
}

#[test]
fn empty_flags_tag_every_component() {
    let mut main = Main::new();
    let cube = main.add(DataBlock::object("Cube", ObjectData::default()));
    let scene = scene_with(&mut main, vec![Base::visible(cube)]);
    let mut graph = build(&main, scene);
    graph.clear_all_tags();

    tag_update_ex(&mut main, &mut graph, cube, RecalcFlags::empty());
    let node = graph.find_id_node(cube).unwrap();
    for comp in node.components() {
        for op in graph.component(comp).operations() {
            assert!(graph.operation(*op).needs_update(), "{}", graph.operation(*op).name());
        }
    }
}

#[test]
fn data_and_copy_on_write_reach_object_data() {
    let mut main = Main::new();
    let mesh = main.add(DataBlock::new("Mesh", IdType::Mesh).with_property("vertices", 4.0));
    let cube = main.add(DataBlock::object(
        "Cube",
        ObjectData {
            object_type: ObjectType::Mesh,
            data: Some(mesh),
            ..Default::default()
        },
    ));
    let scene = scene_with(&mut main, vec![Base::visible(cube)]);
    let mut graph = build(&main, scene);
    let scheduler = Scheduler::new(&DepsgraphConfig::default().with_threads(2)).unwrap();
    evaluate_on_refresh(&mut main, &mut graph, &scheduler);

    main.get_mut(mesh).unwrap().properties.insert("vertices".into(), 6.0);
    tag_update_ex(
        &mut main,
        &mut graph,
        cube,
        RecalcFlags::OB_RECALC_DATA | RecalcFlags::DEG_TAG_COPY_ON_WRITE,
    );
    assert!(graph
        .operation(op(&graph, mesh, NodeType::CopyOnWrite, OperationCode::CopyOnWrite))
        .needs_update());

    let report = evaluate_on_refresh(&mut main, &mut graph, &scheduler);
    assert!(report.updated_ids.contains(&mesh));
    let evaluated = graph.get_evaluated_id(cube).unwrap();
    assert_eq!(evaluated.runtime.geometry.get("vertices"), Some(&6.0));
    assert_eq!(
        main.get(cube).unwrap().runtime.geometry.get("vertices"),
        Some(&6.0)
    );
}

#[test]
fn particle_recalc_is_mirrored_on_the_original() {
    let mut main = Main::new();
    let settings =
        main.add(DataBlock::new("Hair", IdType::ParticleSettings).with_property("count", 100.0));
    let emitter = main.add(DataBlock::object(
        "Emitter",
        ObjectData {
            particle_systems: vec![settings],
            ..Default::default()
        },
    ));
    let scene = scene_with(&mut main, vec![Base::visible(emitter)]);
    let mut graph = build(&main, scene);
    graph.clear_all_tags();

    tag_update_ex(&mut main, &mut graph, settings, RecalcFlags::PSYS_RECALC_REDO);
    assert!(main
        .get(settings)
        .unwrap()
        .recalc
        .contains(RecalcFlags::PSYS_RECALC_REDO));

    // User edits of the settings reach the particle system.
    let modified = flush_updates(&mut graph);
    assert!(modified.contains(&emitter));
}

#[test]
fn visibility_reaches_hidden_inputs_and_synchronization() {
    let mut main = Main::new();
    let hidden_parent = main.add(DataBlock::object("Parent", ObjectData::default()));
    let child = main.add(DataBlock::object(
        "Child",
        ObjectData {
            parent: Some(hidden_parent),
            ..Default::default()
        },
    ));
    let hidden = main.add(DataBlock::object("Hidden", ObjectData::default()));
    let scene = scene_with(
        &mut main,
        vec![
            Base::hidden(hidden_parent),
            Base::visible(child),
            Base::hidden(hidden),
        ],
    );
    let graph = build(&main, scene);

    let parent_node = graph.find_id_node(hidden_parent).unwrap();
    assert!(!parent_node.is_directly_visible());
    assert!(component_visible(&graph, hidden_parent, NodeType::Transform));
    // Synchronization is always visible and pulls in what feeds it.
    assert!(component_visible(&graph, hidden, NodeType::Synchronization));
    assert!(component_visible(&graph, hidden, NodeType::Transform));
}

#[test]
fn edited_location_reaches_the_evaluated_copy() {
    init_tracing();
    let mut main = Main::new();
    let cube = main.add(DataBlock::object("Cube", ObjectData::default()));
    let scene = scene_with(&mut main, vec![Base::visible(cube)]);
    let mut graph = build(&main, scene);
    let scheduler = Scheduler::new(&DepsgraphConfig::default().with_threads(2)).unwrap();
    evaluate_on_refresh(&mut main, &mut graph, &scheduler);
    assert_eq!(graph.get_evaluated_id(cube).unwrap().runtime.world_location[0], 0.0);

    main.get_mut(cube).unwrap().properties.insert("location_x".into(), 5.0);
    tag_update_ex(&mut main, &mut graph, cube, RecalcFlags::OB_RECALC_OB);
    let report = evaluate_on_refresh(&mut main, &mut graph, &scheduler);

    assert!(report.updated_ids.contains(&cube));
    let evaluated = graph.get_evaluated_id(cube).unwrap();
    assert_eq!(evaluated.runtime.world_location[0], 5.0);
    assert_eq!(main.get(cube).unwrap().runtime.world_location[0], 5.0);
}

#[test]
fn tagged_edit_survives_a_registry_rebuild() {
    let mut main = Main::new();
    let cube = main.add(DataBlock::object("Cube", ObjectData::default()));
    let scene = scene_with(&mut main, vec![Base::visible(cube)]);
    let mut registry = DepsgraphRegistry::default();
    let handle = registry.ensure(&main, scene, "View Layer").unwrap();
    let scheduler = Scheduler::new(&DepsgraphConfig::default().with_threads(2)).unwrap();
    registry.evaluate_all(&mut main, &scheduler);
    assert!(!handle.read().needs_eval());

    main.get_mut(cube).unwrap().properties.insert("location_x".into(), 5.0);
    registry.tag_update(&mut main, cube, RecalcFlags::OB_RECALC_OB);
    registry.rebuild_all(&main).unwrap();
    assert!(handle.read().needs_eval());

    registry.evaluate_all(&mut main, &scheduler);
    let evaluated = handle.read().get_evaluated_id(cube).unwrap();
    assert_eq!(evaluated.runtime.world_location[0], 5.0);
    assert!(main.get(cube).unwrap().recalc.is_empty());
}

#[test]
fn parent_is_evaluated_before_child() {
    init_tracing();
    let mut main = Main::new();
    let parent = main.add(
        DataBlock::object("Obj1", ObjectData::default()).with_location([1.0, 0.0, 0.0]),
    );
    let child = main.add(
        DataBlock::object(
            "Obj2",
            ObjectData {
                parent: Some(parent),
                ..Default::default()
            },
        )
        .with_location([0.0, 1.0, 0.0]),
    );
    let scene = scene_with(&mut main, vec![Base::visible(child), Base::visible(parent)]);
    let mut graph = build(&main, scene);
    let scheduler = Scheduler::new(&DepsgraphConfig::default().with_threads(4)).unwrap();

    let report = evaluate_on_refresh(&mut main, &mut graph, &scheduler);
    let parent_final = op(&graph, parent, NodeType::Transform, OperationCode::TransformFinal);
    let child_parent = op(&graph, child, NodeType::Transform, OperationCode::TransformParent);
    let before = report.position(parent_final).unwrap();
    let after = report.position(child_parent).unwrap();
    assert!(before < after);

    let child_eval = graph.get_evaluated_id(child).unwrap();
    assert_eq!(child_eval.runtime.world_location, [1.0, 1.0, 0.0]);
}
