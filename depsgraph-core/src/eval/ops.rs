//! Built-in operation callbacks.
//!
//! Each function returns the callback the node builder attaches to one
//! operation. Callbacks capture only `IdRef`s (and small owned values such
//! as a driver definition) and reach all data through the [`EvalContext`].

use crate::data::{Driver, DriverSource, IdRef, HIDE_VIEWPORT_PROPERTY};
use crate::graph::EvalCallback;

use super::context::{EvalContext, SyncRecord};

/// Copy the original into the evaluated snapshot.
pub fn copy_on_write(id: IdRef) -> EvalCallback {
    EvalCallback::new(move |ctx| {
        if !ctx.copy_from_original(id) {
            tracing::debug!(?id, "copy-on-write source is gone");
        }
    })
}

/// Write f-curve values at the current frame into the snapshot.
pub fn animation(id: IdRef) -> EvalCallback {
    EvalCallback::new(move |ctx| {
        let frame = ctx.ctime();
        ctx.write_evaluated(id, |block| {
            let Some(anim) = block.animation.as_ref() else {
                return;
            };
            let values: Vec<(String, f64)> = anim
                .fcurves
                .iter()
                .filter_map(|fcurve| Some((fcurve.property.clone(), fcurve.evaluate(frame)?)))
                .collect();
            block.properties.extend(values);
        });
    })
}

/// Evaluate one driver of `id`.
pub fn driver(id: IdRef, driver: Driver) -> EvalCallback {
    EvalCallback::new(move |ctx| {
        let input = match &driver.source {
            DriverSource::Property(name) => ctx
                .read_evaluated(driver.target, |block| block.property(name))
                .flatten(),
            DriverSource::WorldLocation { axis } => ctx
                .read_evaluated(driver.target, |block| {
                    block.runtime.world_location.get(*axis).copied()
                })
                .flatten(),
        };
        let Some(input) = input else {
            tracing::debug!(?id, property = %driver.property, "driver has no input");
            return;
        };
        let value = input * driver.scale + driver.offset;
        ctx.write_evaluated(id, |block| {
            block.properties.insert(driver.property.clone(), value);
        });
    })
}

/// Properties are final once animation and drivers have run.
pub fn parameters_eval(id: IdRef) -> EvalCallback {
    EvalCallback::new(move |_ctx| tracing::trace!(?id, "parameters evaluated"))
}

pub fn transform_local(id: IdRef) -> EvalCallback {
    EvalCallback::new(move |ctx| {
        ctx.write_evaluated(id, |block| {
            block.runtime.world_location = block.location();
        });
    })
}

/// Offset the local transform by the parent's evaluated world location.
pub fn transform_parent(id: IdRef, parent: IdRef) -> EvalCallback {
    EvalCallback::new(move |ctx| {
        let Some(offset) = ctx.read_evaluated(parent, |block| block.runtime.world_location) else {
            return;
        };
        ctx.write_evaluated(id, |block| {
            for (axis, value) in block.runtime.world_location.iter_mut().enumerate() {
                *value += offset[axis];
            }
        });
    })
}

pub fn visibility(id: IdRef) -> EvalCallback {
    EvalCallback::new(move |ctx| {
        ctx.write_evaluated(id, |block| {
            block.runtime.hidden = block
                .property(HIDE_VIEWPORT_PROPERTY)
                .is_some_and(|value| value != 0.0);
        });
    })
}

/// Evaluate geometry of an object-data block from its properties.
pub fn data_geometry(id: IdRef) -> EvalCallback {
    EvalCallback::new(move |ctx| {
        ctx.write_evaluated(id, |block| {
            block.runtime.geometry = block.properties.clone();
        });
    })
}

/// Object geometry: the evaluated geometry of its data.
pub fn object_geometry(id: IdRef, data: Option<IdRef>) -> EvalCallback {
    EvalCallback::new(move |ctx| {
        let geometry = data
            .and_then(|data| ctx.read_evaluated(data, |block| block.runtime.geometry.clone()))
            .unwrap_or_default();
        ctx.write_evaluated(id, |block| block.runtime.geometry = geometry);
    })
}

/// Publish a particle count from the evaluated settings onto the object.
pub fn particle_system(id: IdRef, settings: IdRef, name: String) -> EvalCallback {
    EvalCallback::new(move |ctx| {
        let count = ctx
            .read_evaluated(settings, |block| block.property("count"))
            .flatten()
            .unwrap_or(0.0);
        ctx.write_evaluated(id, |block| {
            block.runtime.geometry.insert(format!("particles:{name}"), count);
        });
    })
}

/// Operations whose results live outside the evaluated copy (pose solving,
/// shading) only report that they ran.
pub fn trace(id: IdRef, what: &'static str) -> EvalCallback {
    EvalCallback::new(move |_ctx| tracing::trace!(?id, what, "evaluated"))
}

/// Queue write-back of evaluated results to the original.
pub fn synchronize_to_original(id: IdRef) -> EvalCallback {
    EvalCallback::new(move |ctx| sync(ctx, id))
}

fn sync(ctx: &EvalContext<'_>, id: IdRef) {
    let record = ctx.read_evaluated(id, |block| SyncRecord {
        id,
        world_location: block.runtime.world_location,
        geometry: block.runtime.geometry.clone(),
    });
    if let Some(record) = record {
        ctx.queue_sync(record);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{DataBlock, FCurve, IdType, Keyframe, Main};
    use crate::graph::Depsgraph;

    fn setup(blocks: Vec<DataBlock>) -> (Main, Depsgraph, Vec<IdRef>) {
        let mut main = Main::new();
        let mut graph = Depsgraph::default();
        let ids: Vec<IdRef> = blocks
            .into_iter()
            .map(|block| {
                let id_type = block.id_type;
                let name = block.name.clone();
                let id = main.add(block);
                graph.add_id_node(id, id_type, &name);
                id
            })
            .collect();
        for id in &ids {
            let original = main.get(*id).cloned();
            if let (Some(node), Some(original)) = (graph.find_id_node(*id), original) {
                node.cow().expand(&original);
            }
        }
        (main, graph, ids)
    }

    #[test]
    fn animation_writes_fcurve_values() {
        let block = DataBlock::new("Cube", IdType::Object).with_fcurve(FCurve::new(
            "location_x",
            vec![
                Keyframe { frame: 0.0, value: 0.0 },
                Keyframe { frame: 10.0, value: 20.0 },
            ],
        ));
        let (main, graph, ids) = setup(vec![block]);
        let ctx = EvalContext::new(&graph, &main, 5.0);
        animation(ids[0]).invoke(&ctx);
        assert_eq!(
            ctx.read_evaluated(ids[0], |b| b.property("location_x")),
            Some(Some(10.0))
        );
    }

    #[test]
    fn driver_scales_target_property() {
        let target = DataBlock::new("Target", IdType::Object).with_property("size", 3.0);
        let driven = DataBlock::new("Driven", IdType::Object);
        let (main, graph, ids) = setup(vec![target, driven]);
        let ctx = EvalContext::new(&graph, &main, 1.0);

        let def = Driver::new("scale", ids[0], DriverSource::Property("size".into()))
            .with_scale(2.0)
            .with_offset(1.0);
        driver(ids[1], def).invoke(&ctx);
        assert_eq!(ctx.read_evaluated(ids[1], |b| b.property("scale")), Some(Some(7.0)));
    }

    #[test]
    fn parent_transform_adds_parent_location() {
        let parent = DataBlock::new("Parent", IdType::Object).with_location([1.0, 1.0, 0.0]);
        let child = DataBlock::new("Child", IdType::Object).with_location([0.0, 2.0, 3.0]);
        let (main, graph, ids) = setup(vec![parent, child]);
        let ctx = EvalContext::new(&graph, &main, 1.0);

        transform_local(ids[0]).invoke(&ctx);
        transform_local(ids[1]).invoke(&ctx);
        transform_parent(ids[1], ids[0]).invoke(&ctx);
        assert_eq!(
            ctx.read_evaluated(ids[1], |b| b.runtime.world_location),
            Some([1.0, 3.0, 3.0])
        );
    }

    #[test]
    fn object_geometry_copies_data_geometry() {
        let mesh = DataBlock::new("Mesh", IdType::Mesh).with_property("vertices", 8.0);
        let object = DataBlock::new("Cube", IdType::Object);
        let (main, graph, ids) = setup(vec![mesh, object]);
        let ctx = EvalContext::new(&graph, &main, 1.0);

        data_geometry(ids[0]).invoke(&ctx);
        object_geometry(ids[1], Some(ids[0])).invoke(&ctx);
        let geometry = ctx.read_evaluated(ids[1], |b| b.runtime.geometry.clone()).unwrap();
        assert_eq!(geometry.get("vertices"), Some(&8.0));
    }

    #[test]
    fn visibility_reads_hide_property() {
        let object = DataBlock::new("Cube", IdType::Object).with_property(HIDE_VIEWPORT_PROPERTY, 1.0);
        let (main, graph, ids) = setup(vec![object]);
        let ctx = EvalContext::new(&graph, &main, 1.0);
        visibility(ids[0]).invoke(&ctx);
        assert_eq!(ctx.read_evaluated(ids[0], |b| b.runtime.hidden), Some(true));
    }

    #[test]
    fn synchronize_queues_evaluated_state() {
        let object = DataBlock::new("Cube", IdType::Object).with_location([4.0, 0.0, 0.0]);
        let (main, graph, ids) = setup(vec![object]);
        let ctx = EvalContext::new(&graph, &main, 1.0);
        transform_local(ids[0]).invoke(&ctx);
        synchronize_to_original(ids[0]).invoke(&ctx);
        let queue = ctx.into_sync_queue();
        assert_eq!(queue.len(), 1);
        assert_eq!(queue[0].world_location, [4.0, 0.0, 0.0]);
    }
}
