//! Depsgraph Core
//!
//! A dependency graph for scene evaluation. Given authored scene data (a
//! `Main` arena of data-blocks), it builds a graph of evaluation operations
//! for one view layer, keeps track of what changed, and evaluates exactly
//! what is needed, in dependency order, on a thread pool.
//!
//! # Architecture
//!
//! - `data`: the authored scene data the graph is built from.
//! - `graph`: the node model (ID → component → operation) and relations.
//! - `builder`: constructs and finalizes a graph for one view layer.
//! - `tag` / `flush`: mark changed operations and spread the marks.
//! - `eval`: the scheduler and the built-in operation callbacks.
//! - `iter`: iteration over evaluated objects.
//! - `registry`: one graph per (scene, view layer), with tag fan-out.
//!
//! # Example
//!
//! ```rust,ignore
//! use depsgraph_core::{
//!     Base, DataBlock, DepsgraphConfig, DepsgraphRegistry, Main, ObjectData, RecalcFlags,
//!     SceneData, Scheduler, ViewLayer,
//! };
//!
//! let mut main = Main::new();
//! let cube = main.add(DataBlock::object("Cube", ObjectData::default()));
//! let scene = main.add(DataBlock::scene("Scene", SceneData {
//!     view_layers: vec![ViewLayer::new("View Layer", vec![Base::visible(cube)])],
//!     ..Default::default()
//! }));
//!
//! let config = DepsgraphConfig::default().active(true);
//! let scheduler = Scheduler::new(&config)?;
//! let mut registry = DepsgraphRegistry::new(config);
//! registry.ensure(&main, scene, "View Layer")?;
//!
//! // Move the cube and bring every graph up to date.
//! main.get_mut(cube).unwrap().properties.insert("location_x".into(), 2.0);
//! registry.tag_update(&mut main, cube, RecalcFlags::OB_RECALC_OB);
//! registry.evaluate_all(&mut main, &scheduler);
//! ```

#[macro_use]
mod macros;

pub mod builder;
pub mod config;
pub mod data;
pub mod debug;
pub mod error;
pub mod eval;
pub mod flush;
pub mod graph;
pub mod iter;
pub mod registry;
pub mod tag;

pub use builder::{build_from_view_layer, PreviousBuild};
pub use config::{DepsgraphConfig, EvaluationMode};
pub use data::{
    Base, BaseFlags, DataBlock, Driver, DriverSource, FCurve, IdRef, IdType, Keyframe, Main,
    ObjectData, ObjectType, RecalcFlags, SceneData, ViewLayer,
};
pub use debug::{GraphStats, OperationTiming, ToDot};
pub use error::{DepsgraphError, Result};
pub use eval::{
    evaluate_on_framechange, evaluate_on_refresh, needs_eval, EvalContext, EvalReport, Scheduler,
};
pub use flush::flush_updates;
pub use graph::{get_eval_flags_for_id, Depsgraph, DepsgraphHandle, EVAL_NEED_CURVE_PATH};
pub use iter::{DupliInstance, DupliProvider, EvaluatedObject, IterFlags};
pub use registry::{tag_update, DepsgraphRegistry, UpdateListener};
pub use tag::{id_type_tag, ids_check_recalc, ids_clear_recalc, tag_update_ex};
