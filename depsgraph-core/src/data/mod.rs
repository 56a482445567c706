//! Scene Data
//!
//! The scene-data provider the graph is built from. Everything here is
//! authored data: an arena of typed data-blocks (`Main`), the links between
//! them (object → data, object → parent, scene → bases, ...) and the legacy
//! recalc bits the tag API writes.
//!
//! The graph never owns data-blocks. It refers to them through `IdRef`
//! indices and keeps its own evaluated copies.

mod block;
mod id;
mod main;
mod recalc;

pub use block::{
    Animation, Base, BaseFlags, DataBlock, Driver, DriverSource, EvaluatedState, FCurve,
    Keyframe, ObjectData, Payload, SceneData, ShadingData, ViewLayer, HIDE_VIEWPORT_PROPERTY,
    LOCATION_PROPERTIES,
};
pub use id::{IdRef, IdType, ObjectType};
pub use main::Main;
pub use recalc::RecalcFlags;
