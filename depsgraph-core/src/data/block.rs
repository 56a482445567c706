//! Data-blocks
//!
//! A `DataBlock` is one named, typed unit of scene data. The same struct is
//! used for the authored original (owned by [`Main`](super::Main)) and for
//! its evaluated copy-on-write snapshot (owned by the graph). Fields under
//! `runtime` are only written on snapshots.
//!
//! Properties are a flat ordered map of named scalars. Animation f-curves
//! and drivers address properties by name, and the built-in operations read
//! and write the same names (`location_x`, `hide_viewport`, ...).

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use super::id::{IdRef, IdType, ObjectType};
use super::recalc::RecalcFlags;

/// Property names read by the built-in transform operation.
pub const LOCATION_PROPERTIES: [&str; 3] = ["location_x", "location_y", "location_z"];

/// Property read by the built-in visibility operation.
pub const HIDE_VIEWPORT_PROPERTY: &str = "hide_viewport";

bit_flags! {
    /// Per-base state flushed onto evaluated objects during iteration.
    pub struct BaseFlags: u32 {
        const VISIBLE_VIEWPORT = 1 << 0;
        const VISIBLE_RENDER = 1 << 1;
        const SELECTED = 1 << 2;
        const SELECTABLE = 1 << 3;
        /// Set on instances produced by a dupli provider.
        const FROM_DUPLI = 1 << 4;
    }
}

/// A single animation key.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Keyframe {
    pub frame: f32,
    pub value: f64,
}

/// Animation curve driving one property.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FCurve {
    pub property: String,
    pub keyframes: Vec<Keyframe>,
}

impl FCurve {
    pub fn new(property: impl Into<String>, keyframes: Vec<Keyframe>) -> Self {
        Self {
            property: property.into(),
            keyframes,
        }
    }

    /// Linear interpolation between keys, constant extrapolation outside.
    /// Keys are expected sorted by frame.
    pub fn evaluate(&self, frame: f32) -> Option<f64> {
        let first = self.keyframes.first()?;
        let last = self.keyframes.last()?;
        if frame <= first.frame {
            return Some(first.value);
        }
        if frame >= last.frame {
            return Some(last.value);
        }
        self.keyframes.windows(2).find_map(|pair| {
            let (a, b) = (pair[0], pair[1]);
            if frame < a.frame || frame > b.frame {
                return None;
            }
            let span = b.frame - a.frame;
            if span <= f32::EPSILON {
                return Some(b.value);
            }
            let t = f64::from((frame - a.frame) / span);
            Some(a.value + (b.value - a.value) * t)
        })
    }
}

/// Animation data attached to a data-block.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Animation {
    pub fcurves: Vec<FCurve>,
}

/// Where a driver reads its input from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DriverSource {
    /// A named property of the target's evaluated copy.
    Property(String),
    /// One axis of the target object's evaluated world location.
    WorldLocation { axis: usize },
}

/// `property = source(target) * scale + offset`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Driver {
    pub property: String,
    pub target: IdRef,
    pub source: DriverSource,
    pub scale: f64,
    pub offset: f64,
}

impl Driver {
    pub fn new(property: impl Into<String>, target: IdRef, source: DriverSource) -> Self {
        Self {
            property: property.into(),
            target,
            source,
            scale: 1.0,
            offset: 0.0,
        }
    }

    pub fn with_scale(mut self, scale: f64) -> Self {
        self.scale = scale;
        self
    }

    pub fn with_offset(mut self, offset: f64) -> Self {
        self.offset = offset;
        self
    }
}

/// An object placed in a view layer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Base {
    pub object: IdRef,
    pub flags: BaseFlags,
}

impl Base {
    /// A base visible in viewport and render, selectable.
    pub fn visible(object: IdRef) -> Self {
        Self {
            object,
            flags: BaseFlags::VISIBLE_VIEWPORT | BaseFlags::VISIBLE_RENDER | BaseFlags::SELECTABLE,
        }
    }

    pub fn hidden(object: IdRef) -> Self {
        Self {
            object,
            flags: BaseFlags::SELECTABLE,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewLayer {
    pub name: String,
    pub bases: Vec<Base>,
}

impl ViewLayer {
    pub fn new(name: impl Into<String>, bases: Vec<Base>) -> Self {
        Self {
            name: name.into(),
            bases,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ObjectData {
    pub object_type: ObjectType,
    /// Object data (mesh, curve, armature, ...).
    pub data: Option<IdRef>,
    pub parent: Option<IdRef>,
    pub materials: Vec<IdRef>,
    /// Particle settings, one particle system each.
    pub particle_systems: Vec<IdRef>,
    /// Curve the object follows; the curve must then provide its path.
    pub follow_path: Option<IdRef>,
    /// Custom-data layers the object's modifiers need from its data.
    pub customdata_mask: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SceneData {
    pub view_layers: Vec<ViewLayer>,
    pub world: Option<IdRef>,
    pub camera: Option<IdRef>,
    /// Compositor node-tree.
    pub node_tree: Option<IdRef>,
    pub frame: f32,
}

impl SceneData {
    pub fn view_layer(&self, name: &str) -> Option<&ViewLayer> {
        self.view_layers.iter().find(|layer| layer.name == name)
    }
}

/// Materials, textures, lights and worlds.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ShadingData {
    pub node_tree: Option<IdRef>,
}

/// Type-specific content of a data-block.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub enum Payload {
    #[default]
    None,
    Object(ObjectData),
    Scene(SceneData),
    Shading(ShadingData),
}

/// Results produced by evaluation. Only meaningful on snapshots.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvaluatedState {
    pub world_location: [f64; 3],
    pub geometry: IndexMap<String, f64>,
    pub base_flags: BaseFlags,
    pub hidden: bool,
    /// Index in the dupli list when this copy is an instance.
    pub dupli_index: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataBlock {
    pub name: String,
    pub id_type: IdType,
    /// Legacy recalc flags. Set by the tag API on originals, read back when
    /// a graph is rebuilt so pending edits survive the rebuild.
    #[serde(default)]
    pub recalc: RecalcFlags,
    #[serde(default)]
    pub properties: IndexMap<String, f64>,
    #[serde(default)]
    pub animation: Option<Animation>,
    #[serde(default)]
    pub drivers: Vec<Driver>,
    #[serde(default)]
    pub payload: Payload,
    #[serde(default)]
    pub runtime: EvaluatedState,
}

impl DataBlock {
    pub fn new(name: impl Into<String>, id_type: IdType) -> Self {
        Self {
            name: name.into(),
            id_type,
            recalc: RecalcFlags::empty(),
            properties: IndexMap::new(),
            animation: None,
            drivers: Vec::new(),
            payload: Payload::None,
            runtime: EvaluatedState::default(),
        }
    }

    pub fn object(name: impl Into<String>, data: ObjectData) -> Self {
        let mut block = Self::new(name, IdType::Object);
        block.payload = Payload::Object(data);
        block
    }

    pub fn scene(name: impl Into<String>, data: SceneData) -> Self {
        let mut block = Self::new(name, IdType::Scene);
        block.payload = Payload::Scene(data);
        block
    }

    /// Material, texture, light or world with an optional node-tree.
    pub fn shading(name: impl Into<String>, id_type: IdType, node_tree: Option<IdRef>) -> Self {
        let mut block = Self::new(name, id_type);
        block.payload = Payload::Shading(ShadingData { node_tree });
        block
    }

    pub fn with_property(mut self, name: impl Into<String>, value: f64) -> Self {
        self.properties.insert(name.into(), value);
        self
    }

    pub fn with_location(mut self, location: [f64; 3]) -> Self {
        for (name, value) in LOCATION_PROPERTIES.iter().zip(location) {
            self.properties.insert((*name).to_string(), value);
        }
        self
    }

    pub fn with_fcurve(mut self, fcurve: FCurve) -> Self {
        self.animation
            .get_or_insert_with(Animation::default)
            .fcurves
            .push(fcurve);
        self
    }

    pub fn with_driver(mut self, driver: Driver) -> Self {
        self.drivers.push(driver);
        self
    }

    pub fn property(&self, name: &str) -> Option<f64> {
        self.properties.get(name).copied()
    }

    /// Authored local location, zero for missing components.
    pub fn location(&self) -> [f64; 3] {
        let mut location = [0.0; 3];
        for (slot, name) in location.iter_mut().zip(LOCATION_PROPERTIES) {
            *slot = self.property(name).unwrap_or(0.0);
        }
        location
    }

    pub fn is_animated(&self) -> bool {
        self.animation
            .as_ref()
            .is_some_and(|anim| !anim.fcurves.is_empty())
    }

    pub fn as_object(&self) -> Option<&ObjectData> {
        match &self.payload {
            Payload::Object(data) => Some(data),
            _ => None,
        }
    }

    pub fn as_scene(&self) -> Option<&SceneData> {
        match &self.payload {
            Payload::Scene(data) => Some(data),
            _ => None,
        }
    }

    /// Embedded node-tree of shading data-blocks and scenes.
    pub fn node_tree(&self) -> Option<IdRef> {
        match &self.payload {
            Payload::Shading(data) => data.node_tree,
            Payload::Scene(data) => data.node_tree,
            _ => None,
        }
    }

    /// Every data-block this one points at. Order is not significant.
    pub fn referenced_ids(&self) -> Vec<IdRef> {
        let mut ids: Vec<IdRef> = self.drivers.iter().map(|driver| driver.target).collect();
        match &self.payload {
            Payload::None => {}
            Payload::Object(data) => {
                ids.extend(data.data);
                ids.extend(data.parent);
                ids.extend(data.follow_path);
                ids.extend(data.materials.iter().copied());
                ids.extend(data.particle_systems.iter().copied());
            }
            Payload::Scene(data) => {
                for layer in &data.view_layers {
                    ids.extend(layer.bases.iter().map(|base| base.object));
                }
                ids.extend(data.world);
                ids.extend(data.camera);
                ids.extend(data.node_tree);
            }
            Payload::Shading(data) => ids.extend(data.node_tree),
        }
        ids
    }
}
