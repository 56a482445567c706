//! Data-block identity.
//!
//! An `IdRef` is the only way graph nodes refer to scene data. It is a plain
//! index into the [`Main`](super::Main) arena and never keeps a data-block
//! alive: once a block is removed its slot stays empty, so a stale `IdRef`
//! resolves to `None` instead of aliasing a different block.

use serde::{Deserialize, Serialize};

/// Stable, non-owning reference to a data-block in the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdRef(u32);

impl IdRef {
    pub(crate) fn new(index: usize) -> Self {
        Self(index as u32)
    }

    /// Position of the block in the arena.
    pub fn index(self) -> usize {
        self.0 as usize
    }

    /// Get the raw ID value.
    pub fn raw(self) -> u32 {
        self.0
    }
}

impl From<u32> for IdRef {
    fn from(raw: u32) -> Self {
        Self(raw)
    }
}

/// Data-block category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum IdType {
    Object,
    Mesh,
    Curve,
    Surface,
    Font,
    MetaBall,
    Lattice,
    Armature,
    Camera,
    Light,
    Material,
    Texture,
    World,
    NodeTree,
    Scene,
    ParticleSettings,
}

impl IdType {
    /// Every category, in index order.
    pub const ALL: [IdType; 16] = [
        IdType::Object,
        IdType::Mesh,
        IdType::Curve,
        IdType::Surface,
        IdType::Font,
        IdType::MetaBall,
        IdType::Lattice,
        IdType::Armature,
        IdType::Camera,
        IdType::Light,
        IdType::Material,
        IdType::Texture,
        IdType::World,
        IdType::NodeTree,
        IdType::Scene,
        IdType::ParticleSettings,
    ];

    /// Dense index, used for per-category tag bits.
    pub fn index(self) -> usize {
        self as usize
    }

    /// Two-letter code used in node names and debug output.
    pub fn code(self) -> &'static str {
        match self {
            IdType::Object => "OB",
            IdType::Mesh => "ME",
            IdType::Curve => "CU",
            IdType::Surface => "SF",
            IdType::Font => "VF",
            IdType::MetaBall => "MB",
            IdType::Lattice => "LT",
            IdType::Armature => "AR",
            IdType::Camera => "CA",
            IdType::Light => "LA",
            IdType::Material => "MA",
            IdType::Texture => "TE",
            IdType::World => "WO",
            IdType::NodeTree => "NT",
            IdType::Scene => "SC",
            IdType::ParticleSettings => "PA",
        }
    }

    /// Data-blocks whose OB_RECALC_DATA tag means "geometry changed".
    pub fn is_geometry(self) -> bool {
        matches!(
            self,
            IdType::Mesh
                | IdType::Curve
                | IdType::Surface
                | IdType::Font
                | IdType::MetaBall
                | IdType::Lattice
        )
    }
}

/// What kind of data an object instantiates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ObjectType {
    #[default]
    Empty,
    Mesh,
    Curve,
    Surface,
    Font,
    MetaBall,
    Lattice,
    Armature,
    Camera,
    Light,
}

impl ObjectType {
    /// Objects of these types own a GEOMETRY component.
    pub fn has_geometry(self) -> bool {
        matches!(
            self,
            ObjectType::Mesh
                | ObjectType::Curve
                | ObjectType::Surface
                | ObjectType::Font
                | ObjectType::MetaBall
                | ObjectType::Lattice
        )
    }
}
