//! Graph Nodes
//!
//! This module defines what every node in the dependency graph has in
//! common, plus the typed indices used to address nodes in the graph's
//! arenas.
//!
//! # Node classes
//!
//! There are four kinds of node, from coarse to fine:
//!
//! - `TimeSource`: the graph's clock. Tagging it tags everything that is
//!   time dependent.
//! - `Id`: one per evaluated data-block.
//! - `Component`: a bucket of operations of one data-block (TRANSFORM,
//!   GEOMETRY, ...).
//! - `Operation`: the unit the scheduler runs.
//!
//! Each concrete node type implements [`DepsNode`]; code that must handle
//! "any node" (relations, tagging) uses the [`NodeRef`] enum.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

macro_rules! node_index {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(u32);

        impl $name {
            pub(crate) fn new(index: usize) -> Self {
                Self(index as u32)
            }

            /// Position in the owning arena.
            pub fn index(self) -> usize {
                self.0 as usize
            }
        }
    };
}

node_index! {
    /// Index of an [`IdNode`](super::IdNode) in the graph.
    IdNodeId
}

node_index! {
    /// Index of a [`ComponentNode`](super::ComponentNode) in the graph.
    ComponentId
}

node_index! {
    /// Index of an [`OperationNode`](super::OperationNode) in the graph.
    OperationId
}

node_index! {
    /// Index of a [`Relation`](super::Relation) in the graph.
    RelationId
}

/// Coarse classification of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeClass {
    TimeSource,
    Id,
    Component,
    Operation,
}

/// Structural type of a node. Component nodes use the component variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum NodeType {
    TimeSource,
    IdRef,
    Operation,

    /// ID properties and drivers.
    Parameters,
    /// Animation f-curves.
    Animation,
    /// Object transform.
    Transform,
    /// Evaluated geometry of objects and object data.
    Geometry,
    /// Armature pose.
    EvalPose,
    /// Materials and other shading inputs.
    Shading,
    /// Particle systems of an object.
    ParticleSystem,
    /// Object visibility. Affects every other component of its ID.
    Visibility,
    /// The copy-on-write snapshot itself.
    CopyOnWrite,
    /// Write-back of evaluated results to the original.
    Synchronization,
}

impl NodeType {
    /// Every component type, in evaluation-friendly order.
    pub const COMPONENTS: [NodeType; 10] = [
        NodeType::CopyOnWrite,
        NodeType::Animation,
        NodeType::Parameters,
        NodeType::Transform,
        NodeType::Visibility,
        NodeType::Geometry,
        NodeType::EvalPose,
        NodeType::ParticleSystem,
        NodeType::Shading,
        NodeType::Synchronization,
    ];

    pub fn class(self) -> NodeClass {
        match self {
            NodeType::TimeSource => NodeClass::TimeSource,
            NodeType::IdRef => NodeClass::Id,
            NodeType::Operation => NodeClass::Operation,
            _ => NodeClass::Component,
        }
    }

    pub fn is_component(self) -> bool {
        self.class() == NodeClass::Component
    }

    pub fn name(self) -> &'static str {
        match self {
            NodeType::TimeSource => "TIME_SOURCE",
            NodeType::IdRef => "ID_REF",
            NodeType::Operation => "OPERATION",
            NodeType::Parameters => "PARAMETERS",
            NodeType::Animation => "ANIMATION",
            NodeType::Transform => "TRANSFORM",
            NodeType::Geometry => "GEOMETRY",
            NodeType::EvalPose => "EVAL_POSE",
            NodeType::Shading => "SHADING",
            NodeType::ParticleSystem => "PARTICLE_SYSTEM",
            NodeType::Visibility => "VISIBILITY",
            NodeType::CopyOnWrite => "COPY_ON_WRITE",
            NodeType::Synchronization => "SYNCHRONIZATION",
        }
    }
}

/// Reference to any node of a graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeRef {
    TimeSource,
    Id(IdNodeId),
    Component(ComponentId),
    Operation(OperationId),
}

impl NodeRef {
    pub fn class(self) -> NodeClass {
        match self {
            NodeRef::TimeSource => NodeClass::TimeSource,
            NodeRef::Id(_) => NodeClass::Id,
            NodeRef::Component(_) => NodeClass::Component,
            NodeRef::Operation(_) => NodeClass::Operation,
        }
    }

    pub fn as_operation(self) -> Option<OperationId> {
        match self {
            NodeRef::Operation(id) => Some(id),
            _ => None,
        }
    }
}

impl From<OperationId> for NodeRef {
    fn from(id: OperationId) -> Self {
        NodeRef::Operation(id)
    }
}

impl From<ComponentId> for NodeRef {
    fn from(id: ComponentId) -> Self {
        NodeRef::Component(id)
    }
}

impl From<IdNodeId> for NodeRef {
    fn from(id: IdNodeId) -> Self {
        NodeRef::Id(id)
    }
}

/// Timing collected by the scheduler.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct EvalStats {
    /// Duration of the most recent evaluation.
    pub last: Duration,
    /// Accumulated duration over all evaluations.
    pub total: Duration,
    /// Number of evaluations.
    pub count: u32,
}

impl EvalStats {
    pub fn record(&mut self, elapsed: Duration) {
        self.last = elapsed;
        self.total += elapsed;
        self.count += 1;
    }

    pub fn average(&self) -> Duration {
        if self.count == 0 {
            Duration::ZERO
        } else {
            self.total / self.count
        }
    }
}

pub(crate) type LinkList = SmallVec<[RelationId; 4]>;

/// State shared by all node kinds.
#[derive(Debug, Clone, Default)]
pub struct NodeBase {
    /// Debug name.
    pub name: String,

    /// Relations ending at this node.
    pub(crate) inlinks: LinkList,

    /// Relations starting at this node.
    pub(crate) outlinks: LinkList,

    /// Scratch space for traversal algorithms. Meaning depends on the pass
    /// that last ran; every pass resets it before use.
    pub custom_flags: u32,

    pub stats: EvalStats,
}

impl NodeBase {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }
}

/// Behavior common to all graph nodes.
pub trait DepsNode {
    fn base(&self) -> &NodeBase;

    fn base_mut(&mut self) -> &mut NodeBase;

    fn node_type(&self) -> NodeType;

    fn node_class(&self) -> NodeClass {
        self.node_type().class()
    }

    fn name(&self) -> &str {
        &self.base().name
    }

    /// Human readable identifier for logs and graph dumps.
    fn identifier(&self) -> String {
        format!("{} : {}", self.node_type().name(), self.name())
    }

    fn inlinks(&self) -> &[RelationId] {
        &self.base().inlinks
    }

    fn outlinks(&self) -> &[RelationId] {
        &self.base().outlinks
    }
}
