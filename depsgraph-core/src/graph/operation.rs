//! Operation nodes: the atomic unit of scheduled work.

use serde::{Deserialize, Serialize};

use super::callable::EvalCallback;
use super::node::{ComponentId, DepsNode, NodeBase, NodeType};

/// What an operation does. Together with a name and a tag this identifies
/// the operation within its component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum OperationCode {
    /// Generic operation, identified by name only.
    Operation,

    ParametersEntry,
    ParametersEval,
    ParametersExit,
    Driver,

    Animation,

    TransformLocal,
    TransformParent,
    TransformFinal,

    Visibility,

    GeometryEval,
    GeometryEvalDone,

    PoseInit,
    PoseDone,

    ParticleSystemEval,
    ParticleSettingsEval,

    Shading,
    MaterialUpdate,
    LightUpdate,
    WorldUpdate,
    TextureUpdate,
    NodeTreeOutput,

    CopyOnWrite,
    SynchronizeToOriginal,
}

impl OperationCode {
    pub fn name(self) -> &'static str {
        match self {
            OperationCode::Operation => "OPERATION",
            OperationCode::ParametersEntry => "PARAMETERS_ENTRY",
            OperationCode::ParametersEval => "PARAMETERS_EVAL",
            OperationCode::ParametersExit => "PARAMETERS_EXIT",
            OperationCode::Driver => "DRIVER",
            OperationCode::Animation => "ANIMATION",
            OperationCode::TransformLocal => "TRANSFORM_LOCAL",
            OperationCode::TransformParent => "TRANSFORM_PARENT",
            OperationCode::TransformFinal => "TRANSFORM_FINAL",
            OperationCode::Visibility => "VISIBILITY",
            OperationCode::GeometryEval => "GEOMETRY_EVAL",
            OperationCode::GeometryEvalDone => "GEOMETRY_EVAL_DONE",
            OperationCode::PoseInit => "POSE_INIT",
            OperationCode::PoseDone => "POSE_DONE",
            OperationCode::ParticleSystemEval => "PARTICLE_SYSTEM_EVAL",
            OperationCode::ParticleSettingsEval => "PARTICLE_SETTINGS_EVAL",
            OperationCode::Shading => "SHADING",
            OperationCode::MaterialUpdate => "MATERIAL_UPDATE",
            OperationCode::LightUpdate => "LIGHT_UPDATE",
            OperationCode::WorldUpdate => "WORLD_UPDATE",
            OperationCode::TextureUpdate => "TEXTURE_UPDATE",
            OperationCode::NodeTreeOutput => "NTREE_OUTPUT",
            OperationCode::CopyOnWrite => "COPY_ON_WRITE",
            OperationCode::SynchronizeToOriginal => "SYNCHRONIZE_TO_ORIGINAL",
        }
    }
}

/// Identity of an operation inside its component.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OperationKey {
    pub opcode: OperationCode,
    pub name: String,
    pub name_tag: i32,
}

impl OperationKey {
    pub fn new(opcode: OperationCode) -> Self {
        Self {
            opcode,
            name: String::new(),
            name_tag: -1,
        }
    }

    pub fn named(opcode: OperationCode, name: impl Into<String>) -> Self {
        Self {
            opcode,
            name: name.into(),
            name_tag: -1,
        }
    }

    pub fn with_tag(mut self, name_tag: i32) -> Self {
        self.name_tag = name_tag;
        self
    }

    /// Debug name: opcode, then name and tag when present.
    pub fn display_name(&self) -> String {
        let mut out = self.opcode.name().to_string();
        if !self.name.is_empty() {
            out.push_str("(");
            out.push_str(&self.name);
            out.push_str(")");
        }
        if self.name_tag != -1 {
            out.push_str(&format!("[{}]", self.name_tag));
        }
        out
    }
}

bit_flags! {
    /// Update state of an operation.
    pub struct OperationFlags: u32 {
        /// Must be evaluated in the next run.
        const NEEDS_UPDATE = 1 << 0;
        /// Tagged because of a user edit (as opposed to time or relations).
        const USER_MODIFIED = 1 << 1;
    }
}

/// Why a node was tagged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UpdateSource {
    /// Frame change.
    Time,
    /// Edit made by the user (or an operator acting for them).
    UserEdit,
    /// Graph rebuild or relations update.
    Relations,
}

/// Atomic schedulable unit.
#[derive(Debug, Clone)]
pub struct OperationNode {
    pub(crate) base: NodeBase,

    /// Component that owns this operation. Never shared.
    pub(crate) owner: ComponentId,

    pub(crate) key: OperationKey,

    /// Work to perform. `None` makes this a no-op used only for ordering.
    pub(crate) evaluate: Option<EvalCallback>,

    pub(crate) flags: OperationFlags,

    /// Number of inbound non-cyclic operation relations still unsatisfied.
    pub(crate) num_links_pending: u32,

    /// Scratch bit for flush.
    pub(crate) scheduled: bool,
}

impl OperationNode {
    pub(crate) fn new(owner: ComponentId, key: OperationKey, evaluate: Option<EvalCallback>) -> Self {
        Self {
            base: NodeBase::new(key.display_name()),
            owner,
            key,
            evaluate,
            flags: OperationFlags::empty(),
            num_links_pending: 0,
            scheduled: false,
        }
    }

    pub fn owner(&self) -> ComponentId {
        self.owner
    }

    pub fn key(&self) -> &OperationKey {
        &self.key
    }

    pub fn opcode(&self) -> OperationCode {
        self.key.opcode
    }

    pub fn flags(&self) -> OperationFlags {
        self.flags
    }

    pub fn needs_update(&self) -> bool {
        self.flags.contains(OperationFlags::NEEDS_UPDATE)
    }

    pub fn num_links_pending(&self) -> u32 {
        self.num_links_pending
    }

    pub fn is_noop(&self) -> bool {
        self.evaluate.is_none()
    }

    pub fn evaluate(&self) -> Option<&EvalCallback> {
        self.evaluate.as_ref()
    }
}

impl DepsNode for OperationNode {
    fn base(&self) -> &NodeBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut NodeBase {
        &mut self.base
    }

    fn node_type(&self) -> NodeType {
        NodeType::Operation
    }
}
