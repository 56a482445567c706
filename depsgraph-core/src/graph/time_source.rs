//! The graph's clock.

use super::node::{DepsNode, NodeBase, NodeType};

/// Singleton per graph. Time-dependent components hang off its outlinks.
#[derive(Debug, Clone)]
pub struct TimeSourceNode {
    pub(crate) base: NodeBase,
    /// Current frame.
    pub(crate) cfra: f32,
}

impl TimeSourceNode {
    pub(crate) fn new() -> Self {
        Self {
            base: NodeBase::new("Time Source"),
            cfra: 0.0,
        }
    }

    pub fn cfra(&self) -> f32 {
        self.cfra
    }
}

impl DepsNode for TimeSourceNode {
    fn base(&self) -> &NodeBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut NodeBase {
        &mut self.base
    }

    fn node_type(&self) -> NodeType {
        NodeType::TimeSource
    }
}
