//! Relations
//!
//! A relation is a directed edge `from → to`: "`from` must be evaluated
//! before `to`", and "a change of `from` invalidates `to`". Relations may
//! connect any two nodes, although after building nearly all of them run
//! between operations. The exceptions are time-source relations, which end
//! at whole components.

use serde::{Deserialize, Serialize};

use super::node::NodeRef;

bit_flags! {
    /// Per-relation behavior switches.
    pub struct RelationFlags: u32 {
        /// Part of a dependency cycle. Ignored by all in-degree arithmetic,
        /// which is what keeps scheduling finite on cyclic graphs.
        const CYCLIC = 1 << 0;
        /// Ordering only: dirty marks are never flushed across this edge.
        const NO_FLUSH = 1 << 1;
        /// Flush only when the source was modified by a user edit.
        const FLUSH_USER_EDIT_ONLY = 1 << 2;
    }
}

/// Directed dependency edge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relation {
    pub from: NodeRef,
    pub to: NodeRef,
    /// Why the relation exists. Debug only.
    pub name: String,
    pub flags: RelationFlags,
}

impl Relation {
    pub fn new(from: NodeRef, to: NodeRef, name: impl Into<String>) -> Self {
        Self {
            from,
            to,
            name: name.into(),
            flags: RelationFlags::empty(),
        }
    }

    pub fn is_cyclic(&self) -> bool {
        self.flags.contains(RelationFlags::CYCLIC)
    }

    /// Both ends are operations and the edge counts towards in-degrees.
    pub fn is_pending_link(&self) -> bool {
        !self.is_cyclic()
            && self.from.as_operation().is_some()
            && self.to.as_operation().is_some()
    }
}
