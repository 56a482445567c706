//! Dependency Graph
//!
//! This module holds the node model and the container that owns it.
//!
//! # Overview
//!
//! The graph has three levels of nesting:
//!
//! - an `IdNode` per evaluated data-block,
//! - `ComponentNode`s inside each ID node, one per aspect (transform,
//!   geometry, ...),
//! - `OperationNode`s inside each component, the units the scheduler runs.
//!
//! `Relation`s connect nodes of any level, although after building nearly
//! all of them connect operations. A relation `a → b` means `a` runs first
//! and a change of `a` invalidates `b`.
//!
//! Relations flagged `CYCLIC` close a dependency cycle. They are kept for
//! flushing but ignored by every in-degree computation, which is what keeps
//! scheduling finite on cyclic scenes.

mod callable;
mod component;
mod depsgraph;
mod handle;
mod id_node;
mod node;
mod operation;
mod relation;
mod time_source;

pub use callable::{Callable, EvalCallback};
pub use component::{ComponentKey, ComponentNode};
pub use depsgraph::{get_eval_flags_for_id, Depsgraph};
pub use handle::DepsgraphHandle;
pub use id_node::{CowSlot, IdNode, EVAL_NEED_CURVE_PATH};
pub use node::{
    ComponentId, DepsNode, EvalStats, IdNodeId, NodeBase, NodeClass, NodeRef, NodeType,
    OperationId, RelationId,
};
pub use operation::{OperationCode, OperationFlags, OperationKey, OperationNode, UpdateSource};
pub use relation::{Relation, RelationFlags};
pub use time_source::TimeSourceNode;
