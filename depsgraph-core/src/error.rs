//! Error Types
//!
//! Most failure modes inside the graph are deliberately *not* errors: a tag
//! for an ID that is not in the graph is a no-op, a cycle is flagged and
//! neutralized, a stale copy-on-write snapshot is simply re-tagged. The
//! variants below cover the API surface where a caller asked for something
//! that cannot be produced at all.

use thiserror::Error;

use crate::data::IdRef;

/// Errors surfaced by the public API.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DepsgraphError {
    #[error("Data-block {0:?} does not exist")]
    UnknownDataBlock(IdRef),

    #[error("Data-block '{name}' ({id:?}) is not a scene")]
    NotAScene { id: IdRef, name: String },

    #[error("Scene '{scene}' has no view layer named '{view_layer}'")]
    UnknownViewLayer { scene: String, view_layer: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Failed to build evaluation thread pool: {0}")]
    ThreadPool(String),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, DepsgraphError>;

impl From<serde_json::Error> for DepsgraphError {
    fn from(err: serde_json::Error) -> Self {
        DepsgraphError::InvalidConfig(err.to_string())
    }
}
