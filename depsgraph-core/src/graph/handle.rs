//! Shared handle to a graph.
//!
//! Consumers never see a graph that is being built: [`DepsgraphHandle::rebuild`]
//! constructs the replacement without holding the write lock and swaps it in
//! when it is complete.

use std::sync::Arc;

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::depsgraph::Depsgraph;
use crate::builder::{self, PreviousBuild};
use crate::config::DepsgraphConfig;
use crate::data::{IdRef, Main};
use crate::error::Result;

/// Cheaply cloneable, thread-safe owner of one graph.
#[derive(Debug, Clone, Default)]
pub struct DepsgraphHandle {
    inner: Arc<RwLock<Depsgraph>>,
}

impl DepsgraphHandle {
    pub fn new(graph: Depsgraph) -> Self {
        Self {
            inner: Arc::new(RwLock::new(graph)),
        }
    }

    pub fn read(&self) -> RwLockReadGuard<'_, Depsgraph> {
        self.inner.read()
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, Depsgraph> {
        self.inner.write()
    }

    /// Build a fresh graph for `scene`/`view_layer` and replace the current
    /// one with it. Copy-on-write snapshots carry over.
    ///
    /// On error the current graph stays in place.
    #[tracing::instrument(skip(self, main, config))]
    pub fn rebuild(
        &self,
        main: &Main,
        scene: IdRef,
        view_layer: &str,
        config: &DepsgraphConfig,
    ) -> Result<()> {
        let previous = PreviousBuild::harvest(&self.inner.read());
        let graph = builder::build_from_view_layer(main, scene, view_layer, config, &previous)?;
        *self.inner.write() = graph;
        Ok(())
    }

    /// True when both handles share the same graph.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}
