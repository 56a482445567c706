//! Graph Construction
//!
//! A graph is built in four passes over one view layer:
//!
//! 1. [`NodeBuilder`] walks the scene and creates ID, component and
//!    operation nodes.
//! 2. [`RelationBuilder`] walks the same hierarchy again and connects the
//!    nodes.
//! 3. [`cycle::detect_cycles`] flags relations that close a cycle.
//! 4. [`finalize::finalize`] decides visibility, prunes unused no-ops,
//!    computes pending counts and re-tags what the previous graph had not
//!    evaluated yet.
//!
//! Both walkers use explicit queues instead of recursion, so deep parent
//! chains cannot exhaust the stack.

pub mod cycle;
pub mod finalize;
mod nodes;
pub mod pruning;
mod relations;
pub mod visibility;

use std::collections::HashMap;
use std::sync::Arc;

pub use nodes::NodeBuilder;
pub use relations::{NodeKey, RelationBuilder};

use crate::config::DepsgraphConfig;
use crate::data::{IdRef, Main};
use crate::error::{DepsgraphError, Result};
use crate::graph::{CowSlot, Depsgraph};

/// State of one ID node that outlives a rebuild.
#[derive(Debug, Clone)]
pub(crate) struct CarriedId {
    pub(crate) cow: Arc<CowSlot>,
    pub(crate) eval_flags: u32,
    pub(crate) customdata_masks: u64,
}

/// What a new graph inherits from the graph it replaces.
#[derive(Debug, Clone, Default)]
pub struct PreviousBuild {
    ids: HashMap<IdRef, CarriedId>,
}

impl PreviousBuild {
    /// Nothing to inherit.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Collect copy-on-write slots and request flags from `graph`.
    pub fn harvest(graph: &Depsgraph) -> Self {
        let ids = graph
            .id_nodes()
            .map(|node| {
                (
                    node.id_orig(),
                    CarriedId {
                        cow: node.cow().clone(),
                        eval_flags: node.eval_flags(),
                        customdata_masks: node.customdata_masks(),
                    },
                )
            })
            .collect();
        Self { ids }
    }

    pub(crate) fn get(&self, id: IdRef) -> Option<&CarriedId> {
        self.ids.get(&id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Build and finalize the graph of one view layer of `scene`.
#[tracing::instrument(skip(main, config, previous))]
pub fn build_from_view_layer(
    main: &Main,
    scene: IdRef,
    view_layer: &str,
    config: &DepsgraphConfig,
    previous: &PreviousBuild,
) -> Result<Depsgraph> {
    config.validate()?;
    let block = main
        .get(scene)
        .ok_or(DepsgraphError::UnknownDataBlock(scene))?;
    let scene_data = block.as_scene().ok_or_else(|| DepsgraphError::NotAScene {
        id: scene,
        name: block.name.clone(),
    })?;
    let layer = scene_data
        .view_layer(view_layer)
        .ok_or_else(|| DepsgraphError::UnknownViewLayer {
            scene: block.name.clone(),
            view_layer: view_layer.to_string(),
        })?;

    let mut graph = Depsgraph::with_config(config);
    graph.scene = Some(scene);
    graph.view_layer = layer.name.clone();
    graph.ctime = scene_data.frame;
    graph.add_time_source().cfra = scene_data.frame;

    let mut nodes = NodeBuilder::new(main, &mut graph);
    nodes.begin_build(previous.clone());
    nodes.build_view_layer(scene, layer);

    let mut relations = RelationBuilder::new(main, &mut graph);
    relations.build_view_layer(scene, layer);

    cycle::detect_cycles(&mut graph);
    finalize::finalize(&mut graph, main, config);

    tracing::debug!(
        id_nodes = graph.id_nodes().count(),
        operations = graph.operation_count(),
        relations = graph.relation_count(),
        "graph built"
    );
    Ok(graph)
}
