//! Evaluation
//!
//! Entry points that bring a graph's evaluated copies up to date:
//!
//! - [`evaluate_on_refresh`] after edits, at the scene's current frame.
//! - [`evaluate_on_framechange`] when time moves: everything time dependent
//!   is tagged first.
//!
//! Both flush pending tags, run the [`Scheduler`] and then apply the run to
//! the graph (node statistics, tag reset) and, for the active graph, to the
//! originals in `Main` (synchronization write-back).

mod context;
pub mod ops;
mod scheduler;

pub use context::{EvalContext, SyncRecord};
pub use scheduler::{EvalReport, Scheduler};

use crate::data::Main;
use crate::flush::flush_updates;
use crate::graph::Depsgraph;
use crate::tag::tag_time_source;

use scheduler::RunOutcome;

/// True when tags are waiting for a flush.
pub fn needs_eval(graph: &Depsgraph) -> bool {
    graph.needs_eval()
}

/// Evaluate at the scene's current frame.
#[tracing::instrument(skip_all, fields(view_layer = graph.view_layer()))]
pub fn evaluate_on_refresh(main: &mut Main, graph: &mut Depsgraph, scheduler: &Scheduler) -> EvalReport {
    let frame = graph
        .get_scene()
        .and_then(|scene| main.get(scene))
        .and_then(|block| block.as_scene())
        .map(|scene| scene.frame);
    if let Some(frame) = frame {
        graph.ctime = frame;
        graph.add_time_source().cfra = frame;
    }
    evaluate(main, graph, scheduler)
}

/// Move the graph to `ctime` and evaluate everything time dependent.
#[tracing::instrument(skip_all, fields(view_layer = graph.view_layer(), ctime))]
pub fn evaluate_on_framechange(
    main: &mut Main,
    graph: &mut Depsgraph,
    scheduler: &Scheduler,
    ctime: f32,
) -> EvalReport {
    graph.ctime = ctime;
    graph.add_time_source().cfra = ctime;
    tag_time_source(graph);
    evaluate(main, graph, scheduler)
}

fn evaluate(main: &mut Main, graph: &mut Depsgraph, scheduler: &Scheduler) -> EvalReport {
    let updated_ids = flush_updates(graph);
    let outcome = scheduler.run(graph, main);
    let mut report = apply(main, graph, outcome);
    report.updated_ids = updated_ids;
    report
}

fn apply(main: &mut Main, graph: &mut Depsgraph, outcome: RunOutcome) -> EvalReport {
    for (op, elapsed) in outcome.timings {
        graph.operation_mut(op).base.stats.record(elapsed);
    }
    graph.clear_all_tags();

    if graph.is_active() {
        for record in outcome.sync {
            let Some(block) = main.get_mut(record.id) else {
                continue;
            };
            block.runtime.world_location = record.world_location;
            block.runtime.geometry = record.geometry;
        }
    }
    outcome.report
}
