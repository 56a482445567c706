//! Update Scheduler
//!
//! The scheduler runs every operation that needs an update, in an order
//! that respects the graph's relations, on a rayon thread pool.
//!
//! # Algorithm
//!
//! This is Kahn's algorithm turned into a ready queue:
//!
//! 1. An operation is eligible when it is tagged `NEEDS_UPDATE` and its
//!    component affects something visible. Copy-on-write operations are
//!    always eligible.
//! 2. Each eligible operation gets an atomic counter holding the number of
//!    its eligible, non-cyclic inbound operation relations.
//! 3. Operations whose counter is zero are spawned right away.
//! 4. When an operation completes it decrements the counter of every
//!    eligible child; the thread that brings a counter to zero spawns that
//!    child.
//!
//! Cyclic relations are not counted, so every eligible operation is reached
//! even when the scene contains dependency cycles.

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use parking_lot::Mutex;
use serde::Serialize;

use super::context::{EvalContext, SyncRecord};
use crate::config::DepsgraphConfig;
use crate::data::{IdRef, Main};
use crate::error::{DepsgraphError, Result};
use crate::graph::{Depsgraph, NodeType, OperationId};

/// Summary of one evaluation run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct EvalReport {
    /// Operations in completion order.
    pub evaluated: Vec<OperationId>,
    /// Tagged operations that were not run because nothing visible needs them.
    pub skipped: usize,
    /// Data-blocks reached by the flush that preceded the run.
    pub updated_ids: Vec<IdRef>,
    pub elapsed: Duration,
}

impl EvalReport {
    /// Position of `op` in completion order.
    pub fn position(&self, op: OperationId) -> Option<usize> {
        self.evaluated.iter().position(|evaluated| *evaluated == op)
    }
}

/// Result of a run that still has to be applied to the graph and `Main`.
#[derive(Debug, Default)]
pub(crate) struct RunOutcome {
    pub(crate) report: EvalReport,
    pub(crate) timings: Vec<(OperationId, Duration)>,
    pub(crate) sync: Vec<SyncRecord>,
}

/// Worker pool evaluating tagged operations.
#[derive(Debug)]
pub struct Scheduler {
    pool: rayon::ThreadPool,
}

impl Scheduler {
    pub fn new(config: &DepsgraphConfig) -> Result<Self> {
        config.validate()?;
        let mut builder = rayon::ThreadPoolBuilder::new();
        if let Some(threads) = config.threads {
            builder = builder.num_threads(threads);
        }
        let pool = builder
            .thread_name(|index| format!("depsgraph-eval-{index}"))
            .build()
            .map_err(|e| DepsgraphError::ThreadPool(e.to_string()))?;
        Ok(Self { pool })
    }

    pub fn num_threads(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Evaluate every eligible operation of `graph`.
    ///
    /// The graph is only read; node statistics and tag resets are applied by
    /// the caller from the returned outcome.
    #[tracing::instrument(skip_all, fields(operations = graph.operation_count()))]
    pub(crate) fn run(&self, graph: &Depsgraph, main: &Main) -> RunOutcome {
        let start = Instant::now();
        let eligible: Vec<bool> = graph
            .operations()
            .map(|(_, op)| {
                let comp = graph.component(op.owner());
                op.needs_update()
                    && (comp.affects_directly_visible() || comp.node_type == NodeType::CopyOnWrite)
            })
            .collect();

        let pending: Vec<AtomicU32> = graph
            .operations()
            .map(|(_, op)| {
                let count = op
                    .base
                    .inlinks
                    .iter()
                    .filter_map(|rel| graph.relation(*rel))
                    .filter(|rel| rel.is_pending_link())
                    .filter_map(|rel| rel.from.as_operation())
                    .filter(|from| eligible[from.index()])
                    .count();
                AtomicU32::new(count as u32)
            })
            .collect();

        let roots: Vec<OperationId> = graph
            .operations()
            .filter(|(id, _)| {
                eligible[id.index()] && pending[id.index()].load(Ordering::Relaxed) == 0
            })
            .map(|(id, _)| id)
            .collect();

        let state = RunState {
            graph,
            ctx: EvalContext::new(graph, main, graph.ctime()),
            eligible,
            pending,
            order: Mutex::new(Vec::new()),
            timings: DashMap::new(),
        };

        self.pool.scope(|scope| {
            for root in roots {
                let state = &state;
                scope.spawn(move |scope| run_operation(scope, state, root));
            }
        });

        let skipped = graph
            .operations()
            .filter(|(id, op)| op.needs_update() && !state.eligible[id.index()])
            .count();

        let evaluated = state.order.into_inner();
        let timings = state.timings.into_iter().collect();
        let sync = state.ctx.into_sync_queue();
        tracing::debug!(evaluated = evaluated.len(), skipped, "evaluation finished");

        RunOutcome {
            report: EvalReport {
                evaluated,
                skipped,
                updated_ids: Vec::new(),
                elapsed: start.elapsed(),
            },
            timings,
            sync,
        }
    }
}

struct RunState<'a> {
    graph: &'a Depsgraph,
    ctx: EvalContext<'a>,
    eligible: Vec<bool>,
    pending: Vec<AtomicU32>,
    order: Mutex<Vec<OperationId>>,
    timings: DashMap<OperationId, Duration>,
}

fn run_operation<'scope, 'a: 'scope>(
    scope: &rayon::Scope<'scope>,
    state: &'scope RunState<'a>,
    id: OperationId,
) {
    let op = state.graph.operation(id);
    let start = Instant::now();
    if let Some(callback) = op.evaluate() {
        tracing::trace!(operation = %state.graph.node_identifier(id.into()), "evaluate");
        callback.invoke(&state.ctx);
    }
    state.timings.insert(id, start.elapsed());
    state.order.lock().push(id);

    for rel in op.base.outlinks.iter().filter_map(|rel| state.graph.relation(*rel)) {
        if !rel.is_pending_link() {
            continue;
        }
        let Some(child) = rel.to.as_operation() else {
            continue;
        };
        if !state.eligible[child.index()] {
            continue;
        }
        if state.pending[child.index()].fetch_sub(1, Ordering::AcqRel) == 1 {
            scope.spawn(move |scope| run_operation(scope, state, child));
        }
    }
}
