//! The queue-driven traversal loop.
//!
//! One executor step dequeues a `(node, message)` work item, invokes the
//! node's capability, appends an execution record, then consults the
//! *live* graph store for outgoing edges: predicated edges are guarded,
//! join-grouped edges divert to the barrier, and everything else is
//! enqueued FIFO. Strict FIFO processing makes sibling branches
//! interleave in edge-registration order (breadth-first), which is the
//! total order the whole test surface relies on.
//!
//! There is no cycle detection: `max_steps` is the mandatory bound, and
//! exhausting it is an informational terminal state, not an error.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use miette::Diagnostic;
use rustc_hash::FxHashMap;
use serde_json::Value;
use thiserror::Error;
use tracing::Instrument;
use uuid::Uuid;

use crate::capability::{CapabilityContext, CapabilityError};
use crate::control::{RecordHook, RunControl};
use crate::events::{RECORD_SCOPE, RunEvent};
use crate::graph::{GraphStore, PredicateError};
use crate::join::JoinBarrier;
use crate::message::Message;
use crate::report::{
    ExecutionRecord, ExecutionReport, FaultEvent, FaultKind, StepOutcome, Termination,
};

/// How traversal-time failures are classified.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Abort the run on the first failure; the typed error carries the
    /// report truncated at that point.
    #[default]
    FailFast,
    /// Record the failure, skip the failing node's outgoing edges, and
    /// keep draining the queue. Sibling branches are unaffected.
    Quarantine,
}

/// Per-run configuration.
///
/// `max_steps` is mandatory by construction: there is no `Default` and
/// no way to request an unbounded run.
///
/// ```
/// use relaygraph::executor::{FailurePolicy, RunOptions};
///
/// let options = RunOptions::new(64).failure_policy(FailurePolicy::Quarantine);
/// ```
pub struct RunOptions {
    pub(crate) max_steps: u64,
    pub(crate) failure_policy: FailurePolicy,
    pub(crate) on_record: Option<RecordHook>,
    pub(crate) stop: Option<Arc<AtomicBool>>,
    pub(crate) events: Option<flume::Sender<RunEvent>>,
}

impl RunOptions {
    /// Creates options with the mandatory step bound.
    #[must_use]
    pub fn new(max_steps: u64) -> Self {
        Self {
            max_steps,
            failure_policy: FailurePolicy::default(),
            on_record: None,
            stop: None,
            events: None,
        }
    }

    #[must_use]
    pub fn failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    /// Installs an inspection/cancel hook invoked after each record.
    #[must_use]
    pub fn on_record<F>(mut self, hook: F) -> Self
    where
        F: Fn(&ExecutionRecord) -> RunControl + Send + Sync + 'static,
    {
        self.on_record = Some(Arc::new(hook));
        self
    }

    /// Installs an external stop flag, checked once per step boundary.
    #[must_use]
    pub fn stop_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.stop = Some(flag);
        self
    }

    /// Streams one [`RunEvent`] per record (plus capability-emitted
    /// events) to the given observer channel.
    #[must_use]
    pub fn events(mut self, sender: flume::Sender<RunEvent>) -> Self {
        self.events = Some(sender);
        self
    }
}

/// Fatal run outcomes. Each variant carries the report truncated at the
/// point of failure so callers can still inspect what happened.
#[derive(Debug, Error, Diagnostic)]
pub enum ExecutorError {
    /// A dequeued work item targeted a node that was never registered.
    /// This is the lazy-validation point for forward-referenced edges.
    #[error("unknown node at traversal: {name}")]
    #[diagnostic(
        code(relaygraph::executor::unknown_node),
        help("Register the node before an edge targeting it is traversed.")
    )]
    UnknownNode {
        name: String,
        report: Box<ExecutionReport>,
    },

    /// A capability returned a failure under `FailFast`.
    #[error("capability failed at node {node}")]
    #[diagnostic(code(relaygraph::executor::capability))]
    CapabilityFailure {
        node: String,
        #[source]
        source: CapabilityError,
        report: Box<ExecutionReport>,
    },

    /// A routing predicate raised under `FailFast`.
    #[error("routing predicate failed on edge {from} -> {to}")]
    #[diagnostic(code(relaygraph::executor::predicate))]
    PredicateFailure {
        from: String,
        to: String,
        #[source]
        source: PredicateError,
        report: Box<ExecutionReport>,
    },

    /// An edge referenced a join group with no registered spec.
    #[error("edge {from} -> {to} references unregistered join group {group}")]
    #[diagnostic(
        code(relaygraph::executor::unknown_join),
        help("Call GraphStore::register_join before traversal reaches the grouped edge.")
    )]
    UnknownJoin {
        from: String,
        to: String,
        group: String,
        report: Box<ExecutionReport>,
    },
}

impl ExecutorError {
    /// The truncated report accumulated before the abort.
    #[must_use]
    pub fn report(&self) -> &ExecutionReport {
        match self {
            ExecutorError::UnknownNode { report, .. }
            | ExecutorError::CapabilityFailure { report, .. }
            | ExecutorError::PredicateFailure { report, .. }
            | ExecutorError::UnknownJoin { report, .. } => report,
        }
    }
}

/// The scheduler: drives a graph from an entry node to a terminal state.
///
/// The executor exclusively owns the pending-work queue and the join
/// barrier for each run; the graph store stays shared so capabilities
/// can expand it mid-run. Runs are independent: nothing persists on the
/// executor between `run` calls.
pub struct Executor {
    graph: Arc<GraphStore>,
}

impl Executor {
    #[must_use]
    pub fn new(graph: Arc<GraphStore>) -> Self {
        Self { graph }
    }

    /// The graph this executor traverses.
    #[must_use]
    pub fn graph(&self) -> &Arc<GraphStore> {
        &self.graph
    }

    /// Seeds the queue with `(entry, payload)` at wave 0 and drains it.
    ///
    /// Returns the completed report, or a typed fatal error (which still
    /// carries the truncated report) under `FailFast`.
    pub async fn run(
        &self,
        entry: &str,
        payload: Value,
        options: RunOptions,
    ) -> Result<ExecutionReport, ExecutorError> {
        let run_id = Uuid::new_v4();
        let span = tracing::info_span!("run", run_id = %run_id, entry);
        self.run_inner(entry, payload, options, run_id)
            .instrument(span)
            .await
    }

    async fn run_inner(
        &self,
        entry: &str,
        payload: Value,
        options: RunOptions,
        run_id: Uuid,
    ) -> Result<ExecutionReport, ExecutorError> {
        let mut run = RunState::new(run_id, options);
        run.queue.push_back((entry.to_string(), Message::seed(payload)));
        tracing::debug!(entry, "run seeded");

        let termination = loop {
            if run.stop_requested() {
                tracing::info!(steps = run.steps, "stop flag observed");
                break Termination::Cancelled;
            }
            if run.queue.is_empty() {
                break Termination::Completed;
            }
            if run.steps >= run.options.max_steps {
                tracing::info!(
                    max_steps = run.options.max_steps,
                    queued = run.queue.len(),
                    "step budget exhausted with work still queued"
                );
                break Termination::CycleLimitReached;
            }

            let Some((name, input)) = run.queue.pop_front() else {
                break Termination::Completed;
            };
            run.steps += 1;

            let Some(capability) = self.graph.capability(&name) else {
                let fault = FaultEvent::new(
                    FaultKind::UnknownNode,
                    &name,
                    input.sequence,
                    format!("no node registered under '{name}'"),
                );
                match run.options.failure_policy {
                    FailurePolicy::FailFast => {
                        run.record_fatal(name.clone(), input, StepOutcome::Faulted(fault));
                        let report = run.finish(&self.graph, Termination::Failed);
                        return Err(ExecutorError::UnknownNode {
                            name,
                            report: Box::new(report),
                        });
                    }
                    FailurePolicy::Quarantine => {
                        tracing::warn!(node = %name, "unknown node quarantined");
                        if run.record(name, input, StepOutcome::Faulted(fault))
                            == RunControl::Stop
                        {
                            break Termination::Cancelled;
                        }
                        continue;
                    }
                }
            };

            let ctx = CapabilityContext::new(
                name.clone(),
                input.sequence,
                input.wave,
                Arc::clone(&self.graph),
                run.options.events.clone(),
            );
            let output = match capability.process(input.clone(), ctx).await {
                Ok(raw) => {
                    let mut output = raw;
                    output.origin = name.clone();
                    output.sequence = run.next_sequence();
                    output
                }
                Err(source) => {
                    let fault = FaultEvent::new(
                        FaultKind::Capability,
                        &name,
                        input.sequence,
                        source.to_string(),
                    );
                    match run.options.failure_policy {
                        FailurePolicy::FailFast => {
                            run.record_fatal(name.clone(), input, StepOutcome::Faulted(fault));
                            let report = run.finish(&self.graph, Termination::Failed);
                            return Err(ExecutorError::CapabilityFailure {
                                node: name,
                                source,
                                report: Box::new(report),
                            });
                        }
                        FailurePolicy::Quarantine => {
                            tracing::warn!(node = %name, error = %source, "capability quarantined");
                            if run.record(name, input, StepOutcome::Faulted(fault))
                                == RunControl::Stop
                            {
                                break Termination::Cancelled;
                            }
                            continue;
                        }
                    }
                }
            };

            if run.record(name.clone(), input, StepOutcome::Produced(output.clone()))
                == RunControl::Stop
            {
                break Termination::Cancelled;
            }

            // Edges are re-read from the live store on every step so
            // same-step dynamic expansion is honored.
            match self.traverse_edges(&mut run, &name, &output) {
                Ok(()) => {}
                Err(fatal) => return Err(fatal),
            }
        };

        let report = run.finish(&self.graph, termination);
        tracing::info!(
            steps = report.steps,
            records = report.records.len(),
            termination = ?report.termination,
            incomplete_joins = report.incomplete_joins.len(),
            "run finished"
        );
        Ok(report)
    }

    /// Evaluates and follows the outgoing edges of `name` for `output`.
    fn traverse_edges(
        &self,
        run: &mut RunState,
        name: &str,
        output: &Message,
    ) -> Result<(), ExecutorError> {
        for edge in self.graph.edges_from(name) {
            if let Some(predicate) = &edge.predicate {
                match predicate(output) {
                    Ok(true) => {}
                    Ok(false) => {
                        tracing::trace!(from = %edge.from, to = %edge.to, "edge not taken");
                        continue;
                    }
                    Err(source) => {
                        let fault = FaultEvent::new(
                            FaultKind::Predicate,
                            &edge.from,
                            output.sequence,
                            source.to_string(),
                        );
                        match run.options.failure_policy {
                            FailurePolicy::FailFast => {
                                run.faults.push(fault);
                                let report = run.take_report(&self.graph, Termination::Failed);
                                return Err(ExecutorError::PredicateFailure {
                                    from: edge.from.clone(),
                                    to: edge.to.clone(),
                                    source,
                                    report: Box::new(report),
                                });
                            }
                            FailurePolicy::Quarantine => {
                                tracing::warn!(
                                    from = %edge.from,
                                    to = %edge.to,
                                    error = %source,
                                    "predicate quarantined; edge not taken"
                                );
                                run.faults.push(fault);
                                continue;
                            }
                        }
                    }
                }
            }

            if let Some(group) = &edge.join_group {
                let Some(spec) = self.graph.join_spec(group) else {
                    let fault = FaultEvent::new(
                        FaultKind::UnknownJoin,
                        &edge.from,
                        output.sequence,
                        format!("no join spec registered under '{group}'"),
                    );
                    match run.options.failure_policy {
                        FailurePolicy::FailFast => {
                            run.faults.push(fault);
                            let report = run.take_report(&self.graph, Termination::Failed);
                            return Err(ExecutorError::UnknownJoin {
                                from: edge.from.clone(),
                                to: edge.to.clone(),
                                group: group.clone(),
                                report: Box::new(report),
                            });
                        }
                        FailurePolicy::Quarantine => {
                            tracing::warn!(group = %group, "unregistered join group quarantined");
                            run.faults.push(fault);
                            continue;
                        }
                    }
                };
                if let Some(mut merged) = run.barrier.contribute(group, &spec, name, output.clone())
                {
                    merged.sequence = run.next_sequence();
                    run.queue.push_back((spec.target.clone(), merged));
                }
            } else {
                run.queue.push_back((edge.to.clone(), output.clone()));
            }
        }
        Ok(())
    }
}

/// Mutable state for one run: the queue, the barrier, counters, and the
/// report under construction.
struct RunState {
    options: RunOptions,
    run_id: Uuid,
    queue: VecDeque<(String, Message)>,
    barrier: JoinBarrier,
    records: Vec<ExecutionRecord>,
    last_by_node: FxHashMap<String, ExecutionRecord>,
    faults: Vec<FaultEvent>,
    next_sequence: u64,
    steps: u64,
}

impl RunState {
    fn new(run_id: Uuid, options: RunOptions) -> Self {
        Self {
            options,
            run_id,
            queue: VecDeque::new(),
            barrier: JoinBarrier::new(),
            records: Vec::new(),
            last_by_node: FxHashMap::default(),
            faults: Vec::new(),
            // The seed message holds sequence 0.
            next_sequence: 1,
            steps: 0,
        }
    }

    fn stop_requested(&self) -> bool {
        self.options
            .stop
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Relaxed))
    }

    fn next_sequence(&mut self) -> u64 {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        sequence
    }

    fn make_record(&mut self, node: String, input: Message, outcome: StepOutcome) -> ExecutionRecord {
        let sequence = match &outcome {
            StepOutcome::Produced(message) => message.sequence,
            StepOutcome::Faulted(_) => self.next_sequence(),
        };
        ExecutionRecord {
            node,
            input,
            outcome,
            sequence,
        }
    }

    fn emit_record(&self, record: &ExecutionRecord) {
        if let Some(events) = &self.options.events {
            let summary = match &record.outcome {
                StepOutcome::Produced(_) => "produced".to_string(),
                StepOutcome::Faulted(fault) => format!("faulted: {}", fault.message),
            };
            // Fire-and-forget: a dropped receiver never stalls the run.
            let _ = events.send(RunEvent::node_scoped(
                record.node.clone(),
                record.sequence,
                RECORD_SCOPE,
                summary,
            ));
        }
    }

    fn store(&mut self, record: ExecutionRecord) {
        self.last_by_node.insert(record.node.clone(), record.clone());
        self.records.push(record);
    }

    /// Appends the final record of an aborting run. Observers still see
    /// it on the stream; the hook is skipped since there is nothing left
    /// to cancel.
    fn record_fatal(&mut self, node: String, input: Message, outcome: StepOutcome) {
        let record = self.make_record(node, input, outcome);
        self.emit_record(&record);
        self.store(record);
    }

    /// Appends a record, forwards it to the observer channel, and
    /// consults the record hook.
    fn record(&mut self, node: String, input: Message, outcome: StepOutcome) -> RunControl {
        let record = self.make_record(node, input, outcome);
        self.emit_record(&record);
        let control = match &self.options.on_record {
            Some(hook) => hook(&record),
            None => RunControl::Continue,
        };
        self.store(record);
        control
    }

    fn finish(self, graph: &GraphStore, termination: Termination) -> ExecutionReport {
        ExecutionReport {
            run_id: self.run_id,
            records: self.records,
            last_by_node: self.last_by_node,
            faults: self.faults,
            incomplete_joins: self.barrier.drain_incomplete(graph),
            termination,
            steps: self.steps,
        }
    }

    /// `finish` for call sites that only hold `&mut self`.
    fn take_report(&mut self, graph: &GraphStore, termination: Termination) -> ExecutionReport {
        let run_id = self.run_id;
        let state = std::mem::replace(self, RunState::new(run_id, RunOptions::new(0)));
        state.finish(graph, termination)
    }
}
