//! Execution records and the per-run report returned to the caller.

use chrono::{DateTime, Utc};
use rustc_hash::FxHashMap;
use serde::Serialize;
use uuid::Uuid;

use crate::join::IncompleteJoin;
use crate::message::Message;

/// Classifies what kind of failure a fault event describes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultKind {
    /// A capability invocation returned an error.
    Capability,
    /// A routing predicate raised instead of returning a boolean.
    Predicate,
    /// A dequeued work item targeted an unregistered node.
    UnknownNode,
    /// An edge referenced a join group with no registered spec.
    UnknownJoin,
}

/// A recorded failure with its timestamp and provenance.
#[derive(Clone, Debug, Serialize)]
pub struct FaultEvent {
    pub when: DateTime<Utc>,
    /// Node the fault is attributed to (the traversal target for
    /// `UnknownNode`, the edge source for `Predicate`/`UnknownJoin`).
    pub node: String,
    pub sequence: u64,
    pub kind: FaultKind,
    pub message: String,
}

impl FaultEvent {
    pub(crate) fn new(
        kind: FaultKind,
        node: impl Into<String>,
        sequence: u64,
        message: impl Into<String>,
    ) -> Self {
        Self {
            when: Utc::now(),
            node: node.into(),
            sequence,
            kind,
            message: message.into(),
        }
    }
}

/// What one node invocation produced.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepOutcome {
    /// The capability returned an output message.
    Produced(Message),
    /// The capability (or the node lookup) failed.
    Faulted(FaultEvent),
}

impl StepOutcome {
    /// The produced message, if any.
    #[must_use]
    pub fn message(&self) -> Option<&Message> {
        match self {
            StepOutcome::Produced(message) => Some(message),
            StepOutcome::Faulted(_) => None,
        }
    }

    #[must_use]
    pub fn is_fault(&self) -> bool {
        matches!(self, StepOutcome::Faulted(_))
    }
}

/// One entry in the run trace. Append-only; never mutated once created.
#[derive(Clone, Debug, Serialize)]
pub struct ExecutionRecord {
    /// Node that was invoked.
    pub node: String,
    /// The message the node received.
    pub input: Message,
    /// Output message or recorded fault.
    pub outcome: StepOutcome,
    /// Strictly increasing across the run's records.
    pub sequence: u64,
}

impl ExecutionRecord {
    /// The output message, if the invocation succeeded.
    #[must_use]
    pub fn output(&self) -> Option<&Message> {
        self.outcome.message()
    }
}

/// How a run ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Termination {
    /// The work queue drained.
    Completed,
    /// `max_steps` was exhausted with work still queued. Informational,
    /// not fatal: this is the documented bound on feedback loops, since
    /// the engine performs no cycle detection of its own.
    CycleLimitReached,
    /// The record hook or the external stop flag requested a stop.
    Cancelled,
    /// The run aborted under `FailFast`; the report travels inside the
    /// returned [`ExecutorError`](crate::executor::ExecutorError).
    Failed,
}

/// The ordered trace of a run plus its final per-node snapshot.
///
/// Read-only after `run` returns, and independent across runs against
/// the same graph. `last_by_node` is explicitly last-write-wins: a node
/// invoked multiple times (e.g. inside a loop) overwrites its entry, and
/// no aggregation happens here. True multi-producer aggregation is the
/// join barrier's job alone.
#[derive(Clone, Debug, Serialize)]
pub struct ExecutionReport {
    /// Random id for correlating logs and observer events with this run.
    pub run_id: Uuid,
    /// Every node invocation, in execution order.
    pub records: Vec<ExecutionRecord>,
    /// Last record per node name (overwrite semantics).
    pub last_by_node: FxHashMap<String, ExecutionRecord>,
    /// Faults that did not correspond to a node invocation
    /// (quarantined predicate and join-group failures).
    pub faults: Vec<FaultEvent>,
    /// Join waves still accumulating when the run ended.
    pub incomplete_joins: Vec<IncompleteJoin>,
    pub termination: Termination,
    /// Number of work items processed.
    pub steps: u64,
}

impl ExecutionReport {
    /// The last output message a node produced, if any.
    #[must_use]
    pub fn last_output(&self, node: &str) -> Option<&Message> {
        self.last_by_node.get(node).and_then(ExecutionRecord::output)
    }

    /// All records for one node, in execution order. Useful for
    /// convergence checks over loop iterations.
    pub fn records_for<'a>(
        &'a self,
        node: &'a str,
    ) -> impl Iterator<Item = &'a ExecutionRecord> {
        self.records.iter().filter(move |record| record.node == node)
    }

    /// How many times a node was invoked during the run.
    #[must_use]
    pub fn invocation_count(&self, node: &str) -> usize {
        self.records_for(node).count()
    }

    /// The visited node names in execution order.
    #[must_use]
    pub fn visit_order(&self) -> Vec<&str> {
        self.records.iter().map(|record| record.node.as_str()).collect()
    }
}
