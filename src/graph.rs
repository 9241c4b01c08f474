//! The shared graph store: node registry, edge arena, and join specs.
//!
//! The store is deliberately mutable *during* traversal. Capabilities
//! hold an `Arc<GraphStore>` through their context and may register new
//! nodes and append edges mid-run; the executor re-reads the edge list
//! on every step, so additions made at step `n` are honored at step `n`.
//!
//! Endpoint validation is lazy: `add_edge` never checks that `from`/`to`
//! are registered, so an orchestrator node can add a specialist and an
//! edge to it in either order within the same invocation. Resolution
//! happens when the executor dequeues a work item for the target.

use std::fmt;
use std::sync::Arc;

use miette::Diagnostic;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use thiserror::Error;

use crate::capability::Capability;
use crate::join::JoinSpec;
use crate::message::Message;

/// Routing predicate evaluated against a node's output message.
///
/// Predicates must be pure: no side effects, no graph mutation. A
/// predicate that cannot decide returns `Err`, which the executor
/// classifies under the run's failure policy (edge-not-taken under
/// `Quarantine`, abort under `FailFast`).
///
/// For the common infallible case use [`route`]:
///
/// ```
/// use relaygraph::graph::{Edge, route};
///
/// let edge = Edge::new("triage", "escalate")
///     .with_predicate(route(|msg| msg.payload_str() == Some("urgent")));
/// ```
pub type RoutePredicate =
    Arc<dyn Fn(&Message) -> Result<bool, PredicateError> + Send + Sync + 'static>;

/// Wraps an infallible boolean routing function into a [`RoutePredicate`].
pub fn route<F>(f: F) -> RoutePredicate
where
    F: Fn(&Message) -> bool + Send + Sync + 'static,
{
    Arc::new(move |msg| Ok(f(msg)))
}

/// Failure raised by a routing predicate that could not be evaluated.
#[derive(Debug, Error, Diagnostic)]
#[error("routing predicate failed: {message}")]
#[diagnostic(code(relaygraph::graph::predicate))]
pub struct PredicateError {
    pub message: String,
}

impl PredicateError {
    pub fn msg(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// A directed, optionally predicated, optionally join-grouped edge.
#[derive(Clone)]
pub struct Edge {
    /// Source node name.
    pub from: String,
    /// Target node name (or the join group's target when grouped).
    pub to: String,
    /// Optional guard; the edge is only taken when it returns `true`.
    pub predicate: Option<RoutePredicate>,
    /// When set, output messages are handed to the join barrier for this
    /// group instead of being enqueued directly.
    pub join_group: Option<String>,
}

impl Edge {
    /// Creates an unconditional edge.
    #[must_use]
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            predicate: None,
            join_group: None,
        }
    }

    /// Guards this edge with a routing predicate.
    #[must_use]
    pub fn with_predicate(mut self, predicate: RoutePredicate) -> Self {
        self.predicate = Some(predicate);
        self
    }

    /// Marks this edge as a contribution to a join group.
    #[must_use]
    pub fn with_join_group(mut self, group: impl Into<String>) -> Self {
        self.join_group = Some(group.into());
        self
    }
}

impl fmt::Debug for Edge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Edge")
            .field("from", &self.from)
            .field("to", &self.to)
            .field("predicated", &self.predicate.is_some())
            .field("join_group", &self.join_group)
            .finish()
    }
}

/// Structural errors raised by graph store registration calls.
#[derive(Debug, Error, Diagnostic)]
pub enum GraphError {
    /// A node name was registered twice. Names are immutable once taken.
    #[error("node already registered: {name}")]
    #[diagnostic(
        code(relaygraph::graph::duplicate_node),
        help("Node names are immutable once registered; pick a distinct name.")
    )]
    DuplicateNode { name: String },

    /// A join group id was registered twice.
    #[error("join group already registered: {group}")]
    #[diagnostic(code(relaygraph::graph::duplicate_join))]
    DuplicateJoin { group: String },

    /// A join spec declared no required sources.
    #[error("join group {group} requires at least one source")]
    #[diagnostic(
        code(relaygraph::graph::empty_join_sources),
        help("A join barrier with no required sources would never fire.")
    )]
    EmptyJoinSources { group: String },
}

/// Registry of named capabilities plus the mutable edge set and join
/// specs, shared between the caller, the executor, and any orchestrator
/// capabilities that expand the graph mid-run.
///
/// All accessors take `&self`: interior locking keeps concurrent reads
/// cheap and lets a single mutator interleave with traversal without
/// readers ever observing a torn edge list. Edge iteration is
/// copy-on-read, so held results are stable snapshots while the live
/// store moves on.
pub struct GraphStore {
    nodes: RwLock<FxHashMap<String, Arc<dyn Capability>>>,
    edges: RwLock<Vec<Edge>>,
    joins: RwLock<FxHashMap<String, Arc<JoinSpec>>>,
}

impl GraphStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            nodes: RwLock::new(FxHashMap::default()),
            edges: RwLock::new(Vec::new()),
            joins: RwLock::new(FxHashMap::default()),
        }
    }

    /// Registers a capability under a unique name.
    ///
    /// Fails with [`GraphError::DuplicateNode`] if the name is taken;
    /// registration is never an overwrite.
    pub fn register_node(
        &self,
        name: impl Into<String>,
        capability: impl Capability + 'static,
    ) -> Result<(), GraphError> {
        let name = name.into();
        let mut nodes = self.nodes.write();
        if nodes.contains_key(&name) {
            return Err(GraphError::DuplicateNode { name });
        }
        tracing::debug!(node = %name, "node registered");
        nodes.insert(name, Arc::new(capability));
        Ok(())
    }

    /// Appends an edge to the store.
    ///
    /// Endpoints are not validated here; unresolved targets surface as
    /// `UnknownNode` when (and if) the edge is actually traversed.
    pub fn add_edge(&self, edge: Edge) {
        tracing::debug!(edge = ?edge, "edge added");
        self.edges.write().push(edge);
    }

    /// Registers a join spec under a group id.
    pub fn register_join(
        &self,
        group: impl Into<String>,
        spec: JoinSpec,
    ) -> Result<(), GraphError> {
        let group = group.into();
        if spec.required_sources.is_empty() {
            return Err(GraphError::EmptyJoinSources { group });
        }
        let mut joins = self.joins.write();
        if joins.contains_key(&group) {
            return Err(GraphError::DuplicateJoin { group });
        }
        tracing::debug!(group = %group, target = %spec.target, "join registered");
        joins.insert(group, Arc::new(spec));
        Ok(())
    }

    /// Edges currently outgoing from `name`, in registration order.
    ///
    /// Always evaluated against the live store, never a pre-traversal
    /// snapshot; mid-run additions are visible to the very next query.
    #[must_use]
    pub fn edges_from(&self, name: &str) -> Vec<Edge> {
        self.edges
            .read()
            .iter()
            .filter(|edge| edge.from == name)
            .cloned()
            .collect()
    }

    /// Whether a node with this name is registered.
    #[must_use]
    pub fn has_node(&self, name: &str) -> bool {
        self.nodes.read().contains_key(name)
    }

    /// Number of registered nodes.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.read().len()
    }

    /// Number of edges in the store.
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.edges.read().len()
    }

    pub(crate) fn capability(&self, name: &str) -> Option<Arc<dyn Capability>> {
        self.nodes.read().get(name).cloned()
    }

    pub(crate) fn join_spec(&self, group: &str) -> Option<Arc<JoinSpec>> {
        self.joins.read().get(group).cloned()
    }
}

impl Default for GraphStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::{CapabilityContext, CapabilityError};
    use async_trait::async_trait;

    struct Echo;

    #[async_trait]
    impl Capability for Echo {
        async fn process(
            &self,
            input: Message,
            _ctx: CapabilityContext,
        ) -> Result<Message, CapabilityError> {
            let payload = input.payload.clone();
            Ok(input.reply(payload))
        }
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let graph = GraphStore::new();
        graph.register_node("echo", Echo).expect("first");
        let err = graph.register_node("echo", Echo).unwrap_err();
        assert!(matches!(err, GraphError::DuplicateNode { name } if name == "echo"));
    }

    #[test]
    fn edges_from_preserves_registration_order() {
        let graph = GraphStore::new();
        graph.add_edge(Edge::new("x", "y"));
        graph.add_edge(Edge::new("x", "z"));
        graph.add_edge(Edge::new("other", "y"));
        let targets: Vec<_> = graph
            .edges_from("x")
            .into_iter()
            .map(|e| e.to)
            .collect();
        assert_eq!(targets, vec!["y".to_string(), "z".to_string()]);
    }

    #[test]
    fn forward_reference_edges_are_accepted() {
        let graph = GraphStore::new();
        // Neither endpoint exists yet; validation is deferred to traversal.
        graph.add_edge(Edge::new("not_yet", "also_not_yet"));
        assert_eq!(graph.edge_count(), 1);
        assert!(!graph.has_node("not_yet"));
    }

    #[test]
    fn empty_join_sources_are_rejected() {
        let graph = GraphStore::new();
        let spec = JoinSpec::merging("agg", Vec::<String>::new(), |_| serde_json::json!(null));
        let err = graph.register_join("g", spec).unwrap_err();
        assert!(matches!(err, GraphError::EmptyJoinSources { .. }));
    }
}
