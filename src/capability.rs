//! Processing capabilities: the per-node units of work invoked by the
//! executor, plus the context handed to them and their error types.

use std::sync::Arc;

use async_trait::async_trait;
use miette::Diagnostic;
use thiserror::Error;

use crate::events::RunEvent;
use crate::graph::GraphStore;
use crate::message::Message;

/// Core trait for a node's processing capability.
///
/// A capability receives the message routed to its node and returns an
/// output message (usually built with [`Message::reply`]) or a typed
/// failure. It may perform arbitrary external I/O, but it must not reach
/// into the executor's queue or join state; its only levers are the
/// return value and, for orchestrator-style nodes, the graph store
/// handle on the context (dynamic expansion).
///
/// # Error Handling
///
/// Returning `Err(CapabilityError)` is classified by the run's failure
/// policy: it aborts the run under `FailFast` and quarantines the node's
/// outgoing edges under `Quarantine`.
///
/// # Examples
///
/// ```
/// use async_trait::async_trait;
/// use relaygraph::capability::{Capability, CapabilityContext, CapabilityError};
/// use relaygraph::message::Message;
/// use serde_json::json;
///
/// struct Shout;
///
/// #[async_trait]
/// impl Capability for Shout {
///     async fn process(
///         &self,
///         input: Message,
///         _ctx: CapabilityContext,
///     ) -> Result<Message, CapabilityError> {
///         let text = input
///             .payload_str()
///             .ok_or(CapabilityError::MissingInput { what: "string payload" })?;
///         Ok(input.reply(json!(text.to_uppercase())))
///     }
/// }
/// ```
#[async_trait]
pub trait Capability: Send + Sync {
    /// Process one message and produce the node's output.
    async fn process(
        &self,
        input: Message,
        ctx: CapabilityContext,
    ) -> Result<Message, CapabilityError>;
}

/// Execution context passed to a capability for one invocation.
///
/// Carries the node's identity, the input's sequence/wave metadata, a
/// handle to the live graph store (so orchestrator nodes can register
/// new specialists and edges mid-run), and an optional observer channel.
#[derive(Clone)]
pub struct CapabilityContext {
    /// Name of the node being invoked.
    pub node: String,
    /// Sequence of the message being processed.
    pub sequence: u64,
    /// Wave of the message being processed.
    pub wave: u64,
    graph: Arc<GraphStore>,
    events: Option<flume::Sender<RunEvent>>,
}

impl CapabilityContext {
    pub(crate) fn new(
        node: String,
        sequence: u64,
        wave: u64,
        graph: Arc<GraphStore>,
        events: Option<flume::Sender<RunEvent>>,
    ) -> Self {
        Self {
            node,
            sequence,
            wave,
            graph,
            events,
        }
    }

    /// The live graph store.
    ///
    /// Mutations made here (`register_node`, `add_edge`) are visible to
    /// the executor within the same step, which is what makes dynamic
    /// expansion patterns work.
    #[must_use]
    pub fn graph(&self) -> &GraphStore {
        &self.graph
    }

    /// Emit a node-scoped event on the run's observer channel.
    ///
    /// A no-op when the run was started without an observer channel.
    pub fn emit(
        &self,
        scope: impl Into<String>,
        message: impl Into<String>,
    ) -> Result<(), ContextError> {
        let Some(sender) = &self.events else {
            return Ok(());
        };
        sender
            .send(RunEvent::node_scoped(
                self.node.clone(),
                self.sequence,
                scope,
                message,
            ))
            .map_err(|_| ContextError::ObserverClosed)
    }
}

/// Errors that can occur when using [`CapabilityContext`] methods.
#[derive(Debug, Error, Diagnostic)]
pub enum ContextError {
    /// The run's observer channel receiver was dropped.
    #[error("failed to emit run event: observer channel closed")]
    #[diagnostic(
        code(relaygraph::capability::observer_closed),
        help("Keep the receiver returned by events::channel() alive for the duration of the run.")
    )]
    ObserverClosed,
}

/// Fatal failures returned by capability invocations.
///
/// Classification is decided per run by the failure policy; the
/// capability itself just reports what went wrong.
#[derive(Debug, Error, Diagnostic)]
pub enum CapabilityError {
    /// Expected input data is missing from the message payload.
    #[error("missing expected input: {what}")]
    #[diagnostic(
        code(relaygraph::capability::missing_input),
        help("Check that the upstream node produced the required payload shape.")
    )]
    MissingInput { what: &'static str },

    /// External provider or service error.
    #[error("provider error ({provider}): {message}")]
    #[diagnostic(code(relaygraph::capability::provider))]
    Provider {
        provider: &'static str,
        message: String,
    },

    /// JSON serialization/deserialization error.
    #[error(transparent)]
    #[diagnostic(code(relaygraph::capability::serde_json))]
    Serde(#[from] serde_json::Error),

    /// Input validation failed.
    #[error("validation failed: {0}")]
    #[diagnostic(code(relaygraph::capability::validation))]
    ValidationFailed(String),

    /// A graph mutation performed by an orchestrator node was rejected.
    #[error(transparent)]
    #[diagnostic(code(relaygraph::capability::graph))]
    Graph(#[from] crate::graph::GraphError),

    /// Observer channel error.
    #[error(transparent)]
    #[diagnostic(code(relaygraph::capability::context))]
    Context(#[from] ContextError),
}
