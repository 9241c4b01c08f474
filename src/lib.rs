//! Relaygraph: a graph-based workflow execution engine for multi-step
//! processing pipelines.
//!
//! A workflow is a set of named nodes, each backed by an async
//! [`Capability`](capability::Capability), connected by directed edges
//! that may carry routing predicates or contribute to join barriers.
//! The [`Executor`](executor::Executor) seeds a FIFO work queue with an
//! entry node and a payload, then drains it breadth-first, recording
//! every invocation into an [`ExecutionReport`](report::ExecutionReport).
//!
//! Three properties set the engine apart from a static DAG runner:
//!
//! - **The graph is live.** Capabilities hold a handle to the shared
//!   [`GraphStore`](graph::GraphStore) and may register nodes and append
//!   edges mid-run; the executor re-reads edges on every step, so an
//!   orchestrator node can grow the workflow underneath itself.
//! - **Cycles are allowed.** There is no cycle detection; the mandatory
//!   `max_steps` bound turns feedback loops into an informational
//!   `CycleLimitReached` termination instead of a hang.
//! - **Joins are wave-scoped.** Fan-in points accumulate one
//!   contribution per source per message wave and fire their merge
//!   exactly once per wave.
//!
//! # Quick Start
//!
//! ```
//! use std::sync::Arc;
//!
//! use async_trait::async_trait;
//! use relaygraph::capability::{Capability, CapabilityContext, CapabilityError};
//! use relaygraph::executor::{Executor, RunOptions};
//! use relaygraph::graph::{Edge, GraphStore};
//! use relaygraph::message::Message;
//! use serde_json::json;
//!
//! struct Uppercase;
//!
//! #[async_trait]
//! impl Capability for Uppercase {
//!     async fn process(
//!         &self,
//!         input: Message,
//!         _ctx: CapabilityContext,
//!     ) -> Result<Message, CapabilityError> {
//!         let text = input
//!             .payload_str()
//!             .ok_or(CapabilityError::MissingInput { what: "string payload" })?;
//!         Ok(input.reply(json!(text.to_uppercase())))
//!     }
//! }
//!
//! struct Exclaim;
//!
//! #[async_trait]
//! impl Capability for Exclaim {
//!     async fn process(
//!         &self,
//!         input: Message,
//!         _ctx: CapabilityContext,
//!     ) -> Result<Message, CapabilityError> {
//!         let text = input
//!             .payload_str()
//!             .ok_or(CapabilityError::MissingInput { what: "string payload" })?;
//!         Ok(input.reply(json!(format!("{text}!"))))
//!     }
//! }
//!
//! let graph = Arc::new(GraphStore::new());
//! graph.register_node("upper", Uppercase).unwrap();
//! graph.register_node("exclaim", Exclaim).unwrap();
//! graph.add_edge(Edge::new("upper", "exclaim"));
//!
//! let executor = Executor::new(graph);
//! let report = tokio::runtime::Runtime::new()
//!     .unwrap()
//!     .block_on(executor.run("upper", json!("hello"), RunOptions::new(16)))
//!     .unwrap();
//!
//! assert_eq!(report.visit_order(), vec!["upper", "exclaim"]);
//! assert_eq!(
//!     report.last_output("exclaim").unwrap().payload,
//!     json!("HELLO!")
//! );
//! ```
//!
//! # Module Map
//!
//! - [`message`]: the [`Message`](message::Message) envelope with
//!   payload, origin, sequence, and wave.
//! - [`capability`]: the async node trait and its invocation context.
//! - [`graph`]: the shared store of nodes, edges, and join specs.
//! - [`join`]: join specs and wave-scoped barrier semantics.
//! - [`executor`]: the queue-driven run loop, options, and failure
//!   policies.
//! - [`report`]: execution records, faults, and the final report.
//! - [`control`]: record hooks and cooperative cancellation.
//! - [`events`]: the optional observer event stream.

pub mod capability;
pub mod control;
pub mod events;
pub mod executor;
pub mod graph;
pub mod join;
pub mod message;
pub mod report;
