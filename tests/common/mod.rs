//! Shared test capabilities for the integration suites.
#![allow(dead_code)]

use async_trait::async_trait;
use relaygraph::capability::{Capability, CapabilityContext, CapabilityError};
use relaygraph::graph::Edge;
use relaygraph::message::Message;
use serde_json::json;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Installs a test subscriber honoring `RUST_LOG`. Idempotent: only the
/// first caller in the process wins.
pub fn init_tracing() {
    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_test_writer())
        .with(EnvFilter::from_default_env())
        .try_init();
}

/// Uppercases a string payload.
pub struct Uppercase;

#[async_trait]
impl Capability for Uppercase {
    async fn process(
        &self,
        input: Message,
        _ctx: CapabilityContext,
    ) -> Result<Message, CapabilityError> {
        let text = input
            .payload_str()
            .ok_or(CapabilityError::MissingInput { what: "string payload" })?;
        Ok(input.reply(json!(text.to_uppercase())))
    }
}

/// Appends a fixed suffix to a string payload.
pub struct Append(pub &'static str);

#[async_trait]
impl Capability for Append {
    async fn process(
        &self,
        input: Message,
        _ctx: CapabilityContext,
    ) -> Result<Message, CapabilityError> {
        let text = input
            .payload_str()
            .ok_or(CapabilityError::MissingInput { what: "string payload" })?;
        Ok(input.reply(json!(format!("{text}{}", self.0))))
    }
}

/// Like [`Append`] but with an owned suffix, for generated graphs.
pub struct Tag(pub String);

#[async_trait]
impl Capability for Tag {
    async fn process(
        &self,
        input: Message,
        _ctx: CapabilityContext,
    ) -> Result<Message, CapabilityError> {
        let text = input
            .payload_str()
            .ok_or(CapabilityError::MissingInput { what: "string payload" })?;
        Ok(input.reply(json!(format!("{text}{}", self.0))))
    }
}

/// Increments a numeric payload by one.
pub struct Increment;

#[async_trait]
impl Capability for Increment {
    async fn process(
        &self,
        input: Message,
        _ctx: CapabilityContext,
    ) -> Result<Message, CapabilityError> {
        let n = input
            .payload
            .as_i64()
            .ok_or(CapabilityError::MissingInput { what: "numeric payload" })?;
        Ok(input.reply(json!(n + 1)))
    }
}

/// Always fails with a provider error.
pub struct Fail(pub &'static str);

#[async_trait]
impl Capability for Fail {
    async fn process(
        &self,
        _input: Message,
        _ctx: CapabilityContext,
    ) -> Result<Message, CapabilityError> {
        Err(CapabilityError::Provider {
            provider: "test",
            message: self.0.to_string(),
        })
    }
}

/// Orchestrator-style node: registers a specialist and an edge to it
/// during its own invocation, then forwards its input.
pub struct Planner {
    pub specialist: &'static str,
}

#[async_trait]
impl Capability for Planner {
    async fn process(
        &self,
        input: Message,
        ctx: CapabilityContext,
    ) -> Result<Message, CapabilityError> {
        // Edge first, node second: endpoint validation is lazy, so the
        // order must not matter.
        ctx.graph().add_edge(Edge::new(ctx.node.clone(), self.specialist));
        ctx.graph().register_node(self.specialist, Append("-done"))?;
        let payload = input.payload.clone();
        Ok(input.reply(payload))
    }
}

/// Emits a scoped observer event, then echoes its input.
pub struct Announce;

#[async_trait]
impl Capability for Announce {
    async fn process(
        &self,
        input: Message,
        ctx: CapabilityContext,
    ) -> Result<Message, CapabilityError> {
        ctx.emit("note", "announce ran")?;
        let payload = input.payload.clone();
        Ok(input.reply(payload))
    }
}
