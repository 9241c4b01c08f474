//! Lightweight observer stream for runs.
//!
//! A run can be given a `flume` sender; the executor forwards one event
//! per execution record and capabilities can emit their own scoped
//! events through [`CapabilityContext::emit`](crate::capability::CapabilityContext::emit).
//! Delivery is fire-and-forget: dropping the receiver only affects
//! capabilities that insist on emitting, never the run itself.

use serde::Serialize;

/// Scope label the executor uses for record events.
pub const RECORD_SCOPE: &str = "record";

/// One observer event emitted during a run.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RunEvent {
    /// Node this event concerns.
    pub node: String,
    /// Sequence of the message being processed when the event fired.
    pub sequence: u64,
    /// Free-form scope label (e.g. `"record"`, `"validation"`).
    pub scope: String,
    /// Human-readable event text.
    pub message: String,
}

impl RunEvent {
    pub(crate) fn node_scoped(
        node: String,
        sequence: u64,
        scope: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            node,
            sequence,
            scope: scope.into(),
            message: message.into(),
        }
    }
}

/// Creates an unbounded observer channel for
/// [`RunOptions::events`](crate::executor::RunOptions::events).
#[must_use]
pub fn channel() -> (flume::Sender<RunEvent>, flume::Receiver<RunEvent>) {
    flume::unbounded()
}
