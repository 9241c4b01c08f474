//! Control-flow primitives for cooperative run inspection and
//! cancellation.
//!
//! The record hook is invoked after every execution record is appended;
//! it can stop the run gracefully (convergence detection, budget caps)
//! without that being an error. An external stop flag offers the same
//! lever to code outside the run.

use std::sync::Arc;

use crate::report::ExecutionRecord;

/// Decision returned by a record hook.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunControl {
    /// Keep draining the work queue.
    Continue,
    /// Stop at this step boundary; the run returns a partial,
    /// well-formed report marked `Cancelled`.
    Stop,
}

/// Inspection/cancel hook invoked after each [`ExecutionRecord`].
pub type RecordHook = Arc<dyn Fn(&ExecutionRecord) -> RunControl + Send + Sync + 'static>;
