//! Join barrier: multi-producer aggregation gated on per-wave completeness.
//!
//! Edges marked with a join group divert their messages here instead of
//! the work queue. The barrier accumulates one contribution per source
//! per wave and fires the group's merge exactly once, when every
//! required source has contributed for that wave. Accumulation that is
//! still incomplete when the run ends is reported, never silently
//! dropped: predicate routing can legitimately starve a source, and that
//! must be visible rather than hung.

use std::sync::Arc;

use rustc_hash::FxHashMap;
use serde::Serialize;
use serde_json::Value;

use crate::graph::GraphStore;
use crate::message::Message;

/// Merge function applied over the collected `source -> Message` mapping
/// once a wave is complete. Returns the merged payload; the executor
/// stamps provenance on the resulting message.
pub type MergeFn = Arc<dyn Fn(&FxHashMap<String, Message>) -> Value + Send + Sync + 'static>;

/// Declares a join: the node to fire, the upstream sources that must all
/// contribute within one wave, and how to merge their messages.
///
/// Registered on the [`GraphStore`](crate::graph::GraphStore) under a
/// group id; edges reference the group via
/// [`Edge::with_join_group`](crate::graph::Edge::with_join_group).
#[derive(Clone)]
pub struct JoinSpec {
    /// Node enqueued with the merged message once the wave completes.
    pub target: String,
    /// Sources that must each contribute before the join fires.
    /// Must be non-empty (enforced at registration).
    pub required_sources: Vec<String>,
    merge: MergeFn,
}

impl JoinSpec {
    /// Creates a join spec from a shared merge function.
    #[must_use]
    pub fn new(
        target: impl Into<String>,
        sources: impl IntoIterator<Item = impl Into<String>>,
        merge: MergeFn,
    ) -> Self {
        Self {
            target: target.into(),
            required_sources: sources.into_iter().map(Into::into).collect(),
            merge,
        }
    }

    /// Convenience constructor wrapping a plain closure.
    #[must_use]
    pub fn merging<F>(
        target: impl Into<String>,
        sources: impl IntoIterator<Item = impl Into<String>>,
        merge: F,
    ) -> Self
    where
        F: Fn(&FxHashMap<String, Message>) -> Value + Send + Sync + 'static,
    {
        Self::new(target, sources, Arc::new(merge))
    }

    fn is_complete(&self, collected: &FxHashMap<String, Message>) -> bool {
        self.required_sources
            .iter()
            .all(|source| collected.contains_key(source))
    }
}

/// A join group whose wave never completed before the run ended.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct IncompleteJoin {
    pub group: String,
    pub wave: u64,
    /// Required sources that never contributed, sorted by name.
    pub missing_sources: Vec<String>,
}

/// Per-run accumulation state for all join groups, owned by the executor.
#[derive(Default)]
pub(crate) struct JoinBarrier {
    pending: FxHashMap<(String, u64), FxHashMap<String, Message>>,
}

impl JoinBarrier {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Records a contribution from `from` for the message's wave.
    ///
    /// Returns the merged message (wave preserved, origin set to the
    /// group id, sequence left for the executor) once the wave is
    /// complete; the wave's accumulation is cleared at that point so the
    /// join fires exactly once per wave. A second contribution from the
    /// same source in the same wave overwrites the pending one,
    /// mirroring the engine's last-write-wins result map. Contributions
    /// from sources the spec does not require are ignored so the merge
    /// input only ever contains declared sources.
    pub(crate) fn contribute(
        &mut self,
        group: &str,
        spec: &JoinSpec,
        from: &str,
        message: Message,
    ) -> Option<Message> {
        let wave = message.wave;
        if !spec.required_sources.iter().any(|source| source == from) {
            tracing::warn!(group, wave, source = from, "contribution from non-required source ignored");
            return None;
        }
        let collected = self
            .pending
            .entry((group.to_string(), wave))
            .or_default();
        if collected.insert(from.to_string(), message).is_some() {
            tracing::warn!(group, wave, source = from, "join contribution overwritten");
        }

        if !spec.is_complete(collected) {
            return None;
        }

        let collected = self
            .pending
            .remove(&(group.to_string(), wave))
            .expect("completed wave accumulation exists");
        tracing::debug!(group, wave, target = %spec.target, "join fired");
        let payload = (spec.merge)(&collected);
        Some(Message {
            payload,
            origin: group.to_string(),
            sequence: 0,
            wave,
        })
    }

    /// Drains leftover accumulation into incomplete-join reports,
    /// ordered by group then wave for deterministic output.
    pub(crate) fn drain_incomplete(self, graph: &GraphStore) -> Vec<IncompleteJoin> {
        let mut incomplete: Vec<IncompleteJoin> = self
            .pending
            .into_iter()
            .map(|((group, wave), collected)| {
                let mut missing_sources: Vec<String> = graph
                    .join_spec(&group)
                    .map(|spec| {
                        spec.required_sources
                            .iter()
                            .filter(|source| !collected.contains_key(*source))
                            .cloned()
                            .collect()
                    })
                    .unwrap_or_default();
                missing_sources.sort();
                IncompleteJoin {
                    group,
                    wave,
                    missing_sources,
                }
            })
            .collect();
        incomplete.sort_by(|a, b| a.group.cmp(&b.group).then(a.wave.cmp(&b.wave)));
        incomplete
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn concat_spec() -> JoinSpec {
        JoinSpec::merging("agg", ["left", "right"], |inputs| {
            let mut parts: Vec<&str> = inputs
                .values()
                .filter_map(|m| m.payload_str())
                .collect();
            parts.sort_unstable();
            json!(parts.join("+"))
        })
    }

    fn contribution(from: &str, payload: &str, wave: u64) -> Message {
        Message {
            payload: json!(payload),
            origin: from.to_string(),
            sequence: 0,
            wave,
        }
    }

    #[test]
    fn fires_only_when_all_sources_arrive() {
        let spec = concat_spec();
        let mut barrier = JoinBarrier::new();

        let first = barrier.contribute("g", &spec, "left", contribution("left", "a", 0));
        assert!(first.is_none());

        let merged = barrier
            .contribute("g", &spec, "right", contribution("right", "b", 0))
            .expect("join fires once both sources contributed");
        assert_eq!(merged.payload, json!("a+b"));
        assert_eq!(merged.origin, "g");
        assert_eq!(merged.wave, 0);
    }

    #[test]
    fn waves_accumulate_independently() {
        let spec = concat_spec();
        let mut barrier = JoinBarrier::new();

        assert!(barrier
            .contribute("g", &spec, "left", contribution("left", "a", 0))
            .is_none());
        // Same source, different wave: must not complete wave 0.
        assert!(barrier
            .contribute("g", &spec, "right", contribution("right", "b", 1))
            .is_none());

        let merged = barrier
            .contribute("g", &spec, "right", contribution("right", "c", 0))
            .expect("wave 0 complete");
        assert_eq!(merged.payload, json!("a+c"));
    }

    #[test]
    fn non_required_source_never_reaches_the_merge() {
        let spec = concat_spec();
        let mut barrier = JoinBarrier::new();

        assert!(barrier
            .contribute("g", &spec, "stranger", contribution("stranger", "zzz", 0))
            .is_none());
        assert!(barrier
            .contribute("g", &spec, "left", contribution("left", "a", 0))
            .is_none());

        let merged = barrier
            .contribute("g", &spec, "right", contribution("right", "b", 0))
            .expect("required sources complete the wave");
        // Only declared sources appear in the merge input.
        assert_eq!(merged.payload, json!("a+b"));
    }

    #[test]
    fn same_source_overwrites_pending_contribution() {
        let spec = concat_spec();
        let mut barrier = JoinBarrier::new();

        assert!(barrier
            .contribute("g", &spec, "left", contribution("left", "old", 0))
            .is_none());
        assert!(barrier
            .contribute("g", &spec, "left", contribution("left", "new", 0))
            .is_none());

        let merged = barrier
            .contribute("g", &spec, "right", contribution("right", "r", 0))
            .expect("complete");
        assert_eq!(merged.payload, json!("new+r"));
    }
}
