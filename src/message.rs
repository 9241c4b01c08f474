use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The unit of data flowing along graph edges.
///
/// A message carries an opaque JSON payload plus provenance metadata:
/// the node that produced it (`origin`), a run-wide monotonically
/// increasing `sequence`, and a `wave` identifying the lineage the
/// message descends from.
///
/// # Waves
///
/// The wave groups messages that descend from the same root invocation
/// (or the same loop iteration). The join barrier only pairs
/// contributions that share a wave. Waves never advance implicitly:
/// a capability that wants to open a new lineage (e.g. the next turn of
/// a writer/reviewer loop) calls [`next_wave`](Self::next_wave) on its
/// reply.
///
/// # Examples
///
/// ```
/// use relaygraph::message::Message;
/// use serde_json::json;
///
/// let seed = Message::seed(json!("draft the intro"));
/// assert_eq!(seed.origin, Message::SEED_ORIGIN);
/// assert_eq!(seed.wave, 0);
///
/// // Inside a capability: reply carries the wave forward.
/// let reply = seed.reply(json!("intro drafted"));
/// assert_eq!(reply.wave, seed.wave);
///
/// // Opening a new loop iteration:
/// let next = seed.reply(json!("revise")).next_wave();
/// assert_eq!(next.wave, seed.wave + 1);
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Opaque payload; the engine never inspects it.
    pub payload: Value,
    /// Name of the node that produced this message.
    ///
    /// The executor stamps this after a capability returns, so a
    /// capability does not need to (and cannot usefully) set it.
    pub origin: String,
    /// Run-wide monotonically increasing sequence number, stamped by
    /// the executor.
    pub sequence: u64,
    /// Lineage identifier used to pair join contributions.
    pub wave: u64,
}

impl Message {
    /// Origin assigned to the initial message seeded by the caller of
    /// `run`, distinct from any registrable node name.
    pub const SEED_ORIGIN: &'static str = "@seed";

    /// Builds the root message for a run: wave 0, sequence 0, seed origin.
    #[must_use]
    pub fn seed(payload: Value) -> Self {
        Self {
            payload,
            origin: Self::SEED_ORIGIN.to_string(),
            sequence: 0,
            wave: 0,
        }
    }

    /// Builds a reply to this message with a new payload.
    ///
    /// The wave is carried forward; origin and sequence are left for the
    /// executor to stamp when the capability returns.
    #[must_use]
    pub fn reply(&self, payload: Value) -> Self {
        Self {
            payload,
            origin: String::new(),
            sequence: 0,
            wave: self.wave,
        }
    }

    /// Advances the wave by one, opening a new join lineage.
    #[must_use]
    pub fn next_wave(mut self) -> Self {
        self.wave += 1;
        self
    }

    /// Convenience accessor for string payloads.
    #[must_use]
    pub fn payload_str(&self) -> Option<&str> {
        self.payload.as_str()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn seed_starts_at_wave_zero() {
        let msg = Message::seed(json!({"task": "summarize"}));
        assert_eq!(msg.wave, 0);
        assert_eq!(msg.sequence, 0);
        assert_eq!(msg.origin, Message::SEED_ORIGIN);
    }

    #[test]
    fn reply_preserves_wave() {
        let msg = Message::seed(json!("in")).next_wave().next_wave();
        let reply = msg.reply(json!("out"));
        assert_eq!(reply.wave, 2);
        assert_eq!(reply.payload, json!("out"));
    }

    #[test]
    fn serialization_round_trip() {
        let msg = Message::seed(json!({"n": 3}));
        let encoded = serde_json::to_string(&msg).expect("serialize");
        let decoded: Message = serde_json::from_str(&encoded).expect("deserialize");
        assert_eq!(msg, decoded);
    }
}
