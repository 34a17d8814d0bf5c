//! Wire format for cross-context messages.
//!
//! Every message posted on a broadcast transport is a JSON object:
//!
//! ```text
//! { "event": string, "args": any[], "from": string }
//! ```
//!
//! `from` carries the originating context's uuid (or `"service-worker"`
//! for worker-originated traffic) and is appended as the implicit last
//! argument when the receiving side dispatches to listeners.
//!
//! Two event names are reserved for the request/response protocol and
//! are intercepted before generic dispatch:
//!
//! - [`CROSS_TAB_REQUEST`] with `args = [request_id, method, payload, targets]`
//! - [`CROSS_TAB_RESPONSE`] with `args = [request_id, response]`
//!
//! Malformed inbound payloads decode to `None` and are swallowed by the
//! receiver; no listener is invoked and no error surfaces.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::BusError;

/// Reserved event name opening a request round.
pub const CROSS_TAB_REQUEST: &str = "crossTabRequest";

/// Reserved event name carrying a response to a request round.
pub const CROSS_TAB_RESPONSE: &str = "crossTabResponse";

/// A broadcast message as it travels between contexts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Event name, open vocabulary.
    pub event: String,
    /// Positional event arguments; must survive a JSON round trip.
    pub args: Vec<Value>,
    /// Uuid of the originating context.
    pub from: String,
}

impl Envelope {
    /// Build an envelope.
    pub fn new(event: impl Into<String>, args: Vec<Value>, from: impl Into<String>) -> Self {
        Self {
            event: event.into(),
            args,
            from: from.into(),
        }
    }

    /// Serialize for transmission.
    pub fn encode(&self) -> Result<String, BusError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse an inbound raw message. Returns `None` for anything that is
    /// not a well-formed envelope.
    pub fn decode(raw: &str) -> Option<Self> {
        serde_json::from_str(raw).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_envelope_round_trip() {
        let env = Envelope::new(
            "identity:login",
            vec![json!("token123"), json!({"id": 1})],
            "tab-a",
        );
        let raw = env.encode().unwrap();
        assert_eq!(Envelope::decode(&raw), Some(env));
    }

    #[test]
    fn test_envelope_wire_shape() {
        let env = Envelope::new("tab:uuid", vec![json!("abc"), json!(true)], "abc");
        let raw = env.encode().unwrap();
        let value: Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value["event"], "tab:uuid");
        assert_eq!(value["args"], json!(["abc", true]));
        assert_eq!(value["from"], "abc");
    }

    #[test]
    fn test_decode_malformed() {
        assert_eq!(Envelope::decode("not json"), None);
        assert_eq!(Envelope::decode("{}"), None);
        assert_eq!(Envelope::decode("{\"event\": 42}"), None);
    }
}
