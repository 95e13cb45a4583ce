use serde::{Deserialize, Serialize};

/// One unit carried on the per-turn relay channel between the producer task
/// (pulling RPC frames) and the SSE writer.
///
/// `Fragment` payloads are opaque text from the generation service and are
/// passed through to the client verbatim; `Meta` and `Error` are serialized
/// as tagged JSON objects; `Done` becomes the literal `[DONE]` terminal
/// event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RelayEvent {
    /// First event of every turn, letting the client bind the stream to a
    /// conversation before any content arrives.
    Meta { conversation_id: String },

    /// One opaque content fragment from the generation stream.
    #[serde(skip)]
    Fragment(String),

    /// Graceful end of the generation stream.
    #[serde(skip)]
    Done,

    /// Upstream failure after streaming has started; relayed in-band.
    Error { msg: String },
}

impl RelayEvent {
    /// The `data:` payload for this event.
    pub fn sse_payload(&self) -> String {
        match self {
            RelayEvent::Fragment(text) => text.clone(),
            RelayEvent::Done => "[DONE]".to_string(),
            // Meta and Error always serialize: no non-string keys, no
            // recursion.
            other => serde_json::to_string(other).expect("relay event serializes"),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RelayEvent::Done | RelayEvent::Error { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_meta_payload_shape() {
        let event = RelayEvent::Meta {
            conversation_id: "c1".to_string(),
        };
        assert_eq!(
            event.sse_payload(),
            r#"{"type":"meta","conversation_id":"c1"}"#
        );
    }

    #[test]
    fn test_error_payload_shape() {
        let event = RelayEvent::Error {
            msg: "upstream unavailable".to_string(),
        };
        assert_eq!(
            event.sse_payload(),
            r#"{"type":"error","msg":"upstream unavailable"}"#
        );
    }

    #[test]
    fn test_fragment_passthrough() {
        let event = RelayEvent::Fragment(r#"{"delta":"hel"}"#.to_string());
        assert_eq!(event.sse_payload(), r#"{"delta":"hel"}"#);
        assert!(!event.is_terminal());
    }

    #[test]
    fn test_done_is_literal_sentinel() {
        assert_eq!(RelayEvent::Done.sse_payload(), "[DONE]");
        assert!(RelayEvent::Done.is_terminal());
    }
}
