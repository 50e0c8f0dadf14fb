//! Wire protocol definitions
//!
//! Every WebSocket text frame is a JSON envelope
//! `{"event": <name>, "data": <payload>, "id": <ack id, optional>}`.
//! Outbound events are serialized from a tagged enum; inbound frames are
//! decoded into `InboundEvent`, with anything unrecognised falling into
//! `InboundEvent::Discard`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::message::ChatMessage;

/// Event name of a chat message (both directions)
pub const EVENT_MESSAGE: &str = "message";
/// Event name of a typing notification (both directions)
pub const EVENT_TYPING: &str = "typing";
/// Event name of a room join (outbound)
pub const EVENT_JOIN: &str = "join";
/// Event name of a delivery acknowledgement (inbound)
pub const EVENT_ACK: &str = "ack";

/// Client → Server event
///
/// Adjacently tagged: the variant becomes `event`, the fields `data`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum OutboundEvent {
    /// Announce presence in a room
    Join { user: String, room: String },
    /// Chat message, sent with an acknowledgement request
    Message {
        user: String,
        room: String,
        text: String,
        timestamp: f64,
    },
    /// Typing notification
    Typing { user: String, room: String },
}

/// Outbound envelope with an optional acknowledgement id
#[derive(Debug, Serialize)]
pub struct OutboundFrame<'a> {
    #[serde(flatten)]
    pub event: &'a OutboundEvent,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
}

impl OutboundEvent {
    /// Serialize as a text frame, attaching `ack_id` when given
    pub fn to_frame(&self, ack_id: Option<u64>) -> Result<String, serde_json::Error> {
        serde_json::to_string(&OutboundFrame {
            event: self,
            id: ack_id,
        })
    }

    pub fn name(&self) -> &'static str {
        match self {
            OutboundEvent::Join { .. } => EVENT_JOIN,
            OutboundEvent::Message { .. } => EVENT_MESSAGE,
            OutboundEvent::Typing { .. } => EVENT_TYPING,
        }
    }
}

/// Inbound envelope before event-specific decoding
#[derive(Debug, Deserialize)]
struct InboundFrame {
    event: String,
    #[serde(default)]
    data: Value,
    #[serde(default)]
    id: Option<u64>,
}

/// Server → Client event
#[derive(Debug, Clone, PartialEq)]
pub enum InboundEvent {
    /// Chat message from the room
    Message(ChatMessage),
    /// A remote user is typing
    Typing { user: String },
    /// Acknowledgement of an outbound frame
    Ack { id: u64, data: Value },
    /// Unknown event or malformed payload
    Discard,
}

impl InboundEvent {
    /// Decode a text frame
    ///
    /// Never fails: anything that does not match the protocol is `Discard`.
    pub fn decode(text: &str) -> Self {
        let Ok(frame) = serde_json::from_str::<InboundFrame>(text) else {
            return InboundEvent::Discard;
        };

        let decoded = match frame.event.as_str() {
            EVENT_MESSAGE => ChatMessage::parse(&frame.data).map(InboundEvent::Message),
            EVENT_TYPING => frame
                .data
                .get("user")
                .and_then(Value::as_str)
                .map(|user| InboundEvent::Typing {
                    user: user.to_string(),
                }),
            EVENT_ACK => frame.id.map(|id| InboundEvent::Ack {
                id,
                data: frame.data,
            }),
            _ => None,
        };

        decoded.unwrap_or(InboundEvent::Discard)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_join_serialize() {
        let event = OutboundEvent::Join {
            user: "alice".to_string(),
            room: "lobby".to_string(),
        };
        let frame: Value = serde_json::from_str(&event.to_frame(None).unwrap()).unwrap();

        assert_eq!(
            frame,
            json!({"event": "join", "data": {"user": "alice", "room": "lobby"}})
        );
    }

    #[test]
    fn test_message_serialize_with_ack_id() {
        let event = OutboundEvent::Message {
            user: "alice".to_string(),
            room: "lobby".to_string(),
            text: "hello".to_string(),
            timestamp: 1700000000.5,
        };
        let frame: Value = serde_json::from_str(&event.to_frame(Some(3)).unwrap()).unwrap();

        assert_eq!(frame["event"], "message");
        assert_eq!(frame["id"], 3);
        assert_eq!(frame["data"]["text"], "hello");
        assert_eq!(frame["data"]["timestamp"], 1700000000.5);
    }

    #[test]
    fn test_decode_message() {
        let text = r#"{"event": "message", "data": {"user": "bob", "text": "hi", "timestamp": 1700000000}}"#;
        match InboundEvent::decode(text) {
            InboundEvent::Message(msg) => {
                assert_eq!(msg.user(), "bob");
                assert_eq!(msg.text(), "hi");
            }
            other => panic!("Wrong variant: {:?}", other),
        }
    }

    #[test]
    fn test_decode_message_without_timestamp() {
        let text = r#"{"event": "message", "data": {"user": "bob", "text": "hi"}}"#;
        assert_eq!(InboundEvent::decode(text), InboundEvent::Discard);
    }

    #[test]
    fn test_decode_typing() {
        let text = r#"{"event": "typing", "data": {"user": "bob", "room": "lobby"}}"#;
        assert_eq!(
            InboundEvent::decode(text),
            InboundEvent::Typing {
                user: "bob".to_string()
            }
        );

        let mistyped = r#"{"event": "typing", "data": {"user": 42}}"#;
        assert_eq!(InboundEvent::decode(mistyped), InboundEvent::Discard);
    }

    #[test]
    fn test_decode_ack() {
        let text = r#"{"event": "ack", "id": 9, "data": "ok"}"#;
        assert_eq!(
            InboundEvent::decode(text),
            InboundEvent::Ack {
                id: 9,
                data: json!("ok")
            }
        );

        let no_id = r#"{"event": "ack", "data": "ok"}"#;
        assert_eq!(InboundEvent::decode(no_id), InboundEvent::Discard);
    }

    #[test]
    fn test_decode_garbage() {
        for text in ["not json", "[]", r#"{"data": {}}"#, r#"{"event": "join", "data": {}}"#] {
            assert_eq!(InboundEvent::decode(text), InboundEvent::Discard, "{}", text);
        }
    }
}
