//! Relay envelope (JSON text frame).
//!
//! The `message` payload belongs to the conversation store and is kept as a
//! `RawValue`: the relay forwards it byte-for-byte and never parses it.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;

use crate::error::{Result, RelayError};
use crate::ids::{ConversationId, Principal};

/// Closed set of envelope types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnvelopeType {
    NewMessage,
    Typing,
    StopTyping,
    MessageRead,
}

impl EnvelopeType {
    pub const ALL: [EnvelopeType; 4] = [
        EnvelopeType::NewMessage,
        EnvelopeType::Typing,
        EnvelopeType::StopTyping,
        EnvelopeType::MessageRead,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            EnvelopeType::NewMessage => "new_message",
            EnvelopeType::Typing => "typing",
            EnvelopeType::StopTyping => "stop_typing",
            EnvelopeType::MessageRead => "message_read",
        }
    }

    /// Types a client may send over the socket. `new_message` is server-only:
    /// messages are created over REST and then published.
    pub fn is_client_originated(self) -> bool {
        !matches!(self, EnvelopeType::NewMessage)
    }
}

impl fmt::Display for EnvelopeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EnvelopeType {
    type Err = RelayError;

    fn from_str(s: &str) -> Result<Self> {
        EnvelopeType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| RelayError::UnknownType(s.to_string()))
    }
}

/// A typed message unit exchanged over a connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: EnvelopeType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<ConversationId>,
    /// Opaque domain payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<Box<RawValue>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<Principal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl Envelope {
    pub fn new(kind: EnvelopeType) -> Self {
        Self {
            kind,
            conversation_id: None,
            message: None,
            user_id: None,
            timestamp: None,
        }
    }

    pub fn with_conversation(mut self, id: ConversationId) -> Self {
        self.conversation_id = Some(id);
        self
    }

    pub fn with_user(mut self, user: Principal) -> Self {
        self.user_id = Some(user);
        self
    }

    pub fn with_message(mut self, message: Box<RawValue>) -> Self {
        self.message = Some(message);
        self
    }

    /// Stamp with the current server time.
    pub fn stamped(mut self) -> Self {
        self.timestamp = Some(Utc::now());
        self
    }

    /// Serialize to a JSON text frame.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self)
            .map_err(|e| RelayError::Internal(format!("envelope encode failed: {e}")))
    }
}

/// Inbound shape: `type` is kept as a string so an unknown tag can be told
/// apart from malformed JSON.
#[derive(Deserialize)]
struct WireEnvelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    conversation_id: Option<ConversationId>,
    #[serde(default)]
    message: Option<Box<RawValue>>,
    #[serde(default)]
    user_id: Option<Principal>,
    #[serde(default)]
    timestamp: Option<DateTime<Utc>>,
}

/// Decode a text frame.
///
/// Malformed JSON or a missing `type` yields `BadRequest`; a `type` outside
/// the enumeration yields `UnknownType`.
pub fn decode_envelope(s: &str) -> Result<Envelope> {
    let wire: WireEnvelope = serde_json::from_str(s)
        .map_err(|e| RelayError::BadRequest(format!("invalid envelope json: {e}")))?;
    let kind = wire.kind.parse::<EnvelopeType>()?;
    Ok(Envelope {
        kind,
        conversation_id: wire.conversation_id,
        message: wire.message,
        user_id: wire.user_id,
        timestamp: wire.timestamp,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_originated_excludes_new_message() {
        let inbound: Vec<_> = EnvelopeType::ALL
            .into_iter()
            .filter(|t| t.is_client_originated())
            .collect();
        assert_eq!(
            inbound,
            vec![EnvelopeType::Typing, EnvelopeType::StopTyping, EnvelopeType::MessageRead]
        );
    }

    #[test]
    fn outbound_omits_absent_fields() {
        let env = Envelope::new(EnvelopeType::StopTyping).with_user(Principal::from("alice"));
        let s = env.to_json().unwrap_or_default();
        assert_eq!(s, r#"{"type":"stop_typing","user_id":"alice"}"#);
    }

    #[test]
    fn unknown_tag_is_distinct_from_malformed() {
        assert!(matches!(
            decode_envelope(r#"{"type":"delete_everything"}"#),
            Err(RelayError::UnknownType(t)) if t == "delete_everything"
        ));
        assert!(matches!(decode_envelope("not json"), Err(RelayError::BadRequest(_))));
        assert!(matches!(decode_envelope(r#"{"conversation_id":"c1"}"#), Err(RelayError::BadRequest(_))));
    }
}
