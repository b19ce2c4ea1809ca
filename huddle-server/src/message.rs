//! Channel messages and their wire framing.
//!
//! Every websocket frame is a JSON object `{"event": <name>, "data": <payload>}`.
//! Participants send `channel-message` with `{body}`; the server delivers
//! `channel-message` with the full [`MessageEnvelope`]. A refused connection
//! receives a single `connect-error` before the socket closes.

use serde::{Deserialize, Serialize};

use crate::error::AdmissionError;
use crate::identity::Identity;
use crate::response::CanonicalResponse;

pub const CHANNEL_MESSAGE: &str = "channel-message";

/// An immutable message as relayed to channel members.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageEnvelope {
    pub sender: Identity,
    pub body: String,
    #[serde(default)]
    pub is_synthetic_assistant: bool,
}

impl MessageEnvelope {
    pub fn from_participant(sender: &Identity, body: impl Into<String>) -> Self {
        Self {
            sender: sender.clone(),
            body: body.into(),
            is_synthetic_assistant: false,
        }
    }

    /// The assistant's reply: the serialized canonical response as body.
    pub fn from_assistant(response: &CanonicalResponse) -> Self {
        Self {
            sender: Identity::assistant(),
            body: response.to_body(),
            is_synthetic_assistant: true,
        }
    }
}

/// Payload of an inbound `channel-message`. Any client-supplied sender is
/// ignored; the session's verified identity is used instead.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct InboundMessage {
    #[serde(default)]
    pub body: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectError {
    pub reason: String,
    pub message: String,
}

impl From<&AdmissionError> for ConnectError {
    fn from(err: &AdmissionError) -> Self {
        Self {
            reason: err.reason().to_string(),
            message: err.to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum InboundFrame {
    #[serde(rename = "channel-message")]
    ChannelMessage(InboundMessage),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum OutboundFrame {
    #[serde(rename = "channel-message")]
    ChannelMessage(MessageEnvelope),
    #[serde(rename = "connect-error")]
    ConnectError(ConnectError),
}

impl OutboundFrame {
    pub fn to_json(&self) -> String {
        // Both variants are plain strings and bools; serialization cannot fail.
        serde_json::to_string(self).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inbound_frame_parses() {
        let frame: InboundFrame = serde_json::from_str(
            r#"{"event":"channel-message","data":{"body":"hi","sender":{"id":"spoof"}}}"#,
        )
        .unwrap();
        let InboundFrame::ChannelMessage(msg) = frame;
        assert_eq!(msg.body.as_deref(), Some("hi"));
    }

    #[test]
    fn inbound_frame_without_body() {
        let frame: InboundFrame =
            serde_json::from_str(r#"{"event":"channel-message","data":{}}"#).unwrap();
        let InboundFrame::ChannelMessage(msg) = frame;
        assert!(msg.body.is_none());
    }

    #[test]
    fn unknown_event_is_rejected() {
        assert!(serde_json::from_str::<InboundFrame>(r#"{"event":"typing","data":{}}"#).is_err());
    }

    #[test]
    fn outbound_assistant_frame_shape() {
        let resp = CanonicalResponse::failure("Sorry", "boom");
        let frame = OutboundFrame::ChannelMessage(MessageEnvelope::from_assistant(&resp));
        let v: serde_json::Value = serde_json::from_str(&frame.to_json()).unwrap();
        assert_eq!(v["event"], CHANNEL_MESSAGE);
        assert_eq!(v["data"]["sender"]["id"], "ai");
        assert_eq!(v["data"]["sender"]["label"], "AI");
        assert_eq!(v["data"]["isSyntheticAssistant"], true);
        let body: CanonicalResponse =
            serde_json::from_str(v["data"]["body"].as_str().unwrap()).unwrap();
        assert_eq!(body, resp);
    }

    #[test]
    fn connect_error_frame_shape() {
        let frame = OutboundFrame::ConnectError((&AdmissionError::MissingCredential).into());
        let v: serde_json::Value = serde_json::from_str(&frame.to_json()).unwrap();
        assert_eq!(v["event"], "connect-error");
        assert_eq!(v["data"]["reason"], "missing credential");
    }
}
