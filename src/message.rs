//! Message protocol definitions
//!
//! JSON-based bidirectional message protocol using Serde's tagged enum
//! for type-safe serialization/deserialization.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationFailure;
use crate::types::Identity;

/// A stored chat message
///
/// Sender and timestamp are stamped by the server, never taken from the client.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatMessage {
    pub text: String,
    pub sender: Identity,
    pub datetime: DateTime<Utc>,
}

impl ChatMessage {
    /// Build a message from raw client text
    ///
    /// Trims surrounding whitespace and rejects empty text.
    pub fn new(
        text: &str,
        sender: Identity,
        datetime: DateTime<Utc>,
    ) -> Result<Self, ValidationFailure> {
        let text = text.trim();
        if text.is_empty() {
            return Err(ValidationFailure::EmptyText);
        }
        Ok(Self {
            text: text.to_string(),
            sender,
            datetime,
        })
    }
}

/// Client → Server message
///
/// Unknown fields (such as a client-claimed `sender` or `datetime`) are ignored.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientMessage {
    /// Send a chat message
    SendMessage { text: String },
    /// Indicate typing started
    Typing,
    /// Indicate typing stopped
    StopTyping,
}

/// Server → Client message
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerMessage {
    /// Credential missing or invalid, connection closes next
    AuthError,
    /// One-time history replay for a new joiner
    MessageHistory {
        history: Vec<ChatMessage>,
        sender: Identity,
        typing: Vec<Identity>,
    },
    /// Chat message broadcast
    ReceiveMessage(ChatMessage),
    /// Another user started typing
    Typing { sender: Identity },
    /// Another user stopped typing
    StopTyping { sender: Identity },
    /// Rejected input
    Error { code: ErrorCode, message: String },
}

/// Error codes for ServerMessage::Error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Message text was empty
    EmptyMessage,
    /// Invalid message format
    InvalidMessage,
}

impl From<ValidationFailure> for ServerMessage {
    fn from(err: ValidationFailure) -> Self {
        let code = match &err {
            ValidationFailure::EmptyText => ErrorCode::EmptyMessage,
            ValidationFailure::Malformed(_) => ErrorCode::InvalidMessage,
        };
        ServerMessage::Error {
            code,
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alice() -> Identity {
        Identity::parse("alice").unwrap()
    }

    #[test]
    fn test_client_message_deserialize() {
        let json = r#"{"type": "sendMessage", "text": "hi"}"#;
        let msg: ClientMessage = serde_json::from_str(json).unwrap();
        match msg {
            ClientMessage::SendMessage { text } => assert_eq!(text, "hi"),
            _ => panic!("Wrong variant"),
        }

        let msg: ClientMessage = serde_json::from_str(r#"{"type": "stopTyping"}"#).unwrap();
        assert!(matches!(msg, ClientMessage::StopTyping));
    }

    #[test]
    fn test_client_claimed_sender_is_ignored() {
        let json = r#"{"type":"sendMessage","text":"hi","sender":"mallory","datetime":"2000-01-01T00:00:00Z"}"#;
        let msg: ClientMessage = serde_json::from_str(json).unwrap();
        assert!(matches!(msg, ClientMessage::SendMessage { text } if text == "hi"));
    }

    #[test]
    fn test_chat_message_trims_and_rejects_empty() {
        let msg = ChatMessage::new("  hi \n", alice(), Utc::now()).unwrap();
        assert_eq!(msg.text, "hi");

        assert_eq!(
            ChatMessage::new("   ", alice(), Utc::now()),
            Err(ValidationFailure::EmptyText)
        );
    }

    #[test]
    fn test_receive_message_serialize() {
        let msg = ChatMessage::new("hi", alice(), Utc::now()).unwrap();
        let json: serde_json::Value =
            serde_json::to_value(ServerMessage::ReceiveMessage(msg)).unwrap();
        assert_eq!(json["type"], "receiveMessage");
        assert_eq!(json["text"], "hi");
        assert_eq!(json["sender"], "alice");
        assert!(json["datetime"].is_string());
    }

    #[test]
    fn test_history_serialize() {
        let msg = ServerMessage::MessageHistory {
            history: vec![],
            sender: alice(),
            typing: vec![],
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"type\":\"messageHistory\""));
        assert!(json.contains("\"sender\":\"alice\""));
        assert!(json.contains("\"history\":[]"));
    }

    #[test]
    fn test_auth_error_serialize() {
        let json = serde_json::to_string(&ServerMessage::AuthError).unwrap();
        assert_eq!(json, r#"{"type":"authError"}"#);
    }

    #[test]
    fn test_error_code_serialize() {
        let msg: ServerMessage = ValidationFailure::EmptyText.into();
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"code\":\"empty_message\""));
    }
}
