//! Message protocol definitions
//!
//! JSON-based bidirectional frame protocol using Serde's tagged enum for
//! type-safe serialization/deserialization. Frame tags are SCREAMING_SNAKE_CASE
//! and frame fields camelCase; messages nested in frames keep the server's
//! snake_case column names.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ChatError;
use crate::types::{MessageType, RoomId, UserId};

/// Opaque key → value mapping attached to a message
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// Profile the server attaches to a message sender
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SenderProfile {
    pub id: UserId,
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
}

/// A chat message as assigned by the server
///
/// Immutable once received. Never constructed locally for display: the only
/// source is a `NEW_MESSAGE` or `ROOM_JOINED` frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    pub content: String,
    #[serde(rename = "user_id")]
    pub sender_id: UserId,
    pub room_id: RoomId,
    #[serde(default)]
    pub message_type: MessageType,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
    #[serde(default, rename = "user", skip_serializing_if = "Option::is_none")]
    pub sender: Option<SenderProfile>,
}

/// Client → Server frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "type",
    rename_all = "SCREAMING_SNAKE_CASE",
    rename_all_fields = "camelCase"
)]
pub enum ClientFrame {
    /// Join a room as the given user
    JoinRoom { room_id: RoomId, user_id: UserId },
    /// Leave the current room
    LeaveRoom,
    /// Post a message to the current room
    SendMessage {
        content: String,
        message_type: MessageType,
        metadata: Metadata,
    },
    /// Local user started typing
    TypingStart,
    /// Local user stopped typing
    TypingStop,
    /// Escalate the conversation to a support agent
    RequestSupport { title: String, description: String },
}

impl ClientFrame {
    /// Serialize to the wire representation
    pub fn encode(&self) -> Result<String, ChatError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Wire tag, for logging
    pub fn kind(&self) -> &'static str {
        match self {
            ClientFrame::JoinRoom { .. } => "JOIN_ROOM",
            ClientFrame::LeaveRoom => "LEAVE_ROOM",
            ClientFrame::SendMessage { .. } => "SEND_MESSAGE",
            ClientFrame::TypingStart => "TYPING_START",
            ClientFrame::TypingStop => "TYPING_STOP",
            ClientFrame::RequestSupport { .. } => "REQUEST_SUPPORT",
        }
    }
}

/// Server → Client frame
///
/// Closed set of frames the dispatcher understands. Any other `type` tag
/// decodes to `Unrecognized` instead of failing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "type",
    rename_all = "SCREAMING_SNAKE_CASE",
    rename_all_fields = "camelCase"
)]
pub enum ServerFrame {
    /// Join accepted, with the room's history
    RoomJoined {
        room_id: RoomId,
        #[serde(default)]
        messages: Vec<ChatMessage>,
    },
    /// A message was posted to the room
    NewMessage { message: ChatMessage },
    /// A participant came online
    UserJoined { user_id: UserId },
    /// A participant went offline
    UserLeft { user_id: UserId },
    /// A participant's typing flag changed
    UserTyping { user_id: UserId, is_typing: bool },
    /// Support request accepted by the server
    SupportRequestSent,
    /// Server rejected an operation
    Error {
        #[serde(default)]
        message: String,
    },
    /// Any frame type this client does not know
    #[serde(other)]
    Unrecognized,
}

impl ServerFrame {
    /// Parse a frame from its wire representation
    pub fn decode(text: &str) -> Result<Self, ChatError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Wire tag, for logging
    pub fn kind(&self) -> &'static str {
        match self {
            ServerFrame::RoomJoined { .. } => "ROOM_JOINED",
            ServerFrame::NewMessage { .. } => "NEW_MESSAGE",
            ServerFrame::UserJoined { .. } => "USER_JOINED",
            ServerFrame::UserLeft { .. } => "USER_LEFT",
            ServerFrame::UserTyping { .. } => "USER_TYPING",
            ServerFrame::SupportRequestSent => "SUPPORT_REQUEST_SENT",
            ServerFrame::Error { .. } => "ERROR",
            ServerFrame::Unrecognized => "UNRECOGNIZED",
        }
    }
}
