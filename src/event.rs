//! What the presentation layer receives
//!
//! `ChatSnapshot` is the observable state, published on a watch channel after
//! every change. `ChatEvent`s are discrete, fire-and-forget notifications.

use std::sync::Arc;

use crate::message::ChatMessage;
use crate::room::RoomSession;
use crate::types::{ConnectionState, RoomId, UserId};

/// Current view of the session
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChatSnapshot {
    pub connection: ConnectionState,
    /// Joined room, if any; shared with the session until it next changes
    pub room: Option<Arc<RoomSession>>,
    /// Room whose join is awaiting the server's answer
    pub pending_room: Option<RoomId>,
    /// Whether the local user is marked typing
    pub is_typing: bool,
}

impl ChatSnapshot {
    pub fn is_connected(&self) -> bool {
        self.connection == ConnectionState::Connected
    }

    /// Exhausted reconnects; needs `reset()` to recover
    pub fn is_failed(&self) -> bool {
        self.connection == ConnectionState::Failed
    }
}

/// One-shot notification for the caller
#[derive(Debug, Clone, PartialEq)]
pub enum ChatEvent {
    /// Connection state moved along one edge of its lifecycle
    ConnectionChanged(ConnectionState),
    /// The transport failed to open or closed under us
    Disconnected { reason: Option<String> },
    /// Server accepted the join
    RoomJoined { room_id: RoomId },
    /// A message from someone else was posted
    MessageArrived(ChatMessage),
    /// A participant came online
    UserJoined { user_id: UserId },
    /// Server acknowledged a support request
    SupportRequestSent,
    /// Server rejected an operation
    Error { message: String },
}
