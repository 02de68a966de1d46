//! Participant definitions
//!
//! `Identity` is the local user as supplied by the caller; `ChatUser` is a
//! remote participant's presence and typing state in the joined room.

use chrono::{DateTime, Utc};

use crate::types::UserId;

/// The local user, resolved by the caller's identity provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: UserId,
    pub display_name: String,
}

impl Identity {
    pub fn new(user_id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            user_id: UserId::new(user_id),
            display_name: display_name.into(),
        }
    }
}

/// Presence and typing state of one participant
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatUser {
    pub user_id: UserId,
    pub is_online: bool,
    pub is_typing: bool,
    pub last_seen: Option<DateTime<Utc>>,
}

impl ChatUser {
    /// Create an online, idle participant
    pub fn online(user_id: UserId) -> Self {
        Self {
            user_id,
            is_online: true,
            is_typing: false,
            last_seen: None,
        }
    }

    /// Mark the participant back online
    pub fn set_online(&mut self) {
        self.is_online = true;
    }

    /// Mark the participant offline
    ///
    /// A user who left cannot still be typing.
    pub fn set_offline(&mut self, at: DateTime<Utc>) {
        self.is_online = false;
        self.is_typing = false;
        self.last_seen = Some(at);
    }

    /// Set typing status
    pub fn set_typing(&mut self, is_typing: bool) {
        self.is_typing = is_typing;
    }
}
