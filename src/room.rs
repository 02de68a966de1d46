//! Room session definition
//!
//! The joined room as seen by this client: its message log and roster.
//! Exists only while connected and joined.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::error::ChatError;
use crate::message::ChatMessage;
use crate::types::{RoomId, UserId};
use crate::user::ChatUser;

/// Joined chat room
///
/// `messages` is append-only in arrival order. Roster entries are never
/// removed; departed users stay with `is_online == false`.
#[derive(Debug, Clone, PartialEq)]
pub struct RoomSession {
    /// Room this session belongs to
    pub room_id: RoomId,
    /// Messages in arrival order
    pub messages: Vec<ChatMessage>,
    /// Known participants by user id
    pub roster: HashMap<UserId, ChatUser>,
}

impl RoomSession {
    /// Create a session from the server's join snapshot
    pub fn from_snapshot(room_id: RoomId, messages: Vec<ChatMessage>) -> Self {
        Self {
            room_id,
            messages,
            roster: HashMap::new(),
        }
    }

    /// Append a message as it arrived
    pub fn append(&mut self, message: ChatMessage) {
        self.messages.push(message);
    }

    /// Mark a participant online, adding them if unseen
    pub fn user_joined(&mut self, user_id: UserId) {
        self.roster
            .entry(user_id.clone())
            .and_modify(ChatUser::set_online)
            .or_insert_with(|| ChatUser::online(user_id));
    }

    /// Mark a known participant offline
    ///
    /// Returns false if the user was never seen.
    pub fn user_left(&mut self, user_id: &UserId, at: DateTime<Utc>) -> bool {
        match self.roster.get_mut(user_id) {
            Some(user) => {
                user.set_offline(at);
                true
            }
            None => false,
        }
    }

    /// Record a known participant's typing flag
    ///
    /// Returns false if the user was never seen; no entry is created.
    pub fn user_typing(&mut self, user_id: &UserId, is_typing: bool) -> bool {
        match self.roster.get_mut(user_id) {
            Some(user) => {
                user.set_typing(is_typing);
                true
            }
            None => false,
        }
    }

    /// Participants currently typing
    pub fn typing_users(&self) -> impl Iterator<Item = &UserId> {
        self.roster
            .values()
            .filter(|user| user.is_typing)
            .map(|user| &user.user_id)
    }

    /// Get the number of participants currently online
    pub fn online_count(&self) -> usize {
        self.roster.values().filter(|user| user.is_online).count()
    }
}

/// Join state of a session: at most one room, joined or pending
///
/// `revision` moves on every mutation so observers can skip unchanged rooms.
#[derive(Debug, Default)]
pub struct RoomSlot {
    joined: Option<RoomSession>,
    pending: Option<RoomId>,
    revision: u64,
}

impl RoomSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve the slot for a join of `room_id`
    ///
    /// Joins are not queued: a second join before the first is answered
    /// is rejected.
    pub fn begin_join(&mut self, room_id: &RoomId) -> Result<(), ChatError> {
        if room_id.is_empty() {
            return Err(ChatError::EmptyRoomId);
        }
        if let Some(room) = &self.joined {
            return Err(ChatError::AlreadyInRoom(room.room_id.to_string()));
        }
        if let Some(pending) = &self.pending {
            return Err(ChatError::JoinPending(pending.to_string()));
        }
        self.pending = Some(room_id.clone());
        self.touch();
        Ok(())
    }

    /// Install the server's snapshot, replacing any joined room wholesale
    ///
    /// Clears the pending join. Returns false if none was pending.
    pub fn complete_join(&mut self, room_id: RoomId, messages: Vec<ChatMessage>) -> bool {
        let was_pending = self.pending.take().is_some();
        self.joined = Some(RoomSession::from_snapshot(room_id, messages));
        self.touch();
        was_pending
    }

    /// Drop the pending join after the server refused it
    pub fn reject_pending(&mut self) -> Option<RoomId> {
        let pending = self.pending.take();
        if pending.is_some() {
            self.touch();
        }
        pending
    }

    /// Forget the room, joined or pending
    ///
    /// Returns true if there was anything to leave.
    pub fn leave(&mut self) -> bool {
        let had_room = self.joined.is_some() || self.pending.is_some();
        if had_room {
            self.joined = None;
            self.pending = None;
            self.touch();
        }
        had_room
    }

    pub fn joined(&self) -> Option<&RoomSession> {
        self.joined.as_ref()
    }

    /// Mutable access to the joined room; counts as a change
    pub fn joined_mut(&mut self) -> Option<&mut RoomSession> {
        if self.joined.is_some() {
            self.touch();
        }
        self.joined.as_mut()
    }

    pub fn pending(&self) -> Option<&RoomId> {
        self.pending.as_ref()
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    fn touch(&mut self) {
        self.revision = self.revision.wrapping_add(1);
    }
}
