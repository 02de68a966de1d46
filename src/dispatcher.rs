//! Inbound frame routing
//!
//! Each `ServerFrame` variant is handled by exactly one component: room
//! frames by the room slot, `USER_TYPING` by the typing coordinator, and
//! `ERROR` / `SUPPORT_REQUEST_SENT` are forwarded to the caller as events.

use chrono::Utc;
use tracing::debug;

use crate::event::ChatEvent;
use crate::message::ServerFrame;
use crate::room::RoomSlot;
use crate::typing;
use crate::types::UserId;

/// Apply one decoded frame, returning the notification it produces, if any
pub fn dispatch(frame: ServerFrame, local_user: &UserId, rooms: &mut RoomSlot) -> Option<ChatEvent> {
    match frame {
        ServerFrame::RoomJoined { room_id, messages } => {
            debug!("Joined room {} with {} messages", room_id, messages.len());
            if !rooms.complete_join(room_id.clone(), messages) {
                debug!("ROOM_JOINED for {} without a pending join", room_id);
            }
            Some(ChatEvent::RoomJoined { room_id })
        }
        ServerFrame::NewMessage { message } => {
            let Some(room) = rooms.joined_mut() else {
                debug!("Dropping message {}: no room joined", message.id);
                return None;
            };
            let foreign = message.sender_id != *local_user;
            let event = foreign.then(|| ChatEvent::MessageArrived(message.clone()));
            room.append(message);
            event
        }
        ServerFrame::UserJoined { user_id } => {
            if user_id == *local_user {
                return None;
            }
            let room = rooms.joined_mut()?;
            room.user_joined(user_id.clone());
            Some(ChatEvent::UserJoined { user_id })
        }
        ServerFrame::UserLeft { user_id } => {
            if let Some(room) = rooms.joined_mut() {
                if !room.user_left(&user_id, Utc::now()) {
                    debug!("USER_LEFT for unknown user {}", user_id);
                }
            }
            None
        }
        ServerFrame::UserTyping { user_id, is_typing } => {
            if !typing::apply_remote_typing(rooms, &user_id, is_typing) {
                debug!("USER_TYPING for unknown user {}", user_id);
            }
            None
        }
        ServerFrame::SupportRequestSent => Some(ChatEvent::SupportRequestSent),
        ServerFrame::Error { message } => {
            // A refused join leaves no room behind
            if let Some(room_id) = rooms.reject_pending() {
                debug!("Join of {} rejected", room_id);
            }
            Some(ChatEvent::Error { message })
        }
        ServerFrame::Unrecognized => {
            debug!("Ignoring unrecognized frame");
            None
        }
    }
}
