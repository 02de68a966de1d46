//! Typing coordination
//!
//! Local typing is debounced into a single START/STOP pair per burst, with an
//! auto-stop after a period of silence. Remote typing is frame-driven only:
//! a peer stays typing until the next `USER_TYPING` frame for them.

use std::time::Duration;

use tokio::sync::mpsc;

use crate::room::RoomSlot;
use crate::timer::Timer;
use crate::types::UserId;

#[derive(Debug)]
pub struct TypingCoordinator {
    timeout: Duration,
    active: bool,
    auto_stop: Timer,
}

impl TypingCoordinator {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            active: false,
            auto_stop: Timer::new(),
        }
    }

    pub fn is_typing(&self) -> bool {
        self.active
    }

    /// Mark the local user typing
    ///
    /// Returns true only on the idle → typing transition, i.e. when a
    /// `TYPING_START` frame must go out. The auto-stop is armed then and is
    /// not pushed back by repeated calls.
    pub fn start<T, F>(&mut self, tx: &mpsc::UnboundedSender<T>, expired: F) -> bool
    where
        T: Send + 'static,
        F: FnOnce(u64) -> T + Send + 'static,
    {
        if self.active {
            return false;
        }
        self.active = true;
        self.auto_stop.arm(self.timeout, tx, expired);
        true
    }

    /// Mark the local user idle
    ///
    /// Returns true when a `TYPING_STOP` frame must go out.
    pub fn stop(&mut self) -> bool {
        if !self.active {
            return false;
        }
        self.active = false;
        self.auto_stop.cancel();
        true
    }

    /// Handle an auto-stop expiry
    ///
    /// Stale expiries (from a burst that was already stopped) return false.
    pub fn expire(&mut self, generation: u64) -> bool {
        if !self.auto_stop.fire(generation) {
            return false;
        }
        self.stop()
    }

    /// Drop local typing without sending anything (connection gone)
    pub fn reset(&mut self) {
        self.active = false;
        self.auto_stop.cancel();
    }

    pub fn has_pending_timer(&self) -> bool {
        self.auto_stop.is_armed()
    }
}

/// Apply a peer's `USER_TYPING` frame to the joined room
///
/// Only existing roster entries are updated. Returns false if no room is
/// joined or the user is unknown.
pub fn apply_remote_typing(rooms: &mut RoomSlot, user_id: &UserId, is_typing: bool) -> bool {
    match rooms.joined_mut() {
        Some(room) => room.user_typing(user_id, is_typing),
        None => false,
    }
}
