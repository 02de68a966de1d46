//! Cancellable scheduled tasks
//!
//! A `Timer` posts a message back into the owning actor's channel after a
//! delay. Each arm gets a fresh generation; the actor only acts on a fired
//! message whose generation is still current, so a timer that was cancelled
//! after its message was already queued is a detected no-op.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

#[derive(Debug, Default)]
pub struct Timer {
    generation: u64,
    handle: Option<JoinHandle<()>>,
}

impl Timer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule `fire(generation)` to be sent on `tx` after `delay`
    ///
    /// Any previously armed schedule is cancelled first.
    pub fn arm<T, F>(&mut self, delay: Duration, tx: &mpsc::UnboundedSender<T>, fire: F)
    where
        T: Send + 'static,
        F: FnOnce(u64) -> T + Send + 'static,
    {
        self.cancel();
        let generation = self.generation;
        let tx = tx.clone();
        self.handle = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            // Receiver gone means the actor stopped; nothing to do.
            let _ = tx.send(fire(generation));
        }));
    }

    /// Cancel the pending schedule, if any
    ///
    /// Returns true if something was pending.
    pub fn cancel(&mut self) -> bool {
        self.generation = self.generation.wrapping_add(1);
        match self.handle.take() {
            Some(handle) => {
                handle.abort();
                true
            }
            None => false,
        }
    }

    /// Accept a fired message
    ///
    /// Returns true and disarms if `generation` is the live schedule;
    /// false for anything stale.
    pub fn fire(&mut self, generation: u64) -> bool {
        if self.handle.is_some() && generation == self.generation {
            self.handle = None;
            true
        } else {
            false
        }
    }

    pub fn is_armed(&self) -> bool {
        self.handle.is_some()
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}
