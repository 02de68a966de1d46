//! Error types for the chat client
//!
//! Defines transport-level errors and the errors returned to callers when a
//! command is rejected. Uses thiserror for ergonomic error definitions.

use thiserror::Error;

/// Chat client errors
///
/// Transport variants are recovered internally by the reconnect loop.
/// Command variants are returned to the caller of `ChatClient`.
#[derive(Debug, Error)]
pub enum ChatError {
    /// WebSocket protocol error
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// JSON serialization/deserialization error
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// Transport could not be opened
    #[error("Connect failed: {0}")]
    Connect(String),

    /// Transport failed after it was opened
    #[error("Transport error: {0}")]
    Transport(String),

    /// The session actor is gone (all work stopped)
    #[error("Chat session closed")]
    ClientClosed,

    /// Command requires an open connection
    #[error("Not connected")]
    NotConnected,

    /// Room id was blank
    #[error("Room id must not be empty")]
    EmptyRoomId,

    /// A room is already joined
    #[error("Already in room {0}")]
    AlreadyInRoom(String),

    /// A previous join has not been answered yet
    #[error("Join of room {0} is still pending")]
    JoinPending(String),
}
