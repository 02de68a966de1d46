//! Live Chat Session Client Library
//!
//! Client side of a real-time customer-support chat: one WebSocket
//! connection to the chat endpoint, at most one joined room, typing
//! indicators and support escalation, with automatic reconnection.
//!
//! # Features
//! - Connection lifecycle with exponential-backoff reconnect
//! - Room join with history snapshot and live message log
//! - Presence roster (joined / left / typing)
//! - Debounced local typing with auto-stop
//! - Support requests
//!
//! # Architecture
//! Uses the Actor pattern with `mpsc` channels:
//! - `ChatSession` is the actor that owns all session state
//! - `ChatClient` is the cloneable handle that sends it commands
//! - Each open connection runs in a `link` task feeding frames back
//! - Timers report expiries on the same channel, so there are no locks
//!
//! # Example
//! ```ignore
//! use live_chat_client::{ChatClient, ChatConfig, Identity, WebSocketConnector};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), live_chat_client::ChatError> {
//!     let config = ChatConfig::new("wss://chat.example.com/ws");
//!     let connector = WebSocketConnector::new(config.url.clone());
//!     let (client, mut events) = ChatClient::start(connector, Identity::new("u-42", "Ana"), config);
//!
//!     client.connect()?;
//!     client.subscribe().wait_for(|s| s.is_connected()).await.ok();
//!     client.join_room("support").await?;
//!     client.send_message("Hello")?;
//!
//!     while let Some(event) = events.recv().await {
//!         println!("{:?}", event);
//!     }
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod event;
pub mod link;
pub mod message;
pub mod room;
mod session;
pub mod timer;
pub mod transport;
pub mod types;
pub mod typing;
pub mod user;

// Re-export main types for convenience
pub use client::ChatClient;
pub use config::{ChatConfig, ReconnectPolicy};
pub use error::ChatError;
pub use event::{ChatEvent, ChatSnapshot};
pub use message::{ChatMessage, ClientFrame, Metadata, SenderProfile, ServerFrame};
pub use room::RoomSession;
pub use transport::{Connector, Transport, WebSocketConnector};
pub use types::{ConnectionState, MessageType, RoomId, SessionId, UserId};
pub use user::{ChatUser, Identity};
