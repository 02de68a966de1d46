//! Transport abstraction
//!
//! The session only exchanges JSON text frames, so a transport is anything
//! that can send and receive strings. `Connector` opens a fresh transport for
//! every connection epoch. The WebSocket implementation is built on
//! tokio-tungstenite.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, info};

use crate::error::ChatError;

/// One open connection carrying text frames
#[async_trait]
pub trait Transport: Send + 'static {
    /// Send one text frame
    async fn send(&mut self, text: String) -> Result<(), ChatError>;

    /// Receive the next text frame
    ///
    /// `None` means the peer closed the connection. Must be cancel safe: the
    /// link drops a pending `recv` whenever an outbound frame is ready.
    async fn recv(&mut self) -> Option<Result<String, ChatError>>;

    /// Close the connection
    async fn close(&mut self) -> Result<(), ChatError>;
}

/// Opens transports to the chat endpoint
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    type Transport: Transport;

    async fn connect(&self) -> Result<Self::Transport, ChatError>;
}

pub type BoxTransport = Box<dyn Transport>;

/// Connects to a WebSocket endpoint (`ws://` or `wss://`)
#[derive(Debug, Clone)]
pub struct WebSocketConnector {
    url: String,
}

impl WebSocketConnector {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

#[async_trait]
impl Connector for WebSocketConnector {
    type Transport = WebSocketTransport;

    async fn connect(&self) -> Result<Self::Transport, ChatError> {
        debug!("Opening WebSocket to {}", self.url);
        let (stream, response) = tokio_tungstenite::connect_async(self.url.as_str()).await?;
        info!("WebSocket open ({})", response.status());
        Ok(WebSocketTransport { stream })
    }
}

/// tokio-tungstenite client stream
pub struct WebSocketTransport {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn send(&mut self, text: String) -> Result<(), ChatError> {
        self.stream.send(Message::Text(text.into())).await?;
        Ok(())
    }

    async fn recv(&mut self) -> Option<Result<String, ChatError>> {
        while let Some(msg_result) = self.stream.next().await {
            match msg_result {
                Ok(Message::Text(text)) => return Some(Ok(text.to_string())),
                Ok(Message::Close(frame)) => {
                    debug!("Server sent close frame: {:?}", frame);
                    return None;
                }
                Ok(Message::Ping(_)) => {
                    // Pong is handled automatically by tungstenite
                    debug!("Ping from server");
                }
                Ok(Message::Pong(_)) => {
                    debug!("Pong from server");
                }
                Ok(_) => {
                    // Binary or raw frames are not part of the protocol
                    debug!("Ignoring non-text WebSocket message");
                }
                Err(e) => return Some(Err(e.into())),
            }
        }
        None
    }

    async fn close(&mut self) -> Result<(), ChatError> {
        self.stream.close(None).await?;
        Ok(())
    }
}
