//! ChatClient handle
//!
//! Cloneable front for one `ChatSession` actor. Every method queues a command
//! on the session's ordered channel; only `join_room` and `disconnect` wait
//! for the session to answer. State is observed through a watch channel,
//! notifications through the event receiver returned by `start`.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, watch};
use tracing::Instrument;

use crate::config::ChatConfig;
use crate::error::ChatError;
use crate::event::{ChatEvent, ChatSnapshot};
use crate::message::Metadata;
use crate::session::{ChatSession, Command, Input};
use crate::transport::Connector;
use crate::types::{ConnectionState, MessageType, RoomId, SessionId};
use crate::user::Identity;

/// Handle to a running chat session
///
/// The session stops once the last clone is dropped.
#[derive(Clone)]
pub struct ChatClient {
    inner: Arc<Inner>,
}

struct Inner {
    id: SessionId,
    commands: mpsc::UnboundedSender<Input>,
    snapshot: watch::Receiver<ChatSnapshot>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        let _ = self.commands.send(Input::Shutdown);
    }
}

impl ChatClient {
    /// Spawn the session actor and return a handle plus the event receiver
    ///
    /// The session starts `Disconnected`; call `connect` to open it.
    /// Must be called within a tokio runtime.
    #[must_use = "the event receiver must be used to receive events"]
    pub fn start<C: Connector>(
        connector: C,
        identity: Identity,
        config: ChatConfig,
    ) -> (Self, mpsc::Receiver<ChatEvent>) {
        let id = SessionId::new();
        let (commands, inbox) = mpsc::unbounded_channel();
        let (snapshot_tx, snapshot) = watch::channel(ChatSnapshot::default());
        let (event_tx, event_rx) = mpsc::channel(config.event_channel_capacity.max(1));

        let span = tracing::info_span!("chat_session", session = %id, user = %identity.user_id);
        let session = ChatSession::new(
            id,
            connector,
            identity,
            config,
            inbox,
            commands.clone(),
            snapshot_tx,
            event_tx,
        );
        tokio::spawn(session.run().instrument(span));

        let client = Self {
            inner: Arc::new(Inner {
                id,
                commands,
                snapshot,
            }),
        };
        (client, event_rx)
    }

    pub fn session_id(&self) -> SessionId {
        self.inner.id
    }

    /// Open the connection (no-op if connected or connecting)
    pub fn connect(&self) -> Result<(), ChatError> {
        self.command(Command::Connect)
    }

    /// Close the connection and stop reconnecting
    ///
    /// Resolves once the session has applied it: no timer is pending
    /// afterwards and the state is `Disconnected`.
    pub async fn disconnect(&self) -> Result<(), ChatError> {
        let (done, applied) = oneshot::channel();
        self.command(Command::Disconnect { done })?;
        applied.await.map_err(|_| ChatError::ClientClosed)
    }

    /// Recover from `Failed` so that `connect` is accepted again
    pub fn reset(&self) -> Result<(), ChatError> {
        self.command(Command::Reset)
    }

    /// Ask the server to join `room_id`
    ///
    /// `Ok` means the join request was sent; the room appears in the
    /// snapshot once the server answers with `ROOM_JOINED`.
    pub async fn join_room(&self, room_id: impl Into<String>) -> Result<(), ChatError> {
        let (reply, answer) = oneshot::channel();
        self.command(Command::JoinRoom {
            room_id: RoomId::new(room_id),
            reply,
        })?;
        answer.await.map_err(|_| ChatError::ClientClosed)?
    }

    /// Leave the current room; local state is cleared immediately
    pub fn leave_room(&self) -> Result<(), ChatError> {
        self.command(Command::LeaveRoom)
    }

    /// Send a text message (dropped if no room is joined)
    pub fn send_message(&self, content: impl Into<String>) -> Result<(), ChatError> {
        self.send_message_with(content, MessageType::Text, Metadata::new())
    }

    /// Send a message of any type with metadata (dropped if no room is joined)
    pub fn send_message_with(
        &self,
        content: impl Into<String>,
        message_type: MessageType,
        metadata: Metadata,
    ) -> Result<(), ChatError> {
        self.command(Command::SendMessage {
            content: content.into(),
            message_type,
            metadata,
        })
    }

    pub fn start_typing(&self) -> Result<(), ChatError> {
        self.command(Command::StartTyping)
    }

    pub fn stop_typing(&self) -> Result<(), ChatError> {
        self.command(Command::StopTyping)
    }

    /// Escalate to a support agent; acknowledged by `ChatEvent::SupportRequestSent`
    pub fn request_support(
        &self,
        title: impl Into<String>,
        description: impl Into<String>,
    ) -> Result<(), ChatError> {
        self.command(Command::RequestSupport {
            title: title.into(),
            description: description.into(),
        })
    }

    /// Current view of the session
    pub fn snapshot(&self) -> ChatSnapshot {
        self.inner.snapshot.borrow().clone()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.inner.snapshot.borrow().connection
    }

    /// Watch the session view for changes
    pub fn subscribe(&self) -> watch::Receiver<ChatSnapshot> {
        self.inner.snapshot.clone()
    }

    fn command(&self, cmd: Command) -> Result<(), ChatError> {
        self.inner
            .commands
            .send(Input::Command(cmd))
            .map_err(|_| ChatError::ClientClosed)
    }
}

impl std::fmt::Debug for ChatClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatClient")
            .field("session", &self.inner.id)
            .field("connection", &self.connection_state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::time::Instant;

    use super::*;
    use crate::message::ClientFrame;
    use crate::transport::mock::{MockConnector, MockServer};
    use crate::types::UserId;

    fn start(connector: &MockConnector) -> (ChatClient, mpsc::Receiver<ChatEvent>) {
        ChatClient::start(
            connector.clone(),
            Identity::new("me", "Me"),
            ChatConfig::new("ws://test"),
        )
    }

    async fn wait_until(client: &ChatClient, check: impl FnMut(&ChatSnapshot) -> bool) {
        let mut rx = client.subscribe();
        rx.wait_for(check).await.map(|_| ()).unwrap();
    }

    async fn wait_for_state(client: &ChatClient, state: ConnectionState) {
        wait_until(client, |s| s.connection == state).await;
    }

    fn drain(events: &mut mpsc::Receiver<ChatEvent>) -> Vec<ChatEvent> {
        let mut out = Vec::new();
        while let Ok(event) = events.try_recv() {
            out.push(event);
        }
        out
    }

    fn message_json(id: &str, sender: &str) -> String {
        format!(
            r#"{{"id":"{id}","content":"text {id}","user_id":"{sender}","room_id":"support","message_type":"text","created_at":"2024-05-01T10:00:00Z"}}"#
        )
    }

    /// Connect and join "support" with an empty history
    async fn joined_client(
        connector: &MockConnector,
    ) -> (ChatClient, mpsc::Receiver<ChatEvent>, MockServer) {
        let mut server = connector.accept();
        let (client, events) = start(connector);
        client.connect().unwrap();
        wait_for_state(&client, ConnectionState::Connected).await;

        client.join_room("support").await.unwrap();
        assert!(matches!(
            server.next_frame().await,
            Some(ClientFrame::JoinRoom { .. })
        ));
        server.push(r#"{"type":"ROOM_JOINED","roomId":"support","messages":[]}"#);
        wait_until(&client, |s| s.room.is_some()).await;
        (client, events, server)
    }

    #[tokio::test]
    async fn test_join_room_installs_snapshot() {
        let connector = MockConnector::new();
        let mut server = connector.accept();
        let (client, mut events) = start(&connector);

        client.connect().unwrap();
        wait_for_state(&client, ConnectionState::Connected).await;
        client.join_room("support").await.unwrap();

        assert_eq!(
            server.next_frame().await,
            Some(ClientFrame::JoinRoom {
                room_id: RoomId::new("support"),
                user_id: UserId::new("me"),
            })
        );
        assert_eq!(
            client.snapshot().pending_room,
            Some(RoomId::new("support"))
        );

        server.push(format!(
            r#"{{"type":"ROOM_JOINED","roomId":"support","messages":[{},{}]}}"#,
            message_json("m1", "agent"),
            message_json("m2", "me")
        ));
        wait_until(&client, |s| s.room.is_some()).await;

        let snapshot = client.snapshot();
        let room = snapshot.room.unwrap();
        let ids: Vec<_> = room.messages.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["m1", "m2"]);
        assert!(room.roster.is_empty());
        assert!(snapshot.pending_room.is_none());
        assert!(drain(&mut events).contains(&ChatEvent::RoomJoined {
            room_id: RoomId::new("support")
        }));
    }

    #[tokio::test]
    async fn test_join_rejections() {
        let connector = MockConnector::new();
        let mut server = connector.accept();
        let (client, _events) = start(&connector);

        assert!(matches!(
            client.join_room("support").await,
            Err(ChatError::NotConnected)
        ));

        client.connect().unwrap();
        wait_for_state(&client, ConnectionState::Connected).await;

        assert!(matches!(
            client.join_room("").await,
            Err(ChatError::EmptyRoomId)
        ));
        client.join_room("support").await.unwrap();
        assert!(matches!(
            client.join_room("other").await,
            Err(ChatError::JoinPending(_))
        ));

        server.push(r#"{"type":"ROOM_JOINED","roomId":"support"}"#);
        wait_until(&client, |s| s.room.is_some()).await;
        assert!(matches!(
            client.join_room("other").await,
            Err(ChatError::AlreadyInRoom(_))
        ));

        // Only the first join went out
        assert_eq!(server.drain().len(), 1);
    }

    #[tokio::test]
    async fn test_server_error_rejects_join() {
        let connector = MockConnector::new();
        let mut server = connector.accept();
        let (client, mut events) = start(&connector);
        client.connect().unwrap();
        wait_for_state(&client, ConnectionState::Connected).await;

        client.join_room("vip").await.unwrap();
        server.next_frame().await;
        server.push(r#"{"type":"ERROR","message":"Room is closed"}"#);
        wait_until(&client, |s| s.pending_room.is_none()).await;

        let snapshot = client.snapshot();
        assert!(snapshot.room.is_none());
        assert!(snapshot.is_connected());
        assert!(drain(&mut events).contains(&ChatEvent::Error {
            message: "Room is closed".to_string()
        }));

        // Free to try again
        client.join_room("support").await.unwrap();
    }

    #[tokio::test]
    async fn test_messages_append_in_arrival_order() {
        let connector = MockConnector::new();
        let (client, mut events, server) = joined_client(&connector).await;
        drain(&mut events);

        // Out of timestamp order on purpose
        for (id, at) in [("m3", "12:00:00"), ("m1", "10:00:00"), ("m2", "11:00:00")] {
            let msg = message_json(id, "agent").replace("10:00:00", at);
            server.push(format!(r#"{{"type":"NEW_MESSAGE","message":{}}}"#, msg));
        }
        server.push(format!(
            r#"{{"type":"NEW_MESSAGE","message":{}}}"#,
            message_json("m4", "me")
        ));
        wait_until(&client, |s| {
            s.room.as_ref().map_or(false, |r| r.messages.len() == 4)
        })
        .await;

        let room = client.snapshot().room.unwrap();
        let ids: Vec<_> = room.messages.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["m3", "m1", "m2", "m4"]);

        // Only foreign messages notify
        let arrived: Vec<_> = drain(&mut events)
            .into_iter()
            .filter_map(|e| match e {
                ChatEvent::MessageArrived(m) => Some(m.id),
                _ => None,
            })
            .collect();
        assert_eq!(arrived, vec!["m3", "m1", "m2"]);
    }

    #[tokio::test]
    async fn test_send_message_without_room_is_dropped() {
        let connector = MockConnector::new();
        let mut server = connector.accept();
        let (client, _events) = start(&connector);
        client.connect().unwrap();
        wait_for_state(&client, ConnectionState::Connected).await;

        client.send_message("hi").unwrap();
        client.request_support("Help", "Order missing").unwrap();

        // The support request is the first thing on the wire
        assert_eq!(
            server.next_frame().await,
            Some(ClientFrame::RequestSupport {
                title: "Help".to_string(),
                description: "Order missing".to_string(),
            })
        );
        assert!(client.snapshot().room.is_none());
    }

    #[tokio::test]
    async fn test_send_message_is_not_echoed_locally() {
        let connector = MockConnector::new();
        let (client, _events, mut server) = joined_client(&connector).await;

        client.send_message("hi").unwrap();

        assert_eq!(
            server.next_frame().await,
            Some(ClientFrame::SendMessage {
                content: "hi".to_string(),
                message_type: MessageType::Text,
                metadata: Metadata::new(),
            })
        );
        assert!(client.snapshot().room.unwrap().messages.is_empty());
    }

    #[tokio::test]
    async fn test_leave_room_clears_immediately() {
        let connector = MockConnector::new();
        let (client, _events, mut server) = joined_client(&connector).await;
        server.push(r#"{"type":"USER_JOINED","userId":"agent"}"#);
        wait_until(&client, |s| {
            s.room.as_ref().map_or(false, |r| !r.roster.is_empty())
        })
        .await;

        client.leave_room().unwrap();

        assert_eq!(server.next_frame().await, Some(ClientFrame::LeaveRoom));
        wait_until(&client, |s| s.room.is_none()).await;
        assert!(client.snapshot().is_connected());
    }

    #[tokio::test]
    async fn test_presence_frames_update_roster() {
        let connector = MockConnector::new();
        let (client, mut events, server) = joined_client(&connector).await;
        drain(&mut events);

        server.push(r#"{"type":"USER_JOINED","userId":"me"}"#);
        server.push(r#"{"type":"USER_JOINED","userId":"u1"}"#);
        server.push(r#"{"type":"USER_LEFT","userId":"u1"}"#);
        server.push(r#"{"type":"SUPPORT_REQUEST_SENT"}"#);
        wait_until(&client, |s| {
            s.room
                .as_ref()
                .and_then(|r| r.roster.get(&UserId::new("u1")))
                .map_or(false, |u| !u.is_online)
        })
        .await;

        let room = client.snapshot().room.unwrap();
        assert_eq!(room.roster.len(), 1);
        assert!(room.roster[&UserId::new("u1")].last_seen.is_some());

        // Wait for the trailing ack to be dispatched
        let mut seen = Vec::new();
        while !seen.contains(&ChatEvent::SupportRequestSent) {
            seen.push(events.recv().await.unwrap());
        }
        assert_eq!(
            seen,
            vec![
                ChatEvent::UserJoined {
                    user_id: UserId::new("u1")
                },
                ChatEvent::SupportRequestSent,
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_remote_typing_has_no_expiry() {
        let connector = MockConnector::new();
        let (client, _events, server) = joined_client(&connector).await;
        let u1 = UserId::new("u1");
        let typing_of = |s: &ChatSnapshot| {
            s.room
                .as_ref()
                .and_then(|r| r.roster.get(&UserId::new("u1")))
                .map(|u| u.is_typing)
        };

        server.push(r#"{"type":"USER_JOINED","userId":"u1"}"#);
        server.push(r#"{"type":"USER_TYPING","userId":"u1","isTyping":true}"#);
        wait_until(&client, |s| typing_of(s) == Some(true)).await;

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(client.snapshot().room.unwrap().roster[&u1].is_typing);

        server.push(r#"{"type":"USER_TYPING","userId":"u1","isTyping":false}"#);
        wait_until(&client, |s| typing_of(s) == Some(false)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_typing_sends_one_frame_then_auto_stops() {
        let connector = MockConnector::new();
        let (client, _events, mut server) = joined_client(&connector).await;
        let start = Instant::now();

        for _ in 0..5 {
            client.start_typing().unwrap();
        }

        assert_eq!(server.next_frame().await, Some(ClientFrame::TypingStart));
        wait_until(&client, |s| s.is_typing).await;

        // Nothing else until the auto-stop fires
        assert_eq!(server.next_frame().await, Some(ClientFrame::TypingStop));
        assert_eq!(start.elapsed().as_secs(), 3);
        assert!(!client.snapshot().is_typing);

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert!(server.drain().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_explicit_stop_cancels_auto_stop() {
        let connector = MockConnector::new();
        let (client, _events, mut server) = joined_client(&connector).await;

        client.start_typing().unwrap();
        client.stop_typing().unwrap();
        client.stop_typing().unwrap();

        assert_eq!(server.next_frame().await, Some(ClientFrame::TypingStart));
        assert_eq!(server.next_frame().await, Some(ClientFrame::TypingStop));

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert!(server.drain().is_empty());
    }

    #[tokio::test]
    async fn test_malformed_and_unknown_frames_are_dropped() {
        let connector = MockConnector::new();
        let (client, _events, server) = joined_client(&connector).await;
        let before = client.snapshot();

        server.push("{not json");
        server.push(r#"{"type":"USER_JOINED"}"#);
        server.push(r#"{"type":"PRESENCE_SYNC","users":[]}"#);
        server.push(r#"{"type":"USER_JOINED","userId":"u1"}"#);
        wait_until(&client, |s| {
            s.room.as_ref().map_or(false, |r| !r.roster.is_empty())
        })
        .await;

        let after = client.snapshot();
        assert_eq!(after.connection, before.connection);
        assert_eq!(after.room.unwrap().roster.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnect_backoff_until_failed() {
        let connector = MockConnector::new();
        let server = connector.accept();
        let (client, mut events) = start(&connector);
        let start = Instant::now();

        client.connect().unwrap();
        wait_for_state(&client, ConnectionState::Connected).await;

        // Unexpected close; every later attempt is refused
        drop(server);
        wait_for_state(&client, ConnectionState::Failed).await;

        assert_eq!(connector.attempt_offsets(start), vec![0, 1, 3, 7, 15, 31]);

        // Terminal: no timer left behind
        tokio::time::sleep(Duration::from_secs(600)).await;
        assert_eq!(connector.attempt_count(), 6);
        assert!(client.snapshot().is_failed());

        // Every observed transition is a legal edge
        let mut previous = ConnectionState::Disconnected;
        let mut disconnects = 0;
        for event in drain(&mut events) {
            match event {
                ChatEvent::ConnectionChanged(next) => {
                    assert!(
                        previous.can_transition_to(next),
                        "illegal {} -> {}",
                        previous,
                        next
                    );
                    previous = next;
                }
                ChatEvent::Disconnected { .. } => disconnects += 1,
                _ => {}
            }
        }
        assert_eq!(previous, ConnectionState::Failed);
        assert_eq!(disconnects, 6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_needs_reset() {
        let connector = MockConnector::new();
        let (client, _events) = start(&connector);

        client.connect().unwrap();
        wait_for_state(&client, ConnectionState::Failed).await;
        assert_eq!(connector.attempt_count(), 6);

        // Ignored while failed
        client.connect().unwrap();
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(connector.attempt_count(), 6);

        let _server = connector.accept();
        client.reset().unwrap();
        wait_for_state(&client, ConnectionState::Disconnected).await;
        client.connect().unwrap();
        wait_for_state(&client, ConnectionState::Connected).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnect_discards_room() {
        let connector = MockConnector::new();
        let (client, mut events, server) = joined_client(&connector).await;
        let _next = connector.accept();

        drop(server);
        wait_for_state(&client, ConnectionState::Reconnecting).await;
        assert!(client.snapshot().room.is_none());

        wait_for_state(&client, ConnectionState::Connected).await;
        assert!(client.snapshot().room.is_none());
        assert!(drain(&mut events)
            .iter()
            .any(|e| matches!(e, ChatEvent::Disconnected { reason: None })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_leaves_room_and_stops_reconnecting() {
        let connector = MockConnector::new();
        let (client, mut events, mut server) = joined_client(&connector).await;

        client.start_typing().unwrap();
        assert_eq!(server.next_frame().await, Some(ClientFrame::TypingStart));

        client.disconnect().await.unwrap();

        assert_eq!(server.next_frame().await, Some(ClientFrame::LeaveRoom));
        assert_eq!(server.next_frame().await, None);

        let snapshot = client.snapshot();
        assert_eq!(snapshot.connection, ConnectionState::Disconnected);
        assert!(snapshot.room.is_none());
        assert!(!snapshot.is_typing);

        // Neither typing auto-stop nor reconnect fire later
        tokio::time::sleep(Duration::from_secs(600)).await;
        assert_eq!(connector.attempt_count(), 1);

        // Second disconnect is observably the same as the first
        drain(&mut events);
        client.disconnect().await.unwrap();
        assert!(drain(&mut events).is_empty());
        assert_eq!(client.snapshot(), snapshot);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_cancels_pending_reconnect() {
        let connector = MockConnector::new();
        let server = connector.accept();
        let (client, _events) = start(&connector);
        client.connect().unwrap();
        wait_for_state(&client, ConnectionState::Connected).await;

        drop(server);
        wait_for_state(&client, ConnectionState::Reconnecting).await;
        client.disconnect().await.unwrap();

        tokio::time::sleep(Duration::from_secs(600)).await;
        assert_eq!(connector.attempt_count(), 1);
        assert_eq!(client.connection_state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_room_joined_after_unrelated_error() {
        let connector = MockConnector::new();
        let mut server = connector.accept();
        let (client, mut events) = start(&connector);
        client.connect().unwrap();
        wait_for_state(&client, ConnectionState::Connected).await;

        client.join_room("support").await.unwrap();
        client.request_support("Help", "Order missing").unwrap();
        assert!(matches!(
            server.next_frame().await,
            Some(ClientFrame::JoinRoom { .. })
        ));
        assert!(matches!(
            server.next_frame().await,
            Some(ClientFrame::RequestSupport { .. })
        ));

        // The error answers the support request, not the join
        server.push(r#"{"type":"ERROR","message":"support unavailable"}"#);
        server.push(r#"{"type":"ROOM_JOINED","roomId":"support"}"#);
        wait_until(&client, |s| s.room.is_some()).await;

        let snapshot = client.snapshot();
        assert_eq!(snapshot.room.unwrap().room_id, RoomId::new("support"));
        assert!(snapshot.pending_room.is_none());
        let seen = drain(&mut events);
        assert!(seen.contains(&ChatEvent::Error {
            message: "support unavailable".to_string()
        }));
        assert!(seen.contains(&ChatEvent::RoomJoined {
            room_id: RoomId::new("support")
        }));
    }

    #[tokio::test]
    async fn test_room_joined_while_joined_replaces_room() {
        let connector = MockConnector::new();
        let (client, _events, server) = joined_client(&connector).await;
        server.push(format!(
            r#"{{"type":"NEW_MESSAGE","message":{}}}"#,
            message_json("m1", "agent")
        ));
        server.push(r#"{"type":"USER_JOINED","userId":"agent"}"#);

        server.push(format!(
            r#"{{"type":"ROOM_JOINED","roomId":"billing","messages":[{}]}}"#,
            message_json("m7", "agent")
        ));
        wait_until(&client, |s| {
            s.room
                .as_ref()
                .map_or(false, |r| r.room_id == RoomId::new("billing"))
        })
        .await;

        let room = client.snapshot().room.unwrap();
        let ids: Vec<_> = room.messages.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["m7"]);
        assert!(room.roster.is_empty());
    }

    #[tokio::test]
    async fn test_typing_from_unseen_user_adds_no_presence() {
        let connector = MockConnector::new();
        let (client, _events, server) = joined_client(&connector).await;

        server.push(r#"{"type":"USER_TYPING","userId":"ghost","isTyping":false}"#);
        server.push(r#"{"type":"USER_JOINED","userId":"u1"}"#);
        wait_until(&client, |s| {
            s.room.as_ref().map_or(false, |r| !r.roster.is_empty())
        })
        .await;

        let room = client.snapshot().room.unwrap();
        assert_eq!(room.roster.len(), 1);
        assert!(!room.roster.contains_key(&UserId::new("ghost")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_while_connecting_stays_disconnected() {
        let connector = MockConnector::new();
        let mut server = connector.accept();
        let gate = connector.hold();
        let (client, mut events) = start(&connector);

        client.connect().unwrap();
        wait_for_state(&client, ConnectionState::Connecting).await;
        // Attempt is parked inside the connector
        while connector.attempt_count() == 0 {
            tokio::task::yield_now().await;
        }

        client.disconnect().await.unwrap();
        gate.notify_waiters();
        tokio::time::sleep(Duration::from_secs(60)).await;

        assert_eq!(client.connection_state(), ConnectionState::Disconnected);
        assert_eq!(connector.attempt_count(), 1);
        // The transport was dropped unopened: no link ever read or wrote it
        assert_eq!(
            tokio::time::timeout(Duration::from_secs(1), server.next_frame())
                .await
                .unwrap(),
            None
        );
        let states: Vec<_> = drain(&mut events)
            .into_iter()
            .filter_map(|e| match e {
                ChatEvent::ConnectionChanged(state) => Some(state),
                _ => None,
            })
            .collect();
        assert_eq!(
            states,
            vec![ConnectionState::Connecting, ConnectionState::Disconnected]
        );
    }

    #[tokio::test]
    async fn test_connect_is_idempotent() {
        let connector = MockConnector::new();
        let _server = connector.accept();
        let (client, _events) = start(&connector);

        client.connect().unwrap();
        client.connect().unwrap();
        wait_for_state(&client, ConnectionState::Connected).await;
        client.connect().unwrap();
        client.disconnect().await.unwrap();

        assert_eq!(connector.attempt_count(), 1);
    }

    #[tokio::test]
    async fn test_typing_ignored_while_disconnected() {
        let connector = MockConnector::new();
        let (client, _events) = start(&connector);

        client.start_typing().unwrap();
        client.disconnect().await.unwrap();

        assert!(!client.snapshot().is_typing);
    }

    #[tokio::test]
    async fn test_dropping_last_handle_stops_session() {
        let connector = MockConnector::new();
        let mut server = connector.accept();
        let (client, mut events) = start(&connector);
        client.connect().unwrap();
        wait_for_state(&client, ConnectionState::Connected).await;

        let clone = client.clone();
        drop(client);
        assert_eq!(clone.connection_state(), ConnectionState::Connected);
        drop(clone);

        // Transport closed and event stream ends
        assert_eq!(server.next_frame().await, None);
        while events.recv().await.is_some() {}
    }
}
