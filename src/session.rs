//! ChatSession actor implementation
//!
//! The single owner of a chat session's state: connection lifecycle, the
//! open link, the room slot and the typing coordinator. Caller commands,
//! link events and timer expiries all arrive on one ordered channel and are
//! applied one at a time, so no two mutations ever interleave.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::ChatConfig;
use crate::dispatcher;
use crate::error::ChatError;
use crate::event::{ChatEvent, ChatSnapshot};
use crate::link::{Link, LinkEvent};
use crate::message::{ClientFrame, Metadata, ServerFrame};
use crate::room::RoomSlot;
use crate::timer::Timer;
use crate::transport::{BoxTransport, Connector};
use crate::types::{ConnectionState, MessageType, RoomId, SessionId};
use crate::typing::TypingCoordinator;
use crate::user::Identity;

/// Commands sent from the `ChatClient` handle to the session
#[derive(Debug)]
pub enum Command {
    Connect,
    Disconnect {
        done: oneshot::Sender<()>,
    },
    /// Leave `Failed` so the caller can connect again
    Reset,
    JoinRoom {
        room_id: RoomId,
        reply: oneshot::Sender<Result<(), ChatError>>,
    },
    LeaveRoom,
    SendMessage {
        content: String,
        message_type: MessageType,
        metadata: Metadata,
    },
    StartTyping,
    StopTyping,
    RequestSupport {
        title: String,
        description: String,
    },
}

/// Everything the session reacts to, in arrival order
pub enum Input {
    Command(Command),
    /// Outcome of the connect attempt of `epoch`
    Opened {
        epoch: u64,
        result: Result<BoxTransport, ChatError>,
    },
    Link(LinkEvent),
    ReconnectDue {
        generation: u64,
    },
    TypingExpired {
        generation: u64,
    },
    /// Last client handle dropped
    Shutdown,
}

impl From<LinkEvent> for Input {
    fn from(event: LinkEvent) -> Self {
        Input::Link(event)
    }
}

impl From<Command> for Input {
    fn from(cmd: Command) -> Self {
        Input::Command(cmd)
    }
}

/// The chat session actor
pub struct ChatSession<C: Connector> {
    id: SessionId,
    identity: Identity,
    config: ChatConfig,
    connector: Arc<C>,
    state: ConnectionState,
    /// Bumped on every connect and disconnect; tags link events
    epoch: u64,
    /// Consecutive reconnect attempts since the last successful open
    attempt: u32,
    connecting: Option<JoinHandle<()>>,
    link: Option<Link>,
    rooms: RoomSlot,
    typing: TypingCoordinator,
    reconnect: Timer,
    inbox: mpsc::UnboundedReceiver<Input>,
    /// Handed to link, timer and connect tasks to report back
    loopback: mpsc::UnboundedSender<Input>,
    snapshot: watch::Sender<ChatSnapshot>,
    /// Room revision last copied into the snapshot
    published_revision: u64,
    events: mpsc::Sender<ChatEvent>,
}

impl<C: Connector> ChatSession<C> {
    /// Create a new session
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: SessionId,
        connector: C,
        identity: Identity,
        config: ChatConfig,
        inbox: mpsc::UnboundedReceiver<Input>,
        loopback: mpsc::UnboundedSender<Input>,
        snapshot: watch::Sender<ChatSnapshot>,
        events: mpsc::Sender<ChatEvent>,
    ) -> Self {
        let typing = TypingCoordinator::new(config.typing_timeout);
        Self {
            id,
            identity,
            config,
            connector: Arc::new(connector),
            state: ConnectionState::Disconnected,
            epoch: 0,
            attempt: 0,
            connecting: None,
            link: None,
            rooms: RoomSlot::new(),
            typing,
            reconnect: Timer::new(),
            inbox,
            loopback,
            published_revision: 0,
            snapshot,
            events,
        }
    }

    /// Run the session event loop
    ///
    /// Processes inputs until the last client handle is dropped.
    pub async fn run(mut self) {
        info!("Chat session {} started for {}", self.id, self.identity.user_id);

        while let Some(input) = self.inbox.recv().await {
            if matches!(input, Input::Shutdown) {
                break;
            }
            self.handle_input(input);
            self.publish();
        }

        self.handle_disconnect();
        self.publish();
        info!("Chat session {} stopped", self.id);
    }

    fn handle_input(&mut self, input: Input) {
        match input {
            Input::Command(cmd) => self.handle_command(cmd),
            Input::Opened { epoch, result } => self.handle_opened(epoch, result),
            Input::Link(LinkEvent::Frame { epoch, text }) => self.handle_frame(epoch, &text),
            Input::Link(LinkEvent::Closed { epoch, reason }) => self.handle_closed(epoch, reason),
            Input::ReconnectDue { generation } => self.handle_reconnect_due(generation),
            Input::TypingExpired { generation } => {
                if self.typing.expire(generation) {
                    debug!("Typing auto-stop");
                    self.send(ClientFrame::TypingStop);
                }
            }
            Input::Shutdown => {}
        }
    }

    /// Process a single command
    fn handle_command(&mut self, cmd: Command) {
        match cmd {
            Command::Connect => self.handle_connect(),
            Command::Disconnect { done } => {
                self.handle_disconnect();
                let _ = done.send(());
            }
            Command::Reset => self.handle_reset(),
            Command::JoinRoom { room_id, reply } => {
                let _ = reply.send(self.handle_join_room(room_id));
            }
            Command::LeaveRoom => self.handle_leave_room(),
            Command::SendMessage {
                content,
                message_type,
                metadata,
            } => self.handle_send_message(content, message_type, metadata),
            Command::StartTyping => self.handle_start_typing(),
            Command::StopTyping => {
                if self.typing.stop() {
                    self.send(ClientFrame::TypingStop);
                }
            }
            Command::RequestSupport { title, description } => {
                if self.state != ConnectionState::Connected {
                    debug!("Dropping support request: not connected");
                    return;
                }
                self.send(ClientFrame::RequestSupport { title, description });
            }
        }
    }

    // Connection lifecycle

    fn handle_connect(&mut self) {
        if self.state.is_active() {
            debug!("Connect ignored: already {}", self.state);
            return;
        }
        if self.state == ConnectionState::Failed {
            debug!("Connect ignored: session failed, reset required");
            return;
        }

        self.reconnect.cancel();
        self.epoch += 1;
        self.set_state(ConnectionState::Connecting);

        let epoch = self.epoch;
        let connector = Arc::clone(&self.connector);
        let loopback = self.loopback.clone();
        self.connecting = Some(tokio::spawn(async move {
            let result = connector
                .connect()
                .await
                .map(|transport| Box::new(transport) as BoxTransport);
            // Session gone means nobody is waiting for this epoch
            let _ = loopback.send(Input::Opened { epoch, result });
        }));
    }

    fn handle_opened(&mut self, epoch: u64, result: Result<BoxTransport, ChatError>) {
        if epoch != self.epoch || self.state != ConnectionState::Connecting {
            debug!("Discarding connect outcome of stale epoch {}", epoch);
            return;
        }
        self.connecting = None;

        match result {
            Ok(transport) => {
                self.link = Some(Link::spawn(epoch, transport, self.loopback.clone()));
                self.attempt = 0;
                self.set_state(ConnectionState::Connected);
            }
            Err(e) => {
                warn!("Connect attempt failed: {}", e);
                self.connection_lost(Some(e.to_string()));
            }
        }
    }

    fn handle_closed(&mut self, epoch: u64, reason: Option<String>) {
        if epoch != self.epoch || self.state != ConnectionState::Connected {
            debug!("Ignoring close of stale epoch {}", epoch);
            return;
        }
        info!(
            "Connection closed: {}",
            reason.as_deref().unwrap_or("closed by server")
        );
        self.connection_lost(reason);
    }

    /// Tear down the epoch and either schedule a reconnect or give up
    fn connection_lost(&mut self, reason: Option<String>) {
        self.link = None;
        self.rooms.leave();
        self.typing.reset();
        self.emit(ChatEvent::Disconnected { reason });

        let policy = self.config.reconnect;
        if policy.allows(self.attempt) {
            let delay = policy.backoff(self.attempt);
            self.attempt += 1;
            info!(
                "Reconnect attempt {}/{} in {:?}",
                self.attempt, policy.max_attempts, delay
            );
            self.reconnect.arm(delay, &self.loopback, |generation| {
                Input::ReconnectDue { generation }
            });
            self.set_state(ConnectionState::Reconnecting);
        } else {
            error!("Giving up after {} reconnect attempts", self.attempt);
            self.set_state(ConnectionState::Failed);
        }
    }

    fn handle_reconnect_due(&mut self, generation: u64) {
        if !self.reconnect.fire(generation) {
            debug!("Ignoring stale reconnect timer");
            return;
        }
        if self.state != ConnectionState::Reconnecting {
            return;
        }
        self.handle_connect();
    }

    fn handle_disconnect(&mut self) {
        if self.rooms.joined().is_some() {
            // Best effort; a dead link just drops it
            self.send(ClientFrame::LeaveRoom);
        }

        self.reconnect.cancel();
        self.typing.reset();
        if let Some(task) = self.connecting.take() {
            task.abort();
        }
        // Dropping the link flushes LEAVE_ROOM and closes the transport
        self.link = None;
        self.rooms.leave();
        // Late events from the old epoch must not match
        self.epoch += 1;
        self.attempt = 0;

        self.set_state(ConnectionState::Disconnected);
    }

    fn handle_reset(&mut self) {
        if self.state != ConnectionState::Failed {
            debug!("Reset ignored: session is {}", self.state);
            return;
        }
        self.attempt = 0;
        self.set_state(ConnectionState::Disconnected);
    }

    // Room session

    fn handle_join_room(&mut self, room_id: RoomId) -> Result<(), ChatError> {
        if self.state != ConnectionState::Connected {
            return Err(ChatError::NotConnected);
        }
        self.rooms.begin_join(&room_id)?;

        info!("Joining room {}", room_id);
        self.send(ClientFrame::JoinRoom {
            room_id,
            user_id: self.identity.user_id.clone(),
        });
        Ok(())
    }

    fn handle_leave_room(&mut self) {
        if !self.rooms.leave() {
            debug!("Leave ignored: not in a room");
            return;
        }
        info!("Left room");
        self.send(ClientFrame::LeaveRoom);
    }

    fn handle_send_message(&mut self, content: String, message_type: MessageType, metadata: Metadata) {
        if self.rooms.joined().is_none() {
            debug!("Dropping message: not in a room");
            return;
        }
        self.send(ClientFrame::SendMessage {
            content,
            message_type,
            metadata,
        });
    }

    fn handle_start_typing(&mut self) {
        if self.state != ConnectionState::Connected {
            debug!("Typing ignored: not connected");
            return;
        }
        if self
            .typing
            .start(&self.loopback, |generation| Input::TypingExpired { generation })
        {
            self.send(ClientFrame::TypingStart);
        }
    }

    // Inbound frames

    fn handle_frame(&mut self, epoch: u64, text: &str) {
        if epoch != self.epoch || self.state != ConnectionState::Connected {
            debug!("Dropping frame from stale epoch {}", epoch);
            return;
        }

        let frame = match ServerFrame::decode(text) {
            Ok(frame) => frame,
            Err(e) => {
                warn!("Dropping malformed frame: {}", e);
                return;
            }
        };
        debug!("Received {}", frame.kind());

        if let Some(event) = dispatcher::dispatch(frame, &self.identity.user_id, &mut self.rooms) {
            self.emit(event);
        }
    }

    // Outputs

    /// Write one frame to the open link
    ///
    /// No-op when the transport is not open.
    fn send(&self, frame: ClientFrame) {
        let Some(link) = self.link.as_ref() else {
            debug!("Dropping {}: transport not open", frame.kind());
            return;
        };
        match frame.encode() {
            Ok(text) => {
                if !link.send(text) {
                    debug!("Dropping {}: link stopped", frame.kind());
                }
            }
            Err(e) => error!("Failed to serialize {}: {}", frame.kind(), e),
        }
    }

    fn set_state(&mut self, next: ConnectionState) {
        if self.state == next {
            return;
        }
        if !self.state.can_transition_to(next) {
            warn!("Unexpected transition {} -> {}", self.state, next);
        }
        info!("Connection {} -> {}", self.state, next);
        self.state = next;
        self.emit(ChatEvent::ConnectionChanged(next));
    }

    /// Forward an event; drop it with a warning if the caller is not keeping up
    fn emit(&self, event: ChatEvent) {
        match self.events.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(dropped)) => {
                warn!("Event channel full, dropping {:?}", dropped);
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!("Event receiver dropped");
            }
        }
    }

    /// Bring the watched snapshot up to date
    ///
    /// The room is only copied when the slot's revision moved.
    fn publish(&mut self) {
        let revision = self.rooms.revision();
        let room = (revision != self.published_revision).then(|| {
            (
                self.rooms.joined().cloned().map(Arc::new),
                self.rooms.pending().cloned(),
            )
        });
        self.published_revision = revision;

        let connection = self.state;
        let is_typing = self.typing.is_typing();
        self.snapshot.send_if_modified(|current| {
            let mut modified = false;
            if let Some((room, pending_room)) = room {
                current.room = room;
                current.pending_room = pending_room;
                modified = true;
            }
            if current.connection != connection {
                current.connection = connection;
                modified = true;
            }
            if current.is_typing != is_typing {
                current.is_typing = is_typing;
                modified = true;
            }
            modified
        });
    }
}
