//! Live Chat Client - Entry Point
//!
//! Connects a chat session and drives it from stdin, printing events as they
//! arrive.

use std::env;

use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use live_chat_client::{
    ChatClient, ChatConfig, ChatEvent, ChatSnapshot, Identity, WebSocketConnector,
};

/// Default chat endpoint
const DEFAULT_URL: &str = "ws://127.0.0.1:8080";

/// Default local user id
const DEFAULT_USER: &str = "guest";

/// One parsed stdin line
#[derive(Debug, PartialEq)]
enum Line<'a> {
    Join(&'a str),
    Room,
    Leave,
    Typing,
    Stop,
    Support { title: &'a str, description: &'a str },
    Reset,
    Quit,
    Message(&'a str),
    Empty,
}

fn parse_line(line: &str) -> Line<'_> {
    let line = line.trim();
    if line.is_empty() {
        return Line::Empty;
    }
    let (cmd, rest) = line.split_once(' ').unwrap_or((line, ""));
    let rest = rest.trim();
    match cmd {
        "/join" => Line::Join(rest),
        "/room" => Line::Room,
        "/leave" => Line::Leave,
        "/typing" => Line::Typing,
        "/stop" => Line::Stop,
        "/support" => {
            let (title, description) = rest.split_once('|').unwrap_or((rest, ""));
            Line::Support {
                title: title.trim(),
                description: description.trim(),
            }
        }
        "/reset" => Line::Reset,
        "/quit" => Line::Quit,
        _ => Line::Message(line),
    }
}

fn print_event(event: &ChatEvent) {
    match event {
        ChatEvent::ConnectionChanged(state) => println!("* connection {}", state),
        ChatEvent::Disconnected { reason } => {
            println!("* disconnected: {}", reason.as_deref().unwrap_or("closed"))
        }
        ChatEvent::RoomJoined { room_id } => println!("* joined {}", room_id),
        ChatEvent::MessageArrived(message) => {
            println!("[{}] {}: {}", message.created_at.format("%H:%M"), message.sender_id, message.content)
        }
        ChatEvent::UserJoined { user_id } => println!("* {} joined", user_id),
        ChatEvent::SupportRequestSent => println!("* support request sent"),
        ChatEvent::Error { message } => println!("! {}", message),
    }
}

fn print_room(snapshot: &ChatSnapshot) {
    match &snapshot.room {
        Some(room) => {
            println!("* room {} ({} online)", room.room_id, room.online_count());
            for message in &room.messages {
                println!("  {}: {}", message.sender_id, message.content);
            }
        }
        None => println!("* no room"),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Use RUST_LOG env var to control log level
    // e.g., RUST_LOG=debug or RUST_LOG=live_chat_client=trace
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("live_chat_client=info")),
        )
        .init();

    // Endpoint and user from command line, then environment, then defaults
    let mut args = env::args().skip(1);
    let url = args
        .next()
        .or_else(|| env::var("LIVE_CHAT_URL").ok())
        .unwrap_or_else(|| DEFAULT_URL.to_string());
    let user = args
        .next()
        .or_else(|| env::var("LIVE_CHAT_USER").ok())
        .unwrap_or_else(|| DEFAULT_USER.to_string());

    let config = ChatConfig::new(url.clone());
    let connector = WebSocketConnector::new(url.clone());
    let (client, mut events) = ChatClient::start(connector, Identity::new(user.clone(), user), config);
    info!("Connecting to {}", url);
    client.connect()?;

    let printer = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            print_event(&event);
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let result = match parse_line(&line) {
            Line::Join(room) => client.join_room(room).await,
            Line::Room => {
                print_room(&client.snapshot());
                Ok(())
            }
            Line::Leave => client.leave_room(),
            Line::Typing => client.start_typing(),
            Line::Stop => client.stop_typing(),
            Line::Support { title, description } => client.request_support(title, description),
            Line::Reset => client.reset().and_then(|()| client.connect()),
            Line::Quit => break,
            Line::Message(text) => client.send_message(text),
            Line::Empty => Ok(()),
        };
        if let Err(e) = result {
            warn!("{}", e);
        }
    }

    if let Err(e) = client.disconnect().await {
        error!("Disconnect failed: {}", e);
    }
    drop(client);
    printer.await?;
    info!("Bye");
    Ok(())
}
