//! chat-link terminal client entry point.
//!
//! Builds the connection manager from the environment and drives it from
//! stdin commands:
//!
//! ```text
//! /token <value>        store a bearer token
//! /connect              open the chat connection
//! /join <room>          subscribe to a room
//! /leave <room>         unsubscribe from a room
//! /send <room> <text>   send a text message
//! /status               show connection state
//! /disconnect           close the connection
//! /quit                 exit
//! ```

use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

use chat_link::app_state::AppState;
use chat_link::config::ChatConfig;
use chat_link::domain::{ChatMessage, NotificationLevel, OutboundMessage, RoomId};
use chat_link::service::{ConnectionManager, MessageCallback};
use chat_link::transport::ManagerEvent;

enum Input {
    Event(ManagerEvent),
    Line(Option<String>),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Load configuration
    let config = ChatConfig::from_env()?;
    tracing::info!(endpoint = %config.endpoint_url, "starting chat-link");

    let AppState {
        mut manager,
        notifications,
        credentials,
    } = AppState::from_config(config);

    // Print notifications as they arrive
    let mut notification_rx = notifications.subscribe();
    tokio::spawn(async move {
        while let Ok(notification) = notification_rx.recv().await {
            let tag = match notification.level() {
                NotificationLevel::Success => "ok",
                NotificationLevel::Error => "error",
            };
            println!("[{tag}] {}", notification.message());
        }
    });

    manager.connect();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let input = tokio::select! {
            event = manager.next_event() => Input::Event(event),
            line = lines.next_line() => Input::Line(line.ok().flatten()),
        };
        match input {
            Input::Event(event) => manager.dispatch(event),
            Input::Line(None) => break,
            Input::Line(Some(line)) => {
                let line = line.trim();
                if line == "/quit" {
                    break;
                }
                if let Some(token) = line.strip_prefix("/token ") {
                    match credentials.store_token(token.trim()) {
                        Ok(()) => println!("token saved to {}", credentials.path().display()),
                        Err(e) => println!("could not save token: {e}"),
                    }
                    continue;
                }
                handle_command(&mut manager, line);
            }
        }
    }

    manager.disconnect();
    tracing::info!("chat-link stopped");
    Ok(())
}

fn handle_command(manager: &mut ConnectionManager, line: &str) {
    let mut parts = line.splitn(3, ' ');
    let command = parts.next().unwrap_or_default();
    let room = parts.next().and_then(|r| r.parse::<RoomId>().ok());
    let rest = parts.next().unwrap_or_default();

    match (command, room) {
        ("/connect", _) => manager.connect(),
        ("/disconnect", _) => manager.disconnect(),
        ("/status", _) => println!(
            "state: {:?}, rooms: {}, reconnect attempts: {}",
            manager.connection_state(),
            manager.subscription_count(),
            manager.reconnect_attempts()
        ),
        ("/join", Some(room_id)) => {
            let _ = manager.subscribe(room_id, printer(room_id));
        }
        ("/leave", Some(room_id)) => {
            let _ = manager.unsubscribe(room_id);
        }
        ("/send", Some(room_id)) if !rest.is_empty() => {
            let _ = manager.send_message(room_id, OutboundMessage::text(rest));
        }
        ("", _) => {}
        _ => println!("unknown command: {line}"),
    }
}

fn printer(room_id: RoomId) -> MessageCallback {
    Arc::new(move |value| match ChatMessage::from_value(value.clone()) {
        Ok(msg) => {
            let sender = msg.sender_name.as_deref().unwrap_or(&msg.sender_email);
            println!("[room {room_id}] {sender}: {}", msg.content);
        }
        Err(_) => println!("[room {room_id}] {value}"),
    })
}
