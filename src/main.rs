//! Lobby Chat Client - Entry Point
//!
//! Connects to the chat server, joins the lobby and prints the feed.
//! Each line typed on stdin is sent as a chat message.

use std::env;

use chrono::Local;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use lobby_chat::config::DEFAULT_URL;
use lobby_chat::{DeliveryStatus, Session, SessionConfig, SessionEvent};

/// Nickname used when none is given
const DEFAULT_NICKNAME: &str = "guest";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging with environment filter
    // Use RUST_LOG env var to control log level
    // e.g., RUST_LOG=debug or RUST_LOG=lobby_chat=trace
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("lobby_chat=info")),
        )
        .init();

    // Get nickname and server URL from command line or use defaults
    let mut args = env::args().skip(1);
    let nickname = args.next().unwrap_or_else(|| DEFAULT_NICKNAME.to_string());
    let url = args.next().unwrap_or_else(|| DEFAULT_URL.to_string());

    let session = Session::new(SessionConfig::new(&url)?);
    let mut events = session.connect(nickname.as_str())?;
    info!("Chatting in '{}' as '{}'", session.config().room(), nickname);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else { break };
                render(&event);
            }
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                let text = line.trim();
                if text.is_empty() {
                    continue;
                }

                let delivery = session.send(text, &nickname)?;
                session.emit_typing(&nickname)?;

                let text = text.to_string();
                tokio::spawn(async move {
                    match delivery.outcome().await {
                        DeliveryStatus::Acknowledged(_) => {}
                        DeliveryStatus::TimedOut => warn!("No acknowledgement for '{}'", text),
                        DeliveryStatus::Dropped => warn!("Not connected, '{}' was not sent", text),
                    }
                });
            }
            _ = &mut ctrl_c => {
                info!("Interrupted");
                break;
            }
        }
    }

    session.disconnect();
    Ok(())
}

/// Print one session event
fn render(event: &SessionEvent) {
    match event {
        SessionEvent::Message(msg) => {
            let time = msg.timestamp().with_timezone(&Local).format("%H:%M");
            println!("[{}] {}: {}", time, msg.user(), msg.text());
        }
        SessionEvent::Typing(user) => println!("{} is typing...", user),
        SessionEvent::Connected => println!("Connected"),
        SessionEvent::Disconnected(reason) => println!("Disconnected: {}", reason),
    }
}
