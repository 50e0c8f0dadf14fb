//! Lobby Chat Client Library
//!
//! A real-time chat client that keeps a persistent WebSocket connection to
//! a chat server, joins the shared "lobby" room and exchanges chat and
//! typing events, built on tokio-tungstenite.
//!
//! # Features
//! - Automatic join on every connect and reconnect
//! - Unbounded reconnects with a fixed, configurable delay
//! - Typed inbound events; malformed payloads are dropped
//! - Message delivery acknowledgement with timeout
//! - Typing notifications
//!
//! # Architecture
//! Uses the Actor pattern with `mpsc` channels:
//! - `SessionDriver` is the background actor owning the single live link
//! - `Session` is a cloneable handle that sends it commands
//! - Events flow back on one `EventStream`, drained by the application on
//!   its own task
//!
//! # Example
//! ```ignore
//! use lobby_chat::{Handlers, Session, SessionConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), lobby_chat::ClientError> {
//!     let session = Session::new(SessionConfig::new("ws://localhost:3000")?);
//!     let events = session.connect("alice")?;
//!
//!     session.send("hello", "alice")?;
//!
//!     events
//!         .dispatch(
//!             Handlers::new(|msg| println!("{}: {}", msg.user(), msg.text()))
//!                 .on_typing(|user| println!("{} is typing...", user)),
//!         )
//!         .await;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod driver;
pub mod error;
pub mod message;
pub mod protocol;
pub mod session;
pub mod transport;
pub mod types;

// Re-export main types for convenience
pub use config::{ReconnectPolicy, SessionConfig};
pub use driver::{DeliveryStatus, SessionEvent};
pub use error::ClientError;
pub use message::ChatMessage;
pub use protocol::{InboundEvent, OutboundEvent};
pub use session::{Delivery, EventStream, Handlers, Session};
pub use transport::{Connector, Link, LinkEvent, WsConnector};
pub use types::{ConnectionState, MessageId};
