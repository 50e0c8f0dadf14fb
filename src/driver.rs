//! Session driver actor
//!
//! The background task behind a `Session`. It owns the single live link,
//! runs the reconnect loop, sends the implicit join on every connect,
//! decodes inbound frames and tracks pending acknowledgements. The
//! `Session` handle talks to it only through `SessionCommand`s, and it
//! reports to the application only through `SessionEvent`s.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{sleep, sleep_until, Instant};
use tracing::{debug, info, trace, warn};

use crate::config::SessionConfig;
use crate::error::ClientError;
use crate::message::ChatMessage;
use crate::protocol::{InboundEvent, OutboundEvent};
use crate::transport::{Connector, FrameSink, Link, LinkEvent};
use crate::types::ConnectionState;

/// Reason reported when the transport gives none
pub const DISCONNECT_FALLBACK: &str = "disconnected";

/// How far away an idle timer is parked when no ack is pending
const IDLE_TIMER: Duration = Duration::from_secs(3600);

/// Commands sent from the `Session` handle to the driver
#[derive(Debug)]
pub enum SessionCommand {
    /// Fire-and-forget event (join, typing)
    Emit(OutboundEvent),
    /// Event sent with an acknowledgement request
    Send {
        event: OutboundEvent,
        requested_at: Instant,
        reply: oneshot::Sender<DeliveryStatus>,
    },
    /// Close the link and stop for good
    Shutdown,
}

/// Events delivered to the application
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// Link established (first connect and every reconnect)
    Connected,
    /// Link lost, with a human-readable reason
    Disconnected(String),
    /// Chat message from the room
    Message(ChatMessage),
    /// A remote user is typing
    Typing(String),
}

/// Final outcome of a sent message
#[derive(Debug, Clone, PartialEq)]
pub enum DeliveryStatus {
    /// The server acknowledged it, with its reply payload
    Acknowledged(Value),
    /// No acknowledgement within the configured timeout
    TimedOut,
    /// Never written: no live link, or the session was torn down
    Dropped,
}

/// An unacknowledged outbound message
struct PendingAck {
    deadline: Instant,
    reply: oneshot::Sender<DeliveryStatus>,
}

/// Why `serve` returned
enum LinkExit {
    /// Teardown requested
    Shutdown,
    /// Transport lost the link
    Lost(String),
}

/// The session driver actor
pub struct SessionDriver {
    config: SessionConfig,
    connector: Arc<dyn Connector>,
    nickname: String,
    commands: mpsc::UnboundedReceiver<SessionCommand>,
    events: mpsc::UnboundedSender<SessionEvent>,
    state: Arc<watch::Sender<ConnectionState>>,
    torn_down: Arc<AtomicBool>,
    /// Ack id -> waiting sender
    pending: HashMap<u64, PendingAck>,
    next_ack_id: u64,
}

impl SessionDriver {
    pub fn new(
        config: SessionConfig,
        connector: Arc<dyn Connector>,
        nickname: String,
        commands: mpsc::UnboundedReceiver<SessionCommand>,
        events: mpsc::UnboundedSender<SessionEvent>,
        state: Arc<watch::Sender<ConnectionState>>,
        torn_down: Arc<AtomicBool>,
    ) -> Self {
        Self {
            config,
            connector,
            nickname,
            commands,
            events,
            state,
            torn_down,
            pending: HashMap::new(),
            next_ack_id: 1,
        }
    }

    /// Run the connect / serve / back off loop until teardown
    ///
    /// With the default policy this only returns after `Shutdown` or once
    /// every `Session` handle is dropped.
    pub async fn run(mut self) {
        info!(
            "Session driver started for '{}' on {}",
            self.nickname,
            self.config.url()
        );

        let mut attempt: u32 = 0;

        loop {
            self.set_state(if attempt == 0 {
                ConnectionState::Connecting
            } else {
                ConnectionState::Reconnecting { attempt }
            });

            let connector = Arc::clone(&self.connector);
            let url = self.config.url().clone();
            let Some(handshake) = self.while_down(connector.connect(&url)).await else {
                break;
            };

            match handshake {
                Ok(link) => {
                    attempt = 0;
                    match self.serve(link).await {
                        LinkExit::Shutdown => break,
                        LinkExit::Lost(reason) => {
                            info!("Disconnected from {}: {}", url, reason);
                            self.emit(SessionEvent::Disconnected(reason));
                        }
                    }
                }
                Err(e) => {
                    warn!("Connection attempt to {} failed: {}", url, e);
                }
            }

            attempt = attempt.saturating_add(1);
            if !self.config.reconnect().allows(attempt) {
                info!("Reconnect policy exhausted after {} attempt(s)", attempt - 1);
                break;
            }

            self.set_state(ConnectionState::Reconnecting { attempt });
            let delay = self.config.reconnect().delay;
            debug!("Reconnecting in {:?} (attempt {})", delay, attempt);
            if self.while_down(sleep(delay)).await.is_none() {
                break;
            }
        }

        self.finish();
    }

    /// Wait for `fut` while there is no link, serving commands meanwhile
    ///
    /// Returns `None` if teardown was requested first.
    async fn while_down<F: Future>(&mut self, fut: F) -> Option<F::Output> {
        tokio::pin!(fut);

        loop {
            let deadline = self.next_deadline();
            tokio::select! {
                output = &mut fut => return Some(output),
                cmd = self.commands.recv() => {
                    match cmd {
                        None | Some(SessionCommand::Shutdown) => return None,
                        Some(SessionCommand::Emit(event)) => {
                            debug!("Not connected, dropping '{}' event", event.name());
                        }
                        Some(SessionCommand::Send { event, reply, .. }) => {
                            debug!("Not connected, dropping '{}' event", event.name());
                            let _ = reply.send(DeliveryStatus::Dropped);
                        }
                    }
                }
                _ = sleep_until(deadline.unwrap_or_else(idle_deadline)), if deadline.is_some() => {
                    self.expire_acks();
                }
            }
        }
    }

    /// Serve one live link until it is lost or teardown is requested
    async fn serve(&mut self, link: Link) -> LinkExit {
        let Link {
            mut sink,
            mut stream,
        } = link;

        self.set_state(ConnectionState::Connected);
        info!("Connected to {} as '{}'", self.config.url(), self.nickname);
        self.emit(SessionEvent::Connected);

        // Join precedes any inbound frame on this link
        let join = OutboundEvent::Join {
            user: self.nickname.clone(),
            room: self.config.room().to_string(),
        };
        if let Err(e) = write(&mut sink, &join, None, self.config.log_frames()).await {
            return LinkExit::Lost(e.to_string());
        }

        loop {
            let deadline = self.next_deadline();
            tokio::select! {
                cmd = self.commands.recv() => {
                    match cmd {
                        None | Some(SessionCommand::Shutdown) => {
                            let _ = sink.close().await;
                            return LinkExit::Shutdown;
                        }
                        Some(SessionCommand::Emit(event)) => {
                            if let Err(e) = write(&mut sink, &event, None, self.config.log_frames()).await {
                                return LinkExit::Lost(e.to_string());
                            }
                        }
                        Some(SessionCommand::Send { event, requested_at, reply }) => {
                            let id = self.next_ack_id;
                            self.next_ack_id += 1;

                            if let Err(e) = write(&mut sink, &event, Some(id), self.config.log_frames()).await {
                                let _ = reply.send(DeliveryStatus::Dropped);
                                return LinkExit::Lost(e.to_string());
                            }

                            let deadline = requested_at + self.config.ack_timeout();
                            self.pending.insert(id, PendingAck { deadline, reply });
                        }
                    }
                }
                inbound = stream.next() => {
                    match inbound {
                        Some(Ok(LinkEvent::Text(text))) => self.dispatch(&text),
                        Some(Ok(LinkEvent::Closed(reason))) => {
                            return LinkExit::Lost(
                                reason.unwrap_or_else(|| DISCONNECT_FALLBACK.to_string()),
                            );
                        }
                        Some(Err(e)) => return LinkExit::Lost(e.to_string()),
                        None => return LinkExit::Lost(DISCONNECT_FALLBACK.to_string()),
                    }
                }
                _ = sleep_until(deadline.unwrap_or_else(idle_deadline)), if deadline.is_some() => {
                    self.expire_acks();
                }
            }
        }
    }

    /// Decode one inbound frame and hand it to the application
    fn dispatch(&mut self, text: &str) {
        if self.config.log_frames() {
            trace!("<- {}", text);
        }

        match InboundEvent::decode(text) {
            InboundEvent::Message(msg) => self.emit(SessionEvent::Message(msg)),
            InboundEvent::Typing { user } => self.emit(SessionEvent::Typing(user)),
            InboundEvent::Ack { id, data } => match self.pending.remove(&id) {
                Some(pending) => {
                    let _ = pending.reply.send(DeliveryStatus::Acknowledged(data));
                }
                None => debug!("Ack {} matches no pending message", id),
            },
            InboundEvent::Discard => debug!("Discarding unrecognised inbound frame"),
        }
    }

    /// Resolve every pending ack whose deadline has passed
    fn expire_acks(&mut self) {
        let now = Instant::now();
        let expired: Vec<u64> = self
            .pending
            .iter()
            .filter(|(_, pending)| pending.deadline <= now)
            .map(|(id, _)| *id)
            .collect();

        for id in expired {
            if let Some(pending) = self.pending.remove(&id) {
                debug!("Ack {} timed out", id);
                let _ = pending.reply.send(DeliveryStatus::TimedOut);
            }
        }
    }

    fn next_deadline(&self) -> Option<Instant> {
        self.pending.values().map(|pending| pending.deadline).min()
    }

    /// Deliver an event unless the session has been torn down
    fn emit(&self, event: SessionEvent) {
        if self.torn_down.load(Ordering::SeqCst) {
            return;
        }
        if self.events.send(event).is_err() {
            trace!("Event stream dropped, event discarded");
        }
    }

    fn set_state(&self, state: ConnectionState) {
        if self.torn_down.load(Ordering::SeqCst) {
            return;
        }
        self.state.send_replace(state);
    }

    fn finish(mut self) {
        for (_, pending) in self.pending.drain() {
            let _ = pending.reply.send(DeliveryStatus::Dropped);
        }
        self.set_state(ConnectionState::Disconnected);
        info!("Session driver for '{}' stopped", self.nickname);
    }
}

/// Serialize and write one outbound event
async fn write(
    sink: &mut FrameSink,
    event: &OutboundEvent,
    ack_id: Option<u64>,
    log_frames: bool,
) -> Result<(), ClientError> {
    let frame = event.to_frame(ack_id)?;
    if log_frames {
        trace!("-> {}", frame);
    }
    sink.send(frame).await
}

fn idle_deadline() -> Instant {
    Instant::now() + IDLE_TIMER
}
