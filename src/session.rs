//! Session handle
//!
//! `Session` is the application's view of the chat connection. It is an
//! explicitly constructed, cloneable handle (no process-wide singleton);
//! each live session owns exactly one background `SessionDriver` and so at
//! most one physical link. Every operation returns immediately; outcomes
//! arrive later on the `EventStream` or through a `Delivery`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::config::SessionConfig;
use crate::driver::{DeliveryStatus, SessionCommand, SessionDriver, SessionEvent};
use crate::error::ClientError;
use crate::message::{epoch_seconds, ChatMessage};
use crate::protocol::OutboundEvent;
use crate::transport::{Connector, WsConnector};
use crate::types::ConnectionState;

/// Handle to a chat session
///
/// Clones share the same session. Dropping the last clone stops the driver.
#[derive(Clone)]
pub struct Session {
    inner: Arc<Inner>,
}

struct Inner {
    config: SessionConfig,
    connector: Arc<dyn Connector>,
    state: Arc<watch::Sender<ConnectionState>>,
    control: Mutex<Option<Control>>,
}

/// The running driver of a connected session
struct Control {
    commands: mpsc::UnboundedSender<SessionCommand>,
    torn_down: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

impl Session {
    /// Create a session that connects over WebSocket
    pub fn new(config: SessionConfig) -> Self {
        Self::with_connector(config, WsConnector)
    }

    /// Create a session over any transport
    pub fn with_connector(config: SessionConfig, connector: impl Connector) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            inner: Arc::new(Inner {
                config,
                connector: Arc::new(connector),
                state: Arc::new(state),
                control: Mutex::new(None),
            }),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    /// Start the transport as `nickname`
    ///
    /// Spawns the driver on the current tokio runtime and returns the
    /// stream every session event is delivered on. A `join` for the
    /// configured room is sent automatically on each (re)connect. Fails with
    /// `AlreadyConnected` while a previous `connect` is still running.
    pub fn connect(&self, nickname: impl Into<String>) -> Result<EventStream, ClientError> {
        let mut control = self.lock_control();
        if control.as_ref().is_some_and(|c| !c.task.is_finished()) {
            return Err(ClientError::AlreadyConnected);
        }

        let nickname = nickname.into();
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let torn_down = Arc::new(AtomicBool::new(false));

        let driver = SessionDriver::new(
            self.inner.config.clone(),
            Arc::clone(&self.inner.connector),
            nickname.clone(),
            cmd_rx,
            event_tx,
            Arc::clone(&self.inner.state),
            Arc::clone(&torn_down),
        );
        let task = tokio::spawn(driver.run());

        info!("Session for '{}' starting", nickname);

        *control = Some(Control {
            commands: cmd_tx,
            torn_down: Arc::clone(&torn_down),
            task,
        });

        Ok(EventStream {
            events: event_rx,
            torn_down,
        })
    }

    /// Tear the session down
    ///
    /// Closes the link, cancels pending reconnects and guarantees that the
    /// `EventStream` yields nothing further, even events already queued.
    /// Safe to call when never connected.
    pub fn disconnect(&self) {
        let Some(control) = self.lock_control().take() else {
            debug!("disconnect() on a session that is not connected");
            return;
        };

        control.torn_down.store(true, Ordering::SeqCst);
        let _ = control.commands.send(SessionCommand::Shutdown);
        self.inner.state.send_replace(ConnectionState::Disconnected);

        info!("Session torn down");
    }

    /// Emit a `join` for the configured room
    ///
    /// Sent automatically on every connect; exposed for manual re-joins.
    pub fn emit_join(&self, nickname: &str) -> Result<(), ClientError> {
        let event = OutboundEvent::Join {
            user: nickname.to_string(),
            room: self.inner.config.room().to_string(),
        };
        self.command(SessionCommand::Emit(event))
    }

    /// Emit a `typing` notification
    ///
    /// Fire-and-forget; not debounced.
    pub fn emit_typing(&self, nickname: &str) -> Result<(), ClientError> {
        let event = OutboundEvent::Typing {
            user: nickname.to_string(),
            room: self.inner.config.room().to_string(),
        };
        self.command(SessionCommand::Emit(event))
    }

    /// Send a chat message stamped with the current time
    ///
    /// The message is never retried. The returned `Delivery` may be dropped
    /// for best-effort delivery, or awaited for the acknowledgement outcome.
    pub fn send(&self, text: &str, nickname: &str) -> Result<Delivery, ClientError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        let event = OutboundEvent::Message {
            user: nickname.to_string(),
            room: self.inner.config.room().to_string(),
            text: text.to_string(),
            timestamp: epoch_seconds(Utc::now()),
        };

        self.command(SessionCommand::Send {
            event,
            requested_at: Instant::now(),
            reply: reply_tx,
        })?;

        Ok(Delivery { reply: reply_rx })
    }

    /// Current connection state
    pub fn state(&self) -> ConnectionState {
        *self.inner.state.borrow()
    }

    /// Subscribe to connection state changes
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state.subscribe()
    }

    fn command(&self, cmd: SessionCommand) -> Result<(), ClientError> {
        let control = self.lock_control();
        let Some(control) = control.as_ref() else {
            return Err(ClientError::NotConnected);
        };

        // A stopped driver drops the command; a `Send` then resolves as `Dropped`
        if control.commands.send(cmd).is_err() {
            debug!("Session driver stopped, command dropped");
        }
        Ok(())
    }

    fn lock_control(&self) -> MutexGuard<'_, Option<Control>> {
        self.inner
            .control
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("url", &self.inner.config.url().as_str())
            .field("state", &self.state())
            .finish()
    }
}

/// Events of one connected session, in delivery order
///
/// Drain it on the context that owns the view state. It ends once the
/// session is torn down.
#[derive(Debug)]
pub struct EventStream {
    events: mpsc::UnboundedReceiver<SessionEvent>,
    torn_down: Arc<AtomicBool>,
}

impl EventStream {
    /// Next event, or `None` after teardown
    pub async fn recv(&mut self) -> Option<SessionEvent> {
        if self.is_torn_down() {
            return None;
        }
        let event = self.events.recv().await?;
        if self.is_torn_down() {
            return None;
        }
        Some(event)
    }

    /// Next event if one is already queued
    pub fn try_recv(&mut self) -> Option<SessionEvent> {
        if self.is_torn_down() {
            return None;
        }
        self.events.try_recv().ok()
    }

    /// Drain the stream into `handlers` until teardown
    ///
    /// Callbacks run on the caller's task, one event at a time.
    pub async fn dispatch(mut self, mut handlers: Handlers) {
        while let Some(event) = self.recv().await {
            handlers.handle(event);
        }
    }

    fn is_torn_down(&self) -> bool {
        self.torn_down.load(Ordering::SeqCst)
    }
}

/// Callback set for `EventStream::dispatch`
///
/// `on_message` is required; the others are optional.
pub struct Handlers {
    on_message: Box<dyn FnMut(ChatMessage)>,
    on_typing: Option<Box<dyn FnMut(String)>>,
    on_connect: Option<Box<dyn FnMut()>>,
    on_disconnect: Option<Box<dyn FnMut(String)>>,
}

impl Handlers {
    pub fn new(on_message: impl FnMut(ChatMessage) + 'static) -> Self {
        Self {
            on_message: Box::new(on_message),
            on_typing: None,
            on_connect: None,
            on_disconnect: None,
        }
    }

    /// Called with the remote user's name
    pub fn on_typing(mut self, f: impl FnMut(String) + 'static) -> Self {
        self.on_typing = Some(Box::new(f));
        self
    }

    /// Called on every connect, including reconnects
    pub fn on_connect(mut self, f: impl FnMut() + 'static) -> Self {
        self.on_connect = Some(Box::new(f));
        self
    }

    /// Called with the disconnect reason on every lost link
    pub fn on_disconnect(mut self, f: impl FnMut(String) + 'static) -> Self {
        self.on_disconnect = Some(Box::new(f));
        self
    }

    /// Route one event to its callback
    pub fn handle(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Message(msg) => (self.on_message)(msg),
            SessionEvent::Typing(user) => {
                if let Some(f) = self.on_typing.as_mut() {
                    f(user);
                }
            }
            SessionEvent::Connected => {
                if let Some(f) = self.on_connect.as_mut() {
                    f();
                }
            }
            SessionEvent::Disconnected(reason) => {
                if let Some(f) = self.on_disconnect.as_mut() {
                    f(reason);
                }
            }
        }
    }
}

/// Pending acknowledgement of a sent message
#[derive(Debug)]
pub struct Delivery {
    reply: oneshot::Receiver<DeliveryStatus>,
}

impl Delivery {
    /// Wait for the acknowledgement, the timeout or the drop
    pub async fn outcome(self) -> DeliveryStatus {
        self.reply.await.unwrap_or(DeliveryStatus::Dropped)
    }
}
