//! Transport abstraction
//!
//! A `Connector` performs one handshake and yields a `Link`: a sink of
//! outbound text frames and a stream of inbound link events. The session
//! driver only ever holds one `Link` at a time.

use std::pin::Pin;

use async_trait::async_trait;
use futures_util::{future, Sink, SinkExt, Stream, StreamExt};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::debug;
use url::Url;

use crate::error::ClientError;

/// Something received on a live link
#[derive(Debug, Clone, PartialEq)]
pub enum LinkEvent {
    /// A text frame
    Text(String),
    /// The peer closed the link, with an optional reason
    Closed(Option<String>),
}

/// Outbound half of a link
pub type FrameSink = Pin<Box<dyn Sink<String, Error = ClientError> + Send>>;

/// Inbound half of a link
pub type LinkStream = Pin<Box<dyn Stream<Item = Result<LinkEvent, ClientError>> + Send>>;

/// One physical connection
pub struct Link {
    pub sink: FrameSink,
    pub stream: LinkStream,
}

/// Opens links to the server
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Perform a handshake with `url`
    async fn connect(&self, url: &Url) -> Result<Link, ClientError>;
}

/// WebSocket connector backed by tokio-tungstenite
#[derive(Debug, Default, Clone, Copy)]
pub struct WsConnector;

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self, url: &Url) -> Result<Link, ClientError> {
        let (ws_stream, response) = connect_async(url.as_str()).await?;
        debug!("WebSocket handshake with {} ({})", url, response.status());

        let (ws_sender, ws_receiver) = ws_stream.split();

        let sink = ws_sender
            .sink_map_err(ClientError::from)
            .with(|text: String| future::ready(Ok::<_, ClientError>(Message::Text(text.into()))));

        let stream = ws_receiver.filter_map(|msg_result| {
            future::ready(match msg_result {
                Ok(Message::Text(text)) => Some(Ok(LinkEvent::Text(text.to_string()))),
                Ok(Message::Close(frame)) => Some(Ok(LinkEvent::Closed(
                    frame
                        .map(|f| f.reason.to_string())
                        .filter(|reason| !reason.is_empty()),
                ))),
                // Pong is handled automatically by tungstenite
                Ok(_) => None,
                Err(e) => Some(Err(ClientError::from(e))),
            })
        });

        Ok(Link {
            sink: Box::pin(sink),
            stream: Box::pin(stream),
        })
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! In-memory connector for driving a session from tests

    use std::time::Duration;

    use futures_util::{sink, stream};
    use serde_json::{json, Value};
    use tokio::sync::{mpsc, oneshot, Mutex};

    use super::*;

    /// A handshake waiting for the test to accept or refuse it
    struct Attempt {
        peer: FakePeer,
        verdict: oneshot::Sender<bool>,
    }

    /// Connector whose handshakes are decided by a `FakeServer`
    pub(crate) struct FakeConnector {
        attempts: mpsc::UnboundedSender<Attempt>,
    }

    /// Test-side control of a `FakeConnector`
    pub(crate) struct FakeServer {
        attempts: Mutex<mpsc::UnboundedReceiver<Attempt>>,
    }

    /// Server end of one accepted link
    pub(crate) struct FakePeer {
        outbound: mpsc::UnboundedReceiver<String>,
        inbound: mpsc::UnboundedSender<Result<LinkEvent, ClientError>>,
    }

    pub(crate) fn fake_transport() -> (FakeConnector, FakeServer) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            FakeConnector { attempts: tx },
            FakeServer {
                attempts: Mutex::new(rx),
            },
        )
    }

    #[async_trait]
    impl Connector for FakeConnector {
        async fn connect(&self, _url: &Url) -> Result<Link, ClientError> {
            let (out_tx, out_rx) = mpsc::unbounded_channel::<String>();
            let (in_tx, in_rx) = mpsc::unbounded_channel::<Result<LinkEvent, ClientError>>();
            let (verdict_tx, verdict_rx) = oneshot::channel();

            let attempt = Attempt {
                peer: FakePeer {
                    outbound: out_rx,
                    inbound: in_tx,
                },
                verdict: verdict_tx,
            };
            self.attempts
                .send(attempt)
                .map_err(|_| ClientError::ChannelClosed)?;

            if !verdict_rx.await.unwrap_or(false) {
                return Err(ClientError::ChannelClosed);
            }

            let sink = sink::unfold(out_tx, |tx, text: String| async move {
                tx.send(text).map_err(|_| ClientError::ChannelClosed)?;
                Ok::<_, ClientError>(tx)
            });
            let stream = stream::unfold(in_rx, |mut rx| async move {
                rx.recv().await.map(|item| (item, rx))
            });

            Ok(Link {
                sink: Box::pin(sink),
                stream: Box::pin(stream),
            })
        }
    }

    impl FakeServer {
        async fn next_attempt(&self) -> Attempt {
            self.attempts
                .lock()
                .await
                .recv()
                .await
                .expect("connector dropped")
        }

        /// Complete the next handshake successfully
        pub(crate) async fn accept(&self) -> FakePeer {
            let attempt = self.next_attempt().await;
            attempt.verdict.send(true).expect("attempt abandoned");
            attempt.peer
        }

        /// Fail the next handshake
        pub(crate) async fn refuse(&self) {
            let attempt = self.next_attempt().await;
            let _ = attempt.verdict.send(false);
        }

        /// Whether a handshake is pending or arrives within `wait`
        pub(crate) async fn has_attempt_within(&self, wait: Duration) -> bool {
            let mut attempts = self.attempts.lock().await;
            tokio::time::timeout(wait, attempts.recv()).await.is_ok()
        }
    }

    impl FakePeer {
        /// Next frame sent by the client, as JSON
        pub(crate) async fn next_frame(&mut self) -> Value {
            let text = self.outbound.recv().await.expect("link closed");
            serde_json::from_str(&text).expect("client sent invalid JSON")
        }

        /// Next frame if the client already sent one
        pub(crate) fn try_next_frame(&mut self) -> Option<Value> {
            let text = self.outbound.try_recv().ok()?;
            serde_json::from_str(&text).ok()
        }

        pub(crate) fn push_raw(&self, text: &str) {
            let _ = self.inbound.send(Ok(LinkEvent::Text(text.to_string())));
        }

        pub(crate) fn push(&self, event: &str, data: Value) {
            self.push_raw(&json!({"event": event, "data": data}).to_string());
        }

        pub(crate) fn ack(&self, id: u64, data: Value) {
            self.push_raw(&json!({"event": "ack", "id": id, "data": data}).to_string());
        }

        /// Close the link with a close frame
        pub(crate) fn close(&self, reason: Option<&str>) {
            let _ = self
                .inbound
                .send(Ok(LinkEvent::Closed(reason.map(str::to_string))));
        }

        /// Drop the link without a close frame
        pub(crate) fn sever(self) {}
    }
}
