//! The single persistent WebSocket connection to the backend.
//!
//! `DuplexChannel` owns two background tasks once connected:
//!
//! - the **reader** delivers every inbound text frame, in arrival order, to
//!   the [`FrameHandler`] it was constructed with;
//! - the **writer** drains an outbound queue and acknowledges each frame back
//!   to the caller of [`DuplexChannel::send`], so a failed transmission is
//!   reported to the request that issued it.
//!
//! Whichever side notices the end of the connection first (peer close, read
//! or write error, a local [`DuplexChannel::close`], or dropping the channel)
//! moves the channel to `Closed` and calls [`FrameHandler::on_close`] exactly
//! once.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::{self, Message};

use crate::errors::RelayError;

/// Receives inbound frames and the close notification.
///
/// The transport only knows this capability, never the concrete consumer.
pub trait FrameHandler: Send + Sync {
    fn on_frame(&self, raw: &str);
    fn on_close(&self, reason: &str);
}

/// Anything that can transmit a serialized frame to the backend.
/// Real implementation: `DuplexChannel`. Tests use in-process sinks.
#[async_trait]
pub trait FrameSink: Send + Sync {
    async fn send(&self, frame: String) -> Result<(), RelayError>;
}

/// Lifecycle of a channel. `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelState {
    Disconnected,
    Connecting,
    Connected,
    Closed,
}

impl ChannelState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Closed => "closed",
        }
    }
}

impl std::fmt::Display for ChannelState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

type Ack = oneshot::Sender<Result<(), String>>;
type Outgoing = (Message, Ack);

struct Link {
    state: ChannelState,
    outbound: Option<mpsc::UnboundedSender<Outgoing>>,
}

struct Shared {
    link: Mutex<Link>,
    handler: Arc<dyn FrameHandler>,
}

impl Shared {
    fn link(&self) -> MutexGuard<'_, Link> {
        self.link.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, state: ChannelState) {
        self.link().state = state;
    }

    /// Transition to `Closed`. Returns `false` if already closed.
    fn mark_closed(&self, reason: &str) -> bool {
        {
            let mut link = self.link();
            if link.state == ChannelState::Closed {
                return false;
            }
            link.state = ChannelState::Closed;
            // Dropping the sender stops the writer, which then sends a Close frame.
            link.outbound = None;
        }
        tracing::info!(reason, "backend channel closed");
        self.handler.on_close(reason);
        true
    }
}

/// Persistent duplex connection to the backend.
pub struct DuplexChannel {
    url: String,
    connect_timeout: Duration,
    shared: Arc<Shared>,
}

impl DuplexChannel {
    pub fn new(url: impl Into<String>, handler: Arc<dyn FrameHandler>) -> Self {
        Self {
            url: url.into(),
            connect_timeout: Duration::from_secs(10),
            shared: Arc::new(Shared {
                link: Mutex::new(Link {
                    state: ChannelState::Disconnected,
                    outbound: None,
                }),
                handler,
            }),
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn state(&self) -> ChannelState {
        self.shared.link().state
    }

    fn connection_error(&self, message: impl Into<String>) -> RelayError {
        RelayError::Connection {
            url: self.url.clone(),
            message: message.into(),
        }
    }

    /// Open the WebSocket: `Disconnected → Connecting → Connected`.
    ///
    /// # Errors
    ///
    /// Returns `Connection` if the handshake fails or times out (the channel
    /// reverts to `Disconnected`), or if the channel is not `Disconnected`.
    pub async fn connect(&self) -> Result<(), RelayError> {
        {
            let mut link = self.shared.link();
            if link.state != ChannelState::Disconnected {
                return Err(self.connection_error(format!("channel is {}", link.state)));
            }
            link.state = ChannelState::Connecting;
        }
        tracing::info!(url = %self.url, "connecting to backend");

        let attempt =
            tokio::time::timeout(self.connect_timeout, tokio_tungstenite::connect_async(self.url.as_str()))
                .await;
        let ws = match attempt {
            Ok(Ok((ws, _response))) => ws,
            Ok(Err(e)) => {
                self.shared.set_state(ChannelState::Disconnected);
                tracing::warn!(url = %self.url, error = %e, "backend connection failed");
                return Err(self.connection_error(e.to_string()));
            }
            Err(_) => {
                self.shared.set_state(ChannelState::Disconnected);
                tracing::warn!(url = %self.url, timeout = ?self.connect_timeout, "backend connection timed out");
                return Err(self.connection_error(format!(
                    "timed out after {:?}",
                    self.connect_timeout
                )));
            }
        };

        let (sink, stream) = ws.split();
        let (tx, rx) = mpsc::unbounded_channel();
        {
            let mut link = self.shared.link();
            if link.state == ChannelState::Closed {
                return Err(self.connection_error("channel was closed while connecting"));
            }
            link.state = ChannelState::Connected;
            link.outbound = Some(tx);
        }

        tokio::spawn(write_loop(sink, rx, self.shared.clone()));
        tokio::spawn(read_loop(stream, self.shared.clone()));
        tracing::info!(url = %self.url, "connected to backend");
        Ok(())
    }

    /// Close the channel. Every pending request is failed via the handler.
    ///
    /// Returns `false` if the channel was already closed.
    pub fn close(&self) -> bool {
        self.shared.mark_closed("closed by client")
    }
}

impl Drop for DuplexChannel {
    fn drop(&mut self) {
        // Stops the writer and fails anything still waiting on this channel.
        self.shared.mark_closed("channel dropped");
    }
}

#[async_trait]
impl FrameSink for DuplexChannel {
    async fn send(&self, frame: String) -> Result<(), RelayError> {
        let tx = {
            let link = self.shared.link();
            if link.state != ChannelState::Connected {
                return Err(RelayError::SendFailure(format!("channel is {}", link.state)));
            }
            link.outbound
                .clone()
                .ok_or_else(|| RelayError::SendFailure("channel has no writer".to_string()))?
        };

        let (ack_tx, ack_rx) = oneshot::channel();
        tx.send((Message::text(frame), ack_tx))
            .map_err(|_| RelayError::SendFailure("writer task has stopped".to_string()))?;

        match ack_rx.await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(RelayError::SendFailure(e)),
            Err(_) => Err(RelayError::SendFailure(
                "writer task dropped the frame".to_string(),
            )),
        }
    }
}

async fn write_loop<S>(mut sink: S, mut rx: mpsc::UnboundedReceiver<Outgoing>, shared: Arc<Shared>)
where
    S: Sink<Message, Error = tungstenite::Error> + Unpin,
{
    while let Some((message, ack)) = rx.recv().await {
        match sink.send(message).await {
            Ok(()) => {
                let _ = ack.send(Ok(()));
            }
            Err(e) => {
                let reason = format!("write error: {}", e);
                let _ = ack.send(Err(e.to_string()));
                shared.mark_closed(&reason);
                return;
            }
        }
    }

    // Queue closed by `mark_closed`: best-effort close handshake
    let _ = sink.send(Message::Close(None)).await;
    let _ = sink.close().await;
}

async fn read_loop<S>(mut stream: S, shared: Arc<Shared>)
where
    S: Stream<Item = Result<Message, tungstenite::Error>> + Unpin,
{
    let reason = loop {
        match stream.next().await {
            Some(Ok(Message::Text(text))) => shared.handler.on_frame(text.as_str()),
            Some(Ok(Message::Binary(bytes))) => match std::str::from_utf8(&bytes) {
                Ok(text) => shared.handler.on_frame(text),
                Err(_) => tracing::warn!(len = bytes.len(), "dropping non-UTF-8 binary frame"),
            },
            Some(Ok(Message::Close(frame))) => {
                break frame
                    .map(|f| format!("closed by peer ({}): {}", f.code, f.reason.as_str()))
                    .unwrap_or_else(|| "closed by peer".to_string());
            }
            // Ping/Pong are answered by the WebSocket layer
            Some(Ok(_)) => {}
            Some(Err(e)) => break format!("read error: {}", e),
            None => break "connection ended".to_string(),
        }
    };
    shared.mark_closed(&reason);
}
