//! WebSocket client for the hand-tracking service.
//!
//! The client is driven from a single event loop:
//!
//! 1. [`LandmarkClient::next_socket_event`] is awaited inside `tokio::select!`
//!    (cancel-safe; pends forever while disconnected). A pending handshake
//!    is polled here too, so `connect` itself never waits on the network.
//! 2. The result goes back into [`LandmarkClient::handle_socket_event`].
//! 3. Reconnect timers fire through the loop's [`Scheduler`] and are handed to
//!    [`LandmarkClient::handle_reconnect_timer`].
//!
//! Frames and status changes are delivered in order on the channel returned
//! by [`LandmarkClient::new`].

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use handray_core::reconnect::RETRIES_EXHAUSTED;
use handray_core::{
    Clock, CloseDecision, CloseKind, ConnectionState, Inbound, LandmarkFrame, ProtocolError,
    ReconnectPolicy, ReconnectTracker, Scheduler, TimerEvent, TimerHandle, decode_message,
};

use crate::error::StreamError;

/// Endpoint of the reference tracking server.
pub const DEFAULT_ENDPOINT: &str = "ws://localhost:8000/ws";

/// Default bound on a single connect handshake.
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 5_000;

/// Close reason sent on deliberate disconnect.
const MANUAL_DISCONNECT: &str = "Manual disconnect";

/// Log a progress line every this many frames.
const FRAME_LOG_INTERVAL: u64 = 60;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

type Dial = Pin<Box<dyn Future<Output = Result<WsStream, StreamError>> + Send>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamConfig {
    pub endpoint: String,
    pub reconnect: ReconnectPolicy,
    pub connect_timeout_ms: u64,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            reconnect: ReconnectPolicy::default(),
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
        }
    }
}

impl StreamConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            ..Default::default()
        }
    }
}

/// A decoded frame, or `frame: None` when no hand is in view.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameUpdate {
    pub frame: Option<LandmarkFrame>,
    pub frame_count: u64,
}

/// Connection state plus the most recent error, if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusUpdate {
    pub state: ConnectionState,
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    Frame(FrameUpdate),
    Status(StatusUpdate),
}

/// Raw outcome of one socket read or connect attempt.
#[derive(Debug)]
pub enum SocketEvent {
    /// The handshake completed.
    Opened(OpenedSocket),
    /// The handshake failed or timed out.
    ConnectFailed(StreamError),
    Message(Message),
    Closed {
        code: Option<u16>,
        reason: Option<String>,
    },
    Error(StreamError),
}

/// A freshly opened stream, handed back through `handle_socket_event`.
pub struct OpenedSocket(WsStream);

impl fmt::Debug for OpenedSocket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("OpenedSocket")
    }
}

pub struct LandmarkClient {
    config: StreamConfig,
    clock: Arc<dyn Clock>,
    state: ConnectionState,
    tracker: ReconnectTracker,
    reconnect_timer: Option<TimerHandle>,
    socket: Option<WsStream>,
    connecting: Option<Dial>,
    frame_count: u64,
    current: Option<LandmarkFrame>,
    last_error: Option<String>,
    events: mpsc::UnboundedSender<StreamEvent>,
}

impl LandmarkClient {
    pub fn new(
        config: StreamConfig,
        clock: Arc<dyn Clock>,
    ) -> (Self, mpsc::UnboundedReceiver<StreamEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        let tracker = ReconnectTracker::new(config.reconnect.clone());
        let client = Self {
            config,
            clock,
            state: ConnectionState::Disconnected,
            tracker,
            reconnect_timer: None,
            socket: None,
            connecting: None,
            frame_count: 0,
            current: None,
            last_error: None,
            events,
        };
        (client, rx)
    }

    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    pub fn current_frame(&self) -> Option<&LandmarkFrame> {
        self.current.as_ref()
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Reconnect attempts scheduled since the last successful open.
    pub fn attempts(&self) -> u32 {
        self.tracker.attempts()
    }

    pub fn reconnect_pending(&self) -> bool {
        self.reconnect_timer.is_some()
    }

    /// Start connecting. Cancels a pending retry and restores the retry
    /// budget, which is also the way out of `Failed`. The outcome arrives
    /// through [`Self::next_socket_event`].
    pub fn connect<S: Scheduler + ?Sized>(&mut self, timers: &mut S) {
        if matches!(
            self.state,
            ConnectionState::Connected | ConnectionState::Connecting
        ) {
            tracing::debug!(state = %self.state, "connect ignored, already active");
            return;
        }
        self.cancel_reconnect(timers);
        self.tracker.reset();
        self.begin_connect();
    }

    /// Close deliberately and suppress auto-reconnect. Idempotent.
    pub async fn disconnect<S: Scheduler + ?Sized>(&mut self, timers: &mut S) {
        self.cancel_reconnect(timers);
        if self.connecting.take().is_some() {
            tracing::debug!(endpoint = %self.config.endpoint, "pending connect abandoned");
        }
        if let Some(mut ws) = self.socket.take() {
            tracing::info!(endpoint = %self.config.endpoint, "closing landmark stream");
            let frame = CloseFrame {
                code: CloseCode::Normal,
                reason: MANUAL_DISCONNECT.into(),
            };
            if let Err(e) = ws.close(Some(frame)).await {
                tracing::debug!(error = %e, "close handshake failed");
            }
        }
        self.tracker.reset();
        self.clear_frame();
        self.last_error = None;
        if self.state != ConnectionState::Disconnected {
            self.transition(ConnectionState::Disconnected, None);
        }
    }

    /// Wait for the next socket event: the outcome of a pending connect, or
    /// the next read. Pends forever while neither is in flight.
    pub async fn next_socket_event(&mut self) -> SocketEvent {
        if let Some(dial) = self.connecting.as_mut() {
            let result = dial.await;
            self.connecting = None;
            return match result {
                Ok(ws) => SocketEvent::Opened(OpenedSocket(ws)),
                Err(e) => SocketEvent::ConnectFailed(e),
            };
        }
        let Some(ws) = self.socket.as_mut() else {
            return std::future::pending::<SocketEvent>().await;
        };
        match ws.next().await {
            Some(Ok(Message::Close(frame))) => SocketEvent::Closed {
                code: frame.as_ref().map(|f| u16::from(f.code)),
                reason: frame.map(|f| f.reason.into_owned()),
            },
            Some(Ok(msg)) => SocketEvent::Message(msg),
            Some(Err(e)) => SocketEvent::Error(StreamError::Transport(e)),
            None => SocketEvent::Closed {
                code: None,
                reason: None,
            },
        }
    }

    pub async fn handle_socket_event<S: Scheduler + ?Sized>(
        &mut self,
        event: SocketEvent,
        timers: &mut S,
    ) {
        match event {
            SocketEvent::Opened(OpenedSocket(ws)) => {
                self.socket = Some(ws);
                self.tracker.record_open();
                tracing::info!(endpoint = %self.config.endpoint, "landmark stream connected");
                self.transition(ConnectionState::Connected, None);
            }
            SocketEvent::ConnectFailed(e) => {
                tracing::warn!(endpoint = %self.config.endpoint, error = %e, "landmark stream connect failed");
                self.handle_close(None, Some(e.to_string()), timers);
            }
            SocketEvent::Message(Message::Text(text)) => self.handle_text(&text),
            SocketEvent::Message(Message::Ping(payload)) => {
                if let Some(ws) = self.socket.as_mut()
                    && let Err(e) = ws.send(Message::Pong(payload)).await
                {
                    tracing::debug!(error = %e, "pong failed");
                }
            }
            SocketEvent::Message(_) => {}
            SocketEvent::Closed { code, reason } => self.handle_close(code, reason, timers),
            SocketEvent::Error(e) => {
                tracing::warn!(error = %e, "landmark stream read failed");
                self.handle_close(None, Some(e.to_string()), timers);
            }
        }
    }

    /// A reconnect timer fired. Stale handles are ignored.
    pub fn handle_reconnect_timer<S: Scheduler + ?Sized>(
        &mut self,
        handle: TimerHandle,
        timers: &mut S,
    ) {
        if self.reconnect_timer != Some(handle) {
            tracing::debug!("ignoring stale reconnect timer");
            return;
        }
        self.reconnect_timer = None;
        if self.state != ConnectionState::Disconnected {
            return;
        }
        tracing::info!(
            attempt = self.tracker.attempts(),
            max_attempts = self.tracker.policy().max_attempts,
            "reconnecting to landmark stream"
        );
        self.begin_connect();
    }

    /// Decode and deliver one text message.
    pub fn handle_text(&mut self, text: &str) {
        match decode_message(text) {
            Ok(Inbound::Frame { frame, frame_count }) => {
                self.frame_count = frame_count;
                if frame_count > 0 && frame_count % FRAME_LOG_INTERVAL == 0 {
                    tracing::debug!(frame_count, hand = frame.is_some(), "landmark frames received");
                }
                self.current = frame.clone();
                self.emit(StreamEvent::Frame(FrameUpdate { frame, frame_count }));
            }
            Ok(Inbound::ServerError(message)) => {
                let err = ProtocolError::Server(message.clone());
                tracing::warn!(error = %err, "tracking service error");
                self.last_error = Some(message);
                self.current = None;
                self.transition(self.state, None);
                self.emit(StreamEvent::Frame(FrameUpdate {
                    frame: None,
                    frame_count: self.frame_count,
                }));
            }
            Err(e) => {
                tracing::warn!(error = %e, "dropping malformed landmark message");
            }
        }
    }

    /// The connection ended, either by close frame, read error or a failed
    /// connect. Decides between staying down, retrying and giving up.
    pub fn handle_close<S: Scheduler + ?Sized>(
        &mut self,
        code: Option<u16>,
        reason: Option<String>,
        timers: &mut S,
    ) {
        self.socket = None;
        self.connecting = None;
        self.clear_frame();
        tracing::info!(code = ?code, reason = reason.as_deref().unwrap_or(""), "landmark stream closed");

        match self.tracker.record_close(CloseKind::from_code(code)) {
            CloseDecision::Stay => {
                self.cancel_reconnect(timers);
                self.transition(ConnectionState::Disconnected, None);
            }
            CloseDecision::Reconnect { attempt, after_ms } => {
                tracing::info!(
                    attempt,
                    max_attempts = self.tracker.policy().max_attempts,
                    after_ms,
                    "scheduling reconnect"
                );
                let handle = timers.schedule(
                    self.clock.now_ms(),
                    after_ms,
                    TimerEvent::Reconnect { attempt },
                );
                if let Some(previous) = self.reconnect_timer.replace(handle) {
                    timers.cancel(previous);
                }
                let error = close_error(code, reason);
                self.transition(ConnectionState::Disconnected, Some(error));
            }
            CloseDecision::GiveUp { attempts } => {
                tracing::error!(attempts, endpoint = %self.config.endpoint, "{RETRIES_EXHAUSTED}");
                self.cancel_reconnect(timers);
                self.transition(ConnectionState::Failed, Some(RETRIES_EXHAUSTED.to_string()));
            }
        }
    }

    fn begin_connect(&mut self) {
        self.last_error = None;
        self.transition(ConnectionState::Connecting, None);
        tracing::info!(endpoint = %self.config.endpoint, "connecting to landmark stream");
        self.connecting = Some(Box::pin(dial(
            self.config.endpoint.clone(),
            self.config.connect_timeout_ms,
        )));
    }

    fn cancel_reconnect<S: Scheduler + ?Sized>(&mut self, timers: &mut S) {
        if let Some(handle) = self.reconnect_timer.take() {
            timers.cancel(handle);
            tracing::debug!("pending reconnect cancelled");
        }
    }

    fn clear_frame(&mut self) {
        if self.current.take().is_some() {
            self.emit(StreamEvent::Frame(FrameUpdate {
                frame: None,
                frame_count: self.frame_count,
            }));
        }
    }

    fn transition(&mut self, state: ConnectionState, error: Option<String>) {
        self.state = state;
        if error.is_some() {
            self.last_error = error;
        }
        self.emit(StreamEvent::Status(StatusUpdate {
            state,
            error: self.last_error.clone(),
        }));
    }

    fn emit(&self, event: StreamEvent) {
        // Nobody listening is fine; the client stays queryable.
        let _ = self.events.send(event);
    }
}

async fn dial(endpoint: String, timeout_ms: u64) -> Result<WsStream, StreamError> {
    let timeout = Duration::from_millis(timeout_ms);
    let result =
        tokio::time::timeout(timeout, tokio_tungstenite::connect_async(endpoint.as_str())).await;
    match result {
        Ok(Ok((ws, _response))) => Ok(ws),
        Ok(Err(e)) => Err(e.into()),
        Err(_) => Err(StreamError::Timeout {
            endpoint,
            timeout_ms,
        }),
    }
}

fn close_error(code: Option<u16>, reason: Option<String>) -> String {
    match (code, reason.filter(|r| !r.is_empty())) {
        (_, Some(reason)) => reason,
        (Some(code), None) => format!("connection closed with code {code}"),
        (None, None) => "connection lost".to_string(),
    }
}
