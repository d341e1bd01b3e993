//! Single-task event loop: socket messages, due timers and signals are
//! handled one at a time, so selection and connection state need no locks.

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chrono::Utc;
use handray_core::{
    Clock, ConnectionState, MonotonicClock, PerspectiveCamera, SelectionOrchestrator,
    SelectionSignal, SelectionUpdate, TargetSet, TimerEvent, TimerQueue,
};
use handray_stream::{FrameUpdate, LandmarkClient, StatusUpdate, StreamEvent};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio_util::sync::CancellationToken;

use crate::config::AppConfig;
use crate::publish::{PublishedSignal, SignalWriter};

/// Run until ctrl-c or SIGTERM, writing signals to stdout.
pub async fn run(config: AppConfig) -> anyhow::Result<()> {
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    tokio::spawn(async move {
        wait_for_shutdown().await;
        token.cancel();
    });

    let clock: Arc<dyn Clock> = Arc::new(MonotonicClock::new());
    let mut engine = Engine::new(&config, clock, std::io::stdout())?;
    engine.run(&cancel).await
}

pub struct Engine<W: Write> {
    clock: Arc<dyn Clock>,
    timers: TimerQueue,
    client: LandmarkClient,
    events: UnboundedReceiver<StreamEvent>,
    orchestrator: SelectionOrchestrator,
    camera: PerspectiveCamera,
    targets: TargetSet,
    writer: SignalWriter<W>,
    last_signal: Option<SelectionSignal>,
}

impl<W: Write> Engine<W> {
    pub fn new(config: &AppConfig, clock: Arc<dyn Clock>, out: W) -> anyhow::Result<Self> {
        let targets = config.target_set().context("building target set")?;
        let (client, events) = LandmarkClient::new(config.stream_config(), clock.clone());
        Ok(Self {
            clock,
            timers: TimerQueue::new(),
            client,
            events,
            orchestrator: SelectionOrchestrator::new(config.selection_config()),
            camera: config.camera(),
            targets,
            writer: SignalWriter::new(out),
            last_signal: None,
        })
    }

    #[cfg(test)]
    pub fn writer(&self) -> &SignalWriter<W> {
        &self.writer
    }

    #[cfg(test)]
    pub fn client(&self) -> &LandmarkClient {
        &self.client
    }

    pub async fn run(&mut self, cancel: &CancellationToken) -> anyhow::Result<()> {
        let mut reconnect = ReconnectSignal::new();

        tracing::info!(
            endpoint = %self.client.config().endpoint,
            targets = self.targets.len(),
            hold_ms = self.orchestrator.config().dwell.hold_ms,
            mirror_x = self.orchestrator.config().mirror_x,
            "selection engine starting"
        );
        self.client.connect(&mut self.timers);
        self.drain_events()?;

        loop {
            let delay = self
                .timers
                .next_deadline_ms()
                .map(|deadline| Duration::from_millis(deadline.saturating_sub(self.clock.now_ms())));
            let next_timer = async move {
                match delay {
                    Some(delay) => tokio::time::sleep(delay).await,
                    None => std::future::pending::<()>().await,
                }
            };

            tokio::select! {
                () = cancel.cancelled() => break,
                event = self.client.next_socket_event() => {
                    self.client.handle_socket_event(event, &mut self.timers).await;
                }
                () = next_timer => self.fire_due_timers()?,
                () = reconnect.recv() => {
                    tracing::info!("reconnect requested");
                    self.client.connect(&mut self.timers);
                }
            }
            self.drain_events()?;
        }

        self.shutdown().await
    }

    fn fire_due_timers(&mut self) -> anyhow::Result<()> {
        let now = self.clock.now_ms();
        while let Some((handle, event)) = self.timers.pop_due(now) {
            match &event {
                TimerEvent::HoldExpired { target } => {
                    if let Some(update) =
                        self.orchestrator.on_timer(handle, &event, now, &mut self.timers)
                    {
                        tracing::debug!(target_id = %target, "dwell window elapsed");
                        self.log_transition(&update);
                        self.publish(update.signal)?;
                    }
                }
                TimerEvent::Reconnect { attempt } => {
                    tracing::debug!(attempt, "reconnect timer fired");
                    self.client.handle_reconnect_timer(handle, &mut self.timers);
                }
            }
            self.drain_events()?;
        }
        Ok(())
    }

    fn drain_events(&mut self) -> anyhow::Result<()> {
        while let Ok(event) = self.events.try_recv() {
            match event {
                StreamEvent::Frame(update) => self.on_frame(update)?,
                StreamEvent::Status(status) => self.on_status(status)?,
            }
        }
        Ok(())
    }

    fn on_frame(&mut self, update: FrameUpdate) -> anyhow::Result<()> {
        let now = self.clock.now_ms();
        let selection = self.orchestrator.process_frame(
            update.frame.as_ref(),
            &self.camera,
            self.targets.targets(),
            now,
            &mut self.timers,
        );
        self.log_transition(&selection);
        self.publish(selection.signal)
    }

    fn on_status(&mut self, status: StatusUpdate) -> anyhow::Result<()> {
        match status.state {
            ConnectionState::Failed => tracing::error!(
                error = status.error.as_deref().unwrap_or(""),
                "landmark stream failed; send SIGHUP to retry"
            ),
            state => tracing::info!(
                connection_state = %state,
                error = status.error.as_deref().unwrap_or(""),
                "connection status"
            ),
        }
        let signal = match self.last_signal.clone() {
            Some(signal) => signal,
            None => self.orchestrator.snapshot(self.clock.now_ms()),
        };
        self.write_line(signal, status.state, status.error)
    }

    fn log_transition(&self, update: &SelectionUpdate) {
        if !update.transition.changed {
            return;
        }
        let state = &update.transition.state;
        let target = state.active_target.as_ref().map(|t| t.as_str()).unwrap_or("");
        tracing::info!(
            phase = ?state.phase,
            target_id = target,
            previous = ?update.transition.previous.phase,
            "selection changed"
        );
    }

    fn publish(&mut self, signal: SelectionSignal) -> anyhow::Result<()> {
        let state = self.client.state();
        let error = self.client.last_error().map(str::to_owned);
        self.write_line(signal, state, error)
    }

    /// Status lines carry the state they announce, which may already be
    /// stale on the client by the time the event is drained.
    fn write_line(
        &mut self,
        signal: SelectionSignal,
        connection_state: ConnectionState,
        last_error: Option<String>,
    ) -> anyhow::Result<()> {
        let line = PublishedSignal {
            signal: signal.clone(),
            connection_state,
            frame_count: self.client.frame_count(),
            last_error,
            updated_at: Utc::now(),
        };
        self.last_signal = Some(signal);
        self.writer.publish(&line).context("writing selection signal")
    }

    async fn shutdown(&mut self) -> anyhow::Result<()> {
        self.client.disconnect(&mut self.timers).await;
        self.drain_events()?;
        let update = self.orchestrator.reset(self.clock.now_ms(), &mut self.timers);
        self.publish(update.signal)?;
        tracing::info!(signals = self.writer.written(), "selection engine stopped");
        Ok(())
    }
}

/// SIGHUP: manual reconnect, the way out of `Failed`.
struct ReconnectSignal {
    #[cfg(unix)]
    hangup: Option<tokio::signal::unix::Signal>,
}

impl ReconnectSignal {
    fn new() -> Self {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{SignalKind, signal};
            let hangup = match signal(SignalKind::hangup()) {
                Ok(sig) => Some(sig),
                Err(e) => {
                    tracing::warn!(error = %e, "SIGHUP handler unavailable");
                    None
                }
            };
            Self { hangup }
        }
        #[cfg(not(unix))]
        {
            Self {}
        }
    }

    async fn recv(&mut self) {
        #[cfg(unix)]
        if let Some(sig) = self.hangup.as_mut() {
            if sig.recv().await.is_some() {
                return;
            }
        }
        std::future::pending::<()>().await
    }
}

async fn wait_for_shutdown() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => tokio::select! {
                _ = ctrl_c => tracing::info!("received ctrl-c, shutting down"),
                _ = sigterm.recv() => tracing::info!("received SIGTERM, shutting down"),
            },
            Err(e) => {
                tracing::warn!(error = %e, "SIGTERM handler unavailable");
                ctrl_c.await.ok();
                tracing::info!("received ctrl-c, shutting down");
            }
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        tracing::info!("received ctrl-c, shutting down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::{SinkExt, StreamExt};
    use tokio::net::TcpListener;
    use tokio_tungstenite::tungstenite::Message;
    use tokio_tungstenite::tungstenite::protocol::CloseFrame;
    use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;

    /// Fingertip at raw `(0.5, 0.31)` points at the center bulb.
    fn center_frame(frame_count: u64) -> String {
        let landmarks: Vec<_> = (0..21)
            .map(|_| serde_json::json!({"x": 0.5, "y": 0.31, "z": 0.0}))
            .collect();
        serde_json::json!({"landmarks": landmarks, "frame_count": frame_count}).to_string()
    }

    /// Sends `messages`, closes with 1000 and signals `done`.
    async fn one_shot_server(messages: Vec<String>, done: CancellationToken) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
            for msg in messages {
                ws.send(Message::Text(msg)).await.unwrap();
            }
            let frame = CloseFrame {
                code: CloseCode::Normal,
                reason: "done".into(),
            };
            ws.close(Some(frame)).await.ok();
            while let Some(Ok(_)) = ws.next().await {}
            done.cancel();
        });
        format!("ws://127.0.0.1:{port}/ws")
    }

    /// First connection gets `messages` and is dropped without a close frame;
    /// the next one is accepted over TCP and never answers the upgrade.
    async fn drop_then_stall_server(messages: Vec<String>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
            for msg in messages {
                ws.send(Message::Text(msg)).await.unwrap();
            }
            drop(ws);
            let (_stalled, _) = listener.accept().await.unwrap();
            std::future::pending::<()>().await;
        });
        format!("ws://127.0.0.1:{port}/ws")
    }

    fn lines(engine: &Engine<Vec<u8>>) -> Vec<serde_json::Value> {
        String::from_utf8(engine.writer().get_ref().clone())
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn pointing_frames_select_then_release_on_close() {
        let served = CancellationToken::new();
        let endpoint = one_shot_server(
            vec![center_frame(1), center_frame(2), center_frame(3)],
            served.clone(),
        )
        .await;

        let mut config = AppConfig::default();
        config.stream.endpoint = endpoint;
        config.dwell.hold_ms = 200;
        let clock: Arc<dyn Clock> = Arc::new(MonotonicClock::new());
        let mut engine = Engine::new(&config, clock, Vec::new()).unwrap();

        let cancel = CancellationToken::new();
        let stop = cancel.clone();
        tokio::spawn(async move {
            served.cancelled().await;
            // Let the hold window lapse before stopping.
            tokio::time::sleep(Duration::from_millis(600)).await;
            stop.cancel();
        });

        tokio::time::timeout(Duration::from_secs(10), engine.run(&cancel))
            .await
            .expect("engine stops after cancel")
            .unwrap();

        let out = lines(&engine);
        let pointing = out
            .iter()
            .find(|v| v["pointing"] == true)
            .expect("a pointing signal");
        assert_eq!(pointing["selection"]["phase"], "pointing");
        assert_eq!(pointing["selection"]["active_target"], "bulb-2");
        assert_eq!(pointing["hit"]["target_id"], "bulb-2");
        assert_eq!(pointing["connection_state"], "connected");

        assert!(
            out.iter().any(|v| v["selection"]["phase"] == "held"),
            "closing the stream holds the selection"
        );
        let last = out.last().unwrap();
        assert_eq!(last["selection"]["phase"], "idle");
        assert_eq!(last["connection_state"], "disconnected");
        assert_eq!(engine.client().state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn unreachable_endpoint_publishes_status_and_stops_cleanly() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let mut config = AppConfig::default();
        config.stream.endpoint = format!("ws://127.0.0.1:{port}/ws");
        let clock: Arc<dyn Clock> = Arc::new(MonotonicClock::new());
        let mut engine = Engine::new(&config, clock, Vec::new()).unwrap();

        let cancel = CancellationToken::new();
        let stop = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            stop.cancel();
        });
        engine.run(&cancel).await.unwrap();

        let out = lines(&engine);
        assert_eq!(out[0]["connection_state"], "connecting");
        assert_eq!(out[0]["selection"]["phase"], "idle");
        assert!(out.iter().any(|v| v["connection_state"] == "connecting"));
        assert!(
            out.iter()
                .any(|v| v["connection_state"] == "disconnected" && v["last_error"].is_string()),
            "failed connect reports an error"
        );
        assert_eq!(engine.client().attempts(), 0, "shutdown cancels the retry");
        assert!(!engine.client().reconnect_pending());
    }

    #[tokio::test]
    async fn hold_expires_on_time_while_reconnect_handshake_stalls() {
        let endpoint = drop_then_stall_server(vec![center_frame(1)]).await;

        let mut config = AppConfig::default();
        config.stream.endpoint = endpoint;
        config.stream.base_delay_ms = 100;
        config.stream.connect_timeout_ms = 4_000;
        config.dwell.hold_ms = 1_000;
        let clock: Arc<dyn Clock> = Arc::new(MonotonicClock::new());
        let mut engine = Engine::new(&config, clock, Vec::new()).unwrap();

        let cancel = CancellationToken::new();
        let stop = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(1_800)).await;
            stop.cancel();
        });
        tokio::time::timeout(Duration::from_secs(10), engine.run(&cancel))
            .await
            .expect("engine stops after cancel")
            .unwrap();

        let out = lines(&engine);
        let stamp = |v: &serde_json::Value| {
            v["updated_at"]
                .as_str()
                .unwrap()
                .parse::<chrono::DateTime<Utc>>()
                .unwrap()
        };
        let start = out
            .iter()
            .position(|v| v["pointing"] == true)
            .expect("a pointing signal");
        let released = out[start..]
            .iter()
            .find(|v| v["selection"]["phase"] == "idle")
            .expect("selection released");

        let elapsed = (stamp(released) - stamp(&out[start])).num_milliseconds();
        assert!(elapsed < 1_500, "hold released after {elapsed} ms");
        assert_eq!(released["connection_state"], "connecting");
    }
}
