//! Push-hint listener.
//!
//! Connects to the QX backend's Socket.IO endpoint and turns state-change
//! events into [`WakeHint`] signals. Event payloads are ignored: a hint only
//! makes pending pollers look at the ledger sooner. Losing the connection
//! never affects correctness, only latency, so the listener reconnects with
//! exponential backoff and eventually gives up quietly.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use parking_lot::RwLock;
use rand::Rng;
use qxmon_monitor::WakeHint;
use qxmon_telemetry::Metrics;
use serde::{Deserialize, Serialize};
use tokio::net::TcpStream;
use tokio::time::{sleep_until, Instant};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async_tls_with_config, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::error::{NotifyError, NotifyResult};
use crate::packet::{EnginePacket, SocketPacket, DEFAULT_NAMESPACE};

type WsWrite = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;

/// Listener configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotifierConfig {
    /// Socket.IO server. `http(s)://` is rewritten to `ws(s)://` and the
    /// Engine.IO path is appended unless already present.
    #[serde(default)]
    pub url: String,

    /// Events that fire a wake hint.
    #[serde(default = "default_events")]
    pub events: Vec<String>,

    #[serde(default = "default_namespace")]
    pub namespace: String,

    /// Maximum reconnection attempts (0 = infinite). Default: 5.
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,

    /// Base delay for exponential backoff (ms). Default: 5000.
    #[serde(default = "default_reconnect_base_delay_ms")]
    pub reconnect_base_delay_ms: u64,

    /// Maximum delay for exponential backoff (ms). Default: 60,000.
    #[serde(default = "default_reconnect_max_delay_ms")]
    pub reconnect_max_delay_ms: u64,

    /// Upper bound of random jitter added to each backoff (ms).
    #[serde(default = "default_reconnect_jitter_ms")]
    pub reconnect_jitter_ms: u64,

    /// Time allowed for the handshake to complete (ms).
    #[serde(default = "default_handshake_timeout_ms")]
    pub handshake_timeout_ms: u64,
}

fn default_events() -> Vec<String> {
    ["trades_updated", "transfers_updated", "epoch_synced"]
        .into_iter()
        .map(str::to_string)
        .collect()
}

fn default_namespace() -> String {
    DEFAULT_NAMESPACE.to_string()
}

fn default_max_reconnect_attempts() -> u32 {
    5
}

fn default_reconnect_base_delay_ms() -> u64 {
    5_000
}

fn default_reconnect_max_delay_ms() -> u64 {
    60_000
}

fn default_reconnect_jitter_ms() -> u64 {
    1_000
}

fn default_handshake_timeout_ms() -> u64 {
    20_000
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            events: default_events(),
            namespace: default_namespace(),
            max_reconnect_attempts: default_max_reconnect_attempts(),
            reconnect_base_delay_ms: default_reconnect_base_delay_ms(),
            reconnect_max_delay_ms: default_reconnect_max_delay_ms(),
            reconnect_jitter_ms: default_reconnect_jitter_ms(),
            handshake_timeout_ms: default_handshake_timeout_ms(),
        }
    }
}

impl NotifierConfig {
    /// Websocket URL for the Engine.IO v4 transport.
    pub fn socket_url(&self) -> String {
        let url = self.url.trim_end_matches('/');
        let url = if let Some(rest) = url.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = url.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            url.to_string()
        };

        if url.contains("/socket.io") {
            url
        } else {
            format!("{url}/socket.io/?EIO=4&transport=websocket")
        }
    }

    fn wants(&self, event: &str) -> bool {
        self.events.iter().any(|e| e == event)
    }
}

/// Listener connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

/// Socket.IO listener feeding a [`WakeHint`].
pub struct HintListener {
    config: NotifierConfig,
    hint: WakeHint,
    state: Arc<RwLock<ListenerState>>,
    reconnect_count: Arc<RwLock<u32>>,
    connected_once: AtomicBool,
    shutdown_token: CancellationToken,
}

impl HintListener {
    pub fn new(config: NotifierConfig, hint: WakeHint) -> Self {
        Self {
            config,
            hint,
            state: Arc::new(RwLock::new(ListenerState::Disconnected)),
            reconnect_count: Arc::new(RwLock::new(0)),
            connected_once: AtomicBool::new(false),
            shutdown_token: CancellationToken::new(),
        }
    }

    pub fn state(&self) -> ListenerState {
        *self.state.read()
    }

    pub fn reconnect_count(&self) -> u32 {
        *self.reconnect_count.read()
    }

    /// Stop the listener. `run` returns promptly.
    pub fn shutdown(&self) {
        info!("Hint listener shutdown requested");
        self.shutdown_token.cancel();
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown_token.is_cancelled()
    }

    /// Connect and listen until shutdown or until reconnection attempts
    /// are exhausted.
    pub async fn run(&self) -> NotifyResult<()> {
        let mut attempt = 0u32;

        loop {
            if self.is_shutdown() {
                self.set_state(ListenerState::Disconnected);
                return Ok(());
            }

            self.set_state(ListenerState::Connecting);

            let reason = match self.try_connect().await {
                Ok(()) => {
                    info!("Push channel closed");
                    "closed"
                }
                Err(e) => {
                    warn!(error = %e, "Push channel error");
                    e.kind()
                }
            };
            Metrics::notify_disconnected();

            if self.is_shutdown() {
                info!("Shutdown requested after disconnect, not reconnecting");
                self.set_state(ListenerState::Disconnected);
                return Ok(());
            }

            // A session that got connected resets the budget.
            if *self.reconnect_count.read() == 0 && self.connected_once.load(Ordering::Acquire) {
                attempt = 0;
            }
            attempt += 1;
            *self.reconnect_count.write() = attempt;

            if self.config.max_reconnect_attempts > 0
                && attempt >= self.config.max_reconnect_attempts
            {
                error!(attempt, "Max push reconnection attempts reached, polling only");
                self.set_state(ListenerState::Disconnected);
                return Err(NotifyError::ConnectionFailed(
                    "Max reconnection attempts reached".to_string(),
                ));
            }

            self.set_state(ListenerState::Reconnecting);
            Metrics::notify_reconnect(reason);

            let delay = self.backoff_delay(attempt);
            warn!(attempt, delay_ms = delay.as_millis() as u64, "Reconnecting push channel");

            tokio::select! {
                () = tokio::time::sleep(delay) => {}
                () = self.shutdown_token.cancelled() => {
                    info!("Shutdown requested during backoff, exiting");
                    self.set_state(ListenerState::Disconnected);
                    return Ok(());
                }
            }
        }
    }

    async fn try_connect(&self) -> NotifyResult<()> {
        let url = self.config.socket_url();
        info!(url = %url, "Connecting push channel");

        let (ws_stream, _response) = tokio::select! {
            result = connect_async_tls_with_config(url.as_str(), None, true, None) => result?,
            () = self.shutdown_token.cancelled() => return Ok(()),
        };
        let (mut write, mut read) = ws_stream.split();

        let mut connected = false;
        let mut heartbeat_window = Duration::from_millis(self.config.handshake_timeout_ms);
        let mut deadline = Instant::now() + heartbeat_window;

        loop {
            tokio::select! {
                biased;

                () = self.shutdown_token.cancelled() => {
                    info!("Shutdown signal received in push loop");
                    if let Err(e) = write.send(Message::Close(None)).await {
                        warn!(?e, "Failed to send Close frame during shutdown");
                    }
                    self.set_state(ListenerState::Disconnected);
                    return Ok(());
                }

                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            let packet = match EnginePacket::parse(&text) {
                                Ok(packet) => packet,
                                Err(e) => {
                                    warn!(error = %e, "Ignoring malformed push packet");
                                    continue;
                                }
                            };
                            match packet {
                                EnginePacket::Open(handshake) => {
                                    debug!(sid = %handshake.sid, "Engine handshake received");
                                    heartbeat_window = handshake.heartbeat_window();
                                    deadline = Instant::now() + heartbeat_window;
                                    let frame = SocketPacket::connect_frame(&self.config.namespace);
                                    write.send(Message::Text(frame)).await?;
                                }
                                EnginePacket::Ping(payload) => {
                                    trace!("Engine ping, sending pong");
                                    deadline = Instant::now() + heartbeat_window;
                                    write.send(Message::Text(EnginePacket::pong_frame(&payload))).await?;
                                }
                                EnginePacket::Close => {
                                    return Err(NotifyError::ConnectionClosed {
                                        code: 1000,
                                        reason: "engine close".to_string(),
                                    });
                                }
                                EnginePacket::Message(packet) => {
                                    if self.handle_socket_packet(packet, &mut connected)? {
                                        deadline = Instant::now() + heartbeat_window;
                                    }
                                }
                                EnginePacket::Pong(_) | EnginePacket::Upgrade | EnginePacket::Noop => {}
                            }
                        }
                        Some(Ok(Message::Ping(data))) => {
                            write.send(Message::Pong(data)).await?;
                        }
                        Some(Ok(Message::Close(frame))) => {
                            let (code, reason) = frame
                                .map(|f| (f.code.into(), f.reason.to_string()))
                                .unwrap_or((1000, "Normal close".to_string()));
                            warn!(code, %reason, "Push channel closed by server");
                            return Err(NotifyError::ConnectionClosed { code, reason });
                        }
                        Some(Err(e)) => return Err(e.into()),
                        None => {
                            warn!("Push stream ended");
                            return Ok(());
                        }
                        _ => {}
                    }
                }

                () = sleep_until(deadline) => {
                    if connected {
                        error!("No ping from push server within heartbeat window");
                    } else {
                        error!("Push handshake timed out");
                    }
                    return Err(NotifyError::HeartbeatTimeout);
                }
            }
        }
    }

    /// Returns true when the packet counts as server liveness.
    fn handle_socket_packet(&self, packet: SocketPacket, connected: &mut bool) -> NotifyResult<bool> {
        match packet {
            SocketPacket::Connect { namespace, sid } => {
                *connected = true;
                *self.reconnect_count.write() = 0;
                self.set_state(ListenerState::Connected);
                Metrics::notify_connected();
                info!(%namespace, sid = sid.as_deref().unwrap_or(""), "Push channel connected");

                // Anything may have changed while we were away.
                if self.connected_once.swap(true, Ordering::AcqRel) {
                    Metrics::notify_hint("reconnected");
                    self.hint.notify();
                }
                Ok(true)
            }
            SocketPacket::Event { name, .. } => {
                if self.config.wants(&name) {
                    debug!(event = %name, "State change hint");
                    Metrics::notify_hint(&name);
                    self.hint.notify();
                } else {
                    trace!(event = %name, "Ignoring push event");
                }
                Ok(true)
            }
            SocketPacket::Disconnect { namespace } => Err(NotifyError::ConnectionClosed {
                code: 1000,
                reason: format!("namespace {namespace} disconnected"),
            }),
            SocketPacket::ConnectError { message, .. } => Err(NotifyError::Protocol(format!(
                "namespace connect refused: {message}"
            ))),
            SocketPacket::Ack { .. } => Ok(false),
        }
    }

    fn set_state(&self, state: ListenerState) {
        *self.state.write() = state;
    }

    fn backoff_delay(&self, attempt: u32) -> Duration {
        let base = self.config.reconnect_base_delay_ms;
        let max = self.config.reconnect_max_delay_ms;

        // base * 2^(attempt-1), capped
        let exponent = attempt.saturating_sub(1).min(10);
        let delay = base.saturating_mul(1u64 << exponent).min(max);

        Duration::from_millis(delay + rand_jitter(self.config.reconnect_jitter_ms))
    }
}

/// Random jitter in `0..=max_ms`, drawn independently per call.
fn rand_jitter(max_ms: u64) -> u64 {
    if max_ms == 0 {
        return 0;
    }
    rand::thread_rng().gen_range(0..=max_ms)
}
