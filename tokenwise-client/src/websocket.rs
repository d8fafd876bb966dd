//! TokenWise transaction stream client
//!
//! Keeps one connection to the backend's `/ws/transactions` endpoint open,
//! sends the heartbeat, reconnects after a close and decodes inbound frames
//! into [`StreamUpdate`]s for subscribers.

use std::time::{Duration, Instant};

use futures_util::{SinkExt, StreamExt};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

use tokenwise_core::{ClientCommand, ServerFrame, TokenwiseError, TokenwiseResult};

use crate::config::{ClientConfig, StreamTiming};
use crate::lifecycle::{LifecycleAction, StreamLifecycle};

/// Capacity of the update broadcast channel
const UPDATE_CHANNEL_CAPACITY: usize = 1024;

/// Capacity of the outbound command queue
const COMMAND_CHANNEL_CAPACITY: usize = 100;

/// Sleep used when the lifecycle has no pending deadline
const IDLE_WAKE: Duration = Duration::from_secs(3600);

// ============================================================================
// Updates (sent to the engine)
// ============================================================================

/// Event emitted by the stream client
#[derive(Debug, Clone)]
pub enum StreamUpdate {
    /// A connection attempt started
    Connecting,
    /// The connection is open
    Opened,
    /// The connection closed; `reconnect_in` is the scheduled retry, if any
    Closed { reconnect_in: Option<Duration> },
    /// Transport-level failure (connect failure, read or write error)
    TransportError { error: String },
    /// A decoded inbound frame
    Frame(ServerFrame),
    /// An inbound frame that could not be decoded; the connection stays up
    DecodeError { error: String },
}

/// Commands sent to the connection task
#[derive(Debug)]
enum StreamCommand {
    Send(ClientCommand),
    Shutdown,
}

enum SessionEnd {
    Closed,
    Shutdown,
}

enum ConnectOutcome<S> {
    Connected(S),
    Failed(String),
    Shutdown,
}

// ============================================================================
// Stream Client
// ============================================================================

/// Real-time transaction stream client
pub struct TransactionStream {
    url: String,
    timing: StreamTiming,
    update_tx: broadcast::Sender<StreamUpdate>,
    command_tx: Option<mpsc::Sender<StreamCommand>>,
    task: Option<JoinHandle<()>>,
}

impl TransactionStream {
    /// Create a new stream client for the configured backend
    pub fn new(config: &ClientConfig) -> (Self, broadcast::Receiver<StreamUpdate>) {
        let (update_tx, update_rx) = broadcast::channel(UPDATE_CHANNEL_CAPACITY);

        (
            Self {
                url: config.stream_url(),
                timing: config.stream,
                update_tx,
                command_tx: None,
                task: None,
            },
            update_rx,
        )
    }

    /// Stream endpoint this client connects to
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Spawn the connection task; connects immediately
    pub fn start(&mut self) {
        if self.task.is_some() {
            warn!("[Stream] Already started");
            return;
        }

        let (command_tx, command_rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
        self.command_tx = Some(command_tx);

        let url = self.url.clone();
        let connect_timeout = self.timing.connect_timeout;
        let lifecycle = StreamLifecycle::new(self.timing);
        let update_tx = self.update_tx.clone();

        self.task = Some(tokio::spawn(async move {
            Self::connection_loop(url, connect_timeout, lifecycle, update_tx, command_rx).await;
        }));
    }

    /// Queue a command for the open connection
    ///
    /// Commands that reach the task while it is disconnected are dropped.
    pub async fn send(&self, command: ClientCommand) -> TokenwiseResult<()> {
        let tx = self
            .command_tx
            .as_ref()
            .ok_or_else(|| TokenwiseError::internal("Stream not started"))?;
        tx.send(StreamCommand::Send(command))
            .await
            .map_err(|_| TokenwiseError::internal("Stream task has exited"))
    }

    /// Ask the backend for its monitoring status
    pub async fn request_status(&self) -> TokenwiseResult<()> {
        self.send(ClientCommand::GetStatus).await
    }

    /// Ask the backend for its latest stored transactions
    pub async fn request_recent_transactions(&self, limit: u32) -> TokenwiseResult<()> {
        self.send(ClientCommand::GetRecentTransactions { limit }).await
    }

    /// Close the connection and cancel all timers
    ///
    /// Once this returns, no further updates are emitted.
    pub async fn shutdown(&mut self) {
        if let Some(tx) = self.command_tx.take() {
            let _ = tx.send(StreamCommand::Shutdown).await;
        }
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                error!("[Stream] Connection task failed: {}", e);
            }
        }
    }

    /// Main connection loop: connect, serve, wait out the reconnect delay
    async fn connection_loop(
        url: String,
        connect_timeout: Duration,
        mut lifecycle: StreamLifecycle,
        update_tx: broadcast::Sender<StreamUpdate>,
        mut command_rx: mpsc::Receiver<StreamCommand>,
    ) {
        loop {
            lifecycle.connecting();
            let _ = update_tx.send(StreamUpdate::Connecting);
            info!("[Stream] Connecting to {}", url);

            match Self::connect(&url, connect_timeout, &mut command_rx).await {
                ConnectOutcome::Connected(ws_stream) => {
                    info!("[Stream] Connected successfully");
                    lifecycle.opened(Instant::now());
                    let _ = update_tx.send(StreamUpdate::Opened);

                    let end =
                        Self::serve(ws_stream, &mut lifecycle, &update_tx, &mut command_rx).await;

                    if let SessionEnd::Shutdown = end {
                        lifecycle.shutdown();
                        info!("[Stream] Shut down");
                        return;
                    }
                }
                ConnectOutcome::Failed(e) => {
                    error!("[Stream] Connection failed: {}", e);
                    lifecycle.errored();
                    let _ = update_tx.send(StreamUpdate::TransportError { error: e });
                }
                ConnectOutcome::Shutdown => {
                    lifecycle.shutdown();
                    info!("[Stream] Shut down while connecting");
                    return;
                }
            }

            let reconnect_in = lifecycle.closed(Instant::now());
            let _ = update_tx.send(StreamUpdate::Closed { reconnect_in });
            if let Some(delay) = reconnect_in {
                info!("[Stream] Reconnecting in {:?}", delay);
            }

            if !Self::wait_for_reconnect(&mut lifecycle, &mut command_rx).await {
                lifecycle.shutdown();
                info!("[Stream] Shut down while disconnected");
                return;
            }
        }
    }

    /// One bounded connection attempt, abandoned on shutdown
    async fn connect(
        url: &str,
        connect_timeout: Duration,
        command_rx: &mut mpsc::Receiver<StreamCommand>,
    ) -> ConnectOutcome<
        tokio_tungstenite::WebSocketStream<
            tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
        >,
    > {
        let attempt = tokio::time::timeout(connect_timeout, connect_async(url));
        tokio::pin!(attempt);

        loop {
            tokio::select! {
                result = &mut attempt => {
                    return match result {
                        Ok(Ok((ws_stream, _))) => ConnectOutcome::Connected(ws_stream),
                        Ok(Err(e)) => ConnectOutcome::Failed(e.to_string()),
                        Err(_) => ConnectOutcome::Failed(format!(
                            "connection attempt timed out after {:?}",
                            connect_timeout
                        )),
                    };
                }
                cmd = command_rx.recv() => {
                    match cmd {
                        Some(StreamCommand::Send(command)) => {
                            warn!("[Stream] Not connected, dropping {}", command.to_json());
                        }
                        Some(StreamCommand::Shutdown) | None => return ConnectOutcome::Shutdown,
                    }
                }
            }
        }
    }

    /// Serve one open connection until it closes or shutdown is requested
    async fn serve<S>(
        ws_stream: tokio_tungstenite::WebSocketStream<S>,
        lifecycle: &mut StreamLifecycle,
        update_tx: &broadcast::Sender<StreamUpdate>,
        command_rx: &mut mpsc::Receiver<StreamCommand>,
    ) -> SessionEnd
    where
        S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
    {
        let (mut write, mut read) = ws_stream.split();

        loop {
            let wake = Self::wake_at(lifecycle);

            tokio::select! {
                // Handle incoming messages
                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            Self::handle_message(&text, update_tx);
                        }
                        Some(Ok(Message::Ping(data))) => {
                            if let Err(e) = write.send(Message::Pong(data)).await {
                                Self::transport_error(lifecycle, update_tx, &e.to_string());
                                return SessionEnd::Closed;
                            }
                        }
                        Some(Ok(Message::Close(_))) => {
                            info!("[Stream] Connection closed by server");
                            return SessionEnd::Closed;
                        }
                        Some(Err(e)) => {
                            Self::transport_error(lifecycle, update_tx, &e.to_string());
                            return SessionEnd::Closed;
                        }
                        None => {
                            info!("[Stream] Stream ended");
                            return SessionEnd::Closed;
                        }
                        _ => {}
                    }
                }

                // Handle outgoing commands
                cmd = command_rx.recv() => {
                    match cmd {
                        Some(StreamCommand::Send(command)) => {
                            debug!("[Stream] Sending {}", command.to_json());
                            if let Err(e) = write.send(Message::Text(command.to_json().into())).await {
                                Self::transport_error(lifecycle, update_tx, &e.to_string());
                                return SessionEnd::Closed;
                            }
                        }
                        Some(StreamCommand::Shutdown) | None => {
                            let _ = write.close().await;
                            return SessionEnd::Shutdown;
                        }
                    }
                }

                // Heartbeat
                _ = tokio::time::sleep_until(wake) => {
                    for action in lifecycle.poll(Instant::now()) {
                        if action == LifecycleAction::SendPing {
                            let ping = ClientCommand::Ping.to_json();
                            if let Err(e) = write.send(Message::Text(ping.into())).await {
                                Self::transport_error(lifecycle, update_tx, &e.to_string());
                                return SessionEnd::Closed;
                            }
                        }
                    }
                }
            }
        }
    }

    /// Wait until the reconnect deadline; `false` means shut down instead
    async fn wait_for_reconnect(
        lifecycle: &mut StreamLifecycle,
        command_rx: &mut mpsc::Receiver<StreamCommand>,
    ) -> bool {
        loop {
            let wake = Self::wake_at(lifecycle);

            tokio::select! {
                cmd = command_rx.recv() => {
                    match cmd {
                        Some(StreamCommand::Send(command)) => {
                            warn!("[Stream] Not connected, dropping {}", command.to_json());
                        }
                        Some(StreamCommand::Shutdown) | None => return false,
                    }
                }
                _ = tokio::time::sleep_until(wake) => {
                    if lifecycle.poll(Instant::now()).contains(&LifecycleAction::Connect) {
                        return true;
                    }
                }
            }
        }
    }

    fn wake_at(lifecycle: &StreamLifecycle) -> tokio::time::Instant {
        let deadline = lifecycle
            .next_deadline()
            .unwrap_or_else(|| Instant::now() + IDLE_WAKE);
        tokio::time::Instant::from_std(deadline)
    }

    fn transport_error(
        lifecycle: &mut StreamLifecycle,
        update_tx: &broadcast::Sender<StreamUpdate>,
        error: &str,
    ) {
        error!("[Stream] Error: {}", error);
        lifecycle.errored();
        let _ = update_tx.send(StreamUpdate::TransportError {
            error: error.to_string(),
        });
    }

    /// Handle an incoming text frame
    fn handle_message(text: &str, update_tx: &broadcast::Sender<StreamUpdate>) {
        match ServerFrame::decode(text) {
            Ok(ServerFrame::Unknown(kind)) => {
                debug!("[Stream] Unknown message type '{}': {}", kind, text);
            }
            Ok(frame) => {
                debug!("[Stream] Received {}", frame.kind());
                let _ = update_tx.send(StreamUpdate::Frame(frame));
            }
            Err(e) => {
                warn!("[Stream] Failed to decode message: {}", e);
                let _ = update_tx.send(StreamUpdate::DecodeError {
                    error: e.to_string(),
                });
            }
        }
    }
}

impl std::fmt::Debug for TransactionStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionStream")
            .field("url", &self.url)
            .field("timing", &self.timing)
            .field("running", &self.task.is_some())
            .finish()
    }
}
