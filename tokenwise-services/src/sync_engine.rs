//! State Synchronization Engine
//!
//! Merges stream updates and polled snapshots into one [`ViewState`].
//! The engine is the only writer of that state; everything else reads
//! clones of it or listens to [`EngineEvent`]s.
//!
//! Snapshot ordering: every dashboard update carries a sequence number taken
//! when a poll is issued or when a push arrives. An update is applied only if
//! its sequence is newer than the one held, so a slow poll can never
//! overwrite a newer push.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use tokenwise_client::{SnapshotSource, StreamUpdate};
use tokenwise_core::format::format_address;
use tokenwise_core::{
    ConnectionState, DashboardSnapshot, HolderRecord, ServerFrame, TokenwiseResult,
    TransactionEvent, WalletDrillDown, MONITORED_TOKEN,
};

use crate::live_buffer::LiveBuffer;
use crate::refresh_gate::RefreshGate;
use crate::stream_health::{StreamHealth, StreamMetrics};

const EVENT_CHANNEL_CAPACITY: usize = 1024;

pub const MSG_NO_HOLDERS: &str =
    "No top token holders found. Please run seed_db.py and restart backend.";
pub const MSG_HOLDERS_FAILED: &str =
    "Failed to fetch token holders. Backend endpoint might be down or data not seeded.";
pub const MSG_DASHBOARD_FAILED: &str = "Failed to fetch dashboard data. Check backend logs.";
pub const MSG_STREAM_DISCONNECTED: &str = "WebSocket disconnected. Attempting to reconnect...";
pub const MSG_STREAM_ERROR: &str = "WebSocket connection error. Check backend and network.";
pub const MSG_DECODE_ERROR: &str = "Error processing real-time data.";
pub const MSG_START_MONITORING_FAILED: &str =
    "Failed to start real-time monitoring. Check backend.";
pub const MSG_STOP_MONITORING_FAILED: &str = "Failed to stop real-time monitoring. Check backend.";

// ============================================================================
// Configuration
// ============================================================================

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Token whose holders are fetched
    pub contract: String,
    /// Minimum spacing of stream-triggered dashboard refreshes; `None`
    /// refreshes on every transaction
    pub min_refresh_interval: Option<Duration>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            contract: MONITORED_TOKEN.to_string(),
            min_refresh_interval: None,
        }
    }
}

impl EngineConfig {
    /// Reads `TOKENWISE_MIN_REFRESH_MS` (0 or unset disables spacing)
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(raw) = std::env::var("TOKENWISE_MIN_REFRESH_MS") {
            match raw.parse::<u64>() {
                Ok(0) => {}
                Ok(ms) => config.min_refresh_interval = Some(Duration::from_millis(ms)),
                Err(_) => warn!("Ignoring invalid TOKENWISE_MIN_REFRESH_MS='{}'", raw),
            }
        }
        config
    }
}

// ============================================================================
// View State
// ============================================================================

/// What the operator is looking at
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Subject {
    #[default]
    Dashboard,
    Holders,
    RealtimeFeed,
    Wallet,
}

impl Subject {
    pub fn label(&self) -> &'static str {
        match self {
            Subject::Dashboard => "dashboard",
            Subject::Holders => "holders",
            Subject::RealtimeFeed => "realtime",
            Subject::Wallet => "wallet",
        }
    }
}

/// Outcome of the latest holder fetch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum HoldersStatus {
    #[default]
    NotLoaded,
    Available,
    /// The backend has no holder snapshot yet
    NeedsSeeding,
}

/// Which operation raised a notice
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeSource {
    Stream,
    Holders,
    Dashboard,
    Wallet,
    Monitoring,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    /// Connection trouble; recovers through reconnect
    Transport,
    /// A frame could not be decoded
    Decode,
    /// A request failed; prior data is kept
    Request,
    /// A request succeeded with nothing to show
    Empty,
}

/// The single operator-facing status message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub source: NoticeSource,
    pub kind: NoticeKind,
    pub message: String,
}

impl Notice {
    pub fn new(source: NoticeSource, kind: NoticeKind, message: impl Into<String>) -> Self {
        Self {
            source,
            kind,
            message: message.into(),
        }
    }
}

/// Where a dashboard snapshot came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotOrigin {
    Poll,
    Push,
}

/// Everything the presentation layer renders
#[derive(Debug, Clone, Default)]
pub struct ViewState {
    /// Mirror of the stream client's connection state
    pub connection: ConnectionState,
    pub live: LiveBuffer,
    pub dashboard: Option<DashboardSnapshot>,
    /// Sequence of the held dashboard snapshot (0 = none)
    pub dashboard_seq: u64,
    pub holders: Vec<HolderRecord>,
    pub holders_status: HoldersStatus,
    holders_seq: u64,
    pub subject: Subject,
    pub selected_wallet: Option<String>,
    /// Bumped on every wallet selection
    pub selection_generation: u64,
    pub drill_down: Option<WalletDrillDown>,
    pub wallet_loading: bool,
    pub notice: Option<Notice>,
    /// Initial load in progress
    pub loading: bool,
    /// Last monitoring state the operator successfully requested
    pub monitoring_requested: Option<bool>,
}

/// Change notifications for subscribers
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    ConnectionChanged(ConnectionState),
    TransactionReceived(TransactionEvent),
    DashboardUpdated { seq: u64, origin: SnapshotOrigin },
    HoldersUpdated { count: usize },
    WalletLoaded { owner: String, transactions: usize },
    SubjectChanged(Subject),
    LoadingChanged(bool),
    MonitoringChanged(bool),
    NoticeRaised(Notice),
    NoticeCleared,
    /// Informational frame (greeting, status, recent transactions)
    Info(String),
}

// ============================================================================
// Engine
// ============================================================================

/// Owner of the [`ViewState`]
#[derive(Clone)]
pub struct SyncEngine {
    config: EngineConfig,
    source: Arc<dyn SnapshotSource>,
    state: Arc<RwLock<ViewState>>,
    sequence: Arc<AtomicU64>,
    refresh_gate: Option<Arc<RefreshGate>>,
    refresh_pending: Arc<AtomicBool>,
    metrics: Arc<StreamMetrics>,
    event_tx: broadcast::Sender<EngineEvent>,
}

impl SyncEngine {
    pub fn new(
        config: EngineConfig,
        source: Arc<dyn SnapshotSource>,
    ) -> (Self, broadcast::Receiver<EngineEvent>) {
        let (event_tx, event_rx) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let refresh_gate = config
            .min_refresh_interval
            .map(|interval| Arc::new(RefreshGate::new(interval)));

        (
            Self {
                config,
                source,
                state: Arc::new(RwLock::new(ViewState::default())),
                sequence: Arc::new(AtomicU64::new(0)),
                refresh_gate,
                refresh_pending: Arc::new(AtomicBool::new(false)),
                metrics: Arc::new(StreamMetrics::new()),
                event_tx,
            },
            event_rx,
        )
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn source(&self) -> Arc<dyn SnapshotSource> {
        Arc::clone(&self.source)
    }

    /// Snapshot of the current view
    pub fn view(&self) -> ViewState {
        self.state.read().clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.event_tx.subscribe()
    }

    pub fn stream_health(&self) -> StreamHealth {
        self.metrics.health()
    }

    fn emit(&self, event: EngineEvent) {
        let _ = self.event_tx.send(event);
    }

    /// Take the next sequence number (starts at 1)
    pub fn next_sequence(&self) -> u64 {
        self.sequence.fetch_add(1, Ordering::SeqCst) + 1
    }

    // ------------------------------------------------------------------------
    // Stream side
    // ------------------------------------------------------------------------

    /// Consume stream updates until the channel closes
    pub async fn run(self, mut updates: broadcast::Receiver<StreamUpdate>) {
        info!("[Engine] Starting stream update processor");

        loop {
            match updates.recv().await {
                Ok(update) => self.apply_stream_update(update),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("[Engine] Stream update receiver lagged {} messages", n);
                }
                Err(broadcast::error::RecvError::Closed) => {
                    info!("[Engine] Stream update channel closed");
                    break;
                }
            }
        }
    }

    /// Apply one stream update
    ///
    /// Never blocks: dashboard re-fetches are spawned onto the runtime.
    pub fn apply_stream_update(&self, update: StreamUpdate) {
        match update {
            StreamUpdate::Connecting => {
                self.set_connection(ConnectionState::Connecting);
            }
            StreamUpdate::Opened => {
                self.metrics.set_connected(true);
                self.set_connection(ConnectionState::Open);
                self.clear_notice_from(NoticeSource::Stream);
            }
            StreamUpdate::Closed { reconnect_in } => {
                self.metrics.set_connected(false);
                self.set_connection(ConnectionState::Closed);
                if reconnect_in.is_some() {
                    self.metrics.record_reconnect_scheduled();
                    self.raise_notice(Notice::new(
                        NoticeSource::Stream,
                        NoticeKind::Transport,
                        MSG_STREAM_DISCONNECTED,
                    ));
                }
            }
            StreamUpdate::TransportError { error } => {
                warn!("[Engine] Stream transport error: {}", error);
                self.metrics.set_connected(false);
                self.set_connection(ConnectionState::Closed);
                self.raise_notice(Notice::new(
                    NoticeSource::Stream,
                    NoticeKind::Transport,
                    MSG_STREAM_ERROR,
                ));
            }
            StreamUpdate::DecodeError { error } => {
                warn!("[Engine] Dropped undecodable frame: {}", error);
                self.metrics.record_decode_error();
                self.raise_notice(Notice::new(
                    NoticeSource::Stream,
                    NoticeKind::Decode,
                    MSG_DECODE_ERROR,
                ));
            }
            StreamUpdate::Frame(frame) => {
                self.metrics.record_frame();
                self.apply_frame(frame);
            }
        }
    }

    fn apply_frame(&self, frame: ServerFrame) {
        match frame {
            ServerFrame::NewTransaction(event) => {
                {
                    let mut state = self.state.write();
                    state.live.push(event.clone());
                }
                debug!(
                    "[Engine] New {} transaction from {}",
                    event.action_type,
                    format_address(&event.wallet)
                );
                self.emit(EngineEvent::TransactionReceived(event));
                self.trigger_dashboard_refresh();
            }
            ServerFrame::DashboardUpdate(snapshot) => {
                let seq = self.next_sequence();
                self.apply_snapshot(seq, snapshot, SnapshotOrigin::Push);
            }
            ServerFrame::ConnectionEstablished(info) => {
                let message = format!(
                    "{} (token: {}, tracked wallets: {})",
                    info.message.as_deref().unwrap_or("Connected"),
                    info.monitoring_token.as_deref().map(format_address).unwrap_or_default(),
                    info.tracked_wallets.unwrap_or_default()
                );
                info!("[Engine] {}", message);
                self.emit(EngineEvent::Info(message));
            }
            ServerFrame::Status(status) => {
                let message = format!(
                    "Monitoring active: {}, connected clients: {}, tracked wallets: {}",
                    status.monitoring_active.unwrap_or(false),
                    status.connected_clients.unwrap_or_default(),
                    status.tracked_wallets.unwrap_or_default()
                );
                info!("[Engine] {}", message);
                self.emit(EngineEvent::Info(message));
            }
            ServerFrame::RecentTransactions(transactions) => {
                let message = format!("Backend holds {} recent transactions", transactions.len());
                info!("[Engine] {}", message);
                self.emit(EngineEvent::Info(message));
            }
            ServerFrame::Pong | ServerFrame::Keepalive => {}
            ServerFrame::Unknown(kind) => {
                debug!("[Engine] Ignoring unknown frame type '{}'", kind);
            }
        }
    }

    fn set_connection(&self, connection: ConnectionState) {
        let changed = {
            let mut state = self.state.write();
            let changed = state.connection != connection;
            state.connection = connection;
            changed
        };
        if changed {
            self.emit(EngineEvent::ConnectionChanged(connection));
        }
    }

    /// Re-fetch the dashboard in the background
    fn trigger_dashboard_refresh(&self) {
        let engine = self.clone();

        match &self.refresh_gate {
            None => {
                tokio::spawn(async move {
                    engine.refresh_dashboard().await;
                });
            }
            Some(gate) => {
                // One refresh waiting for its slot covers every transaction
                // that arrives meanwhile
                if self.refresh_pending.swap(true, Ordering::SeqCst) {
                    debug!("[Engine] Dashboard refresh already pending");
                    return;
                }
                let gate = Arc::clone(gate);
                tokio::spawn(async move {
                    gate.pass().await;
                    engine.refresh_pending.store(false, Ordering::SeqCst);
                    engine.refresh_dashboard().await;
                });
            }
        }
    }

    // ------------------------------------------------------------------------
    // Snapshot side
    // ------------------------------------------------------------------------

    /// Poll the dashboard; `true` if the result was applied
    pub async fn refresh_dashboard(&self) -> bool {
        let seq = self.next_sequence();
        let result = self.source.fetch_dashboard().await;
        self.apply_polled_dashboard(seq, result)
    }

    /// Apply the outcome of a dashboard poll issued with `seq`
    pub fn apply_polled_dashboard(
        &self,
        seq: u64,
        result: TokenwiseResult<DashboardSnapshot>,
    ) -> bool {
        match result {
            Ok(snapshot) => self.apply_snapshot(seq, snapshot, SnapshotOrigin::Poll),
            Err(e) => {
                let held = self.state.read().dashboard_seq;
                if seq <= held {
                    debug!(
                        "[Engine] Ignoring failure of stale dashboard poll #{} (holding #{}): {}",
                        seq, held, e
                    );
                    return false;
                }
                warn!("[Engine] Dashboard fetch failed: {}", e);
                self.raise_notice(Notice::new(
                    NoticeSource::Dashboard,
                    NoticeKind::Request,
                    MSG_DASHBOARD_FAILED,
                ));
                false
            }
        }
    }

    fn apply_snapshot(&self, seq: u64, snapshot: DashboardSnapshot, origin: SnapshotOrigin) -> bool {
        {
            let mut state = self.state.write();
            if seq <= state.dashboard_seq {
                debug!(
                    "[Engine] Discarding stale dashboard #{} (holding #{})",
                    seq, state.dashboard_seq
                );
                return false;
            }
            state.dashboard = Some(snapshot);
            state.dashboard_seq = seq;
        }

        self.emit(EngineEvent::DashboardUpdated { seq, origin });
        self.clear_notice_from(NoticeSource::Dashboard);
        true
    }

    /// Take a ticket for a holder fetch
    pub fn begin_holders_fetch(&self) -> u64 {
        self.next_sequence()
    }

    /// Apply the outcome of a holder fetch; results older than the held
    /// list are discarded
    pub fn apply_holders(&self, ticket: u64, result: TokenwiseResult<Vec<HolderRecord>>) -> bool {
        match result {
            Ok(holders) => {
                let count = holders.len();
                {
                    let mut state = self.state.write();
                    if ticket <= state.holders_seq {
                        debug!("[Engine] Discarding stale holder list #{}", ticket);
                        return false;
                    }
                    state.holders_seq = ticket;
                    state.holders = holders;
                    state.holders_status = if count == 0 {
                        HoldersStatus::NeedsSeeding
                    } else {
                        HoldersStatus::Available
                    };
                }

                self.emit(EngineEvent::HoldersUpdated { count });
                if count == 0 {
                    self.raise_notice(Notice::new(
                        NoticeSource::Holders,
                        NoticeKind::Empty,
                        MSG_NO_HOLDERS,
                    ));
                } else {
                    info!("[Engine] Loaded {} top holders", count);
                    self.clear_notice_from(NoticeSource::Holders);
                }
                true
            }
            Err(e) => {
                let held = self.state.read().holders_seq;
                if ticket <= held {
                    debug!(
                        "[Engine] Ignoring failure of stale holder fetch #{} (holding #{}): {}",
                        ticket, held, e
                    );
                    return false;
                }
                warn!("[Engine] Holder fetch failed: {}", e);
                self.raise_notice(Notice::new(
                    NoticeSource::Holders,
                    NoticeKind::Request,
                    MSG_HOLDERS_FAILED,
                ));
                false
            }
        }
    }

    // ------------------------------------------------------------------------
    // Selection and subject
    // ------------------------------------------------------------------------

    /// Select a wallet and switch to the wallet subject; returns the
    /// selection's generation
    pub fn begin_wallet_selection(&self, owner: &str) -> u64 {
        let generation = {
            let mut state = self.state.write();
            state.selection_generation += 1;
            state.selected_wallet = Some(owner.to_string());
            state.drill_down = None;
            state.wallet_loading = true;
            state.subject = Subject::Wallet;
            state.selection_generation
        };

        info!(
            "[Engine] Selected wallet {} (generation {})",
            format_address(owner),
            generation
        );
        self.emit(EngineEvent::SubjectChanged(Subject::Wallet));
        generation
    }

    /// Apply a wallet history result; superseded generations are discarded
    pub fn apply_wallet_history(
        &self,
        generation: u64,
        owner: &str,
        result: TokenwiseResult<WalletDrillDown>,
    ) -> bool {
        {
            let state = self.state.read();
            if generation != state.selection_generation {
                debug!(
                    "[Engine] Discarding wallet result for {} (generation {} superseded by {})",
                    format_address(owner),
                    generation,
                    state.selection_generation
                );
                return false;
            }
        }

        match result {
            Ok(drill_down) => {
                let transactions = drill_down.transactions.len();
                {
                    let mut state = self.state.write();
                    // Re-check: a selection may have landed between the locks
                    if generation != state.selection_generation {
                        return false;
                    }
                    state.drill_down = Some(drill_down);
                    state.wallet_loading = false;
                }
                self.emit(EngineEvent::WalletLoaded {
                    owner: owner.to_string(),
                    transactions,
                });
                self.clear_notice_from(NoticeSource::Wallet);
                true
            }
            Err(e) => {
                warn!(
                    "[Engine] Wallet history fetch for {} failed: {}",
                    format_address(owner),
                    e
                );
                {
                    let mut state = self.state.write();
                    if generation != state.selection_generation {
                        return false;
                    }
                    state.wallet_loading = false;
                }
                self.raise_notice(Notice::new(
                    NoticeSource::Wallet,
                    NoticeKind::Request,
                    format!(
                        "Failed to fetch wallet transactions for {}. Check backend logs.",
                        format_address(owner)
                    ),
                ));
                false
            }
        }
    }

    pub fn set_subject(&self, subject: Subject) {
        let changed = {
            let mut state = self.state.write();
            let changed = state.subject != subject;
            state.subject = subject;
            changed
        };
        if changed {
            self.emit(EngineEvent::SubjectChanged(subject));
        }
    }

    pub fn set_loading(&self, loading: bool) {
        self.state.write().loading = loading;
        self.emit(EngineEvent::LoadingChanged(loading));
    }

    /// Record the outcome of a start (`true`) or stop monitoring call
    pub fn apply_monitoring_result(&self, start: bool, result: TokenwiseResult<()>) -> bool {
        match result {
            Ok(()) => {
                self.state.write().monitoring_requested = Some(start);
                self.emit(EngineEvent::MonitoringChanged(start));
                self.clear_notice_from(NoticeSource::Monitoring);
                true
            }
            Err(e) => {
                warn!("[Engine] Monitoring control call failed: {}", e);
                let message = if start {
                    MSG_START_MONITORING_FAILED
                } else {
                    MSG_STOP_MONITORING_FAILED
                };
                self.raise_notice(Notice::new(
                    NoticeSource::Monitoring,
                    NoticeKind::Request,
                    message,
                ));
                false
            }
        }
    }

    /// Clear the live feed's new markers after a render cycle
    pub fn acknowledge_render(&self) -> usize {
        self.state.write().live.acknowledge()
    }

    // ------------------------------------------------------------------------
    // Notices
    // ------------------------------------------------------------------------

    /// Replace the current notice
    pub fn raise_notice(&self, notice: Notice) {
        self.state.write().notice = Some(notice.clone());
        self.emit(EngineEvent::NoticeRaised(notice));
    }

    /// Clear the notice only if `source` raised it
    pub fn clear_notice_from(&self, source: NoticeSource) -> bool {
        let cleared = {
            let mut state = self.state.write();
            match &state.notice {
                Some(notice) if notice.source == source => {
                    state.notice = None;
                    true
                }
                _ => false,
            }
        };
        if cleared {
            self.emit(EngineEvent::NoticeCleared);
        }
        cleared
    }

    /// Operator dismissal
    pub fn dismiss_notice(&self) {
        let had_notice = self.state.write().notice.take().is_some();
        if had_notice {
            self.emit(EngineEvent::NoticeCleared);
        }
    }
}

impl std::fmt::Debug for SyncEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncEngine")
            .field("config", &self.config)
            .field("sequence", &self.sequence.load(Ordering::SeqCst))
            .finish()
    }
}
