//! Engine and controller behavior against an in-memory snapshot source

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use rust_decimal_macros::dec;
use tokio::sync::{broadcast, oneshot};

use tokenwise_client::{SnapshotSource, StreamUpdate};
use tokenwise_core::{
    ConnectionState, DashboardSnapshot, HolderRecord, ServerFrame, TokenwiseError,
    TokenwiseResult, TransactionEvent, WalletDrillDown,
};
use tokenwise_services::{
    EngineConfig, EngineEvent, HoldersStatus, NoticeKind, NoticeSource, SnapshotOrigin, Subject,
    SyncEngine, ViewController,
};

// ============================================================================
// Fake source
// ============================================================================

enum Reply<T> {
    Ready(TokenwiseResult<T>),
    Gated(oneshot::Receiver<TokenwiseResult<T>>),
}

impl<T> Reply<T> {
    async fn resolve(self) -> TokenwiseResult<T> {
        match self {
            Reply::Ready(result) => result,
            Reply::Gated(rx) => rx
                .await
                .unwrap_or_else(|_| Err(TokenwiseError::internal("gate dropped"))),
        }
    }
}

fn gate<T>() -> (oneshot::Sender<TokenwiseResult<T>>, Reply<T>) {
    let (tx, rx) = oneshot::channel();
    (tx, Reply::Gated(rx))
}

#[derive(Default)]
struct FakeSource {
    holders: Mutex<VecDeque<Reply<Vec<HolderRecord>>>>,
    dashboards: Mutex<VecDeque<Reply<DashboardSnapshot>>>,
    wallets: Mutex<HashMap<String, Reply<WalletDrillDown>>>,
    monitoring: Mutex<VecDeque<TokenwiseResult<()>>>,
    dashboard_calls: AtomicUsize,
    dashboard_call_times: Mutex<Vec<tokio::time::Instant>>,
    wallet_calls: AtomicUsize,
}

impl FakeSource {
    fn push_holders(&self, reply: Reply<Vec<HolderRecord>>) {
        self.holders.lock().push_back(reply);
    }

    fn push_dashboard(&self, reply: Reply<DashboardSnapshot>) {
        self.dashboards.lock().push_back(reply);
    }

    fn set_wallet(&self, owner: &str, reply: Reply<WalletDrillDown>) {
        self.wallets.lock().insert(owner.to_string(), reply);
    }
}

#[async_trait]
impl SnapshotSource for FakeSource {
    async fn fetch_holders(&self, _contract: &str) -> TokenwiseResult<Vec<HolderRecord>> {
        let reply = self.holders.lock().pop_front();
        match reply {
            Some(reply) => reply.resolve().await,
            None => Ok(Vec::new()),
        }
    }

    async fn fetch_dashboard(&self) -> TokenwiseResult<DashboardSnapshot> {
        self.dashboard_calls.fetch_add(1, Ordering::SeqCst);
        self.dashboard_call_times.lock().push(tokio::time::Instant::now());
        let reply = self.dashboards.lock().pop_front();
        match reply {
            Some(reply) => reply.resolve().await,
            None => Ok(DashboardSnapshot::default()),
        }
    }

    async fn fetch_wallet_history(&self, owner: &str) -> TokenwiseResult<WalletDrillDown> {
        self.wallet_calls.fetch_add(1, Ordering::SeqCst);
        let reply = self.wallets.lock().remove(owner);
        match reply {
            Some(reply) => reply.resolve().await,
            None => Err(TokenwiseError::not_found(owner.to_string())),
        }
    }

    async fn start_monitoring(&self) -> TokenwiseResult<()> {
        self.monitoring.lock().pop_front().unwrap_or(Ok(()))
    }

    async fn stop_monitoring(&self) -> TokenwiseResult<()> {
        self.monitoring.lock().pop_front().unwrap_or(Ok(()))
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn setup(config: EngineConfig) -> (Arc<FakeSource>, SyncEngine, broadcast::Receiver<EngineEvent>) {
    let source = Arc::new(FakeSource::default());
    let (engine, events) = SyncEngine::new(config, source.clone());
    (source, engine, events)
}

fn transaction(signature: &str) -> TransactionEvent {
    serde_json::from_value(serde_json::json!({
        "signature": signature,
        "wallet": "Abc123...",
        "action_type": "buy",
        "amount": 12.5,
        "protocol": "Raydium",
        "timestamp": "2024-05-01T12:00:00"
    }))
    .unwrap()
}

fn dashboard(holder_count: u64) -> DashboardSnapshot {
    DashboardSnapshot {
        holder_count,
        ..Default::default()
    }
}

fn holder(owner: &str) -> HolderRecord {
    HolderRecord {
        owner: owner.to_string(),
        address: format!("{}-acc", owner),
        balance: dec!(1000),
        percentage: dec!(2.5),
        ui_amount: None,
        decimals: None,
    }
}

fn drill_down(owner: &str, count: usize) -> WalletDrillDown {
    WalletDrillDown {
        wallet_address: Some(owner.to_string()),
        transactions: (0..count).map(|i| transaction(&format!("{}-{}", owner, i))).collect(),
        ..Default::default()
    }
}

async fn wait_for<F: Fn() -> bool>(condition: F) {
    tokio::time::timeout(Duration::from_secs(2), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

fn drain(events: &mut broadcast::Receiver<EngineEvent>) -> Vec<EngineEvent> {
    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(event);
    }
    seen
}

// ============================================================================
// Stream merge
// ============================================================================

#[tokio::test]
async fn new_transaction_enters_empty_buffer_with_marker() {
    let (source, engine, _events) = setup(EngineConfig::default());
    let input = transaction("sig-1");

    engine.apply_stream_update(StreamUpdate::Frame(ServerFrame::NewTransaction(input.clone())));

    let view = engine.view();
    assert_eq!(view.live.len(), 1);
    let entry = view.live.newest().unwrap();
    assert_eq!(entry.event, input);
    assert!(entry.is_new);

    // The transaction also triggers a dashboard re-fetch
    wait_for(|| source.dashboard_calls.load(Ordering::SeqCst) == 1).await;
    wait_for(|| engine.view().dashboard.is_some()).await;
}

#[tokio::test]
async fn live_buffer_stays_bounded() {
    let (_source, engine, _events) = setup(EngineConfig::default());

    for i in 0..75 {
        engine.apply_stream_update(StreamUpdate::Frame(ServerFrame::NewTransaction(
            transaction(&format!("sig-{}", i)),
        )));
    }

    let view = engine.view();
    assert_eq!(view.live.len(), 50);
    assert_eq!(view.live.newest().unwrap().event.signature, "sig-74");
    assert_eq!(engine.acknowledge_render(), 50);
    assert!(engine.view().live.iter().all(|entry| !entry.is_new));
}

#[tokio::test]
async fn undecodable_frame_raises_one_notice_and_changes_nothing() {
    let (_source, engine, mut events) = setup(EngineConfig::default());
    engine.apply_stream_update(StreamUpdate::Opened);
    engine.apply_stream_update(StreamUpdate::Frame(ServerFrame::NewTransaction(transaction(
        "sig-1",
    ))));
    drain(&mut events);

    let before = engine.view();
    let error = ServerFrame::decode("this is not json").unwrap_err();
    engine.apply_stream_update(StreamUpdate::DecodeError {
        error: error.to_string(),
    });

    let after = engine.view();
    assert_eq!(after.connection, ConnectionState::Open);
    assert_eq!(after.connection, before.connection);
    assert_eq!(after.live.len(), before.live.len());

    let notices: Vec<_> = drain(&mut events)
        .into_iter()
        .filter_map(|event| match event {
            EngineEvent::NoticeRaised(notice) => Some(notice),
            _ => None,
        })
        .collect();
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0].kind, NoticeKind::Decode);
    assert_eq!(engine.stream_health().decode_errors, 1);
}

#[tokio::test]
async fn connection_mirror_and_stream_notices() {
    let (_source, engine, _events) = setup(EngineConfig::default());

    engine.apply_stream_update(StreamUpdate::Connecting);
    assert_eq!(engine.view().connection, ConnectionState::Connecting);

    engine.apply_stream_update(StreamUpdate::Opened);
    assert_eq!(engine.view().connection, ConnectionState::Open);
    assert!(engine.stream_health().connected);

    engine.apply_stream_update(StreamUpdate::Closed {
        reconnect_in: Some(Duration::from_secs(5)),
    });
    let view = engine.view();
    assert_eq!(view.connection, ConnectionState::Closed);
    let notice = view.notice.unwrap();
    assert_eq!(notice.source, NoticeSource::Stream);
    assert_eq!(notice.kind, NoticeKind::Transport);
    assert_eq!(engine.stream_health().reconnects_scheduled, 1);

    // Reopening clears the connection notice
    engine.apply_stream_update(StreamUpdate::Opened);
    assert!(engine.view().notice.is_none());
}

// ============================================================================
// Snapshot ordering
// ============================================================================

#[tokio::test]
async fn push_replaces_snapshot_despite_in_flight_poll() {
    let (source, engine, _events) = setup(EngineConfig::default());
    let (release_poll, reply) = gate();
    source.push_dashboard(reply);

    let poller = engine.clone();
    let poll = tokio::spawn(async move { poller.refresh_dashboard().await });
    wait_for(|| source.dashboard_calls.load(Ordering::SeqCst) == 1).await;

    engine.apply_stream_update(StreamUpdate::Frame(ServerFrame::DashboardUpdate(dashboard(2))));
    assert_eq!(engine.view().dashboard.unwrap().holder_count, 2);

    // The older poll resolves afterwards and is discarded
    release_poll.send(Ok(dashboard(1))).unwrap();
    assert!(!poll.await.unwrap());
    assert_eq!(engine.view().dashboard.unwrap().holder_count, 2);
}

#[tokio::test]
async fn poll_issued_after_push_is_applied() {
    let (_source, engine, mut events) = setup(EngineConfig::default());

    engine.apply_stream_update(StreamUpdate::Frame(ServerFrame::DashboardUpdate(dashboard(2))));
    let seq = engine.next_sequence();
    assert!(engine.apply_polled_dashboard(seq, Ok(dashboard(3))));
    assert_eq!(engine.view().dashboard.unwrap().holder_count, 3);

    let origins: Vec<SnapshotOrigin> = drain(&mut events)
        .into_iter()
        .filter_map(|event| match event {
            EngineEvent::DashboardUpdated { origin, .. } => Some(origin),
            _ => None,
        })
        .collect();
    assert_eq!(origins, vec![SnapshotOrigin::Push, SnapshotOrigin::Poll]);
}

#[tokio::test]
async fn failed_dashboard_poll_keeps_last_snapshot() {
    let (_source, engine, _events) = setup(EngineConfig::default());
    engine.apply_stream_update(StreamUpdate::Frame(ServerFrame::DashboardUpdate(dashboard(5))));

    let seq = engine.next_sequence();
    assert!(!engine.apply_polled_dashboard(seq, Err(TokenwiseError::network("down"))));

    let view = engine.view();
    assert_eq!(view.dashboard.unwrap().holder_count, 5);
    assert_eq!(view.notice.unwrap().source, NoticeSource::Dashboard);
}

#[tokio::test]
async fn spaced_refreshes_coalesce_bursts() {
    let config = EngineConfig {
        min_refresh_interval: Some(Duration::from_millis(200)),
        ..Default::default()
    };
    let (source, engine, _events) = setup(config);

    for i in 0..10 {
        engine.apply_stream_update(StreamUpdate::Frame(ServerFrame::NewTransaction(
            transaction(&format!("sig-{}", i)),
        )));
    }

    wait_for(|| source.dashboard_calls.load(Ordering::SeqCst) >= 1).await;
    tokio::time::sleep(Duration::from_millis(450)).await;
    let calls = source.dashboard_calls.load(Ordering::SeqCst);
    assert!(calls <= 2, "expected bursts to coalesce, got {} refreshes", calls);
}

#[tokio::test]
async fn spaced_refresh_waits_for_interval_after_previous() {
    let config = EngineConfig {
        min_refresh_interval: Some(Duration::from_millis(200)),
        ..Default::default()
    };
    let (source, engine, _events) = setup(config);
    let burst = |tag: &str| {
        for i in 0..5 {
            engine.apply_stream_update(StreamUpdate::Frame(ServerFrame::NewTransaction(
                transaction(&format!("{}-{}", tag, i)),
            )));
        }
    };

    burst("first");
    wait_for(|| source.dashboard_call_times.lock().len() == 1).await;

    // The second burst queues behind the interval as a single refresh
    burst("second");
    wait_for(|| source.dashboard_call_times.lock().len() == 2).await;
    tokio::time::sleep(Duration::from_millis(300)).await;

    let times = source.dashboard_call_times.lock().clone();
    assert_eq!(times.len(), 2);
    assert!(
        times[1] - times[0] >= Duration::from_millis(190),
        "refreshes only {:?} apart",
        times[1] - times[0]
    );
}

#[tokio::test]
async fn stale_failures_leave_newer_results_alone() {
    let (_source, engine, _events) = setup(EngineConfig::default());

    let old_poll = engine.next_sequence();
    engine.apply_stream_update(StreamUpdate::Frame(ServerFrame::DashboardUpdate(dashboard(4))));
    assert!(!engine.apply_polled_dashboard(old_poll, Err(TokenwiseError::network("slow"))));
    assert!(engine.view().notice.is_none());

    let old_fetch = engine.begin_holders_fetch();
    let new_fetch = engine.begin_holders_fetch();
    assert!(engine.apply_holders(new_fetch, Ok(vec![holder("A")])));
    assert!(!engine.apply_holders(old_fetch, Err(TokenwiseError::network("slow"))));

    let view = engine.view();
    assert!(view.notice.is_none());
    assert_eq!(view.holders_status, HoldersStatus::Available);
    assert_eq!(view.dashboard.unwrap().holder_count, 4);
}

// ============================================================================
// Holders
// ============================================================================

#[tokio::test]
async fn empty_holders_are_distinct_from_failure() {
    let (source, engine, _events) = setup(EngineConfig::default());
    let controller = ViewController::new(engine.clone());

    source.push_holders(Reply::Ready(Ok(Vec::new())));
    assert!(controller.refresh_holders().await);
    let view = engine.view();
    assert_eq!(view.holders_status, HoldersStatus::NeedsSeeding);
    assert_eq!(view.notice.as_ref().unwrap().kind, NoticeKind::Empty);

    source.push_holders(Reply::Ready(Err(TokenwiseError::network("refused"))));
    assert!(!controller.refresh_holders().await);
    let view = engine.view();
    assert_eq!(view.holders_status, HoldersStatus::NeedsSeeding);
    assert_eq!(view.notice.as_ref().unwrap().kind, NoticeKind::Request);
}

#[tokio::test]
async fn holder_refresh_keeps_subject() {
    let (source, engine, _events) = setup(EngineConfig::default());
    let controller = ViewController::new(engine.clone());
    controller.set_subject(Subject::RealtimeFeed);

    source.push_holders(Reply::Ready(Ok(vec![holder("A"), holder("B")])));
    assert!(controller.refresh_holders().await);

    let view = engine.view();
    assert_eq!(view.subject, Subject::RealtimeFeed);
    assert_eq!(view.holders.len(), 2);
    assert_eq!(view.holders_status, HoldersStatus::Available);
}

#[tokio::test]
async fn success_clears_only_its_own_notice() {
    let (source, engine, _events) = setup(EngineConfig::default());
    let controller = ViewController::new(engine.clone());

    let seq = engine.next_sequence();
    engine.apply_polled_dashboard(seq, Err(TokenwiseError::api("500")));

    source.push_holders(Reply::Ready(Ok(vec![holder("A")])));
    controller.refresh_holders().await;
    assert_eq!(engine.view().notice.unwrap().source, NoticeSource::Dashboard);

    assert!(controller.refresh_dashboard().await);
    assert!(engine.view().notice.is_none());
}

// ============================================================================
// Controller
// ============================================================================

#[tokio::test]
async fn initial_load_waits_for_both_fetches() {
    let (source, engine, _events) = setup(EngineConfig::default());
    let controller = ViewController::new(engine.clone());

    let (release_holders, reply) = gate();
    source.push_holders(reply);
    source.push_dashboard(Reply::Ready(Err(TokenwiseError::network("down"))));

    let loader = controller.clone();
    let load = tokio::spawn(async move { loader.initial_load().await });

    wait_for(|| source.dashboard_calls.load(Ordering::SeqCst) == 1).await;
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(engine.view().loading);

    release_holders.send(Ok(vec![holder("A")])).unwrap();
    load.await.unwrap();

    let view = engine.view();
    assert!(!view.loading);
    assert_eq!(view.holders.len(), 1);
    assert!(view.dashboard.is_none());
}

#[tokio::test]
async fn later_selection_supersedes_earlier_one() {
    let (source, engine, _events) = setup(EngineConfig::default());
    let controller = ViewController::new(engine.clone());

    let (release_first, reply) = gate();
    source.set_wallet("WalletW", reply);
    source.set_wallet("WalletW2", Reply::Ready(Ok(drill_down("WalletW2", 2))));

    let first = controller.spawn_select_wallet("WalletW".to_string());
    wait_for(|| source.wallet_calls.load(Ordering::SeqCst) == 1).await;

    assert!(controller.select_wallet("WalletW2").await);

    release_first.send(Ok(drill_down("WalletW", 5))).unwrap();
    assert!(!first.await.unwrap());

    let view = engine.view();
    assert_eq!(view.subject, Subject::Wallet);
    assert_eq!(view.selected_wallet.as_deref(), Some("WalletW2"));
    let drill_down = view.drill_down.unwrap();
    assert_eq!(drill_down.wallet_address.as_deref(), Some("WalletW2"));
    assert_eq!(drill_down.transactions.len(), 2);
    assert!(!view.wallet_loading);
}

#[tokio::test]
async fn failed_wallet_fetch_names_the_wallet() {
    let (_source, engine, _events) = setup(EngineConfig::default());
    let controller = ViewController::new(engine.clone());

    let owner = "9BB6NFEcjBCtnNLFko2FqVQBq8HHM13kCyYcdQbgpump";
    assert!(!controller.select_wallet(owner).await);

    let notice = engine.view().notice.unwrap();
    assert_eq!(notice.source, NoticeSource::Wallet);
    assert_eq!(
        notice.message,
        "Failed to fetch wallet transactions for 9BB6NF...pump. Check backend logs."
    );
}

#[tokio::test]
async fn select_holder_by_position() {
    let (source, engine, _events) = setup(EngineConfig::default());
    let controller = ViewController::new(engine.clone());

    source.push_holders(Reply::Ready(Ok(vec![holder("OwnerA"), holder("OwnerB")])));
    controller.refresh_holders().await;
    source.set_wallet("OwnerB", Reply::Ready(Ok(drill_down("OwnerB", 1))));

    assert!(controller.spawn_select_holder(5).is_none());
    let handle = controller.spawn_select_holder(1).unwrap();
    assert!(handle.await.unwrap());
    assert_eq!(engine.view().selected_wallet.as_deref(), Some("OwnerB"));
}

#[tokio::test]
async fn wallet_subject_requires_selection() {
    let (_source, engine, _events) = setup(EngineConfig::default());
    let controller = ViewController::new(engine.clone());

    assert!(!controller.set_subject(Subject::Wallet));
    assert_eq!(engine.view().subject, Subject::Dashboard);
    assert!(controller.set_subject(Subject::Holders));
    assert_eq!(engine.view().subject, Subject::Holders);
}

#[tokio::test]
async fn monitoring_results_surface_as_notices() {
    let (source, engine, _events) = setup(EngineConfig::default());
    let controller = ViewController::new(engine.clone());

    source
        .monitoring
        .lock()
        .push_back(Err(TokenwiseError::network("refused")));
    assert!(!controller.start_monitoring().await);
    assert_eq!(
        engine.view().notice.unwrap().message,
        "Failed to start real-time monitoring. Check backend."
    );

    assert!(controller.start_monitoring().await);
    let view = engine.view();
    assert!(view.notice.is_none());
    assert_eq!(view.monitoring_requested, Some(true));
}
