//! Text rendering of the engine's view

use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use tokenwise_core::format::{
    format_address, format_amount, format_balance, format_count, format_datetime,
    format_percentage, format_time,
};
use tokenwise_core::{ConcentrationTier, TransactionEvent};
use tokenwise_services::{
    EngineEvent, HoldersStatus, LiveTransaction, StreamHealth, Subject, SyncEngine, ViewState,
};

/// Number of holders and recent transactions shown on the dashboard
const DASHBOARD_ROWS: usize = 5;

pub fn render_view(view: &ViewState) -> Vec<String> {
    let mut lines = vec![header(view)];
    if let Some(notice) = &view.notice {
        lines.push(format!("! {}", notice.message));
    }

    match view.subject {
        Subject::Dashboard => lines.extend(render_dashboard(view)),
        Subject::Holders => lines.extend(render_holders(view)),
        Subject::RealtimeFeed => lines.extend(render_live(view)),
        Subject::Wallet => lines.extend(render_wallet(view)),
    }
    lines
}

fn header(view: &ViewState) -> String {
    let mut header = format!("== {} == [{}]", view.subject.label(), view.connection);
    if view.loading {
        header.push_str(" loading...");
    }
    header
}

pub fn render_dashboard(view: &ViewState) -> Vec<String> {
    let Some(snapshot) = &view.dashboard else {
        return vec!["No dashboard data yet".to_string()];
    };

    let mut lines = vec![
        format!("Holders: {}", format_count(snapshot.holder_count)),
        format!("Total transactions: {}", format_count(snapshot.total_transactions)),
        format!("Tracked wallets: {}", format_count(snapshot.tracked_wallets_count)),
    ];

    if let (Some(buys), Some(sells)) = (snapshot.buy_count, snapshot.sell_count) {
        let ratio = snapshot
            .buy_sell_ratio
            .map(|ratio| format!(" (ratio {})", ratio.round_dp(2)))
            .unwrap_or_default();
        lines.push(format!(
            "Buys / sells: {} / {}{}",
            format_count(buys),
            format_count(sells),
            ratio
        ));
    }

    if !snapshot.protocol_usage.is_empty() {
        lines.push("Protocol usage:".to_string());
        for (protocol, count) in snapshot.protocol_usage.iter() {
            lines.push(format!("  {:<12} {}", protocol, format_count(count)));
        }
    }

    if !snapshot.top_holders.is_empty() {
        lines.push("Top holders:".to_string());
        for (i, holder) in snapshot.top_holders.iter().take(DASHBOARD_ROWS).enumerate() {
            lines.push(format!(
                "  #{} {} {}",
                i + 1,
                format_address(&holder.owner),
                format_percentage(holder.percentage)
            ));
        }
    }

    if !snapshot.recent_transactions.is_empty() {
        lines.push("Recent transactions:".to_string());
        for tx in snapshot.recent_transactions.iter().take(DASHBOARD_ROWS) {
            lines.push(format!("  {}", transaction_line(tx)));
        }
    }

    lines
}

pub fn render_holders(view: &ViewState) -> Vec<String> {
    match view.holders_status {
        HoldersStatus::NotLoaded => return vec!["Holders not loaded".to_string()],
        HoldersStatus::NeedsSeeding => {
            return vec!["No holders available; the backend needs seeding".to_string()]
        }
        HoldersStatus::Available => {}
    }

    view.holders
        .iter()
        .enumerate()
        .map(|(i, holder)| {
            let tier = ConcentrationTier::for_percentage(holder.percentage);
            format!(
                "#{:<3} {} {:>20} {:>9} {}",
                i + 1,
                format_address(&holder.owner),
                format_balance(holder.balance),
                format_percentage(holder.percentage),
                tier.label()
            )
        })
        .collect()
}

pub fn render_live(view: &ViewState) -> Vec<String> {
    if view.live.is_empty() {
        return vec!["Waiting for transactions...".to_string()];
    }
    view.live.iter().map(live_line).collect()
}

pub fn render_wallet(view: &ViewState) -> Vec<String> {
    let Some(owner) = &view.selected_wallet else {
        return vec!["No wallet selected".to_string()];
    };

    let mut lines = vec![format!("Wallet {}", format_address(owner))];
    if view.wallet_loading {
        lines.push("Loading wallet transactions...".to_string());
        return lines;
    }

    let Some(drill_down) = &view.drill_down else {
        return lines;
    };

    if !drill_down.protocol_usage.is_empty() {
        let usage: Vec<String> = drill_down
            .protocol_usage
            .iter()
            .map(|(protocol, count)| format!("{}: {}", protocol, count))
            .collect();
        lines.push(format!("Protocols: {}", usage.join(", ")));
    }

    if drill_down.transactions.is_empty() {
        lines.push("No transactions recorded".to_string());
    }
    for tx in &drill_down.transactions {
        lines.push(format!(
            "  {} {:<8} {:>22} {}",
            format_datetime(&tx.timestamp),
            tx.action_type.label(),
            tx.amount.map(format_amount).unwrap_or_default(),
            tx.protocol_name()
        ));
    }
    lines
}

pub fn render_status(view: &ViewState, health: &StreamHealth) -> Vec<String> {
    let last_frame = health
        .last_frame_time
        .as_ref()
        .map(format_time)
        .unwrap_or_else(|| "never".to_string());

    let mut lines = vec![
        format!("Stream: {}{}", view.connection, if health.is_stale { " (stale)" } else { "" }),
        format!(
            "Frames: {} (last {}), decode errors: {}, reconnects: {}",
            health.frame_count, last_frame, health.decode_errors, health.reconnects_scheduled
        ),
        format!("Live buffer: {}/{}", view.live.len(), view.live.capacity()),
    ];

    if let Some(monitoring) = view.monitoring_requested {
        lines.push(format!(
            "Monitoring: {}",
            if monitoring { "started" } else { "stopped" }
        ));
    }
    if let Some(notice) = &view.notice {
        lines.push(format!("Notice: {}", notice.message));
    }
    lines
}

fn transaction_line(tx: &TransactionEvent) -> String {
    format!(
        "{} {:<8} {} {} via {}",
        format_time(&tx.timestamp),
        tx.action_type.label(),
        tx.amount.map(format_amount).unwrap_or_else(|| "-".to_string()),
        format_address(&tx.wallet),
        tx.protocol_name()
    )
}

fn live_line(entry: &LiveTransaction) -> String {
    let marker = if entry.is_new { "NEW " } else { "    " };
    format!("{}{}", marker, transaction_line(&entry.event))
}

/// Log engine events; new transactions are printed while the live feed is
/// the active subject
pub async fn log_events(engine: SyncEngine, mut events: broadcast::Receiver<EngineEvent>) {
    loop {
        match events.recv().await {
            Ok(EngineEvent::TransactionReceived(tx)) => {
                info!("[Feed] {}", transaction_line(&tx));
                if engine.view().subject == Subject::RealtimeFeed {
                    for line in render_live(&engine.view()).into_iter().take(1) {
                        println!("{}", line);
                    }
                    engine.acknowledge_render();
                }
            }
            Ok(EngineEvent::ConnectionChanged(state)) => info!("[Stream] {}", state),
            Ok(EngineEvent::NoticeRaised(notice)) => warn!("{}", notice.message),
            Ok(EngineEvent::Info(message)) => info!("{}", message),
            Ok(EngineEvent::WalletLoaded { owner, transactions }) => {
                info!(
                    "Loaded {} transactions for {}",
                    transactions,
                    format_address(&owner)
                );
                if engine.view().subject == Subject::Wallet {
                    print_lines(&render_view(&engine.view()));
                }
            }
            Ok(other) => debug!("{:?}", other),
            Err(broadcast::error::RecvError::Lagged(n)) => {
                warn!("Event receiver lagged {} messages", n);
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

pub fn print_lines(lines: &[String]) {
    for line in lines {
        println!("{}", line);
    }
}
