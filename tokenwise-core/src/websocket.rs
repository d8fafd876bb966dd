//! Streaming protocol for the real-time transaction feed
//!
//! These types define the frames exchanged with the backend's
//! `/ws/transactions` endpoint.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use thiserror::Error;

use crate::{DashboardSnapshot, TransactionEvent};

// ============================================================================
// Client -> Server Messages
// ============================================================================

/// Commands sent from the client to the backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum ClientCommand {
    /// Heartbeat, answered with a `pong` frame
    Ping,
    /// Ask for the backend's monitoring status
    GetStatus,
    /// Ask for the most recent stored transactions
    GetRecentTransactions { limit: u32 },
}

impl ClientCommand {
    pub fn to_json(&self) -> String {
        // Serializing a tagged enum with primitive payloads cannot fail
        serde_json::to_string(self).unwrap_or_else(|_| r#"{"command":"ping"}"#.to_string())
    }
}

// ============================================================================
// Server -> Client Messages
// ============================================================================

/// Greeting sent once the backend accepts the connection
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConnectionInfo {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub monitoring_token: Option<String>,
    #[serde(default)]
    pub tracked_wallets: Option<u64>,
}

/// Backend monitoring status, sent in reply to `get_status`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MonitoringStatus {
    #[serde(default)]
    pub monitoring_active: Option<bool>,
    #[serde(default)]
    pub connected_clients: Option<u64>,
    #[serde(default)]
    pub tracked_wallets: Option<u64>,
    #[serde(default, with = "crate::timestamp::option")]
    pub timestamp: Option<DateTime<Utc>>,
}

/// A decoded inbound frame
#[derive(Debug, Clone, PartialEq)]
pub enum ServerFrame {
    /// A new transaction was observed (payload under `data`)
    NewTransaction(TransactionEvent),
    /// Handshake greeting
    ConnectionEstablished(ConnectionInfo),
    /// Heartbeat acknowledgement
    Pong,
    /// Server-side idle keepalive
    Keepalive,
    /// Monitoring status report
    Status(MonitoringStatus),
    /// Full dashboard snapshot (fields at the top level of the frame)
    DashboardUpdate(DashboardSnapshot),
    /// Reply to `get_recent_transactions`
    RecentTransactions(Vec<TransactionEvent>),
    /// A frame kind this client does not know; kept for logging
    Unknown(String),
}

/// Errors from decoding an inbound frame
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("invalid {kind} payload: {source}")]
    InvalidPayload {
        kind: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Deserialize)]
struct TransactionEnvelope {
    data: TransactionEvent,
}

#[derive(Deserialize)]
struct RecentTransactionsEnvelope {
    #[serde(default)]
    transactions: Vec<TransactionEvent>,
}

impl ServerFrame {
    /// Decode a text frame
    ///
    /// Non-JSON input and known kinds with an unusable payload are errors.
    /// Valid JSON with an unrecognised (or missing) `type` decodes to
    /// [`ServerFrame::Unknown`].
    pub fn decode(text: &str) -> Result<Self, FrameError> {
        let value: Value = serde_json::from_str(text)?;

        let kind = value
            .get("type")
            .and_then(|t| t.as_str())
            .unwrap_or_default()
            .to_string();

        let frame = match kind.as_str() {
            "new_transaction" => {
                let envelope: TransactionEnvelope =
                    Self::payload("new_transaction", value)?;
                ServerFrame::NewTransaction(envelope.data)
            }
            "connection_established" => {
                ServerFrame::ConnectionEstablished(Self::payload("connection_established", value)?)
            }
            "pong" => ServerFrame::Pong,
            "keepalive" => ServerFrame::Keepalive,
            "status" => ServerFrame::Status(Self::payload("status", value)?),
            "dashboard_update" => {
                ServerFrame::DashboardUpdate(Self::payload("dashboard_update", value)?)
            }
            "recent_transactions" => {
                let envelope: RecentTransactionsEnvelope =
                    Self::payload("recent_transactions", value)?;
                ServerFrame::RecentTransactions(envelope.transactions)
            }
            _ => ServerFrame::Unknown(kind),
        };

        Ok(frame)
    }

    fn payload<T: serde::de::DeserializeOwned>(
        kind: &'static str,
        value: Value,
    ) -> Result<T, FrameError> {
        serde_json::from_value(value).map_err(|source| FrameError::InvalidPayload { kind, source })
    }

    /// Wire name of the frame kind
    pub fn kind(&self) -> &str {
        match self {
            ServerFrame::NewTransaction(_) => "new_transaction",
            ServerFrame::ConnectionEstablished(_) => "connection_established",
            ServerFrame::Pong => "pong",
            ServerFrame::Keepalive => "keepalive",
            ServerFrame::Status(_) => "status",
            ServerFrame::DashboardUpdate(_) => "dashboard_update",
            ServerFrame::RecentTransactions(_) => "recent_transactions",
            ServerFrame::Unknown(kind) => kind,
        }
    }
}

/// State of the streaming connection
///
/// Owned by the stream client; everything else only observes it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// Connection attempt in progress
    Connecting,
    /// Connected and receiving frames
    Open,
    /// Not connected; a reconnect may be scheduled
    #[default]
    Closed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Connecting => write!(f, "Connecting..."),
            ConnectionState::Open => write!(f, "Live"),
            ConnectionState::Closed => write!(f, "Disconnected"),
        }
    }
}
