//! Transaction events observed for the monitored token

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::dashboard::ProtocolUsage;

/// What a transaction did with the monitored token
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionType {
    Buy,
    Sell,
    Transfer,
    /// Anything the backend could not classify (or sent under a new name)
    #[default]
    #[serde(other)]
    Unknown,
}

impl ActionType {
    /// Upper-case label used by the feed views
    pub fn label(&self) -> &'static str {
        match self {
            ActionType::Buy => "BUY",
            ActionType::Sell => "SELL",
            ActionType::Transfer => "TRANSFER",
            ActionType::Unknown => "UNKNOWN",
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, ActionType::Unknown)
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// A single on-chain transaction involving the monitored token
///
/// Immutable once decoded. The engine wraps it with a transient "new"
/// marker when it enters the live buffer; that marker is not part of the
/// wire format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionEvent {
    /// Backend document id (sent as `_id` by the store)
    #[serde(default, alias = "_id")]
    pub id: String,

    /// Transaction signature
    #[serde(default)]
    pub signature: String,

    /// Wallet that performed the action
    pub wallet: String,

    /// Buy / sell / transfer classification
    #[serde(default)]
    pub action_type: ActionType,

    /// Token amount moved
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<Decimal>,

    /// DEX or program the transaction went through (e.g. "Raydium")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,

    /// When the backend observed the transaction
    #[serde(with = "crate::timestamp")]
    pub timestamp: DateTime<Utc>,

    /// On-chain block time (unix seconds)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_time: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_address: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slot: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_address: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_address: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pre_balance: Option<Decimal>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_balance: Option<Decimal>,
}

impl TransactionEvent {
    /// Protocol name, or "Unknown" when the backend did not attribute one
    pub fn protocol_name(&self) -> &str {
        self.protocol.as_deref().unwrap_or("Unknown")
    }
}

/// Transaction history and protocol breakdown for one selected wallet
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WalletDrillDown {
    /// Echo of the requested owner address, when the backend includes it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wallet_address: Option<String>,

    #[serde(default)]
    pub transactions: Vec<TransactionEvent>,

    #[serde(default)]
    pub protocol_usage: ProtocolUsage,
}
