//! Aggregate analytics and holder snapshots

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};

use crate::transaction::TransactionEvent;

/// A top holder of the monitored token
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HolderRecord {
    /// Wallet that owns the token account
    pub owner: String,

    /// Token account address
    #[serde(default)]
    pub address: String,

    /// Token balance (UI units)
    #[serde(default)]
    pub balance: Decimal,

    /// Share of total supply, 0-100
    #[serde(default, deserialize_with = "null_as_zero")]
    pub percentage: Decimal,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ui_amount: Option<Decimal>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decimals: Option<u8>,
}

fn null_as_zero<'de, D>(deserializer: D) -> Result<Decimal, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Decimal>::deserialize(deserializer)?.unwrap_or_default())
}

/// Protocol name -> number of transactions routed through it
///
/// Insertion order is preserved, so a backend-sorted breakdown keeps its
/// ranking. Decodes from either a plain JSON object or the backend's
/// aggregation form `[{"_id": "Raydium", "count": 3}, ...]`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ProtocolUsage(IndexMap<String, u64>);

#[derive(Deserialize)]
struct ProtocolCountRow {
    #[serde(alias = "protocol")]
    _id: Option<String>,
    count: u64,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawProtocolUsage {
    Map(IndexMap<String, u64>),
    Rows(Vec<ProtocolCountRow>),
}

impl<'de> Deserialize<'de> for ProtocolUsage {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let usage = match Option::<RawProtocolUsage>::deserialize(deserializer)? {
            None => IndexMap::new(),
            Some(RawProtocolUsage::Map(map)) => map,
            Some(RawProtocolUsage::Rows(rows)) => {
                let mut map = IndexMap::with_capacity(rows.len());
                for row in rows {
                    let name = row._id.unwrap_or_else(|| "Unknown".to_string());
                    *map.entry(name).or_insert(0) += row.count;
                }
                map
            }
        };
        Ok(ProtocolUsage(usage))
    }
}

impl ProtocolUsage {
    pub fn get(&self, protocol: &str) -> Option<u64> {
        self.0.get(protocol).copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn total(&self) -> u64 {
        self.0.values().sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u64)> {
        self.0.iter().map(|(name, count)| (name.as_str(), *count))
    }
}

impl FromIterator<(String, u64)> for ProtocolUsage {
    fn from_iter<I: IntoIterator<Item = (String, u64)>>(iter: I) -> Self {
        ProtocolUsage(iter.into_iter().collect())
    }
}

/// Wallet ranked by transaction count
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveWallet {
    pub wallet_address: String,
    pub tx_count: u64,
}

/// Aggregate analytics for the monitored token
///
/// Always replaced as a whole, whether it arrives from a poll or a push.
/// The REST endpoint and the pushed `dashboard_update` frame name two
/// fields differently; both spellings are accepted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DashboardSnapshot {
    #[serde(default)]
    pub holder_count: u64,

    #[serde(default)]
    pub total_transactions: u64,

    #[serde(default, alias = "total_wallets")]
    pub tracked_wallets_count: u64,

    #[serde(default)]
    pub protocol_usage: ProtocolUsage,

    #[serde(default)]
    pub recent_transactions: Vec<TransactionEvent>,

    #[serde(default, alias = "top_token_holders")]
    pub top_holders: Vec<HolderRecord>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub buy_count: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sell_count: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub buy_sell_ratio: Option<Decimal>,

    #[serde(default)]
    pub most_active_wallets: Vec<ActiveWallet>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub monitoring_active: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connected_clients: Option<u64>,

    #[serde(
        default,
        with = "crate::timestamp::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub timestamp: Option<DateTime<Utc>>,
}
