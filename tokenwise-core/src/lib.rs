//! Core types for TokenWise
//!
//! This crate defines the shared data structures used across the engine:
//! transaction events, dashboard and holder snapshots, the streaming wire
//! protocol, and display formatting helpers.

pub mod dashboard;
pub mod error;
pub mod format;
pub mod timestamp;
pub mod transaction;
pub mod websocket;

pub use dashboard::{ActiveWallet, DashboardSnapshot, HolderRecord, ProtocolUsage};
pub use error::{TokenwiseError, TokenwiseResult};
pub use format::ConcentrationTier;
pub use transaction::{ActionType, TransactionEvent, WalletDrillDown};
pub use websocket::{
    ClientCommand, ConnectionInfo, ConnectionState, FrameError, MonitoringStatus, ServerFrame,
};

/// Mint address of the token this build monitors
pub const MONITORED_TOKEN: &str = "9BB6NFEcjBCtnNLFko2FqVQBq8HHM13kCyYcdQbgpump";
