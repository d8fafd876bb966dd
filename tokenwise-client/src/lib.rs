//! Backend access for TokenWise
//!
//! - [`ApiClient`]: REST snapshot fetches and monitoring control
//! - [`TransactionStream`]: the real-time transaction stream

pub mod client;
pub mod config;
pub mod lifecycle;
pub mod websocket;

pub use client::{ApiClient, SnapshotSource};
pub use config::{ClientConfig, StreamTiming};
pub use lifecycle::{LifecycleAction, StreamLifecycle};
pub use websocket::{StreamUpdate, TransactionStream};
