//! State synchronization for TokenWise
//!
//! This crate reconciles the real-time transaction stream with polled
//! snapshots and drives fetches for the operator's current subject.

pub mod live_buffer;
pub mod refresh_gate;
pub mod stream_health;
pub mod sync_engine;
pub mod view_controller;

pub use live_buffer::{LiveBuffer, LiveTransaction, LIVE_BUFFER_CAPACITY};
pub use refresh_gate::RefreshGate;
pub use stream_health::{StreamHealth, StreamMetrics};
pub use sync_engine::{
    EngineConfig, EngineEvent, HoldersStatus, Notice, NoticeKind, NoticeSource, SnapshotOrigin,
    Subject, SyncEngine, ViewState,
};
pub use view_controller::ViewController;
