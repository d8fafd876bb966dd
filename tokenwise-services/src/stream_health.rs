//! Stream connection health

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{DateTime, Utc};

/// If no frame arrives for this long while connected, the stream is stale
pub const STALE_THRESHOLD_SECS: u64 = 60;

/// Point-in-time view of the stream's health
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamHealth {
    pub connected: bool,
    pub last_frame_time: Option<DateTime<Utc>>,
    pub frame_count: u64,
    pub decode_errors: u64,
    pub reconnects_scheduled: u64,
    pub is_stale: bool,
}

/// Health counters for the stream (atomic for lock-free updates)
#[derive(Debug, Default)]
pub struct StreamMetrics {
    connected: AtomicBool,
    opened_epoch_ms: AtomicU64,
    last_frame_epoch_ms: AtomicU64,
    frame_count: AtomicU64,
    decode_errors: AtomicU64,
    reconnects_scheduled: AtomicU64,
}

fn now_epoch_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

impl StreamMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_connected(&self, connected: bool) {
        let was_connected = self.connected.swap(connected, Ordering::SeqCst);
        if connected && !was_connected {
            self.opened_epoch_ms.store(now_epoch_ms(), Ordering::SeqCst);
        }
    }

    pub fn record_frame(&self) {
        self.last_frame_epoch_ms
            .store(now_epoch_ms(), Ordering::SeqCst);
        self.frame_count.fetch_add(1, Ordering::SeqCst);
    }

    pub fn record_decode_error(&self) {
        self.decode_errors.fetch_add(1, Ordering::SeqCst);
    }

    pub fn record_reconnect_scheduled(&self) {
        self.reconnects_scheduled.fetch_add(1, Ordering::SeqCst);
    }

    pub fn health(&self) -> StreamHealth {
        self.health_at(now_epoch_ms())
    }

    fn health_at(&self, now_ms: u64) -> StreamHealth {
        let connected = self.connected.load(Ordering::SeqCst);
        let last_ms = self.last_frame_epoch_ms.load(Ordering::SeqCst);
        let opened_ms = self.opened_epoch_ms.load(Ordering::SeqCst);

        let last_frame_time = if last_ms > 0 {
            DateTime::from_timestamp(
                (last_ms / 1000) as i64,
                ((last_ms % 1000) * 1_000_000) as u32,
            )
        } else {
            None
        };

        // Silence is measured from the latest frame or, failing that, the open
        let is_stale = if connected {
            let since = last_ms.max(opened_ms);
            now_ms.saturating_sub(since) > STALE_THRESHOLD_SECS * 1000
        } else {
            true
        };

        StreamHealth {
            connected,
            last_frame_time,
            frame_count: self.frame_count.load(Ordering::SeqCst),
            decode_errors: self.decode_errors.load(Ordering::SeqCst),
            reconnects_scheduled: self.reconnects_scheduled.load(Ordering::SeqCst),
            is_stale,
        }
    }
}
