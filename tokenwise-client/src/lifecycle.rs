//! Connection lifecycle state machine
//!
//! Pure bookkeeping for the stream's timers: when to send the next heartbeat
//! and when to retry after a close. All methods take the current instant from
//! the caller, so the machine never reads a clock itself.

use std::time::{Duration, Instant};

use tokenwise_core::ConnectionState;

use crate::config::StreamTiming;

/// Work the driver must perform after polling the machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleAction {
    /// Send a `ping` command on the open connection
    SendPing,
    /// Open a new connection
    Connect,
}

#[derive(Debug, Clone)]
pub struct StreamLifecycle {
    timing: StreamTiming,
    state: ConnectionState,
    next_heartbeat: Option<Instant>,
    reconnect_at: Option<Instant>,
    reconnects_scheduled: u64,
    shut_down: bool,
}

impl StreamLifecycle {
    pub fn new(timing: StreamTiming) -> Self {
        Self {
            timing,
            state: ConnectionState::Closed,
            next_heartbeat: None,
            reconnect_at: None,
            reconnects_scheduled: 0,
            shut_down: false,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn heartbeat_scheduled(&self) -> bool {
        self.next_heartbeat.is_some()
    }

    pub fn reconnect_scheduled(&self) -> bool {
        self.reconnect_at.is_some()
    }

    /// Total reconnects scheduled over the machine's life
    pub fn reconnects_scheduled(&self) -> u64 {
        self.reconnects_scheduled
    }

    /// A connection attempt is starting
    pub fn connecting(&mut self) {
        if self.shut_down {
            return;
        }
        self.state = ConnectionState::Connecting;
        self.reconnect_at = None;
    }

    /// The connection is open: start the heartbeat
    pub fn opened(&mut self, now: Instant) {
        if self.shut_down {
            return;
        }
        self.state = ConnectionState::Open;
        self.reconnect_at = None;
        self.next_heartbeat = Some(now + self.timing.heartbeat_interval);
    }

    /// The connection closed: stop the heartbeat and schedule one retry
    ///
    /// Returns the delay until the retry, or `None` when nothing was
    /// scheduled (already pending, or shut down).
    pub fn closed(&mut self, now: Instant) -> Option<Duration> {
        self.state = ConnectionState::Closed;
        self.next_heartbeat = None;

        if self.shut_down || self.reconnect_at.is_some() {
            return None;
        }

        self.reconnect_at = Some(now + self.timing.reconnect_delay);
        self.reconnects_scheduled += 1;
        Some(self.timing.reconnect_delay)
    }

    /// Transport error: the connection is unusable, but retrying is left to
    /// the close that follows
    pub fn errored(&mut self) {
        self.state = ConnectionState::Closed;
        self.next_heartbeat = None;
    }

    /// Cancel every timer; nothing fires afterwards
    pub fn shutdown(&mut self) {
        self.shut_down = true;
        self.state = ConnectionState::Closed;
        self.next_heartbeat = None;
        self.reconnect_at = None;
    }

    /// Earliest instant at which [`poll`](Self::poll) has work to do
    pub fn next_deadline(&self) -> Option<Instant> {
        match (self.next_heartbeat, self.reconnect_at) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Fire every deadline that has passed
    pub fn poll(&mut self, now: Instant) -> Vec<LifecycleAction> {
        let mut actions = Vec::new();
        if self.shut_down {
            return actions;
        }

        if let Some(due) = self.next_heartbeat {
            if now >= due {
                if self.state == ConnectionState::Open {
                    actions.push(LifecycleAction::SendPing);
                    self.next_heartbeat = Some(now + self.timing.heartbeat_interval);
                } else {
                    self.next_heartbeat = None;
                }
            }
        }

        if let Some(due) = self.reconnect_at {
            if now >= due {
                self.reconnect_at = None;
                if self.state != ConnectionState::Open {
                    actions.push(LifecycleAction::Connect);
                }
            }
        }

        actions
    }
}
