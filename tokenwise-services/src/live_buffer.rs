//! Bounded, newest-first buffer of streamed transactions

use std::collections::VecDeque;

use tokenwise_core::TransactionEvent;

/// Maximum number of transactions kept in the live feed
pub const LIVE_BUFFER_CAPACITY: usize = 50;

/// A streamed transaction plus its render-cycle emphasis marker
#[derive(Debug, Clone, PartialEq)]
pub struct LiveTransaction {
    pub event: TransactionEvent,
    /// Set on arrival, cleared once the next render cycle has shown it
    pub is_new: bool,
}

/// Newest-first transaction feed, never longer than its capacity
///
/// No deduplication: a transaction delivered twice appears twice.
#[derive(Debug, Clone)]
pub struct LiveBuffer {
    entries: VecDeque<LiveTransaction>,
    capacity: usize,
}

impl Default for LiveBuffer {
    fn default() -> Self {
        Self::new(LIVE_BUFFER_CAPACITY)
    }
}

impl LiveBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Insert at the front, returning the evicted oldest entry if full
    pub fn push(&mut self, event: TransactionEvent) -> Option<TransactionEvent> {
        if self.capacity == 0 {
            return Some(event);
        }

        self.entries.push_front(LiveTransaction {
            event,
            is_new: true,
        });

        if self.entries.len() > self.capacity {
            self.entries.pop_back().map(|entry| entry.event)
        } else {
            None
        }
    }

    /// Clear every new marker; returns how many were set
    pub fn acknowledge(&mut self) -> usize {
        let mut cleared = 0;
        for entry in self.entries.iter_mut().filter(|entry| entry.is_new) {
            entry.is_new = false;
            cleared += 1;
        }
        cleared
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Newest first
    pub fn iter(&self) -> impl Iterator<Item = &LiveTransaction> {
        self.entries.iter()
    }

    pub fn newest(&self) -> Option<&LiveTransaction> {
        self.entries.front()
    }
}
