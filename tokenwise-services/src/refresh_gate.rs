//! Spacing for stream-triggered dashboard refreshes
//!
//! The engine lets at most one refresh wait here at a time, so the gate only
//! has to remember when it last let one through.

use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::debug;

#[derive(Debug)]
pub struct RefreshGate {
    min_interval: Duration,
    last_pass: Mutex<Option<Instant>>,
}

impl RefreshGate {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_pass: Mutex::new(None),
        }
    }

    /// Wait until `min_interval` has elapsed since the previous pass
    pub async fn pass(&self) {
        let last = *self.last_pass.lock();
        if let Some(due) = last.map(|last| last + self.min_interval) {
            if due > Instant::now() {
                debug!(
                    "[Engine] Dashboard refresh held for {:?}",
                    due - Instant::now()
                );
                tokio::time::sleep_until(due).await;
            }
        }
        *self.last_pass.lock() = Some(Instant::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_second_pass_waits_out_the_interval() {
        let gate = RefreshGate::new(Duration::from_millis(100));

        let start = Instant::now();
        gate.pass().await;
        assert!(start.elapsed() < Duration::from_millis(20));

        gate.pass().await;
        assert!(start.elapsed() >= Duration::from_millis(95));
    }

    #[tokio::test]
    async fn test_pass_after_quiet_period_is_immediate() {
        let gate = RefreshGate::new(Duration::from_millis(50));
        gate.pass().await;
        tokio::time::sleep(Duration::from_millis(80)).await;

        let start = Instant::now();
        gate.pass().await;
        assert!(start.elapsed() < Duration::from_millis(20));
    }
}
