//! # Fibonacci Backoff
//!
//! Requeue delays for NodePools whose reconciliation returned an error.
//! The sequence grows more slowly than exponential backoff, so a NodePool
//! blocked on a missing HardwareManager is retried often enough to notice
//! when it appears without flooding the API server.
//!
//! Sequence with the defaults: 5s, 5s, 10s, 15s, 25s, 40s, 65s, ... 300s (max).

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use tracing::warn;

pub const DEFAULT_MIN_BACKOFF: Duration = Duration::from_secs(5);
pub const DEFAULT_MAX_BACKOFF: Duration = Duration::from_secs(300);

/// Fibonacci backoff calculator
///
/// Each backoff is the sum of the previous two, capped at the maximum.
#[derive(Debug, Clone)]
pub struct FibonacciBackoff {
    min_secs: u64,
    prev_secs: u64,
    current_secs: u64,
    max_secs: u64,
}

impl FibonacciBackoff {
    #[must_use]
    pub fn new(min: Duration, max: Duration) -> Self {
        let min_secs = min.as_secs().max(1);
        Self {
            min_secs,
            prev_secs: 0,
            current_secs: min_secs,
            max_secs: max.as_secs().max(min_secs),
        }
    }

    /// Get the next backoff duration and advance the sequence
    pub fn next_backoff(&mut self) -> Duration {
        let result = self.current_secs;
        let next = self.prev_secs + self.current_secs;
        self.prev_secs = self.current_secs;
        self.current_secs = next.min(self.max_secs);
        Duration::from_secs(result)
    }

    /// Reset the backoff to the initial state
    pub fn reset(&mut self) {
        self.prev_secs = 0;
        self.current_secs = self.min_secs;
    }
}

impl Default for FibonacciBackoff {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_BACKOFF, DEFAULT_MAX_BACKOFF)
    }
}

/// Backoff state per object key (`namespace/name`).
#[derive(Debug, Default)]
pub struct BackoffTracker {
    states: Mutex<HashMap<String, FibonacciBackoff>>,
}

impl BackoffTracker {
    /// Next delay for `key`, advancing its sequence
    pub fn next_backoff(&self, key: &str) -> Duration {
        match self.states.lock() {
            Ok(mut states) => states.entry(key.to_string()).or_default().next_backoff(),
            Err(e) => {
                warn!("Failed to lock backoff states: {}, using default backoff", e);
                DEFAULT_MIN_BACKOFF
            }
        }
    }

    /// Forget the error history of `key` after a successful reconciliation
    pub fn reset(&self, key: &str) {
        if let Ok(mut states) = self.states.lock() {
            states.remove(key);
        }
    }
}
