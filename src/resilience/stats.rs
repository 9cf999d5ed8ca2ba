//! Aggregate call statistics.

use std::sync::atomic::{AtomicU64, Ordering};
use serde::Serialize;

use crate::resilience::circuit_breaker::CircuitState;

/// Monotonic counters owned by one executor.
#[derive(Debug, Default)]
pub struct CallStats {
    call_count: AtomicU64,
    retry_count: AtomicU64,
}

impl CallStats {
    pub(crate) fn record_call(&self) {
        self.call_count.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_retry(&self) {
        self.retry_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn call_count(&self) -> u64 {
        self.call_count.load(Ordering::Relaxed)
    }

    pub fn retry_count(&self) -> u64 {
        self.retry_count.load(Ordering::Relaxed)
    }

    /// Retries per call; zero before the first call.
    pub fn retry_rate(&self) -> f64 {
        let calls = self.call_count();
        if calls == 0 {
            return 0.0;
        }
        self.retry_count() as f64 / calls as f64
    }
}

/// Point-in-time view returned by `CallExecutor::stats`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatsSnapshot {
    pub call_count: u64,
    pub retry_count: u64,
    pub retry_rate: f64,
    pub circuit_state: CircuitState,
    pub circuit_trips: u64,
}
