//! Shared utilities for integration and load testing.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use resilient_executor::observability::MemorySink;
use resilient_executor::resilience::{CallExecutor, ManualClock, RetryPolicy};
use resilient_executor::ApiError;

/// Policy with millisecond backoff so tests never wait long.
pub fn fast_policy(max_attempts: u32, failure_threshold: u32) -> RetryPolicy {
    RetryPolicy::builder()
        .max_attempts(max_attempts)
        .base_delay(Duration::from_millis(10))
        .cap_delay(Duration::from_millis(100))
        .failure_threshold(failure_threshold)
        .circuit_open_duration(Duration::from_millis(500))
        .build()
        .unwrap()
}

/// Executor wired to a manual clock and an in-memory sink.
#[allow(dead_code)]
pub fn harness(policy: RetryPolicy) -> (CallExecutor, Arc<ManualClock>, Arc<MemorySink>) {
    let clock = Arc::new(ManualClock::new());
    let sink = Arc::new(MemorySink::new());
    let executor = CallExecutor::new(policy)
        .with_clock(clock.clone())
        .with_sink(sink.clone());
    (executor, clock, sink)
}

/// Operation that fails `failures` times with `status`, then returns "ok".
///
/// The counter reports how many times the operation actually ran.
#[allow(dead_code)]
pub fn flaky(
    failures: u32,
    status: u16,
) -> (impl Fn() -> Result<&'static str, ApiError> + Send + Sync + 'static, Arc<AtomicU32>) {
    let calls = Arc::new(AtomicU32::new(0));
    let counter = calls.clone();
    let op = move || {
        let n = counter.fetch_add(1, Ordering::SeqCst);
        if n < failures {
            Err(ApiError::new(status, format!("injected failure #{}", n + 1)))
        } else {
            Ok("ok")
        }
    };
    (op, calls)
}

/// Operation that always fails with `status`; the counter reports invocations.
#[allow(dead_code)]
pub fn always_failing(status: u16) -> (impl Fn() -> Result<(), ApiError> + Send + Sync + 'static, Arc<AtomicU32>) {
    let calls = Arc::new(AtomicU32::new(0));
    let counter = calls.clone();
    let op = move || {
        counter.fetch_add(1, Ordering::SeqCst);
        Err(ApiError::new(status, "always failing"))
    };
    (op, calls)
}
