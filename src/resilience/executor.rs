//! Resilient call executor.
//!
//! # Responsibilities
//! - Gate every call through the circuit breaker (fast fail while Open)
//! - Dispatch the wrapped operation on the blocking worker pool
//! - Classify failures once, retry retryable ones with full-jitter backoff
//! - Keep call statistics and report transitions to the event sink
//!
//! # Attempt Loop
//! ```text
//! execute(op)
//!     → breaker.admit()          Open + cooling down → CircuitOpen (no dispatch, no sleep)
//!     → dispatch attempt         spawn_blocking, bounded by a semaphore
//!     → success                  breaker.record_success() → Ok
//!     → fatal                    → Fatal (breaker untouched)
//!     → retryable                breaker.record_failure()
//!                                  circuit now Open → CircuitOpen
//!                                  budget left      → sleep(jitter) and retry
//!                                  budget spent     → RetriesExhausted
//! ```
//!
//! # Design Decisions
//! - Circuit state takes precedence over the remaining retry budget
//! - Cancelling a caller drops only its in-flight attempt; a dropped probe frees its slot
//! - The only suspension points are the dispatch and the backoff sleep

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tracing::Instrument;
use uuid::Uuid;

use crate::config::ExecutorConfig;
use crate::observability::events::{EventName, EventSink, TracingSink, TransitionEvent};
use crate::observability::metrics::{self, CallOutcome};
use crate::resilience::circuit_breaker::{Admission, CircuitBreaker, CircuitState};
use crate::resilience::clock::{Clock, MonotonicClock};
use crate::resilience::error::ExecutorError;
use crate::resilience::policy::{PolicyError, RetryPolicy};
use crate::resilience::retries::{ClassifiedFailure, Failure};
use crate::resilience::stats::{CallStats, StatsSnapshot};

/// Default cap on concurrently running blocking operations.
pub const DEFAULT_MAX_BLOCKING: usize = 64;

/// Executes operations with retries, backoff, and an integrated circuit breaker.
///
/// Share one instance between callers with `Arc`; all state is internally synchronized.
pub struct CallExecutor {
    policy: RetryPolicy,
    breaker: CircuitBreaker,
    stats: CallStats,
    clock: Arc<dyn Clock>,
    sink: Arc<dyn EventSink>,
    workers: Arc<Semaphore>,
}

impl CallExecutor {
    /// Create an executor with the monotonic clock and the tracing sink.
    pub fn new(policy: RetryPolicy) -> Self {
        let breaker = CircuitBreaker::new(policy.failure_threshold(), policy.circuit_open_duration());
        Self {
            policy,
            breaker,
            stats: CallStats::default(),
            clock: Arc::new(MonotonicClock),
            sink: Arc::new(TracingSink),
            workers: Arc::new(Semaphore::new(DEFAULT_MAX_BLOCKING)),
        }
    }

    /// Build an executor from a loaded configuration.
    pub fn from_config(config: &ExecutorConfig) -> Result<Self, PolicyError> {
        let policy = RetryPolicy::try_from(&config.retry)?;
        Ok(Self::new(policy).with_max_blocking(config.dispatch.max_blocking))
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Limit how many blocking operations may run at once (minimum 1).
    pub fn with_max_blocking(mut self, max_blocking: usize) -> Self {
        self.workers = Arc::new(Semaphore::new(max_blocking.max(1)));
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Read-only view of the breaker.
    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    pub fn circuit_state(&self) -> CircuitState {
        self.breaker.state()
    }

    pub fn stats(&self) -> StatsSnapshot {
        let (circuit_state, circuit_trips) = self.breaker.snapshot();
        StatsSnapshot {
            call_count: self.stats.call_count(),
            retry_count: self.stats.retry_count(),
            retry_rate: self.stats.retry_rate(),
            circuit_state,
            circuit_trips,
        }
    }

    /// Run a synchronous, possibly blocking operation on the worker pool.
    ///
    /// A panic inside `operation` resumes on the caller.
    pub async fn execute<F, T, E>(&self, operation: F) -> Result<T, ExecutorError<E>>
    where
        F: Fn() -> Result<T, E> + Send + Sync + 'static,
        T: Send + 'static,
        E: Failure,
    {
        let operation = Arc::new(operation);
        let workers = self.workers.clone();
        self.run(move || dispatch_blocking(workers.clone(), operation.clone()))
            .await
    }

    /// Run an asynchronous operation inline on the caller's task.
    pub async fn execute_async<F, Fut, T, E>(&self, mut operation: F) -> Result<T, ExecutorError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Failure,
    {
        self.run(move || {
            let attempt = operation();
            async move { Ok(attempt.await) }
        })
        .await
    }

    async fn run<M, Fut, T, E>(&self, attempt_fn: M) -> Result<T, ExecutorError<E>>
    where
        M: FnMut() -> Fut,
        Fut: Future<Output = Result<Result<T, E>, String>>,
        E: Failure,
    {
        let span = tracing::info_span!("call", call_id = %Uuid::new_v4());
        self.attempt_loop(attempt_fn).instrument(span).await
    }

    async fn attempt_loop<M, Fut, T, E>(&self, mut attempt_fn: M) -> Result<T, ExecutorError<E>>
    where
        M: FnMut() -> Fut,
        Fut: Future<Output = Result<Result<T, E>, String>>,
        E: Failure,
    {
        self.stats.record_call();
        let max_attempts = self.policy.max_attempts();

        let admission = match self.breaker.admit(self.clock.now()) {
            Ok(admission) => admission,
            Err(rejection) => {
                tracing::debug!(
                    trip_count = rejection.trip_count,
                    retry_after_ms = u64::try_from(rejection.retry_after.as_millis()).unwrap_or(u64::MAX),
                    "Circuit open, failing fast"
                );
                metrics::record_call(CallOutcome::CircuitOpen);
                return Err(ExecutorError::CircuitOpen {
                    trip_count: rejection.trip_count,
                    retry_after: Some(rejection.retry_after),
                    tripped_by: None,
                });
            }
        };

        let _probe = ProbeGuard::new(&self.breaker, admission);
        if let Admission::Probe { opened_half: true, .. } = admission {
            self.emit(TransitionEvent::new(EventName::CircuitHalfOpen, 0, max_attempts));
        }

        let mut attempt: u32 = 0;
        loop {
            let started = Instant::now();
            let dispatched = attempt_fn().await;
            metrics::record_attempt_duration(started);
            attempt += 1;

            let failure = match dispatched {
                Ok(Ok(value)) => {
                    if let Some(previous) = self.breaker.record_success() {
                        tracing::debug!(previous_state = %previous, "Success closed the circuit");
                        self.emit(TransitionEvent::new(EventName::CircuitClosed, attempt, max_attempts));
                    }
                    tracing::debug!(attempt, "Call succeeded");
                    metrics::record_call(CallOutcome::Success);
                    return Ok(value);
                }
                Ok(Err(failure)) => failure,
                Err(reason) => {
                    tracing::error!(attempt, error = %reason, "Dispatch failed");
                    metrics::record_call(CallOutcome::Dispatch);
                    return Err(ExecutorError::Dispatch(reason));
                }
            };

            let (code, failure) = match self.policy.classify(failure) {
                ClassifiedFailure::Fatal { code, failure } => {
                    self.emit(TransitionEvent::new(EventName::NonRetryable, attempt, max_attempts).with_status(code));
                    metrics::record_call(CallOutcome::Fatal);
                    return Err(ExecutorError::Fatal { code, source: failure });
                }
                ClassifiedFailure::Retryable { code, failure } => (code, failure),
            };

            let outcome = self.breaker.record_failure(self.clock.now());
            self.stats.record_retry();
            metrics::record_retry(code);

            if outcome.tripped {
                self.emit(TransitionEvent::new(EventName::CircuitOpened, attempt, max_attempts).with_status(code));
            }
            if outcome.state == CircuitState::Open {
                tracing::warn!(
                    attempt,
                    trip_count = outcome.trip_count,
                    consecutive_failures = outcome.consecutive_failures,
                    "Circuit tripped mid-retry sequence"
                );
                metrics::record_call(CallOutcome::CircuitOpen);
                return Err(ExecutorError::CircuitOpen {
                    trip_count: outcome.trip_count,
                    retry_after: None,
                    tripped_by: Some(failure),
                });
            }

            if attempt >= max_attempts {
                tracing::warn!(attempts = max_attempts, status_code = code, "Retries exhausted");
                metrics::record_call(CallOutcome::Exhausted);
                return Err(ExecutorError::RetriesExhausted {
                    attempts: max_attempts,
                    last: failure,
                });
            }

            let delay = self.policy.jitter_delay(attempt - 1, &mut rand::thread_rng());
            self.emit(
                TransitionEvent::new(EventName::Retry, attempt, max_attempts)
                    .with_delay(delay)
                    .with_status(code),
            );
            tokio::time::sleep(delay).await;
        }
    }

    fn emit(&self, event: TransitionEvent) {
        self.sink.emit(&event);
    }
}

/// Releases the Half-Open probe slot when the probing call ends, however it ends.
struct ProbeGuard<'a> {
    breaker: &'a CircuitBreaker,
    ticket: Option<u64>,
}

impl<'a> ProbeGuard<'a> {
    fn new(breaker: &'a CircuitBreaker, admission: Admission) -> Self {
        let ticket = match admission {
            Admission::Probe { ticket, .. } => Some(ticket),
            Admission::Normal => None,
        };
        Self { breaker, ticket }
    }
}

impl Drop for ProbeGuard<'_> {
    fn drop(&mut self) {
        if let Some(ticket) = self.ticket {
            self.breaker.release_probe(ticket);
        }
    }
}

/// Hand one attempt to the blocking pool once a worker slot is free.
async fn dispatch_blocking<F, T, E>(workers: Arc<Semaphore>, operation: Arc<F>) -> Result<Result<T, E>, String>
where
    F: Fn() -> Result<T, E> + Send + Sync + 'static,
    T: Send + 'static,
    E: Send + 'static,
{
    let permit = workers.acquire_owned().await.map_err(|e| e.to_string())?;

    // The permit moves into the task so the slot stays taken until the operation
    // returns, even if the caller stops waiting.
    let handle = tokio::task::spawn_blocking(move || {
        let _permit = permit;
        operation()
    });

    match handle.await {
        Ok(result) => Ok(result),
        Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
        Err(e) => Err(e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observability::events::MemorySink;
    use crate::resilience::clock::ManualClock;
    use crate::resilience::retries::ApiError;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    fn fast_policy() -> RetryPolicy {
        RetryPolicy::builder()
            .max_attempts(4)
            .base_delay(Duration::from_millis(1))
            .cap_delay(Duration::from_millis(5))
            .failure_threshold(3)
            .circuit_open_duration(Duration::from_millis(500))
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_success_without_retry() {
        let executor = CallExecutor::new(fast_policy());
        let result = executor.execute(|| Ok::<_, ApiError>(42)).await.unwrap();
        assert_eq!(result, 42);

        let stats = executor.stats();
        assert_eq!(stats.call_count, 1);
        assert_eq!(stats.retry_count, 0);
        assert_eq!(stats.circuit_state, CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_retry_events_carry_delay_and_status() {
        let sink = Arc::new(MemorySink::new());
        let executor = CallExecutor::new(fast_policy()).with_sink(sink.clone());
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();

        let result = executor
            .execute(move || {
                if c.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(ApiError::new(429, "rate limited"))
                } else {
                    Ok("ok")
                }
            })
            .await;

        assert_eq!(result.unwrap(), "ok");
        let events = sink.events();
        assert_eq!(events.len(), 2);
        for (i, event) in events.iter().enumerate() {
            assert_eq!(event.event_name, EventName::Retry);
            assert_eq!(event.attempt, i as u32 + 1);
            assert_eq!(event.max_attempts, 4);
            assert_eq!(event.status_code, Some(429));
            let delay = event.delay.unwrap();
            assert!(delay <= executor.policy().delay_ceiling(i as u32));
        }
    }

    #[tokio::test]
    async fn test_exhausted_before_threshold() {
        let policy = RetryPolicy::builder()
            .max_attempts(2)
            .base_delay(Duration::from_millis(1))
            .cap_delay(Duration::from_millis(2))
            .failure_threshold(5)
            .build()
            .unwrap();
        let executor = CallExecutor::new(policy);

        let err = executor
            .execute(|| Err::<(), _>(ApiError::new(500, "boom")))
            .await
            .unwrap_err();

        match err {
            ExecutorError::RetriesExhausted { attempts, last } => {
                assert_eq!(attempts, 2);
                assert_eq!(last.status, 500);
            }
            other => panic!("expected exhaustion, got {:?}", other),
        }
        assert_eq!(executor.stats().retry_count, 2);
        assert_eq!(executor.circuit_state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_async_operation() {
        let executor = CallExecutor::new(fast_policy());
        let mut calls = 0;
        let result = executor
            .execute_async(|| {
                calls += 1;
                let attempt = calls;
                async move {
                    if attempt == 1 {
                        Err(ApiError::new(503, "warming up"))
                    } else {
                        Ok(attempt)
                    }
                }
            })
            .await
            .unwrap();
        assert_eq!(result, 2);
        assert_eq!(executor.stats().retry_count, 1);
    }

    #[tokio::test]
    async fn test_fatal_probe_frees_slot() {
        let clock = Arc::new(ManualClock::new());
        let executor = CallExecutor::new(fast_policy()).with_clock(clock.clone());

        let _ = executor.execute(|| Err::<(), _>(ApiError::new(503, "down"))).await;
        assert_eq!(executor.circuit_state(), CircuitState::Open);

        clock.advance(Duration::from_secs(1));
        let err = executor
            .execute(|| Err::<(), _>(ApiError::new(401, "Unauthorized")))
            .await
            .unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(executor.circuit_state(), CircuitState::HalfOpen);

        // The next caller becomes the probe instead of being rejected.
        let result = executor.execute(|| Ok::<_, ApiError>("back")).await.unwrap();
        assert_eq!(result, "back");
        assert_eq!(executor.circuit_state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_dispatch_respects_worker_limit() {
        let executor = Arc::new(CallExecutor::new(fast_policy()).with_max_blocking(2));
        let running = Arc::new(AtomicU32::new(0));
        let peak = Arc::new(AtomicU32::new(0));

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let executor = executor.clone();
                let running = running.clone();
                let peak = peak.clone();
                tokio::spawn(async move {
                    executor
                        .execute(move || {
                            let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                            peak.fetch_max(now, Ordering::SeqCst);
                            std::thread::sleep(Duration::from_millis(20));
                            running.fetch_sub(1, Ordering::SeqCst);
                            Ok::<_, ApiError>(())
                        })
                        .await
                })
            })
            .collect();

        for task in tasks {
            task.await.unwrap().unwrap();
        }
        assert!(peak.load(Ordering::SeqCst) <= 2);
        assert_eq!(executor.stats().call_count, 8);
    }
}
