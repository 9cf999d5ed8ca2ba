//! Circuit breaker for dependency protection.
//!
//! # States
//! - Closed: normal operation, calls pass through
//! - Open: dependency assumed down, calls fail fast
//! - Half-Open: one probe call tests whether the dependency recovered
//!
//! # State Transitions
//! ```text
//! Closed → Open: consecutive_failures >= failure_threshold
//! Open → Half-Open: circuit_open_duration elapsed since last failure
//! Half-Open → Closed: probe succeeds
//! Half-Open → Open: probe fails (new trip)
//! ```
//!
//! # Design Decisions
//! - One breaker per executor, not per endpoint
//! - Single writer: every transition happens inside one mutex critical section,
//!   so concurrent failures trip the circuit exactly once per edge
//! - Single probe in Half-Open; the admission carries a ticket so a finished
//!   probe can never release a newer probe's slot

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use serde::Serialize;

/// Circuit state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "CLOSED",
            CircuitState::Open => "OPEN",
            CircuitState::HalfOpen => "HALF_OPEN",
        }
    }
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a call was let through the breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Circuit closed.
    Normal,
    /// The single Half-Open probe for this cycle. `opened_half` is set when this
    /// admission moved the circuit out of Open.
    Probe { ticket: u64, opened_half: bool },
}

/// A call turned away without dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rejection {
    pub trip_count: u64,
    /// Cooldown left before a probe is admitted; zero while a probe is in flight.
    pub retry_after: Duration,
}

/// Result of recording a retryable failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FailureOutcome {
    /// State after the failure was recorded.
    pub state: CircuitState,
    /// This failure took the circuit into Open.
    pub tripped: bool,
    pub consecutive_failures: u32,
    pub trip_count: u64,
}

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    consecutive_failures: u32,
    last_failure: Option<Instant>,
    trip_count: u64,
    probe: Option<u64>,
    next_ticket: u64,
}

/// Three-state circuit breaker owned by one executor.
#[derive(Debug)]
pub struct CircuitBreaker {
    failure_threshold: u32,
    open_duration: Duration,
    inner: Mutex<BreakerState>,
}

impl CircuitBreaker {
    pub(crate) fn new(failure_threshold: u32, open_duration: Duration) -> Self {
        Self {
            failure_threshold,
            open_duration,
            inner: Mutex::new(BreakerState {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                last_failure: None,
                trip_count: 0,
                probe: None,
                next_ticket: 0,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BreakerState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    /// State and trip count read under one lock.
    pub fn snapshot(&self) -> (CircuitState, u64) {
        let inner = self.lock();
        (inner.state, inner.trip_count)
    }

    pub fn trip_count(&self) -> u64 {
        self.lock().trip_count
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.lock().consecutive_failures
    }

    pub fn failure_threshold(&self) -> u32 {
        self.failure_threshold
    }

    /// Gate a call at `now`.
    ///
    /// Open with cooldown elapsed moves to Half-Open and admits the caller as the probe.
    pub(crate) fn admit(&self, now: Instant) -> Result<Admission, Rejection> {
        let mut inner = self.lock();
        match inner.state {
            CircuitState::Closed => Ok(Admission::Normal),
            CircuitState::Open => {
                let elapsed = inner
                    .last_failure
                    .map(|at| now.saturating_duration_since(at))
                    .unwrap_or(self.open_duration);

                if elapsed >= self.open_duration {
                    inner.state = CircuitState::HalfOpen;
                    Ok(Self::issue_probe(&mut inner, true))
                } else {
                    Err(Rejection {
                        trip_count: inner.trip_count,
                        retry_after: self.open_duration - elapsed,
                    })
                }
            }
            CircuitState::HalfOpen => {
                if inner.probe.is_some() {
                    Err(Rejection {
                        trip_count: inner.trip_count,
                        retry_after: Duration::ZERO,
                    })
                } else {
                    Ok(Self::issue_probe(&mut inner, false))
                }
            }
        }
    }

    fn issue_probe(inner: &mut BreakerState, opened_half: bool) -> Admission {
        let ticket = inner.next_ticket;
        inner.next_ticket = inner.next_ticket.wrapping_add(1);
        inner.probe = Some(ticket);
        Admission::Probe { ticket, opened_half }
    }

    /// Free the probe slot held by `ticket`, if it still holds it.
    pub(crate) fn release_probe(&self, ticket: u64) {
        let mut inner = self.lock();
        if inner.probe == Some(ticket) {
            inner.probe = None;
        }
    }

    /// Record a success. Returns the previous state when it was not Closed.
    pub(crate) fn record_success(&self) -> Option<CircuitState> {
        let mut inner = self.lock();
        let previous = inner.state;
        inner.state = CircuitState::Closed;
        inner.consecutive_failures = 0;
        inner.probe = None;
        (previous != CircuitState::Closed).then_some(previous)
    }

    /// Record a retryable failure observed at `now`.
    pub(crate) fn record_failure(&self, now: Instant) -> FailureOutcome {
        let mut inner = self.lock();
        inner.consecutive_failures = inner.consecutive_failures.saturating_add(1);
        inner.last_failure = Some(now);

        let should_open = match inner.state {
            CircuitState::Closed => inner.consecutive_failures >= self.failure_threshold,
            CircuitState::HalfOpen => true,
            CircuitState::Open => false,
        };

        if should_open {
            inner.state = CircuitState::Open;
            inner.trip_count += 1;
            inner.probe = None;
            // Keep Open ⇒ failures >= threshold when a probe fails after a stray success.
            inner.consecutive_failures = inner.consecutive_failures.max(self.failure_threshold);
        }

        FailureOutcome {
            state: inner.state,
            tripped: should_open,
            consecutive_failures: inner.consecutive_failures,
            trip_count: inner.trip_count,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn breaker() -> CircuitBreaker {
        CircuitBreaker::new(3, Duration::from_secs(1))
    }

    #[test]
    fn test_starts_closed() {
        let cb = breaker();
        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.admit(Instant::now()), Ok(Admission::Normal));
    }

    #[test]
    fn test_trips_on_threshold() {
        let cb = breaker();
        let now = Instant::now();

        assert!(!cb.record_failure(now).tripped);
        assert!(!cb.record_failure(now).tripped);
        let outcome = cb.record_failure(now);
        assert!(outcome.tripped);
        assert_eq!(outcome.state, CircuitState::Open);
        assert_eq!(cb.trip_count(), 1);
    }

    #[test]
    fn test_trip_counted_once_per_edge() {
        let cb = breaker();
        let now = Instant::now();
        for _ in 0..10 {
            cb.record_failure(now);
        }
        assert_eq!(cb.state(), CircuitState::Open);
        assert_eq!(cb.trip_count(), 1);
        assert_eq!(cb.consecutive_failures(), 10);
    }

    #[test]
    fn test_success_resets_counter() {
        let cb = breaker();
        let now = Instant::now();
        cb.record_failure(now);
        cb.record_failure(now);
        assert_eq!(cb.record_success(), None);
        assert_eq!(cb.consecutive_failures(), 0);

        cb.record_failure(now);
        cb.record_failure(now);
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[test]
    fn test_open_rejects_until_cooldown() {
        let cb = breaker();
        let tripped_at = Instant::now();
        for _ in 0..3 {
            cb.record_failure(tripped_at);
        }

        let rejection = cb.admit(tripped_at + Duration::from_millis(400)).unwrap_err();
        assert_eq!(rejection.trip_count, 1);
        assert_eq!(rejection.retry_after, Duration::from_millis(600));
        assert_eq!(cb.state(), CircuitState::Open);

        let admission = cb.admit(tripped_at + Duration::from_secs(1)).unwrap();
        assert!(matches!(admission, Admission::Probe { .. }));
        assert_eq!(cb.state(), CircuitState::HalfOpen);
    }

    #[test]
    fn test_half_open_admits_single_probe() {
        let cb = breaker();
        let at = Instant::now();
        for _ in 0..3 {
            cb.record_failure(at);
        }
        let later = at + Duration::from_secs(2);

        let first = cb.admit(later).unwrap();
        assert!(cb.admit(later).is_err());
        assert!(cb.admit(later).is_err());

        assert!(matches!(first, Admission::Probe { opened_half: true, .. }));
        if let Admission::Probe { ticket, .. } = first {
            cb.release_probe(ticket);
        }
        // Already Half-Open: a replacement admission is not a new transition.
        assert!(matches!(
            cb.admit(later),
            Ok(Admission::Probe { opened_half: false, .. })
        ));
    }

    #[test]
    fn test_stale_release_keeps_new_probe() {
        let cb = breaker();
        let at = Instant::now();
        for _ in 0..3 {
            cb.record_failure(at);
        }
        let Ok(Admission::Probe { ticket: old, .. }) = cb.admit(at + Duration::from_secs(1)) else {
            panic!("expected probe");
        };

        // Probe fails, cooldown passes, a new probe is admitted.
        cb.record_failure(at + Duration::from_secs(1));
        let Ok(Admission::Probe { ticket: new, .. }) = cb.admit(at + Duration::from_secs(3)) else {
            panic!("expected second probe");
        };
        assert_ne!(old, new);

        cb.release_probe(old);
        assert!(cb.admit(at + Duration::from_secs(3)).is_err());
    }

    #[test]
    fn test_probe_success_closes() {
        let cb = breaker();
        let at = Instant::now();
        for _ in 0..3 {
            cb.record_failure(at);
        }
        cb.admit(at + Duration::from_secs(1)).unwrap();

        assert_eq!(cb.record_success(), Some(CircuitState::HalfOpen));
        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.consecutive_failures(), 0);
        assert_eq!(cb.trip_count(), 1);
    }

    #[test]
    fn test_probe_failure_reopens_and_resets_cooldown() {
        let cb = breaker();
        let at = Instant::now();
        for _ in 0..3 {
            cb.record_failure(at);
        }
        let probe_time = at + Duration::from_secs(5);
        cb.admit(probe_time).unwrap();

        let outcome = cb.record_failure(probe_time);
        assert!(outcome.tripped);
        assert_eq!(outcome.state, CircuitState::Open);
        assert_eq!(cb.trip_count(), 2);

        // Cooldown now counts from the probe failure.
        assert!(cb.admit(probe_time + Duration::from_millis(999)).is_err());
        assert!(cb.admit(probe_time + Duration::from_secs(1)).is_ok());
    }

    #[test]
    fn test_concurrent_failures_trip_once() {
        let cb = Arc::new(CircuitBreaker::new(5, Duration::from_secs(60)));
        let now = Instant::now();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cb = cb.clone();
                thread::spawn(move || {
                    for _ in 0..100 {
                        cb.record_failure(now);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(cb.state(), CircuitState::Open);
        assert_eq!(cb.trip_count(), 1);
        assert_eq!(cb.consecutive_failures(), 800);
    }

    #[test]
    fn test_snapshot_pairs_state_with_trip_count() {
        let cb = breaker();
        let now = Instant::now();
        assert_eq!(cb.snapshot(), (CircuitState::Closed, 0));

        for _ in 0..3 {
            cb.record_failure(now);
        }
        assert_eq!(cb.snapshot(), (CircuitState::Open, 1));
    }

    #[test]
    fn test_state_serializes_screaming_case() {
        assert_eq!(serde_json::to_string(&CircuitState::HalfOpen).unwrap(), "\"HALF_OPEN\"");
        assert_eq!(CircuitState::Open.to_string(), "OPEN");
    }
}
