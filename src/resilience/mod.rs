//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Call to a remote dependency:
//!     → executor.rs (attempt loop, dispatch on the worker pool)
//!     → circuit_breaker.rs (gate the call, track consecutive failures)
//!     → retries.rs (classify the failure once: retryable or fatal)
//!     → backoff.rs (full-jitter delay before the next attempt)
//! ```
//!
//! # Design Decisions
//! - Policy, clock, and event sink are injected per executor; no globals
//! - Fatal failures never count against the breaker
//! - The breaker is single-writer: one mutex, one critical section per transition
//! - Open circuit fails fast in O(1): no dispatch, no sleep

pub mod backoff;
pub mod circuit_breaker;
pub mod clock;
pub mod error;
pub mod executor;
pub mod policy;
pub mod retries;
pub mod stats;

pub use circuit_breaker::{CircuitBreaker, CircuitState};
pub use clock::{Clock, ManualClock, MonotonicClock};
pub use error::ExecutorError;
pub use executor::CallExecutor;
pub use policy::{PolicyError, RetryPolicy, RetryPolicyBuilder};
pub use retries::{ApiError, ClassifiedFailure, Failure, FailureClassifier};
pub use stats::{CallStats, StatsSnapshot};
