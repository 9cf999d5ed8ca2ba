//! Resilient call executor: bounded retries, full-jitter backoff, and an
//! integrated circuit breaker around any remote operation.

pub mod config;
pub mod fault;
pub mod observability;
pub mod resilience;

pub use config::ExecutorConfig;
pub use resilience::{ApiError, CallExecutor, CircuitState, ExecutorError, Failure, RetryPolicy};
