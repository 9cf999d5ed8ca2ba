//! Errors surfaced by `CallExecutor::execute`.

use std::time::Duration;
use thiserror::Error;

use crate::resilience::retries::Failure;

/// Errors a caller can observe from one logical call.
#[derive(Debug, Error)]
pub enum ExecutorError<E: Failure> {
    /// Non-retryable failure on the first occurrence; the breaker was not touched.
    #[error("non-retryable failure (status {code})")]
    Fatal {
        code: u16,
        #[source]
        source: E,
    },

    /// Every attempt in the budget failed with a retryable code.
    #[error("exhausted {attempts} attempts")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        last: E,
    },

    /// Rejected by an open circuit, or the circuit tripped mid-retry.
    #[error("circuit is open, failing fast (trips={trip_count})")]
    CircuitOpen {
        trip_count: u64,
        /// Time until a probe may be admitted, when the call was rejected up front.
        retry_after: Option<Duration>,
        /// The failure that tripped the circuit during this call.
        tripped_by: Option<E>,
    },

    /// The attempt could not be handed to the worker pool.
    #[error("dispatch failed: {0}")]
    Dispatch(String),
}

impl<E: Failure> ExecutorError<E> {
    pub fn is_circuit_open(&self) -> bool {
        matches!(self, ExecutorError::CircuitOpen { .. })
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, ExecutorError::Fatal { .. })
    }

    pub fn is_exhausted(&self) -> bool {
        matches!(self, ExecutorError::RetriesExhausted { .. })
    }

    /// Status code of the underlying failure, if there is one.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            ExecutorError::Fatal { code, .. } => Some(*code),
            ExecutorError::RetriesExhausted { last, .. } => Some(last.status_code()),
            ExecutorError::CircuitOpen { tripped_by, .. } => tripped_by.as_ref().map(Failure::status_code),
            ExecutorError::Dispatch(_) => None,
        }
    }
}
