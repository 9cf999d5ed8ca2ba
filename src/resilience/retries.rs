//! Failure capture and classification.
//!
//! # Responsibilities
//! - Define what a failed operation must expose (a numeric status code)
//! - Classify each captured failure exactly once as Retryable or Fatal
//!
//! # Design Decisions
//! - Only codes in the retryable set are retried; everything else is fatal
//! - Fatal failures (auth, malformed request) never count against the breaker
//! - Classification carries the underlying failure so nothing re-inspects it later

use std::collections::BTreeSet;
use thiserror::Error;

/// Default retryable status codes: rate limiting and upstream 5xx.
pub const DEFAULT_RETRYABLE_CODES: [u16; 5] = [429, 500, 502, 503, 504];

/// A failure raised by a wrapped operation.
pub trait Failure: std::error::Error + Send + Sync + 'static {
    /// Numeric status code used for classification.
    fn status_code(&self) -> u16;
}

/// Remote API failure carrying a status code.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message} (status {status})")]
pub struct ApiError {
    pub status: u16,
    pub message: String,
}

impl ApiError {
    pub fn new(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

impl Failure for ApiError {
    fn status_code(&self) -> u16 {
        self.status
    }
}

/// A failure tagged at the capture boundary.
#[derive(Debug)]
pub enum ClassifiedFailure<E> {
    Retryable { code: u16, failure: E },
    Fatal { code: u16, failure: E },
}

impl<E> ClassifiedFailure<E> {
    pub fn code(&self) -> u16 {
        match self {
            ClassifiedFailure::Retryable { code, .. } | ClassifiedFailure::Fatal { code, .. } => *code,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, ClassifiedFailure::Retryable { .. })
    }
}

/// Decides Retryable vs Fatal from a failure's status code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureClassifier {
    retryable_codes: BTreeSet<u16>,
}

impl FailureClassifier {
    pub fn new(retryable_codes: impl IntoIterator<Item = u16>) -> Self {
        Self {
            retryable_codes: retryable_codes.into_iter().collect(),
        }
    }

    pub fn is_retryable(&self, code: u16) -> bool {
        self.retryable_codes.contains(&code)
    }

    pub fn retryable_codes(&self) -> &BTreeSet<u16> {
        &self.retryable_codes
    }

    pub fn classify<E: Failure>(&self, failure: E) -> ClassifiedFailure<E> {
        let code = failure.status_code();
        if self.is_retryable(code) {
            ClassifiedFailure::Retryable { code, failure }
        } else {
            ClassifiedFailure::Fatal { code, failure }
        }
    }
}

impl Default for FailureClassifier {
    fn default() -> Self {
        Self::new(DEFAULT_RETRYABLE_CODES)
    }
}
