//! Immutable retry and breaker policy.

use std::collections::BTreeSet;
use std::time::Duration;
use rand::Rng;
use thiserror::Error;

use crate::config::RetryConfig;
use crate::resilience::backoff::{backoff_ceiling, full_jitter};
use crate::resilience::retries::{ClassifiedFailure, Failure, FailureClassifier, DEFAULT_RETRYABLE_CODES};

/// Violations of the policy invariants.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PolicyError {
    #[error("max_attempts must be greater than zero")]
    ZeroAttempts,

    #[error("base_delay must be greater than zero")]
    ZeroBaseDelay,

    #[error("cap_delay ({cap:?}) must be at least base_delay ({base:?})")]
    CapBelowBase { base: Duration, cap: Duration },

    #[error("failure_threshold must be greater than zero")]
    ZeroThreshold,

    #[error("circuit_open_duration must be greater than zero")]
    ZeroOpenDuration,
}

/// Retry budget, backoff envelope, and breaker thresholds for one executor.
///
/// Built once through [`RetryPolicy::builder`] and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
    cap_delay: Duration,
    classifier: FailureClassifier,
    failure_threshold: u32,
    circuit_open_duration: Duration,
}

impl RetryPolicy {
    pub fn builder() -> RetryPolicyBuilder {
        RetryPolicyBuilder::default()
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn base_delay(&self) -> Duration {
        self.base_delay
    }

    pub fn cap_delay(&self) -> Duration {
        self.cap_delay
    }

    pub fn retryable_codes(&self) -> &BTreeSet<u16> {
        self.classifier.retryable_codes()
    }

    pub fn failure_threshold(&self) -> u32 {
        self.failure_threshold
    }

    pub fn circuit_open_duration(&self) -> Duration {
        self.circuit_open_duration
    }

    /// Tag a captured failure as Retryable or Fatal.
    pub fn classify<E: Failure>(&self, failure: E) -> ClassifiedFailure<E> {
        self.classifier.classify(failure)
    }

    /// Largest delay that may follow the zero-based `attempt`.
    pub fn delay_ceiling(&self, attempt: u32) -> Duration {
        backoff_ceiling(attempt, self.base_delay, self.cap_delay)
    }

    /// Full-jitter delay after the zero-based `attempt`.
    pub fn jitter_delay<R: Rng + ?Sized>(&self, attempt: u32, rng: &mut R) -> Duration {
        full_jitter(attempt, self.base_delay, self.cap_delay, rng)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        let builder = RetryPolicyBuilder::default();
        Self {
            max_attempts: builder.max_attempts,
            base_delay: builder.base_delay,
            cap_delay: builder.cap_delay,
            classifier: FailureClassifier::new(builder.retryable_codes),
            failure_threshold: builder.failure_threshold,
            circuit_open_duration: builder.circuit_open_duration,
        }
    }
}

impl TryFrom<&RetryConfig> for RetryPolicy {
    type Error = PolicyError;

    fn try_from(config: &RetryConfig) -> Result<Self, Self::Error> {
        RetryPolicyBuilder::from(config).build()
    }
}

/// Unvalidated policy parameters.
#[derive(Debug, Clone)]
pub struct RetryPolicyBuilder {
    max_attempts: u32,
    base_delay: Duration,
    cap_delay: Duration,
    retryable_codes: BTreeSet<u16>,
    failure_threshold: u32,
    circuit_open_duration: Duration,
}

impl Default for RetryPolicyBuilder {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(500),
            cap_delay: Duration::from_secs(30),
            retryable_codes: DEFAULT_RETRYABLE_CODES.into_iter().collect(),
            failure_threshold: 3,
            circuit_open_duration: Duration::from_secs(60),
        }
    }
}

impl From<&RetryConfig> for RetryPolicyBuilder {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            base_delay: Duration::from_millis(config.base_delay_ms),
            cap_delay: Duration::from_millis(config.cap_delay_ms),
            retryable_codes: config.retryable_codes.iter().copied().collect(),
            failure_threshold: config.failure_threshold,
            circuit_open_duration: Duration::from_millis(config.circuit_open_ms),
        }
    }
}

impl RetryPolicyBuilder {
    pub fn max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    pub fn cap_delay(mut self, cap_delay: Duration) -> Self {
        self.cap_delay = cap_delay;
        self
    }

    pub fn retryable_codes(mut self, codes: impl IntoIterator<Item = u16>) -> Self {
        self.retryable_codes = codes.into_iter().collect();
        self
    }

    pub fn failure_threshold(mut self, failure_threshold: u32) -> Self {
        self.failure_threshold = failure_threshold;
        self
    }

    pub fn circuit_open_duration(mut self, circuit_open_duration: Duration) -> Self {
        self.circuit_open_duration = circuit_open_duration;
        self
    }

    /// Every invariant the parameters break, in declaration order.
    pub fn violations(&self) -> Vec<PolicyError> {
        let mut errors = Vec::new();
        if self.max_attempts == 0 {
            errors.push(PolicyError::ZeroAttempts);
        }
        if self.base_delay.is_zero() {
            errors.push(PolicyError::ZeroBaseDelay);
        }
        if self.cap_delay < self.base_delay {
            errors.push(PolicyError::CapBelowBase {
                base: self.base_delay,
                cap: self.cap_delay,
            });
        }
        if self.failure_threshold == 0 {
            errors.push(PolicyError::ZeroThreshold);
        }
        if self.circuit_open_duration.is_zero() {
            errors.push(PolicyError::ZeroOpenDuration);
        }
        errors
    }

    pub fn build(self) -> Result<RetryPolicy, PolicyError> {
        if let Some(first) = self.violations().into_iter().next() {
            return Err(first);
        }

        Ok(RetryPolicy {
            max_attempts: self.max_attempts,
            base_delay: self.base_delay,
            cap_delay: self.cap_delay,
            classifier: FailureClassifier::new(self.retryable_codes),
            failure_threshold: self.failure_threshold,
            circuit_open_duration: self.circuit_open_duration,
        })
    }
}
