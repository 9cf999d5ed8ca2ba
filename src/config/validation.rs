//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check the retry policy invariants
//! - Validate value ranges (worker pool size, fault rates, addresses)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ExecutorConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;
use thiserror::Error;
use tracing_subscriber::EnvFilter;

use crate::config::schema::ExecutorConfig;
use crate::resilience::policy::{PolicyError, RetryPolicyBuilder};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("retry: {0}")]
    Retry(#[from] PolicyError),

    #[error("dispatch.max_blocking must be greater than zero")]
    ZeroWorkers,

    #[error("observability.log_level {0:?} is not a valid filter")]
    LogLevel(String),

    #[error("observability.metrics_address {0:?} is not a socket address")]
    MetricsAddress(String),

    #[error("fault.failure_rate {0} must be within [0, 1]")]
    FailureRate(f64),
}

pub fn validate_config(config: &ExecutorConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors: Vec<ValidationError> = RetryPolicyBuilder::from(&config.retry)
        .violations()
        .into_iter()
        .map(ValidationError::from)
        .collect();

    if config.dispatch.max_blocking == 0 {
        errors.push(ValidationError::ZeroWorkers);
    }

    if EnvFilter::try_new(&config.observability.log_level).is_err() {
        errors.push(ValidationError::LogLevel(config.observability.log_level.clone()));
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::MetricsAddress(
            config.observability.metrics_address.clone(),
        ));
    }

    if !(0.0..=1.0).contains(&config.fault.failure_rate) {
        errors.push(ValidationError::FailureRate(config.fault.failure_rate));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert_eq!(validate_config(&ExecutorConfig::default()), Ok(()));
    }

    #[test]
    fn test_collects_every_error() {
        let mut config = ExecutorConfig::default();
        config.retry.max_attempts = 0;
        config.retry.cap_delay_ms = 10;
        config.dispatch.max_blocking = 0;
        config.observability.metrics_enabled = true;
        config.observability.metrics_address = "not-an-addr".into();
        config.fault.failure_rate = 1.5;

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 5);
        assert_eq!(errors[0], ValidationError::Retry(PolicyError::ZeroAttempts));
        assert!(matches!(errors[1], ValidationError::Retry(PolicyError::CapBelowBase { .. })));
        assert!(errors.contains(&ValidationError::ZeroWorkers));
        assert!(errors.contains(&ValidationError::FailureRate(1.5)));
    }

    #[test]
    fn test_metrics_address_ignored_when_disabled() {
        let mut config = ExecutorConfig::default();
        config.observability.metrics_address = "nope".into();
        assert_eq!(validate_config(&config), Ok(()));
    }
}
