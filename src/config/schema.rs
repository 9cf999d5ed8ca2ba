//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the executor.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

use crate::resilience::executor::DEFAULT_MAX_BLOCKING;
use crate::resilience::retries::DEFAULT_RETRYABLE_CODES;

/// Root configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Retry budget, backoff, and breaker thresholds.
    pub retry: RetryConfig,

    /// Worker pool settings.
    pub dispatch: DispatchConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Fault profile used by the demo and stress commands.
    pub fault: FaultConfig,
}

/// Retry configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct RetryConfig {
    /// Attempts per logical call, including the first.
    pub max_attempts: u32,

    /// Base delay for exponential backoff in milliseconds.
    pub base_delay_ms: u64,

    /// Maximum delay for exponential backoff in milliseconds.
    pub cap_delay_ms: u64,

    /// Status codes worth retrying.
    pub retryable_codes: Vec<u16>,

    /// Consecutive retryable failures that open the circuit.
    pub failure_threshold: u32,

    /// How long the circuit stays open before probing, in milliseconds.
    pub circuit_open_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay_ms: 500,
            cap_delay_ms: 30_000,
            retryable_codes: DEFAULT_RETRYABLE_CODES.to_vec(),
            failure_threshold: 3,
            circuit_open_ms: 60_000,
        }
    }
}

/// Worker pool configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct DispatchConfig {
    /// Maximum blocking operations running at once.
    pub max_blocking: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            max_blocking: DEFAULT_MAX_BLOCKING,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log filter (trace, debug, info, warn, error, or a full directive).
    pub log_level: String,

    /// Pretty for development, JSON for production.
    pub log_format: LogFormat,

    /// Enable the Prometheus endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}

/// Injected fault profile.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct FaultConfig {
    /// Probability a call fails outside the burst window.
    pub failure_rate: f64,

    /// Status code of injected failures.
    pub status_code: u16,

    /// 1-based call number where a forced outage starts.
    pub burst_at: Option<u64>,

    /// Length of the forced outage in calls.
    pub burst_duration: u64,

    /// RNG seed for reproducible runs.
    pub seed: u64,
}

impl Default for FaultConfig {
    fn default() -> Self {
        Self {
            failure_rate: 0.25,
            status_code: 429,
            burst_at: Some(5),
            burst_duration: 4,
            seed: 6,
        }
    }
}
