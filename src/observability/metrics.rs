//! Metrics collection and exposition.
//!
//! # Metrics
//! - `executor_calls_total` (counter): logical calls by outcome
//! - `executor_retries_total` (counter): retryable failures by status code
//! - `executor_circuit_transitions_total` (counter): breaker transitions by target state
//! - `executor_circuit_state` (gauge): 0=closed, 1=open, 2=half_open
//! - `executor_attempt_duration_seconds` (histogram): dispatch latency per attempt
//!
//! # Design Decisions
//! - `metrics` facade; calls are no-ops until a recorder is installed
//! - Prometheus exporter is opt-in through `ObservabilityConfig::metrics_enabled`

use std::net::SocketAddr;
use std::time::Instant;
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::resilience::circuit_breaker::CircuitState;

/// Install the Prometheus recorder with an HTTP scrape listener on `addr`.
///
/// Must be called from inside a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

/// Outcome label for `executor_calls_total`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallOutcome {
    Success,
    Fatal,
    Exhausted,
    CircuitOpen,
    Dispatch,
}

impl CallOutcome {
    fn as_str(&self) -> &'static str {
        match self {
            CallOutcome::Success => "success",
            CallOutcome::Fatal => "fatal",
            CallOutcome::Exhausted => "exhausted",
            CallOutcome::CircuitOpen => "circuit_open",
            CallOutcome::Dispatch => "dispatch",
        }
    }
}

pub fn record_call(outcome: CallOutcome) {
    metrics::counter!("executor_calls_total", "outcome" => outcome.as_str()).increment(1);
}

pub fn record_retry(status_code: u16) {
    metrics::counter!("executor_retries_total", "status" => status_code.to_string()).increment(1);
}

pub fn record_circuit_transition(to: CircuitState) {
    let (label, value) = match to {
        CircuitState::Closed => ("closed", 0.0),
        CircuitState::Open => ("open", 1.0),
        CircuitState::HalfOpen => ("half_open", 2.0),
    };
    metrics::counter!("executor_circuit_transitions_total", "to" => label).increment(1);
    metrics::gauge!("executor_circuit_state").set(value);
}

pub fn record_attempt_duration(start: Instant) {
    metrics::histogram!("executor_attempt_duration_seconds").record(start.elapsed().as_secs_f64());
}
