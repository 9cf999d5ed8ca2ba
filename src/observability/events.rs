//! Structured transition events.
//!
//! The executor reports every retry and breaker transition to an [`EventSink`]
//! injected at construction. [`TracingSink`] is the production sink: it logs
//! each event and updates the metrics. [`MemorySink`] keeps events for assertions.

use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use serde::Serialize;

use crate::observability::metrics;
use crate::resilience::circuit_breaker::CircuitState;

/// Kind of transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventName {
    Retry,
    CircuitOpened,
    CircuitHalfOpen,
    CircuitClosed,
    NonRetryable,
}

impl EventName {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventName::Retry => "retry",
            EventName::CircuitOpened => "circuit_opened",
            EventName::CircuitHalfOpen => "circuit_half_open",
            EventName::CircuitClosed => "circuit_closed",
            EventName::NonRetryable => "non_retryable",
        }
    }
}

/// One transition record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransitionEvent {
    pub event_name: EventName,
    /// Attempts made so far in this call.
    pub attempt: u32,
    pub max_attempts: u32,
    /// Backoff chosen before the next attempt (retry events only).
    pub delay: Option<Duration>,
    pub status_code: Option<u16>,
}

impl TransitionEvent {
    pub fn new(event_name: EventName, attempt: u32, max_attempts: u32) -> Self {
        Self {
            event_name,
            attempt,
            max_attempts,
            delay: None,
            status_code: None,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn with_status(mut self, status_code: u16) -> Self {
        self.status_code = Some(status_code);
        self
    }
}

/// Receiver of transition events.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: &TransitionEvent);
}

/// Logs events through `tracing` and mirrors breaker transitions into metrics.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: &TransitionEvent) {
        let delay_ms = event.delay.map(|d| d.as_secs_f64() * 1000.0);
        match event.event_name {
            EventName::Retry => {
                tracing::warn!(
                    event = event.event_name.as_str(),
                    attempt = event.attempt,
                    max_attempts = event.max_attempts,
                    delay_ms = ?delay_ms,
                    status_code = ?event.status_code,
                    "Retrying call"
                );
            }
            EventName::CircuitOpened => {
                tracing::warn!(
                    event = event.event_name.as_str(),
                    attempt = event.attempt,
                    status_code = ?event.status_code,
                    "Circuit opened"
                );
                metrics::record_circuit_transition(CircuitState::Open);
            }
            EventName::CircuitHalfOpen => {
                tracing::info!(event = event.event_name.as_str(), "Circuit half-open, admitting probe");
                metrics::record_circuit_transition(CircuitState::HalfOpen);
            }
            EventName::CircuitClosed => {
                tracing::info!(
                    event = event.event_name.as_str(),
                    attempt = event.attempt,
                    "Circuit closed"
                );
                metrics::record_circuit_transition(CircuitState::Closed);
            }
            EventName::NonRetryable => {
                tracing::error!(
                    event = event.event_name.as_str(),
                    attempt = event.attempt,
                    status_code = ?event.status_code,
                    "Non-retryable failure"
                );
            }
        }
    }
}

/// Keeps every event in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<TransitionEvent>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<TransitionEvent> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn names(&self) -> Vec<EventName> {
        self.events().iter().map(|e| e.event_name).collect()
    }

    pub fn count(&self, name: EventName) -> usize {
        self.events().iter().filter(|e| e.event_name == name).count()
    }
}

impl EventSink for MemorySink {
    fn emit(&self, event: &TransitionEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event.clone());
    }
}
