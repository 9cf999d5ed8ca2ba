//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! CallExecutor produces:
//!     → events.rs (transition records to the injected sink)
//!     → metrics.rs (counters, gauges, histograms)
//!     → logging.rs (tracing subscriber for everything above)
//! ```
//!
//! # Design Decisions
//! - Sinks are injected per executor; there is no global event bus
//! - Every call runs in a span carrying a UUID `call_id`
//! - Metrics are cheap and no-ops without a recorder

pub mod events;
pub mod logging;
pub mod metrics;

pub use events::{EventName, EventSink, MemorySink, TracingSink, TransitionEvent};
