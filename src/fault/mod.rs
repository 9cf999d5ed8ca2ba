//! Fault injection harness.
//!
//! # Responsibilities
//! - Simulate failure-rate and burst-outage profiles against the executor
//! - Keep runs reproducible (seeded RNG, call-indexed burst window)
//!
//! # Design Decisions
//! - Never part of the production call path; used by tests, demos, stress runs
//! - Injected faults are ordinary `ApiError`s so they flow through normal classification

pub mod injector;

pub use injector::{FaultInjector, FaultProfile};
