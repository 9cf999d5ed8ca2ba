//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → ExecutorConfig (validated, immutable)
//!     → RetryPolicy::try_from(&config.retry) for each executor
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; a policy never changes under a live executor
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{DispatchConfig, ExecutorConfig, FaultConfig, LogFormat, ObservabilityConfig, RetryConfig};
pub use validation::{validate_config, ValidationError};
