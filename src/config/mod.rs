//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → EngineConfig (validated, immutable)
//!     → handed to RiskEngine::new, which sizes every subsystem from it
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require a new engine
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::CacheConfig;
pub use schema::CircuitBreakerConfig;
pub use schema::EngineConfig;
pub use schema::ExecutionConfig;
pub use schema::LogFormat;
pub use schema::ObservabilityConfig;
pub use schema::ThresholdConfig;
