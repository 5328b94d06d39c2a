//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → InfraConfig (validated, immutable)
//!     → lifecycle::Plan hands each adapter its own section
//! ```
//!
//! # Design Decisions
//! - Config is an explicit value passed to the plan; nothing reads process globals
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, parse_config, read_config, ConfigError};
pub use schema::{
    ConsumerConfig, Environment, ErrorReportingConfig, GrpcConfig, HttpConfig, InfraConfig,
    KafkaConfig, LogFormat, LoggingConfig, MetricsConfig, PostgresConfig, ProducerConfig,
};
pub use validation::{validate_config, ValidationError};
