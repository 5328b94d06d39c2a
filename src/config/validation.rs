//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, sample rate within 0..=1)
//! - Detect conflicting listener addresses
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Only enabled sections are checked
//! - Runs before config is handed to the orchestrator

use thiserror::Error;
use tracing_subscriber::EnvFilter;

use crate::adapters::error_reporter::Dsn;
use crate::config::schema::InfraConfig;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("{field} must not be empty")]
    Empty { field: &'static str },

    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },

    #[error("grpc and http both listen on port {0}")]
    PortConflict(u16),

    #[error("invalid log level directive '{0}'")]
    LogLevel(String),

    #[error("sample rate {0} is outside 0.0..=1.0")]
    SampleRate(f32),

    #[error("http base path '{0}' must start with '/'")]
    BasePath(String),

    #[error("invalid error-reporting DSN: {0}")]
    Dsn(String),
}

/// Check the whole bundle, collecting every problem found.
pub fn validate_config(config: &InfraConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.logging.enabled && EnvFilter::try_new(&config.logging.level).is_err() {
        errors.push(ValidationError::LogLevel(config.logging.level.clone()));
    }

    let reporting = &config.error_reporting;
    if reporting.enabled {
        if !(0.0..=1.0).contains(&reporting.sample_rate) {
            errors.push(ValidationError::SampleRate(reporting.sample_rate));
        }
        if !reporting.dsn.is_empty() {
            if let Err(e) = reporting.dsn.parse::<Dsn>() {
                errors.push(ValidationError::Dsn(e.to_string()));
            }
        }
        if reporting.queue_capacity == 0 {
            errors.push(ValidationError::Zero { field: "error_reporting.queue_capacity" });
        }
        if reporting.request_timeout_secs == 0 {
            errors.push(ValidationError::Zero { field: "error_reporting.request_timeout_secs" });
        }
        if reporting.flush_timeout_secs == 0 {
            errors.push(ValidationError::Zero { field: "error_reporting.flush_timeout_secs" });
        }
    }

    if config.metrics.enabled && config.metrics.upkeep_interval_secs == 0 {
        errors.push(ValidationError::Zero { field: "metrics.upkeep_interval_secs" });
    }

    let pg = &config.postgres;
    if pg.enabled {
        if pg.host.is_empty() {
            errors.push(ValidationError::Empty { field: "postgres.host" });
        }
        if pg.db_name.is_empty() {
            errors.push(ValidationError::Empty { field: "postgres.db_name" });
        }
        if pg.max_connections == 0 {
            errors.push(ValidationError::Zero { field: "postgres.max_connections" });
        }
        if pg.connect_timeout_secs == 0 {
            errors.push(ValidationError::Zero { field: "postgres.connect_timeout_secs" });
        }
        if pg.close_timeout_secs == 0 {
            errors.push(ValidationError::Zero { field: "postgres.close_timeout_secs" });
        }
    }

    let kafka = &config.kafka;
    if kafka.producer.enabled || kafka.consumer.enabled {
        if kafka.brokers.iter().all(|b| b.trim().is_empty()) {
            errors.push(ValidationError::Empty { field: "kafka.brokers" });
        }
        if kafka.topic.is_empty() {
            errors.push(ValidationError::Empty { field: "kafka.topic" });
        }
    }
    if kafka.producer.enabled {
        if kafka.producer.message_timeout_ms == 0 {
            errors.push(ValidationError::Zero { field: "kafka.producer.message_timeout_ms" });
        }
        if kafka.producer.close_timeout_secs == 0 {
            errors.push(ValidationError::Zero { field: "kafka.producer.close_timeout_secs" });
        }
    }
    if kafka.consumer.enabled {
        if kafka.consumer.close_timeout_secs == 0 {
            errors.push(ValidationError::Zero { field: "kafka.consumer.close_timeout_secs" });
        }
        if kafka.group_id.is_empty() {
            errors.push(ValidationError::Empty { field: "kafka.group_id" });
        }
        if kafka.consumer.channel_capacity == 0 {
            errors.push(ValidationError::Zero { field: "kafka.consumer.channel_capacity" });
        }
    }

    if config.grpc.enabled {
        if config.grpc.request_timeout_secs == 0 {
            errors.push(ValidationError::Zero { field: "grpc.request_timeout_secs" });
        }
        if config.grpc.shutdown_timeout_secs == 0 {
            errors.push(ValidationError::Zero { field: "grpc.shutdown_timeout_secs" });
        }
    }

    let http = &config.http;
    if http.enabled {
        if !http.base_path.starts_with('/') {
            errors.push(ValidationError::BasePath(http.base_path.clone()));
        }
        if http.request_timeout_secs == 0 {
            errors.push(ValidationError::Zero { field: "http.request_timeout_secs" });
        }
        if http.shutdown_timeout_secs == 0 {
            errors.push(ValidationError::Zero { field: "http.shutdown_timeout_secs" });
        }
    }

    // Port 0 asks the OS for an ephemeral port, so it never conflicts.
    if config.grpc.enabled
        && http.enabled
        && config.grpc.port != 0
        && config.grpc.port == http.port
        && config.grpc.host == http.host
    {
        errors.push(ValidationError::PortConflict(http.port));
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
        assert_eq!(validate_config(&InfraConfig::default()), Ok(()));
    }

    #[test]
    fn test_collects_all_errors() {
        let mut config = InfraConfig::default();
        config.grpc.port = 9000;
        config.http.port = 9000;
        config.http.base_path = "api".to_string();
        config.error_reporting.sample_rate = 1.5;
        config.kafka.brokers.clear();

        let errors = validate_config(&config).unwrap_err();

        assert!(errors.contains(&ValidationError::PortConflict(9000)));
        assert!(errors.contains(&ValidationError::BasePath("api".to_string())));
        assert!(errors.contains(&ValidationError::SampleRate(1.5)));
        assert!(errors.contains(&ValidationError::Empty { field: "kafka.brokers" }));
        assert_eq!(errors.len(), 4);
    }

    #[test]
    fn test_zero_timeouts_are_rejected() {
        let mut config = InfraConfig::default();
        config.postgres.close_timeout_secs = 0;
        config.kafka.producer.close_timeout_secs = 0;
        config.kafka.producer.message_timeout_ms = 0;
        config.kafka.consumer.close_timeout_secs = 0;
        config.error_reporting.flush_timeout_secs = 0;
        config.error_reporting.request_timeout_secs = 0;
        config.grpc.request_timeout_secs = 0;

        let errors = validate_config(&config).unwrap_err();

        for field in [
            "postgres.close_timeout_secs",
            "kafka.producer.close_timeout_secs",
            "kafka.producer.message_timeout_ms",
            "kafka.consumer.close_timeout_secs",
            "error_reporting.flush_timeout_secs",
            "error_reporting.request_timeout_secs",
            "grpc.request_timeout_secs",
        ] {
            assert!(
                errors.contains(&ValidationError::Zero { field }),
                "missing zero check for {}",
                field
            );
        }
        assert_eq!(errors.len(), 7);
    }

    #[test]
    fn test_dsn_must_carry_key_and_project() {
        let mut config = InfraConfig::default();
        config.error_reporting.dsn = "https://example.com".to_string();
        let errors = validate_config(&config).unwrap_err();
        assert!(matches!(errors.as_slice(), [ValidationError::Dsn(_)]));

        config.error_reporting.dsn = "https://key@errors.example.com/42".to_string();
        assert_eq!(validate_config(&config), Ok(()));
    }

    #[test]
    fn test_disabled_sections_are_skipped() {
        let mut config = InfraConfig::default();
        config.kafka.brokers.clear();
        config.kafka.producer.enabled = false;
        config.kafka.consumer.enabled = false;
        config.postgres.enabled = false;
        config.postgres.host.clear();

        assert_eq!(validate_config(&config), Ok(()));
    }
}
