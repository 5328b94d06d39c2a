//! Default resource plan.
//!
//! Turns an `InfraConfig` into the ordered spec list the orchestrator runs:
//!
//! ```text
//! log_sink → error_reporter → metrics → postgres
//!     → producer → consumer → grpc → http
//! ```
//!
//! Logging comes first so every later step is observable. Listeners start
//! last so nothing is served before its dependencies exist.

use axum::Router;

use crate::adapters::{
    ConsumerAdapter, ErrorReporterAdapter, GrpcServerAdapter, HttpServerAdapter, LogSinkAdapter,
    MetricsAdapter, PostgresAdapter, ProducerAdapter,
};
use crate::config::InfraConfig;
use crate::lifecycle::orchestrator::{Orchestrator, ResourceSpec};

/// Builder for the orchestrator of a config-driven service.
pub struct Plan {
    config: InfraConfig,
    routes: Option<Router>,
}

impl Plan {
    pub fn from_config(config: &InfraConfig) -> Self {
        Self {
            config: config.clone(),
            routes: None,
        }
    }

    /// Application routes served by the HTTP server under its base path.
    pub fn with_routes(mut self, routes: Router) -> Self {
        self.routes = Some(routes);
        self
    }

    pub fn build(self) -> Orchestrator {
        let Plan { config, routes } = self;
        let mut orchestrator = Orchestrator::new();

        if config.logging.enabled {
            let required = config.logging.required;
            let adapter = LogSinkAdapter::new(config.logging.clone(), config.environment);
            orchestrator.push(ResourceSpec::new(adapter, required));
        }

        if config.error_reporting.enabled {
            let required = config.error_reporting.required;
            let adapter = ErrorReporterAdapter::new(
                config.error_reporting.clone(),
                config.environment,
                config.service_name.clone(),
            );
            orchestrator.push(ResourceSpec::new(adapter, required));
        }

        if config.metrics.enabled {
            let required = config.metrics.required;
            let adapter = MetricsAdapter::new(config.metrics.clone());
            orchestrator.push(ResourceSpec::new(adapter, required));
        }

        if config.postgres.enabled {
            let required = config.postgres.required;
            let adapter = PostgresAdapter::new(config.postgres.clone());
            orchestrator.push(ResourceSpec::new(adapter, required));
        }

        if config.kafka.producer.enabled {
            let required = config.kafka.producer.required;
            let adapter = ProducerAdapter::new(config.kafka.clone());
            orchestrator.push(ResourceSpec::new(adapter, required));
        }

        if config.kafka.consumer.enabled {
            let required = config.kafka.consumer.required;
            let adapter = ConsumerAdapter::new(config.kafka.clone());
            orchestrator.push(ResourceSpec::new(adapter, required));
        }

        if config.grpc.enabled {
            let required = config.grpc.required;
            let adapter = GrpcServerAdapter::new(config.grpc.clone());
            orchestrator.push(ResourceSpec::new(adapter, required));
        }

        if config.http.enabled {
            let required = config.http.required;
            let mut adapter = HttpServerAdapter::new(config.http.clone());
            if let Some(routes) = routes {
                adapter = adapter.with_routes(routes);
            }
            orchestrator.push(ResourceSpec::new(adapter, required));
        }

        tracing::debug!(plan = ?orchestrator.plan(), "Resource plan built");
        orchestrator
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_plan_order() {
        let orchestrator = Plan::from_config(&InfraConfig::default()).build();
        assert_eq!(
            orchestrator.plan(),
            vec![
                "log_sink",
                "error_reporter",
                "metrics",
                "postgres",
                "producer",
                "consumer",
                "grpc",
                "http"
            ]
        );
    }

    #[test]
    fn test_disabled_sections_are_skipped() {
        let mut config = InfraConfig::default();
        config.postgres.enabled = false;
        config.kafka.producer.enabled = false;
        config.kafka.consumer.enabled = false;
        config.grpc.enabled = false;

        let orchestrator = Plan::from_config(&config).build();
        assert_eq!(
            orchestrator.plan(),
            vec!["log_sink", "error_reporter", "metrics", "http"]
        );
    }

    #[test]
    fn test_required_flags_follow_config() {
        let mut config = InfraConfig::default();
        config.postgres.required = false;
        config.metrics.required = true;

        let orchestrator = Plan::from_config(&config).build();
        let required: Vec<(&str, bool)> = orchestrator
            .specs()
            .iter()
            .map(|spec| (spec.name(), spec.is_required()))
            .collect();

        assert!(required.contains(&("postgres", false)));
        assert!(required.contains(&("metrics", true)));
        assert!(required.contains(&("http", true)));
        assert!(required.contains(&("producer", false)));
    }
}
