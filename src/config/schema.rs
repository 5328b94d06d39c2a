//! Configuration schema definitions.
//!
//! One section per resource. Each adapter receives only its own section.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration bundle, supplied once at process start.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct InfraConfig {
    /// Deployment environment (drives log format and error-report tagging).
    pub environment: Environment,

    /// Service name attached to logs and error reports.
    pub service_name: String,

    pub logging: LoggingConfig,
    pub error_reporting: ErrorReportingConfig,
    pub metrics: MetricsConfig,
    pub postgres: PostgresConfig,
    pub kafka: KafkaConfig,
    pub grpc: GrpcConfig,
    pub http: HttpConfig,
}

impl Default for InfraConfig {
    fn default() -> Self {
        Self {
            environment: Environment::default(),
            service_name: "infra-container".to_string(),
            logging: LoggingConfig::default(),
            error_reporting: ErrorReportingConfig::default(),
            metrics: MetricsConfig::default(),
            postgres: PostgresConfig::default(),
            kafka: KafkaConfig::default(),
            grpc: GrpcConfig::default(),
            http: HttpConfig::default(),
        }
    }
}

/// Deployment environment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Production,
}

impl Environment {
    pub fn is_production(self) -> bool {
        self == Environment::Production
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Production => "production",
        }
    }
}

impl std::str::FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(Environment::Development),
            "production" | "prod" => Ok(Environment::Production),
            other => Err(format!("unknown environment '{}'", other)),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

/// Logging sink configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub enabled: bool,
    pub required: bool,

    /// Filter directive (e.g. "info" or "infra_container=debug,tower_http=info").
    pub level: String,

    /// Output format. Defaults to JSON in production, pretty otherwise.
    pub format: Option<LogFormat>,

    /// Also write to this file (non-blocking).
    pub file_path: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            required: true,
            level: "info".to_string(),
            format: None,
            file_path: None,
        }
    }
}

/// Error-reporting client configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ErrorReportingConfig {
    pub enabled: bool,
    pub required: bool,

    /// Project DSN (`https://<key>@<host>/<project>`). Empty disables sending.
    pub dsn: String,

    /// Fraction of events that are sent (0.0 to 1.0).
    pub sample_rate: f32,

    /// Pending events the sender queue holds before dropping new ones.
    pub queue_capacity: usize,

    /// Per-request timeout in seconds.
    pub request_timeout_secs: u64,

    /// Flush deadline on release, in seconds.
    pub flush_timeout_secs: u64,
}

impl ErrorReportingConfig {
    pub fn flush_timeout(&self) -> Duration {
        Duration::from_secs(self.flush_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Default for ErrorReportingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            required: false,
            dsn: String::new(),
            sample_rate: 1.0,
            queue_capacity: 256,
            request_timeout_secs: 5,
            flush_timeout_secs: 2,
        }
    }
}

/// Prometheus metrics recorder.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub required: bool,

    /// How often histogram buckets are compacted, in seconds.
    pub upkeep_interval_secs: u64,
}

impl MetricsConfig {
    pub fn upkeep_interval(&self) -> Duration {
        Duration::from_secs(self.upkeep_interval_secs)
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            required: false,
            upkeep_interval_secs: 5,
        }
    }
}

/// PostgreSQL connection pool configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PostgresConfig {
    pub enabled: bool,
    pub required: bool,
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub db_name: String,

    /// libpq sslmode (disable, allow, prefer, require, verify-ca, verify-full).
    pub ssl_mode: String,

    pub max_connections: u32,

    /// Pool acquire timeout in seconds.
    pub connect_timeout_secs: u64,

    /// Close deadline on release, in seconds.
    pub close_timeout_secs: u64,
}

impl PostgresConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn close_timeout(&self) -> Duration {
        Duration::from_secs(self.close_timeout_secs)
    }
}

impl Default for PostgresConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            required: true,
            host: "localhost".to_string(),
            port: 5432,
            user: "postgres".to_string(),
            password: String::new(),
            db_name: "postgres".to_string(),
            ssl_mode: "disable".to_string(),
            max_connections: 10,
            connect_timeout_secs: 5,
            close_timeout_secs: 5,
        }
    }
}

/// Kafka brokers shared by the producer and consumer.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct KafkaConfig {
    pub brokers: Vec<String>,
    pub topic: String,
    pub group_id: String,
    pub producer: ProducerConfig,
    pub consumer: ConsumerConfig,
}

impl KafkaConfig {
    /// Broker list in librdkafka `bootstrap.servers` form.
    pub fn bootstrap_servers(&self) -> String {
        self.brokers.join(",")
    }
}

impl Default for KafkaConfig {
    fn default() -> Self {
        Self {
            brokers: vec!["localhost:9092".to_string()],
            topic: "events".to_string(),
            group_id: "infra-container".to_string(),
            producer: ProducerConfig::default(),
            consumer: ConsumerConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ProducerConfig {
    pub enabled: bool,
    pub required: bool,

    /// librdkafka `message.timeout.ms`.
    pub message_timeout_ms: u64,

    /// Fetch topic metadata during construct to prove the brokers answer.
    pub verify_on_start: bool,

    /// Flush deadline on release, in seconds.
    pub close_timeout_secs: u64,
}

impl ProducerConfig {
    pub fn close_timeout(&self) -> Duration {
        Duration::from_secs(self.close_timeout_secs)
    }
}

impl Default for ProducerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            required: false,
            message_timeout_ms: 5000,
            verify_on_start: true,
            close_timeout_secs: 5,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ConsumerConfig {
    pub enabled: bool,
    pub required: bool,

    /// Messages buffered per subscriber before the slowest one lags.
    pub channel_capacity: usize,

    /// librdkafka `auto.offset.reset`.
    pub auto_offset_reset: String,

    /// Poll-loop stop deadline on release, in seconds.
    pub close_timeout_secs: u64,
}

impl ConsumerConfig {
    pub fn close_timeout(&self) -> Duration {
        Duration::from_secs(self.close_timeout_secs)
    }
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            required: false,
            channel_capacity: 1024,
            auto_offset_reset: "earliest".to_string(),
            close_timeout_secs: 5,
        }
    }
}

/// gRPC server configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct GrpcConfig {
    pub enabled: bool,
    pub required: bool,
    pub host: String,
    pub port: u16,
    pub request_timeout_secs: u64,

    /// Graceful shutdown deadline on release, in seconds.
    pub shutdown_timeout_secs: u64,
}

impl GrpcConfig {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}

impl Default for GrpcConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            required: true,
            host: "0.0.0.0".to_string(),
            port: 3000,
            request_timeout_secs: 30,
            shutdown_timeout_secs: 10,
        }
    }
}

/// HTTP server configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HttpConfig {
    pub enabled: bool,
    pub required: bool,
    pub host: String,
    pub port: u16,

    /// Prefix for application routes (e.g. "/api/v1").
    pub base_path: String,

    pub request_timeout_secs: u64,

    /// Graceful shutdown deadline on release, in seconds.
    pub shutdown_timeout_secs: u64,
}

impl HttpConfig {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            required: true,
            host: "0.0.0.0".to_string(),
            port: 4000,
            base_path: "/api/v1".to_string(),
            request_timeout_secs: 30,
            shutdown_timeout_secs: 10,
        }
    }
}
