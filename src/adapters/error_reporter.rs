//! Error-reporting client.
//!
//! # Responsibilities
//! - Parse the project DSN into a store endpoint and auth header
//! - Queue captured errors/messages and post them from a background task
//! - Flush the queue on release, bounded by the flush timeout
//!
//! # Design Decisions
//! - Capturing never blocks: a full or closed queue drops the event
//! - An empty DSN yields a disabled reporter instead of a failure
//! - Events carry environment, service name and release version tags

use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::mpsc;
use url::Url;
use uuid::Uuid;

use crate::adapters::{stop_task, Acquisition, ResourceAdapter, RELEASE_GRACE};
use crate::config::{Environment, ErrorReportingConfig};
use crate::lifecycle::error::BoxError;
use crate::lifecycle::handle::Resources;
use crate::lifecycle::registry::Release;
use crate::lifecycle::shutdown::{Shutdown, ShutdownListener};

const CLIENT_NAME: &str = concat!("infra-container/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Error)]
pub enum ReporterError {
    #[error("invalid DSN: {0}")]
    Dsn(String),

    #[error("cannot build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

/// Parsed project DSN: `scheme://public_key@host[:port][/prefix]/project_id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dsn {
    public_key: String,
    base: String,
    project_id: String,
}

impl Dsn {
    /// Endpoint events are posted to.
    pub fn store_url(&self) -> String {
        format!("{}/api/{}/store/", self.base, self.project_id)
    }

    pub fn auth_header(&self) -> String {
        format!(
            "Sentry sentry_version=7, sentry_client={}, sentry_key={}",
            CLIENT_NAME, self.public_key
        )
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }
}

impl FromStr for Dsn {
    type Err = ReporterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let url = Url::parse(s).map_err(|e| ReporterError::Dsn(e.to_string()))?;

        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(ReporterError::Dsn(format!("unsupported scheme '{}'", url.scheme())));
        }
        if url.username().is_empty() {
            return Err(ReporterError::Dsn("missing public key".to_string()));
        }
        let host = url
            .host_str()
            .ok_or_else(|| ReporterError::Dsn("missing host".to_string()))?;

        let mut segments: Vec<&str> = url
            .path_segments()
            .map(|s| s.filter(|seg| !seg.is_empty()).collect())
            .unwrap_or_default();
        let project_id = segments
            .pop()
            .ok_or_else(|| ReporterError::Dsn("missing project id".to_string()))?
            .to_string();

        let mut base = format!("{}://{}", url.scheme(), host);
        if let Some(port) = url.port() {
            base.push_str(&format!(":{}", port));
        }
        for segment in segments {
            base.push('/');
            base.push_str(segment);
        }

        Ok(Self {
            public_key: url.username().to_string(),
            base,
            project_id,
        })
    }
}

/// Event severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Info,
    Warning,
    Error,
    Fatal,
}

#[derive(Debug, Clone, Serialize)]
struct ExceptionValue {
    #[serde(rename = "type")]
    kind: String,
    value: String,
}

#[derive(Debug, Clone, Serialize)]
struct ExceptionList {
    values: Vec<ExceptionValue>,
}

#[derive(Debug, Clone, Serialize)]
struct Event {
    event_id: String,
    timestamp: f64,
    level: Level,
    platform: &'static str,
    environment: &'static str,
    release: &'static str,
    server_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    exception: Option<ExceptionList>,
    tags: BTreeMap<String, String>,
}

/// Handle used by the process to report errors.
#[derive(Debug)]
pub struct ErrorReporter {
    queue: Option<mpsc::Sender<Event>>,
    environment: Environment,
    service_name: String,
    sample_rate: f32,
    dropped: AtomicU64,
}

impl ErrorReporter {
    /// A reporter that accepts and discards everything.
    pub fn disabled(environment: Environment, service_name: impl Into<String>) -> Self {
        Self {
            queue: None,
            environment,
            service_name: service_name.into(),
            sample_rate: 0.0,
            dropped: AtomicU64::new(0),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.queue.is_some()
    }

    /// Events dropped because the queue was full or already closed.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Report an error and its source chain. Returns the event id if queued.
    ///
    /// The outer error is labelled with its concrete type; causes only carry
    /// a `dyn Error`, so their label is best effort.
    pub fn capture_error<E>(&self, error: &E) -> Option<Uuid>
    where
        E: std::error::Error + 'static,
    {
        let mut values = vec![ExceptionValue {
            kind: std::any::type_name::<E>().to_string(),
            value: error.to_string(),
        }];
        let mut current = error.source();
        while let Some(err) = current {
            values.push(ExceptionValue {
                kind: cause_type_name(err),
                value: err.to_string(),
            });
            current = err.source();
        }
        // Innermost cause first, as the receiving side expects.
        values.reverse();

        self.enqueue(Level::Error, None, Some(ExceptionList { values }))
    }

    /// Report a plain message.
    pub fn capture_message(&self, message: impl Into<String>, level: Level) -> Option<Uuid> {
        self.enqueue(level, Some(message.into()), None)
    }

    fn enqueue(
        &self,
        level: Level,
        message: Option<String>,
        exception: Option<ExceptionList>,
    ) -> Option<Uuid> {
        let queue = self.queue.as_ref()?;
        if self.sample_rate < 1.0 && rand::random::<f32>() >= self.sample_rate {
            return None;
        }

        let id = Uuid::new_v4();
        let event = Event {
            event_id: id.simple().to_string(),
            timestamp: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs_f64())
                .unwrap_or_default(),
            level,
            platform: "other",
            environment: self.environment.as_str(),
            release: env!("CARGO_PKG_VERSION"),
            server_name: self.service_name.clone(),
            message,
            exception,
            tags: BTreeMap::from([("service".to_string(), self.service_name.clone())]),
        };

        match queue.try_send(event) {
            Ok(()) => Some(id),
            Err(e) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(reason = %e, "Error report dropped");
                None
            }
        }
    }
}

fn cause_type_name(err: &(dyn std::error::Error + 'static)) -> String {
    if err.is::<std::io::Error>() {
        return std::any::type_name::<std::io::Error>().to_string();
    }
    // Otherwise Debug output starts with the type or variant name.
    let debug = format!("{:?}", err);
    debug
        .split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .next()
        .filter(|s| !s.is_empty())
        .unwrap_or("Error")
        .to_string()
}

struct Sender {
    client: reqwest::Client,
    dsn: Dsn,
}

impl Sender {
    async fn send(&self, event: Event) {
        let result = self
            .client
            .post(self.dsn.store_url())
            .header("X-Sentry-Auth", self.dsn.auth_header())
            .json(&event)
            .send()
            .await;

        match result {
            Ok(response) if response.status().is_success() => {
                tracing::debug!(event_id = %event.event_id, "Error report sent");
            }
            Ok(response) => {
                tracing::warn!(
                    event_id = %event.event_id,
                    status = %response.status(),
                    "Error report rejected"
                );
            }
            Err(e) => {
                tracing::warn!(event_id = %event.event_id, error = %e, "Error report failed");
            }
        }
    }

    async fn run(
        self,
        mut queue: mpsc::Receiver<Event>,
        stop: ShutdownListener,
    ) -> Result<(), BoxError> {
        let stop = stop.wait();
        tokio::pin!(stop);

        loop {
            tokio::select! {
                biased;
                event = queue.recv() => match event {
                    Some(event) => self.send(event).await,
                    None => break,
                },
                _ = &mut stop => {
                    queue.close();
                    while let Some(event) = queue.recv().await {
                        self.send(event).await;
                    }
                    break;
                }
            }
        }

        tracing::debug!("Error report queue drained");
        Ok(())
    }
}

pub struct ErrorReporterAdapter {
    config: ErrorReportingConfig,
    environment: Environment,
    service_name: String,
}

impl ErrorReporterAdapter {
    pub fn new(
        config: ErrorReportingConfig,
        environment: Environment,
        service_name: impl Into<String>,
    ) -> Self {
        Self {
            config,
            environment,
            service_name: service_name.into(),
        }
    }

    fn sender(&self) -> Result<Sender, ReporterError> {
        let dsn: Dsn = self.config.dsn.parse()?;
        let client = reqwest::Client::builder()
            .timeout(self.config.request_timeout())
            .build()?;
        Ok(Sender { client, dsn })
    }
}

#[async_trait]
impl ResourceAdapter for ErrorReporterAdapter {
    type Resource = ErrorReporter;

    fn name(&self) -> &str {
        "error_reporter"
    }

    async fn construct(&self, _resources: &Resources) -> Acquisition<ErrorReporter> {
        if self.config.dsn.is_empty() {
            tracing::info!("Error reporting DSN not set, reporter disabled");
            return Acquisition::ready(
                ErrorReporter::disabled(self.environment, self.service_name.clone()),
                None,
            );
        }

        let sender = match self.sender() {
            Ok(sender) => sender,
            Err(e) => return Acquisition::failed(e),
        };
        tracing::info!(
            project = %sender.dsn.project_id(),
            environment = self.environment.as_str(),
            "Error reporter initialized"
        );

        let (tx, rx) = mpsc::channel(self.config.queue_capacity);
        let shutdown = Shutdown::new();
        let task = tokio::spawn(sender.run(rx, shutdown.subscribe()));

        let reporter = ErrorReporter {
            queue: Some(tx),
            environment: self.environment,
            service_name: self.service_name.clone(),
            sample_rate: self.config.sample_rate,
            dropped: AtomicU64::new(0),
        };

        let flush_timeout = self.config.flush_timeout();
        let release = Release::new(self.name(), move || {
            stop_task(shutdown, task, flush_timeout)
        })
        .with_timeout(flush_timeout + RELEASE_GRACE);

        Acquisition::ready(reporter, release)
    }
}
