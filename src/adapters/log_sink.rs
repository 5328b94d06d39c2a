//! Structured logging sink.
//!
//! # Responsibilities
//! - Install the process-wide `tracing` subscriber
//! - Pretty output in development, JSON in production
//! - Optional non-blocking file output, flushed on release
//!
//! # Design Decisions
//! - Acquired first so every later resource logs through it
//! - Released last; dropping the appender guard flushes pending lines

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer, Registry};

use crate::adapters::{Acquisition, ResourceAdapter};
use crate::config::{Environment, LogFormat, LoggingConfig};
use crate::lifecycle::error::BoxError;
use crate::lifecycle::handle::Resources;
use crate::lifecycle::registry::Release;

#[derive(Debug, Error)]
pub enum LogSinkError {
    #[error("invalid log filter '{directive}': {source}")]
    Filter {
        directive: String,
        #[source]
        source: tracing_subscriber::filter::ParseError,
    },

    #[error("cannot open log file {path}: {source}")]
    File {
        path: PathBuf,
        #[source]
        source: tracing_appender::rolling::InitError,
    },

    #[error("log file path {0} has no file name")]
    FileName(PathBuf),

    #[error("a global subscriber is already installed: {0}")]
    AlreadyInstalled(#[from] tracing_subscriber::util::TryInitError),
}

/// The installed logging sink.
#[derive(Debug, Clone)]
pub struct LogSink {
    format: LogFormat,
    level: String,
    file_path: Option<PathBuf>,
}

impl LogSink {
    pub fn format(&self) -> LogFormat {
        self.format
    }

    pub fn level(&self) -> &str {
        &self.level
    }

    pub fn file_path(&self) -> Option<&Path> {
        self.file_path.as_deref()
    }
}

pub struct LogSinkAdapter {
    config: LoggingConfig,
    environment: Environment,
}

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

impl LogSinkAdapter {
    pub fn new(config: LoggingConfig, environment: Environment) -> Self {
        Self {
            config,
            environment,
        }
    }

    /// Format actually used: explicit setting, else derived from the environment.
    pub fn format(&self) -> LogFormat {
        self.config.format.unwrap_or(if self.environment.is_production() {
            LogFormat::Json
        } else {
            LogFormat::Pretty
        })
    }

    fn filter(&self) -> Result<EnvFilter, LogSinkError> {
        EnvFilter::try_new(&self.config.level).map_err(|source| LogSinkError::Filter {
            directive: self.config.level.clone(),
            source,
        })
    }

    fn file_writer(path: &Path) -> Result<(NonBlocking, WorkerGuard), LogSinkError> {
        let file_name = path
            .file_name()
            .ok_or_else(|| LogSinkError::FileName(path.to_path_buf()))?;
        let directory = path.parent().unwrap_or_else(|| Path::new("."));

        let appender = RollingFileAppender::builder()
            .rotation(Rotation::NEVER)
            .filename_prefix(file_name.to_string_lossy().into_owned())
            .build(directory)
            .map_err(|source| LogSinkError::File {
                path: path.to_path_buf(),
                source,
            })?;

        Ok(tracing_appender::non_blocking(appender))
    }

    fn install(&self) -> Result<Option<WorkerGuard>, LogSinkError> {
        let filter = self.filter()?;

        let mut layers: Vec<BoxedLayer> = Vec::new();
        match self.format() {
            LogFormat::Json => layers.push(fmt::layer().json().with_target(true).boxed()),
            LogFormat::Pretty => layers.push(fmt::layer().with_target(true).boxed()),
        }

        let guard = match &self.config.file_path {
            Some(path) => {
                let (writer, guard) = Self::file_writer(path)?;
                layers.push(fmt::layer().json().with_ansi(false).with_writer(writer).boxed());
                Some(guard)
            }
            None => None,
        };

        tracing_subscriber::registry()
            .with(layers)
            .with(filter)
            .try_init()?;

        Ok(guard)
    }
}

#[async_trait]
impl ResourceAdapter for LogSinkAdapter {
    type Resource = LogSink;

    fn name(&self) -> &str {
        "log_sink"
    }

    async fn construct(&self, _resources: &Resources) -> Acquisition<LogSink> {
        let guard = match self.install() {
            Ok(guard) => guard,
            Err(e) => return Acquisition::failed(e),
        };

        let sink = LogSink {
            format: self.format(),
            level: self.config.level.clone(),
            file_path: self.config.file_path.clone(),
        };
        tracing::info!(
            level = %sink.level,
            format = ?sink.format,
            file = ?sink.file_path,
            "Log sink installed"
        );

        let release = Release::new(self.name(), move || async move {
            drop(guard);
            Ok::<(), BoxError>(())
        });
        Acquisition::ready(sink, release)
    }
}
