//! Resource adapters.
//!
//! # Data Flow
//! ```text
//! InfraConfig section (typed slice)
//!     → Adapter::new(section)
//!     → construct(&Resources)      (earlier resources, read-only)
//!     → Acquisition { resource | error, release | none }
//!     → Orchestrator registers release, stores resource
//! ```
//!
//! # Design Decisions
//! - An adapter only sees its own config section, never the whole config
//! - Construct never panics or exits; failures come back as errors and the
//!   orchestrator decides whether they are fatal
//! - A construct that gets half way (connected, then a follow-up step
//!   failed) returns the error *and* a release, so nothing leaks
//! - Background work (accept loops, poll loops) is stopped from the release,
//!   bounded by the adapter's own timeout

pub mod consumer;
pub mod error_reporter;
pub mod grpc;
pub mod http;
pub mod log_sink;
pub mod metrics;
pub mod postgres;
pub mod producer;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::task::JoinHandle;

use crate::lifecycle::error::BoxError;
use crate::lifecycle::handle::Resources;
use crate::lifecycle::registry::Release;
use crate::lifecycle::shutdown::Shutdown;

pub use consumer::{ConsumedMessage, ConsumerAdapter, MessageConsumer};
pub use error_reporter::{ErrorReporter, ErrorReporterAdapter};
pub use grpc::{GrpcServer, GrpcServerAdapter};
pub use http::{HttpServer, HttpServerAdapter};
pub use log_sink::{LogSink, LogSinkAdapter};
pub use metrics::{MetricsAdapter, MetricsHandle};
pub use postgres::{Database, PostgresAdapter};
pub use producer::{MessageProducer, ProducerAdapter};

/// Uniform construct contract around one external resource.
#[async_trait]
pub trait ResourceAdapter: Send + Sync + 'static {
    /// The live handle exposed through the aggregate handle.
    type Resource: Send + Sync + 'static;

    /// Name the resource is registered and looked up under.
    fn name(&self) -> &str;

    /// Acquire the resource.
    async fn construct(&self, resources: &Resources) -> Acquisition<Self::Resource>;
}

/// Result of a construct call.
///
/// `release` may be present even when `resource` is an error: the adapter
/// acquired something before a later step failed.
#[derive(Debug)]
pub struct Acquisition<R> {
    pub resource: Result<R, BoxError>,
    pub release: Option<Release>,
}

impl<R> Acquisition<R> {
    /// A live resource and the action that undoes it.
    pub fn ready(resource: R, release: impl Into<Option<Release>>) -> Self {
        Self {
            resource: Ok(resource),
            release: release.into(),
        }
    }

    /// Nothing was acquired.
    pub fn failed(error: impl Into<BoxError>) -> Self {
        Self {
            resource: Err(error.into()),
            release: None,
        }
    }

    /// Something was acquired, then a follow-up step failed.
    pub fn partial(error: impl Into<BoxError>, release: Release) -> Self {
        Self {
            resource: Err(error.into()),
            release: Some(release),
        }
    }

    pub fn map<U>(self, f: impl FnOnce(R) -> U) -> Acquisition<U> {
        Acquisition {
            resource: self.resource.map(f),
            release: self.release,
        }
    }

    pub fn into_parts(self) -> (Result<R, BoxError>, Option<Release>) {
        (self.resource, self.release)
    }
}

/// Grace added on top of an adapter's own deadline before the registry
/// gives up on a release.
pub(crate) const RELEASE_GRACE: Duration = Duration::from_secs(1);

/// A network server could not start listening.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("cannot bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot accept on {address}: {reason}")]
    Incoming { address: String, reason: String },
}

/// A background task ignored its stop signal.
#[derive(Debug, Error)]
#[error("background task did not stop within {0:?}")]
pub struct StopTimeout(pub Duration);

/// Signal a background task to stop and wait for it, aborting it once
/// `deadline` passes.
pub(crate) async fn stop_task(
    shutdown: Shutdown,
    mut task: JoinHandle<Result<(), BoxError>>,
    deadline: Duration,
) -> Result<(), BoxError> {
    shutdown.trigger();
    match tokio::time::timeout(deadline, &mut task).await {
        Ok(Ok(outcome)) => outcome,
        Ok(Err(join_error)) => Err(Box::new(join_error)),
        Err(_) => {
            task.abort();
            Err(Box::new(StopTimeout(deadline)))
        }
    }
}
