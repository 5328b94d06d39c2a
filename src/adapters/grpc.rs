//! gRPC server.
//!
//! # Responsibilities
//! - Bind the configured address before reporting success
//! - Serve the standard gRPC health service; callers add their own
//!   services by composing a `tonic` router on top of the same listener
//! - Mark the service not-serving, then shut down gracefully on release

use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpListener;
use tonic::transport::server::TcpIncoming;
use tonic::transport::Server;
use tonic_health::server::HealthReporter;
use tonic_health::ServingStatus;

use crate::adapters::{stop_task, Acquisition, ResourceAdapter, ServerError, RELEASE_GRACE};
use crate::config::GrpcConfig;
use crate::lifecycle::error::BoxError;
use crate::lifecycle::handle::Resources;
use crate::lifecycle::registry::Release;
use crate::lifecycle::shutdown::Shutdown;

/// A running gRPC server.
#[derive(Clone)]
pub struct GrpcServer {
    local_addr: SocketAddr,
    health: HealthReporter,
}

impl GrpcServer {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Reporter for the health service, to flip per-service status.
    pub fn health(&self) -> HealthReporter {
        self.health.clone()
    }
}

impl std::fmt::Debug for GrpcServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GrpcServer")
            .field("local_addr", &self.local_addr)
            .finish()
    }
}

pub struct GrpcServerAdapter {
    config: GrpcConfig,
}

impl GrpcServerAdapter {
    pub fn new(config: GrpcConfig) -> Self {
        Self { config }
    }

    async fn bind(&self) -> Result<(TcpIncoming, SocketAddr), ServerError> {
        let address = self.config.address();
        let listener = TcpListener::bind(&address)
            .await
            .map_err(|source| ServerError::Bind {
                address: address.clone(),
                source,
            })?;
        let local_addr = listener.local_addr().map_err(|source| ServerError::Bind {
            address: address.clone(),
            source,
        })?;
        let incoming = TcpIncoming::from_listener(listener, true, None).map_err(|e| {
            ServerError::Incoming {
                address,
                reason: e.to_string(),
            }
        })?;
        Ok((incoming, local_addr))
    }
}

#[async_trait]
impl ResourceAdapter for GrpcServerAdapter {
    type Resource = GrpcServer;

    fn name(&self) -> &str {
        "grpc"
    }

    async fn construct(&self, _resources: &Resources) -> Acquisition<GrpcServer> {
        let (incoming, local_addr) = match self.bind().await {
            Ok(bound) => bound,
            Err(e) => return Acquisition::failed(e),
        };

        let (mut health, health_service) = tonic_health::server::health_reporter();
        health.set_service_status("", ServingStatus::Serving).await;

        let shutdown = Shutdown::new();
        let stop = shutdown.subscribe();
        let mut server =
            Server::builder().timeout(Duration::from_secs(self.config.request_timeout_secs));
        let router = server.add_service(health_service);

        let task = tokio::spawn(async move {
            router
                .serve_with_incoming_shutdown(incoming, stop.wait())
                .await
                .map_err(|e| Box::new(e) as BoxError)?;
            tracing::info!(address = %local_addr, "gRPC server stopped");
            Ok(())
        });
        tracing::info!(address = %local_addr, "gRPC server listening");

        let deadline = self.config.shutdown_timeout();
        let mut reporter = health.clone();
        let release = Release::new(self.name(), move || async move {
            reporter.set_service_status("", ServingStatus::NotServing).await;
            stop_task(shutdown, task, deadline).await
        })
        .with_timeout(deadline + RELEASE_GRACE);

        Acquisition::ready(GrpcServer { local_addr, health }, release)
    }
}
