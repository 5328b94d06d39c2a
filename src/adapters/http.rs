//! HTTP server.
//!
//! # Responsibilities
//! - Bind the configured address before reporting success
//! - Serve liveness, readiness and metrics endpoints out of the box
//! - Mount caller routes under the configured base path
//! - Drain in-flight requests on release
//!
//! # Design Decisions
//! - Readiness pings the database when one was acquired earlier in the
//!   plan; a missing database is reported, not treated as an error
//! - `/metrics` only exists when the metrics recorder was installed

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use tokio::net::TcpListener;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::adapters::metrics::MetricsHandle;
use crate::adapters::postgres::Database;
use crate::adapters::{stop_task, Acquisition, ResourceAdapter, ServerError, RELEASE_GRACE};
use crate::config::HttpConfig;
use crate::lifecycle::error::BoxError;
use crate::lifecycle::handle::Resources;
use crate::lifecycle::registry::Release;
use crate::lifecycle::shutdown::Shutdown;

const READY_PING_TIMEOUT: Duration = Duration::from_secs(2);

/// A running HTTP server.
#[derive(Debug, Clone)]
pub struct HttpServer {
    local_addr: SocketAddr,
}

impl HttpServer {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

pub struct HttpServerAdapter {
    config: HttpConfig,
    routes: Option<Router>,
}

impl HttpServerAdapter {
    pub fn new(config: HttpConfig) -> Self {
        Self {
            config,
            routes: None,
        }
    }

    /// Application routes, mounted under the base path.
    pub fn with_routes(mut self, routes: Router) -> Self {
        self.routes = Some(routes);
        self
    }

    #[allow(deprecated)]
    fn router(&self, state: AppState) -> Router {
        let builtin = Router::new()
            .route("/health", get(health))
            .route("/ready", get(ready))
            .route("/metrics", get(render_metrics))
            .with_state(state);

        let app = match (&self.routes, self.config.base_path.as_str()) {
            (None, _) => builtin,
            (Some(routes), "/") => builtin.merge(routes.clone()),
            (Some(routes), base) => builtin.nest(base.trim_end_matches('/'), routes.clone()),
        };

        app.layer(PropagateRequestIdLayer::x_request_id())
            .layer(TimeoutLayer::new(Duration::from_secs(
                self.config.request_timeout_secs,
            )))
            .layer(TraceLayer::new_for_http())
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
    }
}

#[derive(Clone)]
struct AppState {
    database: Option<Arc<Database>>,
    metrics: Option<Arc<MetricsHandle>>,
}

#[derive(Serialize)]
struct HealthStatus {
    status: &'static str,
    version: &'static str,
}

#[derive(Serialize)]
struct ReadyStatus {
    status: &'static str,
    database: &'static str,
}

async fn health() -> Json<HealthStatus> {
    Json(HealthStatus {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn ready(State(state): State<AppState>) -> (StatusCode, Json<ReadyStatus>) {
    let Some(database) = state.database else {
        return (
            StatusCode::OK,
            Json(ReadyStatus {
                status: "ready",
                database: "absent",
            }),
        );
    };

    match tokio::time::timeout(READY_PING_TIMEOUT, database.ping()).await {
        Ok(Ok(())) => (
            StatusCode::OK,
            Json(ReadyStatus {
                status: "ready",
                database: "up",
            }),
        ),
        Ok(Err(e)) => {
            tracing::warn!(error = %e, "Readiness ping failed");
            not_ready()
        }
        Err(_) => {
            tracing::warn!("Readiness ping timed out");
            not_ready()
        }
    }
}

fn not_ready() -> (StatusCode, Json<ReadyStatus>) {
    (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(ReadyStatus {
            status: "not_ready",
            database: "down",
        }),
    )
}

async fn render_metrics(State(state): State<AppState>) -> Response {
    match state.metrics {
        Some(metrics) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            metrics.render(),
        )
            .into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

#[async_trait]
impl ResourceAdapter for HttpServerAdapter {
    type Resource = HttpServer;

    fn name(&self) -> &str {
        "http"
    }

    async fn construct(&self, resources: &Resources) -> Acquisition<HttpServer> {
        let address = self.config.address();
        let listener = match TcpListener::bind(&address).await {
            Ok(listener) => listener,
            Err(source) => return Acquisition::failed(ServerError::Bind { address, source }),
        };
        let local_addr = match listener.local_addr() {
            Ok(addr) => addr,
            Err(source) => return Acquisition::failed(ServerError::Bind { address, source }),
        };

        let app = self.router(AppState {
            database: resources.find::<Database>(),
            metrics: resources.find::<MetricsHandle>(),
        });

        let shutdown = Shutdown::new();
        let stop = shutdown.subscribe();
        let task = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(stop.wait())
                .await
                .map_err(|e| Box::new(e) as BoxError)?;
            tracing::info!(address = %local_addr, "HTTP server stopped");
            Ok(())
        });
        tracing::info!(
            address = %local_addr,
            base_path = %self.config.base_path,
            "HTTP server listening"
        );

        let deadline = self.config.shutdown_timeout();
        let release = Release::new(self.name(), move || stop_task(shutdown, task, deadline))
            .with_timeout(deadline + RELEASE_GRACE);

        Acquisition::ready(HttpServer { local_addr }, release)
    }
}
