//! Infrastructure container (v1)
//!
//! # Architecture Overview
//!
//! ```text
//!     config.toml ──▶ InfraConfig ──▶ Plan ──▶ Orchestrator
//!                                                  │
//!                     ┌────────────────────────────┘
//!                     ▼
//!     log_sink → error_reporter → metrics → postgres
//!         → producer → consumer → grpc → http
//!                     │
//!          ┌──────────┴───────────┐
//!          ▼                      ▼
//!        Ready                  Failed
//!    (AggregateHandle,      (already torn down,
//!     Teardown)              exit 1)
//!          │
//!     SIGINT / SIGTERM
//!          │
//!          ▼
//!     Teardown::run  (reverse order, bounded)
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use infra_container::config::{read_config, validate_config, Environment, InfraConfig};
use infra_container::lifecycle::{signals, LifecycleResult, Plan};

#[derive(Parser)]
#[command(name = "infra-container")]
#[command(about = "Ordered startup and teardown of service infrastructure", long_about = None)]
struct Cli {
    /// Path to a TOML config file; built-in defaults when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the configured environment (development or production).
    #[arg(short, long)]
    environment: Option<Environment>,
}

/// Read the file (if any), apply overrides, then validate once.
fn load(cli: &Cli) -> Result<InfraConfig, String> {
    let mut config = match &cli.config {
        Some(path) => read_config(path).map_err(|e| format!("{}: {}", path.display(), e))?,
        None => InfraConfig::default(),
    };

    if let Some(environment) = cli.environment {
        config.environment = environment;
    }

    validate_config(&config).map_err(|errors| {
        errors
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("\n")
    })?;
    Ok(config)
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // No subscriber exists yet; config problems go to stderr.
    let config = match load(&cli) {
        Ok(config) => config,
        Err(message) => {
            eprintln!("infra-container: invalid configuration\n{}", message);
            return ExitCode::FAILURE;
        }
    };

    let (handle, teardown) = match Plan::from_config(&config).build().start().await {
        LifecycleResult::Ready { handle, teardown } => (handle, teardown),
        LifecycleResult::Failed { error, .. } => {
            tracing::error!(
                resource = %error.resource,
                error = %error.source,
                "Startup failed"
            );
            eprintln!("infra-container: {}", error);
            return ExitCode::FAILURE;
        }
    };

    tracing::info!(
        service = %config.service_name,
        environment = config.environment.as_str(),
        resources = ?handle.names().collect::<Vec<_>>(),
        absent = ?handle.absent(),
        "infra-container v{} ready",
        env!("CARGO_PKG_VERSION")
    );

    if let Err(e) = signals::shutdown_signal().await {
        tracing::error!(error = %e, "Cannot listen for shutdown signals, shutting down");
    }

    let report = teardown.run().await;
    if report.is_clean() {
        tracing::info!(released = report.released.len(), "Shutdown complete");
    } else {
        tracing::warn!(
            released = report.released.len(),
            failed = report.errors.len(),
            "Shutdown complete with release errors"
        );
    }

    ExitCode::SUCCESS
}
