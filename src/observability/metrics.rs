//! Lifecycle metrics.
//!
//! # Metrics
//! - `infra_resource_acquisitions_total` (counter): by resource, outcome (ok, error, degraded)
//! - `infra_resource_acquire_seconds` (histogram): construct latency by resource
//! - `infra_resource_releases_total` (counter): by resource, outcome (ok, error)
//! - `infra_resource_release_seconds` (histogram): release latency by resource
//!
//! # Design Decisions
//! - Recorded through the `metrics` facade; no-ops until a recorder is installed
//! - Resource names are the only label cardinality

use std::time::Instant;

pub fn record_acquisition(resource: &str, outcome: &'static str, start: Instant) {
    let elapsed = start.elapsed().as_secs_f64();
    metrics::counter!(
        "infra_resource_acquisitions_total",
        "resource" => resource.to_string(),
        "outcome" => outcome
    )
    .increment(1);
    metrics::histogram!("infra_resource_acquire_seconds", "resource" => resource.to_string())
        .record(elapsed);
}

pub fn record_release(resource: &str, outcome: &'static str, start: Instant) {
    let elapsed = start.elapsed().as_secs_f64();
    metrics::counter!(
        "infra_resource_releases_total",
        "resource" => resource.to_string(),
        "outcome" => outcome
    )
    .increment(1);
    metrics::histogram!("infra_resource_release_seconds", "resource" => resource.to_string())
        .record(elapsed);
}
