//! Observability hooks.
//!
//! # Data Flow
//! ```text
//! lifecycle::orchestrator / lifecycle::registry
//!     → metrics.rs (acquire/release counters and latencies)
//!     → metrics facade
//!     → adapters::metrics recorder (if acquired)
//!     → /metrics on the HTTP server
//! ```
//!
//! Structured logs go straight through `tracing`; the subscriber itself is a
//! resource (`adapters::log_sink`).

pub mod metrics;
