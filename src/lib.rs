//! Infrastructure lifecycle container.
//!
//! Brings up a service's external resources in a fixed order, hands them
//! out through one aggregate handle, and tears them down in reverse.

pub mod adapters;
pub mod config;
pub mod lifecycle;
pub mod observability;

pub use adapters::{Acquisition, ResourceAdapter};
pub use config::InfraConfig;
pub use lifecycle::{
    AcquisitionError, AggregateHandle, LifecycleResult, Orchestrator, Plan, Release, ResourceSpec,
    Teardown,
};
