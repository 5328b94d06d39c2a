//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (orchestrator.rs):
//!     InfraConfig → plan.rs (ordered ResourceSpecs)
//!     → acquire each resource in order
//!     → registry.rs records each release as it is handed back
//!     → Ready(handle.rs, Teardown) | Failed(AcquisitionError, drained Teardown)
//!
//! Shutdown:
//!     signals.rs (SIGTERM/SIGINT) → Teardown::run
//!     → releases in reverse acquisition order
//!     → shutdown.rs stops adapter background loops
//! ```
//!
//! # Design Decisions
//! - Ordered startup: log sink first, listeners last
//! - Ordered shutdown: exact reverse of startup
//! - Every release carries its own deadline; teardown never hangs forever

pub mod error;
pub mod handle;
pub mod orchestrator;
pub mod plan;
pub mod registry;
pub mod shutdown;
pub mod signals;

pub use error::{AcquisitionError, BoxError, ReleaseError};
pub use handle::{AggregateHandle, Resources};
pub use orchestrator::{LifecycleResult, LifecycleState, Orchestrator, ResourceSpec};
pub use plan::Plan;
pub use registry::{Release, Teardown, TeardownRegistry, TeardownReport};
pub use shutdown::{Shutdown, ShutdownListener};
