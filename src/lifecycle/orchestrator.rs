//! Lifecycle orchestrator.
//!
//! # State Machine
//! ```text
//! Idle → Acquiring → Ready    (every required resource acquired)
//! Idle → Acquiring → Failed   (a required resource failed; already torn down)
//! ```
//!
//! # Design Decisions
//! - Resources are acquired one at a time, in plan order
//! - A release handed back by an adapter is registered before its error is
//!   looked at, so half-initialized resources are still torn down
//! - Optional failures degrade the handle instead of aborting
//! - The handle is only built once acquisition is over, never exposed partially

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use futures_util::FutureExt;

use crate::adapters::{Acquisition, ResourceAdapter};
use crate::lifecycle::error::{AcquisitionError, DuplicateResource};
use crate::lifecycle::handle::{AggregateHandle, Resources};
use crate::lifecycle::registry::{Teardown, TeardownRegistry};
use crate::observability::metrics;

type Erased = Arc<dyn Any + Send + Sync>;

#[async_trait]
trait ErasedAdapter: Send + Sync {
    async fn construct_erased(&self, resources: &Resources) -> Acquisition<Erased>;
}

#[async_trait]
impl<A: ResourceAdapter> ErasedAdapter for A {
    async fn construct_erased(&self, resources: &Resources) -> Acquisition<Erased> {
        self.construct(resources)
            .await
            .map(|resource| Arc::new(resource) as Erased)
    }
}

/// One resource to acquire.
pub struct ResourceSpec {
    name: String,
    required: bool,
    adapter: Box<dyn ErasedAdapter>,
}

impl ResourceSpec {
    pub fn new<A: ResourceAdapter>(adapter: A, required: bool) -> Self {
        Self {
            name: adapter.name().to_string(),
            required,
            adapter: Box::new(adapter),
        }
    }

    /// A resource whose failure aborts startup.
    pub fn required<A: ResourceAdapter>(adapter: A) -> Self {
        Self::new(adapter, true)
    }

    /// A resource whose failure only degrades the handle.
    pub fn optional<A: ResourceAdapter>(adapter: A) -> Self {
        Self::new(adapter, false)
    }

    /// Register under a different name than the adapter's default.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_required(&self) -> bool {
        self.required
    }
}

impl std::fmt::Debug for ResourceSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceSpec")
            .field("name", &self.name)
            .field("required", &self.required)
            .finish()
    }
}

/// Orchestrator state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Idle,
    Acquiring,
    Ready,
    Failed,
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            LifecycleState::Idle => "idle",
            LifecycleState::Acquiring => "acquiring",
            LifecycleState::Ready => "ready",
            LifecycleState::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Terminal outcome of `Orchestrator::start`.
///
/// Both variants carry a teardown. After a failure it has already been
/// drained, so calling it is a no-op.
#[derive(Debug)]
pub enum LifecycleResult {
    Ready {
        handle: AggregateHandle,
        teardown: Teardown,
    },
    Failed {
        error: AcquisitionError,
        teardown: Teardown,
    },
}

impl LifecycleResult {
    pub fn state(&self) -> LifecycleState {
        match self {
            LifecycleResult::Ready { .. } => LifecycleState::Ready,
            LifecycleResult::Failed { .. } => LifecycleState::Failed,
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, LifecycleResult::Ready { .. })
    }

    pub fn teardown(&self) -> &Teardown {
        match self {
            LifecycleResult::Ready { teardown, .. } | LifecycleResult::Failed { teardown, .. } => {
                teardown
            }
        }
    }

    pub fn into_result(self) -> Result<(AggregateHandle, Teardown), AcquisitionError> {
        match self {
            LifecycleResult::Ready { handle, teardown } => Ok((handle, teardown)),
            LifecycleResult::Failed { error, .. } => Err(error),
        }
    }
}

/// Drives ordered acquisition of a fixed set of resources.
#[derive(Debug)]
pub struct Orchestrator {
    specs: Vec<ResourceSpec>,
    // `start` consumes the orchestrator, so transitions are only logged; the
    // terminal state is reported by `LifecycleResult::state`.
    state: LifecycleState,
}

impl Default for Orchestrator {
    fn default() -> Self {
        Self::new()
    }
}

impl Orchestrator {
    pub fn new() -> Self {
        Self {
            specs: Vec::new(),
            state: LifecycleState::Idle,
        }
    }

    /// Append a spec; acquisition follows insertion order.
    pub fn with(mut self, spec: ResourceSpec) -> Self {
        self.push(spec);
        self
    }

    pub fn push(&mut self, spec: ResourceSpec) {
        self.specs.push(spec);
    }

    pub fn specs(&self) -> &[ResourceSpec] {
        &self.specs
    }

    /// Spec names in acquisition order.
    pub fn plan(&self) -> Vec<&str> {
        self.specs.iter().map(|s| s.name.as_str()).collect()
    }

    fn transition(&mut self, next: LifecycleState) {
        tracing::debug!(from = %self.state, to = %next, "Lifecycle transition");
        self.state = next;
    }

    fn duplicate_name(&self) -> Option<String> {
        let mut seen = std::collections::HashSet::new();
        self.specs
            .iter()
            .find(|spec| !seen.insert(spec.name.as_str()))
            .map(|spec| spec.name.clone())
    }

    /// Acquire every resource in order.
    pub async fn start(mut self) -> LifecycleResult {
        self.transition(LifecycleState::Acquiring);

        if let Some(name) = self.duplicate_name() {
            self.transition(LifecycleState::Failed);
            tracing::error!(resource = %name, "Duplicate resource name in plan");
            return LifecycleResult::Failed {
                error: AcquisitionError::new(name.clone(), DuplicateResource(name)),
                teardown: Teardown::drained(),
            };
        }

        let mut registry = TeardownRegistry::new();
        let mut resources = Resources::default();

        for spec in std::mem::take(&mut self.specs) {
            let started = Instant::now();
            tracing::info!(
                resource = %spec.name,
                required = spec.required,
                "Acquiring resource"
            );

            let acquisition = AssertUnwindSafe(spec.adapter.construct_erased(&resources))
                .catch_unwind()
                .await
                .unwrap_or_else(|_| Acquisition::failed("adapter panicked during construct"));
            let (outcome, release) = acquisition.into_parts();

            registry.register(release.map(|release| release.named(&spec.name)));

            match outcome {
                Ok(resource) => {
                    metrics::record_acquisition(&spec.name, "ok", started);
                    tracing::info!(
                        resource = %spec.name,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "Resource acquired"
                    );
                    resources.insert(&spec.name, resource);
                }
                Err(cause) if spec.required => {
                    metrics::record_acquisition(&spec.name, "error", started);
                    tracing::error!(
                        resource = %spec.name,
                        error = %cause,
                        registered = registry.len(),
                        "Required resource failed, releasing acquired resources"
                    );
                    self.transition(LifecycleState::Failed);
                    registry.run_all().await;
                    return LifecycleResult::Failed {
                        error: AcquisitionError::new(spec.name, cause),
                        teardown: Teardown::drained(),
                    };
                }
                Err(cause) => {
                    metrics::record_acquisition(&spec.name, "degraded", started);
                    tracing::warn!(
                        resource = %spec.name,
                        error = %cause,
                        "Optional resource unavailable, continuing without it"
                    );
                    resources.mark_absent(&spec.name);
                }
            }
        }

        self.transition(LifecycleState::Ready);
        tracing::info!(
            resources = resources.len(),
            absent = resources.absent().len(),
            "All resources acquired"
        );

        LifecycleResult::Ready {
            handle: AggregateHandle::freeze(resources),
            teardown: Teardown::new(registry),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::error::BoxError;
    use crate::lifecycle::registry::Release;
    use std::sync::Mutex;

    type Log = Arc<Mutex<Vec<String>>>;

    #[derive(Clone, Copy)]
    enum Outcome {
        Ok,
        Fail,
        FailAfterConnect,
    }

    struct Fake {
        name: &'static str,
        outcome: Outcome,
        log: Log,
    }

    impl Fake {
        fn new(name: &'static str, outcome: Outcome, log: &Log) -> Self {
            Self {
                name,
                outcome,
                log: log.clone(),
            }
        }

        fn release(&self) -> Release {
            let log = self.log.clone();
            let name = self.name;
            Release::new(name, move || async move {
                log.lock().unwrap().push(name.to_string());
                Ok::<(), BoxError>(())
            })
        }
    }

    #[async_trait]
    impl ResourceAdapter for Fake {
        type Resource = String;

        fn name(&self) -> &str {
            self.name
        }

        async fn construct(&self, _resources: &Resources) -> Acquisition<String> {
            match self.outcome {
                Outcome::Ok => Acquisition::ready(format!("{}-handle", self.name), self.release()),
                Outcome::Fail => Acquisition::failed("connection refused"),
                Outcome::FailAfterConnect => {
                    Acquisition::partial("schema check failed", self.release())
                }
            }
        }
    }

    fn log() -> Log {
        Arc::new(Mutex::new(Vec::new()))
    }

    #[tokio::test]
    async fn test_ready_then_reverse_teardown() {
        let log = log();
        let result = Orchestrator::new()
            .with(ResourceSpec::required(Fake::new("a", Outcome::Ok, &log)))
            .with(ResourceSpec::required(Fake::new("b", Outcome::Ok, &log)))
            .with(ResourceSpec::required(Fake::new("c", Outcome::Ok, &log)))
            .start()
            .await;

        assert_eq!(result.state(), LifecycleState::Ready);
        let (handle, teardown) = result.into_result().unwrap();
        assert_eq!(handle.names().collect::<Vec<_>>(), vec!["a", "b", "c"]);
        assert_eq!(handle.get::<String>("b").as_deref().map(String::as_str), Some("b-handle"));
        assert!(log.lock().unwrap().is_empty());

        teardown.run().await;
        assert_eq!(*log.lock().unwrap(), vec!["c", "b", "a"]);
    }

    #[tokio::test]
    async fn test_kth_required_failure_releases_only_prefix() {
        for n in 1..=5usize {
            for k in 1..=n {
                let log = log();
                let names = ["r1", "r2", "r3", "r4", "r5"];
                let mut orchestrator = Orchestrator::new();
                for (i, name) in names.iter().take(n).enumerate() {
                    let outcome = if i + 1 == k { Outcome::Fail } else { Outcome::Ok };
                    orchestrator.push(ResourceSpec::required(Fake::new(*name, outcome, &log)));
                }

                let result = orchestrator.start().await;
                assert_eq!(result.state(), LifecycleState::Failed);
                assert!(result.teardown().is_drained());

                let expected: Vec<String> =
                    names[..k - 1].iter().rev().map(|s| s.to_string()).collect();
                assert_eq!(*log.lock().unwrap(), expected, "n={n} k={k}");

                let err = result.into_result().unwrap_err();
                assert_eq!(err.resource, names[k - 1]);
            }
        }
    }

    #[tokio::test]
    async fn test_partial_acquisition_is_released() {
        let log = log();
        let result = Orchestrator::new()
            .with(ResourceSpec::required(Fake::new("server", Outcome::Ok, &log)))
            .with(ResourceSpec::required(Fake::new(
                "database",
                Outcome::FailAfterConnect,
                &log,
            )))
            .with(ResourceSpec::required(Fake::new("producer", Outcome::Ok, &log)))
            .start()
            .await;

        assert!(!result.is_ready());
        assert_eq!(*log.lock().unwrap(), vec!["database", "server"]);
    }

    #[tokio::test]
    async fn test_optional_failure_degrades() {
        let log = log();
        let result = Orchestrator::new()
            .with(ResourceSpec::required(Fake::new("server", Outcome::Ok, &log)))
            .with(ResourceSpec::optional(Fake::new("producer", Outcome::Fail, &log)))
            .start()
            .await;

        let (handle, teardown) = result.into_result().unwrap();
        assert!(handle.contains("server"));
        assert!(handle.get::<String>("producer").is_none());
        assert!(handle.is_degraded());

        teardown.run().await;
        teardown.run().await;
        assert_eq!(*log.lock().unwrap(), vec!["server"]);
    }

    #[tokio::test]
    async fn test_duplicate_names_rejected_before_acquiring() {
        let log = log();
        let result = Orchestrator::new()
            .with(ResourceSpec::required(Fake::new("db", Outcome::Ok, &log)))
            .with(ResourceSpec::optional(Fake::new("db", Outcome::Ok, &log)))
            .start()
            .await;

        let err = result.into_result().unwrap_err();
        assert_eq!(err.resource, "db");
        assert!(err.source.is::<DuplicateResource>());
    }

    #[tokio::test]
    async fn test_spec_rename() {
        let log = log();
        let result = Orchestrator::new()
            .with(ResourceSpec::required(Fake::new("a", Outcome::Ok, &log)).named("primary"))
            .start()
            .await;

        let (handle, teardown) = result.into_result().unwrap();
        assert!(handle.contains("primary"));
        let report = teardown.run().await;
        assert_eq!(report.released, vec!["primary"]);
    }

    struct Dependent;

    #[async_trait]
    impl ResourceAdapter for Dependent {
        type Resource = usize;

        fn name(&self) -> &str {
            "dependent"
        }

        async fn construct(&self, resources: &Resources) -> Acquisition<usize> {
            match resources.get::<String>("base") {
                Some(base) => Acquisition::ready(base.len(), None),
                None => Acquisition::failed("base resource missing"),
            }
        }
    }

    #[tokio::test]
    async fn test_later_adapter_sees_earlier_resources() {
        let log = log();
        let result = Orchestrator::new()
            .with(ResourceSpec::required(Fake::new("base", Outcome::Ok, &log)))
            .with(ResourceSpec::required(Dependent))
            .start()
            .await;

        let (handle, _teardown) = result.into_result().unwrap();
        assert_eq!(handle.get::<usize>("dependent").as_deref(), Some(&"base-handle".len()));
    }
}
