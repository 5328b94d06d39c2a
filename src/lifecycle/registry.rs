//! Teardown registry.
//!
//! # Responsibilities
//! - Record release actions in acquisition order
//! - Drain them in strictly reverse order on shutdown or failed startup
//! - Absorb release failures (errors, timeouts, panics) so every release runs
//!
//! # Design Decisions
//! - Each release carries its own deadline; the registry enforces it
//! - `Release` is consumed when invoked, so it can never run twice
//! - Draining empties the registry; a second drain is a no-op

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::FutureExt;
use tokio::sync::Mutex;

use crate::lifecycle::error::{BoxError, ReleaseError};
use crate::observability::metrics;

/// Default deadline for a release that does not declare its own.
pub const DEFAULT_RELEASE_TIMEOUT: Duration = Duration::from_secs(10);

type ReleaseFuture = Pin<Box<dyn Future<Output = Result<(), BoxError>> + Send>>;
type ReleaseAction = Box<dyn FnOnce() -> ReleaseFuture + Send>;

/// A one-shot action undoing exactly what an adapter's construct did.
pub struct Release {
    resource: String,
    timeout: Duration,
    action: ReleaseAction,
}

impl Release {
    /// Create a release action for `resource`.
    pub fn new<F, Fut>(resource: impl Into<String>, action: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
    {
        Self {
            resource: resource.into(),
            timeout: DEFAULT_RELEASE_TIMEOUT,
            action: Box::new(move || Box::pin(action()) as ReleaseFuture),
        }
    }

    /// Bound the worst-case blocking time of this release.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn resource(&self) -> &str {
        &self.resource
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Re-label the release with the spec name it was registered under.
    pub(crate) fn named(mut self, resource: &str) -> Self {
        if self.resource != resource {
            self.resource = resource.to_string();
        }
        self
    }

    /// Run the action under its deadline, converting every failure mode
    /// into a `ReleaseError`.
    pub async fn invoke(self) -> Result<(), ReleaseError> {
        let Release {
            resource,
            timeout,
            action,
        } = self;

        let future = match std::panic::catch_unwind(AssertUnwindSafe(action)) {
            Ok(future) => future,
            Err(payload) => {
                return Err(ReleaseError::Panicked {
                    resource,
                    message: panic_message(payload.as_ref()),
                })
            }
        };

        match tokio::time::timeout(timeout, AssertUnwindSafe(future).catch_unwind()).await {
            Ok(Ok(Ok(()))) => Ok(()),
            Ok(Ok(Err(source))) => Err(ReleaseError::Failed { resource, source }),
            Ok(Err(payload)) => Err(ReleaseError::Panicked {
                resource,
                message: panic_message(payload.as_ref()),
            }),
            Err(_) => Err(ReleaseError::TimedOut { resource, timeout }),
        }
    }
}

impl std::fmt::Debug for Release {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Release")
            .field("resource", &self.resource)
            .field("timeout", &self.timeout)
            .finish()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Outcome of draining a registry.
#[derive(Debug, Default)]
pub struct TeardownReport {
    /// Resources released cleanly, in the order they were released.
    pub released: Vec<String>,
    /// Releases that failed; already logged.
    pub errors: Vec<ReleaseError>,
}

impl TeardownReport {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }

    /// Every resource a release was attempted for, in release order.
    pub fn attempted(&self) -> usize {
        self.released.len() + self.errors.len()
    }
}

/// Ordered record of release actions.
#[derive(Debug, Default)]
pub struct TeardownRegistry {
    releases: Vec<Release>,
}

impl TeardownRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a release action. `None` is ignored.
    pub fn register(&mut self, release: impl Into<Option<Release>>) {
        if let Some(release) = release.into() {
            tracing::debug!(
                resource = %release.resource,
                timeout = ?release.timeout,
                "Release registered"
            );
            self.releases.push(release);
        }
    }

    pub fn len(&self) -> usize {
        self.releases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.releases.is_empty()
    }

    /// Invoke every registered release, most recent first.
    ///
    /// A failing release never stops the remaining ones. The registry is
    /// empty afterwards.
    pub async fn run_all(&mut self) -> TeardownReport {
        let releases = std::mem::take(&mut self.releases);
        let mut report = TeardownReport::default();

        for release in releases.into_iter().rev() {
            let resource = release.resource.clone();
            let start = Instant::now();
            tracing::info!(resource = %resource, "Releasing resource");

            match release.invoke().await {
                Ok(()) => {
                    metrics::record_release(&resource, "ok", start);
                    tracing::info!(
                        resource = %resource,
                        elapsed_ms = start.elapsed().as_millis() as u64,
                        "Resource released"
                    );
                    report.released.push(resource);
                }
                Err(e) => {
                    metrics::record_release(&resource, "error", start);
                    tracing::error!(resource = %resource, error = %e, "Release failed");
                    report.errors.push(e);
                }
            }
        }

        report
    }
}

/// Idempotent teardown shared with the caller.
///
/// Cloning is cheap; every clone drains the same registry, and only the
/// first `run` does any work. A `run` that overlaps the first one waits for
/// it, so every caller returns only once all releases have finished.
#[derive(Clone, Debug)]
pub struct Teardown {
    registry: Arc<Mutex<Option<TeardownRegistry>>>,
}

impl Teardown {
    pub(crate) fn new(registry: TeardownRegistry) -> Self {
        Self {
            registry: Arc::new(Mutex::new(Some(registry))),
        }
    }

    /// A teardown with nothing left to release.
    pub fn drained() -> Self {
        Self {
            registry: Arc::new(Mutex::new(None)),
        }
    }

    /// Release everything still registered. Subsequent calls are no-ops.
    pub async fn run(&self) -> TeardownReport {
        // Held across the drain so overlapping callers block until it ends.
        let mut slot = self.registry.lock().await;

        match slot.take() {
            Some(mut registry) => {
                tracing::info!(resources = registry.len(), "Teardown started");
                let report = registry.run_all().await;
                tracing::info!(
                    released = report.released.len(),
                    failed = report.errors.len(),
                    "Teardown complete"
                );
                report
            }
            None => {
                tracing::debug!("Teardown already ran, nothing to release");
                TeardownReport::default()
            }
        }
    }

    /// Whether `run` has already been called (or nothing was ever registered).
    ///
    /// A teardown that is still in progress counts as drained.
    pub fn is_drained(&self) -> bool {
        self.registry
            .try_lock()
            .map(|slot| slot.is_none())
            .unwrap_or(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    fn recording(name: &'static str, log: &Arc<StdMutex<Vec<&'static str>>>) -> Release {
        let log = log.clone();
        Release::new(name, move || async move {
            log.lock().unwrap().push(name);
            Ok::<(), BoxError>(())
        })
    }

    fn name_is_set(name: &str) -> bool {
        !name.is_empty()
    }

    #[tokio::test]
    async fn test_run_all_reverse_order() {
        let log = Arc::new(StdMutex::new(Vec::new()));
        let mut registry = TeardownRegistry::new();
        registry.register(recording("a", &log));
        registry.register(recording("b", &log));
        registry.register(recording("c", &log));

        let report = registry.run_all().await;

        assert_eq!(*log.lock().unwrap(), vec!["c", "b", "a"]);
        assert_eq!(report.released, vec!["c", "b", "a"]);
        assert!(report.is_clean());
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_none_is_not_stored() {
        let mut registry = TeardownRegistry::new();
        registry.register(None);
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_failures_do_not_stop_teardown() {
        let log = Arc::new(StdMutex::new(Vec::new()));
        let mut registry = TeardownRegistry::new();
        registry.register(recording("first", &log));
        registry.register(Release::new("erroring", || async {
            Err::<(), BoxError>("disk full".into())
        }));
        registry.register(Release::new("panicking", || async {
            if name_is_set("panicking") {
                panic!("boom");
            }
            Ok::<(), BoxError>(())
        }));
        registry.register(recording("last", &log));

        let report = registry.run_all().await;

        assert_eq!(*log.lock().unwrap(), vec!["last", "first"]);
        assert_eq!(report.errors.len(), 2);
        assert_eq!(report.errors[0].resource(), "panicking");
        assert!(matches!(report.errors[0], ReleaseError::Panicked { .. }));
        assert!(matches!(report.errors[1], ReleaseError::Failed { .. }));
        assert_eq!(report.attempted(), 4);
    }

    #[tokio::test]
    async fn test_release_timeout_is_enforced() {
        let mut registry = TeardownRegistry::new();
        registry.register(
            Release::new("slow", || async {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok::<(), BoxError>(())
            })
            .with_timeout(Duration::from_millis(50)),
        );

        let start = Instant::now();
        let report = registry.run_all().await;

        assert!(start.elapsed() < Duration::from_secs(5));
        assert!(matches!(report.errors[0], ReleaseError::TimedOut { .. }));
    }

    #[tokio::test]
    async fn test_second_run_is_noop() {
        let log = Arc::new(StdMutex::new(Vec::new()));
        let mut registry = TeardownRegistry::new();
        registry.register(recording("only", &log));

        registry.run_all().await;
        let second = registry.run_all().await;

        assert_eq!(log.lock().unwrap().len(), 1);
        assert_eq!(second.attempted(), 0);
    }

    #[tokio::test]
    async fn test_teardown_runs_once_across_clones() {
        let log = Arc::new(StdMutex::new(Vec::new()));
        let mut registry = TeardownRegistry::new();
        registry.register(recording("server", &log));

        let teardown = Teardown::new(registry);
        let other = teardown.clone();
        assert!(!teardown.is_drained());

        teardown.run().await;
        let again = other.run().await;

        assert!(other.is_drained());
        assert_eq!(*log.lock().unwrap(), vec!["server"]);
        assert_eq!(again.attempted(), 0);
    }

    #[tokio::test]
    async fn test_overlapping_run_waits_for_first() {
        let finished = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let mut registry = TeardownRegistry::new();
        registry.register({
            let finished = finished.clone();
            Release::new("slow", move || async move {
                tokio::time::sleep(Duration::from_millis(300)).await;
                finished.store(true, std::sync::atomic::Ordering::SeqCst);
                Ok::<(), BoxError>(())
            })
        });

        let teardown = Teardown::new(registry);
        let first = tokio::spawn({
            let teardown = teardown.clone();
            async move { teardown.run().await }
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(teardown.is_drained());

        let second = teardown.run().await;
        assert!(finished.load(std::sync::atomic::Ordering::SeqCst));
        assert_eq!(second.attempted(), 0);
        assert_eq!(first.await.unwrap().released, vec!["slow"]);
    }
}
