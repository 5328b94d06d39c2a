//! Aggregate handle over acquired resources.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

type Erased = Arc<dyn Any + Send + Sync>;

/// Read-only view of resources acquired so far.
///
/// Adapters receive this during construct so later resources can use
/// earlier ones (e.g. the HTTP server pinging the database).
#[derive(Default)]
pub struct Resources {
    entries: HashMap<String, Erased>,
    order: Vec<String>,
    absent: Vec<String>,
}

impl Resources {
    pub(crate) fn insert(&mut self, name: &str, resource: Erased) {
        self.order.push(name.to_string());
        self.entries.insert(name.to_string(), resource);
    }

    pub(crate) fn mark_absent(&mut self, name: &str) {
        self.absent.push(name.to_string());
    }

    /// Look up a resource by name and type.
    ///
    /// Returns `None` when the resource is absent or was registered with a
    /// different type.
    pub fn get<T: Send + Sync + 'static>(&self, name: &str) -> Option<Arc<T>> {
        self.entries
            .get(name)
            .cloned()
            .and_then(|resource| resource.downcast::<T>().ok())
    }

    /// First resource of type `T`, in acquisition order.
    pub fn find<T: Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        self.order.iter().find_map(|name| self.get::<T>(name))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Names of present resources in acquisition order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    /// Optional resources that failed to initialize.
    pub fn absent(&self) -> &[String] {
        &self.absent
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl std::fmt::Debug for Resources {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resources")
            .field("present", &self.order)
            .field("absent", &self.absent)
            .finish()
    }
}

/// Frozen bundle of every successfully acquired resource.
///
/// Only built once all required resources are present. Cloning shares the
/// same immutable map, so reads need no locking.
#[derive(Clone, Debug)]
pub struct AggregateHandle {
    inner: Arc<Resources>,
}

impl AggregateHandle {
    pub(crate) fn freeze(resources: Resources) -> Self {
        Self {
            inner: Arc::new(resources),
        }
    }

    pub fn get<T: Send + Sync + 'static>(&self, name: &str) -> Option<Arc<T>> {
        self.inner.get(name)
    }

    pub fn find<T: Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        self.inner.find()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.inner.contains(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.inner.names()
    }

    pub fn absent(&self) -> &[String] {
        self.inner.absent()
    }

    /// True when at least one optional resource is missing.
    pub fn is_degraded(&self) -> bool {
        !self.inner.absent().is_empty()
    }

    pub fn resources(&self) -> &Resources {
        &self.inner
    }
}
