//! Lifecycle error taxonomy.
//!
//! - `AcquisitionError`: a required resource failed; fatal, propagated to the caller
//! - `ReleaseError`: a release action failed, timed out or panicked; logged only
//!
//! Optional resources that fail are reported through a warning log and the
//! `absent` list of the aggregate handle, never through an error value.

use std::time::Duration;
use thiserror::Error;

/// Boxed error used as the cause of adapter failures.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// A required resource could not be acquired.
#[derive(Debug, Error)]
#[error("failed to acquire required resource '{resource}': {source}")]
pub struct AcquisitionError {
    /// Name of the resource spec that failed.
    pub resource: String,
    /// Underlying cause reported by the adapter.
    #[source]
    pub source: BoxError,
}

impl AcquisitionError {
    pub fn new(resource: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self {
            resource: resource.into(),
            source: source.into(),
        }
    }
}

/// Two specs in the same plan share a name.
#[derive(Debug, Error)]
#[error("resource name '{0}' is registered more than once")]
pub struct DuplicateResource(pub String);

/// A release action did not complete cleanly.
#[derive(Debug, Error)]
pub enum ReleaseError {
    /// The release returned an error.
    #[error("release of '{resource}' failed: {source}")]
    Failed {
        resource: String,
        #[source]
        source: BoxError,
    },

    /// The release exceeded its own deadline.
    #[error("release of '{resource}' timed out after {timeout:?}")]
    TimedOut { resource: String, timeout: Duration },

    /// The release panicked.
    #[error("release of '{resource}' panicked: {message}")]
    Panicked { resource: String, message: String },
}

impl ReleaseError {
    /// Name of the resource whose release failed.
    pub fn resource(&self) -> &str {
        match self {
            ReleaseError::Failed { resource, .. }
            | ReleaseError::TimedOut { resource, .. }
            | ReleaseError::Panicked { resource, .. } => resource,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acquisition_error_names_resource_and_cause() {
        let err = AcquisitionError::new("database", "connection refused");
        assert_eq!(err.resource, "database");
        let text = err.to_string();
        assert!(text.contains("'database'"));
        assert!(text.contains("connection refused"));
    }

    #[test]
    fn test_release_error_resource() {
        let err = ReleaseError::TimedOut {
            resource: "http".into(),
            timeout: Duration::from_secs(5),
        };
        assert_eq!(err.resource(), "http");
        assert!(err.to_string().contains("timed out"));
    }
}
