//! The backend capability.
//!
//! A [`Backend`] provisions instances of one app type. The allocator only ever
//! talks to backends through this trait, so tests and deployments can register
//! any implementation under any name. [`PooledBackend`](crate::backends::PooledBackend)
//! is the configuration-driven implementation used in production.

use std::fmt;
use std::net::IpAddr;

use externalapps_core::ExternalAppsError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::CourseId;

/// Connection details for one reserved instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Instance {
    /// Address of the host serving the instance.
    pub ip_address: IpAddr,
    /// Base URL of the host; the record URL is `base_url + "/" + slug`.
    pub base_url: String,
}

impl Instance {
    /// Creates connection details for a host.
    pub fn new(ip_address: IpAddr, base_url: impl Into<String>) -> Self {
        Self {
            ip_address,
            base_url: base_url.into(),
        }
    }
}

/// Failures a backend can report.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    /// Every slot is reserved. Callers branch on this to tell the user to try
    /// again later.
    #[error("instance limit reached for \"{app_type}\"")]
    InstanceLimitReached {
        /// The app type whose capacity is exhausted.
        app_type: String,
    },

    /// The backend could not serve the request for its own reasons.
    #[error("backend unavailable: {0}")]
    Unavailable(String),

    /// A release named an instance with nothing reserved on it.
    #[error("no reservation on {ip_address} ({base_url})")]
    UnknownInstance {
        /// Address from the released record.
        ip_address: IpAddr,
        /// Base URL from the released record.
        base_url: String,
    },
}

impl From<BackendError> for ExternalAppsError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::InstanceLimitReached { app_type } => Self::NoInstancesAvailable(app_type),
            other => Self::AllocationFailed(other.to_string()),
        }
    }
}

/// A provider of instances for one app type.
///
/// Implementations must be safe to call from many threads at once: the
/// capacity check and the reservation it guards happen as one atomic step,
/// and so does a release.
///
/// # Examples
///
/// ```
/// use std::net::{IpAddr, Ipv4Addr};
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use externalapps_provision::backend::{Backend, BackendError, Instance};
/// use externalapps_provision::model::CourseId;
///
/// #[derive(Debug, Default)]
/// struct Single(AtomicUsize);
///
/// impl Backend for Single {
///     fn name(&self) -> &str { "single" }
///     fn capacity(&self) -> usize { 1 }
///     fn reserved(&self) -> usize { self.0.load(Ordering::SeqCst) }
///     fn allocate(&self, _course: CourseId) -> Result<Instance, BackendError> {
///         self.0
///             .compare_exchange(0, 1, Ordering::SeqCst, Ordering::SeqCst)
///             .map(|_| Instance::new(IpAddr::V4(Ipv4Addr::LOCALHOST), "http://localhost"))
///             .map_err(|_| BackendError::InstanceLimitReached { app_type: "single".into() })
///     }
///     fn release(&self, instance: &Instance) -> Result<(), BackendError> {
///         self.0
///             .compare_exchange(1, 0, Ordering::SeqCst, Ordering::SeqCst)
///             .map(|_| ())
///             .map_err(|_| BackendError::UnknownInstance {
///                 ip_address: instance.ip_address,
///                 base_url: instance.base_url.clone(),
///             })
///     }
/// }
///
/// let backend = Single::default();
/// assert!(backend.allocate(CourseId(1)).is_ok());
/// assert!(backend.allocate(CourseId(2)).is_err());
/// ```
pub trait Backend: Send + Sync + fmt::Debug {
    /// The app type this backend is registered under. Must be stable.
    fn name(&self) -> &str;

    /// Maximum number of instances reserved at once.
    fn capacity(&self) -> usize;

    /// Number of instances currently reserved.
    fn reserved(&self) -> usize;

    /// Reserves one slot for `course` and returns its connection details.
    ///
    /// Not idempotent: two calls for the same course reserve two slots.
    fn allocate(&self, course: CourseId) -> Result<Instance, BackendError>;

    /// Returns the slot held by `instance` to the pool.
    fn release(&self, instance: &Instance) -> Result<(), BackendError>;

    /// Human-readable label used when listing app types.
    fn verbose_name(&self) -> &str {
        self.name()
    }

    /// Called once when the registry holding this backend is populated.
    fn ready(&self) {}

    /// Slots still free.
    fn available(&self) -> usize {
        self.capacity().saturating_sub(self.reserved())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn test_limit_maps_to_no_instances() {
        let err: ExternalAppsError = BackendError::InstanceLimitReached {
            app_type: "forum".into(),
        }
        .into();
        assert!(matches!(err, ExternalAppsError::NoInstancesAvailable(ref t) if t == "forum"));
    }

    #[test]
    fn test_other_failures_map_to_allocation_failed() {
        let err: ExternalAppsError = BackendError::Unavailable("host down".into()).into();
        assert!(matches!(err, ExternalAppsError::AllocationFailed(ref m) if m.contains("host down")));

        let err: ExternalAppsError = BackendError::UnknownInstance {
            ip_address: IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)),
            base_url: "https://q.example.com".into(),
        }
        .into();
        assert!(!err.is_transient());
        assert!(err.to_string().contains("10.0.0.1"));
    }
}
