//! A backend that hands out slots on a fixed list of hosts.
//!
//! Each configured host carries up to `max_instances` course instances. An
//! allocation goes to the first host with a free slot, so hosts fill up in the
//! order they are configured.

use std::net::IpAddr;
use std::sync::{Mutex, MutexGuard};

use externalapps_core::{BackendSettings, ExternalAppsError, ExternalAppsResult};

use crate::backend::{Backend, BackendError, Instance};
use crate::model::CourseId;

#[derive(Debug)]
struct HostSlots {
    instance: Instance,
    max_instances: usize,
    used: usize,
}

/// Capacity-limited backend over a list of hosts.
///
/// All slot counts sit behind one mutex, so the "is there room" check and the
/// reservation are a single critical section.
///
/// # Examples
///
/// ```
/// use std::net::{IpAddr, Ipv4Addr};
/// use externalapps_provision::backend::{Backend, Instance};
/// use externalapps_provision::backends::PooledBackend;
/// use externalapps_provision::model::CourseId;
///
/// let host = Instance::new(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 5)), "https://forum.example.com");
/// let backend = PooledBackend::new("forum", vec![(host, 1)]);
///
/// assert!(backend.allocate(CourseId(1)).is_ok());
/// assert!(backend.allocate(CourseId(2)).is_err());
/// ```
#[derive(Debug)]
pub struct PooledBackend {
    name: String,
    capacity: usize,
    hosts: Mutex<Vec<HostSlots>>,
}

impl PooledBackend {
    /// Creates a backend named `name` over `(host, max_instances)` pairs.
    pub fn new(name: impl Into<String>, hosts: Vec<(Instance, usize)>) -> Self {
        let hosts: Vec<HostSlots> = hosts
            .into_iter()
            .map(|(instance, max_instances)| HostSlots {
                instance,
                max_instances,
                used: 0,
            })
            .collect();
        Self {
            name: name.into(),
            capacity: hosts.iter().map(|h| h.max_instances).sum(),
            hosts: Mutex::new(hosts),
        }
    }

    /// Builds a backend from one `[externalapps.<name>]` settings table.
    pub fn from_settings(name: &str, settings: &BackendSettings) -> ExternalAppsResult<Self> {
        let hosts = settings
            .instances
            .iter()
            .map(|host| {
                let ip: IpAddr = host.ip_address.parse().map_err(|_| {
                    ExternalAppsError::ConfigurationError(format!(
                        "external app \"{name}\": \"{}\" is not a valid IP address",
                        host.ip_address
                    ))
                })?;
                Ok((Instance::new(ip, host.base_url.clone()), host.max_instances))
            })
            .collect::<ExternalAppsResult<Vec<_>>>()?;
        Ok(Self::new(name, hosts))
    }

    /// Reserved count per host, in configuration order.
    pub fn usage(&self) -> Result<Vec<(Instance, usize)>, BackendError> {
        Ok(self
            .lock()?
            .iter()
            .map(|h| (h.instance.clone(), h.used))
            .collect())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Vec<HostSlots>>, BackendError> {
        self.hosts
            .lock()
            .map_err(|_| BackendError::Unavailable(format!("{} slot table poisoned", self.name)))
    }
}

impl Backend for PooledBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn capacity(&self) -> usize {
        self.capacity
    }

    fn reserved(&self) -> usize {
        self.lock()
            .map(|hosts| hosts.iter().map(|h| h.used).sum())
            .unwrap_or(self.capacity)
    }

    fn allocate(&self, course: CourseId) -> Result<Instance, BackendError> {
        let mut hosts = self.lock()?;
        let Some(host) = hosts.iter_mut().find(|h| h.used < h.max_instances) else {
            tracing::warn!(backend = %self.name, %course, "instance limit reached");
            return Err(BackendError::InstanceLimitReached {
                app_type: self.name.clone(),
            });
        };
        host.used += 1;
        tracing::debug!(
            backend = %self.name,
            %course,
            ip = %host.instance.ip_address,
            used = host.used,
            max = host.max_instances,
            "reserved instance slot"
        );
        Ok(host.instance.clone())
    }

    fn release(&self, instance: &Instance) -> Result<(), BackendError> {
        let mut hosts = self.lock()?;
        let host = hosts
            .iter_mut()
            .find(|h| h.instance == *instance && h.used > 0)
            .ok_or_else(|| BackendError::UnknownInstance {
                ip_address: instance.ip_address,
                base_url: instance.base_url.clone(),
            })?;
        host.used -= 1;
        tracing::debug!(
            backend = %self.name,
            ip = %instance.ip_address,
            used = host.used,
            "released instance slot"
        );
        Ok(())
    }

    fn ready(&self) {
        tracing::info!(backend = %self.name, capacity = self.capacity, "backend ready");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use externalapps_core::InstanceSettings;
    use std::net::Ipv4Addr;
    use std::sync::Arc;

    fn host(last: u8, url: &str) -> Instance {
        Instance::new(IpAddr::V4(Ipv4Addr::new(10, 0, 0, last)), url)
    }

    fn two_hosts() -> PooledBackend {
        PooledBackend::new(
            "askbot",
            vec![
                (host(1, "https://a.example.com"), 2),
                (host(2, "https://b.example.com"), 1),
            ],
        )
    }

    #[test]
    fn test_fills_hosts_in_order() {
        let backend = two_hosts();
        assert_eq!(backend.capacity(), 3);
        assert_eq!(backend.allocate(CourseId(1)).unwrap(), host(1, "https://a.example.com"));
        assert_eq!(backend.allocate(CourseId(2)).unwrap(), host(1, "https://a.example.com"));
        assert_eq!(backend.allocate(CourseId(3)).unwrap(), host(2, "https://b.example.com"));
        assert_eq!(backend.reserved(), 3);
        assert_eq!(backend.available(), 0);
    }

    #[test]
    fn test_limit_reached_names_backend() {
        let backend = PooledBackend::new("forum", vec![(host(1, "https://f.example.com"), 1)]);
        backend.allocate(CourseId(1)).unwrap();
        assert_eq!(
            backend.allocate(CourseId(1)),
            Err(BackendError::InstanceLimitReached {
                app_type: "forum".into()
            })
        );
    }

    #[test]
    fn test_release_frees_the_right_host() {
        let backend = two_hosts();
        for course in 1..=3 {
            backend.allocate(CourseId(course)).unwrap();
        }
        backend.release(&host(2, "https://b.example.com")).unwrap();
        let usage = backend.usage().unwrap();
        assert_eq!(usage[0].1, 2);
        assert_eq!(usage[1].1, 0);
        assert_eq!(backend.allocate(CourseId(4)).unwrap(), host(2, "https://b.example.com"));
    }

    #[test]
    fn test_release_never_goes_negative() {
        let backend = two_hosts();
        let err = backend.release(&host(1, "https://a.example.com")).unwrap_err();
        assert!(matches!(err, BackendError::UnknownInstance { .. }));
        assert_eq!(backend.reserved(), 0);
    }

    #[test]
    fn test_release_unknown_host() {
        let backend = two_hosts();
        backend.allocate(CourseId(1)).unwrap();
        assert!(backend.release(&host(9, "https://z.example.com")).is_err());
        assert_eq!(backend.reserved(), 1);
    }

    #[test]
    fn test_zero_capacity_backend() {
        let backend = PooledBackend::new("empty", vec![(host(1, "https://a.example.com"), 0)]);
        assert!(matches!(
            backend.allocate(CourseId(1)),
            Err(BackendError::InstanceLimitReached { .. })
        ));
    }

    #[test]
    fn test_from_settings() {
        let settings = BackendSettings {
            instances: vec![InstanceSettings {
                ip_address: "fd00::7".into(),
                base_url: "https://q.example.com".into(),
                max_instances: 4,
            }],
        };
        let backend = PooledBackend::from_settings("askbot", &settings).unwrap();
        assert_eq!(backend.name(), "askbot");
        assert_eq!(backend.capacity(), 4);
        assert!(backend.allocate(CourseId(1)).unwrap().ip_address.is_ipv6());
    }

    #[test]
    fn test_from_settings_bad_ip() {
        let settings = BackendSettings {
            instances: vec![InstanceSettings {
                ip_address: "300.1.1.1".into(),
                base_url: "https://q.example.com".into(),
                max_instances: 1,
            }],
        };
        assert!(matches!(
            PooledBackend::from_settings("askbot", &settings),
            Err(ExternalAppsError::ConfigurationError(_))
        ));
    }

    #[test]
    fn test_concurrent_allocate_and_release_stay_bounded() {
        let backend = Arc::new(two_hosts());
        std::thread::scope(|scope| {
            for worker in 0..8u64 {
                let backend = Arc::clone(&backend);
                scope.spawn(move || {
                    for round in 0..200u64 {
                        if let Ok(instance) = backend.allocate(CourseId(worker * 1000 + round)) {
                            assert!(backend.reserved() <= backend.capacity());
                            backend.release(&instance).unwrap();
                        }
                    }
                });
            }
        });
        assert_eq!(backend.reserved(), 0);
    }
}
