//! Backend registry.
//!
//! [`BackendRegistry`] maps app-type names to [`Backend`] handles. It is filled
//! once at startup, [`populate`](BackendRegistry::populate)d, and then shared
//! behind an `Arc`. After that nobody holds `&mut` to it, so lookups need no
//! locking.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use externalapps_core::{ExternalAppsError, ExternalAppsResult, Settings};

use crate::backend::Backend;
use crate::backends::PooledBackend;

/// The central registry of instance backends.
///
/// # Examples
///
/// ```
/// use std::net::{IpAddr, Ipv4Addr};
/// use std::sync::Arc;
/// use externalapps_provision::backend::Instance;
/// use externalapps_provision::backends::PooledBackend;
/// use externalapps_provision::registry::BackendRegistry;
///
/// let host = Instance::new(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 5)), "https://forum.example.com");
/// let mut registry = BackendRegistry::new();
/// registry.register(Arc::new(PooledBackend::new("forum", vec![(host, 1)]))).unwrap();
/// registry.populate().unwrap();
///
/// assert!(registry.lookup("forum").is_ok());
/// assert!(registry.names().contains("forum"));
/// ```
#[derive(Debug, Default)]
pub struct BackendRegistry {
    backends: HashMap<String, Arc<dyn Backend>>,
    ready: bool,
}

impl BackendRegistry {
    /// Creates a new, empty `BackendRegistry`.
    pub fn new() -> Self {
        Self {
            backends: HashMap::new(),
            ready: false,
        }
    }

    /// Builds and populates a registry with one [`PooledBackend`] per
    /// `[externalapps.<name>]` table.
    pub fn from_settings(settings: &Settings) -> ExternalAppsResult<Self> {
        settings.validate()?;
        let mut registry = Self::new();
        for (name, backend_settings) in &settings.externalapps {
            let backend = PooledBackend::from_settings(name, backend_settings)?;
            registry.register(Arc::new(backend))?;
        }
        registry.populate()?;
        Ok(registry)
    }

    /// Registers a backend under [`Backend::name`].
    ///
    /// Fails with `DuplicateBackend` if the name is taken, and with
    /// `ConfigurationError` once the registry has been populated.
    pub fn register(&mut self, backend: Arc<dyn Backend>) -> ExternalAppsResult<()> {
        let name = backend.name().to_string();
        if self.ready {
            return Err(ExternalAppsError::ConfigurationError(format!(
                "cannot register backend \"{name}\" after the registry has been populated"
            )));
        }
        if self.backends.contains_key(&name) {
            return Err(ExternalAppsError::DuplicateBackend(name));
        }
        tracing::debug!(backend = %name, capacity = backend.capacity(), "registered backend");
        self.backends.insert(name, backend);
        Ok(())
    }

    /// Finalizes the registry by calling `ready()` on each backend.
    pub fn populate(&mut self) -> ExternalAppsResult<()> {
        if self.ready {
            return Err(ExternalAppsError::ConfigurationError(
                "BackendRegistry has already been populated".to_string(),
            ));
        }
        for backend in self.backends.values() {
            backend.ready();
        }
        self.ready = true;
        tracing::info!(backends = self.backends.len(), "backend registry populated");
        Ok(())
    }

    /// Returns `true` if the registry has been populated.
    pub const fn is_ready(&self) -> bool {
        self.ready
    }

    /// Returns the backend registered under `name`.
    pub fn lookup(&self, name: &str) -> ExternalAppsResult<Arc<dyn Backend>> {
        self.backends
            .get(name)
            .cloned()
            .ok_or_else(|| ExternalAppsError::BackendNotFound(name.to_string()))
    }

    /// Returns `true` if a backend is registered under `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.backends.contains_key(name)
    }

    /// The registered app-type names.
    pub fn names(&self) -> BTreeSet<String> {
        self.backends.keys().cloned().collect()
    }

    /// `(key, label)` pairs for an app-type selection surface, sorted by key.
    pub fn choices(&self) -> Vec<(String, String)> {
        let mut choices: Vec<(String, String)> = self
            .backends
            .iter()
            .map(|(name, backend)| (name.clone(), backend.verbose_name().to_string()))
            .collect();
        choices.sort();
        choices
    }

    /// Number of registered backends.
    pub fn len(&self) -> usize {
        self.backends.len()
    }

    /// Returns `true` if no backend is registered.
    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }
}
