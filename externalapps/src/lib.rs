//! # externalapps
//!
//! Per-course external applications (forums, Q&A sites) provisioned from
//! pluggable, capacity-limited backends.
//!
//! This is the meta-crate that re-exports the sub-crates and wires them
//! together. [`bootstrap`] turns loaded [`Settings`](core::Settings) into a
//! ready-to-use service.

/// Error types, settings, settings loading and logging.
pub use externalapps_core as core;

/// Backend registry, allocator, record model and store.
pub use externalapps_provision as provision;

use externalapps_core::{ExternalAppsResult, Settings};
use externalapps_provision::{Allocator, ExternalAppService, InMemoryStore};

/// Builds an in-memory [`ExternalAppService`] from `settings`.
///
/// Validates the backend tables, registers one pooled backend per table and
/// populates the registry. Logging is not initialized here; call
/// [`core::logging::setup_logging`] first if needed.
pub fn bootstrap(settings: &Settings) -> ExternalAppsResult<ExternalAppService<InMemoryStore>> {
    let allocator = Allocator::from_settings(settings)?;
    if !allocator
        .registry()
        .contains(&settings.default_instance_type)
    {
        tracing::warn!(
            default_instance_type = %settings.default_instance_type,
            "default app type has no configured backend"
        );
    }
    tracing::info!(
        backends = allocator.registry().len(),
        default_instance_type = %settings.default_instance_type,
        "external apps ready"
    );
    Ok(ExternalAppService::new(
        allocator,
        InMemoryStore::new(),
        settings.default_instance_type.clone(),
    ))
}
