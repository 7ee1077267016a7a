//! # externalapps-core
//!
//! Error types, settings and logging shared by the external-app provisioning crates.
//!
//! ## Modules
//!
//! - [`error`] - Error types and result aliases
//! - [`settings`] - Backend table and slug policy
//! - [`settings_loader`] - TOML/JSON/env loading of [`Settings`]
//! - [`logging`] - Tracing-based logging integration

pub mod error;
pub mod logging;
pub mod settings;
pub mod settings_loader;

// Re-export the most commonly used types at the crate root.
pub use error::{ExternalAppsError, ExternalAppsResult, SlugError, SlugErrorKind, ValidationError};
pub use settings::{BackendSettings, InstanceSettings, Settings};
