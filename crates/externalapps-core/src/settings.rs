//! Settings for external-app provisioning.
//!
//! [`Settings`] is read once at startup (see [`settings_loader`](crate::settings_loader))
//! and handed to whoever builds the backend registry. There is no global
//! instance: every registry is constructed from an explicit `Settings` value.

use std::collections::BTreeMap;
use std::net::IpAddr;

use serde::{Deserialize, Serialize};

use crate::error::{ExternalAppsError, ExternalAppsResult};

/// One host that can run instances of an app type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceSettings {
    /// Network address of the host.
    pub ip_address: String,
    /// Base URL the host serves instances under, without a trailing slash.
    pub base_url: String,
    /// How many course instances this host may carry at once.
    pub max_instances: usize,
}

/// Configuration for the backend managing one app type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendSettings {
    /// Hosts, tried in order when allocating.
    #[serde(default)]
    pub instances: Vec<InstanceSettings>,
}

impl BackendSettings {
    /// Total number of instances this backend may have reserved at once.
    pub fn capacity(&self) -> usize {
        self.instances.iter().map(|i| i.max_instances).sum()
    }
}

/// The complete set of provisioning settings.
///
/// # Examples
///
/// ```
/// use externalapps_core::settings::Settings;
///
/// let settings = Settings::default();
/// assert_eq!(settings.default_instance_type, "askbot");
/// assert!(settings.forbidden_slugs.iter().any(|w| w == "admin"));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    // ── Core ─────────────────────────────────────────────────────────

    /// Whether debug mode is enabled.
    pub debug: bool,
    /// The log level (e.g. "info", "debug", "warn").
    pub log_level: String,

    // ── External apps ────────────────────────────────────────────────

    /// App type preselected for new records.
    pub default_instance_type: String,
    /// Words that may never be used as a slug (compared case-insensitively).
    pub forbidden_slugs: Vec<String>,
    /// Backend configuration, keyed by app type name.
    pub externalapps: BTreeMap<String, BackendSettings>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            debug: true,
            log_level: "info".to_string(),
            default_instance_type: "askbot".to_string(),
            forbidden_slugs: ["admin", "api", "static", "media", "login", "logout"]
                .iter()
                .map(ToString::to_string)
                .collect(),
            externalapps: BTreeMap::new(),
        }
    }
}

impl Settings {
    /// Checks the backend table for values no backend could work with.
    pub fn validate(&self) -> ExternalAppsResult<()> {
        for (app_type, backend) in &self.externalapps {
            if backend.instances.is_empty() {
                return Err(ExternalAppsError::ConfigurationError(format!(
                    "external app \"{app_type}\" has no instances configured"
                )));
            }
            for instance in &backend.instances {
                if instance.ip_address.parse::<IpAddr>().is_err() {
                    return Err(ExternalAppsError::ConfigurationError(format!(
                        "external app \"{app_type}\": \"{}\" is not a valid IP address",
                        instance.ip_address
                    )));
                }
                if instance.base_url.is_empty() || instance.base_url.ends_with('/') {
                    return Err(ExternalAppsError::ConfigurationError(format!(
                        "external app \"{app_type}\": base url \"{}\" must be non-empty \
                         and must not end with '/'",
                        instance.base_url
                    )));
                }
            }
        }
        Ok(())
    }
}
