//! Settings loading from configuration files.
//!
//! ## Loading Order
//!
//! 1. Start with default settings.
//! 2. Load from a TOML or JSON file (overriding defaults).
//! 3. Apply environment variable overrides (highest priority).
//!
//! ## Environment Variable Mapping
//!
//! | Env Var | Setting |
//! |---|---|
//! | `EXTERNALAPPS_DEBUG` | `debug` |
//! | `EXTERNALAPPS_LOG_LEVEL` | `log_level` |
//! | `EXTERNALAPPS_DEFAULT_INSTANCE_TYPE` | `default_instance_type` |
//! | `EXTERNALAPPS_FORBIDDEN_SLUGS` | `forbidden_slugs` (comma-separated) |
//!
//! ## Examples
//!
//! ```rust,no_run
//! use externalapps_core::settings_loader;
//!
//! let settings = settings_loader::from_toml_file_with_env("config/externalapps.toml").unwrap();
//! ```
//!
//! A backend table looks like:
//!
//! ```toml
//! [externalapps.askbot]
//! instances = [
//!     { ip_address = "10.0.0.5", base_url = "https://askbot.example.com", max_instances = 20 },
//! ]
//! ```

use std::path::Path;

use crate::error::ExternalAppsError;
use crate::settings::Settings;

/// Loads settings from a TOML string.
///
/// Any fields not present in the TOML keep their default values.
pub fn from_toml_str(toml_str: &str) -> Result<Settings, ExternalAppsError> {
    let toml_value: toml::Value = toml::from_str(toml_str).map_err(|e| {
        ExternalAppsError::ConfigurationError(format!("Failed to parse TOML: {e}"))
    })?;
    merge_over_defaults(toml_to_json(toml_value), "TOML")
}

/// Loads settings from a TOML file.
pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Settings, ExternalAppsError> {
    from_toml_str(&read_config(path.as_ref(), "TOML")?)
}

/// Loads settings from a TOML file and then applies environment variable overrides.
pub fn from_toml_file_with_env(path: impl AsRef<Path>) -> Result<Settings, ExternalAppsError> {
    let mut settings = from_toml_file(path)?;
    apply_env_overrides(&mut settings);
    Ok(settings)
}

/// Loads settings from a JSON string.
pub fn from_json_str(json_str: &str) -> Result<Settings, ExternalAppsError> {
    let json_value: serde_json::Value = serde_json::from_str(json_str).map_err(|e| {
        ExternalAppsError::ConfigurationError(format!("Failed to parse JSON: {e}"))
    })?;
    merge_over_defaults(json_value, "JSON")
}

/// Loads settings from a JSON file.
pub fn from_json_file(path: impl AsRef<Path>) -> Result<Settings, ExternalAppsError> {
    from_json_str(&read_config(path.as_ref(), "JSON")?)
}

/// Loads settings from a JSON file and then applies environment variable overrides.
pub fn from_json_file_with_env(path: impl AsRef<Path>) -> Result<Settings, ExternalAppsError> {
    let mut settings = from_json_file(path)?;
    apply_env_overrides(&mut settings);
    Ok(settings)
}

/// Applies environment variable overrides to a settings struct.
///
/// - `EXTERNALAPPS_DEBUG` -> `debug` ("true"/"1"/"yes" => true, anything else => false)
/// - `EXTERNALAPPS_LOG_LEVEL` -> `log_level`
/// - `EXTERNALAPPS_DEFAULT_INSTANCE_TYPE` -> `default_instance_type`
/// - `EXTERNALAPPS_FORBIDDEN_SLUGS` -> `forbidden_slugs` (comma-separated)
pub fn apply_env_overrides(settings: &mut Settings) {
    apply_overrides_from(settings, |key| std::env::var(key).ok());
}

fn apply_overrides_from(settings: &mut Settings, var: impl Fn(&str) -> Option<String>) {
    if let Some(val) = var("EXTERNALAPPS_DEBUG") {
        settings.debug = matches!(val.to_lowercase().as_str(), "true" | "1" | "yes");
    }

    if let Some(val) = var("EXTERNALAPPS_LOG_LEVEL") {
        settings.log_level = val;
    }

    if let Some(val) = var("EXTERNALAPPS_DEFAULT_INSTANCE_TYPE") {
        settings.default_instance_type = val;
    }

    if let Some(val) = var("EXTERNALAPPS_FORBIDDEN_SLUGS") {
        settings.forbidden_slugs = val
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
    }
}

// ============================================================
// Helpers
// ============================================================

fn read_config(path: &Path, format: &str) -> Result<String, ExternalAppsError> {
    std::fs::read_to_string(path).map_err(|e| {
        tracing::error!(path = %path.display(), %e, "failed to read {format} settings file");
        ExternalAppsError::from(e)
    })
}

fn merge_over_defaults(
    value: serde_json::Value,
    format: &str,
) -> Result<Settings, ExternalAppsError> {
    let default_json = serde_json::to_value(Settings::default()).map_err(|e| {
        ExternalAppsError::ConfigurationError(format!(
            "Failed to serialize default settings: {e}"
        ))
    })?;

    let merged = merge_json(default_json, value);
    serde_json::from_value(merged).map_err(|e| {
        ExternalAppsError::ConfigurationError(format!(
            "Failed to deserialize settings from {format}: {e}"
        ))
    })
}

/// Converts a TOML value to a `serde_json::Value`.
fn toml_to_json(value: toml::Value) -> serde_json::Value {
    match value {
        toml::Value::String(s) => serde_json::Value::String(s),
        toml::Value::Integer(i) => serde_json::json!(i),
        toml::Value::Float(f) => serde_json::json!(f),
        toml::Value::Boolean(b) => serde_json::Value::Bool(b),
        toml::Value::Datetime(dt) => serde_json::Value::String(dt.to_string()),
        toml::Value::Array(arr) => {
            serde_json::Value::Array(arr.into_iter().map(toml_to_json).collect())
        }
        toml::Value::Table(table) => {
            let map: serde_json::Map<String, serde_json::Value> = table
                .into_iter()
                .map(|(k, v)| (k, toml_to_json(v)))
                .collect();
            serde_json::Value::Object(map)
        }
    }
}

/// Deep-merges two JSON values. The `override_val` takes precedence.
fn merge_json(base: serde_json::Value, override_val: serde_json::Value) -> serde_json::Value {
    match (base, override_val) {
        (serde_json::Value::Object(mut base_map), serde_json::Value::Object(override_map)) => {
            for (key, override_v) in override_map {
                let merged = if let Some(base_v) = base_map.remove(&key) {
                    merge_json(base_v, override_v)
                } else {
                    override_v
                };
                base_map.insert(key, merged);
            }
            serde_json::Value::Object(base_map)
        }
        (_, override_val) => override_val,
    }
}
