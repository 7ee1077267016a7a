//! Error types for external-app provisioning.
//!
//! [`ExternalAppsError`] is the single error enum every public operation returns.
//! Validation failures keep enough structure ([`SlugError`], [`ValidationError`])
//! for the presentation layer to attach them to the offending form field.

use std::collections::HashMap;
use std::fmt;

use thiserror::Error;

/// Represents a validation error with optional field-level errors.
///
/// Validation errors can be either simple (a single message) or compound
/// (containing per-field error lists).
///
/// # Examples
///
/// ```
/// use externalapps_core::error::ValidationError;
///
/// let err = ValidationError::new("This field is required.", "required");
///
/// let mut field_errors = std::collections::HashMap::new();
/// field_errors.insert(
///     "app_name".to_string(),
///     vec![ValidationError::new("This field is required.", "required")],
/// );
/// let err = ValidationError::with_field_errors(field_errors);
/// ```
#[derive(Debug, Clone)]
pub struct ValidationError {
    /// The primary error message.
    pub message: String,
    /// A short code identifying the type of validation failure (e.g. "required", "invalid").
    pub code: String,
    /// Additional parameters providing context for the error message.
    pub params: HashMap<String, String>,
    /// Per-field validation errors, keyed by field name.
    pub field_errors: HashMap<String, Vec<Self>>,
}

impl ValidationError {
    /// Creates a new `ValidationError` with a message and code.
    pub fn new(message: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: code.into(),
            params: HashMap::new(),
            field_errors: HashMap::new(),
        }
    }

    /// Creates a `ValidationError` containing per-field errors.
    pub fn with_field_errors(field_errors: HashMap<String, Vec<Self>>) -> Self {
        Self {
            message: String::new(),
            code: String::new(),
            params: HashMap::new(),
            field_errors,
        }
    }

    /// Creates a `ValidationError` holding a single error for one field.
    pub fn for_field(field: impl Into<String>, error: Self) -> Self {
        let mut field_errors = HashMap::new();
        field_errors.insert(field.into(), vec![error]);
        Self::with_field_errors(field_errors)
    }

    /// Adds a parameter to this validation error.
    #[must_use]
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.message.is_empty() {
            write!(f, "{}", self.message)?;
        } else if !self.field_errors.is_empty() {
            let mut fields: Vec<_> = self.field_errors.iter().collect();
            fields.sort_by(|a, b| a.0.cmp(b.0));
            let mut first = true;
            for (field, errors) in fields {
                for error in errors {
                    if !first {
                        write!(f, "; ")?;
                    }
                    write!(f, "{field}: {error}")?;
                    first = false;
                }
            }
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

/// Which slug rule a candidate broke.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SlugErrorKind {
    /// Characters outside `[A-Za-z0-9_-]`, a leading/trailing separator, or empty.
    Format,
    /// The slug is a reserved word.
    Forbidden,
}

impl SlugErrorKind {
    /// The short code used when the error is rendered per field.
    pub const fn code(self) -> &'static str {
        match self {
            Self::Format => "invalid",
            Self::Forbidden => "forbidden",
        }
    }
}

/// A slug rejected by the validator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlugError {
    /// The rule that failed.
    pub kind: SlugErrorKind,
    /// The rejected candidate.
    pub slug: String,
}

impl SlugError {
    /// Creates a format error for `slug`.
    pub fn format(slug: impl Into<String>) -> Self {
        Self {
            kind: SlugErrorKind::Format,
            slug: slug.into(),
        }
    }

    /// Creates a forbidden-word error for `slug`.
    pub fn forbidden(slug: impl Into<String>) -> Self {
        Self {
            kind: SlugErrorKind::Forbidden,
            slug: slug.into(),
        }
    }
}

impl fmt::Display for SlugError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            SlugErrorKind::Format => write!(
                f,
                "Enter a valid \"slug\" consisting of letters, numbers, underscores or hyphens \
                 (got \"{}\")",
                self.slug
            ),
            SlugErrorKind::Forbidden => {
                write!(f, "The slug \"{}\" is a reserved word", self.slug)
            }
        }
    }
}

impl std::error::Error for SlugError {}

/// The primary error type for external-app provisioning.
///
/// Each variant maps to an HTTP-like status code via
/// [`ExternalAppsError::status_code`] and, when it concerns one record field,
/// to that field via [`ExternalAppsError::field`].
#[derive(Error, Debug)]
pub enum ExternalAppsError {
    // ── Allocation ───────────────────────────────────────────────────

    /// No backend is registered for the record's `instance_type`.
    #[error("There is no registered class to manage \"{0}\" external app")]
    UnknownAppType(String),

    /// The backend for this app type has no free slots.
    #[error("There are no instances available")]
    NoInstancesAvailable(String),

    /// A backend failed for a reason other than capacity.
    #[error("Allocation failed: {0}")]
    AllocationFailed(String),

    // ── Validation ───────────────────────────────────────────────────

    /// The slug failed the format or forbidden-word check.
    #[error("{0}")]
    InvalidSlug(SlugError),

    /// Another record already uses this slug.
    #[error("External app with slug \"{0}\" already exists")]
    DuplicateSlug(String),

    /// One or more fields failed validation.
    #[error("Validation error: {0}")]
    ValidationError(ValidationError),

    /// The requested status change is not part of the lifecycle.
    #[error("Cannot move external app from {from} to {to}")]
    InvalidTransition {
        /// Current status label.
        from: String,
        /// Requested status label.
        to: String,
    },

    // ── Registry ─────────────────────────────────────────────────────

    /// A backend with the same name is already registered.
    #[error("A backend named \"{0}\" is already registered")]
    DuplicateBackend(String),

    /// Lookup of an unregistered backend name.
    #[error("Backend not found: {0}")]
    BackendNotFound(String),

    // ── Store ────────────────────────────────────────────────────────

    /// The requested record does not exist.
    #[error("Object does not exist: {0}")]
    DoesNotExist(String),

    // ── Configuration ────────────────────────────────────────────────

    /// A configuration value is missing or invalid.
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    // ── IO ───────────────────────────────────────────────────────────

    /// An I/O error occurred.
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl ExternalAppsError {
    /// Returns the HTTP status code a presentation layer should use.
    ///
    /// - `InvalidSlug`, `ValidationError`, `UnknownAppType` -> 400
    /// - `DoesNotExist`, `BackendNotFound` -> 404
    /// - `DuplicateSlug`, `DuplicateBackend`, `InvalidTransition` -> 409
    /// - `NoInstancesAvailable` -> 503
    /// - Everything else -> 500
    pub const fn status_code(&self) -> u16 {
        match self {
            Self::InvalidSlug(_) | Self::ValidationError(_) | Self::UnknownAppType(_) => 400,
            Self::DoesNotExist(_) | Self::BackendNotFound(_) => 404,
            Self::DuplicateSlug(_) | Self::DuplicateBackend(_) | Self::InvalidTransition { .. } => {
                409
            }
            Self::NoInstancesAvailable(_) => 503,
            Self::AllocationFailed(_) | Self::ConfigurationError(_) | Self::IoError(_) => 500,
        }
    }

    /// Returns the record field this error should be displayed against, if any.
    pub fn field(&self) -> Option<&str> {
        match self {
            Self::InvalidSlug(_) | Self::DuplicateSlug(_) => Some("slug"),
            Self::UnknownAppType(_) => Some("instance_type"),
            Self::ValidationError(err) => err.field_errors.keys().next().map(String::as_str),
            _ => None,
        }
    }

    /// Returns `true` when the caller may retry later without changing input.
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::NoInstancesAvailable(_))
    }
}

impl From<SlugError> for ExternalAppsError {
    fn from(err: SlugError) -> Self {
        Self::InvalidSlug(err)
    }
}

impl From<ValidationError> for ExternalAppsError {
    fn from(err: ValidationError) -> Self {
        Self::ValidationError(err)
    }
}

/// A convenience type alias for `Result<T, ExternalAppsError>`.
pub type ExternalAppsResult<T> = Result<T, ExternalAppsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_display_simple() {
        let err = ValidationError::new("This field is required.", "required");
        assert_eq!(err.to_string(), "This field is required.");
    }

    #[test]
    fn test_validation_error_display_field_errors() {
        let err = ValidationError::for_field(
            "app_name",
            ValidationError::new("This field is required.", "required"),
        );
        assert_eq!(err.to_string(), "app_name: This field is required.");
    }

    #[test]
    fn test_validation_error_with_param() {
        let err = ValidationError::new("Too long.", "max_length").with_param("max", "200");
        assert_eq!(err.params.get("max").unwrap(), "200");
    }

    #[test]
    fn test_slug_error_kinds() {
        assert_eq!(SlugError::format("a b").kind, SlugErrorKind::Format);
        assert_eq!(SlugError::forbidden("admin").kind, SlugErrorKind::Forbidden);
        assert_eq!(SlugErrorKind::Format.code(), "invalid");
        assert_eq!(SlugErrorKind::Forbidden.code(), "forbidden");
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(ExternalAppsError::UnknownAppType("x".into()).status_code(), 400);
        assert_eq!(
            ExternalAppsError::InvalidSlug(SlugError::format("-x")).status_code(),
            400
        );
        assert_eq!(ExternalAppsError::DoesNotExist("x".into()).status_code(), 404);
        assert_eq!(ExternalAppsError::BackendNotFound("x".into()).status_code(), 404);
        assert_eq!(ExternalAppsError::DuplicateSlug("x".into()).status_code(), 409);
        assert_eq!(ExternalAppsError::DuplicateBackend("x".into()).status_code(), 409);
        assert_eq!(
            ExternalAppsError::NoInstancesAvailable("forum".into()).status_code(),
            503
        );
        assert_eq!(ExternalAppsError::AllocationFailed("x".into()).status_code(), 500);
        assert_eq!(
            ExternalAppsError::ConfigurationError("x".into()).status_code(),
            500
        );
    }

    #[test]
    fn test_user_facing_messages() {
        assert_eq!(
            ExternalAppsError::NoInstancesAvailable("askbot".into()).to_string(),
            "There are no instances available"
        );
        assert_eq!(
            ExternalAppsError::UnknownAppType("My forum".into()).to_string(),
            "There is no registered class to manage \"My forum\" external app"
        );
    }

    #[test]
    fn test_field_mapping() {
        assert_eq!(
            ExternalAppsError::from(SlugError::forbidden("admin")).field(),
            Some("slug")
        );
        assert_eq!(
            ExternalAppsError::UnknownAppType("x".into()).field(),
            Some("instance_type")
        );
        let err = ExternalAppsError::from(ValidationError::for_field(
            "app_name",
            ValidationError::new("This field is required.", "required"),
        ));
        assert_eq!(err.field(), Some("app_name"));
        assert_eq!(ExternalAppsError::AllocationFailed("x".into()).field(), None);
    }

    #[test]
    fn test_only_capacity_is_transient() {
        assert!(ExternalAppsError::NoInstancesAvailable("x".into()).is_transient());
        assert!(!ExternalAppsError::AllocationFailed("x".into()).is_transient());
        assert!(!ExternalAppsError::UnknownAppType("x".into()).is_transient());
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file missing");
        let err: ExternalAppsError = io_err.into();
        assert_eq!(err.status_code(), 500);
        assert!(err.to_string().contains("file missing"));
    }
}
