//! The allocation state machine.
//!
//! Saving an external app is split in two explicit steps:
//!
//! 1. [`Allocator::validate`] resolves the backend, checks the record's fields
//!    and, for a new record, reserves an instance. It never touches the record
//!    and returns a [`Decision`].
//! 2. [`Allocator::apply`] writes that decision into the record, moving it to
//!    `InProgress` along a legal [`Status`] edge.
//!
//! Every check that can fail on user input runs before the backend is called,
//! so rejected input never consumes capacity. A failed validation leaves the
//! record exactly as it was.

use std::collections::HashSet;
use std::sync::Arc;

use externalapps_core::logging::allocation_span;
use externalapps_core::{ExternalAppsError, ExternalAppsResult, Settings, ValidationError};

use crate::backend::{Backend, Instance};
use crate::model::{AppId, ExternalApp, Status};
use crate::registry::BackendRegistry;
use crate::validators::{SlugValidator, Validator};

/// Whether the record being saved already exists in the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordState {
    /// First save: an instance must be allocated.
    New,
    /// Edit of a stored record: connection details are kept as they are.
    Existing,
}

impl RecordState {
    /// Derives the state from whether the record has a store id.
    pub const fn of(record: &ExternalApp) -> Self {
        if record.is_new() {
            Self::New
        } else {
            Self::Existing
        }
    }
}

/// Outcome of a successful validation.
#[derive(Debug, PartialEq, Eq)]
#[must_use = "an Allocate decision holds a reserved slot; apply or discard it"]
pub enum Decision {
    /// A slot was reserved; write these details into the record.
    Allocate {
        /// Reserved connection details.
        instance: Instance,
        /// The backend's canonical app-type name.
        instance_type: String,
    },
    /// Nothing to allocate; the record keeps its connection details.
    Keep,
}

/// Existence check for slugs, provided by the persistence layer.
pub trait SlugIndex {
    /// Returns `true` if a stored record other than `except` uses `slug`.
    fn slug_taken(&self, slug: &str, except: Option<AppId>) -> bool;
}

/// A [`SlugIndex`] that knows of no records.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoSlugIndex;

impl SlugIndex for NoSlugIndex {
    fn slug_taken(&self, _slug: &str, _except: Option<AppId>) -> bool {
        false
    }
}

/// Longest accepted `app_name`.
pub const APP_NAME_MAX_LENGTH: usize = 200;

/// Resolves backends and drives records through allocation.
#[derive(Debug, Clone)]
pub struct Allocator {
    registry: Arc<BackendRegistry>,
    slugs: SlugValidator,
}

impl Allocator {
    /// Creates an allocator over a populated registry.
    pub fn new(registry: Arc<BackendRegistry>, slugs: SlugValidator) -> Self {
        Self { registry, slugs }
    }

    /// Builds the registry and slug policy from `settings`.
    pub fn from_settings(settings: &Settings) -> ExternalAppsResult<Self> {
        let registry = BackendRegistry::from_settings(settings)?;
        Ok(Self::new(
            Arc::new(registry),
            SlugValidator::from_settings(settings),
        ))
    }

    /// The registry backends are resolved from.
    pub fn registry(&self) -> &BackendRegistry {
        &self.registry
    }

    /// Decides what saving `record` requires, reserving a slot if it is new.
    ///
    /// Checks run in this order, stopping at the first failure:
    /// backend lookup (`UnknownAppType`), `app_name` presence and length, slug
    /// format and forbidden words (`InvalidSlug`), slug uniqueness
    /// (`DuplicateSlug`), the `InProgress` edge from the current status
    /// (`InvalidTransition`), and finally the backend reservation
    /// (`NoInstancesAvailable` or `AllocationFailed`).
    pub fn validate(
        &self,
        record: &ExternalApp,
        state: RecordState,
        index: &dyn SlugIndex,
    ) -> ExternalAppsResult<Decision> {
        let span = allocation_span(&record.instance_type, &record.slug);
        let _guard = span.enter();

        let backend = self.resolve(record)?;
        self.check_fields(record, index)?;

        if state == RecordState::Existing || record.has_connection() {
            tracing::debug!(course = %record.course_id, "record already provisioned, keeping instance");
            return Ok(Decision::Keep);
        }
        check_edge(record.status)?;

        let instance = reserve(backend.as_ref(), record)?;
        tracing::info!(
            course = %record.course_id,
            ip = %instance.ip_address,
            base_url = %instance.base_url,
            "allocated instance"
        );
        Ok(Decision::Allocate {
            instance,
            instance_type: backend.name().to_string(),
        })
    }

    /// Writes `decision` into `record`.
    ///
    /// If `record`'s status has no edge to `InProgress`, the reserved slot is
    /// released and `record` is left unchanged.
    pub fn apply(&self, record: &mut ExternalApp, decision: Decision) -> ExternalAppsResult<()> {
        let Decision::Allocate {
            instance,
            instance_type,
        } = decision
        else {
            return Ok(());
        };
        if let Err(err) = check_edge(record.status) {
            self.discard(Decision::Allocate {
                instance,
                instance_type,
            });
            return Err(err);
        }
        record.ip_address = Some(instance.ip_address);
        record.base_url = instance.base_url;
        record.instance_type = instance_type;
        record.status = Status::InProgress;
        Ok(())
    }

    /// [`validate`](Self::validate) followed by [`apply`](Self::apply).
    pub fn allocate(
        &self,
        record: &mut ExternalApp,
        state: RecordState,
        index: &dyn SlugIndex,
    ) -> ExternalAppsResult<()> {
        let decision = self.validate(record, state, index)?;
        self.apply(record, decision)
    }

    /// Validates several records as one unit.
    ///
    /// Slugs must be unique within the batch as well as against `index`. If any
    /// record fails, slots already reserved for earlier records are released
    /// and the error is returned; no decision escapes.
    pub fn validate_batch(
        &self,
        records: &[(&ExternalApp, RecordState)],
        index: &dyn SlugIndex,
    ) -> ExternalAppsResult<Vec<Decision>> {
        let mut seen = HashSet::new();
        let mut decisions = Vec::with_capacity(records.len());
        for (record, state) in records {
            let outcome = if seen.insert(record.slug.as_str()) {
                self.validate(record, *state, index)
            } else {
                Err(ExternalAppsError::DuplicateSlug(record.slug.clone()))
            };
            match outcome {
                Ok(decision) => decisions.push(decision),
                Err(err) => {
                    for decision in decisions {
                        self.discard(decision);
                    }
                    return Err(err);
                }
            }
        }
        Ok(decisions)
    }

    /// Returns the slot held by an unapplied decision.
    pub fn discard(&self, decision: Decision) {
        let Decision::Allocate {
            instance,
            instance_type,
        } = decision
        else {
            return;
        };
        let released = self
            .registry
            .lookup(&instance_type)
            .and_then(|backend| backend.release(&instance).map_err(Into::into));
        if let Err(err) = released {
            tracing::error!(%instance_type, ip = %instance.ip_address, %err, "failed to discard reservation");
        }
    }

    /// Returns `record`'s slot to its backend.
    ///
    /// Returns `Ok(false)` if the record never had connection details.
    pub fn release(&self, record: &ExternalApp) -> ExternalAppsResult<bool> {
        let Some(instance) = record.instance() else {
            return Ok(false);
        };
        let backend = self.resolve(record)?;
        backend.release(&instance)?;
        tracing::info!(
            course = %record.course_id,
            slug = %record.slug,
            ip = %instance.ip_address,
            "released instance"
        );
        Ok(true)
    }

    /// Marks an `InProgress` record as provisioned.
    pub fn confirm_created(record: &mut ExternalApp) -> ExternalAppsResult<()> {
        record.transition_to(Status::Created)
    }

    /// Marks a record whose provisioning failed.
    pub fn mark_error(record: &mut ExternalApp) -> ExternalAppsResult<()> {
        record.transition_to(Status::Error)
    }

    fn resolve(&self, record: &ExternalApp) -> ExternalAppsResult<Arc<dyn Backend>> {
        self.registry.lookup(&record.instance_type).map_err(|_| {
            tracing::warn!(instance_type = %record.instance_type, "no backend for app type");
            ExternalAppsError::UnknownAppType(record.app_name.clone())
        })
    }

    fn check_fields(&self, record: &ExternalApp, index: &dyn SlugIndex) -> ExternalAppsResult<()> {
        if record.app_name.trim().is_empty() {
            return Err(ValidationError::for_field(
                "app_name",
                ValidationError::new("This field is required.", "required"),
            )
            .into());
        }
        if record.app_name.chars().count() > APP_NAME_MAX_LENGTH {
            return Err(ValidationError::for_field(
                "app_name",
                ValidationError::new(
                    format!("Ensure this value has at most {APP_NAME_MAX_LENGTH} characters."),
                    "max_length",
                )
                .with_param("limit_value", APP_NAME_MAX_LENGTH.to_string()),
            )
            .into());
        }
        self.slugs.validate(&record.slug)?;
        if index.slug_taken(&record.slug, record.id) {
            return Err(ExternalAppsError::DuplicateSlug(record.slug.clone()));
        }
        Ok(())
    }
}

fn check_edge(status: Status) -> ExternalAppsResult<()> {
    if status.can_transition_to(Status::InProgress) {
        Ok(())
    } else {
        Err(ExternalAppsError::InvalidTransition {
            from: status.label().to_string(),
            to: Status::InProgress.label().to_string(),
        })
    }
}

fn reserve(backend: &dyn Backend, record: &ExternalApp) -> ExternalAppsResult<Instance> {
    let instance = backend.allocate(record.course_id).map_err(|err| {
        tracing::warn!(backend = backend.name(), %err, "allocation refused");
        ExternalAppsError::from(err)
    })?;
    if instance.base_url.is_empty() {
        // Hand the slot back; a record without a base URL cannot be served.
        if let Err(err) = backend.release(&instance) {
            tracing::error!(backend = backend.name(), %err, "failed to return unusable slot");
        }
        return Err(ExternalAppsError::AllocationFailed(format!(
            "backend \"{}\" returned an instance without a base url",
            backend.name()
        )));
    }
    Ok(instance)
}
