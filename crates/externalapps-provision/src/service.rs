//! Course-level operations on external apps.
//!
//! [`ExternalAppService`] ties the allocator to a store: list a course's apps,
//! add one (allocate, then persist), edit one (no re-allocation), delete one
//! (remove, then release its slot). Authorization and rendering are the
//! caller's business.

use externalapps_core::{ExternalAppsError, ExternalAppsResult};
use serde::{Deserialize, Serialize};

use crate::allocator::{Allocator, Decision, RecordState};
use crate::model::{AppId, CourseId, ExternalApp};
use crate::store::AppStore;

/// Input for creating an external app.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewExternalApp {
    /// Display label.
    pub app_name: String,
    /// Requested slug.
    pub slug: String,
    /// App type; `None` uses the configured default.
    #[serde(default)]
    pub instance_type: Option<String>,
}

/// Editable fields of a stored external app. `None` leaves a field unchanged.
///
/// The instance type is deliberately absent: a provisioned app cannot move to
/// another backend.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalAppChanges {
    /// New display label.
    #[serde(default)]
    pub app_name: Option<String>,
    /// New slug.
    #[serde(default)]
    pub slug: Option<String>,
}

/// External-app operations for one deployment.
#[derive(Debug)]
pub struct ExternalAppService<S: AppStore> {
    allocator: Allocator,
    store: S,
    default_instance_type: String,
}

impl<S: AppStore> ExternalAppService<S> {
    /// Creates a service over `allocator` and `store`.
    pub fn new(allocator: Allocator, store: S, default_instance_type: impl Into<String>) -> Self {
        Self {
            allocator,
            store,
            default_instance_type: default_instance_type.into(),
        }
    }

    /// The allocator in use.
    pub const fn allocator(&self) -> &Allocator {
        &self.allocator
    }

    /// The backing store.
    pub const fn store(&self) -> &S {
        &self.store
    }

    /// App types a new record may use, as `(key, label)` pairs.
    pub fn instance_type_choices(&self) -> Vec<(String, String)> {
        self.allocator.registry().choices()
    }

    /// All external apps of `course`.
    pub fn list(&self, course: CourseId) -> ExternalAppsResult<Vec<ExternalApp>> {
        self.store.list_for_course(course)
    }

    /// Fetches one external app.
    pub fn get(&self, id: AppId) -> ExternalAppsResult<ExternalApp> {
        self.store.get(id)
    }

    /// Allocates an instance for a new app and stores it.
    ///
    /// If the store rejects the record, the reserved slot is released again.
    pub fn add(&self, course: CourseId, input: NewExternalApp) -> ExternalAppsResult<ExternalApp> {
        let instance_type = input
            .instance_type
            .unwrap_or_else(|| self.default_instance_type.clone());
        let mut record = ExternalApp::new(course, input.app_name, input.slug, instance_type);

        let decision = self
            .allocator
            .validate(&record, RecordState::New, &self.store)?;
        self.allocator.apply(&mut record, decision)?;

        if let Err(err) = self.store.insert(&mut record) {
            tracing::warn!(slug = %record.slug, %err, "store rejected external app, releasing slot");
            if let Err(release_err) = self.allocator.release(&record) {
                tracing::error!(slug = %record.slug, %release_err, "failed to release instance slot");
            }
            return Err(err);
        }
        tracing::info!(id = ?record.id, %course, slug = %record.slug, "external app added");
        Ok(record)
    }

    /// Renames or re-slugs a stored app without touching its instance.
    pub fn edit(&self, id: AppId, changes: ExternalAppChanges) -> ExternalAppsResult<ExternalApp> {
        let mut record = self.store.get(id)?;
        if let Some(app_name) = changes.app_name {
            record.app_name = app_name;
        }
        if let Some(slug) = changes.slug {
            record.slug = slug;
        }

        match self
            .allocator
            .validate(&record, RecordState::Existing, &self.store)?
        {
            Decision::Keep => {}
            decision @ Decision::Allocate { .. } => {
                self.allocator.discard(decision);
                return Err(ExternalAppsError::AllocationFailed(format!(
                    "edit of external app {id} attempted a new allocation"
                )));
            }
        }
        self.store.update(&record)?;
        Ok(record)
    }

    /// Deletes an app and returns its slot to the backend.
    ///
    /// The record is gone even if the release fails; the failure is logged.
    pub fn delete(&self, id: AppId) -> ExternalAppsResult<ExternalApp> {
        let record = self.store.delete(id)?;
        if let Err(err) = self.allocator.release(&record) {
            tracing::error!(id, slug = %record.slug, %err, "failed to release instance slot");
        }
        Ok(record)
    }

    /// Records that the external system finished provisioning an app.
    pub fn confirm_created(&self, id: AppId) -> ExternalAppsResult<ExternalApp> {
        let mut record = self.store.get(id)?;
        Allocator::confirm_created(&mut record)?;
        self.store.update(&record)?;
        Ok(record)
    }

    /// Records that provisioning of an app failed.
    pub fn mark_error(&self, id: AppId) -> ExternalAppsResult<ExternalApp> {
        let mut record = self.store.get(id)?;
        Allocator::mark_error(&mut record)?;
        self.store.update(&record)?;
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::Instance;
    use crate::backends::PooledBackend;
    use crate::model::Status;
    use crate::allocator::SlugIndex;
    use crate::registry::BackendRegistry;
    use crate::store::InMemoryStore;
    use crate::validators::SlugValidator;
    use std::net::{IpAddr, Ipv4Addr};
    use std::sync::Arc;

    /// Refuses every write.
    #[derive(Debug, Default)]
    struct ReadOnlyStore;

    impl SlugIndex for ReadOnlyStore {
        fn slug_taken(&self, _slug: &str, _except: Option<AppId>) -> bool {
            false
        }
    }

    impl AppStore for ReadOnlyStore {
        fn insert(&self, _record: &mut ExternalApp) -> ExternalAppsResult<AppId> {
            Err(ExternalAppsError::ConfigurationError("read-only store".into()))
        }

        fn update(&self, _record: &ExternalApp) -> ExternalAppsResult<()> {
            Err(ExternalAppsError::ConfigurationError("read-only store".into()))
        }

        fn get(&self, id: AppId) -> ExternalAppsResult<ExternalApp> {
            Err(ExternalAppsError::DoesNotExist(format!("external app {id}")))
        }

        fn delete(&self, id: AppId) -> ExternalAppsResult<ExternalApp> {
            Err(ExternalAppsError::DoesNotExist(format!("external app {id}")))
        }

        fn list_for_course(&self, _course: CourseId) -> ExternalAppsResult<Vec<ExternalApp>> {
            Ok(Vec::new())
        }
    }

    fn allocator(capacity: usize) -> Allocator {
        let host = Instance::new(
            IpAddr::V4(Ipv4Addr::new(10, 0, 0, 5)),
            "https://askbot.example.com",
        );
        let mut registry = BackendRegistry::new();
        registry
            .register(Arc::new(PooledBackend::new("askbot", vec![(host, capacity)])))
            .unwrap();
        registry.populate().unwrap();
        Allocator::new(Arc::new(registry), SlugValidator::new(["admin"]))
    }

    fn service(capacity: usize) -> ExternalAppService<InMemoryStore> {
        ExternalAppService::new(allocator(capacity), InMemoryStore::new(), "askbot")
    }

    fn input(slug: &str) -> NewExternalApp {
        NewExternalApp {
            app_name: "Q&A".into(),
            slug: slug.into(),
            instance_type: None,
        }
    }

    fn reserved(service: &ExternalAppService<InMemoryStore>) -> usize {
        service.allocator().registry().lookup("askbot").unwrap().reserved()
    }

    #[test]
    fn test_add_uses_default_type() {
        let service = service(2);
        let app = service.add(CourseId(1), input("phys101")).unwrap();
        assert_eq!(app.instance_type, "askbot");
        assert_eq!(app.status, Status::InProgress);
        assert_eq!(app.id, Some(1));
        assert_eq!(service.list(CourseId(1)).unwrap(), vec![app]);
    }

    #[test]
    fn test_add_duplicate_slug_keeps_capacity() {
        let service = service(2);
        service.add(CourseId(1), input("phys101")).unwrap();
        let err = service.add(CourseId(2), input("phys101")).unwrap_err();
        assert!(matches!(err, ExternalAppsError::DuplicateSlug(_)));
        assert_eq!(reserved(&service), 1);
    }

    #[test]
    fn test_add_rejected_by_store_releases_once() {
        let service = ExternalAppService::new(allocator(1), ReadOnlyStore, "askbot");
        let backend = service.allocator().registry().lookup("askbot").unwrap();
        for slug in ["phys101", "phys102", "phys103"] {
            assert!(matches!(
                service.add(CourseId(1), input(slug)),
                Err(ExternalAppsError::ConfigurationError(_))
            ));
            assert_eq!(backend.reserved(), 0);
        }
    }

    #[test]
    fn test_edit_does_not_reallocate() {
        let service = service(1);
        let app = service.add(CourseId(1), input("phys101")).unwrap();
        let edited = service
            .edit(
                app.id.unwrap(),
                ExternalAppChanges {
                    app_name: Some("Forum".into()),
                    slug: Some("physics-101".into()),
                },
            )
            .unwrap();
        assert_eq!(edited.app_name, "Forum");
        assert_eq!(edited.url().unwrap(), "https://askbot.example.com/physics-101");
        assert_eq!(edited.ip_address, app.ip_address);
        assert_eq!(reserved(&service), 1);
    }

    #[test]
    fn test_edit_rejects_forbidden_slug() {
        let service = service(1);
        let app = service.add(CourseId(1), input("phys101")).unwrap();
        let id = app.id.unwrap();
        let err = service
            .edit(
                id,
                ExternalAppChanges {
                    slug: Some("admin".into()),
                    ..ExternalAppChanges::default()
                },
            )
            .unwrap_err();
        assert_eq!(err.field(), Some("slug"));
        assert_eq!(service.get(id).unwrap().slug, "phys101");
    }

    #[test]
    fn test_delete_releases_slot() {
        let service = service(1);
        let app = service.add(CourseId(1), input("phys101")).unwrap();
        assert!(matches!(
            service.add(CourseId(1), input("phys102")),
            Err(ExternalAppsError::NoInstancesAvailable(_))
        ));
        service.delete(app.id.unwrap()).unwrap();
        assert_eq!(reserved(&service), 0);
        assert!(service.add(CourseId(1), input("phys102")).is_ok());
    }

    #[test]
    fn test_delete_missing() {
        let service = service(1);
        assert!(matches!(
            service.delete(99),
            Err(ExternalAppsError::DoesNotExist(_))
        ));
    }

    #[test]
    fn test_confirm_created_and_mark_error() {
        let service = service(2);
        let app = service.add(CourseId(1), input("phys101")).unwrap();
        let confirmed = service.confirm_created(app.id.unwrap()).unwrap();
        assert_eq!(confirmed.status, Status::Created);
        assert_eq!(service.get(app.id.unwrap()).unwrap().status, Status::Created);
        assert!(service.mark_error(app.id.unwrap()).is_err());

        let other = service.add(CourseId(1), input("phys102")).unwrap();
        assert_eq!(
            service.mark_error(other.id.unwrap()).unwrap().status,
            Status::Error
        );
    }

    #[test]
    fn test_choices() {
        let service = service(1);
        assert_eq!(
            service.instance_type_choices(),
            vec![("askbot".to_string(), "askbot".to_string())]
        );
    }
}
