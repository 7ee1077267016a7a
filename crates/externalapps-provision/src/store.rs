//! Persistence contract for external-app records.
//!
//! The provisioning core does not own storage. [`AppStore`] is what it needs
//! from whoever does; [`InMemoryStore`] is a complete implementation used by
//! tests and by deployments that keep records in process.

use std::collections::{BTreeMap, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use externalapps_core::{ExternalAppsError, ExternalAppsResult};

use crate::allocator::SlugIndex;
use crate::model::{AppId, CourseId, ExternalApp};

/// Storage operations the service layer relies on.
///
/// `insert` and `update` must reject a record whose status disagrees with its
/// connection details (see [`ExternalApp::check_invariants`]), and a slug used
/// by another record with `DuplicateSlug`, atomically with the write.
pub trait AppStore: SlugIndex + Send + Sync {
    /// Persists a new record, assigning and returning its id.
    fn insert(&self, record: &mut ExternalApp) -> ExternalAppsResult<AppId>;

    /// Overwrites a stored record.
    fn update(&self, record: &ExternalApp) -> ExternalAppsResult<()>;

    /// Fetches a record by id.
    fn get(&self, id: AppId) -> ExternalAppsResult<ExternalApp>;

    /// Removes and returns a record.
    fn delete(&self, id: AppId) -> ExternalAppsResult<ExternalApp>;

    /// All records of a course, in id order.
    fn list_for_course(&self, course: CourseId) -> ExternalAppsResult<Vec<ExternalApp>>;
}

#[derive(Debug, Default)]
struct Tables {
    next_id: AppId,
    records: BTreeMap<AppId, ExternalApp>,
    slugs: HashMap<String, AppId>,
}

/// An [`AppStore`] kept in memory.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    tables: RwLock<Tables>,
}

impl InMemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.read().map(|t| t.records.len()).unwrap_or(0)
    }

    /// Returns `true` if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read(&self) -> ExternalAppsResult<RwLockReadGuard<'_, Tables>> {
        self.tables.read().map_err(|_| poisoned())
    }

    fn write(&self) -> ExternalAppsResult<RwLockWriteGuard<'_, Tables>> {
        self.tables.write().map_err(|_| poisoned())
    }
}

fn poisoned() -> ExternalAppsError {
    tracing::error!("external app store lock poisoned");
    ExternalAppsError::ConfigurationError("store lock poisoned".into())
}

fn not_found(id: AppId) -> ExternalAppsError {
    ExternalAppsError::DoesNotExist(format!("external app {id}"))
}

impl SlugIndex for InMemoryStore {
    fn slug_taken(&self, slug: &str, except: Option<AppId>) -> bool {
        // insert and update re-check under the write lock.
        self.read()
            .map(|t| t.slugs.get(slug).is_some_and(|owner| Some(*owner) != except))
            .unwrap_or(false)
    }
}

impl AppStore for InMemoryStore {
    fn insert(&self, record: &mut ExternalApp) -> ExternalAppsResult<AppId> {
        if !record.is_new() {
            return Err(ExternalAppsError::ConfigurationError(format!(
                "record already stored with id {:?}",
                record.id
            )));
        }
        record.check_invariants()?;
        let mut tables = self.write()?;
        if tables.slugs.contains_key(&record.slug) {
            return Err(ExternalAppsError::DuplicateSlug(record.slug.clone()));
        }
        tables.next_id += 1;
        let id = tables.next_id;
        record.id = Some(id);
        tables.slugs.insert(record.slug.clone(), id);
        tables.records.insert(id, record.clone());
        tracing::debug!(id, slug = %record.slug, "stored external app");
        Ok(id)
    }

    fn update(&self, record: &ExternalApp) -> ExternalAppsResult<()> {
        let id = record
            .id
            .ok_or_else(|| ExternalAppsError::DoesNotExist("unsaved external app".into()))?;
        record.check_invariants()?;
        let mut tables = self.write()?;
        if tables.slugs.get(&record.slug).is_some_and(|owner| *owner != id) {
            return Err(ExternalAppsError::DuplicateSlug(record.slug.clone()));
        }
        let old_slug = tables
            .records
            .get(&id)
            .map(|old| old.slug.clone())
            .ok_or_else(|| not_found(id))?;
        if old_slug != record.slug {
            tables.slugs.remove(&old_slug);
            tables.slugs.insert(record.slug.clone(), id);
        }
        tables.records.insert(id, record.clone());
        Ok(())
    }

    fn get(&self, id: AppId) -> ExternalAppsResult<ExternalApp> {
        self.read()?.records.get(&id).cloned().ok_or_else(|| not_found(id))
    }

    fn delete(&self, id: AppId) -> ExternalAppsResult<ExternalApp> {
        let mut tables = self.write()?;
        let record = tables.records.remove(&id).ok_or_else(|| not_found(id))?;
        tables.slugs.remove(&record.slug);
        tracing::debug!(id, slug = %record.slug, "deleted external app");
        Ok(record)
    }

    fn list_for_course(&self, course: CourseId) -> ExternalAppsResult<Vec<ExternalApp>> {
        Ok(self
            .read()?
            .records
            .values()
            .filter(|r| r.course_id == course)
            .cloned()
            .collect())
    }
}
