//! The external-app record.
//!
//! [`ExternalApp`] is what the persistence layer stores and the presentation
//! layer shows. Connection details stay empty until the allocator fills them
//! in; from then on they are never re-allocated.

use std::fmt;
use std::net::IpAddr;

use externalapps_core::{ExternalAppsError, ExternalAppsResult};
use serde::{Deserialize, Serialize};

use crate::backend::Instance;

/// Identifier of the course that owns a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CourseId(pub u64);

impl fmt::Display for CourseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "course:{}", self.0)
    }
}

/// Identifier assigned to a record when it is first persisted.
pub type AppId = u64;

/// Creation status of an instance.
///
/// The numeric codes are the values stored by existing deployments.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    /// The external system confirmed the instance exists.
    Created,
    /// Nothing has been allocated yet.
    #[default]
    NotCreated,
    /// Connection details are assigned and the instance is being set up.
    InProgress,
    /// Provisioning failed.
    Error,
}

impl Status {
    /// All statuses, in storage-code order.
    pub const ALL: [Self; 4] = [Self::Created, Self::NotCreated, Self::InProgress, Self::Error];

    /// The stored numeric code.
    pub const fn code(self) -> i16 {
        match self {
            Self::Created => 1,
            Self::NotCreated => 2,
            Self::InProgress => 3,
            Self::Error => 4,
        }
    }

    /// Parses a stored numeric code.
    pub const fn from_code(code: i16) -> Option<Self> {
        match code {
            1 => Some(Self::Created),
            2 => Some(Self::NotCreated),
            3 => Some(Self::InProgress),
            4 => Some(Self::Error),
            _ => None,
        }
    }

    /// Human-readable label.
    pub const fn label(self) -> &'static str {
        match self {
            Self::Created => "Created",
            Self::NotCreated => "Not Created",
            Self::InProgress => "In Progress",
            Self::Error => "Error",
        }
    }

    /// Whether a record in this status must carry connection details.
    pub const fn requires_connection(self) -> bool {
        matches!(self, Self::Created | Self::InProgress)
    }

    /// Lifecycle edges: `NotCreated -> InProgress -> Created`, and
    /// `NotCreated | InProgress -> Error`.
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::NotCreated | Self::Error, Self::InProgress)
                | (Self::InProgress, Self::Created)
                | (Self::NotCreated | Self::InProgress, Self::Error)
        )
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A provisioned (or to-be-provisioned) external application of a course.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalApp {
    /// Assigned by the store on first save; `None` for unsaved records.
    pub id: Option<AppId>,
    /// Owning course.
    pub course_id: CourseId,
    /// Display label.
    pub app_name: String,
    /// Base URL of the instance, empty until allocation succeeds.
    pub base_url: String,
    /// Address of the instance, unset until allocation succeeds.
    pub ip_address: Option<IpAddr>,
    /// Unique path segment of the instance URL.
    pub slug: String,
    /// Creation status.
    pub status: Status,
    /// App type key used to pick a backend.
    pub instance_type: String,
}

impl ExternalApp {
    /// Creates an unsaved record with no connection details.
    ///
    /// # Examples
    ///
    /// ```
    /// use externalapps_provision::model::{CourseId, ExternalApp, Status};
    ///
    /// let app = ExternalApp::new(CourseId(7), "Course forum", "phys101", "askbot");
    /// assert_eq!(app.status, Status::NotCreated);
    /// assert!(app.is_new());
    /// assert!(app.url().is_none());
    /// ```
    pub fn new(
        course_id: CourseId,
        app_name: impl Into<String>,
        slug: impl Into<String>,
        instance_type: impl Into<String>,
    ) -> Self {
        Self {
            id: None,
            course_id,
            app_name: app_name.into(),
            base_url: String::new(),
            ip_address: None,
            slug: slug.into(),
            status: Status::NotCreated,
            instance_type: instance_type.into(),
        }
    }

    /// `true` until the store assigns an id.
    pub const fn is_new(&self) -> bool {
        self.id.is_none()
    }

    /// `true` once both connection fields are set.
    pub fn has_connection(&self) -> bool {
        self.ip_address.is_some() && !self.base_url.is_empty()
    }

    /// The connection details, if assigned.
    pub fn instance(&self) -> Option<Instance> {
        match self.ip_address {
            Some(ip) if !self.base_url.is_empty() => Some(Instance::new(ip, self.base_url.clone())),
            _ => None,
        }
    }

    /// The externally visible URL, `base_url + "/" + slug`.
    pub fn url(&self) -> Option<String> {
        if self.base_url.is_empty() {
            None
        } else {
            Some(format!("{}/{}", self.base_url, self.slug))
        }
    }

    /// Checks that the status agrees with the connection fields.
    pub fn check_invariants(&self) -> ExternalAppsResult<()> {
        if self.status.requires_connection() && !self.has_connection() {
            return Err(ExternalAppsError::InvalidTransition {
                from: Status::NotCreated.label().to_string(),
                to: self.status.label().to_string(),
            });
        }
        Ok(())
    }

    /// Moves to `next`, refusing edges outside the lifecycle.
    pub fn transition_to(&mut self, next: Status) -> ExternalAppsResult<()> {
        if !self.status.can_transition_to(next) {
            return Err(ExternalAppsError::InvalidTransition {
                from: self.status.label().to_string(),
                to: next.label().to_string(),
            });
        }
        if next.requires_connection() && !self.has_connection() {
            return Err(ExternalAppsError::InvalidTransition {
                from: self.status.label().to_string(),
                to: next.label().to_string(),
            });
        }
        self.status = next;
        Ok(())
    }
}

impl fmt::Display for ExternalApp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.ip_address {
            Some(ip) => write!(f, "{}:{ip}", self.app_name),
            None => write!(f, "{}:", self.app_name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn provisioned() -> ExternalApp {
        let mut app = ExternalApp::new(CourseId(1), "Forum", "phys101", "askbot");
        app.ip_address = Some(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 5)));
        app.base_url = "https://askbot.example.com".into();
        app.status = Status::InProgress;
        app
    }

    #[test]
    fn test_status_codes_round_trip() {
        for status in Status::ALL {
            assert_eq!(Status::from_code(status.code()), Some(status));
        }
        assert_eq!(Status::from_code(0), None);
        assert_eq!(Status::Created.code(), 1);
        assert_eq!(Status::NotCreated.code(), 2);
    }

    #[test]
    fn test_status_labels() {
        assert_eq!(Status::InProgress.to_string(), "In Progress");
        assert_eq!(Status::NotCreated.to_string(), "Not Created");
        assert_eq!(Status::default(), Status::NotCreated);
    }

    #[test]
    fn test_lifecycle_edges() {
        assert!(Status::NotCreated.can_transition_to(Status::InProgress));
        assert!(Status::InProgress.can_transition_to(Status::Created));
        assert!(Status::InProgress.can_transition_to(Status::Error));
        assert!(!Status::NotCreated.can_transition_to(Status::Created));
        assert!(!Status::Created.can_transition_to(Status::InProgress));
        assert!(!Status::Created.can_transition_to(Status::Error));
    }

    #[test]
    fn test_url() {
        let app = provisioned();
        assert_eq!(app.url().unwrap(), "https://askbot.example.com/phys101");
    }

    #[test]
    fn test_display() {
        assert_eq!(provisioned().to_string(), "Forum:10.0.0.5");
        assert_eq!(
            ExternalApp::new(CourseId(1), "Forum", "x", "askbot").to_string(),
            "Forum:"
        );
    }

    #[test]
    fn test_instance_requires_both_fields() {
        let mut app = provisioned();
        assert!(app.instance().is_some());
        app.base_url.clear();
        assert!(app.instance().is_none());
        assert!(!app.has_connection());
    }

    #[test]
    fn test_invariants() {
        assert!(provisioned().check_invariants().is_ok());
        let mut app = ExternalApp::new(CourseId(1), "Forum", "x", "askbot");
        assert!(app.check_invariants().is_ok());
        app.status = Status::Created;
        assert!(app.check_invariants().is_err());
    }

    #[test]
    fn test_transition_to() {
        let mut app = provisioned();
        app.transition_to(Status::Created).unwrap();
        assert_eq!(app.status, Status::Created);
        assert!(matches!(
            app.transition_to(Status::NotCreated),
            Err(ExternalAppsError::InvalidTransition { .. })
        ));

        let mut fresh = ExternalApp::new(CourseId(1), "Forum", "x", "askbot");
        assert!(fresh.transition_to(Status::InProgress).is_err());
        assert_eq!(fresh.status, Status::NotCreated);
    }

    #[test]
    fn test_serializes_for_presentation() {
        let json = serde_json::to_value(provisioned()).unwrap();
        assert_eq!(json["status"], "in_progress");
        assert_eq!(json["ip_address"], "10.0.0.5");
        assert_eq!(json["course_id"], 1);
    }
}
