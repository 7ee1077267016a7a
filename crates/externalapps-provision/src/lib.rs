//! # externalapps-provision
//!
//! Instance provisioning for course external apps. A [`BackendRegistry`] maps
//! app-type names to capacity-limited [`Backend`]s; the [`Allocator`] validates
//! a record, reserves an instance for it exactly once, and moves it from
//! `NotCreated` to `InProgress`.
//!
//! ## Module Overview
//!
//! - [`validators`] - Slug format and forbidden-word checks
//! - [`backend`] - The [`Backend`] capability and its error type
//! - [`backends`] - [`PooledBackend`], the configuration-driven backend
//! - [`registry`] - [`BackendRegistry`]
//! - [`model`] - The [`ExternalApp`] record and its [`Status`]
//! - [`allocator`] - The validate/apply state machine
//! - [`store`] - Persistence contract and [`InMemoryStore`]
//! - [`service`] - List/add/edit/delete flows over a store

pub mod allocator;
pub mod backend;
pub mod backends;
pub mod model;
pub mod registry;
pub mod service;
pub mod store;
pub mod validators;

// Re-export the most commonly used types at the crate root.
pub use allocator::{Allocator, Decision, NoSlugIndex, RecordState, SlugIndex};
pub use backend::{Backend, BackendError, Instance};
pub use backends::PooledBackend;
pub use model::{AppId, CourseId, ExternalApp, Status};
pub use registry::BackendRegistry;
pub use service::{ExternalAppChanges, ExternalAppService, NewExternalApp};
pub use store::{AppStore, InMemoryStore};
pub use validators::{validate_slug, SlugValidator, Validator};
