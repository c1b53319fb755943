//! Core of the model element store.
//! Business invariants for element identity, hierarchy, audit, and
//! versioning live in this crate only.

pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod model;
pub mod service;
pub mod store;

pub use config::{
    ConfigError, DeletePolicy, HealthConfig, LoggingConfig, ModelStoreConfig, RepositoryConfig,
    StoreConfig,
};
pub use error::{ApiError, ConflictReason, ElementRef, ErrorCode, ErrorKind, RepoError, RepoResult};
pub use logging::{default_log_level, init_from_config, init_logging, logging_status, LoggingError};
pub use model::element::{
    AuditStamp, CreateElementInput, ElementId, ElementPatch, ModelElement, ServerOwnedFields,
};
pub use model::query::{ElementFilter, PageInfo, ParentScope, RequirementsPage};
pub use model::validation::ValidationError;
pub use service::audit::{AuditStamper, Clock};
pub use service::health::{HealthMonitor, HealthReport, HealthStatus};
pub use service::hierarchy::HierarchyInvariantEnforcer;
pub use service::pagination::{paginate, PageRequest};
pub use service::repository::{DeleteReport, ModelRepository};
pub use store::{
    HealthProbe, SqliteVersionedStore, StoreError, StoreHealth, StoreRead, StoreResult,
    StoreTransaction, VersionedStore,
};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
