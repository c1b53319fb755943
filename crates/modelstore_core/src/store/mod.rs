//! Versioned store adapter contracts.
//!
//! # Responsibility
//! - Define the only seam between repository logic and the persistent store.
//! - Provide scoped write transactions with compare-and-swap `put`.
//! - Provide read snapshots that never observe uncommitted writes.
//!
//! # Invariants
//! - Store-specific error types never cross this boundary; every failure is a
//!   `StoreError`.
//! - A transaction dropped without `commit` rolls back.
//! - `put` with an expected version only succeeds when the stored version
//!   equals it.
//! - Child ids are always returned in sibling order (`sort_order`, then
//!   creation order).

use crate::model::element::{AuditStamp, ElementId, ModelElement};
use crate::model::query::ElementFilter;
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod sqlite;

pub use sqlite::SqliteVersionedStore;

/// Result type used by store adapter operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Store failures, already stripped of backend error types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Store cannot be reached, is locked out, or is shutting down.
    Unavailable(String),
    /// Compare-and-swap failed. `actual` is `None` when the record is gone,
    /// `expected` is `None` for inserts of an id that already exists.
    VersionConflict {
        id: ElementId,
        expected: Option<i64>,
        actual: Option<i64>,
    },
    /// Uniqueness or referential constraint rejected the write.
    Constraint(String),
    /// Persisted data cannot be converted to a valid record.
    InvalidData(String),
    /// Any other backend failure.
    Backend(String),
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unavailable(message) => write!(f, "store unavailable: {message}"),
            Self::VersionConflict {
                id,
                expected,
                actual,
            } => write!(
                f,
                "version conflict on {id}: expected {}, found {}",
                describe_version(*expected),
                describe_version(*actual)
            ),
            Self::Constraint(message) => write!(f, "store constraint violated: {message}"),
            Self::InvalidData(message) => write!(f, "invalid persisted element data: {message}"),
            Self::Backend(message) => write!(f, "store backend failure: {message}"),
        }
    }
}

impl Error for StoreError {}

fn describe_version(version: Option<i64>) -> String {
    version.map_or_else(|| "none".to_string(), |value| value.to_string())
}

/// Persisted record shape of one element, keyed by `id`.
///
/// Children are not stored on the record; they are derived from the
/// `parent_id`/`sort_order` of other records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementRecord {
    pub id: ElementId,
    pub req_id: Option<String>,
    pub name: String,
    pub text: String,
    pub parent_id: Option<ElementId>,
    /// Position among siblings under `parent_id`.
    pub sort_order: i64,
    pub audit: AuditStamp,
    pub version: i64,
}

impl ElementRecord {
    /// Converts a record plus its ordered child ids into the domain value.
    pub fn into_element(self, children: Vec<ElementId>) -> ModelElement {
        ModelElement {
            id: self.id,
            req_id: self.req_id,
            name: self.name,
            text: self.text,
            parent_id: self.parent_id,
            children,
            audit: self.audit,
            version: self.version,
        }
    }
}

/// Store liveness as reported by the adapter itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreHealth {
    pub up: bool,
    pub details: BTreeMap<String, String>,
}

impl StoreHealth {
    pub fn up() -> Self {
        Self {
            up: true,
            details: BTreeMap::new(),
        }
    }

    pub fn down(cause: impl Into<String>) -> Self {
        let mut details = BTreeMap::new();
        details.insert("cause".to_string(), cause.into());
        Self { up: false, details }
    }

    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }
}

/// Liveness check exposed by a store adapter.
///
/// Object safe so the health monitor can hold an optional `Arc<dyn ...>` and
/// run it on a worker thread.
pub trait HealthProbe: Send + Sync {
    /// Reports store liveness. Must not panic for expected failures.
    fn health(&self) -> StoreHealth;
}

/// Read operations available both on snapshots and inside transactions.
pub trait StoreRead {
    /// Loads one record with its version.
    fn get(&self, id: ElementId) -> StoreResult<Option<ElementRecord>>;
    /// Resolves an external reference code to an element id.
    fn find_id_by_req_id(&self, req_id: &str) -> StoreResult<Option<ElementId>>;
    /// Lists direct child ids in sibling order.
    fn child_ids(&self, parent_id: ElementId) -> StoreResult<Vec<ElementId>>;
    /// Returns the sort order that appends after the last sibling.
    fn next_sort_order(&self, parent_id: Option<ElementId>) -> StoreResult<i64>;
    /// Lists ids matching `filter` in creation order.
    fn list_ids(&self, filter: &ElementFilter) -> StoreResult<Vec<ElementId>>;
}

/// Scoped write transaction.
pub trait StoreTransaction: StoreRead {
    /// Writes `record`. With `expected_version = None` the id must be new;
    /// otherwise the stored version must equal `expected_version`.
    fn put(&mut self, record: &ElementRecord, expected_version: Option<i64>) -> StoreResult<()>;
    /// Removes one record if its stored version equals `expected_version`.
    fn remove(&mut self, id: ElementId, expected_version: i64) -> StoreResult<()>;
    /// Commits all writes of this transaction.
    fn commit(self) -> StoreResult<()>;
    /// Discards all writes of this transaction.
    fn rollback(self) -> StoreResult<()>;
}

/// Versioned object store adapter.
pub trait VersionedStore: HealthProbe {
    type Snapshot<'a>: StoreRead
    where
        Self: 'a;
    type Tx<'a>: StoreTransaction
    where
        Self: 'a;

    /// Opens a consistent read view of committed state.
    fn snapshot(&self) -> StoreResult<Self::Snapshot<'_>>;
    /// Opens a write transaction. Writers are serialized.
    fn begin(&self) -> StoreResult<Self::Tx<'_>>;
}
