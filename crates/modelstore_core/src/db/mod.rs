//! SQLite storage bootstrap and schema migration entry points.
//!
//! # Responsibility
//! - Open and configure SQLite connections for the model store.
//! - Apply schema migrations in deterministic order.
//!
//! # Invariants
//! - Migration version is tracked via `PRAGMA user_version`.
//! - Store code must not read/write element data before migrations succeed.
//! - `DbError` stays inside the store boundary; `store` translates it.

use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod migrations;
mod open;

pub use open::{open_db, open_db_in_memory, open_reader};

pub type DbResult<T> = Result<T, DbError>;

/// Connection bootstrap and migration failures.
#[derive(Debug)]
pub enum DbError {
    /// Driver-level failure while opening, configuring, or migrating.
    Sqlite(rusqlite::Error),
    /// Database was migrated by a newer build; it is never downgraded.
    SchemaTooNew { found: u32, supported: u32 },
    /// File database refused write-ahead logging.
    JournalMode {
        requested: &'static str,
        actual: String,
    },
    /// Reader connection opened before the writer migrated the schema.
    SchemaNotReady { expected: u32, actual: u32 },
}

impl Display for DbError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sqlite(err) => write!(f, "sqlite: {err}"),
            Self::SchemaTooNew { found, supported } => write!(
                f,
                "model store schema v{found} was written by a newer build (this build knows up to v{supported})"
            ),
            Self::JournalMode { requested, actual } => {
                write!(f, "journal mode `{requested}` rejected, database uses `{actual}`")
            }
            Self::SchemaNotReady { expected, actual } => write!(
                f,
                "reader requires schema version {expected}, database is at {actual}"
            ),
        }
    }
}

impl Error for DbError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        if let Self::Sqlite(err) = self {
            return Some(err);
        }
        None
    }
}

impl From<rusqlite::Error> for DbError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}
