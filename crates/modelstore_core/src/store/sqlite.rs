//! SQLite-backed versioned store adapter.
//!
//! # Responsibility
//! - Implement `VersionedStore` over one writer connection and, for file
//!   databases, one read-only WAL reader connection.
//! - Keep SQL and `rusqlite` error details inside this module.
//!
//! # Invariants
//! - The writer mutex is the single serialization point for mutations.
//! - Every transaction runs `BEGIN IMMEDIATE` and ends in `COMMIT` or
//!   `ROLLBACK`, including when the guard is dropped mid-flight.
//! - `created_at`/`created_by` are written on insert only.
//! - Sibling order is `sort_order ASC, seq ASC`; listing order is `seq ASC`.

use super::{
    ElementRecord, HealthProbe, StoreError, StoreHealth, StoreRead, StoreResult,
    StoreTransaction, VersionedStore,
};
use crate::config::StoreConfig;
use crate::db::migrations::{current_user_version, latest_version};
use crate::db::{open_db, open_db_in_memory, open_reader, DbError};
use crate::model::element::{AuditStamp, ElementId};
use crate::model::query::{ElementFilter, ParentScope};
use log::{debug, warn};
use rusqlite::types::Value;
use rusqlite::{ffi, params, params_from_iter, Connection, ErrorCode, OptionalExtension, Row};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, TryLockError};
use std::time::Duration;
use uuid::Uuid;

const ELEMENT_SELECT_SQL: &str = "SELECT
    id,
    req_id,
    name,
    text,
    parent_id,
    sort_order,
    created_at,
    created_by,
    updated_at,
    updated_by,
    version
FROM model_elements";

impl From<rusqlite::Error> for StoreError {
    fn from(value: rusqlite::Error) -> Self {
        match &value {
            rusqlite::Error::SqliteFailure(failure, _) => match failure.code {
                ErrorCode::DatabaseBusy
                | ErrorCode::DatabaseLocked
                | ErrorCode::CannotOpen
                | ErrorCode::SystemIoFailure
                | ErrorCode::PermissionDenied
                | ErrorCode::DiskFull
                | ErrorCode::ReadOnly
                | ErrorCode::FileLockingProtocolFailed => Self::Unavailable(value.to_string()),
                // RAISE() inside a trigger is a store-side abort, not a data conflict.
                ErrorCode::ConstraintViolation
                    if failure.extended_code == ffi::SQLITE_CONSTRAINT_TRIGGER =>
                {
                    Self::Backend(value.to_string())
                }
                ErrorCode::ConstraintViolation => Self::Constraint(value.to_string()),
                ErrorCode::DatabaseCorrupt | ErrorCode::NotADatabase => {
                    Self::InvalidData(value.to_string())
                }
                _ => Self::Backend(value.to_string()),
            },
            rusqlite::Error::FromSqlConversionFailure(..)
            | rusqlite::Error::InvalidColumnType(..)
            | rusqlite::Error::IntegralValueOutOfRange(..) => Self::InvalidData(value.to_string()),
            _ => Self::Backend(value.to_string()),
        }
    }
}

impl From<DbError> for StoreError {
    fn from(value: DbError) -> Self {
        match value {
            DbError::Sqlite(err) => err.into(),
            other => Self::Unavailable(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum StoreLocation {
    Memory,
    File(PathBuf),
}

impl StoreLocation {
    fn label(&self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::File(_) => "file",
        }
    }
}

/// SQLite-backed versioned store.
///
/// In-memory stores have no separate reader: snapshots share the writer
/// connection and therefore wait for an in-flight write to finish.
pub struct SqliteVersionedStore {
    writer: Mutex<Connection>,
    reader: Option<Mutex<Connection>>,
    location: StoreLocation,
}

impl SqliteVersionedStore {
    /// Opens the store described by `config`.
    pub fn open(config: &StoreConfig) -> StoreResult<Self> {
        match &config.path {
            Some(path) => Self::open_file(path, config.busy_timeout()),
            None => Self::open_in_memory(),
        }
    }

    /// Opens a private in-memory store with the schema applied.
    pub fn open_in_memory() -> StoreResult<Self> {
        let writer = open_db_in_memory()?;
        Ok(Self {
            writer: Mutex::new(writer),
            reader: None,
            location: StoreLocation::Memory,
        })
    }

    /// Opens (or creates) a file store with the schema applied.
    pub fn open_file(path: impl AsRef<Path>, busy_timeout: Duration) -> StoreResult<Self> {
        let path = path.as_ref().to_path_buf();
        let writer = open_db(&path, busy_timeout)?;
        let reader = open_reader(&path, busy_timeout)?;
        Ok(Self {
            writer: Mutex::new(writer),
            reader: Some(Mutex::new(reader)),
            location: StoreLocation::File(path),
        })
    }

    /// Database file path, or `None` for in-memory stores.
    pub fn path(&self) -> Option<&Path> {
        match &self.location {
            StoreLocation::Memory => None,
            StoreLocation::File(path) => Some(path.as_path()),
        }
    }

    fn read_connection(&self) -> &Mutex<Connection> {
        self.reader.as_ref().unwrap_or(&self.writer)
    }
}

impl HealthProbe for SqliteVersionedStore {
    fn health(&self) -> StoreHealth {
        let labelled = |health: StoreHealth| {
            health
                .with_detail("backend", "sqlite")
                .with_detail("mode", self.location.label())
        };

        // Probe must not queue behind a long write; a held lock means alive.
        let conn = match self.read_connection().try_lock() {
            Ok(conn) => conn,
            Err(TryLockError::WouldBlock) => {
                return labelled(StoreHealth::up().with_detail("connection", "busy"));
            }
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
        };

        let latest = latest_version();
        match current_user_version(&conn) {
            Ok(version) if version == latest => labelled(
                StoreHealth::up().with_detail("schema_version", version.to_string()),
            ),
            Ok(version) => labelled(StoreHealth::down(format!(
                "schema version {version} does not match expected {latest}"
            ))),
            Err(err) => labelled(StoreHealth::down(StoreError::from(err).to_string())),
        }
    }
}

impl VersionedStore for SqliteVersionedStore {
    type Snapshot<'a>
        = SqliteSnapshot<'a>
    where
        Self: 'a;
    type Tx<'a>
        = SqliteTransaction<'a>
    where
        Self: 'a;

    fn snapshot(&self) -> StoreResult<Self::Snapshot<'_>> {
        let conn = lock_connection(self.read_connection(), "reader");
        conn.execute_batch("BEGIN DEFERRED;")?;
        Ok(SqliteSnapshot { conn })
    }

    fn begin(&self) -> StoreResult<Self::Tx<'_>> {
        let conn = lock_connection(&self.writer, "writer");
        conn.execute_batch("BEGIN IMMEDIATE;")?;
        debug!("event=store_tx module=store status=begin");
        Ok(SqliteTransaction {
            conn,
            finished: false,
        })
    }
}

/// Read view over committed state.
pub struct SqliteSnapshot<'a> {
    conn: MutexGuard<'a, Connection>,
}

impl Drop for SqliteSnapshot<'_> {
    fn drop(&mut self) {
        if self.conn.is_autocommit() {
            return;
        }
        if let Err(err) = self.conn.execute_batch("ROLLBACK;") {
            warn!(
                "event=store_snapshot module=store status=error action=release error={}",
                err
            );
        }
    }
}

impl StoreRead for SqliteSnapshot<'_> {
    fn get(&self, id: ElementId) -> StoreResult<Option<ElementRecord>> {
        load_record(&self.conn, id)
    }

    fn find_id_by_req_id(&self, req_id: &str) -> StoreResult<Option<ElementId>> {
        find_id_by_req_id(&self.conn, req_id)
    }

    fn child_ids(&self, parent_id: ElementId) -> StoreResult<Vec<ElementId>> {
        list_child_ids(&self.conn, parent_id)
    }

    fn next_sort_order(&self, parent_id: Option<ElementId>) -> StoreResult<i64> {
        next_sort_order(&self.conn, parent_id)
    }

    fn list_ids(&self, filter: &ElementFilter) -> StoreResult<Vec<ElementId>> {
        list_ids(&self.conn, filter)
    }
}

/// Write transaction holding the writer lock until commit or rollback.
pub struct SqliteTransaction<'a> {
    conn: MutexGuard<'a, Connection>,
    finished: bool,
}

impl Drop for SqliteTransaction<'_> {
    fn drop(&mut self) {
        if self.finished || self.conn.is_autocommit() {
            return;
        }
        match self.conn.execute_batch("ROLLBACK;") {
            Ok(()) => warn!("event=store_tx module=store status=rolled_back reason=dropped"),
            Err(err) => warn!(
                "event=store_tx module=store status=error action=rollback reason=dropped error={}",
                err
            ),
        }
    }
}

impl StoreRead for SqliteTransaction<'_> {
    fn get(&self, id: ElementId) -> StoreResult<Option<ElementRecord>> {
        load_record(&self.conn, id)
    }

    fn find_id_by_req_id(&self, req_id: &str) -> StoreResult<Option<ElementId>> {
        find_id_by_req_id(&self.conn, req_id)
    }

    fn child_ids(&self, parent_id: ElementId) -> StoreResult<Vec<ElementId>> {
        list_child_ids(&self.conn, parent_id)
    }

    fn next_sort_order(&self, parent_id: Option<ElementId>) -> StoreResult<i64> {
        next_sort_order(&self.conn, parent_id)
    }

    fn list_ids(&self, filter: &ElementFilter) -> StoreResult<Vec<ElementId>> {
        list_ids(&self.conn, filter)
    }
}

impl StoreTransaction for SqliteTransaction<'_> {
    fn put(&mut self, record: &ElementRecord, expected_version: Option<i64>) -> StoreResult<()> {
        match expected_version {
            None => insert_record(&self.conn, record),
            Some(expected) => update_record(&self.conn, record, expected),
        }
    }

    fn remove(&mut self, id: ElementId, expected_version: i64) -> StoreResult<()> {
        let changed = self.conn.execute(
            "DELETE FROM model_elements
             WHERE id = ?1
               AND version = ?2;",
            params![id.to_string(), expected_version],
        )?;
        if changed == 0 {
            return Err(StoreError::VersionConflict {
                id,
                expected: Some(expected_version),
                actual: stored_version(&self.conn, id)?,
            });
        }
        Ok(())
    }

    fn commit(mut self) -> StoreResult<()> {
        self.conn.execute_batch("COMMIT;")?;
        self.finished = true;
        debug!("event=store_tx module=store status=commit");
        Ok(())
    }

    fn rollback(mut self) -> StoreResult<()> {
        self.finished = true;
        self.conn.execute_batch("ROLLBACK;")?;
        debug!("event=store_tx module=store status=rollback");
        Ok(())
    }
}

fn lock_connection<'a>(mutex: &'a Mutex<Connection>, role: &str) -> MutexGuard<'a, Connection> {
    match mutex.lock() {
        Ok(conn) => conn,
        Err(poisoned) => {
            // A panicking holder already rolled back through its guard's Drop;
            // make sure no transaction is left open before reuse.
            let conn = poisoned.into_inner();
            if !conn.is_autocommit() {
                if let Err(err) = conn.execute_batch("ROLLBACK;") {
                    warn!(
                        "event=store_lock module=store status=error role={} error={}",
                        role, err
                    );
                }
            }
            warn!("event=store_lock module=store status=recovered role={}", role);
            conn
        }
    }
}

fn insert_record(conn: &Connection, record: &ElementRecord) -> StoreResult<()> {
    if record.version != 1 {
        return Err(StoreError::InvalidData(format!(
            "new element {} must start at version 1, got {}",
            record.id, record.version
        )));
    }
    if let Some(actual) = stored_version(conn, record.id)? {
        return Err(StoreError::VersionConflict {
            id: record.id,
            expected: None,
            actual: Some(actual),
        });
    }

    conn.execute(
        "INSERT INTO model_elements (
            id,
            req_id,
            name,
            text,
            parent_id,
            sort_order,
            created_at,
            created_by,
            updated_at,
            updated_by,
            version
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11);",
        params![
            record.id.to_string(),
            record.req_id.as_deref(),
            record.name.as_str(),
            record.text.as_str(),
            record.parent_id.map(|value| value.to_string()),
            record.sort_order,
            record.audit.created_at,
            record.audit.created_by.as_str(),
            record.audit.updated_at,
            record.audit.updated_by.as_str(),
            record.version,
        ],
    )?;
    Ok(())
}

fn update_record(conn: &Connection, record: &ElementRecord, expected: i64) -> StoreResult<()> {
    if record.version != expected + 1 {
        return Err(StoreError::InvalidData(format!(
            "element {} must advance from version {expected} to {}, got {}",
            record.id,
            expected + 1,
            record.version
        )));
    }

    let changed = conn.execute(
        "UPDATE model_elements
         SET req_id = ?2,
             name = ?3,
             text = ?4,
             parent_id = ?5,
             sort_order = ?6,
             updated_at = ?7,
             updated_by = ?8,
             version = ?9
         WHERE id = ?1
           AND version = ?10;",
        params![
            record.id.to_string(),
            record.req_id.as_deref(),
            record.name.as_str(),
            record.text.as_str(),
            record.parent_id.map(|value| value.to_string()),
            record.sort_order,
            record.audit.updated_at,
            record.audit.updated_by.as_str(),
            record.version,
            expected,
        ],
    )?;
    if changed == 0 {
        return Err(StoreError::VersionConflict {
            id: record.id,
            expected: Some(expected),
            actual: stored_version(conn, record.id)?,
        });
    }
    Ok(())
}

fn stored_version(conn: &Connection, id: ElementId) -> StoreResult<Option<i64>> {
    let version = conn
        .query_row(
            "SELECT version FROM model_elements WHERE id = ?1;",
            [id.to_string()],
            |row| row.get(0),
        )
        .optional()?;
    Ok(version)
}

fn load_record(conn: &Connection, id: ElementId) -> StoreResult<Option<ElementRecord>> {
    let mut stmt = conn.prepare_cached(&format!("{ELEMENT_SELECT_SQL} WHERE id = ?1;"))?;
    let mut rows = stmt.query([id.to_string()])?;
    if let Some(row) = rows.next()? {
        return Ok(Some(parse_element_row(row)?));
    }
    Ok(None)
}

fn find_id_by_req_id(conn: &Connection, req_id: &str) -> StoreResult<Option<ElementId>> {
    let value: Option<String> = conn
        .query_row(
            "SELECT id FROM model_elements WHERE req_id = ?1;",
            [req_id],
            |row| row.get(0),
        )
        .optional()?;
    value
        .map(|text| parse_uuid(&text, "model_elements.id"))
        .transpose()
}

fn list_child_ids(conn: &Connection, parent_id: ElementId) -> StoreResult<Vec<ElementId>> {
    let mut stmt = conn.prepare_cached(
        "SELECT id
         FROM model_elements
         WHERE parent_id = ?1
         ORDER BY sort_order ASC, seq ASC;",
    )?;
    let mut rows = stmt.query([parent_id.to_string()])?;
    let mut ids = Vec::new();
    while let Some(row) = rows.next()? {
        let value: String = row.get(0)?;
        ids.push(parse_uuid(&value, "model_elements.id")?);
    }
    Ok(ids)
}

fn next_sort_order(conn: &Connection, parent_id: Option<ElementId>) -> StoreResult<i64> {
    let next = match parent_id {
        Some(parent_id) => conn.query_row(
            "SELECT COALESCE(MAX(sort_order), -1) + 1
             FROM model_elements
             WHERE parent_id = ?1;",
            [parent_id.to_string()],
            |row| row.get(0),
        )?,
        None => conn.query_row(
            "SELECT COALESCE(MAX(sort_order), -1) + 1
             FROM model_elements
             WHERE parent_id IS NULL;",
            [],
            |row| row.get(0),
        )?,
    };
    Ok(next)
}

/// Parent scope is filtered in SQL; the keyword is matched in Rust so both
/// sides are folded by the same Unicode-aware `to_lowercase`.
fn list_ids(conn: &Connection, filter: &ElementFilter) -> StoreResult<Vec<ElementId>> {
    let mut sql = String::from("SELECT id, req_id, name, text FROM model_elements WHERE 1 = 1");
    let mut bind_values: Vec<Value> = Vec::new();

    match filter.parent {
        None => {}
        Some(ParentScope::Roots) => sql.push_str(" AND parent_id IS NULL"),
        Some(ParentScope::ChildrenOf(parent_id)) => {
            sql.push_str(" AND parent_id = ?");
            bind_values.push(Value::Text(parent_id.to_string()));
        }
    }
    sql.push_str(" ORDER BY seq ASC;");

    let keyword = filter.normalized_keyword();
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query(params_from_iter(bind_values))?;
    let mut ids = Vec::new();
    while let Some(row) = rows.next()? {
        if let Some(keyword) = keyword.as_deref() {
            let req_id: Option<String> = row.get(1)?;
            let name: String = row.get(2)?;
            let text: String = row.get(3)?;
            if !keyword_matches(keyword, [req_id.as_deref().unwrap_or(""), &name, &text]) {
                continue;
            }
        }
        let value: String = row.get(0)?;
        ids.push(parse_uuid(&value, "model_elements.id")?);
    }
    Ok(ids)
}

fn keyword_matches(keyword: &str, fields: [&str; 3]) -> bool {
    fields
        .iter()
        .any(|field| field.to_lowercase().contains(keyword))
}

fn parse_element_row(row: &Row<'_>) -> StoreResult<ElementRecord> {
    let id_text: String = row.get("id")?;
    let id = parse_uuid(&id_text, "model_elements.id")?;
    let parent_id = row
        .get::<_, Option<String>>("parent_id")?
        .map(|value| parse_uuid(&value, "model_elements.parent_id"))
        .transpose()?;

    let version: i64 = row.get("version")?;
    if version < 1 {
        return Err(StoreError::InvalidData(format!(
            "invalid version `{version}` in model_elements.version"
        )));
    }

    Ok(ElementRecord {
        id,
        req_id: row.get("req_id")?,
        name: row.get("name")?,
        text: row.get("text")?,
        parent_id,
        sort_order: row.get("sort_order")?,
        audit: AuditStamp {
            created_at: row.get("created_at")?,
            created_by: row.get("created_by")?,
            updated_at: row.get("updated_at")?,
            updated_by: row.get("updated_by")?,
        },
        version,
    })
}

fn parse_uuid(value: &str, column: &'static str) -> StoreResult<Uuid> {
    Uuid::parse_str(value)
        .map_err(|_| StoreError::InvalidData(format!("invalid uuid `{value}` in {column}")))
}
