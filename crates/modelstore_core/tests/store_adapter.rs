use modelstore_core::db::migrations::latest_version;
use modelstore_core::db::{open_db, open_reader, DbError};
use modelstore_core::{
    AuditStamp, CreateElementInput, DeletePolicy, ElementFilter, HealthProbe, ModelRepository,
    RepoError, RepositoryConfig, SqliteVersionedStore, StoreConfig, StoreRead, StoreTransaction,
    VersionedStore,
};
use modelstore_core::store::ElementRecord;
use rusqlite::Connection;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

fn file_store(path: &Path) -> SqliteVersionedStore {
    SqliteVersionedStore::open(&StoreConfig {
        path: Some(path.to_path_buf()),
        ..StoreConfig::default()
    })
    .unwrap()
}

fn record(name: &str) -> ElementRecord {
    ElementRecord {
        id: Uuid::new_v4(),
        req_id: None,
        name: name.to_string(),
        text: String::new(),
        parent_id: None,
        sort_order: 0,
        audit: AuditStamp {
            created_at: 1,
            created_by: "tester".to_string(),
            updated_at: 1,
            updated_by: "tester".to_string(),
        },
        version: 1,
    }
}

fn column_names(conn: &Connection, table: &str) -> Vec<String> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table});")).unwrap();
    let mut rows = stmt.query([]).unwrap();
    let mut columns = Vec::new();
    while let Some(row) = rows.next().unwrap() {
        let column_name: String = row.get(1).unwrap();
        columns.push(column_name);
    }
    columns
}

#[test]
fn file_store_provisions_schema() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("elements.sqlite3");
    let store = file_store(&path);
    assert_eq!(store.path(), Some(path.as_path()));

    let conn = Connection::open(&path).unwrap();
    let version: u32 = conn
        .query_row("PRAGMA user_version;", [], |row| row.get(0))
        .unwrap();
    assert_eq!(version, latest_version());
    let columns = column_names(&conn, "model_elements");
    for expected in [
        "seq",
        "id",
        "req_id",
        "name",
        "text",
        "parent_id",
        "sort_order",
        "created_at",
        "created_by",
        "updated_at",
        "updated_by",
        "version",
    ] {
        assert!(columns.contains(&expected.to_string()), "missing {expected}");
    }
}

#[test]
fn reopening_file_store_keeps_elements() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("elements.sqlite3");
    let created = {
        let repo = ModelRepository::new(Arc::new(file_store(&path)), RepositoryConfig::default());
        repo.create(CreateElementInput::new("Persisted").with_req_id("REQ-9"), "alice")
            .unwrap()
    };

    let repo = ModelRepository::new(Arc::new(file_store(&path)), RepositoryConfig::default());
    assert_eq!(repo.find_by_req_id("REQ-9").unwrap(), created);
}

#[test]
fn snapshot_does_not_see_uncommitted_writes() {
    let dir = tempfile::tempdir().unwrap();
    let store = file_store(&dir.path().join("elements.sqlite3"));
    let element = record("pending");

    let mut tx = store.begin().unwrap();
    tx.put(&element, None).unwrap();
    assert!(tx.get(element.id).unwrap().is_some());
    {
        let snapshot = store.snapshot().unwrap();
        assert!(snapshot.get(element.id).unwrap().is_none());
        assert!(snapshot.list_ids(&ElementFilter::default()).unwrap().is_empty());
    }
    tx.commit().unwrap();

    let snapshot = store.snapshot().unwrap();
    assert_eq!(snapshot.get(element.id).unwrap(), Some(element));
}

#[test]
fn explicit_rollback_discards_writes() {
    let store = SqliteVersionedStore::open_in_memory().unwrap();
    let element = record("discarded");

    let mut tx = store.begin().unwrap();
    tx.put(&element, None).unwrap();
    tx.rollback().unwrap();

    assert!(store.snapshot().unwrap().get(element.id).unwrap().is_none());
}

#[test]
fn injected_failure_mid_delete_leaves_store_unchanged() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("elements.sqlite3");
    let repo = ModelRepository::new(
        Arc::new(file_store(&path)),
        RepositoryConfig {
            delete_policy: DeletePolicy::Reparent,
        },
    );
    let parent = repo.create(CreateElementInput::new("Parent"), "alice").unwrap();
    let first = repo
        .create(CreateElementInput::new("First").with_parent(parent.id), "alice")
        .unwrap();
    let second = repo
        .create(CreateElementInput::new("Second").with_parent(parent.id), "alice")
        .unwrap();

    // Children are moved before the parent row is removed; fail the removal.
    let saboteur = Connection::open(&path).unwrap();
    saboteur
        .execute_batch(
            "CREATE TRIGGER fail_element_delete
             BEFORE DELETE ON model_elements
             BEGIN
                 SELECT RAISE(ABORT, 'injected failure');
             END;",
        )
        .unwrap();
    drop(saboteur);

    let err = repo.delete(parent.id, "bob").unwrap_err();
    assert!(matches!(err, RepoError::Unknown(_)), "{err:?}");
    assert_eq!(modelstore_core::ApiError::from(&err).code, "INTERNAL_ERROR");

    let parent_after = repo.find_by_id(parent.id).unwrap();
    assert_eq!(parent_after.children, vec![first.id, second.id]);
    for child in [&first, &second] {
        let after = repo.find_by_id(child.id).unwrap();
        assert_eq!(after.parent_id, Some(parent.id));
        assert_eq!(after.version, 1);
        assert_eq!(after.audit.updated_by, "alice");
    }
}

#[test]
fn reader_refuses_unmigrated_database() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("blank.sqlite3");
    Connection::open(&path).unwrap();

    let err = open_reader(&path, Duration::from_millis(100)).unwrap_err();
    match err {
        DbError::SchemaNotReady { expected, actual } => {
            assert_eq!(expected, latest_version());
            assert_eq!(actual, 0);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn writer_refuses_newer_schema() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("future.sqlite3");
    let conn = Connection::open(&path).unwrap();
    conn.execute_batch("PRAGMA user_version = 999;").unwrap();
    drop(conn);

    let err = open_db(&path, Duration::from_millis(100)).unwrap_err();
    assert!(matches!(
        err,
        DbError::SchemaTooNew {
            found: 999,
            ..
        }
    ));
}

#[test]
fn file_store_health_reports_mode() {
    let dir = tempfile::tempdir().unwrap();
    let store = file_store(&dir.path().join("elements.sqlite3"));
    let health = store.health();
    assert!(health.up);
    assert_eq!(health.details.get("mode").map(String::as_str), Some("file"));
    assert_eq!(
        health.details.get("schema_version"),
        Some(&latest_version().to_string())
    );
}
