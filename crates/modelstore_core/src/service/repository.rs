//! Model element repository use cases.
//!
//! # Responsibility
//! - Expose create, read, list, update, and delete over a `VersionedStore`.
//! - Run validation, audit stamping, and hierarchy checks for every mutation.
//!
//! # Invariants
//! - Input validation happens before a transaction is opened.
//! - Every mutation runs in exactly one store transaction; any failure
//!   before `commit` leaves the store unchanged.
//! - Hierarchy checks read through the mutation's own transaction.
//! - Names and text bodies are never logged.

use crate::config::{DeletePolicy, RepositoryConfig};
use crate::error::{ConflictReason, ElementRef, RepoError, RepoResult};
use crate::model::element::{
    CreateElementInput, ElementId, ElementPatch, ModelElement,
};
use crate::model::query::{ElementFilter, RequirementsPage};
use crate::model::validation::ValidationError;
use crate::service::audit::AuditStamper;
use crate::service::health::HealthMonitor;
use crate::service::hierarchy::HierarchyInvariantEnforcer;
use crate::service::pagination::{paginate, PageRequest};
use crate::store::{ElementRecord, HealthProbe, StoreRead, StoreTransaction, VersionedStore};
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Outcome of one delete call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteReport {
    /// Removed ids; descendants come before their ancestors.
    pub removed: Vec<ElementId>,
    /// Children moved to the deleted element's parent, in sibling order.
    pub reparented: Vec<ElementId>,
}

/// Repository facade over one versioned store.
pub struct ModelRepository<S: VersionedStore> {
    store: Arc<S>,
    config: RepositoryConfig,
    stamper: AuditStamper,
    hierarchy: HierarchyInvariantEnforcer,
    health_in_flight: Arc<AtomicBool>,
}

impl<S: VersionedStore> ModelRepository<S> {
    /// Creates a repository using the system clock for audit stamps.
    pub fn new(store: Arc<S>, config: RepositoryConfig) -> Self {
        Self::with_stamper(store, config, AuditStamper::default())
    }

    pub fn with_stamper(store: Arc<S>, config: RepositoryConfig, stamper: AuditStamper) -> Self {
        Self {
            store,
            config,
            stamper,
            hierarchy: HierarchyInvariantEnforcer,
            health_in_flight: Arc::default(),
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn delete_policy(&self) -> DeletePolicy {
        self.config.delete_policy
    }

    /// Creates one element at the end of its parent's children.
    ///
    /// # Errors
    /// - `Validation` for server-owned fields, blank name/actor, bad reqId.
    /// - `NotFound` when the requested parent does not exist.
    /// - `Conflict` when the reqId is already used.
    pub fn create(&self, input: CreateElementInput, actor: &str) -> RepoResult<ModelElement> {
        let started_at = Instant::now();
        let result = self.create_inner(input, actor);
        log_outcome("element_create", started_at, &result, |element| {
            format!("id={} version={}", element.id, element.version)
        });
        result
    }

    fn create_inner(&self, input: CreateElementInput, actor: &str) -> RepoResult<ModelElement> {
        let draft = input.into_draft()?;
        let audit = self.stamper.stamp_create(actor)?;

        self.in_transaction(|tx| {
            if let Some(req_id) = draft.req_id.as_deref() {
                if tx.find_id_by_req_id(req_id)?.is_some() {
                    return Err(RepoError::Conflict(ConflictReason::DuplicateReqId(
                        req_id.to_string(),
                    )));
                }
            }
            if let Some(parent_id) = draft.parent_id {
                if tx.get(parent_id)?.is_none() {
                    return Err(RepoError::not_found(parent_id));
                }
            }

            let record = ElementRecord {
                id: Uuid::new_v4(),
                req_id: draft.req_id,
                name: draft.name,
                text: draft.text,
                parent_id: draft.parent_id,
                sort_order: tx.next_sort_order(draft.parent_id)?,
                audit,
                version: 1,
            };
            tx.put(&record, None)?;
            Ok(record.into_element(Vec::new()))
        })
    }

    /// Loads one element by id.
    pub fn find_by_id(&self, id: ElementId) -> RepoResult<ModelElement> {
        let snapshot = self.store.snapshot()?;
        let record = snapshot.get(id)?.ok_or_else(|| RepoError::not_found(id))?;
        load_element(&snapshot, record)
    }

    /// Loads one element by its external reference code.
    pub fn find_by_req_id(&self, req_id: &str) -> RepoResult<ModelElement> {
        let req_id = req_id.trim();
        if req_id.is_empty() {
            return Err(ValidationError::BlankReqId.into());
        }
        let snapshot = self.store.snapshot()?;
        let not_found = || RepoError::NotFound(ElementRef::ReqId(req_id.to_string()));
        let id = snapshot.find_id_by_req_id(req_id)?.ok_or_else(not_found)?;
        let record = snapshot.get(id)?.ok_or_else(not_found)?;
        load_element(&snapshot, record)
    }

    /// Returns ancestor ids of `id`, nearest first.
    pub fn ancestors(&self, id: ElementId) -> RepoResult<Vec<ElementId>> {
        let snapshot = self.store.snapshot()?;
        self.hierarchy.ancestors(&snapshot, id)
    }

    /// Lists matching elements in creation order, one page at a time.
    ///
    /// # Errors
    /// - `Validation` when `page < 0` or `size <= 0`.
    pub fn list(&self, filter: &ElementFilter, page: i64, size: i64) -> RepoResult<RequirementsPage> {
        let request = PageRequest::new(page, size)?;
        let snapshot = self.store.snapshot()?;
        let ids = snapshot.list_ids(filter)?;
        let (page_ids, page_info) = paginate(&ids, request);

        let mut items = Vec::with_capacity(page_ids.len());
        for id in page_ids {
            let record = snapshot
                .get(id)?
                .ok_or_else(|| RepoError::Unknown(format!("listed element {id} vanished")))?;
            items.push(load_element(&snapshot, record)?);
        }
        Ok(RequirementsPage { items, page_info })
    }

    /// Applies `patch` when the stored version equals `expected_version`.
    ///
    /// # Errors
    /// - `Validation` for an empty patch, server-owned fields, blank values.
    /// - `NotFound` when the element or new parent does not exist.
    /// - `Conflict` when the stored version differs from `expected_version`.
    /// - `Cycle` when the new parent is the element or one of its descendants.
    pub fn update(
        &self,
        id: ElementId,
        patch: ElementPatch,
        expected_version: i64,
        actor: &str,
    ) -> RepoResult<ModelElement> {
        let started_at = Instant::now();
        let result = self.update_inner(id, patch, expected_version, actor);
        log_outcome("element_update", started_at, &result, |element| {
            format!("id={} version={}", element.id, element.version)
        });
        result
    }

    fn update_inner(
        &self,
        id: ElementId,
        patch: ElementPatch,
        expected_version: i64,
        actor: &str,
    ) -> RepoResult<ModelElement> {
        let changes = patch.into_changes()?;
        self.stamper.check_actor(actor)?;

        self.in_transaction(|tx| {
            let current = tx.get(id)?.ok_or_else(|| RepoError::not_found(id))?;
            if current.version != expected_version {
                return Err(RepoError::Conflict(ConflictReason::StaleVersion {
                    id,
                    expected: expected_version,
                    actual: Some(current.version),
                }));
            }

            let mut next = current.clone();
            if let Some(name) = changes.name {
                next.name = name;
            }
            if let Some(text) = changes.text {
                next.text = text;
            }
            if let Some(parent_id) = changes.parent_id {
                if parent_id != current.parent_id {
                    if let Some(candidate) = parent_id {
                        self.hierarchy.validate(&*tx, id, candidate)?;
                    }
                    next.parent_id = parent_id;
                    next.sort_order = tx.next_sort_order(parent_id)?;
                }
            }
            self.stamper.stamp_update(&mut next.audit, actor)?;
            next.version = bump_version(&current)?;

            tx.put(&next, Some(current.version))?;
            let children = tx.child_ids(id)?;
            Ok(next.into_element(children))
        })
    }

    /// Deletes one element according to the configured delete policy.
    ///
    /// # Errors
    /// - `NotFound` when the element does not exist.
    /// - `Conflict` when it has children and the policy is `reject`.
    pub fn delete(&self, id: ElementId, actor: &str) -> RepoResult<DeleteReport> {
        let started_at = Instant::now();
        let result = self.delete_inner(id, actor);
        let policy = self.config.delete_policy.as_str();
        log_outcome("element_delete", started_at, &result, |report| {
            format!(
                "id={} policy={} removed={} reparented={}",
                id,
                policy,
                report.removed.len(),
                report.reparented.len()
            )
        });
        result
    }

    fn delete_inner(&self, id: ElementId, actor: &str) -> RepoResult<DeleteReport> {
        self.stamper.check_actor(actor)?;

        self.in_transaction(|tx| {
            let target = tx.get(id)?.ok_or_else(|| RepoError::not_found(id))?;
            let children = tx.child_ids(id)?;

            let mut report = DeleteReport::default();
            match self.config.delete_policy {
                DeletePolicy::Reject if !children.is_empty() => {
                    return Err(RepoError::Conflict(ConflictReason::HasChildren {
                        id,
                        child_count: children.len(),
                    }));
                }
                DeletePolicy::Reject => {
                    tx.remove(id, target.version)?;
                    report.removed.push(id);
                }
                DeletePolicy::Cascade => {
                    for node in subtree_post_order(&*tx, id)? {
                        let record = tx.get(node)?.ok_or_else(|| RepoError::not_found(node))?;
                        tx.remove(node, record.version)?;
                        report.removed.push(node);
                    }
                }
                DeletePolicy::Reparent => {
                    let mut sort_order = tx.next_sort_order(target.parent_id)?;
                    for child_id in children {
                        let child = tx
                            .get(child_id)?
                            .ok_or_else(|| RepoError::not_found(child_id))?;
                        let mut moved = child.clone();
                        moved.parent_id = target.parent_id;
                        moved.sort_order = sort_order;
                        self.stamper.stamp_update(&mut moved.audit, actor)?;
                        moved.version = bump_version(&child)?;
                        tx.put(&moved, Some(child.version))?;
                        report.reparented.push(child_id);
                        sort_order += 1;
                    }
                    tx.remove(id, target.version)?;
                    report.removed.push(id);
                }
            }
            Ok(report)
        })
    }

    /// Runs `work` in one store transaction: commits on `Ok`, rolls back on `Err`.
    fn in_transaction<'s, T>(
        &'s self,
        work: impl FnOnce(&mut S::Tx<'s>) -> RepoResult<T>,
    ) -> RepoResult<T> {
        let mut tx = self.store.begin()?;
        match work(&mut tx) {
            Ok(value) => {
                tx.commit()?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = tx.rollback() {
                    warn!(
                        "event=store_tx module=repository status=error action=rollback error={}",
                        rollback_err
                    );
                }
                Err(err)
            }
        }
    }
}

impl<S: VersionedStore + 'static> ModelRepository<S> {
    /// Returns a health monitor probing this repository's store.
    ///
    /// Monitors from one repository share a single in-flight probe slot.
    pub fn health_monitor(&self, timeout: Duration) -> HealthMonitor {
        let probe: Arc<dyn HealthProbe> = self.store.clone();
        HealthMonitor::sharing_flag(probe, timeout, Arc::clone(&self.health_in_flight))
    }
}

fn load_element<R: StoreRead + ?Sized>(reader: &R, record: ElementRecord) -> RepoResult<ModelElement> {
    let children = reader.child_ids(record.id)?;
    Ok(record.into_element(children))
}

fn bump_version(record: &ElementRecord) -> RepoResult<i64> {
    record.version.checked_add(1).ok_or_else(|| {
        RepoError::Unknown(format!("version of element {} overflowed", record.id))
    })
}

/// Descendants of `root` (children before parents), ending with `root`.
fn subtree_post_order<R: StoreRead + ?Sized>(reader: &R, root: ElementId) -> RepoResult<Vec<ElementId>> {
    let mut order = Vec::new();
    let mut visited = HashSet::from([root]);
    let mut stack = vec![(root, false)];
    while let Some((node, expanded)) = stack.pop() {
        if expanded {
            order.push(node);
            continue;
        }
        stack.push((node, true));
        for child in reader.child_ids(node)?.into_iter().rev() {
            if !visited.insert(child) {
                return Err(RepoError::Cycle {
                    element_id: root,
                    parent_id: child,
                });
            }
            stack.push((child, false));
        }
    }
    Ok(order)
}

fn log_outcome<T>(
    event: &str,
    started_at: Instant,
    result: &RepoResult<T>,
    describe: impl FnOnce(&T) -> String,
) {
    let duration_ms = started_at.elapsed().as_millis();
    match result {
        Ok(value) => info!(
            "event={} module=repository status=ok {} duration_ms={}",
            event,
            describe(value),
            duration_ms
        ),
        Err(err @ (RepoError::StoreUnavailable(_) | RepoError::Unknown(_))) => error!(
            "event={} module=repository status=error kind={:?} duration_ms={} error={}",
            event,
            err.kind(),
            duration_ms,
            err
        ),
        Err(err) => warn!(
            "event={} module=repository status=rejected kind={:?} duration_ms={}",
            event,
            err.kind(),
            duration_ms
        ),
    }
}
