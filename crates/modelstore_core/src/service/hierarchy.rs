//! Parent/child hierarchy invariant checks.
//!
//! # Responsibility
//! - Reject parent assignments that would make an element its own ancestor.
//! - Walk ancestor chains for callers that need a path to root.
//!
//! # Invariants
//! - Checks read through the caller's transaction, so the validated state is
//!   the state the mutation commits against.
//! - Walks are bounded by a visited set; a corrupt chain never loops.

use crate::error::{RepoError, RepoResult};
use crate::model::element::ElementId;
use crate::store::StoreRead;
use log::warn;
use std::collections::HashSet;

/// Validates proposed parent edges against the stored hierarchy.
#[derive(Debug, Clone, Copy, Default)]
pub struct HierarchyInvariantEnforcer;

impl HierarchyInvariantEnforcer {
    /// Fails `Cycle` when `candidate_parent_id` is `element_id` or one of its
    /// descendants, and `NotFound` when the candidate parent does not exist.
    pub fn validate<R: StoreRead + ?Sized>(
        &self,
        reader: &R,
        element_id: ElementId,
        candidate_parent_id: ElementId,
    ) -> RepoResult<()> {
        let cycle = || RepoError::Cycle {
            element_id,
            parent_id: candidate_parent_id,
        };

        if candidate_parent_id == element_id {
            return Err(cycle());
        }

        let mut visited = HashSet::new();
        let mut cursor = Some(candidate_parent_id);
        while let Some(current) = cursor {
            if current == element_id {
                return Err(cycle());
            }
            if !visited.insert(current) {
                warn!(
                    "event=hierarchy_check module=hierarchy status=error reason=existing_cycle node={}",
                    current
                );
                return Err(cycle());
            }
            let record = reader.get(current)?.ok_or_else(|| RepoError::not_found(current))?;
            cursor = record.parent_id;
        }
        Ok(())
    }

    /// Returns the ancestors of `element_id`, nearest first, ending at a root.
    pub fn ancestors<R: StoreRead + ?Sized>(
        &self,
        reader: &R,
        element_id: ElementId,
    ) -> RepoResult<Vec<ElementId>> {
        let start = reader
            .get(element_id)?
            .ok_or_else(|| RepoError::not_found(element_id))?;

        let mut chain = Vec::new();
        let mut visited = HashSet::from([element_id]);
        let mut cursor = start.parent_id;
        while let Some(current) = cursor {
            if !visited.insert(current) {
                return Err(RepoError::Unknown(format!(
                    "ancestor chain of {element_id} revisits {current}"
                )));
            }
            chain.push(current);
            let record = reader.get(current)?.ok_or_else(|| {
                RepoError::Unknown(format!("dangling parent reference {current}"))
            })?;
            cursor = record.parent_id;
        }
        Ok(chain)
    }
}
