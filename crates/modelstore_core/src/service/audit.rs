//! Audit provenance stamping.
//!
//! # Invariants
//! - `created_at`/`created_by` are set once by `stamp_create` and never
//!   touched again.
//! - `updated_at >= created_at` after every stamp, even if the clock steps
//!   backwards.
//! - Actors are trimmed and non-blank.

use crate::model::element::AuditStamp;
use crate::model::validation::ValidationError;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// Millisecond clock used for audit timestamps.
pub type Clock = Arc<dyn Fn() -> i64 + Send + Sync>;

/// Stamps creation and modification provenance.
#[derive(Clone)]
pub struct AuditStamper {
    clock: Clock,
}

impl Default for AuditStamper {
    fn default() -> Self {
        Self::with_clock(Arc::new(system_now_ms))
    }
}

impl AuditStamper {
    pub fn with_clock(clock: Clock) -> Self {
        Self { clock }
    }

    /// Returns a fresh stamp where created and updated values coincide.
    pub fn stamp_create(&self, actor: &str) -> Result<AuditStamp, ValidationError> {
        let actor = normalize_actor(actor)?;
        let now = (self.clock)();
        Ok(AuditStamp {
            created_at: now,
            created_by: actor.clone(),
            updated_at: now,
            updated_by: actor,
        })
    }

    /// Advances the modification half of `stamp`.
    pub fn stamp_update(&self, stamp: &mut AuditStamp, actor: &str) -> Result<(), ValidationError> {
        let actor = normalize_actor(actor)?;
        stamp.updated_at = (self.clock)().max(stamp.created_at);
        stamp.updated_by = actor;
        Ok(())
    }

    /// Validates an actor without stamping anything.
    pub fn check_actor(&self, actor: &str) -> Result<(), ValidationError> {
        normalize_actor(actor).map(|_| ())
    }
}

impl std::fmt::Debug for AuditStamper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditStamper").finish_non_exhaustive()
    }
}

fn normalize_actor(actor: &str) -> Result<String, ValidationError> {
    let trimmed = actor.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::BlankActor);
    }
    Ok(trimmed.to_string())
}

fn system_now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX))
}
