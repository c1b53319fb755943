//! Domain model for hierarchical model elements.
//!
//! # Responsibility
//! - Define the canonical element value returned to callers.
//! - Define the input shapes accepted from callers and their validation.
//! - Define listing filters and page read models.
//!
//! # Invariants
//! - Every element is identified by a server-assigned `ElementId`.
//! - Parent and child references are ids, never owning pointers.
//! - Server-owned fields (id, audit stamp, version) are never taken from input.

pub mod element;
pub mod query;
pub mod validation;
