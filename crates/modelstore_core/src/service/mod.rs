//! Repository use cases and the policies they compose.
//!
//! # Responsibility
//! - Orchestrate store transactions into create/read/update/delete/list.
//! - Keep audit, hierarchy, and paging rules independent of the store.

pub mod audit;
pub mod health;
pub mod hierarchy;
pub mod pagination;
pub mod repository;
