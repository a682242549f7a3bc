//! Entity hub domain model.
//!
//! # Responsibility
//! - Define entity variants, attribute tracking and remote record shapes.
//! - Define the operation records sent to the remote store.
//!
//! # Invariants
//! - Every entity is identified by a stable `EntityId`.
//! - Dirtiness is equality against the last-synced baseline.

pub mod attributes;
pub mod entity;
pub mod operation;
pub mod records;
pub mod tracked;
