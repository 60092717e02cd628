//! Domain model for the catalog: dynamic documents plus the statically
//! known table and field names they are built from.
//!
//! # Invariants
//! - Document keys equal persisted column names, except for the child
//!   collection `prices` and the keys added by folding (`amount`, `unit`).

pub mod actor;
pub mod audit;
pub mod document;
pub mod product;
pub mod user;
