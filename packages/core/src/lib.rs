//! OrgUnit Core - Organizational Hierarchy Store
//!
//! This crate stores organizational-unit trees ("division → team → sub-team")
//! for authorization checks and admin tooling.
//!
//! # Architecture
//!
//! - **Nested-set model**: Each unit holds an interval `[left, right]`;
//!   interval containment is ancestry
//! - **Canonical packing**: After every committed mutation the bounds are
//!   exactly `1..=2N`
//! - **libsql**: Embedded SQLite-compatible database, WAL mode
//! - **Atomic mutations**: Each structural change is one serialized
//!   `BEGIN IMMEDIATE` transaction, rolled back on any failure
//!
//! # Modules
//!
//! - [`models`] - Data structures (`OrgUnit`, `UnitAttributes`)
//! - [`operations`] - Interval arithmetic and integrity verification
//! - [`db`] - Database layer (connection, transactions, range SQL)
//! - [`services`] - `HierarchyStore` contract and `HierarchyService`
//! - [`config`] - Store configuration

pub mod config;
pub mod db;
pub mod models;
pub mod operations;
pub mod services;

// Re-export commonly used types
pub use config::StoreConfig;
pub use models::*;
pub use operations::{IntegrityReport, Span};
pub use services::*;
