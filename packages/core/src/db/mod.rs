//! Database Layer
//!
//! This module handles all database interactions using libsql:
//!
//! - Database initialization and connection management (`database`)
//! - Scoped read/write transactions (`transaction`)
//! - Range queries over the nested-set table (`queries`)
//! - Set-based bound renumbering (`mutations`)
//!
//! Hierarchy rules (what may be moved where, which errors callers see) live
//! in the service layer; this module only knows rows and bounds.

mod database;
mod error;
pub mod mutations;
pub mod queries;
mod transaction;

pub use database::DatabaseService;
pub use error::DatabaseError;
pub use queries::PackingStats;
pub use transaction::{TreeTransaction, TxMode};
