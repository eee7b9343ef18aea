//! Business Services
//!
//! This module contains the hierarchy store's service layer:
//!
//! - `HierarchyStore` - operation contracts presented to callers
//! - `HierarchyService` - libsql-backed implementation (locking, transactions, rules)
//! - `HierarchyError` - typed errors with coarse `ErrorKind` categories

pub mod error;
pub mod hierarchy_service;
pub mod hierarchy_store;

pub use error::{ErrorKind, HierarchyError};
pub use hierarchy_service::HierarchyService;
pub use hierarchy_store::HierarchyStore;
