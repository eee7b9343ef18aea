//! HierarchyStore Trait - Operation Contracts
//!
//! The admin-facing router (or any other caller) talks to the org-unit tree
//! through this trait. Authentication, authorization and HTTP mapping are
//! the caller's business; the store only guarantees tree structure.
//!
//! # Operation Summary
//!
//! | Operation                | Failure                                |
//! |--------------------------|----------------------------------------|
//! | `get_root_node`          | -                                      |
//! | `get_node_by_id`         | -                                      |
//! | `get_immediate_children` | NotFound                               |
//! | `get_all_children`       | NotFound                               |
//! | `get_nodes_by_name`      | -                                      |
//! | `create_root_node`       | Conflict (root exists)                 |
//! | `insert_node`            | NotFound                               |
//! | `update_node`            | NotFound                               |
//! | `delete_node`            | NotFound, InvalidOperation             |
//! | `delete_sub_tree`        | NotFound, InvalidOperation (no confirm)|
//! | `move_sub_tree_to`       | NotFound, InvalidOperation (cycle)     |
//!
//! Any structural mutation may also fail with a retryable Conflict when the
//! mutation lock cannot be taken in time, or with StorageFailure.
//!
//! # Examples
//!
//! ```rust,no_run
//! use orgunit_core::{HierarchyService, HierarchyStore, StoreConfig, UnitAttributes};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store: Arc<dyn HierarchyStore> =
//!         Arc::new(HierarchyService::open(StoreConfig::new("./data/orgunits.db")).await?);
//!
//!     let root = store.create_root_node(UnitAttributes::new("Org")).await?;
//!     let team = store.insert_node(&root, UnitAttributes::new("Platform")).await?;
//!     assert_eq!(store.get_immediate_children(&root).await?.len(), 1);
//!     # let _ = team;
//!     Ok(())
//! }
//! ```

use crate::models::{OrgUnit, UnitAttributes};
use crate::operations::IntegrityReport;
use crate::services::error::HierarchyError;
use async_trait::async_trait;

/// Nested-set hierarchy store
///
/// Implementations must be `Send + Sync`; one instance is shared by all
/// concurrent callers.
#[async_trait]
pub trait HierarchyStore: Send + Sync {
    //
    // QUERY ENGINE
    //

    /// The node without an ancestor, or `None` for an empty tree
    async fn get_root_node(&self) -> Result<Option<OrgUnit>, HierarchyError>;

    /// Look up one node; a missing id is `Ok(None)`, not an error
    async fn get_node_by_id(&self, id: &str) -> Result<Option<OrgUnit>, HierarchyError>;

    /// Direct children of `id` in sibling (ascending `left`) order
    async fn get_immediate_children(&self, id: &str) -> Result<Vec<OrgUnit>, HierarchyError>;

    /// Every descendant of `id` in pre-order (ascending `left`)
    async fn get_all_children(&self, id: &str) -> Result<Vec<OrgUnit>, HierarchyError>;

    /// Nodes whose name matches exactly, in ascending `left` order
    async fn get_nodes_by_name(&self, name: &str) -> Result<Vec<OrgUnit>, HierarchyError>;

    /// Nearest ancestor of `id`; `None` for the root
    async fn get_parent(&self, id: &str) -> Result<Option<OrgUnit>, HierarchyError>;

    async fn count_nodes(&self) -> Result<i64, HierarchyError>;

    //
    // RANGE MUTATIONS
    //

    /// Create the root of an empty tree and return its id
    async fn create_root_node(&self, attrs: UnitAttributes) -> Result<String, HierarchyError>;

    /// Add a node as the last child of `parent_id` and return its id
    async fn insert_node(
        &self,
        parent_id: &str,
        attrs: UnitAttributes,
    ) -> Result<String, HierarchyError>;

    /// Replace name and attributes; bounds are never touched
    async fn update_node(&self, id: &str, attrs: UnitAttributes) -> Result<(), HierarchyError>;

    /// Remove one node, promoting its children to its parent in order
    async fn delete_node(&self, id: &str) -> Result<(), HierarchyError>;

    /// Remove `id` and all its descendants; returns the number of removed nodes
    ///
    /// `confirm` must be `true`: the deletion is irreversible and unbounded.
    async fn delete_sub_tree(&self, id: &str, confirm: bool) -> Result<u64, HierarchyError>;

    /// Re-attach the subtree at `id` as the last child of `new_parent_id`
    async fn move_sub_tree_to(&self, id: &str, new_parent_id: &str)
        -> Result<(), HierarchyError>;

    //
    // MAINTENANCE
    //

    /// Liveness probe of the backing store
    async fn check(&self) -> Result<(), HierarchyError>;

    /// Full invariant sweep over one snapshot
    async fn verify_integrity(&self) -> Result<IntegrityReport, HierarchyError>;
}
