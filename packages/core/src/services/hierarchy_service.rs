//! HierarchyService - Nested-Set Store on libsql
//!
//! Implements [`HierarchyStore`] on top of [`DatabaseService`]. This is where
//! the hierarchy rules live: existence checks, the root and cycle guards, the
//! child-promotion policy of `delete_node`, and the transaction discipline.
//!
//! # Trade-off
//!
//! The nested-set encoding makes every read a range scan (no recursion, no
//! per-level round trips) at the price of O(N) renumbering on structural
//! writes. It assumes org-unit trees are read far more often than they are
//! restructured.
//!
//! # Concurrency
//!
//! - Structural mutations (`create_root_node`, `insert_node`, `delete_node`,
//!   `delete_sub_tree`, `move_sub_tree_to`) first take an in-process async
//!   mutex (bounded by `lock_timeout`), then open a `BEGIN IMMEDIATE`
//!   transaction (bounded by the SQLite busy timeout, which also covers other
//!   processes). Either wait expiring yields a retryable Conflict.
//! - `update_node` is a single-row statement and skips both locks.
//! - Reads run in one statement or one snapshot transaction, so they see a
//!   mutation entirely or not at all.
//! - Before commit every structural mutation verifies canonical packing; a
//!   failure rolls the whole transaction back.

use crate::config::StoreConfig;
use crate::db::{mutations, queries, DatabaseService, TreeTransaction};
use crate::models::{OrgUnit, UnitAttributes};
use crate::operations::ranges::last_child_position;
use crate::operations::{verify_spans, IntegrityReport, Span, ROOT_SPAN};
use crate::services::error::HierarchyError;
use crate::services::hierarchy_store::HierarchyStore;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, MutexGuard};
use uuid::Uuid;

/// Width of a freshly inserted leaf
const LEAF_WIDTH: i64 = 2;

/// Org-unit hierarchy service backed by libsql
pub struct HierarchyService {
    db: Arc<DatabaseService>,

    /// Serializes structural mutations issued through this instance
    mutation_lock: Mutex<()>,

    lock_timeout: Duration,
}

impl HierarchyService {
    /// Wrap an already opened database
    pub fn new(db: Arc<DatabaseService>, lock_timeout: Duration) -> Self {
        Self {
            db,
            mutation_lock: Mutex::new(()),
            lock_timeout,
        }
    }

    /// Validate `config`, open the database and initialize the schema
    pub async fn open(config: StoreConfig) -> Result<Self, HierarchyError> {
        config.validate().map_err(HierarchyError::InvalidConfig)?;

        let db = DatabaseService::open(&config).await?;
        Ok(Self::new(Arc::new(db), config.lock_timeout()))
    }

    pub fn database(&self) -> &Arc<DatabaseService> {
        &self.db
    }

    async fn acquire_mutation_lock(
        &self,
        operation: &str,
    ) -> Result<MutexGuard<'_, ()>, HierarchyError> {
        tokio::time::timeout(self.lock_timeout, self.mutation_lock.lock())
            .await
            .map_err(|_| {
                tracing::warn!(
                    "{} gave up waiting {:?} for the mutation lock",
                    operation,
                    self.lock_timeout
                );
                HierarchyError::LockTimeout {
                    context: operation.to_string(),
                }
            })
    }

    /// Commit `tx` if `result` is Ok and the tree is still packed; roll back otherwise
    async fn finish<T>(
        &self,
        tx: TreeTransaction,
        operation: &str,
        result: Result<T, HierarchyError>,
    ) -> Result<T, HierarchyError> {
        let result = match result {
            Ok(value) => ensure_packed(&tx).await.map(|_| value),
            Err(e) => Err(e),
        };

        match result {
            Ok(value) => {
                tx.commit().await?;
                Ok(value)
            }
            Err(e) => {
                tracing::warn!("{} rolled back: {}", operation, e);
                if let Err(rollback_err) = tx.rollback().await {
                    tracing::warn!("Rollback of {} failed: {}", operation, rollback_err);
                }
                Err(e)
            }
        }
    }

    /// Bounds of `id` or NotFound
    async fn require_span(conn: &libsql::Connection, id: &str) -> Result<Span, HierarchyError> {
        queries::get_span(conn, id)
            .await?
            .ok_or_else(|| HierarchyError::not_found(id))
    }

    async fn create_root_in(
        tx: &TreeTransaction,
        attrs: &UnitAttributes,
    ) -> Result<String, HierarchyError> {
        if let Some(root) = queries::get_root(tx).await? {
            return Err(HierarchyError::RootExists { root_id: root.id });
        }

        let id = Uuid::new_v4().to_string();
        mutations::insert_unit(tx, &id, attrs, ROOT_SPAN).await?;
        Ok(id)
    }

    async fn insert_in(
        tx: &TreeTransaction,
        parent_id: &str,
        attrs: &UnitAttributes,
    ) -> Result<(String, Span), HierarchyError> {
        let parent = Self::require_span(tx, parent_id).await?;
        let at = last_child_position(&parent);

        mutations::open_gap(tx, at, LEAF_WIDTH).await?;

        let id = Uuid::new_v4().to_string();
        let span = Span::new(at, at + LEAF_WIDTH - 1);
        mutations::insert_unit(tx, &id, attrs, span).await?;
        Ok((id, span))
    }

    async fn delete_node_in(tx: &TreeTransaction, id: &str) -> Result<u64, HierarchyError> {
        let span = Self::require_span(tx, id).await?;

        if queries::parent_of(tx, &span).await?.is_none() {
            let children = queries::immediate_children(tx, &span).await?;
            if children.len() > 1 {
                return Err(HierarchyError::invalid_operation(format!(
                    "Root {} has {} children; promoting them would leave several roots. \
                     Use delete_sub_tree or restructure first",
                    id,
                    children.len()
                )));
            }
        }

        Ok(mutations::delete_and_promote(tx, id, &span).await?)
    }

    async fn delete_sub_tree_in(
        tx: &TreeTransaction,
        id: &str,
        confirm: bool,
    ) -> Result<u64, HierarchyError> {
        let span = Self::require_span(tx, id).await?;

        if !confirm {
            return Err(HierarchyError::invalid_operation(format!(
                "Deleting the subtree of {} ({} nodes) requires explicit confirmation",
                id,
                span.subtree_size()
            )));
        }

        let removed = mutations::delete_span(tx, &span).await?;
        if removed as i64 != span.subtree_size() {
            return Err(HierarchyError::invariant_violation(format!(
                "Subtree of {} spans {} nodes but {} rows were removed",
                id,
                span.subtree_size(),
                removed
            )));
        }

        mutations::close_gap(tx, &span).await?;
        Ok(removed)
    }

    /// Returns `None` when the node already sits under `new_parent_id`
    async fn move_in(
        tx: &TreeTransaction,
        id: &str,
        new_parent_id: &str,
    ) -> Result<Option<u64>, HierarchyError> {
        let span = Self::require_span(tx, id).await?;
        let target = Self::require_span(tx, new_parent_id).await?;

        if id == new_parent_id || target.is_within(&span) {
            return Err(HierarchyError::cycle_detected(id, new_parent_id));
        }

        if let Some(parent) = queries::parent_of(tx, &span).await? {
            if parent.id == new_parent_id {
                return Ok(None);
            }
        }

        // Detach: park below zero, then close the hole it left
        let parked = mutations::park(tx, &span).await?;
        if parked as i64 != span.subtree_size() {
            return Err(HierarchyError::invariant_violation(format!(
                "Subtree of {} spans {} nodes but {} rows were detached",
                id,
                span.subtree_size(),
                parked
            )));
        }
        mutations::close_gap(tx, &span).await?;

        // Re-attach as last child; the target's bounds moved when the gap closed
        let target = Self::require_span(tx, new_parent_id).await?;
        let at = last_child_position(&target);
        mutations::open_gap(tx, at, span.width()).await?;
        mutations::unpark(tx, span.unpark_offset(at)).await?;

        Ok(Some(parked))
    }
}

/// Pre-commit packing check; cheap enough to run on every structural write
async fn ensure_packed(conn: &libsql::Connection) -> Result<(), HierarchyError> {
    let stats = queries::packing_stats(conn).await?;
    if stats.is_packed() {
        Ok(())
    } else {
        Err(HierarchyError::invariant_violation(format!(
            "bounds not canonically packed after mutation: {:?}",
            stats
        )))
    }
}

#[async_trait]
impl HierarchyStore for HierarchyService {
    async fn get_root_node(&self) -> Result<Option<OrgUnit>, HierarchyError> {
        let conn = self.db.connect_with_timeout().await?;
        Ok(queries::get_root(&conn).await?)
    }

    async fn get_node_by_id(&self, id: &str) -> Result<Option<OrgUnit>, HierarchyError> {
        let conn = self.db.connect_with_timeout().await?;
        Ok(queries::get_by_id(&conn, id).await?)
    }

    async fn get_immediate_children(&self, id: &str) -> Result<Vec<OrgUnit>, HierarchyError> {
        let tx = TreeTransaction::begin_read(&self.db).await?;
        let span = Self::require_span(&tx, id).await?;
        let children = queries::immediate_children(&tx, &span).await?;
        tx.commit().await?;

        tracing::debug!("get_immediate_children({}) -> {} nodes", id, children.len());
        Ok(children)
    }

    async fn get_all_children(&self, id: &str) -> Result<Vec<OrgUnit>, HierarchyError> {
        let tx = TreeTransaction::begin_read(&self.db).await?;
        let span = Self::require_span(&tx, id).await?;
        let descendants = queries::all_descendants(&tx, &span).await?;
        tx.commit().await?;

        tracing::debug!("get_all_children({}) -> {} nodes", id, descendants.len());
        Ok(descendants)
    }

    async fn get_nodes_by_name(&self, name: &str) -> Result<Vec<OrgUnit>, HierarchyError> {
        let conn = self.db.connect_with_timeout().await?;
        Ok(queries::by_name(&conn, name).await?)
    }

    async fn get_parent(&self, id: &str) -> Result<Option<OrgUnit>, HierarchyError> {
        let tx = TreeTransaction::begin_read(&self.db).await?;
        let span = Self::require_span(&tx, id).await?;
        let parent = queries::parent_of(&tx, &span).await?;
        tx.commit().await?;
        Ok(parent)
    }

    async fn count_nodes(&self) -> Result<i64, HierarchyError> {
        let conn = self.db.connect_with_timeout().await?;
        Ok(queries::count(&conn).await?)
    }

    async fn create_root_node(&self, attrs: UnitAttributes) -> Result<String, HierarchyError> {
        attrs.validate()?;

        let _guard = self.acquire_mutation_lock("create_root_node").await?;
        let tx = TreeTransaction::begin_write(&self.db).await?;
        let result = Self::create_root_in(&tx, &attrs).await;
        let id = self.finish(tx, "create_root_node", result).await?;

        tracing::info!("Created root org unit {} ('{}')", id, attrs.name);
        Ok(id)
    }

    async fn insert_node(
        &self,
        parent_id: &str,
        attrs: UnitAttributes,
    ) -> Result<String, HierarchyError> {
        attrs.validate()?;

        let _guard = self.acquire_mutation_lock("insert_node").await?;
        let tx = TreeTransaction::begin_write(&self.db).await?;
        let result = Self::insert_in(&tx, parent_id, &attrs).await;
        let (id, span) = self.finish(tx, "insert_node", result).await?;

        tracing::info!(
            "Inserted org unit {} under {} at [{}, {}]",
            id,
            parent_id,
            span.left,
            span.right
        );
        Ok(id)
    }

    async fn update_node(&self, id: &str, attrs: UnitAttributes) -> Result<(), HierarchyError> {
        attrs.validate()?;

        let conn = self.db.connect_with_timeout().await?;
        let updated = mutations::update_attributes(&conn, id, &attrs).await?;
        if updated == 0 {
            return Err(HierarchyError::not_found(id));
        }

        tracing::debug!("Updated attributes of org unit {}", id);
        Ok(())
    }

    async fn delete_node(&self, id: &str) -> Result<(), HierarchyError> {
        let _guard = self.acquire_mutation_lock("delete_node").await?;
        let tx = TreeTransaction::begin_write(&self.db).await?;
        let result = Self::delete_node_in(&tx, id).await;
        let renumbered = self.finish(tx, "delete_node", result).await?;

        tracing::info!("Deleted org unit {} ({} rows renumbered)", id, renumbered);
        Ok(())
    }

    async fn delete_sub_tree(&self, id: &str, confirm: bool) -> Result<u64, HierarchyError> {
        let _guard = self.acquire_mutation_lock("delete_sub_tree").await?;
        let tx = TreeTransaction::begin_write(&self.db).await?;
        let result = Self::delete_sub_tree_in(&tx, id, confirm).await;
        let removed = self.finish(tx, "delete_sub_tree", result).await?;

        tracing::info!("Deleted subtree of org unit {} ({} nodes)", id, removed);
        Ok(removed)
    }

    async fn move_sub_tree_to(
        &self,
        id: &str,
        new_parent_id: &str,
    ) -> Result<(), HierarchyError> {
        let _guard = self.acquire_mutation_lock("move_sub_tree_to").await?;
        let tx = TreeTransaction::begin_write(&self.db).await?;
        let result = Self::move_in(&tx, id, new_parent_id).await;

        match self.finish(tx, "move_sub_tree_to", result).await? {
            Some(moved) => tracing::info!(
                "Moved subtree of org unit {} ({} nodes) under {}",
                id,
                moved,
                new_parent_id
            ),
            None => tracing::debug!(
                "Org unit {} already sits under {}; nothing to move",
                id,
                new_parent_id
            ),
        }
        Ok(())
    }

    async fn check(&self) -> Result<(), HierarchyError> {
        Ok(self.db.check().await?)
    }

    async fn verify_integrity(&self) -> Result<IntegrityReport, HierarchyError> {
        let conn = self.db.connect_with_timeout().await?;
        let spans = queries::all_spans(&conn).await?;
        let report = verify_spans(&spans)?;

        tracing::debug!(
            "Integrity check passed: {} nodes, max depth {}",
            report.node_count,
            report.max_depth
        );
        Ok(report)
    }
}

// Comprehensive tests in separate module
#[cfg(test)]
#[path = "hierarchy_service_test.rs"]
mod hierarchy_service_test;
