//! Service Layer Error Types
//!
//! This module defines the typed errors the hierarchy store surfaces to its
//! callers. Every variant maps onto one of four [`ErrorKind`]s so a router
//! can translate them without matching on individual variants.

use crate::db::DatabaseError;
use crate::models::ValidationError;
use crate::operations::IntegrityViolation;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Coarse error categories exposed to callers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Referenced node id does not exist
    NotFound,
    /// Structural precondition failed or the mutation lock was unavailable
    Conflict,
    /// The operation would corrupt the tree
    InvalidOperation,
    /// Backing store failure; the transaction was rolled back
    StorageFailure,
}

/// Hierarchy store errors
#[derive(Error, Debug)]
pub enum HierarchyError {
    /// Node not found by ID
    #[error("Node not found: {id}")]
    NotFound { id: String },

    /// `create_root_node` on a non-empty tree
    #[error("Tree already has a root node: {root_id}")]
    RootExists { root_id: String },

    /// Mutation lock not acquired in time; safe to retry
    #[error("Timed out waiting for the mutation lock: {context}")]
    LockTimeout { context: String },

    /// Operation rejected because it would break the tree structure
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    /// Move target lies inside the subtree being moved
    #[error("Cannot move {node_id} under {new_parent_id}: target is inside the moved subtree")]
    CycleDetected {
        node_id: String,
        new_parent_id: String,
    },

    /// Caller payload failed validation
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// Store configuration rejected before anything was opened
    #[error("Invalid store configuration: {0}")]
    InvalidConfig(String),

    /// Tree invariants do not hold
    #[error("Tree invariant violated: {0}")]
    InvariantViolation(String),

    /// Database operation failed
    #[error("Storage failure: {0}")]
    Storage(#[from] DatabaseError),
}

impl HierarchyError {
    /// Create a node not found error
    pub fn not_found(id: impl Into<String>) -> Self {
        Self::NotFound { id: id.into() }
    }

    /// Create an invalid operation error
    pub fn invalid_operation(msg: impl Into<String>) -> Self {
        Self::InvalidOperation(msg.into())
    }

    /// Create a cycle error
    pub fn cycle_detected(node_id: impl Into<String>, new_parent_id: impl Into<String>) -> Self {
        Self::CycleDetected {
            node_id: node_id.into(),
            new_parent_id: new_parent_id.into(),
        }
    }

    /// Create an invariant violation error
    pub fn invariant_violation(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::RootExists { .. } | Self::LockTimeout { .. } => ErrorKind::Conflict,
            Self::Storage(e) if e.is_busy() => ErrorKind::Conflict,
            Self::InvalidOperation(_)
            | Self::CycleDetected { .. }
            | Self::Validation(_)
            | Self::InvalidConfig(_) => ErrorKind::InvalidOperation,
            Self::InvariantViolation(_) | Self::Storage(_) => ErrorKind::StorageFailure,
        }
    }

    /// Whether the caller may retry the same call unchanged
    ///
    /// Only lock conflicts qualify. `RootExists` is a Conflict too, but
    /// retrying it cannot succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::LockTimeout { .. } => true,
            Self::Storage(e) => e.is_busy(),
            _ => false,
        }
    }
}

impl From<IntegrityViolation> for HierarchyError {
    fn from(violation: IntegrityViolation) -> Self {
        Self::InvariantViolation(violation.to_string())
    }
}
