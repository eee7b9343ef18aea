//! Nested-Set Interval Arithmetic
//!
//! Pure computations behind the range mutations. The SQL in
//! `db::mutations` applies these offsets to whole row sets at once; nothing
//! here walks the tree recursively.
//!
//! All structural mutations keep the tree in canonical packing: bounds are
//! the integers `1..=2N`, each used exactly once. Reads are range scans and
//! writes renumber O(N) rows, which suits a hierarchy that is read far more
//! often than it is restructured.

use serde::{Deserialize, Serialize};

/// A closed interval `[left, right]` owned by one node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Span {
    pub left: i64,
    pub right: i64,
}

impl Span {
    pub fn new(left: i64, right: i64) -> Self {
        Self { left, right }
    }

    /// Bounds consumed by the node and its descendants (`2 × subtree size`)
    pub fn width(&self) -> i64 {
        self.right - self.left + 1
    }

    /// Number of nodes in the subtree, the node itself included
    pub fn subtree_size(&self) -> i64 {
        self.width() / 2
    }

    /// Strict containment: `other` is a proper descendant of `self`
    pub fn contains(&self, other: &Span) -> bool {
        self.left < other.left && other.right < self.right
    }

    /// `self` is `other` or one of its descendants
    pub fn is_within(&self, other: &Span) -> bool {
        other.left <= self.left && self.right <= other.right
    }

    /// Partial overlap, forbidden between any two nodes
    pub fn overlaps_partially(&self, other: &Span) -> bool {
        let disjoint = self.right < other.left || other.right < self.left;
        !disjoint && !self.is_within(other) && !other.is_within(self)
    }

    /// Offset that moves the subtree entirely below zero while it is detached
    ///
    /// Parked bounds land in `[left - right - 1, -1]`, so they never collide
    /// with live bounds and keep `left < right` row by row.
    pub fn park_offset(&self) -> i64 {
        -(self.right + 1)
    }

    /// Offset taking parked bounds to a new span starting at `insert_at`
    pub fn unpark_offset(&self, insert_at: i64) -> i64 {
        insert_at - self.left - self.park_offset()
    }
}

/// Span of a freshly created root in an empty tree
pub const ROOT_SPAN: Span = Span { left: 1, right: 2 };

/// Where a new last child of `parent` goes: right before the parent's closing bound
pub fn last_child_position(parent: &Span) -> i64 {
    parent.right
}

/// The canonical `right` bound of the root for a tree of `node_count` nodes
pub fn packed_max_right(node_count: i64) -> i64 {
    node_count * 2
}
