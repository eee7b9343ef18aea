//! Tree Integrity Verification
//!
//! A single pass over all nodes sorted by `left`, with an explicit stack of
//! open ancestors instead of recursion. Checks, in order of detection:
//!
//! 1. `left < right` for every node
//! 2. no partial overlap between any two intervals
//! 3. exactly one node without an ancestor
//! 4. canonical packing: the bounds are exactly `1..=2N`, each used once
//!
//! Sibling contiguity (every gap inside a parent is covered by a child)
//! follows from 2 and 4 together.

use crate::operations::ranges::{packed_max_right, Span};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// First invariant violation found during a sweep
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Node {node_id}: {detail}")]
pub struct IntegrityViolation {
    pub node_id: String,
    pub detail: String,
}

impl IntegrityViolation {
    fn new(node_id: &str, detail: impl Into<String>) -> Self {
        Self {
            node_id: node_id.to_string(),
            detail: detail.into(),
        }
    }
}

/// Summary of a successful sweep
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntegrityReport {
    pub node_count: usize,
    /// Depth of the deepest node (the root has depth 0)
    pub max_depth: usize,
    pub root_id: Option<String>,
}

/// Verify the invariants over `(id, span)` pairs sorted by ascending `left`
pub fn verify_spans(nodes: &[(String, Span)]) -> Result<IntegrityReport, IntegrityViolation> {
    let max_right = packed_max_right(nodes.len() as i64);
    let mut seen = vec![false; (max_right + 1) as usize];
    let mut open: Vec<Span> = Vec::new();
    let mut max_depth = 0;
    let mut root_id = None;

    for (id, span) in nodes {
        if span.left >= span.right {
            return Err(IntegrityViolation::new(
                id,
                format!("left {} is not below right {}", span.left, span.right),
            ));
        }

        while open.last().is_some_and(|top| top.right < span.left) {
            open.pop();
        }

        match open.last() {
            Some(parent) if !parent.contains(span) => {
                return Err(IntegrityViolation::new(
                    id,
                    format!(
                        "[{}, {}] partially overlaps [{}, {}]",
                        span.left, span.right, parent.left, parent.right
                    ),
                ));
            }
            None if root_id.is_some() => {
                return Err(IntegrityViolation::new(id, "second node without an ancestor"));
            }
            None => root_id = Some(id.clone()),
            Some(_) => {}
        }

        max_depth = max_depth.max(open.len());
        open.push(*span);

        for bound in [span.left, span.right] {
            if bound < 1 || bound > max_right {
                return Err(IntegrityViolation::new(
                    id,
                    format!("bound {} outside packed range 1..={}", bound, max_right),
                ));
            }
            let slot = &mut seen[bound as usize];
            if *slot {
                return Err(IntegrityViolation::new(
                    id,
                    format!("bound {} used more than once", bound),
                ));
            }
            *slot = true;
        }
    }

    Ok(IntegrityReport {
        node_count: nodes.len(),
        max_depth,
        root_id,
    })
}
