//! Range Mutations on the Nested-Set Table
//!
//! Set-based renumbering statements. Each one rewrites both bounds of a row
//! in a single `UPDATE`, so the `CHECK (lft < rgt)` constraint holds row by
//! row while the statement runs. None of these functions begins or commits a
//! transaction; they are meant to be called on a write
//! [`TreeTransaction`](super::TreeTransaction).
//!
//! A detached subtree is parked below zero (see [`Span::park_offset`]). Every
//! live-range statement filters on positive thresholds, so parked rows are
//! never touched until [`unpark`] brings them back.

use crate::db::error::DatabaseError;
use crate::models::UnitAttributes;
use crate::operations::Span;
use libsql::Connection;

fn attributes_json(attrs: &UnitAttributes) -> Result<String, DatabaseError> {
    serde_json::to_string(&attrs.attributes).map_err(|e| {
        DatabaseError::sql_execution(format!("Failed to serialize attributes: {}", e))
    })
}

/// Insert a node row at `span`
pub async fn insert_unit(
    conn: &Connection,
    id: &str,
    attrs: &UnitAttributes,
    span: Span,
) -> Result<(), DatabaseError> {
    let attributes = attributes_json(attrs)?;

    conn.execute(
        "INSERT INTO org_units (id, name, lft, rgt, attributes) VALUES (?, ?, ?, ?, ?)",
        (id, attrs.name.as_str(), span.left, span.right, attributes.as_str()),
    )
    .await
    .map_err(|e| DatabaseError::from_libsql("Failed to insert org unit", e))?;

    Ok(())
}

/// Replace name and attributes of one row; bounds are untouched
///
/// Returns the number of rows affected (0 = no such node).
pub async fn update_attributes(
    conn: &Connection,
    id: &str,
    attrs: &UnitAttributes,
) -> Result<u64, DatabaseError> {
    let attributes = attributes_json(attrs)?;

    conn.execute(
        "UPDATE org_units SET name = ?, attributes = ?, modified_at = CURRENT_TIMESTAMP WHERE id = ?",
        (attrs.name.as_str(), attributes.as_str(), id),
    )
    .await
    .map_err(|e| DatabaseError::from_libsql("Failed to update org unit", e))
}

/// Open a `width`-wide gap starting at bound `at`
///
/// Every `left >= at` and every `right >= at` grows by `width`. Called with
/// the parent's `right`, this makes room for a new last child.
pub async fn open_gap(conn: &Connection, at: i64, width: i64) -> Result<u64, DatabaseError> {
    conn.execute(
        "UPDATE org_units SET
            lft = CASE WHEN lft >= ?1 THEN lft + ?2 ELSE lft END,
            rgt = rgt + ?2,
            modified_at = CURRENT_TIMESTAMP
         WHERE rgt >= ?1",
        (at, width),
    )
    .await
    .map_err(|e| DatabaseError::from_libsql("Failed to open gap", e))
}

/// Close the hole left behind by a removed span
///
/// Every bound to the right of `removed.right` shrinks by the span's width.
pub async fn close_gap(conn: &Connection, removed: &Span) -> Result<u64, DatabaseError> {
    conn.execute(
        "UPDATE org_units SET
            lft = CASE WHEN lft > ?1 THEN lft - ?2 ELSE lft END,
            rgt = rgt - ?2,
            modified_at = CURRENT_TIMESTAMP
         WHERE rgt > ?1",
        (removed.right, removed.width()),
    )
    .await
    .map_err(|e| DatabaseError::from_libsql("Failed to close gap", e))
}

/// Delete every row inside `span` (the node and its descendants)
pub async fn delete_span(conn: &Connection, span: &Span) -> Result<u64, DatabaseError> {
    conn.execute(
        "DELETE FROM org_units WHERE lft >= ?1 AND rgt <= ?2",
        (span.left, span.right),
    )
    .await
    .map_err(|e| DatabaseError::from_libsql("Failed to delete subtree", e))
}

/// Delete one node and promote its descendants by one level
///
/// Descendants shift left by 1 (they lose the removed opening bound), nodes
/// after the removed closing bound shift by 2. Returns the number of
/// renumbered rows.
pub async fn delete_and_promote(
    conn: &Connection,
    id: &str,
    span: &Span,
) -> Result<u64, DatabaseError> {
    let deleted = conn
        .execute("DELETE FROM org_units WHERE id = ?", [id])
        .await
        .map_err(|e| DatabaseError::from_libsql("Failed to delete org unit", e))?;
    if deleted != 1 {
        return Err(DatabaseError::sql_execution(format!(
            "Expected to delete exactly one row for {}, deleted {}",
            id, deleted
        )));
    }

    conn.execute(
        "UPDATE org_units SET
            lft = CASE WHEN lft > ?2 THEN lft - 2 WHEN lft > ?1 THEN lft - 1 ELSE lft END,
            rgt = CASE WHEN rgt > ?2 THEN rgt - 2 WHEN rgt > ?1 THEN rgt - 1 ELSE rgt END,
            modified_at = CURRENT_TIMESTAMP
         WHERE rgt > ?1",
        (span.left, span.right),
    )
    .await
    .map_err(|e| DatabaseError::from_libsql("Failed to promote children", e))
}

/// Detach the subtree at `span` by moving its bounds below zero
pub async fn park(conn: &Connection, span: &Span) -> Result<u64, DatabaseError> {
    conn.execute(
        "UPDATE org_units SET lft = lft + ?3, rgt = rgt + ?3, modified_at = CURRENT_TIMESTAMP
         WHERE lft >= ?1 AND rgt <= ?2",
        (span.left, span.right, span.park_offset()),
    )
    .await
    .map_err(|e| DatabaseError::from_libsql("Failed to detach subtree", e))
}

/// Bring every parked row back into the live range, shifted by `offset`
pub async fn unpark(conn: &Connection, offset: i64) -> Result<u64, DatabaseError> {
    conn.execute(
        "UPDATE org_units SET lft = lft + ?1, rgt = rgt + ?1, modified_at = CURRENT_TIMESTAMP
         WHERE lft < 0",
        [offset],
    )
    .await
    .map_err(|e| DatabaseError::from_libsql("Failed to re-attach subtree", e))
}
