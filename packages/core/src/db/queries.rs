//! Read Queries over the Nested-Set Table
//!
//! Every function takes a plain `libsql::Connection`; callers that need
//! several statements to agree pass a [`TreeTransaction`](super::TreeTransaction)
//! opened in read mode (it derefs to the connection).
//!
//! Subtree reads are range scans on `lft`. Immediate children are found by
//! walking sibling bounds: under canonical packing the first child starts at
//! `parent.left + 1` and each next sibling at `previous.right + 1`, so the
//! walk costs one indexed point lookup per child.

use crate::db::error::DatabaseError;
use crate::models::OrgUnit;
use crate::operations::Span;
use chrono::{DateTime, NaiveDateTime, Utc};
use libsql::{Connection, Row};
use serde_json::{Map, Value};

pub(crate) const UNIT_COLUMNS: &str = "id, name, lft, rgt, attributes, created_at, modified_at";

/// Parse timestamp from database - handles both SQLite and RFC3339 formats
///
/// SQLite CURRENT_TIMESTAMP returns: "YYYY-MM-DD HH:MM:SS"
fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, DatabaseError> {
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Ok(naive.and_utc());
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }

    Err(DatabaseError::sql_execution(format!(
        "Unable to parse timestamp '{}' as SQLite or RFC3339 format",
        s
    )))
}

/// Convert a row selected with [`UNIT_COLUMNS`] into an `OrgUnit`
fn row_to_unit(row: &Row) -> Result<OrgUnit, DatabaseError> {
    let decode = |what: &str, e: libsql::Error| {
        DatabaseError::sql_execution(format!("Failed to get {}: {}", what, e))
    };

    let id: String = row.get(0).map_err(|e| decode("id", e))?;
    let name: String = row.get(1).map_err(|e| decode("name", e))?;
    let left: i64 = row.get(2).map_err(|e| decode("lft", e))?;
    let right: i64 = row.get(3).map_err(|e| decode("rgt", e))?;
    let attributes_json: String = row.get(4).map_err(|e| decode("attributes", e))?;
    let created_at_str: String = row.get(5).map_err(|e| decode("created_at", e))?;
    let modified_at_str: String = row.get(6).map_err(|e| decode("modified_at", e))?;

    let attributes: Map<String, Value> = serde_json::from_str(&attributes_json).map_err(|e| {
        DatabaseError::sql_execution(format!("Failed to parse attributes of {}: {}", id, e))
    })?;

    Ok(OrgUnit {
        left,
        right,
        name,
        attributes,
        created_at: parse_timestamp(&created_at_str)?,
        modified_at: parse_timestamp(&modified_at_str)?,
        id,
    })
}

async fn collect_units(mut rows: libsql::Rows) -> Result<Vec<OrgUnit>, DatabaseError> {
    let mut units = Vec::new();
    while let Some(row) = rows
        .next()
        .await
        .map_err(|e| DatabaseError::from_libsql("Failed to read row", e))?
    {
        units.push(row_to_unit(&row)?);
    }
    Ok(units)
}

async fn fetch_one(
    conn: &Connection,
    sql: &str,
    params: impl libsql::params::IntoParams,
) -> Result<Option<OrgUnit>, DatabaseError> {
    let mut rows = conn
        .query(sql, params)
        .await
        .map_err(|e| DatabaseError::from_libsql("Failed to execute query", e))?;

    match rows
        .next()
        .await
        .map_err(|e| DatabaseError::from_libsql("Failed to read row", e))?
    {
        Some(row) => Ok(Some(row_to_unit(&row)?)),
        None => Ok(None),
    }
}

async fn fetch_i64(conn: &Connection, sql: &str) -> Result<Option<i64>, DatabaseError> {
    let mut rows = conn
        .query(sql, ())
        .await
        .map_err(|e| DatabaseError::from_libsql("Failed to execute query", e))?;
    let row = rows
        .next()
        .await
        .map_err(|e| DatabaseError::from_libsql("Failed to read row", e))?;

    match row {
        Some(row) => row
            .get::<Option<i64>>(0)
            .map_err(|e| DatabaseError::sql_execution(format!("Failed to read integer: {}", e))),
        None => Ok(None),
    }
}

/// The node with the smallest `left`, i.e. the root
pub async fn get_root(conn: &Connection) -> Result<Option<OrgUnit>, DatabaseError> {
    fetch_one(
        conn,
        &format!("SELECT {} FROM org_units ORDER BY lft ASC LIMIT 1", UNIT_COLUMNS),
        (),
    )
    .await
}

pub async fn get_by_id(conn: &Connection, id: &str) -> Result<Option<OrgUnit>, DatabaseError> {
    fetch_one(
        conn,
        &format!("SELECT {} FROM org_units WHERE id = ?", UNIT_COLUMNS),
        [id],
    )
    .await
}

/// Bounds of a node without decoding the whole row
pub async fn get_span(conn: &Connection, id: &str) -> Result<Option<Span>, DatabaseError> {
    let mut rows = conn
        .query("SELECT lft, rgt FROM org_units WHERE id = ?", [id])
        .await
        .map_err(|e| DatabaseError::from_libsql("Failed to look up bounds", e))?;

    match rows
        .next()
        .await
        .map_err(|e| DatabaseError::from_libsql("Failed to read row", e))?
    {
        Some(row) => {
            let left: i64 = row
                .get(0)
                .map_err(|e| DatabaseError::sql_execution(format!("Failed to get lft: {}", e)))?;
            let right: i64 = row
                .get(1)
                .map_err(|e| DatabaseError::sql_execution(format!("Failed to get rgt: {}", e)))?;
            Ok(Some(Span::new(left, right)))
        }
        None => Ok(None),
    }
}

/// Direct children of the node spanning `parent`, in ascending `left` order
///
/// # Errors
///
/// `SqlExecutionError` if a sibling bound is missing, which means the table
/// is not canonically packed.
pub async fn immediate_children(
    conn: &Connection,
    parent: &Span,
) -> Result<Vec<OrgUnit>, DatabaseError> {
    let sql = format!("SELECT {} FROM org_units WHERE lft = ?", UNIT_COLUMNS);
    let mut children = Vec::new();
    let mut cursor = parent.left + 1;

    while cursor < parent.right {
        let child = fetch_one(conn, &sql, [cursor]).await?.ok_or_else(|| {
            DatabaseError::sql_execution(format!(
                "No node starts at bound {} inside [{}, {}]; tree is not packed",
                cursor, parent.left, parent.right
            ))
        })?;
        if child.right >= parent.right {
            return Err(DatabaseError::sql_execution(format!(
                "Node {} at [{}, {}] escapes its parent [{}, {}]",
                child.id, child.left, child.right, parent.left, parent.right
            )));
        }
        cursor = child.right + 1;
        children.push(child);
    }

    Ok(children)
}

/// Every descendant of the node spanning `parent`, in ascending `left` (pre-order)
pub async fn all_descendants(
    conn: &Connection,
    parent: &Span,
) -> Result<Vec<OrgUnit>, DatabaseError> {
    let rows = conn
        .query(
            &format!(
                "SELECT {} FROM org_units WHERE lft > ?1 AND rgt < ?2 ORDER BY lft ASC",
                UNIT_COLUMNS
            ),
            (parent.left, parent.right),
        )
        .await
        .map_err(|e| DatabaseError::from_libsql("Failed to query descendants", e))?;

    collect_units(rows).await
}

/// Nearest strict ancestor of the node spanning `child`
pub async fn parent_of(conn: &Connection, child: &Span) -> Result<Option<OrgUnit>, DatabaseError> {
    fetch_one(
        conn,
        &format!(
            "SELECT {} FROM org_units WHERE lft < ?1 AND rgt > ?2 ORDER BY lft DESC LIMIT 1",
            UNIT_COLUMNS
        ),
        (child.left, child.right),
    )
    .await
}

pub async fn by_name(conn: &Connection, name: &str) -> Result<Vec<OrgUnit>, DatabaseError> {
    let rows = conn
        .query(
            &format!(
                "SELECT {} FROM org_units WHERE name = ? ORDER BY lft ASC",
                UNIT_COLUMNS
            ),
            [name],
        )
        .await
        .map_err(|e| DatabaseError::from_libsql("Failed to query by name", e))?;

    collect_units(rows).await
}

pub async fn count(conn: &Connection) -> Result<i64, DatabaseError> {
    Ok(fetch_i64(conn, "SELECT COUNT(*) FROM org_units")
        .await?
        .unwrap_or(0))
}

/// `(id, span)` of every node in ascending `left` order
pub async fn all_spans(conn: &Connection) -> Result<Vec<(String, Span)>, DatabaseError> {
    let mut rows = conn
        .query("SELECT id, lft, rgt FROM org_units ORDER BY lft ASC", ())
        .await
        .map_err(|e| DatabaseError::from_libsql("Failed to scan bounds", e))?;

    let mut spans = Vec::new();
    while let Some(row) = rows
        .next()
        .await
        .map_err(|e| DatabaseError::from_libsql("Failed to read row", e))?
    {
        let id: String = row
            .get(0)
            .map_err(|e| DatabaseError::sql_execution(format!("Failed to get id: {}", e)))?;
        let left: i64 = row
            .get(1)
            .map_err(|e| DatabaseError::sql_execution(format!("Failed to get lft: {}", e)))?;
        let right: i64 = row
            .get(2)
            .map_err(|e| DatabaseError::sql_execution(format!("Failed to get rgt: {}", e)))?;
        spans.push((id, Span::new(left, right)));
    }

    Ok(spans)
}

/// Aggregate bounds used by the pre-commit packing check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PackingStats {
    pub node_count: i64,
    pub min_left: Option<i64>,
    pub max_right: Option<i64>,
}

impl PackingStats {
    /// Canonical packing: bounds start at 1 and end at `2N`
    pub fn is_packed(&self) -> bool {
        match (self.min_left, self.max_right) {
            (None, None) => self.node_count == 0,
            (Some(min_left), Some(max_right)) => {
                min_left == 1 && max_right == self.node_count * 2
            }
            _ => false,
        }
    }
}

pub async fn packing_stats(conn: &Connection) -> Result<PackingStats, DatabaseError> {
    let mut rows = conn
        .query("SELECT COUNT(*), MIN(lft), MAX(rgt) FROM org_units", ())
        .await
        .map_err(|e| DatabaseError::from_libsql("Failed to compute packing stats", e))?;
    let row = rows
        .next()
        .await
        .map_err(|e| DatabaseError::from_libsql("Failed to read row", e))?
        .ok_or_else(|| DatabaseError::sql_execution("Aggregate query returned no row"))?;

    let read = |idx: i32| {
        row.get::<Option<i64>>(idx)
            .map_err(|e| DatabaseError::sql_execution(format!("Failed to read stats: {}", e)))
    };

    Ok(PackingStats {
        node_count: read(0)?.unwrap_or(0),
        min_left: read(1)?,
        max_right: read(2)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_sqlite_timestamp() {
        let ts = parse_timestamp("2025-01-03 10:20:30").unwrap();
        assert_eq!(ts.to_rfc3339(), "2025-01-03T10:20:30+00:00");
    }

    #[test]
    fn test_parse_rfc3339_timestamp() {
        let ts = parse_timestamp("2025-01-03T10:20:30Z").unwrap();
        assert_eq!(ts.to_rfc3339(), "2025-01-03T10:20:30+00:00");
    }

    #[test]
    fn test_parse_garbage_timestamp() {
        assert!(parse_timestamp("yesterday").is_err());
    }

    #[test]
    fn test_packing_stats() {
        let empty = PackingStats {
            node_count: 0,
            min_left: None,
            max_right: None,
        };
        assert!(empty.is_packed());

        let packed = PackingStats {
            node_count: 3,
            min_left: Some(1),
            max_right: Some(6),
        };
        assert!(packed.is_packed());

        let gapped = PackingStats {
            node_count: 3,
            min_left: Some(1),
            max_right: Some(8),
        };
        assert!(!gapped.is_packed());
    }
}
