//! Organizational Unit Data Structures
//!
//! This module defines the `OrgUnit` struct stored in the hierarchy table and
//! the `UnitAttributes` payload callers hand to creation and update operations.
//!
//! # Nested-Set Bounds
//!
//! Every unit carries an integer interval `[left, right]`. Containment of
//! intervals encodes ancestry, so subtree reads are plain range queries while
//! structural writes renumber bounds. The store owns the bounds exclusively;
//! callers only own `name` and the opaque `attributes` object.
//!
//! # Examples
//!
//! ```rust
//! use orgunit_core::models::UnitAttributes;
//! use serde_json::json;
//!
//! let attrs = UnitAttributes::new("Engineering")
//!     .with_attribute("costCentre", json!("CC-1042"));
//! assert!(attrs.validate().is_ok());
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Attribute keys reserved for store-owned columns
pub const RESERVED_ATTRIBUTE_KEYS: [&str; 5] = ["id", "left", "right", "lft", "rgt"];

/// Validation errors for caller-supplied payloads
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Attribute key '{0}' is reserved by the hierarchy store")]
    ReservedAttribute(String),
}

/// A single organizational unit in the hierarchy.
///
/// # Fields
///
/// - `id`: Store-assigned UUID, immutable after creation
/// - `name`: Caller-supplied label (not unique)
/// - `left` / `right`: Nested-set bounds, `left < right`
/// - `attributes`: Opaque JSON object owned by the caller
/// - `created_at` / `modified_at`: Row timestamps
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrgUnit {
    pub id: String,
    pub name: String,
    pub left: i64,
    pub right: i64,
    #[serde(default)]
    pub attributes: Map<String, Value>,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
}

impl OrgUnit {
    /// Number of integers the unit's subtree occupies (`2 × subtree size`)
    pub fn width(&self) -> i64 {
        self.right - self.left + 1
    }

    /// Number of descendants, derived from the packed bounds
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use orgunit_core::models::OrgUnit;
    /// # use chrono::Utc;
    /// let unit = OrgUnit {
    ///     id: "a".to_string(),
    ///     name: "A".to_string(),
    ///     left: 2,
    ///     right: 7,
    ///     attributes: Default::default(),
    ///     created_at: Utc::now(),
    ///     modified_at: Utc::now(),
    /// };
    /// assert_eq!(unit.descendant_count(), 2);
    /// ```
    pub fn descendant_count(&self) -> i64 {
        (self.right - self.left - 1) / 2
    }

    pub fn is_leaf(&self) -> bool {
        self.right == self.left + 1
    }

    /// Whether `other` lies strictly inside this unit's interval (ancestry test)
    pub fn contains(&self, other: &OrgUnit) -> bool {
        self.left < other.left && other.right < self.right
    }
}

/// Caller-supplied payload for `create_root_node`, `insert_node` and `update_node`.
///
/// `name` is the only field the store understands. Everything else is kept
/// in `attributes` and persisted verbatim; on the wire the extra fields sit
/// next to `name` at the top level.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UnitAttributes {
    pub name: String,

    #[serde(flatten)]
    pub attributes: Map<String, Value>,
}

impl UnitAttributes {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: Map::new(),
        }
    }

    /// Add an opaque attribute (builder style)
    pub fn with_attribute(mut self, key: impl Into<String>, value: Value) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }

    /// Validate the payload before it reaches the database
    ///
    /// # Errors
    ///
    /// - `MissingField("name")` if the name is blank
    /// - `ReservedAttribute(key)` if an attribute shadows a store-owned column
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::MissingField("name".to_string()));
        }

        if let Some(key) = self
            .attributes
            .keys()
            .find(|key| RESERVED_ATTRIBUTE_KEYS.contains(&key.as_str()))
        {
            return Err(ValidationError::ReservedAttribute(key.clone()));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn unit(left: i64, right: i64) -> OrgUnit {
        OrgUnit {
            id: format!("unit-{}", left),
            name: "Unit".to_string(),
            left,
            right,
            attributes: Map::new(),
            created_at: Utc::now(),
            modified_at: Utc::now(),
        }
    }

    #[test]
    fn test_width_and_descendants() {
        let root = unit(1, 8);
        assert_eq!(root.width(), 8);
        assert_eq!(root.descendant_count(), 3);
        assert!(!root.is_leaf());

        let leaf = unit(2, 3);
        assert_eq!(leaf.descendant_count(), 0);
        assert!(leaf.is_leaf());
    }

    #[test]
    fn test_contains_is_strict() {
        let root = unit(1, 8);
        let child = unit(2, 5);
        let sibling = unit(6, 7);

        assert!(root.contains(&child));
        assert!(root.contains(&sibling));
        assert!(!child.contains(&sibling));
        assert!(!root.contains(&root));
    }

    #[test]
    fn test_attributes_flatten_on_the_wire() {
        let attrs: UnitAttributes =
            serde_json::from_value(json!({"name": "Org", "code": "ORG-1", "active": true}))
                .unwrap();

        assert_eq!(attrs.name, "Org");
        assert_eq!(attrs.attributes.get("code"), Some(&json!("ORG-1")));
        assert_eq!(attrs.attributes.get("active"), Some(&json!(true)));
        assert!(!attrs.attributes.contains_key("name"));
    }

    #[test]
    fn test_validate_rejects_blank_name() {
        let attrs = UnitAttributes::new("   ");
        assert_eq!(
            attrs.validate(),
            Err(ValidationError::MissingField("name".to_string()))
        );
    }

    #[test]
    fn test_validate_rejects_reserved_keys() {
        let attrs = UnitAttributes::new("Team").with_attribute("left", json!(42));
        assert_eq!(
            attrs.validate(),
            Err(ValidationError::ReservedAttribute("left".to_string()))
        );
    }

    #[test]
    fn test_org_unit_serializes_camel_case() {
        let value = serde_json::to_value(unit(1, 2)).unwrap();
        assert!(value.get("createdAt").is_some());
        assert!(value.get("modifiedAt").is_some());
        assert_eq!(value["left"], json!(1));
        assert_eq!(value["right"], json!(2));
    }
}
