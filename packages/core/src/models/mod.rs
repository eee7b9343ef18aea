//! Data Models
//!
//! This module contains the data structures persisted by the hierarchy store:
//!
//! - `OrgUnit` - One row of the nested-set table
//! - `UnitAttributes` - Caller-owned payload (name plus opaque attributes)

mod org_unit;

pub use org_unit::{OrgUnit, UnitAttributes, ValidationError, RESERVED_ATTRIBUTE_KEYS};
