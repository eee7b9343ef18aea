//! Tree Operations
//!
//! Storage-independent pieces of the nested-set model:
//!
//! - `ranges` - interval type and the offsets used by range mutations
//! - `integrity` - single-pass invariant verification

pub mod integrity;
pub mod ranges;

pub use integrity::{verify_spans, IntegrityReport, IntegrityViolation};
pub use ranges::{Span, ROOT_SPAN};
