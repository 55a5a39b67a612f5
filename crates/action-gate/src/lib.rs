//! Actionability gate
//!
//! Validates a candidate element before any action is allowed:
//! - Unique: the locator resolves to exactly one element
//! - Visible: non-zero area, not hidden or covered
//! - Enabled: not disabled or read-only
//! - Stable: bounding box agrees across repeated samples
//! - Scoped: inside the requested container, if any

pub mod conditions;
pub mod errors;
pub mod types;
pub mod validator;

pub use errors::*;
pub use types::*;
pub use validator::*;
