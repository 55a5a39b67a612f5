//! Element discovery and self-healing
//!
//! This crate implements the resolution side of the kernel:
//! - Discovery over an eight-tier strategy table with early exit
//! - Scope resolution for dialogs, dropdowns, tab panels and drawers
//! - Runtime profile classification (static vs dynamic pages)
//! - Bounded, forward-only healing with learned strategy bias
//! - Strategy history stores (in-memory and JSON file)

pub mod errors;
pub mod healer;
pub mod history;
pub mod profile;
pub mod resolver;
pub mod scope;
pub mod strategies;
pub mod types;

pub use errors::*;
pub use healer::*;
pub use history::*;
pub use profile::*;
pub use resolver::*;
pub use scope::*;
pub use strategies::*;
pub use types::*;
