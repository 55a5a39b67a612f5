//! Driver primitive port for element resolution.
//!
//! The resolution core never talks to a browser directly. It issues [`Query`]s and
//! layout/state reads through [`PagePort`]; a [`Locator`] bundles a query with the
//! compatibility filter and ordinal so it can be stored and re-resolved later.

pub mod errors;
pub mod fixture;
pub mod model;
pub mod port;

pub use errors::*;
pub use fixture::{FixtureNode, FixturePage};
pub use model::*;
pub use port::*;
