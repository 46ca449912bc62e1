//! Domain layer
//!
//! Contains the registry, schema, indexing and search logic.

pub mod indexing;
pub mod registry;
pub mod schema;
pub mod search;
