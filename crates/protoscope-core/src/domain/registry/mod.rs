//! Registry domain module
//!
//! Minimal module/version/file metadata store. Publishing stores the raw
//! schema files of a version; the indexer reads them back through
//! [`RegistryRepositoryTrait`].

pub mod entity;
pub mod repository;
pub mod repository_trait;

pub use entity::{Module, SchemaFileRecord, Version, validate_module_name};
pub use repository::RegistryRepository;
pub use repository_trait::RegistryRepositoryTrait;
