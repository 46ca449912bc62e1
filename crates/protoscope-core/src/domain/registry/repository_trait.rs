//! Repository trait for registry metadata
//!
//! The read side the indexer depends on.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::Result;

use super::entity::{Module, Version};

#[async_trait]
pub trait RegistryRepositoryTrait: Send + Sync {
    /// Identifier of `module`@`version`, if published
    async fn resolve_version_id(&self, module: &str, version: &str) -> Result<Option<Uuid>>;

    /// All modules, by name
    async fn list_modules(&self) -> Result<Vec<Module>>;

    /// All versions of a module, oldest first
    async fn list_versions(&self, module: &str) -> Result<Vec<Version>>;

    /// Paths of the schema files declared by a version
    async fn list_files(&self, version_id: Uuid) -> Result<Vec<String>>;

    /// Content of one schema file, if it exists
    async fn file_content(&self, version_id: Uuid, path: &str) -> Result<Option<String>>;
}
