//! Repository trait for the search index
//!
//! Abstracts the index store so the indexer and search service can run
//! against SQLite or a test double.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::Result;

use super::compiler::CompiledQuery;
use super::entity::{ImportEdge, SearchEntity, SearchHistoryEntry, SearchHit, Suggestion};

/// Repository trait for search persistence
#[async_trait]
pub trait SearchRepositoryTrait: Send + Sync {
    // ========== Index maintenance ==========

    /// Atomically replace every entity and import edge of a version.
    ///
    /// Rows are inserted `batch_size` at a time inside one transaction; on
    /// failure nothing changes and the error names the failing stage.
    async fn replace_version_entities(
        &self,
        version_id: Uuid,
        entities: &[SearchEntity],
        imports: &[ImportEdge],
        batch_size: usize,
    ) -> Result<usize>;

    /// All entities of a version, in insertion order
    async fn entities_for_version(&self, version_id: Uuid) -> Result<Vec<SearchEntity>>;

    // ========== Querying ==========

    /// One page of ranked matches
    async fn search(
        &self,
        query: &CompiledQuery,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<SearchHit>>;

    /// Total number of matches, ignoring pagination
    async fn count(&self, query: &CompiledQuery) -> Result<i64>;

    // ========== History ==========

    /// Append one history row
    async fn record_search(&self, query: &str, result_count: i64, duration_ms: i64) -> Result<()>;

    /// Distinct past queries starting with `prefix`, most frequent first
    async fn suggestions(&self, prefix: &str, limit: i64) -> Result<Vec<Suggestion>>;

    /// Most recent history rows, newest first
    async fn recent_searches(&self, limit: i64) -> Result<Vec<SearchHistoryEntry>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    // Verify trait is object-safe
    fn _assert_object_safe(_: &dyn SearchRepositoryTrait) {}
}
