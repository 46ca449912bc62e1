//! Search domain module
//!
//! Query-language search over indexed schema entities.
//!
//! # Architecture
//!
//! - **Entities**: `SearchEntity`, `ParsedQuery`, `SearchRequest`, `SearchResponse`
//! - **Query**: `parse_query` turns a query string into a `ParsedQuery`
//! - **Compiler**: `compile` produces the full-text expression and filter predicates
//! - **Repository**: `SearchRepository` for the SQLite/FTS5 index
//! - **Service**: `SearchService` for paging, ranking, suggestions and history
//!
//! # Query language
//!
//! - Free text: `user email` (implicit AND), `user OR email`, `user NOT deleted`
//! - Filters: `entity:message`, `type:string`, `module:acme/*`, `version:1.2.0`,
//!   `imports:common/time.json`, `depends-on:acme/common`, `has-comment:true`
//!
//! # Example
//!
//! ```ignore
//! use protoscope_core::domain::search::{SearchRequest, SearchService};
//!
//! let service = SearchService::from_pool(pool.clone(), config.search.clone());
//! let response = service
//!     .search_and_record(&SearchRequest::new("user entity:field type:string").with_limit(20))
//!     .await?;
//! for hit in &response.results {
//!     println!("{} ({}@{})", hit.entity.full_path, hit.module_name, hit.version);
//! }
//! ```

pub mod compiler;
pub mod entity;
pub mod query;
pub mod repository;
pub mod repository_trait;
pub mod service;

// Re-export main types
pub use compiler::{
    CompiledQuery, Predicate, SqlClause, TextExpression, compile, sanitize_term,
    to_search_expression,
};
pub use entity::{
    BoolOperator, EntityType, ImportEdge, ModulePattern, ParsedQuery, SearchEntity,
    SearchHistoryEntry, SearchHit, SearchRequest, SearchResponse, Suggestion,
};
pub use query::parse_query;
pub use repository::SearchRepository;
pub use repository_trait::SearchRepositoryTrait;
pub use service::SearchService;
