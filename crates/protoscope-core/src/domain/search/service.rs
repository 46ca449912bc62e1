//! Search service
//!
//! Parses and compiles query strings, runs them against the index with a
//! bounded wait, and keeps the query history used for suggestions.

use sqlx::SqlitePool;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use super::compiler::compile;
use super::entity::{SearchHistoryEntry, SearchRequest, SearchResponse, Suggestion};
use super::query::parse_query;
use super::repository::SearchRepository;
use super::repository_trait::SearchRepositoryTrait;
use crate::config::SearchConfig;
use crate::error::{Error, Result};

/// Service for schema search, suggestions and history
#[derive(Clone)]
pub struct SearchService {
    repository: Arc<dyn SearchRepositoryTrait>,
    config: SearchConfig,
}

impl SearchService {
    /// Create a new search service over any index store
    pub fn new(repository: Arc<dyn SearchRepositoryTrait>, config: SearchConfig) -> Self {
        Self { repository, config }
    }

    /// Create a search service backed by SQLite
    pub fn from_pool(pool: SqlitePool, config: SearchConfig) -> Self {
        Self::new(Arc::new(SearchRepository::new(pool)), config)
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    /// Page size actually used for a requested limit
    pub fn effective_limit(&self, requested: Option<i64>) -> i64 {
        clamp_limit(requested, self.config.default_limit, self.config.max_limit)
    }

    /// Execute a search request
    pub async fn search(&self, request: &SearchRequest) -> Result<SearchResponse> {
        let limit = self.effective_limit(request.limit);
        let parsed = parse_query(&request.query)?;
        let compiled = compile(&parsed);

        let mut response = SearchResponse::empty(&request.query);
        response.expression = compiled.expression_string();
        response.warnings = compiled.warnings.clone();

        // No searchable term and no filter: empty page, the store is not
        // queried (an unfiltered scan would return the whole index).
        if compiled.is_empty() {
            response.parsed = Some(parsed);
            return Ok(response);
        }

        let results = self
            .with_timeout(self.repository.search(&compiled, limit, request.offset))
            .await?;

        let total_count = match self.with_timeout(self.repository.count(&compiled)).await {
            Ok(count) => count,
            Err(e) => {
                tracing::warn!(
                    query = %request.query,
                    error = %e,
                    "Failed to count search results, using page size"
                );
                results.len() as i64
            }
        };

        response.results = results;
        response.total_count = total_count;
        response.parsed = Some(parsed);
        Ok(response)
    }

    /// Execute a search and append it to the history.
    ///
    /// A history failure is logged and does not fail the search.
    pub async fn search_and_record(&self, request: &SearchRequest) -> Result<SearchResponse> {
        let started = Instant::now();
        let response = self.search(request).await?;
        let duration_ms = started.elapsed().as_millis() as i64;

        if let Err(e) = self
            .record_search(&request.query, response.total_count, duration_ms)
            .await
        {
            tracing::warn!(query = %request.query, error = %e, "Failed to record search history");
        }

        Ok(response)
    }

    /// Past queries starting with `prefix`, most frequent first
    pub async fn get_suggestions(&self, prefix: &str, limit: Option<i64>) -> Result<Vec<Suggestion>> {
        let limit = clamp_limit(
            limit,
            self.config.suggestion_default_limit,
            self.config.suggestion_max_limit,
        );
        self.with_timeout(self.repository.suggestions(prefix, limit))
            .await
    }

    /// Append one history row
    pub async fn record_search(&self, query: &str, result_count: i64, duration_ms: i64) -> Result<()> {
        self.with_timeout(self.repository.record_search(query, result_count, duration_ms))
            .await
    }

    /// Most recent history rows
    pub async fn recent_searches(&self, limit: Option<i64>) -> Result<Vec<SearchHistoryEntry>> {
        let limit = clamp_limit(limit, self.config.default_limit, self.config.max_limit);
        self.with_timeout(self.repository.recent_searches(limit))
            .await
    }

    async fn with_timeout<T>(&self, fut: impl Future<Output = Result<T>>) -> Result<T> {
        let timeout = self.config.query_timeout();
        tokio::time::timeout(timeout, fut)
            .await
            .map_err(|_| Error::Timeout(timeout.as_millis() as u64))?
    }
}

/// Unset or non-positive means `default`; anything above `max` is capped
fn clamp_limit(requested: Option<i64>, default: i64, max: i64) -> i64 {
    match requested {
        Some(limit) if limit > 0 => limit.min(max),
        _ => default,
    }
}
