//! Search repository for database operations
//!
//! SQLite implementation of the search index backed by the
//! `search_entities` table and its FTS5 shadow `search_entities_fts`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use std::collections::BTreeMap;
use uuid::Uuid;

use super::compiler::{CompiledQuery, escape_like};
use super::entity::{
    EntityType, ImportEdge, SearchEntity, SearchHistoryEntry, SearchHit, Suggestion,
};
use super::repository_trait::SearchRepositoryTrait;
use crate::error::{Error, IndexStage, Result};

/// Columns of `search_entities` in insert order
const ENTITY_COLUMNS: [&str; 16] = [
    "version_id",
    "entity_type",
    "entity_name",
    "full_path",
    "parent_path",
    "proto_file_path",
    "line_number",
    "description",
    "comments",
    "field_type",
    "field_number",
    "is_repeated",
    "is_optional",
    "method_input_type",
    "method_output_type",
    "metadata",
];

/// bm25 column weights: name and path dominate, docs and types follow
const RANK_EXPR: &str =
    "bm25(search_entities_fts, 10.0, 6.0, 2.0, 1.0, 1.5, 1.0, 1.0)";

const SELECT_ENTITY: &str = r#"
    e.version_id, e.entity_type, e.entity_name, e.full_path, e.parent_path,
    e.proto_file_path, e.line_number, e.description, e.comments,
    e.field_type, e.field_number, e.is_repeated, e.is_optional,
    e.method_input_type, e.method_output_type, e.metadata
"#;

/// Repository for search database operations
#[derive(Debug, Clone)]
pub struct SearchRepository {
    pool: SqlitePool,
}

impl SearchRepository {
    /// Create a new repository with the given connection pool
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Get a reference to the underlying connection pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Shared FROM/WHERE for search and count; returns SQL and bind values
    fn match_clause(query: &CompiledQuery) -> (String, Vec<String>) {
        let mut params = Vec::new();
        let mut conditions = Vec::new();

        let from = match query.fts_query() {
            Some(fts) => {
                conditions.push("search_entities_fts MATCH ?".to_string());
                params.push(fts);
                r#"
                FROM search_entities_fts
                JOIN search_entities e ON e.id = search_entities_fts.rowid
                JOIN versions v ON v.id = e.version_id
                JOIN modules m ON m.id = v.module_id
                "#
            }
            None => {
                r#"
                FROM search_entities e
                JOIN versions v ON v.id = e.version_id
                JOIN modules m ON m.id = v.module_id
                "#
            }
        };

        for clause in query.clauses() {
            conditions.push(clause.sql);
            params.extend(clause.params);
        }

        let sql = if conditions.is_empty() {
            from.to_string()
        } else {
            format!("{} WHERE {}", from, conditions.join(" AND "))
        };
        (sql, params)
    }

    fn stage_error(stage: IndexStage, err: sqlx::Error) -> Error {
        Error::IndexingFailed {
            stage,
            message: err.to_string(),
        }
    }
}

#[async_trait]
impl SearchRepositoryTrait for SearchRepository {
    async fn replace_version_entities(
        &self,
        version_id: Uuid,
        entities: &[SearchEntity],
        imports: &[ImportEdge],
        batch_size: usize,
    ) -> Result<usize> {
        let id = version_id.to_string();
        let batch_size = batch_size.max(1);

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| Self::stage_error(IndexStage::Clear, e))?;

        sqlx::query("DELETE FROM search_entities WHERE version_id = ?")
            .bind(&id)
            .execute(&mut *tx)
            .await
            .map_err(|e| Self::stage_error(IndexStage::Clear, e))?;

        sqlx::query("DELETE FROM schema_imports WHERE version_id = ?")
            .bind(&id)
            .execute(&mut *tx)
            .await
            .map_err(|e| Self::stage_error(IndexStage::Clear, e))?;

        let row_placeholders = format!("({})", vec!["?"; ENTITY_COLUMNS.len()].join(", "));

        for batch in entities.chunks(batch_size) {
            let sql = format!(
                "INSERT INTO search_entities ({}) VALUES {}",
                ENTITY_COLUMNS.join(", "),
                vec![row_placeholders.as_str(); batch.len()].join(", ")
            );

            let mut query = sqlx::query(&sql);
            for entity in batch {
                let metadata = serde_json::to_string(&entity.metadata)?;
                query = query
                    .bind(&id)
                    .bind(entity.entity_type.as_str())
                    .bind(&entity.entity_name)
                    .bind(&entity.full_path)
                    .bind(&entity.parent_path)
                    .bind(&entity.proto_file_path)
                    .bind(entity.line_number.map(i64::from))
                    .bind(&entity.description)
                    .bind(&entity.comments)
                    .bind(&entity.field_type)
                    .bind(entity.field_number)
                    .bind(entity.is_repeated)
                    .bind(entity.is_optional)
                    .bind(&entity.method_input_type)
                    .bind(&entity.method_output_type)
                    .bind(metadata);
            }

            query
                .execute(&mut *tx)
                .await
                .map_err(|e| Self::stage_error(IndexStage::Insert, e))?;
        }

        for batch in imports.chunks(batch_size) {
            let sql = format!(
                "INSERT OR IGNORE INTO schema_imports (version_id, proto_file_path, import_path) VALUES {}",
                vec!["(?, ?, ?)"; batch.len()].join(", ")
            );

            let mut query = sqlx::query(&sql);
            for edge in batch {
                query = query
                    .bind(&id)
                    .bind(&edge.proto_file_path)
                    .bind(&edge.import_path);
            }

            query
                .execute(&mut *tx)
                .await
                .map_err(|e| Self::stage_error(IndexStage::Insert, e))?;
        }

        tx.commit()
            .await
            .map_err(|e| Self::stage_error(IndexStage::Insert, e))?;

        tracing::debug!(
            version_id = %version_id,
            entities = entities.len(),
            imports = imports.len(),
            "Replaced version entities"
        );
        Ok(entities.len())
    }

    async fn entities_for_version(&self, version_id: Uuid) -> Result<Vec<SearchEntity>> {
        let sql = format!(
            "SELECT {} FROM search_entities e WHERE e.version_id = ? ORDER BY e.id",
            SELECT_ENTITY
        );

        let rows: Vec<EntityRow> = sqlx::query_as(&sql)
            .bind(version_id.to_string())
            .fetch_all(&self.pool)
            .await
            .map_err(Error::DatabaseError)?;

        rows.into_iter().map(EntityRow::into_entity).collect()
    }

    async fn search(
        &self,
        query: &CompiledQuery,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<SearchHit>> {
        let (from_where, params) = Self::match_clause(query);

        let (score, order) = if query.fts_query().is_some() {
            (RANK_EXPR, "score ASC, e.entity_name ASC")
        } else {
            ("CAST(NULL AS REAL)", "e.entity_name ASC, m.name ASC")
        };

        let sql = format!(
            r#"
            SELECT {}, m.name AS module_name, v.version AS version, {} AS score
            {}
            ORDER BY {}
            LIMIT ? OFFSET ?
            "#,
            SELECT_ENTITY, score, from_where, order
        );

        let mut query_builder = sqlx::query_as::<_, HitRow>(&sql);
        for param in &params {
            query_builder = query_builder.bind(param);
        }
        query_builder = query_builder.bind(limit).bind(offset);

        let rows: Vec<HitRow> = query_builder
            .fetch_all(&self.pool)
            .await
            .map_err(Error::DatabaseError)?;

        rows.into_iter().map(HitRow::into_hit).collect()
    }

    async fn count(&self, query: &CompiledQuery) -> Result<i64> {
        let (from_where, params) = Self::match_clause(query);
        let sql = format!("SELECT COUNT(*) {}", from_where);

        let mut query_builder = sqlx::query_as::<_, (i64,)>(&sql);
        for param in &params {
            query_builder = query_builder.bind(param);
        }

        let (count,) = query_builder
            .fetch_one(&self.pool)
            .await
            .map_err(Error::DatabaseError)?;
        Ok(count)
    }

    async fn record_search(&self, query: &str, result_count: i64, duration_ms: i64) -> Result<()> {
        sqlx::query(
            "INSERT INTO search_history (query, result_count, duration_ms, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(query)
        .bind(result_count)
        .bind(duration_ms)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(Error::DatabaseError)?;
        Ok(())
    }

    async fn suggestions(&self, prefix: &str, limit: i64) -> Result<Vec<Suggestion>> {
        let pattern = format!("{}%", escape_like(prefix));

        let rows: Vec<SuggestionRow> = sqlx::query_as(
            r#"
            SELECT query, COUNT(*) AS frequency, MAX(created_at) AS last_used_at,
                   MAX(id) AS last_id
            FROM search_history
            WHERE query LIKE ? ESCAPE '\'
            GROUP BY query
            ORDER BY frequency DESC, last_id DESC
            LIMIT ?
            "#,
        )
        .bind(&pattern)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::DatabaseError)?;

        Ok(rows
            .into_iter()
            .map(|row| Suggestion {
                query: row.query,
                frequency: row.frequency,
                last_used_at: row.last_used_at,
            })
            .collect())
    }

    async fn recent_searches(&self, limit: i64) -> Result<Vec<SearchHistoryEntry>> {
        let rows: Vec<HistoryRow> = sqlx::query_as(
            r#"
            SELECT id, query, result_count, duration_ms, created_at
            FROM search_history
            ORDER BY id DESC
            LIMIT ?
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::DatabaseError)?;

        Ok(rows
            .into_iter()
            .map(|row| SearchHistoryEntry {
                id: row.id,
                query: row.query,
                result_count: row.result_count,
                duration_ms: row.duration_ms,
                created_at: row.created_at,
            })
            .collect())
    }
}

// ========== Row types ==========

#[derive(sqlx::FromRow)]
struct EntityRow {
    version_id: String,
    entity_type: String,
    entity_name: String,
    full_path: String,
    parent_path: String,
    proto_file_path: String,
    line_number: Option<i64>,
    description: String,
    comments: String,
    field_type: Option<String>,
    field_number: Option<i64>,
    is_repeated: bool,
    is_optional: bool,
    method_input_type: Option<String>,
    method_output_type: Option<String>,
    metadata: String,
}

impl EntityRow {
    fn into_entity(self) -> Result<SearchEntity> {
        let version_id = Uuid::parse_str(&self.version_id)
            .map_err(|e| Error::InvalidInput(format!("Invalid version ID: {}", e)))?;
        let entity_type = EntityType::parse(&self.entity_type).ok_or_else(|| {
            Error::InvalidInput(format!("Unknown entity type: {}", self.entity_type))
        })?;
        let metadata: BTreeMap<String, bool> = serde_json::from_str(&self.metadata)?;

        Ok(SearchEntity {
            version_id,
            entity_type,
            entity_name: self.entity_name,
            full_path: self.full_path,
            parent_path: self.parent_path,
            proto_file_path: self.proto_file_path,
            line_number: self.line_number.and_then(|n| u32::try_from(n).ok()),
            description: self.description,
            comments: self.comments,
            field_type: self.field_type,
            field_number: self.field_number,
            is_repeated: self.is_repeated,
            is_optional: self.is_optional,
            method_input_type: self.method_input_type,
            method_output_type: self.method_output_type,
            metadata,
        })
    }
}

#[derive(sqlx::FromRow)]
struct HitRow {
    #[sqlx(flatten)]
    entity: EntityRow,
    module_name: String,
    version: String,
    score: Option<f64>,
}

impl HitRow {
    fn into_hit(self) -> Result<SearchHit> {
        Ok(SearchHit {
            entity: self.entity.into_entity()?,
            module_name: self.module_name,
            version: self.version,
            score: self.score,
        })
    }
}

#[derive(sqlx::FromRow)]
struct SuggestionRow {
    query: String,
    frequency: i64,
    last_used_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct HistoryRow {
    id: i64,
    query: String,
    result_count: i64,
    duration_ms: i64,
    created_at: DateTime<Utc>,
}
