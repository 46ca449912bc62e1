//! Protoscope Core Integration Tests

use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use protoscope_core::{
    Error, Result,
    config::{IndexingConfig, SearchConfig},
    domain::indexing::Indexer,
    domain::registry::RegistryRepository,
    domain::schema::JsonSchemaParser,
    domain::search::{
        CompiledQuery, EntityType, ImportEdge, SearchEntity, SearchHistoryEntry, SearchHit,
        SearchRepository, SearchRepositoryTrait, SearchRequest, SearchService, Suggestion,
    },
    error::IndexStage,
    storage::Database,
};

const USERS: &str = r#"{
    "package": "acme",
    "imports": ["common/time.json"],
    "messages": [{
        "name": "User",
        "line": 4,
        "comments": ["/// A registered user"],
        "fields": [
            {"name": "email", "type": "string", "number": 1, "comments": ["// Login address"]},
            {"name": "created_at", "type": "Timestamp", "number": 2}
        ]
    }],
    "enums": [{
        "name": "Status",
        "values": [
            {"name": "ACTIVE", "number": 0},
            {"name": "DISABLED", "number": 1}
        ]
    }],
    "services": [{
        "name": "Users",
        "methods": [{"name": "GetUser", "input_type": "GetUserRequest", "output_type": "User"}]
    }]
}"#;

const BILLING: &str = r#"{
    "package": "billing",
    "messages": [{
        "name": "Invoice",
        "fields": [{"name": "total", "type": "int64", "number": 1}]
    }]
}"#;

/// Index wrapper that fails on demand
struct FlakyIndex {
    inner: SearchRepository,
    fail_replace_for: Option<Uuid>,
    fail_count: bool,
}

#[async_trait]
impl SearchRepositoryTrait for FlakyIndex {
    async fn replace_version_entities(
        &self,
        version_id: Uuid,
        entities: &[SearchEntity],
        imports: &[ImportEdge],
        batch_size: usize,
    ) -> Result<usize> {
        if self.fail_replace_for == Some(version_id) {
            return Err(Error::IndexingFailed {
                stage: IndexStage::Clear,
                message: "database is locked".to_string(),
            });
        }
        self.inner
            .replace_version_entities(version_id, entities, imports, batch_size)
            .await
    }

    async fn entities_for_version(&self, version_id: Uuid) -> Result<Vec<SearchEntity>> {
        self.inner.entities_for_version(version_id).await
    }

    async fn search(&self, query: &CompiledQuery, limit: i64, offset: i64) -> Result<Vec<SearchHit>> {
        self.inner.search(query, limit, offset).await
    }

    async fn count(&self, query: &CompiledQuery) -> Result<i64> {
        if self.fail_count {
            return Err(Error::Other("count unavailable".to_string()));
        }
        self.inner.count(query).await
    }

    async fn record_search(&self, query: &str, result_count: i64, duration_ms: i64) -> Result<()> {
        self.inner.record_search(query, result_count, duration_ms).await
    }

    async fn suggestions(&self, prefix: &str, limit: i64) -> Result<Vec<Suggestion>> {
        self.inner.suggestions(prefix, limit).await
    }

    async fn recent_searches(&self, limit: i64) -> Result<Vec<SearchHistoryEntry>> {
        self.inner.recent_searches(limit).await
    }
}

struct Harness {
    registry: RegistryRepository,
    index: Arc<SearchRepository>,
    indexer: Indexer,
    search: SearchService,
}

async fn harness() -> Harness {
    let db = Database::in_memory().await.expect("Failed to create database");
    let registry = RegistryRepository::new(db.pool().clone());
    let index = Arc::new(SearchRepository::new(db.pool().clone()));
    let indexer = Indexer::new(
        Arc::new(registry.clone()),
        index.clone(),
        Arc::new(JsonSchemaParser::new()),
        &IndexingConfig::default(),
    );
    let search = SearchService::new(index.clone(), SearchConfig::default());
    Harness {
        registry,
        index,
        indexer,
        search,
    }
}

async fn publish(registry: &RegistryRepository, module: &str, version: &str, content: &str) -> Uuid {
    if registry.get_module(module).await.unwrap().is_none() {
        registry.create_module(module, "").await.unwrap();
    }
    registry
        .publish_version(
            module,
            version,
            &[("schema.json".to_string(), content.to_string())],
            &["acme/common".to_string()],
        )
        .await
        .unwrap()
        .id
}

#[tokio::test]
async fn test_publish_index_search() {
    let h = harness().await;
    publish(&h.registry, "acme/users", "1.0.0", USERS).await;

    let stats = h.indexer.index_version("acme/users", "1.0.0").await.unwrap();
    // User, email, created_at, Status, ACTIVE, DISABLED, Users, GetUser
    assert_eq!(stats.entities, 8);

    let response = h
        .search
        .search(&SearchRequest::new("email entity:field"))
        .await
        .unwrap();
    assert_eq!(response.total_count, 1);
    let hit = &response.results[0];
    assert_eq!(hit.entity.full_path, "acme.User.email");
    assert_eq!(hit.entity.parent_path, "acme.User");
    assert_eq!(hit.entity.field_type.as_deref(), Some("string"));
    assert_eq!(hit.module_name, "acme/users");
    assert_eq!(hit.version, "1.0.0");
    assert!(hit.score.is_some());
    assert_eq!(response.expression.as_deref(), Some("email:*"));
}

#[tokio::test]
async fn test_reindex_is_idempotent() {
    let h = harness().await;
    let version_id = publish(&h.registry, "acme/users", "1.0.0", USERS).await;

    h.indexer.index_version("acme/users", "1.0.0").await.unwrap();
    let first = h.index.entities_for_version(version_id).await.unwrap();

    h.indexer.index_version("acme/users", "1.0.0").await.unwrap();
    let second = h.index.entities_for_version(version_id).await.unwrap();

    assert_eq!(first.len(), second.len());
    let first_paths: Vec<_> = first.iter().map(|e| &e.full_path).collect();
    let second_paths: Vec<_> = second.iter().map(|e| &e.full_path).collect();
    assert_eq!(first_paths, second_paths);

    let response = h.search.search(&SearchRequest::new("email")).await.unwrap();
    assert_eq!(response.total_count, 1);
}

#[tokio::test]
async fn test_filter_only_search() {
    let h = harness().await;
    publish(&h.registry, "acme/users", "1.0.0", USERS).await;
    publish(&h.registry, "billing/invoices", "1.0.0", BILLING).await;
    h.indexer
        .reindex_all(&CancellationToken::new())
        .await
        .unwrap();

    let response = h
        .search
        .search(&SearchRequest::new("entity:enum_value module:acme/*"))
        .await
        .unwrap();
    assert!(response.expression.is_none());
    let names: Vec<_> = response
        .results
        .iter()
        .map(|hit| hit.entity.entity_name.as_str())
        .collect();
    assert_eq!(names, vec!["ACTIVE", "DISABLED"]);
    assert!(response.results.iter().all(|hit| hit.score.is_none()));

    let response = h
        .search
        .search(&SearchRequest::new("type:int64"))
        .await
        .unwrap();
    assert_eq!(response.total_count, 1);
    assert_eq!(response.results[0].module_name, "billing/invoices");
}

#[tokio::test]
async fn test_paging_reports_total() {
    let h = harness().await;
    publish(&h.registry, "acme/users", "1.0.0", USERS).await;
    h.indexer.index_version("acme/users", "1.0.0").await.unwrap();

    let request = SearchRequest::new("module:acme/users").with_limit(3);
    let page = h.search.search(&request).await.unwrap();
    assert_eq!(page.results.len(), 3);
    assert_eq!(page.total_count, 8);
    assert!(page.has_more(0));

    let last = h
        .search
        .search(&request.clone().with_offset(6))
        .await
        .unwrap();
    assert_eq!(last.results.len(), 2);
    assert!(!last.has_more(6));
}

#[tokio::test]
async fn test_reindex_all_continues_past_failure() {
    let db = Database::in_memory().await.expect("Failed to create database");
    let registry = RegistryRepository::new(db.pool().clone());
    publish(&registry, "acme/users", "1.0.0", USERS).await;
    let broken = publish(&registry, "acme/users", "2.0.0", USERS).await;
    publish(&registry, "billing/invoices", "1.0.0", BILLING).await;

    let index = Arc::new(FlakyIndex {
        inner: SearchRepository::new(db.pool().clone()),
        fail_replace_for: Some(broken),
        fail_count: false,
    });
    let indexer = Indexer::new(
        Arc::new(registry.clone()),
        index.clone(),
        Arc::new(JsonSchemaParser::new()),
        &IndexingConfig::default(),
    );

    let summary = indexer
        .reindex_all(&CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(summary.versions_total, 3);
    assert_eq!(summary.versions_indexed, 2);
    assert_eq!(summary.versions_failed(), 1);
    assert_eq!(summary.failures[0].module, "acme/users");
    assert_eq!(summary.failures[0].version, "2.0.0");
    assert!(summary.failures[0].error.contains("clear"));
    assert!(index.entities_for_version(broken).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_reindex_all_honors_cancellation() {
    let h = harness().await;
    publish(&h.registry, "acme/users", "1.0.0", USERS).await;

    let cancel = CancellationToken::new();
    cancel.cancel();
    let err = h.indexer.reindex_all(&cancel).await.unwrap_err();
    assert!(matches!(err, Error::Cancelled));
}

#[tokio::test]
async fn test_count_failure_falls_back_to_page_size() {
    let db = Database::in_memory().await.expect("Failed to create database");
    let registry = RegistryRepository::new(db.pool().clone());
    publish(&registry, "acme/users", "1.0.0", USERS).await;

    let index = Arc::new(FlakyIndex {
        inner: SearchRepository::new(db.pool().clone()),
        fail_replace_for: None,
        fail_count: true,
    });
    Indexer::new(
        Arc::new(registry),
        index.clone(),
        Arc::new(JsonSchemaParser::new()),
        &IndexingConfig::default(),
    )
    .index_version("acme/users", "1.0.0")
    .await
    .unwrap();

    let service = SearchService::new(index, SearchConfig::default());
    let response = service
        .search(&SearchRequest::new("module:acme/users").with_limit(5))
        .await
        .unwrap();
    assert_eq!(response.results.len(), 5);
    assert_eq!(response.total_count, 5);
}

#[tokio::test]
async fn test_history_and_suggestions() {
    let h = harness().await;
    publish(&h.registry, "acme/users", "1.0.0", USERS).await;
    h.indexer.index_version("acme/users", "1.0.0").await.unwrap();

    for query in ["email", "email entity:field", "email", "status"] {
        h.search
            .search_and_record(&SearchRequest::new(query))
            .await
            .unwrap();
    }

    let suggestions = h.search.get_suggestions("em", None).await.unwrap();
    assert_eq!(suggestions.len(), 2);
    assert_eq!(suggestions[0].query, "email");
    assert_eq!(suggestions[0].frequency, 2);
    assert_eq!(suggestions[1].query, "email entity:field");

    let history = h.search.recent_searches(Some(10)).await.unwrap();
    assert_eq!(history.len(), 4);
    assert_eq!(history[0].query, "status");
    assert_eq!(history[1].result_count, 1);
}

#[tokio::test]
async fn test_imports_and_dependency_filters() {
    let h = harness().await;
    publish(&h.registry, "acme/users", "1.0.0", USERS).await;
    publish(&h.registry, "billing/invoices", "1.0.0", BILLING).await;
    h.indexer
        .reindex_all(&CancellationToken::new())
        .await
        .unwrap();

    let response = h
        .search
        .search(&SearchRequest::new("imports:common/time.json entity:message"))
        .await
        .unwrap();
    let paths: Vec<_> = response
        .results
        .iter()
        .map(|hit| hit.entity.full_path.as_str())
        .collect();
    assert_eq!(paths, vec!["acme.User"]);

    let response = h
        .search
        .search(&SearchRequest::new("depends-on:acme/common entity:message"))
        .await
        .unwrap();
    assert_eq!(response.total_count, 2);
}

#[tokio::test]
async fn test_entity_kinds_survive_storage() {
    let h = harness().await;
    let version_id = publish(&h.registry, "acme/users", "1.0.0", USERS).await;
    h.indexer.index_version("acme/users", "1.0.0").await.unwrap();

    let entities = h.index.entities_for_version(version_id).await.unwrap();
    let method = entities
        .iter()
        .find(|e| e.entity_type == EntityType::Method)
        .unwrap();
    assert_eq!(method.full_path, "acme.Users.GetUser");
    assert_eq!(method.method_input_type.as_deref(), Some("GetUserRequest"));
    assert_eq!(method.method_output_type.as_deref(), Some("User"));

    let message = entities
        .iter()
        .find(|e| e.entity_type == EntityType::Message)
        .unwrap();
    assert_eq!(message.description, "A registered user");
    assert_eq!(message.line_number, Some(4));
}
