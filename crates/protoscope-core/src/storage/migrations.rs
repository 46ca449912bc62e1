//! Database migrations
//!
//! This module manages SQLite schema migrations for protoscope.
//! Migrations are versioned and applied automatically on database connection.

use sqlx::SqlitePool;

/// Current schema version
pub const CURRENT_VERSION: i32 = 2;

/// SQL for creating the migrations tracking table
const CREATE_MIGRATIONS_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS _migrations (
        version INTEGER PRIMARY KEY NOT NULL,
        applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
    );
"#;

/// Migration 1: Registry metadata
const MIGRATION_V1: &str = r#"
    -- Modules (named schema packages)
    CREATE TABLE IF NOT EXISTS modules (
        id TEXT PRIMARY KEY NOT NULL,
        name TEXT NOT NULL UNIQUE,
        description TEXT NOT NULL DEFAULT '',
        created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
    );

    -- Published versions of a module
    CREATE TABLE IF NOT EXISTS versions (
        id TEXT PRIMARY KEY NOT NULL,
        module_id TEXT NOT NULL REFERENCES modules(id) ON DELETE CASCADE,
        version TEXT NOT NULL,
        created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
        UNIQUE (module_id, version)
    );

    CREATE INDEX IF NOT EXISTS idx_versions_module_id ON versions(module_id);

    -- Schema files declared by a version
    CREATE TABLE IF NOT EXISTS version_files (
        version_id TEXT NOT NULL REFERENCES versions(id) ON DELETE CASCADE,
        path TEXT NOT NULL,
        content TEXT NOT NULL,
        PRIMARY KEY (version_id, path)
    );

    -- Modules a version depends on
    CREATE TABLE IF NOT EXISTS version_dependencies (
        version_id TEXT NOT NULL REFERENCES versions(id) ON DELETE CASCADE,
        module_name TEXT NOT NULL,
        PRIMARY KEY (version_id, module_name)
    );

    CREATE INDEX IF NOT EXISTS idx_version_dependencies_module
        ON version_dependencies(module_name);
"#;

/// Migration 2: Search index and history
const MIGRATION_V2: &str = r#"
    -- Flattened schema elements
    CREATE TABLE IF NOT EXISTS search_entities (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        version_id TEXT NOT NULL REFERENCES versions(id) ON DELETE CASCADE,
        entity_type TEXT NOT NULL CHECK (entity_type IN ('message', 'field', 'enum', 'enum_value', 'service', 'method')),
        entity_name TEXT NOT NULL,
        full_path TEXT NOT NULL,
        parent_path TEXT NOT NULL DEFAULT '',
        proto_file_path TEXT NOT NULL,
        line_number INTEGER,
        description TEXT NOT NULL DEFAULT '',
        comments TEXT NOT NULL DEFAULT '',
        field_type TEXT,
        field_number INTEGER,
        is_repeated INTEGER NOT NULL DEFAULT 0,
        is_optional INTEGER NOT NULL DEFAULT 0,
        method_input_type TEXT,
        method_output_type TEXT,
        metadata TEXT NOT NULL DEFAULT '{}',
        created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
    );

    CREATE INDEX IF NOT EXISTS idx_search_entities_version_id ON search_entities(version_id);
    CREATE INDEX IF NOT EXISTS idx_search_entities_type ON search_entities(entity_type);
    CREATE INDEX IF NOT EXISTS idx_search_entities_field_type ON search_entities(field_type);
    CREATE INDEX IF NOT EXISTS idx_search_entities_name ON search_entities(entity_name);

    -- Full-text index over the searchable columns
    CREATE VIRTUAL TABLE IF NOT EXISTS search_entities_fts USING fts5(
        entity_name, full_path, description, comments,
        field_type, method_input_type, method_output_type,
        content='search_entities',
        content_rowid='id'
    );

    CREATE TRIGGER IF NOT EXISTS search_entities_ai AFTER INSERT ON search_entities BEGIN
        INSERT INTO search_entities_fts(rowid, entity_name, full_path, description, comments,
            field_type, method_input_type, method_output_type)
        VALUES (NEW.id, NEW.entity_name, NEW.full_path, NEW.description, NEW.comments,
            NEW.field_type, NEW.method_input_type, NEW.method_output_type);
    END;

    CREATE TRIGGER IF NOT EXISTS search_entities_ad AFTER DELETE ON search_entities BEGIN
        INSERT INTO search_entities_fts(search_entities_fts, rowid, entity_name, full_path,
            description, comments, field_type, method_input_type, method_output_type)
        VALUES ('delete', OLD.id, OLD.entity_name, OLD.full_path, OLD.description, OLD.comments,
            OLD.field_type, OLD.method_input_type, OLD.method_output_type);
    END;

    CREATE TRIGGER IF NOT EXISTS search_entities_au AFTER UPDATE ON search_entities BEGIN
        INSERT INTO search_entities_fts(search_entities_fts, rowid, entity_name, full_path,
            description, comments, field_type, method_input_type, method_output_type)
        VALUES ('delete', OLD.id, OLD.entity_name, OLD.full_path, OLD.description, OLD.comments,
            OLD.field_type, OLD.method_input_type, OLD.method_output_type);
        INSERT INTO search_entities_fts(rowid, entity_name, full_path, description, comments,
            field_type, method_input_type, method_output_type)
        VALUES (NEW.id, NEW.entity_name, NEW.full_path, NEW.description, NEW.comments,
            NEW.field_type, NEW.method_input_type, NEW.method_output_type);
    END;

    -- Import edges of each indexed schema file
    CREATE TABLE IF NOT EXISTS schema_imports (
        version_id TEXT NOT NULL REFERENCES versions(id) ON DELETE CASCADE,
        proto_file_path TEXT NOT NULL,
        import_path TEXT NOT NULL,
        PRIMARY KEY (version_id, proto_file_path, import_path)
    );

    CREATE INDEX IF NOT EXISTS idx_schema_imports_import_path ON schema_imports(import_path);

    -- Append-only query history
    CREATE TABLE IF NOT EXISTS search_history (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        query TEXT NOT NULL,
        result_count INTEGER NOT NULL DEFAULT 0,
        duration_ms INTEGER NOT NULL DEFAULT 0,
        created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
    );

    CREATE INDEX IF NOT EXISTS idx_search_history_query ON search_history(query);
    CREATE INDEX IF NOT EXISTS idx_search_history_created_at ON search_history(created_at);
"#;

/// Get the current schema version from the database
async fn get_current_version(pool: &SqlitePool) -> anyhow::Result<i32> {
    sqlx::raw_sql(CREATE_MIGRATIONS_TABLE).execute(pool).await?;

    let row: (Option<i32>,) = sqlx::query_as("SELECT MAX(version) FROM _migrations")
        .fetch_one(pool)
        .await?;

    Ok(row.0.unwrap_or(0))
}

/// Record that a migration has been applied
async fn record_migration(pool: &SqlitePool, version: i32) -> anyhow::Result<()> {
    sqlx::query("INSERT INTO _migrations (version) VALUES (?)")
        .bind(version)
        .execute(pool)
        .await?;
    Ok(())
}

/// Run all pending migrations
pub async fn run_migrations(pool: &SqlitePool) -> anyhow::Result<()> {
    let current_version = get_current_version(pool).await?;

    tracing::info!(
        current_version = current_version,
        target_version = CURRENT_VERSION,
        "Checking database migrations"
    );

    if current_version >= CURRENT_VERSION {
        tracing::debug!("Database is up to date");
        return Ok(());
    }

    if current_version < 1 {
        tracing::info!("Applying migration v1: Registry metadata");
        sqlx::raw_sql(MIGRATION_V1).execute(pool).await?;
        record_migration(pool, 1).await?;
    }

    if current_version < 2 {
        tracing::info!("Applying migration v2: Search index and history");
        sqlx::raw_sql(MIGRATION_V2).execute(pool).await?;
        record_migration(pool, 2).await?;
    }

    tracing::info!("Database migrations completed");
    Ok(())
}

/// Get migration status
pub async fn migration_status(pool: &SqlitePool) -> anyhow::Result<MigrationStatus> {
    let current_version = get_current_version(pool).await?;
    Ok(MigrationStatus {
        current_version,
        target_version: CURRENT_VERSION,
        needs_migration: current_version < CURRENT_VERSION,
    })
}

/// Migration status information
#[derive(Debug, Clone)]
pub struct MigrationStatus {
    /// Current schema version in the database
    pub current_version: i32,
    /// Target schema version (latest)
    pub target_version: i32,
    /// Whether migrations need to be run
    pub needs_migration: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn create_test_pool() -> SqlitePool {
        SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("Failed to create test pool")
    }

    #[tokio::test]
    async fn test_run_migrations() {
        let pool = create_test_pool().await;

        let status = migration_status(&pool).await.unwrap();
        assert_eq!(status.current_version, 0);
        assert!(status.needs_migration);

        run_migrations(&pool).await.unwrap();

        let status = migration_status(&pool).await.unwrap();
        assert_eq!(status.current_version, CURRENT_VERSION);
        assert!(!status.needs_migration);
    }

    #[tokio::test]
    async fn test_migrations_idempotent() {
        let pool = create_test_pool().await;

        run_migrations(&pool).await.unwrap();
        run_migrations(&pool).await.unwrap();

        let status = migration_status(&pool).await.unwrap();
        assert_eq!(status.current_version, CURRENT_VERSION);
    }

    #[tokio::test]
    async fn test_tables_created() {
        let pool = create_test_pool().await;
        run_migrations(&pool).await.unwrap();

        let tables = vec![
            "modules",
            "versions",
            "version_files",
            "version_dependencies",
            "search_entities",
            "search_entities_fts",
            "schema_imports",
            "search_history",
        ];

        for table in tables {
            let result: (i64,) = sqlx::query_as(&format!("SELECT COUNT(*) FROM {}", table))
                .fetch_one(&pool)
                .await
                .unwrap_or_else(|_| panic!("Table {} should exist", table));
            assert_eq!(result.0, 0, "Table {} should be empty", table);
        }
    }

    #[tokio::test]
    async fn test_fts_triggers_follow_entity_rows() {
        let pool = create_test_pool().await;
        sqlx::query("PRAGMA foreign_keys = OFF")
            .execute(&pool)
            .await
            .unwrap();
        run_migrations(&pool).await.unwrap();

        sqlx::query(
            "INSERT INTO search_entities (version_id, entity_type, entity_name, full_path, proto_file_path) \
             VALUES ('v', 'message', 'UserProfile', 'acme.UserProfile', 'users.json')",
        )
        .execute(&pool)
        .await
        .unwrap();

        let (hits,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM search_entities_fts WHERE search_entities_fts MATCH '\"userprofile\"*'",
        )
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(hits, 1);

        sqlx::query("DELETE FROM search_entities")
            .execute(&pool)
            .await
            .unwrap();

        let (hits,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM search_entities_fts WHERE search_entities_fts MATCH '\"userprofile\"*'",
        )
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(hits, 0);
    }
}
