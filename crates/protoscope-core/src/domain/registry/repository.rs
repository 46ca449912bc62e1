//! Registry repository for database operations

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use super::entity::{Module, SchemaFileRecord, Version, validate_module_name};
use super::repository_trait::RegistryRepositoryTrait;
use crate::error::{Error, Result};

/// Repository for modules, versions and their schema files
#[derive(Debug, Clone)]
pub struct RegistryRepository {
    pool: SqlitePool,
}

impl RegistryRepository {
    /// Create a new repository with the given connection pool
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Get a reference to the underlying connection pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Register a new module
    pub async fn create_module(&self, name: &str, description: &str) -> Result<Module> {
        validate_module_name(name).map_err(Error::InvalidInput)?;

        if self.get_module(name).await?.is_some() {
            return Err(Error::InvalidInput(format!(
                "module '{}' already exists",
                name
            )));
        }

        let module = Module::new(name, description);
        sqlx::query("INSERT INTO modules (id, name, description, created_at) VALUES (?, ?, ?, ?)")
            .bind(module.id.to_string())
            .bind(&module.name)
            .bind(&module.description)
            .bind(module.created_at)
            .execute(&self.pool)
            .await
            .map_err(Error::DatabaseError)?;

        tracing::info!(module = %module.name, "Created module");
        Ok(module)
    }

    /// Look up a module by name
    pub async fn get_module(&self, name: &str) -> Result<Option<Module>> {
        let row: Option<ModuleRow> = sqlx::query_as(
            "SELECT id, name, description, created_at FROM modules WHERE name = ?",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::DatabaseError)?;

        row.map(ModuleRow::into_module).transpose()
    }

    /// Publish a version of an existing module with its files and dependencies
    pub async fn publish_version(
        &self,
        module_name: &str,
        version: &str,
        files: &[(String, String)],
        dependencies: &[String],
    ) -> Result<Version> {
        let version = version.trim();
        if version.is_empty() {
            return Err(Error::InvalidInput("version cannot be empty".to_string()));
        }

        let module = self
            .get_module(module_name)
            .await?
            .ok_or_else(|| Error::ModuleNotFound(module_name.to_string()))?;

        if self.resolve_version_id(module_name, version).await?.is_some() {
            return Err(Error::InvalidInput(format!(
                "{}@{} is already published",
                module_name, version
            )));
        }

        let mut dependencies: Vec<String> = dependencies
            .iter()
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty())
            .collect();
        dependencies.sort();
        dependencies.dedup();

        let id = Uuid::new_v4();
        let created_at = Utc::now();
        let mut tx = self.pool.begin().await.map_err(Error::DatabaseError)?;

        sqlx::query("INSERT INTO versions (id, module_id, version, created_at) VALUES (?, ?, ?, ?)")
            .bind(id.to_string())
            .bind(module.id.to_string())
            .bind(version)
            .bind(created_at)
            .execute(&mut *tx)
            .await
            .map_err(Error::DatabaseError)?;

        for (path, content) in files {
            sqlx::query("INSERT INTO version_files (version_id, path, content) VALUES (?, ?, ?)")
                .bind(id.to_string())
                .bind(path)
                .bind(content)
                .execute(&mut *tx)
                .await
                .map_err(Error::DatabaseError)?;
        }

        for dependency in &dependencies {
            sqlx::query("INSERT INTO version_dependencies (version_id, module_name) VALUES (?, ?)")
                .bind(id.to_string())
                .bind(dependency)
                .execute(&mut *tx)
                .await
                .map_err(Error::DatabaseError)?;
        }

        tx.commit().await.map_err(Error::DatabaseError)?;

        tracing::info!(
            module = %module.name,
            version = %version,
            files = files.len(),
            "Published version"
        );

        Ok(Version {
            id,
            module_id: module.id,
            module_name: module.name,
            version: version.to_string(),
            dependencies,
            created_at,
        })
    }

    /// Fetch every file of a version
    pub async fn files(&self, version_id: Uuid) -> Result<Vec<SchemaFileRecord>> {
        let rows: Vec<(String, String)> = sqlx::query_as(
            "SELECT path, content FROM version_files WHERE version_id = ? ORDER BY path",
        )
        .bind(version_id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(Error::DatabaseError)?;

        Ok(rows
            .into_iter()
            .map(|(path, content)| SchemaFileRecord {
                version_id,
                path,
                content,
            })
            .collect())
    }

    async fn dependencies(&self, version_id: &str) -> Result<Vec<String>> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT module_name FROM version_dependencies WHERE version_id = ? ORDER BY module_name",
        )
        .bind(version_id)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::DatabaseError)?;

        Ok(rows.into_iter().map(|(name,)| name).collect())
    }
}

#[async_trait]
impl RegistryRepositoryTrait for RegistryRepository {
    async fn resolve_version_id(&self, module: &str, version: &str) -> Result<Option<Uuid>> {
        let row: Option<(String,)> = sqlx::query_as(
            r#"
            SELECT v.id
            FROM versions v
            JOIN modules m ON m.id = v.module_id
            WHERE m.name = ? AND v.version = ?
            "#,
        )
        .bind(module)
        .bind(version)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::DatabaseError)?;

        row.map(|(id,)| parse_id(&id)).transpose()
    }

    async fn list_modules(&self) -> Result<Vec<Module>> {
        let rows: Vec<ModuleRow> = sqlx::query_as(
            "SELECT id, name, description, created_at FROM modules ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(Error::DatabaseError)?;

        rows.into_iter().map(ModuleRow::into_module).collect()
    }

    async fn list_versions(&self, module: &str) -> Result<Vec<Version>> {
        let rows: Vec<VersionRow> = sqlx::query_as(
            r#"
            SELECT v.id, v.module_id, m.name AS module_name, v.version, v.created_at
            FROM versions v
            JOIN modules m ON m.id = v.module_id
            WHERE m.name = ?
            ORDER BY v.created_at, v.version
            "#,
        )
        .bind(module)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::DatabaseError)?;

        let mut versions = Vec::with_capacity(rows.len());
        for row in rows {
            let dependencies = self.dependencies(&row.id).await?;
            versions.push(row.into_version(dependencies)?);
        }
        Ok(versions)
    }

    async fn list_files(&self, version_id: Uuid) -> Result<Vec<String>> {
        let rows: Vec<(String,)> =
            sqlx::query_as("SELECT path FROM version_files WHERE version_id = ? ORDER BY path")
                .bind(version_id.to_string())
                .fetch_all(&self.pool)
                .await
                .map_err(Error::DatabaseError)?;

        Ok(rows.into_iter().map(|(path,)| path).collect())
    }

    async fn file_content(&self, version_id: Uuid, path: &str) -> Result<Option<String>> {
        let row: Option<(String,)> = sqlx::query_as(
            "SELECT content FROM version_files WHERE version_id = ? AND path = ?",
        )
        .bind(version_id.to_string())
        .bind(path)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::DatabaseError)?;

        Ok(row.map(|(content,)| content))
    }
}

fn parse_id(id: &str) -> Result<Uuid> {
    Uuid::parse_str(id).map_err(|e| Error::InvalidInput(format!("Invalid ID '{}': {}", id, e)))
}

#[derive(sqlx::FromRow)]
struct ModuleRow {
    id: String,
    name: String,
    description: String,
    created_at: DateTime<Utc>,
}

impl ModuleRow {
    fn into_module(self) -> Result<Module> {
        Ok(Module {
            id: parse_id(&self.id)?,
            name: self.name,
            description: self.description,
            created_at: self.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct VersionRow {
    id: String,
    module_id: String,
    module_name: String,
    version: String,
    created_at: DateTime<Utc>,
}

impl VersionRow {
    fn into_version(self, dependencies: Vec<String>) -> Result<Version> {
        Ok(Version {
            id: parse_id(&self.id)?,
            module_id: parse_id(&self.module_id)?,
            module_name: self.module_name,
            version: self.version,
            dependencies,
            created_at: self.created_at,
        })
    }
}
