//! Indexer
//!
//! Reads a version's schema files from the registry, extracts entities, and
//! swaps them into the search index in one transaction.

use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::extractor::{extract_entities, import_edges};
use super::lock::VersionLocks;
use crate::config::{IndexingConfig, MAX_BATCH_SIZE};
use crate::domain::registry::RegistryRepositoryTrait;
use crate::domain::schema::SchemaParser;
use crate::domain::search::SearchRepositoryTrait;
use crate::error::{Error, IndexStage, Result};

/// Why a file was skipped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    /// Declared by the version but has no stored content
    Missing,
    /// Content could not be read
    Fetch,
    /// Content could not be parsed
    Parse,
}

/// A file that was skipped during indexing
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileDiagnostic {
    pub path: String,
    pub kind: DiagnosticKind,
    pub message: String,
}

/// Outcome of indexing one version
#[derive(Debug, Clone, Serialize)]
pub struct IndexStats {
    pub version_id: Uuid,
    pub files_total: usize,
    pub files_indexed: usize,
    pub diagnostics: Vec<FileDiagnostic>,
    pub entities: usize,
    pub imports: usize,
    pub duration_ms: u64,
}

/// A version that could not be reindexed
#[derive(Debug, Clone, Serialize)]
pub struct ReindexFailure {
    pub module: String,
    pub version: String,
    pub error: String,
}

/// Outcome of a full reindex pass
#[derive(Debug, Clone, Default, Serialize)]
pub struct ReindexSummary {
    pub versions_total: usize,
    pub versions_indexed: usize,
    pub entities: usize,
    pub failures: Vec<ReindexFailure>,
}

impl ReindexSummary {
    pub fn versions_failed(&self) -> usize {
        self.failures.len()
    }
}

/// Builds the search index from registry content
#[derive(Clone)]
pub struct Indexer {
    registry: Arc<dyn RegistryRepositoryTrait>,
    index: Arc<dyn SearchRepositoryTrait>,
    parser: Arc<dyn SchemaParser>,
    locks: VersionLocks,
    batch_size: usize,
}

impl Indexer {
    /// Create an indexer with its own lock registry.
    ///
    /// Locks only exclude runs that go through the same registry; indexers
    /// sharing a database in one process should share it via `with_locks`.
    pub fn new(
        registry: Arc<dyn RegistryRepositoryTrait>,
        index: Arc<dyn SearchRepositoryTrait>,
        parser: Arc<dyn SchemaParser>,
        config: &IndexingConfig,
    ) -> Self {
        Self {
            registry,
            index,
            parser,
            locks: VersionLocks::new(config.lock_timeout()),
            batch_size: config.batch_size.clamp(1, MAX_BATCH_SIZE),
        }
    }

    /// Share a lock registry with other indexers in the process
    pub fn with_locks(mut self, locks: VersionLocks) -> Self {
        self.locks = locks;
        self
    }

    pub fn locks(&self) -> &VersionLocks {
        &self.locks
    }

    /// Rebuild the index entries of `module`@`version`
    pub async fn index_version(&self, module: &str, version: &str) -> Result<IndexStats> {
        let version_id = self
            .registry
            .resolve_version_id(module, version)
            .await
            .map_err(|e| lookup_error(&e))?
            .ok_or_else(|| Error::VersionNotFound {
                module: module.to_string(),
                version: version.to_string(),
            })?;

        let stats = self.index_version_id(version_id).await?;
        info!(
            module = %module,
            version = %version,
            entities = stats.entities,
            files = stats.files_indexed,
            skipped = stats.diagnostics.len(),
            duration_ms = stats.duration_ms,
            "Indexed version"
        );
        Ok(stats)
    }

    /// Rebuild the index entries of a resolved version
    pub async fn index_version_id(&self, version_id: Uuid) -> Result<IndexStats> {
        let started = Instant::now();
        let _guard = self.locks.acquire(version_id).await?;

        let paths = self
            .registry
            .list_files(version_id)
            .await
            .map_err(|e| lookup_error(&e))?;

        let mut entities = Vec::new();
        let mut imports = Vec::new();
        let mut diagnostics = Vec::new();
        let mut files_indexed = 0;

        for path in &paths {
            let content = match self.registry.file_content(version_id, path).await {
                Ok(Some(content)) => content,
                Ok(None) => {
                    let diagnostic = FileDiagnostic {
                        path: path.clone(),
                        kind: DiagnosticKind::Missing,
                        message: Error::FileNotFound(path.clone()).to_string(),
                    };
                    warn!(version_id = %version_id, path = %path, "Schema file has no content, skipping");
                    diagnostics.push(diagnostic);
                    continue;
                }
                Err(e) => {
                    warn!(version_id = %version_id, path = %path, error = %e, "Failed to fetch schema file, skipping");
                    diagnostics.push(FileDiagnostic {
                        path: path.clone(),
                        kind: DiagnosticKind::Fetch,
                        message: e.to_string(),
                    });
                    continue;
                }
            };

            match self.parser.parse(path, &content) {
                Ok(file) => {
                    entities.extend(extract_entities(version_id, path, &file));
                    imports.extend(import_edges(path, &file));
                    files_indexed += 1;
                }
                Err(e) => {
                    warn!(version_id = %version_id, path = %path, error = %e, "Failed to parse schema file, skipping");
                    diagnostics.push(FileDiagnostic {
                        path: path.clone(),
                        kind: DiagnosticKind::Parse,
                        message: e.message,
                    });
                }
            }
        }

        debug!(
            version_id = %version_id,
            entities = entities.len(),
            imports = imports.len(),
            "Replacing version entities"
        );
        let inserted = self
            .index
            .replace_version_entities(version_id, &entities, &imports, self.batch_size)
            .await
            .map_err(|e| match e {
                Error::IndexingFailed { .. } => e,
                other => Error::IndexingFailed {
                    stage: IndexStage::Insert,
                    message: other.to_string(),
                },
            })?;

        Ok(IndexStats {
            version_id,
            files_total: paths.len(),
            files_indexed,
            diagnostics,
            entities: inserted,
            imports: imports.len(),
            duration_ms: started.elapsed().as_millis() as u64,
        })
    }

    /// Reindex every version of every module.
    ///
    /// A failing version is logged and counted; the pass continues. The
    /// token is checked before each version.
    pub async fn reindex_all(&self, cancel: &CancellationToken) -> Result<ReindexSummary> {
        let mut summary = ReindexSummary::default();
        let modules = self.registry.list_modules().await?;

        info!(modules = modules.len(), "Starting full reindex");

        for module in modules {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }

            let versions = match self.registry.list_versions(&module.name).await {
                Ok(versions) => versions,
                Err(e) => {
                    warn!(module = %module.name, error = %e, "Failed to list versions, skipping module");
                    summary.failures.push(ReindexFailure {
                        module: module.name.clone(),
                        version: "*".to_string(),
                        error: e.to_string(),
                    });
                    continue;
                }
            };

            for version in versions {
                if cancel.is_cancelled() {
                    info!(
                        indexed = summary.versions_indexed,
                        "Reindex cancelled"
                    );
                    return Err(Error::Cancelled);
                }

                summary.versions_total += 1;
                match self.index_version_id(version.id).await {
                    Ok(stats) => {
                        summary.versions_indexed += 1;
                        summary.entities += stats.entities;
                    }
                    Err(e) => {
                        warn!(
                            module = %module.name,
                            version = %version.version,
                            error = %e,
                            "Failed to reindex version"
                        );
                        summary.failures.push(ReindexFailure {
                            module: module.name.clone(),
                            version: version.version.clone(),
                            error: e.to_string(),
                        });
                    }
                }
            }
        }

        info!(
            versions = summary.versions_total,
            indexed = summary.versions_indexed,
            failed = summary.versions_failed(),
            entities = summary.entities,
            "Full reindex completed"
        );
        Ok(summary)
    }
}

fn lookup_error(err: &Error) -> Error {
    Error::IndexingFailed {
        stage: IndexStage::Lookup,
        message: err.to_string(),
    }
}
