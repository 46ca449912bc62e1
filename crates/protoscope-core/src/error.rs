//! Error types for Protoscope

use std::fmt;
use thiserror::Error;

/// Result type alias using Protoscope's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Stage of an index operation that failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexStage {
    /// Resolving the version identifier
    Lookup,
    /// Deleting the previous entities for the version
    Clear,
    /// Inserting the freshly extracted entities
    Insert,
}

impl IndexStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Lookup => "lookup",
            Self::Clear => "clear",
            Self::Insert => "insert",
        }
    }
}

impl fmt::Display for IndexStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Protoscope error types with helpful messages and suggestions
#[derive(Error, Debug)]
pub enum Error {
    // Registry errors (E001-E099)
    #[error("Module '{0}' not found. Run `protoscope module list` to see all modules.")]
    ModuleNotFound(String),

    #[error("Version '{version}' of module '{module}' not found.")]
    VersionNotFound { module: String, version: String },

    #[error("Schema file '{0}' not found.")]
    FileNotFound(String),

    // Lock errors (E300-E399)
    #[error("Lock timeout: version '{0}' is being indexed by another task. Try again later.")]
    LockTimeout(String),

    #[error("Operation timed out after {0} ms")]
    Timeout(u64),

    // Database errors (E400-E499)
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    #[error("Indexing failed during {stage}: {message}")]
    IndexingFailed { stage: IndexStage, message: String },

    // Config errors (E600-E699)
    #[error("Configuration error: {0}")]
    ConfigError(String),

    // User errors (E700-E799)
    #[error("Operation cancelled")]
    Cancelled,

    // Input errors (E800-E899)
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // Schema errors (E900-E999)
    #[error("Failed to parse schema file '{path}': {message}")]
    SchemaParse { path: String, message: String },

    // Generic errors
    #[error("{0}")]
    Other(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Get error code for this error type
    pub fn code(&self) -> &'static str {
        match self {
            Self::ModuleNotFound(_) => "E001",
            Self::VersionNotFound { .. } => "E002",
            Self::FileNotFound(_) => "E003",
            Self::LockTimeout(_) => "E300",
            Self::Timeout(_) => "E301",
            Self::DatabaseError(_) => "E400",
            Self::IndexingFailed { .. } => "E401",
            Self::ConfigError(_) => "E600",
            Self::Cancelled => "E700",
            Self::InvalidQuery(_) => "E800",
            Self::InvalidInput(_) => "E801",
            Self::Serialization(_) => "E802",
            Self::SchemaParse { .. } => "E900",
            Self::Other(_) | Self::Io(_) => "E9999",
        }
    }

    /// Get suggestion for how to fix this error
    pub fn suggestion(&self) -> Option<String> {
        match self {
            Self::ModuleNotFound(_) => Some("protoscope module list".to_string()),
            Self::VersionNotFound { module, .. } => {
                Some(format!("protoscope publish {} <version> <files>", module))
            }
            Self::InvalidQuery(_) => Some(
                "Valid entity kinds: message, field, enum, enum_value, service, method".to_string(),
            ),
            Self::LockTimeout(_) => Some("Wait for the running index job to finish".to_string()),
            Self::ConfigError(_) => Some("protoscope config list".to_string()),
            _ => None,
        }
    }

    /// Stage of an indexing failure, if this error came from the indexer
    pub fn index_stage(&self) -> Option<IndexStage> {
        match self {
            Self::IndexingFailed { stage, .. } => Some(*stage),
            Self::VersionNotFound { .. } => Some(IndexStage::Lookup),
            _ => None,
        }
    }
}
