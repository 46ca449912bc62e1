//! Schema parser boundary
//!
//! Turning schema source text into a [`SchemaFile`] happens outside this
//! crate. The bundled [`JsonSchemaParser`] accepts the tree already
//! serialized as JSON.

use thiserror::Error;

use super::ast::{Enum, Message, SchemaFile, Service};
use crate::error::Error;

/// A schema file could not be parsed
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{path}: {message}")]
pub struct SchemaParseError {
    pub path: String,
    pub message: String,
}

impl SchemaParseError {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

impl From<SchemaParseError> for Error {
    fn from(err: SchemaParseError) -> Self {
        Error::SchemaParse {
            path: err.path,
            message: err.message,
        }
    }
}

/// Produces a schema tree from raw file content
pub trait SchemaParser: Send + Sync {
    fn parse(&self, path: &str, content: &str) -> Result<SchemaFile, SchemaParseError>;
}

/// Reads a [`SchemaFile`] serialized as JSON
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSchemaParser;

impl JsonSchemaParser {
    pub fn new() -> Self {
        Self
    }
}

impl SchemaParser for JsonSchemaParser {
    fn parse(&self, path: &str, content: &str) -> Result<SchemaFile, SchemaParseError> {
        let file: SchemaFile = serde_json::from_str(content)
            .map_err(|e| SchemaParseError::new(path, e.to_string()))?;
        validate_names(&file).map_err(|message| SchemaParseError::new(path, message))?;
        Ok(file)
    }
}

fn validate_names(file: &SchemaFile) -> Result<(), String> {
    for message in &file.messages {
        validate_message(message, "")?;
    }
    for en in &file.enums {
        validate_enum(en, "")?;
    }
    for service in &file.services {
        validate_service(service)?;
    }
    Ok(())
}

fn validate_message(message: &Message, scope: &str) -> Result<(), String> {
    let path = require_name("message", &message.name, scope, message.line)?;
    for field in message.all_fields() {
        require_name("field", &field.name, &path, field.line)?;
    }
    for nested in &message.messages {
        validate_message(nested, &path)?;
    }
    for en in &message.enums {
        validate_enum(en, &path)?;
    }
    Ok(())
}

fn validate_enum(en: &Enum, scope: &str) -> Result<(), String> {
    let path = require_name("enum", &en.name, scope, en.line)?;
    for value in &en.values {
        require_name("enum value", &value.name, &path, value.line)?;
    }
    Ok(())
}

fn validate_service(service: &Service) -> Result<(), String> {
    let path = require_name("service", &service.name, "", service.line)?;
    for method in &service.methods {
        require_name("method", &method.name, &path, method.line)?;
    }
    Ok(())
}

fn require_name(kind: &str, name: &str, scope: &str, line: Option<u32>) -> Result<String, String> {
    if name.trim().is_empty() {
        let location = line.map(|l| format!(" at line {}", l)).unwrap_or_default();
        let within = if scope.is_empty() {
            String::new()
        } else {
            format!(" in {}", scope)
        };
        return Err(format!("{} without a name{}{}", kind, within, location));
    }
    Ok(if scope.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", scope, name)
    })
}
