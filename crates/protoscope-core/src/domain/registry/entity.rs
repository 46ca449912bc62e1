//! Registry records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A named schema package
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Module {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

impl Module {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            description: description.into(),
            created_at: Utc::now(),
        }
    }
}

/// A published version of a module
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Version {
    pub id: Uuid,
    pub module_id: Uuid,
    pub module_name: String,
    pub version: String,
    /// Names of modules this version depends on
    pub dependencies: Vec<String>,
    pub created_at: DateTime<Utc>,
}

/// A schema file stored with a version
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaFileRecord {
    pub version_id: Uuid,
    pub path: String,
    pub content: String,
}

/// Validate a module name: non-empty, no whitespace, no `*` or quotes
pub fn validate_module_name(name: &str) -> Result<(), String> {
    if name.is_empty() {
        return Err("module name cannot be empty".to_string());
    }
    if let Some(bad) = name
        .chars()
        .find(|c| c.is_whitespace() || matches!(c, '*' | '"' | ':'))
    {
        return Err(format!("module name '{}' contains invalid character {:?}", name, bad));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_module_name() {
        assert!(validate_module_name("acme/users").is_ok());
        assert!(validate_module_name("acme.users-v2").is_ok());
        assert!(validate_module_name("").is_err());
        assert!(validate_module_name("acme users").is_err());
        assert!(validate_module_name("acme/*").is_err());
        assert!(validate_module_name("type:x").is_err());
    }

    #[test]
    fn test_module_new() {
        let module = Module::new("acme/users", "User schemas");
        assert_eq!(module.name, "acme/users");
        assert_eq!(module.description, "User schemas");
    }
}
