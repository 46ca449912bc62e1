//! Parsed schema tree
//!
//! Mirrors the structure emitted by schema compilers: a file with an optional
//! package, imports, and ordered top-level messages, enums and services. Every
//! declaration carries its source line and its leading documentation comment
//! fragments exactly as they appeared (markers included).

use serde::{Deserialize, Serialize};

/// One parsed schema file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchemaFile {
    /// Root namespace (`package` declaration), if any
    pub package: Option<String>,
    /// Paths of imported schema files
    pub imports: Vec<String>,
    pub messages: Vec<Message>,
    pub enums: Vec<Enum>,
    pub services: Vec<Service>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Message {
    pub name: String,
    pub line: Option<u32>,
    pub comments: Vec<String>,
    pub fields: Vec<Field>,
    pub oneofs: Vec<Oneof>,
    /// Nested message declarations
    pub messages: Vec<Message>,
    /// Nested enum declarations
    pub enums: Vec<Enum>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Field {
    pub name: String,
    pub line: Option<u32>,
    pub comments: Vec<String>,
    #[serde(alias = "type")]
    pub type_name: String,
    pub number: i64,
    pub repeated: bool,
    pub optional: bool,
}

/// A `oneof` group; its fields belong to the enclosing message
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Oneof {
    pub name: String,
    pub fields: Vec<Field>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Enum {
    pub name: String,
    pub line: Option<u32>,
    pub comments: Vec<String>,
    pub values: Vec<EnumValue>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnumValue {
    pub name: String,
    pub line: Option<u32>,
    pub comments: Vec<String>,
    pub number: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Service {
    pub name: String,
    pub line: Option<u32>,
    pub comments: Vec<String>,
    pub methods: Vec<Method>,
}

/// An RPC method
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Method {
    pub name: String,
    pub line: Option<u32>,
    pub comments: Vec<String>,
    pub input_type: String,
    pub output_type: String,
    pub client_streaming: bool,
    pub server_streaming: bool,
}

impl SchemaFile {
    /// The root namespace, treating a blank package as absent
    pub fn namespace(&self) -> &str {
        self.package.as_deref().map(str::trim).unwrap_or_default()
    }
}

impl Message {
    /// Declared fields followed by the fields of every oneof group
    pub fn all_fields(&self) -> impl Iterator<Item = &Field> {
        self.fields
            .iter()
            .chain(self.oneofs.iter().flat_map(|oneof| oneof.fields.iter()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_namespace_blank_package() {
        let file = SchemaFile {
            package: Some("  ".to_string()),
            ..Default::default()
        };
        assert_eq!(file.namespace(), "");

        let file = SchemaFile::default();
        assert_eq!(file.namespace(), "");
    }

    #[test]
    fn test_all_fields_includes_oneofs() {
        let message = Message {
            name: "Contact".to_string(),
            fields: vec![Field {
                name: "id".to_string(),
                ..Default::default()
            }],
            oneofs: vec![Oneof {
                name: "channel".to_string(),
                fields: vec![
                    Field {
                        name: "email".to_string(),
                        ..Default::default()
                    },
                    Field {
                        name: "phone".to_string(),
                        ..Default::default()
                    },
                ],
            }],
            ..Default::default()
        };

        let names: Vec<&str> = message.all_fields().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["id", "email", "phone"]);
    }
}
