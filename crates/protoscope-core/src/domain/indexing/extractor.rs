//! Entity extraction
//!
//! Flattens one parsed schema file into path-qualified search entities.
//! Top-level declarations are qualified by the file's package; nested
//! declarations by the full path of the message that encloses them.

use uuid::Uuid;

use crate::domain::schema::{Enum, Field, Message, SchemaFile, Service};
use crate::domain::search::{EntityType, ImportEdge, SearchEntity};

/// Walk a schema file and emit one entity per declaration
pub fn extract_entities(version_id: Uuid, path: &str, file: &SchemaFile) -> Vec<SearchEntity> {
    let mut extractor = Extractor {
        version_id,
        path,
        entities: Vec::new(),
    };
    let namespace = file.namespace();

    for message in &file.messages {
        extractor.message(message, namespace);
    }
    for en in &file.enums {
        extractor.enumeration(en, namespace);
    }
    for service in &file.services {
        extractor.service(service, namespace);
    }

    extractor.entities
}

/// Import edges declared by a schema file
pub fn import_edges(path: &str, file: &SchemaFile) -> Vec<ImportEdge> {
    let mut edges: Vec<ImportEdge> = Vec::new();
    for import in &file.imports {
        let import = import.trim();
        if import.is_empty() {
            continue;
        }
        let edge = ImportEdge::new(path, import);
        if !edges.contains(&edge) {
            edges.push(edge);
        }
    }
    edges
}

/// Strip comment markers from leading documentation fragments.
///
/// Each fragment may span several lines; blank lines are dropped.
pub fn clean_comments(fragments: &[String]) -> Vec<String> {
    fragments
        .iter()
        .flat_map(|fragment| fragment.lines())
        .filter_map(|line| {
            let mut line = line.trim();
            for marker in ["///", "//!", "//", "/**", "/*"] {
                if let Some(rest) = line.strip_prefix(marker) {
                    line = rest;
                    break;
                }
            }
            line = line.trim_end();
            line = line.strip_suffix("*/").unwrap_or(line).trim();
            line = line.strip_prefix('*').unwrap_or(line).trim();
            if line.is_empty() {
                None
            } else {
                Some(line.to_string())
            }
        })
        .collect()
}

/// `(description, comments)` for a declaration's documentation
fn docs(fragments: &[String]) -> (String, String) {
    let lines = clean_comments(fragments);
    let description = lines.first().cloned().unwrap_or_default();
    (description, lines.join(" ").trim().to_string())
}

fn qualify(namespace: &str, name: &str) -> String {
    if namespace.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", namespace, name)
    }
}

struct Extractor<'a> {
    version_id: Uuid,
    path: &'a str,
    entities: Vec<SearchEntity>,
}

impl Extractor<'_> {
    fn entity(
        &self,
        entity_type: EntityType,
        name: &str,
        parent: &str,
        line: Option<u32>,
        comments: &[String],
    ) -> SearchEntity {
        let (description, comments) = docs(comments);
        SearchEntity::new(
            self.version_id,
            entity_type,
            name,
            qualify(parent, name),
            parent,
            self.path,
        )
        .with_line(line)
        .with_docs(description, comments)
    }

    fn message(&mut self, message: &Message, namespace: &str) {
        let entity = self.entity(
            EntityType::Message,
            &message.name,
            namespace,
            message.line,
            &message.comments,
        );
        let full_path = entity.full_path.clone();
        self.entities.push(entity);

        for field in message.all_fields() {
            self.field(field, &full_path);
        }
        for nested in &message.messages {
            self.message(nested, &full_path);
        }
        for en in &message.enums {
            self.enumeration(en, &full_path);
        }
    }

    fn field(&mut self, field: &Field, parent: &str) {
        let entity = self
            .entity(
                EntityType::Field,
                &field.name,
                parent,
                field.line,
                &field.comments,
            )
            .with_field(&field.type_name, field.number, field.repeated, field.optional);
        self.entities.push(entity);
    }

    fn enumeration(&mut self, en: &Enum, namespace: &str) {
        let entity = self.entity(EntityType::Enum, &en.name, namespace, en.line, &en.comments);
        let full_path = entity.full_path.clone();
        self.entities.push(entity);

        for value in &en.values {
            let entity = self
                .entity(
                    EntityType::EnumValue,
                    &value.name,
                    &full_path,
                    value.line,
                    &value.comments,
                )
                .with_number(value.number);
            self.entities.push(entity);
        }
    }

    fn service(&mut self, service: &Service, namespace: &str) {
        let entity = self.entity(
            EntityType::Service,
            &service.name,
            namespace,
            service.line,
            &service.comments,
        );
        let full_path = entity.full_path.clone();
        self.entities.push(entity);

        for method in &service.methods {
            let entity = self
                .entity(
                    EntityType::Method,
                    &method.name,
                    &full_path,
                    method.line,
                    &method.comments,
                )
                .with_method(
                    &method.input_type,
                    &method.output_type,
                    method.client_streaming,
                    method.server_streaming,
                );
            self.entities.push(entity);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::schema::{EnumValue, Method, Oneof};
    use std::collections::HashSet;

    fn field(name: &str, type_name: &str, number: i64) -> Field {
        Field {
            name: name.to_string(),
            type_name: type_name.to_string(),
            number,
            ..Default::default()
        }
    }

    fn nested_file() -> SchemaFile {
        SchemaFile {
            package: Some("pkg".to_string()),
            messages: vec![Message {
                name: "Outer".to_string(),
                fields: vec![field("id", "string", 1), field("count", "int32", 2)],
                messages: vec![Message {
                    name: "Inner".to_string(),
                    fields: vec![field("value", "bytes", 1)],
                    ..Default::default()
                }],
                enums: vec![Enum {
                    name: "State".to_string(),
                    values: vec![
                        EnumValue {
                            name: "UNKNOWN".to_string(),
                            number: 0,
                            ..Default::default()
                        },
                        EnumValue {
                            name: "ACTIVE".to_string(),
                            number: 1,
                            ..Default::default()
                        },
                    ],
                    ..Default::default()
                }],
                ..Default::default()
            }],
            ..Default::default()
        }
    }

    #[test]
    fn test_nested_message_yields_eight_entities() {
        let entities = extract_entities(Uuid::new_v4(), "pkg.json", &nested_file());
        assert_eq!(entities.len(), 8);

        let count = |t: EntityType| entities.iter().filter(|e| e.entity_type == t).count();
        assert_eq!(count(EntityType::Message), 2);
        assert_eq!(count(EntityType::Field), 3);
        assert_eq!(count(EntityType::Enum), 1);
        assert_eq!(count(EntityType::EnumValue), 2);

        let inner = entities
            .iter()
            .find(|e| e.entity_name == "Inner")
            .unwrap();
        assert_eq!(inner.full_path, "pkg.Outer.Inner");
        assert_eq!(inner.parent_path, "pkg.Outer");

        let active = entities
            .iter()
            .find(|e| e.entity_name == "ACTIVE")
            .unwrap();
        assert_eq!(active.full_path, "pkg.Outer.State.ACTIVE");
        assert_eq!(active.field_number, Some(1));
    }

    #[test]
    fn test_parent_paths_resolve_within_version() {
        let entities = extract_entities(Uuid::new_v4(), "pkg.json", &nested_file());
        let paths: HashSet<&str> = entities.iter().map(|e| e.full_path.as_str()).collect();

        for entity in &entities {
            if entity.parent_path != "pkg" {
                assert!(
                    paths.contains(entity.parent_path.as_str()),
                    "{} has dangling parent {}",
                    entity.full_path,
                    entity.parent_path
                );
            }
        }
    }

    #[test]
    fn test_top_level_without_package() {
        let file = SchemaFile {
            enums: vec![Enum {
                name: "Color".to_string(),
                ..Default::default()
            }],
            ..Default::default()
        };
        let entities = extract_entities(Uuid::new_v4(), "c.json", &file);
        assert_eq!(entities[0].full_path, "Color");
        assert_eq!(entities[0].parent_path, "");
        assert_eq!(entities[0].proto_file_path, "c.json");
    }

    #[test]
    fn test_field_attributes_and_oneofs() {
        let file = SchemaFile {
            package: Some("acme".to_string()),
            messages: vec![Message {
                name: "Contact".to_string(),
                fields: vec![Field {
                    name: "tags".to_string(),
                    type_name: "string".to_string(),
                    number: 3,
                    repeated: true,
                    line: Some(7),
                    ..Default::default()
                }],
                oneofs: vec![Oneof {
                    name: "channel".to_string(),
                    fields: vec![field("email", "string", 4)],
                }],
                ..Default::default()
            }],
            ..Default::default()
        };

        let entities = extract_entities(Uuid::new_v4(), "c.json", &file);
        assert_eq!(entities.len(), 3);

        let tags = &entities[1];
        assert_eq!(tags.full_path, "acme.Contact.tags");
        assert_eq!(tags.field_type.as_deref(), Some("string"));
        assert_eq!(tags.field_number, Some(3));
        assert!(tags.is_repeated);
        assert!(!tags.is_optional);
        assert_eq!(tags.line_number, Some(7));

        assert_eq!(entities[2].full_path, "acme.Contact.email");
        assert_eq!(entities[2].parent_path, "acme.Contact");
    }

    #[test]
    fn test_service_methods_and_streaming() {
        let file = SchemaFile {
            package: Some("acme".to_string()),
            services: vec![Service {
                name: "Users".to_string(),
                methods: vec![
                    Method {
                        name: "Get".to_string(),
                        input_type: "GetRequest".to_string(),
                        output_type: "User".to_string(),
                        ..Default::default()
                    },
                    Method {
                        name: "Sync".to_string(),
                        input_type: "User".to_string(),
                        output_type: "User".to_string(),
                        client_streaming: true,
                        server_streaming: true,
                        ..Default::default()
                    },
                ],
                ..Default::default()
            }],
            ..Default::default()
        };

        let entities = extract_entities(Uuid::new_v4(), "s.json", &file);
        assert_eq!(entities.len(), 3);
        assert_eq!(entities[0].entity_type, EntityType::Service);

        let get = &entities[1];
        assert_eq!(get.full_path, "acme.Users.Get");
        assert_eq!(get.method_input_type.as_deref(), Some("GetRequest"));
        assert_eq!(get.method_output_type.as_deref(), Some("User"));
        assert!(get.metadata.is_empty());

        let sync = &entities[2];
        assert_eq!(sync.metadata.get("client_streaming"), Some(&true));
        assert_eq!(sync.metadata.get("server_streaming"), Some(&true));
    }

    #[test]
    fn test_comments_populate_description() {
        let file = SchemaFile {
            messages: vec![Message {
                name: "User".to_string(),
                comments: vec![
                    "// A registered account.".to_string(),
                    "//   Created on signup.  ".to_string(),
                ],
                ..Default::default()
            }],
            ..Default::default()
        };

        let entities = extract_entities(Uuid::new_v4(), "u.json", &file);
        assert_eq!(entities[0].description, "A registered account.");
        assert_eq!(
            entities[0].comments,
            "A registered account. Created on signup."
        );
    }

    #[test]
    fn test_clean_block_comments() {
        let fragments = vec!["/**\n * First line\n *\n * Second line\n */".to_string()];
        assert_eq!(clean_comments(&fragments), vec!["First line", "Second line"]);

        assert!(clean_comments(&["//".to_string(), "   ".to_string()]).is_empty());
        assert_eq!(clean_comments(&["plain text".to_string()]), vec!["plain text"]);
    }

    #[test]
    fn test_no_comments_leaves_docs_empty() {
        let entities = extract_entities(Uuid::new_v4(), "pkg.json", &nested_file());
        assert!(entities.iter().all(|e| e.description.is_empty() && e.comments.is_empty()));
    }

    #[test]
    fn test_import_edges_deduplicated() {
        let file = SchemaFile {
            imports: vec![
                "common/time.json".to_string(),
                "common/time.json".to_string(),
                " ".to_string(),
            ],
            ..Default::default()
        };
        let edges = import_edges("users.json", &file);
        assert_eq!(edges, vec![ImportEdge::new("users.json", "common/time.json")]);
    }
}
