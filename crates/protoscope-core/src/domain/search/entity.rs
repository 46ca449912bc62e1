//! Search entity and related types
//!
//! Defines the indexed entity row, the structured query produced by the
//! parser, and the request/response types of the search service.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

/// Kinds of schema elements that are indexed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Message,
    Field,
    Enum,
    EnumValue,
    Service,
    /// RPC method
    Method,
}

impl EntityType {
    /// Convert to string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Message => "message",
            Self::Field => "field",
            Self::Enum => "enum",
            Self::EnumValue => "enum_value",
            Self::Service => "service",
            Self::Method => "method",
        }
    }

    /// Parse from string representation (case-insensitive)
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "message" => Some(Self::Message),
            "field" => Some(Self::Field),
            "enum" => Some(Self::Enum),
            "enum_value" => Some(Self::EnumValue),
            "service" => Some(Self::Service),
            "method" => Some(Self::Method),
            _ => None,
        }
    }

    /// Get all entity types
    pub fn all() -> Vec<Self> {
        vec![
            Self::Message,
            Self::Field,
            Self::Enum,
            Self::EnumValue,
            Self::Service,
            Self::Method,
        ]
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One flattened schema element
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchEntity {
    pub version_id: Uuid,
    pub entity_type: EntityType,
    /// Local, unqualified name
    pub entity_name: String,
    /// Dot-qualified path from the root namespace
    pub full_path: String,
    /// `full_path` of the enclosing entity, or the namespace at top level
    pub parent_path: String,
    pub proto_file_path: String,
    pub line_number: Option<u32>,
    /// First line of the leading documentation comment
    pub description: String,
    /// All documentation comment lines, space-joined
    pub comments: String,
    pub field_type: Option<String>,
    /// Field number, or the numeric tag of an enum value
    pub field_number: Option<i64>,
    pub is_repeated: bool,
    pub is_optional: bool,
    pub method_input_type: Option<String>,
    pub method_output_type: Option<String>,
    /// Streaming flags of a method, present only when set
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, bool>,
}

impl SearchEntity {
    pub fn new(
        version_id: Uuid,
        entity_type: EntityType,
        entity_name: impl Into<String>,
        full_path: impl Into<String>,
        parent_path: impl Into<String>,
        proto_file_path: impl Into<String>,
    ) -> Self {
        Self {
            version_id,
            entity_type,
            entity_name: entity_name.into(),
            full_path: full_path.into(),
            parent_path: parent_path.into(),
            proto_file_path: proto_file_path.into(),
            line_number: None,
            description: String::new(),
            comments: String::new(),
            field_type: None,
            field_number: None,
            is_repeated: false,
            is_optional: false,
            method_input_type: None,
            method_output_type: None,
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_line(mut self, line: Option<u32>) -> Self {
        self.line_number = line;
        self
    }

    pub fn with_docs(mut self, description: impl Into<String>, comments: impl Into<String>) -> Self {
        self.description = description.into();
        self.comments = comments.into();
        self
    }

    pub fn with_field(
        mut self,
        field_type: impl Into<String>,
        number: i64,
        repeated: bool,
        optional: bool,
    ) -> Self {
        self.field_type = Some(field_type.into());
        self.field_number = Some(number);
        self.is_repeated = repeated;
        self.is_optional = optional;
        self
    }

    pub fn with_number(mut self, number: i64) -> Self {
        self.field_number = Some(number);
        self
    }

    pub fn with_method(
        mut self,
        input_type: impl Into<String>,
        output_type: impl Into<String>,
        client_streaming: bool,
        server_streaming: bool,
    ) -> Self {
        self.method_input_type = Some(input_type.into());
        self.method_output_type = Some(output_type.into());
        if client_streaming {
            self.metadata.insert("client_streaming".to_string(), true);
        }
        if server_streaming {
            self.metadata.insert("server_streaming".to_string(), true);
        }
        self
    }
}

/// An `import` declared by an indexed schema file
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImportEdge {
    pub proto_file_path: String,
    pub import_path: String,
}

impl ImportEdge {
    pub fn new(proto_file_path: impl Into<String>, import_path: impl Into<String>) -> Self {
        Self {
            proto_file_path: proto_file_path.into(),
            import_path: import_path.into(),
        }
    }
}

/// Boolean connector between two free-text terms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoolOperator {
    #[default]
    And,
    Or,
    Not,
}

impl BoolOperator {
    /// Parse an operator keyword; keywords are upper-case only
    pub fn parse(token: &str) -> Option<Self> {
        match token {
            "AND" => Some(Self::And),
            "OR" => Some(Self::Or),
            "NOT" => Some(Self::Not),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::And => "AND",
            Self::Or => "OR",
            Self::Not => "NOT",
        }
    }
}

impl fmt::Display for BoolOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Constraint on the owning module's name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum ModulePattern {
    Exact(String),
    /// Contains `*` wildcards
    Wildcard(String),
}

impl ModulePattern {
    /// Classify an unquoted module value
    pub fn from_value(value: &str) -> Self {
        if value.contains('*') {
            Self::Wildcard(value.to_string())
        } else {
            Self::Exact(value.to_string())
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Exact(s) | Self::Wildcard(s) => s,
        }
    }
}

/// Structured form of a query string
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedQuery {
    /// Free-text terms, case preserved
    pub terms: Vec<String>,
    /// `operators[i]` joins `terms[i]` and `terms[i + 1]`
    pub operators: Vec<BoolOperator>,
    pub entity_types: Vec<EntityType>,
    pub field_types: Vec<String>,
    pub module_pattern: Option<ModulePattern>,
    pub version_constraint: Option<String>,
    pub imports: Vec<String>,
    pub depends_on: Vec<String>,
    /// Set only by a truthy `has-comment:` clause; `has-comment:false`
    /// leaves it false, same as no clause at all
    pub has_comment: bool,
    /// The original input
    pub raw: String,
}

impl ParsedQuery {
    /// Whether any structured filter is present
    pub fn has_filters(&self) -> bool {
        !self.entity_types.is_empty()
            || !self.field_types.is_empty()
            || self.module_pattern.is_some()
            || self.version_constraint.is_some()
            || !self.imports.is_empty()
            || !self.depends_on.is_empty()
            || self.has_comment
    }

    /// Connector recorded before term `index` (the first term has none)
    pub fn operator_before(&self, index: usize) -> Option<BoolOperator> {
        index
            .checked_sub(1)
            .and_then(|i| self.operators.get(i).copied())
    }
}

/// A search request
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    /// Page size; unset or non-positive means the configured default
    pub limit: Option<i64>,
    pub offset: i64,
}

impl SearchRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            limit: None,
            offset: 0,
        }
    }

    pub fn with_limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_offset(mut self, offset: i64) -> Self {
        self.offset = offset;
        self
    }
}

/// One ranked result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub entity: SearchEntity,
    pub module_name: String,
    pub version: String,
    /// Relevance; lower is better. Absent for filter-only searches.
    pub score: Option<f64>,
}

/// Result page of a search
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResponse {
    pub results: Vec<SearchHit>,
    pub total_count: i64,
    pub query: String,
    pub parsed: Option<ParsedQuery>,
    /// Compiled full-text expression, if the query had searchable terms
    pub expression: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl SearchResponse {
    /// An empty response for a query with nothing to search
    pub fn empty(query: impl Into<String>) -> Self {
        Self {
            results: Vec::new(),
            total_count: 0,
            query: query.into(),
            parsed: None,
            expression: None,
            warnings: Vec::new(),
        }
    }

    pub fn has_more(&self, offset: i64) -> bool {
        offset + (self.results.len() as i64) < self.total_count
    }
}

/// One recorded query execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHistoryEntry {
    pub id: i64,
    pub query: String,
    pub result_count: i64,
    pub duration_ms: i64,
    pub created_at: DateTime<Utc>,
}

/// A past query offered as a completion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Suggestion {
    pub query: String,
    pub frequency: i64,
    pub last_used_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_type_roundtrip() {
        for entity_type in EntityType::all() {
            assert_eq!(EntityType::parse(entity_type.as_str()), Some(entity_type));
        }
        assert_eq!(EntityType::parse("ENUM_VALUE"), Some(EntityType::EnumValue));
        assert_eq!(EntityType::parse("rpc"), None);
    }

    #[test]
    fn test_entity_type_serde_snake_case() {
        let json = serde_json::to_string(&EntityType::EnumValue).unwrap();
        assert_eq!(json, "\"enum_value\"");
    }

    #[test]
    fn test_bool_operator_case_sensitive() {
        assert_eq!(BoolOperator::parse("OR"), Some(BoolOperator::Or));
        assert_eq!(BoolOperator::parse("or"), None);
        assert_eq!(BoolOperator::parse("Not"), None);
    }

    #[test]
    fn test_module_pattern_from_value() {
        assert_eq!(
            ModulePattern::from_value("acme/*"),
            ModulePattern::Wildcard("acme/*".to_string())
        );
        assert_eq!(
            ModulePattern::from_value("acme/users"),
            ModulePattern::Exact("acme/users".to_string())
        );
    }

    #[test]
    fn test_has_filters() {
        let mut query = ParsedQuery::default();
        assert!(!query.has_filters());

        query.terms.push("user".to_string());
        assert!(!query.has_filters());

        query.depends_on.push("acme/common".to_string());
        assert!(query.has_filters());
    }

    #[test]
    fn test_method_metadata_only_when_streaming() {
        let id = Uuid::new_v4();
        let unary = SearchEntity::new(id, EntityType::Method, "Get", "s.Get", "s", "a.json")
            .with_method("Req", "Resp", false, false);
        assert!(unary.metadata.is_empty());

        let stream = SearchEntity::new(id, EntityType::Method, "Tail", "s.Tail", "s", "a.json")
            .with_method("Req", "Resp", false, true);
        assert_eq!(stream.metadata.get("server_streaming"), Some(&true));
        assert!(!stream.metadata.contains_key("client_streaming"));
    }

    #[test]
    fn test_search_response_has_more() {
        let mut response = SearchResponse::empty("x");
        response.total_count = 3;
        assert!(response.has_more(0));
        assert!(!response.has_more(3));
    }
}
