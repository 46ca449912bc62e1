//! Query compiler
//!
//! Turns a [`ParsedQuery`] into a full-text expression plus a list of
//! parameterized filter predicates.
//!
//! The canonical expression uses prefix lexemes joined by `&`, `|` and `&!`
//! (`user:* & email:*`). The store executes the equivalent FTS5 `MATCH`
//! string produced by [`TextExpression::to_fts5`].

use serde::Serialize;
use std::fmt;

use super::entity::{BoolOperator, EntityType, ModulePattern, ParsedQuery};

/// Characters with operator meaning in a full-text expression
const RESERVED: &[char] = &[
    '&', '|', '!', '(', ')', ':', '*', '<', '>', '\'', '"', '^', '+', '-',
];

const PREFIX_SUFFIX: &str = ":*";

/// Make one free-text term safe to embed in an expression.
///
/// Returns `""` for a term that is blank or consists only of reserved
/// characters. A term already ending in `:*` is returned trimmed and
/// otherwise untouched, so sanitizing twice is the same as sanitizing once.
pub fn sanitize_term(term: &str) -> String {
    let trimmed = term.trim();
    if trimmed.is_empty()
        || trimmed
            .chars()
            .all(|c| c.is_whitespace() || RESERVED.contains(&c))
    {
        return String::new();
    }
    if trimmed.ends_with(PREFIX_SUFFIX) {
        return trimmed.to_string();
    }
    format!("{}{}", trimmed.replace('\'', "''"), PREFIX_SUFFIX)
}

/// One sanitized prefix lexeme and the connector that precedes it
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Lexeme {
    pub connector: Option<BoolOperator>,
    pub text: String,
}

impl Lexeme {
    /// Lexeme body without the prefix marker or quote escaping
    fn body(&self) -> String {
        self.text
            .strip_suffix(PREFIX_SUFFIX)
            .unwrap_or(&self.text)
            .replace("''", "'")
    }
}

/// A non-empty full-text expression
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TextExpression {
    lexemes: Vec<Lexeme>,
}

impl TextExpression {
    /// Build from a parsed query; `None` when no term survives sanitizing
    pub fn from_query(query: &ParsedQuery) -> Option<Self> {
        let mut lexemes: Vec<Lexeme> = Vec::new();
        for (index, term) in query.terms.iter().enumerate() {
            let text = sanitize_term(term);
            if text.is_empty() {
                continue;
            }
            let connector = if lexemes.is_empty() {
                None
            } else {
                Some(query.operator_before(index).unwrap_or_default())
            };
            lexemes.push(Lexeme { connector, text });
        }

        if lexemes.is_empty() {
            None
        } else {
            Some(Self { lexemes })
        }
    }

    /// Render as an FTS5 `MATCH` string: `"user"* AND "email"*`.
    ///
    /// Lexemes without any letter or digit produce no FTS tokens and are
    /// skipped; `None` if nothing is left.
    pub fn to_fts5(&self) -> Option<String> {
        let mut out = String::new();
        for lexeme in &self.lexemes {
            let body = lexeme.body();
            if !body.chars().any(char::is_alphanumeric) {
                continue;
            }
            if !out.is_empty() {
                let op = match lexeme.connector.unwrap_or_default() {
                    BoolOperator::And => " AND ",
                    BoolOperator::Or => " OR ",
                    BoolOperator::Not => " NOT ",
                };
                out.push_str(op);
            }
            out.push('"');
            out.push_str(&body.replace('"', "\"\""));
            out.push_str("\"*");
        }
        if out.is_empty() { None } else { Some(out) }
    }
}

impl fmt::Display for TextExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, lexeme) in self.lexemes.iter().enumerate() {
            if i > 0 {
                let op = match lexeme.connector.unwrap_or_default() {
                    BoolOperator::And => " & ",
                    BoolOperator::Or => " | ",
                    BoolOperator::Not => " &! ",
                };
                f.write_str(op)?;
            }
            f.write_str(&lexeme.text)?;
        }
        Ok(())
    }
}

/// Canonical full-text expression for a query; empty when filter-only
pub fn to_search_expression(query: &ParsedQuery) -> String {
    TextExpression::from_query(query)
        .map(|expr| expr.to_string())
        .unwrap_or_default()
}

/// SQL fragment with positional `?` parameters.
///
/// Column references assume the aliases `e` (search_entities),
/// `v` (versions) and `m` (modules).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SqlClause {
    pub sql: String,
    pub params: Vec<String>,
}

/// One structured filter
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Predicate {
    EntityTypeIn(Vec<EntityType>),
    FieldTypeIn(Vec<String>),
    ModuleEquals(String),
    /// Module name `LIKE` pattern, already escaped and translated
    ModuleLike(String),
    VersionEquals(String),
    HasComment,
    /// Source file imports one of these paths (exact or path suffix)
    ImportsAny(Vec<String>),
    /// Version declares a dependency on one of these modules
    DependsOnAny(Vec<String>),
}

impl Predicate {
    pub fn to_sql(&self) -> SqlClause {
        match self {
            Self::EntityTypeIn(types) => in_clause(
                "e.entity_type",
                types.iter().map(|t| t.as_str().to_string()).collect(),
            ),
            Self::FieldTypeIn(types) => in_clause("e.field_type", types.clone()),
            Self::ModuleEquals(name) => SqlClause {
                sql: "m.name = ?".to_string(),
                params: vec![name.clone()],
            },
            Self::ModuleLike(pattern) => SqlClause {
                sql: "m.name LIKE ? ESCAPE '\\'".to_string(),
                params: vec![pattern.clone()],
            },
            Self::VersionEquals(version) => SqlClause {
                sql: "v.version = ?".to_string(),
                params: vec![version.clone()],
            },
            Self::HasComment => SqlClause {
                sql: "(e.comments IS NOT NULL AND e.comments <> '')".to_string(),
                params: Vec::new(),
            },
            Self::ImportsAny(paths) => {
                let mut params = Vec::with_capacity(paths.len() * 2);
                let alternatives: Vec<&str> = paths
                    .iter()
                    .map(|path| {
                        params.push(path.clone());
                        params.push(format!("%/{}", escape_like(path)));
                        "si.import_path = ? OR si.import_path LIKE ? ESCAPE '\\'"
                    })
                    .collect();
                SqlClause {
                    sql: format!(
                        "EXISTS (SELECT 1 FROM schema_imports si \
                         WHERE si.version_id = e.version_id \
                         AND si.proto_file_path = e.proto_file_path \
                         AND ({}))",
                        alternatives.join(" OR ")
                    ),
                    params,
                }
            }
            Self::DependsOnAny(modules) => {
                let inner = in_clause("vd.module_name", modules.clone());
                SqlClause {
                    sql: format!(
                        "EXISTS (SELECT 1 FROM version_dependencies vd \
                         WHERE vd.version_id = e.version_id AND {})",
                        inner.sql
                    ),
                    params: inner.params,
                }
            }
        }
    }
}

fn in_clause(column: &str, values: Vec<String>) -> SqlClause {
    let placeholders = vec!["?"; values.len()].join(", ");
    SqlClause {
        sql: format!("{} IN ({})", column, placeholders),
        params: values,
    }
}

/// Escape `LIKE` metacharacters for use with `ESCAPE '\'`
pub fn escape_like(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        if matches!(ch, '\\' | '%' | '_') {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}

/// Translate a `*` wildcard pattern into an escaped `LIKE` pattern
pub fn wildcard_to_like(pattern: &str) -> String {
    escape_like(pattern).replace('*', "%")
}

/// Whether a version constraint looks like a range rather than one version
pub fn is_range_constraint(constraint: &str) -> bool {
    let trimmed = constraint.trim();
    trimmed.starts_with(['>', '<', '=', '~', '^'])
        || trimmed.contains(',')
        || trimmed.contains(" - ")
}

/// Full-text expression and predicates for one query
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CompiledQuery {
    pub expression: Option<TextExpression>,
    pub predicates: Vec<Predicate>,
    pub warnings: Vec<String>,
}

impl CompiledQuery {
    /// FTS5 `MATCH` argument, if the search has a text component
    pub fn fts_query(&self) -> Option<String> {
        self.expression.as_ref().and_then(TextExpression::to_fts5)
    }

    /// Canonical expression string, if any
    pub fn expression_string(&self) -> Option<String> {
        self.expression.as_ref().map(ToString::to_string)
    }

    pub fn is_filter_only(&self) -> bool {
        self.fts_query().is_none()
    }

    /// Whether the query can match anything at all
    pub fn is_empty(&self) -> bool {
        self.is_filter_only() && self.predicates.is_empty()
    }

    pub fn clauses(&self) -> Vec<SqlClause> {
        self.predicates.iter().map(Predicate::to_sql).collect()
    }
}

/// Compile a parsed query
pub fn compile(query: &ParsedQuery) -> CompiledQuery {
    let mut compiled = CompiledQuery {
        expression: TextExpression::from_query(query),
        ..Default::default()
    };

    if let Some(expr) = &compiled.expression {
        if expr.to_fts5().is_none() {
            compiled.warnings.push(format!(
                "Search terms in '{}' contain no letters or digits and were ignored",
                expr
            ));
        }
    }

    if !query.entity_types.is_empty() {
        compiled
            .predicates
            .push(Predicate::EntityTypeIn(query.entity_types.clone()));
    }
    if !query.field_types.is_empty() {
        compiled
            .predicates
            .push(Predicate::FieldTypeIn(query.field_types.clone()));
    }
    match &query.module_pattern {
        Some(ModulePattern::Exact(name)) => {
            compiled.predicates.push(Predicate::ModuleEquals(name.clone()));
        }
        Some(ModulePattern::Wildcard(pattern)) => {
            compiled
                .predicates
                .push(Predicate::ModuleLike(wildcard_to_like(pattern)));
        }
        None => {}
    }
    if let Some(version) = &query.version_constraint {
        if is_range_constraint(version) {
            tracing::warn!(
                constraint = %version,
                "Version ranges are not supported; matching the exact string"
            );
            compiled.warnings.push(format!(
                "Version constraint '{}' looks like a range; only exact versions are matched",
                version
            ));
        }
        compiled
            .predicates
            .push(Predicate::VersionEquals(version.clone()));
    }
    if query.has_comment {
        compiled.predicates.push(Predicate::HasComment);
    }
    if !query.imports.is_empty() {
        compiled
            .predicates
            .push(Predicate::ImportsAny(query.imports.clone()));
    }
    if !query.depends_on.is_empty() {
        compiled
            .predicates
            .push(Predicate::DependsOnAny(query.depends_on.clone()));
    }

    tracing::debug!(
        expression = ?compiled.expression_string(),
        predicates = compiled.predicates.len(),
        "Compiled search query"
    );
    compiled
}
