//! Query DSL parser
//!
//! Grammar, informally:
//!
//! ```text
//! query  := token*
//! token  := filter | AND | OR | NOT | term
//! filter := key ":" value          (key is case-insensitive)
//! key    := entity | type | module | version | imports
//!         | depends-on | depends_on | has-comment
//! value  := bare | "quoted value"
//! ```
//!
//! Tokens are separated by whitespace outside double quotes. A `key:value`
//! token whose key is not listed above is an ordinary term.

use super::entity::{BoolOperator, EntityType, ModulePattern, ParsedQuery};
use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FilterKey {
    Entity,
    Type,
    Module,
    Version,
    Imports,
    DependsOn,
    HasComment,
}

impl FilterKey {
    fn parse(key: &str) -> Option<Self> {
        match key.to_ascii_lowercase().as_str() {
            "entity" => Some(Self::Entity),
            "type" => Some(Self::Type),
            "module" => Some(Self::Module),
            "version" => Some(Self::Version),
            "imports" => Some(Self::Imports),
            "depends-on" | "depends_on" => Some(Self::DependsOn),
            "has-comment" => Some(Self::HasComment),
            _ => None,
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            Self::Entity => "entity",
            Self::Type => "type",
            Self::Module => "module",
            Self::Version => "version",
            Self::Imports => "imports",
            Self::DependsOn => "depends-on",
            Self::HasComment => "has-comment",
        }
    }
}

/// Parse a raw query string into its structured form.
///
/// Empty input yields an empty query. A filter with an empty value, or an
/// `entity:` value outside the known kinds, fails the whole parse.
pub fn parse_query(raw: &str) -> Result<ParsedQuery> {
    let mut parsed = ParsedQuery {
        raw: raw.to_string(),
        ..Default::default()
    };
    let mut pending: Option<BoolOperator> = None;

    for token in split_query_tokens(raw) {
        if let Some((key, value)) = split_filter(&token) {
            apply_filter(&mut parsed, key, value)?;
            continue;
        }

        if let Some(op) = BoolOperator::parse(&token) {
            if parsed.terms.is_empty() {
                tracing::debug!(operator = %op, "Dropping leading operator");
            } else {
                pending = Some(op);
            }
            continue;
        }

        let (term, _) = unquote(&token);
        if term.is_empty() {
            continue;
        }
        if !parsed.terms.is_empty() {
            parsed.operators.push(pending.take().unwrap_or_default());
        }
        parsed.terms.push(term);
    }

    if let Some(op) = pending {
        tracing::debug!(operator = %op, "Dropping trailing operator");
    }

    tracing::debug!(
        terms = parsed.terms.len(),
        has_filters = parsed.has_filters(),
        "Parsed search query"
    );
    Ok(parsed)
}

/// Split on whitespace, keeping quoted spans (quotes included) in one token.
/// An unclosed quote runs to the end of input. A `"` inside a bare word is
/// an ordinary character.
fn split_query_tokens(raw: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;

    for ch in raw.chars() {
        if in_quotes {
            current.push(ch);
            if ch == '"' {
                in_quotes = false;
            }
            continue;
        }
        if ch == '"' && opens_quote(&current) {
            in_quotes = true;
            current.push(ch);
            continue;
        }
        if ch.is_whitespace() {
            if !current.is_empty() {
                tokens.push(std::mem::take(&mut current));
            }
        } else {
            current.push(ch);
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

/// Quotes open at the start of a token or right after a filter key's `:`
fn opens_quote(current: &str) -> bool {
    current.is_empty()
        || current
            .strip_suffix(':')
            .is_some_and(|key| FilterKey::parse(key).is_some())
}

fn split_filter(token: &str) -> Option<(FilterKey, &str)> {
    let (key, value) = token.split_once(':')?;
    let key = FilterKey::parse(key)?;
    Some((key, value))
}

/// Strip surrounding double quotes. Returns the inner text and whether the
/// value was quoted; a missing closing quote is tolerated.
fn unquote(value: &str) -> (String, bool) {
    let trimmed = value.trim();
    match trimmed.strip_prefix('"') {
        Some(rest) => {
            let inner = rest.strip_suffix('"').unwrap_or(rest);
            (inner.trim().to_string(), true)
        }
        None => (trimmed.to_string(), false),
    }
}

fn apply_filter(parsed: &mut ParsedQuery, key: FilterKey, raw_value: &str) -> Result<()> {
    let (value, quoted) = unquote(raw_value);
    if value.is_empty() {
        return Err(Error::InvalidQuery(format!(
            "filter '{}:' requires a value",
            key.as_str()
        )));
    }

    match key {
        FilterKey::Entity => {
            let entity_type = EntityType::parse(&value).ok_or_else(|| {
                Error::InvalidQuery(format!("unknown entity kind '{}'", value))
            })?;
            push_unique(&mut parsed.entity_types, entity_type);
        }
        FilterKey::Type => push_unique(&mut parsed.field_types, value),
        FilterKey::Module => {
            parsed.module_pattern = Some(if quoted {
                ModulePattern::Exact(value)
            } else {
                ModulePattern::from_value(&value)
            });
        }
        FilterKey::Version => parsed.version_constraint = Some(value),
        FilterKey::Imports => push_unique(&mut parsed.imports, value),
        FilterKey::DependsOn => push_unique(&mut parsed.depends_on, value),
        FilterKey::HasComment => {
            if is_truthy(&value) {
                parsed.has_comment = true;
            }
        }
    }
    Ok(())
}

fn is_truthy(value: &str) -> bool {
    matches!(value.to_ascii_lowercase().as_str(), "true" | "1" | "yes")
}

fn push_unique<T: PartialEq>(items: &mut Vec<T>, item: T) {
    if !items.contains(&item) {
        items.push(item);
    }
}
