//! Schema domain module
//!
//! The parsed schema tree the indexer walks, and the parser boundary that
//! produces it.

pub mod ast;
pub mod parser;

pub use ast::{Enum, EnumValue, Field, Message, Method, Oneof, SchemaFile, Service};
pub use parser::{JsonSchemaParser, SchemaParseError, SchemaParser};
