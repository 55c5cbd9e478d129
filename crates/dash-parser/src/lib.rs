//! Dash Parser
//!
//! This crate provides the parser for the Dash scripting language.
//! It uses pest for parsing and produces the AST consumed by `dash-runtime`.

pub mod ast;
pub mod error;
pub mod parser;

pub use ast::*;
pub use error::{ParseError, ParseResult};
pub use parser::{parse_chunk, parse_expression, parse_module};
