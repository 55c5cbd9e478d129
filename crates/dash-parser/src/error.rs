//! Errors raised while turning Dash source into an AST

use pest::error::Error as PestError;
use thiserror::Error;

use crate::parser::Rule;

pub type ParseResult<T> = Result<T, ParseError>;

#[derive(Debug, Error)]
pub enum ParseError {
    /// Source text the grammar rejects
    #[error("Syntax error: {0}")]
    Syntax(#[from] Box<PestError<Rule>>),

    /// Numeric literal out of range for its type
    #[error("invalid number literal `{text}` at {line}:{column}")]
    InvalidNumber {
        text: String,
        line: usize,
        column: usize,
    },

    #[error("invalid escape `{sequence}` at {line}:{column}")]
    InvalidEscape {
        sequence: String,
        line: usize,
        column: usize,
    },

    /// A parse tree without the shape the grammar promises
    #[error("malformed parse tree: {0}")]
    Malformed(String),
}

impl From<PestError<Rule>> for ParseError {
    fn from(err: PestError<Rule>) -> Self {
        ParseError::Syntax(Box::new(err))
    }
}
