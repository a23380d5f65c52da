use thiserror::Error;

use crate::lexer::Span;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("ParserError at line {line}, column {column}: {message}")]
pub struct ParseError {
    pub message: String,
    pub line: usize,
    pub column: usize,
}

impl ParseError {
    pub fn new(span: Span, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            line: span.line,
            column: span.column,
        }
    }
}

pub type ParseResult<T> = Result<T, ParseError>;
