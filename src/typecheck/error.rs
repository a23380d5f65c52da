use thiserror::Error;

use crate::lexer::Span;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("TypeError at line {line}, column {column}: {message}")]
pub struct TypeError {
    pub message: String,
    pub line: usize,
    pub column: usize,
}

impl TypeError {
    pub fn new(span: Span, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            line: span.line,
            column: span.column,
        }
    }
}

pub type TypeResult<T> = Result<T, TypeError>;
