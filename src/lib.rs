//! `pbc` library crate.
//!
//! High-level layout:
//! - frontend: `lexer` + `parser` produce the shared AST (`parser::ast`)
//! - semantic analysis: `typecheck` binds names and resolves every
//!   expression's static type
//! - backend: `codegen` lowers the typed AST to a C99 translation unit
//!   that links against the embedded `pb_runtime`
pub mod codegen;
pub mod lexer;
pub mod parser;
pub mod typecheck;

pub use parser::ast;

use thiserror::Error;

/// First error of whichever phase failed; each phase's message names the
/// phase (`LexerError …`, `ParserError …`, `TypeError …`).
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CompileError {
    #[error(transparent)]
    Lex(#[from] lexer::LexError),
    #[error(transparent)]
    Parse(#[from] parser::ParseError),
    #[error(transparent)]
    Type(#[from] typecheck::TypeError),
}

/// Run the full pipeline on one PB source file and return the generated
/// C translation unit.
pub fn compile(source: &str) -> Result<String, CompileError> {
    let tokens = lexer::tokenize(source)?;
    let mut program = parser::parse_tokens(tokens)?;
    let info = typecheck::check(&mut program)?;
    Ok(codegen::generate(&program, &info))
}
