#![forbid(unsafe_code)]

use asl_ast::Span;
use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
#[error("parse error: {message}")]
#[diagnostic(code(asl::parse))]
pub struct ParseError {
    pub message: String,
    #[label]
    pub span: Span,
}
