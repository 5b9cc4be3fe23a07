#![forbid(unsafe_code)]

mod error;
mod parser;

use asl_lex::{Lexer, LexWarning, LineMap};
use miette::IntoDiagnostic;

pub use error::ParseError;
pub use parser::Parser;

pub fn parse_source(src: &str, file: &str) -> miette::Result<asl_ast::Declarations> {
    let out = Lexer::new(src).lex().into_diagnostic()?;
    let line_map = LineMap::new(src);
    let mut parser = Parser::new(&out.tokens, file, &line_map);
    parser.parse_declarations().into_diagnostic()
}

/// Parse and also surface lexer warnings (`else if` style hints).
pub fn parse_source_with_warnings(
    src: &str,
    file: &str,
) -> miette::Result<(asl_ast::Declarations, Vec<LexWarning>)> {
    let out = Lexer::new(src).lex().into_diagnostic()?;
    let line_map = LineMap::new(src);
    let mut parser = Parser::new(&out.tokens, file, &line_map);
    let decls = parser.parse_declarations().into_diagnostic()?;
    Ok((decls, out.warnings))
}

/// Best-effort parse returning every error encountered.
pub fn parse_source_with_recovery(
    src: &str,
    file: &str,
) -> miette::Result<(asl_ast::Declarations, Vec<ParseError>)> {
    let out = Lexer::new(src).lex().into_diagnostic()?;
    let line_map = LineMap::new(src);
    let mut parser = Parser::new(&out.tokens, file, &line_map);
    Ok(parser.parse_declarations_with_recovery())
}

pub fn parse_expr(src: &str) -> miette::Result<asl_ast::Expr> {
    let out = Lexer::new(src).lex().into_diagnostic()?;
    let line_map = LineMap::new(src);
    let mut parser = Parser::new(&out.tokens, "<expr>", &line_map);
    parser.parse_expr_eof().into_diagnostic()
}

/// Parse a statement sequence, for tests and the interactive shell.
pub fn parse_stmts(src: &str, file: &str) -> miette::Result<Vec<asl_ast::Stmt>> {
    let full = format!("func __main() begin {src} end");
    let decls = parse_source(&full, file)?;
    match decls.into_iter().next() {
        Some(asl_ast::Decl::FunDefn { body, .. }) => Ok(body),
        _ => unreachable!("wrapper function always parses to a definition"),
    }
}
