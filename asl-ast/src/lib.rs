#![forbid(unsafe_code)]

//! Identifiers, source locations, primitive values, and the abstract
//! syntax tree shared by every stage of the pipeline.

pub mod ast;
pub mod fold;
pub mod ident;
pub mod loc;
pub mod print;
pub mod subst;
pub mod value;
pub mod visitor;

pub use ast::*;
pub use ident::{Ident, NameSupply};
pub use loc::{span, span_between, LineCol, Loc, Span};
pub use value::{Bits, Mask, SizedInt, Value, ValueError};
pub use visitor::{
    walk_decl, walk_decls, walk_expr, walk_lexpr, walk_pattern, walk_slice, walk_stmt, walk_stmts,
    walk_ty, Action, Visitor,
};
