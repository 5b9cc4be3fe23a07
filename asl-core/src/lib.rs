#![forbid(unsafe_code)]

//! The compiler middle-end: pre-typechecking global checks, the
//! typechecker, and the staged AST transform pipeline.

pub mod check;
pub mod env;
pub mod error;
pub mod tc;
pub mod xform;

pub use check::check_evaluation_order;
pub use env::{GlobalEnv, Scopes, TypeDef, VarInfo, GETTER_SUFFIX, SETTER_SUFFIX};
pub use error::TypeError;
pub use tc::{CheckOptions, Checker, PRELUDE};
pub use xform::{standard_pipeline, Transform, XformConfig};
