#![forbid(unsafe_code)]

//! The C-family backend: a runtime capability abstraction with three
//! interchangeable implementations, and the emitter that turns the
//! lowered monomorphic AST into header and source files.

pub mod emit;
pub mod runtime;

pub use emit::{emit, EmitError, EmitOptions, EmittedFile, Emitter};
pub use runtime::{select_runtime, RuntimeKind, RuntimeLib};
