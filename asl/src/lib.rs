#![forbid(unsafe_code)]

//! Shared session plumbing for the `asli` and `asl2c` front ends:
//! source loading via `ASL_PATH`, configuration JSON, and the
//! project-file command loop that drives the transform pipeline and the
//! code generator.

pub mod session;

pub use session::{Configuration, Session, SessionOptions};
