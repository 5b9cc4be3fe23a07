#![forbid(unsafe_code)]

use asl_ast::{Loc, Span};
use miette::Diagnostic;
use thiserror::Error;

/// Typed diagnostics surfaced by the typechecker and the transform
/// pipeline. Recovery keeps collecting these up to a configured maximum;
/// everything downstream of the typechecker is fail-fast.
#[derive(Debug, Error, Diagnostic, Clone)]
pub enum TypeError {
    #[error("unknown {kind} `{name}`")]
    #[diagnostic(code(asl::tc::unknown))]
    UnknownObject {
        kind: &'static str,
        name: String,
        #[label]
        span: Span,
    },

    #[error("`{name}` is not a {expected}")]
    #[diagnostic(code(asl::tc::not_a))]
    IsNotA {
        name: String,
        expected: &'static str,
        #[label]
        span: Span,
    },

    #[error("{what} does not match: expected {expected}, got {got}")]
    #[diagnostic(code(asl::tc::mismatch))]
    DoesNotMatch {
        what: String,
        expected: String,
        got: String,
        #[label]
        span: Span,
    },

    #[error("ambiguous use of `{name}`: candidates {candidates}")]
    #[diagnostic(code(asl::tc::ambiguous))]
    Ambiguous {
        name: String,
        candidates: String,
        #[label]
        span: Span,
    },

    #[error("type error: {message}")]
    #[diagnostic(code(asl::tc::error))]
    TypeError {
        message: String,
        #[label]
        span: Span,
    },

    #[error("unimplemented: {what}")]
    #[diagnostic(code(asl::tc::unimplemented))]
    Unimplemented {
        what: String,
        #[label]
        span: Span,
    },

    #[error("internal error: {message}")]
    #[diagnostic(code(asl::internal))]
    Internal {
        message: String,
        #[label]
        span: Span,
    },
}

impl TypeError {
    pub fn type_error(loc: &Loc, message: impl Into<String>) -> Self {
        TypeError::TypeError {
            message: message.into(),
            span: loc.span(),
        }
    }

    pub fn unknown(loc: &Loc, kind: &'static str, name: impl Into<String>) -> Self {
        TypeError::UnknownObject {
            kind,
            name: name.into(),
            span: loc.span(),
        }
    }

    pub fn unimplemented(loc: &Loc, what: impl Into<String>) -> Self {
        TypeError::Unimplemented {
            what: what.into(),
            span: loc.span(),
        }
    }

    pub fn internal(loc: &Loc, message: impl Into<String>) -> Self {
        TypeError::Internal {
            message: message.into(),
            span: loc.span(),
        }
    }

    pub fn mismatch(
        loc: &Loc,
        what: impl Into<String>,
        expected: impl Into<String>,
        got: impl Into<String>,
    ) -> Self {
        TypeError::DoesNotMatch {
            what: what.into(),
            expected: expected.into(),
            got: got.into(),
            span: loc.span(),
        }
    }
}
