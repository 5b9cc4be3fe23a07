#![forbid(unsafe_code)]

use std::fmt;
use std::sync::Arc;

use miette::SourceSpan;

pub type Span = SourceSpan;

pub fn span(start: usize, len: usize) -> Span {
    SourceSpan::new(start.into(), len)
}

pub fn span_between(start: usize, end: usize) -> Span {
    debug_assert!(end >= start);
    span(start, end - start)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct LineCol {
    pub line: u32,
    pub col: u32,
}

/// A source location: either unknown, or a range of (file, line, column)
/// positions plus the byte span used for diagnostic labels.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub enum Loc {
    #[default]
    Unknown,
    Range {
        file: Arc<str>,
        start: LineCol,
        end: LineCol,
        span: Span,
    },
}

impl Loc {
    pub fn range(file: &str, start: LineCol, end: LineCol, span: Span) -> Self {
        Loc::Range {
            file: Arc::from(file),
            start,
            end,
            span,
        }
    }

    pub fn span(&self) -> Span {
        match self {
            Loc::Unknown => span(0, 0),
            Loc::Range { span, .. } => *span,
        }
    }

    pub fn file(&self) -> Option<&str> {
        match self {
            Loc::Unknown => None,
            Loc::Range { file, .. } => Some(file),
        }
    }

    pub fn start_line(&self) -> Option<u32> {
        match self {
            Loc::Unknown => None,
            Loc::Range { start, .. } => Some(start.line),
        }
    }

    /// The smallest range covering both locations. Files are expected to
    /// match; if they do not, `self` wins.
    pub fn merge(&self, other: &Loc) -> Loc {
        match (self, other) {
            (Loc::Unknown, o) => o.clone(),
            (s, Loc::Unknown) => s.clone(),
            (
                Loc::Range {
                    file,
                    start,
                    end,
                    span: a,
                },
                Loc::Range {
                    file: file2,
                    start: start2,
                    end: end2,
                    span: b,
                },
            ) => {
                if file != file2 {
                    return self.clone();
                }
                let lo = a.offset().min(b.offset());
                let hi = (a.offset() + a.len()).max(b.offset() + b.len());
                Loc::Range {
                    file: file.clone(),
                    start: (*start).min(*start2),
                    end: (*end).max(*end2),
                    span: span_between(lo, hi),
                }
            }
        }
    }
}

impl fmt::Display for Loc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Loc::Unknown => write!(f, "<unknown location>"),
            Loc::Range {
                file, start, end, ..
            } => {
                if start.line == end.line {
                    write!(f, "{}:{}.{}-{}", file, start.line, start.col, end.col)
                } else {
                    write!(
                        f,
                        "{}:{}.{}-{}.{}",
                        file, start.line, start.col, end.line, end.col
                    )
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_extends_range() {
        let a = Loc::range(
            "t.asl",
            LineCol { line: 1, col: 1 },
            LineCol { line: 1, col: 5 },
            span_between(0, 4),
        );
        let b = Loc::range(
            "t.asl",
            LineCol { line: 2, col: 1 },
            LineCol { line: 2, col: 9 },
            span_between(10, 18),
        );
        let m = a.merge(&b);
        assert_eq!(m.span(), span_between(0, 18));
        assert_eq!(m.merge(&Loc::Unknown), m);
    }
}
