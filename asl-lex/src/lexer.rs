#![forbid(unsafe_code)]

use asl_ast::{span_between, LineCol, Span};
use logos::Logos;
use miette::Diagnostic;
use thiserror::Error;

use crate::token::{Token, TokenKind};

#[derive(Debug, Error, Diagnostic)]
#[error("lex error: {message}")]
#[diagnostic(code(asl::lex))]
pub struct LexError {
    pub message: String,
    #[label]
    pub span: Span,
}

/// A non-fatal lexer observation, reported to stderr by the driver.
#[derive(Clone, Debug, PartialEq)]
pub struct LexWarning {
    pub message: String,
    pub span: Span,
}

/// Byte-offset to line/column mapping for one source file.
#[derive(Clone, Debug)]
pub struct LineMap {
    line_starts: Vec<usize>,
}

impl LineMap {
    pub fn new(src: &str) -> Self {
        let mut line_starts = vec![0];
        for (i, b) in src.bytes().enumerate() {
            if b == b'\n' {
                line_starts.push(i + 1);
            }
        }
        Self { line_starts }
    }

    /// 1-based line and column for a byte offset.
    pub fn line_col(&self, offset: usize) -> LineCol {
        let line = match self.line_starts.binary_search(&offset) {
            Ok(i) => i,
            Err(i) => i - 1,
        };
        LineCol {
            line: line as u32 + 1,
            col: (offset - self.line_starts[line]) as u32 + 1,
        }
    }
}

/// Blank out fenced triple-backtick blocks (column 0) so they behave like
/// comments. The replacement preserves byte offsets.
fn mask_fenced_blocks(src: &str) -> String {
    let mut out = String::with_capacity(src.len());
    let mut in_fence = false;
    for line in src.split_inclusive('\n') {
        let is_fence = line.starts_with("```");
        if is_fence || in_fence {
            for b in line.bytes() {
                out.push(if b == b'\n' { '\n' } else { ' ' });
            }
        } else {
            out.push_str(line);
        }
        if is_fence {
            in_fence = !in_fence;
        }
    }
    out
}

pub struct Lexer<'a> {
    src: &'a str,
}

pub struct LexOutput {
    pub tokens: Vec<Token>,
    pub warnings: Vec<LexWarning>,
}

impl<'a> Lexer<'a> {
    pub fn new(src: &'a str) -> Self {
        Self { src }
    }

    pub fn lex(&self) -> Result<LexOutput, LexError> {
        let masked = mask_fenced_blocks(self.src);
        let line_map = LineMap::new(self.src);

        let mut tokens = Vec::new();
        let mut lex = TokenKind::lexer(&masked);
        while let Some(item) = lex.next() {
            let range = lex.span();
            let span = span_between(range.start, range.end);
            match item {
                Ok(kind) => tokens.push(Token { kind, span }),
                Err(()) => {
                    return Err(LexError {
                        message: "unexpected character or malformed literal".to_string(),
                        span,
                    });
                }
            }
        }

        let mut warnings = Vec::new();
        for pair in tokens.windows(2) {
            if let [a, b] = pair {
                if a.kind == TokenKind::KwElse
                    && b.kind == TokenKind::KwIf
                    && line_map.line_col(a.span.offset()).line
                        == line_map.line_col(b.span.offset()).line
                {
                    warnings.push(LexWarning {
                        message: "`else` immediately followed by `if`; did you mean `elsif`?"
                            .to_string(),
                        span: b.span,
                    });
                }
            }
        }

        Ok(LexOutput { tokens, warnings })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use asl_ast::Bits;
    use num_bigint::{BigInt, BigUint};

    fn kinds(src: &str) -> Vec<TokenKind> {
        Lexer::new(src)
            .lex()
            .expect("lex")
            .tokens
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn keywords_and_punctuation() {
        assert_eq!(
            kinds("if x then return; end"),
            vec![
                TokenKind::KwIf,
                TokenKind::Ident("x".to_string()),
                TokenKind::KwThen,
                TokenKind::KwReturn,
                TokenKind::Semi,
                TokenKind::KwEnd,
            ]
        );
    }

    #[test]
    fn integer_literals_allow_underscores() {
        assert_eq!(
            kinds("1_000_000 0xFFFF_0000"),
            vec![
                TokenKind::IntLit(BigInt::from(1_000_000)),
                TokenKind::IntLit(BigInt::from(0xFFFF_0000u64)),
            ]
        );
    }

    #[test]
    fn bitvector_literal_forms() {
        let expect = Bits::new(8, BigUint::from(0xACu32));
        assert_eq!(kinds("'1010 1100'"), vec![TokenKind::BitsLit(expect.clone())]);
        assert_eq!(kinds("8'xAC"), vec![TokenKind::BitsLit(expect.clone())]);
        assert_eq!(kinds("8'b1010_1100"), vec![TokenKind::BitsLit(expect.clone())]);
        assert_eq!(kinds("8'd172"), vec![TokenKind::BitsLit(expect)]);
    }

    #[test]
    fn mask_literal_has_dont_cares() {
        match &kinds("'10xx'")[0] {
            TokenKind::MaskLit(m) => {
                assert_eq!(m.width, 4);
                assert_eq!(m.care, BigUint::from(0b1100u32));
                assert_eq!(m.value, BigUint::from(0b1000u32));
            }
            other => panic!("not a mask: {other:?}"),
        }
    }

    #[test]
    fn sized_int_literals() {
        match &kinds("i8'd12")[0] {
            TokenKind::SizedIntLit(v) => {
                assert_eq!(v.width, 8);
                assert_eq!(v.value, BigInt::from(12));
            }
            other => panic!("not a sized int: {other:?}"),
        }
        // Bit-pattern forms reinterpret as two's complement.
        match &kinds("i4'xF")[0] {
            TokenKind::SizedIntLit(v) => assert_eq!(v.value, BigInt::from(-1)),
            other => panic!("not a sized int: {other:?}"),
        }
    }

    #[test]
    fn oversized_literal_is_an_error() {
        assert!(Lexer::new("4'd16").lex().is_err());
        assert!(Lexer::new("i8'd1000").lex().is_err());
    }

    #[test]
    fn comments_nest_and_fences_mask() {
        assert_eq!(kinds("/* a /* b */ c */ 1"), vec![TokenKind::IntLit(BigInt::from(1))]);
        assert_eq!(
            kinds("```\nanything # here\n```\n2"),
            vec![TokenKind::IntLit(BigInt::from(2))]
        );
        assert!(Lexer::new("/* unterminated").lex().is_err());
    }

    #[test]
    fn else_if_same_line_warns() {
        let out = Lexer::new("else if").lex().expect("lex");
        assert_eq!(out.warnings.len(), 1);
        let out2 = Lexer::new("else\nif").lex().expect("lex");
        assert!(out2.warnings.is_empty());
    }

    #[test]
    fn slice_punctuation() {
        assert_eq!(
            kinds("x[3 +: 4] y[7 -: 2] z[i *: 8]"),
            vec![
                TokenKind::Ident("x".into()),
                TokenKind::LBrack,
                TokenKind::IntLit(BigInt::from(3)),
                TokenKind::PlusColon,
                TokenKind::IntLit(BigInt::from(4)),
                TokenKind::RBrack,
                TokenKind::Ident("y".into()),
                TokenKind::LBrack,
                TokenKind::IntLit(BigInt::from(7)),
                TokenKind::MinusColon,
                TokenKind::IntLit(BigInt::from(2)),
                TokenKind::RBrack,
                TokenKind::Ident("z".into()),
                TokenKind::LBrack,
                TokenKind::Ident("i".into()),
                TokenKind::StarColon,
                TokenKind::IntLit(BigInt::from(8)),
                TokenKind::RBrack,
            ]
        );
    }
}
