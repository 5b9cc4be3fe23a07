#![forbid(unsafe_code)]

use asl_ast::{Bits, Mask, SizedInt, Span};
use logos::Logos;
use num_bigint::{BigInt, BigUint};

#[derive(Clone, Debug, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

fn strip_underscores(s: &str) -> Option<String> {
    if s.starts_with('_') || s.ends_with('_') || s.contains("__") {
        return None;
    }
    Some(s.replace('_', ""))
}

fn parse_int_decimal(s: &str) -> Option<BigInt> {
    let digits = strip_underscores(s)?;
    BigInt::parse_bytes(digits.as_bytes(), 10)
}

fn parse_int_hex(s: &str) -> Option<BigInt> {
    let digits = strip_underscores(s.get(2..)?)?;
    BigInt::parse_bytes(digits.as_bytes(), 16)
}

fn radix_of(c: u8) -> u32 {
    match c {
        b'b' => 2,
        b'd' => 10,
        _ => 16,
    }
}

/// `<N>'b…` / `<N>'d…` / `<N>'x…` bitvector literals.
fn parse_sized_bits(s: &str) -> Option<Bits> {
    let tick = s.find('\'')?;
    let width: usize = s[..tick].parse().ok()?;
    let radix = radix_of(s.as_bytes()[tick + 1]);
    let digits = strip_underscores(&s[tick + 2..])?;
    let value = BigUint::parse_bytes(digits.as_bytes(), radix)?;
    if value.bits() as usize > width {
        return None;
    }
    Some(Bits::new(width, value))
}

/// `i<N>'b…` / `i<N>'d…` / `i<N>'x…` bounded-integer literals. Binary and
/// hex digits are a bit pattern read as two's complement; decimal digits
/// must fit as a non-negative value.
fn parse_sized_int(s: &str) -> Option<SizedInt> {
    let tick = s.find('\'')?;
    let width: usize = s[1..tick].parse().ok()?;
    let radix_ch = s.as_bytes()[tick + 1];
    let radix = radix_of(radix_ch);
    let digits = strip_underscores(&s[tick + 2..])?;
    let raw = BigInt::parse_bytes(digits.as_bytes(), radix)?;
    if radix_ch == b'd' {
        SizedInt::new(width, raw).ok()
    } else {
        if raw.bits() as usize > width {
            return None;
        }
        Some(SizedInt::wrap(width, raw))
    }
}

/// `'1010 1100'` — spaces are for grouping only.
fn parse_quoted_bits(s: &str) -> Option<Bits> {
    let inner = &s[1..s.len() - 1];
    let mut width = 0usize;
    let mut value = BigUint::from(0u32);
    for c in inner.chars() {
        match c {
            ' ' => continue,
            '0' => {
                value = value << 1u8;
                width += 1;
            }
            '1' => {
                value = (value << 1u8) | BigUint::from(1u32);
                width += 1;
            }
            _ => return None,
        }
    }
    Some(Bits::new(width, value))
}

/// `'10xx'` — `x` positions are don't-care.
fn parse_quoted_mask(s: &str) -> Option<Mask> {
    let inner = &s[1..s.len() - 1];
    let mut width = 0usize;
    let mut value = BigUint::from(0u32);
    let mut care = BigUint::from(0u32);
    for c in inner.chars() {
        match c {
            ' ' => continue,
            '0' => {
                value = value << 1u8;
                care = (care << 1u8) | BigUint::from(1u32);
                width += 1;
            }
            '1' => {
                value = (value << 1u8) | BigUint::from(1u32);
                care = (care << 1u8) | BigUint::from(1u32);
                width += 1;
            }
            'x' => {
                value = value << 1u8;
                care = care << 1u8;
                width += 1;
            }
            _ => return None,
        }
    }
    Some(Mask::new(width, value, care))
}

fn parse_string(lex: &mut logos::Lexer<TokenKind>) -> Option<String> {
    let s = lex.slice();
    let inner = &s[1..s.len().saturating_sub(1)];
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next()? {
            'n' => out.push('\n'),
            't' => out.push('\t'),
            'r' => out.push('\r'),
            '0' => out.push('\0'),
            '"' => out.push('"'),
            '\\' => out.push('\\'),
            _ => return None,
        }
    }
    Some(out)
}

/// `/* … */` comments nest.
fn skip_block_comment(lex: &mut logos::Lexer<TokenKind>) -> logos::FilterResult<(), ()> {
    let rest = lex.remainder();
    let mut depth = 1usize;
    let bytes = rest.as_bytes();
    let mut i = 0usize;
    while i + 1 < bytes.len() {
        if bytes[i] == b'/' && bytes[i + 1] == b'*' {
            depth += 1;
            i += 2;
        } else if bytes[i] == b'*' && bytes[i + 1] == b'/' {
            depth -= 1;
            i += 2;
            if depth == 0 {
                lex.bump(i);
                return logos::FilterResult::Skip;
            }
        } else {
            i += 1;
        }
    }
    logos::FilterResult::Error(())
}

#[derive(Logos, Clone, Debug, PartialEq)]
#[logos(skip r"[ \t\r\n\f]+")]
#[logos(skip r"//[^\n]*")]
pub enum TokenKind {
    #[token("/*", skip_block_comment)]
    BlockComment,

    // Structural keywords
    #[token("if")]
    KwIf,
    #[token("elsif")]
    KwElsif,
    #[token("then")]
    KwThen,
    #[token("else")]
    KwElse,
    #[token("end")]
    KwEnd,
    #[token("case")]
    KwCase,
    #[token("of")]
    KwOf,
    #[token("when")]
    KwWhen,
    #[token("otherwise")]
    KwOtherwise,
    #[token("where")]
    KwWhere,
    #[token("try")]
    KwTry,
    #[token("catch")]
    KwCatch,
    #[token("repeat")]
    KwRepeat,
    #[token("until")]
    KwUntil,
    #[token("while")]
    KwWhile,
    #[token("for")]
    KwFor,
    #[token("to")]
    KwTo,
    #[token("downto")]
    KwDownto,
    #[token("do")]
    KwDo,
    #[token("return")]
    KwReturn,
    #[token("throw")]
    KwThrow,
    #[token("assert")]
    KwAssert,
    #[token("let")]
    KwLet,
    #[token("var")]
    KwVar,
    #[token("constant")]
    KwConstant,
    #[token("config")]
    KwConfig,
    #[token("type")]
    KwType,
    #[token("record")]
    KwRecord,
    #[token("enumeration")]
    KwEnumeration,
    #[token("exception")]
    KwException,
    #[token("func")]
    KwFunc,
    #[token("getter")]
    KwGetter,
    #[token("setter")]
    KwSetter,
    #[token("begin")]
    KwBegin,
    #[token("with")]
    KwWith,
    #[token("as")]
    KwAs,
    #[token("typeof")]
    KwTypeof,
    #[token("array")]
    KwArray,
    #[token("builtin")]
    KwBuiltin,
    #[token("__operator1")]
    KwOperator1,
    #[token("__operator2")]
    KwOperator2,

    // Operator keywords
    #[token("AND")]
    KwAnd,
    #[token("OR")]
    KwOr,
    #[token("XOR")]
    KwXor,
    #[token("NOT")]
    KwNot,
    #[token("DIV")]
    KwDiv,
    #[token("MOD")]
    KwMod,
    #[token("DIVRM")]
    KwDivrm,
    #[token("QUOT")]
    KwQuot,
    #[token("REM")]
    KwRem,
    #[token("IN")]
    KwIn,
    #[token("UNKNOWN")]
    KwUnknown,

    #[token("TRUE", |_| true)]
    #[token("FALSE", |_| false)]
    BoolLit(bool),

    // Punctuation
    #[token("+:")]
    PlusColon,
    #[token("-:")]
    MinusColon,
    #[token("*:")]
    StarColon,
    #[token("==")]
    EqEq,
    #[token("!=")]
    Neq,
    #[token("<=")]
    LtEq,
    #[token(">=")]
    GtEq,
    #[token("&&")]
    AmpAmp,
    #[token("||")]
    BarBar,
    #[token("<->")]
    Iff,
    #[token("-->")]
    Implies,
    #[token("=>")]
    FatArrow,
    #[token("..")]
    DotDot,
    #[token("++")]
    PlusPlus,
    #[token("<<")]
    LtLt,
    #[token(">>")]
    GtGt,
    #[token("<")]
    Lt,
    #[token(">")]
    Gt,
    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("/")]
    Slash,
    #[token("^")]
    Caret,
    #[token("!")]
    Bang,
    #[token("?")]
    Quest,
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("[")]
    LBrack,
    #[token("]")]
    RBrack,
    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,
    #[token(",")]
    Comma,
    #[token(";")]
    Semi,
    #[token(":")]
    Colon,
    #[token("=")]
    Eq,
    #[token(".")]
    Dot,

    // Literals
    #[regex(r"i[0-9]+'[bdx][0-9a-fA-F_]+", |lex| parse_sized_int(lex.slice()))]
    SizedIntLit(SizedInt),

    #[regex(r"[0-9]+'[bdx][0-9a-fA-F_]+", |lex| parse_sized_bits(lex.slice()))]
    #[regex(r"'[01 ]*'", |lex| parse_quoted_bits(lex.slice()))]
    BitsLit(Bits),

    #[regex(r"'[01 ]*x[01x ]*'", |lex| parse_quoted_mask(lex.slice()))]
    MaskLit(Mask),

    #[regex(r"[0-9][0-9_]*\.[0-9][0-9_]*", |lex| lex.slice().to_string())]
    RealLit(String),

    #[regex(r"0x[0-9a-fA-F_]+", |lex| parse_int_hex(lex.slice()))]
    #[regex(r"[0-9][0-9_]*", |lex| parse_int_decimal(lex.slice()))]
    IntLit(BigInt),

    #[regex(r#""([^"\\]|\\.)*""#, parse_string)]
    StringLit(String),

    #[regex(r"[a-zA-Z_][a-zA-Z0-9_]*", |lex| lex.slice().to_string())]
    Ident(String),
}

impl TokenKind {
    /// Surface spelling used in "expected … found …" diagnostics.
    pub fn describe(&self) -> String {
        match self {
            TokenKind::Ident(name) => format!("identifier `{name}`"),
            TokenKind::IntLit(v) => format!("integer literal {v}"),
            TokenKind::BitsLit(b) => format!("bitvector literal {b}"),
            TokenKind::MaskLit(m) => format!("mask literal {m}"),
            TokenKind::SizedIntLit(v) => format!("sized integer literal {v}"),
            TokenKind::RealLit(r) => format!("real literal {r}"),
            TokenKind::StringLit(_) => "string literal".to_string(),
            TokenKind::BoolLit(b) => format!("{}", if *b { "TRUE" } else { "FALSE" }),
            other => format!("{other:?}"),
        }
    }
}
