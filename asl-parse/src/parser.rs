#![forbid(unsafe_code)]

use asl_ast::{
    span_between, ArrayIndex, Binop, CaseAlt, CatchArm, Change, Constraint, Decl, DeclTarget,
    Declarations, Direction, Expr, Field, FunArg, FunKind, FunParam, FunSig, Ident, LExpr, Loc,
    Pattern, RegField, Slice, Span, Stmt, Throws, Ty, Unop, Value,
};
use asl_lex::{LineMap, Token, TokenKind};

use crate::error::ParseError;

pub struct Parser<'a> {
    tokens: &'a [Token],
    idx: usize,
    file: String,
    line_map: &'a LineMap,
}

impl<'a> Parser<'a> {
    pub fn new(tokens: &'a [Token], file: &str, line_map: &'a LineMap) -> Self {
        Self {
            tokens,
            idx: 0,
            file: file.to_string(),
            line_map,
        }
    }

    // ---- token helpers ----

    fn peek(&self) -> Option<&TokenKind> {
        self.tokens.get(self.idx).map(|t| &t.kind)
    }

    fn peek_at(&self, offset: usize) -> Option<&TokenKind> {
        self.tokens.get(self.idx + offset).map(|t| &t.kind)
    }

    fn at(&self, kind: &TokenKind) -> bool {
        self.peek() == Some(kind)
    }

    fn bump(&mut self) -> Option<&Token> {
        let t = self.tokens.get(self.idx);
        if t.is_some() {
            self.idx += 1;
        }
        t
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.at(kind) {
            self.idx += 1;
            true
        } else {
            false
        }
    }

    fn cur_span(&self) -> Span {
        match self.tokens.get(self.idx) {
            Some(t) => t.span,
            None => self
                .tokens
                .last()
                .map(|t| t.span)
                .unwrap_or_else(|| span_between(0, 0)),
        }
    }

    fn err(&self, message: impl Into<String>) -> ParseError {
        ParseError {
            message: message.into(),
            span: self.cur_span(),
        }
    }

    fn expect(&mut self, kind: &TokenKind, what: &str) -> Result<(), ParseError> {
        if self.eat(kind) {
            Ok(())
        } else {
            let found = self
                .peek()
                .map(|t| t.describe())
                .unwrap_or_else(|| "end of input".to_string());
            Err(self.err(format!("expected {what}, found {found}")))
        }
    }

    fn expect_ident(&mut self, what: &str) -> Result<Ident, ParseError> {
        match self.peek() {
            Some(TokenKind::Ident(name)) => {
                let id = Ident::new(name);
                self.idx += 1;
                Ok(id)
            }
            _ => {
                let found = self
                    .peek()
                    .map(|t| t.describe())
                    .unwrap_or_else(|| "end of input".to_string());
                Err(self.err(format!("expected {what}, found {found}")))
            }
        }
    }

    /// Source location covering tokens `start_idx .. self.idx`.
    fn loc_from(&self, start_idx: usize) -> Loc {
        let start_span = match self.tokens.get(start_idx) {
            Some(t) => t.span,
            None => return Loc::Unknown,
        };
        let end_span = self
            .tokens
            .get(self.idx.saturating_sub(1).max(start_idx))
            .map(|t| t.span)
            .unwrap_or(start_span);
        let lo = start_span.offset();
        let hi = end_span.offset() + end_span.len();
        Loc::range(
            &self.file,
            self.line_map.line_col(lo),
            self.line_map.line_col(hi),
            span_between(lo, hi),
        )
    }

    // ---- entry points ----

    pub fn parse_declarations(&mut self) -> Result<Declarations, ParseError> {
        let mut decls = Vec::new();
        while self.peek().is_some() {
            decls.push(self.parse_declaration()?);
        }
        Ok(decls)
    }

    /// Best-effort parse: on error, record it and skip to the next
    /// plausible declaration start.
    pub fn parse_declarations_with_recovery(&mut self) -> (Declarations, Vec<ParseError>) {
        let mut decls = Vec::new();
        let mut errors = Vec::new();
        while self.peek().is_some() {
            let before = self.idx;
            match self.parse_declaration() {
                Ok(d) => decls.push(d),
                Err(e) => {
                    errors.push(e);
                    if self.idx == before {
                        self.idx += 1;
                    }
                    self.skip_to_decl_start();
                }
            }
        }
        (decls, errors)
    }

    fn skip_to_decl_start(&mut self) {
        let mut depth = 0usize;
        while let Some(kind) = self.peek() {
            match kind {
                TokenKind::KwBegin => depth += 1,
                TokenKind::KwEnd => depth = depth.saturating_sub(1),
                TokenKind::KwFunc
                | TokenKind::KwGetter
                | TokenKind::KwSetter
                | TokenKind::KwRecord
                | TokenKind::KwException
                | TokenKind::KwEnumeration
                | TokenKind::KwType
                | TokenKind::KwConstant
                | TokenKind::KwConfig
                | TokenKind::KwBuiltin
                    if depth == 0 =>
                {
                    return;
                }
                _ => {}
            }
            self.idx += 1;
        }
    }

    pub fn parse_expr_eof(&mut self) -> Result<Expr, ParseError> {
        let e = self.parse_expr()?;
        if self.peek().is_some() {
            return Err(self.err("trailing input after expression"));
        }
        Ok(e)
    }

    // ---- declarations ----

    fn parse_declaration(&mut self) -> Result<Decl, ParseError> {
        let start = self.idx;
        match self.peek() {
            Some(TokenKind::KwBuiltin) => self.parse_builtin(start),
            Some(TokenKind::KwType) => self.parse_type_decl(start),
            Some(TokenKind::KwRecord) => self.parse_record_decl(start, false),
            Some(TokenKind::KwException) => self.parse_record_decl(start, true),
            Some(TokenKind::KwEnumeration) => self.parse_enum_decl(start),
            Some(TokenKind::KwConstant) => self.parse_constant_decl(start),
            Some(TokenKind::KwConfig) => self.parse_config_decl(start),
            Some(TokenKind::KwVar) => self.parse_global_var(start),
            Some(TokenKind::KwFunc) => self.parse_func(start),
            Some(TokenKind::KwGetter) => self.parse_getter(start),
            Some(TokenKind::KwSetter) => self.parse_setter(start),
            Some(TokenKind::KwOperator1) => self.parse_operator1(start),
            Some(TokenKind::KwOperator2) => self.parse_operator2(start),
            Some(other) => {
                let found = other.describe();
                Err(self.err(format!("expected a declaration, found {found}")))
            }
            None => Err(self.err("expected a declaration")),
        }
    }

    fn parse_builtin(&mut self, start: usize) -> Result<Decl, ParseError> {
        self.expect(&TokenKind::KwBuiltin, "`builtin`")?;
        if self.eat(&TokenKind::KwType) {
            let name = self.expect_ident("builtin type name")?;
            self.expect(&TokenKind::Semi, "`;`")?;
            return Ok(Decl::BuiltinType {
                name,
                loc: self.loc_from(start),
            });
        }
        self.expect(&TokenKind::KwFunc, "`type` or `func` after `builtin`")?;
        let sig = self.parse_funsig(FunKind::Function)?;
        self.expect(&TokenKind::Semi, "`;`")?;
        Ok(Decl::BuiltinFun {
            sig,
            loc: self.loc_from(start),
        })
    }

    fn parse_type_decl(&mut self, start: usize) -> Result<Decl, ParseError> {
        self.expect(&TokenKind::KwType, "`type`")?;
        let name = self.expect_ident("type name")?;
        if self.eat(&TokenKind::Semi) {
            return Ok(Decl::Forward {
                name,
                loc: self.loc_from(start),
            });
        }
        let mut params = Vec::new();
        if self.eat(&TokenKind::LParen) {
            loop {
                params.push(self.expect_ident("type parameter")?);
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
            }
            self.expect(&TokenKind::RParen, "`)`")?;
        }
        self.expect(&TokenKind::Eq, "`=` or `;` in type declaration")?;
        let ty = self.parse_ty()?;
        self.expect(&TokenKind::Semi, "`;`")?;
        Ok(Decl::TypeAlias {
            name,
            params,
            ty,
            loc: self.loc_from(start),
        })
    }

    fn parse_record_fields(&mut self) -> Result<Vec<Field>, ParseError> {
        self.expect(&TokenKind::LBrace, "`{`")?;
        let mut fields = Vec::new();
        while !self.at(&TokenKind::RBrace) {
            let name = self.expect_ident("field name")?;
            self.expect(&TokenKind::Colon, "`:` after field name")?;
            let ty = self.parse_ty()?;
            self.expect(&TokenKind::Semi, "`;` after field")?;
            fields.push(Field { name, ty });
        }
        self.expect(&TokenKind::RBrace, "`}`")?;
        Ok(fields)
    }

    fn parse_record_decl(&mut self, start: usize, exception: bool) -> Result<Decl, ParseError> {
        self.bump();
        let name = self.expect_ident("record name")?;
        if exception {
            let fields = if self.at(&TokenKind::LBrace) {
                self.parse_record_fields()?
            } else {
                Vec::new()
            };
            self.expect(&TokenKind::Semi, "`;`")?;
            return Ok(Decl::Exception {
                name,
                fields,
                loc: self.loc_from(start),
            });
        }
        let mut params = Vec::new();
        if self.eat(&TokenKind::LParen) {
            loop {
                params.push(self.expect_ident("record parameter")?);
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
            }
            self.expect(&TokenKind::RParen, "`)`")?;
        }
        let fields = self.parse_record_fields()?;
        self.expect(&TokenKind::Semi, "`;`")?;
        Ok(Decl::Record {
            name,
            params,
            fields,
            loc: self.loc_from(start),
        })
    }

    fn parse_enum_decl(&mut self, start: usize) -> Result<Decl, ParseError> {
        self.expect(&TokenKind::KwEnumeration, "`enumeration`")?;
        let name = self.expect_ident("enumeration name")?;
        self.expect(&TokenKind::LBrace, "`{`")?;
        let mut members = Vec::new();
        while !self.at(&TokenKind::RBrace) {
            members.push(self.expect_ident("enumeration member")?);
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(&TokenKind::RBrace, "`}`")?;
        self.expect(&TokenKind::Semi, "`;`")?;
        Ok(Decl::Enum {
            name,
            members,
            loc: self.loc_from(start),
        })
    }

    fn parse_constant_decl(&mut self, start: usize) -> Result<Decl, ParseError> {
        self.expect(&TokenKind::KwConstant, "`constant`")?;
        let name = self.expect_ident("constant name")?;
        let ty = if self.eat(&TokenKind::Colon) {
            Some(self.parse_ty()?)
        } else {
            None
        };
        self.expect(&TokenKind::Eq, "`=`")?;
        let value = self.parse_expr()?;
        self.expect(&TokenKind::Semi, "`;`")?;
        Ok(Decl::Const {
            name,
            ty,
            value,
            loc: self.loc_from(start),
        })
    }

    fn parse_config_decl(&mut self, start: usize) -> Result<Decl, ParseError> {
        self.expect(&TokenKind::KwConfig, "`config`")?;
        let name = self.expect_ident("config name")?;
        self.expect(&TokenKind::Colon, "`:`")?;
        let ty = self.parse_ty()?;
        self.expect(&TokenKind::Eq, "`=`")?;
        let value = self.parse_expr()?;
        self.expect(&TokenKind::Semi, "`;`")?;
        Ok(Decl::Config {
            name,
            ty,
            value,
            loc: self.loc_from(start),
        })
    }

    fn parse_global_var(&mut self, start: usize) -> Result<Decl, ParseError> {
        self.expect(&TokenKind::KwVar, "`var`")?;
        let name = self.expect_ident("variable name")?;
        self.expect(&TokenKind::Colon, "`:`")?;
        let ty = self.parse_ty()?;
        self.expect(&TokenKind::Semi, "`;`")?;
        Ok(Decl::Var {
            name,
            ty,
            loc: self.loc_from(start),
        })
    }

    fn parse_throws_marker(&mut self) -> Throws {
        if self.eat(&TokenKind::Quest) {
            Throws::May
        } else if self.eat(&TokenKind::Bang) {
            Throws::Always
        } else {
            Throws::No
        }
    }

    fn parse_fun_params(&mut self) -> Result<Vec<FunParam>, ParseError> {
        let mut params = Vec::new();
        if self.eat(&TokenKind::LBrace) {
            loop {
                let name = self.expect_ident("type parameter")?;
                let ty = if self.eat(&TokenKind::Colon) {
                    Some(self.parse_ty()?)
                } else {
                    None
                };
                params.push(FunParam { name, ty });
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
            }
            self.expect(&TokenKind::RBrace, "`}`")?;
        }
        Ok(params)
    }

    fn parse_fun_arg(&mut self) -> Result<FunArg, ParseError> {
        let start = self.idx;
        let name = self.expect_ident("argument name")?;
        let ty = if self.eat(&TokenKind::Colon) {
            self.parse_ty()?
        } else {
            // A bare name is an implicitly typed integer argument.
            Ty::unconstrained_integer(self.loc_from(start))
        };
        let default = if self.eat(&TokenKind::Eq) {
            Some(self.parse_expr()?)
        } else {
            None
        };
        Ok(FunArg { name, ty, default })
    }

    fn parse_fun_args(&mut self, open: &TokenKind, close: &TokenKind) -> Result<Vec<FunArg>, ParseError> {
        self.expect(open, "argument list")?;
        let mut args = Vec::new();
        if !self.at(close) {
            loop {
                args.push(self.parse_fun_arg()?);
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(close, "end of argument list")?;
        Ok(args)
    }

    fn parse_funsig(&mut self, kind: FunKind) -> Result<FunSig, ParseError> {
        let start = self.idx;
        let name = self.expect_ident("function name")?;
        let throws = self.parse_throws_marker();
        let params = self.parse_fun_params()?;
        let args = self.parse_fun_args(&TokenKind::LParen, &TokenKind::RParen)?;
        let rty = if self.eat(&TokenKind::FatArrow) {
            Some(self.parse_ty()?)
        } else {
            None
        };
        Ok(FunSig {
            name,
            kind,
            params,
            args,
            rty,
            throws,
            loc: self.loc_from(start),
        })
    }

    fn parse_body_or_proto(&mut self, sig: FunSig, start: usize) -> Result<Decl, ParseError> {
        if self.eat(&TokenKind::Semi) {
            return Ok(Decl::FunType {
                sig,
                loc: self.loc_from(start),
            });
        }
        self.expect(&TokenKind::KwBegin, "`begin` or `;`")?;
        let body = self.parse_stmts()?;
        self.expect(&TokenKind::KwEnd, "`end`")?;
        Ok(Decl::FunDefn {
            sig,
            body,
            loc: self.loc_from(start),
        })
    }

    fn parse_func(&mut self, start: usize) -> Result<Decl, ParseError> {
        self.expect(&TokenKind::KwFunc, "`func`")?;
        let sig = self.parse_funsig(FunKind::Function)?;
        self.parse_body_or_proto(sig, start)
    }

    fn parse_getter(&mut self, start: usize) -> Result<Decl, ParseError> {
        self.expect(&TokenKind::KwGetter, "`getter`")?;
        let sig_start = self.idx;
        let name = self.expect_ident("getter name")?;
        let throws = self.parse_throws_marker();
        let params = self.parse_fun_params()?;
        let args = if self.at(&TokenKind::LBrack) {
            self.parse_fun_args(&TokenKind::LBrack, &TokenKind::RBrack)?
        } else {
            Vec::new()
        };
        self.expect(&TokenKind::FatArrow, "`=>` in getter")?;
        let rty = self.parse_ty()?;
        let sig = FunSig {
            name,
            kind: FunKind::Getter,
            params,
            args,
            rty: Some(rty),
            throws,
            loc: self.loc_from(sig_start),
        };
        self.parse_body_or_proto(sig, start)
    }

    fn parse_setter(&mut self, start: usize) -> Result<Decl, ParseError> {
        self.expect(&TokenKind::KwSetter, "`setter`")?;
        let sig_start = self.idx;
        let name = self.expect_ident("setter name")?;
        let throws = self.parse_throws_marker();
        let params = self.parse_fun_params()?;
        let mut args = if self.at(&TokenKind::LBrack) {
            self.parse_fun_args(&TokenKind::LBrack, &TokenKind::RBrack)?
        } else {
            Vec::new()
        };
        self.expect(&TokenKind::Eq, "`=` in setter")?;
        let rhs_name = self.expect_ident("setter value name")?;
        self.expect(&TokenKind::Colon, "`:` after setter value name")?;
        let rhs_ty = self.parse_ty()?;
        // The right-hand-side parameter is the last formal.
        args.push(FunArg {
            name: rhs_name,
            ty: rhs_ty,
            default: None,
        });
        let sig = FunSig {
            name,
            kind: FunKind::Setter,
            params,
            args,
            rty: None,
            throws,
            loc: self.loc_from(sig_start),
        };
        self.parse_body_or_proto(sig, start)
    }

    fn parse_unop_symbol(&mut self) -> Result<Unop, ParseError> {
        let op = match self.peek() {
            Some(TokenKind::Minus) => Unop::Neg,
            Some(TokenKind::Bang) => Unop::BoolNot,
            Some(TokenKind::KwNot) => Unop::BitsNot,
            _ => return Err(self.err("expected a unary operator symbol")),
        };
        self.idx += 1;
        Ok(op)
    }

    fn parse_binop_symbol(&mut self) -> Result<Binop, ParseError> {
        let op = match self.peek() {
            Some(TokenKind::EqEq) => Binop::Eq,
            Some(TokenKind::Neq) => Binop::Ne,
            Some(TokenKind::Gt) => Binop::Gt,
            Some(TokenKind::GtEq) => Binop::Ge,
            Some(TokenKind::Lt) => Binop::Lt,
            Some(TokenKind::LtEq) => Binop::Le,
            Some(TokenKind::Plus) => Binop::Plus,
            Some(TokenKind::Minus) => Binop::Minus,
            Some(TokenKind::Star) => Binop::Mul,
            Some(TokenKind::Slash) => Binop::Div,
            Some(TokenKind::Caret) => Binop::Pow,
            Some(TokenKind::KwDiv) => Binop::Div,
            Some(TokenKind::KwDivrm) => Binop::FDiv,
            Some(TokenKind::KwMod) => Binop::FRem,
            Some(TokenKind::KwQuot) => Binop::ZDiv,
            Some(TokenKind::KwRem) => Binop::ZRem,
            Some(TokenKind::AmpAmp) => Binop::BoolAnd,
            Some(TokenKind::BarBar) => Binop::BoolOr,
            Some(TokenKind::Implies) => Binop::Implies,
            Some(TokenKind::Iff) => Binop::Iff,
            Some(TokenKind::KwAnd) => Binop::BitAnd,
            Some(TokenKind::KwOr) => Binop::BitOr,
            Some(TokenKind::KwXor) => Binop::BitXor,
            Some(TokenKind::LtLt) => Binop::Shl,
            Some(TokenKind::GtGt) => Binop::Shr,
            Some(TokenKind::PlusPlus) => Binop::Append,
            _ => return Err(self.err("expected a binary operator symbol")),
        };
        self.idx += 1;
        Ok(op)
    }

    fn parse_operator1(&mut self, start: usize) -> Result<Decl, ParseError> {
        self.expect(&TokenKind::KwOperator1, "`__operator1`")?;
        let op = self.parse_unop_symbol()?;
        self.expect(&TokenKind::Eq, "`=`")?;
        let mut funs = Vec::new();
        loop {
            funs.push(self.expect_ident("function name")?);
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(&TokenKind::Semi, "`;`")?;
        Ok(Decl::Operator1 {
            op,
            funs,
            loc: self.loc_from(start),
        })
    }

    fn parse_operator2(&mut self, start: usize) -> Result<Decl, ParseError> {
        self.expect(&TokenKind::KwOperator2, "`__operator2`")?;
        let op = self.parse_binop_symbol()?;
        self.expect(&TokenKind::Eq, "`=`")?;
        let mut funs = Vec::new();
        loop {
            funs.push(self.expect_ident("function name")?);
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(&TokenKind::Semi, "`;`")?;
        Ok(Decl::Operator2 {
            op,
            funs,
            loc: self.loc_from(start),
        })
    }

    // ---- statements ----

    fn at_stmt_terminator(&self) -> bool {
        matches!(
            self.peek(),
            None | Some(
                TokenKind::KwEnd
                    | TokenKind::KwElsif
                    | TokenKind::KwElse
                    | TokenKind::KwWhen
                    | TokenKind::KwOtherwise
                    | TokenKind::KwCatch
                    | TokenKind::KwUntil
            )
        )
    }

    fn parse_stmts(&mut self) -> Result<Vec<Stmt>, ParseError> {
        let mut stmts = Vec::new();
        while !self.at_stmt_terminator() {
            stmts.push(self.parse_stmt()?);
        }
        Ok(stmts)
    }

    fn parse_stmt(&mut self) -> Result<Stmt, ParseError> {
        let start = self.idx;
        match self.peek() {
            Some(TokenKind::KwLet) => self.parse_local_decl(start, true, false),
            Some(TokenKind::KwConstant) => self.parse_local_decl(start, true, true),
            Some(TokenKind::KwVar) => self.parse_local_decl(start, false, false),
            Some(TokenKind::KwReturn) => {
                self.bump();
                let value = if self.at(&TokenKind::Semi) {
                    None
                } else {
                    Some(self.parse_expr()?)
                };
                self.expect(&TokenKind::Semi, "`;`")?;
                Ok(Stmt::Return {
                    value,
                    loc: self.loc_from(start),
                })
            }
            Some(TokenKind::KwAssert) => {
                self.bump();
                let cond = self.parse_expr()?;
                self.expect(&TokenKind::Semi, "`;`")?;
                Ok(Stmt::Assert {
                    cond,
                    loc: self.loc_from(start),
                })
            }
            Some(TokenKind::KwThrow) => {
                self.bump();
                let exn = self.parse_expr()?;
                self.expect(&TokenKind::Semi, "`;`")?;
                Ok(Stmt::Throw {
                    exn,
                    loc: self.loc_from(start),
                })
            }
            Some(TokenKind::KwIf) => self.parse_if_stmt(start),
            Some(TokenKind::KwCase) => self.parse_case_stmt(start),
            Some(TokenKind::KwFor) => self.parse_for_stmt(start),
            Some(TokenKind::KwWhile) => {
                self.bump();
                let cond = self.parse_expr()?;
                self.expect(&TokenKind::KwDo, "`do`")?;
                let body = self.parse_stmts()?;
                self.expect(&TokenKind::KwEnd, "`end`")?;
                Ok(Stmt::While {
                    cond,
                    body,
                    loc: self.loc_from(start),
                })
            }
            Some(TokenKind::KwRepeat) => {
                self.bump();
                let body = self.parse_stmts()?;
                self.expect(&TokenKind::KwUntil, "`until`")?;
                let until = self.parse_expr()?;
                self.expect(&TokenKind::Semi, "`;`")?;
                Ok(Stmt::Repeat {
                    body,
                    until,
                    loc: self.loc_from(start),
                })
            }
            Some(TokenKind::KwTry) => self.parse_try_stmt(start),
            _ => self.parse_assign_or_call(start),
        }
    }

    fn parse_decl_target(&mut self) -> Result<DeclTarget, ParseError> {
        if self.eat(&TokenKind::LParen) {
            let mut names = Vec::new();
            loop {
                names.push(self.expect_ident("declaration target")?);
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
            }
            self.expect(&TokenKind::RParen, "`)`")?;
            Ok(DeclTarget::Tuple(names))
        } else if self.eat(&TokenKind::LBrack) {
            let mut names = Vec::new();
            loop {
                names.push(self.expect_ident("declaration target")?);
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
            }
            self.expect(&TokenKind::RBrack, "`]`")?;
            Ok(DeclTarget::BitTuple(names))
        } else {
            Ok(DeclTarget::Single(self.expect_ident("declaration target")?))
        }
    }

    fn parse_local_decl(
        &mut self,
        start: usize,
        constant: bool,
        _compile_time: bool,
    ) -> Result<Stmt, ParseError> {
        self.bump();
        let target = self.parse_decl_target()?;

        // `var x, y : ty;` declares several uninitialised variables.
        if !constant {
            if let DeclTarget::Single(first) = &target {
                if self.at(&TokenKind::Comma) {
                    let mut names = vec![first.clone()];
                    while self.eat(&TokenKind::Comma) {
                        names.push(self.expect_ident("variable name")?);
                    }
                    self.expect(&TokenKind::Colon, "`:`")?;
                    let ty = self.parse_ty()?;
                    self.expect(&TokenKind::Semi, "`;`")?;
                    return Ok(Stmt::VarDeclsNoInit {
                        ty,
                        names,
                        loc: self.loc_from(start),
                    });
                }
            }
        }

        let ty = if self.eat(&TokenKind::Colon) {
            Some(self.parse_ty()?)
        } else {
            None
        };

        if !constant && self.eat(&TokenKind::Semi) {
            let ty = ty.ok_or_else(|| self.err("uninitialised `var` needs a type"))?;
            let names = match target {
                DeclTarget::Single(n) => vec![n],
                _ => return Err(self.err("uninitialised `var` target must be a plain name")),
            };
            return Ok(Stmt::VarDeclsNoInit {
                ty,
                names,
                loc: self.loc_from(start),
            });
        }

        self.expect(&TokenKind::Eq, "`=`")?;
        let init = self.parse_expr()?;
        self.expect(&TokenKind::Semi, "`;`")?;
        Ok(Stmt::VarDecl {
            constant,
            ty,
            target,
            init,
            loc: self.loc_from(start),
        })
    }

    fn parse_if_stmt(&mut self, start: usize) -> Result<Stmt, ParseError> {
        self.expect(&TokenKind::KwIf, "`if`")?;
        let mut arms = Vec::new();
        let cond = self.parse_expr()?;
        self.expect(&TokenKind::KwThen, "`then`")?;
        arms.push((cond, self.parse_stmts()?));
        while self.eat(&TokenKind::KwElsif) {
            let cond = self.parse_expr()?;
            self.expect(&TokenKind::KwThen, "`then`")?;
            arms.push((cond, self.parse_stmts()?));
        }
        let els = if self.eat(&TokenKind::KwElse) {
            self.parse_stmts()?
        } else {
            Vec::new()
        };
        self.expect(&TokenKind::KwEnd, "`end`")?;
        Ok(Stmt::If {
            arms,
            els,
            loc: self.loc_from(start),
        })
    }

    fn parse_case_stmt(&mut self, start: usize) -> Result<Stmt, ParseError> {
        self.expect(&TokenKind::KwCase, "`case`")?;
        let expr = self.parse_expr()?;
        self.expect(&TokenKind::KwOf, "`of`")?;
        let mut alts = Vec::new();
        let mut default = None;
        loop {
            if self.at(&TokenKind::KwWhen) {
                let alt_start = self.idx;
                self.bump();
                let mut patterns = vec![self.parse_pattern()?];
                while self.eat(&TokenKind::Comma) {
                    patterns.push(self.parse_pattern()?);
                }
                let guard = if self.eat(&TokenKind::KwWhere) {
                    Some(self.parse_expr()?)
                } else {
                    None
                };
                self.expect(&TokenKind::FatArrow, "`=>`")?;
                let body = self.parse_stmts()?;
                alts.push(CaseAlt {
                    patterns,
                    guard,
                    body,
                    loc: self.loc_from(alt_start),
                });
            } else if self.at(&TokenKind::KwOtherwise) {
                self.bump();
                self.expect(&TokenKind::FatArrow, "`=>`")?;
                default = Some(self.parse_stmts()?);
                break;
            } else {
                break;
            }
        }
        self.expect(&TokenKind::KwEnd, "`end`")?;
        Ok(Stmt::Case {
            expr,
            alts,
            default,
            loc: self.loc_from(start),
        })
    }

    fn parse_for_stmt(&mut self, start: usize) -> Result<Stmt, ParseError> {
        self.expect(&TokenKind::KwFor, "`for`")?;
        let var = self.expect_ident("loop variable")?;
        self.expect(&TokenKind::Eq, "`=`")?;
        let from = self.parse_expr()?;
        let dir = if self.eat(&TokenKind::KwTo) {
            Direction::Up
        } else if self.eat(&TokenKind::KwDownto) {
            Direction::Down
        } else {
            return Err(self.err("expected `to` or `downto`"));
        };
        let to = self.parse_expr()?;
        self.expect(&TokenKind::KwDo, "`do`")?;
        let body = self.parse_stmts()?;
        self.expect(&TokenKind::KwEnd, "`end`")?;
        Ok(Stmt::For {
            var,
            from,
            dir,
            to,
            body,
            loc: self.loc_from(start),
        })
    }

    fn parse_try_stmt(&mut self, start: usize) -> Result<Stmt, ParseError> {
        self.expect(&TokenKind::KwTry, "`try`")?;
        let body = self.parse_stmts()?;
        self.expect(&TokenKind::KwCatch, "`catch`")?;
        let bind = self.expect_ident("catch binder")?;
        let mut arms = Vec::new();
        let mut default = None;
        loop {
            if self.at(&TokenKind::KwWhen) {
                let arm_start = self.idx;
                self.bump();
                let exn = self.expect_ident("exception type")?;
                self.expect(&TokenKind::FatArrow, "`=>`")?;
                let arm_body = self.parse_stmts()?;
                arms.push(CatchArm {
                    exn,
                    body: arm_body,
                    loc: self.loc_from(arm_start),
                });
            } else if self.at(&TokenKind::KwOtherwise) {
                self.bump();
                self.expect(&TokenKind::FatArrow, "`=>`")?;
                default = Some(self.parse_stmts()?);
                break;
            } else {
                break;
            }
        }
        self.expect(&TokenKind::KwEnd, "`end`")?;
        Ok(Stmt::Try {
            body,
            bind,
            arms,
            default,
            loc: self.loc_from(start),
        })
    }

    fn parse_assign_or_call(&mut self, start: usize) -> Result<Stmt, ParseError> {
        // `- = e;` discards the right-hand side.
        if self.at(&TokenKind::Minus) && self.peek_at(1) == Some(&TokenKind::Eq) {
            self.bump();
            self.bump();
            let rhs = self.parse_expr()?;
            self.expect(&TokenKind::Semi, "`;`")?;
            return Ok(Stmt::Assign {
                lhs: LExpr::Discard {
                    loc: self.loc_from(start),
                },
                rhs,
                loc: self.loc_from(start),
            });
        }

        let e = self.parse_expr()?;
        if self.eat(&TokenKind::Eq) {
            let lhs = self.expr_to_lexpr(e)?;
            let rhs = self.parse_expr()?;
            self.expect(&TokenKind::Semi, "`;`")?;
            return Ok(Stmt::Assign {
                lhs,
                rhs,
                loc: self.loc_from(start),
            });
        }
        self.expect(&TokenKind::Semi, "`;`")?;
        match e {
            Expr::Call {
                name,
                args,
                throws,
                loc,
            } => Ok(Stmt::Call {
                name,
                args,
                throws,
                loc,
            }),
            other => Err(ParseError {
                message: "expected a call or an assignment".to_string(),
                span: other.loc().span(),
            }),
        }
    }

    fn expr_to_lexpr(&self, e: Expr) -> Result<LExpr, ParseError> {
        match e {
            Expr::Var { name, loc } => {
                if name.name() == "-" {
                    Ok(LExpr::Discard { loc })
                } else {
                    Ok(LExpr::Var { name, loc })
                }
            }
            Expr::Field { base, field, loc } => Ok(LExpr::Field {
                base: Box::new(self.expr_to_lexpr(*base)?),
                field,
                loc,
            }),
            Expr::Fields { base, fields, loc } => Ok(LExpr::Fields {
                base: Box::new(self.expr_to_lexpr(*base)?),
                fields,
                loc,
            }),
            Expr::Slices { base, slices, loc } => Ok(LExpr::Slices {
                base: Box::new(self.expr_to_lexpr(*base)?),
                slices,
                loc,
            }),
            Expr::Tuple { elems, loc } => Ok(LExpr::Tuple {
                elems: elems
                    .into_iter()
                    .map(|e| self.expr_to_lexpr(e))
                    .collect::<Result<_, _>>()?,
                loc,
            }),
            Expr::Concat { widths, elems, loc } => Ok(LExpr::BitTuple {
                widths,
                elems: elems
                    .into_iter()
                    .map(|e| self.expr_to_lexpr(e))
                    .collect::<Result<_, _>>()?,
                loc,
            }),
            other => Err(ParseError {
                message: "this expression cannot be assigned to".to_string(),
                span: other.loc().span(),
            }),
        }
    }

    // ---- types ----

    pub fn parse_ty(&mut self) -> Result<Ty, ParseError> {
        let start = self.idx;
        match self.peek() {
            Some(TokenKind::Ident(name)) if name == "integer" => {
                self.bump();
                let constraints = if self.at(&TokenKind::LBrace) {
                    Some(self.parse_constraints()?)
                } else {
                    None
                };
                Ok(Ty::Integer {
                    constraints,
                    loc: self.loc_from(start),
                })
            }
            Some(TokenKind::Ident(name)) if name == "bits" => {
                self.bump();
                self.expect(&TokenKind::LParen, "`(` after `bits`")?;
                let width = self.parse_expr()?;
                self.expect(&TokenKind::RParen, "`)`")?;
                let fields = if self.at(&TokenKind::LBrace) {
                    self.parse_regfields()?
                } else {
                    Vec::new()
                };
                Ok(Ty::Bits {
                    width: Box::new(width),
                    fields,
                    loc: self.loc_from(start),
                })
            }
            Some(TokenKind::KwTypeof) => {
                self.bump();
                self.expect(&TokenKind::LParen, "`(` after `typeof`")?;
                let expr = self.parse_expr()?;
                self.expect(&TokenKind::RParen, "`)`")?;
                Ok(Ty::OfExpr {
                    expr: Box::new(expr),
                    loc: self.loc_from(start),
                })
            }
            Some(TokenKind::KwArray) => {
                self.bump();
                self.expect(&TokenKind::LBrack, "`[`")?;
                let index = self.parse_expr()?;
                self.expect(&TokenKind::RBrack, "`]`")?;
                self.expect(&TokenKind::KwOf, "`of`")?;
                let element = self.parse_ty()?;
                // Enumeration-indexed arrays are recognised by the
                // typechecker when the index names an enumeration type.
                Ok(Ty::Array {
                    index: ArrayIndex::Size(Box::new(index)),
                    element: Box::new(element),
                    loc: self.loc_from(start),
                })
            }
            Some(TokenKind::LParen) => {
                self.bump();
                let mut elems = vec![self.parse_ty()?];
                while self.eat(&TokenKind::Comma) {
                    elems.push(self.parse_ty()?);
                }
                self.expect(&TokenKind::RParen, "`)`")?;
                if elems.len() == 1 {
                    Ok(elems.pop().expect("one element"))
                } else {
                    Ok(Ty::Tuple {
                        elems,
                        loc: self.loc_from(start),
                    })
                }
            }
            Some(TokenKind::Ident(_)) => {
                let name = self.expect_ident("type name")?;
                let mut args = Vec::new();
                if self.eat(&TokenKind::LParen) {
                    if !self.at(&TokenKind::RParen) {
                        loop {
                            args.push(self.parse_expr()?);
                            if !self.eat(&TokenKind::Comma) {
                                break;
                            }
                        }
                    }
                    self.expect(&TokenKind::RParen, "`)`")?;
                }
                Ok(Ty::Named {
                    name,
                    args,
                    loc: self.loc_from(start),
                })
            }
            _ => Err(self.err("expected a type")),
        }
    }

    fn parse_constraints(&mut self) -> Result<Vec<Constraint>, ParseError> {
        self.expect(&TokenKind::LBrace, "`{`")?;
        let mut out = Vec::new();
        loop {
            let lo = self.parse_expr()?;
            if self.eat(&TokenKind::DotDot) {
                let hi = self.parse_expr()?;
                out.push(Constraint::Range(lo, hi));
            } else {
                out.push(Constraint::Single(lo));
            }
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(&TokenKind::RBrace, "`}`")?;
        Ok(out)
    }

    fn parse_regfields(&mut self) -> Result<Vec<RegField>, ParseError> {
        self.expect(&TokenKind::LBrace, "`{`")?;
        let mut out = Vec::new();
        while !self.at(&TokenKind::RBrace) {
            self.expect(&TokenKind::LBrack, "`[` before register field slices")?;
            let slices = self.parse_slice_list()?;
            self.expect(&TokenKind::RBrack, "`]`")?;
            let name = self.expect_ident("register field name")?;
            out.push(RegField { slices, name });
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(&TokenKind::RBrace, "`}`")?;
        Ok(out)
    }

    // ---- patterns ----

    fn parse_pattern(&mut self) -> Result<Pattern, ParseError> {
        let start = self.idx;
        match self.peek().cloned() {
            Some(TokenKind::IntLit(v)) => {
                self.bump();
                if self.eat(&TokenKind::DotDot) {
                    let lo = Expr::Lit {
                        value: Value::Int(v),
                        loc: self.loc_from(start),
                    };
                    let hi = self.parse_expr()?;
                    return Ok(Pattern::Range(lo, hi, self.loc_from(start)));
                }
                Ok(Pattern::Lit(Value::Int(v), self.loc_from(start)))
            }
            Some(TokenKind::Minus) => {
                // Either a wildcard or a negative literal.
                self.bump();
                match self.peek().cloned() {
                    Some(TokenKind::IntLit(v)) => {
                        self.bump();
                        let neg = Value::Int(-v);
                        if self.eat(&TokenKind::DotDot) {
                            let lo = Expr::Lit {
                                value: neg,
                                loc: self.loc_from(start),
                            };
                            let hi = self.parse_expr()?;
                            return Ok(Pattern::Range(lo, hi, self.loc_from(start)));
                        }
                        Ok(Pattern::Lit(neg, self.loc_from(start)))
                    }
                    _ => Ok(Pattern::Wildcard(self.loc_from(start))),
                }
            }
            Some(TokenKind::BitsLit(b)) => {
                self.bump();
                Ok(Pattern::Lit(Value::Bits(b), self.loc_from(start)))
            }
            Some(TokenKind::MaskLit(m)) => {
                self.bump();
                Ok(Pattern::Mask(m, self.loc_from(start)))
            }
            Some(TokenKind::BoolLit(b)) => {
                self.bump();
                Ok(Pattern::Lit(Value::Bool(b), self.loc_from(start)))
            }
            Some(TokenKind::Ident(_)) => {
                let name = self.expect_ident("constant name")?;
                Ok(Pattern::Const(name, self.loc_from(start)))
            }
            Some(TokenKind::LParen) => {
                self.bump();
                let mut elems = vec![self.parse_pattern()?];
                while self.eat(&TokenKind::Comma) {
                    elems.push(self.parse_pattern()?);
                }
                self.expect(&TokenKind::RParen, "`)`")?;
                Ok(Pattern::Tuple(elems, self.loc_from(start)))
            }
            Some(TokenKind::LBrace) => {
                self.bump();
                let mut elems = vec![self.parse_pattern()?];
                while self.eat(&TokenKind::Comma) {
                    elems.push(self.parse_pattern()?);
                }
                self.expect(&TokenKind::RBrace, "`}`")?;
                Ok(Pattern::Set(elems, self.loc_from(start)))
            }
            _ => Err(self.err("expected a pattern")),
        }
    }

    // ---- expressions ----

    pub fn parse_expr(&mut self) -> Result<Expr, ParseError> {
        self.parse_implies()
    }

    fn binop_loop(
        &mut self,
        next: fn(&mut Self) -> Result<Expr, ParseError>,
        table: &[(TokenKind, Binop)],
    ) -> Result<Expr, ParseError> {
        let start = self.idx;
        let mut lhs = next(self)?;
        'outer: loop {
            for (tok, op) in table {
                if self.at(tok) {
                    self.bump();
                    let rhs = next(self)?;
                    lhs = Expr::Binop {
                        op: *op,
                        lhs: Box::new(lhs),
                        rhs: Box::new(rhs),
                        loc: self.loc_from(start),
                    };
                    continue 'outer;
                }
            }
            return Ok(lhs);
        }
    }

    fn parse_implies(&mut self) -> Result<Expr, ParseError> {
        self.binop_loop(
            Self::parse_bool_or,
            &[
                (TokenKind::Implies, Binop::Implies),
                (TokenKind::Iff, Binop::Iff),
            ],
        )
    }

    fn parse_bool_or(&mut self) -> Result<Expr, ParseError> {
        self.binop_loop(Self::parse_bool_and, &[(TokenKind::BarBar, Binop::BoolOr)])
    }

    fn parse_bool_and(&mut self) -> Result<Expr, ParseError> {
        self.binop_loop(Self::parse_cmp, &[(TokenKind::AmpAmp, Binop::BoolAnd)])
    }

    fn parse_cmp(&mut self) -> Result<Expr, ParseError> {
        self.binop_loop(
            Self::parse_as_in,
            &[
                (TokenKind::EqEq, Binop::Eq),
                (TokenKind::Neq, Binop::Ne),
                (TokenKind::LtEq, Binop::Le),
                (TokenKind::GtEq, Binop::Ge),
                (TokenKind::Lt, Binop::Lt),
                (TokenKind::Gt, Binop::Gt),
            ],
        )
    }

    fn parse_as_in(&mut self) -> Result<Expr, ParseError> {
        let start = self.idx;
        let mut e = self.parse_bits_op()?;
        loop {
            if self.eat(&TokenKind::KwAs) {
                if self.at(&TokenKind::LBrace) {
                    let constraints = self.parse_constraints()?;
                    e = Expr::AsConstraint {
                        expr: Box::new(e),
                        constraints,
                        loc: self.loc_from(start),
                    };
                } else {
                    let ty = self.parse_ty()?;
                    e = Expr::AsType {
                        expr: Box::new(e),
                        ty: Box::new(ty),
                        loc: self.loc_from(start),
                    };
                }
            } else if self.eat(&TokenKind::KwIn) {
                let pattern = self.parse_pattern()?;
                e = Expr::In {
                    expr: Box::new(e),
                    pattern: Box::new(pattern),
                    loc: self.loc_from(start),
                };
            } else {
                return Ok(e);
            }
        }
    }

    fn parse_bits_op(&mut self) -> Result<Expr, ParseError> {
        self.binop_loop(
            Self::parse_shift,
            &[
                (TokenKind::KwAnd, Binop::BitAnd),
                (TokenKind::KwOr, Binop::BitOr),
                (TokenKind::KwXor, Binop::BitXor),
            ],
        )
    }

    fn parse_shift(&mut self) -> Result<Expr, ParseError> {
        self.binop_loop(
            Self::parse_additive,
            &[
                (TokenKind::LtLt, Binop::Shl),
                (TokenKind::GtGt, Binop::Shr),
            ],
        )
    }

    fn parse_additive(&mut self) -> Result<Expr, ParseError> {
        self.binop_loop(
            Self::parse_multiplicative,
            &[
                (TokenKind::Plus, Binop::Plus),
                (TokenKind::Minus, Binop::Minus),
                (TokenKind::PlusPlus, Binop::Append),
            ],
        )
    }

    fn parse_multiplicative(&mut self) -> Result<Expr, ParseError> {
        self.binop_loop(
            Self::parse_power,
            &[
                (TokenKind::Star, Binop::Mul),
                (TokenKind::Slash, Binop::Div),
                (TokenKind::KwDiv, Binop::Div),
                (TokenKind::KwDivrm, Binop::FDiv),
                (TokenKind::KwMod, Binop::FRem),
                (TokenKind::KwQuot, Binop::ZDiv),
                (TokenKind::KwRem, Binop::ZRem),
            ],
        )
    }

    fn parse_power(&mut self) -> Result<Expr, ParseError> {
        let start = self.idx;
        let base = self.parse_unary()?;
        if self.eat(&TokenKind::Caret) {
            // Right associative.
            let exp = self.parse_power()?;
            return Ok(Expr::Binop {
                op: Binop::Pow,
                lhs: Box::new(base),
                rhs: Box::new(exp),
                loc: self.loc_from(start),
            });
        }
        Ok(base)
    }

    fn parse_unary(&mut self) -> Result<Expr, ParseError> {
        let start = self.idx;
        if self.at(&TokenKind::Minus) {
            // A lone `-` in a target position is a discard.
            if matches!(
                self.peek_at(1),
                Some(TokenKind::Comma | TokenKind::RParen | TokenKind::Eq)
            ) {
                self.bump();
                return Ok(Expr::Var {
                    name: Ident::new("-"),
                    loc: self.loc_from(start),
                });
            }
            self.bump();
            let operand = self.parse_unary()?;
            return Ok(Expr::Unop {
                op: Unop::Neg,
                operand: Box::new(operand),
                loc: self.loc_from(start),
            });
        }
        if self.eat(&TokenKind::Bang) {
            let operand = self.parse_unary()?;
            return Ok(Expr::Unop {
                op: Unop::BoolNot,
                operand: Box::new(operand),
                loc: self.loc_from(start),
            });
        }
        if self.eat(&TokenKind::KwNot) {
            let operand = self.parse_unary()?;
            return Ok(Expr::Unop {
                op: Unop::BitsNot,
                operand: Box::new(operand),
                loc: self.loc_from(start),
            });
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> Result<Expr, ParseError> {
        let start = self.idx;
        let mut e = self.parse_primary()?;
        loop {
            if self.at(&TokenKind::Dot) {
                self.bump();
                if self.eat(&TokenKind::LBrack) {
                    let mut fields = vec![self.expect_ident("field name")?];
                    while self.eat(&TokenKind::Comma) {
                        fields.push(self.expect_ident("field name")?);
                    }
                    self.expect(&TokenKind::RBrack, "`]`")?;
                    e = Expr::Fields {
                        base: Box::new(e),
                        fields,
                        loc: self.loc_from(start),
                    };
                } else {
                    let field = self.expect_ident("field name")?;
                    e = Expr::Field {
                        base: Box::new(e),
                        field,
                        loc: self.loc_from(start),
                    };
                }
            } else if self.eat(&TokenKind::LBrack) {
                let slices = self.parse_slice_list()?;
                self.expect(&TokenKind::RBrack, "`]`")?;
                e = Expr::Slices {
                    base: Box::new(e),
                    slices,
                    loc: self.loc_from(start),
                };
            } else if self.at(&TokenKind::KwWith) {
                self.bump();
                self.expect(&TokenKind::LBrace, "`{` after `with`")?;
                let mut changes = Vec::new();
                loop {
                    changes.push(self.parse_change()?);
                    if !self.eat(&TokenKind::Comma) {
                        break;
                    }
                }
                self.expect(&TokenKind::RBrace, "`}`")?;
                e = Expr::WithChanges {
                    base: Box::new(e),
                    changes,
                    loc: self.loc_from(start),
                };
            } else {
                return Ok(e);
            }
        }
    }

    fn parse_change(&mut self) -> Result<Change, ParseError> {
        if self.eat(&TokenKind::LBrack) {
            let slices = self.parse_slice_list()?;
            self.expect(&TokenKind::RBrack, "`]`")?;
            self.expect(&TokenKind::Eq, "`=`")?;
            let value = self.parse_expr()?;
            Ok(Change::Slices(slices, value))
        } else {
            let mut fields = vec![self.expect_ident("field name")?];
            while self.eat(&TokenKind::Dot) {
                fields.push(self.expect_ident("field name")?);
            }
            self.expect(&TokenKind::Eq, "`=`")?;
            let value = self.parse_expr()?;
            Ok(Change::Field(fields, value))
        }
    }

    fn parse_slice_list(&mut self) -> Result<Vec<Slice>, ParseError> {
        let mut out = Vec::new();
        loop {
            let first = self.parse_expr()?;
            let slice = if self.eat(&TokenKind::Colon) {
                let lo = self.parse_expr()?;
                Slice::HighLow(first, lo)
            } else if self.eat(&TokenKind::PlusColon) {
                let width = self.parse_expr()?;
                Slice::LowWidth(first, width)
            } else if self.eat(&TokenKind::MinusColon) {
                let width = self.parse_expr()?;
                Slice::HighWidth(first, width)
            } else if self.eat(&TokenKind::StarColon) {
                let width = self.parse_expr()?;
                Slice::Element(first, width)
            } else {
                Slice::Single(first)
            };
            out.push(slice);
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        Ok(out)
    }

    fn parse_call_args(&mut self) -> Result<Vec<(Option<Ident>, Expr)>, ParseError> {
        self.expect(&TokenKind::LParen, "`(`")?;
        let mut args = Vec::new();
        if !self.at(&TokenKind::RParen) {
            loop {
                let name = match (self.peek(), self.peek_at(1)) {
                    (Some(TokenKind::Ident(n)), Some(TokenKind::Eq)) => {
                        let id = Ident::new(n);
                        self.idx += 2;
                        Some(id)
                    }
                    _ => None,
                };
                let value = self.parse_expr()?;
                args.push((name, value));
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(&TokenKind::RParen, "`)`")?;
        Ok(args)
    }

    fn parse_record_fields_init(&mut self) -> Result<Vec<(Ident, Expr)>, ParseError> {
        self.expect(&TokenKind::LBrace, "`{`")?;
        let mut fields = Vec::new();
        if !self.at(&TokenKind::RBrace) {
            loop {
                let name = self.expect_ident("field name")?;
                self.expect(&TokenKind::Eq, "`=`")?;
                let value = self.parse_expr()?;
                fields.push((name, value));
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(&TokenKind::RBrace, "`}`")?;
        Ok(fields)
    }

    fn parse_primary(&mut self) -> Result<Expr, ParseError> {
        let start = self.idx;
        match self.peek().cloned() {
            Some(TokenKind::IntLit(v)) => {
                self.bump();
                Ok(Expr::Lit {
                    value: Value::Int(v),
                    loc: self.loc_from(start),
                })
            }
            Some(TokenKind::SizedIntLit(v)) => {
                self.bump();
                Ok(Expr::Lit {
                    value: Value::SizedInt(v),
                    loc: self.loc_from(start),
                })
            }
            Some(TokenKind::BitsLit(b)) => {
                self.bump();
                Ok(Expr::Lit {
                    value: Value::Bits(b),
                    loc: self.loc_from(start),
                })
            }
            Some(TokenKind::MaskLit(m)) => {
                self.bump();
                Ok(Expr::Lit {
                    value: Value::Mask(m),
                    loc: self.loc_from(start),
                })
            }
            Some(TokenKind::BoolLit(b)) => {
                self.bump();
                Ok(Expr::Lit {
                    value: Value::Bool(b),
                    loc: self.loc_from(start),
                })
            }
            Some(TokenKind::StringLit(s)) => {
                self.bump();
                Ok(Expr::Lit {
                    value: Value::String(s),
                    loc: self.loc_from(start),
                })
            }
            Some(TokenKind::RealLit(r)) => {
                self.bump();
                Ok(Expr::Lit {
                    value: Value::Real(r),
                    loc: self.loc_from(start),
                })
            }
            Some(TokenKind::KwUnknown) => {
                self.bump();
                self.expect(&TokenKind::Colon, "`:` after `UNKNOWN`")?;
                let ty = self.parse_ty()?;
                Ok(Expr::Unknown {
                    ty: Box::new(ty),
                    loc: self.loc_from(start),
                })
            }
            Some(TokenKind::KwIf) => {
                self.bump();
                let mut arms = Vec::new();
                let cond = self.parse_expr()?;
                self.expect(&TokenKind::KwThen, "`then`")?;
                arms.push((cond, self.parse_expr()?));
                while self.eat(&TokenKind::KwElsif) {
                    let cond = self.parse_expr()?;
                    self.expect(&TokenKind::KwThen, "`then`")?;
                    arms.push((cond, self.parse_expr()?));
                }
                self.expect(&TokenKind::KwElse, "`else` in conditional expression")?;
                let els = self.parse_expr()?;
                self.expect(&TokenKind::KwEnd, "`end`")?;
                Ok(Expr::If {
                    arms,
                    els: Box::new(els),
                    loc: self.loc_from(start),
                })
            }
            Some(TokenKind::LParen) => {
                self.bump();
                let mut elems = vec![self.parse_expr()?];
                while self.eat(&TokenKind::Comma) {
                    elems.push(self.parse_expr()?);
                }
                self.expect(&TokenKind::RParen, "`)`")?;
                if elems.len() == 1 {
                    Ok(elems.pop().expect("one element"))
                } else {
                    Ok(Expr::Tuple {
                        elems,
                        loc: self.loc_from(start),
                    })
                }
            }
            Some(TokenKind::LBrack) => {
                // `[x, y]` concatenates bitvectors; widths are synthesized
                // during typechecking.
                self.bump();
                let mut elems = vec![self.parse_expr()?];
                while self.eat(&TokenKind::Comma) {
                    elems.push(self.parse_expr()?);
                }
                self.expect(&TokenKind::RBrack, "`]`")?;
                Ok(Expr::Concat {
                    widths: Vec::new(),
                    elems,
                    loc: self.loc_from(start),
                })
            }
            Some(TokenKind::Ident(_)) => {
                let name = self.expect_ident("expression")?;
                // Call markers only make sense right before an argument list.
                let throws = match (self.peek(), self.peek_at(1)) {
                    (Some(TokenKind::Quest), Some(TokenKind::LParen)) => {
                        self.bump();
                        Throws::May
                    }
                    (Some(TokenKind::Bang), Some(TokenKind::LParen)) => {
                        self.bump();
                        Throws::Always
                    }
                    _ => Throws::No,
                };
                if self.at(&TokenKind::LParen) {
                    let args = self.parse_call_args()?;
                    if self.at(&TokenKind::LBrace) {
                        // `R(e1, e2){ f = v, ... }` — parameterised record
                        // construction; arguments must be positional.
                        let mut ctor_args = Vec::new();
                        for (n, e) in args {
                            if n.is_some() {
                                return Err(self
                                    .err("record constructor arguments cannot be named"));
                            }
                            ctor_args.push(e);
                        }
                        let fields = self.parse_record_fields_init()?;
                        return Ok(Expr::Record {
                            name,
                            args: ctor_args,
                            fields,
                            loc: self.loc_from(start),
                        });
                    }
                    return Ok(Expr::Call {
                        name,
                        args,
                        throws,
                        loc: self.loc_from(start),
                    });
                }
                if self.at(&TokenKind::LBrace) {
                    let fields = self.parse_record_fields_init()?;
                    return Ok(Expr::Record {
                        name,
                        args: Vec::new(),
                        fields,
                        loc: self.loc_from(start),
                    });
                }
                Ok(Expr::Var {
                    name,
                    loc: self.loc_from(start),
                })
            }
            Some(other) => {
                let found = other.describe();
                Err(self.err(format!("expected an expression, found {found}")))
            }
            None => Err(self.err("expected an expression, found end of input")),
        }
    }
}
