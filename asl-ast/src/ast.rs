#![forbid(unsafe_code)]

use std::fmt;

use crate::ident::Ident;
use crate::loc::Loc;
use crate::value::{Mask, Value};

/// Exception marker on function definitions and calls: `F` (does not
/// throw), `F?` (may throw), `F!` (always throws).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Throws {
    No,
    May,
    Always,
}

impl fmt::Display for Throws {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Throws::No => Ok(()),
            Throws::May => write!(f, "?"),
            Throws::Always => write!(f, "!"),
        }
    }
}

/// A constraint range refining an `integer` type: a single value or a
/// closed interval.
#[derive(Clone, Debug, PartialEq)]
pub enum Constraint {
    Single(Expr),
    Range(Expr, Expr),
}

/// A named slice set attached to a `bits(N)` type, enabling `x.F` access.
#[derive(Clone, Debug, PartialEq)]
pub struct RegField {
    pub slices: Vec<Slice>,
    pub name: Ident,
}

#[derive(Clone, Debug, PartialEq)]
pub enum ArrayIndex {
    /// Indexed by the members of an enumeration.
    Enum(Ident),
    /// Indexed by `0 .. size-1`.
    Size(Box<Expr>),
}

#[derive(Clone, Debug, PartialEq)]
pub enum Ty {
    /// `integer` or `integer {c1, ..., cn}`.
    Integer {
        constraints: Option<Vec<Constraint>>,
        loc: Loc,
    },
    /// `bits(N)` with optional register fields.
    Bits {
        width: Box<Expr>,
        fields: Vec<RegField>,
        loc: Loc,
    },
    /// A named type constructor `T` or `T(e1, ..., ek)`.
    Named {
        name: Ident,
        args: Vec<Expr>,
        loc: Loc,
    },
    /// `typeof(e)`.
    OfExpr { expr: Box<Expr>, loc: Loc },
    /// `array [index] of element`.
    Array {
        index: ArrayIndex,
        element: Box<Ty>,
        loc: Loc,
    },
    Tuple { elems: Vec<Ty>, loc: Loc },
}

impl Ty {
    pub fn loc(&self) -> &Loc {
        match self {
            Ty::Integer { loc, .. }
            | Ty::Bits { loc, .. }
            | Ty::Named { loc, .. }
            | Ty::OfExpr { loc, .. }
            | Ty::Array { loc, .. }
            | Ty::Tuple { loc, .. } => loc,
        }
    }

    pub fn unconstrained_integer(loc: Loc) -> Ty {
        Ty::Integer {
            constraints: None,
            loc,
        }
    }

    pub fn named(name: &str, loc: Loc) -> Ty {
        Ty::Named {
            name: Ident::new(name),
            args: Vec::new(),
            loc,
        }
    }

    pub fn bits(width: Expr, loc: Loc) -> Ty {
        Ty::Bits {
            width: Box::new(width),
            fields: Vec::new(),
            loc,
        }
    }
}

/// The four surface slice forms plus the canonical `lo +: width` form the
/// transform pipeline normalises to.
#[derive(Clone, Debug, PartialEq)]
pub enum Slice {
    /// `[i]` — a single bit.
    Single(Expr),
    /// `[hi : lo]`.
    HighLow(Expr, Expr),
    /// `[lo +: width]` — the canonical form.
    LowWidth(Expr, Expr),
    /// `[hi -: width]`.
    HighWidth(Expr, Expr),
    /// `[i *: width]` — element `i` of width `width`.
    Element(Expr, Expr),
}

/// One arm of a `with`-change list.
#[derive(Clone, Debug, PartialEq)]
pub enum Change {
    Field(Vec<Ident>, Expr),
    Slices(Vec<Slice>, Expr),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Unop {
    Neg,
    BoolNot,
    BitsNot,
}

impl fmt::Display for Unop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Unop::Neg => write!(f, "-"),
            Unop::BoolNot => write!(f, "!"),
            Unop::BitsNot => write!(f, "NOT"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Binop {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
    Plus,
    Minus,
    Mul,
    Div,
    Pow,
    /// `QUOT` — truncating division.
    ZDiv,
    /// `REM` — truncating remainder.
    ZRem,
    /// `DIVRM` — flooring division.
    FDiv,
    /// `MOD` — flooring remainder.
    FRem,
    BoolAnd,
    BoolOr,
    Implies,
    Iff,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
    Append,
}

impl fmt::Display for Binop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Binop::Eq => "==",
            Binop::Ne => "!=",
            Binop::Gt => ">",
            Binop::Ge => ">=",
            Binop::Lt => "<",
            Binop::Le => "<=",
            Binop::Plus => "+",
            Binop::Minus => "-",
            Binop::Mul => "*",
            Binop::Div => "DIV",
            Binop::Pow => "^",
            Binop::ZDiv => "QUOT",
            Binop::ZRem => "REM",
            Binop::FDiv => "DIVRM",
            Binop::FRem => "MOD",
            Binop::BoolAnd => "&&",
            Binop::BoolOr => "||",
            Binop::Implies => "-->",
            Binop::Iff => "<->",
            Binop::BitAnd => "AND",
            Binop::BitOr => "OR",
            Binop::BitXor => "XOR",
            Binop::Shl => "<<",
            Binop::Shr => ">>",
            Binop::Append => "++",
        };
        write!(f, "{s}")
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Pattern {
    /// Integer or bitvector literal.
    Lit(Value, Loc),
    /// Reference to a named constant.
    Const(Ident, Loc),
    Wildcard(Loc),
    Tuple(Vec<Pattern>, Loc),
    /// `{p1, p2, ...}` — matches any member.
    Set(Vec<Pattern>, Loc),
    /// An arbitrary expression compared for equality.
    Single(Expr, Loc),
    Range(Expr, Expr, Loc),
    Mask(Mask, Loc),
}

impl Pattern {
    pub fn loc(&self) -> &Loc {
        match self {
            Pattern::Lit(_, loc)
            | Pattern::Const(_, loc)
            | Pattern::Wildcard(loc)
            | Pattern::Tuple(_, loc)
            | Pattern::Set(_, loc)
            | Pattern::Single(_, loc)
            | Pattern::Range(_, _, loc)
            | Pattern::Mask(_, loc) => loc,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    Lit {
        value: Value,
        loc: Loc,
    },
    Var {
        name: Ident,
        loc: Loc,
    },
    Field {
        base: Box<Expr>,
        field: Ident,
        loc: Loc,
    },
    /// Multi-field selection: the concatenation of several fields.
    Fields {
        base: Box<Expr>,
        fields: Vec<Ident>,
        loc: Loc,
    },
    /// Array subscript.
    Index {
        base: Box<Expr>,
        index: Box<Expr>,
        loc: Loc,
    },
    Slices {
        base: Box<Expr>,
        slices: Vec<Slice>,
        loc: Loc,
    },
    /// Record construction `R(params){ f = e, ... }`.
    Record {
        name: Ident,
        args: Vec<Expr>,
        fields: Vec<(Ident, Expr)>,
        loc: Loc,
    },
    /// Functional update `e with { changes }`.
    WithChanges {
        base: Box<Expr>,
        changes: Vec<Change>,
        loc: Loc,
    },
    /// `if c1 then e1 elsif c2 then e2 ... else e`.
    If {
        arms: Vec<(Expr, Expr)>,
        els: Box<Expr>,
        loc: Loc,
    },
    /// `__let x : ty = e1 __in e2` — only created by transforms.
    Let {
        name: Ident,
        ty: Box<Ty>,
        value: Box<Expr>,
        body: Box<Expr>,
        loc: Loc,
    },
    /// `__assert e1 __in e2` — runtime-check threading.
    Assert {
        cond: Box<Expr>,
        body: Box<Expr>,
        loc: Loc,
    },
    /// A call as written, before overload resolution. Arguments carry
    /// optional names.
    Call {
        name: Ident,
        args: Vec<(Option<Ident>, Expr)>,
        throws: Throws,
        loc: Loc,
    },
    /// A resolved call: concrete callee tag, synthesized type parameters,
    /// positional arguments, throws tag.
    Apply {
        name: Ident,
        params: Vec<Expr>,
        args: Vec<Expr>,
        throws: Throws,
        loc: Loc,
    },
    Tuple {
        elems: Vec<Expr>,
        loc: Loc,
    },
    /// Bitvector concatenation with per-element widths.
    Concat {
        widths: Vec<Expr>,
        elems: Vec<Expr>,
        loc: Loc,
    },
    Unop {
        op: Unop,
        operand: Box<Expr>,
        loc: Loc,
    },
    Binop {
        op: Binop,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
        loc: Loc,
    },
    /// `e as {constraints}`.
    AsConstraint {
        expr: Box<Expr>,
        constraints: Vec<Constraint>,
        loc: Loc,
    },
    /// `e as ty`.
    AsType {
        expr: Box<Expr>,
        ty: Box<Ty>,
        loc: Loc,
    },
    ArrayInit {
        elems: Vec<Expr>,
        loc: Loc,
    },
    /// `UNKNOWN : ty`.
    Unknown {
        ty: Box<Ty>,
        loc: Loc,
    },
    /// `e IN pattern`.
    In {
        expr: Box<Expr>,
        pattern: Box<Pattern>,
        loc: Loc,
    },
}

impl Expr {
    pub fn loc(&self) -> &Loc {
        match self {
            Expr::Lit { loc, .. }
            | Expr::Var { loc, .. }
            | Expr::Field { loc, .. }
            | Expr::Fields { loc, .. }
            | Expr::Index { loc, .. }
            | Expr::Slices { loc, .. }
            | Expr::Record { loc, .. }
            | Expr::WithChanges { loc, .. }
            | Expr::If { loc, .. }
            | Expr::Let { loc, .. }
            | Expr::Assert { loc, .. }
            | Expr::Call { loc, .. }
            | Expr::Apply { loc, .. }
            | Expr::Tuple { loc, .. }
            | Expr::Concat { loc, .. }
            | Expr::Unop { loc, .. }
            | Expr::Binop { loc, .. }
            | Expr::AsConstraint { loc, .. }
            | Expr::AsType { loc, .. }
            | Expr::ArrayInit { loc, .. }
            | Expr::Unknown { loc, .. }
            | Expr::In { loc, .. } => loc,
        }
    }

    pub fn lit_int(v: i64, loc: Loc) -> Expr {
        Expr::Lit {
            value: Value::int(v),
            loc,
        }
    }

    pub fn var(name: &str, loc: Loc) -> Expr {
        Expr::Var {
            name: Ident::new(name),
            loc,
        }
    }

    /// The literal integer payload, if this is one.
    pub fn as_int_lit(&self) -> Option<&num_bigint::BigInt> {
        match self {
            Expr::Lit {
                value: Value::Int(v),
                ..
            } => Some(v),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum LExpr {
    /// `-` in a tuple position: evaluate and discard.
    Discard { loc: Loc },
    Var {
        name: Ident,
        loc: Loc,
    },
    Field {
        base: Box<LExpr>,
        field: Ident,
        loc: Loc,
    },
    Fields {
        base: Box<LExpr>,
        fields: Vec<Ident>,
        loc: Loc,
    },
    Index {
        base: Box<LExpr>,
        index: Box<Expr>,
        loc: Loc,
    },
    Slices {
        base: Box<LExpr>,
        slices: Vec<Slice>,
        loc: Loc,
    },
    /// `[x, y] = e` with per-element widths.
    BitTuple {
        widths: Vec<Expr>,
        elems: Vec<LExpr>,
        loc: Loc,
    },
    Tuple {
        elems: Vec<LExpr>,
        loc: Loc,
    },
    /// Read-modify-write through a getter/setter pair, after typechecking.
    ReadWrite {
        getter: Ident,
        setter: Ident,
        params: Vec<Expr>,
        args: Vec<Expr>,
        throws: Throws,
        loc: Loc,
    },
    /// A plain setter application.
    Write {
        setter: Ident,
        params: Vec<Expr>,
        args: Vec<Expr>,
        throws: Throws,
        loc: Loc,
    },
}

impl LExpr {
    pub fn loc(&self) -> &Loc {
        match self {
            LExpr::Discard { loc }
            | LExpr::Var { loc, .. }
            | LExpr::Field { loc, .. }
            | LExpr::Fields { loc, .. }
            | LExpr::Index { loc, .. }
            | LExpr::Slices { loc, .. }
            | LExpr::BitTuple { loc, .. }
            | LExpr::Tuple { loc, .. }
            | LExpr::ReadWrite { loc, .. }
            | LExpr::Write { loc, .. } => loc,
        }
    }
}

/// Declaration shape of a `let`/`var`/`constant` statement target.
#[derive(Clone, Debug, PartialEq)]
pub enum DeclTarget {
    Single(Ident),
    Tuple(Vec<Ident>),
    /// `[x, y]` — bitvector parts, widths filled by the typechecker.
    BitTuple(Vec<Ident>),
}

#[derive(Clone, Debug, PartialEq)]
pub struct CatchArm {
    pub exn: Ident,
    pub body: Vec<Stmt>,
    pub loc: Loc,
}

#[derive(Clone, Debug, PartialEq)]
pub struct CaseAlt {
    pub patterns: Vec<Pattern>,
    pub guard: Option<Expr>,
    pub body: Vec<Stmt>,
    pub loc: Loc,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Up,
    Down,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Stmt {
    /// `var x, y : ty;` — no initialiser.
    VarDeclsNoInit {
        ty: Ty,
        names: Vec<Ident>,
        loc: Loc,
    },
    /// `let`/`var`/`constant` with initialiser; type optional.
    VarDecl {
        constant: bool,
        ty: Option<Ty>,
        target: DeclTarget,
        init: Expr,
        loc: Loc,
    },
    Assign {
        lhs: LExpr,
        rhs: Expr,
        loc: Loc,
    },
    /// Procedure call before overload resolution.
    Call {
        name: Ident,
        args: Vec<(Option<Ident>, Expr)>,
        throws: Throws,
        loc: Loc,
    },
    /// Resolved procedure call.
    Apply {
        name: Ident,
        params: Vec<Expr>,
        args: Vec<Expr>,
        throws: Throws,
        loc: Loc,
    },
    Return {
        value: Option<Expr>,
        loc: Loc,
    },
    Assert {
        cond: Expr,
        loc: Loc,
    },
    Throw {
        exn: Expr,
        loc: Loc,
    },
    Try {
        body: Vec<Stmt>,
        bind: Ident,
        arms: Vec<CatchArm>,
        default: Option<Vec<Stmt>>,
        loc: Loc,
    },
    If {
        arms: Vec<(Expr, Vec<Stmt>)>,
        els: Vec<Stmt>,
        loc: Loc,
    },
    Case {
        expr: Expr,
        alts: Vec<CaseAlt>,
        default: Option<Vec<Stmt>>,
        loc: Loc,
    },
    For {
        var: Ident,
        from: Expr,
        dir: Direction,
        to: Expr,
        body: Vec<Stmt>,
        loc: Loc,
    },
    While {
        cond: Expr,
        body: Vec<Stmt>,
        loc: Loc,
    },
    Repeat {
        body: Vec<Stmt>,
        until: Expr,
        loc: Loc,
    },
}

impl Stmt {
    pub fn loc(&self) -> &Loc {
        match self {
            Stmt::VarDeclsNoInit { loc, .. }
            | Stmt::VarDecl { loc, .. }
            | Stmt::Assign { loc, .. }
            | Stmt::Call { loc, .. }
            | Stmt::Apply { loc, .. }
            | Stmt::Return { loc, .. }
            | Stmt::Assert { loc, .. }
            | Stmt::Throw { loc, .. }
            | Stmt::Try { loc, .. }
            | Stmt::If { loc, .. }
            | Stmt::Case { loc, .. }
            | Stmt::For { loc, .. }
            | Stmt::While { loc, .. }
            | Stmt::Repeat { loc, .. } => loc,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Field {
    pub name: Ident,
    pub ty: Ty,
}

/// Width/enumeration parameter of a function: the `{N, E}` part.
#[derive(Clone, Debug, PartialEq)]
pub struct FunParam {
    pub name: Ident,
    pub ty: Option<Ty>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct FunArg {
    pub name: Ident,
    pub ty: Ty,
    /// Default expression; may reference earlier formals.
    pub default: Option<Expr>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FunKind {
    Function,
    Getter,
    Setter,
}

#[derive(Clone, Debug, PartialEq)]
pub struct FunSig {
    pub name: Ident,
    pub kind: FunKind,
    pub params: Vec<FunParam>,
    pub args: Vec<FunArg>,
    pub rty: Option<Ty>,
    pub throws: Throws,
    pub loc: Loc,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Decl {
    BuiltinType {
        name: Ident,
        loc: Loc,
    },
    /// Forward declaration `type T;`.
    Forward {
        name: Ident,
        loc: Loc,
    },
    Record {
        name: Ident,
        params: Vec<Ident>,
        fields: Vec<Field>,
        loc: Loc,
    },
    Exception {
        name: Ident,
        fields: Vec<Field>,
        loc: Loc,
    },
    TypeAlias {
        name: Ident,
        params: Vec<Ident>,
        ty: Ty,
        loc: Loc,
    },
    Enum {
        name: Ident,
        members: Vec<Ident>,
        loc: Loc,
    },
    BuiltinFun {
        sig: FunSig,
        loc: Loc,
    },
    /// Function prototype.
    FunType {
        sig: FunSig,
        loc: Loc,
    },
    FunDefn {
        sig: FunSig,
        body: Vec<Stmt>,
        loc: Loc,
    },
    Operator1 {
        op: Unop,
        funs: Vec<Ident>,
        loc: Loc,
    },
    Operator2 {
        op: Binop,
        funs: Vec<Ident>,
        loc: Loc,
    },
    Const {
        name: Ident,
        ty: Option<Ty>,
        value: Expr,
        loc: Loc,
    },
    /// `config` — a constant overridable by the session configuration.
    Config {
        name: Ident,
        ty: Ty,
        value: Expr,
        loc: Loc,
    },
    Var {
        name: Ident,
        ty: Ty,
        loc: Loc,
    },
}

impl Decl {
    pub fn loc(&self) -> &Loc {
        match self {
            Decl::BuiltinType { loc, .. }
            | Decl::Forward { loc, .. }
            | Decl::Record { loc, .. }
            | Decl::Exception { loc, .. }
            | Decl::TypeAlias { loc, .. }
            | Decl::Enum { loc, .. }
            | Decl::BuiltinFun { loc, .. }
            | Decl::FunType { loc, .. }
            | Decl::FunDefn { loc, .. }
            | Decl::Operator1 { loc, .. }
            | Decl::Operator2 { loc, .. }
            | Decl::Const { loc, .. }
            | Decl::Config { loc, .. }
            | Decl::Var { loc, .. } => loc,
        }
    }

    /// The identifier this declaration introduces, when it has one.
    pub fn name(&self) -> Option<&Ident> {
        match self {
            Decl::BuiltinType { name, .. }
            | Decl::Forward { name, .. }
            | Decl::Record { name, .. }
            | Decl::Exception { name, .. }
            | Decl::TypeAlias { name, .. }
            | Decl::Enum { name, .. }
            | Decl::Const { name, .. }
            | Decl::Config { name, .. }
            | Decl::Var { name, .. } => Some(name),
            Decl::BuiltinFun { sig, .. }
            | Decl::FunType { sig, .. }
            | Decl::FunDefn { sig, .. } => Some(&sig.name),
            Decl::Operator1 { .. } | Decl::Operator2 { .. } => None,
        }
    }
}

pub type Declarations = Vec<Decl>;
