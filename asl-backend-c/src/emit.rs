#![forbid(unsafe_code)]

//! The C-family emitter: translates the lowered monomorphic AST into a
//! set of source files — `<base>_types.h`, `<base>_exceptions.{h,c}`,
//! `<base>_vars.{h,c}`, and one or more `<base>_funs[_i].c`.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt::Write as _;

use asl_ast::fold::fold_expr;
use asl_ast::{
    ArrayIndex, Binop, Decl, Declarations, Expr, FunSig, Ident, LExpr, Loc, Slice, Stmt, Throws,
    Ty, Unop, Value,
};
use miette::Diagnostic;
use num_traits::ToPrimitive;
use thiserror::Error;

use crate::runtime::{
    fallback_wide_helpers, BitsOp, IntOp, RuntimeKind, RuntimeLib, FALLBACK_MAX_SCALAR,
};

#[derive(Debug, Error, Diagnostic)]
pub enum EmitError {
    #[error("unimplemented: cannot emit {what}")]
    #[diagnostic(code(asl::emit::unimplemented))]
    Unimplemented {
        what: String,
        #[label]
        span: asl_ast::Span,
    },

    #[error("internal error: {message}")]
    #[diagnostic(code(asl::emit::internal))]
    Internal { message: String },
}

impl EmitError {
    fn unimplemented(loc: &Loc, what: impl Into<String>) -> Self {
        EmitError::Unimplemented {
            what: what.into(),
            span: loc.span(),
        }
    }

    fn internal(message: impl Into<String>) -> Self {
        EmitError::Internal {
            message: message.into(),
        }
    }
}

impl From<crate::runtime::RuntimeError> for EmitError {
    fn from(e: crate::runtime::RuntimeError) -> Self {
        EmitError::Internal {
            message: e.to_string(),
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct EmitOptions {
    pub basename: String,
    pub num_c_files: usize,
    pub line_info: bool,
    pub new_ffi: bool,
    /// Functions that must appear with plain C-callable signatures.
    pub exports: Vec<String>,
    pub thread_local_pointer: Option<String>,
}

impl EmitOptions {
    pub fn new(basename: &str) -> Self {
        Self {
            basename: basename.to_string(),
            num_c_files: 1,
            ..Default::default()
        }
    }
}

pub struct EmittedFile {
    pub name: String,
    pub contents: String,
}

/// The C-level view of a type.
#[derive(Clone, Debug, PartialEq)]
enum CTy {
    Unit,
    Bool,
    Int,
    SInt(usize),
    Bits(usize),
    Record(String),
    Enum(String),
    Ram,
    CString,
    Array(Box<CTy>, usize),
}

/// Reserved words of C and C++ that trigger identifier renaming.
const RESERVED: &[&str] = &[
    "auto", "bool", "break", "case", "catch", "char", "class", "const", "continue", "default",
    "delete", "do", "double", "else", "enum", "extern", "false", "float", "for", "friend", "goto",
    "if", "inline", "int", "long", "mutable", "namespace", "new", "operator", "private",
    "protected", "public", "register", "restrict", "return", "short", "signed", "sizeof",
    "static", "struct", "switch", "template", "this", "throw", "true", "try", "typedef",
    "typeid", "typename", "union", "unsigned", "using", "virtual", "void", "volatile", "while",
];

pub struct Emitter<'a> {
    rt: &'a dyn RuntimeLib,
    opts: &'a EmitOptions,
    records: HashMap<String, Vec<(Ident, CTy)>>,
    record_order: Vec<String>,
    enums: HashMap<String, Vec<Ident>>,
    enum_members: HashMap<String, String>,
    exceptions: Vec<String>,
    sigs: HashMap<Ident, (Vec<CTy>, CTy, Throws)>,
    globals: HashMap<String, CTy>,
    renames: HashMap<String, String>,
    used_names: HashSet<String>,
    wide_widths: BTreeSet<usize>,
    label_stack: Vec<String>,
    label_counter: u32,
    locals: Vec<HashMap<String, CTy>>,
    current_ret: CTy,
    propagate_used: bool,
    stmt_may_throw: bool,
}

pub fn emit(
    decls: &Declarations,
    runtime: &dyn RuntimeLib,
    opts: &EmitOptions,
) -> Result<Vec<EmittedFile>, EmitError> {
    let mut emitter = Emitter::new(runtime, opts);
    emitter.collect(decls)?;
    emitter.emit_all(decls)
}

impl<'a> Emitter<'a> {
    fn new(rt: &'a dyn RuntimeLib, opts: &'a EmitOptions) -> Self {
        Self {
            rt,
            opts,
            records: HashMap::new(),
            record_order: Vec::new(),
            enums: HashMap::new(),
            enum_members: HashMap::new(),
            exceptions: Vec::new(),
            sigs: HashMap::new(),
            globals: HashMap::new(),
            renames: HashMap::new(),
            used_names: HashSet::new(),
            wide_widths: BTreeSet::new(),
            label_stack: Vec::new(),
            label_counter: 0,
            locals: Vec::new(),
            current_ret: CTy::Unit,
            propagate_used: false,
            stmt_may_throw: false,
        }
    }

    // ---- identifier printing ----

    /// Reserved-word renaming, applied at print time. The rename map is
    /// bijective per compilation unit: distinct source identifiers have
    /// distinct display forms, and the prefix keeps them distinct.
    fn c_name(&mut self, id: &Ident) -> String {
        let display = id.to_string();
        if let Some(done) = self.renames.get(&display) {
            return done.clone();
        }
        // The root name decides the clash; the tag never saves it.
        let mut out = if RESERVED.contains(&id.name()) {
            format!("__asl_{display}")
        } else {
            display.clone()
        };
        while self.used_names.contains(&out) {
            out.push('_');
        }
        self.used_names.insert(out.clone());
        self.renames.insert(display, out.clone());
        out
    }

    // ---- type mapping ----

    fn const_usize(&self, e: &Expr, loc: &Loc) -> Result<usize, EmitError> {
        match fold_expr(e) {
            Some(Value::Int(v)) => v.to_usize().ok_or_else(|| {
                EmitError::unimplemented(loc, format!("negative width `{e}`"))
            }),
            _ => Err(EmitError::unimplemented(
                loc,
                format!("non-constant width `{e}`"),
            )),
        }
    }

    fn cty(&mut self, ty: &Ty) -> Result<CTy, EmitError> {
        match ty {
            Ty::Integer { .. } => Ok(CTy::Int),
            Ty::Bits { width, loc, .. } => {
                let w = self.const_usize(width, loc)?;
                self.note_width(w);
                Ok(CTy::Bits(w))
            }
            Ty::Named { name, args, loc } => match name.name() {
                "boolean" => Ok(CTy::Bool),
                "string" => Ok(CTy::CString),
                "integer" => Ok(CTy::Int),
                "__RAM" => Ok(CTy::Ram),
                "__sint" => {
                    let w = self.const_usize(&args[0], loc)?;
                    Ok(CTy::SInt(w))
                }
                other if self.records.contains_key(other) => {
                    Ok(CTy::Record(other.to_string()))
                }
                other if self.enums.contains_key(other) => Ok(CTy::Enum(other.to_string())),
                other => Err(EmitError::unimplemented(
                    loc,
                    format!("type `{other}` in emitted code"),
                )),
            },
            Ty::Array {
                index: ArrayIndex::Size(size),
                element,
                loc,
            } => {
                let n = self.const_usize(size, loc)?;
                let elem = self.cty(element)?;
                Ok(CTy::Array(Box::new(elem), n))
            }
            Ty::Array {
                index: ArrayIndex::Enum(e),
                element,
                loc,
            } => {
                let n = self
                    .enums
                    .get(e.name())
                    .map(|m| m.len())
                    .ok_or_else(|| EmitError::unimplemented(loc, "unknown enum index"))?;
                let elem = self.cty(element)?;
                Ok(CTy::Array(Box::new(elem), n))
            }
            Ty::Tuple { elems, .. } if elems.is_empty() => Ok(CTy::Unit),
            Ty::Tuple { loc, .. } => Err(EmitError::unimplemented(
                loc,
                "tuple types (run tuple elimination first)",
            )),
            Ty::OfExpr { loc, .. } => {
                Err(EmitError::unimplemented(loc, "typeof in emitted code"))
            }
        }
    }

    fn note_width(&mut self, w: usize) {
        if self.rt.kind() == RuntimeKind::Fallback && w > FALLBACK_MAX_SCALAR {
            self.wide_widths.insert(w);
        }
    }

    fn cty_name(&mut self, ty: &CTy) -> Result<String, EmitError> {
        Ok(match ty {
            CTy::Unit => "void".to_string(),
            CTy::Bool => "bool".to_string(),
            CTy::Int => self.rt.int_type(),
            CTy::SInt(w) => self.rt.sint_type(*w)?,
            CTy::Bits(w) => self.rt.bits_type(*w)?,
            CTy::Record(name) => self.c_name(&Ident::new(name)),
            CTy::Enum(name) => self.c_name(&Ident::new(name)),
            CTy::Ram => self.rt.ram_type(),
            CTy::CString => "const char *".to_string(),
            CTy::Array(..) => {
                return Err(EmitError::internal("array types print at declarations"))
            }
        })
    }

    /// `T name` or `T name[N]`, for declarations.
    fn declare(&mut self, ty: &CTy, name: &str) -> Result<String, EmitError> {
        match ty {
            CTy::Array(elem, n) => {
                let inner = self.cty_name(elem)?;
                Ok(format!("{inner} {name}[{n}]"))
            }
            other => {
                let inner = self.cty_name(other)?;
                Ok(format!("{inner} {name}"))
            }
        }
    }

    fn zero_value(&mut self, ty: &CTy) -> Result<String, EmitError> {
        Ok(match ty {
            CTy::Unit => String::new(),
            CTy::Bool => "false".to_string(),
            CTy::Int => self.rt.int_literal(&num_bigint::BigInt::from(0))?,
            CTy::SInt(_) | CTy::Bits(_) => "0".to_string(),
            CTy::Record(name) => {
                let n = self.c_name(&Ident::new(name));
                if self.rt.kind() == RuntimeKind::Ac {
                    format!("{n}{{}}")
                } else {
                    format!("({n}){{0}}")
                }
            }
            CTy::Enum(name) => {
                let members = self.enums.get(name).cloned().unwrap_or_default();
                match members.first() {
                    Some(m) => self.c_name(m),
                    None => "0".to_string(),
                }
            }
            CTy::Ram => "0".to_string(),
            CTy::CString => "\"\"".to_string(),
            CTy::Array(..) => "{0}".to_string(),
        })
    }

    // ---- collection ----

    fn collect(&mut self, decls: &Declarations) -> Result<(), EmitError> {
        // Records and enums first: types can reference each other.
        for d in decls {
            match d {
                Decl::Record { name, fields, .. } | Decl::Exception { name, fields, .. } => {
                    self.record_order.push(name.name().to_string());
                    self.records.insert(name.name().to_string(), Vec::new());
                    if matches!(d, Decl::Exception { .. }) {
                        self.exceptions.push(name.name().to_string());
                    }
                    let _ = fields;
                }
                Decl::Enum { name, members, .. } => {
                    self.enums
                        .insert(name.name().to_string(), members.clone());
                    for m in members {
                        self.enum_members
                            .insert(m.name().to_string(), name.name().to_string());
                    }
                }
                _ => {}
            }
        }
        for d in decls {
            if let Decl::Record { name, fields, .. } | Decl::Exception { name, fields, .. } = d {
                let mut out = Vec::with_capacity(fields.len());
                for f in fields {
                    let ty = self.cty(&f.ty)?;
                    out.push((f.name.clone(), ty));
                }
                self.records.insert(name.name().to_string(), out);
            }
        }
        for d in decls {
            match d {
                Decl::FunDefn { sig, .. } | Decl::FunType { sig, .. } => {
                    let args = sig
                        .args
                        .iter()
                        .map(|a| self.cty(&a.ty))
                        .collect::<Result<Vec<_>, _>>()?;
                    let ret = match &sig.rty {
                        Some(t) => self.cty(t)?,
                        None => CTy::Unit,
                    };
                    self.sigs
                        .insert(sig.name.clone(), (args, ret, sig.throws));
                }
                Decl::Var { name, ty, .. } | Decl::Config { name, ty, .. } => {
                    let cty = self.cty(ty)?;
                    self.globals.insert(name.name().to_string(), cty);
                }
                Decl::Const { name, ty, .. } => {
                    if let Some(ty) = ty {
                        let cty = self.cty(ty)?;
                        self.globals.insert(name.name().to_string(), cty);
                    }
                }
                _ => {}
            }
        }

        // Old-style FFI: exported functions keep their unchanged names.
        if !self.opts.new_ffi {
            for export in &self.opts.exports {
                let tagged: Vec<Ident> = self
                    .sigs
                    .keys()
                    .filter(|n| n.name() == export.as_str())
                    .cloned()
                    .collect();
                if let [only] = tagged.as_slice() {
                    self.renames.insert(only.to_string(), export.clone());
                    self.used_names.insert(export.clone());
                }
            }
        }
        Ok(())
    }

    // ---- expressions ----

    fn expr(&mut self, e: &Expr) -> Result<(String, CTy), EmitError> {
        match e {
            Expr::Lit { value, loc } => self.literal(value, loc),
            Expr::Var { name, loc } => {
                if let Some(ty) = self.lookup_local(name.name()) {
                    let n = self.c_name(name);
                    return Ok((n, ty));
                }
                if let Some(ty) = self.globals.get(name.name()).cloned() {
                    let n = self.c_name(name);
                    return Ok((n, ty));
                }
                if let Some(enum_ty) = self.enum_members.get(name.name()).cloned() {
                    let n = self.c_name(name);
                    return Ok((n, CTy::Enum(enum_ty)));
                }
                Err(EmitError::unimplemented(
                    loc,
                    format!("unknown name `{name}`"),
                ))
            }
            Expr::Field { base, field, loc } => {
                let (b, bty) = self.expr(base)?;
                let sep = match (&**base, &self.opts.thread_local_pointer) {
                    (Expr::Var { name, .. }, Some(ptr)) if name.name() == ptr => "->",
                    _ => ".",
                };
                let fty = match &bty {
                    CTy::Record(r) => self
                        .records
                        .get(r)
                        .and_then(|fs| {
                            fs.iter()
                                .find(|(n, _)| n.root_matches(field))
                                .map(|(_, t)| t.clone())
                        })
                        .ok_or_else(|| {
                            EmitError::unimplemented(loc, format!("field `{field}`"))
                        })?,
                    _ if sep == "->" => {
                        // Wrapped global: the pointer target carries the
                        // global's type.
                        self.globals.get(field.name()).cloned().ok_or_else(|| {
                            EmitError::unimplemented(loc, format!("wrapped global `{field}`"))
                        })?
                    }
                    other => {
                        return Err(EmitError::unimplemented(
                            loc,
                            format!("field access on {other:?}"),
                        ))
                    }
                };
                let f = self.c_name(field);
                Ok((format!("{b}{sep}{f}"), fty))
            }
            Expr::Index { base, index, loc } => {
                let (b, bty) = self.expr(base)?;
                let (i, ity) = self.expr(index)?;
                let i = self.index_expr(i, &ity);
                match bty {
                    CTy::Array(elem, _) => Ok((format!("{b}[{i}]"), *elem)),
                    other => Err(EmitError::unimplemented(
                        loc,
                        format!("subscript on {other:?}"),
                    )),
                }
            }
            Expr::Slices { base, slices, loc } => {
                let (b, bty) = self.expr(base)?;
                let base_width = match bty {
                    CTy::Bits(w) => w,
                    // Integer slices read the low 64 bits.
                    CTy::Int | CTy::SInt(_) => 64,
                    other => {
                        return Err(EmitError::unimplemented(
                            loc,
                            format!("slice of {other:?}"),
                        ))
                    }
                };
                let mut parts: Vec<(String, usize)> = Vec::new();
                for s in slices {
                    let (lo, w) = match s {
                        Slice::LowWidth(lo, w) => (lo, w),
                        other => {
                            return Err(EmitError::unimplemented(
                                loc,
                                format!("non-canonical slice `{other}`"),
                            ))
                        }
                    };
                    let w = self.const_usize(w, loc)?;
                    let (lo_s, loty) = self.expr(lo)?;
                    let lo_s = self.index_expr(lo_s, &loty);
                    parts.push((self.rt.slice_get(base_width, w, &b, &lo_s)?, w));
                }
                let (mut acc, mut acc_w) = parts
                    .first()
                    .cloned()
                    .ok_or_else(|| EmitError::internal("empty slice list"))?;
                for (p, w) in parts.into_iter().skip(1) {
                    acc = self.rt.append_bits(acc_w, w, &acc, &p)?;
                    acc_w += w;
                }
                self.note_width(acc_w);
                Ok((acc, CTy::Bits(acc_w)))
            }
            Expr::Record {
                name, fields, loc, ..
            } => {
                let rec = self
                    .records
                    .get(name.name())
                    .cloned()
                    .ok_or_else(|| {
                        EmitError::unimplemented(loc, format!("record `{name}`"))
                    })?;
                let mut inits = Vec::with_capacity(fields.len());
                for ((fname, fexpr), (_, fty)) in fields.iter().zip(rec.iter()) {
                    let (v, vty) = self.expr(fexpr)?;
                    let _ = vty;
                    let f = self.c_name(fname);
                    let _ = fty;
                    if self.rt.kind() == RuntimeKind::Ac {
                        inits.push(v);
                    } else {
                        inits.push(format!(".{f} = {v}"));
                    }
                }
                let n = self.c_name(&Ident::new(name.name()));
                let body = inits.join(", ");
                let out = if self.rt.kind() == RuntimeKind::Ac {
                    format!("{n}{{{body}}}")
                } else {
                    format!("(({n}){{{body}}})")
                };
                Ok((out, CTy::Record(name.name().to_string())))
            }
            Expr::If { arms, els, .. } => {
                let (e, ety) = self.expr(els)?;
                let mut out = e;
                for (c, v) in arms.iter().rev() {
                    let (cs, _) = self.expr(c)?;
                    let (vs, _) = self.expr(v)?;
                    out = format!("(({cs}) ? ({vs}) : ({out}))");
                }
                Ok((out, ety))
            }
            Expr::Apply {
                name,
                params,
                args,
                throws,
                loc,
            } => self.apply(name, params, args, *throws, loc),
            Expr::Concat { elems, loc, .. } => {
                let mut acc: Option<(String, usize)> = None;
                for e in elems {
                    let (s, ty) = self.expr(e)?;
                    let w = match ty {
                        CTy::Bits(w) => w,
                        other => {
                            return Err(EmitError::unimplemented(
                                loc,
                                format!("concatenating {other:?}"),
                            ))
                        }
                    };
                    acc = Some(match acc {
                        None => (s, w),
                        Some((prev, pw)) => {
                            (self.rt.append_bits(pw, w, &prev, &s)?, pw + w)
                        }
                    });
                }
                let (s, w) =
                    acc.ok_or_else(|| EmitError::internal("empty concatenation"))?;
                self.note_width(w);
                Ok((s, CTy::Bits(w)))
            }
            Expr::Unop { op, operand, loc } => {
                let (o, oty) = self.expr(operand)?;
                match op {
                    Unop::BoolNot => Ok((format!("(!({o}))"), CTy::Bool)),
                    Unop::Neg => match &oty {
                        CTy::Int => {
                            Ok((self.rt.int_op(IntOp::Neg, &[o])?, CTy::Int))
                        }
                        CTy::SInt(w) => {
                            Ok((self.rt.sint_op(IntOp::Neg, *w, &[o])?, oty.clone()))
                        }
                        other => Err(EmitError::unimplemented(
                            loc,
                            format!("negation of {other:?}"),
                        )),
                    },
                    Unop::BitsNot => match &oty {
                        CTy::Bits(w) => {
                            Ok((self.rt.bits_op(BitsOp::Not, *w, &[o])?, oty.clone()))
                        }
                        other => Err(EmitError::unimplemented(
                            loc,
                            format!("bitwise not of {other:?}"),
                        )),
                    },
                }
            }
            Expr::Binop { op, lhs, rhs, loc } => {
                let (l, lty) = self.expr(lhs)?;
                let (r, _) = self.expr(rhs)?;
                let args = vec![l, r];
                match op {
                    Binop::BoolAnd => Ok((format!("(({}) && ({}))", args[0], args[1]), CTy::Bool)),
                    Binop::BoolOr => Ok((format!("(({}) || ({}))", args[0], args[1]), CTy::Bool)),
                    Binop::Implies => Ok((
                        format!("((!({})) || ({}))", args[0], args[1]),
                        CTy::Bool,
                    )),
                    Binop::Iff => Ok((format!("(({}) == ({}))", args[0], args[1]), CTy::Bool)),
                    Binop::Eq | Binop::Ne | Binop::Lt | Binop::Le | Binop::Gt | Binop::Ge => {
                        let op = match op {
                            Binop::Eq => IntOp::Eq,
                            Binop::Ne => IntOp::Ne,
                            Binop::Lt => IntOp::Lt,
                            Binop::Le => IntOp::Le,
                            Binop::Gt => IntOp::Gt,
                            _ => IntOp::Ge,
                        };
                        Ok((self.rt.int_op(op, &args)?, CTy::Bool))
                    }
                    Binop::Plus | Binop::Minus | Binop::Mul => {
                        let op = match op {
                            Binop::Plus => IntOp::Add,
                            Binop::Minus => IntOp::Sub,
                            _ => IntOp::Mul,
                        };
                        Ok((self.rt.int_op(op, &args)?, lty))
                    }
                    Binop::Div => Ok((self.rt.int_op(IntOp::ExactDiv, &args)?, lty)),
                    Binop::ZDiv => Ok((self.rt.int_op(IntOp::ZDiv, &args)?, lty)),
                    Binop::ZRem => Ok((self.rt.int_op(IntOp::ZRem, &args)?, lty)),
                    Binop::FDiv => Ok((self.rt.int_op(IntOp::FDiv, &args)?, lty)),
                    Binop::FRem => Ok((self.rt.int_op(IntOp::FRem, &args)?, lty)),
                    Binop::Shl => Ok((self.rt.int_op(IntOp::Shl, &args)?, lty)),
                    Binop::Shr => Ok((self.rt.int_op(IntOp::Shr, &args)?, lty)),
                    other => Err(EmitError::unimplemented(
                        loc,
                        format!("operator `{other}` in emitted code"),
                    )),
                }
            }
            Expr::AsConstraint { expr, .. } => self.expr(expr),
            Expr::AsType { expr, ty, .. } => {
                let (s, _) = self.expr(expr)?;
                let target = self.cty(ty)?;
                Ok((s, target))
            }
            Expr::Unknown { ty, .. } => {
                let cty = self.cty(ty)?;
                let zero = self.zero_value(&cty)?;
                Ok((zero, cty))
            }
            other => Err(EmitError::unimplemented(
                other.loc(),
                format!("expression `{other}` (should have been lowered)"),
            )),
        }
    }

    /// Indices and shift amounts need a plain `int`-convertible form.
    fn index_expr(&self, s: String, ty: &CTy) -> String {
        match (self.rt.kind(), ty) {
            (RuntimeKind::Ac, _) => format!("({s}).to_int()"),
            _ => s,
        }
    }

    fn literal(&mut self, v: &Value, loc: &Loc) -> Result<(String, CTy), EmitError> {
        Ok(match v {
            Value::Int(n) => (self.rt.int_literal(n)?, CTy::Int),
            Value::SizedInt(s) => (self.rt.sint_literal(s)?, CTy::SInt(s.width)),
            Value::Bits(b) => {
                self.note_width(b.width);
                (self.rt.bits_literal(b)?, CTy::Bits(b.width))
            }
            Value::Bool(b) => (if *b { "true" } else { "false" }.to_string(), CTy::Bool),
            Value::String(s) => (format!("{s:?}"), CTy::CString),
            other => {
                return Err(EmitError::unimplemented(
                    loc,
                    format!("literal `{other}`"),
                ))
            }
        })
    }

    fn apply(
        &mut self,
        name: &Ident,
        params: &[Expr],
        args: &[Expr],
        throws: Throws,
        loc: &Loc,
    ) -> Result<(String, CTy), EmitError> {
        let base = name.name();

        // User-defined functions.
        if let Some((_, ret, sig_throws)) = self.sigs.get(name).cloned() {
            let mut parts = Vec::with_capacity(args.len());
            for a in args {
                parts.push(self.expr(a)?.0);
            }
            if sig_throws != Throws::No || throws != Throws::No {
                self.stmt_may_throw = true;
            }
            let n = self.c_name(name);
            return Ok((format!("{n}({})", parts.join(", ")), ret));
        }

        let param_width = |i: usize| -> Result<usize, EmitError> {
            params
                .get(i)
                .ok_or_else(|| EmitError::internal(format!("missing width on `{base}`")))
                .and_then(|p| self.const_usize(p, loc))
        };

        // Bounded-integer primitives carry their width as the parameter.
        if base.ends_with("_sintN") {
            if let Some(op) = IntOp::from_prim(base) {
                let w = param_width(0)?;
                let mut parts = Vec::with_capacity(args.len());
                for a in args {
                    parts.push(self.expr(a)?.0);
                }
                let out = self.rt.sint_op(op, w, &parts)?;
                let ret = match op {
                    IntOp::Eq | IntOp::Ne | IntOp::Lt | IntOp::Le | IntOp::Gt | IntOp::Ge => {
                        CTy::Bool
                    }
                    _ => CTy::SInt(w),
                };
                return Ok((out, ret));
            }
        }

        if let Some(op) = IntOp::from_prim(base) {
            let mut parts = Vec::with_capacity(args.len());
            for a in args {
                parts.push(self.expr(a)?.0);
            }
            let ret = match op {
                IntOp::Eq | IntOp::Ne | IntOp::Lt | IntOp::Le | IntOp::Gt | IntOp::Ge
                | IntOp::IsPow2 => CTy::Bool,
                _ => CTy::Int,
            };
            return Ok((self.rt.int_op(op, &parts)?, ret));
        }

        if let Some(op) = BitsOp::from_prim(base) {
            let w = param_width(0)?;
            self.note_width(w);
            let mut parts = Vec::with_capacity(args.len());
            for (i, a) in args.iter().enumerate() {
                let (s, ty) = self.expr(a)?;
                // Shift amounts are integers, not bits.
                if matches!(op, BitsOp::Lsl | BitsOp::Lsr | BitsOp::Asr) && i == 1 {
                    parts.push(self.index_expr(s, &ty));
                } else {
                    parts.push(s);
                }
            }
            let ret = match op {
                BitsOp::Eq | BitsOp::Ne => CTy::Bool,
                _ => CTy::Bits(w),
            };
            return Ok((self.rt.bits_op(op, w, &parts)?, ret));
        }

        match base {
            "zeros_bits" | "ones_bits" => {
                let w = param_width(0)?;
                self.note_width(w);
                let zeros = self.rt.cvt_int_to_bits(w, "0")?;
                let out = if base == "zeros_bits" {
                    zeros
                } else {
                    self.rt.bits_op(BitsOp::Not, w, &[zeros])?
                };
                Ok((out, CTy::Bits(w)))
            }
            "zero_extend_bits" | "sign_extend_bits" => {
                let from = param_width(0)?;
                let to = param_width(1)?;
                self.note_width(to);
                let (a, _) = self.expr(&args[0])?;
                let out = if base == "zero_extend_bits" {
                    self.rt.zero_extend(from, to, &a)?
                } else {
                    self.rt.sign_extend(from, to, &a)?
                };
                Ok((out, CTy::Bits(to)))
            }
            "append_bits" => {
                let wa = param_width(0)?;
                let wb = param_width(1)?;
                self.note_width(wa + wb);
                let (a, _) = self.expr(&args[0])?;
                let (b, _) = self.expr(&args[1])?;
                Ok((self.rt.append_bits(wa, wb, &a, &b)?, CTy::Bits(wa + wb)))
            }
            "replicate_bits" => {
                let w = param_width(0)?;
                let count = param_width(1)?;
                self.note_width(w * count);
                let (a, _) = self.expr(&args[0])?;
                Ok((
                    self.rt.replicate_bits(w, count, &a)?,
                    CTy::Bits(w * count),
                ))
            }
            "cvt_bits_uint" | "cvt_bits_sint" => {
                let w = param_width(0)?;
                let (a, _) = self.expr(&args[0])?;
                Ok((
                    self.rt.cvt_bits_to_int(w, base == "cvt_bits_sint", &a)?,
                    CTy::Int,
                ))
            }
            "cvt_int_bits" => {
                let w = param_width(0)?;
                self.note_width(w);
                let (a, _) = self.expr(&args[0])?;
                Ok((self.rt.cvt_int_to_bits(w, &a)?, CTy::Bits(w)))
            }
            "cvt_int_sintN" => {
                let w = param_width(0)?;
                let (a, _) = self.expr(&args[0])?;
                Ok((self.rt.cvt_int_to_sint(w, &a)?, CTy::SInt(w)))
            }
            "cvt_sintN_int" => {
                let w = param_width(0)?;
                let (a, _) = self.expr(&args[0])?;
                Ok((self.rt.cvt_sint_to_int(w, &a)?, CTy::Int))
            }
            "resize_sintN" => {
                let from = param_width(0)?;
                let to = param_width(1)?;
                let (a, _) = self.expr(&args[0])?;
                Ok((self.rt.resize_sint(from, to, &a)?, CTy::SInt(to)))
            }
            "get_slice_bits" => {
                let bw = param_width(0)?;
                let w = param_width(1)?;
                let (a, _) = self.expr(&args[0])?;
                let (lo, loty) = self.expr(&args[1])?;
                let lo = self.index_expr(lo, &loty);
                Ok((self.rt.slice_get(bw, w, &a, &lo)?, CTy::Bits(w)))
            }
            "set_slice_bits" => {
                let bw = param_width(0)?;
                let w = param_width(1)?;
                let (a, _) = self.expr(&args[0])?;
                let (lo, loty) = self.expr(&args[1])?;
                let lo = self.index_expr(lo, &loty);
                let (v, _) = self.expr(&args[3])?;
                Ok((self.rt.slice_set(bw, w, &a, &lo, &v)?, CTy::Bits(bw)))
            }
            "in_mask" | "notin_mask" => {
                let w = param_width(0)?;
                let (a, _) = self.expr(&args[0])?;
                let mask = match &args[1] {
                    Expr::Lit {
                        value: Value::Mask(m),
                        ..
                    } => m.clone(),
                    other => {
                        return Err(EmitError::unimplemented(
                            other.loc(),
                            "non-literal mask",
                        ))
                    }
                };
                let test = self.rt.mask_test(w, &a, &mask)?;
                let out = if base == "in_mask" {
                    format!("({test})")
                } else {
                    format!("(!({test}))")
                };
                Ok((out, CTy::Bool))
            }
            "eq_enum" | "ne_enum" => {
                let (a, _) = self.expr(&args[0])?;
                let (b, _) = self.expr(&args[1])?;
                let sym = if base == "eq_enum" { "==" } else { "!=" };
                Ok((format!("(({a}) {sym} ({b}))"), CTy::Bool))
            }
            "eq_bool" | "ne_bool" | "equiv_bool" => {
                let (a, _) = self.expr(&args[0])?;
                let (b, _) = self.expr(&args[1])?;
                let sym = if base == "ne_bool" { "!=" } else { "==" };
                Ok((format!("(({a}) {sym} ({b}))"), CTy::Bool))
            }
            "and_bool" | "or_bool" | "implies_bool" | "not_bool" => {
                let (a, _) = self.expr(&args[0])?;
                let out = match base {
                    "not_bool" => format!("(!({a}))"),
                    _ => {
                        let (b, _) = self.expr(&args[1])?;
                        match base {
                            "and_bool" => format!("(({a}) && ({b}))"),
                            "or_bool" => format!("(({a}) || ({b}))"),
                            _ => format!("((!({a})) || ({b}))"),
                        }
                    }
                };
                Ok((out, CTy::Bool))
            }
            "print_str" => {
                let (a, _) = self.expr(&args[0])?;
                Ok((self.rt.print_str(&a), CTy::Unit))
            }
            "print_char" => {
                let (a, _) = self.expr(&args[0])?;
                Ok((self.rt.print_char(&a), CTy::Unit))
            }
            "print_int_dec" | "print_int_hex" => {
                let (a, _) = self.expr(&args[0])?;
                Ok((self.rt.print_int(base.ends_with("hex"), &a), CTy::Unit))
            }
            "print_sintN_dec" | "print_sintN_hex" => {
                let w = param_width(0)?;
                let (a, _) = self.expr(&args[0])?;
                Ok((
                    self.rt.print_sint(w, base.ends_with("hex"), &a)?,
                    CTy::Unit,
                ))
            }
            "print_bits_hex" => {
                let w = param_width(0)?;
                let (a, _) = self.expr(&args[0])?;
                Ok((self.rt.print_bits_hex(w, &a)?, CTy::Unit))
            }
            "println" => Ok(("putchar('\\n')".to_string(), CTy::Unit)),
            "__ram_init" => {
                let aw = param_width(0)?;
                let (ram, _) = self.expr(&args[0])?;
                let (v, _) = self.expr(&args[1])?;
                Ok((self.rt.ram_init(aw, &ram, &v)?, CTy::Unit))
            }
            "__ram_read" => {
                let aw = param_width(0)?;
                let n = param_width(1)?;
                self.note_width(8 * n);
                let (ram, _) = self.expr(&args[0])?;
                let (addr, _) = self.expr(&args[1])?;
                Ok((
                    self.rt.ram_read(aw, n, &ram, &addr)?,
                    CTy::Bits(8 * n),
                ))
            }
            "__ram_write" => {
                let aw = param_width(0)?;
                let n = param_width(1)?;
                let (ram, _) = self.expr(&args[0])?;
                let (addr, _) = self.expr(&args[1])?;
                let (v, _) = self.expr(&args[3])?;
                Ok((self.rt.ram_write(aw, n, &ram, &addr, &v)?, CTy::Unit))
            }
            "asl_fatal_error" => {
                let (a, _) = self.expr(&args[0])?;
                Ok((format!("ASL_error({a})"), CTy::Unit))
            }
            "__unmatched_case" => {
                Ok(("ASL_error(\"unmatched case\")".to_string(), CTy::Unit))
            }
            other => Err(EmitError::unimplemented(
                loc,
                format!("primitive `{other}`"),
            )),
        }
    }

    // ---- statements ----

    fn lookup_local(&self, name: &str) -> Option<CTy> {
        self.locals
            .iter()
            .rev()
            .find_map(|scope| scope.get(name).cloned())
    }

    fn bind_local(&mut self, name: &str, ty: CTy) {
        if let Some(scope) = self.locals.last_mut() {
            scope.insert(name.to_string(), ty);
        }
    }

    fn line_directive(&self, out: &mut String, loc: &Loc) {
        if !self.opts.line_info {
            return;
        }
        if let (Some(file), Some(line)) = (loc.file(), loc.start_line()) {
            let escaped = file.replace('\\', "\\\\").replace('"', "\\\"");
            let _ = writeln!(out, "#line {line} \"{escaped}\"");
        }
    }

    fn current_label(&self) -> Option<String> {
        self.label_stack.last().cloned()
    }

    /// After any statement containing a may-throw call, check the tag and
    /// forward to the current catch label.
    fn throw_check(&mut self, out: &mut String, indent: &str) {
        if !self.stmt_may_throw {
            return;
        }
        self.stmt_may_throw = false;
        let target = match self.current_label() {
            Some(l) => l,
            None => {
                self.propagate_used = true;
                "ASL_propagate".to_string()
            }
        };
        let _ = writeln!(
            out,
            "{indent}if (ASL_exception.ASL_tag != ASL_no_exception) goto {target};"
        );
    }

    fn stmts(&mut self, stmts: &[Stmt], out: &mut String, indent: &str) -> Result<(), EmitError> {
        for s in stmts {
            self.stmt(s, out, indent)?;
        }
        Ok(())
    }

    fn stmt(&mut self, s: &Stmt, out: &mut String, indent: &str) -> Result<(), EmitError> {
        self.line_directive(out, s.loc());
        match s {
            Stmt::VarDeclsNoInit { ty, names, loc } => {
                let cty = self.cty(ty)?;
                for n in names {
                    let name = self.c_name(n);
                    let decl = self.declare(&cty, &name)?;
                    let zero = self.zero_value(&cty)?;
                    match cty {
                        CTy::Array(..) => {
                            let _ = writeln!(out, "{indent}{decl} = {{0}};");
                        }
                        _ => {
                            let _ = writeln!(out, "{indent}{decl} = {zero};");
                        }
                    }
                    self.bind_local(n.name(), cty.clone());
                }
                let _ = loc;
                Ok(())
            }
            Stmt::VarDecl {
                ty,
                target,
                init,
                loc,
                ..
            } => {
                let name = match target {
                    asl_ast::DeclTarget::Single(n) => n,
                    other => {
                        return Err(EmitError::unimplemented(
                            loc,
                            format!("declaration target {other:?} (should have been lowered)"),
                        ))
                    }
                };
                let (v, vty) = self.expr(init)?;
                let cty = match ty {
                    Some(t) => self.cty(t)?,
                    None => vty,
                };
                let n = self.c_name(name);
                let decl = self.declare(&cty, &n)?;
                let _ = writeln!(out, "{indent}{decl} = {v};");
                self.bind_local(name.name(), cty);
                self.throw_check(out, indent);
                Ok(())
            }
            Stmt::Assign { lhs, rhs, loc } => {
                let (v, _) = self.expr(rhs)?;
                self.assign(lhs, v, out, indent, loc)?;
                self.throw_check(out, indent);
                Ok(())
            }
            Stmt::Apply {
                name,
                params,
                args,
                throws,
                loc,
            } => {
                let (call, _) = self.apply(name, params, args, *throws, loc)?;
                let _ = writeln!(out, "{indent}{call};");
                if *throws != Throws::No {
                    self.stmt_may_throw = true;
                }
                self.throw_check(out, indent);
                Ok(())
            }
            Stmt::Return { value, .. } => {
                match value {
                    Some(e) => {
                        let (v, _) = self.expr(e)?;
                        if self.stmt_may_throw {
                            // The call runs inside the return expression,
                            // so bind it first and check the tag between.
                            self.label_counter += 1;
                            let k = self.label_counter;
                            let ret = self.current_ret.clone();
                            let tmp = format!("ASL_retval_{k}");
                            let decl = self.declare(&ret, &tmp)?;
                            let _ = writeln!(out, "{indent}{decl} = {v};");
                            self.throw_check(out, indent);
                            let _ = writeln!(out, "{indent}return {tmp};");
                        } else {
                            let _ = writeln!(out, "{indent}return {v};");
                        }
                    }
                    None => {
                        let _ = writeln!(out, "{indent}return;");
                    }
                }
                Ok(())
            }
            Stmt::Assert { cond, loc } => {
                let (c, _) = self.expr(cond)?;
                let what = format!("{loc}").replace('"', "'");
                let _ = writeln!(out, "{indent}ASL_assert({c}, \"{what}\");");
                self.throw_check(out, indent);
                Ok(())
            }
            Stmt::Throw { exn, loc } => {
                let (ety, tag) = match exn {
                    Expr::Record { name, .. } => (
                        name.name().to_string(),
                        format!("ASL_tag_{}", name.name()),
                    ),
                    other => {
                        // A rethrown handler variable.
                        let (_, ty) = self.expr(other)?;
                        match ty {
                            CTy::Record(r) => {
                                (r.clone(), format!("ASL_tag_{r}"))
                            }
                            _ => {
                                return Err(EmitError::unimplemented(
                                    loc,
                                    "throwing a non-exception value",
                                ))
                            }
                        }
                    }
                };
                let (v, _) = self.expr(exn)?;
                let field = self.c_name(&Ident::new(&ety));
                let _ = writeln!(out, "{indent}ASL_exception.ASL_tag = {tag};");
                let _ = writeln!(out, "{indent}ASL_exception.u.{field} = {v};");
                let target = match self.current_label() {
                    Some(l) => l,
                    None => {
                        self.propagate_used = true;
                        "ASL_propagate".to_string()
                    }
                };
                let _ = writeln!(out, "{indent}goto {target};");
                Ok(())
            }
            Stmt::Try {
                body,
                bind,
                arms,
                default,
                loc,
            } => {
                self.label_counter += 1;
                let k = self.label_counter;
                let catch = format!("ASL_catch_{k}");
                let done = format!("ASL_try_done_{k}");
                let _ = writeln!(out, "{indent}{{");
                let inner = format!("{indent}  ");
                self.label_stack.push(catch.clone());
                self.locals.push(HashMap::new());
                self.stmts(body, out, &inner)?;
                self.locals.pop();
                self.label_stack.pop();
                let _ = writeln!(out, "{indent}goto {done};");
                let _ = writeln!(out, "{catch}: ;");
                for arm in arms {
                    let rec = arm.exn.name().to_string();
                    let tag = format!("ASL_tag_{rec}");
                    let rec_ty = self.c_name(&Ident::new(&rec));
                    let b = self.c_name(bind);
                    let _ = writeln!(out, "{indent}if (ASL_exception.ASL_tag == {tag}) {{");
                    let _ = writeln!(
                        out,
                        "{inner}{rec_ty} {b} = ASL_exception.u.{rec_ty};"
                    );
                    let _ = writeln!(
                        out,
                        "{inner}ASL_exception.ASL_tag = ASL_no_exception;"
                    );
                    self.locals.push(HashMap::new());
                    self.bind_local(bind.name(), CTy::Record(rec));
                    self.stmts(&arm.body, out, &inner)?;
                    self.locals.pop();
                    let _ = writeln!(out, "{inner}goto {done};");
                    let _ = writeln!(out, "{indent}}}");
                }
                match default {
                    Some(d) => {
                        let _ = writeln!(
                            out,
                            "{inner}ASL_exception.ASL_tag = ASL_no_exception;"
                        );
                        self.locals.push(HashMap::new());
                        self.stmts(d, out, &inner)?;
                        self.locals.pop();
                        let _ = writeln!(out, "{inner}goto {done};");
                    }
                    None => {
                        // No arm matched: keep propagating outward.
                        let target = match self.current_label() {
                            Some(l) => l,
                            None => {
                                self.propagate_used = true;
                                "ASL_propagate".to_string()
                            }
                        };
                        let _ = writeln!(out, "{inner}goto {target};");
                    }
                }
                let _ = writeln!(out, "{done}: ;");
                let _ = writeln!(out, "{indent}}}");
                let _ = loc;
                Ok(())
            }
            Stmt::If { arms, els, .. } => {
                for (i, (c, body)) in arms.iter().enumerate() {
                    let (cs, _) = self.expr(c)?;
                    if i == 0 {
                        let _ = writeln!(out, "{indent}if ({cs}) {{");
                    } else {
                        let _ = writeln!(out, "{indent}}} else if ({cs}) {{");
                    }
                    self.locals.push(HashMap::new());
                    self.stmts(body, out, &format!("{indent}  "))?;
                    self.locals.pop();
                }
                if !els.is_empty() {
                    let _ = writeln!(out, "{indent}}} else {{");
                    self.locals.push(HashMap::new());
                    self.stmts(els, out, &format!("{indent}  "))?;
                    self.locals.pop();
                }
                let _ = writeln!(out, "{indent}}}");
                Ok(())
            }
            Stmt::Case { loc, .. } => Err(EmitError::unimplemented(
                loc,
                "case statement (run case lowering first)",
            )),
            Stmt::For {
                var,
                from,
                dir,
                to,
                body,
                ..
            } => {
                let (f, _) = self.expr(from)?;
                let (t, _) = self.expr(to)?;
                let n = self.c_name(var);
                let ity = self.rt.int_type();
                let (cmp, step) = match dir {
                    asl_ast::Direction::Up => ("<=", format!("{n} = {n} + 1")),
                    asl_ast::Direction::Down => (">=", format!("{n} = {n} - 1")),
                };
                let _ = writeln!(
                    out,
                    "{indent}for ({ity} {n} = {f}; {n} {cmp} {t}; {step}) {{"
                );
                self.locals.push(HashMap::new());
                self.bind_local(var.name(), CTy::Int);
                self.stmts(body, out, &format!("{indent}  "))?;
                self.locals.pop();
                let _ = writeln!(out, "{indent}}}");
                Ok(())
            }
            Stmt::While { cond, body, .. } => {
                let (c, _) = self.expr(cond)?;
                let _ = writeln!(out, "{indent}while ({c}) {{");
                self.locals.push(HashMap::new());
                self.stmts(body, out, &format!("{indent}  "))?;
                self.locals.pop();
                let _ = writeln!(out, "{indent}}}");
                Ok(())
            }
            Stmt::Repeat { body, until, .. } => {
                let _ = writeln!(out, "{indent}do {{");
                self.locals.push(HashMap::new());
                self.stmts(body, out, &format!("{indent}  "))?;
                self.locals.pop();
                let (c, _) = self.expr(until)?;
                let _ = writeln!(out, "{indent}}} while (!({c}));");
                Ok(())
            }
            Stmt::Call { loc, .. } => Err(EmitError::internal(format!(
                "unresolved call reached the emitter at {loc}"
            ))),
        }
    }

    fn assign(
        &mut self,
        lhs: &LExpr,
        rhs: String,
        out: &mut String,
        indent: &str,
        loc: &Loc,
    ) -> Result<(), EmitError> {
        match lhs {
            LExpr::Discard { .. } => {
                let _ = writeln!(out, "{indent}(void)({rhs});");
                Ok(())
            }
            LExpr::Var { name, .. } => {
                let n = self.c_name(name);
                let _ = writeln!(out, "{indent}{n} = {rhs};");
                Ok(())
            }
            LExpr::Field { base, field, .. } => {
                let (b, sep) = self.lexpr_base(base)?;
                let f = self.c_name(field);
                let _ = writeln!(out, "{indent}{b}{sep}{f} = {rhs};");
                Ok(())
            }
            LExpr::Index { base, index, .. } => {
                let (b, _) = self.lexpr_base(base)?;
                let (i, ity) = self.expr(index)?;
                let i = self.index_expr(i, &ity);
                let _ = writeln!(out, "{indent}{b}[{i}] = {rhs};");
                Ok(())
            }
            LExpr::Slices { base, slices, .. } => {
                let (b, _) = self.lexpr_base(base)?;
                let bty = self.lexpr_ty(base)?;
                let bw = match bty {
                    CTy::Bits(w) => w,
                    other => {
                        return Err(EmitError::unimplemented(
                            loc,
                            format!("slice assignment to {other:?}"),
                        ))
                    }
                };
                let [Slice::LowWidth(lo, w)] = slices.as_slice() else {
                    return Err(EmitError::unimplemented(
                        loc,
                        "multi-slice assignment (should have been lowered)",
                    ));
                };
                let w = self.const_usize(w, loc)?;
                let (lo_s, loty) = self.expr(lo)?;
                let lo_s = self.index_expr(lo_s, &loty);
                let set = self.rt.slice_set(bw, w, &b, &lo_s, &rhs)?;
                let _ = writeln!(out, "{indent}{b} = {set};");
                Ok(())
            }
            other => Err(EmitError::unimplemented(
                loc,
                format!("assignment target `{other}` (should have been lowered)"),
            )),
        }
    }

    fn lexpr_base(&mut self, l: &LExpr) -> Result<(String, &'static str), EmitError> {
        match l {
            LExpr::Var { name, .. } => {
                let is_ptr = self
                    .opts
                    .thread_local_pointer
                    .as_deref()
                    .is_some_and(|p| p == name.name());
                let n = self.c_name(name);
                Ok((n, if is_ptr { "->" } else { "." }))
            }
            LExpr::Field { base, field, .. } => {
                let (b, sep) = self.lexpr_base(base)?;
                let f = self.c_name(field);
                Ok((format!("{b}{sep}{f}"), "."))
            }
            LExpr::Index { base, index, .. } => {
                let (b, _) = self.lexpr_base(base)?;
                let (i, ity) = self.expr(index)?;
                let i = self.index_expr(i, &ity);
                Ok((format!("{b}[{i}]"), "."))
            }
            other => Err(EmitError::unimplemented(
                other.loc(),
                format!("lvalue `{other}`"),
            )),
        }
    }

    fn lexpr_ty(&mut self, l: &LExpr) -> Result<CTy, EmitError> {
        match l {
            LExpr::Var { name, loc } => self
                .lookup_local(name.name())
                .or_else(|| self.globals.get(name.name()).cloned())
                .ok_or_else(|| {
                    EmitError::unimplemented(loc, format!("unknown lvalue `{name}`"))
                }),
            LExpr::Field { base, field, loc } => {
                let bty = self.lexpr_ty(base)?;
                match bty {
                    CTy::Record(r) => self
                        .records
                        .get(&r)
                        .and_then(|fs| {
                            fs.iter()
                                .find(|(n, _)| n.root_matches(field))
                                .map(|(_, t)| t.clone())
                        })
                        .ok_or_else(|| {
                            EmitError::unimplemented(loc, format!("field `{field}`"))
                        }),
                    _ => self
                        .globals
                        .get(field.name())
                        .cloned()
                        .ok_or_else(|| {
                            EmitError::unimplemented(loc, format!("field `{field}`"))
                        }),
                }
            }
            LExpr::Index { base, .. } => {
                let bty = self.lexpr_ty(base)?;
                match bty {
                    CTy::Array(elem, _) => Ok(*elem),
                    other => Ok(other),
                }
            }
            other => Err(EmitError::unimplemented(
                other.loc(),
                format!("lvalue `{other}`"),
            )),
        }
    }

    // ---- declarations and files ----

    fn fun_signature(&mut self, sig: &FunSig) -> Result<String, EmitError> {
        let (arg_tys, ret, _) = self
            .sigs
            .get(&sig.name)
            .cloned()
            .ok_or_else(|| EmitError::internal("uncollected signature"))?;
        let ret_s = self.cty_name(&ret)?;
        let name = self.c_name(&sig.name);
        let mut parts = Vec::with_capacity(sig.args.len());
        for (a, t) in sig.args.iter().zip(arg_tys.iter()) {
            let an = self.c_name(&a.name);
            parts.push(self.declare(t, &an)?);
        }
        let args = if parts.is_empty() {
            "void".to_string()
        } else {
            parts.join(", ")
        };
        Ok(format!("{ret_s} {name}({args})"))
    }

    fn emit_function(&mut self, sig: &FunSig, body: &[Stmt]) -> Result<String, EmitError> {
        let (arg_tys, ret, _) = self
            .sigs
            .get(&sig.name)
            .cloned()
            .ok_or_else(|| EmitError::internal("uncollected signature"))?;

        self.locals.clear();
        self.locals.push(HashMap::new());
        for (a, t) in sig.args.iter().zip(arg_tys.iter()) {
            self.bind_local(a.name.name(), t.clone());
        }
        self.current_ret = ret.clone();
        self.propagate_used = false;
        self.label_counter = 0;
        self.label_stack.clear();

        let mut body_out = String::new();
        self.line_directive(&mut body_out, &sig.loc);
        self.stmts(body, &mut body_out, "  ")?;

        let mut out = String::new();
        let head = self.fun_signature(sig)?;
        let _ = writeln!(out, "{head} {{");
        out.push_str(&body_out);
        if self.propagate_used {
            let _ = writeln!(out, "ASL_propagate: ;");
            match &ret {
                CTy::Unit => {
                    let _ = writeln!(out, "  return;");
                }
                other => {
                    let zero = self.zero_value(other)?;
                    let _ = writeln!(out, "  return {zero};");
                }
            }
        } else if !matches!(ret, CTy::Unit) {
            // Fall-off guard for functions whose control flow the C
            // compiler cannot see ends in return.
            let zero = self.zero_value(&ret)?;
            let _ = writeln!(out, "  return {zero};");
        }
        let _ = writeln!(out, "}}");
        self.locals.clear();
        Ok(out)
    }

    fn header_name(&self, part: &str) -> String {
        format!("{}_{part}.h", self.opts.basename)
    }

    fn emit_all(&mut self, decls: &Declarations) -> Result<Vec<EmittedFile>, EmitError> {
        let basename = self.opts.basename.clone();

        // Function bodies first: they decide which wide widths and
        // renamings the headers need.
        let mut funs: Vec<String> = Vec::new();
        let mut protos: Vec<String> = Vec::new();
        let mut ffi_wrappers: Vec<String> = Vec::new();
        for d in decls {
            match d {
                Decl::FunDefn { sig, body, .. } => {
                    funs.push(self.emit_function(sig, body)?);
                    let proto = self.fun_signature(sig)?;
                    protos.push(format!("{proto};"));
                    if self.opts.new_ffi && self.opts.exports.iter().any(|e| e == sig.name.name())
                    {
                        ffi_wrappers.push(self.emit_ffi_wrapper(sig)?);
                    }
                }
                Decl::FunType { sig, .. } => {
                    let proto = self.fun_signature(sig)?;
                    protos.push(format!("extern {proto};"));
                }
                _ => {}
            }
        }
        funs.extend(ffi_wrappers);

        let mut files = Vec::new();

        // ---- <base>_types.h ----
        let mut types_h = String::new();
        let guard = format!("ASL_{}_TYPES_H", basename.to_uppercase());
        let _ = writeln!(types_h, "#ifndef {guard}");
        let _ = writeln!(types_h, "#define {guard}");
        types_h.push('\n');
        types_h.push_str(&self.rt.file_header());
        types_h.push('\n');
        for w in self.wide_widths.clone() {
            types_h.push_str(&fallback_wide_helpers(w));
            types_h.push('\n');
        }
        for (name, members) in self.enums_in_order() {
            let n = self.c_name(&Ident::new(&name));
            let ms: Vec<String> = members.iter().map(|m| self.c_name(m)).collect();
            let _ = writeln!(
                types_h,
                "typedef enum {{ {} }} {n};",
                ms.join(", ")
            );
        }
        types_h.push('\n');
        // Declarations ordered so field types precede their uses.
        for name in self.sorted_records() {
            let fields = self.records.get(&name).cloned().unwrap_or_default();
            let n = self.c_name(&Ident::new(&name));
            let _ = writeln!(types_h, "typedef struct {n} {{");
            if fields.is_empty() {
                // C structs need at least one member.
                let _ = writeln!(types_h, "  int ASL_no_fields;");
            }
            for (fname, fty) in fields {
                let fname = self.c_name(&fname);
                let decl = self.declare(&fty, &fname)?;
                let _ = writeln!(types_h, "  {decl};");
            }
            let _ = writeln!(types_h, "}} {n};\n");
        }
        let _ = writeln!(types_h, "#endif");
        files.push(EmittedFile {
            name: self.header_name("types"),
            contents: types_h,
        });

        // ---- <base>_exceptions.h / .c ----
        let mut exc_h = String::new();
        let guard = format!("ASL_{}_EXCEPTIONS_H", basename.to_uppercase());
        let _ = writeln!(exc_h, "#ifndef {guard}");
        let _ = writeln!(exc_h, "#define {guard}");
        let _ = writeln!(exc_h, "#include \"{}\"", self.header_name("types"));
        exc_h.push('\n');
        let mut tags = vec!["ASL_no_exception".to_string()];
        for e in &self.exceptions.clone() {
            tags.push(format!("ASL_tag_{e}"));
        }
        let _ = writeln!(
            exc_h,
            "typedef enum {{ {} }} ASL_exception_tag_t;",
            tags.join(", ")
        );
        let _ = writeln!(exc_h, "typedef struct {{");
        let _ = writeln!(exc_h, "  ASL_exception_tag_t ASL_tag;");
        let _ = writeln!(exc_h, "  union {{");
        let _ = writeln!(exc_h, "    int ASL_no_payload;");
        for e in &self.exceptions.clone() {
            let n = self.c_name(&Ident::new(e));
            let _ = writeln!(exc_h, "    {n} {n};");
        }
        let _ = writeln!(exc_h, "  }} u;");
        let _ = writeln!(exc_h, "}} ASL_exception_t;");
        let _ = writeln!(exc_h, "extern ASL_exception_t ASL_exception;");
        let _ = writeln!(exc_h, "#endif");
        files.push(EmittedFile {
            name: self.header_name("exceptions"),
            contents: exc_h,
        });

        let mut exc_c = String::new();
        let _ = writeln!(exc_c, "#include \"{}\"", self.header_name("exceptions"));
        exc_c.push('\n');
        // The single process-wide exception slot.
        let _ = writeln!(exc_c, "ASL_exception_t ASL_exception;");
        files.push(EmittedFile {
            name: format!("{basename}_exceptions.c"),
            contents: exc_c,
        });

        // ---- <base>_vars.h / .c ----
        let mut vars_h = String::new();
        let guard = format!("ASL_{}_VARS_H", basename.to_uppercase());
        let _ = writeln!(vars_h, "#ifndef {guard}");
        let _ = writeln!(vars_h, "#define {guard}");
        let _ = writeln!(vars_h, "#include \"{}\"", self.header_name("exceptions"));
        vars_h.push('\n');
        let mut var_defs = Vec::new();
        for d in decls {
            match d {
                Decl::Var { name, ty, .. } | Decl::Config { name, ty, .. } => {
                    let cty = self.cty(ty)?;
                    let n = self.c_name(name);
                    let decl = self.declare(&cty, &n)?;
                    let _ = writeln!(vars_h, "extern {decl};");
                    let zero = self.zero_value(&cty)?;
                    var_defs.push(match &cty {
                        CTy::Array(..) => format!("{decl} = {{0}};"),
                        _ => format!("{decl} = {zero};"),
                    });
                }
                Decl::Const {
                    name,
                    ty: Some(ty),
                    value,
                    ..
                } => {
                    let cty = self.cty(ty)?;
                    let n = self.c_name(name);
                    let decl = self.declare(&cty, &n)?;
                    let (v, _) = self.expr(value)?;
                    let _ = writeln!(vars_h, "extern const {decl};");
                    var_defs.push(format!("const {decl} = {v};"));
                }
                _ => {}
            }
        }
        vars_h.push('\n');
        for p in &protos {
            let _ = writeln!(vars_h, "{p}");
        }
        let _ = writeln!(vars_h, "#endif");
        files.push(EmittedFile {
            name: self.header_name("vars"),
            contents: vars_h,
        });

        let mut vars_c = String::new();
        let _ = writeln!(vars_c, "#include \"{}\"", self.header_name("vars"));
        vars_c.push('\n');
        for def in var_defs {
            let _ = writeln!(vars_c, "{def}");
        }
        files.push(EmittedFile {
            name: format!("{basename}_vars.c"),
            contents: vars_c,
        });

        // ---- <base>_funs[_i].c ----
        let chunks = self.opts.num_c_files.max(1);
        let per_chunk = funs.len().div_ceil(chunks.max(1)).max(1);
        for (i, chunk) in funs.chunks(per_chunk).enumerate() {
            let name = if chunks == 1 {
                format!("{basename}_funs.c")
            } else {
                format!("{basename}_funs_{i}.c")
            };
            let mut out = String::new();
            let _ = writeln!(out, "#include \"{}\"", self.header_name("vars"));
            out.push('\n');
            for f in chunk {
                out.push_str(f);
                out.push('\n');
            }
            files.push(EmittedFile {
                name,
                contents: out,
            });
        }
        // An empty program still produces one funs file.
        if funs.is_empty() {
            files.push(EmittedFile {
                name: format!("{basename}_funs.c"),
                contents: format!("#include \"{}\"\n", self.header_name("vars")),
            });
        }

        Ok(files)
    }

    fn emit_ffi_wrapper(&mut self, sig: &FunSig) -> Result<String, EmitError> {
        let (arg_tys, ret, _) = self
            .sigs
            .get(&sig.name)
            .cloned()
            .ok_or_else(|| EmitError::internal("uncollected signature"))?;
        let mut params = Vec::new();
        let mut args = Vec::new();
        for (a, t) in sig.args.iter().zip(arg_tys.iter()) {
            let w = match t {
                CTy::Bits(w) => *w,
                CTy::SInt(w) => *w,
                CTy::Int => 64,
                CTy::Bool => 1,
                other => {
                    return Err(EmitError::unimplemented(
                        &sig.loc,
                        format!("FFI argument of type {other:?}"),
                    ))
                }
            };
            let cty = self.rt.ffi_c_type(w)?;
            let an = format!("ffi_{}", self.c_name(&a.name));
            args.push(self.rt.ffi_from_c(w, &an)?);
            params.push(format!("{cty} {an}"));
        }
        let inner = self.c_name(&sig.name);
        let call = format!("{inner}({})", args.join(", "));
        let name = sig.name.name();
        Ok(match &ret {
            CTy::Unit => format!(
                "void {name}({}) {{\n  {call};\n}}\n",
                params.join(", ")
            ),
            other => {
                let w = match other {
                    CTy::Bits(w) => *w,
                    CTy::SInt(w) => *w,
                    _ => 64,
                };
                let cty = self.rt.ffi_c_type(w)?;
                let conv = self.rt.ffi_to_c(w, &call)?;
                format!(
                    "{cty} {name}({}) {{\n  return {conv};\n}}\n",
                    params.join(", ")
                )
            }
        })
    }

    fn enums_in_order(&self) -> Vec<(String, Vec<Ident>)> {
        let mut out: Vec<(String, Vec<Ident>)> = self
            .enums
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        out.sort_by(|a, b| a.0.cmp(&b.0));
        out
    }

    /// Record declaration order with a topological adjustment so field
    /// types precede their uses.
    fn sorted_records(&self) -> Vec<String> {
        let mut placed: Vec<String> = Vec::new();
        let mut done: HashSet<String> = HashSet::new();
        let order = self.record_order.clone();

        fn place(
            name: &str,
            records: &HashMap<String, Vec<(Ident, CTy)>>,
            placed: &mut Vec<String>,
            done: &mut HashSet<String>,
            visiting: &mut HashSet<String>,
        ) {
            if done.contains(name) || !visiting.insert(name.to_string()) {
                return;
            }
            if let Some(fields) = records.get(name) {
                for (_, ty) in fields {
                    let mut t = ty;
                    while let CTy::Array(elem, _) = t {
                        t = elem;
                    }
                    if let CTy::Record(dep) = t {
                        place(dep, records, placed, done, visiting);
                    }
                }
            }
            visiting.remove(name);
            done.insert(name.to_string());
            placed.push(name.to_string());
        }

        let mut visiting = HashSet::new();
        for name in order {
            place(
                &name,
                &self.records,
                &mut placed,
                &mut done,
                &mut visiting,
            );
        }
        placed
    }
}
