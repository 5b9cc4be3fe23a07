#![forbid(unsafe_code)]

//! Integer bounding: every declared `integer {…}` whose constraint set
//! has constant bounds is represented by the smallest two's-complement
//! `__sint(N)` that holds it, including the sign bit. Declarations,
//! parameters, record fields, and return types are rewritten; width
//! mismatches at calls and assignments become `resize_sintN` coercions,
//! and conversions to and from unbounded integer use `cvt_int_sintN` /
//! `cvt_sintN_int`. Runs last because it changes function types.

use std::collections::HashMap;

use asl_ast::fold::fold_expr;
use asl_ast::{
    CaseAlt, CatchArm, Constraint, Decl, Declarations, Expr, Ident, Loc, SizedInt, Slice, Stmt,
    Throws, Ty, Value,
};
use num_bigint::BigInt;

use crate::env::{GlobalEnv, TypeDef};
use crate::error::TypeError;
use crate::xform::Transform;

pub struct BoundedInts {
    _private: (),
}

impl BoundedInts {
    pub fn new() -> Self {
        Self { _private: () }
    }
}

impl Default for BoundedInts {
    fn default() -> Self {
        Self::new()
    }
}

fn const_bounds(cs: &[Constraint]) -> Option<(BigInt, BigInt)> {
    let mut lo: Option<BigInt> = None;
    let mut hi: Option<BigInt> = None;
    for c in cs {
        let (a, b) = match c {
            Constraint::Single(e) => match fold_expr(e) {
                Some(Value::Int(v)) => (v.clone(), v),
                _ => return None,
            },
            Constraint::Range(l, h) => match (fold_expr(l), fold_expr(h)) {
                (Some(Value::Int(l)), Some(Value::Int(h))) => (l, h),
                _ => return None,
            },
        };
        lo = Some(lo.map_or(a.clone(), |cur: BigInt| cur.min(a)));
        hi = Some(hi.map_or(b.clone(), |cur: BigInt| cur.max(b)));
    }
    Some((lo?, hi?))
}

/// The `__sint(N)` representation of a constrained integer type, when
/// its bounds are constant.
fn sized_rep(ty: &Ty) -> Option<usize> {
    match ty {
        Ty::Integer {
            constraints: Some(cs),
            ..
        } => {
            let (lo, hi) = const_bounds(cs)?;
            Some(SizedInt::width_for_range(&lo, &hi))
        }
        _ => None,
    }
}

fn sint_ty(width: usize, loc: &Loc) -> Ty {
    Ty::Named {
        name: Ident::new("__sint"),
        args: vec![Expr::lit_int(width as i64, loc.clone())],
        loc: loc.clone(),
    }
}

fn sint_width_of_ty(ty: &Ty) -> Option<usize> {
    match ty {
        Ty::Named { name, args, .. } if name.name() == "__sint" => match args.as_slice() {
            [w] => match fold_expr(w) {
                Some(Value::Int(v)) => usize::try_from(v).ok(),
                _ => None,
            },
            _ => None,
        },
        _ => None,
    }
}

fn rewrite_ty(ty: Ty) -> Ty {
    match sized_rep(&ty) {
        Some(w) => sint_ty(w, ty.loc()),
        None => ty,
    }
}

fn apply1(name: &str, params: Vec<Expr>, args: Vec<Expr>, loc: Loc) -> Expr {
    Expr::Apply {
        name: Ident::new(name),
        params,
        args,
        throws: Throws::No,
        loc,
    }
}

/// Per-function signature facts used to coerce call sites.
#[derive(Clone, Default)]
struct FnInfo {
    arg_widths: Vec<Option<usize>>,
    ret_width: Option<usize>,
}

struct Lowerer {
    fns: HashMap<Ident, FnInfo>,
    globals: HashMap<String, usize>,
    record_fields: HashMap<(String, String), usize>,
    vars: HashMap<String, usize>,
    var_records: HashMap<String, String>,
    ret_width: Option<usize>,
}

const INT_ARITH: &[(&str, &str)] = &[
    ("add_int", "add_sintN"),
    ("sub_int", "sub_sintN"),
    ("mul_int", "mul_sintN"),
    ("zdiv_int", "zdiv_sintN"),
    ("zrem_int", "zrem_sintN"),
    ("fdiv_int", "fdiv_sintN"),
    ("frem_int", "frem_sintN"),
    ("exact_div_int", "exact_div_sintN"),
    ("align_int", "align_sintN"),
    ("mod_pow2_int", "mod_pow2_sintN"),
    ("shl_int", "shl_sintN"),
    ("shr_int", "shr_sintN"),
];

const INT_CMP: &[(&str, &str)] = &[
    ("eq_int", "eq_sintN"),
    ("ne_int", "ne_sintN"),
    ("lt_int", "lt_sintN"),
    ("le_int", "le_sintN"),
    ("gt_int", "gt_sintN"),
    ("ge_int", "ge_sintN"),
];

impl Lowerer {
    /// Coerce to a specific bounded width.
    fn to_width(&self, e: Expr, from: Option<usize>, to: usize) -> Expr {
        let loc = e.loc().clone();
        match from {
            Some(w) if w == to => e,
            Some(w) => apply1(
                "resize_sintN",
                vec![
                    Expr::lit_int(w as i64, loc.clone()),
                    Expr::lit_int(to as i64, loc.clone()),
                ],
                vec![e],
                loc,
            ),
            None => apply1(
                "cvt_int_sintN",
                vec![Expr::lit_int(to as i64, loc.clone())],
                vec![e, Expr::lit_int(to as i64, loc.clone())],
                loc,
            ),
        }
    }

    /// Coerce back to unbounded integer.
    fn to_int(&self, e: Expr, from: Option<usize>) -> Expr {
        match from {
            Some(w) => {
                let loc = e.loc().clone();
                apply1(
                    "cvt_sintN_int",
                    vec![Expr::lit_int(w as i64, loc.clone())],
                    vec![e],
                    loc,
                )
            }
            None => e,
        }
    }

    fn coerce(&self, e: Expr, from: Option<usize>, target: Option<usize>) -> Expr {
        match target {
            Some(w) => self.to_width(e, from, w),
            None => self.to_int(e, from),
        }
    }

    fn expr(&mut self, e: Expr) -> (Expr, Option<usize>) {
        match e {
            Expr::Lit {
                value: Value::SizedInt(ref s),
                ..
            } => {
                let w = s.width;
                (e, Some(w))
            }
            Expr::Lit { .. } => (e, None),
            Expr::Var { ref name, .. } => {
                let w = self
                    .vars
                    .get(name.name())
                    .or_else(|| self.globals.get(name.name()))
                    .copied();
                (e, w)
            }
            Expr::Field { base, field, loc } => {
                let record = match &*base {
                    Expr::Var { name, .. } => self.var_records.get(name.name()).cloned(),
                    _ => None,
                };
                let (base, _) = self.expr(*base);
                let w = record.and_then(|r| {
                    self.record_fields
                        .get(&(r, field.name().to_string()))
                        .copied()
                });
                (
                    Expr::Field {
                        base: Box::new(base),
                        field,
                        loc,
                    },
                    w,
                )
            }
            Expr::Index { base, index, loc } => {
                let (base, _) = self.expr(*base);
                let (index, iw) = self.expr(*index);
                let index = self.to_int(index, iw);
                (
                    Expr::Index {
                        base: Box::new(base),
                        index: Box::new(index),
                        loc,
                    },
                    None,
                )
            }
            Expr::Slices { base, slices, loc } => {
                let (base, _) = self.expr(*base);
                let slices = slices
                    .into_iter()
                    .map(|s| match s {
                        Slice::LowWidth(lo, w) => {
                            let (lo, lw) = self.expr(lo);
                            let lo = self.to_int(lo, lw);
                            let (w, ww) = self.expr(w);
                            let w = self.to_int(w, ww);
                            Slice::LowWidth(lo, w)
                        }
                        other => other,
                    })
                    .collect();
                (
                    Expr::Slices {
                        base: Box::new(base),
                        slices,
                        loc,
                    },
                    None,
                )
            }
            Expr::Record {
                name,
                args,
                fields,
                loc,
            } => {
                let record = name.name().to_string();
                let fields = fields
                    .into_iter()
                    .map(|(f, e)| {
                        let (e, w) = self.expr(e);
                        let target = self
                            .record_fields
                            .get(&(record.clone(), f.name().to_string()))
                            .copied();
                        let e = match target {
                            Some(t) => self.to_width(e, w, t),
                            None => self.to_int(e, w),
                        };
                        (f, e)
                    })
                    .collect();
                (
                    Expr::Record {
                        name,
                        args,
                        fields,
                        loc,
                    },
                    None,
                )
            }
            Expr::If { arms, els, loc } => {
                let mut arms2 = Vec::with_capacity(arms.len());
                let mut widths = Vec::new();
                for (c, v) in arms {
                    let (c, cw) = self.expr(c);
                    let c = self.to_int(c, cw);
                    let (v, w) = self.expr(v);
                    widths.push(w);
                    arms2.push((c, v));
                }
                let (els, ew) = self.expr(*els);
                widths.push(ew);
                let common = widths
                    .iter()
                    .try_fold(None::<usize>, |acc, w| match (acc, w) {
                        (None, Some(w)) => Ok(Some(*w)),
                        (Some(a), Some(w)) if a == *w => Ok(Some(a)),
                        (acc, None) => Ok(acc),
                        _ => Err(()),
                    });
                match common {
                    Ok(Some(w)) if widths.iter().all(|x| x.is_some()) => (
                        Expr::If {
                            arms: arms2,
                            els: Box::new(els),
                            loc,
                        },
                        Some(w),
                    ),
                    _ => {
                        // Mixed representations: normalise every arm to
                        // unbounded integer.
                        let arms2 = arms2
                            .into_iter()
                            .zip(widths.clone())
                            .map(|((c, v), w)| (c, self.to_int(v, w)))
                            .collect();
                        let els = self.to_int(els, *widths.last().expect("nonempty"));
                        (
                            Expr::If {
                                arms: arms2,
                                els: Box::new(els),
                                loc,
                            },
                            None,
                        )
                    }
                }
            }
            Expr::Apply {
                name,
                params,
                args,
                throws,
                loc,
            } => self.apply(name, params, args, throws, loc),
            Expr::Binop { op, lhs, rhs, loc } => {
                let (lhs, lw) = self.expr(*lhs);
                let (rhs, rw) = self.expr(*rhs);
                (
                    Expr::Binop {
                        op,
                        lhs: Box::new(self.to_int(lhs, lw)),
                        rhs: Box::new(self.to_int(rhs, rw)),
                        loc,
                    },
                    None,
                )
            }
            Expr::Unop { op, operand, loc } => {
                let (operand, w) = self.expr(*operand);
                (
                    Expr::Unop {
                        op,
                        operand: Box::new(self.to_int(operand, w)),
                        loc,
                    },
                    None,
                )
            }
            Expr::Concat { widths, elems, loc } => {
                let elems = elems
                    .into_iter()
                    .map(|e| {
                        let (e, w) = self.expr(e);
                        self.to_int(e, w)
                    })
                    .collect();
                (
                    Expr::Concat { widths, elems, loc },
                    None,
                )
            }
            Expr::AsConstraint { expr, .. } | Expr::AsType { expr, .. } => self.expr(*expr),
            other => (other, None),
        }
    }

    fn apply(
        &mut self,
        name: Ident,
        params: Vec<Expr>,
        args: Vec<Expr>,
        throws: Throws,
        loc: Loc,
    ) -> (Expr, Option<usize>) {
        let rewritten: Vec<(Expr, Option<usize>)> =
            args.into_iter().map(|a| self.expr(a)).collect();

        // Calls to rewritten user functions coerce per formal width.
        if let Some(info) = self.fns.get(&name).cloned() {
            let args = rewritten
                .into_iter()
                .zip(info.arg_widths.iter().copied())
                .map(|((e, w), target)| self.coerce(e, w, target))
                .collect();
            return (
                Expr::Apply {
                    name,
                    params,
                    args,
                    throws,
                    loc,
                },
                info.ret_width,
            );
        }

        // Integer arithmetic on equal bounded widths is emitted directly
        // as the sized primitive.
        let base = name.name();
        if let Some((_, sized)) = INT_ARITH.iter().find(|(i, _)| *i == base) {
            if let Some(w) = common_width(&rewritten) {
                let args = rewritten
                    .into_iter()
                    .map(|(e, from)| self.to_width(e, from, w))
                    .collect();
                return (
                    Expr::Apply {
                        name: Ident::new(sized),
                        params: vec![Expr::lit_int(w as i64, loc.clone())],
                        args,
                        throws,
                        loc,
                    },
                    Some(w),
                );
            }
        }
        if let Some((_, sized)) = INT_CMP.iter().find(|(i, _)| *i == base) {
            if let Some(w) = common_width(&rewritten) {
                let args = rewritten
                    .into_iter()
                    .map(|(e, from)| self.to_width(e, from, w))
                    .collect();
                return (
                    Expr::Apply {
                        name: Ident::new(sized),
                        params: vec![Expr::lit_int(w as i64, loc.clone())],
                        args,
                        throws,
                        loc,
                    },
                    None,
                );
            }
        }
        if base == "neg_int" {
            if let [(e, Some(w))] = rewritten.as_slice() {
                let w = *w;
                let e = e.clone();
                return (
                    Expr::Apply {
                        name: Ident::new("neg_sintN"),
                        params: vec![Expr::lit_int(w as i64, loc.clone())],
                        args: vec![e],
                        throws,
                        loc,
                    },
                    Some(w),
                );
            }
        }
        if base == "print_int_dec" || base == "print_int_hex" {
            if let [(e, Some(w))] = rewritten.as_slice() {
                let sized = if base == "print_int_dec" {
                    "print_sintN_dec"
                } else {
                    "print_sintN_hex"
                };
                return (
                    Expr::Apply {
                        name: Ident::new(sized),
                        params: vec![Expr::lit_int(*w as i64, loc.clone())],
                        args: vec![e.clone()],
                        throws,
                        loc,
                    },
                    None,
                );
            }
        }

        // Anything else takes unbounded integers.
        let args = rewritten
            .into_iter()
            .map(|(e, w)| self.to_int(e, w))
            .collect();
        (
            Expr::Apply {
                name,
                params,
                args,
                throws,
                loc,
            },
            None,
        )
    }

    fn stmts(&mut self, stmts: Vec<Stmt>) -> Vec<Stmt> {
        stmts.into_iter().map(|s| self.stmt(s)).collect()
    }

    fn stmt(&mut self, s: Stmt) -> Stmt {
        match s {
            Stmt::VarDecl {
                constant,
                ty,
                target,
                init,
                loc,
            } => {
                let ty = ty.map(rewrite_ty);
                let (init, iw) = self.expr(init);
                let sized = ty.as_ref().and_then(sint_width_of_ty);
                let record = match &ty {
                    Some(Ty::Named { name, .. }) if sized.is_none() => {
                        Some(name.name().to_string())
                    }
                    _ => None,
                };
                let init = match (&target, sized) {
                    (asl_ast::DeclTarget::Single(name), Some(w)) => {
                        self.vars.insert(name.name().to_string(), w);
                        self.to_width(init, iw, w)
                    }
                    (asl_ast::DeclTarget::Single(name), None) => {
                        if let Some(r) = record {
                            self.var_records.insert(name.name().to_string(), r);
                        }
                        self.to_int(init, iw)
                    }
                    _ => self.to_int(init, iw),
                };
                Stmt::VarDecl {
                    constant,
                    ty,
                    target,
                    init,
                    loc,
                }
            }
            Stmt::VarDeclsNoInit { ty, names, loc } => {
                let ty = rewrite_ty(ty);
                if let Some(w) = sint_width_of_ty(&ty) {
                    for n in &names {
                        self.vars.insert(n.name().to_string(), w);
                    }
                }
                Stmt::VarDeclsNoInit { ty, names, loc }
            }
            Stmt::Assign { lhs, rhs, loc } => {
                let (rhs, rw) = self.expr(rhs);
                let target = match &lhs {
                    asl_ast::LExpr::Var { name, .. } => self
                        .vars
                        .get(name.name())
                        .or_else(|| self.globals.get(name.name()))
                        .copied(),
                    _ => None,
                };
                let rhs = self.coerce(rhs, rw, target);
                Stmt::Assign { lhs, rhs, loc }
            }
            Stmt::Apply {
                name,
                params,
                args,
                throws,
                loc,
            } => {
                let (call, _) = self.apply(name, params, args, throws, loc.clone());
                match call {
                    Expr::Apply {
                        name,
                        params,
                        args,
                        throws,
                        ..
                    } => Stmt::Apply {
                        name,
                        params,
                        args,
                        throws,
                        loc,
                    },
                    _ => unreachable!("apply rewrites to apply"),
                }
            }
            Stmt::Return { value, loc } => {
                let value = value.map(|e| {
                    let (e, w) = self.expr(e);
                    self.coerce(e, w, self.ret_width)
                });
                Stmt::Return { value, loc }
            }
            Stmt::Assert { cond, loc } => {
                let (cond, w) = self.expr(cond);
                Stmt::Assert {
                    cond: self.to_int(cond, w),
                    loc,
                }
            }
            Stmt::Throw { exn, loc } => {
                let (exn, _) = self.expr(exn);
                Stmt::Throw { exn, loc }
            }
            Stmt::Try {
                body,
                bind,
                arms,
                default,
                loc,
            } => Stmt::Try {
                body: self.stmts(body),
                bind,
                arms: arms
                    .into_iter()
                    .map(|a| CatchArm {
                        exn: a.exn,
                        body: self.stmts(a.body),
                        loc: a.loc,
                    })
                    .collect(),
                default: default.map(|d| self.stmts(d)),
                loc,
            },
            Stmt::If { arms, els, loc } => Stmt::If {
                arms: arms
                    .into_iter()
                    .map(|(c, body)| {
                        let (c, cw) = self.expr(c);
                        (self.to_int(c, cw), self.stmts(body))
                    })
                    .collect(),
                els: self.stmts(els),
                loc,
            },
            Stmt::Case {
                expr,
                alts,
                default,
                loc,
            } => {
                let (expr, w) = self.expr(expr);
                Stmt::Case {
                    expr: self.to_int(expr, w),
                    alts: alts
                        .into_iter()
                        .map(|a| CaseAlt {
                            patterns: a.patterns,
                            guard: a.guard.map(|g| {
                                let (g, gw) = self.expr(g);
                                self.to_int(g, gw)
                            }),
                            body: self.stmts(a.body),
                            loc: a.loc,
                        })
                        .collect(),
                    default: default.map(|d| self.stmts(d)),
                    loc,
                }
            }
            Stmt::For {
                var,
                from,
                dir,
                to,
                body,
                loc,
            } => {
                let (from, fw) = self.expr(from);
                let (to, tw) = self.expr(to);
                Stmt::For {
                    var,
                    from: self.to_int(from, fw),
                    dir,
                    to: self.to_int(to, tw),
                    body: self.stmts(body),
                    loc,
                }
            }
            Stmt::While { cond, body, loc } => {
                let (cond, w) = self.expr(cond);
                Stmt::While {
                    cond: self.to_int(cond, w),
                    body: self.stmts(body),
                    loc,
                }
            }
            Stmt::Repeat { body, until, loc } => {
                let body = self.stmts(body);
                let (until, w) = self.expr(until);
                Stmt::Repeat {
                    body,
                    until: self.to_int(until, w),
                    loc,
                }
            }
            Stmt::Call { .. } => unreachable!("calls are resolved to Stmt::Apply before bounding"),
        }
    }
}

fn common_width(args: &[(Expr, Option<usize>)]) -> Option<usize> {
    let mut widths = args.iter().filter_map(|(_, w)| *w);
    let first = widths.next()?;
    // All bounded operands agree (or can be resized up to) the widest.
    let max = args
        .iter()
        .filter_map(|(_, w)| *w)
        .max()
        .unwrap_or(first);
    // Every operand must be bounded for the sized primitive to apply.
    if args.iter().all(|(_, w)| w.is_some()) {
        Some(max)
    } else {
        None
    }
}

impl Transform for BoundedInts {
    fn name(&self) -> &'static str {
        "xform_bounded"
    }

    fn apply(
        &mut self,
        decls: Declarations,
        env: &mut GlobalEnv,
    ) -> Result<Declarations, TypeError> {
        let mut fns: HashMap<Ident, FnInfo> = HashMap::new();
        let mut globals: HashMap<String, usize> = HashMap::new();
        let mut record_fields: HashMap<(String, String), usize> = HashMap::new();

        // First sweep: rewrite the shapes and collect the width facts.
        let mut shaped = Vec::with_capacity(decls.len());
        for d in decls {
            match d {
                Decl::Record {
                    name,
                    params,
                    fields,
                    loc,
                } => {
                    let fields: Vec<asl_ast::Field> = fields
                        .into_iter()
                        .map(|f| {
                            if let Some(w) = sized_rep(&f.ty) {
                                record_fields.insert(
                                    (name.name().to_string(), f.name.name().to_string()),
                                    w,
                                );
                                asl_ast::Field {
                                    ty: sint_ty(w, f.ty.loc()),
                                    name: f.name,
                                }
                            } else {
                                f
                            }
                        })
                        .collect();
                    env.types.insert(
                        name.name().to_string(),
                        TypeDef::Record {
                            params: params.clone(),
                            fields: fields.clone(),
                        },
                    );
                    shaped.push(Decl::Record {
                        name,
                        params,
                        fields,
                        loc,
                    });
                }
                Decl::Var { name, ty, loc } => {
                    let ty = rewrite_ty(ty);
                    if let Some(w) = sint_width_of_ty(&ty) {
                        globals.insert(name.name().to_string(), w);
                    }
                    shaped.push(Decl::Var { name, ty, loc });
                }
                Decl::FunDefn { mut sig, body, loc } => {
                    let mut info = FnInfo::default();
                    sig.args = sig
                        .args
                        .into_iter()
                        .map(|a| {
                            let ty = rewrite_ty(a.ty);
                            info.arg_widths.push(sint_width_of_ty(&ty));
                            asl_ast::FunArg {
                                name: a.name,
                                ty,
                                default: a.default,
                            }
                        })
                        .collect();
                    sig.rty = sig.rty.map(rewrite_ty);
                    info.ret_width = sig.rty.as_ref().and_then(sint_width_of_ty);
                    fns.insert(sig.name.clone(), info);
                    shaped.push(Decl::FunDefn { sig, body, loc });
                }
                Decl::FunType { mut sig, loc } => {
                    let mut info = FnInfo::default();
                    sig.args = sig
                        .args
                        .into_iter()
                        .map(|a| {
                            let ty = rewrite_ty(a.ty);
                            info.arg_widths.push(sint_width_of_ty(&ty));
                            asl_ast::FunArg {
                                name: a.name,
                                ty,
                                default: a.default,
                            }
                        })
                        .collect();
                    sig.rty = sig.rty.map(rewrite_ty);
                    info.ret_width = sig.rty.as_ref().and_then(sint_width_of_ty);
                    fns.insert(sig.name.clone(), info);
                    shaped.push(Decl::FunType { sig, loc });
                }
                other => shaped.push(other),
            }
        }

        // Second sweep: rewrite bodies with the collected facts.
        let mut out = Vec::with_capacity(shaped.len());
        for d in shaped {
            match d {
                Decl::FunDefn { sig, body, loc } => {
                    let mut lower = Lowerer {
                        fns: fns.clone(),
                        globals: globals.clone(),
                        record_fields: record_fields.clone(),
                        vars: HashMap::new(),
                        var_records: HashMap::new(),
                        ret_width: fns.get(&sig.name).and_then(|i| i.ret_width),
                    };
                    for (a, w) in sig.args.iter().zip(
                        fns.get(&sig.name)
                            .map(|i| i.arg_widths.clone())
                            .unwrap_or_default(),
                    ) {
                        if let Some(w) = w {
                            lower.vars.insert(a.name.name().to_string(), w);
                        }
                    }
                    let body = lower.stmts(body);
                    out.push(Decl::FunDefn { sig, body, loc });
                }
                other => out.push(other),
            }
        }

        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use asl_ast::Loc;

    fn constrained(lo: i64, hi: i64) -> Ty {
        Ty::Integer {
            constraints: Some(vec![Constraint::Range(
                Expr::lit_int(lo, Loc::Unknown),
                Expr::lit_int(hi, Loc::Unknown),
            )]),
            loc: Loc::Unknown,
        }
    }

    #[test]
    fn representation_includes_sign_bit() {
        assert_eq!(sized_rep(&constrained(0, 255)), Some(9));
        assert_eq!(sized_rep(&constrained(-128, 127)), Some(8));
        assert_eq!(sized_rep(&constrained(0, 1)), Some(2));
        assert_eq!(
            sized_rep(&Ty::unconstrained_integer(Loc::Unknown)),
            None
        );
    }

    #[test]
    fn resize_only_when_widths_differ() {
        let lower = Lowerer {
            fns: HashMap::new(),
            globals: HashMap::new(),
            record_fields: HashMap::new(),
            vars: HashMap::new(),
            var_records: HashMap::new(),
            ret_width: None,
        };
        let e = Expr::var("x", Loc::Unknown);
        let same = lower.to_width(e.clone(), Some(8), 8);
        assert_eq!(same, e);
        let widened = lower.to_width(e.clone(), Some(8), 16);
        match widened {
            Expr::Apply { name, .. } => assert_eq!(name.name(), "resize_sintN"),
            other => panic!("expected resize, got {other:?}"),
        }
        let converted = lower.to_width(e, None, 16);
        match converted {
            Expr::Apply { name, .. } => assert_eq!(name.name(), "cvt_int_sintN"),
            other => panic!("expected cvt, got {other:?}"),
        }
    }
}
