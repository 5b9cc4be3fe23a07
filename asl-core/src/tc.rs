#![forbid(unsafe_code)]

//! The typechecker: bidirectional inference over the parsed AST,
//! overload/operator/accessor resolution with parameter synthesis, and
//! insertion of runtime checks for obligations that cannot be proven
//! under the current scope assumptions.

use std::collections::{HashMap, HashSet};

use asl_ast::fold::{fold_expr, simplify};
use asl_ast::subst::{subst_expr, subst_ty};
use asl_ast::{
    ArrayIndex, Binop, CaseAlt, CatchArm, Change, Constraint, Decl, DeclTarget, Declarations,
    Direction, Expr, Field, FunKind, FunSig, Ident, LExpr, Loc, NameSupply, Pattern, Slice, Stmt,
    Throws, Ty, Unop, Value,
};
use asl_smt::{new_prover, Prover};
use num_bigint::BigInt;

use crate::env::{GlobalEnv, Scopes, TypeDef, VarInfo, GETTER_SUFFIX, SETTER_SUFFIX};
use crate::error::TypeError;

/// The builtin prelude, loaded before user declarations.
pub const PRELUDE: &str = include_str!("prelude.asl");

#[derive(Clone, Debug)]
pub struct CheckOptions {
    /// Insert assert statements for unprovable obligations.
    pub runtime_checks: bool,
    /// Require provable constraint membership instead of accepting
    /// unconstrained integers silently.
    pub constraint_checks: bool,
    /// Stop recovering after this many diagnostics.
    pub max_errors: usize,
    pub smt_timeout_ms: Option<u32>,
}

impl Default for CheckOptions {
    fn default() -> Self {
        Self {
            runtime_checks: true,
            constraint_checks: true,
            max_errors: 10,
            smt_timeout_ms: Some(5_000),
        }
    }
}

pub struct Checker {
    pub env: GlobalEnv,
    scopes: Scopes,
    prover: Box<dyn Prover>,
    assumptions: Vec<Expr>,
    supply: NameSupply,
    opts: CheckOptions,
    rty: Option<Ty>,
    pending: Vec<Stmt>,
    in_function: bool,
}

fn unit_ty(loc: Loc) -> Ty {
    Ty::Tuple {
        elems: Vec::new(),
        loc,
    }
}

fn boolean_ty(loc: Loc) -> Ty {
    Ty::named("boolean", loc)
}

fn lit_big(v: BigInt, loc: Loc) -> Expr {
    Expr::Lit {
        value: Value::Int(v),
        loc,
    }
}

fn mk_binop(op: Binop, lhs: Expr, rhs: Expr, loc: Loc) -> Expr {
    Expr::Binop {
        op,
        lhs: Box::new(lhs),
        rhs: Box::new(rhs),
        loc,
    }
}

/// Safe to evaluate twice and in any order: no calls, no accessor reads.
fn is_pure(e: &Expr) -> bool {
    match e {
        Expr::Lit { .. } | Expr::Var { .. } => true,
        Expr::Unop { operand, .. } => is_pure(operand),
        Expr::Binop { lhs, rhs, .. } => is_pure(lhs) && is_pure(rhs),
        Expr::AsConstraint { expr, .. } | Expr::AsType { expr, .. } => is_pure(expr),
        Expr::Field { base, .. } => is_pure(base),
        Expr::Tuple { elems, .. } => elems.iter().all(is_pure),
        _ => false,
    }
}

impl Checker {
    pub fn new(opts: CheckOptions) -> Self {
        let mut prover = new_prover();
        if let Some(ms) = opts.smt_timeout_ms {
            prover.set_timeout_ms(ms);
        }
        Self {
            env: GlobalEnv::new(),
            scopes: Scopes::new(),
            prover,
            assumptions: Vec::new(),
            supply: NameSupply::new("__t"),
            opts,
            rty: None,
            pending: Vec::new(),
            in_function: false,
        }
    }

    /// A checker with the builtin prelude already loaded.
    pub fn with_prelude(opts: CheckOptions) -> miette::Result<(Self, Declarations)> {
        let mut checker = Self::new(opts);
        let decls = asl_parse::parse_source(PRELUDE, "prelude.asl")?;
        let checked = checker.check_declarations(decls).map_err(|errs| {
            miette::miette!("prelude failed to typecheck: {:?}", errs.first())
        })?;
        Ok((checker, checked))
    }

    // ---- entry point ----

    pub fn check_declarations(
        &mut self,
        decls: Declarations,
    ) -> Result<Declarations, Vec<TypeError>> {
        let mut errors = Vec::new();
        let mut registered = Vec::with_capacity(decls.len());

        // Types, signatures, and operators first so bodies can call
        // forward.
        for mut d in decls {
            match self.register_declaration(&mut d) {
                Ok(()) => registered.push(Some(d)),
                Err(e) => {
                    errors.push(e);
                    registered.push(None);
                    if errors.len() >= self.opts.max_errors {
                        return Err(errors);
                    }
                }
            }
        }

        if let Err(e) = self.check_accessor_pairing() {
            errors.push(e);
        }

        // Globals and bodies in declaration order.
        let mut out = Vec::new();
        for d in registered.into_iter().flatten() {
            match self.check_declaration(d) {
                Ok(d) => out.push(d),
                Err(e) => {
                    errors.push(e);
                    if errors.len() >= self.opts.max_errors {
                        return Err(errors);
                    }
                }
            }
        }

        if errors.is_empty() {
            Ok(out)
        } else {
            Err(errors)
        }
    }

    // ---- registration ----

    fn check_duplicate_global(&self, name: &Ident, loc: &Loc) -> Result<(), TypeError> {
        if self.env.types.contains_key(name.name())
            || self.env.globals.contains_key(name.name())
            || self.env.enum_members.contains_key(name.name())
        {
            return Err(TypeError::type_error(
                loc,
                format!("`{name}` conflicts with an existing global definition"),
            ));
        }
        Ok(())
    }

    fn register_declaration(&mut self, d: &mut Decl) -> Result<(), TypeError> {
        match d {
            Decl::BuiltinType { name, loc } => {
                self.check_duplicate_global(name, loc)?;
                self.env
                    .types
                    .insert(name.name().to_string(), TypeDef::Builtin);
            }
            Decl::Forward { name, .. } => {
                self.env
                    .types
                    .entry(name.name().to_string())
                    .or_insert(TypeDef::Forward);
            }
            Decl::Record {
                name,
                params,
                fields,
                loc,
            } => {
                match self.env.types.get(name.name()) {
                    None | Some(TypeDef::Forward) => {}
                    Some(_) => return self.check_duplicate_global(name, loc),
                }
                self.env.types.insert(
                    name.name().to_string(),
                    TypeDef::Record {
                        params: params.clone(),
                        fields: fields.clone(),
                    },
                );
            }
            Decl::Exception { name, fields, loc } => {
                self.check_duplicate_global(name, loc)?;
                self.env.types.insert(
                    name.name().to_string(),
                    TypeDef::Exception {
                        fields: fields.clone(),
                    },
                );
                self.env.exceptions.push(name.clone());
            }
            Decl::TypeAlias {
                name, params, ty, loc, ..
            } => {
                self.check_duplicate_global(name, loc)?;
                self.env.types.insert(
                    name.name().to_string(),
                    TypeDef::Alias {
                        params: params.clone(),
                        ty: ty.clone(),
                    },
                );
            }
            Decl::Enum { name, members, loc } => {
                self.check_duplicate_global(name, loc)?;
                for m in members.iter() {
                    if self.env.enum_members.contains_key(m.name()) {
                        return Err(TypeError::type_error(
                            loc,
                            format!("enumeration member `{m}` is already defined"),
                        ));
                    }
                }
                self.env.types.insert(
                    name.name().to_string(),
                    TypeDef::Enum {
                        members: members.clone(),
                    },
                );
                for m in members.iter() {
                    self.env
                        .enum_members
                        .insert(m.name().to_string(), name.clone());
                }
                // Every enumeration gets an equality/inequality pair in
                // the operator table.
                let loc2 = loc.clone();
                for (base, op) in [("eq_enum", Binop::Eq), ("ne_enum", Binop::Ne)] {
                    let sig = FunSig {
                        name: Ident::new(base),
                        kind: FunKind::Function,
                        params: Vec::new(),
                        args: vec![
                            Field {
                                name: Ident::new("x"),
                                ty: Ty::Named {
                                    name: name.clone(),
                                    args: Vec::new(),
                                    loc: loc2.clone(),
                                },
                            },
                            Field {
                                name: Ident::new("y"),
                                ty: Ty::Named {
                                    name: name.clone(),
                                    args: Vec::new(),
                                    loc: loc2.clone(),
                                },
                            },
                        ]
                        .into_iter()
                        .map(|f| asl_ast::FunArg {
                            name: f.name,
                            ty: f.ty,
                            default: None,
                        })
                        .collect(),
                        rty: Some(boolean_ty(loc2.clone())),
                        throws: Throws::No,
                        loc: loc2.clone(),
                    };
                    self.env.add_fun(sig);
                    let table = self.env.operators2.entry(op).or_default();
                    if !table.iter().any(|i| i.name() == base) {
                        table.push(Ident::new(base));
                    }
                }
            }
            Decl::BuiltinFun { sig, .. } | Decl::FunType { sig, .. } => {
                self.register_signature(sig)?;
            }
            Decl::FunDefn { sig, .. } => {
                self.register_signature(sig)?;
            }
            Decl::Operator1 { op, funs, .. } => {
                let table = self.env.operators1.entry(*op).or_default();
                for f in funs.iter() {
                    if !table.iter().any(|i| i.name() == f.name()) {
                        table.push(f.clone());
                    }
                }
            }
            Decl::Operator2 { op, funs, .. } => {
                let table = self.env.operators2.entry(*op).or_default();
                for f in funs.iter() {
                    if !table.iter().any(|i| i.name() == f.name()) {
                        table.push(f.clone());
                    }
                }
            }
            // Globals are registered when checked, in declaration order.
            Decl::Const { .. } | Decl::Config { .. } | Decl::Var { .. } => {}
        }
        Ok(())
    }

    /// Apply accessor suffixes, assign a disambiguation tag, and register
    /// the candidate. A definition matching an earlier prototype reuses
    /// the prototype's tag.
    fn register_signature(&mut self, sig: &mut FunSig) -> Result<(), TypeError> {
        match sig.kind {
            FunKind::Getter => sig.name = sig.name.with_suffix(GETTER_SUFFIX),
            FunKind::Setter => sig.name = sig.name.with_suffix(SETTER_SUFFIX),
            FunKind::Function => {}
        }
        if let Some(existing) = self
            .env
            .candidates(sig.name.name())
            .iter()
            .find(|c| sigs_equivalent(c, sig))
        {
            sig.name = existing.name.clone();
            return Ok(());
        }
        sig.name = self.env.add_fun(sig.clone());
        Ok(())
    }

    fn check_accessor_pairing(&self) -> Result<(), TypeError> {
        for (name, cands) in &self.env.funs {
            if let Some(base) = name.strip_suffix(GETTER_SUFFIX) {
                let setter = format!("{base}{SETTER_SUFFIX}");
                if self.env.funs.get(&setter).is_none() {
                    let loc = cands[0].loc.clone();
                    return Err(TypeError::type_error(
                        &loc,
                        format!("getter `{base}` has no matching setter"),
                    ));
                }
            }
            if let Some(base) = name.strip_suffix(SETTER_SUFFIX) {
                let getter = format!("{base}{GETTER_SUFFIX}");
                if self.env.funs.get(&getter).is_none() {
                    let loc = cands[0].loc.clone();
                    return Err(TypeError::type_error(
                        &loc,
                        format!("setter `{base}` has no matching getter"),
                    ));
                }
            }
        }
        Ok(())
    }

    // ---- declaration bodies ----

    fn check_declaration(&mut self, d: Decl) -> Result<Decl, TypeError> {
        match d {
            Decl::Const {
                name,
                ty,
                value,
                loc,
            } => {
                self.check_duplicate_global(&name, &loc)?;
                let (value, vty) = match ty {
                    Some(t) => {
                        let t = self.resolve_ty(t)?;
                        let v = self.check_expr(&t, value)?;
                        (v, t)
                    }
                    None => self.tc_expr(value)?,
                };
                let folded = simplify(value);
                self.env.globals.insert(
                    name.name().to_string(),
                    VarInfo {
                        name: name.clone(),
                        loc: loc.clone(),
                        ty: vty.clone(),
                        is_local: false,
                        is_constant: true,
                    },
                );
                self.env
                    .consts
                    .insert(name.name().to_string(), folded.clone());
                self.assumptions.push(mk_binop(
                    Binop::Eq,
                    Expr::Var {
                        name: name.clone(),
                        loc: loc.clone(),
                    },
                    folded.clone(),
                    loc.clone(),
                ));
                Ok(Decl::Const {
                    name,
                    ty: Some(vty),
                    value: folded,
                    loc,
                })
            }
            Decl::Config {
                name,
                ty,
                value,
                loc,
            } => {
                self.check_duplicate_global(&name, &loc)?;
                let ty = self.resolve_ty(ty)?;
                let value = self.check_expr(&ty, value)?;
                self.env.globals.insert(
                    name.name().to_string(),
                    VarInfo {
                        name: name.clone(),
                        loc: loc.clone(),
                        ty: ty.clone(),
                        is_local: false,
                        is_constant: true,
                    },
                );
                Ok(Decl::Config {
                    name,
                    ty,
                    value,
                    loc,
                })
            }
            Decl::Var { name, ty, loc } => {
                self.check_duplicate_global(&name, &loc)?;
                let ty = self.resolve_ty(ty)?;
                self.env.globals.insert(
                    name.name().to_string(),
                    VarInfo {
                        name: name.clone(),
                        loc: loc.clone(),
                        ty: ty.clone(),
                        is_local: false,
                        is_constant: false,
                    },
                );
                Ok(Decl::Var { name, ty, loc })
            }
            Decl::FunDefn { sig, body, loc } => {
                let body = self.check_function(&sig, body)?;
                Ok(Decl::FunDefn { sig, body, loc })
            }
            other => Ok(other),
        }
    }

    fn check_function(&mut self, sig: &FunSig, body: Vec<Stmt>) -> Result<Vec<Stmt>, TypeError> {
        self.supply.reset();
        self.scopes.push();
        let marker = self.assumptions.len();
        self.in_function = true;

        let param_names: HashSet<String> = sig
            .params
            .iter()
            .map(|p| p.name.name().to_string())
            .collect();

        for p in &sig.params {
            let ty = match &p.ty {
                Some(t) => self.resolve_ty(t.clone())?,
                None => Ty::unconstrained_integer(sig.loc.clone()),
            };
            self.declare(VarInfo {
                name: p.name.clone(),
                loc: sig.loc.clone(),
                ty,
                is_local: true,
                is_constant: true,
            })?;
        }

        for a in &sig.args {
            if param_names.contains(a.name.name()) {
                continue;
            }
            let ty = self.resolve_ty(a.ty.clone())?;
            self.push_constraint_assumptions(&a.name, &ty);
            self.declare(VarInfo {
                name: a.name.clone(),
                loc: sig.loc.clone(),
                ty,
                is_local: true,
                is_constant: true,
            })?;
        }

        let rty = match &sig.rty {
            Some(t) => Some(self.resolve_ty(t.clone())?),
            None => None,
        };
        self.rty = rty;

        let result = self.tc_stmts(body);

        self.in_function = false;
        self.rty = None;
        self.assumptions.truncate(marker);
        self.scopes.pop();
        result
    }

    fn declare(&mut self, info: VarInfo) -> Result<(), TypeError> {
        let loc = info.loc.clone();
        let name = info.name.clone();
        self.scopes.declare(info).map_err(|existing| {
            TypeError::type_error(
                &loc,
                format!(
                    "`{name}` is already defined in this scope (at {})",
                    existing.loc
                ),
            )
        })
    }

    /// Bounds of a declared constrained type become entailment
    /// assumptions about the variable.
    fn push_constraint_assumptions(&mut self, name: &Ident, ty: &Ty) {
        if let Ty::Integer {
            constraints: Some(cs),
            loc,
        } = ty
        {
            let var = Expr::Var {
                name: name.clone(),
                loc: loc.clone(),
            };
            if let [only] = cs.as_slice() {
                match only {
                    Constraint::Single(e) if is_pure(e) => {
                        self.assumptions
                            .push(mk_binop(Binop::Eq, var, e.clone(), loc.clone()));
                    }
                    Constraint::Range(lo, hi) if is_pure(lo) && is_pure(hi) => {
                        self.assumptions.push(mk_binop(
                            Binop::Le,
                            lo.clone(),
                            var.clone(),
                            loc.clone(),
                        ));
                        self.assumptions
                            .push(mk_binop(Binop::Le, var, hi.clone(), loc.clone()));
                    }
                    _ => {}
                }
            }
        }
    }

    // ---- types ----

    pub fn resolve_ty(&mut self, ty: Ty) -> Result<Ty, TypeError> {
        match ty {
            Ty::Named { name, args, loc } => match self.env.types.get(name.name()) {
                Some(TypeDef::Alias { params, ty }) => {
                    if params.len() != args.len() {
                        return Err(TypeError::mismatch(
                            &loc,
                            format!("type `{name}` arguments"),
                            format!("{}", params.len()),
                            format!("{}", args.len()),
                        ));
                    }
                    let map: HashMap<String, Expr> = params
                        .iter()
                        .map(|p| p.name().to_string())
                        .zip(args.iter().cloned())
                        .collect();
                    let expanded = subst_ty(&map, ty.clone());
                    self.resolve_ty(expanded)
                }
                Some(_) => Ok(Ty::Named { name, args, loc }),
                None => Err(TypeError::unknown(&loc, "type", name.name())),
            },
            Ty::OfExpr { expr, .. } => {
                let (_, t) = self.tc_expr(*expr)?;
                Ok(t)
            }
            Ty::Array {
                index,
                element,
                loc,
            } => {
                let element = Box::new(self.resolve_ty(*element)?);
                let index = match index {
                    ArrayIndex::Size(e) => match &*e {
                        Expr::Var { name, .. } if self.env.is_enum_type(name.name()) => {
                            ArrayIndex::Enum(name.clone())
                        }
                        _ => ArrayIndex::Size(e),
                    },
                    other => other,
                };
                Ok(Ty::Array {
                    index,
                    element,
                    loc,
                })
            }
            Ty::Tuple { elems, loc } => Ok(Ty::Tuple {
                elems: elems
                    .into_iter()
                    .map(|t| self.resolve_ty(t))
                    .collect::<Result<_, _>>()?,
                loc,
            }),
            other => Ok(other),
        }
    }

    fn proves(&mut self, goal: &Expr) -> bool {
        self.prover.implies(&self.assumptions, goal)
    }

    fn widths_equal(&mut self, a: &Expr, b: &Expr, loc: &Loc) -> bool {
        let goal = mk_binop(Binop::Eq, a.clone(), b.clone(), loc.clone());
        self.proves(&goal)
    }

    /// Subtype satisfaction: structural equality with provable equality
    /// of width/index expressions and constraint-subset on integers.
    pub fn satisfies(&mut self, actual: &Ty, expected: &Ty) -> bool {
        match (actual, expected) {
            (Ty::Integer { .. }, Ty::Integer {
                constraints: None, ..
            }) => true,
            (
                Ty::Integer {
                    constraints: Some(ca),
                    ..
                },
                Ty::Integer {
                    constraints: Some(ce),
                    loc,
                },
            ) => {
                if !self.opts.constraint_checks {
                    return true;
                }
                ca.iter().all(|c| self.constraint_in_set(c, ce, loc))
            }
            (
                Ty::Integer {
                    constraints: None, ..
                },
                Ty::Integer {
                    constraints: Some(_),
                    ..
                },
            ) => !self.opts.constraint_checks,
            (Ty::Bits { width: wa, .. }, Ty::Bits { width: we, loc, .. }) => {
                self.widths_equal(wa, we, loc)
            }
            (
                Ty::Named {
                    name: na, args: aa, ..
                },
                Ty::Named {
                    name: ne,
                    args: ae,
                    loc,
                },
            ) => {
                na.root_matches(ne)
                    && aa.len() == ae.len()
                    && aa
                        .iter()
                        .zip(ae.iter())
                        .all(|(a, e)| self.widths_equal(a, e, loc))
            }
            (
                Ty::Array {
                    index: ia,
                    element: ea,
                    ..
                },
                Ty::Array {
                    index: ie,
                    element: ee,
                    loc,
                },
            ) => {
                let index_ok = match (ia, ie) {
                    (ArrayIndex::Enum(a), ArrayIndex::Enum(b)) => a.root_matches(b),
                    (ArrayIndex::Size(a), ArrayIndex::Size(b)) => self.widths_equal(a, b, loc),
                    _ => false,
                };
                index_ok && self.satisfies(ea, ee)
            }
            (Ty::Tuple { elems: ta, .. }, Ty::Tuple { elems: te, .. }) => {
                ta.len() == te.len()
                    && ta
                        .iter()
                        .zip(te.iter())
                        .all(|(a, e)| self.satisfies(a, e))
            }
            _ => false,
        }
    }

    fn constraint_in_set(&mut self, c: &Constraint, set: &[Constraint], loc: &Loc) -> bool {
        set.iter().any(|target| {
            let goal = match (c, target) {
                (Constraint::Single(a), Constraint::Single(b)) => {
                    mk_binop(Binop::Eq, a.clone(), b.clone(), loc.clone())
                }
                (Constraint::Single(a), Constraint::Range(lo, hi)) => mk_binop(
                    Binop::BoolAnd,
                    mk_binop(Binop::Le, lo.clone(), a.clone(), loc.clone()),
                    mk_binop(Binop::Le, a.clone(), hi.clone(), loc.clone()),
                    loc.clone(),
                ),
                (Constraint::Range(lo, hi), Constraint::Range(lo2, hi2)) => mk_binop(
                    Binop::BoolAnd,
                    mk_binop(Binop::Le, lo2.clone(), lo.clone(), loc.clone()),
                    mk_binop(Binop::Le, hi.clone(), hi2.clone(), loc.clone()),
                    loc.clone(),
                ),
                (Constraint::Range(..), Constraint::Single(_)) => return false,
            };
            self.proves(&goal)
        })
    }

    // ---- runtime checks ----

    /// Bind an expression to a fresh immutable temporary when it is not
    /// safe to replicate, so a runtime check can mention it.
    fn bind_temp(&mut self, e: Expr, ty: &Ty) -> Expr {
        if is_pure(&e) || !self.in_function {
            return e;
        }
        let loc = e.loc().clone();
        let name = self.supply.fresh();
        self.pending.push(Stmt::VarDecl {
            constant: true,
            ty: Some(ty.clone()),
            target: DeclTarget::Single(name.clone()),
            init: e,
            loc: loc.clone(),
        });
        let _ = self.scopes.declare(VarInfo {
            name: name.clone(),
            loc: loc.clone(),
            ty: ty.clone(),
            is_local: true,
            is_constant: true,
        });
        Expr::Var { name, loc }
    }

    /// Insert an assert for an obligation unless it is provable.
    fn runtime_check(&mut self, cond: Expr, loc: &Loc) {
        if !self.opts.runtime_checks || !self.in_function {
            return;
        }
        if self.proves(&cond) {
            return;
        }
        self.pending.push(Stmt::Assert {
            cond: cond.clone(),
            loc: loc.clone(),
        });
        self.assumptions.push(cond);
    }

    fn drain_pending(&mut self) -> Vec<Stmt> {
        std::mem::take(&mut self.pending)
    }

    // ---- expressions ----

    pub fn tc_expr(&mut self, e: Expr) -> Result<(Expr, Ty), TypeError> {
        match e {
            Expr::Lit { value, loc } => {
                let ty = self.lit_ty(&value, &loc)?;
                Ok((Expr::Lit { value, loc }, ty))
            }
            Expr::Var { name, loc } => self.tc_var(name, loc),
            Expr::Field { base, field, loc } => {
                let (base, bty) = self.tc_expr(*base)?;
                // Register fields become canonical slices right here; the
                // later passes only ever see slice operations.
                if let Ty::Bits { fields, .. } = &bty {
                    if let Some(rf) = fields.iter().find(|rf| rf.name.root_matches(&field)) {
                        let slices = rf.slices.clone();
                        return self.tc_slices_typed(base, bty.clone(), slices, loc);
                    }
                }
                let ty = self.field_ty(&bty, &field, &loc)?;
                Ok((
                    Expr::Field {
                        base: Box::new(base),
                        field,
                        loc,
                    },
                    ty,
                ))
            }
            Expr::Fields { base, fields, loc } => {
                let (base, bty) = self.tc_expr(*base)?;
                let mut total: Option<Expr> = None;
                for f in &fields {
                    let fty = self.field_ty(&bty, f, &loc)?;
                    let w = match fty {
                        Ty::Bits { width, .. } => *width,
                        other => {
                            return Err(TypeError::mismatch(
                                &loc,
                                format!("field `{f}` in multi-field selection"),
                                "bits(-)",
                                format!("{other}"),
                            ))
                        }
                    };
                    total = Some(match total {
                        None => w,
                        Some(acc) => mk_binop(Binop::Plus, acc, w, loc.clone()),
                    });
                }
                let width = total.ok_or_else(|| {
                    TypeError::type_error(&loc, "empty multi-field selection")
                })?;
                let ty = Ty::bits(simplify(width), loc.clone());
                Ok((
                    Expr::Fields {
                        base: Box::new(base),
                        fields,
                        loc,
                    },
                    ty,
                ))
            }
            Expr::Slices { base, slices, loc } => self.tc_slices(*base, slices, loc),
            Expr::Index { base, index, loc } => {
                // Already resolved (transform output being re-checked).
                let (base, bty) = self.tc_expr(*base)?;
                let (index, _) = self.tc_expr(*index)?;
                let ety = match &bty {
                    Ty::Array { element, .. } => (**element).clone(),
                    other => {
                        return Err(TypeError::IsNotA {
                            name: format!("{base}"),
                            expected: "array",
                            span: other.loc().span(),
                        })
                    }
                };
                Ok((
                    Expr::Index {
                        base: Box::new(base),
                        index: Box::new(index),
                        loc,
                    },
                    ety,
                ))
            }
            Expr::Record {
                name,
                args,
                fields,
                loc,
            } => self.tc_record(name, args, fields, loc),
            Expr::WithChanges { base, changes, loc } => {
                let (base, bty) = self.tc_expr(*base)?;
                self.canonicalize_with_changes(base, bty, changes, loc)
            }
            Expr::If { arms, els, loc } => {
                let mut checked = Vec::with_capacity(arms.len());
                let mut arm_tys = Vec::new();
                for (cond, value) in arms {
                    let cond = self.check_expr(&boolean_ty(loc.clone()), cond)?;
                    let marker = self.assumptions.len();
                    if is_pure(&cond) {
                        self.assumptions.push(cond.clone());
                    }
                    let (value, vty) = self.tc_expr(value)?;
                    self.assumptions.truncate(marker);
                    arm_tys.push(vty);
                    checked.push((cond, value));
                }
                let (els, ety) = self.tc_expr(*els)?;
                let mut ty = ety;
                for t in arm_tys {
                    ty = self.join_types(t, ty, &loc)?;
                }
                Ok((
                    Expr::If {
                        arms: checked,
                        els: Box::new(els),
                        loc,
                    },
                    ty,
                ))
            }
            Expr::Let {
                name,
                ty,
                value,
                body,
                loc,
            } => {
                let ty2 = self.resolve_ty(*ty)?;
                let value = self.check_expr(&ty2, *value)?;
                self.scopes.push();
                self.declare(VarInfo {
                    name: name.clone(),
                    loc: loc.clone(),
                    ty: ty2.clone(),
                    is_local: true,
                    is_constant: true,
                })?;
                let result = self.tc_expr(*body);
                self.scopes.pop();
                let (body, bty) = result?;
                Ok((
                    Expr::Let {
                        name,
                        ty: Box::new(ty2),
                        value: Box::new(value),
                        body: Box::new(body),
                        loc,
                    },
                    bty,
                ))
            }
            Expr::Assert { cond, body, loc } => {
                let cond = self.check_expr(&boolean_ty(loc.clone()), *cond)?;
                let (body, bty) = self.tc_expr(*body)?;
                Ok((
                    Expr::Assert {
                        cond: Box::new(cond),
                        body: Box::new(body),
                        loc,
                    },
                    bty,
                ))
            }
            Expr::Call {
                name,
                args,
                throws,
                loc,
            } => {
                let args = self.tc_call_args(args, &loc)?;
                self.resolve_call(&name, args, throws, loc)
            }
            Expr::Apply {
                name,
                params,
                args,
                throws,
                loc,
            } => {
                // Re-checking transform output: trust the resolved tag.
                let sig = self
                    .env
                    .fun_by_ident(&name)
                    .cloned()
                    .ok_or_else(|| TypeError::unknown(&loc, "function", name.name()))?;
                let rty = self.apply_rty(&sig, &params, &loc)?;
                Ok((
                    Expr::Apply {
                        name,
                        params,
                        args,
                        throws,
                        loc,
                    },
                    rty,
                ))
            }
            Expr::Tuple { elems, loc } => {
                let mut out = Vec::with_capacity(elems.len());
                let mut tys = Vec::with_capacity(elems.len());
                for e in elems {
                    let (e, t) = self.tc_expr(e)?;
                    out.push(e);
                    tys.push(t);
                }
                Ok((
                    Expr::Tuple {
                        elems: out,
                        loc: loc.clone(),
                    },
                    Ty::Tuple { elems: tys, loc },
                ))
            }
            Expr::Concat { elems, loc, .. } => {
                let mut out = Vec::with_capacity(elems.len());
                let mut widths = Vec::with_capacity(elems.len());
                let mut total: Option<Expr> = None;
                for e in elems {
                    let (e, t) = self.tc_expr(e)?;
                    let w = match t {
                        Ty::Bits { width, .. } => *width,
                        other => {
                            return Err(TypeError::mismatch(
                                &loc,
                                "concatenation element",
                                "bits(-)",
                                format!("{other}"),
                            ))
                        }
                    };
                    total = Some(match total {
                        None => w.clone(),
                        Some(acc) => mk_binop(Binop::Plus, acc, w.clone(), loc.clone()),
                    });
                    widths.push(w);
                    out.push(e);
                }
                let width = total.ok_or_else(|| {
                    TypeError::type_error(&loc, "empty bitvector concatenation")
                })?;
                let ty = Ty::bits(simplify(width), loc.clone());
                Ok((
                    Expr::Concat {
                        widths,
                        elems: out,
                        loc,
                    },
                    ty,
                ))
            }
            Expr::Unop { op, operand, loc } => self.tc_unop(op, *operand, loc),
            Expr::Binop { op, lhs, rhs, loc } => self.tc_binop(op, *lhs, *rhs, loc),
            Expr::AsConstraint {
                expr,
                constraints,
                loc,
            } => {
                let (expr, ety) = self.tc_expr(*expr)?;
                if !matches!(ety, Ty::Integer { .. }) {
                    return Err(TypeError::mismatch(
                        &loc,
                        "constrained cast operand",
                        "integer",
                        format!("{ety}"),
                    ));
                }
                let ty = Ty::Integer {
                    constraints: Some(constraints.clone()),
                    loc: loc.clone(),
                };
                let bound = self.bind_temp(expr, &ety);
                let cond = self.membership_cond(&bound, &constraints, &loc);
                self.runtime_check(cond, &loc);
                Ok((
                    Expr::AsConstraint {
                        expr: Box::new(bound),
                        constraints,
                        loc,
                    },
                    ty,
                ))
            }
            Expr::AsType { expr, ty, loc } => {
                let target = self.resolve_ty(*ty)?;
                let (expr, ety) = self.tc_expr(*expr)?;
                let expr = if self.satisfies(&ety, &target) {
                    expr
                } else {
                    match (&ety, &target) {
                        (Ty::Integer { .. }, Ty::Integer {
                            constraints: Some(cs),
                            ..
                        }) => {
                            let bound = self.bind_temp(expr, &ety);
                            let cond = self.membership_cond(&bound, cs, &loc);
                            self.runtime_check(cond, &loc);
                            bound
                        }
                        _ => {
                            return Err(TypeError::mismatch(
                                &loc,
                                "cast",
                                format!("{target}"),
                                format!("{ety}"),
                            ))
                        }
                    }
                };
                Ok((
                    Expr::AsType {
                        expr: Box::new(expr),
                        ty: Box::new(target.clone()),
                        loc,
                    },
                    target,
                ))
            }
            Expr::ArrayInit { elems, loc } => {
                // Only transforms create these; keep the element type.
                let mut out = Vec::with_capacity(elems.len());
                let mut ety = None;
                for e in elems {
                    let (e, t) = self.tc_expr(e)?;
                    ety.get_or_insert(t);
                    out.push(e);
                }
                let element = ety.ok_or_else(|| {
                    TypeError::type_error(&loc, "empty array initialiser")
                })?;
                let len = out.len() as i64;
                Ok((
                    Expr::ArrayInit {
                        elems: out,
                        loc: loc.clone(),
                    },
                    Ty::Array {
                        index: ArrayIndex::Size(Box::new(Expr::lit_int(len, loc.clone()))),
                        element: Box::new(element),
                        loc,
                    },
                ))
            }
            Expr::Unknown { ty, loc } => {
                let ty = self.resolve_ty(*ty)?;
                Ok((
                    Expr::Unknown {
                        ty: Box::new(ty.clone()),
                        loc,
                    },
                    ty,
                ))
            }
            Expr::In { expr, pattern, loc } => {
                let (expr, ety) = self.tc_expr(*expr)?;
                let pattern = self.tc_pattern(*pattern, &ety)?;
                Ok((
                    Expr::In {
                        expr: Box::new(expr),
                        pattern: Box::new(pattern),
                        loc: loc.clone(),
                    },
                    boolean_ty(loc),
                ))
            }
        }
    }

    fn lit_ty(&mut self, v: &Value, loc: &Loc) -> Result<Ty, TypeError> {
        Ok(match v {
            Value::Int(n) => Ty::Integer {
                constraints: Some(vec![Constraint::Single(lit_big(n.clone(), loc.clone()))]),
                loc: loc.clone(),
            },
            Value::SizedInt(s) => Ty::Named {
                name: Ident::new("__sint"),
                args: vec![Expr::lit_int(s.width as i64, loc.clone())],
                loc: loc.clone(),
            },
            Value::Bits(b) => Ty::bits(Expr::lit_int(b.width as i64, loc.clone()), loc.clone()),
            Value::Mask(m) => Ty::Named {
                name: Ident::new("__mask"),
                args: vec![Expr::lit_int(m.width as i64, loc.clone())],
                loc: loc.clone(),
            },
            Value::Bool(_) => boolean_ty(loc.clone()),
            Value::String(_) => Ty::named("string", loc.clone()),
            Value::Real(_) => {
                return Err(TypeError::unimplemented(loc, "real-valued arithmetic"))
            }
            other => {
                return Err(TypeError::internal(
                    loc,
                    format!("literal of runtime-only value {other}"),
                ))
            }
        })
    }

    fn tc_var(&mut self, name: Ident, loc: Loc) -> Result<(Expr, Ty), TypeError> {
        if let Some(info) = self.scopes.lookup(name.name()) {
            let ty = info.ty.clone();
            return Ok((Expr::Var { name, loc }, ty));
        }
        if let Some(info) = self.env.globals.get(name.name()) {
            let ty = info.ty.clone();
            return Ok((Expr::Var { name, loc }, ty));
        }
        if let Some(enum_ty) = self.env.enum_members.get(name.name()) {
            let ty = Ty::Named {
                name: enum_ty.clone(),
                args: Vec::new(),
                loc: loc.clone(),
            };
            return Ok((Expr::Var { name, loc }, ty));
        }
        // A bare name can be a parameterless getter.
        let getter = name.with_suffix(GETTER_SUFFIX);
        if !self.env.candidates(getter.name()).is_empty() {
            return self.resolve_call(&getter, Vec::new(), Throws::No, loc);
        }
        Err(TypeError::unknown(&loc, "variable", name.name()))
    }

    fn field_ty(&mut self, bty: &Ty, field: &Ident, loc: &Loc) -> Result<Ty, TypeError> {
        match bty {
            Ty::Named { name, args, .. } => {
                let (params, fields) = self
                    .env
                    .record_def(name.name())
                    .map(|(p, f)| (p.to_vec(), f.to_vec()))
                    .or_else(|| {
                        self.env
                            .exception_fields(name.name())
                            .map(|f| (Vec::new(), f.to_vec()))
                    })
                    .ok_or_else(|| TypeError::IsNotA {
                        name: format!("{name}"),
                        expected: "record",
                        span: loc.span(),
                    })?;
                let f = fields
                    .iter()
                    .find(|f| f.name.root_matches(field))
                    .ok_or_else(|| TypeError::unknown(loc, "field", field.name()))?;
                let map: HashMap<String, Expr> = params
                    .iter()
                    .map(|p| p.name().to_string())
                    .zip(args.iter().cloned())
                    .collect();
                self.resolve_ty(subst_ty(&map, f.ty.clone()))
            }
            Ty::Bits { width: _, fields, .. } => {
                let rf = fields
                    .iter()
                    .find(|rf| rf.name.root_matches(field))
                    .ok_or_else(|| TypeError::unknown(loc, "register field", field.name()))?;
                let mut total = BigInt::from(0);
                for s in &rf.slices {
                    total += self
                        .slice_width_const(s)
                        .ok_or_else(|| {
                            TypeError::type_error(loc, "register field slices must be constant")
                        })?;
                }
                Ok(Ty::bits(lit_big(total, loc.clone()), loc.clone()))
            }
            other => Err(TypeError::IsNotA {
                name: format!("{other}"),
                expected: "record",
                span: loc.span(),
            }),
        }
    }

    fn slice_width_const(&self, s: &Slice) -> Option<BigInt> {
        let (_, w) = slice_low_width(s)?;
        match fold_expr(&w) {
            Some(Value::Int(v)) => Some(v),
            _ => None,
        }
    }

    fn tc_slices(
        &mut self,
        base: Expr,
        slices: Vec<Slice>,
        loc: Loc,
    ) -> Result<(Expr, Ty), TypeError> {
        let (base, bty) = self.tc_expr(base)?;
        self.tc_slices_typed(base, bty, slices, loc)
    }

    fn tc_slices_typed(
        &mut self,
        base: Expr,
        bty: Ty,
        slices: Vec<Slice>,
        loc: Loc,
    ) -> Result<(Expr, Ty), TypeError> {
        // `a[i]` on an array is a subscript, not a bitslice.
        if let Ty::Array { index, element, .. } = &bty {
            if let [Slice::Single(i)] = slices.as_slice() {
                let (i, _ity) = self.tc_expr(i.clone())?;
                let i = self.bind_temp(i, &Ty::unconstrained_integer(loc.clone()));
                if let ArrayIndex::Size(size) = index {
                    let zero = Expr::lit_int(0, loc.clone());
                    let cond = mk_binop(
                        Binop::BoolAnd,
                        mk_binop(Binop::Le, zero, i.clone(), loc.clone()),
                        mk_binop(Binop::Lt, i.clone(), (**size).clone(), loc.clone()),
                        loc.clone(),
                    );
                    self.runtime_check(cond, &loc);
                }
                let ety = (**element).clone();
                return Ok((
                    Expr::Index {
                        base: Box::new(base),
                        index: Box::new(i),
                        loc,
                    },
                    ety,
                ));
            }
        }

        let base_width = match &bty {
            Ty::Bits { width, .. } => Some((**width).clone()),
            Ty::Integer { .. } => None,
            other => {
                return Err(TypeError::mismatch(
                    &loc,
                    "slice base",
                    "bits(-) or integer",
                    format!("{other}"),
                ))
            }
        };

        let mut checked = Vec::with_capacity(slices.len());
        let mut total: Option<Expr> = None;
        for s in slices {
            let (s, width) = self.tc_slice(s, &base_width, &loc)?;
            total = Some(match total {
                None => width,
                Some(acc) => mk_binop(Binop::Plus, acc, width, loc.clone()),
            });
            checked.push(s);
        }
        let width = total.ok_or_else(|| TypeError::type_error(&loc, "empty slice list"))?;
        let ty = Ty::bits(simplify(width), loc.clone());
        Ok((
            Expr::Slices {
                base: Box::new(base),
                slices: checked,
                loc,
            },
            ty,
        ))
    }

    /// Typecheck one slice, returning it with its width expression. Also
    /// inserts the bounds runtime check against the base width.
    fn tc_slice(
        &mut self,
        s: Slice,
        base_width: &Option<Expr>,
        loc: &Loc,
    ) -> Result<(Slice, Expr), TypeError> {
        let int = Ty::unconstrained_integer(loc.clone());
        let (s, lo, width) = match s {
            Slice::Single(i) => {
                let (i, _) = self.tc_expr(i)?;
                let i = self.bind_temp(i, &int);
                let w = Expr::lit_int(1, loc.clone());
                (Slice::Single(i.clone()), i, w)
            }
            Slice::HighLow(hi, lo) => {
                let (hi, _) = self.tc_expr(hi)?;
                let (lo, _) = self.tc_expr(lo)?;
                let hi = self.bind_temp(hi, &int);
                let lo = self.bind_temp(lo, &int);
                let w = simplify(mk_binop(
                    Binop::Plus,
                    mk_binop(Binop::Minus, hi.clone(), lo.clone(), loc.clone()),
                    Expr::lit_int(1, loc.clone()),
                    loc.clone(),
                ));
                (Slice::HighLow(hi, lo.clone()), lo, w)
            }
            Slice::LowWidth(lo, w) => {
                let (lo, _) = self.tc_expr(lo)?;
                let (w, _) = self.tc_expr(w)?;
                let lo = self.bind_temp(lo, &int);
                let w = self.bind_temp(w, &int);
                (Slice::LowWidth(lo.clone(), w.clone()), lo, w)
            }
            Slice::HighWidth(hi, w) => {
                let (hi, _) = self.tc_expr(hi)?;
                let (w, _) = self.tc_expr(w)?;
                let hi = self.bind_temp(hi, &int);
                let w = self.bind_temp(w, &int);
                let lo = simplify(mk_binop(
                    Binop::Plus,
                    mk_binop(Binop::Minus, hi.clone(), w.clone(), loc.clone()),
                    Expr::lit_int(1, loc.clone()),
                    loc.clone(),
                ));
                (Slice::HighWidth(hi, w.clone()), lo, w)
            }
            Slice::Element(i, w) => {
                let (i, _) = self.tc_expr(i)?;
                let (w, _) = self.tc_expr(w)?;
                let i = self.bind_temp(i, &int);
                let w = self.bind_temp(w, &int);
                let lo = simplify(mk_binop(Binop::Mul, i.clone(), w.clone(), loc.clone()));
                (Slice::Element(i, w.clone()), lo, w)
            }
        };

        let zero = Expr::lit_int(0, loc.clone());
        let mut cond = mk_binop(
            Binop::BoolAnd,
            mk_binop(Binop::Le, zero.clone(), lo.clone(), loc.clone()),
            mk_binop(Binop::Le, zero, width.clone(), loc.clone()),
            loc.clone(),
        );
        if let Some(bw) = base_width {
            cond = mk_binop(
                Binop::BoolAnd,
                cond,
                mk_binop(
                    Binop::Le,
                    mk_binop(Binop::Plus, lo, width.clone(), loc.clone()),
                    bw.clone(),
                    loc.clone(),
                ),
                loc.clone(),
            );
        }
        self.runtime_check(cond, loc);

        Ok((s, width))
    }

    fn tc_record(
        &mut self,
        name: Ident,
        args: Vec<Expr>,
        fields: Vec<(Ident, Expr)>,
        loc: Loc,
    ) -> Result<(Expr, Ty), TypeError> {
        let (params, decl_fields) = self
            .env
            .record_def(name.name())
            .map(|(p, f)| (p.to_vec(), f.to_vec()))
            .or_else(|| {
                self.env
                    .exception_fields(name.name())
                    .map(|f| (Vec::new(), f.to_vec()))
            })
            .ok_or_else(|| TypeError::IsNotA {
                name: name.name().to_string(),
                expected: "record",
                span: loc.span(),
            })?;

        if params.len() != args.len() {
            return Err(TypeError::mismatch(
                &loc,
                format!("record `{name}` constructor parameters"),
                format!("{}", params.len()),
                format!("{}", args.len()),
            ));
        }
        let mut checked_args = Vec::with_capacity(args.len());
        for a in args {
            let (a, _) = self.tc_expr(a)?;
            checked_args.push(a);
        }

        // Field sets are exactly the declared fields, in declaration
        // order.
        if fields.len() != decl_fields.len()
            || fields
                .iter()
                .zip(decl_fields.iter())
                .any(|((n, _), d)| !n.root_matches(&d.name))
        {
            let expected: Vec<String> =
                decl_fields.iter().map(|f| f.name.name().to_string()).collect();
            let got: Vec<String> = fields.iter().map(|(n, _)| n.name().to_string()).collect();
            return Err(TypeError::mismatch(
                &loc,
                format!("record `{name}` fields"),
                expected.join(", "),
                got.join(", "),
            ));
        }

        let map: HashMap<String, Expr> = params
            .iter()
            .map(|p| p.name().to_string())
            .zip(checked_args.iter().cloned())
            .collect();
        let mut checked_fields = Vec::with_capacity(fields.len());
        for ((fname, fexpr), decl) in fields.into_iter().zip(decl_fields.iter()) {
            let fty = self.resolve_ty(subst_ty(&map, decl.ty.clone()))?;
            let fexpr = self.check_expr(&fty, fexpr)?;
            checked_fields.push((fname, fexpr));
        }

        let ty = Ty::Named {
            name: name.clone(),
            args: checked_args.clone(),
            loc: loc.clone(),
        };
        Ok((
            Expr::Record {
                name,
                args: checked_args,
                fields: checked_fields,
                loc,
            },
            ty,
        ))
    }

    /// `base with { changes }` canonicalises at check time, while the
    /// types are known: record updates become a let-bound record rebuild,
    /// bitvector updates become `set_slice_bits` chains. Later passes
    /// never see a `with`.
    fn canonicalize_with_changes(
        &mut self,
        base: Expr,
        bty: Ty,
        changes: Vec<Change>,
        loc: Loc,
    ) -> Result<(Expr, Ty), TypeError> {
        match &bty {
            Ty::Named { name, args, .. } if self.env.record_def(name.name()).is_some() => {
                let (params, decl_fields) = self
                    .env
                    .record_def(name.name())
                    .map(|(p, f)| (p.to_vec(), f.to_vec()))
                    .expect("checked above");
                let map: HashMap<String, Expr> = params
                    .iter()
                    .map(|p| p.name().to_string())
                    .zip(args.iter().cloned())
                    .collect();

                let mut updates: HashMap<String, Expr> = HashMap::new();
                for c in changes {
                    match c {
                        Change::Field(path, value) => {
                            let [field] = path.as_slice() else {
                                return Err(TypeError::unimplemented(
                                    &loc,
                                    "nested field paths in `with`",
                                ));
                            };
                            let decl = decl_fields
                                .iter()
                                .find(|f| f.name.root_matches(field))
                                .ok_or_else(|| {
                                    TypeError::unknown(&loc, "field", field.name())
                                })?;
                            let fty = self.resolve_ty(subst_ty(&map, decl.ty.clone()))?;
                            let value = self.check_expr(&fty, value)?;
                            updates.insert(field.name().to_string(), value);
                        }
                        Change::Slices(..) => {
                            return Err(TypeError::mismatch(
                                &loc,
                                "`with` change",
                                "a field change on a record",
                                "a slice change",
                            ))
                        }
                    }
                }

                let tmp = self.supply.fresh();
                let fields = decl_fields
                    .iter()
                    .map(|f| {
                        let value = updates.remove(f.name.name()).unwrap_or(Expr::Field {
                            base: Box::new(Expr::Var {
                                name: tmp.clone(),
                                loc: loc.clone(),
                            }),
                            field: f.name.clone(),
                            loc: loc.clone(),
                        });
                        (f.name.clone(), value)
                    })
                    .collect();
                let body = Expr::Record {
                    name: name.clone(),
                    args: args.clone(),
                    fields,
                    loc: loc.clone(),
                };
                Ok((
                    Expr::Let {
                        name: tmp,
                        ty: Box::new(bty.clone()),
                        value: Box::new(base),
                        body: Box::new(body),
                        loc,
                    },
                    bty,
                ))
            }
            Ty::Bits { width, fields, .. } => {
                let base_width = (**width).clone();
                let reg_fields = fields.clone();
                let mut acc = base;
                for c in changes {
                    let (slices, value) = match c {
                        Change::Slices(slices, value) => (slices, value),
                        Change::Field(path, value) => {
                            let [field] = path.as_slice() else {
                                return Err(TypeError::unimplemented(
                                    &loc,
                                    "nested field paths in `with`",
                                ));
                            };
                            let rf = reg_fields
                                .iter()
                                .find(|rf| rf.name.root_matches(field))
                                .ok_or_else(|| {
                                    TypeError::unknown(&loc, "register field", field.name())
                                })?;
                            (rf.slices.clone(), value)
                        }
                    };
                    let [slice] = slices.as_slice() else {
                        return Err(TypeError::unimplemented(
                            &loc,
                            "multi-slice changes in `with`",
                        ));
                    };
                    let (slice, w) =
                        self.tc_slice(slice.clone(), &Some(base_width.clone()), &loc)?;
                    let (lo, _) = slice_low_width(&slice)
                        .ok_or_else(|| TypeError::internal(&loc, "slice without bounds"))?;
                    let value = self.check_expr(&Ty::bits(w.clone(), loc.clone()), value)?;
                    acc = self.prim_apply_params(
                        "set_slice_bits",
                        vec![base_width.clone(), w.clone()],
                        vec![acc, lo, w, value],
                        loc.clone(),
                    );
                }
                Ok((acc, bty))
            }
            other => Err(TypeError::mismatch(
                &loc,
                "`with` base",
                "a record or bits(-)",
                format!("{other}"),
            )),
        }
    }

    fn tc_unop(&mut self, op: Unop, operand: Expr, loc: Loc) -> Result<(Expr, Ty), TypeError> {
        // Negative literals fold immediately so `-1` has the singleton
        // constraint {-1}.
        if op == Unop::Neg {
            if let Expr::Lit {
                value: Value::Int(v),
                ..
            } = &operand
            {
                let neg = Value::Int(-v.clone());
                let ty = self.lit_ty(&neg, &loc)?;
                return Ok((Expr::Lit { value: neg, loc }, ty));
            }
        }
        if op == Unop::BoolNot {
            let operand = self.check_expr(&boolean_ty(loc.clone()), operand)?;
            return Ok((
                Expr::Unop {
                    op,
                    operand: Box::new(operand),
                    loc: loc.clone(),
                },
                boolean_ty(loc),
            ));
        }
        let (operand, oty) = self.tc_expr(operand)?;
        let candidates = self
            .env
            .operators1
            .get(&op)
            .cloned()
            .unwrap_or_default();
        let (call, ty) = self.resolve_operator(
            &format!("{op}"),
            &candidates,
            vec![(operand, oty)],
            loc,
        )?;
        Ok((call, ty))
    }

    fn tc_binop(
        &mut self,
        op: Binop,
        lhs: Expr,
        rhs: Expr,
        loc: Loc,
    ) -> Result<(Expr, Ty), TypeError> {
        // Short-circuiting boolean forms stay structural.
        if matches!(op, Binop::BoolAnd | Binop::BoolOr | Binop::Implies | Binop::Iff) {
            let lhs = self.check_expr(&boolean_ty(loc.clone()), lhs)?;
            let marker = self.assumptions.len();
            if op == Binop::BoolAnd && is_pure(&lhs) {
                self.assumptions.push(lhs.clone());
            }
            let rhs = self.check_expr(&boolean_ty(loc.clone()), rhs);
            self.assumptions.truncate(marker);
            let rhs = rhs?;
            return Ok((
                mk_binop(op, lhs, rhs, loc.clone()),
                boolean_ty(loc),
            ));
        }

        let (lhs, lty) = self.tc_expr(lhs)?;
        let (rhs, rty) = self.tc_expr(rhs)?;

        // Mask comparison is equality-under-mask.
        if matches!(op, Binop::Eq | Binop::Ne) {
            if let Ty::Named { name, .. } = &rty {
                if name.name() == "__mask" {
                    let base = if op == Binop::Eq { "in_mask" } else { "notin_mask" };
                    return self.resolve_call_typed(
                        &Ident::new(base),
                        vec![(None, lhs, lty), (None, rhs, rty)],
                        Throws::No,
                        loc,
                    );
                }
            }
        }

        // Division-family runtime obligations.
        let (lhs, rhs) = match op {
            Binop::Div | Binop::ZDiv | Binop::ZRem | Binop::FDiv | Binop::FRem => {
                let rhs = self.bind_temp(rhs, &rty);
                let nonzero = mk_binop(
                    Binop::Ne,
                    rhs.clone(),
                    Expr::lit_int(0, loc.clone()),
                    loc.clone(),
                );
                self.runtime_check(nonzero, &loc);
                let lhs = if op == Binop::Div {
                    let lhs = self.bind_temp(lhs, &lty);
                    let divisible = mk_binop(
                        Binop::Eq,
                        self.prim_apply(
                            "frem_int",
                            vec![lhs.clone(), rhs.clone()],
                            loc.clone(),
                        ),
                        Expr::lit_int(0, loc.clone()),
                        loc.clone(),
                    );
                    self.runtime_check(divisible, &loc);
                    lhs
                } else {
                    lhs
                };
                (lhs, rhs)
            }
            _ => (lhs, rhs),
        };

        let candidates = self
            .env
            .operators2
            .get(&op)
            .cloned()
            .unwrap_or_default();
        let (call, ty) =
            self.resolve_operator(&format!("{op}"), &candidates, vec![(lhs, lty.clone()), (rhs, rty.clone())], loc.clone())?;

        // Refine integer results when both operand constraint sets allow.
        let ty = match propagate_range(op, &lty, &rty, &loc) {
            Some(refined) => refined,
            None => ty,
        };
        Ok((call, ty))
    }

    fn prim_apply(&self, base: &str, args: Vec<Expr>, loc: Loc) -> Expr {
        self.prim_apply_params(base, Vec::new(), args, loc)
    }

    fn prim_apply_params(
        &self,
        base: &str,
        params: Vec<Expr>,
        args: Vec<Expr>,
        loc: Loc,
    ) -> Expr {
        let name = self
            .env
            .candidates(base)
            .first()
            .map(|s| s.name.clone())
            .unwrap_or_else(|| Ident::new(base));
        Expr::Apply {
            name,
            params,
            args,
            throws: Throws::No,
            loc,
        }
    }

    fn membership_cond(&self, e: &Expr, cs: &[Constraint], loc: &Loc) -> Expr {
        let mut cond: Option<Expr> = None;
        for c in cs {
            let test = match c {
                Constraint::Single(v) => {
                    mk_binop(Binop::Eq, e.clone(), v.clone(), loc.clone())
                }
                Constraint::Range(lo, hi) => mk_binop(
                    Binop::BoolAnd,
                    mk_binop(Binop::Le, lo.clone(), e.clone(), loc.clone()),
                    mk_binop(Binop::Le, e.clone(), hi.clone(), loc.clone()),
                    loc.clone(),
                ),
            };
            cond = Some(match cond {
                None => test,
                Some(acc) => mk_binop(Binop::BoolOr, acc, test, loc.clone()),
            });
        }
        cond.unwrap_or(Expr::Lit {
            value: Value::Bool(true),
            loc: loc.clone(),
        })
    }

    // ---- calls ----

    fn tc_call_args(
        &mut self,
        args: Vec<(Option<Ident>, Expr)>,
        loc: &Loc,
    ) -> Result<Vec<(Option<Ident>, Expr, Ty)>, TypeError> {
        // Named arguments may only follow positional ones.
        let mut seen_named = false;
        for (n, e) in &args {
            match n {
                Some(_) => seen_named = true,
                None if seen_named => {
                    return Err(TypeError::type_error(
                        e.loc(),
                        "positional argument after named argument",
                    ))
                }
                None => {}
            }
        }
        let mut out = Vec::with_capacity(args.len());
        for (n, e) in args {
            let (e, t) = self.tc_expr(e)?;
            out.push((n, e, t));
        }
        Ok(out)
    }

    fn resolve_call(
        &mut self,
        name: &Ident,
        args: Vec<(Option<Ident>, Expr, Ty)>,
        throws: Throws,
        loc: Loc,
    ) -> Result<(Expr, Ty), TypeError> {
        if self.env.candidates(name.name()).is_empty() {
            // Array-form getter: `F(args)` never exists as a function but
            // `F__getter` might.
            let getter = name.with_suffix(GETTER_SUFFIX);
            if !self.env.candidates(getter.name()).is_empty() {
                return self.resolve_call_typed(&getter, args, throws, loc);
            }
            return Err(TypeError::unknown(&loc, "function", name.name()));
        }
        self.resolve_call_typed(name, args, throws, loc)
    }

    fn resolve_call_typed(
        &mut self,
        name: &Ident,
        args: Vec<(Option<Ident>, Expr, Ty)>,
        throws: Throws,
        loc: Loc,
    ) -> Result<(Expr, Ty), TypeError> {
        let candidates: Vec<FunSig> = self.env.candidates(name.name()).to_vec();
        if candidates.is_empty() {
            return Err(TypeError::unknown(&loc, "function", name.name()));
        }

        let mut matches = Vec::new();
        for sig in &candidates {
            if let Some(bound) = self.bind_formals(sig, &args) {
                if bound
                    .iter()
                    .zip(sig.args.iter())
                    .all(|((_, t), f)| self.structurally_compatible(t, &f.ty))
                {
                    matches.push((sig.clone(), bound));
                }
            }
        }

        match matches.len() {
            0 => Err(TypeError::mismatch(
                &loc,
                format!("call to `{}`", name.name()),
                describe_candidates(&candidates),
                describe_args(&args),
            )),
            1 => {
                let (sig, bound) = matches.swap_remove(0);
                self.finish_call(sig, bound, throws, loc)
            }
            _ => Err(TypeError::Ambiguous {
                name: name.name().to_string(),
                candidates: describe_candidates(
                    &matches.iter().map(|(s, _)| s.clone()).collect::<Vec<_>>(),
                ),
                span: loc.span(),
            }),
        }
    }

    /// Bind call-site arguments to a candidate's formals: positional
    /// left-to-right, then named, then defaults. `None` when the shapes
    /// cannot line up.
    fn bind_formals(
        &mut self,
        sig: &FunSig,
        args: &[(Option<Ident>, Expr, Ty)],
    ) -> Option<Vec<(Expr, Ty)>> {
        let mut slots: Vec<Option<(Expr, Ty)>> = vec![None; sig.args.len()];
        let mut next = 0usize;
        for (aname, e, t) in args {
            match aname {
                None => {
                    if next >= slots.len() {
                        return None;
                    }
                    slots[next] = Some((e.clone(), t.clone()));
                    next += 1;
                }
                Some(n) => {
                    let idx = sig.args.iter().position(|f| f.name.root_matches(n))?;
                    if slots[idx].is_some() {
                        return None;
                    }
                    slots[idx] = Some((e.clone(), t.clone()));
                }
            }
        }

        // Defaults may reference earlier formals.
        let mut bound: Vec<(Expr, Ty)> = Vec::with_capacity(slots.len());
        for (i, slot) in slots.into_iter().enumerate() {
            match slot {
                Some(v) => bound.push(v),
                None => {
                    let default = sig.args[i].default.clone()?;
                    let mut map = HashMap::new();
                    for (j, earlier) in sig.args.iter().take(i).enumerate() {
                        map.insert(earlier.name.name().to_string(), bound[j].0.clone());
                    }
                    let substituted = subst_expr(&map, default);
                    let (e, t) = self.tc_expr(substituted).ok()?;
                    bound.push((e, t));
                }
            }
        }
        Some(bound)
    }

    /// Structural compatibility, ignoring the dependent parts.
    fn structurally_compatible(&mut self, actual: &Ty, formal: &Ty) -> bool {
        let formal = match self.resolve_ty_shallow(formal) {
            Some(t) => t,
            None => return false,
        };
        match (actual, &formal) {
            (Ty::Integer { .. }, Ty::Integer { .. }) => true,
            (Ty::Bits { .. }, Ty::Bits { .. }) => true,
            (Ty::Named { name: a, .. }, Ty::Named { name: b, .. }) => a.root_matches(b),
            (Ty::Array { element: a, .. }, Ty::Array { element: b, .. }) => {
                self.structurally_compatible(a, b)
            }
            (Ty::Tuple { elems: a, .. }, Ty::Tuple { elems: b, .. }) => {
                a.len() == b.len()
                    && a.iter()
                        .zip(b.iter())
                        .all(|(x, y)| self.structurally_compatible(x, y))
            }
            _ => false,
        }
    }

    /// Alias expansion only, without typechecking inner expressions.
    fn resolve_ty_shallow(&self, ty: &Ty) -> Option<Ty> {
        match ty {
            Ty::Named { name, args, loc } => match self.env.types.get(name.name()) {
                Some(TypeDef::Alias { params, ty }) => {
                    if params.len() != args.len() {
                        return None;
                    }
                    let map: HashMap<String, Expr> = params
                        .iter()
                        .map(|p| p.name().to_string())
                        .zip(args.iter().cloned())
                        .collect();
                    self.resolve_ty_shallow(&subst_ty(&map, ty.clone()))
                }
                Some(_) => Some(Ty::Named {
                    name: name.clone(),
                    args: args.clone(),
                    loc: loc.clone(),
                }),
                None => None,
            },
            other => Some(other.clone()),
        }
    }

    fn finish_call(
        &mut self,
        sig: FunSig,
        bound: Vec<(Expr, Ty)>,
        call_throws: Throws,
        loc: Loc,
    ) -> Result<(Expr, Ty), TypeError> {
        if call_throws != Throws::No && call_throws != sig.throws {
            return Err(TypeError::mismatch(
                &loc,
                format!("exception marker on call to `{}`", sig.name.name()),
                format!("`{}{}`", sig.name.name(), sig.throws),
                format!("`{}{}`", sig.name.name(), call_throws),
            ));
        }

        // Synthesize the dependent parameters from the actual types and
        // argument expressions.
        let param_names: HashSet<String> = sig
            .params
            .iter()
            .map(|p| p.name.name().to_string())
            .collect();
        let mut bindings: HashMap<String, Expr> = HashMap::new();
        for (formal, (actual_e, actual_t)) in sig.args.iter().zip(bound.iter()) {
            if param_names.contains(formal.name.name()) {
                bindings
                    .entry(formal.name.name().to_string())
                    .or_insert_with(|| actual_e.clone());
            }
            synth_params(&formal.ty, actual_t, &param_names, &mut bindings);
        }
        for p in &sig.params {
            if !bindings.contains_key(p.name.name()) {
                return Err(TypeError::type_error(
                    &loc,
                    format!(
                        "unable to synthesize parameter `{}` of `{}`",
                        p.name,
                        sig.name.name()
                    ),
                ));
            }
        }

        // Verify each argument against its substituted formal type.
        let mut arg_exprs = Vec::with_capacity(bound.len());
        for (formal, (actual_e, actual_t)) in sig.args.iter().zip(bound.into_iter()) {
            let expected = self.resolve_ty(subst_ty(&bindings, formal.ty.clone()))?;
            if !self.satisfies(&actual_t, &expected) {
                return Err(TypeError::mismatch(
                    actual_e.loc(),
                    format!("argument `{}` of `{}`", formal.name, sig.name.name()),
                    format!("{expected}"),
                    format!("{actual_t}"),
                ));
            }
            arg_exprs.push(actual_e);
        }

        let params: Vec<Expr> = sig
            .params
            .iter()
            .map(|p| simplify(bindings[p.name.name()].clone()))
            .collect();

        let rty = match &sig.rty {
            Some(t) => self.resolve_ty(subst_ty(&bindings, t.clone()))?,
            None => unit_ty(loc.clone()),
        };

        Ok((
            Expr::Apply {
                name: sig.name.clone(),
                params,
                args: arg_exprs,
                throws: sig.throws,
                loc,
            },
            rty,
        ))
    }

    fn apply_rty(&mut self, sig: &FunSig, params: &[Expr], loc: &Loc) -> Result<Ty, TypeError> {
        let map: HashMap<String, Expr> = sig
            .params
            .iter()
            .map(|p| p.name.name().to_string())
            .zip(params.iter().cloned())
            .collect();
        match &sig.rty {
            Some(t) => self.resolve_ty(subst_ty(&map, t.clone())),
            None => Ok(unit_ty(loc.clone())),
        }
    }

    fn resolve_operator(
        &mut self,
        op_name: &str,
        table: &[Ident],
        args: Vec<(Expr, Ty)>,
        loc: Loc,
    ) -> Result<(Expr, Ty), TypeError> {
        if table.is_empty() {
            return Err(TypeError::unknown(&loc, "operator", op_name));
        }
        let mut matches = Vec::new();
        for base in table {
            let candidates: Vec<FunSig> = self.env.candidates(base.name()).to_vec();
            for sig in candidates {
                if sig.args.len() != args.len() {
                    continue;
                }
                if args
                    .iter()
                    .zip(sig.args.iter())
                    .all(|((_, t), f)| self.structurally_compatible(t, &f.ty))
                {
                    matches.push(sig);
                }
            }
        }
        match matches.len() {
            0 => Err(TypeError::mismatch(
                &loc,
                format!("operator `{op_name}`"),
                describe_candidates(
                    &table
                        .iter()
                        .flat_map(|b| self.env.candidates(b.name()).to_vec())
                        .collect::<Vec<_>>(),
                ),
                args.iter()
                    .map(|(_, t)| format!("{t}"))
                    .collect::<Vec<_>>()
                    .join(", "),
            )),
            1 => {
                let sig = matches.pop().expect("one match");
                let bound: Vec<(Expr, Ty)> = args;
                self.finish_call(sig, bound, Throws::No, loc)
            }
            _ => Err(TypeError::Ambiguous {
                name: op_name.to_string(),
                candidates: describe_candidates(&matches),
                span: loc.span(),
            }),
        }
    }

    // ---- patterns ----

    fn tc_pattern(&mut self, p: Pattern, ty: &Ty) -> Result<Pattern, TypeError> {
        match p {
            Pattern::Wildcard(loc) => Ok(Pattern::Wildcard(loc)),
            Pattern::Lit(v, loc) => {
                let lty = self.lit_ty(&v, &loc)?;
                if !self.compatible_pattern_ty(&lty, ty) {
                    return Err(TypeError::mismatch(
                        &loc,
                        "pattern",
                        format!("{ty}"),
                        format!("{lty}"),
                    ));
                }
                Ok(Pattern::Lit(v, loc))
            }
            Pattern::Mask(m, loc) => {
                match ty {
                    Ty::Bits { width, .. } => {
                        let w = Expr::lit_int(m.width as i64, loc.clone());
                        if !self.widths_equal(&w, &width.clone(), &loc) {
                            return Err(TypeError::mismatch(
                                &loc,
                                "mask pattern width",
                                format!("{width}"),
                                format!("{}", m.width),
                            ));
                        }
                    }
                    _ => {
                        return Err(TypeError::mismatch(
                            &loc,
                            "mask pattern",
                            "bits(-)",
                            format!("{ty}"),
                        ))
                    }
                }
                Ok(Pattern::Mask(m, loc))
            }
            Pattern::Const(name, loc) => {
                // Either a named constant or an enumeration member.
                let (e, cty) = self.tc_var(name.clone(), loc.clone())?;
                let _ = e;
                if !self.compatible_pattern_ty(&cty, ty) {
                    return Err(TypeError::mismatch(
                        &loc,
                        "pattern",
                        format!("{ty}"),
                        format!("{cty}"),
                    ));
                }
                Ok(Pattern::Const(name, loc))
            }
            Pattern::Tuple(ps, loc) => match ty {
                Ty::Tuple { elems, .. } if elems.len() == ps.len() => {
                    let elems = elems.clone();
                    let ps = ps
                        .into_iter()
                        .zip(elems.iter())
                        .map(|(p, t)| self.tc_pattern(p, t))
                        .collect::<Result<_, _>>()?;
                    Ok(Pattern::Tuple(ps, loc))
                }
                _ => Err(TypeError::mismatch(
                    &loc,
                    "tuple pattern",
                    format!("{ty}"),
                    "tuple",
                )),
            },
            Pattern::Set(ps, loc) => {
                let ps = ps
                    .into_iter()
                    .map(|p| self.tc_pattern(p, ty))
                    .collect::<Result<_, _>>()?;
                Ok(Pattern::Set(ps, loc))
            }
            Pattern::Range(lo, hi, loc) => {
                let (lo, _) = self.tc_expr(lo)?;
                let (hi, _) = self.tc_expr(hi)?;
                Ok(Pattern::Range(lo, hi, loc))
            }
            Pattern::Single(e, loc) => {
                let e = self.check_expr(ty, e)?;
                Ok(Pattern::Single(e, loc))
            }
        }
    }

    fn compatible_pattern_ty(&mut self, pty: &Ty, ty: &Ty) -> bool {
        self.structurally_compatible(pty, ty)
    }

    // ---- checking against an expected type ----

    pub fn check_expr(&mut self, expected: &Ty, e: Expr) -> Result<Expr, TypeError> {
        let loc = e.loc().clone();
        let (e, actual) = self.tc_expr(e)?;
        if self.satisfies(&actual, expected) {
            return Ok(e);
        }
        // An unconstrained integer flowing into a constrained context
        // becomes a runtime membership check.
        if let (
            Ty::Integer { .. },
            Ty::Integer {
                constraints: Some(cs),
                ..
            },
        ) = (&actual, expected)
        {
            if self.opts.runtime_checks {
                let bound = self.bind_temp(e, &actual);
                let cond = self.membership_cond(&bound, cs, &loc);
                self.runtime_check(cond, &loc);
                return Ok(bound);
            }
        }
        Err(TypeError::mismatch(
            &loc,
            "expression",
            format!("{expected}"),
            format!("{actual}"),
        ))
    }

    // ---- statements ----

    pub fn tc_stmts(&mut self, stmts: Vec<Stmt>) -> Result<Vec<Stmt>, TypeError> {
        let mut out = Vec::with_capacity(stmts.len());
        for s in stmts {
            let rewritten = self.tc_stmt(s)?;
            out.extend(self.drain_pending());
            out.extend(rewritten);
        }
        Ok(out)
    }

    fn tc_block(&mut self, stmts: Vec<Stmt>) -> Result<Vec<Stmt>, TypeError> {
        self.scopes.push();
        let marker = self.assumptions.len();
        let result = self.tc_stmts(stmts);
        self.assumptions.truncate(marker);
        self.scopes.pop();
        result
    }

    pub fn tc_stmt(&mut self, s: Stmt) -> Result<Vec<Stmt>, TypeError> {
        match s {
            Stmt::VarDeclsNoInit { ty, names, loc } => {
                let ty = self.resolve_ty(ty)?;
                for n in &names {
                    self.declare(VarInfo {
                        name: n.clone(),
                        loc: loc.clone(),
                        ty: ty.clone(),
                        is_local: true,
                        is_constant: false,
                    })?;
                }
                Ok(vec![Stmt::VarDeclsNoInit { ty, names, loc }])
            }
            Stmt::VarDecl {
                constant,
                ty,
                target,
                init,
                loc,
            } => self.tc_var_decl(constant, ty, target, init, loc),
            Stmt::Assign { lhs, rhs, loc } => {
                let (lhs, lty) = self.tc_lexpr(lhs)?;
                let rhs = match lty {
                    Some(t) => self.check_expr(&t, rhs)?,
                    None => self.tc_expr(rhs)?.0,
                };
                Ok(vec![Stmt::Assign { lhs, rhs, loc }])
            }
            Stmt::Call {
                name,
                args,
                throws,
                loc,
            } => {
                let args = self.tc_call_args(args, &loc)?;
                let (call, _) = self.resolve_call(&name, args, throws, loc.clone())?;
                match call {
                    Expr::Apply {
                        name,
                        params,
                        args,
                        throws,
                        ..
                    } => Ok(vec![Stmt::Apply {
                        name,
                        params,
                        args,
                        throws,
                        loc,
                    }]),
                    other => Err(TypeError::internal(
                        &loc,
                        format!("call resolved to non-call `{other}`"),
                    )),
                }
            }
            Stmt::Apply {
                name,
                params,
                args,
                throws,
                loc,
            } => Ok(vec![Stmt::Apply {
                name,
                params,
                args,
                throws,
                loc,
            }]),
            Stmt::Return { value, loc } => {
                let rty = self.rty.clone();
                match (value, rty) {
                    (None, None) => Ok(vec![Stmt::Return { value: None, loc }]),
                    (Some(e), Some(t)) => {
                        let e = self.check_expr(&t, e)?;
                        Ok(vec![Stmt::Return {
                            value: Some(e),
                            loc,
                        }])
                    }
                    (None, Some(t)) => Err(TypeError::mismatch(
                        &loc,
                        "return",
                        format!("{t}"),
                        "no value",
                    )),
                    (Some(e), None) => Err(TypeError::mismatch(
                        e.loc(),
                        "return",
                        "no value",
                        "a value",
                    )),
                }
            }
            Stmt::Assert { cond, loc } => {
                let cond = self.check_expr(&boolean_ty(loc.clone()), cond)?;
                if is_pure(&cond) {
                    self.assumptions.push(cond.clone());
                }
                Ok(vec![Stmt::Assert { cond, loc }])
            }
            Stmt::Throw { exn, loc } => {
                let (exn, ty) = self.tc_expr(exn)?;
                match &ty {
                    Ty::Named { name, .. }
                        if self.env.exception_fields(name.name()).is_some() => {}
                    other => {
                        return Err(TypeError::mismatch(
                            &loc,
                            "throw operand",
                            "an exception record",
                            format!("{other}"),
                        ))
                    }
                }
                Ok(vec![Stmt::Throw { exn, loc }])
            }
            Stmt::Try {
                body,
                bind,
                arms,
                default,
                loc,
            } => {
                let body = self.tc_block(body)?;
                let mut checked_arms = Vec::with_capacity(arms.len());
                for arm in arms {
                    if self.env.exception_fields(arm.exn.name()).is_none() {
                        return Err(TypeError::unknown(
                            &arm.loc,
                            "exception",
                            arm.exn.name(),
                        ));
                    }
                    self.scopes.push();
                    self.declare(VarInfo {
                        name: bind.clone(),
                        loc: arm.loc.clone(),
                        ty: Ty::Named {
                            name: arm.exn.clone(),
                            args: Vec::new(),
                            loc: arm.loc.clone(),
                        },
                        is_local: true,
                        is_constant: true,
                    })?;
                    let arm_body = self.tc_stmts(arm.body);
                    self.scopes.pop();
                    checked_arms.push(CatchArm {
                        exn: arm.exn,
                        body: arm_body?,
                        loc: arm.loc,
                    });
                }
                let default = match default {
                    Some(d) => Some(self.tc_block(d)?),
                    None => None,
                };
                Ok(vec![Stmt::Try {
                    body,
                    bind,
                    arms: checked_arms,
                    default,
                    loc,
                }])
            }
            Stmt::If { arms, els, loc } => {
                let mut checked = Vec::with_capacity(arms.len());
                for (cond, body) in arms {
                    let cond = self.check_expr(&boolean_ty(loc.clone()), cond)?;
                    self.scopes.push();
                    let marker = self.assumptions.len();
                    if is_pure(&cond) {
                        self.assumptions.push(cond.clone());
                    }
                    let body = self.tc_stmts(body);
                    self.assumptions.truncate(marker);
                    self.scopes.pop();
                    checked.push((cond, body?));
                }
                let els = self.tc_block(els)?;
                Ok(vec![Stmt::If {
                    arms: checked,
                    els,
                    loc,
                }])
            }
            Stmt::Case {
                expr,
                alts,
                default,
                loc,
            } => {
                let (expr, ety) = self.tc_expr(expr)?;
                let expr = self.bind_temp(expr, &ety);
                let mut checked = Vec::with_capacity(alts.len());
                for alt in alts {
                    let patterns = alt
                        .patterns
                        .into_iter()
                        .map(|p| self.tc_pattern(p, &ety))
                        .collect::<Result<_, _>>()?;
                    self.scopes.push();
                    let guard = match alt.guard {
                        Some(g) => Some(self.check_expr(&boolean_ty(loc.clone()), g)?),
                        None => None,
                    };
                    let body = self.tc_stmts(alt.body);
                    self.scopes.pop();
                    checked.push(CaseAlt {
                        patterns,
                        guard,
                        body: body?,
                        loc: alt.loc,
                    });
                }
                let default = match default {
                    Some(d) => Some(self.tc_block(d)?),
                    None => None,
                };
                Ok(vec![Stmt::Case {
                    expr,
                    alts: checked,
                    default,
                    loc,
                }])
            }
            Stmt::For {
                var,
                from,
                dir,
                to,
                body,
                loc,
            } => {
                let int = Ty::unconstrained_integer(loc.clone());
                let (from, _) = self.tc_expr(from)?;
                let (to, _) = self.tc_expr(to)?;
                // Loop variables get the subrange refinement when both
                // bounds are immutable.
                let var_ty = if is_pure(&from) && is_pure(&to) {
                    let (lo, hi) = match dir {
                        Direction::Up => (from.clone(), to.clone()),
                        Direction::Down => (to.clone(), from.clone()),
                    };
                    Ty::Integer {
                        constraints: Some(vec![Constraint::Range(lo, hi)]),
                        loc: loc.clone(),
                    }
                } else {
                    int
                };
                self.scopes.push();
                let marker = self.assumptions.len();
                self.declare(VarInfo {
                    name: var.clone(),
                    loc: loc.clone(),
                    ty: var_ty.clone(),
                    is_local: true,
                    is_constant: false,
                })?;
                self.push_constraint_assumptions(&var, &var_ty);
                let body = self.tc_stmts(body);
                self.assumptions.truncate(marker);
                self.scopes.pop();
                Ok(vec![Stmt::For {
                    var,
                    from,
                    dir,
                    to,
                    body: body?,
                    loc,
                }])
            }
            Stmt::While { cond, body, loc } => {
                let cond = self.check_expr(&boolean_ty(loc.clone()), cond)?;
                let body = self.tc_block(body)?;
                Ok(vec![Stmt::While { cond, body, loc }])
            }
            Stmt::Repeat { body, until, loc } => {
                let body = self.tc_block(body)?;
                let until = self.check_expr(&boolean_ty(loc.clone()), until)?;
                Ok(vec![Stmt::Repeat { body, until, loc }])
            }
        }
    }

    fn tc_var_decl(
        &mut self,
        constant: bool,
        ty: Option<Ty>,
        target: DeclTarget,
        init: Expr,
        loc: Loc,
    ) -> Result<Vec<Stmt>, TypeError> {
        let ty = match ty {
            Some(t) => Some(self.resolve_ty(t)?),
            None => None,
        };
        match &target {
            DeclTarget::Single(name) => {
                let (init, vty) = match &ty {
                    Some(t) => (self.check_expr(t, init)?, t.clone()),
                    None => self.tc_expr(init)?,
                };
                self.declare(VarInfo {
                    name: name.clone(),
                    loc: loc.clone(),
                    ty: vty.clone(),
                    is_local: true,
                    is_constant: constant,
                })?;
                // Immutable bindings become algebraic facts.
                if constant && is_pure(&init) {
                    self.assumptions.push(mk_binop(
                        Binop::Eq,
                        Expr::Var {
                            name: name.clone(),
                            loc: loc.clone(),
                        },
                        init.clone(),
                        loc.clone(),
                    ));
                }
                Ok(vec![Stmt::VarDecl {
                    constant,
                    ty: Some(vty),
                    target,
                    init,
                    loc,
                }])
            }
            DeclTarget::Tuple(names) => {
                let (init, ity) = self.tc_expr(init)?;
                let elems = match &ity {
                    Ty::Tuple { elems, .. } if elems.len() == names.len() => elems.clone(),
                    other => {
                        return Err(TypeError::mismatch(
                            &loc,
                            "tuple declaration initialiser",
                            format!("a {}-tuple", names.len()),
                            format!("{other}"),
                        ))
                    }
                };
                for (n, t) in names.iter().zip(elems.iter()) {
                    self.declare(VarInfo {
                        name: n.clone(),
                        loc: loc.clone(),
                        ty: t.clone(),
                        is_local: true,
                        is_constant: constant,
                    })?;
                }
                Ok(vec![Stmt::VarDecl {
                    constant,
                    ty: Some(ity),
                    target,
                    init,
                    loc,
                }])
            }
            DeclTarget::BitTuple(names) => {
                let elem_ty = ty.clone().ok_or_else(|| {
                    TypeError::type_error(
                        &loc,
                        "bit-tuple declarations need an explicit element type",
                    )
                })?;
                let width = match &elem_ty {
                    Ty::Bits { width, .. } => (**width).clone(),
                    other => {
                        return Err(TypeError::mismatch(
                            &loc,
                            "bit-tuple element type",
                            "bits(-)",
                            format!("{other}"),
                        ))
                    }
                };
                let count = names.len() as i64;
                let total = simplify(mk_binop(
                    Binop::Mul,
                    width,
                    Expr::lit_int(count, loc.clone()),
                    loc.clone(),
                ));
                let init = self.check_expr(&Ty::bits(total, loc.clone()), init)?;
                for n in names {
                    self.declare(VarInfo {
                        name: n.clone(),
                        loc: loc.clone(),
                        ty: elem_ty.clone(),
                        is_local: true,
                        is_constant: constant,
                    })?;
                }
                Ok(vec![Stmt::VarDecl {
                    constant,
                    ty: Some(elem_ty),
                    target,
                    init,
                    loc,
                }])
            }
        }
    }

    // ---- lvalues ----

    fn tc_lexpr(&mut self, l: LExpr) -> Result<(LExpr, Option<Ty>), TypeError> {
        match l {
            LExpr::Discard { loc } => Ok((LExpr::Discard { loc }, None)),
            LExpr::Var { name, loc } => {
                if let Some(info) = self.scopes.lookup(name.name()) {
                    if info.is_constant {
                        return Err(TypeError::type_error(
                            &loc,
                            format!("`{name}` is immutable"),
                        ));
                    }
                    let ty = info.ty.clone();
                    return Ok((LExpr::Var { name, loc }, Some(ty)));
                }
                if let Some(info) = self.env.globals.get(name.name()) {
                    if info.is_constant {
                        return Err(TypeError::type_error(
                            &loc,
                            format!("`{name}` is a constant"),
                        ));
                    }
                    let ty = info.ty.clone();
                    return Ok((LExpr::Var { name, loc }, Some(ty)));
                }
                self.accessor_lexpr(&name, Vec::new(), loc)
            }
            LExpr::Field { base, field, loc } => {
                let (base, bty) = self.tc_lexpr(*base)?;
                // Register fields in lvalue position become slice writes.
                if let Some(Ty::Bits { width, fields, .. }) = &bty {
                    if let Some(rf) = fields.iter().find(|rf| rf.name.root_matches(&field)) {
                        let base_width = Some((**width).clone());
                        let mut checked = Vec::with_capacity(rf.slices.len());
                        let mut total: Option<Expr> = None;
                        for s in rf.slices.clone() {
                            let (s, w) = self.tc_slice(s, &base_width, &loc)?;
                            total = Some(match total {
                                None => w,
                                Some(acc) => mk_binop(Binop::Plus, acc, w, loc.clone()),
                            });
                            checked.push(s);
                        }
                        let ty = total.map(|w| Ty::bits(simplify(w), loc.clone()));
                        return Ok((
                            LExpr::Slices {
                                base: Box::new(base),
                                slices: checked,
                                loc,
                            },
                            ty,
                        ));
                    }
                }
                let ty = match &bty {
                    Some(t) => Some(self.field_ty(t, &field, &loc)?),
                    None => None,
                };
                Ok((
                    LExpr::Field {
                        base: Box::new(base),
                        field,
                        loc,
                    },
                    ty,
                ))
            }
            LExpr::Fields { base, fields, loc } => {
                let (base, _) = self.tc_lexpr(*base)?;
                Ok((
                    LExpr::Fields {
                        base: Box::new(base),
                        fields,
                        loc,
                    },
                    None,
                ))
            }
            LExpr::Index { base, index, loc } => {
                let (base, bty) = self.tc_lexpr(*base)?;
                let (index, _) = self.tc_expr(*index)?;
                let ty = match &bty {
                    Some(Ty::Array { element, .. }) => Some((**element).clone()),
                    _ => None,
                };
                Ok((
                    LExpr::Index {
                        base: Box::new(base),
                        index: Box::new(index),
                        loc,
                    },
                    ty,
                ))
            }
            LExpr::Slices { base, slices, loc } => {
                // An unknown base name with slice arguments is an
                // array-form accessor write.
                if let LExpr::Var { name, .. } = &*base {
                    let is_var = self.scopes.lookup(name.name()).is_some()
                        || self.env.globals.contains_key(name.name());
                    if !is_var {
                        let setter = name.with_suffix(SETTER_SUFFIX);
                        let arity = slices.len() + 1;
                        let array_form = self
                            .env
                            .candidates(setter.name())
                            .iter()
                            .any(|s| s.args.len() == arity);
                        if array_form {
                            let mut args = Vec::with_capacity(slices.len());
                            for s in slices {
                                match s {
                                    Slice::Single(e) => args.push(e),
                                    other => {
                                        return Err(TypeError::type_error(
                                            &loc,
                                            format!(
                                                "accessor argument must be a plain expression, got `{other}`"
                                            ),
                                        ))
                                    }
                                }
                            }
                            return self.accessor_lexpr(name, args, loc);
                        }
                    }
                }

                let (base, bty) = self.tc_lexpr(*base)?;

                // Array element assignment.
                if let Some(Ty::Array { index, element, .. }) = &bty {
                    if let [Slice::Single(i)] = slices.as_slice() {
                        let (i, _) = self.tc_expr(i.clone())?;
                        let i = self.bind_temp(i, &Ty::unconstrained_integer(loc.clone()));
                        if let ArrayIndex::Size(size) = index {
                            let zero = Expr::lit_int(0, loc.clone());
                            let cond = mk_binop(
                                Binop::BoolAnd,
                                mk_binop(Binop::Le, zero, i.clone(), loc.clone()),
                                mk_binop(Binop::Lt, i.clone(), (**size).clone(), loc.clone()),
                                loc.clone(),
                            );
                            self.runtime_check(cond, &loc);
                        }
                        let ety = (**element).clone();
                        return Ok((
                            LExpr::Index {
                                base: Box::new(base),
                                index: Box::new(i),
                                loc,
                            },
                            Some(ety),
                        ));
                    }
                }

                let base_width = match &bty {
                    Some(Ty::Bits { width, .. }) => Some((**width).clone()),
                    _ => None,
                };
                let mut checked = Vec::with_capacity(slices.len());
                let mut total: Option<Expr> = None;
                for s in slices {
                    let (s, w) = self.tc_slice(s, &base_width, &loc)?;
                    total = Some(match total {
                        None => w,
                        Some(acc) => mk_binop(Binop::Plus, acc, w, loc.clone()),
                    });
                    checked.push(s);
                }
                let ty = total.map(|w| Ty::bits(simplify(w), loc.clone()));
                Ok((
                    LExpr::Slices {
                        base: Box::new(base),
                        slices: checked,
                        loc,
                    },
                    ty,
                ))
            }
            LExpr::BitTuple { elems, loc, .. } => {
                let mut checked = Vec::with_capacity(elems.len());
                let mut widths = Vec::with_capacity(elems.len());
                let mut total: Option<Expr> = None;
                for l in elems {
                    let (l, lty) = self.tc_lexpr(l)?;
                    let w = match lty {
                        Some(Ty::Bits { width, .. }) => (*width).clone(),
                        other => {
                            return Err(TypeError::mismatch(
                                &loc,
                                "bit-tuple element",
                                "bits(-)",
                                other.map(|t| format!("{t}")).unwrap_or_default(),
                            ))
                        }
                    };
                    total = Some(match total {
                        None => w.clone(),
                        Some(acc) => mk_binop(Binop::Plus, acc, w.clone(), loc.clone()),
                    });
                    widths.push(w);
                    checked.push(l);
                }
                let ty = total.map(|w| Ty::bits(simplify(w), loc.clone()));
                Ok((
                    LExpr::BitTuple {
                        widths,
                        elems: checked,
                        loc,
                    },
                    ty,
                ))
            }
            LExpr::Tuple { elems, loc } => {
                let mut checked = Vec::with_capacity(elems.len());
                let mut tys = Vec::with_capacity(elems.len());
                let mut all_known = true;
                for l in elems {
                    let (l, lty) = self.tc_lexpr(l)?;
                    match lty {
                        Some(t) => tys.push(t),
                        None => all_known = false,
                    }
                    checked.push(l);
                }
                let ty = if all_known {
                    Some(Ty::Tuple {
                        elems: tys,
                        loc: loc.clone(),
                    })
                } else {
                    None
                };
                Ok((
                    LExpr::Tuple {
                        elems: checked,
                        loc,
                    },
                    ty,
                ))
            }
            already @ (LExpr::ReadWrite { .. } | LExpr::Write { .. }) => Ok((already, None)),
        }
    }

    /// Resolve a name in lvalue position to its getter/setter pair.
    fn accessor_lexpr(
        &mut self,
        name: &Ident,
        args: Vec<Expr>,
        loc: Loc,
    ) -> Result<(LExpr, Option<Ty>), TypeError> {
        let getter = name.with_suffix(GETTER_SUFFIX);
        let setter = name.with_suffix(SETTER_SUFFIX);
        let has_getter = !self.env.candidates(getter.name()).is_empty();
        let has_setter = !self.env.candidates(setter.name()).is_empty();
        match (has_getter, has_setter) {
            (false, false) => Err(TypeError::unknown(&loc, "variable", name.name())),
            (true, false) => Err(TypeError::type_error(
                &loc,
                format!("`{name}` has a getter but no setter; it cannot be assigned"),
            )),
            (false, true) => Err(TypeError::type_error(
                &loc,
                format!("`{name}` has a setter but no getter"),
            )),
            (true, true) => {
                let mut typed_args = Vec::with_capacity(args.len());
                for a in args {
                    let (a, t) = self.tc_expr(a)?;
                    typed_args.push((None, a, t));
                }
                // Resolve through the getter to learn the value type and
                // the synthesized parameters.
                let (resolved, vty) = self.resolve_call_typed(
                    &getter,
                    typed_args,
                    Throws::No,
                    loc.clone(),
                )?;
                let (gname, params, gargs, throws) = match resolved {
                    Expr::Apply {
                        name,
                        params,
                        args,
                        throws,
                        ..
                    } => (name, params, args, throws),
                    other => {
                        return Err(TypeError::internal(
                            &loc,
                            format!("getter resolved to `{other}`"),
                        ))
                    }
                };
                // Pick the setter candidate matching the getter's shape.
                let setter_sig = self
                    .env
                    .candidates(setter.name())
                    .iter()
                    .find(|s| s.args.len() == gargs.len() + 1)
                    .cloned()
                    .ok_or_else(|| {
                        TypeError::type_error(
                            &loc,
                            format!("no setter for `{name}` takes {} arguments", gargs.len()),
                        )
                    })?;
                Ok((
                    LExpr::ReadWrite {
                        getter: gname,
                        setter: setter_sig.name,
                        params,
                        args: gargs,
                        throws,
                        loc,
                    },
                    Some(vty),
                ))
            }
        }
    }

    fn join_types(&mut self, a: Ty, b: Ty, loc: &Loc) -> Result<Ty, TypeError> {
        if self.satisfies(&a, &b) {
            return Ok(b);
        }
        if self.satisfies(&b, &a) {
            return Ok(a);
        }
        match (&a, &b) {
            (
                Ty::Integer {
                    constraints: ca, ..
                },
                Ty::Integer {
                    constraints: cb, ..
                },
            ) => {
                let joined = match (ca, cb) {
                    (Some(ca), Some(cb)) => {
                        let mut out = ca.clone();
                        out.extend(cb.clone());
                        Some(out)
                    }
                    _ => None,
                };
                Ok(Ty::Integer {
                    constraints: joined,
                    loc: loc.clone(),
                })
            }
            _ => Err(TypeError::mismatch(
                loc,
                "conditional arms",
                format!("{a}"),
                format!("{b}"),
            )),
        }
    }
}

/// Two signatures are the same overload when their shapes agree; a
/// definition following a prototype reuses the prototype's tag.
fn sigs_equivalent(a: &FunSig, b: &FunSig) -> bool {
    a.kind == b.kind
        && a.params.len() == b.params.len()
        && a.args.len() == b.args.len()
        && a.throws == b.throws
        && a.args
            .iter()
            .zip(b.args.iter())
            .all(|(x, y)| format!("{}", x.ty) == format!("{}", y.ty))
}

fn describe_candidates(candidates: &[FunSig]) -> String {
    candidates
        .iter()
        .map(|s| {
            let args: Vec<String> = s.args.iter().map(|a| format!("{}", a.ty)).collect();
            format!("{}({})", s.name.name(), args.join(", "))
        })
        .collect::<Vec<_>>()
        .join(" | ")
}

fn describe_args(args: &[(Option<Ident>, Expr, Ty)]) -> String {
    args.iter()
        .map(|(n, _, t)| match n {
            Some(n) => format!("{n} = {t}"),
            None => format!("{t}"),
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// Canonical `(low, width)` reading of a slice, when expressible without
/// reference to the base width.
pub fn slice_low_width(s: &Slice) -> Option<(Expr, Expr)> {
    let loc = Loc::Unknown;
    Some(match s {
        Slice::Single(i) => (i.clone(), Expr::lit_int(1, loc)),
        Slice::HighLow(hi, lo) => (
            lo.clone(),
            simplify(mk_binop(
                Binop::Plus,
                mk_binop(Binop::Minus, hi.clone(), lo.clone(), loc.clone()),
                Expr::lit_int(1, loc.clone()),
                loc,
            )),
        ),
        Slice::LowWidth(lo, w) => (lo.clone(), w.clone()),
        Slice::HighWidth(hi, w) => (
            simplify(mk_binop(
                Binop::Plus,
                mk_binop(Binop::Minus, hi.clone(), w.clone(), loc.clone()),
                Expr::lit_int(1, loc.clone()),
                loc,
            )),
            w.clone(),
        ),
        Slice::Element(i, w) => (
            simplify(mk_binop(Binop::Mul, i.clone(), w.clone(), loc)),
            w.clone(),
        ),
    })
}

/// Walk formal/actual type pairs, binding each parameter variable that
/// appears in a width, array-size, or constructor-argument slot.
fn synth_params(
    formal: &Ty,
    actual: &Ty,
    params: &HashSet<String>,
    out: &mut HashMap<String, Expr>,
) {
    match (formal, actual) {
        (Ty::Bits { width, .. }, Ty::Bits { width: aw, .. }) => {
            bind_param_expr(width, aw, params, out);
        }
        (
            Ty::Named { name, args, .. },
            Ty::Named {
                name: aname,
                args: aargs,
                ..
            },
        ) if name.root_matches(aname) => {
            for (f, a) in args.iter().zip(aargs.iter()) {
                bind_param_expr(f, a, params, out);
            }
        }
        (
            Ty::Array {
                index: fi,
                element: fe,
                ..
            },
            Ty::Array {
                index: ai,
                element: ae,
                ..
            },
        ) => {
            if let (ArrayIndex::Size(f), ArrayIndex::Size(a)) = (fi, ai) {
                bind_param_expr(f, a, params, out);
            }
            synth_params(fe, ae, params, out);
        }
        (Ty::Tuple { elems: fs, .. }, Ty::Tuple { elems: als, .. }) => {
            for (f, a) in fs.iter().zip(als.iter()) {
                synth_params(f, a, params, out);
            }
        }
        _ => {}
    }
}

fn bind_param_expr(
    formal: &Expr,
    actual: &Expr,
    params: &HashSet<String>,
    out: &mut HashMap<String, Expr>,
) {
    if let Expr::Var { name, .. } = formal {
        if params.contains(name.name()) {
            out.entry(name.name().to_string())
                .or_insert_with(|| actual.clone());
        }
    }
}

/// Constraint-range propagation for integer operators: exact symbolic
/// singletons where possible, numeric interval arithmetic otherwise.
fn propagate_range(op: Binop, lty: &Ty, rty: &Ty, loc: &Loc) -> Option<Ty> {
    let (lcs, rcs) = match (lty, rty) {
        (
            Ty::Integer {
                constraints: Some(l),
                ..
            },
            Ty::Integer {
                constraints: Some(r),
                ..
            },
        ) => (l, r),
        _ => return None,
    };

    // Singleton operands stay exact, which keeps width algebra precise.
    if let ([Constraint::Single(a)], [Constraint::Single(b)]) = (lcs.as_slice(), rcs.as_slice()) {
        let combined = match op {
            Binop::Plus | Binop::Minus | Binop::Mul | Binop::Div | Binop::Pow => simplify(
                mk_binop(op, a.clone(), b.clone(), loc.clone()),
            ),
            _ => return None,
        };
        return Some(Ty::Integer {
            constraints: Some(vec![Constraint::Single(combined)]),
            loc: loc.clone(),
        });
    }

    let lb = numeric_bounds(lcs)?;
    let rb = numeric_bounds(rcs)?;
    let (lo, hi) = match op {
        Binop::Plus => (&lb.0 + &rb.0, &lb.1 + &rb.1),
        Binop::Minus => (&lb.0 - &rb.1, &lb.1 - &rb.0),
        Binop::Mul => {
            let products = [
                &lb.0 * &rb.0,
                &lb.0 * &rb.1,
                &lb.1 * &rb.0,
                &lb.1 * &rb.1,
            ];
            (
                products.iter().min().expect("nonempty").clone(),
                products.iter().max().expect("nonempty").clone(),
            )
        }
        _ => return None,
    };
    Some(Ty::Integer {
        constraints: Some(vec![Constraint::Range(
            lit_big(lo, loc.clone()),
            lit_big(hi, loc.clone()),
        )]),
        loc: loc.clone(),
    })
}

fn numeric_bounds(cs: &[Constraint]) -> Option<(BigInt, BigInt)> {
    let mut lo: Option<BigInt> = None;
    let mut hi: Option<BigInt> = None;
    for c in cs {
        let (a, b) = match c {
            Constraint::Single(e) => {
                let v = match fold_expr(e) {
                    Some(Value::Int(v)) => v,
                    _ => return None,
                };
                (v.clone(), v)
            }
            Constraint::Range(l, h) => {
                let l = match fold_expr(l) {
                    Some(Value::Int(v)) => v,
                    _ => return None,
                };
                let h = match fold_expr(h) {
                    Some(Value::Int(v)) => v,
                    _ => return None,
                };
                (l, h)
            }
        };
        lo = Some(match lo {
            None => a.clone(),
            Some(cur) => cur.min(a.clone()),
        });
        hi = Some(match hi {
            None => b,
            Some(cur) => cur.max(b),
        });
    }
    Some((lo?, hi?))
}
