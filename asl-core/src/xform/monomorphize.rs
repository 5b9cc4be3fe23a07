#![forbid(unsafe_code)]

//! Monomorphization: every call whose width parameters are provably
//! integer literals is redirected to a specialised clone of the callee
//! with those parameters substituted. The process cascades through the
//! clones; termination holds because each distinct (callee, width-tuple)
//! pair is cloned exactly once.

use std::collections::HashMap;

use asl_ast::fold::{fold_expr, simplify};
use asl_ast::subst::{subst_stmts, subst_ty};
use asl_ast::{
    walk_stmts, Action, Decl, Declarations, Expr, FunSig, Ident, Stmt, Value, Visitor,
};
use num_bigint::BigInt;
use num_traits::Signed;

use crate::env::GlobalEnv;
use crate::error::TypeError;
use crate::xform::Transform;

pub struct Monomorphize {
    /// (tagged callee, width tuple) -> clone name.
    done: HashMap<(Ident, Vec<BigInt>), Ident>,
}

impl Monomorphize {
    pub fn new() -> Self {
        Self {
            done: HashMap::new(),
        }
    }
}

impl Default for Monomorphize {
    fn default() -> Self {
        Self::new()
    }
}

fn literal_params(params: &[Expr]) -> Option<Vec<BigInt>> {
    if params.is_empty() {
        return None;
    }
    params
        .iter()
        .map(|p| match fold_expr(p) {
            Some(Value::Int(v)) => Some(v),
            _ => None,
        })
        .collect()
}

/// A stable name suffix derived from the concrete widths.
fn clone_name(base: &Ident, widths: &[BigInt]) -> String {
    let mut out = base.name().to_string();
    for w in widths {
        out.push('_');
        if w.is_negative() {
            out.push('m');
            out.push_str(&(-w).to_string());
        } else {
            out.push_str(&w.to_string());
        }
    }
    out
}

struct Specialiser<'a> {
    env: &'a mut GlobalEnv,
    defs: &'a HashMap<Ident, (FunSig, Vec<Stmt>)>,
    done: &'a mut HashMap<(Ident, Vec<BigInt>), Ident>,
    /// Clones created during this walk, queued for their own rewrite.
    created: Vec<(Ident, FunSig, Vec<Stmt>)>,
}

impl Specialiser<'_> {
    fn specialise(&mut self, callee: &Ident, widths: Vec<BigInt>, loc: &asl_ast::Loc) -> Ident {
        let key = (callee.clone(), widths.clone());
        if let Some(existing) = self.done.get(&key) {
            return existing.clone();
        }
        let (sig, body) = self.defs.get(callee).expect("caller checked").clone();

        let map: HashMap<String, Expr> = sig
            .params
            .iter()
            .zip(widths.iter())
            .map(|(p, w)| {
                (
                    p.name.name().to_string(),
                    Expr::Lit {
                        value: Value::Int(w.clone()),
                        loc: loc.clone(),
                    },
                )
            })
            .collect();

        let mut new_sig = sig.clone();
        new_sig.params = Vec::new();
        new_sig.name = Ident::new(&clone_name(callee, &widths));
        new_sig.args = new_sig
            .args
            .into_iter()
            .map(|a| asl_ast::FunArg {
                name: a.name,
                ty: subst_ty(&map, a.ty),
                default: a.default.map(|e| simplify(asl_ast::subst::subst_expr(&map, e))),
            })
            .collect();
        new_sig.rty = new_sig.rty.map(|t| subst_ty(&map, t));

        // Cloned declarations get a fresh tag, never a reused one.
        new_sig.name = self.env.add_fun(new_sig.clone());

        let new_body = subst_stmts(&map, body);
        self.done.insert(key, new_sig.name.clone());
        self.created
            .push((new_sig.name.clone(), new_sig.clone(), new_body));
        new_sig.name
    }

    fn try_rewrite(&mut self, name: &Ident, params: &[Expr], loc: &asl_ast::Loc) -> Option<Ident> {
        if !self.defs.contains_key(name) {
            return None;
        }
        let widths = literal_params(params)?;
        Some(self.specialise(name, widths, loc))
    }
}

impl Visitor for Specialiser<'_> {
    fn visit_expr(&mut self, e: &Expr) -> Action<Expr> {
        if let Expr::Apply {
            name,
            params,
            args,
            throws,
            loc,
        } = e
        {
            if let Some(new_name) = self.try_rewrite(name, params, loc) {
                return Action::ChangeDoChildrenPost(Expr::Apply {
                    name: new_name,
                    params: Vec::new(),
                    args: args.clone(),
                    throws: *throws,
                    loc: loc.clone(),
                });
            }
        }
        Action::DoChildren
    }

    fn visit_stmt(&mut self, s: &Stmt) -> Action<Stmt> {
        if let Stmt::Apply {
            name,
            params,
            args,
            throws,
            loc,
        } = s
        {
            if let Some(new_name) = self.try_rewrite(name, params, loc) {
                return Action::ChangeDoChildrenPost(Stmt::Apply {
                    name: new_name,
                    params: Vec::new(),
                    args: args.clone(),
                    throws: *throws,
                    loc: loc.clone(),
                });
            }
        }
        Action::DoChildren
    }
}

impl Transform for Monomorphize {
    fn name(&self) -> &'static str {
        "xform_monomorphize"
    }

    fn apply(
        &mut self,
        decls: Declarations,
        env: &mut GlobalEnv,
    ) -> Result<Declarations, TypeError> {
        // Width-polymorphic definitions eligible for cloning.
        let mut defs: HashMap<Ident, (FunSig, Vec<Stmt>)> = HashMap::new();
        for d in &decls {
            if let Decl::FunDefn { sig, body, .. } = d {
                if !sig.params.is_empty() {
                    defs.insert(sig.name.clone(), (sig.clone(), body.clone()));
                }
            }
        }

        let mut out = Vec::with_capacity(decls.len());
        let mut clones: Vec<Decl> = Vec::new();

        for d in decls {
            match d {
                Decl::FunDefn { sig, body, loc } => {
                    let mut sp = Specialiser {
                        env: &mut *env,
                        defs: &defs,
                        done: &mut self.done,
                        created: Vec::new(),
                    };
                    let body = walk_stmts(&mut sp, body);
                    let mut queue = std::mem::take(&mut sp.created);
                    // Cascade: each clone's own polymorphic calls get
                    // specialised in turn.
                    while let Some((_name, csig, cbody)) = queue.pop() {
                        let cbody = walk_stmts(&mut sp, cbody);
                        queue.append(&mut sp.created);
                        clones.push(Decl::FunDefn {
                            sig: csig,
                            body: cbody,
                            loc: loc.clone(),
                        });
                    }
                    out.push(Decl::FunDefn { sig, body, loc });
                }
                other => out.push(other),
            }
        }

        out.append(&mut clones);
        Ok(out)
    }
}

/// Verify that no reachable definition still makes a width-polymorphic
/// call, and point at the topmost offender.
pub struct CheckMonomorphization;

struct PolyScan<'a> {
    defs: &'a HashMap<Ident, FunSig>,
    offender: Option<(Ident, Ident, asl_ast::Loc)>,
    current: Ident,
}

impl Visitor for PolyScan<'_> {
    fn visit_expr(&mut self, e: &Expr) -> Action<Expr> {
        if let Expr::Apply {
            name, params, loc, ..
        } = e
        {
            if !params.is_empty()
                && self.defs.contains_key(name)
                && self.offender.is_none()
            {
                self.offender = Some((self.current.clone(), name.clone(), loc.clone()));
            }
        }
        Action::DoChildren
    }

    fn visit_stmt(&mut self, s: &Stmt) -> Action<Stmt> {
        if let Stmt::Apply {
            name, params, loc, ..
        } = s
        {
            if !params.is_empty()
                && self.defs.contains_key(name)
                && self.offender.is_none()
            {
                self.offender = Some((self.current.clone(), name.clone(), loc.clone()));
            }
        }
        Action::DoChildren
    }
}

impl Transform for CheckMonomorphization {
    fn name(&self) -> &'static str {
        "check_monomorphization"
    }

    fn apply(
        &mut self,
        decls: Declarations,
        _env: &mut GlobalEnv,
    ) -> Result<Declarations, TypeError> {
        let mut defs: HashMap<Ident, FunSig> = HashMap::new();
        for d in &decls {
            if let Decl::FunDefn { sig, .. } = d {
                if !sig.params.is_empty() {
                    defs.insert(sig.name.clone(), sig.clone());
                }
            }
        }
        for d in &decls {
            if let Decl::FunDefn { sig, body, .. } = d {
                let mut scan = PolyScan {
                    defs: &defs,
                    offender: None,
                    current: sig.name.clone(),
                };
                let _ = walk_stmts(&mut scan, body.clone());
                if let Some((caller, callee, loc)) = scan.offender {
                    return Err(TypeError::type_error(
                        &loc,
                        format!(
                            "`{caller}` still calls width-polymorphic `{callee}`; \
                             its width parameters are not constant at this call site"
                        ),
                    ));
                }
            }
        }
        Ok(decls)
    }
}
