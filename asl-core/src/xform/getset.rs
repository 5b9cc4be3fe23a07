#![forbid(unsafe_code)]

//! Getter/setter conversion: assignments through resolved accessor pairs
//! become plain setter calls, with a read-modify-write temporary when
//! only part of the accessed value changes.

use asl_ast::subst::subst_ty;
use asl_ast::{
    walk_decls, DeclTarget, Declarations, Expr, LExpr, NameSupply, Stmt, Throws, Ty, Visitor,
};
use std::collections::HashMap;

use crate::env::GlobalEnv;
use crate::error::TypeError;
use crate::xform::Transform;

pub struct GetSet {
    supply: NameSupply,
}

impl GetSet {
    pub fn new() -> Self {
        Self {
            supply: NameSupply::new("__rmw"),
        }
    }
}

impl Default for GetSet {
    fn default() -> Self {
        Self::new()
    }
}

struct Rewriter<'a> {
    env: &'a GlobalEnv,
    supply: &'a mut NameSupply,
    error: Option<TypeError>,
}

/// Search an lvalue chain for a `ReadWrite` base; return the accessor
/// node and the chain rebuilt around a replacement variable.
fn split_accessor(l: LExpr, replacement: &asl_ast::Ident) -> (Option<LExpr>, LExpr) {
    match l {
        LExpr::ReadWrite { .. } => {
            let loc = l.loc().clone();
            (
                Some(l),
                LExpr::Var {
                    name: replacement.clone(),
                    loc,
                },
            )
        }
        LExpr::Field { base, field, loc } => {
            let (acc, base) = split_accessor(*base, replacement);
            (
                acc,
                LExpr::Field {
                    base: Box::new(base),
                    field,
                    loc,
                },
            )
        }
        LExpr::Fields { base, fields, loc } => {
            let (acc, base) = split_accessor(*base, replacement);
            (
                acc,
                LExpr::Fields {
                    base: Box::new(base),
                    fields,
                    loc,
                },
            )
        }
        LExpr::Index { base, index, loc } => {
            let (acc, base) = split_accessor(*base, replacement);
            (
                acc,
                LExpr::Index {
                    base: Box::new(base),
                    index,
                    loc,
                },
            )
        }
        LExpr::Slices { base, slices, loc } => {
            let (acc, base) = split_accessor(*base, replacement);
            (
                acc,
                LExpr::Slices {
                    base: Box::new(base),
                    slices,
                    loc,
                },
            )
        }
        other => (None, other),
    }
}

impl Rewriter<'_> {
    /// The value type an accessor reads and writes, with its synthesized
    /// parameters substituted in.
    fn accessor_value_ty(&self, getter: &asl_ast::Ident, params: &[Expr]) -> Option<Ty> {
        let sig = self.env.fun_by_ident(getter)?;
        let map: HashMap<String, Expr> = sig
            .params
            .iter()
            .map(|p| p.name.name().to_string())
            .zip(params.iter().cloned())
            .collect();
        sig.rty.clone().map(|t| subst_ty(&map, t))
    }
}

impl Visitor for Rewriter<'_> {
    fn map_stmt(&mut self, s: Stmt) -> Vec<Stmt> {
        let Stmt::Assign { lhs, rhs, loc } = s else {
            return vec![s];
        };

        // Whole-value accessor write: a single setter call.
        match lhs {
            LExpr::ReadWrite {
                setter,
                params,
                mut args,
                throws,
                ..
            } => {
                args.push(rhs);
                return vec![Stmt::Apply {
                    name: setter,
                    params,
                    args,
                    throws,
                    loc,
                }];
            }
            LExpr::Write {
                setter,
                params,
                mut args,
                throws,
                ..
            } => {
                args.push(rhs);
                return vec![Stmt::Apply {
                    name: setter,
                    params,
                    args,
                    throws,
                    loc,
                }];
            }
            other => {
                // Partial update through an accessor: read into a
                // temporary, update it, write it back.
                let tmp = self.supply.fresh();
                let (accessor, rebuilt) = split_accessor(other, &tmp);
                match accessor {
                    None => {
                        return vec![Stmt::Assign {
                            lhs: rebuilt,
                            rhs,
                            loc,
                        }]
                    }
                    Some(LExpr::ReadWrite {
                        getter,
                        setter,
                        params,
                        args,
                        throws,
                        ..
                    }) => {
                        let vty = match self.accessor_value_ty(&getter, &params) {
                            Some(t) => t,
                            None => {
                                self.error.get_or_insert(TypeError::internal(
                                    &loc,
                                    format!("accessor `{getter}` has no known value type"),
                                ));
                                return vec![];
                            }
                        };
                        let read = Expr::Apply {
                            name: getter,
                            params: params.clone(),
                            args: args.clone(),
                            throws,
                            loc: loc.clone(),
                        };
                        let mut out = vec![Stmt::VarDecl {
                            constant: false,
                            ty: Some(vty),
                            target: DeclTarget::Single(tmp.clone()),
                            init: read,
                            loc: loc.clone(),
                        }];
                        out.push(Stmt::Assign {
                            lhs: rebuilt,
                            rhs,
                            loc: loc.clone(),
                        });
                        let mut wargs = args;
                        wargs.push(Expr::Var {
                            name: tmp,
                            loc: loc.clone(),
                        });
                        out.push(Stmt::Apply {
                            name: setter,
                            params,
                            args: wargs,
                            throws: Throws::No,
                            loc,
                        });
                        return out;
                    }
                    Some(other) => {
                        self.error.get_or_insert(TypeError::internal(
                            &loc,
                            format!("unexpected accessor shape `{other}`"),
                        ));
                        return vec![];
                    }
                }
            }
        }
    }
}

impl Transform for GetSet {
    fn name(&self) -> &'static str {
        "xform_getset"
    }

    fn apply(
        &mut self,
        decls: Declarations,
        env: &mut GlobalEnv,
    ) -> Result<Declarations, TypeError> {
        let mut rewriter = Rewriter {
            env,
            supply: &mut self.supply,
            error: None,
        };
        let out = walk_decls(&mut rewriter, decls);
        match rewriter.error {
            Some(e) => Err(e),
            None => Ok(out),
        }
    }
}
