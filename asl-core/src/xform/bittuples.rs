#![forbid(unsafe_code)]

//! Bit-tuple lowering: multi-part bitvector assignments and declarations
//! become a temporary plus sequential slice operations. The leftmost
//! element is the most significant, matching concatenation.

use asl_ast::fold::simplify;
use asl_ast::{
    walk_decls, Binop, DeclTarget, Declarations, Expr, LExpr, NameSupply, Slice, Stmt, Ty,
    Visitor,
};

use crate::env::GlobalEnv;
use crate::error::TypeError;
use crate::xform::Transform;

pub struct BitTuples {
    supply: NameSupply,
}

impl BitTuples {
    pub fn new() -> Self {
        Self {
            supply: NameSupply::new("__bt"),
        }
    }
}

impl Default for BitTuples {
    fn default() -> Self {
        Self::new()
    }
}

fn sum_widths(widths: &[Expr], loc: &asl_ast::Loc) -> Expr {
    let mut total: Option<Expr> = None;
    for w in widths {
        total = Some(match total {
            None => w.clone(),
            Some(acc) => Expr::Binop {
                op: Binop::Plus,
                lhs: Box::new(acc),
                rhs: Box::new(w.clone()),
                loc: loc.clone(),
            },
        });
    }
    simplify(total.unwrap_or_else(|| Expr::lit_int(0, loc.clone())))
}

impl Visitor for BitTuples {
    fn map_stmt(&mut self, s: Stmt) -> Vec<Stmt> {
        match s {
            Stmt::Assign {
                lhs: LExpr::BitTuple { widths, elems, loc: tloc },
                rhs,
                loc,
            } => {
                let total = sum_widths(&widths, &tloc);
                let tmp = self.supply.fresh();
                let mut out = vec![Stmt::VarDecl {
                    constant: true,
                    ty: Some(Ty::bits(total.clone(), tloc.clone())),
                    target: DeclTarget::Single(tmp.clone()),
                    init: rhs,
                    loc: loc.clone(),
                }];
                let mut offset = total;
                for (elem, w) in elems.into_iter().zip(widths.into_iter()) {
                    offset = simplify(Expr::Binop {
                        op: Binop::Minus,
                        lhs: Box::new(offset),
                        rhs: Box::new(w.clone()),
                        loc: tloc.clone(),
                    });
                    out.push(Stmt::Assign {
                        lhs: elem,
                        rhs: Expr::Slices {
                            base: Box::new(Expr::Var {
                                name: tmp.clone(),
                                loc: tloc.clone(),
                            }),
                            slices: vec![Slice::LowWidth(offset.clone(), w)],
                            loc: tloc.clone(),
                        },
                        loc: loc.clone(),
                    });
                }
                out
            }
            Stmt::VarDecl {
                constant,
                ty: Some(elem_ty),
                target: DeclTarget::BitTuple(names),
                init,
                loc,
            } => {
                let width = match &elem_ty {
                    Ty::Bits { width, .. } => (**width).clone(),
                    // Shape already rejected by the typechecker.
                    _ => return vec![Stmt::VarDecl {
                        constant,
                        ty: Some(elem_ty),
                        target: DeclTarget::BitTuple(names),
                        init,
                        loc,
                    }],
                };
                let count = names.len() as i64;
                let total = simplify(Expr::Binop {
                    op: Binop::Mul,
                    lhs: Box::new(width.clone()),
                    rhs: Box::new(Expr::lit_int(count, loc.clone())),
                    loc: loc.clone(),
                });
                let tmp = self.supply.fresh();
                let mut out = vec![Stmt::VarDecl {
                    constant: true,
                    ty: Some(Ty::bits(total.clone(), loc.clone())),
                    target: DeclTarget::Single(tmp.clone()),
                    init,
                    loc: loc.clone(),
                }];
                let mut offset = total;
                for name in names {
                    offset = simplify(Expr::Binop {
                        op: Binop::Minus,
                        lhs: Box::new(offset),
                        rhs: Box::new(width.clone()),
                        loc: loc.clone(),
                    });
                    out.push(Stmt::VarDecl {
                        constant,
                        ty: Some(elem_ty.clone()),
                        target: DeclTarget::Single(name),
                        init: Expr::Slices {
                            base: Box::new(Expr::Var {
                                name: tmp.clone(),
                                loc: loc.clone(),
                            }),
                            slices: vec![Slice::LowWidth(offset.clone(), width.clone())],
                            loc: loc.clone(),
                        },
                        loc: loc.clone(),
                    });
                }
                out
            }
            other => vec![other],
        }
    }
}

impl Transform for BitTuples {
    fn name(&self) -> &'static str {
        "xform_bittuples"
    }

    fn apply(
        &mut self,
        decls: Declarations,
        _env: &mut GlobalEnv,
    ) -> Result<Declarations, TypeError> {
        Ok(walk_decls(self, decls))
    }
}
