#![forbid(unsafe_code)]

//! Case lowering: a `case` over an integer or bitvector discriminant
//! becomes an `if/elsif` chain of equality tests. An omitted default
//! becomes a call to the unmatched-case error primitive.

use asl_ast::{
    walk_decls, Binop, Declarations, Expr, Loc, Pattern, Stmt, Value, Visitor,
};

use crate::env::GlobalEnv;
use crate::error::TypeError;
use crate::xform::{prim_call, Transform};

pub struct LowerCase;

struct Rewriter<'a> {
    env: &'a GlobalEnv,
    error: Option<TypeError>,
}

impl Rewriter<'_> {
    fn pattern_test(&mut self, scrutinee: &Expr, p: &Pattern, loc: &Loc) -> Option<Expr> {
        Some(match p {
            Pattern::Wildcard(_) => Expr::Lit {
                value: Value::Bool(true),
                loc: loc.clone(),
            },
            Pattern::Lit(Value::Int(v), ploc) => prim_call(
                self.env,
                "eq_int",
                vec![],
                vec![
                    scrutinee.clone(),
                    Expr::Lit {
                        value: Value::Int(v.clone()),
                        loc: ploc.clone(),
                    },
                ],
                loc.clone(),
            ),
            Pattern::Lit(Value::Bits(b), ploc) => prim_call(
                self.env,
                "eq_bits",
                vec![Expr::lit_int(b.width as i64, ploc.clone())],
                vec![
                    scrutinee.clone(),
                    Expr::Lit {
                        value: Value::Bits(b.clone()),
                        loc: ploc.clone(),
                    },
                ],
                loc.clone(),
            ),
            Pattern::Lit(Value::Bool(b), ploc) => prim_call(
                self.env,
                "eq_bool",
                vec![],
                vec![
                    scrutinee.clone(),
                    Expr::Lit {
                        value: Value::Bool(*b),
                        loc: ploc.clone(),
                    },
                ],
                loc.clone(),
            ),
            Pattern::Mask(m, ploc) => prim_call(
                self.env,
                "in_mask",
                vec![Expr::lit_int(m.width as i64, ploc.clone())],
                vec![
                    scrutinee.clone(),
                    Expr::Lit {
                        value: Value::Mask(m.clone()),
                        loc: ploc.clone(),
                    },
                ],
                loc.clone(),
            ),
            Pattern::Const(name, ploc) => {
                let base = if self.env.enum_members.contains_key(name.name()) {
                    "eq_enum"
                } else {
                    "eq_int"
                };
                prim_call(
                    self.env,
                    base,
                    vec![],
                    vec![
                        scrutinee.clone(),
                        Expr::Var {
                            name: name.clone(),
                            loc: ploc.clone(),
                        },
                    ],
                    loc.clone(),
                )
            }
            Pattern::Range(lo, hi, _) => Expr::Binop {
                op: Binop::BoolAnd,
                lhs: Box::new(prim_call(
                    self.env,
                    "le_int",
                    vec![],
                    vec![lo.clone(), scrutinee.clone()],
                    loc.clone(),
                )),
                rhs: Box::new(prim_call(
                    self.env,
                    "le_int",
                    vec![],
                    vec![scrutinee.clone(), hi.clone()],
                    loc.clone(),
                )),
                loc: loc.clone(),
            },
            Pattern::Set(ps, _) => {
                let mut acc: Option<Expr> = None;
                for p in ps {
                    let test = self.pattern_test(scrutinee, p, loc)?;
                    acc = Some(match acc {
                        None => test,
                        Some(prev) => Expr::Binop {
                            op: Binop::BoolOr,
                            lhs: Box::new(prev),
                            rhs: Box::new(test),
                            loc: loc.clone(),
                        },
                    });
                }
                acc?
            }
            Pattern::Single(e, _) => prim_call(
                self.env,
                "eq_int",
                vec![],
                vec![scrutinee.clone(), e.clone()],
                loc.clone(),
            ),
            _ => return None,
        })
    }
}

impl Visitor for Rewriter<'_> {
    fn map_stmt(&mut self, s: Stmt) -> Vec<Stmt> {
        let Stmt::Case {
            expr,
            alts,
            default,
            loc,
        } = s
        else {
            return vec![s];
        };

        let mut arms = Vec::with_capacity(alts.len());
        for alt in alts {
            let mut cond: Option<Expr> = None;
            for p in &alt.patterns {
                match self.pattern_test(&expr, p, &alt.loc) {
                    Some(test) => {
                        cond = Some(match cond {
                            None => test,
                            Some(prev) => Expr::Binop {
                                op: Binop::BoolOr,
                                lhs: Box::new(prev),
                                rhs: Box::new(test),
                                loc: alt.loc.clone(),
                            },
                        });
                    }
                    None => {
                        self.error.get_or_insert(TypeError::unimplemented(
                            &alt.loc,
                            format!("pattern `{p}` in case lowering"),
                        ));
                        return vec![];
                    }
                }
            }
            let mut cond = cond.unwrap_or(Expr::Lit {
                value: Value::Bool(true),
                loc: alt.loc.clone(),
            });
            if let Some(guard) = alt.guard {
                cond = Expr::Binop {
                    op: Binop::BoolAnd,
                    lhs: Box::new(cond),
                    rhs: Box::new(guard),
                    loc: alt.loc.clone(),
                };
            }
            arms.push((cond, alt.body));
        }

        let els = match default {
            Some(d) => d,
            None => vec![Stmt::Apply {
                name: crate::xform::prim(self.env, "__unmatched_case"),
                params: vec![],
                args: vec![],
                throws: asl_ast::Throws::No,
                loc: loc.clone(),
            }],
        };

        vec![Stmt::If { arms, els, loc }]
    }
}

impl Transform for LowerCase {
    fn name(&self) -> &'static str {
        "xform_case"
    }

    fn apply(
        &mut self,
        decls: Declarations,
        env: &mut GlobalEnv,
    ) -> Result<Declarations, TypeError> {
        let mut rewriter = Rewriter { env, error: None };
        let out = walk_decls(&mut rewriter, decls);
        match rewriter.error {
            Some(e) => Err(e),
            None => Ok(out),
        }
    }
}
