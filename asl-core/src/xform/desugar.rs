#![forbid(unsafe_code)]

//! Lower the remaining surface-only forms that need no type
//! information. `with`-changes and register-field accesses were already
//! canonicalised by the typechecker; what is left here is the
//! pattern-test operator `e IN p`, which becomes boolean primitives.

use asl_ast::{
    walk_decls, Action, Binop, Declarations, Expr, Loc, Pattern, Value, Visitor,
};

use crate::env::GlobalEnv;
use crate::error::TypeError;
use crate::xform::{prim_call, Transform};

pub struct Desugar;

struct InLowering<'a> {
    env: &'a GlobalEnv,
    supply: asl_ast::NameSupply,
    error: Option<TypeError>,
}

fn bool_lit(b: bool, loc: Loc) -> Expr {
    Expr::Lit {
        value: Value::Bool(b),
        loc,
    }
}

impl InLowering<'_> {
    fn pattern_test(&mut self, scrutinee: &Expr, p: &Pattern, loc: &Loc) -> Option<Expr> {
        Some(match p {
            Pattern::Wildcard(_) => bool_lit(true, loc.clone()),
            Pattern::Lit(Value::Int(v), _) => prim_call(
                self.env,
                "eq_int",
                vec![],
                vec![
                    scrutinee.clone(),
                    Expr::Lit {
                        value: Value::Int(v.clone()),
                        loc: loc.clone(),
                    },
                ],
                loc.clone(),
            ),
            Pattern::Lit(Value::Bits(b), _) => prim_call(
                self.env,
                "eq_bits",
                vec![Expr::lit_int(b.width as i64, loc.clone())],
                vec![
                    scrutinee.clone(),
                    Expr::Lit {
                        value: Value::Bits(b.clone()),
                        loc: loc.clone(),
                    },
                ],
                loc.clone(),
            ),
            Pattern::Lit(Value::Bool(b), _) => prim_call(
                self.env,
                "eq_bool",
                vec![],
                vec![scrutinee.clone(), bool_lit(*b, loc.clone())],
                loc.clone(),
            ),
            Pattern::Mask(m, _) => prim_call(
                self.env,
                "in_mask",
                vec![Expr::lit_int(m.width as i64, loc.clone())],
                vec![
                    scrutinee.clone(),
                    Expr::Lit {
                        value: Value::Mask(m.clone()),
                        loc: loc.clone(),
                    },
                ],
                loc.clone(),
            ),
            Pattern::Const(name, _) => {
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
                            loc: loc.clone(),
                        },
                    ],
                    loc.clone(),
                )
            }
            Pattern::Range(lo, hi, _) => {
                let low = prim_call(
                    self.env,
                    "le_int",
                    vec![],
                    vec![lo.clone(), scrutinee.clone()],
                    loc.clone(),
                );
                let high = prim_call(
                    self.env,
                    "le_int",
                    vec![],
                    vec![scrutinee.clone(), hi.clone()],
                    loc.clone(),
                );
                Expr::Binop {
                    op: Binop::BoolAnd,
                    lhs: Box::new(low),
                    rhs: Box::new(high),
                    loc: loc.clone(),
                }
            }
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

fn is_replicable(e: &Expr) -> bool {
    matches!(e, Expr::Lit { .. } | Expr::Var { .. })
}

impl Visitor for InLowering<'_> {
    fn visit_expr(&mut self, e: &Expr) -> Action<Expr> {
        if let Expr::In { expr, pattern, loc } = e {
            // Set patterns replicate the scrutinee; bind it first unless
            // it is trivially pure.
            let needs_binding = matches!(&**pattern, Pattern::Set(_, _)) && !is_replicable(expr);
            let (scrutinee, binder) = if needs_binding {
                let name = self.supply.fresh();
                (
                    Expr::Var {
                        name: name.clone(),
                        loc: loc.clone(),
                    },
                    Some(name),
                )
            } else {
                ((**expr).clone(), None)
            };
            match self.pattern_test(&scrutinee, pattern, loc) {
                Some(test) => {
                    let result = match binder {
                        Some(name) => Expr::Let {
                            name,
                            ty: Box::new(asl_ast::Ty::unconstrained_integer(loc.clone())),
                            value: expr.clone(),
                            body: Box::new(test),
                            loc: loc.clone(),
                        },
                        None => test,
                    };
                    return Action::ChangeDoChildrenPost(result);
                }
                None => {
                    self.error.get_or_insert(TypeError::unimplemented(
                        loc,
                        format!("pattern `{pattern}` in an IN expression"),
                    ));
                }
            }
        }
        Action::DoChildren
    }
}

impl Transform for Desugar {
    fn name(&self) -> &'static str {
        "xform_desugar"
    }

    fn apply(
        &mut self,
        decls: Declarations,
        env: &mut GlobalEnv,
    ) -> Result<Declarations, TypeError> {
        let mut v = InLowering {
            env,
            supply: asl_ast::NameSupply::new("__in"),
            error: None,
        };
        let out = walk_decls(&mut v, decls);
        match v.error {
            Some(e) => Err(e),
            None => Ok(out),
        }
    }
}
