#![forbid(unsafe_code)]

//! Constant propagation: inline globally declared constants and fold
//! every constant subexpression. Loops are never unrolled.

use asl_ast::fold::{fold_expr, simplify};
use asl_ast::{walk_decls, Action, Declarations, Expr, Pattern, Value, Visitor};

use crate::env::GlobalEnv;
use crate::error::TypeError;
use crate::xform::Transform;

pub struct ConstProp;

struct Propagator<'a> {
    env: &'a GlobalEnv,
}

impl Visitor for Propagator<'_> {
    fn visit_expr(&mut self, e: &Expr) -> Action<Expr> {
        match e {
            Expr::Var { name, loc } => match self.env.consts.get(name.name()) {
                Some(value) if fold_expr(value).is_some() => {
                    let mut inlined = value.clone();
                    if let Some(v) = fold_expr(&inlined) {
                        inlined = Expr::Lit {
                            value: v,
                            loc: loc.clone(),
                        };
                    }
                    Action::Replace(inlined)
                }
                _ => Action::DoChildren,
            },
            _ => Action::ChangeDoChildrenPost(e.clone()),
        }
    }

    fn post_expr(&mut self, e: Expr) -> Expr {
        simplify(e)
    }

    fn visit_pattern(&mut self, p: &Pattern) -> Action<Pattern> {
        if let Pattern::Const(name, loc) = p {
            if let Some(value) = self.env.consts.get(name.name()) {
                if let Some(v @ (Value::Int(_) | Value::Bits(_) | Value::Bool(_))) =
                    fold_expr(value)
                {
                    return Action::Replace(Pattern::Lit(v, loc.clone()));
                }
            }
        }
        Action::DoChildren
    }
}

impl Transform for ConstProp {
    fn name(&self) -> &'static str {
        "xform_constprop"
    }

    fn apply(
        &mut self,
        decls: Declarations,
        env: &mut GlobalEnv,
    ) -> Result<Declarations, TypeError> {
        Ok(walk_decls(&mut Propagator { env }, decls))
    }
}
