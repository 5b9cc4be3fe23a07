#![forbid(unsafe_code)]

//! Capture-free substitution of variables by expressions, used for
//! parameter synthesis, default arguments, and monomorphization.

use std::collections::HashMap;

use crate::ast::{Expr, Stmt, Ty};
use crate::visitor::{walk_expr, walk_stmts, walk_ty, Action, Visitor};

pub struct Substitution<'a> {
    map: &'a HashMap<String, Expr>,
}

impl<'a> Substitution<'a> {
    pub fn new(map: &'a HashMap<String, Expr>) -> Self {
        Self { map }
    }
}

impl Visitor for Substitution<'_> {
    fn visit_expr(&mut self, e: &Expr) -> Action<Expr> {
        match e {
            Expr::Var { name, .. } => match self.map.get(name.name()) {
                Some(replacement) => Action::Replace(replacement.clone()),
                None => Action::DoChildren,
            },
            _ => Action::DoChildren,
        }
    }
}

pub fn subst_expr(map: &HashMap<String, Expr>, e: Expr) -> Expr {
    walk_expr(&mut Substitution::new(map), e)
}

pub fn subst_ty(map: &HashMap<String, Expr>, t: Ty) -> Ty {
    walk_ty(&mut Substitution::new(map), t)
}

pub fn subst_stmts(map: &HashMap<String, Expr>, stmts: Vec<Stmt>) -> Vec<Stmt> {
    walk_stmts(&mut Substitution::new(map), stmts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Binop;
    use crate::loc::Loc;

    #[test]
    fn substitutes_free_variables() {
        let mut map = HashMap::new();
        map.insert("N".to_string(), Expr::lit_int(8, Loc::Unknown));
        let e = Expr::Binop {
            op: Binop::Plus,
            lhs: Box::new(Expr::var("N", Loc::Unknown)),
            rhs: Box::new(Expr::var("M", Loc::Unknown)),
            loc: Loc::Unknown,
        };
        let out = subst_expr(&map, e);
        match out {
            Expr::Binop { lhs, rhs, .. } => {
                assert_eq!(*lhs, Expr::lit_int(8, Loc::Unknown));
                assert_eq!(*rhs, Expr::var("M", Loc::Unknown));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }
}
