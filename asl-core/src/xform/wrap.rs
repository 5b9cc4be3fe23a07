#![forbid(unsafe_code)]

//! Optional final pass: route every mutable global access through a
//! named thread-local pointer. The emitter prints the rewritten field
//! accesses as `ptr->name`.

use std::collections::HashSet;

use asl_ast::{walk_decls, Action, Declarations, Expr, Ident, LExpr, Visitor};

use crate::env::GlobalEnv;
use crate::error::TypeError;
use crate::xform::Transform;

pub struct WrapGlobals {
    pointer: Ident,
}

impl WrapGlobals {
    pub fn new(pointer: &str) -> Self {
        Self {
            pointer: Ident::new(pointer),
        }
    }
}

struct Wrapper<'a> {
    pointer: &'a Ident,
    globals: &'a HashSet<String>,
}

impl Visitor for Wrapper<'_> {
    fn visit_expr(&mut self, e: &Expr) -> Action<Expr> {
        if let Expr::Var { name, loc } = e {
            if self.globals.contains(name.name()) {
                return Action::Replace(Expr::Field {
                    base: Box::new(Expr::Var {
                        name: self.pointer.clone(),
                        loc: loc.clone(),
                    }),
                    field: name.clone(),
                    loc: loc.clone(),
                });
            }
        }
        Action::DoChildren
    }

    fn visit_lexpr(&mut self, l: &LExpr) -> Action<LExpr> {
        if let LExpr::Var { name, loc } = l {
            if self.globals.contains(name.name()) {
                return Action::Replace(LExpr::Field {
                    base: Box::new(LExpr::Var {
                        name: self.pointer.clone(),
                        loc: loc.clone(),
                    }),
                    field: name.clone(),
                    loc: loc.clone(),
                });
            }
        }
        Action::DoChildren
    }
}

impl Transform for WrapGlobals {
    fn name(&self) -> &'static str {
        "xform_wrap"
    }

    fn apply(
        &mut self,
        decls: Declarations,
        env: &mut GlobalEnv,
    ) -> Result<Declarations, TypeError> {
        let globals: HashSet<String> = env
            .globals
            .iter()
            .filter(|(_, info)| !info.is_constant)
            .map(|(name, _)| name.clone())
            .collect();
        let mut wrapper = Wrapper {
            pointer: &self.pointer,
            globals: &globals,
        };
        Ok(walk_decls(&mut wrapper, decls))
    }
}
