#![forbid(unsafe_code)]

//! Expand every type-alias reference to its definition and drop the
//! alias declarations, so later passes only see structural types.

use std::collections::HashMap;

use asl_ast::subst::subst_ty;
use asl_ast::{walk_decl, Action, Decl, Declarations, Expr, Ty, Visitor};

use crate::env::{GlobalEnv, TypeDef};
use crate::error::TypeError;
use crate::xform::Transform;

pub struct NamedType;

struct Expander<'a> {
    env: &'a GlobalEnv,
}

impl Visitor for Expander<'_> {
    fn visit_ty(&mut self, t: &Ty) -> Action<Ty> {
        if let Ty::Named { name, args, .. } = t {
            if let Some(TypeDef::Alias { params, ty }) = self.env.types.get(name.name()) {
                if params.len() == args.len() {
                    let map: HashMap<String, Expr> = params
                        .iter()
                        .map(|p| p.name().to_string())
                        .zip(args.iter().cloned())
                        .collect();
                    // Re-walk the expansion: aliases may chain.
                    return Action::ChangeDoChildrenPost(subst_ty(&map, ty.clone()));
                }
            }
        }
        Action::DoChildren
    }
}

impl Transform for NamedType {
    fn name(&self) -> &'static str {
        "xform_named_type"
    }

    fn apply(
        &mut self,
        decls: Declarations,
        env: &mut GlobalEnv,
    ) -> Result<Declarations, TypeError> {
        let mut out = Vec::with_capacity(decls.len());
        for d in decls {
            if matches!(d, Decl::TypeAlias { .. }) {
                continue;
            }
            let mut expander = Expander { env };
            out.push(walk_decl(&mut expander, d));
        }
        Ok(out)
    }
}
