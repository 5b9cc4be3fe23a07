#![forbid(unsafe_code)]

//! Slice normalisation: rewrite every slice kind to the single
//! `low +: width` form, lifting the high/low, top, and element forms
//! with width algebra.

use asl_ast::{walk_decls, Action, Declarations, Expr, LExpr, RegField, Slice, Ty, Visitor};

use crate::env::GlobalEnv;
use crate::error::TypeError;
use crate::tc::slice_low_width;
use crate::xform::Transform;

pub struct LowerSlices;

fn normalise(s: Slice) -> Slice {
    match slice_low_width(&s) {
        Some((lo, w)) => Slice::LowWidth(lo, w),
        None => s,
    }
}

struct Normaliser;

impl Visitor for Normaliser {
    fn visit_expr(&mut self, e: &Expr) -> Action<Expr> {
        match e {
            Expr::Slices { base, slices, loc } => {
                Action::ChangeDoChildrenPost(Expr::Slices {
                    base: base.clone(),
                    slices: slices.iter().cloned().map(normalise).collect(),
                    loc: loc.clone(),
                })
            }
            _ => Action::DoChildren,
        }
    }

    fn visit_lexpr(&mut self, l: &LExpr) -> Action<LExpr> {
        match l {
            LExpr::Slices { base, slices, loc } => {
                Action::ChangeDoChildrenPost(LExpr::Slices {
                    base: base.clone(),
                    slices: slices.iter().cloned().map(normalise).collect(),
                    loc: loc.clone(),
                })
            }
            _ => Action::DoChildren,
        }
    }

    fn visit_ty(&mut self, t: &Ty) -> Action<Ty> {
        match t {
            Ty::Bits { width, fields, loc } if !fields.is_empty() => {
                Action::ChangeDoChildrenPost(Ty::Bits {
                    width: width.clone(),
                    fields: fields
                        .iter()
                        .map(|rf| RegField {
                            slices: rf.slices.iter().cloned().map(normalise).collect(),
                            name: rf.name.clone(),
                        })
                        .collect(),
                    loc: loc.clone(),
                })
            }
            _ => Action::DoChildren,
        }
    }
}

impl Transform for LowerSlices {
    fn name(&self) -> &'static str {
        "xform_lower"
    }

    fn apply(
        &mut self,
        decls: Declarations,
        _env: &mut GlobalEnv,
    ) -> Result<Declarations, TypeError> {
        Ok(walk_decls(&mut Normaliser, decls))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use asl_ast::Loc;

    #[test]
    fn all_forms_become_low_width() {
        let lo_w = |s: Slice| match normalise(s) {
            Slice::LowWidth(lo, w) => (format!("{lo}"), format!("{w}")),
            other => panic!("not normalised: {other:?}"),
        };

        // x[7:0] -> x[0 +: 8]
        let (lo, w) = lo_w(Slice::HighLow(
            Expr::lit_int(7, Loc::Unknown),
            Expr::lit_int(0, Loc::Unknown),
        ));
        assert_eq!((lo.as_str(), w.as_str()), ("0", "8"));

        // x[15 -: 8] -> x[8 +: 8]
        let (lo, w) = lo_w(Slice::HighWidth(
            Expr::lit_int(15, Loc::Unknown),
            Expr::lit_int(8, Loc::Unknown),
        ));
        assert_eq!((lo.as_str(), w.as_str()), ("8", "8"));

        // x[2 *: 8] -> x[16 +: 8]
        let (lo, w) = lo_w(Slice::Element(
            Expr::lit_int(2, Loc::Unknown),
            Expr::lit_int(8, Loc::Unknown),
        ));
        assert_eq!((lo.as_str(), w.as_str()), ("16", "8"));

        // x[3] -> x[3 +: 1]
        let (lo, w) = lo_w(Slice::Single(Expr::lit_int(3, Loc::Unknown)));
        assert_eq!((lo.as_str(), w.as_str()), ("3", "1"));
    }
}
