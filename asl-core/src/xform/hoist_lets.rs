#![forbid(unsafe_code)]

//! Let hoisting: lift every let-expression to a statement-position
//! declaration. Lets only exist because earlier passes and the
//! runtime-check inserter created them, and they bind pure values, so
//! lifting them in front of the enclosing statement is sound.

use asl_ast::{CaseAlt, CatchArm, Decl, Declarations, Expr, LExpr, Slice, Stmt};

use crate::env::GlobalEnv;
use crate::error::TypeError;
use crate::xform::Transform;

pub struct HoistLets {
    _private: (),
}

impl HoistLets {
    pub fn new() -> Self {
        Self { _private: () }
    }
}

impl Default for HoistLets {
    fn default() -> Self {
        Self::new()
    }
}

/// Strip let-bindings out of an expression, emitting them as constant
/// declarations onto `out`.
fn strip_expr(e: Expr, out: &mut Vec<Stmt>) -> Expr {
    match e {
        Expr::Let {
            name,
            ty,
            value,
            body,
            loc,
        } => {
            let value = strip_expr(*value, out);
            out.push(Stmt::VarDecl {
                constant: true,
                ty: Some(*ty),
                target: asl_ast::DeclTarget::Single(name),
                init: value,
                loc,
            });
            strip_expr(*body, out)
        }
        Expr::Assert { cond, body, loc } => {
            let cond = strip_expr(*cond, out);
            out.push(Stmt::Assert { cond, loc });
            strip_expr(*body, out)
        }
        Expr::Field { base, field, loc } => Expr::Field {
            base: Box::new(strip_expr(*base, out)),
            field,
            loc,
        },
        Expr::Fields { base, fields, loc } => Expr::Fields {
            base: Box::new(strip_expr(*base, out)),
            fields,
            loc,
        },
        Expr::Index { base, index, loc } => Expr::Index {
            base: Box::new(strip_expr(*base, out)),
            index: Box::new(strip_expr(*index, out)),
            loc,
        },
        Expr::Slices { base, slices, loc } => Expr::Slices {
            base: Box::new(strip_expr(*base, out)),
            slices: slices
                .into_iter()
                .map(|s| strip_slice(s, out))
                .collect(),
            loc,
        },
        Expr::Record {
            name,
            args,
            fields,
            loc,
        } => Expr::Record {
            name,
            args: args.into_iter().map(|e| strip_expr(e, out)).collect(),
            fields: fields
                .into_iter()
                .map(|(n, e)| (n, strip_expr(e, out)))
                .collect(),
            loc,
        },
        Expr::Apply {
            name,
            params,
            args,
            throws,
            loc,
        } => Expr::Apply {
            name,
            params: params.into_iter().map(|e| strip_expr(e, out)).collect(),
            args: args.into_iter().map(|e| strip_expr(e, out)).collect(),
            throws,
            loc,
        },
        Expr::Tuple { elems, loc } => Expr::Tuple {
            elems: elems.into_iter().map(|e| strip_expr(e, out)).collect(),
            loc,
        },
        Expr::Concat { widths, elems, loc } => Expr::Concat {
            widths,
            elems: elems.into_iter().map(|e| strip_expr(e, out)).collect(),
            loc,
        },
        Expr::Unop { op, operand, loc } => Expr::Unop {
            op,
            operand: Box::new(strip_expr(*operand, out)),
            loc,
        },
        Expr::Binop { op, lhs, rhs, loc } => Expr::Binop {
            op,
            lhs: Box::new(strip_expr(*lhs, out)),
            rhs: Box::new(strip_expr(*rhs, out)),
            loc,
        },
        Expr::AsConstraint {
            expr,
            constraints,
            loc,
        } => Expr::AsConstraint {
            expr: Box::new(strip_expr(*expr, out)),
            constraints,
            loc,
        },
        Expr::AsType { expr, ty, loc } => Expr::AsType {
            expr: Box::new(strip_expr(*expr, out)),
            ty,
            loc,
        },
        // Conditional arms must not evaluate eagerly; lets inside them
        // stay put and are handled when the conditional itself is
        // lowered to statements.
        other @ (Expr::If { .. }
        | Expr::Lit { .. }
        | Expr::Var { .. }
        | Expr::Call { .. }
        | Expr::WithChanges { .. }
        | Expr::ArrayInit { .. }
        | Expr::Unknown { .. }
        | Expr::In { .. }) => other,
    }
}

fn strip_slice(s: Slice, out: &mut Vec<Stmt>) -> Slice {
    match s {
        Slice::Single(e) => Slice::Single(strip_expr(e, out)),
        Slice::HighLow(a, b) => Slice::HighLow(strip_expr(a, out), strip_expr(b, out)),
        Slice::LowWidth(a, b) => Slice::LowWidth(strip_expr(a, out), strip_expr(b, out)),
        Slice::HighWidth(a, b) => Slice::HighWidth(strip_expr(a, out), strip_expr(b, out)),
        Slice::Element(a, b) => Slice::Element(strip_expr(a, out), strip_expr(b, out)),
    }
}

fn strip_lexpr(l: LExpr, out: &mut Vec<Stmt>) -> LExpr {
    match l {
        LExpr::Field { base, field, loc } => LExpr::Field {
            base: Box::new(strip_lexpr(*base, out)),
            field,
            loc,
        },
        LExpr::Fields { base, fields, loc } => LExpr::Fields {
            base: Box::new(strip_lexpr(*base, out)),
            fields,
            loc,
        },
        LExpr::Index { base, index, loc } => LExpr::Index {
            base: Box::new(strip_lexpr(*base, out)),
            index: Box::new(strip_expr(*index, out)),
            loc,
        },
        LExpr::Slices { base, slices, loc } => LExpr::Slices {
            base: Box::new(strip_lexpr(*base, out)),
            slices: slices
                .into_iter()
                .map(|s| strip_slice(s, out))
                .collect(),
            loc,
        },
        LExpr::BitTuple { widths, elems, loc } => LExpr::BitTuple {
            widths,
            elems: elems
                .into_iter()
                .map(|l| strip_lexpr(l, out))
                .collect(),
            loc,
        },
        LExpr::Tuple { elems, loc } => LExpr::Tuple {
            elems: elems
                .into_iter()
                .map(|l| strip_lexpr(l, out))
                .collect(),
            loc,
        },
        LExpr::ReadWrite {
            getter,
            setter,
            params,
            args,
            throws,
            loc,
        } => LExpr::ReadWrite {
            getter,
            setter,
            params,
            args: args.into_iter().map(|e| strip_expr(e, out)).collect(),
            throws,
            loc,
        },
        LExpr::Write {
            setter,
            params,
            args,
            throws,
            loc,
        } => LExpr::Write {
            setter,
            params,
            args: args.into_iter().map(|e| strip_expr(e, out)).collect(),
            throws,
            loc,
        },
        other => other,
    }
}

fn hoist_stmts(stmts: Vec<Stmt>) -> Vec<Stmt> {
    let mut out = Vec::with_capacity(stmts.len());
    for s in stmts {
        hoist_stmt(s, &mut out);
    }
    out
}

fn hoist_stmt(s: Stmt, out: &mut Vec<Stmt>) {
    match s {
        Stmt::VarDecl {
            constant,
            ty,
            target,
            init,
            loc,
        } => {
            let init = strip_expr(init, out);
            out.push(Stmt::VarDecl {
                constant,
                ty,
                target,
                init,
                loc,
            });
        }
        Stmt::Assign { lhs, rhs, loc } => {
            let lhs = strip_lexpr(lhs, out);
            let rhs = strip_expr(rhs, out);
            out.push(Stmt::Assign { lhs, rhs, loc });
        }
        Stmt::Apply {
            name,
            params,
            args,
            throws,
            loc,
        } => {
            let args = args.into_iter().map(|e| strip_expr(e, out)).collect();
            out.push(Stmt::Apply {
                name,
                params,
                args,
                throws,
                loc,
            });
        }
        Stmt::Return { value, loc } => {
            let value = value.map(|e| strip_expr(e, out));
            out.push(Stmt::Return { value, loc });
        }
        Stmt::Assert { cond, loc } => {
            let cond = strip_expr(cond, out);
            out.push(Stmt::Assert { cond, loc });
        }
        Stmt::Throw { exn, loc } => {
            let exn = strip_expr(exn, out);
            out.push(Stmt::Throw { exn, loc });
        }
        Stmt::Try {
            body,
            bind,
            arms,
            default,
            loc,
        } => out.push(Stmt::Try {
            body: hoist_stmts(body),
            bind,
            arms: arms
                .into_iter()
                .map(|a| CatchArm {
                    exn: a.exn,
                    body: hoist_stmts(a.body),
                    loc: a.loc,
                })
                .collect(),
            default: default.map(hoist_stmts),
            loc,
        }),
        Stmt::If { arms, els, loc } => {
            let arms = arms
                .into_iter()
                .map(|(c, body)| (strip_expr(c, out), hoist_stmts(body)))
                .collect();
            out.push(Stmt::If {
                arms,
                els: hoist_stmts(els),
                loc,
            });
        }
        Stmt::Case {
            expr,
            alts,
            default,
            loc,
        } => {
            let expr = strip_expr(expr, out);
            out.push(Stmt::Case {
                expr,
                alts: alts
                    .into_iter()
                    .map(|a| CaseAlt {
                        patterns: a.patterns,
                        guard: a.guard,
                        body: hoist_stmts(a.body),
                        loc: a.loc,
                    })
                    .collect(),
                default: default.map(hoist_stmts),
                loc,
            });
        }
        Stmt::For {
            var,
            from,
            dir,
            to,
            body,
            loc,
        } => {
            let from = strip_expr(from, out);
            let to = strip_expr(to, out);
            out.push(Stmt::For {
                var,
                from,
                dir,
                to,
                body: hoist_stmts(body),
                loc,
            });
        }
        Stmt::While { cond, body, loc } => {
            // Lets in a while condition are pure, so evaluating them once
            // per entry would be wrong only for impure bindings; hoist
            // into the body head instead of before the loop.
            let mut pre = Vec::new();
            let cond = strip_expr(cond, &mut pre);
            if pre.is_empty() {
                out.push(Stmt::While {
                    cond,
                    body: hoist_stmts(body),
                    loc,
                });
            } else {
                let mut new_body = pre.clone();
                new_body.extend(hoist_stmts(body));
                out.extend(pre);
                out.push(Stmt::While {
                    cond,
                    body: new_body,
                    loc,
                });
            }
        }
        Stmt::Repeat { body, until, loc } => {
            let mut tail = Vec::new();
            let until = strip_expr(until, &mut tail);
            let mut new_body = hoist_stmts(body);
            new_body.extend(tail);
            out.push(Stmt::Repeat {
                body: new_body,
                until,
                loc,
            });
        }
        other => out.push(other),
    }
}

impl Transform for HoistLets {
    fn name(&self) -> &'static str {
        "xform_hoist_lets"
    }

    fn apply(
        &mut self,
        decls: Declarations,
        _env: &mut GlobalEnv,
    ) -> Result<Declarations, TypeError> {
        Ok(decls
            .into_iter()
            .map(|d| match d {
                Decl::FunDefn { sig, body, loc } => Decl::FunDefn {
                    sig,
                    body: hoist_stmts(body),
                    loc,
                },
                other => other,
            })
            .collect())
    }
}
