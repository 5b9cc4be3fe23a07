#![forbid(unsafe_code)]

//! Pre-typechecking global checks.
//!
//! ASL expressions must not depend on the evaluation order of their
//! subexpressions: at most one sibling subtree of any expression may call
//! something that mutates global state (including RAM).

use std::collections::{HashMap, HashSet};

use asl_ast::{Change, Decl, Declarations, Expr, LExpr, Slice, Stmt};

use crate::error::TypeError;

/// Primitives that touch global state by definition.
const EFFECTFUL_PRIMS: &[&str] = &["__ram_init", "__ram_read", "__ram_write"];

pub fn check_evaluation_order(decls: &Declarations) -> Result<(), Vec<TypeError>> {
    let analysis = EffectAnalysis::build(decls);
    let mut errors = Vec::new();
    for d in decls {
        if let Decl::FunDefn { body, .. } = d {
            analysis.check_stmts(body, &mut errors);
        }
    }
    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

struct EffectAnalysis {
    effectful: HashSet<String>,
}

impl EffectAnalysis {
    fn build(decls: &Declarations) -> Self {
        let mut globals: HashSet<String> = HashSet::new();
        for d in decls {
            match d {
                Decl::Var { name, .. } | Decl::Config { name, .. } => {
                    globals.insert(name.name().to_string());
                }
                _ => {}
            }
        }

        let mut bodies: HashMap<String, &Vec<Stmt>> = HashMap::new();
        for d in decls {
            if let Decl::FunDefn { sig, body, .. } = d {
                bodies.insert(sig.name.name().to_string(), body);
            }
        }

        let mut effectful: HashSet<String> =
            EFFECTFUL_PRIMS.iter().map(|s| s.to_string()).collect();

        // Transitive closure over the call graph.
        loop {
            let mut changed = false;
            for (name, body) in &bodies {
                if effectful.contains(name.as_str()) {
                    continue;
                }
                let mut probe = Probe {
                    globals: &globals,
                    effectful: &effectful,
                    hit: false,
                };
                probe.stmts(body);
                if probe.hit {
                    effectful.insert(name.clone());
                    changed = true;
                }
            }
            if !changed {
                break;
            }
        }

        Self { effectful }
    }

    fn is_effectful_call(&self, name: &str) -> bool {
        self.effectful.contains(name)
    }

    /// True when the subtree contains a call to an effectful function.
    fn subtree_effectful(&self, e: &Expr) -> bool {
        if let Expr::Call { name, .. } | Expr::Apply { name, .. } = e {
            if self.is_effectful_call(name.name()) {
                return true;
            }
        }
        expr_children(e)
            .iter()
            .any(|c| self.subtree_effectful(c))
    }

    fn check_expr(&self, e: &Expr, errors: &mut Vec<TypeError>) {
        let children = expr_children(e);
        let hot: Vec<&&Expr> = children
            .iter()
            .filter(|c| self.subtree_effectful(c))
            .collect();
        if hot.len() > 1 {
            errors.push(TypeError::type_error(
                e.loc(),
                format!(
                    "evaluation order is unspecified: `{}` and `{}` both have side effects",
                    hot[0], hot[1]
                ),
            ));
        }
        for c in children {
            self.check_expr(c, errors);
        }
    }

    fn check_stmts(&self, stmts: &[Stmt], errors: &mut Vec<TypeError>) {
        for s in stmts {
            self.check_stmt(s, errors);
        }
    }

    fn check_stmt(&self, s: &Stmt, errors: &mut Vec<TypeError>) {
        for e in stmt_exprs(s) {
            self.check_expr(e, errors);
        }
        match s {
            Stmt::Try {
                body,
                arms,
                default,
                ..
            } => {
                self.check_stmts(body, errors);
                for a in arms {
                    self.check_stmts(&a.body, errors);
                }
                if let Some(d) = default {
                    self.check_stmts(d, errors);
                }
            }
            Stmt::If { arms, els, .. } => {
                for (_, body) in arms {
                    self.check_stmts(body, errors);
                }
                self.check_stmts(els, errors);
            }
            Stmt::Case { alts, default, .. } => {
                for a in alts {
                    self.check_stmts(&a.body, errors);
                }
                if let Some(d) = default {
                    self.check_stmts(d, errors);
                }
            }
            Stmt::For { body, .. } | Stmt::While { body, .. } | Stmt::Repeat { body, .. } => {
                self.check_stmts(body, errors);
            }
            _ => {}
        }
    }
}

/// Statement-writes probe used while building the effect closure.
struct Probe<'a> {
    globals: &'a HashSet<String>,
    effectful: &'a HashSet<String>,
    hit: bool,
}

impl Probe<'_> {
    fn stmts(&mut self, stmts: &[Stmt]) {
        for s in stmts {
            self.stmt(s);
        }
    }

    fn stmt(&mut self, s: &Stmt) {
        match s {
            Stmt::Assign { lhs, .. } => self.lexpr(lhs),
            Stmt::Call { name, .. } | Stmt::Apply { name, .. } => {
                if self.effectful.contains(name.name()) {
                    self.hit = true;
                }
            }
            Stmt::Try {
                body,
                arms,
                default,
                ..
            } => {
                self.stmts(body);
                for a in arms {
                    self.stmts(&a.body);
                }
                if let Some(d) = default {
                    self.stmts(d);
                }
            }
            Stmt::If { arms, els, .. } => {
                for (_, body) in arms {
                    self.stmts(body);
                }
                self.stmts(els);
            }
            Stmt::Case { alts, default, .. } => {
                for a in alts {
                    self.stmts(&a.body);
                }
                if let Some(d) = default {
                    self.stmts(d);
                }
            }
            Stmt::For { body, .. } | Stmt::While { body, .. } | Stmt::Repeat { body, .. } => {
                self.stmts(body);
            }
            _ => {}
        }
        for e in stmt_exprs(s) {
            self.expr(e);
        }
    }

    fn expr(&mut self, e: &Expr) {
        if let Expr::Call { name, .. } | Expr::Apply { name, .. } = e {
            if self.effectful.contains(name.name()) {
                self.hit = true;
            }
        }
        for c in expr_children(e) {
            self.expr(c);
        }
    }

    fn lexpr(&mut self, l: &LExpr) {
        match l {
            LExpr::Var { name, .. } => {
                if self.globals.contains(name.name()) {
                    self.hit = true;
                }
            }
            LExpr::Field { base, .. }
            | LExpr::Fields { base, .. }
            | LExpr::Index { base, .. }
            | LExpr::Slices { base, .. } => self.lexpr(base),
            LExpr::BitTuple { elems, .. } | LExpr::Tuple { elems, .. } => {
                for l in elems {
                    self.lexpr(l);
                }
            }
            // Setter applications mutate whatever the setter owns.
            LExpr::ReadWrite { .. } | LExpr::Write { .. } => self.hit = true,
            LExpr::Discard { .. } => {}
        }
    }
}

/// Immediate child expressions of a node, in evaluation order.
fn expr_children(e: &Expr) -> Vec<&Expr> {
    let mut out = Vec::new();
    match e {
        Expr::Lit { .. } | Expr::Var { .. } | Expr::Unknown { .. } => {}
        Expr::Field { base, .. } | Expr::Fields { base, .. } => out.push(&**base),
        Expr::Index { base, index, .. } => {
            out.push(&**base);
            out.push(&**index);
        }
        Expr::Slices { base, slices, .. } => {
            out.push(&**base);
            for s in slices {
                slice_exprs(s, &mut out);
            }
        }
        Expr::Record { args, fields, .. } => {
            out.extend(args.iter());
            out.extend(fields.iter().map(|(_, e)| e));
        }
        Expr::WithChanges { base, changes, .. } => {
            out.push(&**base);
            for c in changes {
                match c {
                    Change::Field(_, e) => out.push(e),
                    Change::Slices(ss, e) => {
                        for s in ss {
                            slice_exprs(s, &mut out);
                        }
                        out.push(e);
                    }
                }
            }
        }
        Expr::If { arms, els, .. } => {
            for (c, e) in arms {
                out.push(c);
                out.push(e);
            }
            out.push(&**els);
        }
        Expr::Let { value, body, .. } => {
            out.push(&**value);
            out.push(&**body);
        }
        Expr::Assert { cond, body, .. } => {
            out.push(&**cond);
            out.push(&**body);
        }
        Expr::Call { args, .. } => out.extend(args.iter().map(|(_, e)| e)),
        Expr::Apply { params, args, .. } => {
            out.extend(params.iter());
            out.extend(args.iter());
        }
        Expr::Tuple { elems, .. }
        | Expr::Concat { elems, .. }
        | Expr::ArrayInit { elems, .. } => out.extend(elems.iter()),
        Expr::Unop { operand, .. } => out.push(&**operand),
        Expr::Binop { lhs, rhs, .. } => {
            out.push(&**lhs);
            out.push(&**rhs);
        }
        Expr::AsConstraint { expr, .. } | Expr::AsType { expr, .. } => out.push(&**expr),
        Expr::In { expr, .. } => out.push(&**expr),
    }
    out
}

fn slice_exprs<'a>(s: &'a Slice, out: &mut Vec<&'a Expr>) {
    match s {
        Slice::Single(a) => out.push(a),
        Slice::HighLow(a, b)
        | Slice::LowWidth(a, b)
        | Slice::HighWidth(a, b)
        | Slice::Element(a, b) => {
            out.push(a);
            out.push(b);
        }
    }
}

/// Top-level expressions of a statement (not recursing into nested
/// statement bodies).
fn stmt_exprs(s: &Stmt) -> Vec<&Expr> {
    let mut out = Vec::new();
    match s {
        Stmt::VarDeclsNoInit { .. } => {}
        Stmt::VarDecl { init, .. } => out.push(init),
        Stmt::Assign { lhs, rhs, .. } => {
            lexpr_exprs(lhs, &mut out);
            out.push(rhs);
        }
        Stmt::Call { args, .. } => out.extend(args.iter().map(|(_, e)| e)),
        Stmt::Apply { params, args, .. } => {
            out.extend(params.iter());
            out.extend(args.iter());
        }
        Stmt::Return { value, .. } => {
            if let Some(e) = value {
                out.push(e);
            }
        }
        Stmt::Assert { cond, .. } => out.push(cond),
        Stmt::Throw { exn, .. } => out.push(exn),
        Stmt::Try { .. } => {}
        Stmt::If { arms, .. } => out.extend(arms.iter().map(|(c, _)| c)),
        Stmt::Case { expr, alts, .. } => {
            out.push(expr);
            for a in alts {
                if let Some(g) = &a.guard {
                    out.push(g);
                }
            }
        }
        Stmt::For { from, to, .. } => {
            out.push(from);
            out.push(to);
        }
        Stmt::While { cond, .. } => out.push(cond),
        Stmt::Repeat { until, .. } => out.push(until),
    }
    out
}

fn lexpr_exprs<'a>(l: &'a LExpr, out: &mut Vec<&'a Expr>) {
    match l {
        LExpr::Discard { .. } | LExpr::Var { .. } => {}
        LExpr::Field { base, .. } | LExpr::Fields { base, .. } => lexpr_exprs(base, out),
        LExpr::Index { base, index, .. } => {
            lexpr_exprs(base, out);
            out.push(index);
        }
        LExpr::Slices { base, slices, .. } => {
            lexpr_exprs(base, out);
            for s in slices {
                slice_exprs(s, out);
            }
        }
        LExpr::BitTuple { widths, elems, .. } => {
            out.extend(widths.iter());
            for l in elems {
                lexpr_exprs(l, out);
            }
        }
        LExpr::Tuple { elems, .. } => {
            for l in elems {
                lexpr_exprs(l, out);
            }
        }
        LExpr::ReadWrite { params, args, .. } | LExpr::Write { params, args, .. } => {
            out.extend(params.iter());
            out.extend(args.iter());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check(src: &str) -> Result<(), Vec<TypeError>> {
        let decls = asl_parse::parse_source(src, "t.asl").expect("parse");
        check_evaluation_order(&decls)
    }

    #[test]
    fn two_effectful_siblings_fail() {
        let src = "var G : integer;\nfunc WX() => integer\nbegin\n    G = G + 1;\n    return G;\nend\nfunc Use() => integer\nbegin\n    return WX() + WX();\nend";
        let errs = check(src).expect_err("must fail");
        assert!(errs[0].to_string().contains("evaluation order"));
    }

    #[test]
    fn single_effectful_call_is_fine() {
        let src = "var G : integer;\nfunc WX() => integer\nbegin\n    G = G + 1;\n    return G;\nend\nfunc Use() => integer\nbegin\n    return WX() + 1;\nend";
        assert!(check(src).is_ok());
    }

    #[test]
    fn effects_propagate_through_wrappers() {
        let src = "var G : integer;\nfunc WX() => integer\nbegin\n    G = G + 1;\n    return G;\nend\nfunc Wrap() => integer\nbegin\n    return WX();\nend\nfunc Use() => integer\nbegin\n    return Wrap() + Wrap();\nend";
        assert!(check(src).is_err());
    }

    #[test]
    fn ram_primitives_are_effectful() {
        let src = "func Use() => integer\nbegin\n    return __ram_read(8, 4) + __ram_read(8, 8);\nend";
        assert!(check(src).is_err());
    }
}
