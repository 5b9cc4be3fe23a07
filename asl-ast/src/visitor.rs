#![forbid(unsafe_code)]

//! Generic AST traversal with mid-walk replacement.
//!
//! Each hook inspects a node and picks an [`Action`]; the `walk_*` helpers
//! apply the action in pre-order, recurse into children unless told
//! otherwise, and call the matching `post_*` hook for
//! [`Action::ChangeDoChildrenPost`].

use crate::ast::*;

pub enum Action<T> {
    /// Recurse into the node's children.
    DoChildren,
    /// Use this node instead; do not recurse.
    Replace(T),
    /// Use this node, recurse into its children, then run the `post_*`
    /// hook on the result.
    ChangeDoChildrenPost(T),
    /// Leave the node untouched and do not recurse.
    Skip,
}

pub trait Visitor {
    fn visit_expr(&mut self, _e: &Expr) -> Action<Expr> {
        Action::DoChildren
    }
    fn post_expr(&mut self, e: Expr) -> Expr {
        e
    }

    fn visit_ty(&mut self, _t: &Ty) -> Action<Ty> {
        Action::DoChildren
    }
    fn post_ty(&mut self, t: Ty) -> Ty {
        t
    }

    fn visit_lexpr(&mut self, _l: &LExpr) -> Action<LExpr> {
        Action::DoChildren
    }
    fn post_lexpr(&mut self, l: LExpr) -> LExpr {
        l
    }

    fn visit_pattern(&mut self, _p: &Pattern) -> Action<Pattern> {
        Action::DoChildren
    }
    fn post_pattern(&mut self, p: Pattern) -> Pattern {
        p
    }

    fn visit_stmt(&mut self, _s: &Stmt) -> Action<Stmt> {
        Action::DoChildren
    }
    fn post_stmt(&mut self, s: Stmt) -> Stmt {
        s
    }

    /// Statement-level expansion, applied after the statement itself has
    /// been walked. Lowering passes use this to turn one statement into a
    /// sequence.
    fn map_stmt(&mut self, s: Stmt) -> Vec<Stmt> {
        vec![s]
    }

    fn visit_decl(&mut self, _d: &Decl) -> Action<Decl> {
        Action::DoChildren
    }
    fn post_decl(&mut self, d: Decl) -> Decl {
        d
    }

    /// When false, expression traversal does not descend into type-level
    /// subtrees (annotations, constraints, width expressions).
    fn enter_types(&self) -> bool {
        true
    }
}

pub fn walk_expr<V: Visitor + ?Sized>(v: &mut V, e: Expr) -> Expr {
    match v.visit_expr(&e) {
        Action::Replace(n) => n,
        Action::Skip => e,
        Action::DoChildren => walk_expr_children(v, e),
        Action::ChangeDoChildrenPost(n) => {
            let walked = walk_expr_children(v, n);
            v.post_expr(walked)
        }
    }
}

fn walk_exprs<V: Visitor + ?Sized>(v: &mut V, es: Vec<Expr>) -> Vec<Expr> {
    es.into_iter().map(|e| walk_expr(v, e)).collect()
}

fn walk_expr_children<V: Visitor + ?Sized>(v: &mut V, e: Expr) -> Expr {
    match e {
        Expr::Lit { .. } | Expr::Var { .. } => e,
        Expr::Field { base, field, loc } => Expr::Field {
            base: Box::new(walk_expr(v, *base)),
            field,
            loc,
        },
        Expr::Fields { base, fields, loc } => Expr::Fields {
            base: Box::new(walk_expr(v, *base)),
            fields,
            loc,
        },
        Expr::Index { base, index, loc } => Expr::Index {
            base: Box::new(walk_expr(v, *base)),
            index: Box::new(walk_expr(v, *index)),
            loc,
        },
        Expr::Slices { base, slices, loc } => Expr::Slices {
            base: Box::new(walk_expr(v, *base)),
            slices: walk_slices(v, slices),
            loc,
        },
        Expr::Record {
            name,
            args,
            fields,
            loc,
        } => Expr::Record {
            name,
            args: walk_exprs(v, args),
            fields: fields
                .into_iter()
                .map(|(f, e)| (f, walk_expr(v, e)))
                .collect(),
            loc,
        },
        Expr::WithChanges { base, changes, loc } => Expr::WithChanges {
            base: Box::new(walk_expr(v, *base)),
            changes: changes.into_iter().map(|c| walk_change(v, c)).collect(),
            loc,
        },
        Expr::If { arms, els, loc } => Expr::If {
            arms: arms
                .into_iter()
                .map(|(c, e)| (walk_expr(v, c), walk_expr(v, e)))
                .collect(),
            els: Box::new(walk_expr(v, *els)),
            loc,
        },
        Expr::Let {
            name,
            ty,
            value,
            body,
            loc,
        } => Expr::Let {
            name,
            ty: Box::new(maybe_walk_ty(v, *ty)),
            value: Box::new(walk_expr(v, *value)),
            body: Box::new(walk_expr(v, *body)),
            loc,
        },
        Expr::Assert { cond, body, loc } => Expr::Assert {
            cond: Box::new(walk_expr(v, *cond)),
            body: Box::new(walk_expr(v, *body)),
            loc,
        },
        Expr::Call {
            name,
            args,
            throws,
            loc,
        } => Expr::Call {
            name,
            args: args
                .into_iter()
                .map(|(n, e)| (n, walk_expr(v, e)))
                .collect(),
            throws,
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
            params: walk_exprs(v, params),
            args: walk_exprs(v, args),
            throws,
            loc,
        },
        Expr::Tuple { elems, loc } => Expr::Tuple {
            elems: walk_exprs(v, elems),
            loc,
        },
        Expr::Concat { widths, elems, loc } => Expr::Concat {
            widths: walk_exprs(v, widths),
            elems: walk_exprs(v, elems),
            loc,
        },
        Expr::Unop { op, operand, loc } => Expr::Unop {
            op,
            operand: Box::new(walk_expr(v, *operand)),
            loc,
        },
        Expr::Binop { op, lhs, rhs, loc } => Expr::Binop {
            op,
            lhs: Box::new(walk_expr(v, *lhs)),
            rhs: Box::new(walk_expr(v, *rhs)),
            loc,
        },
        Expr::AsConstraint {
            expr,
            constraints,
            loc,
        } => Expr::AsConstraint {
            expr: Box::new(walk_expr(v, *expr)),
            constraints: if v.enter_types() {
                constraints
                    .into_iter()
                    .map(|c| walk_constraint(v, c))
                    .collect()
            } else {
                constraints
            },
            loc,
        },
        Expr::AsType { expr, ty, loc } => Expr::AsType {
            expr: Box::new(walk_expr(v, *expr)),
            ty: Box::new(maybe_walk_ty(v, *ty)),
            loc,
        },
        Expr::ArrayInit { elems, loc } => Expr::ArrayInit {
            elems: walk_exprs(v, elems),
            loc,
        },
        Expr::Unknown { ty, loc } => Expr::Unknown {
            ty: Box::new(maybe_walk_ty(v, *ty)),
            loc,
        },
        Expr::In { expr, pattern, loc } => Expr::In {
            expr: Box::new(walk_expr(v, *expr)),
            pattern: Box::new(walk_pattern(v, *pattern)),
            loc,
        },
    }
}

fn maybe_walk_ty<V: Visitor + ?Sized>(v: &mut V, t: Ty) -> Ty {
    if v.enter_types() {
        walk_ty(v, t)
    } else {
        t
    }
}

pub fn walk_ty<V: Visitor + ?Sized>(v: &mut V, t: Ty) -> Ty {
    match v.visit_ty(&t) {
        Action::Replace(n) => n,
        Action::Skip => t,
        Action::DoChildren => walk_ty_children(v, t),
        Action::ChangeDoChildrenPost(n) => {
            let walked = walk_ty_children(v, n);
            v.post_ty(walked)
        }
    }
}

fn walk_ty_children<V: Visitor + ?Sized>(v: &mut V, t: Ty) -> Ty {
    match t {
        Ty::Integer { constraints, loc } => Ty::Integer {
            constraints: constraints
                .map(|cs| cs.into_iter().map(|c| walk_constraint(v, c)).collect()),
            loc,
        },
        Ty::Bits { width, fields, loc } => Ty::Bits {
            width: Box::new(walk_expr(v, *width)),
            fields: fields
                .into_iter()
                .map(|f| RegField {
                    slices: walk_slices(v, f.slices),
                    name: f.name,
                })
                .collect(),
            loc,
        },
        Ty::Named { name, args, loc } => Ty::Named {
            name,
            args: walk_exprs(v, args),
            loc,
        },
        Ty::OfExpr { expr, loc } => Ty::OfExpr {
            expr: Box::new(walk_expr(v, *expr)),
            loc,
        },
        Ty::Array {
            index,
            element,
            loc,
        } => Ty::Array {
            index: match index {
                ArrayIndex::Enum(n) => ArrayIndex::Enum(n),
                ArrayIndex::Size(e) => ArrayIndex::Size(Box::new(walk_expr(v, *e))),
            },
            element: Box::new(walk_ty(v, *element)),
            loc,
        },
        Ty::Tuple { elems, loc } => Ty::Tuple {
            elems: elems.into_iter().map(|t| walk_ty(v, t)).collect(),
            loc,
        },
    }
}

fn walk_constraint<V: Visitor + ?Sized>(v: &mut V, c: Constraint) -> Constraint {
    match c {
        Constraint::Single(e) => Constraint::Single(walk_expr(v, e)),
        Constraint::Range(lo, hi) => Constraint::Range(walk_expr(v, lo), walk_expr(v, hi)),
    }
}

pub fn walk_slice<V: Visitor + ?Sized>(v: &mut V, s: Slice) -> Slice {
    match s {
        Slice::Single(e) => Slice::Single(walk_expr(v, e)),
        Slice::HighLow(hi, lo) => Slice::HighLow(walk_expr(v, hi), walk_expr(v, lo)),
        Slice::LowWidth(lo, w) => Slice::LowWidth(walk_expr(v, lo), walk_expr(v, w)),
        Slice::HighWidth(hi, w) => Slice::HighWidth(walk_expr(v, hi), walk_expr(v, w)),
        Slice::Element(i, w) => Slice::Element(walk_expr(v, i), walk_expr(v, w)),
    }
}

fn walk_slices<V: Visitor + ?Sized>(v: &mut V, ss: Vec<Slice>) -> Vec<Slice> {
    ss.into_iter().map(|s| walk_slice(v, s)).collect()
}

fn walk_change<V: Visitor + ?Sized>(v: &mut V, c: Change) -> Change {
    match c {
        Change::Field(fields, e) => Change::Field(fields, walk_expr(v, e)),
        Change::Slices(ss, e) => Change::Slices(walk_slices(v, ss), walk_expr(v, e)),
    }
}

pub fn walk_pattern<V: Visitor + ?Sized>(v: &mut V, p: Pattern) -> Pattern {
    match v.visit_pattern(&p) {
        Action::Replace(n) => n,
        Action::Skip => p,
        Action::DoChildren => walk_pattern_children(v, p),
        Action::ChangeDoChildrenPost(n) => {
            let walked = walk_pattern_children(v, n);
            v.post_pattern(walked)
        }
    }
}

fn walk_pattern_children<V: Visitor + ?Sized>(v: &mut V, p: Pattern) -> Pattern {
    match p {
        Pattern::Lit(..) | Pattern::Const(..) | Pattern::Wildcard(..) | Pattern::Mask(..) => p,
        Pattern::Tuple(ps, loc) => {
            Pattern::Tuple(ps.into_iter().map(|p| walk_pattern(v, p)).collect(), loc)
        }
        Pattern::Set(ps, loc) => {
            Pattern::Set(ps.into_iter().map(|p| walk_pattern(v, p)).collect(), loc)
        }
        Pattern::Single(e, loc) => Pattern::Single(walk_expr(v, e), loc),
        Pattern::Range(lo, hi, loc) => Pattern::Range(walk_expr(v, lo), walk_expr(v, hi), loc),
    }
}

pub fn walk_lexpr<V: Visitor + ?Sized>(v: &mut V, l: LExpr) -> LExpr {
    match v.visit_lexpr(&l) {
        Action::Replace(n) => n,
        Action::Skip => l,
        Action::DoChildren => walk_lexpr_children(v, l),
        Action::ChangeDoChildrenPost(n) => {
            let walked = walk_lexpr_children(v, n);
            v.post_lexpr(walked)
        }
    }
}

fn walk_lexpr_children<V: Visitor + ?Sized>(v: &mut V, l: LExpr) -> LExpr {
    match l {
        LExpr::Discard { .. } | LExpr::Var { .. } => l,
        LExpr::Field { base, field, loc } => LExpr::Field {
            base: Box::new(walk_lexpr(v, *base)),
            field,
            loc,
        },
        LExpr::Fields { base, fields, loc } => LExpr::Fields {
            base: Box::new(walk_lexpr(v, *base)),
            fields,
            loc,
        },
        LExpr::Index { base, index, loc } => LExpr::Index {
            base: Box::new(walk_lexpr(v, *base)),
            index: Box::new(walk_expr(v, *index)),
            loc,
        },
        LExpr::Slices { base, slices, loc } => LExpr::Slices {
            base: Box::new(walk_lexpr(v, *base)),
            slices: walk_slices(v, slices),
            loc,
        },
        LExpr::BitTuple { widths, elems, loc } => LExpr::BitTuple {
            widths: walk_exprs(v, widths),
            elems: elems.into_iter().map(|l| walk_lexpr(v, l)).collect(),
            loc,
        },
        LExpr::Tuple { elems, loc } => LExpr::Tuple {
            elems: elems.into_iter().map(|l| walk_lexpr(v, l)).collect(),
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
            params: walk_exprs(v, params),
            args: walk_exprs(v, args),
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
            params: walk_exprs(v, params),
            args: walk_exprs(v, args),
            throws,
            loc,
        },
    }
}

pub fn walk_stmt<V: Visitor + ?Sized>(v: &mut V, s: Stmt) -> Stmt {
    match v.visit_stmt(&s) {
        Action::Replace(n) => n,
        Action::Skip => s,
        Action::DoChildren => walk_stmt_children(v, s),
        Action::ChangeDoChildrenPost(n) => {
            let walked = walk_stmt_children(v, n);
            v.post_stmt(walked)
        }
    }
}

/// Walk a statement list, applying `map_stmt` expansion to each walked
/// statement.
pub fn walk_stmts<V: Visitor + ?Sized>(v: &mut V, stmts: Vec<Stmt>) -> Vec<Stmt> {
    let mut out = Vec::with_capacity(stmts.len());
    for s in stmts {
        let walked = walk_stmt(v, s);
        out.extend(v.map_stmt(walked));
    }
    out
}

fn walk_stmt_children<V: Visitor + ?Sized>(v: &mut V, s: Stmt) -> Stmt {
    match s {
        Stmt::VarDeclsNoInit { ty, names, loc } => Stmt::VarDeclsNoInit {
            ty: maybe_walk_ty(v, ty),
            names,
            loc,
        },
        Stmt::VarDecl {
            constant,
            ty,
            target,
            init,
            loc,
        } => Stmt::VarDecl {
            constant,
            ty: ty.map(|t| maybe_walk_ty(v, t)),
            target,
            init: walk_expr(v, init),
            loc,
        },
        Stmt::Assign { lhs, rhs, loc } => Stmt::Assign {
            lhs: walk_lexpr(v, lhs),
            rhs: walk_expr(v, rhs),
            loc,
        },
        Stmt::Call {
            name,
            args,
            throws,
            loc,
        } => Stmt::Call {
            name,
            args: args
                .into_iter()
                .map(|(n, e)| (n, walk_expr(v, e)))
                .collect(),
            throws,
            loc,
        },
        Stmt::Apply {
            name,
            params,
            args,
            throws,
            loc,
        } => Stmt::Apply {
            name,
            params: walk_exprs(v, params),
            args: walk_exprs(v, args),
            throws,
            loc,
        },
        Stmt::Return { value, loc } => Stmt::Return {
            value: value.map(|e| walk_expr(v, e)),
            loc,
        },
        Stmt::Assert { cond, loc } => Stmt::Assert {
            cond: walk_expr(v, cond),
            loc,
        },
        Stmt::Throw { exn, loc } => Stmt::Throw {
            exn: walk_expr(v, exn),
            loc,
        },
        Stmt::Try {
            body,
            bind,
            arms,
            default,
            loc,
        } => Stmt::Try {
            body: walk_stmts(v, body),
            bind,
            arms: arms
                .into_iter()
                .map(|a| CatchArm {
                    exn: a.exn,
                    body: walk_stmts(v, a.body),
                    loc: a.loc,
                })
                .collect(),
            default: default.map(|d| walk_stmts(v, d)),
            loc,
        },
        Stmt::If { arms, els, loc } => Stmt::If {
            arms: arms
                .into_iter()
                .map(|(c, body)| (walk_expr(v, c), walk_stmts(v, body)))
                .collect(),
            els: walk_stmts(v, els),
            loc,
        },
        Stmt::Case {
            expr,
            alts,
            default,
            loc,
        } => Stmt::Case {
            expr: walk_expr(v, expr),
            alts: alts
                .into_iter()
                .map(|a| CaseAlt {
                    patterns: a
                        .patterns
                        .into_iter()
                        .map(|p| walk_pattern(v, p))
                        .collect(),
                    guard: a.guard.map(|g| walk_expr(v, g)),
                    body: walk_stmts(v, a.body),
                    loc: a.loc,
                })
                .collect(),
            default: default.map(|d| walk_stmts(v, d)),
            loc,
        },
        Stmt::For {
            var,
            from,
            dir,
            to,
            body,
            loc,
        } => Stmt::For {
            var,
            from: walk_expr(v, from),
            dir,
            to: walk_expr(v, to),
            body: walk_stmts(v, body),
            loc,
        },
        Stmt::While { cond, body, loc } => Stmt::While {
            cond: walk_expr(v, cond),
            body: walk_stmts(v, body),
            loc,
        },
        Stmt::Repeat { body, until, loc } => Stmt::Repeat {
            body: walk_stmts(v, body),
            until: walk_expr(v, until),
            loc,
        },
    }
}

pub fn walk_decl<V: Visitor + ?Sized>(v: &mut V, d: Decl) -> Decl {
    match v.visit_decl(&d) {
        Action::Replace(n) => n,
        Action::Skip => d,
        Action::DoChildren => walk_decl_children(v, d),
        Action::ChangeDoChildrenPost(n) => {
            let walked = walk_decl_children(v, n);
            v.post_decl(walked)
        }
    }
}

fn walk_sig<V: Visitor + ?Sized>(v: &mut V, sig: FunSig) -> FunSig {
    FunSig {
        name: sig.name,
        kind: sig.kind,
        params: sig
            .params
            .into_iter()
            .map(|p| FunParam {
                name: p.name,
                ty: p.ty.map(|t| maybe_walk_ty(v, t)),
            })
            .collect(),
        args: sig
            .args
            .into_iter()
            .map(|a| FunArg {
                name: a.name,
                ty: maybe_walk_ty(v, a.ty),
                default: a.default.map(|e| walk_expr(v, e)),
            })
            .collect(),
        rty: sig.rty.map(|t| maybe_walk_ty(v, t)),
        throws: sig.throws,
        loc: sig.loc,
    }
}

fn walk_decl_children<V: Visitor + ?Sized>(v: &mut V, d: Decl) -> Decl {
    match d {
        Decl::BuiltinType { .. }
        | Decl::Forward { .. }
        | Decl::Enum { .. }
        | Decl::Operator1 { .. }
        | Decl::Operator2 { .. } => d,
        Decl::Record {
            name,
            params,
            fields,
            loc,
        } => Decl::Record {
            name,
            params,
            fields: fields
                .into_iter()
                .map(|f| Field {
                    name: f.name,
                    ty: maybe_walk_ty(v, f.ty),
                })
                .collect(),
            loc,
        },
        Decl::Exception { name, fields, loc } => Decl::Exception {
            name,
            fields: fields
                .into_iter()
                .map(|f| Field {
                    name: f.name,
                    ty: maybe_walk_ty(v, f.ty),
                })
                .collect(),
            loc,
        },
        Decl::TypeAlias {
            name,
            params,
            ty,
            loc,
        } => Decl::TypeAlias {
            name,
            params,
            ty: maybe_walk_ty(v, ty),
            loc,
        },
        Decl::BuiltinFun { sig, loc } => Decl::BuiltinFun {
            sig: walk_sig(v, sig),
            loc,
        },
        Decl::FunType { sig, loc } => Decl::FunType {
            sig: walk_sig(v, sig),
            loc,
        },
        Decl::FunDefn { sig, body, loc } => Decl::FunDefn {
            sig: walk_sig(v, sig),
            body: walk_stmts(v, body),
            loc,
        },
        Decl::Const {
            name,
            ty,
            value,
            loc,
        } => Decl::Const {
            name,
            ty: ty.map(|t| maybe_walk_ty(v, t)),
            value: walk_expr(v, value),
            loc,
        },
        Decl::Config {
            name,
            ty,
            value,
            loc,
        } => Decl::Config {
            name,
            ty: maybe_walk_ty(v, ty),
            value: walk_expr(v, value),
            loc,
        },
        Decl::Var { name, ty, loc } => Decl::Var {
            name,
            ty: maybe_walk_ty(v, ty),
            loc,
        },
    }
}

pub fn walk_decls<V: Visitor + ?Sized>(v: &mut V, ds: Declarations) -> Declarations {
    ds.into_iter().map(|d| walk_decl(v, d)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ident::Ident;
    use crate::loc::Loc;
    use crate::value::Value;

    struct RenameVar {
        from: Ident,
        to: Ident,
    }

    impl Visitor for RenameVar {
        fn visit_expr(&mut self, e: &Expr) -> Action<Expr> {
            match e {
                Expr::Var { name, loc } if *name == self.from => Action::Replace(Expr::Var {
                    name: self.to.clone(),
                    loc: loc.clone(),
                }),
                _ => Action::DoChildren,
            }
        }
    }

    #[test]
    fn replace_stops_descent() {
        let e = Expr::Binop {
            op: Binop::Plus,
            lhs: Box::new(Expr::var("x", Loc::Unknown)),
            rhs: Box::new(Expr::var("y", Loc::Unknown)),
            loc: Loc::Unknown,
        };
        let mut v = RenameVar {
            from: Ident::new("x"),
            to: Ident::new("z"),
        };
        let out = walk_expr(&mut v, e);
        match out {
            Expr::Binop { lhs, rhs, .. } => {
                assert_eq!(*lhs, Expr::var("z", Loc::Unknown));
                assert_eq!(*rhs, Expr::var("y", Loc::Unknown));
            }
            other => panic!("unexpected shape: {other:?}"),
        }
    }

    struct CountLits {
        seen: usize,
        enter_types: bool,
    }

    impl Visitor for CountLits {
        fn visit_expr(&mut self, e: &Expr) -> Action<Expr> {
            if matches!(e, Expr::Lit { .. }) {
                self.seen += 1;
            }
            Action::DoChildren
        }
        fn enter_types(&self) -> bool {
            self.enter_types
        }
    }

    #[test]
    fn type_subtrees_can_be_skipped() {
        let e = Expr::AsType {
            expr: Box::new(Expr::lit_int(1, Loc::Unknown)),
            ty: Box::new(Ty::bits(Expr::lit_int(8, Loc::Unknown), Loc::Unknown)),
            loc: Loc::Unknown,
        };

        let mut all = CountLits {
            seen: 0,
            enter_types: true,
        };
        walk_expr(&mut all, e.clone());
        assert_eq!(all.seen, 2);

        let mut shallow = CountLits {
            seen: 0,
            enter_types: false,
        };
        walk_expr(&mut shallow, e);
        assert_eq!(shallow.seen, 1);
    }

    struct ExpandAsserts;

    impl Visitor for ExpandAsserts {
        fn map_stmt(&mut self, s: Stmt) -> Vec<Stmt> {
            match s {
                Stmt::Assert { cond, loc } => vec![
                    Stmt::Assert {
                        cond,
                        loc: loc.clone(),
                    },
                    Stmt::Return {
                        value: None,
                        loc,
                    },
                ],
                other => vec![other],
            }
        }
    }

    #[test]
    fn statement_lists_can_expand() {
        let stmts = vec![Stmt::Assert {
            cond: Expr::Lit {
                value: Value::Bool(true),
                loc: Loc::Unknown,
            },
            loc: Loc::Unknown,
        }];
        let out = walk_stmts(&mut ExpandAsserts, stmts);
        assert_eq!(out.len(), 2);
    }
}
