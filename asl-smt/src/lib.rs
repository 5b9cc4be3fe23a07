#![forbid(unsafe_code)]

//! Entailment checking: decide `assumptions ⇒ goal` for the integer
//! expressions that appear in widths and constraint sets.
//!
//! The check runs in two stages. First both sides are constant-folded and
//! normalised into linear forms over uninterpreted atoms; syntactic
//! equality at that level settles most goals. Anything left over goes to
//! Z3 (feature `z3`); without Z3 the leftover goals are simply not
//! provable and the caller falls back to a runtime check or an error.

use std::collections::BTreeMap;

use asl_ast::fold::fold_expr;
use asl_ast::{Binop, Expr, Unop, Value};
use num_bigint::BigInt;
use num_traits::{Signed, ToPrimitive, Zero};

pub trait Prover {
    /// Does the conjunction of `assumptions` entail `goal`?
    fn implies(&mut self, assumptions: &[Expr], goal: &Expr) -> bool;

    /// Limit each underlying solver call. Ignored by provers that never
    /// block.
    fn set_timeout_ms(&mut self, _ms: u32) {}
}

/// A linear combination of uninterpreted atoms plus a constant. Atoms are
/// keyed by their canonical printed form so equal subterms share a key.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
struct Linear {
    constant: BigInt,
    terms: BTreeMap<String, BigInt>,
}

impl Linear {
    fn constant(v: BigInt) -> Self {
        Self {
            constant: v,
            terms: BTreeMap::new(),
        }
    }

    fn atom(key: String) -> Self {
        let mut terms = BTreeMap::new();
        terms.insert(key, BigInt::from(1));
        Self {
            constant: BigInt::zero(),
            terms,
        }
    }

    fn is_constant(&self) -> bool {
        self.terms.is_empty()
    }

    fn add(&mut self, other: &Linear, sign: i64) {
        let sign = BigInt::from(sign);
        self.constant += &other.constant * &sign;
        for (k, c) in &other.terms {
            let entry = self.terms.entry(k.clone()).or_default();
            *entry += c * &sign;
            if entry.is_zero() {
                self.terms.remove(k);
            }
        }
    }

    fn scale(&mut self, factor: &BigInt) {
        if factor.is_zero() {
            self.constant = BigInt::zero();
            self.terms.clear();
            return;
        }
        self.constant *= factor;
        for c in self.terms.values_mut() {
            *c *= factor;
        }
    }

    fn try_divide_exact(&self, divisor: &BigInt) -> Option<Linear> {
        if divisor.is_zero() {
            return None;
        }
        if !(&self.constant % divisor).is_zero() {
            return None;
        }
        let mut out = Linear::constant(&self.constant / divisor);
        for (k, c) in &self.terms {
            if !(c % divisor).is_zero() {
                return None;
            }
            out.terms.insert(k.clone(), c / divisor);
        }
        Some(out)
    }
}

fn atom_key(e: &Expr) -> String {
    format!("{e}")
}

fn linearize(e: &Expr) -> Linear {
    if let Some(Value::Int(v)) = fold_expr(e) {
        return Linear::constant(v);
    }
    match e {
        Expr::Var { .. } => Linear::atom(atom_key(e)),
        Expr::Unop {
            op: Unop::Neg,
            operand,
            ..
        } => {
            let mut l = linearize(operand);
            l.scale(&BigInt::from(-1));
            l
        }
        Expr::Binop { op, lhs, rhs, .. } => linearize_op(e, *op, lhs, rhs),
        Expr::Apply { name, args, .. } => match (name.name(), args.as_slice()) {
            ("add_int", [a, b]) => linearize_op(e, Binop::Plus, a, b),
            ("sub_int", [a, b]) => linearize_op(e, Binop::Minus, a, b),
            ("mul_int", [a, b]) => linearize_op(e, Binop::Mul, a, b),
            ("shl_int", [a, b]) => linearize_op(e, Binop::Shl, a, b),
            ("exact_div_int", [a, b]) => linearize_op(e, Binop::Div, a, b),
            ("neg_int", [a]) => {
                let mut l = linearize(a);
                l.scale(&BigInt::from(-1));
                l
            }
            _ => Linear::atom(atom_key(e)),
        },
        Expr::AsConstraint { expr, .. } | Expr::AsType { expr, .. } => linearize(expr),
        _ => Linear::atom(atom_key(e)),
    }
}

fn linearize_op(whole: &Expr, op: Binop, lhs: &Expr, rhs: &Expr) -> Linear {
    let l = linearize(lhs);
    let r = linearize(rhs);
    match op {
        Binop::Plus => {
            let mut out = l;
            out.add(&r, 1);
            out
        }
        Binop::Minus => {
            let mut out = l;
            out.add(&r, -1);
            out
        }
        Binop::Mul => {
            if r.is_constant() {
                let mut out = l;
                out.scale(&r.constant);
                out
            } else if l.is_constant() {
                let mut out = r;
                out.scale(&l.constant);
                out
            } else {
                Linear::atom(atom_key(whole))
            }
        }
        Binop::Shl => {
            if r.is_constant() && !r.constant.is_negative() {
                if let Some(n) = r.constant.to_usize() {
                    let mut out = l;
                    out.scale(&(BigInt::from(1) << n));
                    return out;
                }
            }
            Linear::atom(atom_key(whole))
        }
        // Exact division folds through when every coefficient divides.
        Binop::Div => {
            if r.is_constant() {
                if let Some(out) = l.try_divide_exact(&r.constant) {
                    return out;
                }
            }
            Linear::atom(atom_key(whole))
        }
        _ => Linear::atom(atom_key(whole)),
    }
}

/// Equalities of the shape `atom == e` harvested from the assumption set,
/// used to substitute atoms before comparing linear forms.
fn harvest_substitutions(assumptions: &[Expr]) -> BTreeMap<String, Linear> {
    let mut subst = BTreeMap::new();
    for a in assumptions {
        let (lhs, rhs) = match a {
            Expr::Binop {
                op: Binop::Eq,
                lhs,
                rhs,
                ..
            } => (&**lhs, &**rhs),
            Expr::Apply { name, args, .. } if name.name() == "eq_int" && args.len() == 2 => {
                (&args[0], &args[1])
            }
            _ => continue,
        };
        for (a, b) in [(lhs, rhs), (rhs, lhs)] {
            let la = linearize(a);
            if la.terms.len() == 1 && la.constant.is_zero() {
                let (key, coeff) = la.terms.iter().next().expect("one term");
                if *coeff == BigInt::from(1) && !subst.contains_key(key) {
                    subst.insert(key.clone(), linearize(b));
                }
            }
        }
    }
    subst
}

fn apply_subst(l: &Linear, subst: &BTreeMap<String, Linear>) -> Linear {
    let mut current = l.clone();
    // Chains of equalities settle in a few rounds; guard against cycles.
    for _ in 0..8 {
        let mut changed = false;
        let mut next = Linear::constant(current.constant.clone());
        for (k, c) in &current.terms {
            match subst.get(k) {
                Some(replacement) => {
                    let mut scaled = replacement.clone();
                    scaled.scale(c);
                    next.add(&scaled, 1);
                    changed = true;
                }
                None => {
                    let entry = next.terms.entry(k.clone()).or_default();
                    *entry += c;
                    if entry.is_zero() {
                        next.terms.remove(k);
                    }
                }
            }
        }
        current = next;
        if !changed {
            break;
        }
    }
    current
}

/// The no-solver prover: constant folding, linear normalisation, and
/// assumption substitution. Complete enough for width algebra; anything
/// nonlinear is simply not provable here.
#[derive(Default)]
pub struct SyntacticProver;

impl SyntacticProver {
    pub fn new() -> Self {
        Self
    }

    fn prove(&self, assumptions: &[Expr], goal: &Expr) -> bool {
        if let Some(Value::Bool(b)) = fold_expr(goal) {
            return b;
        }

        // An assumption that is syntactically the goal settles it.
        if assumptions.iter().any(|a| atom_key(a) == atom_key(goal)) {
            return true;
        }

        match goal {
            Expr::Binop {
                op: Binop::BoolAnd,
                lhs,
                rhs,
                ..
            } => self.prove(assumptions, lhs) && self.prove(assumptions, rhs),
            Expr::Binop {
                op: Binop::BoolOr,
                lhs,
                rhs,
                ..
            } => self.prove(assumptions, lhs) || self.prove(assumptions, rhs),
            Expr::Binop {
                op: Binop::Implies,
                lhs,
                rhs,
                ..
            } => {
                let mut extended = assumptions.to_vec();
                extended.push((**lhs).clone());
                self.prove(&extended, rhs)
            }
            Expr::Binop { op, lhs, rhs, .. } => self.prove_cmp(assumptions, *op, lhs, rhs),
            Expr::Apply { name, args, .. } if args.len() == 2 => {
                let op = match name.name() {
                    "eq_int" => Binop::Eq,
                    "ne_int" => Binop::Ne,
                    "le_int" => Binop::Le,
                    "lt_int" => Binop::Lt,
                    "ge_int" => Binop::Ge,
                    "gt_int" => Binop::Gt,
                    _ => return false,
                };
                self.prove_cmp(assumptions, op, &args[0], &args[1])
            }
            _ => false,
        }
    }

    fn prove_cmp(&self, assumptions: &[Expr], op: Binop, lhs: &Expr, rhs: &Expr) -> bool {
        let subst = harvest_substitutions(assumptions);
        let l = apply_subst(&linearize(lhs), &subst);
        let r = apply_subst(&linearize(rhs), &subst);
        let mut diff = l.clone();
        diff.add(&r, -1);
        match op {
            Binop::Eq => diff.is_constant() && diff.constant.is_zero(),
            Binop::Ne => diff.is_constant() && !diff.constant.is_zero(),
            Binop::Le => diff.is_constant() && diff.constant <= BigInt::zero(),
            Binop::Lt => diff.is_constant() && diff.constant < BigInt::zero(),
            Binop::Ge => diff.is_constant() && diff.constant >= BigInt::zero(),
            Binop::Gt => diff.is_constant() && diff.constant > BigInt::zero(),
            _ => false,
        }
    }
}

impl Prover for SyntacticProver {
    fn implies(&mut self, assumptions: &[Expr], goal: &Expr) -> bool {
        self.prove(assumptions, goal)
    }
}

#[cfg(feature = "z3")]
pub mod z3_prover {
    use std::collections::HashMap;

    use asl_ast::fold::fold_expr;
    use asl_ast::{Binop, Expr, Unop, Value};
    use num_traits::{Signed, ToPrimitive};
    use z3::ast::{Ast, Bool, Int};
    use z3::{Config, Context, Params, SatResult, Solver};

    use crate::{atom_key, Prover, SyntacticProver};

    pub struct Z3Prover {
        ctx: &'static Context,
        fast: SyntacticProver,
        timeout_ms: Option<u32>,
    }

    impl Z3Prover {
        pub fn new() -> Self {
            let cfg = Config::new();
            // Leak the context so the solver can be kept warm across calls
            // without self-referential structs or unsafe code. The context
            // lives for the session anyway.
            let ctx: &'static Context = Box::leak(Box::new(Context::new(&cfg)));
            Self {
                ctx,
                fast: SyntacticProver::new(),
                timeout_ms: None,
            }
        }
    }

    impl Default for Z3Prover {
        fn default() -> Self {
            Self::new()
        }
    }

    struct Translator<'ctx> {
        ctx: &'ctx Context,
        int_atoms: HashMap<String, Int<'ctx>>,
        bool_atoms: HashMap<String, Bool<'ctx>>,
    }

    impl<'ctx> Translator<'ctx> {
        fn new(ctx: &'ctx Context) -> Self {
            Self {
                ctx,
                int_atoms: HashMap::new(),
                bool_atoms: HashMap::new(),
            }
        }

        /// Unknown integer-valued terms become uninterpreted constants
        /// keyed by structure, so equal subterms stay equal.
        fn int_atom(&mut self, e: &Expr) -> Int<'ctx> {
            let key = atom_key(e);
            self.int_atoms
                .entry(key.clone())
                .or_insert_with(|| Int::new_const(self.ctx, key))
                .clone()
        }

        fn bool_atom(&mut self, e: &Expr) -> Bool<'ctx> {
            let key = atom_key(e);
            self.bool_atoms
                .entry(key.clone())
                .or_insert_with(|| Bool::new_const(self.ctx, key))
                .clone()
        }

        fn to_int(&mut self, e: &Expr) -> Int<'ctx> {
            if let Some(Value::Int(v)) = fold_expr(e) {
                if let Some(small) = v.to_i64() {
                    return Int::from_i64(self.ctx, small);
                }
                return self.int_atom(e);
            }
            match e {
                Expr::Unop {
                    op: Unop::Neg,
                    operand,
                    ..
                } => {
                    let zero = Int::from_i64(self.ctx, 0);
                    let inner = self.to_int(operand);
                    Int::sub(self.ctx, &[&zero, &inner])
                }
                Expr::Binop { op, lhs, rhs, .. } => self.int_op(e, *op, lhs, rhs),
                Expr::Apply { name, args, .. } => match (name.name(), args.as_slice()) {
                    ("add_int", [a, b]) => self.int_op(e, Binop::Plus, a, b),
                    ("sub_int", [a, b]) => self.int_op(e, Binop::Minus, a, b),
                    ("mul_int", [a, b]) => self.int_op(e, Binop::Mul, a, b),
                    ("shl_int", [a, b]) => self.int_op(e, Binop::Shl, a, b),
                    ("exact_div_int", [a, b]) => self.int_op(e, Binop::Div, a, b),
                    ("neg_int", [a]) => {
                        let zero = Int::from_i64(self.ctx, 0);
                        let inner = self.to_int(a);
                        Int::sub(self.ctx, &[&zero, &inner])
                    }
                    ("min_int", [a, b]) => {
                        let x = self.to_int(a);
                        let y = self.to_int(b);
                        x.le(&y).ite(&x, &y)
                    }
                    ("max_int", [a, b]) => {
                        let x = self.to_int(a);
                        let y = self.to_int(b);
                        x.ge(&y).ite(&x, &y)
                    }
                    ("pow2_int", [a]) => {
                        // Only constant exponents are linear; the fold above
                        // already handled those, so this is uninterpreted.
                        let _ = a;
                        self.int_atom(e)
                    }
                    _ => self.int_atom(e),
                },
                Expr::AsConstraint { expr, .. } | Expr::AsType { expr, .. } => self.to_int(expr),
                _ => self.int_atom(e),
            }
        }

        fn int_op(&mut self, whole: &Expr, op: Binop, lhs: &Expr, rhs: &Expr) -> Int<'ctx> {
            match op {
                Binop::Plus => {
                    let l = self.to_int(lhs);
                    let r = self.to_int(rhs);
                    Int::add(self.ctx, &[&l, &r])
                }
                Binop::Minus => {
                    let l = self.to_int(lhs);
                    let r = self.to_int(rhs);
                    Int::sub(self.ctx, &[&l, &r])
                }
                Binop::Mul => {
                    let l = self.to_int(lhs);
                    let r = self.to_int(rhs);
                    Int::mul(self.ctx, &[&l, &r])
                }
                // Shifts become multiplication by a power of two when the
                // amount is constant.
                Binop::Shl => match fold_expr(rhs) {
                    Some(Value::Int(n)) if !n.is_negative() && n.to_u32().is_some() => {
                        let factor = 1i64.checked_shl(n.to_u32().expect("checked"));
                        match factor {
                            Some(f) => {
                                let l = self.to_int(lhs);
                                let f = Int::from_i64(self.ctx, f);
                                Int::mul(self.ctx, &[&l, &f])
                            }
                            None => self.int_atom(whole),
                        }
                    }
                    _ => self.int_atom(whole),
                },
                // Exact division: sound only alongside the divisibility
                // runtime check the typechecker injects; translate with a
                // positive literal divisor, otherwise keep uninterpreted.
                Binop::Div => match fold_expr(rhs) {
                    Some(Value::Int(d)) if d.is_positive() => {
                        let l = self.to_int(lhs);
                        let d = Int::from_i64(self.ctx, d.to_i64().unwrap_or(1));
                        l.div(&d)
                    }
                    _ => self.int_atom(whole),
                },
                _ => self.int_atom(whole),
            }
        }

        fn to_bool(&mut self, e: &Expr) -> Bool<'ctx> {
            if let Some(Value::Bool(b)) = fold_expr(e) {
                return Bool::from_bool(self.ctx, b);
            }
            match e {
                Expr::Unop {
                    op: Unop::BoolNot,
                    operand,
                    ..
                } => self.to_bool(operand).not(),
                Expr::Binop { op, lhs, rhs, .. } => self.bool_op(e, *op, lhs, rhs),
                Expr::Apply { name, args, .. } if args.len() == 2 => {
                    let op = match name.name() {
                        "eq_int" => Binop::Eq,
                        "ne_int" => Binop::Ne,
                        "le_int" => Binop::Le,
                        "lt_int" => Binop::Lt,
                        "ge_int" => Binop::Ge,
                        "gt_int" => Binop::Gt,
                        "and_bool" => Binop::BoolAnd,
                        "or_bool" => Binop::BoolOr,
                        "implies_bool" => Binop::Implies,
                        "equiv_bool" => Binop::Iff,
                        _ => return self.bool_atom(e),
                    };
                    let (a, b) = (args[0].clone(), args[1].clone());
                    self.bool_op(e, op, &a, &b)
                }
                _ => self.bool_atom(e),
            }
        }

        fn bool_op(&mut self, whole: &Expr, op: Binop, lhs: &Expr, rhs: &Expr) -> Bool<'ctx> {
            match op {
                Binop::BoolAnd => {
                    let l = self.to_bool(lhs);
                    let r = self.to_bool(rhs);
                    Bool::and(self.ctx, &[&l, &r])
                }
                Binop::BoolOr => {
                    let l = self.to_bool(lhs);
                    let r = self.to_bool(rhs);
                    Bool::or(self.ctx, &[&l, &r])
                }
                Binop::Implies => {
                    let l = self.to_bool(lhs);
                    let r = self.to_bool(rhs);
                    l.implies(&r)
                }
                Binop::Iff => {
                    let l = self.to_bool(lhs);
                    let r = self.to_bool(rhs);
                    l._eq(&r)
                }
                Binop::Eq => {
                    let l = self.to_int(lhs);
                    let r = self.to_int(rhs);
                    l._eq(&r)
                }
                Binop::Ne => {
                    let l = self.to_int(lhs);
                    let r = self.to_int(rhs);
                    l._eq(&r).not()
                }
                Binop::Lt => {
                    let l = self.to_int(lhs);
                    let r = self.to_int(rhs);
                    l.lt(&r)
                }
                Binop::Le => {
                    let l = self.to_int(lhs);
                    let r = self.to_int(rhs);
                    l.le(&r)
                }
                Binop::Gt => {
                    let l = self.to_int(lhs);
                    let r = self.to_int(rhs);
                    l.gt(&r)
                }
                Binop::Ge => {
                    let l = self.to_int(lhs);
                    let r = self.to_int(rhs);
                    l.ge(&r)
                }
                _ => self.bool_atom(whole),
            }
        }
    }

    impl Prover for Z3Prover {
        fn implies(&mut self, assumptions: &[Expr], goal: &Expr) -> bool {
            // Constant folding and syntactic equality settle most goals
            // without touching the solver.
            if self.fast.implies(assumptions, goal) {
                return true;
            }

            let solver = Solver::new(self.ctx);
            if let Some(ms) = self.timeout_ms {
                let mut params = Params::new(self.ctx);
                params.set_u32("timeout", ms);
                solver.set_params(&params);
            }

            let mut tr = Translator::new(self.ctx);
            for a in assumptions {
                let b = tr.to_bool(a);
                solver.assert(&b);
            }
            let g = tr.to_bool(goal);
            solver.assert(&g.not());

            // Refutation style: the negated goal being unsatisfiable under
            // the assumptions means the implication holds.
            matches!(solver.check(), SatResult::Unsat)
        }

        fn set_timeout_ms(&mut self, ms: u32) {
            self.timeout_ms = Some(ms);
        }
    }
}

/// The prover the session uses: Z3-backed when available, syntactic
/// otherwise.
pub fn new_prover() -> Box<dyn Prover> {
    #[cfg(feature = "z3")]
    {
        Box::new(z3_prover::Z3Prover::new())
    }
    #[cfg(not(feature = "z3"))]
    {
        Box::new(SyntacticProver::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use asl_ast::{Ident, Loc};

    fn var(n: &str) -> Expr {
        Expr::var(n, Loc::Unknown)
    }

    fn int(v: i64) -> Expr {
        Expr::lit_int(v, Loc::Unknown)
    }

    fn binop(op: Binop, l: Expr, r: Expr) -> Expr {
        Expr::Binop {
            op,
            lhs: Box::new(l),
            rhs: Box::new(r),
            loc: Loc::Unknown,
        }
    }

    fn eq(l: Expr, r: Expr) -> Expr {
        binop(Binop::Eq, l, r)
    }

    #[test]
    fn constant_goals_fold() {
        let mut p = SyntacticProver::new();
        assert!(p.implies(&[], &eq(int(4), int(4))));
        assert!(!p.implies(&[], &eq(int(4), int(5))));
        assert!(p.implies(&[], &binop(Binop::Le, int(3), int(4))));
    }

    #[test]
    fn linear_normalisation_proves_width_algebra() {
        let mut p = SyntacticProver::new();
        // N + 1 == 1 + N
        assert!(p.implies(
            &[],
            &eq(
                binop(Binop::Plus, var("N"), int(1)),
                binop(Binop::Plus, int(1), var("N")),
            )
        ));
        // (N + M) - M == N
        assert!(p.implies(
            &[],
            &eq(
                binop(Binop::Minus, binop(Binop::Plus, var("N"), var("M")), var("M")),
                var("N"),
            )
        ));
        // 2 * N == N + N
        assert!(p.implies(
            &[],
            &eq(
                binop(Binop::Mul, int(2), var("N")),
                binop(Binop::Plus, var("N"), var("N")),
            )
        ));
        // N == M is not provable from nothing
        assert!(!p.implies(&[], &eq(var("N"), var("M"))));
    }

    #[test]
    fn assumptions_substitute() {
        let mut p = SyntacticProver::new();
        // N == 8 ⊢ N + 8 == 16
        assert!(p.implies(
            &[eq(var("N"), int(8))],
            &eq(binop(Binop::Plus, var("N"), int(8)), int(16)),
        ));
        // N == M, M == 4 ⊢ N == 4
        assert!(p.implies(
            &[eq(var("N"), var("M")), eq(var("M"), int(4))],
            &eq(var("N"), int(4)),
        ));
        // A mutable copy is not an equality assumption: nothing to prove with.
        assert!(!p.implies(&[], &eq(var("A"), var("B"))));
    }

    #[test]
    fn uninterpreted_atoms_stay_equal_to_themselves() {
        let mut p = SyntacticProver::new();
        let call = Expr::Apply {
            name: Ident::new("opaque"),
            params: vec![],
            args: vec![var("x")],
            throws: asl_ast::Throws::No,
            loc: Loc::Unknown,
        };
        assert!(p.implies(&[], &eq(call.clone(), call.clone())));
        assert!(p.implies(
            &[],
            &eq(
                binop(Binop::Plus, call.clone(), int(1)),
                binop(Binop::Plus, int(1), call),
            )
        ));
    }

    #[test]
    fn implication_and_conjunction_goals() {
        let mut p = SyntacticProver::new();
        let goal = binop(
            Binop::Implies,
            eq(var("N"), int(4)),
            eq(binop(Binop::Mul, var("N"), int(2)), int(8)),
        );
        assert!(p.implies(&[], &goal));
        let both = binop(Binop::BoolAnd, eq(int(1), int(1)), eq(var("K"), var("K")));
        assert!(p.implies(&[], &both));
    }

    #[test]
    fn exact_division_with_witnessed_divisor() {
        let mut p = SyntacticProver::new();
        // (8 * N) DIV 8 == N
        assert!(p.implies(
            &[],
            &eq(
                binop(Binop::Div, binop(Binop::Mul, int(8), var("N")), int(8)),
                var("N"),
            )
        ));
        // (N) DIV 8 stays opaque
        assert!(!p.implies(
            &[],
            &eq(binop(Binop::Div, var("N"), int(8)), var("M"))
        ));
    }
}
