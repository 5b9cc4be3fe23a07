#![forbid(unsafe_code)]

//! Constant folding over literal expression trees.
//!
//! Folding preserves observable failure: anything that could trap at run
//! time (division by zero, width errors, negative shifts) is left
//! unfolded so the inserted runtime check still fires.

use num_bigint::BigInt;
use num_traits::{Signed, ToPrimitive};

use crate::ast::{Binop, Expr, Unop};
use crate::loc::Loc;
use crate::value::{
    int_align, int_exact_div, int_fdiv, int_frem, int_is_pow2, int_mod_pow2, int_pow2, int_shl,
    int_shr, int_zdiv, int_zrem, Bits, SizedInt, Value,
};

pub fn lit(value: Value, loc: Loc) -> Expr {
    Expr::Lit { value, loc }
}

fn int_pow(a: &BigInt, b: &BigInt) -> Option<BigInt> {
    let exp = b.to_u64()?;
    let mut out = BigInt::from(1);
    for _ in 0..exp {
        out *= a;
    }
    Some(out)
}

pub fn fold_unop(op: Unop, a: &Value) -> Option<Value> {
    match (op, a) {
        (Unop::Neg, Value::Int(v)) => Some(Value::Int(-v)),
        (Unop::Neg, Value::SizedInt(v)) => Some(Value::SizedInt(v.neg())),
        (Unop::BoolNot, Value::Bool(b)) => Some(Value::Bool(!b)),
        (Unop::BitsNot, Value::Bits(b)) => Some(Value::Bits(b.not())),
        _ => None,
    }
}

pub fn fold_binop(op: Binop, a: &Value, b: &Value) -> Option<Value> {
    use Binop::*;
    match (a, b) {
        (Value::Int(x), Value::Int(y)) => match op {
            Plus => Some(Value::Int(x + y)),
            Minus => Some(Value::Int(x - y)),
            Mul => Some(Value::Int(x * y)),
            Div => int_exact_div(x, y).ok().map(Value::Int),
            ZDiv => int_zdiv(x, y).ok().map(Value::Int),
            ZRem => int_zrem(x, y).ok().map(Value::Int),
            FDiv => int_fdiv(x, y).ok().map(Value::Int),
            FRem => int_frem(x, y).ok().map(Value::Int),
            Pow => int_pow(x, y).map(Value::Int),
            Shl => int_shl(x, y).ok().map(Value::Int),
            Shr => int_shr(x, y).ok().map(Value::Int),
            Eq => Some(Value::Bool(x == y)),
            Ne => Some(Value::Bool(x != y)),
            Lt => Some(Value::Bool(x < y)),
            Le => Some(Value::Bool(x <= y)),
            Gt => Some(Value::Bool(x > y)),
            Ge => Some(Value::Bool(x >= y)),
            _ => None,
        },
        (Value::Bool(x), Value::Bool(y)) => match op {
            BoolAnd => Some(Value::Bool(*x && *y)),
            BoolOr => Some(Value::Bool(*x || *y)),
            Implies => Some(Value::Bool(!x || *y)),
            Iff => Some(Value::Bool(x == y)),
            Eq => Some(Value::Bool(x == y)),
            Ne => Some(Value::Bool(x != y)),
            _ => None,
        },
        (Value::Bits(x), Value::Bits(y)) => match op {
            BitAnd => x.and(y).ok().map(Value::Bits),
            BitOr => x.or(y).ok().map(Value::Bits),
            BitXor => x.xor(y).ok().map(Value::Bits),
            Append => Some(Value::Bits(x.concat(y))),
            Plus if x.width == y.width => {
                Some(Value::Bits(Bits::from_int(x.width, &(x.to_uint() + y.to_uint()))))
            }
            Minus if x.width == y.width => {
                Some(Value::Bits(Bits::from_int(x.width, &(x.to_uint() - y.to_uint()))))
            }
            Eq => (x.width == y.width).then(|| Value::Bool(x == y)),
            Ne => (x.width == y.width).then(|| Value::Bool(x != y)),
            _ => None,
        },
        (Value::Bits(x), Value::Mask(m)) => match op {
            Eq => x.in_mask(m).ok().map(Value::Bool),
            Ne => x.in_mask(m).ok().map(|r| Value::Bool(!r)),
            _ => None,
        },
        (Value::String(x), Value::String(y)) => match op {
            Eq => Some(Value::Bool(x == y)),
            Ne => Some(Value::Bool(x != y)),
            _ => None,
        },
        (Value::Enum { member: x, .. }, Value::Enum { member: y, .. }) => match op {
            Eq => Some(Value::Bool(x == y)),
            Ne => Some(Value::Bool(x != y)),
            _ => None,
        },
        _ => None,
    }
}

/// Fold a resolved primitive application over constant operands. Unknown
/// names and failing operations stay unfolded.
pub fn fold_prim(name: &str, params: &[Value], args: &[Value]) -> Option<Value> {
    let int2 = |op: fn(&BigInt, &BigInt) -> Option<BigInt>| -> Option<Value> {
        match args {
            [Value::Int(a), Value::Int(b)] => op(a, b).map(Value::Int),
            _ => None,
        }
    };
    let cmp2 = |op: fn(&BigInt, &BigInt) -> bool| -> Option<Value> {
        match args {
            [Value::Int(a), Value::Int(b)] => Some(Value::Bool(op(a, b))),
            _ => None,
        }
    };
    match name {
        "neg_int" => match args {
            [Value::Int(a)] => Some(Value::Int(-a)),
            _ => None,
        },
        "add_int" => int2(|a, b| Some(a + b)),
        "sub_int" => int2(|a, b| Some(a - b)),
        "mul_int" => int2(|a, b| Some(a * b)),
        "exact_div_int" => int2(|a, b| int_exact_div(a, b).ok()),
        "zdiv_int" => int2(|a, b| int_zdiv(a, b).ok()),
        "zrem_int" => int2(|a, b| int_zrem(a, b).ok()),
        "fdiv_int" => int2(|a, b| int_fdiv(a, b).ok()),
        "frem_int" => int2(|a, b| int_frem(a, b).ok()),
        "shl_int" => int2(|a, b| int_shl(a, b).ok()),
        "shr_int" => int2(|a, b| int_shr(a, b).ok()),
        "min_int" => int2(|a, b| Some(a.min(b).clone())),
        "max_int" => int2(|a, b| Some(a.max(b).clone())),
        "pow_int" => int2(int_pow),
        "pow2_int" => match args {
            [Value::Int(a)] => a.to_usize().map(|n| Value::Int(int_pow2(n))),
            _ => None,
        },
        "is_pow2_int" => match args {
            [Value::Int(a)] => Some(Value::Bool(int_is_pow2(a))),
            _ => None,
        },
        "align_int" => int2(|a, b| b.to_usize().map(|n| int_align(a, n))),
        "mod_pow2_int" => int2(|a, b| b.to_usize().map(|n| int_mod_pow2(a, n))),
        "eq_int" => cmp2(|a, b| a == b),
        "ne_int" => cmp2(|a, b| a != b),
        "lt_int" => cmp2(|a, b| a < b),
        "le_int" => cmp2(|a, b| a <= b),
        "gt_int" => cmp2(|a, b| a > b),
        "ge_int" => cmp2(|a, b| a >= b),

        "not_bool" => match args {
            [Value::Bool(a)] => Some(Value::Bool(!a)),
            _ => None,
        },
        "and_bool" => match args {
            [Value::Bool(a), Value::Bool(b)] => Some(Value::Bool(*a && *b)),
            _ => None,
        },
        "or_bool" => match args {
            [Value::Bool(a), Value::Bool(b)] => Some(Value::Bool(*a || *b)),
            _ => None,
        },
        "implies_bool" => match args {
            [Value::Bool(a), Value::Bool(b)] => Some(Value::Bool(!a || *b)),
            _ => None,
        },
        "equiv_bool" => match args {
            [Value::Bool(a), Value::Bool(b)] => Some(Value::Bool(a == b)),
            _ => None,
        },

        "eq_bits" => match args {
            [Value::Bits(a), Value::Bits(b)] if a.width == b.width => {
                Some(Value::Bool(a == b))
            }
            _ => None,
        },
        "ne_bits" => match args {
            [Value::Bits(a), Value::Bits(b)] if a.width == b.width => {
                Some(Value::Bool(a != b))
            }
            _ => None,
        },
        "and_bits" => bits2(args, Bits::and),
        "or_bits" => bits2(args, Bits::or),
        "eor_bits" => bits2(args, Bits::xor),
        "not_bits" => match args {
            [Value::Bits(a)] => Some(Value::Bits(a.not())),
            _ => None,
        },
        "add_bits" => match args {
            [Value::Bits(a), Value::Bits(b)] if a.width == b.width => Some(Value::Bits(
                Bits::from_int(a.width, &(a.to_uint() + b.to_uint())),
            )),
            _ => None,
        },
        "sub_bits" => match args {
            [Value::Bits(a), Value::Bits(b)] if a.width == b.width => Some(Value::Bits(
                Bits::from_int(a.width, &(a.to_uint() - b.to_uint())),
            )),
            _ => None,
        },
        "mul_bits" => match args {
            [Value::Bits(a), Value::Bits(b)] if a.width == b.width => Some(Value::Bits(
                Bits::from_int(a.width, &(a.to_uint() * b.to_uint())),
            )),
            _ => None,
        },
        "lsl_bits" => bits_shift(args, Bits::shl),
        "lsr_bits" => bits_shift(args, Bits::lsr),
        "asr_bits" => bits_shift(args, Bits::asr),
        "append_bits" => match args {
            [Value::Bits(a), Value::Bits(b)] => Some(Value::Bits(a.concat(b))),
            _ => None,
        },
        "replicate_bits" => match args {
            [Value::Bits(a), Value::Int(n)] => {
                n.to_usize().map(|n| Value::Bits(a.replicate(n)))
            }
            _ => None,
        },
        "zero_extend_bits" => match (params, args) {
            (_, [Value::Bits(a), Value::Int(w)]) => {
                let w = w.to_usize()?;
                (w >= a.width).then(|| Value::Bits(a.zero_extend(w)))
            }
            _ => None,
        },
        "sign_extend_bits" => match (params, args) {
            (_, [Value::Bits(a), Value::Int(w)]) => {
                let w = w.to_usize()?;
                (w >= a.width).then(|| Value::Bits(a.sign_extend(w)))
            }
            _ => None,
        },
        "zeros_bits" => match args {
            [Value::Int(w)] => w.to_usize().map(|w| Value::Bits(Bits::zeros(w))),
            _ => None,
        },
        "ones_bits" => match args {
            [Value::Int(w)] => w.to_usize().map(|w| Value::Bits(Bits::ones(w))),
            _ => None,
        },
        "cvt_bits_uint" => match args {
            [Value::Bits(a)] => Some(Value::Int(a.to_uint())),
            _ => None,
        },
        "cvt_bits_sint" => match args {
            [Value::Bits(a)] => Some(Value::Int(a.to_sint())),
            _ => None,
        },
        "cvt_int_bits" => match args {
            [Value::Int(v), Value::Int(w)] => {
                w.to_usize().map(|w| Value::Bits(Bits::from_int(w, v)))
            }
            _ => None,
        },
        "in_mask" => match args {
            [Value::Bits(a), Value::Mask(m)] => a.in_mask(m).ok().map(Value::Bool),
            _ => None,
        },
        "notin_mask" => match args {
            [Value::Bits(a), Value::Mask(m)] => {
                a.in_mask(m).ok().map(|r| Value::Bool(!r))
            }
            _ => None,
        },

        "cvt_int_sintN" => match args {
            [Value::Int(v), Value::Int(w)] => {
                let w = w.to_usize()?;
                SizedInt::new(w, v.clone()).ok().map(Value::SizedInt)
            }
            _ => None,
        },
        "cvt_sintN_int" => match args {
            [Value::SizedInt(v)] => Some(Value::Int(v.value.clone())),
            _ => None,
        },
        _ => None,
    }
}

fn bits2(
    args: &[Value],
    op: fn(&Bits, &Bits) -> Result<Bits, crate::value::ValueError>,
) -> Option<Value> {
    match args {
        [Value::Bits(a), Value::Bits(b)] => op(a, b).ok().map(Value::Bits),
        _ => None,
    }
}

fn bits_shift(args: &[Value], op: fn(&Bits, usize) -> Bits) -> Option<Value> {
    match args {
        [Value::Bits(a), Value::Int(n)] if !n.is_negative() => {
            n.to_usize().map(|n| Value::Bits(op(a, n)))
        }
        _ => None,
    }
}

/// Evaluate an expression composed of literals and supported operators.
/// Returns `None` as soon as anything non-constant or failing is seen.
pub fn fold_expr(e: &Expr) -> Option<Value> {
    match e {
        Expr::Lit { value, .. } => Some(value.clone()),
        Expr::Unop { op, operand, .. } => fold_unop(*op, &fold_expr(operand)?),
        Expr::Binop { op, lhs, rhs, .. } => {
            // Short-circuit booleans fold left-first.
            let l = fold_expr(lhs)?;
            match (op, &l) {
                (Binop::BoolAnd, Value::Bool(false)) => return Some(Value::Bool(false)),
                (Binop::BoolOr, Value::Bool(true)) => return Some(Value::Bool(true)),
                _ => {}
            }
            fold_binop(*op, &l, &fold_expr(rhs)?)
        }
        Expr::If { arms, els, .. } => {
            for (cond, body) in arms {
                match fold_expr(cond)? {
                    Value::Bool(true) => return fold_expr(body),
                    Value::Bool(false) => continue,
                    _ => return None,
                }
            }
            fold_expr(els)
        }
        Expr::Apply {
            name, params, args, ..
        } => {
            let params: Option<Vec<Value>> = params.iter().map(fold_expr).collect();
            let args: Option<Vec<Value>> = args.iter().map(fold_expr).collect();
            fold_prim(name.name(), &params?, &args?)
        }
        Expr::Tuple { elems, .. } => {
            let vs: Option<Vec<Value>> = elems.iter().map(fold_expr).collect();
            vs.map(Value::Tuple)
        }
        Expr::Concat { elems, .. } => {
            let mut out: Option<Bits> = None;
            for e in elems {
                let b = match fold_expr(e)? {
                    Value::Bits(b) => b,
                    _ => return None,
                };
                out = Some(match out {
                    None => b,
                    Some(acc) => acc.concat(&b),
                });
            }
            out.map(Value::Bits)
        }
        Expr::AsConstraint { expr, .. } => fold_expr(expr),
        Expr::AsType { expr, .. } => fold_expr(expr),
        Expr::In { expr, pattern, .. } => {
            let v = fold_expr(expr)?;
            match (&v, pattern.as_ref()) {
                (Value::Bits(b), crate::ast::Pattern::Mask(m, _)) => {
                    b.in_mask(m).ok().map(Value::Bool)
                }
                (v, crate::ast::Pattern::Lit(l, _)) => Some(Value::Bool(v == l)),
                _ => None,
            }
        }
        _ => None,
    }
}

/// Rewrite an expression to a literal when it folds; otherwise return it
/// unchanged.
pub fn simplify(e: Expr) -> Expr {
    match fold_expr(&e) {
        Some(v) => Expr::Lit {
            value: v,
            loc: e.loc().clone(),
        },
        None => e,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use num_bigint::BigUint;

    fn binop(op: Binop, l: Expr, r: Expr) -> Expr {
        Expr::Binop {
            op,
            lhs: Box::new(l),
            rhs: Box::new(r),
            loc: Loc::Unknown,
        }
    }

    #[test]
    fn arithmetic_folds() {
        let e = binop(
            Binop::Mul,
            binop(
                Binop::Plus,
                Expr::lit_int(2, Loc::Unknown),
                Expr::lit_int(3, Loc::Unknown),
            ),
            Expr::lit_int(4, Loc::Unknown),
        );
        assert_eq!(fold_expr(&e), Some(Value::int(20)));
    }

    #[test]
    fn division_by_zero_stays_unfolded() {
        let e = binop(
            Binop::ZDiv,
            Expr::lit_int(1, Loc::Unknown),
            Expr::lit_int(0, Loc::Unknown),
        );
        assert_eq!(fold_expr(&e), None);
        // simplify leaves the expression intact
        assert!(matches!(simplify(e), Expr::Binop { .. }));
    }

    #[test]
    fn inexact_div_stays_unfolded() {
        let e = binop(
            Binop::Div,
            Expr::lit_int(7, Loc::Unknown),
            Expr::lit_int(2, Loc::Unknown),
        );
        assert_eq!(fold_expr(&e), None);
    }

    #[test]
    fn prim_calls_fold() {
        assert_eq!(
            fold_prim("add_int", &[], &[Value::int(1), Value::int(2)]),
            Some(Value::int(3))
        );
        assert_eq!(
            fold_prim("zeros_bits", &[], &[Value::int(4)]),
            Some(Value::Bits(Bits::zeros(4)))
        );
        assert_eq!(fold_prim("no_such_prim", &[], &[Value::int(1)]), None);
    }

    #[test]
    fn sized_int_conversions_roundtrip() {
        // cvt_sintN_int (cvt_int_sintN n x) = x when x fits in n bits.
        let x = Value::int(100);
        let sized = fold_prim("cvt_int_sintN", &[], &[x.clone(), Value::int(8)]).unwrap();
        assert_eq!(fold_prim("cvt_sintN_int", &[], &[sized]), Some(x));
        // An unrepresentable value stays unfolded.
        assert_eq!(
            fold_prim("cvt_int_sintN", &[], &[Value::int(1000), Value::int(8)]),
            None
        );
    }

    #[test]
    fn or_bits_scenario() {
        let a = Value::Bits(Bits::new(4, BigUint::from(0b1100u32)));
        let b = Value::Bits(Bits::new(4, BigUint::from(0b1010u32)));
        assert_eq!(
            fold_prim("or_bits", &[], &[a, b]),
            Some(Value::Bits(Bits::new(4, BigUint::from(0b1110u32))))
        );
    }
}
