#![forbid(unsafe_code)]

use std::fmt;

use num_bigint::{BigInt, BigUint};
use num_traits::{One, Signed, ToPrimitive, Zero};
use thiserror::Error;

use crate::ident::Ident;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValueError {
    #[error("division by zero")]
    DivisionByZero,
    #[error("bitvector width mismatch: {left} vs {right}")]
    WidthMismatch { left: usize, right: usize },
    #[error("negative shift amount")]
    NegativeShift,
    #[error("value does not fit in {width} bits")]
    NotRepresentable { width: usize },
}

/// A signed two's-complement integer of a fixed bit width.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SizedInt {
    pub width: usize,
    pub value: BigInt,
}

impl SizedInt {
    /// Wrap an unbounded integer into the two's-complement range of
    /// `width` bits.
    pub fn wrap(width: usize, value: BigInt) -> Self {
        if width == 0 {
            return Self {
                width,
                value: BigInt::zero(),
            };
        }
        let modulus = BigInt::one() << width;
        let half = BigInt::one() << (width - 1);
        let mut v = value % &modulus;
        if v.is_negative() {
            v += &modulus;
        }
        if v >= half {
            v -= &modulus;
        }
        Self { width, value: v }
    }

    /// Check-and-construct: the value must already fit.
    pub fn new(width: usize, value: BigInt) -> Result<Self, ValueError> {
        let wrapped = Self::wrap(width, value.clone());
        if wrapped.value == value {
            Ok(wrapped)
        } else {
            Err(ValueError::NotRepresentable { width })
        }
    }

    /// The smallest width whose two's-complement range holds `[lo, hi]`.
    pub fn width_for_range(lo: &BigInt, hi: &BigInt) -> usize {
        let mut width = 1;
        loop {
            let half: BigInt = BigInt::one() << (width - 1);
            let min = -half.clone();
            let max = half - 1;
            if *lo >= min && *hi <= max {
                return width;
            }
            width += 1;
        }
    }

    pub fn add(&self, other: &Self) -> Result<Self, ValueError> {
        self.check_width(other)?;
        Ok(Self::wrap(self.width, &self.value + &other.value))
    }

    pub fn sub(&self, other: &Self) -> Result<Self, ValueError> {
        self.check_width(other)?;
        Ok(Self::wrap(self.width, &self.value - &other.value))
    }

    pub fn mul(&self, other: &Self) -> Result<Self, ValueError> {
        self.check_width(other)?;
        Ok(Self::wrap(self.width, &self.value * &other.value))
    }

    pub fn neg(&self) -> Self {
        Self::wrap(self.width, -self.value.clone())
    }

    pub fn zdiv(&self, other: &Self) -> Result<Self, ValueError> {
        self.check_width(other)?;
        let q = int_zdiv(&self.value, &other.value)?;
        Ok(Self::wrap(self.width, q))
    }

    pub fn zrem(&self, other: &Self) -> Result<Self, ValueError> {
        self.check_width(other)?;
        let r = int_zrem(&self.value, &other.value)?;
        Ok(Self::wrap(self.width, r))
    }

    /// Align down to a multiple of `2^n`.
    pub fn align(&self, n: &Self) -> Result<Self, ValueError> {
        self.check_width(n)?;
        let shift = n
            .value
            .to_usize()
            .ok_or(ValueError::NegativeShift)?;
        let aligned = int_align(&self.value, shift);
        Ok(Self::wrap(self.width, aligned))
    }

    /// Widen or narrow, rewrapping on narrowing.
    pub fn resize(&self, width: usize) -> Self {
        Self::wrap(width, self.value.clone())
    }

    fn check_width(&self, other: &Self) -> Result<(), ValueError> {
        if self.width == other.width {
            Ok(())
        } else {
            Err(ValueError::WidthMismatch {
                left: self.width,
                right: other.width,
            })
        }
    }
}

impl fmt::Display for SizedInt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "i{}'d{}", self.width, self.value)
    }
}

/// A bitvector: `width` bits, value in `[0, 2^width)`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Bits {
    pub width: usize,
    pub value: BigUint,
}

fn ones(width: usize) -> BigUint {
    (BigUint::one() << width) - BigUint::one()
}

impl Bits {
    pub fn new(width: usize, value: BigUint) -> Self {
        Self {
            width,
            value: value & ones(width),
        }
    }

    pub fn zeros(width: usize) -> Self {
        Self {
            width,
            value: BigUint::zero(),
        }
    }

    pub fn ones(width: usize) -> Self {
        Self {
            width,
            value: ones(width),
        }
    }

    pub fn and(&self, other: &Self) -> Result<Self, ValueError> {
        self.check_width(other)?;
        Ok(Self::new(self.width, &self.value & &other.value))
    }

    pub fn or(&self, other: &Self) -> Result<Self, ValueError> {
        self.check_width(other)?;
        Ok(Self::new(self.width, &self.value | &other.value))
    }

    pub fn xor(&self, other: &Self) -> Result<Self, ValueError> {
        self.check_width(other)?;
        Ok(Self::new(self.width, &self.value ^ &other.value))
    }

    pub fn not(&self) -> Self {
        Self::new(self.width, &self.value ^ ones(self.width))
    }

    pub fn shl(&self, amount: usize) -> Self {
        Self::new(self.width, &self.value << amount)
    }

    pub fn lsr(&self, amount: usize) -> Self {
        Self::new(self.width, &self.value >> amount)
    }

    pub fn asr(&self, amount: usize) -> Self {
        let amount = amount.min(self.width);
        let shifted = &self.value >> amount;
        if self.sign_bit() {
            let fill = ones(self.width) ^ (ones(self.width) >> amount);
            Self::new(self.width, shifted | fill)
        } else {
            Self::new(self.width, shifted)
        }
    }

    pub fn zero_extend(&self, width: usize) -> Self {
        debug_assert!(width >= self.width);
        Self::new(width, self.value.clone())
    }

    pub fn sign_extend(&self, width: usize) -> Self {
        debug_assert!(width >= self.width);
        if self.sign_bit() {
            let fill = ones(width) ^ ones(self.width);
            Self::new(width, &self.value | fill)
        } else {
            Self::new(width, self.value.clone())
        }
    }

    /// `self ++ low`: self becomes the high bits.
    pub fn concat(&self, low: &Self) -> Self {
        Self::new(
            self.width + low.width,
            (&self.value << low.width) | &low.value,
        )
    }

    pub fn replicate(&self, count: usize) -> Self {
        let mut out = Bits::zeros(0);
        for _ in 0..count {
            out = out.concat(self);
        }
        out
    }

    /// Extract `width` bits starting at bit `lo`.
    pub fn slice_get(&self, lo: usize, width: usize) -> Self {
        Self::new(width, &self.value >> lo)
    }

    /// Overwrite `width` bits starting at bit `lo` with `rhs`.
    pub fn slice_set(&self, lo: usize, width: usize, rhs: &Bits) -> Self {
        let field = ones(width) << lo;
        let cleared = &self.value & (ones(self.width) ^ field);
        let inserted = (&rhs.value & ones(width)) << lo;
        Self::new(self.width, cleared | inserted)
    }

    pub fn in_mask(&self, mask: &Mask) -> Result<bool, ValueError> {
        if self.width != mask.width {
            return Err(ValueError::WidthMismatch {
                left: self.width,
                right: mask.width,
            });
        }
        Ok(((&self.value ^ &mask.value) & &mask.care).is_zero())
    }

    pub fn sign_bit(&self) -> bool {
        self.width > 0 && self.value.bit(self.width as u64 - 1)
    }

    /// Unsigned reading.
    pub fn to_uint(&self) -> BigInt {
        BigInt::from(self.value.clone())
    }

    /// Two's-complement reading.
    pub fn to_sint(&self) -> BigInt {
        if self.sign_bit() {
            BigInt::from(self.value.clone()) - (BigInt::one() << self.width)
        } else {
            BigInt::from(self.value.clone())
        }
    }

    pub fn from_int(width: usize, value: &BigInt) -> Self {
        let modulus = BigInt::one() << width;
        let mut v = value % &modulus;
        if v.is_negative() {
            v += &modulus;
        }
        let (_, digits) = v.to_bytes_be();
        Self::new(width, BigUint::from_bytes_be(&digits))
    }

    fn check_width(&self, other: &Self) -> Result<(), ValueError> {
        if self.width == other.width {
            Ok(())
        } else {
            Err(ValueError::WidthMismatch {
                left: self.width,
                right: other.width,
            })
        }
    }
}

impl fmt::Display for Bits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}'x{:x}", self.width, self.value)
    }
}

/// A bit pattern with don't-care positions. `care` marks the significant
/// bits; `value` is zero outside `care`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Mask {
    pub width: usize,
    pub value: BigUint,
    pub care: BigUint,
}

impl Mask {
    pub fn new(width: usize, value: BigUint, care: BigUint) -> Self {
        let care = care & ones(width);
        let value = value & &care;
        Self { width, value, care }
    }
}

impl fmt::Display for Mask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "'")?;
        for i in (0..self.width).rev() {
            let i = i as u64;
            if !self.care.bit(i) {
                write!(f, "x")?;
            } else if self.value.bit(i) {
                write!(f, "1")?;
            } else {
                write!(f, "0")?;
            }
        }
        write!(f, "'")
    }
}

/// Runtime and compile-time constant values.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Int(BigInt),
    SizedInt(SizedInt),
    Bits(Bits),
    Mask(Mask),
    Bool(bool),
    String(String),
    Real(String),
    Tuple(Vec<Value>),
    Array(Vec<Value>),
    Record(Vec<(Ident, Value)>),
    Enum { ty: Ident, member: Ident },
}

impl Value {
    pub fn int(v: i64) -> Self {
        Value::Int(BigInt::from(v))
    }

    pub fn as_int(&self) -> Option<&BigInt> {
        match self {
            Value::Int(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_bits(&self) -> Option<&Bits> {
        match self {
            Value::Bits(b) => Some(b),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(v) => write!(f, "{v}"),
            Value::SizedInt(v) => write!(f, "{v}"),
            Value::Bits(v) => write!(f, "{v}"),
            Value::Mask(v) => write!(f, "{v}"),
            Value::Bool(b) => write!(f, "{}", if *b { "TRUE" } else { "FALSE" }),
            Value::String(s) => write!(f, "{s:?}"),
            Value::Real(r) => write!(f, "{r}"),
            Value::Tuple(vs) => {
                write!(f, "(")?;
                for (i, v) in vs.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{v}")?;
                }
                write!(f, ")")
            }
            Value::Array(vs) => write!(f, "array[{}]", vs.len()),
            Value::Record(fields) => {
                write!(f, "{{")?;
                for (i, (name, v)) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{name} = {v}")?;
                }
                write!(f, "}}")
            }
            Value::Enum { member, .. } => write!(f, "{member}"),
        }
    }
}

// ---- unbounded integer primitives ----

/// Truncating division, the `QUOT` operator.
pub fn int_zdiv(a: &BigInt, b: &BigInt) -> Result<BigInt, ValueError> {
    if b.is_zero() {
        return Err(ValueError::DivisionByZero);
    }
    Ok(a / b)
}

/// Truncating remainder, the `REM` operator.
pub fn int_zrem(a: &BigInt, b: &BigInt) -> Result<BigInt, ValueError> {
    if b.is_zero() {
        return Err(ValueError::DivisionByZero);
    }
    Ok(a % b)
}

/// Flooring division, the `DIVRM` operator.
pub fn int_fdiv(a: &BigInt, b: &BigInt) -> Result<BigInt, ValueError> {
    if b.is_zero() {
        return Err(ValueError::DivisionByZero);
    }
    let q = a / b;
    let r = a % b;
    if !r.is_zero() && (r.is_negative() != b.is_negative()) {
        Ok(q - 1)
    } else {
        Ok(q)
    }
}

/// Flooring remainder, the `MOD` operator.
pub fn int_frem(a: &BigInt, b: &BigInt) -> Result<BigInt, ValueError> {
    let q = int_fdiv(a, b)?;
    Ok(a - q * b)
}

/// Exact division, the `DIV` operator. The divisibility obligation is a
/// runtime check inserted by the typechecker; here it is enforced.
pub fn int_exact_div(a: &BigInt, b: &BigInt) -> Result<BigInt, ValueError> {
    if b.is_zero() {
        return Err(ValueError::DivisionByZero);
    }
    if !(a % b).is_zero() {
        return Err(ValueError::DivisionByZero);
    }
    Ok(a / b)
}

pub fn int_shl(a: &BigInt, amount: &BigInt) -> Result<BigInt, ValueError> {
    let n = amount.to_usize().ok_or(ValueError::NegativeShift)?;
    Ok(a << n)
}

pub fn int_shr(a: &BigInt, amount: &BigInt) -> Result<BigInt, ValueError> {
    let n = amount.to_usize().ok_or(ValueError::NegativeShift)?;
    // Arithmetic shift: floor division by 2^n.
    int_fdiv(a, &(BigInt::one() << n))
}

pub fn int_pow2(n: usize) -> BigInt {
    BigInt::one() << n
}

pub fn int_is_pow2(a: &BigInt) -> bool {
    if !a.is_positive() {
        return false;
    }
    let (_, bytes) = a.to_bytes_be();
    let u = BigUint::from_bytes_be(&bytes);
    (&u & (&u - BigUint::one())).is_zero()
}

/// Align `a` down to a multiple of `2^n`.
pub fn int_align(a: &BigInt, n: usize) -> BigInt {
    let p = BigInt::one() << n;
    let q = int_fdiv(a, &p).expect("pow2 divisor is nonzero");
    q * p
}

/// `a mod 2^n`, always in `[0, 2^n)`.
pub fn int_mod_pow2(a: &BigInt, n: usize) -> BigInt {
    int_frem(a, &(BigInt::one() << n)).expect("pow2 divisor is nonzero")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bi(v: i64) -> BigInt {
        BigInt::from(v)
    }

    #[test]
    fn division_families_disagree_on_negatives() {
        assert_eq!(int_zdiv(&bi(-5), &bi(3)).unwrap(), bi(-1));
        assert_eq!(int_zrem(&bi(-5), &bi(3)).unwrap(), bi(-2));
        assert_eq!(int_fdiv(&bi(-5), &bi(3)).unwrap(), bi(-2));
        assert_eq!(int_frem(&bi(-5), &bi(3)).unwrap(), bi(1));
        assert_eq!(int_zdiv(&bi(5), &bi(3)).unwrap(), bi(1));
        assert_eq!(int_fdiv(&bi(5), &bi(3)).unwrap(), bi(1));
    }

    #[test]
    fn division_by_zero_is_an_error() {
        assert_eq!(int_zdiv(&bi(1), &bi(0)), Err(ValueError::DivisionByZero));
        assert_eq!(int_fdiv(&bi(1), &bi(0)), Err(ValueError::DivisionByZero));
        assert_eq!(
            int_exact_div(&bi(7), &bi(2)),
            Err(ValueError::DivisionByZero)
        );
    }

    #[test]
    fn align_rounds_down_to_pow2_multiple() {
        assert_eq!(int_align(&bi(12), 2), bi(12));
        assert_eq!(int_align(&bi(13), 2), bi(12));
        assert_eq!(int_align(&bi(16), 2), bi(16));
        assert_eq!(int_align(&bi(-5), 2), bi(-8));
    }

    #[test]
    fn sized_int_wraps_twos_complement() {
        assert_eq!(SizedInt::wrap(8, bi(127)).value, bi(127));
        assert_eq!(SizedInt::wrap(8, bi(128)).value, bi(-128));
        assert_eq!(SizedInt::wrap(8, bi(-129)).value, bi(127));
        assert_eq!(SizedInt::wrap(8, bi(256)).value, bi(0));
    }

    #[test]
    fn sized_int_width_for_range() {
        assert_eq!(SizedInt::width_for_range(&bi(0), &bi(1)), 2);
        assert_eq!(SizedInt::width_for_range(&bi(-1), &bi(0)), 1);
        assert_eq!(SizedInt::width_for_range(&bi(0), &bi(255)), 9);
        assert_eq!(SizedInt::width_for_range(&bi(-128), &bi(127)), 8);
    }

    #[test]
    fn sized_rem_is_truncating() {
        let a = SizedInt::wrap(8, bi(-5));
        let b = SizedInt::wrap(8, bi(3));
        assert_eq!(a.zrem(&b).unwrap().value, bi(-2));
    }

    #[test]
    fn bits_ops_are_width_homogeneous() {
        let a = Bits::new(4, BigUint::from(0b1100u32));
        let b = Bits::new(4, BigUint::from(0b1010u32));
        assert_eq!(a.or(&b).unwrap().value, BigUint::from(0b1110u32));
        assert_eq!(a.and(&b).unwrap().value, BigUint::from(0b1000u32));
        assert_eq!(a.xor(&b).unwrap().value, BigUint::from(0b0110u32));
        let w8 = Bits::zeros(8);
        assert!(a.or(&w8).is_err());
    }

    #[test]
    fn asr_fills_with_sign() {
        let v = Bits::new(4, BigUint::from(0b1000u32));
        assert_eq!(v.asr(1).value, BigUint::from(0b1100u32));
        assert_eq!(v.lsr(1).value, BigUint::from(0b0100u32));
    }

    #[test]
    fn slice_roundtrip() {
        let v = Bits::new(8, BigUint::from(0xA5u32));
        let r = Bits::new(4, BigUint::from(0x3u32));
        let set = v.slice_set(2, 4, &r);
        assert_eq!(set.slice_get(2, 4), Bits::new(4, BigUint::from(0x3u32)));
        // Width-zero slices are legal and empty.
        assert_eq!(v.slice_get(3, 0), Bits::zeros(0));
    }

    #[test]
    fn mask_match_ignores_dont_cares() {
        // '10xx'
        let m = Mask::new(
            4,
            BigUint::from(0b1000u32),
            BigUint::from(0b1100u32),
        );
        assert!(Bits::new(4, BigUint::from(0b1011u32)).in_mask(&m).unwrap());
        assert!(!Bits::new(4, BigUint::from(0b0011u32)).in_mask(&m).unwrap());
    }

    #[test]
    fn signed_reading_of_bits() {
        let v = Bits::new(4, BigUint::from(0b1111u32));
        assert_eq!(v.to_sint(), bi(-1));
        assert_eq!(v.to_uint(), bi(15));
        assert_eq!(Bits::from_int(4, &bi(-1)).value, BigUint::from(0b1111u32));
    }
}
