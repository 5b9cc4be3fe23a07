#![forbid(unsafe_code)]

//! The backend runtime abstraction: one capability set of primitive
//! emitters, with three interchangeable implementations selected when
//! the emitter is constructed.
//!
//! * `fallback` — portable C whose generated arithmetic never exceeds
//!   64-bit operations; wider bitvectors use per-width helper structs
//!   for the bitwise subset.
//! * `c23` — defers arbitrary-width arithmetic to the C compiler via
//!   `_BitInt`.
//! * `ac` — emits calls into an external arbitrary-precision C++
//!   datatype library.
//!
//! Switching variants changes only the file-header prelude and the body
//! of each emitter method.

use std::fmt::Write as _;

use asl_ast::{Bits, Mask, SizedInt};
use num_bigint::BigInt;
use num_traits::ToPrimitive;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RuntimeKind {
    Fallback,
    C23,
    Ac,
}

impl RuntimeKind {
    pub fn parse(s: &str) -> Option<RuntimeKind> {
        match s {
            "fallback" => Some(RuntimeKind::Fallback),
            "c23" => Some(RuntimeKind::C23),
            "ac" => Some(RuntimeKind::Ac),
            _ => None,
        }
    }
}

/// Unbounded/bounded integer operation selectors.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IntOp {
    Add,
    Sub,
    Neg,
    Mul,
    Shl,
    Shr,
    ZDiv,
    ZRem,
    FDiv,
    FRem,
    ExactDiv,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Align,
    IsPow2,
    ModPow2,
    Pow2,
    Min,
    Max,
}

impl IntOp {
    pub fn from_prim(base: &str) -> Option<IntOp> {
        Some(match base {
            "add_int" | "add_sintN" => IntOp::Add,
            "sub_int" | "sub_sintN" => IntOp::Sub,
            "neg_int" | "neg_sintN" => IntOp::Neg,
            "mul_int" | "mul_sintN" => IntOp::Mul,
            "shl_int" | "shl_sintN" => IntOp::Shl,
            "shr_int" | "shr_sintN" => IntOp::Shr,
            "zdiv_int" | "zdiv_sintN" => IntOp::ZDiv,
            "zrem_int" | "zrem_sintN" => IntOp::ZRem,
            "fdiv_int" | "fdiv_sintN" => IntOp::FDiv,
            "frem_int" | "frem_sintN" => IntOp::FRem,
            "exact_div_int" | "exact_div_sintN" => IntOp::ExactDiv,
            "eq_int" | "eq_sintN" => IntOp::Eq,
            "ne_int" | "ne_sintN" => IntOp::Ne,
            "lt_int" | "lt_sintN" => IntOp::Lt,
            "le_int" | "le_sintN" => IntOp::Le,
            "gt_int" | "gt_sintN" => IntOp::Gt,
            "ge_int" | "ge_sintN" => IntOp::Ge,
            "align_int" | "align_sintN" => IntOp::Align,
            "is_pow2_int" => IntOp::IsPow2,
            "mod_pow2_int" | "mod_pow2_sintN" => IntOp::ModPow2,
            "pow2_int" => IntOp::Pow2,
            "min_int" => IntOp::Min,
            "max_int" => IntOp::Max,
            _ => return None,
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BitsOp {
    And,
    Or,
    Xor,
    Not,
    Add,
    Sub,
    Mul,
    Neg,
    Lsl,
    Lsr,
    Asr,
    Eq,
    Ne,
}

impl BitsOp {
    pub fn from_prim(base: &str) -> Option<BitsOp> {
        Some(match base {
            "and_bits" => BitsOp::And,
            "or_bits" => BitsOp::Or,
            "eor_bits" => BitsOp::Xor,
            "not_bits" => BitsOp::Not,
            "add_bits" => BitsOp::Add,
            "sub_bits" => BitsOp::Sub,
            "mul_bits" => BitsOp::Mul,
            "neg_bits" => BitsOp::Neg,
            "lsl_bits" => BitsOp::Lsl,
            "lsr_bits" => BitsOp::Lsr,
            "asr_bits" => BitsOp::Asr,
            "eq_bits" => BitsOp::Eq,
            "ne_bits" => BitsOp::Ne,
            _ => return None,
        })
    }
}

#[derive(Debug, thiserror::Error)]
#[error("runtime `{runtime}` cannot emit {what}")]
pub struct RuntimeError {
    pub runtime: &'static str,
    pub what: String,
}

pub type RtResult = Result<String, RuntimeError>;

/// The capability set every emitter implementation provides.
pub trait RuntimeLib {
    fn kind(&self) -> RuntimeKind;

    /// The prelude placed at the top of every emitted header.
    fn file_header(&self) -> String;

    // -- type printers --
    fn int_type(&self) -> String;
    fn sint_type(&self, width: usize) -> RtResult;
    fn bits_type(&self, width: usize) -> RtResult;
    fn ram_type(&self) -> String;

    // -- literal printers --
    fn int_literal(&self, v: &BigInt) -> RtResult;
    fn sint_literal(&self, v: &SizedInt) -> RtResult;
    fn bits_literal(&self, b: &Bits) -> RtResult;
    fn mask_test(&self, width: usize, value: &str, mask: &Mask) -> RtResult;

    // -- arithmetic --
    fn int_op(&self, op: IntOp, args: &[String]) -> RtResult;
    fn sint_op(&self, op: IntOp, width: usize, args: &[String]) -> RtResult;
    fn bits_op(&self, op: BitsOp, width: usize, args: &[String]) -> RtResult;

    // -- conversions --
    fn cvt_bits_to_int(&self, width: usize, signed: bool, arg: &str) -> RtResult;
    fn cvt_int_to_bits(&self, width: usize, arg: &str) -> RtResult;
    fn cvt_int_to_sint(&self, width: usize, arg: &str) -> RtResult;
    fn cvt_sint_to_int(&self, width: usize, arg: &str) -> RtResult;
    fn resize_sint(&self, from: usize, to: usize, arg: &str) -> RtResult;
    fn cvt_sint_to_bits(&self, from: usize, to: usize, arg: &str) -> RtResult;
    fn cvt_bits_to_sint(&self, from: usize, to: usize, arg: &str) -> RtResult;
    fn zero_extend(&self, from: usize, to: usize, arg: &str) -> RtResult;
    fn sign_extend(&self, from: usize, to: usize, arg: &str) -> RtResult;
    fn append_bits(&self, wa: usize, wb: usize, a: &str, b: &str) -> RtResult;
    fn replicate_bits(&self, width: usize, count: usize, arg: &str) -> RtResult;

    // -- slices --
    fn slice_get(&self, base_width: usize, width: usize, base: &str, lo: &str) -> RtResult;
    fn slice_set(
        &self,
        base_width: usize,
        width: usize,
        base: &str,
        lo: &str,
        value: &str,
    ) -> RtResult;

    // -- RAM --
    fn ram_init(&self, addr_width: usize, ram: &str, value: &str) -> RtResult;
    fn ram_read(&self, addr_width: usize, bytes: usize, ram: &str, addr: &str) -> RtResult;
    fn ram_write(
        &self,
        addr_width: usize,
        bytes: usize,
        ram: &str,
        addr: &str,
        value: &str,
    ) -> RtResult;

    // -- printing --
    fn print_str(&self, arg: &str) -> String;
    fn print_char(&self, arg: &str) -> String;
    fn print_int(&self, hex: bool, arg: &str) -> String;
    fn print_sint(&self, width: usize, hex: bool, arg: &str) -> RtResult;
    fn print_bits_hex(&self, width: usize, arg: &str) -> RtResult;

    // -- FFI --
    /// The plain C type used at FFI boundaries for a value of this width.
    fn ffi_c_type(&self, width: usize) -> RtResult;
    fn ffi_to_c(&self, width: usize, arg: &str) -> RtResult;
    fn ffi_from_c(&self, width: usize, arg: &str) -> RtResult;
}

pub fn select_runtime(kind: RuntimeKind) -> Box<dyn RuntimeLib> {
    match kind {
        RuntimeKind::Fallback => Box::new(FallbackRuntime),
        RuntimeKind::C23 => Box::new(C23Runtime),
        RuntimeKind::Ac => Box::new(AcRuntime),
    }
}

fn unsupported(runtime: &'static str, what: impl Into<String>) -> RuntimeError {
    RuntimeError {
        runtime,
        what: what.into(),
    }
}

fn cmp_symbol(op: IntOp) -> Option<&'static str> {
    Some(match op {
        IntOp::Eq => "==",
        IntOp::Ne => "!=",
        IntOp::Lt => "<",
        IntOp::Le => "<=",
        IntOp::Gt => ">",
        IntOp::Ge => ">=",
        _ => return None,
    })
}

fn arith_symbol(op: IntOp) -> Option<&'static str> {
    Some(match op {
        IntOp::Add => "+",
        IntOp::Sub => "-",
        IntOp::Mul => "*",
        _ => return None,
    })
}

// ---------------------------------------------------------------- fallback

/// Portable C: `integer` is `int64_t`, bitvectors up to 64 bits are
/// `uint64_t` with explicit masking, wider bitvectors use generated
/// limb-struct helpers for the bitwise subset.
pub struct FallbackRuntime;

pub const FALLBACK_MAX_SCALAR: usize = 64;

fn mask64(width: usize) -> String {
    if width >= 64 {
        "UINT64_C(0xFFFFFFFFFFFFFFFF)".to_string()
    } else {
        format!("((UINT64_C(1) << {width}) - 1)")
    }
}

impl FallbackRuntime {
    fn scalar(&self, width: usize, what: &str) -> Result<(), RuntimeError> {
        if width <= FALLBACK_MAX_SCALAR {
            Ok(())
        } else {
            Err(unsupported(
                "fallback",
                format!("{what} wider than {FALLBACK_MAX_SCALAR} bits (width {width})"),
            ))
        }
    }
}

impl RuntimeLib for FallbackRuntime {
    fn kind(&self) -> RuntimeKind {
        RuntimeKind::Fallback
    }

    fn file_header(&self) -> String {
        let mut out = String::new();
        out.push_str("#include <stdint.h>\n");
        out.push_str("#include <stdbool.h>\n");
        out.push_str("#include <stdio.h>\n");
        out.push_str("#include <stdlib.h>\n");
        out.push_str("#include <string.h>\n");
        out.push_str("#include <inttypes.h>\n\n");
        out.push_str("typedef int64_t ASL_int_t;\n");
        out.push_str("typedef struct ASL_ram *ASL_ram_t;\n\n");
        out.push_str("static inline int64_t ASL_fdiv_int(int64_t a, int64_t b) {\n");
        out.push_str("  int64_t q = a / b;\n");
        out.push_str("  if ((a % b != 0) && ((a < 0) != (b < 0))) q--;\n");
        out.push_str("  return q;\n");
        out.push_str("}\n");
        out.push_str("static inline int64_t ASL_frem_int(int64_t a, int64_t b) {\n");
        out.push_str("  return a - ASL_fdiv_int(a, b) * b;\n");
        out.push_str("}\n");
        out.push_str("static inline int64_t ASL_pow2_int(int64_t n) {\n");
        out.push_str("  return (int64_t)(UINT64_C(1) << n);\n");
        out.push_str("}\n");
        out.push_str("static inline bool ASL_is_pow2_int(int64_t a) {\n");
        out.push_str("  return a > 0 && (a & (a - 1)) == 0;\n");
        out.push_str("}\n");
        out.push_str("static inline int64_t ASL_align_int(int64_t a, int64_t n) {\n");
        out.push_str("  int64_t p = ASL_pow2_int(n);\n");
        out.push_str("  return ASL_fdiv_int(a, p) * p;\n");
        out.push_str("}\n");
        out.push_str("static inline void ASL_assert(bool cond, const char *what) {\n");
        out.push_str("  if (!cond) {\n");
        out.push_str("    fprintf(stderr, \"ASL assertion failed: %s\\n\", what);\n");
        out.push_str("    exit(1);\n");
        out.push_str("  }\n");
        out.push_str("}\n");
        out.push_str("static inline void ASL_error(const char *what) {\n");
        out.push_str("  fprintf(stderr, \"ASL error: %s\\n\", what);\n");
        out.push_str("  exit(1);\n");
        out.push_str("}\n\n");
        out.push_str("ASL_ram_t ASL_ram_alloc(void);\n");
        out.push_str("void ASL_ram_init(ASL_ram_t ram, uint64_t value);\n");
        out.push_str("uint64_t ASL_ram_read(ASL_ram_t ram, uint64_t addr, int bytes);\n");
        out.push_str("void ASL_ram_write(ASL_ram_t ram, uint64_t addr, int bytes, uint64_t value);\n");
        out
    }

    fn int_type(&self) -> String {
        "ASL_int_t".to_string()
    }

    fn sint_type(&self, width: usize) -> RtResult {
        self.scalar(width, "a bounded integer")?;
        Ok(match width {
            0..=8 => "int8_t",
            9..=16 => "int16_t",
            17..=32 => "int32_t",
            _ => "int64_t",
        }
        .to_string())
    }

    fn bits_type(&self, width: usize) -> RtResult {
        if width <= FALLBACK_MAX_SCALAR {
            Ok("uint64_t".to_string())
        } else {
            Ok(format!("ASL_bits_{width}_t"))
        }
    }

    fn ram_type(&self) -> String {
        "ASL_ram_t".to_string()
    }

    fn int_literal(&self, v: &BigInt) -> RtResult {
        match v.to_i64() {
            Some(small) => Ok(format!("INT64_C({small})")),
            None => Err(unsupported(
                "fallback",
                format!("integer literal {v} outside 64 bits"),
            )),
        }
    }

    fn sint_literal(&self, v: &SizedInt) -> RtResult {
        self.scalar(v.width, "a bounded integer literal")?;
        let value = v
            .value
            .to_i64()
            .ok_or_else(|| unsupported("fallback", "an oversized literal"))?;
        Ok(format!("INT64_C({value})"))
    }

    fn bits_literal(&self, b: &Bits) -> RtResult {
        self.scalar(b.width, "a bitvector literal")?;
        let value = b
            .value
            .to_u64()
            .ok_or_else(|| unsupported("fallback", "an oversized literal"))?;
        Ok(format!("UINT64_C({value:#x})"))
    }

    fn mask_test(&self, width: usize, value: &str, mask: &Mask) -> RtResult {
        self.scalar(width, "a mask comparison")?;
        let v = mask.value.to_u64().unwrap_or(0);
        let care = mask.care.to_u64().unwrap_or(0);
        Ok(format!(
            "((({value}) ^ UINT64_C({v:#x})) & UINT64_C({care:#x})) == 0"
        ))
    }

    fn int_op(&self, op: IntOp, args: &[String]) -> RtResult {
        if let Some(sym) = cmp_symbol(op).or_else(|| arith_symbol(op)) {
            return Ok(format!("(({}) {sym} ({}))", args[0], args[1]));
        }
        Ok(match op {
            IntOp::Neg => format!("(-({}))", args[0]),
            IntOp::Shl => format!("(({}) << ({}))", args[0], args[1]),
            IntOp::Shr => format!("(({}) >> ({}))", args[0], args[1]),
            IntOp::ZDiv | IntOp::ExactDiv => format!("(({}) / ({}))", args[0], args[1]),
            IntOp::ZRem => format!("(({}) % ({}))", args[0], args[1]),
            IntOp::FDiv => format!("ASL_fdiv_int({}, {})", args[0], args[1]),
            IntOp::FRem => format!("ASL_frem_int({}, {})", args[0], args[1]),
            IntOp::Align => format!("ASL_align_int({}, {})", args[0], args[1]),
            IntOp::IsPow2 => format!("ASL_is_pow2_int({})", args[0]),
            IntOp::ModPow2 => format!("ASL_frem_int({}, ASL_pow2_int({}))", args[0], args[1]),
            IntOp::Pow2 => format!("ASL_pow2_int({})", args[0]),
            IntOp::Min => format!(
                "(({a}) < ({b}) ? ({a}) : ({b}))",
                a = args[0],
                b = args[1]
            ),
            IntOp::Max => format!(
                "(({a}) > ({b}) ? ({a}) : ({b}))",
                a = args[0],
                b = args[1]
            ),
            _ => unreachable!("handled above"),
        })
    }

    fn sint_op(&self, op: IntOp, width: usize, args: &[String]) -> RtResult {
        self.scalar(width, "bounded-integer arithmetic")?;
        // Bounded values are proven in range, so 64-bit arithmetic is
        // exact for every width the fallback accepts.
        self.int_op(op, args)
    }

    fn bits_op(&self, op: BitsOp, width: usize, args: &[String]) -> RtResult {
        if width > FALLBACK_MAX_SCALAR {
            let name = match op {
                BitsOp::And => "and",
                BitsOp::Or => "or",
                BitsOp::Xor => "xor",
                BitsOp::Not => "not",
                BitsOp::Eq => "eq",
                BitsOp::Ne => "ne",
                _ => {
                    return Err(unsupported(
                        "fallback",
                        format!("wide bitvector arithmetic at width {width}"),
                    ))
                }
            };
            return Ok(format!(
                "ASL_bits_{width}_{name}({})",
                args.join(", ")
            ));
        }
        let m = mask64(width);
        Ok(match op {
            BitsOp::And => format!("(({}) & ({}))", args[0], args[1]),
            BitsOp::Or => format!("(({}) | ({}))", args[0], args[1]),
            BitsOp::Xor => format!("(({}) ^ ({}))", args[0], args[1]),
            BitsOp::Not => format!("((~({})) & {m})", args[0]),
            BitsOp::Add => format!("((({}) + ({})) & {m})", args[0], args[1]),
            BitsOp::Sub => format!("((({}) - ({})) & {m})", args[0], args[1]),
            BitsOp::Mul => format!("((({}) * ({})) & {m})", args[0], args[1]),
            BitsOp::Neg => format!("((0u - ({})) & {m})", args[0]),
            BitsOp::Lsl => format!("((({}) << ({})) & {m})", args[0], args[1]),
            BitsOp::Lsr => format!("(({}) >> ({}))", args[0], args[1]),
            BitsOp::Asr => {
                let a = &args[0];
                let d = &args[1];
                format!(
                    "(((({a}) & (UINT64_C(1) << ({w} - 1))) ? ((({a}) >> ({d})) | ({m} ^ ({m} >> ({d})))) : (({a}) >> ({d}))) & {m})",
                    w = width
                )
            }
            BitsOp::Eq => format!("(({}) == ({}))", args[0], args[1]),
            BitsOp::Ne => format!("(({}) != ({}))", args[0], args[1]),
        })
    }

    fn cvt_bits_to_int(&self, width: usize, signed: bool, arg: &str) -> RtResult {
        self.scalar(width, "a bits-to-integer conversion")?;
        if signed {
            let m = mask64(width);
            Ok(format!(
                "((({arg}) & (UINT64_C(1) << ({width} - 1))) ? (int64_t)(({arg}) | ~{m}) : (int64_t)({arg}))"
            ))
        } else {
            Ok(format!("((int64_t)({arg}))"))
        }
    }

    fn cvt_int_to_bits(&self, width: usize, arg: &str) -> RtResult {
        self.scalar(width, "an integer-to-bits conversion")?;
        Ok(format!("(((uint64_t)({arg})) & {})", mask64(width)))
    }

    fn cvt_int_to_sint(&self, width: usize, arg: &str) -> RtResult {
        let ty = self.sint_type(width)?;
        Ok(format!("(({ty})({arg}))"))
    }

    fn cvt_sint_to_int(&self, _width: usize, arg: &str) -> RtResult {
        Ok(format!("((ASL_int_t)({arg}))"))
    }

    fn resize_sint(&self, _from: usize, to: usize, arg: &str) -> RtResult {
        let ty = self.sint_type(to)?;
        Ok(format!("(({ty})({arg}))"))
    }

    fn cvt_sint_to_bits(&self, _from: usize, to: usize, arg: &str) -> RtResult {
        self.cvt_int_to_bits(to, arg)
    }

    fn cvt_bits_to_sint(&self, from: usize, to: usize, arg: &str) -> RtResult {
        let signed = self.cvt_bits_to_int(from, true, arg)?;
        self.cvt_int_to_sint(to, &signed)
    }

    fn zero_extend(&self, _from: usize, to: usize, arg: &str) -> RtResult {
        self.scalar(to, "a zero extension")?;
        Ok(format!("({arg})"))
    }

    fn sign_extend(&self, from: usize, to: usize, arg: &str) -> RtResult {
        self.scalar(to, "a sign extension")?;
        let m_from = mask64(from);
        let m_to = mask64(to);
        Ok(format!(
            "((({arg}) & (UINT64_C(1) << ({from} - 1))) ? ((({arg}) | ({m_to} ^ {m_from})) & {m_to}) : ({arg}))"
        ))
    }

    fn append_bits(&self, wa: usize, wb: usize, a: &str, b: &str) -> RtResult {
        self.scalar(wa + wb, "a concatenation")?;
        Ok(format!("((({a}) << {wb}) | ({b}))"))
    }

    fn replicate_bits(&self, width: usize, count: usize, arg: &str) -> RtResult {
        self.scalar(width * count, "a replication")?;
        let mut out = String::new();
        for i in 0..count {
            if i > 0 {
                out.push_str(" | ");
            }
            let _ = write!(out, "(({arg}) << {})", (count - 1 - i) * width);
        }
        Ok(format!("({out})"))
    }

    fn slice_get(&self, base_width: usize, width: usize, base: &str, lo: &str) -> RtResult {
        if base_width > FALLBACK_MAX_SCALAR {
            self.scalar(width, "a wide slice result")?;
            return Ok(format!(
                "ASL_bits_{base_width}_get_slice({base}, {lo}, {width})"
            ));
        }
        if width == 0 {
            // Width-zero slices still evaluate the base for effects.
            return Ok(format!("((void)({base}), (void)({lo}), UINT64_C(0))"));
        }
        Ok(format!("((({base}) >> ({lo})) & {})", mask64(width)))
    }

    fn slice_set(
        &self,
        base_width: usize,
        width: usize,
        base: &str,
        lo: &str,
        value: &str,
    ) -> RtResult {
        if base_width > FALLBACK_MAX_SCALAR {
            self.scalar(width, "a wide slice insert")?;
            return Ok(format!(
                "ASL_bits_{base_width}_set_slice({base}, {lo}, {width}, {value})"
            ));
        }
        let field = format!("({} << ({lo}))", mask64(width));
        Ok(format!(
            "((({base}) & ~{field}) | ((({value}) & {}) << ({lo})))",
            mask64(width)
        ))
    }

    fn ram_init(&self, _addr_width: usize, ram: &str, value: &str) -> RtResult {
        Ok(format!("ASL_ram_init({ram}, {value})"))
    }

    fn ram_read(&self, _addr_width: usize, bytes: usize, ram: &str, addr: &str) -> RtResult {
        self.scalar(bytes * 8, "a RAM read")?;
        Ok(format!("ASL_ram_read({ram}, {addr}, {bytes})"))
    }

    fn ram_write(
        &self,
        _addr_width: usize,
        bytes: usize,
        ram: &str,
        addr: &str,
        value: &str,
    ) -> RtResult {
        self.scalar(bytes * 8, "a RAM write")?;
        Ok(format!("ASL_ram_write({ram}, {addr}, {bytes}, {value})"))
    }

    fn print_str(&self, arg: &str) -> String {
        format!("fputs({arg}, stdout)")
    }

    fn print_char(&self, arg: &str) -> String {
        format!("putchar((int)({arg}))")
    }

    fn print_int(&self, hex: bool, arg: &str) -> String {
        if hex {
            format!("printf(\"%\" PRIx64, (int64_t)({arg}))")
        } else {
            format!("printf(\"%\" PRId64, (int64_t)({arg}))")
        }
    }

    fn print_sint(&self, width: usize, hex: bool, arg: &str) -> RtResult {
        self.scalar(width, "a bounded-integer print")?;
        if hex {
            Ok(format!("printf(\"i{width}'x%\" PRIx64, (int64_t)({arg}))"))
        } else {
            Ok(format!("printf(\"i{width}'d%\" PRId64, (int64_t)({arg}))"))
        }
    }

    fn print_bits_hex(&self, width: usize, arg: &str) -> RtResult {
        self.scalar(width, "a bitvector print")?;
        Ok(format!("printf(\"{width}'x%\" PRIx64, (uint64_t)({arg}))"))
    }

    fn ffi_c_type(&self, width: usize) -> RtResult {
        self.scalar(width, "an FFI value")?;
        Ok("uint64_t".to_string())
    }

    fn ffi_to_c(&self, width: usize, arg: &str) -> RtResult {
        self.scalar(width, "an FFI conversion")?;
        Ok(format!("((uint64_t)({arg}))"))
    }

    fn ffi_from_c(&self, width: usize, arg: &str) -> RtResult {
        self.scalar(width, "an FFI conversion")?;
        Ok(format!("(({arg}) & {})", mask64(width)))
    }
}

/// Bitwise helpers for one wide width, emitted into the types header by
/// the fallback backend.
pub fn fallback_wide_helpers(width: usize) -> String {
    let words = width.div_ceil(64);
    let ty = format!("ASL_bits_{width}_t");
    let mut out = String::new();
    let _ = writeln!(out, "typedef struct {{ uint64_t w[{words}]; }} {ty};");
    for (name, op) in [("and", "&"), ("or", "|"), ("xor", "^")] {
        let _ = writeln!(
            out,
            "static inline {ty} ASL_bits_{width}_{name}({ty} a, {ty} b) {{\n  {ty} r;\n  for (int i = 0; i < {words}; i++) r.w[i] = a.w[i] {op} b.w[i];\n  return r;\n}}"
        );
    }
    let top_mask = if width % 64 == 0 {
        "UINT64_C(0xFFFFFFFFFFFFFFFF)".to_string()
    } else {
        format!("((UINT64_C(1) << {}) - 1)", width % 64)
    };
    let _ = writeln!(
        out,
        "static inline {ty} ASL_bits_{width}_not({ty} a) {{\n  {ty} r;\n  for (int i = 0; i < {words}; i++) r.w[i] = ~a.w[i];\n  r.w[{words} - 1] &= {top_mask};\n  return r;\n}}"
    );
    let _ = writeln!(
        out,
        "static inline bool ASL_bits_{width}_eq({ty} a, {ty} b) {{\n  return memcmp(&a, &b, sizeof a) == 0;\n}}"
    );
    let _ = writeln!(
        out,
        "static inline bool ASL_bits_{width}_ne({ty} a, {ty} b) {{\n  return !ASL_bits_{width}_eq(a, b);\n}}"
    );
    let _ = writeln!(
        out,
        "static inline uint64_t ASL_bits_{width}_get_slice({ty} a, int lo, int w) {{\n  int word = lo / 64, shift = lo % 64;\n  uint64_t r = a.w[word] >> shift;\n  if (shift != 0 && word + 1 < {words}) r |= a.w[word + 1] << (64 - shift);\n  return w >= 64 ? r : (r & ((UINT64_C(1) << w) - 1));\n}}"
    );
    let _ = writeln!(
        out,
        "static inline {ty} ASL_bits_{width}_set_slice({ty} a, int lo, int w, uint64_t v) {{\n  for (int i = 0; i < w; i++) {{\n    int bit = lo + i;\n    uint64_t m = UINT64_C(1) << (bit % 64);\n    if ((v >> i) & 1) a.w[bit / 64] |= m; else a.w[bit / 64] &= ~m;\n  }}\n  return a;\n}}"
    );
    out
}

// ---------------------------------------------------------------- c23

/// `_BitInt`-based runtime: the C compiler does the wide arithmetic.
pub struct C23Runtime;

impl C23Runtime {
    fn bits(&self, width: usize) -> String {
        format!("unsigned _BitInt({})", width.max(1))
    }
}

impl RuntimeLib for C23Runtime {
    fn kind(&self) -> RuntimeKind {
        RuntimeKind::C23
    }

    fn file_header(&self) -> String {
        let mut out = String::new();
        out.push_str("#include <stdint.h>\n");
        out.push_str("#include <stdbool.h>\n");
        out.push_str("#include <stdio.h>\n");
        out.push_str("#include <stdlib.h>\n\n");
        out.push_str("typedef signed _BitInt(128) ASL_int_t;\n");
        out.push_str("typedef struct ASL_ram *ASL_ram_t;\n\n");
        out.push_str("#define ASL_fdiv_int(a, b) ({ \\\n");
        out.push_str("  ASL_int_t _a = (a), _b = (b), _q = _a / _b; \\\n");
        out.push_str("  if ((_a % _b != 0) && ((_a < 0) != (_b < 0))) _q--; \\\n");
        out.push_str("  _q; })\n");
        out.push_str("#define ASL_frem_int(a, b) ((a) - ASL_fdiv_int((a), (b)) * (b))\n");
        out.push_str("#define ASL_pow2_int(n) (((ASL_int_t)1) << (n))\n");
        out.push_str("#define ASL_is_pow2_int(a) ((a) > 0 && ((a) & ((a) - 1)) == 0)\n");
        out.push_str(
            "#define ASL_align_int(a, n) (ASL_fdiv_int((a), ASL_pow2_int(n)) * ASL_pow2_int(n))\n",
        );
        out.push_str("static inline void ASL_assert(bool cond, const char *what) {\n");
        out.push_str("  if (!cond) {\n");
        out.push_str("    fprintf(stderr, \"ASL assertion failed: %s\\n\", what);\n");
        out.push_str("    exit(1);\n");
        out.push_str("  }\n");
        out.push_str("}\n");
        out.push_str("static inline void ASL_error(const char *what) {\n");
        out.push_str("  fprintf(stderr, \"ASL error: %s\\n\", what);\n");
        out.push_str("  exit(1);\n");
        out.push_str("}\n");
        out.push_str("static inline void ASL_print_int(ASL_int_t v, int hex) {\n");
        out.push_str("  char buf[64];\n");
        out.push_str("  int i = 63;\n");
        out.push_str("  bool neg = v < 0;\n");
        out.push_str("  unsigned _BitInt(128) u = neg ? (unsigned _BitInt(128))(-v) : (unsigned _BitInt(128))v;\n");
        out.push_str("  buf[i--] = 0;\n");
        out.push_str("  if (u == 0) buf[i--] = '0';\n");
        out.push_str("  while (u != 0) {\n");
        out.push_str("    unsigned d = (unsigned)(u % (hex ? 16 : 10));\n");
        out.push_str("    buf[i--] = d < 10 ? (char)('0' + d) : (char)('a' + d - 10);\n");
        out.push_str("    u /= (hex ? 16 : 10);\n");
        out.push_str("  }\n");
        out.push_str("  if (neg) buf[i--] = '-';\n");
        out.push_str("  fputs(&buf[i + 1], stdout);\n");
        out.push_str("}\n\n");
        out.push_str("ASL_ram_t ASL_ram_alloc(void);\n");
        out.push_str("void ASL_ram_init(ASL_ram_t ram, uint64_t value);\n");
        out.push_str("uint64_t ASL_ram_read(ASL_ram_t ram, uint64_t addr, int bytes);\n");
        out.push_str("void ASL_ram_write(ASL_ram_t ram, uint64_t addr, int bytes, uint64_t value);\n");
        out
    }

    fn int_type(&self) -> String {
        "ASL_int_t".to_string()
    }

    fn sint_type(&self, width: usize) -> RtResult {
        Ok(format!("signed _BitInt({})", width.max(2)))
    }

    fn bits_type(&self, width: usize) -> RtResult {
        Ok(self.bits(width))
    }

    fn ram_type(&self) -> String {
        "ASL_ram_t".to_string()
    }

    fn int_literal(&self, v: &BigInt) -> RtResult {
        match v.to_i64() {
            Some(small) => Ok(format!("((ASL_int_t){small})")),
            None => Ok(format!("((ASL_int_t)0x{:x}wb)", v)),
        }
    }

    fn sint_literal(&self, v: &SizedInt) -> RtResult {
        let ty = self.sint_type(v.width)?;
        Ok(format!("(({ty}){})", v.value))
    }

    fn bits_literal(&self, b: &Bits) -> RtResult {
        Ok(format!("(({})0x{:x}uwb)", self.bits(b.width), b.value))
    }

    fn mask_test(&self, width: usize, value: &str, mask: &Mask) -> RtResult {
        let ty = self.bits(width);
        Ok(format!(
            "((({value}) ^ (({ty})0x{:x}uwb)) & (({ty})0x{:x}uwb)) == 0",
            mask.value, mask.care
        ))
    }

    fn int_op(&self, op: IntOp, args: &[String]) -> RtResult {
        if let Some(sym) = cmp_symbol(op).or_else(|| arith_symbol(op)) {
            return Ok(format!("(({}) {sym} ({}))", args[0], args[1]));
        }
        Ok(match op {
            IntOp::Neg => format!("(-({}))", args[0]),
            IntOp::Shl => format!("(({}) << ({}))", args[0], args[1]),
            IntOp::Shr => format!("(({}) >> ({}))", args[0], args[1]),
            IntOp::ZDiv | IntOp::ExactDiv => format!("(({}) / ({}))", args[0], args[1]),
            IntOp::ZRem => format!("(({}) % ({}))", args[0], args[1]),
            IntOp::FDiv => format!("ASL_fdiv_int({}, {})", args[0], args[1]),
            IntOp::FRem => format!("ASL_frem_int({}, {})", args[0], args[1]),
            IntOp::Align => format!("ASL_align_int({}, {})", args[0], args[1]),
            IntOp::IsPow2 => format!("ASL_is_pow2_int({})", args[0]),
            IntOp::ModPow2 => format!("ASL_frem_int({}, ASL_pow2_int({}))", args[0], args[1]),
            IntOp::Pow2 => format!("ASL_pow2_int({})", args[0]),
            IntOp::Min => format!(
                "(({a}) < ({b}) ? ({a}) : ({b}))",
                a = args[0],
                b = args[1]
            ),
            IntOp::Max => format!(
                "(({a}) > ({b}) ? ({a}) : ({b}))",
                a = args[0],
                b = args[1]
            ),
            _ => unreachable!("handled above"),
        })
    }

    fn sint_op(&self, op: IntOp, width: usize, args: &[String]) -> RtResult {
        // The compiler wraps _BitInt arithmetic at the declared width.
        let _ = width;
        self.int_op(op, args)
    }

    fn bits_op(&self, op: BitsOp, width: usize, args: &[String]) -> RtResult {
        let ty = self.bits(width);
        Ok(match op {
            BitsOp::And => format!("(({}) & ({}))", args[0], args[1]),
            BitsOp::Or => format!("(({}) | ({}))", args[0], args[1]),
            BitsOp::Xor => format!("(({}) ^ ({}))", args[0], args[1]),
            BitsOp::Not => format!("(({ty})(~({})))", args[0]),
            BitsOp::Add => format!("(({ty})(({}) + ({})))", args[0], args[1]),
            BitsOp::Sub => format!("(({ty})(({}) - ({})))", args[0], args[1]),
            BitsOp::Mul => format!("(({ty})(({}) * ({})))", args[0], args[1]),
            BitsOp::Neg => format!("(({ty})(-({})))", args[0]),
            BitsOp::Lsl => format!("(({ty})(({}) << ({})))", args[0], args[1]),
            BitsOp::Lsr => format!("(({}) >> ({}))", args[0], args[1]),
            BitsOp::Asr => {
                let w = width.max(2);
                format!(
                    "(({ty})(((signed _BitInt({w}))({})) >> ({})))",
                    args[0], args[1]
                )
            }
            BitsOp::Eq => format!("(({}) == ({}))", args[0], args[1]),
            BitsOp::Ne => format!("(({}) != ({}))", args[0], args[1]),
        })
    }

    fn cvt_bits_to_int(&self, width: usize, signed: bool, arg: &str) -> RtResult {
        if signed {
            let w = width.max(2);
            Ok(format!("((ASL_int_t)(signed _BitInt({w}))({arg}))"))
        } else {
            Ok(format!("((ASL_int_t)({arg}))"))
        }
    }

    fn cvt_int_to_bits(&self, width: usize, arg: &str) -> RtResult {
        Ok(format!("(({})({arg}))", self.bits(width)))
    }

    fn cvt_int_to_sint(&self, width: usize, arg: &str) -> RtResult {
        let ty = self.sint_type(width)?;
        Ok(format!("(({ty})({arg}))"))
    }

    fn cvt_sint_to_int(&self, _width: usize, arg: &str) -> RtResult {
        Ok(format!("((ASL_int_t)({arg}))"))
    }

    fn resize_sint(&self, _from: usize, to: usize, arg: &str) -> RtResult {
        let ty = self.sint_type(to)?;
        Ok(format!("(({ty})({arg}))"))
    }

    fn cvt_sint_to_bits(&self, _from: usize, to: usize, arg: &str) -> RtResult {
        self.cvt_int_to_bits(to, arg)
    }

    fn cvt_bits_to_sint(&self, from: usize, to: usize, arg: &str) -> RtResult {
        let signed = self.cvt_bits_to_int(from, true, arg)?;
        self.cvt_int_to_sint(to, &signed)
    }

    fn zero_extend(&self, _from: usize, to: usize, arg: &str) -> RtResult {
        Ok(format!("(({})({arg}))", self.bits(to)))
    }

    fn sign_extend(&self, from: usize, to: usize, arg: &str) -> RtResult {
        let wf = from.max(2);
        Ok(format!(
            "(({})(signed _BitInt({}))(signed _BitInt({wf}))({arg}))",
            self.bits(to),
            to.max(2)
        ))
    }

    fn append_bits(&self, wa: usize, wb: usize, a: &str, b: &str) -> RtResult {
        let ty = self.bits(wa + wb);
        Ok(format!(
            "(((({ty})({a})) << {wb}) | (({ty})({b})))"
        ))
    }

    fn replicate_bits(&self, width: usize, count: usize, arg: &str) -> RtResult {
        let ty = self.bits(width * count.max(1));
        let mut out = String::new();
        for i in 0..count {
            if i > 0 {
                out.push_str(" | ");
            }
            let _ = write!(out, "((({ty})({arg})) << {})", (count - 1 - i) * width);
        }
        if count == 0 {
            out.push_str("0uwb");
        }
        Ok(format!("({out})"))
    }

    fn slice_get(&self, _base_width: usize, width: usize, base: &str, lo: &str) -> RtResult {
        if width == 0 {
            return Ok(format!("((void)({base}), (void)({lo}), 0uwb)"));
        }
        Ok(format!(
            "(({})(({base}) >> ({lo})))",
            self.bits(width)
        ))
    }

    fn slice_set(
        &self,
        base_width: usize,
        width: usize,
        base: &str,
        lo: &str,
        value: &str,
    ) -> RtResult {
        let ty = self.bits(base_width);
        // ~(ones << width) keeps the low `width` bits.
        let keep = format!("(~((({ty})-1) << {width}))");
        Ok(format!(
            "((({base}) & ~(({keep}) << ({lo}))) | (((({ty})({value})) & {keep}) << ({lo})))"
        ))
    }

    fn ram_init(&self, _addr_width: usize, ram: &str, value: &str) -> RtResult {
        Ok(format!("ASL_ram_init({ram}, (uint64_t)({value}))"))
    }

    fn ram_read(&self, _addr_width: usize, bytes: usize, ram: &str, addr: &str) -> RtResult {
        Ok(format!(
            "ASL_ram_read({ram}, (uint64_t)({addr}), {bytes})"
        ))
    }

    fn ram_write(
        &self,
        _addr_width: usize,
        bytes: usize,
        ram: &str,
        addr: &str,
        value: &str,
    ) -> RtResult {
        Ok(format!(
            "ASL_ram_write({ram}, (uint64_t)({addr}), {bytes}, (uint64_t)({value}))"
        ))
    }

    fn print_str(&self, arg: &str) -> String {
        format!("fputs({arg}, stdout)")
    }

    fn print_char(&self, arg: &str) -> String {
        format!("putchar((int)({arg}))")
    }

    fn print_int(&self, hex: bool, arg: &str) -> String {
        format!("ASL_print_int(({arg}), {})", i32::from(hex))
    }

    fn print_sint(&self, width: usize, hex: bool, arg: &str) -> RtResult {
        Ok(format!(
            "(fputs(\"i{width}'{}\", stdout), ASL_print_int((ASL_int_t)({arg}), {}))",
            if hex { "x" } else { "d" },
            i32::from(hex)
        ))
    }

    fn print_bits_hex(&self, width: usize, arg: &str) -> RtResult {
        Ok(format!(
            "(fputs(\"{width}'x\", stdout), ASL_print_int((ASL_int_t)({arg}), 1))"
        ))
    }

    fn ffi_c_type(&self, width: usize) -> RtResult {
        if width > 64 {
            return Err(unsupported("c23", "FFI values wider than 64 bits"));
        }
        Ok("uint64_t".to_string())
    }

    fn ffi_to_c(&self, _width: usize, arg: &str) -> RtResult {
        Ok(format!("((uint64_t)({arg}))"))
    }

    fn ffi_from_c(&self, width: usize, arg: &str) -> RtResult {
        Ok(format!("(({})({arg}))", self.bits(width)))
    }
}

// ---------------------------------------------------------------- ac

/// Large-integer backend: emits calls into the `ac_int` C++ datatype
/// library; the generated sources compile as C++.
pub struct AcRuntime;

impl AcRuntime {
    fn bits(&self, width: usize) -> String {
        format!("ac_int<{}, false>", width.max(1))
    }

    fn sint(&self, width: usize) -> String {
        format!("ac_int<{}, true>", width.max(1))
    }
}

impl RuntimeLib for AcRuntime {
    fn kind(&self) -> RuntimeKind {
        RuntimeKind::Ac
    }

    fn file_header(&self) -> String {
        let mut out = String::new();
        out.push_str("#include <cstdint>\n");
        out.push_str("#include <cstdio>\n");
        out.push_str("#include <cstdlib>\n");
        out.push_str("#include <ac_int.h>\n\n");
        out.push_str("typedef ac_int<128, true> ASL_int_t;\n");
        out.push_str("typedef struct ASL_ram *ASL_ram_t;\n\n");
        out.push_str("static inline ASL_int_t ASL_fdiv_int(ASL_int_t a, ASL_int_t b) {\n");
        out.push_str("  ASL_int_t q = a / b;\n");
        out.push_str("  if ((a % b != 0) && ((a < 0) != (b < 0))) q -= 1;\n");
        out.push_str("  return q;\n");
        out.push_str("}\n");
        out.push_str("static inline ASL_int_t ASL_frem_int(ASL_int_t a, ASL_int_t b) {\n");
        out.push_str("  return a - ASL_fdiv_int(a, b) * b;\n");
        out.push_str("}\n");
        out.push_str("static inline ASL_int_t ASL_pow2_int(ASL_int_t n) {\n");
        out.push_str("  ASL_int_t one = 1;\n");
        out.push_str("  return one << n.to_int();\n");
        out.push_str("}\n");
        out.push_str("static inline bool ASL_is_pow2_int(ASL_int_t a) {\n");
        out.push_str("  return a > 0 && (a & (a - 1)) == 0;\n");
        out.push_str("}\n");
        out.push_str("static inline ASL_int_t ASL_align_int(ASL_int_t a, ASL_int_t n) {\n");
        out.push_str("  ASL_int_t p = ASL_pow2_int(n);\n");
        out.push_str("  return ASL_fdiv_int(a, p) * p;\n");
        out.push_str("}\n");
        out.push_str("static inline void ASL_assert(bool cond, const char *what) {\n");
        out.push_str("  if (!cond) {\n");
        out.push_str("    std::fprintf(stderr, \"ASL assertion failed: %s\\n\", what);\n");
        out.push_str("    std::exit(1);\n");
        out.push_str("  }\n");
        out.push_str("}\n");
        out.push_str("static inline void ASL_error(const char *what) {\n");
        out.push_str("  std::fprintf(stderr, \"ASL error: %s\\n\", what);\n");
        out.push_str("  std::exit(1);\n");
        out.push_str("}\n\n");
        out.push_str("ASL_ram_t ASL_ram_alloc(void);\n");
        out.push_str("void ASL_ram_init(ASL_ram_t ram, uint64_t value);\n");
        out.push_str("uint64_t ASL_ram_read(ASL_ram_t ram, uint64_t addr, int bytes);\n");
        out.push_str("void ASL_ram_write(ASL_ram_t ram, uint64_t addr, int bytes, uint64_t value);\n");
        out
    }

    fn int_type(&self) -> String {
        "ASL_int_t".to_string()
    }

    fn sint_type(&self, width: usize) -> RtResult {
        Ok(self.sint(width))
    }

    fn bits_type(&self, width: usize) -> RtResult {
        Ok(self.bits(width))
    }

    fn ram_type(&self) -> String {
        "ASL_ram_t".to_string()
    }

    fn int_literal(&self, v: &BigInt) -> RtResult {
        match v.to_i64() {
            Some(small) => Ok(format!("ASL_int_t({small})")),
            None => Err(unsupported(
                "ac",
                format!("integer literal {v} outside 64 bits at a literal position"),
            )),
        }
    }

    fn sint_literal(&self, v: &SizedInt) -> RtResult {
        match v.value.to_i64() {
            Some(small) => Ok(format!("{}({small})", self.sint(v.width))),
            None => Err(unsupported("ac", "an oversized literal")),
        }
    }

    fn bits_literal(&self, b: &Bits) -> RtResult {
        match b.value.to_u64() {
            Some(small) => Ok(format!("{}({small}u)", self.bits(b.width))),
            None => {
                // Wide literals are assembled from 64-bit chunks.
                let ty = self.bits(b.width);
                let mut parts = Vec::new();
                let mut v = b.value.clone();
                let chunk = num_bigint::BigUint::from(u64::MAX) + 1u32;
                while !num_traits::Zero::is_zero(&v) {
                    let low: num_bigint::BigUint = &v % &chunk;
                    parts.push(low.to_u64().unwrap_or(0));
                    v >>= 64u32;
                }
                let mut expr = format!("{ty}(0u)");
                for (i, p) in parts.iter().enumerate() {
                    expr = format!(
                        "({expr} | ({ty}({p}u) << {}))",
                        i * 64
                    );
                }
                Ok(expr)
            }
        }
    }

    fn mask_test(&self, width: usize, value: &str, mask: &Mask) -> RtResult {
        let v = self.bits_literal(&Bits::new(width, mask.value.clone()))?;
        let c = self.bits_literal(&Bits::new(width, mask.care.clone()))?;
        Ok(format!("((({value}) ^ {v}) & {c}) == 0"))
    }

    fn int_op(&self, op: IntOp, args: &[String]) -> RtResult {
        if let Some(sym) = cmp_symbol(op).or_else(|| arith_symbol(op)) {
            return Ok(format!("(({}) {sym} ({}))", args[0], args[1]));
        }
        Ok(match op {
            IntOp::Neg => format!("(-({}))", args[0]),
            IntOp::Shl => format!("(({}) << ({}).to_int())", args[0], args[1]),
            IntOp::Shr => format!("(({}) >> ({}).to_int())", args[0], args[1]),
            IntOp::ZDiv | IntOp::ExactDiv => format!("(({}) / ({}))", args[0], args[1]),
            IntOp::ZRem => format!("(({}) % ({}))", args[0], args[1]),
            IntOp::FDiv => format!("ASL_fdiv_int({}, {})", args[0], args[1]),
            IntOp::FRem => format!("ASL_frem_int({}, {})", args[0], args[1]),
            IntOp::Align => format!("ASL_align_int({}, {})", args[0], args[1]),
            IntOp::IsPow2 => format!("ASL_is_pow2_int({})", args[0]),
            IntOp::ModPow2 => format!("ASL_frem_int({}, ASL_pow2_int({}))", args[0], args[1]),
            IntOp::Pow2 => format!("ASL_pow2_int({})", args[0]),
            IntOp::Min => format!(
                "(({a}) < ({b}) ? ({a}) : ({b}))",
                a = args[0],
                b = args[1]
            ),
            IntOp::Max => format!(
                "(({a}) > ({b}) ? ({a}) : ({b}))",
                a = args[0],
                b = args[1]
            ),
            _ => unreachable!("handled above"),
        })
    }

    fn sint_op(&self, op: IntOp, width: usize, args: &[String]) -> RtResult {
        let ty = self.sint(width);
        let inner = self.int_op(op, args)?;
        Ok(match op {
            IntOp::Eq | IntOp::Ne | IntOp::Lt | IntOp::Le | IntOp::Gt | IntOp::Ge => inner,
            _ => format!("{ty}({inner})"),
        })
    }

    fn bits_op(&self, op: BitsOp, width: usize, args: &[String]) -> RtResult {
        let ty = self.bits(width);
        Ok(match op {
            BitsOp::And => format!("(({}) & ({}))", args[0], args[1]),
            BitsOp::Or => format!("(({}) | ({}))", args[0], args[1]),
            BitsOp::Xor => format!("(({}) ^ ({}))", args[0], args[1]),
            BitsOp::Not => format!("{ty}(~({}))", args[0]),
            BitsOp::Add => format!("{ty}(({}) + ({}))", args[0], args[1]),
            BitsOp::Sub => format!("{ty}(({}) - ({}))", args[0], args[1]),
            BitsOp::Mul => format!("{ty}(({}) * ({}))", args[0], args[1]),
            BitsOp::Neg => format!("{ty}(-({}))", args[0]),
            BitsOp::Lsl => format!("{ty}(({}) << ({}).to_int())", args[0], args[1]),
            BitsOp::Lsr => format!("(({}) >> ({}).to_int())", args[0], args[1]),
            BitsOp::Asr => {
                let sty = self.sint(width);
                format!(
                    "{ty}((({sty})({})) >> ({}).to_int())",
                    args[0], args[1]
                )
            }
            BitsOp::Eq => format!("(({}) == ({}))", args[0], args[1]),
            BitsOp::Ne => format!("(({}) != ({}))", args[0], args[1]),
        })
    }

    fn cvt_bits_to_int(&self, width: usize, signed: bool, arg: &str) -> RtResult {
        if signed {
            Ok(format!("ASL_int_t(({})({arg}))", self.sint(width)))
        } else {
            Ok(format!("ASL_int_t({arg})"))
        }
    }

    fn cvt_int_to_bits(&self, width: usize, arg: &str) -> RtResult {
        Ok(format!("{}({arg})", self.bits(width)))
    }

    fn cvt_int_to_sint(&self, width: usize, arg: &str) -> RtResult {
        Ok(format!("{}({arg})", self.sint(width)))
    }

    fn cvt_sint_to_int(&self, _width: usize, arg: &str) -> RtResult {
        Ok(format!("ASL_int_t({arg})"))
    }

    fn resize_sint(&self, _from: usize, to: usize, arg: &str) -> RtResult {
        Ok(format!("{}({arg})", self.sint(to)))
    }

    fn cvt_sint_to_bits(&self, _from: usize, to: usize, arg: &str) -> RtResult {
        Ok(format!("{}({arg})", self.bits(to)))
    }

    fn cvt_bits_to_sint(&self, from: usize, to: usize, arg: &str) -> RtResult {
        let signed = self.cvt_bits_to_int(from, true, arg)?;
        self.cvt_int_to_sint(to, &signed)
    }

    fn zero_extend(&self, _from: usize, to: usize, arg: &str) -> RtResult {
        Ok(format!("{}({arg})", self.bits(to)))
    }

    fn sign_extend(&self, from: usize, to: usize, arg: &str) -> RtResult {
        Ok(format!(
            "{}(({})({arg}))",
            self.bits(to),
            self.sint(from)
        ))
    }

    fn append_bits(&self, wa: usize, wb: usize, a: &str, b: &str) -> RtResult {
        let ty = self.bits(wa + wb);
        Ok(format!("(({ty}({a}) << {wb}) | {ty}({b}))"))
    }

    fn replicate_bits(&self, width: usize, count: usize, arg: &str) -> RtResult {
        let ty = self.bits(width * count.max(1));
        let mut out = String::new();
        for i in 0..count {
            if i > 0 {
                out.push_str(" | ");
            }
            let _ = write!(out, "({ty}({arg}) << {})", (count - 1 - i) * width);
        }
        if count == 0 {
            out.push_str("0");
        }
        Ok(format!("({out})"))
    }

    fn slice_get(&self, _base_width: usize, width: usize, base: &str, lo: &str) -> RtResult {
        if width == 0 {
            return Ok(format!("((void)({base}), (void)({lo}), {}(0))", self.bits(1)));
        }
        Ok(format!(
            "{}(({base}) >> ({lo}).to_int())",
            self.bits(width)
        ))
    }

    fn slice_set(
        &self,
        base_width: usize,
        width: usize,
        base: &str,
        lo: &str,
        value: &str,
    ) -> RtResult {
        let ty = self.bits(base_width);
        let keep = format!("((({ty})1 << {width}) - 1)");
        Ok(format!(
            "((({base}) & ~({keep} << ({lo}).to_int())) | (({ty}({value}) & {keep}) << ({lo}).to_int()))"
        ))
    }

    fn ram_init(&self, _addr_width: usize, ram: &str, value: &str) -> RtResult {
        Ok(format!("ASL_ram_init({ram}, ({value}).to_uint64())"))
    }

    fn ram_read(&self, _addr_width: usize, bytes: usize, ram: &str, addr: &str) -> RtResult {
        Ok(format!(
            "ASL_ram_read({ram}, ({addr}).to_uint64(), {bytes})"
        ))
    }

    fn ram_write(
        &self,
        _addr_width: usize,
        bytes: usize,
        ram: &str,
        addr: &str,
        value: &str,
    ) -> RtResult {
        Ok(format!(
            "ASL_ram_write({ram}, ({addr}).to_uint64(), {bytes}, ({value}).to_uint64())"
        ))
    }

    fn print_str(&self, arg: &str) -> String {
        format!("std::fputs({arg}, stdout)")
    }

    fn print_char(&self, arg: &str) -> String {
        format!("std::putchar(({arg}).to_int())")
    }

    fn print_int(&self, hex: bool, arg: &str) -> String {
        if hex {
            format!("std::printf(\"%llx\", (long long)({arg}).to_int64())")
        } else {
            format!("std::printf(\"%lld\", (long long)({arg}).to_int64())")
        }
    }

    fn print_sint(&self, width: usize, hex: bool, arg: &str) -> RtResult {
        Ok(format!(
            "std::printf(\"i{width}'{}%ll{}\", (long long)({arg}).to_int64())",
            if hex { "x" } else { "d" },
            if hex { "x" } else { "d" }
        ))
    }

    fn print_bits_hex(&self, width: usize, arg: &str) -> RtResult {
        Ok(format!(
            "std::printf(\"{width}'x%llx\", (unsigned long long)({arg}).to_uint64())"
        ))
    }

    fn ffi_c_type(&self, width: usize) -> RtResult {
        if width > 64 {
            return Err(unsupported("ac", "FFI values wider than 64 bits"));
        }
        Ok("uint64_t".to_string())
    }

    fn ffi_to_c(&self, _width: usize, arg: &str) -> RtResult {
        Ok(format!("({arg}).to_uint64()"))
    }

    fn ffi_from_c(&self, width: usize, arg: &str) -> RtResult {
        Ok(format!("{}({arg})", self.bits(width)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use num_bigint::BigUint;

    #[test]
    fn fallback_masks_at_width() {
        let rt = FallbackRuntime;
        let or = rt
            .bits_op(BitsOp::Or, 4, &["a".to_string(), "b".to_string()])
            .unwrap();
        assert_eq!(or, "((a) | (b))");
        let not = rt.bits_op(BitsOp::Not, 4, &["a".to_string()]).unwrap();
        assert!(not.contains("~"), "got {not}");
        assert!(not.contains("((UINT64_C(1) << 4) - 1)"), "got {not}");
    }

    #[test]
    fn fallback_rejects_wide_arithmetic_but_not_bitwise() {
        let rt = FallbackRuntime;
        let args = vec!["a".to_string(), "b".to_string()];
        assert!(rt.bits_op(BitsOp::Or, 128, &args).is_ok());
        assert!(rt.bits_op(BitsOp::Add, 128, &args).is_err());
        assert!(rt.sint_type(128).is_err());
    }

    #[test]
    fn width_zero_slice_still_evaluates_operands() {
        let rt = FallbackRuntime;
        let s = rt.slice_get(8, 0, "F()", "0").unwrap();
        assert!(s.contains("F()"), "base must still be evaluated: {s}");
    }

    #[test]
    fn c23_defers_to_bitint() {
        let rt = C23Runtime;
        assert_eq!(rt.bits_type(129).unwrap(), "unsigned _BitInt(129)");
        assert_eq!(rt.sint_type(9).unwrap(), "signed _BitInt(9)");
        let add = rt
            .bits_op(BitsOp::Add, 129, &["a".to_string(), "b".to_string()])
            .unwrap();
        assert!(add.contains("_BitInt(129)"), "got {add}");
    }

    #[test]
    fn ac_emits_library_types() {
        let rt = AcRuntime;
        assert_eq!(rt.bits_type(129).unwrap(), "ac_int<129, false>");
        assert_eq!(rt.sint_type(9).unwrap(), "ac_int<9, true>");
    }

    #[test]
    fn wide_helpers_cover_the_bitwise_set() {
        let helpers = fallback_wide_helpers(128);
        for name in ["and", "or", "xor", "not", "eq", "get_slice", "set_slice"] {
            assert!(
                helpers.contains(&format!("ASL_bits_128_{name}")),
                "missing {name}"
            );
        }
        assert!(helpers.contains("uint64_t w[2]"));
    }

    #[test]
    fn bits_literal_roundtrip_shapes() {
        let rt = FallbackRuntime;
        let b = Bits::new(8, BigUint::from(0xACu32));
        assert_eq!(rt.bits_literal(&b).unwrap(), "UINT64_C(0xac)");
        let rt = C23Runtime;
        assert!(rt.bits_literal(&b).unwrap().contains("0xacuwb"));
    }
}
