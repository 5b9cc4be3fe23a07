#![forbid(unsafe_code)]

//! Compact single-line printing of AST fragments, used by diagnostics
//! ("expected … got …") and by the entailment layer to key uninterpreted
//! terms.

use std::fmt;

use crate::ast::*;

fn comma_sep<T: fmt::Display>(f: &mut fmt::Formatter<'_>, items: &[T]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{item}")?;
    }
    Ok(())
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constraint::Single(e) => write!(f, "{e}"),
            Constraint::Range(lo, hi) => write!(f, "{lo}..{hi}"),
        }
    }
}

impl fmt::Display for Slice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Slice::Single(i) => write!(f, "{i}"),
            Slice::HighLow(hi, lo) => write!(f, "{hi}:{lo}"),
            Slice::LowWidth(lo, w) => write!(f, "{lo} +: {w}"),
            Slice::HighWidth(hi, w) => write!(f, "{hi} -: {w}"),
            Slice::Element(i, w) => write!(f, "{i} *: {w}"),
        }
    }
}

impl fmt::Display for Ty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Ty::Integer { constraints, .. } => {
                write!(f, "integer")?;
                if let Some(cs) = constraints {
                    write!(f, " {{")?;
                    comma_sep(f, cs)?;
                    write!(f, "}}")?;
                }
                Ok(())
            }
            Ty::Bits { width, fields, .. } => {
                write!(f, "bits({width})")?;
                if !fields.is_empty() {
                    write!(f, " {{ ... }}")?;
                }
                Ok(())
            }
            Ty::Named { name, args, .. } => {
                write!(f, "{name}")?;
                if !args.is_empty() {
                    write!(f, "(")?;
                    comma_sep(f, args)?;
                    write!(f, ")")?;
                }
                Ok(())
            }
            Ty::OfExpr { expr, .. } => write!(f, "typeof({expr})"),
            Ty::Array { index, element, .. } => {
                match index {
                    ArrayIndex::Enum(n) => write!(f, "array [{n}] of {element}"),
                    ArrayIndex::Size(e) => write!(f, "array [{e}] of {element}"),
                }
            }
            Ty::Tuple { elems, .. } => {
                write!(f, "(")?;
                comma_sep(f, elems)?;
                write!(f, ")")
            }
        }
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Pattern::Lit(v, _) => write!(f, "{v}"),
            Pattern::Const(n, _) => write!(f, "{n}"),
            Pattern::Wildcard(_) => write!(f, "-"),
            Pattern::Tuple(ps, _) => {
                write!(f, "(")?;
                comma_sep(f, ps)?;
                write!(f, ")")
            }
            Pattern::Set(ps, _) => {
                write!(f, "{{")?;
                comma_sep(f, ps)?;
                write!(f, "}}")
            }
            Pattern::Single(e, _) => write!(f, "{e}"),
            Pattern::Range(lo, hi, _) => write!(f, "{lo}..{hi}"),
            Pattern::Mask(m, _) => write!(f, "{m}"),
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Lit { value, .. } => write!(f, "{value}"),
            Expr::Var { name, .. } => write!(f, "{name}"),
            Expr::Field { base, field, .. } => write!(f, "{base}.{field}"),
            Expr::Fields { base, fields, .. } => {
                write!(f, "{base}.[")?;
                comma_sep(f, fields)?;
                write!(f, "]")
            }
            Expr::Index { base, index, .. } => write!(f, "{base}[{index}]"),
            Expr::Slices { base, slices, .. } => {
                write!(f, "{base}[")?;
                comma_sep(f, slices)?;
                write!(f, "]")
            }
            Expr::Record { name, args, fields, .. } => {
                write!(f, "{name}")?;
                if !args.is_empty() {
                    write!(f, "(")?;
                    comma_sep(f, args)?;
                    write!(f, ")")?;
                }
                write!(f, "{{")?;
                for (i, (n, e)) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{n} = {e}")?;
                }
                write!(f, "}}")
            }
            Expr::WithChanges { base, .. } => write!(f, "{base} with {{ ... }}"),
            Expr::If { arms, els, .. } => {
                for (i, (c, e)) in arms.iter().enumerate() {
                    let kw = if i == 0 { "if" } else { " elsif" };
                    write!(f, "{kw} {c} then {e}")?;
                }
                write!(f, " else {els} end")
            }
            Expr::Let { name, value, body, .. } => {
                write!(f, "__let {name} = {value} __in {body}")
            }
            Expr::Assert { cond, body, .. } => write!(f, "__assert {cond} __in {body}"),
            Expr::Call { name, args, throws, .. } => {
                write!(f, "{name}{throws}(")?;
                for (i, (n, e)) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    match n {
                        Some(n) => write!(f, "{n} = {e}")?,
                        None => write!(f, "{e}")?,
                    }
                }
                write!(f, ")")
            }
            Expr::Apply { name, params, args, throws, .. } => {
                write!(f, "{name}{throws}")?;
                if !params.is_empty() {
                    write!(f, "{{")?;
                    comma_sep(f, params)?;
                    write!(f, "}}")?;
                }
                write!(f, "(")?;
                comma_sep(f, args)?;
                write!(f, ")")
            }
            Expr::Tuple { elems, .. } => {
                write!(f, "(")?;
                comma_sep(f, elems)?;
                write!(f, ")")
            }
            Expr::Concat { elems, .. } => {
                write!(f, "[")?;
                comma_sep(f, elems)?;
                write!(f, "]")
            }
            Expr::Unop { op, operand, .. } => write!(f, "{op} ({operand})"),
            Expr::Binop { op, lhs, rhs, .. } => write!(f, "({lhs} {op} {rhs})"),
            Expr::AsConstraint { expr, constraints, .. } => {
                write!(f, "({expr} as {{")?;
                comma_sep(f, constraints)?;
                write!(f, "}})")
            }
            Expr::AsType { expr, ty, .. } => write!(f, "({expr} as {ty})"),
            Expr::ArrayInit { elems, .. } => {
                write!(f, "__array(")?;
                comma_sep(f, elems)?;
                write!(f, ")")
            }
            Expr::Unknown { ty, .. } => write!(f, "UNKNOWN : {ty}"),
            Expr::In { expr, pattern, .. } => write!(f, "({expr} IN {pattern})"),
        }
    }
}

impl fmt::Display for LExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LExpr::Discard { .. } => write!(f, "-"),
            LExpr::Var { name, .. } => write!(f, "{name}"),
            LExpr::Field { base, field, .. } => write!(f, "{base}.{field}"),
            LExpr::Fields { base, fields, .. } => {
                write!(f, "{base}.[")?;
                comma_sep(f, fields)?;
                write!(f, "]")
            }
            LExpr::Index { base, index, .. } => write!(f, "{base}[{index}]"),
            LExpr::Slices { base, slices, .. } => {
                write!(f, "{base}[")?;
                comma_sep(f, slices)?;
                write!(f, "]")
            }
            LExpr::BitTuple { elems, .. } => {
                write!(f, "[")?;
                comma_sep(f, elems)?;
                write!(f, "]")
            }
            LExpr::Tuple { elems, .. } => {
                write!(f, "(")?;
                comma_sep(f, elems)?;
                write!(f, ")")
            }
            LExpr::ReadWrite { getter, args, .. } => {
                write!(f, "{getter}[")?;
                comma_sep(f, args)?;
                write!(f, "]")
            }
            LExpr::Write { setter, args, .. } => {
                write!(f, "{setter}[")?;
                comma_sep(f, args)?;
                write!(f, "]")
            }
        }
    }
}
