#![forbid(unsafe_code)]

//! The ordered AST-to-AST rewrite pipeline.
//!
//! Each pass is idempotent on its own output and assumes its
//! prerequisites have already run. The standard order mirrors the
//! generated project script: reachability filtering, desugaring, slice
//! and bit-tuple lowering, accessor conversion, constant propagation,
//! monomorphization (twice, with a reachability sweep between), tuple
//! elimination, let hoisting, case lowering, optional global wrapping, a
//! final constant propagation, and optional integer bounding last since
//! it changes function types.

pub mod bittuples;
pub mod bounded;
pub mod case;
pub mod constprop;
pub mod desugar;
pub mod filter;
pub mod getset;
pub mod hoist_lets;
pub mod lower;
pub mod monomorphize;
pub mod named_type;
pub mod tuples;
pub mod wrap;

use asl_ast::{Declarations, Expr, Ident, Loc, Throws};

use crate::env::GlobalEnv;
use crate::error::TypeError;

pub trait Transform {
    fn name(&self) -> &'static str;
    fn apply(
        &mut self,
        decls: Declarations,
        env: &mut GlobalEnv,
    ) -> Result<Declarations, TypeError>;
}

/// Pipeline configuration distilled from the command line / project file.
#[derive(Clone, Debug, Default)]
pub struct XformConfig {
    pub exports: Vec<String>,
    pub imports: Vec<String>,
    /// Enable the integer-bounding pass.
    pub bounded: bool,
    /// Route global accesses through this thread-local pointer.
    pub wrap_pointer: Option<String>,
}

/// The fixed standard pipeline.
pub fn standard_pipeline(cfg: &XformConfig) -> Vec<Box<dyn Transform>> {
    let mut passes: Vec<Box<dyn Transform>> = Vec::new();
    passes.push(Box::new(filter::FilterReachable::new(
        cfg.exports.clone(),
        true,
    )));
    passes.push(Box::new(named_type::NamedType));
    passes.push(Box::new(desugar::Desugar));
    passes.push(Box::new(bittuples::BitTuples::new()));
    passes.push(Box::new(lower::LowerSlices));
    passes.push(Box::new(getset::GetSet::new()));
    passes.push(Box::new(constprop::ConstProp));
    passes.push(Box::new(monomorphize::Monomorphize::new()));
    passes.push(Box::new(filter::FilterReachable::new(
        cfg.exports.clone(),
        true,
    )));
    passes.push(Box::new(monomorphize::Monomorphize::new()));
    passes.push(Box::new(tuples::Tuples::new()));
    passes.push(Box::new(getset::GetSet::new()));
    passes.push(Box::new(bittuples::BitTuples::new()));
    passes.push(Box::new(hoist_lets::HoistLets::new()));
    passes.push(Box::new(case::LowerCase));
    if let Some(ptr) = &cfg.wrap_pointer {
        passes.push(Box::new(wrap::WrapGlobals::new(ptr)));
    }
    passes.push(Box::new(constprop::ConstProp));
    if cfg.bounded {
        passes.push(Box::new(bounded::BoundedInts::new()));
    }
    passes.push(Box::new(filter::FilterUnlisted::new(cfg.imports.clone())));
    passes.push(Box::new(filter::FilterReachable::new(
        cfg.exports.clone(),
        false,
    )));
    passes.push(Box::new(monomorphize::CheckMonomorphization));
    passes
}

/// Look up a single pass by its project-file command name.
pub fn by_name(name: &str, cfg: &XformConfig) -> Option<Box<dyn Transform>> {
    Some(match name {
        "xform_named_type" => Box::new(named_type::NamedType),
        "xform_desugar" => Box::new(desugar::Desugar),
        "xform_bittuples" => Box::new(bittuples::BitTuples::new()),
        "xform_lower" => Box::new(lower::LowerSlices),
        "xform_getset" => Box::new(getset::GetSet::new()),
        "xform_constprop" => Box::new(constprop::ConstProp),
        "xform_monomorphize" => Box::new(monomorphize::Monomorphize::new()),
        "xform_tuples" => Box::new(tuples::Tuples::new()),
        "xform_hoist_lets" => Box::new(hoist_lets::HoistLets::new()),
        "xform_case" => Box::new(case::LowerCase),
        "xform_bounded" => Box::new(bounded::BoundedInts::new()),
        "xform_wrap" => Box::new(wrap::WrapGlobals::new(
            cfg.wrap_pointer.as_deref().unwrap_or("thread_local_state"),
        )),
        "filter_reachable_from" => {
            Box::new(filter::FilterReachable::new(cfg.exports.clone(), true))
        }
        "filter_unlisted_functions" => {
            Box::new(filter::FilterUnlisted::new(cfg.imports.clone()))
        }
        "check_monomorphization" => Box::new(monomorphize::CheckMonomorphization),
        _ => return None,
    })
}

/// Run a pass list in order, fail-fast.
pub fn run_pipeline(
    mut decls: Declarations,
    env: &mut GlobalEnv,
    passes: &mut [Box<dyn Transform>],
) -> Result<Declarations, TypeError> {
    for pass in passes {
        decls = pass.apply(decls, env)?;
    }
    Ok(decls)
}

/// The tagged identifier of a primitive, for building resolved calls
/// inside passes.
pub(crate) fn prim(env: &GlobalEnv, base: &str) -> Ident {
    env.candidates(base)
        .first()
        .map(|s| s.name.clone())
        .unwrap_or_else(|| Ident::new(base))
}

pub(crate) fn prim_call(
    env: &GlobalEnv,
    base: &str,
    params: Vec<Expr>,
    args: Vec<Expr>,
    loc: Loc,
) -> Expr {
    Expr::Apply {
        name: prim(env, base),
        params,
        args,
        throws: Throws::No,
        loc,
    }
}
