#![forbid(unsafe_code)]

//! Reachability filtering: drop function definitions not reachable from
//! the exported entry points, and strip the bodies of functions the
//! session imports from foreign code.

use std::collections::{HashMap, HashSet, VecDeque};

use asl_ast::{walk_stmts, Action, Decl, Declarations, Expr, Ident, Stmt, Visitor};

use crate::env::GlobalEnv;
use crate::error::TypeError;
use crate::xform::Transform;

pub struct FilterReachable {
    exports: Vec<String>,
    keep_builtins: bool,
}

impl FilterReachable {
    pub fn new(exports: Vec<String>, keep_builtins: bool) -> Self {
        Self {
            exports,
            keep_builtins,
        }
    }
}

struct CallCollector {
    called: HashSet<String>,
}

impl Visitor for CallCollector {
    fn visit_expr(&mut self, e: &Expr) -> Action<Expr> {
        match e {
            Expr::Apply { name, .. } | Expr::Call { name, .. } => {
                self.called.insert(name.name().to_string());
            }
            _ => {}
        }
        Action::DoChildren
    }

    fn visit_stmt(&mut self, s: &Stmt) -> Action<Stmt> {
        if let Stmt::Apply { name, .. } | Stmt::Call { name, .. } = s {
            self.called.insert(name.name().to_string());
        }
        Action::DoChildren
    }

    fn visit_lexpr(&mut self, l: &asl_ast::LExpr) -> Action<asl_ast::LExpr> {
        match l {
            asl_ast::LExpr::ReadWrite { getter, setter, .. } => {
                self.called.insert(getter.name().to_string());
                self.called.insert(setter.name().to_string());
            }
            asl_ast::LExpr::Write { setter, .. } => {
                self.called.insert(setter.name().to_string());
            }
            _ => {}
        }
        Action::DoChildren
    }
}

fn callees_of(body: &[Stmt]) -> HashSet<String> {
    let mut collector = CallCollector {
        called: HashSet::new(),
    };
    let _ = walk_stmts(&mut collector, body.to_vec());
    collector.called
}

impl Transform for FilterReachable {
    fn name(&self) -> &'static str {
        "filter_reachable_from"
    }

    fn apply(
        &mut self,
        decls: Declarations,
        _env: &mut GlobalEnv,
    ) -> Result<Declarations, TypeError> {
        // Base-name call graph: all overloads of a called base name stay.
        let mut bodies: HashMap<String, Vec<HashSet<String>>> = HashMap::new();
        for d in &decls {
            if let Decl::FunDefn { sig, body, .. } = d {
                bodies
                    .entry(sig.name.name().to_string())
                    .or_default()
                    .push(callees_of(body));
            }
        }

        let mut live: HashSet<String> = HashSet::new();
        let mut queue: VecDeque<String> = self.exports.iter().cloned().collect();
        // Getter/setter pairs of an exported accessor travel together.
        while let Some(name) = queue.pop_front() {
            if !live.insert(name.clone()) {
                continue;
            }
            if let Some(calls) = bodies.get(&name) {
                for set in calls {
                    for callee in set {
                        if !live.contains(callee) {
                            queue.push_back(callee.clone());
                        }
                    }
                }
            }
        }

        let keep_fun = |name: &Ident| -> bool {
            live.contains(name.name())
                || live.is_empty() // no exports configured: keep everything
        };

        Ok(decls
            .into_iter()
            .filter(|d| match d {
                Decl::FunDefn { sig, .. } => keep_fun(&sig.name),
                Decl::FunType { sig, .. } => keep_fun(&sig.name),
                Decl::BuiltinFun { sig, .. } => self.keep_builtins || keep_fun(&sig.name),
                _ => true,
            })
            .collect())
    }
}

pub struct FilterUnlisted {
    imports: Vec<String>,
}

impl FilterUnlisted {
    pub fn new(imports: Vec<String>) -> Self {
        Self { imports }
    }
}

impl Transform for FilterUnlisted {
    fn name(&self) -> &'static str {
        "filter_unlisted_functions"
    }

    /// Imported functions are provided by foreign code: their ASL bodies
    /// are dropped and only the prototype survives for the emitter.
    fn apply(
        &mut self,
        decls: Declarations,
        _env: &mut GlobalEnv,
    ) -> Result<Declarations, TypeError> {
        let imported: HashSet<&str> = self.imports.iter().map(|s| s.as_str()).collect();
        Ok(decls
            .into_iter()
            .map(|d| match d {
                Decl::FunDefn { sig, loc, .. } if imported.contains(sig.name.name()) => {
                    Decl::FunType { sig, loc }
                }
                other => other,
            })
            .collect())
    }
}
