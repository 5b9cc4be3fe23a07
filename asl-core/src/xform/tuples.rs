#![forbid(unsafe_code)]

//! Tuple elimination: functions returning tuples return generated record
//! types instead, and tuple-shaped bindings at call sites are rebuilt
//! from the record's `r0`, `r1`, … fields through a fresh temporary.

use std::collections::HashMap;

use asl_ast::{
    walk_decls, Decl, DeclTarget, Declarations, Expr, Field, Ident, LExpr, Loc, NameSupply,
    Stmt, Ty, Visitor,
};

use crate::env::{GlobalEnv, TypeDef};
use crate::error::TypeError;
use crate::xform::Transform;

pub struct Tuples {
    supply: NameSupply,
}

impl Tuples {
    pub fn new() -> Self {
        Self {
            supply: NameSupply::new("__tup"),
        }
    }
}

impl Default for Tuples {
    fn default() -> Self {
        Self::new()
    }
}

/// The deterministic field naming scheme for generated return records.
fn tuple_fields(elems: &[Ty]) -> Vec<Field> {
    elems
        .iter()
        .enumerate()
        .map(|(i, t)| Field {
            name: Ident::new(&format!("r{i}")),
            ty: t.clone(),
        })
        .collect()
}

fn return_record_name(fun: &Ident) -> Ident {
    if fun.tag() == 0 {
        Ident::new(&format!("__Return_{}", fun.name()))
    } else {
        Ident::new(&format!("__Return_{}_{}", fun.name(), fun.tag()))
    }
}

struct CallRewriter<'a> {
    rewritten: &'a HashMap<Ident, Ident>,
    supply: &'a mut NameSupply,
}

impl CallRewriter<'_> {
    fn record_of_call(&self, e: &Expr) -> Option<(Ident, Loc)> {
        if let Expr::Apply { name, loc, .. } = e {
            self.rewritten
                .get(name)
                .map(|rec| (rec.clone(), loc.clone()))
        } else {
            None
        }
    }

    fn explode(
        &mut self,
        record: Ident,
        loc: Loc,
        init: Expr,
        targets: Vec<(LExpr, Loc)>,
    ) -> Vec<Stmt> {
        let tmp = self.supply.fresh();
        let mut out = vec![Stmt::VarDecl {
            constant: true,
            ty: Some(Ty::Named {
                name: record.clone(),
                args: Vec::new(),
                loc: loc.clone(),
            }),
            target: DeclTarget::Single(tmp.clone()),
            init,
            loc: loc.clone(),
        }];
        for (i, (target, tloc)) in targets.into_iter().enumerate() {
            let value = Expr::Field {
                base: Box::new(Expr::Var {
                    name: tmp.clone(),
                    loc: tloc.clone(),
                }),
                field: Ident::new(&format!("r{i}")),
                loc: tloc.clone(),
            };
            match target {
                LExpr::Discard { .. } => {}
                other => out.push(Stmt::Assign {
                    lhs: other,
                    rhs: value,
                    loc: tloc,
                }),
            }
        }
        out
    }
}

impl Visitor for CallRewriter<'_> {
    fn map_stmt(&mut self, s: Stmt) -> Vec<Stmt> {
        match s {
            // `let (a, b) = F(...);` and `(a, b) = F(...);`
            Stmt::VarDecl {
                constant,
                ty,
                target: DeclTarget::Tuple(names),
                init,
                loc,
            } => match self.record_of_call(&init) {
                Some((record, rloc)) => {
                    let tmp = self.supply.fresh();
                    let mut out = vec![Stmt::VarDecl {
                        constant: true,
                        ty: Some(Ty::Named {
                            name: record,
                            args: Vec::new(),
                            loc: rloc.clone(),
                        }),
                        target: DeclTarget::Single(tmp.clone()),
                        init,
                        loc: loc.clone(),
                    }];
                    for (i, name) in names.into_iter().enumerate() {
                        out.push(Stmt::VarDecl {
                            constant,
                            ty: None,
                            target: DeclTarget::Single(name),
                            init: Expr::Field {
                                base: Box::new(Expr::Var {
                                    name: tmp.clone(),
                                    loc: loc.clone(),
                                }),
                                field: Ident::new(&format!("r{i}")),
                                loc: loc.clone(),
                            },
                            loc: loc.clone(),
                        });
                    }
                    out
                }
                None => vec![Stmt::VarDecl {
                    constant,
                    ty,
                    target: DeclTarget::Tuple(names),
                    init,
                    loc,
                }],
            },
            Stmt::Assign {
                lhs: LExpr::Tuple { elems, loc: tloc },
                rhs,
                loc,
            } => match self.record_of_call(&rhs) {
                Some((record, _)) => {
                    let targets = elems
                        .into_iter()
                        .map(|l| {
                            let lloc = l.loc().clone();
                            (l, lloc)
                        })
                        .collect();
                    self.explode(record, loc, rhs, targets)
                }
                None => vec![Stmt::Assign {
                    lhs: LExpr::Tuple { elems, loc: tloc },
                    rhs,
                    loc,
                }],
            },
            other => vec![other],
        }
    }
}

/// Rewrites `return (a, b, …)` into a record construction.
struct ReturnRewriter {
    record: Ident,
    error: Option<TypeError>,
}

impl Visitor for ReturnRewriter {
    fn map_stmt(&mut self, s: Stmt) -> Vec<Stmt> {
        match s {
            Stmt::Return {
                value: Some(Expr::Tuple { elems, loc: eloc }),
                loc,
            } => {
                let fields = elems
                    .into_iter()
                    .enumerate()
                    .map(|(i, e)| (Ident::new(&format!("r{i}")), e))
                    .collect();
                vec![Stmt::Return {
                    value: Some(Expr::Record {
                        name: self.record.clone(),
                        args: Vec::new(),
                        fields,
                        loc: eloc,
                    }),
                    loc,
                }]
            }
            Stmt::Return {
                value: Some(other),
                loc,
            } => {
                self.error.get_or_insert(TypeError::unimplemented(
                    &loc,
                    format!("non-literal tuple return `{other}`"),
                ));
                vec![Stmt::Return {
                    value: Some(other),
                    loc,
                }]
            }
            other => vec![other],
        }
    }
}

impl Transform for Tuples {
    fn name(&self) -> &'static str {
        "xform_tuples"
    }

    fn apply(
        &mut self,
        decls: Declarations,
        env: &mut GlobalEnv,
    ) -> Result<Declarations, TypeError> {
        // Find tuple-returning definitions, generate their record types,
        // and rewrite their signatures.
        let mut rewritten: HashMap<Ident, Ident> = HashMap::new();
        let mut records: Vec<Decl> = Vec::new();
        let mut out: Vec<Decl> = Vec::new();

        for d in decls {
            match d {
                Decl::FunDefn { mut sig, body, loc } => {
                    let tuple_elems = match &sig.rty {
                        Some(Ty::Tuple { elems, .. }) if !elems.is_empty() => {
                            Some(elems.clone())
                        }
                        _ => None,
                    };
                    match tuple_elems {
                        Some(elems) => {
                            let record = return_record_name(&sig.name);
                            let fields = tuple_fields(&elems);
                            records.push(Decl::Record {
                                name: record.clone(),
                                params: Vec::new(),
                                fields: fields.clone(),
                                loc: loc.clone(),
                            });
                            env.types.insert(
                                record.name().to_string(),
                                TypeDef::Record {
                                    params: Vec::new(),
                                    fields,
                                },
                            );
                            sig.rty = Some(Ty::Named {
                                name: record.clone(),
                                args: Vec::new(),
                                loc: loc.clone(),
                            });
                            // Keep the environment's candidate in step.
                            if let Some(cands) = env.funs.get_mut(sig.name.name()) {
                                for c in cands.iter_mut() {
                                    if c.name == sig.name {
                                        c.rty = sig.rty.clone();
                                    }
                                }
                            }
                            rewritten.insert(sig.name.clone(), record.clone());

                            let mut rr = ReturnRewriter {
                                record,
                                error: None,
                            };
                            let body = asl_ast::walk_stmts(&mut rr, body);
                            if let Some(e) = rr.error {
                                return Err(e);
                            }
                            out.push(Decl::FunDefn { sig, body, loc });
                        }
                        None => out.push(Decl::FunDefn { sig, body, loc }),
                    }
                }
                other => out.push(other),
            }
        }

        // Rebind call sites through temporaries.
        let mut cr = CallRewriter {
            rewritten: &rewritten,
            supply: &mut self.supply,
        };
        let mut result = walk_decls(&mut cr, out);

        let mut all = records;
        all.append(&mut result);
        Ok(all)
    }
}
