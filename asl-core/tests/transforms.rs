use asl_ast::{Decl, Declarations, Expr, Slice, Stmt};
use asl_core::xform::{self, Transform, XformConfig};
use asl_core::{CheckOptions, Checker};

/// Parse, typecheck, and return the user declarations plus the checker
/// whose environment the passes need.
fn checked(src: &str) -> (Checker, Declarations) {
    let (mut checker, _) =
        Checker::with_prelude(CheckOptions::default()).expect("prelude loads");
    let decls = asl_parse::parse_source(src, "test.asl").expect("parse");
    let decls = match checker.check_declarations(decls) {
        Ok(d) => d,
        Err(errs) => panic!("typecheck failed: {errs:?}"),
    };
    (checker, decls)
}

fn run_pass(name: &str, checker: &mut Checker, decls: Declarations) -> Declarations {
    let cfg = XformConfig::default();
    let mut pass = xform::by_name(name, &cfg).expect("known pass");
    pass.apply(decls, &mut checker.env).expect("pass applies")
}

fn body_of<'a>(decls: &'a Declarations, name: &str) -> &'a Vec<Stmt> {
    decls
        .iter()
        .find_map(|d| match d {
            Decl::FunDefn { sig, body, .. } if sig.name.name() == name => Some(body),
            _ => None,
        })
        .unwrap_or_else(|| panic!("no definition of {name}"))
}

#[test]
fn slices_normalise_to_low_width() {
    let src = "func Go(x : bits(16)) => bits(8)\nbegin\n    return x[15:8];\nend";
    let (mut checker, decls) = checked(src);
    let decls = run_pass("xform_lower", &mut checker, decls);
    match &body_of(&decls, "Go")[0] {
        Stmt::Return {
            value: Some(Expr::Slices { slices, .. }),
            ..
        } => {
            let [Slice::LowWidth(lo, w)] = slices.as_slice() else {
                panic!("not lowered: {slices:?}");
            };
            assert_eq!(format!("{lo}"), "8");
            assert_eq!(format!("{w}"), "8");
        }
        other => panic!("unexpected body: {other:?}"),
    }
}

#[test]
fn lower_is_idempotent() {
    let src = "func Go(x : bits(16)) => bits(8)\nbegin\n    return x[8 +: 8];\nend";
    let (mut checker, decls) = checked(src);
    let once = run_pass("xform_lower", &mut checker, decls);
    let twice = run_pass("xform_lower", &mut checker, once.clone());
    assert_eq!(once, twice);
}

#[test]
fn bittuple_assignment_becomes_slice_reads() {
    let src = "func Split(z : bits(8)) => bits(4)\nbegin\n    var x : bits(4);\n    var y : bits(4);\n    [x, y] = z;\n    return y;\nend";
    let (mut checker, decls) = checked(src);
    let decls = run_pass("xform_bittuples", &mut checker, decls);
    let body = body_of(&decls, "Split");
    // var x; var y; tmp decl; x = tmp[4 +: 4]; y = tmp[0 +: 4]; return y
    assert_eq!(body.len(), 6, "body: {body:#?}");
    assert!(matches!(&body[2], Stmt::VarDecl { .. }));
    match (&body[3], &body[4]) {
        (
            Stmt::Assign { rhs: Expr::Slices { slices: s1, .. }, .. },
            Stmt::Assign { rhs: Expr::Slices { slices: s2, .. }, .. },
        ) => {
            let Slice::LowWidth(lo1, _) = &s1[0] else { panic!() };
            let Slice::LowWidth(lo2, _) = &s2[0] else { panic!() };
            assert_eq!(format!("{lo1}"), "4");
            assert_eq!(format!("{lo2}"), "0");
        }
        other => panic!("unexpected: {other:?}"),
    }
}

#[test]
fn case_lowers_to_if_chain_with_error_default() {
    let src = "func Classify(x : integer) => integer\nbegin\n    case x of\n        when 0 => return 10;\n        when 1, 2 => return 20;\n    end\n    return 0;\nend";
    let (mut checker, decls) = checked(src);
    let decls = run_pass("xform_case", &mut checker, decls);
    match &body_of(&decls, "Classify")[0] {
        Stmt::If { arms, els, .. } => {
            assert_eq!(arms.len(), 2);
            // Missing default calls the unmatched-case primitive.
            match &els[0] {
                Stmt::Apply { name, .. } => {
                    assert_eq!(name.name(), "__unmatched_case");
                }
                other => panic!("unexpected default: {other:?}"),
            }
        }
        other => panic!("case not lowered: {other:?}"),
    }
}

#[test]
fn getset_rewrites_accessor_assignments() {
    let src = "var _R : bits(8);\ngetter R => bits(8)\nbegin\n    return _R;\nend\nsetter R = value : bits(8)\nbegin\n    _R = value;\nend\nfunc Go()\nbegin\n    R = '00000000';\n    R[0] = '1';\nend";
    let (mut checker, decls) = checked(src);
    let decls = run_pass("xform_lower", &mut checker, decls);
    let decls = run_pass("xform_getset", &mut checker, decls);
    let body = body_of(&decls, "Go");
    // Whole write: a single setter call.
    match &body[0] {
        Stmt::Apply { name, args, .. } => {
            assert!(name.name().ends_with("__setter"), "got {name}");
            assert_eq!(args.len(), 1);
        }
        other => panic!("not a setter call: {other:?}"),
    }
    // Partial write: read-modify-write through a temporary.
    assert!(
        matches!(&body[1], Stmt::VarDecl { .. }),
        "expected getter read, got {:?}",
        body[1]
    );
    assert!(matches!(&body[2], Stmt::Assign { .. }));
    match &body[3] {
        Stmt::Apply { name, .. } => assert!(name.name().ends_with("__setter")),
        other => panic!("missing write-back: {other:?}"),
    }
}

#[test]
fn constprop_inlines_and_folds() {
    let src = "constant WIDTH = 8;\nfunc Go() => integer\nbegin\n    return WIDTH + WIDTH;\nend";
    let (mut checker, decls) = checked(src);
    let decls = run_pass("xform_constprop", &mut checker, decls);
    match &body_of(&decls, "Go")[0] {
        Stmt::Return {
            value: Some(Expr::Lit { value, .. }),
            ..
        } => assert_eq!(format!("{value}"), "16"),
        other => panic!("not folded: {other:?}"),
    }
}

#[test]
fn tuples_become_return_records() {
    let src = "func Pair() => (integer, integer)\nbegin\n    return (1, 2);\nend\nfunc Go() => integer\nbegin\n    let (a, b) = Pair();\n    return a + b;\nend";
    let (mut checker, decls) = checked(src);
    let decls = run_pass("xform_tuples", &mut checker, decls);

    // A generated record type with fields r0, r1 exists.
    let record = decls
        .iter()
        .find_map(|d| match d {
            Decl::Record { name, fields, .. } if name.name().starts_with("__Return_Pair") => {
                Some(fields)
            }
            _ => None,
        })
        .expect("return record generated");
    assert_eq!(record.len(), 2);
    assert_eq!(record[0].name.name(), "r0");
    assert_eq!(record[1].name.name(), "r1");

    // The definition now returns the record.
    match &body_of(&decls, "Pair")[0] {
        Stmt::Return {
            value: Some(Expr::Record { fields, .. }),
            ..
        } => assert_eq!(fields.len(), 2),
        other => panic!("return not rewritten: {other:?}"),
    }

    // The call site binds a temporary and projects the fields.
    let go = body_of(&decls, "Go");
    assert!(go.len() >= 3, "call site not exploded: {go:#?}");
    assert!(matches!(&go[1], Stmt::VarDecl { init: Expr::Field { .. }, .. }));
}

#[test]
fn monomorphization_specialises_and_cascades() {
    let src = "func Invert{N}(x : bits(N)) => bits(N)\nbegin\n    return NOT x;\nend\nfunc Outer{N}(x : bits(N)) => bits(N)\nbegin\n    return Invert(x);\nend\nfunc Go() => bits(4)\nbegin\n    return Outer('1010');\nend";
    let (mut checker, decls) = checked(src);
    let decls = run_pass("xform_monomorphize", &mut checker, decls);

    let clones: Vec<String> = decls
        .iter()
        .filter_map(|d| match d {
            Decl::FunDefn { sig, .. } if sig.params.is_empty() && sig.name.name().contains('_') => {
                Some(sig.name.name().to_string())
            }
            _ => None,
        })
        .collect();
    assert!(
        clones.iter().any(|n| n.starts_with("Outer_4")),
        "clones: {clones:?}"
    );
    // The cascade reaches the inner polymorphic call.
    assert!(
        clones.iter().any(|n| n.starts_with("Invert_4")),
        "clones: {clones:?}"
    );

    // The entry point now calls the specialised clone with no params.
    match &body_of(&decls, "Go")[0] {
        Stmt::Return {
            value: Some(Expr::Apply { name, params, .. }),
            ..
        } => {
            assert!(name.name().starts_with("Outer_4"));
            assert!(params.is_empty());
        }
        other => panic!("call not redirected: {other:?}"),
    }

    // Idempotence: a second run creates nothing new.
    let count = decls.len();
    let again = run_pass("xform_monomorphize", &mut checker, decls);
    assert_eq!(again.len(), count);
}

#[test]
fn monomorphization_termination_one_clone_per_width() {
    let src = "func Invert{N}(x : bits(N)) => bits(N)\nbegin\n    return NOT x;\nend\nfunc Go() => bits(4)\nbegin\n    let a = Invert('1010');\n    let b = Invert('1100');\n    let c = Invert('10101010');\n    return a;\nend";
    let (mut checker, decls) = checked(src);
    let decls = run_pass("xform_monomorphize", &mut checker, decls);
    let clones: Vec<String> = decls
        .iter()
        .filter_map(|d| match d {
            Decl::FunDefn { sig, .. }
                if sig.params.is_empty() && sig.name.name().starts_with("Invert_") =>
            {
                Some(sig.name.name().to_string())
            }
            _ => None,
        })
        .collect();
    // Two distinct width tuples -> exactly two clones.
    assert_eq!(clones.len(), 2, "clones: {clones:?}");
}

#[test]
fn check_monomorphization_reports_untreated_calls() {
    let src = "func Invert{N}(x : bits(N)) => bits(N)\nbegin\n    return NOT x;\nend\nfunc Outer{N}(x : bits(N)) => bits(N)\nbegin\n    return Invert(x);\nend";
    let (mut checker, decls) = checked(src);
    let cfg = XformConfig::default();
    let mut pass = xform::by_name("check_monomorphization", &cfg).expect("known pass");
    let err = pass
        .apply(decls, &mut checker.env)
        .expect_err("must report");
    assert!(err.to_string().contains("width-polymorphic"), "got: {err}");
}

#[test]
fn bounded_ints_assign_sized_representations() {
    let src = "func Clamp(x : integer {0..255}) => integer {0..255}\nbegin\n    return x;\nend";
    let (mut checker, decls) = checked(src);
    let decls = run_pass("xform_bounded", &mut checker, decls);
    let sig = decls
        .iter()
        .find_map(|d| match d {
            Decl::FunDefn { sig, .. } if sig.name.name() == "Clamp" => Some(sig),
            _ => None,
        })
        .expect("definition");
    // [0, 255] needs 9 bits including the sign bit.
    assert_eq!(format!("{}", sig.args[0].ty), "__sint(9)");
    assert_eq!(format!("{}", sig.rty.clone().expect("rty")), "__sint(9)");
}

#[test]
fn bounded_ints_insert_conversions_at_boundaries() {
    let src = "func Narrow(x : integer {0..15}) => integer\nbegin\n    return x;\nend\nfunc Go(y : integer) => integer\nbegin\n    return Narrow(12);\nend";
    let (mut checker, decls) = checked(src);
    let decls = run_pass("xform_bounded", &mut checker, decls);
    // Narrow's body converts the sized argument back to integer.
    match &body_of(&decls, "Narrow")[0] {
        Stmt::Return {
            value: Some(Expr::Apply { name, .. }),
            ..
        } => assert_eq!(name.name(), "cvt_sintN_int"),
        other => panic!("missing conversion: {other:?}"),
    }
    // The call site converts the literal into the sized argument.
    match &body_of(&decls, "Go")[0] {
        Stmt::Return {
            value: Some(Expr::Apply { args, .. }),
            ..
        } => match &args[0] {
            Expr::Apply { name, .. } => assert_eq!(name.name(), "cvt_int_sintN"),
            other => panic!("unconverted argument: {other:?}"),
        },
        other => panic!("unexpected body: {other:?}"),
    }
}

#[test]
fn wrap_routes_globals_through_pointer() {
    let src = "var G : integer;\nfunc Go() => integer\nbegin\n    G = 1;\n    return G;\nend";
    let (mut checker, decls) = checked(src);
    let cfg = XformConfig {
        wrap_pointer: Some("tls".to_string()),
        ..Default::default()
    };
    let mut pass = xform::by_name("xform_wrap", &cfg).expect("known pass");
    let decls = pass.apply(decls, &mut checker.env).expect("pass applies");
    let body = body_of(&decls, "Go");
    assert!(matches!(
        &body[0],
        Stmt::Assign {
            lhs: asl_ast::LExpr::Field { .. },
            ..
        }
    ));
    assert!(matches!(
        &body[1],
        Stmt::Return {
            value: Some(Expr::Field { .. }),
            ..
        }
    ));
}

#[test]
fn filter_reachable_drops_dead_functions() {
    let src = "func Dead() => integer\nbegin\n    return 1;\nend\nfunc Live() => integer\nbegin\n    return 2;\nend\nfunc Main() => integer\nbegin\n    return Live();\nend";
    let (mut checker, decls) = checked(src);
    let mut pass: Box<dyn Transform> = Box::new(
        asl_core::xform::filter::FilterReachable::new(vec!["Main".to_string()], true),
    );
    let decls = pass.apply(decls, &mut checker.env).expect("pass applies");
    let names: Vec<&str> = decls
        .iter()
        .filter_map(|d| match d {
            Decl::FunDefn { sig, .. } => Some(sig.name.name()),
            _ => None,
        })
        .collect();
    assert!(names.contains(&"Main"));
    assert!(names.contains(&"Live"));
    assert!(!names.contains(&"Dead"));
}

#[test]
fn standard_pipeline_runs_end_to_end() {
    let src = "func Test(x : bits(4), y : bits(4)) => bits(4)\nbegin\n    return x OR y;\nend\nfunc Main()\nbegin\n    print_bits_hex(Test('1100', '1010'));\nend";
    let (mut checker, decls) = checked(src);
    let cfg = XformConfig {
        exports: vec!["Main".to_string()],
        bounded: true,
        ..Default::default()
    };
    let mut passes = asl_core::standard_pipeline(&cfg);
    let decls = asl_core::xform::run_pipeline(decls, &mut checker.env, &mut passes)
        .expect("pipeline runs");
    assert!(decls
        .iter()
        .any(|d| matches!(d, Decl::FunDefn { sig, .. } if sig.name.name() == "Main")));
}
