use asl_core::{check_evaluation_order, CheckOptions, Checker};

fn check(src: &str) -> Result<asl_ast::Declarations, Vec<asl_core::TypeError>> {
    let (mut checker, _) =
        Checker::with_prelude(CheckOptions::default()).expect("prelude loads");
    let decls = asl_parse::parse_source(src, "test.asl").expect("parse");
    check_evaluation_order(&decls)?;
    checker.check_declarations(decls)
}

fn check_err(src: &str) -> String {
    match check(src) {
        Ok(_) => panic!("expected a type error"),
        Err(errs) => errs
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join("\n"),
    }
}

#[test]
fn bits_or_function_typechecks() {
    let src = "func Test(x : bits(4), y : bits(4)) => bits(4)\nbegin\n    return x OR y;\nend\nfunc Run()\nbegin\n    print_bits_hex(Test('1100', '1010'));\nend";
    check(src).expect("typechecks");
}

#[test]
fn integer_comparison_typechecks() {
    let src = "func Test(x : integer, y : integer) => boolean\nbegin\n    return x >= y;\nend";
    check(src).expect("typechecks");
}

#[test]
fn sibling_bitvector_widths_must_agree() {
    let src = "func Bad(x : bits(4), y : bits(8)) => bits(4)\nbegin\n    return x OR y;\nend";
    let msg = check_err(src);
    assert!(msg.contains("OR") || msg.contains("bits"), "got: {msg}");
}

#[test]
fn record_constructor_requires_parameters() {
    // The constructor supplies no parameters although `R` declares one.
    let src = "record R(N) { x : bits(N); };\nfunc S4(r : R(4)) => bits(4)\nbegin\n    return r.x;\nend\nfunc Go() => bits(4)\nbegin\n    return S4(R{ x = '1110' });\nend";
    let msg = check_err(src);
    assert!(msg.contains("constructor parameters"), "got: {msg}");
}

#[test]
fn mutable_width_copy_is_not_provably_equal() {
    let src = "func F{A}(A, src : bits(A)) => boolean\nbegin\n    var B = A;\n    return zeros_bits(A) == zeros_bits(B);\nend";
    let msg = check_err(src);
    assert!(msg.contains("does not match"), "got: {msg}");
}

#[test]
fn immutable_width_copy_is_provably_equal() {
    let src = "func F{A}(A, src : bits(A)) => boolean\nbegin\n    let B = A;\n    return zeros_bits(A) == zeros_bits(B);\nend";
    check(src).expect("let-bound copy carries the equality");
}

#[test]
fn named_arguments_and_defaults_resolve() {
    let src = "func Extend(x : bits(8), count : integer = 2) => integer\nbegin\n    return count;\nend\nfunc Go() => integer\nbegin\n    return Extend(count = 3, x = '00000000');\nend\nfunc Go2() => integer\nbegin\n    return Extend('11111111');\nend";
    check(src).expect("typechecks");
}

#[test]
fn positional_after_named_is_rejected() {
    let src = "func Extend(x : bits(8), count : integer) => integer\nbegin\n    return count;\nend\nfunc Go() => integer\nbegin\n    return Extend(x = '00000000', 3);\nend";
    let msg = check_err(src);
    assert!(msg.contains("positional argument after named"), "got: {msg}");
}

#[test]
fn division_inserts_a_runtime_check() {
    let src = "func D(x : integer, y : integer) => integer\nbegin\n    return x QUOT y;\nend";
    let decls = check(src).expect("typechecks");
    let body = decls
        .iter()
        .find_map(|d| match d {
            asl_ast::Decl::FunDefn { sig, body, .. } if sig.name.name() == "D" => Some(body),
            _ => None,
        })
        .expect("definition");
    assert!(
        matches!(body[0], asl_ast::Stmt::Assert { .. }),
        "division must be guarded, got {:?}",
        body[0]
    );
}

#[test]
fn provable_division_needs_no_check() {
    let src = "func D(x : integer) => integer\nbegin\n    return x QUOT 4;\nend";
    let decls = check(src).expect("typechecks");
    let body = decls
        .iter()
        .find_map(|d| match d {
            asl_ast::Decl::FunDefn { sig, body, .. } if sig.name.name() == "D" => Some(body),
            _ => None,
        })
        .expect("definition");
    assert_eq!(body.len(), 1, "no assert expected: {body:?}");
}

#[test]
fn loop_variable_gets_subrange_refinement() {
    // `i` is in {0..3}, so it satisfies the constrained parameter without
    // a runtime check.
    let src = "func Narrow(x : integer {0..7}) => integer\nbegin\n    return x;\nend\nfunc Go() => integer\nbegin\n    var s : integer;\n    s = 0;\n    for i = 0 to 3 do\n        s = s + Narrow(i);\n    end\n    return s;\nend";
    check(src).expect("typechecks");
}

#[test]
fn constrained_argument_out_of_range_fails() {
    let src = "func Narrow(x : integer {0..7}) => integer\nbegin\n    return x;\nend\nfunc Go() => integer\nbegin\n    return Narrow(9);\nend";
    let msg = check_err(src);
    assert!(msg.contains("does not match"), "got: {msg}");
}

#[test]
fn evaluation_order_violation_is_reported() {
    let src = "var G : integer;\nfunc WX() => integer\nbegin\n    G = G + 1;\n    return G;\nend\nfunc Use() => integer\nbegin\n    return WX() + WX();\nend";
    let msg = check_err(src);
    assert!(msg.contains("evaluation order"), "got: {msg}");
}

#[test]
fn getters_and_setters_resolve_in_both_positions() {
    let src = "var _R : bits(8);\ngetter R => bits(8)\nbegin\n    return _R;\nend\nsetter R = value : bits(8)\nbegin\n    _R = value;\nend\nfunc Go() => bits(8)\nbegin\n    R = '10000001';\n    R[0] = '1';\n    return R;\nend";
    check(src).expect("typechecks");
}

#[test]
fn lone_getter_is_rejected() {
    let src = "var _R : bits(8);\ngetter R => bits(8)\nbegin\n    return _R;\nend";
    let msg = check_err(src);
    assert!(msg.contains("no matching setter"), "got: {msg}");
}

#[test]
fn exception_markers_must_match_the_definition() {
    let src = "exception Fault { code : integer; };\nfunc Boom!()\nbegin\n    throw Fault{ code = 1 };\nend\nfunc Go()\nbegin\n    Boom?();\nend";
    let msg = check_err(src);
    assert!(msg.contains("exception marker"), "got: {msg}");
}

#[test]
fn enum_members_compare_with_generated_equality() {
    let src = "enumeration Mode { User, Kernel };\nfunc Is(m : Mode) => boolean\nbegin\n    return m == Kernel;\nend";
    check(src).expect("typechecks");
}

#[test]
fn width_polymorphic_calls_synthesize_parameters() {
    let src = "func Pad{N}(x : bits(N)) => bits(N + N)\nbegin\n    return [x, x];\nend\nfunc Go() => bits(8)\nbegin\n    return Pad('1010');\nend";
    check(src).expect("typechecks");
}

#[test]
fn real_literals_are_unimplemented() {
    let src = "func Go() => integer\nbegin\n    let r = 1.5;\n    return 0;\nend";
    let msg = check_err(src);
    assert!(msg.contains("unimplemented"), "got: {msg}");
}

#[test]
fn register_fields_become_slices() {
    let src = "var PSTATE : bits(8) { [3:0] Mode, [4] Flag };\nfunc Go() => bits(4)\nbegin\n    PSTATE.Flag = '1';\n    return PSTATE.Mode;\nend";
    let decls = check(src).expect("typechecks");
    let body = decls
        .iter()
        .find_map(|d| match d {
            asl_ast::Decl::FunDefn { body, .. } => Some(body),
            _ => None,
        })
        .expect("definition");
    // The lvalue write and the read both turned into slice operations.
    assert!(matches!(
        &body[0],
        asl_ast::Stmt::Assign {
            lhs: asl_ast::LExpr::Slices { .. },
            ..
        }
    ));
    assert!(matches!(
        &body[1],
        asl_ast::Stmt::Return {
            value: Some(asl_ast::Expr::Slices { .. }),
            ..
        }
    ));
}
