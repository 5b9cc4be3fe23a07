use asl_ast::{
    Binop, Change, Constraint, Decl, DeclTarget, Direction, Expr, FunKind, LExpr, Pattern, Slice,
    Stmt, Throws, Ty, Value,
};
use asl_parse::{parse_expr, parse_source, parse_source_with_recovery, parse_stmts};

#[test]
fn function_definition_with_bits_args() {
    let src = "func Test(x : bits(4), y : bits(4)) => bits(4)\nbegin\n    return x OR y;\nend";
    let decls = parse_source(src, "t.asl").expect("parse");
    assert_eq!(decls.len(), 1);
    match &decls[0] {
        Decl::FunDefn { sig, body, .. } => {
            assert_eq!(sig.name.name(), "Test");
            assert_eq!(sig.kind, FunKind::Function);
            assert_eq!(sig.args.len(), 2);
            assert!(matches!(sig.rty, Some(Ty::Bits { .. })));
            assert_eq!(body.len(), 1);
            match &body[0] {
                Stmt::Return { value: Some(e), .. } => {
                    assert!(matches!(e, Expr::Binop { op: Binop::BitOr, .. }));
                }
                other => panic!("expected return, got {other:?}"),
            }
        }
        other => panic!("expected function, got {other:?}"),
    }
}

#[test]
fn width_polymorphic_signature() {
    let src = "func ZeroExtend{N, M}(x : bits(N), width : integer = M) => bits(M)\nbegin\n    return x;\nend";
    let decls = parse_source(src, "t.asl").expect("parse");
    match &decls[0] {
        Decl::FunDefn { sig, .. } => {
            assert_eq!(sig.params.len(), 2);
            assert_eq!(sig.args.len(), 2);
            assert!(sig.args[1].default.is_some());
        }
        other => panic!("expected function, got {other:?}"),
    }
}

#[test]
fn exception_markers_on_defs_and_calls() {
    let src = "func Fail!() => integer\nbegin\n    return 0;\nend\nfunc Go?()\nbegin\n    Fail!();\nend";
    let decls = parse_source(src, "t.asl").expect("parse");
    match (&decls[0], &decls[1]) {
        (Decl::FunDefn { sig: f, .. }, Decl::FunDefn { sig: g, body, .. }) => {
            assert_eq!(f.throws, Throws::Always);
            assert_eq!(g.throws, Throws::May);
            match &body[0] {
                Stmt::Call { throws, .. } => assert_eq!(*throws, Throws::Always),
                other => panic!("expected call, got {other:?}"),
            }
        }
        other => panic!("unexpected decls: {other:?}"),
    }
}

#[test]
fn named_arguments_parse_in_any_position() {
    // The typechecker, not the parser, rejects named-before-positional.
    let e = parse_expr("F(width = 4, x)").expect("parse");
    match e {
        Expr::Call { args, .. } => {
            assert_eq!(args.len(), 2);
            assert!(args[0].0.is_some());
            assert!(args[1].0.is_none());
        }
        other => panic!("expected call, got {other:?}"),
    }
}

#[test]
fn getter_and_setter_forms() {
    let src = "getter PC => bits(64)\nbegin\n    return _PC;\nend\nsetter PC = value : bits(64)\nbegin\n    _PC = value;\nend\ngetter Mem[address : bits(64), size : integer] => bits(8)\nbegin\n    return ReadMem(address, size);\nend";
    let decls = parse_source(src, "t.asl").expect("parse");
    match (&decls[0], &decls[1], &decls[2]) {
        (
            Decl::FunDefn { sig: g, .. },
            Decl::FunDefn { sig: s, .. },
            Decl::FunDefn { sig: a, .. },
        ) => {
            assert_eq!(g.kind, FunKind::Getter);
            assert!(g.args.is_empty());
            assert_eq!(s.kind, FunKind::Setter);
            assert_eq!(s.args.len(), 1);
            assert_eq!(s.args[0].name.name(), "value");
            assert_eq!(a.kind, FunKind::Getter);
            assert_eq!(a.args.len(), 2);
        }
        other => panic!("unexpected decls: {other:?}"),
    }
}

#[test]
fn parameterised_record_and_construction() {
    let src = "record R(N) { x : bits(N); };";
    let decls = parse_source(src, "t.asl").expect("parse");
    match &decls[0] {
        Decl::Record { params, fields, .. } => {
            assert_eq!(params.len(), 1);
            assert_eq!(fields.len(), 1);
        }
        other => panic!("expected record, got {other:?}"),
    }

    let e = parse_expr("R(4){ x = '1111' }").expect("parse");
    match e {
        Expr::Record { args, fields, .. } => {
            assert_eq!(args.len(), 1);
            assert_eq!(fields.len(), 1);
        }
        other => panic!("expected record construction, got {other:?}"),
    }
}

#[test]
fn all_four_slice_forms() {
    let e = parse_expr("x[3]").expect("parse");
    let Expr::Slices { slices, .. } = e else {
        panic!("expected slices")
    };
    assert!(matches!(slices[0], Slice::Single(_)));

    let Expr::Slices { slices, .. } = parse_expr("x[7:0]").expect("parse") else {
        panic!("expected slices")
    };
    assert!(matches!(slices[0], Slice::HighLow(..)));

    let Expr::Slices { slices, .. } = parse_expr("x[0 +: 8]").expect("parse") else {
        panic!("expected slices")
    };
    assert!(matches!(slices[0], Slice::LowWidth(..)));

    let Expr::Slices { slices, .. } = parse_expr("x[15 -: 8]").expect("parse") else {
        panic!("expected slices")
    };
    assert!(matches!(slices[0], Slice::HighWidth(..)));

    let Expr::Slices { slices, .. } = parse_expr("x[i *: 8]").expect("parse") else {
        panic!("expected slices")
    };
    assert!(matches!(slices[0], Slice::Element(..)));

    // Multi-field selection and multiple slices.
    let Expr::Slices { slices, .. } = parse_expr("x[7:0, 15:8]").expect("parse") else {
        panic!("expected slices")
    };
    assert_eq!(slices.len(), 2);
    assert!(matches!(
        parse_expr("x.[a, b]").expect("parse"),
        Expr::Fields { .. }
    ));
}

#[test]
fn with_changes() {
    let e = parse_expr("x with { F = '1', [3:0] = v }").expect("parse");
    match e {
        Expr::WithChanges { changes, .. } => {
            assert!(matches!(changes[0], Change::Field(..)));
            assert!(matches!(changes[1], Change::Slices(..)));
        }
        other => panic!("expected with-changes, got {other:?}"),
    }
}

#[test]
fn constrained_integer_types() {
    let src = "func F(x : integer {0..31, 63}) => integer\nbegin\n    return x;\nend";
    let decls = parse_source(src, "t.asl").expect("parse");
    match &decls[0] {
        Decl::FunDefn { sig, .. } => match &sig.args[0].ty {
            Ty::Integer {
                constraints: Some(cs),
                ..
            } => {
                assert_eq!(cs.len(), 2);
                assert!(matches!(cs[0], Constraint::Range(..)));
                assert!(matches!(cs[1], Constraint::Single(_)));
            }
            other => panic!("expected constrained integer, got {other:?}"),
        },
        other => panic!("expected function, got {other:?}"),
    }
}

#[test]
fn statements_roundtrip() {
    let stmts = parse_stmts(
        "var s : integer; s = 0; for i = 3 downto 0 do s = s + i; end while s > 0 do s = s - 1; end repeat s = s + 1; until s == 10;",
        "t.asl",
    )
    .expect("parse");
    assert!(matches!(stmts[0], Stmt::VarDeclsNoInit { .. }));
    assert!(matches!(stmts[1], Stmt::Assign { .. }));
    assert!(matches!(
        stmts[2],
        Stmt::For {
            dir: Direction::Down,
            ..
        }
    ));
    assert!(matches!(stmts[3], Stmt::While { .. }));
    assert!(matches!(stmts[4], Stmt::Repeat { .. }));
}

#[test]
fn case_with_patterns_and_guard() {
    let stmts = parse_stmts(
        "case x of when 0 => s = 1; when 1, 2 where y > 0 => s = 2; when '1xx0' => s = 3; otherwise => s = 4; end",
        "t.asl",
    )
    .expect("parse");
    match &stmts[0] {
        Stmt::Case { alts, default, .. } => {
            assert_eq!(alts.len(), 3);
            assert!(matches!(alts[0].patterns[0], Pattern::Lit(Value::Int(_), _)));
            assert_eq!(alts[1].patterns.len(), 2);
            assert!(alts[1].guard.is_some());
            assert!(matches!(alts[2].patterns[0], Pattern::Mask(..)));
            assert!(default.is_some());
        }
        other => panic!("expected case, got {other:?}"),
    }
}

#[test]
fn try_catch_with_arms_and_default() {
    let stmts = parse_stmts(
        "try x = F(); catch exn when SeeBelow => y = 1; otherwise => y = 2; end",
        "t.asl",
    )
    .expect("parse");
    match &stmts[0] {
        Stmt::Try {
            bind,
            arms,
            default,
            ..
        } => {
            assert_eq!(bind.name(), "exn");
            assert_eq!(arms.len(), 1);
            assert!(default.is_some());
        }
        other => panic!("expected try, got {other:?}"),
    }
}

#[test]
fn tuple_and_bittuple_targets() {
    let stmts = parse_stmts("let (a, b) = F(); var [x, y] = z; (c, -) = G();", "t.asl")
        .expect("parse");
    assert!(matches!(
        &stmts[0],
        Stmt::VarDecl {
            target: DeclTarget::Tuple(names),
            constant: true,
            ..
        } if names.len() == 2
    ));
    assert!(matches!(
        &stmts[1],
        Stmt::VarDecl {
            target: DeclTarget::BitTuple(names),
            constant: false,
            ..
        } if names.len() == 2
    ));
    match &stmts[2] {
        Stmt::Assign {
            lhs: LExpr::Tuple { elems, .. },
            ..
        } => {
            assert!(matches!(elems[1], LExpr::Discard { .. }));
        }
        other => panic!("expected tuple assign, got {other:?}"),
    }
}

#[test]
fn operator_registration() {
    let src = "__operator2 + = add_int, add_bits;\n__operator1 NOT = not_bits;";
    let decls = parse_source(src, "t.asl").expect("parse");
    match &decls[0] {
        Decl::Operator2 { op, funs, .. } => {
            assert_eq!(*op, Binop::Plus);
            assert_eq!(funs.len(), 2);
        }
        other => panic!("expected operator2, got {other:?}"),
    }
    assert!(matches!(decls[1], Decl::Operator1 { .. }));
}

#[test]
fn as_and_in_operators() {
    assert!(matches!(
        parse_expr("x as {0..7}").expect("parse"),
        Expr::AsConstraint { .. }
    ));
    assert!(matches!(
        parse_expr("x as bits(8)").expect("parse"),
        Expr::AsType { .. }
    ));
    assert!(matches!(
        parse_expr("x IN '1xx0'").expect("parse"),
        Expr::In { .. }
    ));
    assert!(matches!(
        parse_expr("x IN {8, 16, 32}").expect("parse"),
        Expr::In { .. }
    ));
}

#[test]
fn recovery_collects_multiple_errors() {
    let src = "func A() begin return; end\nfunc B( begin end\nfunc C() begin return; end";
    let (decls, errors) = parse_source_with_recovery(src, "t.asl").expect("lex");
    assert!(!errors.is_empty());
    assert!(decls.len() >= 2);
}

#[test]
fn precedence_of_comparison_and_arithmetic() {
    let e = parse_expr("a + b == c * 2").expect("parse");
    match e {
        Expr::Binop {
            op: Binop::Eq,
            lhs,
            rhs,
            ..
        } => {
            assert!(matches!(*lhs, Expr::Binop { op: Binop::Plus, .. }));
            assert!(matches!(*rhs, Expr::Binop { op: Binop::Mul, .. }));
        }
        other => panic!("expected comparison at top, got {other:?}"),
    }
}
