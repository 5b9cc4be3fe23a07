use asl_backend_c::{emit, select_runtime, EmitOptions, RuntimeKind};
use asl_core::xform::{run_pipeline, XformConfig};
use asl_core::{standard_pipeline, CheckOptions, Checker};

/// Full front-end + middle-end drive: parse, check, transform, emit.
fn compile(src: &str, kind: RuntimeKind, opts: &mut EmitOptions) -> Vec<(String, String)> {
    let (mut checker, _) =
        Checker::with_prelude(CheckOptions::default()).expect("prelude loads");
    let decls = asl_parse::parse_source(src, "test.asl").expect("parse");
    let decls = match checker.check_declarations(decls) {
        Ok(d) => d,
        Err(errs) => panic!("typecheck failed: {errs:?}"),
    };
    let cfg = XformConfig {
        exports: opts.exports.clone(),
        bounded: false,
        ..Default::default()
    };
    let mut passes = standard_pipeline(&cfg);
    let decls =
        run_pipeline(decls, &mut checker.env, &mut passes).expect("pipeline runs");
    let runtime = select_runtime(kind);
    emit(&decls, runtime.as_ref(), opts)
        .expect("emission succeeds")
        .into_iter()
        .map(|f| (f.name, f.contents))
        .collect()
}

fn find<'a>(files: &'a [(String, String)], name: &str) -> &'a str {
    files
        .iter()
        .find(|(n, _)| n == name)
        .map(|(_, c)| c.as_str())
        .unwrap_or_else(|| panic!("no file {name}: have {:?}", files.iter().map(|(n, _)| n).collect::<Vec<_>>()))
}

const SIMPLE: &str = "func Test(x : bits(4), y : bits(4)) => bits(4)\nbegin\n    return x OR y;\nend\nfunc Main()\nbegin\n    print_bits_hex(Test('1100', '1010'));\nend";

#[test]
fn emits_the_expected_file_set() {
    let mut opts = EmitOptions::new("sim");
    opts.exports = vec!["Main".to_string()];
    let files = compile(SIMPLE, RuntimeKind::Fallback, &mut opts);
    let names: Vec<&String> = files.iter().map(|(n, _)| n).collect();
    for expected in [
        "sim_types.h",
        "sim_exceptions.h",
        "sim_exceptions.c",
        "sim_vars.h",
        "sim_vars.c",
        "sim_funs.c",
    ] {
        assert!(
            names.iter().any(|n| *n == expected),
            "missing {expected}: {names:?}"
        );
    }
}

#[test]
fn function_splitting_distributes_chunks() {
    let mut src = String::new();
    for i in 0..6 {
        src.push_str(&format!(
            "func F{i}() => integer\nbegin\n    return {i};\nend\n"
        ));
    }
    src.push_str("func Main()\nbegin\n    print_int_dec(F0() + F1() + F2() + F3() + F4() + F5());\nend\n");
    let mut opts = EmitOptions::new("sim");
    opts.exports = vec!["Main".to_string()];
    opts.num_c_files = 3;
    let files = compile(&src, RuntimeKind::Fallback, &mut opts);
    let chunked: Vec<&String> = files
        .iter()
        .map(|(n, _)| n)
        .filter(|n| n.starts_with("sim_funs_"))
        .collect();
    assert_eq!(chunked.len(), 3, "have {chunked:?}");
}

#[test]
fn fallback_emits_masked_or() {
    let mut opts = EmitOptions::new("sim");
    opts.exports = vec!["Main".to_string()];
    let files = compile(SIMPLE, RuntimeKind::Fallback, &mut opts);
    let funs = find(&files, "sim_funs.c");
    assert!(funs.contains("|"), "missing OR: {funs}");
    assert!(funs.contains("Test"), "missing function: {funs}");
}

#[test]
fn c23_uses_bitint_types() {
    let mut opts = EmitOptions::new("sim");
    opts.exports = vec!["Main".to_string()];
    let files = compile(SIMPLE, RuntimeKind::C23, &mut opts);
    let funs = find(&files, "sim_funs.c");
    assert!(funs.contains("_BitInt"), "missing _BitInt: {funs}");
}

#[test]
fn ac_uses_library_types() {
    let mut opts = EmitOptions::new("sim");
    opts.exports = vec!["Main".to_string()];
    let files = compile(SIMPLE, RuntimeKind::Ac, &mut opts);
    let funs = find(&files, "sim_funs.c");
    assert!(funs.contains("ac_int<"), "missing ac_int: {funs}");
}

#[test]
fn exception_machinery_has_tags_union_and_checks() {
    let src = "exception Fault { code : integer; };\nexception Abort { };\nfunc Boom!()\nbegin\n    throw Fault{ code = 1 };\nend\nfunc Main()\nbegin\n    try\n        Boom!();\n    catch exn\n        when Fault => print_int_dec(exn.code);\n        otherwise => println();\n    end\nend";
    let mut opts = EmitOptions::new("sim");
    opts.exports = vec!["Main".to_string()];
    let files = compile(src, RuntimeKind::Fallback, &mut opts);

    let exc_h = find(&files, "sim_exceptions.h");
    assert!(exc_h.contains("ASL_no_exception"));
    assert!(exc_h.contains("ASL_tag_Fault"));
    assert!(exc_h.contains("union"));
    assert!(exc_h.contains("extern ASL_exception_t ASL_exception;"));

    let exc_c = find(&files, "sim_exceptions.c");
    assert!(exc_c.contains("ASL_exception_t ASL_exception;"));

    let funs = find(&files, "sim_funs.c");
    // Throw sets the tag and jumps.
    assert!(funs.contains("ASL_exception.ASL_tag = ASL_tag_Fault;"), "{funs}");
    assert!(funs.contains("goto"), "{funs}");
    // The may-throw call is followed by a tag check.
    assert!(
        funs.contains("if (ASL_exception.ASL_tag != ASL_no_exception) goto"),
        "{funs}"
    );
    // Catch arms reset the tag before running the handler.
    assert!(
        funs.contains("ASL_exception.ASL_tag = ASL_no_exception;"),
        "{funs}"
    );
}

#[test]
fn reserved_words_are_renamed() {
    let src = "func switch(x : integer) => integer\nbegin\n    let int = x;\n    return int;\nend\nfunc Main()\nbegin\n    print_int_dec(switch(1));\nend";
    let mut opts = EmitOptions::new("sim");
    opts.exports = vec!["Main".to_string()];
    let files = compile(src, RuntimeKind::Fallback, &mut opts);
    let funs = find(&files, "sim_funs.c");
    assert!(funs.contains("__asl_switch"), "{funs}");
    assert!(funs.contains("__asl_int"), "{funs}");
    assert!(!funs.contains(" switch("), "{funs}");
}

#[test]
fn line_info_emits_directives() {
    let mut opts = EmitOptions::new("sim");
    opts.exports = vec!["Main".to_string()];
    opts.line_info = true;
    let files = compile(SIMPLE, RuntimeKind::Fallback, &mut opts);
    let funs = find(&files, "sim_funs.c");
    assert!(funs.contains("#line"), "{funs}");
    assert!(funs.contains("\"test.asl\""), "{funs}");
}

#[test]
fn ffi_wrappers_delegate_to_tagged_entries() {
    let src = "func Step(x : bits(32)) => bits(32)\nbegin\n    return x;\nend\nfunc Main()\nbegin\n    - = Step('00000000000000000000000000000000');\nend";
    let mut opts = EmitOptions::new("sim");
    opts.exports = vec!["Step".to_string(), "Main".to_string()];
    opts.new_ffi = true;
    let files = compile(src, RuntimeKind::Fallback, &mut opts);
    let funs = find(&files, "sim_funs.c");
    // A plain-C wrapper named exactly `Step` exists and calls the tagged
    // definition.
    assert!(funs.contains("uint64_t Step(uint64_t"), "{funs}");
    assert!(funs.contains("Step__"), "{funs}");
}

#[test]
fn globals_land_in_vars_files() {
    let src = "var Counter : integer;\nfunc Main()\nbegin\n    Counter = Counter + 1;\nend";
    let mut opts = EmitOptions::new("sim");
    opts.exports = vec!["Main".to_string()];
    let files = compile(src, RuntimeKind::Fallback, &mut opts);
    assert!(find(&files, "sim_vars.h").contains("extern ASL_int_t Counter;"));
    assert!(find(&files, "sim_vars.c").contains("ASL_int_t Counter"));
}

#[test]
fn record_declarations_are_topologically_sorted() {
    let src = "record Inner { v : bits(8); };\nrecord Outer { i : Inner; };\nfunc Main()\nbegin\n    var o : Outer;\n    o.i.v = '00000001';\n    print_bits_hex(o.i.v);\nend";
    let mut opts = EmitOptions::new("sim");
    opts.exports = vec!["Main".to_string()];
    let files = compile(src, RuntimeKind::Fallback, &mut opts);
    let types = find(&files, "sim_types.h");
    let inner = types.find("typedef struct Inner").expect("Inner emitted");
    let outer = types.find("typedef struct Outer").expect("Outer emitted");
    assert!(inner < outer, "Inner must precede Outer:\n{types}");
}

#[test]
fn division_guard_survives_to_emission() {
    let src = "func D(x : integer, y : integer) => integer\nbegin\n    return x QUOT y;\nend\nfunc Main()\nbegin\n    print_int_dec(D(7, 2));\nend";
    let mut opts = EmitOptions::new("sim");
    opts.exports = vec!["Main".to_string()];
    let files = compile(src, RuntimeKind::Fallback, &mut opts);
    let funs = find(&files, "sim_funs.c");
    assert!(funs.contains("ASL_assert"), "{funs}");
}
