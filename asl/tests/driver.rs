use std::fs;

use asl::{Configuration, Session, SessionOptions};
use asl_backend_c::RuntimeKind;

fn temp_dir(tag: &str) -> std::path::PathBuf {
    let dir = std::env::temp_dir().join(format!("asl-driver-{tag}-{}", std::process::id()));
    let _ = fs::remove_dir_all(&dir);
    fs::create_dir_all(&dir).expect("mkdir");
    dir
}

const SPEC: &str = "func Test(x : bits(4), y : bits(4)) => bits(4)\nbegin\n    return x OR y;\nend\nfunc Main()\nbegin\n    print_bits_hex(Test('1100', '1010'));\nend\n";

#[test]
fn project_commands_drive_the_pipeline_to_c() {
    let dir = temp_dir("project");
    let src = dir.join("spec.asl");
    fs::write(&src, SPEC).expect("write");

    let config = Configuration {
        exports: vec!["Main".to_string()],
        imports: vec![],
    };
    let mut session = Session::load(
        &[src.display().to_string()],
        config,
        &SessionOptions::default(),
    )
    .expect("load");

    let out = dir.join("genc");
    let project = format!(
        "// generated project\n:filter_reachable_from exports\n:xform_named_type\n:xform_desugar\n:xform_bittuples\n:xform_lower\n:xform_getset\n:xform_constprop\n:xform_monomorphize\n:xform_tuples\n:xform_hoist_lets\n:xform_case\n:check_monomorphization\n:generate_c --runtime=fallback --output-dir={} --basename=sim --num-c-files=1\n:quit\n",
        out.display()
    );
    session.run_project(&project).expect("project runs");

    for name in [
        "sim_types.h",
        "sim_exceptions.h",
        "sim_exceptions.c",
        "sim_vars.h",
        "sim_vars.c",
        "sim_funs.c",
    ] {
        assert!(out.join(name).exists(), "missing {name}");
    }
    let funs = fs::read_to_string(out.join("sim_funs.c")).expect("read");
    assert!(funs.contains("Test"), "{funs}");

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn asl_path_resolves_relative_sources() {
    let dir = temp_dir("path");
    fs::write(dir.join("prelude_user.asl"), "constant K = 4;\n").expect("write");

    // The file is only findable through ASL_PATH.
    std::env::set_var("ASL_PATH", dir.display().to_string());
    let session = Session::load(
        &["prelude_user.asl".to_string()],
        Configuration::default(),
        &SessionOptions::default(),
    );
    std::env::remove_var("ASL_PATH");
    assert!(session.is_ok(), "{:?}", session.err());

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn unknown_command_is_an_error() {
    let dir = temp_dir("unknown");
    let src = dir.join("spec.asl");
    fs::write(&src, SPEC).expect("write");
    let mut session = Session::load(
        &[src.display().to_string()],
        Configuration::default(),
        &SessionOptions::default(),
    )
    .expect("load");
    assert!(session.run_command(":no_such_pass").is_err());
    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn generate_c_selects_runtimes() {
    let dir = temp_dir("backend");
    let src = dir.join("spec.asl");
    fs::write(&src, SPEC).expect("write");
    let config = Configuration {
        exports: vec!["Main".to_string()],
        imports: vec![],
    };
    let mut session = Session::load(
        &[src.display().to_string()],
        config,
        &SessionOptions::default(),
    )
    .expect("load");

    let out = dir.join("c23");
    let mut opts = asl_backend_c::EmitOptions::new("sim");
    opts.exports = vec!["Main".to_string()];
    session
        .generate_c(RuntimeKind::C23, &opts, &out)
        .expect("emit");
    let types = fs::read_to_string(out.join("sim_types.h")).expect("read");
    assert!(types.contains("_BitInt"), "{types}");

    let _ = fs::remove_dir_all(&dir);
}
