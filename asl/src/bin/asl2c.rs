#![forbid(unsafe_code)]

//! `asl2c` — compile ASL specifications straight to C-family sources:
//! load, typecheck, run the standard transform pipeline, and emit with
//! the selected runtime.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use miette::{miette, Report};

use asl::{Configuration, Session, SessionOptions};
use asl_backend_c::{EmitOptions, RuntimeKind};
use asl_core::standard_pipeline;
use asl_core::xform::{run_pipeline, XformConfig};

#[derive(Parser, Debug)]
#[command(name = "asl2c", about = "ASL to C compiler")]
struct Args {
    /// Runtime implementation for arbitrary-precision primitives.
    #[arg(long, default_value = "c23")]
    backend: String,

    /// Directory for the generated files.
    #[arg(long, default_value = ".")]
    output_dir: PathBuf,

    /// Basename of the generated files.
    #[arg(long, default_value = "asl")]
    basename: String,

    /// Split function definitions across this many source files.
    #[arg(long, default_value_t = 1)]
    num_c_files: usize,

    /// Generate plain C wrappers for exported functions.
    #[arg(long)]
    new_ffi: bool,

    /// Insert #line directives referring back to the ASL source.
    #[arg(long)]
    line_info: bool,

    /// Route global accesses through this thread-local pointer.
    #[arg(long)]
    thread_local_pointer: Option<String>,

    /// Configuration group wrapped behind the thread-local pointer;
    /// accepted for compatibility, all globals are wrapped.
    #[arg(long)]
    thread_local: Option<String>,

    /// Configuration JSON (repeatable, merged in order).
    #[arg(long = "configuration")]
    configurations: Vec<PathBuf>,

    /// ASL source files.
    files: Vec<String>,
}

fn run(args: Args) -> miette::Result<()> {
    let kind = RuntimeKind::parse(&args.backend)
        .ok_or_else(|| miette!("unknown backend `{}`", args.backend))?;

    let mut config = Configuration::default();
    for path in &args.configurations {
        config.merge(Configuration::load(path)?);
    }

    let mut session = Session::load(&args.files, config, &SessionOptions::default())?;

    let cfg = XformConfig {
        exports: session.config.exports.clone(),
        imports: session.config.imports.clone(),
        bounded: true,
        wrap_pointer: args.thread_local_pointer.clone(),
    };
    let mut passes = standard_pipeline(&cfg);
    let decls = std::mem::take(&mut session.decls);
    session.decls =
        run_pipeline(decls, &mut session.checker.env, &mut passes).map_err(Report::new)?;

    let mut opts = EmitOptions::new(&args.basename);
    opts.num_c_files = args.num_c_files;
    opts.line_info = args.line_info;
    opts.new_ffi = args.new_ffi;
    opts.exports = session.config.exports.clone();
    opts.thread_local_pointer = args.thread_local_pointer.clone();
    let _ = args.thread_local;

    session.generate_c(kind, &opts, &args.output_dir)
}

fn main() -> ExitCode {
    let args = Args::parse();
    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(report) => {
            eprintln!("{report:?}");
            ExitCode::FAILURE
        }
    }
}
