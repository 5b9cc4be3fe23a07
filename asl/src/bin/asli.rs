#![forbid(unsafe_code)]

//! `asli` — load ASL specifications and drive the pipeline from a
//! project file of `:`-prefixed commands. The interactive evaluator is a
//! separate collaborator; this entry point covers batch sessions.

use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use miette::{miette, IntoDiagnostic};

use asl::{Configuration, Session, SessionOptions};

#[derive(Parser, Debug)]
#[command(name = "asli", about = "ASL specification loader and pipeline driver")]
struct Args {
    /// Suppress the startup banner.
    #[arg(long)]
    nobanner: bool,

    /// Run without the interactive prompt.
    #[arg(long)]
    batchmode: bool,

    /// Project file of commands to run after loading.
    #[arg(long)]
    project: Option<PathBuf>,

    /// Configuration JSON (repeatable, merged in order).
    #[arg(long = "configuration")]
    configurations: Vec<PathBuf>,

    /// Run one command after loading (repeatable).
    #[arg(long = "exec")]
    execs: Vec<String>,

    /// Enable constraint checks.
    #[arg(long = "check-constraints", overrides_with = "no_check_constraints")]
    check_constraints: bool,
    #[arg(long = "no-check-constraints")]
    no_check_constraints: bool,

    /// Enable runtime check insertion.
    #[arg(long = "runtime-checks", overrides_with = "no_runtime_checks")]
    runtime_checks: bool,
    #[arg(long = "no-runtime-checks")]
    no_runtime_checks: bool,

    /// Step budget for the evaluator collaborator; accepted and passed
    /// through.
    #[arg(long)]
    steps: Option<u64>,

    /// ASL source files, loaded in order after the prelude.
    files: Vec<String>,
}

fn run(args: Args) -> miette::Result<()> {
    if !args.nobanner {
        eprintln!("asli {}", env!("CARGO_PKG_VERSION"));
    }

    let mut config = Configuration::default();
    for path in &args.configurations {
        config.merge(Configuration::load(path)?);
    }

    let opts = SessionOptions {
        check_constraints: args.check_constraints || !args.no_check_constraints,
        runtime_checks: args.runtime_checks || !args.no_runtime_checks,
    };

    let mut session = Session::load(&args.files, config, &opts)?;

    for command in &args.execs {
        if !session.run_command(command)? {
            return Ok(());
        }
    }

    if let Some(project) = &args.project {
        let text = fs::read_to_string(project)
            .into_diagnostic()
            .map_err(|e| miette!("cannot read project {}: {e}", project.display()))?;
        session.run_project(&text)?;
    } else if !args.batchmode {
        return Err(miette!(
            "interactive mode is provided by the evaluator; run with --batchmode and --project"
        ));
    }

    let _ = args.steps;
    Ok(())
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
