#![forbid(unsafe_code)]

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use miette::{miette, IntoDiagnostic, NamedSource, Report};
use serde::Deserialize;

use asl_ast::Declarations;
use asl_backend_c::{emit, select_runtime, EmitOptions, RuntimeKind};
use asl_core::xform::{by_name, XformConfig};
use asl_core::{check_evaluation_order, CheckOptions, Checker};

/// A session configuration file, merged across every `--configuration`
/// flag. Unknown keys (like `__comment`) are ignored.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct Configuration {
    #[serde(default)]
    pub exports: Vec<String>,
    #[serde(default)]
    pub imports: Vec<String>,
}

impl Configuration {
    pub fn merge(&mut self, other: Configuration) {
        let mut exports: BTreeSet<String> = self.exports.drain(..).collect();
        exports.extend(other.exports);
        self.exports = exports.into_iter().collect();
        let mut imports: BTreeSet<String> = self.imports.drain(..).collect();
        imports.extend(other.imports);
        self.imports = imports.into_iter().collect();
    }

    pub fn load(path: &Path) -> miette::Result<Configuration> {
        let text = fs::read_to_string(path)
            .into_diagnostic()
            .map_err(|e| miette!("cannot read configuration {}: {e}", path.display()))?;
        serde_json::from_str(&text)
            .into_diagnostic()
            .map_err(|e| miette!("bad configuration {}: {e}", path.display()))
    }
}

#[derive(Clone, Debug)]
pub struct SessionOptions {
    pub check_constraints: bool,
    pub runtime_checks: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            check_constraints: true,
            runtime_checks: true,
        }
    }
}

/// Search `ASL_PATH` (colon-separated) for a source file; absolute and
/// locally present paths win.
pub fn find_source(name: &str) -> miette::Result<PathBuf> {
    let direct = PathBuf::from(name);
    if direct.exists() {
        return Ok(direct);
    }
    if let Ok(path) = std::env::var("ASL_PATH") {
        for dir in path.split(':').filter(|d| !d.is_empty()) {
            let candidate = Path::new(dir).join(name);
            if candidate.exists() {
                return Ok(candidate);
            }
        }
    }
    Err(miette!("cannot find source file `{name}` (ASL_PATH searched)"))
}

pub struct Session {
    pub checker: Checker,
    pub decls: Declarations,
    pub config: Configuration,
}

impl Session {
    /// Load the prelude plus the given source files, run the global
    /// checks, and typecheck everything.
    pub fn load(
        files: &[String],
        config: Configuration,
        opts: &SessionOptions,
    ) -> miette::Result<Session> {
        let check_opts = CheckOptions {
            runtime_checks: opts.runtime_checks,
            constraint_checks: opts.check_constraints,
            ..Default::default()
        };
        let (mut checker, _prelude) = Checker::with_prelude(check_opts)?;

        let mut decls = Vec::new();
        for file in files {
            let path = find_source(file)?;
            let text = fs::read_to_string(&path)
                .into_diagnostic()
                .map_err(|e| miette!("cannot read {}: {e}", path.display()))?;
            let display = path.display().to_string();
            let (parsed, warnings) =
                asl_parse::parse_source_with_warnings(&text, &display).map_err(|e| {
                    e.with_source_code(NamedSource::new(display.clone(), text.clone()))
                })?;
            let line_map = asl_lex::LineMap::new(&text);
            for w in warnings {
                let at = line_map.line_col(w.span.offset());
                eprintln!("{display}:{}.{}: warning: {}", at.line, at.col, w.message);
            }

            if let Err(errs) = check_evaluation_order(&parsed) {
                for e in &errs {
                    let report = Report::new(e.clone())
                        .with_source_code(NamedSource::new(display.clone(), text.clone()));
                    eprintln!("{report:?}");
                }
                return Err(miette!("{} global check error(s) in {display}", errs.len()));
            }

            match checker.check_declarations(parsed) {
                Ok(checked) => decls.extend(checked),
                Err(errs) => {
                    let count = errs.len();
                    for e in errs {
                        let report = Report::new(e)
                            .with_source_code(NamedSource::new(display.clone(), text.clone()));
                        eprintln!("{report:?}");
                    }
                    return Err(miette!("{count} type error(s) in {display}"));
                }
            }
        }

        Ok(Session {
            checker,
            decls,
            config,
        })
    }

    fn xform_config(&self) -> XformConfig {
        XformConfig {
            exports: self.config.exports.clone(),
            imports: self.config.imports.clone(),
            bounded: false,
            wrap_pointer: None,
        }
    }

    /// Run one project-file command. Returns false when the command asks
    /// the session to stop.
    pub fn run_command(&mut self, line: &str) -> miette::Result<bool> {
        let line = line.trim();
        if line.is_empty() || line.starts_with("//") {
            return Ok(true);
        }
        let Some(command) = line.strip_prefix(':') else {
            return Err(miette!("project commands start with `:`: `{line}`"));
        };
        let mut words = command.split_whitespace();
        let head = words.next().unwrap_or_default();
        let rest: Vec<&str> = words.collect();

        match head {
            "quit" => return Ok(false),
            "generate_c" => {
                let (opts, kind, out_dir) = parse_generate_c(&rest, &self.config)?;
                self.generate_c(kind, &opts, &out_dir)?;
            }
            other => {
                let mut cfg = self.xform_config();
                // Pass arguments like `--no-auto-case-split` or listed
                // configuration groups are accepted and do not change the
                // in-process behaviour.
                if other == "xform_bounded" {
                    cfg.bounded = true;
                }
                let mut pass = by_name(other, &cfg)
                    .ok_or_else(|| miette!("unknown project command `:{other}`"))?;
                let decls = std::mem::take(&mut self.decls);
                self.decls = pass
                    .apply(decls, &mut self.checker.env)
                    .map_err(Report::new)?;
            }
        }
        Ok(true)
    }

    pub fn run_project(&mut self, text: &str) -> miette::Result<()> {
        for line in text.lines() {
            if !self.run_command(line)? {
                break;
            }
        }
        Ok(())
    }

    pub fn generate_c(
        &mut self,
        kind: RuntimeKind,
        opts: &EmitOptions,
        out_dir: &Path,
    ) -> miette::Result<()> {
        let runtime = select_runtime(kind);
        let files = emit(&self.decls, runtime.as_ref(), opts).map_err(Report::new)?;
        if !out_dir.as_os_str().is_empty() {
            fs::create_dir_all(out_dir).into_diagnostic()?;
        }
        for f in files {
            let path = out_dir.join(&f.name);
            fs::write(&path, f.contents)
                .into_diagnostic()
                .map_err(|e| miette!("cannot write {}: {e}", path.display()))?;
        }
        Ok(())
    }
}

/// Parse the `:generate_c` argument list from a project file.
fn parse_generate_c(
    args: &[&str],
    config: &Configuration,
) -> miette::Result<(EmitOptions, RuntimeKind, PathBuf)> {
    let mut opts = EmitOptions::new("asl");
    opts.exports = config.exports.clone();
    let mut kind = RuntimeKind::C23;
    let mut output_dir = PathBuf::from(".");

    for a in args {
        if let Some(rt) = a.strip_prefix("--runtime=") {
            kind = RuntimeKind::parse(rt)
                .ok_or_else(|| miette!("unknown runtime `{rt}`"))?;
        } else if let Some(dir) = a.strip_prefix("--output-dir=") {
            output_dir = PathBuf::from(dir);
        } else if let Some(base) = a.strip_prefix("--basename=") {
            opts.basename = base.to_string();
        } else if let Some(n) = a.strip_prefix("--num-c-files=") {
            opts.num_c_files = n
                .parse()
                .into_diagnostic()
                .map_err(|e| miette!("bad --num-c-files: {e}"))?;
        } else if *a == "--line-info" {
            opts.line_info = true;
        } else if *a == "--no-line-info" {
            opts.line_info = false;
        } else if *a == "--new-ffi" {
            opts.new_ffi = true;
        } else if let Some(ptr) = a.strip_prefix("--thread-local-pointer=") {
            opts.thread_local_pointer = Some(ptr.to_string());
        } else if a.starts_with("--") {
            // Remaining generator tuning flags are accepted unchanged.
        } else {
            return Err(miette!("unexpected generate_c argument `{a}`"));
        }
    }
    Ok((opts, kind, output_dir))
}
