//! The `minzc` command-line driver (spec §6.3).
//!
//! Source parsing is an out-of-scope boundary for this workspace
//! (spec §1, §6.1): `minzc` accepts every flag the specification's CLI
//! surface describes and wires them into [`minzc::CompileOptions`],
//! but since no parser crate exists here yet, a real invocation with a
//! `.minz` source file reports that the parse step isn't available
//! rather than guessing at source syntax. Everything downstream of a
//! parsed AST — the pipeline this binary otherwise exercises — is
//! fully implemented.

use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;

use minzc::{CompileOptions, CtieConfig, Target, TargetConfig};

/// MinZ: a systems programming language compiler targeting the Zilog Z80.
#[derive(Parser, Debug)]
#[command(name = "minzc", version)]
struct Cli {
    /// Input source file.
    input: PathBuf,

    /// Output assembly path; defaults to the input with a `.a80` extension.
    #[arg(long)]
    output: Option<PathBuf>,

    /// Target backend. Only `z80` is implemented by this core.
    #[arg(long, default_value = "z80")]
    backend: String,

    /// System target: controls the `TARGET` compile-time constant and the
    /// assembly's origin address.
    #[arg(long, default_value = "generic")]
    target: String,

    /// Enable the optimizer (purity analysis, CTIE, dead-code elimination,
    /// peephole rewrites).
    #[arg(short = 'O', long = "optimize")]
    optimize: bool,

    /// Compile every function with the `smc` calling convention.
    #[arg(long)]
    enable_smc: bool,

    /// Enable compile-time interface execution.
    #[arg(long)]
    enable_ctie: bool,

    /// Maximum call-stack depth CTIE will recurse before giving up.
    #[arg(long, default_value_t = CtieConfig::default().max_depth)]
    ctie_max_depth: u32,

    /// Maximum instruction-step budget for a single CTIE evaluation.
    #[arg(long, default_value_t = CtieConfig::default().max_iterations)]
    ctie_max_iterations: u64,

    /// Emit MIR alongside assembly.
    #[arg(short = 'd', long = "dump-mir")]
    dump_mir: bool,

    /// Raise log verbosity (installs `env_logger` at `debug` instead of
    /// the default `warn`).
    #[arg(short = 'v', long)]
    verbose: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    log::debug!("host triple: {}", target_lexicon::Triple::host());

    match run(cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("minzc: {err:#}");
            ExitCode::from(3)
        }
    }
}

/// Returns the process's intended exit code (spec §6.3: `0` success,
/// `1` user error, `2` internal compiler error, `3` I/O error) without
/// itself `panic!`ing; I/O failures surface through `anyhow::Result`
/// and are reported by `main` as exit code `3`.
fn run(cli: Cli) -> Result<ExitCode> {
    if cli.backend != "z80" {
        eprintln!("minzc: unsupported backend '{}': this core only implements 'z80'", cli.backend);
        return Ok(ExitCode::from(1));
    }

    let target = Target::parse(&cli.target)
        .with_context(|| format!("unknown target '{}' (expected one of: spectrum, cpm, amstrad, msx, generic)", cli.target))?;

    let source = fs::read_to_string(&cli.input).with_context(|| format!("reading {}", cli.input.display()))?;
    let module = match parse_stub(&source, &cli.input) {
        Some(module) => module,
        None => return Ok(ExitCode::from(1)),
    };

    let opts = CompileOptions {
        target: TargetConfig { target, debug: cli.dump_mir },
        enable_smc: cli.enable_smc,
        enable_optimizer: cli.optimize,
        enable_ctie: cli.enable_ctie,
        ctie: CtieConfig { max_depth: cli.ctie_max_depth, max_iterations: cli.ctie_max_iterations },
        enable_peephole: cli.optimize,
    };

    let output = minzc::compile(module, &opts)?;

    if output.diagnostics.has_fatal() {
        eprint!("{}", output.diagnostics.render_all(&cli.input.display().to_string()));
        return Ok(ExitCode::from(1));
    }

    let asm = output.assembly.context("code generation did not run")?;
    let output_path = cli.output.clone().unwrap_or_else(|| cli.input.with_extension("a80"));
    fs::write(&output_path, asm).with_context(|| format!("writing {}", output_path.display()))?;

    if cli.dump_mir {
        if let Some(mir) = &output.mir {
            let mir_path = output_path.with_extension("mir");
            fs::write(&mir_path, format!("{mir:#?}")).with_context(|| format!("writing {}", mir_path.display()))?;
        }
    }

    Ok(ExitCode::SUCCESS)
}

/// Stands in for the (out-of-scope, spec §1/§6.1) source parser: every
/// stage downstream of a parsed [`minz_ast::Module`] is fully
/// implemented and exercised by this crate's tests and by `tests/`
/// against hand-built ASTs, but nothing in this workspace turns `.minz`
/// source text into one yet. Reports the gap and returns `None` rather
/// than silently compiling an empty module, which would produce
/// assembly that doesn't correspond to the input file.
fn parse_stub(source: &str, path: &std::path::Path) -> Option<minz_ast::Module> {
    let _ = source;
    eprintln!(
        "minzc: source parsing is not implemented in this workspace (spec §1 scopes the \
         parser front-end out); pass an AST to `minzc::compile` programmatically instead of \
         invoking this binary on {}",
        path.display()
    );
    None
}
