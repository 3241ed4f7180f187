//! The `minzc` pass manager: ties semantic analysis, MIR construction,
//! optimization, register allocation, and Z80 code generation into one
//! `compile` entry point (spec §4, §6.1, §6.3).
//!
//! The parser front-end is out of scope for this workspace (§1), so
//! [`compile`] takes an already-parsed [`minz_ast::Module`] rather than
//! source text; the CLI binary (`src/bin/minzc.rs`) is the only caller
//! that would normally sit in front of a real parser.

use minz_ast::Module;
use minz_diagnostics::Diagnostics;
use minz_mir::builder::BuildOptions;
use minz_mir::module::MirModule;

pub use minz_codegen::{CodegenError, CodegenOptions, Target, TargetConfig};
pub use minz_opt::{CtieConfig, OptOptions};

/// Everything that governs one compilation, gathered in one place the
/// way `wasmtime_cli_flags::CommonOptions` gathers `wasmtime`'s own
/// cross-cutting knobs (spec §6.3, §6.4).
#[derive(Debug, Clone)]
pub struct CompileOptions {
    pub target: TargetConfig,
    pub enable_smc: bool,
    pub enable_optimizer: bool,
    pub enable_ctie: bool,
    pub ctie: CtieConfig,
    pub enable_peephole: bool,
}

impl Default for CompileOptions {
    fn default() -> Self {
        CompileOptions {
            target: TargetConfig { target: Target::Generic, debug: false },
            enable_smc: false,
            enable_optimizer: true,
            enable_ctie: true,
            ctie: CtieConfig::default(),
            enable_peephole: true,
        }
    }
}

/// The pipeline's output: the diagnostics accumulated during semantic
/// analysis, the MIR at the point optimization stopped (useful for
/// `--dump-mir`), and the emitted assembly text, if code generation
/// was reached at all.
///
/// Per §4.17, a fatal diagnostic from semantic analysis stops the
/// pipeline before MIR is built; everything downstream of that point
/// is `None`.
pub struct CompileOutput {
    pub diagnostics: Diagnostics,
    pub mir: Option<MirModule>,
    pub assembly: Option<String>,
}

/// Runs the whole pipeline over an already-parsed module (§4.1–§4.17):
///
/// 1. `minz_sema::analyze` — symbol/scope resolution, type checking,
///    overload resolution, lambda hoisting, currying, interface
///    monomorphization, error-propagation lowering, metafunctions.
/// 2. `minz_mir::builder::build_module` — MIR construction.
/// 3. `minz_opt::optimize_module` — purity analysis, optional CTIE,
///    dead-code elimination, peephole rewrites (if `enable_optimizer`).
/// 4. `minz_regalloc::allocate_module` — hierarchical register
///    allocation.
/// 5. `minz_codegen::emit_module` — Z80 assembly-text emission.
///
/// A fatal diagnostic from step 1 stops the pipeline there (§4.17): no
/// MIR is built from a module that failed semantic analysis, since the
/// builder assumes every expression already carries a resolved type.
pub fn compile(module: Module, opts: &CompileOptions) -> Result<CompileOutput, CodegenError> {
    log::debug!("semantic analysis starting");
    let consts = minz_sema::meta::CompileTimeConstants::for_target(opts.target.target.identifier(), opts.target.debug);
    let (ast, analyzed) = minz_sema::analyze(module, &consts);
    if analyzed.diagnostics.has_fatal() {
        log::debug!(
            "semantic analysis reported {} fatal diagnostic(s), stopping before mir",
            analyzed.diagnostics.fatal_count()
        );
        return Ok(CompileOutput { diagnostics: analyzed.diagnostics, mir: None, assembly: None });
    }

    let build_opts = BuildOptions { enable_smc: opts.enable_smc };
    let mut mir = minz_mir::builder::build_module(&ast, &analyzed, &build_opts);
    log::debug!("mir built: {} function(s), {} global(s)", mir.functions.len(), mir.globals.len());

    if opts.enable_optimizer {
        // Every exported function is a DCE root regardless of whether
        // `main` reaches it (§4.12): a library module's `pub fun`s are
        // entered by callers outside this compilation unit.
        let mut extra_roots: Vec<String> = analyzed.functions.iter().filter(|f| f.is_pub).map(|f| f.mangled_name.clone()).collect();
        extra_roots.push("main".to_string());
        let opt_opts = minz_opt::OptOptions { enable_ctie: opts.enable_ctie, ctie: opts.ctie.clone(), extra_roots };
        let (folded, removed) = minz_opt::optimize_module(&mut mir, &opt_opts);
        log::debug!("optimizer folded {folded} call(s), removed {removed} dead instruction(s)");
    }

    let assignments = minz_regalloc::allocate_module(&mut mir);
    log::debug!("register allocation complete for {} function(s)", assignments.len());

    let codegen_opts = CodegenOptions { target: opts.target.clone(), enable_peephole: opts.enable_peephole };
    let assembly = minz_codegen::emit_module(&mir, &assignments, &codegen_opts)?;

    Ok(CompileOutput { diagnostics: analyzed.diagnostics, mir: Some(mir), assembly: Some(assembly) })
}
