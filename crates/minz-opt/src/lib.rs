//! Module-wide MIR optimization: purity analysis (§4.10), compile-time
//! interface execution (§4.11), dead-code elimination (§4.12), and
//! peephole rewriting (§4.13). These passes run in this order because
//! each one's output makes the next one more effective: purity feeds
//! CTIE and DCE's root set, CTIE folding away a call can make the
//! instructions that built its arguments dead, and DCE shrinking a
//! function narrows the peephole's search window.

pub mod ctie;
pub mod dce;
pub mod peephole;
pub mod purity;

use minz_mir::module::MirModule;
use minz_types::Type;

pub use ctie::CtieConfig;

#[derive(Debug, Clone)]
pub struct OptOptions {
    pub enable_ctie: bool,
    pub ctie: CtieConfig,
    /// Extra DCE roots beyond exported (`pub`) functions — typically
    /// just `main`.
    pub extra_roots: Vec<String>,
}

impl Default for OptOptions {
    fn default() -> Self {
        OptOptions { enable_ctie: true, ctie: CtieConfig::default(), extra_roots: vec!["main".to_string()] }
    }
}

/// Runs the whole optimization pipeline over `module` in place.
/// Returns the count of dead functions and dead globals swept, which
/// the driver logs at `-v`.
pub fn optimize_module(module: &mut MirModule, opts: &OptOptions) -> (usize, usize) {
    purity::analyze_purity(module);

    if opts.enable_ctie {
        fold_constant_calls(module, opts.ctie);
        purity::analyze_purity(module);
    }

    for f in module.functions.values_mut() {
        loop {
            let removed_dead = dce::local_dce(f);
            let rewritten = peephole::mir_peephole(f);
            if removed_dead == 0 && rewritten == 0 {
                break;
            }
        }
    }

    sweep_with_roots(module, &opts.extra_roots)
}

fn sweep_with_roots(module: &mut MirModule, extra_roots: &[String]) -> (usize, usize) {
    let mut roots: Vec<String> = extra_roots.to_vec();
    for f in module.functions.values() {
        // `pub fun` is exported and always a DCE root; `FunctionMeta`
        // doesn't record visibility (it's an AST/sema fact, not a MIR
        // one), so the driver is expected to pass exported names in
        // via `extra_roots` alongside `main`. Interrupt handlers are
        // entered by hardware, never by a `call`, so they're always live.
        if f.is_interrupt {
            roots.push(f.name.clone());
        }
    }
    dce::sweep_dead_functions(module, &roots)
}

/// Walks every `call` instruction in the module whose arguments are
/// all immediate `load-const`s feeding directly into it, and whose
/// callee is pure, folding it to a constant in place (§4.11).
fn fold_constant_calls(module: &mut MirModule, config: CtieConfig) {
    let snapshot = module.clone();
    for f in module.functions.values_mut() {
        for idx in 0..f.instrs.len() {
            if f.instrs[idx].opcode != minz_mir::instr::Opcode::Call {
                continue;
            }
            let Some(callee_name) = f.instrs[idx].symbol.clone() else { continue };
            let Some(callee_id) = snapshot.find_function(&callee_name) else { continue };
            if matches!(snapshot.functions[callee_id].ret, Type::ErrorUnion(_, _)) {
                // Folding would need to fabricate the discriminant
                // `err_dest` carries (§4.7); out of scope for a pass
                // that only ever produces a plain `const-result`.
                continue;
            }

            let mut args = Vec::with_capacity(f.instrs[idx].srcs.len());
            let mut all_const = true;
            for src in f.instrs[idx].srcs.clone() {
                match preceding_const(f, idx, src) {
                    Some(v) => args.push(v),
                    None => {
                        all_const = false;
                        break;
                    }
                }
            }
            if !all_const {
                continue;
            }

            if let ctie::CtieOutcome::Evaluated(value) = ctie::try_fold_call(&snapshot, callee_id, &args, config) {
                let dest = f.instrs[idx].dest;
                let mut folded = minz_mir::instr::Instruction::new(minz_mir::instr::Opcode::ConstResult)
                    .with_imm(value)
                    .with_comment(format!("ctie: folded call to {callee_name}"));
                folded.dest = dest;
                f.instrs[idx] = folded;
            }
        }
    }
}

/// Looks backward from `before_idx` for the `load-const` that last
/// defined `reg`, returning its immediate if nothing redefines `reg`
/// in between (the simplest possible constant-propagation query;
/// anything more would need real dataflow, out of scope for CTIE's
/// argument-eligibility check).
fn preceding_const(f: &minz_mir::function::MirFunction, before_idx: usize, reg: minz_mir::entities::Reg) -> Option<i64> {
    for instr in f.instrs[..before_idx].iter().rev() {
        if instr.dest == Some(reg) {
            return if instr.opcode == minz_mir::instr::Opcode::LoadConst { instr.imm } else { None };
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use minz_mir::entities::Reg;
    use minz_mir::function::{CallConvention, MirFunction};
    use minz_mir::instr::{Instruction, Opcode};
    use minz_types::Type;

    fn reg(n: u32) -> Reg {
        use minz_entity::EntityRef;
        Reg::new(n as usize)
    }

    #[test]
    fn folds_a_call_to_a_pure_function_with_constant_args() {
        let mut module = MirModule::new();

        let mut double = MirFunction::new("double", CallConvention::Register, Type::U8);
        double.new_reg(Type::U8);
        double.push(Instruction::new(Opcode::LoadParam).with_dest(reg(0)).with_imm(0));
        double.push(Instruction::new(Opcode::Add).with_dest(reg(0)).with_src(reg(0)).with_src(reg(0)));
        double.push(Instruction::new(Opcode::Return).with_src(reg(0)));
        module.add_function(double);

        let mut main = MirFunction::new("main", CallConvention::Register, Type::U8);
        main.new_reg(Type::U8);
        main.new_reg(Type::U8);
        main.push(Instruction::new(Opcode::LoadConst).with_dest(reg(0)).with_imm(21));
        main.push(Instruction::new(Opcode::Call).with_dest(reg(1)).with_src(reg(0)).with_symbol("double"));
        main.push(Instruction::new(Opcode::Return).with_src(reg(1)));
        module.add_function(main);

        let opts = OptOptions::default();
        optimize_module(&mut module, &opts);

        let main_id = module.find_function("main").unwrap();
        let main_fn = &module.functions[main_id];
        assert!(main_fn.instrs.iter().any(|i| i.opcode == Opcode::ConstResult && i.imm == Some(42)));
        assert!(!main_fn.instrs.iter().any(|i| i.opcode == Opcode::Call));
    }

    #[test]
    fn sweeps_unreferenced_functions_after_optimizing() {
        let mut module = MirModule::new();
        module.add_function(MirFunction::new("main", CallConvention::Register, Type::Void));
        module.add_function(MirFunction::new("dead_helper", CallConvention::Register, Type::U8));

        let (removed, _) = optimize_module(&mut module, &OptOptions::default());
        assert_eq!(removed, 1);
        assert!(module.find_function("dead_helper").is_none());
    }
}
