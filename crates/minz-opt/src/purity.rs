//! Purity analysis (spec §4.10): a fixed-point pass over the whole
//! module deciding which functions are pure — no I/O, no writes to
//! global mutable state, no SMC patches of code they don't own, and
//! every callee also pure. CTIE only ever interprets a pure function;
//! DCE's local pass leans on the same `is_pure_local` notion per
//! instruction, this module is the whole-function analogue.
//!
//! Modeled on `cranelift-codegen`'s `dce.rs`, which also computes a
//! module-wide liveness/purity-adjacent fixed point by walking
//! instructions backward from uses; here the fixed point runs over
//! the call graph instead of a single function's dominator tree.

use rustc_hash::FxHashSet;

use minz_mir::instr::Opcode;
use minz_mir::module::MirModule;

/// Opcodes that make a function impure regardless of what else it
/// does, independent of the call graph.
fn has_direct_impurity(f: &minz_mir::function::MirFunction) -> bool {
    for instr in &f.instrs {
        match instr.opcode {
            Opcode::PrintU8 | Opcode::PrintU16 | Opcode::PrintI8 | Opcode::PrintI16 | Opcode::PrintBool | Opcode::PrintString => {
                return true;
            }
            // A patch targeting an anchor this function doesn't own itself
            // reaches outside its own activation record (§4.10: "does not
            // perform self-modifying-code patches on code it does not own").
            Opcode::SmcPatch => {
                let owns = instr.smc_anchor.as_deref().map(|a| a.starts_with(&format!("{}$", f.name))).unwrap_or(false);
                if !owns {
                    return true;
                }
            }
            Opcode::StoreVar | Opcode::StoreIndirect => {
                // Conservative: a store through a symbol naming module-level
                // global data is a write to global mutable state.
                if instr.symbol.is_some() {
                    return true;
                }
            }
            _ => {}
        }
    }
    false
}

/// Callee names a function instruction directly references, via
/// `call`/`tail-call`'s `symbol` or `address-of`'s `symbol` (function
/// pointers taken for later indirect calls still count as a
/// dependency: we can't prove the pointer is never invoked).
fn callees_of(f: &minz_mir::function::MirFunction) -> impl Iterator<Item = &str> {
    f.instrs.iter().filter_map(|i| match i.opcode {
        Opcode::Call | Opcode::TailCall | Opcode::AddressOf => i.symbol.as_deref(),
        _ => None,
    })
}

/// Run the fixed point, writing `meta.is_pure` on every function in
/// `module`. Functions with no definition in this module (external
/// symbols, stdlib helpers not modeled as MIR) are treated as impure:
/// purity can't be proven for code we can't see.
pub fn analyze_purity(module: &mut MirModule) {
    let names: Vec<String> = module.functions.values().map(|f| f.name.clone()).collect();
    let mut impure: FxHashSet<String> = FxHashSet::default();

    for f in module.functions.values() {
        if has_direct_impurity(f) {
            impure.insert(f.name.clone());
        }
    }

    loop {
        let mut changed = false;
        for f in module.functions.values() {
            if impure.contains(&f.name) {
                continue;
            }
            for callee in callees_of(f) {
                let callee_is_known = names.iter().any(|n| n == callee);
                if !callee_is_known || impure.contains(callee) {
                    impure.insert(f.name.clone());
                    changed = true;
                    break;
                }
            }
        }
        if !changed {
            break;
        }
    }

    for f in module.functions.values_mut() {
        f.meta.is_pure = !impure.contains(&f.name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use minz_mir::entities::Reg;
    use minz_mir::function::{CallConvention, MirFunction};
    use minz_mir::instr::Instruction;
    use minz_types::Type;

    fn reg(n: u32) -> Reg {
        use minz_entity::EntityRef;
        Reg::new(n as usize)
    }

    #[test]
    fn arithmetic_only_function_is_pure() {
        let mut module = MirModule::new();
        let mut f = MirFunction::new("double", CallConvention::Register, Type::U8);
        f.new_reg(Type::U8);
        f.push(Instruction::new(Opcode::Add).with_dest(reg(0)).with_src(reg(0)).with_src(reg(0)));
        module.add_function(f);

        analyze_purity(&mut module);
        assert!(module.find_function("double").map(|id| module.functions[id].meta.is_pure).unwrap());
    }

    #[test]
    fn print_call_is_impure() {
        let mut module = MirModule::new();
        let mut f = MirFunction::new("announce", CallConvention::Register, Type::Void);
        f.new_reg(Type::U8);
        f.push(Instruction::new(Opcode::PrintU8).with_src(reg(0)));
        module.add_function(f);

        analyze_purity(&mut module);
        assert!(!module.find_function("announce").map(|id| module.functions[id].meta.is_pure).unwrap());
    }

    #[test]
    fn calling_an_impure_function_is_contagious() {
        let mut module = MirModule::new();
        let mut impure = MirFunction::new("announce", CallConvention::Register, Type::Void);
        impure.new_reg(Type::U8);
        impure.push(Instruction::new(Opcode::PrintU8).with_src(reg(0)));
        module.add_function(impure);

        let mut caller = MirFunction::new("wrapper", CallConvention::Register, Type::Void);
        caller.push(Instruction::new(Opcode::Call).with_symbol("announce"));
        module.add_function(caller);

        analyze_purity(&mut module);
        assert!(!module.find_function("wrapper").map(|id| module.functions[id].meta.is_pure).unwrap());
    }

    #[test]
    fn calling_an_unknown_external_symbol_is_impure() {
        let mut module = MirModule::new();
        let mut caller = MirFunction::new("wrapper", CallConvention::Register, Type::Void);
        caller.push(Instruction::new(Opcode::Call).with_symbol("rom_routine"));
        module.add_function(caller);

        analyze_purity(&mut module);
        assert!(!module.find_function("wrapper").map(|id| module.functions[id].meta.is_pure).unwrap());
    }

    #[test]
    fn patching_an_anchor_it_owns_does_not_taint_purity() {
        let mut module = MirModule::new();
        let mut f = MirFunction::new("curried$curry_0", CallConvention::Smc, Type::U8);
        f.push(Instruction::new(Opcode::SmcPatch).with_anchor("curried$curry_0$p0"));
        module.add_function(f);

        analyze_purity(&mut module);
        assert!(module.find_function("curried$curry_0").map(|id| module.functions[id].meta.is_pure).unwrap());
    }
}
