//! Hierarchical register allocation (spec §4.14, §4.15): assigns each
//! MIR function's virtual registers a physical location, then derives
//! the usage facts `minz_codegen`'s prologue/epilogue templates and
//! `FunctionMeta.is_leaf` need from the result.

pub mod alloc;
pub mod physical;
pub mod usage;

pub use alloc::{allocate, RegAssignment};
pub use physical::{PhysicalLoc, Reg16, Reg8};

use minz_mir::module::MirModule;

/// Allocates every function in `module` and writes the derived
/// `is_leaf`/`written_registers` facts back onto each `FunctionMeta`,
/// returning the per-function assignments codegen consumes directly
/// (by `FuncId` index, matching `module.functions`' order).
pub fn allocate_module(module: &mut MirModule) -> Vec<RegAssignment> {
    let mut assignments = Vec::with_capacity(module.functions.len());
    for f in module.functions.values_mut() {
        let assignment = alloc::allocate(f);
        f.meta.is_leaf = usage::is_leaf(f);
        f.meta.written_registers = usage::compute_written_registers(f, &assignment);
        assignments.push(assignment);
    }
    assignments
}

#[cfg(test)]
mod tests {
    use super::*;
    use minz_mir::function::{CallConvention, MirFunction};
    use minz_types::Type;

    #[test]
    fn allocating_a_module_populates_every_function_meta() {
        let mut module = MirModule::new();
        module.add_function(MirFunction::new("leaf", CallConvention::Register, Type::Void));
        let assignments = allocate_module(&mut module);
        assert_eq!(assignments.len(), 1);
        let id = module.find_function("leaf").unwrap();
        assert!(module.functions[id].meta.is_leaf);
    }
}
