//! Register-usage analysis (spec §4.14): once a function's virtual
//! registers have physical locations, this computes the set of
//! physical registers its body actually writes — codegen only needs
//! to preserve those across the call, so a lean prologue/epilogue
//! saves exactly that set instead of the whole file, and a function
//! that calls nothing and writes nothing needing preservation across
//! a call elides the prologue entirely (a leaf function, `is_leaf`).

use std::collections::BTreeSet;

use minz_mir::function::MirFunction;

use crate::alloc::RegAssignment;
use crate::physical::PhysicalLoc;

/// The physical (non-shadow) registers `f`'s body writes, named the
/// way codegen's prologue/epilogue templates expect (`"A"`, `"HL"`,
/// …). Shadow-bank writes aren't included: they're restored by
/// `EXX`/`EX AF,AF'`, not by push/pop, so they don't belong to the
/// prologue's save set.
pub fn compute_written_registers(f: &MirFunction, assignment: &RegAssignment) -> Vec<String> {
    let mut written: BTreeSet<String> = BTreeSet::new();
    for instr in &f.instrs {
        for reg in instr.dest.into_iter().chain(instr.err_dest) {
            match assignment.location(reg) {
                PhysicalLoc::Reg8(r) => {
                    written.insert(r.to_string());
                }
                PhysicalLoc::Reg16(r) => {
                    written.insert(r.to_string());
                }
                PhysicalLoc::ShadowReg8(_) | PhysicalLoc::ShadowReg16(_) | PhysicalLoc::Spill { .. } => {}
            }
        }
    }
    written.into_iter().collect()
}

/// A function is a leaf (§4.14: "no callees and no stack frame of its
/// own") when it issues no `call`/`tail-call` of its own. Such a
/// function's prologue has nothing to protect across a call it never
/// makes, so codegen can skip saving registers outright.
pub fn is_leaf(f: &MirFunction) -> bool {
    f.computes_no_calls()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alloc::allocate;
    use minz_entity::EntityRef;
    use minz_mir::entities::Reg;
    use minz_mir::function::CallConvention;
    use minz_mir::instr::{Instruction, Opcode};
    use minz_types::Type;

    fn reg(n: u32) -> Reg {
        Reg::new(n as usize)
    }

    #[test]
    fn records_every_physical_register_a_function_writes() {
        let mut f = MirFunction::new("f", CallConvention::Register, Type::U8);
        f.new_reg(Type::U8);
        f.new_reg(Type::U8);
        f.push(Instruction::new(Opcode::LoadConst).with_dest(reg(0)).with_imm(1));
        f.push(Instruction::new(Opcode::LoadConst).with_dest(reg(1)).with_imm(2));
        f.push(Instruction::new(Opcode::Add).with_dest(reg(0)).with_src(reg(0)).with_src(reg(1)));
        f.push(Instruction::new(Opcode::Return).with_src(reg(0)));

        let assignment = allocate(&f);
        let written = compute_written_registers(&f, &assignment);
        assert_eq!(written.len(), 2);
    }

    #[test]
    fn a_function_with_no_calls_is_a_leaf() {
        let mut f = MirFunction::new("f", CallConvention::Register, Type::U8);
        f.push(Instruction::new(Opcode::Return));
        assert!(is_leaf(&f));

        f.push(Instruction::new(Opcode::Call).with_symbol("other"));
        assert!(!is_leaf(&f));
    }
}
