//! MIR-level peephole rewriting (spec §4.13): small local pattern
//! replacements over a short instruction window, run after DCE so the
//! window isn't full of instructions DCE would have removed anyway.
//! The assembly-text-level half of §4.13 (e.g. folding a synthesized
//! `dec`+`jump-if-nonzero` pair into `DJNZ`) lives in `minz_codegen`,
//! once the instructions in question have become text.

use rustc_hash::FxHashMap;

use minz_mir::entities::Reg;
use minz_mir::function::MirFunction;
use minz_mir::instr::Opcode;

/// Removes a `load-const` that reloads the same register with the
/// same immediate an adjacent earlier `load-const` already holds,
/// with nothing between them reading or redefining the register.
fn remove_redundant_const_reloads(f: &mut MirFunction) -> usize {
    let mut removed = 0;
    let mut i = 0;
    while i + 1 < f.instrs.len() {
        let same = f.instrs[i].opcode == Opcode::LoadConst
            && f.instrs[i + 1].opcode == Opcode::LoadConst
            && f.instrs[i].dest == f.instrs[i + 1].dest
            && f.instrs[i].imm == f.instrs[i + 1].imm;
        if same {
            f.instrs.remove(i + 1);
            removed += 1;
        } else {
            i += 1;
        }
    }
    removed
}

/// Rewrites `mul dest, a, b` into `shl dest, a, log2(b)` when `b` is
/// fed by a single-use `load-const` of a power-of-two value — a shift
/// is one Z80 instruction family cheaper than a multiply routine.
fn strength_reduce_power_of_two_mul(f: &mut MirFunction) -> usize {
    let mut use_count: FxHashMap<Reg, usize> = FxHashMap::default();
    for instr in &f.instrs {
        for s in &instr.srcs {
            *use_count.entry(*s).or_insert(0) += 1;
        }
    }

    let mut const_of: FxHashMap<Reg, (usize, i64)> = FxHashMap::default();
    for (idx, instr) in f.instrs.iter().enumerate() {
        if instr.opcode == Opcode::LoadConst {
            if let (Some(d), Some(v)) = (instr.dest, instr.imm) {
                const_of.insert(d, (idx, v));
            }
        }
    }

    let mut rewritten = 0;
    for idx in 0..f.instrs.len() {
        if f.instrs[idx].opcode != Opcode::Mul {
            continue;
        }
        let Some(&factor_reg) = f.instrs[idx].srcs.get(1) else { continue };
        let Some(&(const_idx, value)) = const_of.get(&factor_reg) else { continue };
        if use_count.get(&factor_reg).copied().unwrap_or(0) != 1 {
            continue;
        }
        if value <= 0 || (value & (value - 1)) != 0 {
            continue; // not a power of two
        }
        let shift = value.trailing_zeros() as i64;
        f.instrs[idx].opcode = Opcode::Shl;
        f.instrs[const_idx].imm = Some(shift);
        rewritten += 1;
    }
    rewritten
}

/// Drops an unconditional `jump label` immediately followed by the
/// `label` it targets — a fallthrough branch is a no-op.
fn remove_fallthrough_jumps(f: &mut MirFunction) -> usize {
    let mut removed = 0;
    let mut i = 0;
    while i + 1 < f.instrs.len() {
        let is_fallthrough = f.instrs[i].opcode == Opcode::Jump
            && f.instrs[i + 1].opcode == Opcode::Label
            && f.instrs[i].symbol.is_some()
            && f.instrs[i].symbol == f.instrs[i + 1].symbol;
        if is_fallthrough {
            f.instrs.remove(i);
            removed += 1;
        } else {
            i += 1;
        }
    }
    removed
}

/// Runs every MIR-level peephole rewrite once. Returns the total
/// number of rewrites applied, so callers (and the optimizer's pass
/// manager, once one is wired up) can re-run DCE if anything changed.
pub fn mir_peephole(f: &mut MirFunction) -> usize {
    remove_redundant_const_reloads(f) + strength_reduce_power_of_two_mul(f) + remove_fallthrough_jumps(f)
}

#[cfg(test)]
mod tests {
    use super::*;
    use minz_mir::function::CallConvention;
    use minz_mir::instr::Instruction;
    use minz_types::Type;

    fn reg(n: u32) -> Reg {
        use minz_entity::EntityRef;
        Reg::new(n as usize)
    }

    #[test]
    fn drops_adjacent_redundant_reload() {
        let mut f = MirFunction::new("f", CallConvention::Register, Type::U8);
        f.new_reg(Type::U8);
        f.push(Instruction::new(Opcode::LoadConst).with_dest(reg(0)).with_imm(7));
        f.push(Instruction::new(Opcode::LoadConst).with_dest(reg(0)).with_imm(7));
        f.push(Instruction::new(Opcode::Return).with_src(reg(0)));
        assert_eq!(mir_peephole(&mut f), 1);
        assert_eq!(f.instrs.len(), 2);
    }

    #[test]
    fn rewrites_multiply_by_power_of_two_into_a_shift() {
        let mut f = MirFunction::new("f", CallConvention::Register, Type::U8);
        f.new_reg(Type::U8);
        f.new_reg(Type::U8);
        f.push(Instruction::new(Opcode::LoadParam).with_dest(reg(0)).with_imm(0));
        f.push(Instruction::new(Opcode::LoadConst).with_dest(reg(1)).with_imm(8));
        f.push(Instruction::new(Opcode::Mul).with_dest(reg(0)).with_src(reg(0)).with_src(reg(1)));
        f.push(Instruction::new(Opcode::Return).with_src(reg(0)));

        mir_peephole(&mut f);
        assert_eq!(f.instrs[2].opcode, Opcode::Shl);
        assert_eq!(f.instrs[1].imm, Some(3));
    }

    #[test]
    fn leaves_multiply_by_non_power_of_two_alone() {
        let mut f = MirFunction::new("f", CallConvention::Register, Type::U8);
        f.new_reg(Type::U8);
        f.new_reg(Type::U8);
        f.push(Instruction::new(Opcode::LoadParam).with_dest(reg(0)).with_imm(0));
        f.push(Instruction::new(Opcode::LoadConst).with_dest(reg(1)).with_imm(6));
        f.push(Instruction::new(Opcode::Mul).with_dest(reg(0)).with_src(reg(0)).with_src(reg(1)));
        mir_peephole(&mut f);
        assert_eq!(f.instrs[2].opcode, Opcode::Mul);
    }

    #[test]
    fn removes_jump_to_the_immediately_following_label() {
        let mut f = MirFunction::new("f", CallConvention::Register, Type::Void);
        f.push(Instruction::new(Opcode::Jump).with_symbol("L0"));
        f.push(Instruction::new(Opcode::Label).with_symbol("L0"));
        f.push(Instruction::new(Opcode::Return));
        assert_eq!(mir_peephole(&mut f), 1);
        assert_eq!(f.instrs.len(), 2);
    }
}
