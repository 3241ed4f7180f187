//! The hierarchical register allocator (spec §4.15): a linear scan
//! over per-function virtual-register live intervals, assigning each
//! one the cheapest tier that still has room — a physical register,
//! then its shadow-bank counterpart, then a memory spill slot.
//!
//! Grounded on the structure of `cranelift-codegen`'s
//! `regalloc/register_set.rs` (a pool of available units handed out
//! and reclaimed as intervals open and close) and `regalloc/affinity.rs`
//! (a value's preferred location is a hint computed from its type,
//! here: width in bytes rather than an ISA register class).

use std::collections::HashMap;

use minz_entity::{EntityRef, SecondaryMap};
use minz_mir::entities::Reg;
use minz_mir::function::MirFunction;

use crate::physical::{PhysicalLoc, Reg16, Reg8};

#[derive(Debug, Clone, Copy)]
struct LiveInterval {
    reg: Reg,
    start: usize,
    end: usize,
    width: u32,
}

/// Computes, per virtual register, the index of its first definition
/// and its last use across the flat instruction stream. This is a
/// conservative approximation of true liveness (it ignores control
/// flow entirely, treating the function as straight-line) — adequate
/// for the register pressure a Z80 program exerts, and simple enough
/// to re-derive after every optimizer pass without maintaining a CFG.
fn compute_intervals(f: &MirFunction) -> Vec<LiveInterval> {
    let mut first_def: HashMap<Reg, usize> = HashMap::new();
    let mut last_use: HashMap<Reg, usize> = HashMap::new();

    for (i, instr) in f.instrs.iter().enumerate() {
        if let Some(d) = instr.dest {
            first_def.entry(d).or_insert(i);
            last_use.entry(d).or_insert(i);
        }
        for s in &instr.srcs {
            first_def.entry(*s).or_insert(i);
            last_use.insert(*s, i);
        }
        if let Some(d) = &instr.djnz {
            first_def.entry(d.counter).or_insert(i);
            last_use.insert(d.counter, i);
        }
        if let Some(e) = instr.err_dest {
            // Defined at a `call` carrying an error-union return type,
            // read again at the `return` that forwards it (§4.7) —
            // `or_insert` keeps the call's index as the definition
            // while `last_use` always advances to the later read.
            first_def.entry(e).or_insert(i);
            last_use.insert(e, i);
        }
    }

    let mut intervals = Vec::new();
    for (reg, slot) in f.regs.iter() {
        let start = *first_def.get(&reg).unwrap_or(&0);
        let end = *last_use.get(&reg).unwrap_or(&start);
        let width = slot.ty.width_bytes().unwrap_or(1).max(1);
        intervals.push(LiveInterval { reg, start, end, width });
    }
    intervals.sort_by_key(|iv| iv.start);
    intervals
}

struct Pools {
    free8: Vec<Reg8>,
    free16: Vec<Reg16>,
    shadow_free8: Vec<Reg8>,
    shadow_free16: Vec<Reg16>,
    next_spill: i16,
    free_spills: Vec<(i16, u32)>,
}

impl Pools {
    fn new() -> Self {
        Pools {
            free8: Reg8::ALL.to_vec(),
            free16: Reg16::ALL.to_vec(),
            shadow_free8: Reg8::ALL.to_vec(),
            shadow_free16: Reg16::ALL.to_vec(),
            next_spill: 0,
            free_spills: Vec::new(),
        }
    }

    fn assign(&mut self, width: u32) -> PhysicalLoc {
        if width <= 1 {
            if let Some(r) = self.free8.pop() {
                return PhysicalLoc::Reg8(r);
            }
            if let Some(r) = self.shadow_free8.pop() {
                return PhysicalLoc::ShadowReg8(r);
            }
        } else if width == 2 {
            if let Some(r) = self.free16.pop() {
                return PhysicalLoc::Reg16(r);
            }
            if let Some(r) = self.shadow_free16.pop() {
                return PhysicalLoc::ShadowReg16(r);
            }
        }
        self.spill(width)
    }

    fn spill(&mut self, width: u32) -> PhysicalLoc {
        if let Some(pos) = self.free_spills.iter().position(|(_, w)| *w >= width) {
            let (offset, w) = self.free_spills.remove(pos);
            return PhysicalLoc::Spill { offset, width: w };
        }
        let offset = self.next_spill;
        self.next_spill += width as i16;
        PhysicalLoc::Spill { offset, width }
    }

    fn free(&mut self, loc: PhysicalLoc) {
        match loc {
            PhysicalLoc::Reg8(r) => self.free8.push(r),
            PhysicalLoc::Reg16(r) => self.free16.push(r),
            PhysicalLoc::ShadowReg8(r) => self.shadow_free8.push(r),
            PhysicalLoc::ShadowReg16(r) => self.shadow_free16.push(r),
            PhysicalLoc::Spill { offset, width } => self.free_spills.push((offset, width)),
        }
    }
}

/// The outcome of allocating one function: where every virtual
/// register ended up, and how many bytes of `(IX+d)` spill space the
/// function's prologue needs to reserve.
#[derive(Debug, Clone)]
pub struct RegAssignment {
    locations: SecondaryMap<Reg, Option<PhysicalLoc>>,
    pub spill_bytes: u16,
}

impl RegAssignment {
    pub fn location(&self, reg: Reg) -> PhysicalLoc {
        (*self.locations.get(reg)).expect("every virtual register is assigned a location before codegen reads it")
    }
}

/// Runs the linear scan over `f`'s virtual registers. Intervals are
/// processed in order of first definition; any interval whose last
/// use precedes the current one's first definition has its tier
/// freed back to the pool before the new interval is assigned,
/// exactly as `cranelift-codegen`'s register set is drained and
/// refilled as live ranges open and close.
pub fn allocate(f: &MirFunction) -> RegAssignment {
    let intervals = compute_intervals(f);
    let mut pools = Pools::new();
    let mut active: Vec<(LiveInterval, PhysicalLoc)> = Vec::new();
    let mut locations: SecondaryMap<Reg, Option<PhysicalLoc>> = SecondaryMap::with_default(None);

    for iv in intervals {
        active.retain(|(old, loc)| {
            if old.end < iv.start {
                pools.free(*loc);
                false
            } else {
                true
            }
        });
        let loc = pools.assign(iv.width);
        locations.set(iv.reg, Some(loc));
        active.push((iv, loc));
    }

    RegAssignment { locations, spill_bytes: pools.next_spill.max(0) as u16 }
}

#[cfg(test)]
mod tests {
    use super::*;
    use minz_mir::function::CallConvention;
    use minz_mir::instr::{Instruction, Opcode};
    use minz_types::Type;

    fn reg(n: u32) -> Reg {
        Reg::new(n as usize)
    }

    #[test]
    fn non_overlapping_intervals_share_one_physical_register() {
        let mut f = MirFunction::new("f", CallConvention::Register, Type::U8);
        f.new_reg(Type::U8);
        f.new_reg(Type::U8);
        f.push(Instruction::new(Opcode::LoadConst).with_dest(reg(0)).with_imm(1));
        f.push(Instruction::new(Opcode::Return).with_src(reg(0))); // r0 dies here
        f.push(Instruction::new(Opcode::LoadConst).with_dest(reg(1)).with_imm(2));
        f.push(Instruction::new(Opcode::Return).with_src(reg(1)));

        let assignment = allocate(&f);
        assert_eq!(assignment.location(reg(0)), assignment.location(reg(1)));
    }

    #[test]
    fn sixteen_bit_values_prefer_a_register_pair() {
        let mut f = MirFunction::new("f", CallConvention::Register, Type::U16);
        f.new_reg(Type::U16);
        f.push(Instruction::new(Opcode::LoadConst).with_dest(reg(0)).with_imm(1000));
        f.push(Instruction::new(Opcode::Return).with_src(reg(0)));

        let assignment = allocate(&f);
        assert!(matches!(assignment.location(reg(0)), PhysicalLoc::Reg16(_)));
    }

    #[test]
    fn exhausting_physical_and_shadow_tiers_spills_to_memory() {
        let mut f = MirFunction::new("f", CallConvention::Register, Type::U8);
        // 7 physical + 7 shadow 8-bit registers; the 15th concurrently
        // live u8 value has nowhere left but memory.
        let mut regs = Vec::new();
        for _ in 0..15 {
            regs.push(f.new_reg(Type::U8));
        }
        for (i, r) in regs.iter().enumerate() {
            f.push(Instruction::new(Opcode::LoadConst).with_dest(*r).with_imm(i as i64));
        }
        for r in &regs {
            f.push(Instruction::new(Opcode::Return).with_src(*r));
        }

        let assignment = allocate(&f);
        let spilled = regs.iter().filter(|r| matches!(assignment.location(**r), PhysicalLoc::Spill { .. })).count();
        assert!(spilled >= 1, "expected at least one spill once all physical and shadow tiers are exhausted");
    }
}
