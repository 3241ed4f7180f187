//! A MIR function: a per-function instruction stream over virtual
//! registers, plus the metadata later passes attach (spec §3.5).

use minz_entity::PrimaryMap;
use minz_types::Type;

use crate::entities::Reg;
use crate::instr::Instruction;

/// How a function receives its arguments (spec §3.5, §4.16).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallConvention {
    /// Arguments pushed right-to-left; caller cleans the stack.
    Stack,
    /// Arguments materialized into A/HL/DE/BC per signature.
    Register,
    /// Arguments patched into the callee's own instruction immediates
    /// before `CALL` (true self-modifying-code parameter passing).
    Smc,
}

/// Per-function facts computed by later passes and consumed by
/// codegen (spec §3.5).
#[derive(Debug, Clone, Default)]
pub struct FunctionMeta {
    pub is_recursive: bool,
    pub uses_smc: bool,
    /// Set by `minz_opt::purity` (§4.10); consumed by CTIE and DCE.
    pub is_pure: bool,
    /// No callees and no stack frame of its own; may elide a
    /// prologue entirely (§4.14).
    pub is_leaf: bool,
    /// Physical Z80 registers this function's body actually writes,
    /// computed by `minz_regalloc::usage` (§4.14) once instructions
    /// have been allocated. Empty until that pass runs.
    pub written_registers: Vec<String>,
}

/// One named virtual register's declared type, recorded at the point
/// it was allocated so later passes (SMC width selection, register
/// class assignment) don't need to re-infer it.
#[derive(Debug, Clone)]
pub struct RegSlot {
    pub ty: Type,
}

#[derive(Debug, Clone)]
pub struct MirFunction {
    pub name: String,
    pub convention: CallConvention,
    /// One virtual register per source parameter, in declaration
    /// order; `load-param` instructions read into these.
    pub param_regs: Vec<Reg>,
    pub ret: Type,
    pub instrs: Vec<Instruction>,
    pub regs: PrimaryMap<Reg, RegSlot>,
    pub meta: FunctionMeta,
    /// Set on a function created as an interrupt handler (§4.16):
    /// codegen preserves context with `EX AF,AF'`/`EXX` instead of
    /// push/pop.
    pub is_interrupt: bool,
}

impl MirFunction {
    pub fn new(name: impl Into<String>, convention: CallConvention, ret: Type) -> Self {
        MirFunction {
            name: name.into(),
            convention,
            param_regs: Vec::new(),
            ret,
            instrs: Vec::new(),
            regs: PrimaryMap::new(),
            meta: FunctionMeta::default(),
            is_interrupt: false,
        }
    }

    /// Allocate a fresh virtual register of type `ty`.
    pub fn new_reg(&mut self, ty: Type) -> Reg {
        self.regs.push(RegSlot { ty })
    }

    pub fn reg_type(&self, reg: Reg) -> &Type {
        &self.regs[reg].ty
    }

    pub fn push(&mut self, instr: Instruction) {
        self.instrs.push(instr);
    }

    /// True if this function issues no `call`/`tail-call` of its own,
    /// used by `minz_regalloc::usage` to decide prologue elision
    /// (§4.14) and left for `minz_opt::purity` to refine `is_leaf`
    /// semantics further (a leaf can still write memory).
    pub fn computes_no_calls(&self) -> bool {
        !self.instrs.iter().any(|i| matches!(i.opcode, crate::instr::Opcode::Call | crate::instr::Opcode::TailCall))
    }
}
