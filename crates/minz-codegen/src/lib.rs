//! Z80 assembly text emission from allocated MIR (spec §4.16, §6.2).
//!
//! The driver is expected to have already run `minz_opt::optimize_module`
//! and `minz_regalloc::allocate_module` over the module before calling
//! [`emit_module`] — this crate only turns the result into text, it
//! doesn't run its own copy of either pass (§5: passes run strictly
//! sequentially over one shared module).

mod data;
mod emit;
mod error;
mod patch_table;
mod peephole;
mod stdlib;
mod target;

pub use error::CodegenError;
pub use target::{Target, TargetConfig};

use minz_mir::module::MirModule;
use minz_regalloc::RegAssignment;

#[derive(Debug, Clone)]
pub struct CodegenOptions {
    pub target: TargetConfig,
    pub enable_peephole: bool,
}

/// Emits the whole module as one assembly-text file, sectioned per
/// §6.2: an optional `ORG`, the data section, the code section (one
/// block per surviving function), and the `PATCH_TABLE`.
///
/// `assignments` must be in the same order as `module.functions`
/// (i.e. exactly what `minz_regalloc::allocate_module` returned).
pub fn emit_module(module: &MirModule, assignments: &[RegAssignment], opts: &CodegenOptions) -> Result<String, CodegenError> {
    let mut lines = Vec::new();

    if let Some(org) = opts.target.target.org_address() {
        lines.push(format!("ORG {:#06X}", org));
    }
    lines.push(format!("; TARGET {}", opts.target.target.identifier()));

    let globals: Vec<_> = module.globals.values().collect();
    lines.extend(data::emit_data_section(&globals));

    let mut patches = Vec::new();
    for (f, assignment) in module.functions.values().zip(assignments) {
        let mut fn_lines = emit::emit_function(f, assignment, &mut patches)?;
        if opts.enable_peephole {
            peephole::asm_peephole(&mut fn_lines);
        }
        lines.extend(fn_lines);
    }

    let print_helpers = minz_opt::dce::used_print_helpers(module);
    let arith_helpers = stdlib::used_arith_helpers(module);
    let mut all_helpers = print_helpers;
    all_helpers.extend(arith_helpers);
    lines.extend(stdlib::emit_used_helpers(&all_helpers));

    lines.extend(patch_table::emit_patch_table(&patches));

    Ok(lines.join("\n") + "\n")
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

    fn opts() -> CodegenOptions {
        CodegenOptions { target: TargetConfig { target: Target::Generic, debug: false }, enable_peephole: true }
    }

    #[test]
    fn emits_a_label_and_return_for_a_trivial_function() {
        let mut module = MirModule::new();
        let mut f = MirFunction::new("answer", CallConvention::Register, Type::U8);
        f.new_reg(Type::U8);
        f.push(Instruction::new(Opcode::LoadConst).with_dest(reg(0)).with_imm(42));
        f.push(Instruction::new(Opcode::Return).with_src(reg(0)));
        f.meta.is_leaf = true;
        module.add_function(f);

        let assignments = minz_regalloc::allocate_module(&mut module);
        let text = emit_module(&module, &assignments, &opts()).unwrap();
        assert!(text.contains("answer:"));
        assert!(text.contains("LD A, 42"));
        assert!(text.contains("RET"));
    }

    #[test]
    fn patch_table_is_present_even_when_empty() {
        let mut module = MirModule::new();
        module.add_function(MirFunction::new("noop", CallConvention::Register, Type::Void));
        let assignments = minz_regalloc::allocate_module(&mut module);
        let text = emit_module(&module, &assignments, &opts()).unwrap();
        assert!(text.contains("PATCH_TABLE:"));
        assert!(text.contains("DW 0"));
    }

    #[test]
    fn a_call_into_an_error_union_captures_its_carry_flag() {
        let mut module = MirModule::new();
        let mut f = MirFunction::new("caller", CallConvention::Register, Type::Void);
        let payload = f.new_reg(Type::U8);
        let is_err = f.new_reg(Type::Bool);
        f.push(Instruction::new(Opcode::Call).with_dest(payload).with_err_dest(is_err).with_symbol("fallible"));
        f.push(Instruction::new(Opcode::Return));
        f.meta.is_leaf = false;
        module.add_function(f);

        let assignments = minz_regalloc::allocate_module(&mut module);
        let text = emit_module(&module, &assignments, &opts()).unwrap();
        assert!(text.contains("CALL fallible"));
        assert!(text.contains("SBC A, A"));
    }

    #[test]
    fn an_early_return_jumps_to_the_shared_epilogue_instead_of_falling_through() {
        let mut module = MirModule::new();
        let mut f = MirFunction::new("maybe", CallConvention::Register, Type::U8);
        let is_err = f.new_reg(Type::Bool);
        let errval = f.new_reg(Type::U8);
        let okval = f.new_reg(Type::U8);
        f.push(Instruction::new(Opcode::LoadConst).with_dest(is_err).with_imm(1).with_ty(Type::Bool));
        f.push(Instruction::new(Opcode::JumpIfZero).with_src(is_err).with_symbol("ok".to_string()));
        f.push(Instruction::new(Opcode::LoadConst).with_dest(errval).with_imm(9));
        f.push(Instruction::new(Opcode::Return).with_src(errval).with_err_dest(is_err));
        f.push(Instruction::new(Opcode::Label).with_symbol("ok".to_string()));
        f.push(Instruction::new(Opcode::LoadConst).with_dest(okval).with_imm(1));
        f.push(Instruction::new(Opcode::Return).with_src(okval));
        module.add_function(f);

        let assignments = minz_regalloc::allocate_module(&mut module);
        let text = emit_module(&module, &assignments, &opts()).unwrap();
        assert!(text.contains("maybe$epilogue:"));
        assert!(text.contains("JP maybe$epilogue"), "the non-tail return should jump to the shared epilogue:\n{text}");
    }

    #[test]
    fn a_spectrum_target_emits_its_origin_address() {
        let mut module = MirModule::new();
        module.add_function(MirFunction::new("noop", CallConvention::Register, Type::Void));
        let assignments = minz_regalloc::allocate_module(&mut module);
        let o = CodegenOptions { target: TargetConfig { target: Target::Spectrum, debug: false }, enable_peephole: false };
        let text = emit_module(&module, &assignments, &o).unwrap();
        assert!(text.starts_with("ORG 0x8000") || text.to_uppercase().starts_with("ORG 0X8000"));
    }
}
