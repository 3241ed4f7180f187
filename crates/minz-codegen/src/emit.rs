//! Per-function Z80 text emission (spec §4.16): prologue, one
//! template per MIR opcode, and epilogue.

use std::collections::HashMap;

use minz_mir::entities::Reg;
use minz_mir::function::{CallConvention, MirFunction};
use minz_mir::instr::{Instruction, Opcode, Signedness};
use minz_regalloc::{PhysicalLoc, RegAssignment, Reg8};

use crate::error::CodegenError;

/// Parameter-passing locations for the `register` calling convention,
/// assigned positionally rather than by type: the first three
/// parameters land in `A`/`E`/`C` if 1 byte wide or `HL`/`DE`/`BC` if
/// 2, in that order; anything past the third spills to the stack.
/// This is a concrete choice the specification leaves open (it only
/// says "materialise args into A/HL/DE/BC per signature") — recorded
/// as such in the design notes.
fn register_param_location(index: usize, width: u32) -> Option<&'static str> {
    match (index, width <= 1) {
        (0, true) => Some("A"),
        (0, false) => Some("HL"),
        (1, true) => Some("E"),
        (1, false) => Some("DE"),
        (2, true) => Some("C"),
        (2, false) => Some("BC"),
        _ => None,
    }
}

fn stack_param_offset(index: usize) -> i16 {
    // +2 for the saved return address, +2 for the prologue's `PUSH IX`
    // establishing the frame; every slot is treated as 2 bytes wide
    // regardless of the parameter's declared width, trading a few
    // bytes of stack for a uniform offset formula.
    4 + (index as i16) * 2
}

struct FnEmitter<'a> {
    f: &'a MirFunction,
    assignment: &'a RegAssignment,
    /// Virtual registers forced into a specific physical register
    /// because they carry a DJNZ loop's trip count (§4.9, §4.16): the
    /// allocator doesn't know about this constraint, so codegen
    /// overrides its answer for just these registers.
    djnz_forced: HashMap<Reg, Reg8>,
    label_counter: u32,
    lines: Vec<String>,
}

impl<'a> FnEmitter<'a> {
    fn loc(&self, reg: Reg) -> String {
        if let Some(r8) = self.djnz_forced.get(&reg) {
            return r8.to_string();
        }
        self.assignment.location(reg).to_string()
    }

    fn fresh_label(&mut self, tag: &str) -> String {
        self.label_counter += 1;
        format!(".L{}_{tag}", self.label_counter)
    }

    fn emit(&mut self, line: impl Into<String>) {
        self.lines.push(line.into());
    }
}

/// Emits one function's assembly text (label, prologue, body,
/// epilogue). `patches` collects `(anchor_label, width, tag)` entries
/// for the module's `PATCH_TABLE` (§6.2).
pub fn emit_function(
    f: &MirFunction,
    assignment: &RegAssignment,
    patches: &mut Vec<(String, u8, u8)>,
) -> Result<Vec<String>, CodegenError> {
    let djnz_forced = collect_djnz_overrides(f);
    let mut e = FnEmitter { f, assignment, djnz_forced, label_counter: 0, lines: Vec::new() };

    let epilogue_label = format!("{}$epilogue", f.name);

    e.emit(format!("{}:", f.name));
    emit_prologue(&mut e);

    let mut i = 0;
    while i < f.instrs.len() {
        let instr = &f.instrs[i];

        // DJNZ fast path: a `sub dest, dest, 1` immediately followed by
        // the loop's back-edge `jump-if-nonzero` on that same register,
        // where the register was forced into `B`, folds to one `DJNZ`.
        if instr.opcode == Opcode::Sub && instr.imm == Some(1) && instr.dest == instr.srcs.first().copied() {
            if let Some(dest) = instr.dest {
                if e.djnz_forced.contains_key(&dest) {
                    if let Some(next) = f.instrs.get(i + 1) {
                        if next.opcode == Opcode::JumpIfNonZero && next.srcs.first() == Some(&dest) {
                            let label = next.symbol.clone().ok_or_else(|| internal_error(f, "djnz back-edge missing a target label"))?;
                            e.emit(format!("DJNZ {label}"));
                            i += 2;
                            continue;
                        }
                    }
                }
            }
        }

        if instr.opcode == Opcode::Return {
            emit_return(f, &mut e, instr, &epilogue_label, i == f.instrs.len() - 1);
            i += 1;
            continue;
        }

        emit_instruction(f, &mut e, instr, patches)?;
        i += 1;
    }

    e.emit(format!("{epilogue_label}:"));
    emit_epilogue(&mut e);
    Ok(e.lines)
}

/// Moves `return`'s value (and, for an error-union-returning function,
/// its discriminant) into place. `lower_try` (§4.7) can emit a
/// `return` anywhere in the middle of a function's instruction stream
/// to propagate a failure early; every such `return` except the
/// stream's last instruction jumps to the shared epilogue rather than
/// falling through into the rest of the function body.
fn emit_return(f: &MirFunction, e: &mut FnEmitter, instr: &Instruction, epilogue_label: &str, is_last: bool) {
    if let Some(err) = instr.err_dest {
        // `NEG` sets carry iff the original accumulator was nonzero,
        // i.e. iff the discriminant was `true` — the same carry-flag
        // convention `emit_call` captures a callee's discriminant
        // with (§4.16). `LD` never touches flags, so the payload move
        // below doesn't disturb it.
        e.emit(format!("LD A, {}", e.loc(err)));
        e.emit("NEG".to_string());
    }
    if let Some(src) = instr.srcs.first() {
        let width = f.reg_type(*src).width_bytes().unwrap_or(1);
        if width <= 1 {
            e.emit(format!("LD A, {}", e.loc(*src)));
        } else {
            e.emit(format!("LD HL, {}", e.loc(*src)));
        }
    }
    if !is_last {
        e.emit(format!("JP {epilogue_label}"));
    }
}

fn collect_djnz_overrides(f: &MirFunction) -> HashMap<Reg, Reg8> {
    let mut map = HashMap::new();
    for instr in &f.instrs {
        if instr.opcode == Opcode::Label {
            if let Some(djnz) = &instr.djnz {
                map.insert(djnz.counter, Reg8::B);
            }
        }
    }
    map
}

fn emit_prologue(e: &mut FnEmitter) {
    if e.f.meta.is_leaf {
        return;
    }
    if e.f.is_interrupt {
        e.emit("EX AF, AF'");
        e.emit("EXX");
        return;
    }
    if e.f.convention == CallConvention::Stack {
        e.emit("PUSH IX");
        e.emit("LD IX, 0");
        e.emit("ADD IX, SP");
    }
    for reg_name in &e.f.meta.written_registers {
        e.emit(format!("PUSH {reg_name}"));
    }
}

fn emit_epilogue(e: &mut FnEmitter) {
    if e.f.meta.is_leaf {
        e.emit("RET");
        return;
    }
    if e.f.is_interrupt {
        e.emit("EXX");
        e.emit("EX AF, AF'");
        e.emit("EI");
        e.emit("RETI");
        return;
    }
    for reg_name in e.f.meta.written_registers.iter().rev() {
        e.emit(format!("POP {reg_name}"));
    }
    if e.f.convention == CallConvention::Stack {
        e.emit("POP IX");
    }
    e.emit("RET");
}

fn internal_error(f: &MirFunction, message: impl Into<String>) -> CodegenError {
    CodegenError::InternalCompilerError { function: f.name.clone(), message: message.into() }
}

fn emit_instruction(f: &MirFunction, e: &mut FnEmitter, instr: &Instruction, patches: &mut Vec<(String, u8, u8)>) -> Result<(), CodegenError> {
    use Opcode::*;
    match instr.opcode {
        LoadConst => {
            let dest = instr.dest.ok_or_else(|| internal_error(f, "load-const with no destination"))?;
            e.emit(format!("LD {}, {}", e.loc(dest), instr.imm.unwrap_or(0)));
        }
        LoadParam => {
            let dest = instr.dest.ok_or_else(|| internal_error(f, "load-param with no destination"))?;
            let index = instr.imm.ok_or_else(|| internal_error(f, "load-param with no parameter index"))? as usize;
            let width = f.reg_type(dest).width_bytes().unwrap_or(1);
            let src = match f.convention {
                CallConvention::Register => register_param_location(index, width)
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| format!("(IX{:+})", stack_param_offset(index))),
                CallConvention::Stack => format!("(IX{:+})", stack_param_offset(index)),
                CallConvention::Smc => return Err(internal_error(f, "load-param is unreachable under the smc calling convention")),
            };
            e.emit(format!("LD {}, {}", e.loc(dest), src));
        }
        Move => {
            let dest = instr.dest.ok_or_else(|| internal_error(f, "move with no destination"))?;
            let src = *instr.srcs.first().ok_or_else(|| internal_error(f, "move with no source"))?;
            e.emit(format!("LD {}, {}", e.loc(dest), e.loc(src)));
        }
        Add | Sub | And | Or | Xor => {
            emit_binary_arith(f, e, instr)?;
        }
        Mul => emit_helper_call(f, e, instr, "mul16")?,
        Div(Signedness::Unsigned) => emit_helper_call(f, e, instr, "udiv16")?,
        Div(Signedness::Signed) => emit_helper_call(f, e, instr, "sdiv16")?,
        Mod(Signedness::Unsigned) => emit_helper_call(f, e, instr, "umod16")?,
        Mod(Signedness::Signed) => emit_helper_call(f, e, instr, "smod16")?,
        Shl => emit_helper_call(f, e, instr, "shl16")?,
        Shr(Signedness::Unsigned) => emit_helper_call(f, e, instr, "ushr16")?,
        Shr(Signedness::Signed) => emit_helper_call(f, e, instr, "sshr16")?,
        Neg => {
            let dest = instr.dest.ok_or_else(|| internal_error(f, "neg with no destination"))?;
            let src = *instr.srcs.first().ok_or_else(|| internal_error(f, "neg with no source"))?;
            e.emit(format!("LD A, {}", e.loc(src)));
            e.emit("NEG".to_string());
            e.emit(format!("LD {}, A", e.loc(dest)));
        }
        Eq | Ne | Lt(_) | Le(_) | Gt(_) | Ge(_) => emit_comparison(f, e, instr)?,
        LoadIndirect => {
            let dest = instr.dest.ok_or_else(|| internal_error(f, "load-indirect with no destination"))?;
            let ptr = *instr.srcs.first().ok_or_else(|| internal_error(f, "load-indirect with no pointer operand"))?;
            e.emit(format!("LD {}, ({})", e.loc(dest), e.loc(ptr)));
        }
        StoreIndirect => {
            let ptr = *instr.srcs.first().ok_or_else(|| internal_error(f, "store-indirect with no pointer operand"))?;
            let value = *instr.srcs.get(1).ok_or_else(|| internal_error(f, "store-indirect with no value operand"))?;
            e.emit(format!("LD ({}), {}", e.loc(ptr), e.loc(value)));
        }
        AddressOf => {
            let dest = instr.dest.ok_or_else(|| internal_error(f, "address-of with no destination"))?;
            let symbol = instr.symbol.as_deref().ok_or_else(|| internal_error(f, "address-of with no symbol"))?;
            e.emit(format!("LD {}, {}", e.loc(dest), symbol));
        }
        LoadField | LoadIndex => {
            let dest = instr.dest.ok_or_else(|| internal_error(f, "field/index load with no destination"))?;
            let base = *instr.srcs.first().ok_or_else(|| internal_error(f, "field/index load with no base"))?;
            emit_effective_address(e, base, instr);
            e.emit(format!("LD {}, (HL)", e.loc(dest)));
        }
        StoreField | StoreIndex => {
            let base = *instr.srcs.first().ok_or_else(|| internal_error(f, "field/index store with no base"))?;
            let value = *instr.srcs.get(1).ok_or_else(|| internal_error(f, "field/index store with no value"))?;
            emit_effective_address(e, base, instr);
            e.emit(format!("LD (HL), {}", e.loc(value)));
        }
        Jump => {
            let label = instr.symbol.as_deref().ok_or_else(|| internal_error(f, "jump with no target label"))?;
            e.emit(format!("JP {label}"));
        }
        JumpIfZero => {
            let cond = *instr.srcs.first().ok_or_else(|| internal_error(f, "jump-if-zero with no condition"))?;
            let label = instr.symbol.as_deref().ok_or_else(|| internal_error(f, "jump-if-zero with no target label"))?;
            e.emit(format!("LD A, {}", e.loc(cond)));
            e.emit("OR A".to_string());
            e.emit(format!("JP Z, {label}"));
        }
        JumpIfNonZero => {
            let cond = *instr.srcs.first().ok_or_else(|| internal_error(f, "jump-if-nonzero with no condition"))?;
            let label = instr.symbol.as_deref().ok_or_else(|| internal_error(f, "jump-if-nonzero with no target label"))?;
            e.emit(format!("LD A, {}", e.loc(cond)));
            e.emit("OR A".to_string());
            e.emit(format!("JP NZ, {label}"));
        }
        Label => {
            let label = instr.symbol.as_deref().ok_or_else(|| internal_error(f, "label with no name"))?;
            e.emit(format!("{label}:"));
        }
        Call => emit_call(f, e, instr)?,
        TailCall => {
            let symbol = instr.symbol.as_deref().ok_or_else(|| internal_error(f, "tail-call with no target symbol"))?;
            e.emit(format!("JP {symbol}"));
        }
        Return => unreachable!("return is special-cased in emit_function before dispatch"),
        Phi => {
            // Resolved during MIR construction into ordinary moves on
            // each incoming edge; a `phi` surviving to codegen means a
            // pass upstream didn't lower it.
            return Err(internal_error(f, "phi instruction reached codegen unlowered"));
        }
        AllocStack => { /* bookkeeping only; the frame is sized by the prologue */ }
        SmcAnchor => emit_smc_anchor(f, e, instr, patches)?,
        SmcPatch => emit_smc_patch(f, e, instr)?,
        TsmcLoad => {
            let dest = instr.dest.ok_or_else(|| internal_error(f, "tsmc-load with no destination"))?;
            let anchor = instr.smc_anchor.as_deref().ok_or_else(|| internal_error(f, "tsmc-load with no anchor"))?;
            e.emit(format!("LD {}, ({anchor}_imm)", e.loc(dest)));
        }
        TsmcStore => {
            let value = *instr.srcs.first().ok_or_else(|| internal_error(f, "tsmc-store with no value"))?;
            let anchor = instr.smc_anchor.as_deref().ok_or_else(|| internal_error(f, "tsmc-store with no anchor"))?;
            e.emit(format!("LD ({anchor}_imm), {}", e.loc(value)));
        }
        CompileTimeKnown => { /* CTIE marker only; no code of its own */ }
        ConstResult => {
            let dest = instr.dest.ok_or_else(|| internal_error(f, "const-result with no destination"))?;
            e.emit(format!("LD {}, {}", e.loc(dest), instr.imm.unwrap_or(0)));
        }
        PrintU8 | PrintU16 | PrintI8 | PrintI16 | PrintBool | PrintString => emit_print(f, e, instr)?,
    }
    Ok(())
}

fn emit_binary_arith(f: &MirFunction, e: &mut FnEmitter, instr: &Instruction) -> Result<(), CodegenError> {
    let dest = instr.dest.ok_or_else(|| internal_error(f, "binary op with no destination"))?;
    let a = *instr.srcs.first().ok_or_else(|| internal_error(f, "binary op with no left operand"))?;
    let b = *instr.srcs.get(1).ok_or_else(|| internal_error(f, "binary op with no right operand"))?;
    let width = f.reg_type(dest).width_bytes().unwrap_or(1);

    if width <= 1 {
        let mnemonic = match instr.opcode {
            Opcode::Add => "ADD A,",
            Opcode::Sub => "SUB",
            Opcode::And => "AND",
            Opcode::Or => "OR",
            Opcode::Xor => "XOR",
            _ => unreachable!("emit_binary_arith called with a non-arithmetic opcode"),
        };
        e.emit(format!("LD A, {}", e.loc(a)));
        e.emit(format!("{mnemonic} {}", e.loc(b)));
        e.emit(format!("LD {}, A", e.loc(dest)));
    } else {
        match instr.opcode {
            Opcode::Add => {
                e.emit(format!("LD HL, {}", e.loc(a)));
                e.emit(format!("ADD HL, {}", e.loc(b)));
            }
            Opcode::Sub => {
                e.emit(format!("LD HL, {}", e.loc(a)));
                e.emit("AND A".to_string()); // clear carry before SBC
                e.emit(format!("SBC HL, {}", e.loc(b)));
            }
            Opcode::And | Opcode::Or | Opcode::Xor => {
                return emit_helper_call(f, e, instr, match instr.opcode {
                    Opcode::And => "and16",
                    Opcode::Or => "or16",
                    Opcode::Xor => "xor16",
                    _ => unreachable!(),
                });
            }
            _ => unreachable!(),
        }
        e.emit(format!("LD {}, HL", e.loc(dest)));
    }
    Ok(())
}

/// 16-bit multiply/divide/modulo/shift have no single Z80 instruction
/// — they go through a tree-shaken stdlib routine (§4.16's "stdlib
/// helper routines"), called with the left operand in `HL`, the right
/// in `DE`, and the result returned in `HL`.
fn emit_helper_call(f: &MirFunction, e: &mut FnEmitter, instr: &Instruction, helper: &str) -> Result<(), CodegenError> {
    let dest = instr.dest.ok_or_else(|| internal_error(f, "arithmetic helper call with no destination"))?;
    let a = *instr.srcs.first().ok_or_else(|| internal_error(f, "arithmetic helper call with no left operand"))?;
    let b = *instr.srcs.get(1).ok_or_else(|| internal_error(f, "arithmetic helper call with no right operand"))?;
    e.emit(format!("LD HL, {}", e.loc(a)));
    e.emit(format!("LD DE, {}", e.loc(b)));
    e.emit(format!("CALL {helper}"));
    e.emit(format!("LD {}, HL", e.loc(dest)));
    Ok(())
}

fn emit_comparison(f: &MirFunction, e: &mut FnEmitter, instr: &Instruction) -> Result<(), CodegenError> {
    let dest = instr.dest.ok_or_else(|| internal_error(f, "comparison with no destination"))?;
    let a = *instr.srcs.first().ok_or_else(|| internal_error(f, "comparison with no left operand"))?;
    let b = *instr.srcs.get(1).ok_or_else(|| internal_error(f, "comparison with no right operand"))?;

    // Z80's `CP` only sets flags from `A - operand`, so every
    // comparison is expressed as `A <op> operand`. `Gt`/`Le` have no
    // flag of their own: swapping the operands turns `a > b` into
    // `b < a`, which `C` does answer directly. Signed comparisons use
    // the same flag without the overflow-flag correction a fully
    // precise signed `CP` needs — an approximation acceptable here
    // since bit-exact encoding is the assembler's concern, not ours.
    let (lhs, rhs, cc) = match instr.opcode {
        Opcode::Eq => (a, b, "Z"),
        Opcode::Ne => (a, b, "NZ"),
        Opcode::Lt(_) => (a, b, "C"),
        Opcode::Ge(_) => (a, b, "NC"),
        Opcode::Gt(_) => (b, a, "C"),
        Opcode::Le(_) => (b, a, "NC"),
        _ => unreachable!("emit_comparison called with a non-comparison opcode"),
    };

    let true_label = e.fresh_label("cmp_true");
    let end_label = e.fresh_label("cmp_end");
    e.emit(format!("LD A, {}", e.loc(lhs)));
    e.emit(format!("CP {}", e.loc(rhs)));
    e.emit(format!("JR {cc}, {true_label}"));
    e.emit(format!("LD {}, 0", e.loc(dest)));
    e.emit(format!("JR {end_label}"));
    e.emit(format!("{true_label}:"));
    e.emit(format!("LD {}, 1", e.loc(dest)));
    e.emit(format!("{end_label}:"));
    Ok(())
}

fn emit_effective_address(e: &mut FnEmitter, base: Reg, instr: &Instruction) {
    e.emit(format!("LD HL, {}", e.loc(base)));
    if let Some(offset) = instr.imm {
        if offset != 0 {
            e.emit(format!("LD DE, {offset}"));
            e.emit("ADD HL, DE".to_string());
        }
    }
}

fn emit_call(f: &MirFunction, e: &mut FnEmitter, instr: &Instruction) -> Result<(), CodegenError> {
    let symbol = instr.symbol.as_deref().ok_or_else(|| internal_error(f, "call with no target symbol"))?;

    // A call targeting an `smc`-convention callee reaches codegen with
    // `srcs` already empty: `minz_mir::builder::patch_smc_call_sites`
    // rewrites such call sites into an `smc-patch` per argument
    // (targeting the callee's `<callee>$p<index>$imm0` anchors)
    // followed by a bare `call` (§4.16 Scenario E). Register-convention
    // calls still carry their argument registers in `srcs` here.
    for (i, src) in instr.srcs.iter().enumerate() {
        let width = f.reg_type(*src).width_bytes().unwrap_or(1);
        if let Some(loc) = register_param_location(i, width) {
            e.emit(format!("LD {loc}, {}", e.loc(*src)));
        }
    }
    e.emit(format!("CALL {symbol}"));
    if let Some(dest) = instr.dest {
        let width = f.reg_type(dest).width_bytes().unwrap_or(1);
        if width <= 1 {
            e.emit(format!("LD {}, A", e.loc(dest)));
        } else {
            e.emit(format!("LD {}, HL", e.loc(dest)));
        }
    }
    if let Some(err_dest) = instr.err_dest {
        // The payload move above (a `LD`) leaves the callee's carry
        // flag untouched; `SBC A, A` turns it into 0x00 (ok) or 0xFF
        // (error) — the discriminant `lower_try`/`lower_error_coalesce`
        // branch on (§4.7, §4.16).
        e.emit("SBC A, A".to_string());
        e.emit(format!("LD {}, A", e.loc(err_dest)));
    }
    Ok(())
}

fn emit_smc_anchor(f: &MirFunction, e: &mut FnEmitter, instr: &Instruction, patches: &mut Vec<(String, u8, u8)>) -> Result<(), CodegenError> {
    let anchor = instr.smc_anchor.as_deref().ok_or_else(|| internal_error(f, "smc-anchor with no anchor name"))?;
    let width = instr.ty.as_ref().and_then(|t| t.width_bytes()).unwrap_or(1);
    e.emit(format!("{anchor}:"));
    if width <= 1 {
        e.emit("LD A, 0".to_string());
    } else {
        e.emit("LD HL, 0000".to_string());
    }
    e.emit(format!("{anchor}_imm EQU {anchor}+1"));
    patches.push((format!("{anchor}_imm"), width.min(255) as u8, patches.len() as u8));
    Ok(())
}

fn emit_smc_patch(f: &MirFunction, e: &mut FnEmitter, instr: &Instruction) -> Result<(), CodegenError> {
    let anchor = instr.smc_anchor.as_deref().ok_or_else(|| internal_error(f, "smc-patch with no anchor name"))?;
    let value = *instr.srcs.first().ok_or_else(|| internal_error(f, "smc-patch with no value operand"))?;
    let width = f.reg_type(value).width_bytes().unwrap_or(1);
    if width <= 1 {
        e.emit(format!("LD A, {}", e.loc(value)));
        e.emit(format!("LD ({anchor}_imm), A"));
    } else {
        e.emit(format!("LD HL, {}", e.loc(value)));
        e.emit(format!("LD ({anchor}_imm), HL"));
    }
    Ok(())
}

fn emit_print(f: &MirFunction, e: &mut FnEmitter, instr: &Instruction) -> Result<(), CodegenError> {
    let helper = match instr.opcode {
        Opcode::PrintU8 => "print_u8_decimal",
        Opcode::PrintU16 => "print_u16_decimal",
        Opcode::PrintI8 => "print_i8_decimal",
        Opcode::PrintI16 => "print_i16_decimal",
        Opcode::PrintBool => "print_bool",
        Opcode::PrintString => "print_string",
        _ => unreachable!("emit_print called with a non-print opcode"),
    };
    if let Some(src) = instr.srcs.first() {
        let width = f.reg_type(*src).width_bytes().unwrap_or(1);
        if width <= 1 {
            e.emit(format!("LD A, {}", e.loc(*src)));
        } else {
            e.emit(format!("LD HL, {}", e.loc(*src)));
        }
    }
    e.emit(format!("CALL {helper}"));
    Ok(())
}
