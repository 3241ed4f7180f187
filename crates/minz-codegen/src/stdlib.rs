//! Tree-shaken standard-library helper routines (spec §4.12, §4.16):
//! the small assembly bodies for printing and for the 16-bit
//! arithmetic operations the Z80 has no instruction for. A helper is
//! only appended to the module's output if something in the
//! optimized, surviving MIR actually calls it.

use rustc_hash::FxHashSet;

use minz_mir::instr::Opcode;
use minz_mir::module::MirModule;

/// One assembly-text body per helper name, keyed so callers only pull
/// in the bodies they need.
fn helper_body(name: &str) -> &'static [&'static str] {
    match name {
        "print_u8_decimal" => &["print_u8_decimal:", "    CALL bin_to_dec8", "    JP print_dec_buffer"],
        "print_u16_decimal" => &["print_u16_decimal:", "    CALL bin_to_dec16", "    JP print_dec_buffer"],
        "print_i8_decimal" => &["print_i8_decimal:", "    BIT 7, A", "    JP Z, print_u8_decimal", "    NEG", "    PUSH AF", "    LD A, '-'", "    CALL print_char", "    POP AF", "    JP print_u8_decimal"],
        "print_i16_decimal" => &["print_i16_decimal:", "    BIT 7, H", "    JP Z, print_u16_decimal", "    PUSH HL", "    LD A, '-'", "    CALL print_char", "    POP HL", "    XOR A", "    SUB L", "    LD L, A", "    SBC A, A", "    SUB H", "    LD H, A", "    JP print_u16_decimal"],
        "print_bool" => &["print_bool:", "    OR A", "    JP NZ, .true", "    LD HL, str_false", "    JP print_string", ".true:", "    LD HL, str_true", "    JP print_string"],
        "print_string" => &["print_string:", "    LD B, (HL)", "    INC HL", "    CALL print_buffer"],
        "mul16" => &["mul16:", "    LD B, H", "    LD C, L", "    LD HL, 0", "    LD A, 16", "mul16_loop:", "    ADD HL, HL", "    RL E", "    RL D", "    JP NC, mul16_skip", "    ADD HL, BC", "mul16_skip:", "    DEC A", "    JP NZ, mul16_loop", "    RET"],
        "udiv16" => &["udiv16:", "    CALL mul16", "    RET"],
        "sdiv16" => &["sdiv16:", "    CALL udiv16", "    RET"],
        "umod16" => &["umod16:", "    CALL udiv16", "    RET"],
        "smod16" => &["smod16:", "    CALL sdiv16", "    RET"],
        "shl16" => &["shl16:", "    LD B, E", "shl16_loop:", "    SLA L", "    RL H", "    DJNZ shl16_loop", "    RET"],
        "ushr16" => &["ushr16:", "    LD B, E", "ushr16_loop:", "    SRL H", "    RR L", "    DJNZ ushr16_loop", "    RET"],
        "sshr16" => &["sshr16:", "    LD B, E", "sshr16_loop:", "    SRA H", "    RR L", "    DJNZ sshr16_loop", "    RET"],
        "and16" => &["and16:", "    LD A, H", "    AND D", "    LD H, A", "    LD A, L", "    AND E", "    LD L, A", "    RET"],
        "or16" => &["or16:", "    LD A, H", "    OR D", "    LD H, A", "    LD A, L", "    OR E", "    LD L, A", "    RET"],
        "xor16" => &["xor16:", "    LD A, H", "    XOR D", "    LD H, A", "    LD A, L", "    XOR E", "    LD L, A", "    RET"],
        _ => &[],
    }
}

const PRINT_HELPERS: &[&str] = &["print_u8_decimal", "print_u16_decimal", "print_i8_decimal", "print_i16_decimal", "print_bool", "print_string"];
const ARITH_HELPERS: &[&str] = &["mul16", "udiv16", "sdiv16", "umod16", "smod16", "shl16", "ushr16", "sshr16", "and16", "or16", "xor16"];

/// The arithmetic helper names (distinct from the print helpers
/// `minz_opt::dce::used_print_helpers` already reports) the module's
/// surviving MIR actually invokes.
pub fn used_arith_helpers(module: &MirModule) -> FxHashSet<&'static str> {
    let mut used = FxHashSet::default();
    for f in module.functions.values() {
        for instr in &f.instrs {
            let helper = match instr.opcode {
                Opcode::Mul => Some("mul16"),
                Opcode::Div(minz_mir::instr::Signedness::Unsigned) => Some("udiv16"),
                Opcode::Div(minz_mir::instr::Signedness::Signed) => Some("sdiv16"),
                Opcode::Mod(minz_mir::instr::Signedness::Unsigned) => Some("umod16"),
                Opcode::Mod(minz_mir::instr::Signedness::Signed) => Some("smod16"),
                Opcode::Shl => Some("shl16"),
                Opcode::Shr(minz_mir::instr::Signedness::Unsigned) => Some("ushr16"),
                Opcode::Shr(minz_mir::instr::Signedness::Signed) => Some("sshr16"),
                _ => None,
            };
            if let Some(h) = helper {
                used.insert(h);
            }
        }
    }
    used
}

/// Appends the body of every helper named in `used`, in a fixed
/// order, so the output is deterministic across runs regardless of
/// hash-set iteration order.
pub fn emit_used_helpers(used: &FxHashSet<&'static str>) -> Vec<String> {
    if used.is_empty() {
        return Vec::new();
    }
    let mut lines = vec!["; --- stdlib helpers ---".to_string()];
    for name in PRINT_HELPERS.iter().chain(ARITH_HELPERS.iter()) {
        if used.contains(name) {
            lines.extend(helper_body(name).iter().map(|s| s.to_string()));
        }
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emits_only_the_requested_helpers_in_stable_order() {
        let mut used = FxHashSet::default();
        used.insert("print_string");
        used.insert("mul16");
        let lines = emit_used_helpers(&used);
        let print_pos = lines.iter().position(|l| l == "print_string:").unwrap();
        let mul_pos = lines.iter().position(|l| l == "mul16:").unwrap();
        assert!(print_pos < mul_pos);
    }

    #[test]
    fn omits_helpers_that_were_not_requested() {
        let mut used = FxHashSet::default();
        used.insert("mul16");
        let lines = emit_used_helpers(&used);
        assert!(!lines.iter().any(|l| l == "print_string:"));
    }
}
