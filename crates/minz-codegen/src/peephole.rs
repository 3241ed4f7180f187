//! Assembly-text peephole rewriting (spec §4.13): the half of the
//! peephole optimizer that only makes sense once instructions are
//! text — `minz_opt::peephole` already folds the MIR-level patterns
//! (redundant const reloads, power-of-two multiply strength
//! reduction) before codegen ever sees the function.

/// `LD A, B; LD B, A` — the second load restores a value `B` already
/// held before the first one ran, so it's a no-op.
fn remove_redundant_reverse_load(lines: &mut Vec<String>) -> usize {
    let mut removed = 0;
    let mut i = 0;
    while i + 1 < lines.len() {
        if let (Some((d1, s1)), Some((d2, s2))) = (parse_ld_reg_reg(&lines[i]), parse_ld_reg_reg(&lines[i + 1])) {
            if d1 == s2 && s1 == d2 {
                lines.remove(i + 1);
                removed += 1;
                continue;
            }
        }
        i += 1;
    }
    removed
}

fn parse_ld_reg_reg(line: &str) -> Option<(String, String)> {
    let rest = line.trim().strip_prefix("LD ")?;
    let (dest, src) = rest.split_once(',')?;
    let dest = dest.trim();
    let src = src.trim();
    const REGS: [&str; 7] = ["A", "B", "C", "D", "E", "H", "L"];
    if REGS.contains(&dest) && REGS.contains(&src) {
        Some((dest.to_string(), src.to_string()))
    } else {
        None
    }
}

/// `JP <label>` immediately followed by `<label>:` is a fallthrough;
/// it was already folded at the MIR level for labels the builder
/// controls, but codegen can introduce its own (e.g. a comparison's
/// `end` label), so the text pass catches those too.
fn remove_fallthrough_jumps(lines: &mut Vec<String>) -> usize {
    let mut removed = 0;
    let mut i = 0;
    while i + 1 < lines.len() {
        let jump_target = lines[i].trim().strip_prefix("JP ").map(|s| s.trim().to_string());
        let label = lines[i + 1].trim().strip_suffix(':').map(|s| s.to_string());
        if let (Some(target), Some(label)) = (jump_target, label) {
            if target == label {
                lines.remove(i);
                removed += 1;
                continue;
            }
        }
        i += 1;
    }
    removed
}

/// `DEC <reg>` followed by an unconditional-on-nonzero jump back to a
/// label folds to one `DJNZ` when the register is `B` — the direct
/// text-level realization of the spec's illustrative example. Codegen
/// itself already emits `DJNZ` for loops whose counter it forced into
/// `B` (§4.16); this catches any decrement/branch pair that reached
/// text some other way (e.g. from a future pass or a hand-built test
/// function) without that MIR-level foreknowledge.
fn fold_dec_jump_nonzero_into_djnz(lines: &mut Vec<String>) -> usize {
    let mut removed = 0;
    let mut i = 0;
    while i + 1 < lines.len() {
        let is_dec_b = lines[i].trim() == "DEC B";
        let jump = lines[i + 1].trim().strip_prefix("JP NZ, ").map(|s| s.trim().to_string());
        if is_dec_b {
            if let Some(label) = jump {
                lines[i] = format!("DJNZ {label}");
                lines.remove(i + 1);
                removed += 1;
                continue;
            }
        }
        i += 1;
    }
    removed
}

/// Runs every assembly-text peephole rewrite to a fixed point.
pub fn asm_peephole(lines: &mut Vec<String>) -> usize {
    let mut total = 0;
    loop {
        let removed = remove_redundant_reverse_load(lines) + remove_fallthrough_jumps(lines) + fold_dec_jump_nonzero_into_djnz(lines);
        total += removed;
        if removed == 0 {
            return total;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drops_a_reverse_reload_that_restores_the_same_value() {
        let mut lines = vec!["LD A, B".to_string(), "LD B, A".to_string()];
        assert_eq!(asm_peephole(&mut lines), 1);
        assert_eq!(lines, vec!["LD A, B".to_string()]);
    }

    #[test]
    fn removes_a_jump_to_the_next_label() {
        let mut lines = vec!["JP .end".to_string(), ".end:".to_string()];
        assert_eq!(asm_peephole(&mut lines), 1);
        assert_eq!(lines, vec![".end:".to_string()]);
    }

    #[test]
    fn folds_dec_b_and_jump_nonzero_into_djnz() {
        let mut lines = vec!["DEC B".to_string(), "JP NZ, loopL".to_string()];
        asm_peephole(&mut lines);
        assert_eq!(lines, vec!["DJNZ loopL".to_string()]);
    }

    #[test]
    fn leaves_unrelated_instructions_untouched() {
        let mut lines = vec!["LD A, 5".to_string(), "CALL foo".to_string()];
        assert_eq!(asm_peephole(&mut lines), 0);
        assert_eq!(lines.len(), 2);
    }
}
