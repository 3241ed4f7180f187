//! `PATCH_TABLE` emission (spec §6.2, §4.16): one `(address_word,
//! size_byte, tag_byte)` tuple per SMC anchor, terminated by a `0`
//! word so the assembler/loader can walk the table without a
//! separate count field.

pub fn emit_patch_table(patches: &[(String, u8, u8)]) -> Vec<String> {
    let mut lines = vec!["PATCH_TABLE:".to_string()];
    for (anchor_label, size, tag) in patches {
        lines.push(format!("    DW {anchor_label}"));
        lines.push(format!("    DB {size}, {tag}"));
    }
    lines.push("    DW 0".to_string());
    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminates_with_a_zero_word() {
        let lines = emit_patch_table(&[("x_imm".to_string(), 1, 0)]);
        assert_eq!(lines.last().unwrap(), "    DW 0");
    }

    #[test]
    fn empty_table_is_just_the_terminator() {
        let lines = emit_patch_table(&[]);
        assert_eq!(lines, vec!["PATCH_TABLE:".to_string(), "    DW 0".to_string()]);
    }
}
