//! Data-section emission (spec §6.2): strings, constant tables, and
//! global variable cells, in module declaration order.

use minz_mir::module::GlobalData;

pub fn emit_data_section(globals: &[&GlobalData]) -> Vec<String> {
    if globals.is_empty() {
        return Vec::new();
    }
    let mut lines = vec!["; --- data ---".to_string()];
    for g in globals {
        match g {
            GlobalData::StringLiteral { label, bytes, length_prefix_bytes } => {
                lines.push(format!("{label}:"));
                if *length_prefix_bytes == 1 {
                    lines.push(format!("    DB {}", bytes.len().min(255)));
                } else {
                    lines.push(format!("    DW {}", bytes.len()));
                }
                lines.push(format!("    DB {}", byte_list(bytes)));
            }
            GlobalData::ConstTable { label, bytes } => {
                lines.push(format!("{label}:"));
                lines.push(format!("    DB {}", byte_list(bytes)));
            }
            GlobalData::GlobalVar { label, size, init, mutable: _ } => {
                lines.push(format!("{label}:"));
                match init {
                    Some(bytes) => lines.push(format!("    DB {}", byte_list(bytes))),
                    None => lines.push(format!("    DS {size}")),
                }
            }
        }
    }
    lines
}

fn byte_list(bytes: &[u8]) -> String {
    if bytes.is_empty() {
        return "0".to_string();
    }
    bytes.iter().map(|b| b.to_string()).collect::<Vec<_>>().join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_literal_gets_a_one_byte_length_prefix() {
        let g = GlobalData::StringLiteral { label: "str_0".to_string(), bytes: b"hi".to_vec(), length_prefix_bytes: 1 };
        let lines = emit_data_section(&[&g]);
        assert!(lines.contains(&"    DB 2".to_string()));
    }

    #[test]
    fn uninitialized_global_var_reserves_space() {
        let g = GlobalData::GlobalVar { label: "counter".to_string(), size: 2, init: None, mutable: true };
        let lines = emit_data_section(&[&g]);
        assert!(lines.contains(&"    DS 2".to_string()));
    }
}
