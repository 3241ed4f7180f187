//! Dead-code elimination (spec §4.12): a local per-function pass over
//! unread pure instructions, and a module-wide sweep of functions and
//! data no live function reaches.
//!
//! The local pass is the direct MinZ analogue of `cranelift-codegen`'s
//! `dce.rs` (`do_dce`): instead of walking a dominator tree backward
//! from block exits, it runs a worklist fixed point over the flat MIR
//! instruction stream, since MIR here has no block structure of its
//! own — `label`/`jump` instructions stand in for block boundaries.

use rustc_hash::FxHashSet;

use minz_mir::entities::Reg;
use minz_mir::function::MirFunction;
use minz_mir::module::{GlobalData, MirModule};

/// Removes instructions whose destination register is never read and
/// which have no side effect (`Instruction::is_dead_eligible`),
/// repeating until a pass removes nothing — removing one dead
/// instruction can make the instruction that produced one of its
/// operands dead in turn. Returns the number of instructions removed.
pub fn local_dce(f: &mut MirFunction) -> usize {
    let mut total_removed = 0;
    loop {
        let mut read: FxHashSet<Reg> = FxHashSet::default();
        for instr in &f.instrs {
            for s in &instr.srcs {
                read.insert(*s);
            }
            if let Some(d) = &instr.djnz {
                read.insert(d.counter);
            }
            if let Some(e) = instr.err_dest {
                read.insert(e);
            }
        }

        let before = f.instrs.len();
        f.instrs.retain(|i| !(i.is_dead_eligible() && i.dest.is_some_and(|d| !read.contains(&d))));
        let removed = before - f.instrs.len();
        total_removed += removed;
        if removed == 0 {
            return total_removed;
        }
    }
}

/// Functions reachable from the module's roots: exported (`pub`)
/// functions, any function named in `extra_roots` (callers pass
/// `main` and any entry points the driver was invoked against), and
/// anything an address-of instruction reaches transitively once a
/// live function is known to take it (spec §4.12: "a function kept
/// alive by `@export`/`main`/having its address taken").
fn reachable_functions(module: &MirModule, extra_roots: &[String]) -> FxHashSet<String> {
    let mut live: FxHashSet<String> = FxHashSet::default();
    let mut worklist: Vec<String> = Vec::new();

    for f in module.functions.values() {
        if extra_roots.iter().any(|r| r == &f.name) {
            worklist.push(f.name.clone());
        }
    }

    while let Some(name) = worklist.pop() {
        if !live.insert(name.clone()) {
            continue;
        }
        let Some(id) = module.find_function(&name) else { continue };
        let f = &module.functions[id];
        for instr in &f.instrs {
            use minz_mir::instr::Opcode::*;
            if matches!(instr.opcode, Call | TailCall | AddressOf) {
                if let Some(callee) = &instr.symbol {
                    if !live.contains(callee) {
                        worklist.push(callee.clone());
                    }
                }
            }
        }
    }
    live
}

/// Removes every function not reachable from `roots`, and every
/// global data object no surviving function's `symbol` field still
/// names. Returns `(functions_removed, globals_removed)`.
pub fn sweep_dead_functions(module: &mut MirModule, roots: &[String]) -> (usize, usize) {
    let live_fns = reachable_functions(module, roots);
    let before_fns = module.functions.len();

    let surviving: Vec<MirFunction> = module.functions.values().filter(|f| live_fns.contains(&f.name)).cloned().collect();
    let removed_fns = before_fns - surviving.len();
    module.functions = minz_entity::PrimaryMap::new();
    for f in surviving {
        module.functions.push(f);
    }

    let mut referenced_labels: FxHashSet<String> = FxHashSet::default();
    for f in module.functions.values() {
        for instr in &f.instrs {
            if let Some(sym) = &instr.symbol {
                referenced_labels.insert(sym.clone());
            }
        }
    }

    let before_globals = module.globals.len();
    let surviving_globals: Vec<GlobalData> =
        module.globals.values().filter(|g| referenced_labels.contains(g.label())).cloned().collect();
    let removed_globals = before_globals - surviving_globals.len();
    module.globals = minz_entity::PrimaryMap::new();
    for g in surviving_globals {
        module.globals.push(g);
    }

    (removed_fns, removed_globals)
}

/// The set of built-in print helper routines (§4.16, §4.12's
/// "standard-library tree-shaking") this module's surviving functions
/// actually invoke, keyed by the mangled helper symbol codegen should
/// emit. A function not referenced here is left out of the assembled
/// output entirely.
pub fn used_print_helpers(module: &MirModule) -> FxHashSet<&'static str> {
    use minz_mir::instr::Opcode;
    let mut used = FxHashSet::default();
    for f in module.functions.values() {
        for instr in &f.instrs {
            let helper = match instr.opcode {
                Opcode::PrintU8 => Some("print_u8_decimal"),
                Opcode::PrintU16 => Some("print_u16_decimal"),
                Opcode::PrintI8 => Some("print_i8_decimal"),
                Opcode::PrintI16 => Some("print_i16_decimal"),
                Opcode::PrintBool => Some("print_bool"),
                Opcode::PrintString => Some("print_string"),
                _ => None,
            };
            if let Some(h) = helper {
                used.insert(h);
            }
        }
    }
    used
}
