//! The MIR module: an ordered list of functions plus global data
//! (spec §3.5).

use minz_entity::PrimaryMap;

use crate::entities::{DataId, FuncId};
use crate::function::MirFunction;

/// One piece of module-level data: a string literal, a constant
/// table, or a global variable cell (spec §3.5, §6.2).
#[derive(Debug, Clone)]
pub enum GlobalData {
    /// Length-prefixed string content (`String` uses a `u8` length
    /// prefix, `LString` a `u16` one — the prefix width is recorded
    /// here rather than re-derived from the type at emission time).
    StringLiteral { label: String, bytes: Vec<u8>, length_prefix_bytes: u8 },
    /// A constant table (e.g. a literal array's backing bytes).
    ConstTable { label: String, bytes: Vec<u8> },
    /// A global variable cell: `size` bytes, optionally initialized.
    GlobalVar { label: String, size: u32, init: Option<Vec<u8>>, mutable: bool },
}

impl GlobalData {
    pub fn label(&self) -> &str {
        match self {
            GlobalData::StringLiteral { label, .. } => label,
            GlobalData::ConstTable { label, .. } => label,
            GlobalData::GlobalVar { label, .. } => label,
        }
    }
}

/// A whole compilation unit's MIR (spec §3.5): the module owns every
/// function and global data object exclusively (§5).
#[derive(Debug, Clone, Default)]
pub struct MirModule {
    pub functions: PrimaryMap<FuncId, MirFunction>,
    pub globals: PrimaryMap<DataId, GlobalData>,
    /// `ORG <addr>` directive, set from target configuration (§6.2).
    pub org: Option<u16>,
}

impl MirModule {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_function(&mut self, f: MirFunction) -> FuncId {
        self.functions.push(f)
    }

    pub fn find_function(&self, name: &str) -> Option<FuncId> {
        self.functions.iter().find(|(_, f)| f.name == name).map(|(id, _)| id)
    }

    pub fn add_global(&mut self, g: GlobalData) -> DataId {
        self.globals.push(g)
    }
}
