//! MIR instructions and opcodes (spec §3.5).

use smallvec::SmallVec;

use minz_types::Type;

use crate::entities::Reg;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signedness {
    Signed,
    Unsigned,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
    // --- Data movement ---
    LoadConst,
    LoadVar,
    StoreVar,
    LoadParam,
    Move,

    // --- Arithmetic/logic ---
    Add,
    Sub,
    Mul,
    Div(Signedness),
    Mod(Signedness),
    Neg,
    And,
    Or,
    Xor,
    Shl,
    Shr(Signedness),

    // --- Comparison ---
    Eq,
    Ne,
    Lt(Signedness),
    Le(Signedness),
    Gt(Signedness),
    Ge(Signedness),

    // --- Memory ---
    LoadIndirect,
    StoreIndirect,
    AddressOf,
    LoadField,
    StoreField,
    LoadIndex,
    StoreIndex,

    // --- Control ---
    Jump,
    JumpIfZero,
    JumpIfNonZero,
    Label,
    Call,
    Return,
    TailCall,

    // --- Structured ---
    Phi,
    AllocStack,

    // --- SMC-specific ---
    SmcAnchor,
    SmcPatch,
    TsmcLoad,
    TsmcStore,

    // --- CTIE markers ---
    CompileTimeKnown,
    ConstResult,

    // --- Print/builtin intrinsics ---
    PrintU8,
    PrintU16,
    PrintI8,
    PrintI16,
    PrintBool,
    PrintString,
}

impl Opcode {
    /// Instructions with no side effect whose dead destination can be
    /// swept by DCE's local pass (§4.12). Control-flow, memory
    /// stores, calls, SMC patches, and print intrinsics are never
    /// considered dead even with an unread destination.
    pub fn is_pure_local(self) -> bool {
        use Opcode::*;
        matches!(
            self,
            LoadConst
                | LoadVar
                | LoadParam
                | Move
                | Add
                | Sub
                | Mul
                | Div(_)
                | Mod(_)
                | Neg
                | And
                | Or
                | Xor
                | Shl
                | Shr(_)
                | Eq
                | Ne
                | Lt(_)
                | Le(_)
                | Gt(_)
                | Ge(_)
                | AddressOf
                | LoadField
                | LoadIndex
                | LoadIndirect
                | Phi
                | CompileTimeKnown
                | ConstResult
        )
    }

    pub fn is_print_intrinsic(self) -> bool {
        matches!(self, Opcode::PrintU8 | Opcode::PrintU16 | Opcode::PrintI8 | Opcode::PrintI16 | Opcode::PrintBool | Opcode::PrintString)
    }
}

/// Marks a `label` instruction as the head of a loop the MIR builder
/// found a DJNZ-loop candidate for (§4.9): both bounds known at
/// compile time and `|hi-lo| <= 255`. `counter` is the virtual
/// register holding the trip count, materialized into `B` by codegen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DjnzLoop {
    pub counter: Reg,
}

/// One MIR instruction: a tagged record over virtual registers (spec
/// §3.5). Not every field is meaningful for every opcode; unused
/// fields are `None`/empty.
#[derive(Debug, Clone)]
pub struct Instruction {
    pub opcode: Opcode,
    pub dest: Option<Reg>,
    pub srcs: SmallVec<[Reg; 2]>,
    pub imm: Option<i64>,
    pub symbol: Option<String>,
    pub ty: Option<Type>,
    /// Error-union discriminant companion register (spec §4.7,
    /// §4.16): set on a `call` whose callee returns `T!E`, holding the
    /// boolean the carry flag is captured into after the call; set on
    /// a `return` leaving an error-union-returning function, holding
    /// the boolean that gets written back into the carry flag before
    /// `RET`. `dest`/`srcs` carry the payload, which the carry-flag
    /// convention keeps meaningful in both the ok and error case.
    pub err_dest: Option<Reg>,
    /// Set on `smc-anchor`/`smc-patch`/`tsmc-load`/`tsmc-store` to
    /// name the patch site (spec §3.5, §4.16).
    pub smc_anchor: Option<String>,
    /// Set on the `label` instruction heading a DJNZ-candidate loop
    /// (§4.9, §4.16).
    pub djnz: Option<DjnzLoop>,
    pub comment: Option<String>,
}

impl Instruction {
    pub fn new(opcode: Opcode) -> Self {
        Instruction { opcode, dest: None, srcs: SmallVec::new(), imm: None, symbol: None, ty: None, smc_anchor: None, djnz: None, comment: None, err_dest: None }
    }

    pub fn with_dest(mut self, dest: Reg) -> Self {
        self.dest = Some(dest);
        self
    }

    pub fn with_err_dest(mut self, err_dest: Reg) -> Self {
        self.err_dest = Some(err_dest);
        self
    }

    pub fn with_src(mut self, src: Reg) -> Self {
        self.srcs.push(src);
        self
    }

    pub fn with_imm(mut self, imm: i64) -> Self {
        self.imm = Some(imm);
        self
    }

    pub fn with_symbol(mut self, symbol: impl Into<String>) -> Self {
        self.symbol = Some(symbol.into());
        self
    }

    pub fn with_ty(mut self, ty: Type) -> Self {
        self.ty = Some(ty);
        self
    }

    pub fn with_anchor(mut self, anchor: impl Into<String>) -> Self {
        self.smc_anchor = Some(anchor.into());
        self
    }

    pub fn with_djnz(mut self, counter: Reg) -> Self {
        self.djnz = Some(DjnzLoop { counter });
        self
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    /// True if this instruction writes `dest` but has no side effect
    /// beyond that write, making it eligible for local dead-code
    /// removal when `dest` is never read (§4.12).
    pub fn is_dead_eligible(&self) -> bool {
        self.dest.is_some() && self.opcode.is_pure_local()
    }
}
