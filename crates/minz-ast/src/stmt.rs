//! Statement nodes (spec §3.4). Statements never yield a value; the
//! trailing-expression slot of a `Block` is what expressions use to
//! produce one (see `ExprKind::Block`).

use minz_diagnostics::Position;

use crate::expr::Expr;
use crate::typeref::TypeRef;

#[derive(Debug, Clone)]
pub enum StmtKind {
    /// `let x = expr` / `let mut x: T = expr`.
    Let { name: String, mutable: bool, ty: Option<TypeRef>, value: Expr },
    Assign { target: Expr, value: Expr },
    /// `x += expr` and friends, kept distinct from a desugared
    /// `x = x + expr` so the MIR builder can choose read-modify-write
    /// instruction forms when the target is a memory location.
    CompoundAssign { op: crate::expr::BinOp, target: Expr, value: Expr },
    ExprStmt(Expr),
    Return(Option<Expr>),
    /// `for i in lo..hi { body }`. Whether this lowers to a DJNZ loop
    /// is decided by the MIR builder (§4.9), not here.
    ForRange { var: String, lo: Expr, hi: Expr, body: Vec<Stmt> },
    While { cond: Expr, body: Vec<Stmt> },
    Loop { body: Vec<Stmt> },
    Break,
    Continue,
}

#[derive(Debug, Clone)]
pub struct Stmt {
    pub kind: StmtKind,
    pub pos: Position,
}

impl Stmt {
    pub fn new(kind: StmtKind, pos: Position) -> Self {
        Stmt { kind, pos }
    }
}
