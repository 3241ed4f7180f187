//! Expression nodes (spec §3.4).
//!
//! Every expression carries a [`NodeId`], a dense index allocated by
//! the parser as it builds the tree. `minz-sema` never mutates an
//! `Expr` in place to attach a resolved type; instead it keeps a
//! `SecondaryMap<NodeId, Type>` alongside the tree (see
//! `minz_sema::typeck::TypeTable`), matching the "AST is immutable
//! after parsing" rule in §3.4 while still allowing the handful of
//! node *replacements* (lambda hoisting, overload rewriting) that the
//! specification calls out explicitly.

use minz_diagnostics::Position;
use minz_entity::{entity_impl, EntityRef};

use crate::pattern::MatchArm;

#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(u32);
entity_impl!(NodeId, "n");

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    And,
    Or,
    Xor,
    Shl,
    Shr,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    LogicalAnd,
    LogicalOr,
    /// `??` — error-coalescing (spec §4.7).
    ErrorCoalesce,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnOp {
    Neg,
    Not,
    /// `&expr` — address-of.
    AddressOf,
    /// `*expr` — pointer dereference.
    Deref,
}

/// One interpolation hole or literal run inside a `@print`/`@to_string`
/// format string (spec §4.8).
#[derive(Debug, Clone)]
pub enum FormatPiece {
    Literal(String),
    Interpolate(Box<Expr>),
}

#[derive(Debug, Clone)]
pub struct Field {
    pub name: String,
    pub value: Expr,
}

#[derive(Debug, Clone)]
pub struct LambdaParam {
    pub name: String,
    pub ty: Option<crate::typeref::TypeRef>,
    pub pos: Position,
}

/// A single stage in a fused iterator chain: `.map(f)`, `.filter(g)`,
/// `.forEach(h)` (spec §4.9).
#[derive(Debug, Clone)]
pub enum IterStage {
    Map(Box<Expr>),
    Filter(Box<Expr>),
    ForEach(Box<Expr>),
}

#[derive(Debug, Clone)]
pub enum ExprKind {
    IntLiteral(u64),
    BoolLiteral(bool),
    StringLiteral(String),
    /// `"…#{expr}…"` / `f"…{expr}…"` interpolated strings, still in
    /// raw form; the Metafunction engine (§4.8) desugars these into
    /// `@to_string` calls during semantic analysis.
    InterpolatedString(Vec<FormatPiece>),
    Identifier(String),
    Unary(UnOp, Box<Expr>),
    Binary(BinOp, Box<Expr>, Box<Expr>),
    /// `expr?` — error-propagation postfix (spec §4.7).
    Try(Box<Expr>),
    Call { callee: Box<Expr>, args: Vec<Expr> },
    /// `receiver.method(args)` — left unresolved between a plain field
    /// access, a UFCS-style free-function call, and an interface
    /// method call until semantic analysis (§4.6) disambiguates it.
    MethodCall { receiver: Box<Expr>, method: String, args: Vec<Expr> },
    Field { base: Box<Expr>, field: String },
    Index { base: Box<Expr>, index: Box<Expr> },
    Cast { expr: Box<Expr>, ty: crate::typeref::TypeRef },
    ArrayLiteral(Vec<Expr>),
    StructLiteral { type_name: String, fields: Vec<Field> },
    /// `|params| body` — lowered to a hoisted function by
    /// `minz_sema::lambda` before MIR construction.
    Lambda { params: Vec<LambdaParam>, ret: Option<crate::typeref::TypeRef>, body: Box<Expr> },
    /// `@curry(lambda_expr, value)` (spec §4.5).
    Curry { lambda: Box<Expr>, value: Box<Expr> },
    Match { scrutinee: Box<Expr>, arms: Vec<MatchArm> },
    Block(Vec<crate::stmt::Stmt>, Option<Box<Expr>>),
    If { cond: Box<Expr>, then_branch: Box<Expr>, else_branch: Option<Box<Expr>> },
    /// `col.iter().stage1().stage2()….forEach(h)` — kept intact (not
    /// desugared to nested calls) so the MIR builder can fuse it into
    /// a single loop (§4.9).
    IterChain { source: Box<Expr>, stages: Vec<IterStage> },
    /// `@print(fmt, args…)` / `@to_string(expr)` (§4.8).
    Print { format: Vec<FormatPiece> },
    ToString(Box<Expr>),
    /// The desugared form of a `"…#{expr}…"` / `f"…{expr}…"`
    /// interpolated string or an explicit `@to_string` chain: a
    /// sequence of pieces concatenated at runtime, each either a
    /// literal segment or a `@to_string`-converted sub-expression
    /// (spec §4.8).
    Concat(Vec<Expr>),
    /// `@minz[[[ … ]]]` — raw source text for the Compile-Time
    /// Executor to interpret; opaque to everything before
    /// `minz_sema::meta`.
    MinzBlock(String),
    /// `@define(name)[[[ template ]]]` declaration, and a later
    /// `@define(values…)` invocation are both represented here; the
    /// `args` field is empty for the defining occurrence.
    DefineTemplate { name: String, args: Vec<Expr>, template: Option<String> },
    /// `@if(cond) { .. } @elif(cond) { .. } @else { .. }` evaluated by
    /// the Compile-Time Executor against `TARGET` and friends (§4.8).
    CompileIf { branches: Vec<(Expr, Expr)>, else_branch: Option<Box<Expr>> },
    /// `@lua[[[ … ]]]` — optional, may be stubbed out (§4.8).
    LuaBlock(String),
}

#[derive(Debug, Clone)]
pub struct Expr {
    pub id: NodeId,
    pub kind: ExprKind,
    pub pos: Position,
}

impl Expr {
    pub fn new(id: NodeId, kind: ExprKind, pos: Position) -> Self {
        Expr { id, kind, pos }
    }
}
