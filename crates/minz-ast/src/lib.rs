//! The AST node taxonomy consumed from the MinZ parser front-end
//! (spec §3.4, §6.1). The parser is out of scope for this workspace;
//! this crate is the contract boundary it must produce.
//!
//! Every node carries begin/end source positions via
//! [`minz_diagnostics::Position`]. The tree is immutable after
//! parsing except for the specific rewrites semantic analysis is
//! allowed to perform: lambda hoisting appends new top-level
//! `Decl::Function`s (§4.4), `@minz`/`@define` expansion appends
//! declarations produced by `@emit` (§4.8), and overload resolution
//! rewrites a call's callee to the chosen candidate's mangled name
//! (§4.3). None of these mutate an expression's resolved type in
//! place; that lives in a side table built during semantic analysis.

pub mod decl;
pub mod expr;
pub mod pattern;
pub mod stmt;
pub mod typeref;

pub use decl::{
    BitFieldDecl, BitStructDecl, ConstDecl, Decl, EnumDecl, EnumVariantDecl, FieldDecl,
    FunctionBody, FunctionDecl, GlobalVarDecl, ImplDecl, InterfaceDecl, InterfaceMethodSig,
    Module, Param, StructDecl,
};
pub use expr::{BinOp, Expr, ExprKind, Field, FormatPiece, IterStage, LambdaParam, NodeId, UnOp};
pub use pattern::{MatchArm, Pattern};
pub use stmt::{Stmt, StmtKind};
pub use typeref::{ArrayLen, TypeRef};
