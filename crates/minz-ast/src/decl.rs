//! Top-level (and function-body-nested, for the rejected `pub fun`
//! case — spec §9.2) declaration nodes, and the module root.

use minz_diagnostics::Position;

use crate::expr::Expr;
use crate::stmt::Stmt;
use crate::typeref::TypeRef;

#[derive(Debug, Clone)]
pub struct Param {
    pub name: String,
    pub ty: TypeRef,
    pub pos: Position,
}

/// A function's body is a block of statements with an optional
/// trailing expression, matching `ExprKind::Block`'s shape so a
/// single-expression function (`fun add(a, b) -> u8 { a + b }`) needs
/// no synthetic `return`.
#[derive(Debug, Clone)]
pub struct FunctionBody {
    pub stmts: Vec<Stmt>,
    pub tail: Option<Expr>,
}

#[derive(Debug, Clone)]
pub struct FunctionDecl {
    pub name: String,
    pub params: Vec<Param>,
    pub ret: TypeRef,
    pub body: FunctionBody,
    pub is_pub: bool,
    /// Marked by the programmer as an interrupt handler; codegen uses
    /// `EX AF,AF'`/`EXX` context save instead of push/pop (§4.16).
    pub is_interrupt: bool,
    pub pos: Position,
}

#[derive(Debug, Clone)]
pub struct FieldDecl {
    pub name: String,
    pub ty: TypeRef,
    pub pos: Position,
}

#[derive(Debug, Clone)]
pub struct StructDecl {
    pub name: String,
    pub fields: Vec<FieldDecl>,
    pub is_pub: bool,
    pub pos: Position,
}

#[derive(Debug, Clone)]
pub struct EnumVariantDecl {
    pub name: String,
    /// Explicit discriminant, if the source gave one; otherwise
    /// assigned 0, 1, 2, … in declaration order (§3.1).
    pub value: Option<i64>,
    pub pos: Position,
}

#[derive(Debug, Clone)]
pub struct EnumDecl {
    pub name: String,
    pub variants: Vec<EnumVariantDecl>,
    pub is_pub: bool,
    pub pos: Position,
}

#[derive(Debug, Clone)]
pub struct BitFieldDecl {
    pub name: String,
    pub width: u8,
    pub pos: Position,
}

#[derive(Debug, Clone)]
pub struct BitStructDecl {
    pub name: String,
    pub fields: Vec<BitFieldDecl>,
    pub pos: Position,
}

/// A method signature inside an `interface` block: no body, just the
/// shape later `impl`s must match.
#[derive(Debug, Clone)]
pub struct InterfaceMethodSig {
    pub name: String,
    pub params: Vec<Param>,
    pub ret: TypeRef,
    pub pos: Position,
}

#[derive(Debug, Clone)]
pub struct InterfaceDecl {
    pub name: String,
    pub methods: Vec<InterfaceMethodSig>,
    pub is_pub: bool,
    pub pos: Position,
}

/// `impl Interface for Type { … }` (spec §4.6).
#[derive(Debug, Clone)]
pub struct ImplDecl {
    pub interface_name: String,
    pub type_name: String,
    pub methods: Vec<FunctionDecl>,
    pub pos: Position,
}

#[derive(Debug, Clone)]
pub struct ConstDecl {
    pub name: String,
    pub ty: Option<TypeRef>,
    pub value: Expr,
    pub is_pub: bool,
    pub pos: Position,
}

#[derive(Debug, Clone)]
pub struct GlobalVarDecl {
    pub name: String,
    pub mutable: bool,
    pub ty: Option<TypeRef>,
    pub value: Expr,
    pub is_pub: bool,
    pub pos: Position,
}

#[derive(Debug, Clone)]
pub enum Decl {
    Function(FunctionDecl),
    Struct(StructDecl),
    Enum(EnumDecl),
    BitStruct(BitStructDecl),
    Interface(InterfaceDecl),
    Impl(ImplDecl),
    Const(ConstDecl),
    GlobalVar(GlobalVarDecl),
}

impl Decl {
    pub fn name(&self) -> &str {
        match self {
            Decl::Function(d) => &d.name,
            Decl::Struct(d) => &d.name,
            Decl::Enum(d) => &d.name,
            Decl::BitStruct(d) => &d.name,
            Decl::Interface(d) => &d.name,
            Decl::Impl(d) => &d.type_name,
            Decl::Const(d) => &d.name,
            Decl::GlobalVar(d) => &d.name,
        }
    }

    pub fn position(&self) -> Position {
        match self {
            Decl::Function(d) => d.pos,
            Decl::Struct(d) => d.pos,
            Decl::Enum(d) => d.pos,
            Decl::BitStruct(d) => d.pos,
            Decl::Interface(d) => d.pos,
            Decl::Impl(d) => d.pos,
            Decl::Const(d) => d.pos,
            Decl::GlobalVar(d) => d.pos,
        }
    }
}

/// The root of a single compilation unit, as handed off by the
/// (out-of-scope) parser (§6.1). Optionally carries a module-name
/// prefix used for `module.name` source lookups / `module_name`
/// mangling (§4.1).
#[derive(Debug, Clone, Default)]
pub struct Module {
    pub name: Option<String>,
    pub decls: Vec<Decl>,
}

impl Module {
    pub fn new(name: Option<String>) -> Self {
        Module { name, decls: Vec::new() }
    }

    pub fn functions(&self) -> impl Iterator<Item = &FunctionDecl> {
        self.decls.iter().filter_map(|d| match d {
            Decl::Function(f) => Some(f),
            _ => None,
        })
    }
}
