//! Unresolved type syntax, as written by the programmer and produced
//! by the parser. The type checker (in `minz-sema`) resolves a
//! `TypeRef` into a `minz_types::Type` against the current scope.

use minz_diagnostics::Position;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeRef {
    Named(String, Position),
    Array(Box<TypeRef>, ArrayLen, Position),
    Pointer(Box<TypeRef>, bool /* mutable */, Position),
    Function(Vec<TypeRef>, Box<TypeRef>, Position),
    ErrorUnion(Box<TypeRef>, String /* error enum name */, Position),
    /// `_`: to be filled in by inference at the use site (e.g. array
    /// literal element type).
    Inferred(Position),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArrayLen {
    Literal(u32),
    /// A named compile-time constant, resolved during semantic
    /// analysis.
    Const(String),
}

impl TypeRef {
    pub fn position(&self) -> Position {
        match self {
            TypeRef::Named(_, p)
            | TypeRef::Array(_, _, p)
            | TypeRef::Pointer(_, _, p)
            | TypeRef::Function(_, _, p)
            | TypeRef::ErrorUnion(_, _, p)
            | TypeRef::Inferred(p) => *p,
        }
    }
}
