//! Match patterns (spec §4.9: `match` lowers to a decision tree).

use crate::expr::Expr;
use minz_diagnostics::Position;

#[derive(Debug, Clone)]
pub enum Pattern {
    /// `_`
    Wildcard(Position),
    /// `x` — binds the scrutinee to a new name.
    Binding(String, Position),
    /// An integer or boolean literal pattern.
    Literal(Expr, Position),
    /// `lo..hi` — inclusive-exclusive range of integers.
    Range(i64, i64, Position),
    /// `EnumName::Variant` or bare `Variant` when the enum type is
    /// known from the scrutinee.
    EnumVariant { enum_name: Option<String>, variant: String, pos: Position },
    /// `Struct { field1, field2: pat, .. }`
    Struct { type_name: String, fields: Vec<(String, Pattern)>, pos: Position },
}

impl Pattern {
    pub fn position(&self) -> Position {
        match self {
            Pattern::Wildcard(p)
            | Pattern::Binding(_, p)
            | Pattern::Literal(_, p)
            | Pattern::Range(_, _, p)
            | Pattern::EnumVariant { pos: p, .. }
            | Pattern::Struct { pos: p, .. } => *p,
        }
    }

    pub fn is_wildcard(&self) -> bool {
        matches!(self, Pattern::Wildcard(_) | Pattern::Binding(_, _))
    }
}

#[derive(Debug, Clone)]
pub struct MatchArm {
    pub pattern: Pattern,
    pub guard: Option<Expr>,
    pub body: Expr,
    pub pos: Position,
}
