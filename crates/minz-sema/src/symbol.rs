//! Symbols (spec §3.2).

use minz_diagnostics::Position;
use minz_types::Type;
use std::rc::Rc;

#[derive(Debug, Clone)]
pub struct VariableSymbol {
    pub name: String,
    pub ty: Type,
    pub mutable: bool,
}

#[derive(Debug, Clone)]
pub struct ParameterSymbol {
    pub name: String,
    pub ty: Type,
    pub index: usize,
}

/// One concrete function sharing a name with zero or more siblings in
/// an [`OverloadSet`].
#[derive(Debug, Clone)]
pub struct FunctionSymbol {
    pub name: String,
    pub params: Vec<Type>,
    pub ret: Type,
    pub mangled_name: String,
    pub is_pub: bool,
    pub is_interrupt: bool,
}

/// Two or more functions sharing a name in the same scope (spec
/// §3.2, §4.1). Members are stored in definition order; overload
/// resolution (§4.3) never depends on iteration order beyond that.
#[derive(Debug, Clone, Default)]
pub struct OverloadSet {
    pub name: String,
    pub members: Vec<Rc<FunctionSymbol>>,
}

#[derive(Debug, Clone)]
pub struct ConstantSymbol {
    pub name: String,
    pub ty: Type,
    pub value: ConstValue,
}

/// A compile-time-known value, produced by evaluating a `const`
/// initializer or a CTIE-interpreted call (shared shape with
/// `minz_opt::ctie::Value` but kept local to avoid a crate-graph
/// cycle; the two are structurally identical by construction).
#[derive(Debug, Clone, PartialEq)]
pub enum ConstValue {
    Int(i64),
    Bool(bool),
    Str(String),
}

#[derive(Debug, Clone)]
pub struct InterfaceMethodSymbol {
    pub interface_name: String,
    pub method_name: String,
    pub sig: Type, // Type::Function
}

#[derive(Debug, Clone)]
pub enum Symbol {
    Variable(Rc<VariableSymbol>),
    Parameter(Rc<ParameterSymbol>),
    Function(Rc<FunctionSymbol>),
    OverloadSet(Rc<std::cell::RefCell<OverloadSet>>),
    Type(Type),
    Constant(Rc<ConstantSymbol>),
    InterfaceMethod(Rc<InterfaceMethodSymbol>),
    Module(String),
}

impl Symbol {
    pub fn kind_str(&self) -> &'static str {
        match self {
            Symbol::Variable(_) => "variable",
            Symbol::Parameter(_) => "parameter",
            Symbol::Function(_) => "function",
            Symbol::OverloadSet(_) => "overload set",
            Symbol::Type(_) => "type",
            Symbol::Constant(_) => "constant",
            Symbol::InterfaceMethod(_) => "interface method",
            Symbol::Module(_) => "module",
        }
    }
}

/// A declared symbol's source position, kept alongside the `Symbol`
/// in a scope entry for `DuplicateDefinition`'s `first_pos` field.
#[derive(Debug, Clone)]
pub struct ScopeEntry {
    pub symbol: Symbol,
    pub pos: Position,
}
